//! A single TCP connection to a Core and the tasks that service it.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{
        TcpSocket,
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use super::{SocketOptions, TransportError, config::ClientConfig};
use crate::{
    codec::{NulDelimitedCodec, clamp_frame_length},
    message::Inbound,
    metrics::{self, Direction},
};

/// Bound on flushing buffered output when a link closes.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) type FrameReader = FramedRead<OwnedReadHalf, NulDelimitedCodec>;

/// Receiver of everything a link's reader observes.
pub(crate) trait LinkHandler: Send + Sync + 'static {
    /// A frame was decoded.
    fn on_inbound(&self, link: &Arc<Link>, inbound: Inbound);

    /// The reader stopped because the transport failed or ended.
    ///
    /// Not called when the link was closed locally.
    fn on_terminated(&self, link: &Arc<Link>, reason: TransportError);
}

/// Write side and lifecycle flags of one connection.
pub(crate) struct Link {
    generation: u64,
    device: Arc<str>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, NulDelimitedCodec>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl Link {
    /// Connect to the configured Core within the connect timeout.
    pub(crate) async fn open(
        config: &ClientConfig,
        generation: u64,
        device: Arc<str>,
    ) -> Result<(Arc<Self>, FrameReader), TransportError> {
        let stream = tokio::time::timeout(config.connect_timeout, connect(config, &device))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                device: device.to_string(),
                elapsed: config.connect_timeout,
            })??;
        let max = clamp_frame_length(config.max_frame_length);
        let (read_half, write_half) = stream.into_split();
        let link = Arc::new(Self {
            generation,
            device,
            writer: Mutex::new(FramedWrite::new(write_half, NulDelimitedCodec::new(max))),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        Ok((link, FramedRead::new(read_half, NulDelimitedCodec::new(max))))
    }

    pub(crate) fn generation(&self) -> u64 { self.generation }

    pub(crate) fn device(&self) -> &Arc<str> { &self.device }

    pub(crate) fn is_open(&self) -> bool { !self.closed.load(Ordering::Acquire) }

    /// Write one frame payload.
    ///
    /// Gives up with [`TransportError::Closed`] as soon as the link is closed,
    /// even if the peer has stopped reading and the write is stalled.
    pub(crate) async fn write(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let mut writer = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(self.closed_error()),
            writer = self.writer.lock() => writer,
        };
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(self.closed_error()),
            sent = writer.send(payload) => {
                sent.map_err(|err| TransportError::from_io(&self.device, err))?;
            }
        }
        metrics::inc_frames(Direction::Outbound);
        Ok(())
    }

    /// Mark the link closed and stop its tasks.
    ///
    /// Returns `true` only for the call that performed the close.
    pub(crate) fn close(self: &Arc<Self>) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut writer = link.writer.lock().await;
            // A peer that stopped reading would stall the flush indefinitely.
            match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::debug!(device = %link.device, error = %err, "error closing write half");
                }
                Err(_) => {
                    tracing::debug!(device = %link.device, "gave up flushing write half");
                }
            }
        });
        true
    }

    pub(crate) fn closed_error(&self) -> TransportError {
        TransportError::Closed {
            device: self.device.to_string(),
        }
    }
}

async fn connect(config: &ClientConfig, device: &str) -> Result<TcpStream, TransportError> {
    let address = &config.address;
    let candidates = tokio::net::lookup_host((address.host(), address.port()))
        .await
        .map_err(|err| TransportError::from_connect(device, err))?;
    let mut last_error = None;
    for addr in candidates {
        match connect_addr(addr, &config.socket_options).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connect attempt failed");
                last_error = Some(err);
            }
        }
    }
    let err = last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    });
    Err(TransportError::from_connect(device, err))
}

async fn connect_addr(addr: SocketAddr, options: &SocketOptions) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    options.apply(&socket)?;
    socket.connect(addr).await
}

/// Start the reader and keep-alive tasks of `link`.
///
/// Both tasks stop when the link is closed. The reader reports decoded frames
/// and transport failures to `handler`.
pub(crate) fn spawn_tasks<H: LinkHandler>(
    handler: Arc<H>,
    link: &Arc<Link>,
    reader: FrameReader,
    idle_timeout: Option<Duration>,
    keepalive_interval: Duration,
) {
    tokio::spawn(read_loop(handler, Arc::clone(link), reader, idle_timeout));
    tokio::spawn(keepalive_loop(Arc::clone(link), keepalive_interval));
}

async fn read_loop<H: LinkHandler>(
    handler: Arc<H>,
    link: Arc<Link>,
    mut reader: FrameReader,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = link.shutdown.cancelled() => return,
            next = next_frame(&mut reader, idle_timeout) => next,
        };
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                metrics::inc_errors("read");
                handler.on_terminated(&link, TransportError::from_io(&link.device, err));
                return;
            }
            Ok(None) => {
                handler.on_terminated(
                    &link,
                    TransportError::Ended {
                        device: link.device.to_string(),
                    },
                );
                return;
            }
            Err(elapsed) => {
                handler.on_terminated(
                    &link,
                    TransportError::IdleTimeout {
                        device: link.device.to_string(),
                        elapsed,
                    },
                );
                return;
            }
        };
        metrics::inc_frames(Direction::Inbound);
        match Inbound::decode(&frame) {
            Ok(inbound) => handler.on_inbound(&link, inbound),
            Err(err) => {
                metrics::inc_errors("decode");
                tracing::warn!(device = %link.device, error = %err, "dropping malformed frame");
            }
        }
    }
}

async fn next_frame(
    reader: &mut FrameReader,
    idle_timeout: Option<Duration>,
) -> Result<Option<io::Result<Bytes>>, Duration> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.next())
            .await
            .map_err(|_| limit),
        None => Ok(reader.next().await),
    }
}

async fn keepalive_loop(link: Arc<Link>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = link.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                tracing::trace!(device = %link.device, generation = link.generation, "keep-alive tick");
            }
        }
    }
}
