//! In-process TCP server imitating a Core.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use qrc::{CoreAddress, FrameBuffer, codec::encode_frame};
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

/// Produces the frames sent back for one request, in order.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

#[derive(Clone, Debug)]
enum Control {
    Push(Vec<u8>),
    Disconnect,
}

struct Shared {
    responder: Responder,
    greeting: Vec<Value>,
    accepted: AtomicUsize,
    open: AtomicUsize,
    received: Mutex<Vec<Value>>,
}

/// A mock Core listening on an ephemeral localhost port.
///
/// Every inbound request is recorded and passed to the responder; the frames
/// it returns are written back immediately. The server stops when dropped.
pub struct MockCore {
    addr: SocketAddr,
    shared: Arc<Shared>,
    control: broadcast::Sender<Control>,
    accept_task: JoinHandle<()>,
}

impl MockCore {
    /// Start a server answering requests with `responder`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::start_with_greeting(Vec::new(), responder).await
    }

    /// Start a server that sends `greeting` on every new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with_greeting<F>(greeting: Vec<Value>, responder: F) -> io::Result<Self>
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            responder: Arc::new(responder),
            greeting,
            accepted: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        });
        let (control, _) = broadcast::channel(64);
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared), control.clone()));
        Ok(Self {
            addr,
            shared,
            control,
            accept_task,
        })
    }

    /// Socket address of the listener.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.addr }

    /// Address for building a client.
    #[must_use]
    pub fn core_address(&self) -> CoreAddress { CoreAddress::new("127.0.0.1", self.addr.port()) }

    /// Connections accepted so far.
    #[must_use]
    pub fn accepted(&self) -> usize { self.shared.accepted.load(Ordering::SeqCst) }

    /// Connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize { self.shared.open.load(Ordering::SeqCst) }

    /// Every request received, across all connections, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<Value> {
        self.shared
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Method names of every request received.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|request| crate::frames::method_of(request).to_owned())
            .collect()
    }

    /// Wait until `count` connections are open, giving up after five seconds.
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        for _ in 0..1000 {
            if self.open_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Wait until `count` requests have been received, giving up after five
    /// seconds.
    pub async fn wait_for_requests(&self, count: usize) -> bool {
        for _ in 0..1000 {
            if self.received().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Send `frame` to every open connection.
    ///
    /// # Panics
    ///
    /// Panics if `frame` cannot be serialized.
    pub fn push(&self, frame: &Value) {
        let bytes = encode_frame(frame).expect("serialize pushed frame");
        self.push_raw(&bytes);
    }

    /// Send raw bytes, delimiters included, to every open connection.
    pub fn push_raw(&self, bytes: &[u8]) {
        let _ = self.control.send(Control::Push(bytes.to_vec()));
    }

    /// Close every open connection.
    pub fn disconnect_all(&self) { let _ = self.control.send(Control::Disconnect); }
}

impl Drop for MockCore {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.disconnect_all();
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    control: broadcast::Sender<Control>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let rx = control.subscribe();
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        shared.open.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(stream, Arc::clone(&shared), rx));
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>, mut control: broadcast::Receiver<Control>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut open = true;
    for frame in &shared.greeting {
        open &= write_frame(&mut writer, frame).await;
    }
    let mut buffer = FrameBuffer::default();
    let mut chunk = vec![0u8; 4096];
    while open {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let Ok(frames) = buffer.feed(&chunk[..n]) else { break };
                for request in frames.into_iter().flatten() {
                    shared
                        .received
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(request.clone());
                    for reply in (shared.responder)(&request) {
                        open &= write_frame(&mut writer, &reply).await;
                    }
                }
            }
            message = control.recv() => match message {
                Ok(Control::Push(bytes)) => open = writer.write_all(&bytes).await.is_ok(),
                Ok(Control::Disconnect) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            },
        }
    }
    shared.open.fetch_sub(1, Ordering::SeqCst);
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Value) -> bool {
    match encode_frame(frame) {
        Ok(bytes) => writer.write_all(&bytes).await.is_ok(),
        Err(_) => false,
    }
}
