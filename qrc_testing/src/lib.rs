//! Test support for the `qrc` client.
//!
//! [`MockCore`] is a TCP server speaking the QRC framing that answers requests
//! through a caller-supplied responder and can push unsolicited frames. The
//! [`frames`] module builds the JSON a Core would send.
//!
//! ```no_run
//! use qrc::{QrcClient, Request};
//! use qrc_testing::{MockCore, frames};
//!
//! # async fn example() -> std::io::Result<()> {
//! let core = MockCore::start(|request| vec![frames::result_for(request, true.into())]).await?;
//! let client = QrcClient::builder(core.core_address()).build();
//! let result = client.send(Request::new("NoOp")).await.expect("reply");
//! assert_eq!(result, serde_json::json!(true));
//! # Ok(())
//! # }
//! ```

pub mod frames;
pub mod logging;
pub mod mock_core;

pub use logging::{LoggerHandle, logger};
pub use mock_core::{MockCore, Responder};
