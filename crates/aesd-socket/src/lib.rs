//! TCP front-end for the AESD command log
//!
//! Clients connect, send one newline-terminated record, and receive log
//! content back before the server closes the connection:
//!
//! - a plain record is appended and the whole log is returned
//! - `AESDCHAR_IOCSEEKTO:<record>,<offset>\n` returns the log from that
//!   position without changing it
//!
//! A background task appends a `timestamp: ...` record on a fixed interval,
//! and every record can optionally be mirrored to a flat file.
//!
//! ```no_run
//! use aesd_socket::{AesdServer, ServerConfig};
//!
//! # async fn example() -> aesd_socket::ServerResult<()> {
//! let server = AesdServer::bind(ServerConfig::default()).await?;
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod backing;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod timestamp;

pub use backing::BackingFile;
pub use config::{Cli, DEFAULT_PORT, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use logging::LogSettings;
pub use server::{AesdServer, ShutdownHandle};
pub use session::{ConnectionSession, SessionConfig, SessionOutcome, SessionState};
pub use timestamp::{TimestampAppender, format_timestamp};
