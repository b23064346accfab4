//! chatq runtime - session state, the bounded session loop and their collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ chatq-worker │  Dispatcher, task queue, CLI
//! └──────┬───────┘
//!        │ run() / call() / submit_deferred()
//! ┌──────▼───────┐
//! │ SessionLoop  │  poll → apply events → sleep → one deferred callback
//! └──────┬───────┘
//!        │ handle_event()
//! ┌──────▼────────────┐
//! │ ConnectionSession │  connected flag, guarded sends, media completion
//! └──────┬────────────┘
//!        │ Transport / MediaUploader
//! ┌──────▼───────┐
//! │   the wire   │  loopback in this crate
//! └──────────────┘
//! ```
//!
//! `connected` and `listening` are owned by the session and the loop
//! respectively. Other tasks read them or wait on them through `watch`
//! receivers, and get work onto the loop with [`SessionLoop::call`].

pub mod error;
pub mod extension;
pub mod session;
pub mod session_loop;
pub mod transport;
pub mod upload;

pub use error::{Error, Result};
pub use extension::{KNOWN_EXTENSIONS, SessionExtension, StatsExtension, TraceExtension, resolve_extensions};
pub use session::ConnectionSession;
pub use session_loop::{
	DEFAULT_DETACHED_DELAY, DEFAULT_LOOP_TIMEOUT, DEFAULT_POLL_INTERVAL, Deferred, LoopExit, LoopOptions, SessionLoop,
};
pub use transport::{LoopbackOptions, LoopbackTransport, PollOutcome, Transport};
pub use upload::{LoopbackUploader, MediaEvent, MediaUploader, ProgressFn, UploadJob};
