//! Transport seam between the session and the wire.
//!
//! The session never touches sockets. It issues requests through
//! [`Transport`] and learns about their outcome from the events a later
//! [`Transport::poll`] returns:
//!
//! 1. `connect()` queues a login; `Success` or `Failure` arrives on a later poll
//! 2. `send()` hands an entity down; acks and upload results arrive on later polls
//! 3. `disconnect()` broadcasts a disconnect; `Disconnected` arrives on a later poll
//!
//! Requests are fire-and-forget and must not block. `poll` is the only
//! suspension point and is only ever driven by the session loop.

mod loopback;

pub use loopback::{LoopbackOptions, LoopbackTransport};

use std::time::Duration;

use async_trait::async_trait;
use chatq_protocol::{InboundEvent, OutboundEntity};

use crate::error::Result;

/// Result of one transport poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
	/// Events decoded during the poll, possibly none.
	Events(Vec<InboundEvent>),
	/// The underlying connection is gone; no further events will arrive.
	Closed,
}

/// Connection to the remote messaging service.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Issues a login request.
	fn connect(&self) -> Result<()>;

	/// Broadcasts a disconnect request.
	fn disconnect(&self) -> Result<()>;

	/// Hands an entity down to the wire.
	fn send(&self, entity: OutboundEntity) -> Result<()>;

	/// Drives I/O for up to `timeout` and returns whatever was decoded.
	///
	/// Login rejection is reported as [`Error::Authentication`]. The
	/// implementation must be safe to call again after returning events.
	///
	/// [`Error::Authentication`]: crate::Error::Authentication
	async fn poll(&self, timeout: Duration) -> Result<PollOutcome>;
}
