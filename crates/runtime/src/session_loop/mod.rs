//! Bounded polling loop that owns the session for one invocation.
//!
//! Each call to [`SessionLoop::run`] drives the transport until the idle
//! timeout elapses, the connection goes away or a fatal error escapes.
//! Every iteration polls the transport, hands decoded events to the
//! session, sleeps a short fixed delay and then runs at most one deferred
//! callback. Callbacks therefore never overlap event handling.
//!
//! Only one loop may run at a time. Whatever way the loop exits, the
//! `listening` flag is cleared and pending callbacks are dropped before
//! control returns to the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chatq_protocol::InboundEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::session::ConnectionSession;
use crate::transport::PollOutcome;

/// Zero-argument work item run inside a loop iteration.
pub type Deferred = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_LOOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DETACHED_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Parameters of one loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
	/// Idle budget measured from loop start.
	pub timeout: Duration,
	/// Issue a login before the first iteration.
	pub auto_connect: bool,
}

impl Default for LoopOptions {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_LOOP_TIMEOUT,
			auto_connect: false,
		}
	}
}

/// Why a loop invocation ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
	/// The idle timeout elapsed.
	Timeout,
	/// A `Disconnected` event was processed.
	Disconnected,
	/// The transport reported the connection closed.
	ConnectionLost,
}

#[derive(Default)]
struct LoopState {
	listening: bool,
	started_at: Option<Instant>,
	timeout: Duration,
	deferred: VecDeque<Deferred>,
}

/// Single-owner polling loop around a [`ConnectionSession`].
pub struct SessionLoop {
	session: Arc<ConnectionSession>,
	state: Mutex<LoopState>,
	listening: watch::Sender<bool>,
	detached_delay: Duration,
	poll_interval: Duration,
}

/// Resets loop state when a run ends, including when the run future is dropped.
struct ListeningGuard<'a> {
	owner: &'a SessionLoop,
}

impl Drop for ListeningGuard<'_> {
	fn drop(&mut self) {
		let discarded = {
			let mut state = self.owner.state.lock();
			state.listening = false;
			state.started_at = None;
			std::mem::take(&mut state.deferred)
		};
		self.owner.session.abandon_pending_media("session loop exited before the upload was answered");
		self.owner.listening.send_replace(false);
		if !discarded.is_empty() {
			tracing::debug!(target: "chatq::loop", count = discarded.len(), "discarding pending callbacks");
		}
	}
}

impl SessionLoop {
	pub fn new(session: Arc<ConnectionSession>) -> Self {
		let (listening, _) = watch::channel(false);
		Self {
			session,
			state: Mutex::new(LoopState::default()),
			listening,
			detached_delay: DEFAULT_DETACHED_DELAY,
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}

	/// Pause between the transport poll and the callback drain of each iteration.
	pub fn with_detached_delay(mut self, delay: Duration) -> Self {
		self.detached_delay = delay;
		self
	}

	/// Upper bound on a single transport poll. The poll never exceeds the loop timeout.
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn session(&self) -> &Arc<ConnectionSession> {
		&self.session
	}

	pub fn is_listening(&self) -> bool {
		*self.listening.borrow()
	}

	pub fn subscribe_listening(&self) -> watch::Receiver<bool> {
		self.listening.subscribe()
	}

	/// Waits until a loop is running.
	///
	/// # Errors
	///
	/// Returns [`Error::Timeout`] if no loop starts within `timeout`.
	pub async fn wait_until_listening(&self, timeout: Duration) -> Result<()> {
		let mut rx = self.listening.subscribe();
		match tokio::time::timeout(timeout, rx.wait_for(|l| *l)).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout(format!("session loop not listening within {timeout:?}"))),
		}
	}

	/// Number of callbacks waiting for an iteration.
	pub fn pending_deferred(&self) -> usize {
		self.state.lock().deferred.len()
	}

	/// Queues `callback` to run inside a later iteration of the running loop.
	///
	/// # Errors
	///
	/// Returns [`Error::NotListening`] if no loop is running. The callback is dropped.
	pub fn submit_deferred(&self, callback: Deferred) -> Result<()> {
		let mut state = self.state.lock();
		if !state.listening {
			return Err(Error::NotListening);
		}
		state.deferred.push_back(callback);
		Ok(())
	}

	/// Runs `f` against the session inside the loop and returns its result.
	///
	/// # Errors
	///
	/// [`Error::NotListening`] if no loop is running, [`Error::ChannelClosed`]
	/// if the loop exits before reaching the callback, or whatever `f` returns.
	pub async fn call<T, F>(&self, f: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(&ConnectionSession) -> Result<T> + Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		let session = Arc::clone(&self.session);
		self.submit_deferred(Box::new(move || {
			let _ = tx.send(f(session.as_ref()));
		}))?;
		rx.await.map_err(|_| Error::ChannelClosed)?
	}

	/// Drives the session until timeout, disconnect or a fatal error.
	///
	/// # Errors
	///
	/// - [`Error::AlreadyListening`] if another loop is running
	/// - [`Error::Authentication`] if the login is rejected
	/// - [`Error::Unexpected`] wrapping any other fault
	///
	/// The loop state is reset before any of these is returned.
	pub async fn run(&self, options: LoopOptions) -> Result<LoopExit> {
		let guard = self.claim(options.timeout)?;
		tracing::info!(target: "chatq::loop", timeout = ?options.timeout, auto_connect = options.auto_connect, "listening");

		let result = self.drive(options).await;
		if result.is_err() {
			self.connection_lost("session loop failed");
		}
		drop(guard);

		match result {
			Ok(exit) => {
				tracing::info!(target: "chatq::loop", ?exit, "loop finished");
				Ok(exit)
			}
			Err(Error::Authentication(reason)) => {
				tracing::error!(target: "chatq::loop", %reason, "Authentication Error");
				Err(Error::Authentication(reason))
			}
			Err(e) => {
				tracing::error!(target: "chatq::loop", error = %e, details = ?e, "Unexpected error in session loop");
				Err(Error::unexpected(e))
			}
		}
	}

	fn claim(&self, timeout: Duration) -> Result<ListeningGuard<'_>> {
		{
			let mut state = self.state.lock();
			if state.listening {
				return Err(Error::AlreadyListening);
			}
			state.listening = true;
			state.started_at = Some(Instant::now());
			state.timeout = timeout;
		}
		self.listening.send_replace(true);
		Ok(ListeningGuard { owner: self })
	}

	async fn drive(&self, options: LoopOptions) -> Result<LoopExit> {
		if options.auto_connect {
			self.session.connect()?;
		}
		let slice = options.timeout.min(self.poll_interval);

		loop {
			if let Some(exit) = self.poll_once(slice).await? {
				return Ok(exit);
			}

			tokio::time::sleep(self.detached_delay).await;
			self.run_one_deferred();

			if self.timed_out() {
				tracing::debug!(target: "chatq::loop", "idle timeout reached");
				if self.session.is_connected() {
					self.session.disconnect()?;
					// pick up the confirmation if it is already on its way
					self.poll_once(self.detached_delay).await?;
				}
				return Ok(LoopExit::Timeout);
			}
		}
	}

	/// Polls once and applies the events. Returns an exit if the connection went away.
	async fn poll_once(&self, slice: Duration) -> Result<Option<LoopExit>> {
		let events = match self.session.transport().poll(slice).await? {
			PollOutcome::Events(events) => events,
			PollOutcome::Closed => {
				tracing::warn!(target: "chatq::loop", "transport closed");
				self.connection_lost("connection lost");
				return Ok(Some(LoopExit::ConnectionLost));
			}
		};

		let mut disconnected = false;
		for event in events {
			disconnected |= event.is_disconnected();
			self.apply(event)?;
		}
		Ok(disconnected.then_some(LoopExit::Disconnected))
	}

	fn apply(&self, event: InboundEvent) -> Result<()> {
		let kind = event.kind();
		match self.session.handle_event(event) {
			Err(e) if e.is_connection_required() => {
				tracing::warn!(target: "chatq::loop", kind, error = %e, "dropping event received while disconnected");
				Ok(())
			}
			other => other,
		}
	}

	/// Marks the session disconnected so `connected` never outlives `listening`.
	fn connection_lost(&self, reason: &str) {
		if !self.session.is_connected() {
			return;
		}
		let event = InboundEvent::Disconnected {
			reason: Some(reason.to_string()),
		};
		if let Err(e) = self.session.handle_event(event) {
			tracing::warn!(target: "chatq::loop", error = %e, "failed to apply synthetic disconnect");
		}
	}

	fn run_one_deferred(&self) {
		let callback = self.state.lock().deferred.pop_front();
		if let Some(callback) = callback {
			callback();
		}
	}

	fn timed_out(&self) -> bool {
		let state = self.state.lock();
		state.started_at.is_some_and(|started| started.elapsed() > state.timeout)
	}
}
