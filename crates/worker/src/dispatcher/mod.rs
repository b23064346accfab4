//! Admission control between the task queue and the session loop.
//!
//! An action only runs while a loop is listening. Otherwise the dispatcher
//! schedules a `start` task and puts the action back on its queue after
//! [`RetryPolicy::delay`], up to [`RetryPolicy::max_retries`] times. This is
//! the only place a task is retried: errors raised by the action itself
//! always go straight back to the caller.

use std::sync::Arc;
use std::time::Duration;

use chatq_protocol::OutboundEntity;
use chatq_runtime::{ConnectionSession, Error, LoopOptions, Result, SessionLoop};

use crate::action::{Action, ActionOutput, TaskEnvelope};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delivers a task to its queue, now or after `countdown`.
pub trait Scheduler: Send + Sync {
	fn schedule(&self, task: TaskEnvelope, countdown: Duration) -> Result<()>;
}

/// Bounded backoff applied while the loop is not listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub delay: Duration,
	pub max_retries: u32,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			delay: DEFAULT_RETRY_DELAY,
			max_retries: DEFAULT_MAX_RETRIES,
		}
	}
}

/// Where admitted actions touch the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
	/// Submit the action as a deferred callback and wait for the loop to run it.
	#[default]
	OnLoop,
	/// Call the session from the worker task that dequeued the action.
	Direct,
}

/// What happened to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
	Completed(ActionOutput),
	/// Loop not listening; the task was put back on its queue.
	Retried { attempt: u32, countdown: Duration },
}

pub struct Dispatcher {
	session_loop: Arc<SessionLoop>,
	scheduler: Arc<dyn Scheduler>,
	home_queue: String,
	retry: RetryPolicy,
	loop_options: LoopOptions,
	mode: DispatchMode,
}

impl Dispatcher {
	/// `home_queue` receives the `start` tasks scheduled on behalf of actions
	/// other than `connect`, which always starts the loop on its own queue.
	pub fn new(session_loop: Arc<SessionLoop>, scheduler: Arc<dyn Scheduler>, home_queue: impl Into<String>) -> Self {
		Self {
			session_loop,
			scheduler,
			home_queue: home_queue.into(),
			retry: RetryPolicy::default(),
			loop_options: LoopOptions::default(),
			mode: DispatchMode::default(),
		}
	}

	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	pub fn with_loop_options(mut self, options: LoopOptions) -> Self {
		self.loop_options = options;
		self
	}

	pub fn with_mode(mut self, mode: DispatchMode) -> Self {
		self.mode = mode;
		self
	}

	pub fn session_loop(&self) -> &Arc<SessionLoop> {
		&self.session_loop
	}

	/// Runs one task.
	///
	/// `start` occupies the calling task for the whole loop invocation.
	///
	/// # Errors
	///
	/// - [`Error::RetriesExhausted`] when the loop never came up in time
	/// - whatever the action or the loop invocation returned
	pub async fn execute(&self, task: TaskEnvelope) -> Result<TaskOutcome> {
		tracing::debug!(target: "chatq::dispatch", task = %task.id, action = task.action.name(), retries = task.retries, "executing");

		if !task.action.requires_listening() {
			return self.start().await.map(TaskOutcome::Completed);
		}
		if !self.session_loop.is_listening() {
			return self.defer(task);
		}

		match self.perform(task.action.clone()).await {
			Err(Error::NotListening) => self.defer(task),
			other => other.map(TaskOutcome::Completed),
		}
	}

	async fn start(&self) -> Result<ActionOutput> {
		if self.session_loop.is_listening() {
			return Ok(ActionOutput::AlreadyListening);
		}
		match self.session_loop.run(self.loop_options).await {
			Ok(exit) => Ok(ActionOutput::LoopFinished(exit)),
			Err(Error::AlreadyListening) => Ok(ActionOutput::AlreadyListening),
			Err(e) => Err(e),
		}
	}

	fn defer(&self, task: TaskEnvelope) -> Result<TaskOutcome> {
		let action = task.action.name();
		if task.retries >= self.retry.max_retries {
			tracing::warn!(target: "chatq::dispatch", task = %task.id, action, retries = task.retries, "session loop never started, giving up");
			return Err(Error::RetriesExhausted {
				action,
				attempts: task.retries,
			});
		}

		let start_queue = match task.action {
			Action::Connect => task.queue.clone(),
			_ => self.home_queue.clone(),
		};
		self.scheduler.schedule(TaskEnvelope::new(Action::Start, start_queue), Duration::ZERO)?;

		let retry = task.into_retry();
		let attempt = retry.retries;
		tracing::info!(target: "chatq::dispatch", task = %retry.id, action, attempt, "session loop not listening, retrying");
		self.scheduler.schedule(retry, self.retry.delay)?;

		Ok(TaskOutcome::Retried {
			attempt,
			countdown: self.retry.delay,
		})
	}

	async fn perform(&self, action: Action) -> Result<ActionOutput> {
		match self.mode {
			DispatchMode::OnLoop => self.session_loop.call(move |session| apply(session, action)).await,
			DispatchMode::Direct => apply(self.session_loop.session(), action),
		}
	}
}

fn apply(session: &ConnectionSession, action: Action) -> Result<ActionOutput> {
	match action {
		// only reached from inside a running loop
		Action::Start => Ok(ActionOutput::AlreadyListening),
		Action::Connect => session.connect().map(ActionOutput::Accepted),
		Action::Disconnect => session.disconnect().map(ActionOutput::Accepted),
		Action::SendMessage { number, content } => session
			.send_message(&number, &content)
			.map(|m| ActionOutput::Entity(OutboundEntity::Text(m))),
		Action::SendImage { number, path, caption } => session.send_image(&number, path, caption).map(ActionOutput::Id),
		Action::SendAudio { number, path } => session.send_audio(&number, path).map(ActionOutput::Id),
		Action::SendLocation {
			number,
			name,
			url,
			latitude,
			longitude,
		} => session
			.send_location(&number, &name, &url, latitude, longitude)
			.map(|m| ActionOutput::Entity(OutboundEntity::Location(m))),
		Action::SendVCard { number, name, data } => session
			.send_vcard(&number, &name, &data)
			.map(|m| ActionOutput::Entity(OutboundEntity::VCard(m))),
	}
}

#[cfg(test)]
mod tests;
