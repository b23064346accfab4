//! Per-task result tracking.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chatq_runtime::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::action::{ActionOutput, TaskId};

/// Lifecycle of a task as seen by whoever submitted it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
	Pending,
	/// Waiting for the session loop; `attempt` retries so far.
	Retrying { attempt: u32 },
	Succeeded { output: ActionOutput },
	Failed { error: String },
}

impl TaskState {
	pub fn is_final(&self) -> bool {
		matches!(self, TaskState::Succeeded { .. } | TaskState::Failed { .. })
	}
}

/// Final states kept for tasks nobody waits on, such as loop starts.
pub const DEFAULT_FINISHED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Entries {
	states: HashMap<TaskId, TaskState>,
	finished: VecDeque<TaskId>,
}

pub struct ResultStore {
	entries: Mutex<Entries>,
	changed: Notify,
	finished_capacity: usize,
}

impl Default for ResultStore {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_FINISHED_CAPACITY)
	}
}

impl ResultStore {
	/// Store that keeps at most `finished_capacity` final states, evicting the oldest.
	pub fn with_capacity(finished_capacity: usize) -> Self {
		Self {
			entries: Mutex::new(Entries::default()),
			changed: Notify::new(),
			finished_capacity,
		}
	}

	pub fn record(&self, id: TaskId, state: TaskState) {
		{
			let mut entries = self.entries.lock();
			let is_final = state.is_final();
			entries.states.insert(id, state);
			if is_final {
				entries.finished.push_back(id);
				while entries.finished.len() > self.finished_capacity {
					let Some(oldest) = entries.finished.pop_front() else {
						break;
					};
					if entries.states.get(&oldest).is_some_and(TaskState::is_final) {
						entries.states.remove(&oldest);
					}
				}
			}
		}
		self.changed.notify_waiters();
	}

	pub fn get(&self, id: TaskId) -> Option<TaskState> {
		self.entries.lock().states.get(&id).cloned()
	}

	/// Number of tasks currently tracked.
	pub fn len(&self) -> usize {
		self.entries.lock().states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn take_final(&self, id: TaskId) -> Option<TaskState> {
		let mut entries = self.entries.lock();
		if !entries.states.get(&id).is_some_and(TaskState::is_final) {
			return None;
		}
		entries.finished.retain(|finished| *finished != id);
		entries.states.remove(&id)
	}

	/// Waits until task `id` succeeds or fails and removes it from the store.
	///
	/// Only one caller should wait on a given task.
	///
	/// # Errors
	///
	/// Returns [`Error::Timeout`] if the task is not final within `timeout`.
	pub async fn wait(&self, id: TaskId, timeout: Duration) -> Result<TaskState> {
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let notified = self.changed.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(state) = self.take_final(id) {
				return Ok(state);
			}

			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			if remaining.is_zero() {
				return Err(Error::Timeout(format!("{id} did not finish within {timeout:?}")));
			}

			tokio::select! {
				_ = notified => {}
				_ = tokio::time::sleep(remaining) => {}
			}
		}
	}
}
