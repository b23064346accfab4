//! In-process task queue.
//!
//! Stands in for the external broker: named queues backed by unbounded
//! MPSC channels, delayed delivery through a software timer and a result
//! store keyed by task id. Consumers of a queue share its receiver.

mod results;

pub use results::{ResultStore, TaskState};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatq_runtime::{Error, Result};
use tokio::sync::{Mutex as TokioMutex, mpsc};

use crate::action::{Action, TaskEnvelope, TaskId};
use crate::dispatcher::Scheduler;

/// Receiver half of a queue, shared by all of its consumers.
pub type SharedReceiver = Arc<TokioMutex<mpsc::UnboundedReceiver<TaskEnvelope>>>;

struct Channel {
	tx: mpsc::UnboundedSender<TaskEnvelope>,
	rx: SharedReceiver,
}

pub struct TaskQueue {
	default_queue: String,
	channels: HashMap<String, Channel>,
	results: Arc<ResultStore>,
}

impl TaskQueue {
	/// Creates one channel per name. The first name is the default queue.
	///
	/// # Errors
	///
	/// Returns [`Error::Configuration`] if `names` is empty.
	pub fn new(names: &[String]) -> Result<Self> {
		let default_queue = names
			.first()
			.cloned()
			.ok_or_else(|| Error::Configuration("at least one queue is required".to_string()))?;
		let channels = names
			.iter()
			.map(|name| {
				let (tx, rx) = mpsc::unbounded_channel();
				(
					name.clone(),
					Channel {
						tx,
						rx: Arc::new(TokioMutex::new(rx)),
					},
				)
			})
			.collect();
		Ok(Self {
			default_queue,
			channels,
			results: Arc::new(ResultStore::default()),
		})
	}

	pub fn default_queue(&self) -> &str {
		&self.default_queue
	}

	pub fn queue_names(&self) -> impl Iterator<Item = &str> {
		self.channels.keys().map(String::as_str)
	}

	pub fn results(&self) -> &Arc<ResultStore> {
		&self.results
	}

	pub fn receiver(&self, queue: &str) -> Option<SharedReceiver> {
		self.channels.get(queue).map(|c| Arc::clone(&c.rx))
	}

	/// Enqueues `action` on the default queue.
	pub fn submit(&self, action: Action) -> Result<TaskId> {
		let queue = self.default_queue.clone();
		self.submit_to(&queue, action)
	}

	pub fn submit_to(&self, queue: &str, action: Action) -> Result<TaskId> {
		let task = TaskEnvelope::new(action, queue);
		let id = task.id;
		self.schedule(task, Duration::ZERO)?;
		Ok(id)
	}

	fn sender(&self, queue: &str) -> Result<&mpsc::UnboundedSender<TaskEnvelope>> {
		self.channels
			.get(queue)
			.map(|c| &c.tx)
			.ok_or_else(|| Error::Configuration(format!("unknown queue '{queue}'")))
	}
}

impl Scheduler for TaskQueue {
	fn schedule(&self, task: TaskEnvelope, countdown: Duration) -> Result<()> {
		let tx = self.sender(&task.queue)?.clone();
		if task.retries == 0 {
			self.results.record(task.id, TaskState::Pending);
		}

		if countdown.is_zero() {
			return tx.send(task).map_err(|_| Error::ChannelClosed);
		}

		tokio::spawn(async move {
			tokio::time::sleep(countdown).await;
			if let Err(e) = tx.send(task) {
				tracing::warn!(target: "chatq::queue", task = %e.0.id, "queue closed before delayed delivery");
			}
		});
		Ok(())
	}
}

#[cfg(test)]
mod tests;
