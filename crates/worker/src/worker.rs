//! Queue consumers.

use std::sync::Arc;
use std::time::Duration;

use chatq_runtime::Result;
use tokio::task::JoinHandle;

use crate::action::{Action, TaskId};
use crate::dispatcher::{Dispatcher, TaskOutcome};
use crate::queue::{ResultStore, SharedReceiver, TaskState};
use crate::step::WorkerStep;

/// How long shutdown waits for the loop to observe its disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A started worker: the shared step plus `concurrency` consumers per queue.
pub struct Worker {
	step: WorkerStep,
	consumers: Vec<JoinHandle<()>>,
}

impl Worker {
	pub fn spawn(step: WorkerStep) -> Self {
		let concurrency = step.config().concurrency;
		let mut consumers = Vec::new();
		for queue in step.queue().queue_names() {
			let Some(rx) = step.queue().receiver(queue) else {
				continue;
			};
			for n in 0..concurrency {
				let dispatcher = Arc::clone(step.dispatcher());
				let results = Arc::clone(step.queue().results());
				let rx = Arc::clone(&rx);
				let queue = queue.to_string();
				consumers.push(tokio::spawn(async move {
					consume(rx, dispatcher, results).await;
					tracing::debug!(target: "chatq::worker", %queue, consumer = n, "consumer stopped");
				}));
			}
		}
		tracing::info!(target: "chatq::worker", consumers = consumers.len(), "worker started");
		Self { step, consumers }
	}

	pub fn step(&self) -> &WorkerStep {
		&self.step
	}

	pub fn submit(&self, action: Action) -> Result<TaskId> {
		self.step.queue().submit(action)
	}

	/// Waits for the final state of task `id`.
	pub async fn wait(&self, id: TaskId, timeout: Duration) -> Result<TaskState> {
		self.step.queue().results().wait(id, timeout).await
	}

	/// Runs the stop step, gives the loop a moment to exit, then stops the consumers.
	pub async fn shutdown(self) -> Result<()> {
		let stopped = self.step.stop();

		let mut listening = self.step.session_loop().subscribe_listening();
		if tokio::time::timeout(SHUTDOWN_GRACE, listening.wait_for(|l| !*l)).await.is_err() {
			tracing::warn!(target: "chatq::worker", "session loop still running, cancelling it");
		}

		for consumer in &self.consumers {
			consumer.abort();
		}
		for consumer in self.consumers {
			let _ = consumer.await;
		}
		stopped
	}
}

async fn consume(rx: SharedReceiver, dispatcher: Arc<Dispatcher>, results: Arc<ResultStore>) {
	loop {
		let task = rx.lock().await.recv().await;
		let Some(task) = task else {
			break;
		};

		let id = task.id;
		let action = task.action.name();
		let state = match dispatcher.execute(task).await {
			Ok(TaskOutcome::Completed(output)) => {
				tracing::debug!(target: "chatq::worker", task = %id, action, "task succeeded");
				TaskState::Succeeded { output }
			}
			Ok(TaskOutcome::Retried { attempt, .. }) => TaskState::Retrying { attempt },
			Err(e) => {
				tracing::warn!(target: "chatq::worker", task = %id, action, error = %e, "task failed");
				TaskState::Failed { error: e.to_string() }
			}
		};
		results.record(id, state);
	}
}
