//! Command implementations for the `chatq` binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatq_runtime::{LoopbackTransport, LoopbackUploader, MediaEvent};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::action::{Action, TaskId};
use crate::cli::{Cli, Commands, WorkerArgs};
use crate::config::WorkerConfig;
use crate::queue::TaskState;
use crate::step::WorkerStep;
use crate::worker::Worker;

/// One line of worker output.
#[derive(Debug, Serialize)]
struct TaskReport {
	task: TaskId,
	#[serde(flatten)]
	state: TaskState,
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	match cli.command {
		Commands::Worker(args) => run_worker(args).await,
	}
}

pub async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
	let mut config = match &args.worker_config {
		Some(path) => WorkerConfig::load(path)?,
		None => WorkerConfig::default(),
	};
	args.apply_to(&mut config);

	let transport = Arc::new(LoopbackTransport::default());
	let step = WorkerStep::start(&args.start_options(), config, transport, Arc::new(LoopbackUploader))?;
	tokio::spawn(log_media_events(step.session().subscribe_media()));

	let worker = Arc::new(Worker::spawn(step));
	let result_timeout = Duration::from_secs(args.result_timeout);
	let mut reporters = JoinSet::new();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	loop {
		let line = tokio::select! {
			line = lines.next_line() => line.context("failed to read tasks from stdin")?,
			_ = tokio::signal::ctrl_c() => {
				tracing::info!(target: "chatq::worker", "interrupted");
				break;
			}
		};
		let Some(line) = line else {
			break;
		};
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		let action: Action = match serde_json::from_str(line) {
			Ok(action) => action,
			Err(e) => {
				tracing::error!(target: "chatq::worker", error = %e, %line, "ignoring malformed task");
				continue;
			}
		};
		let id = worker.submit(action)?;
		let worker = Arc::clone(&worker);
		reporters.spawn(async move {
			let state = worker.wait(id, result_timeout).await.unwrap_or_else(|e| TaskState::Failed { error: e.to_string() });
			report(id, state);
		});
	}

	while reporters.join_next().await.is_some() {}

	let worker = Arc::into_inner(worker).context("worker still shared at shutdown")?;
	worker.shutdown().await?;
	Ok(())
}

fn report(task: TaskId, state: TaskState) {
	match serde_json::to_string(&TaskReport { task, state }) {
		Ok(line) => println!("{line}"),
		Err(e) => tracing::error!(target: "chatq::worker", task = %task, error = %e, "failed to encode result"),
	}
}

async fn log_media_events(mut events: broadcast::Receiver<MediaEvent>) {
	loop {
		match events.recv().await {
			Ok(MediaEvent::Progress { request_id, percent, .. }) => {
				tracing::debug!(target: "chatq::media", id = %request_id, percent, "progress");
			}
			Ok(MediaEvent::Sent { request_id, message }) => {
				tracing::info!(target: "chatq::media", id = %request_id, to = %message.to, "media delivered");
			}
			Ok(MediaEvent::UploadFailed { request_id, reason, .. }) => {
				tracing::warn!(target: "chatq::media", id = %request_id, %reason, "media failed");
			}
			Err(broadcast::error::RecvError::Lagged(n)) => {
				tracing::warn!(target: "chatq::media", skipped = n, "media events dropped");
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}
