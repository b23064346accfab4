use std::time::Duration;

use super::*;
use crate::action::{ActionOutput, TaskId};

fn queue(names: &[&str]) -> TaskQueue {
	let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
	TaskQueue::new(&names).unwrap()
}

#[test]
fn needs_at_least_one_queue() {
	assert!(matches!(TaskQueue::new(&[]), Err(Error::Configuration(_))));
}

#[tokio::test]
async fn submit_delivers_to_default_queue_and_marks_pending() {
	let q = queue(&["default", "media"]);
	let id = q.submit(Action::Connect).unwrap();

	let task = q.receiver("default").unwrap().lock().await.recv().await.unwrap();
	assert_eq!(task.id, id);
	assert_eq!(task.action, Action::Connect);
	assert_eq!(q.results().get(id), Some(TaskState::Pending));
}

#[tokio::test]
async fn unknown_queue_is_rejected() {
	let q = queue(&["default"]);
	let err = q.submit_to("elsewhere", Action::Start).unwrap_err();
	assert!(matches!(err, Error::Configuration(msg) if msg.contains("elsewhere")));
}

#[tokio::test(start_paused = true)]
async fn countdown_delays_delivery() {
	let q = queue(&["default"]);
	let rx = q.receiver("default").unwrap();
	let task = TaskEnvelope::new(Action::Disconnect, "default").into_retry();
	let id = task.id;

	q.schedule(task, Duration::from_millis(500)).unwrap();

	let start = tokio::time::Instant::now();
	let delivered = rx.lock().await.recv().await.unwrap();
	assert_eq!(delivered.id, id);
	assert_eq!(delivered.retries, 1);
	assert!(start.elapsed() >= Duration::from_millis(500));
	// retries keep whatever state the worker recorded
	assert_eq!(q.results().get(id), None);
}

#[tokio::test(start_paused = true)]
async fn wait_returns_once_final() {
	let q = queue(&["default"]);
	let id = q.submit(Action::Connect).unwrap();
	let results = Arc::clone(q.results());

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		results.record(id, TaskState::Retrying { attempt: 1 });
		tokio::time::sleep(Duration::from_millis(50)).await;
		results.record(
			id,
			TaskState::Succeeded {
				output: ActionOutput::Accepted(true),
			},
		);
	});

	let state = q.results().wait(id, Duration::from_secs(1)).await.unwrap();
	assert_eq!(
		state,
		TaskState::Succeeded {
			output: ActionOutput::Accepted(true)
		}
	);
	assert_eq!(q.results().get(id), None);
	assert!(q.results().is_empty());
}

#[test]
fn oldest_unclaimed_results_are_evicted() {
	let store = ResultStore::with_capacity(2);
	let ids: Vec<TaskId> = (0..3).map(|_| TaskEnvelope::new(Action::Start, "default").id).collect();
	let running = TaskEnvelope::new(Action::Connect, "default").id;

	store.record(running, TaskState::Pending);
	for id in &ids {
		store.record(*id, TaskState::Pending);
		store.record(
			*id,
			TaskState::Succeeded {
				output: ActionOutput::AlreadyListening,
			},
		);
	}

	assert_eq!(store.get(ids[0]), None);
	assert!(store.get(ids[1]).is_some());
	assert!(store.get(ids[2]).is_some());
	assert_eq!(store.get(running), Some(TaskState::Pending));
	assert_eq!(store.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_on_unfinished_task() {
	let q = queue(&["default"]);
	let id = q.submit(Action::Connect).unwrap();

	let err = q.results().wait(id, Duration::from_millis(100)).await.unwrap_err();
	assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn task_state_serializes_with_state_tag() {
	let json = serde_json::to_value(TaskState::Failed {
		error: "boom".to_string(),
	})
	.unwrap();
	assert_eq!(json, serde_json::json!({"state": "failed", "error": "boom"}));
}
