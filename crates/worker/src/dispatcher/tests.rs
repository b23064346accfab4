use std::sync::Arc;
use std::time::Duration;

use chatq_runtime::{LoopExit, LoopbackTransport, LoopbackUploader, Transport};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::*;

#[derive(Default)]
struct RecordingScheduler {
	scheduled: Mutex<Vec<(TaskEnvelope, Duration)>>,
}

impl RecordingScheduler {
	fn take(&self) -> Vec<(TaskEnvelope, Duration)> {
		std::mem::take(&mut *self.scheduled.lock())
	}
}

impl Scheduler for RecordingScheduler {
	fn schedule(&self, task: TaskEnvelope, countdown: Duration) -> Result<()> {
		self.scheduled.lock().push((task, countdown));
		Ok(())
	}
}

struct Harness {
	dispatcher: Dispatcher,
	scheduler: Arc<RecordingScheduler>,
	session_loop: Arc<SessionLoop>,
	transport: Arc<LoopbackTransport>,
}

fn harness(mode: DispatchMode) -> Harness {
	let transport = Arc::new(LoopbackTransport::default());
	let dyn_transport: Arc<dyn Transport> = transport.clone();
	let session = Arc::new(ConnectionSession::new("34999@s.whatsapp.net", dyn_transport, Arc::new(LoopbackUploader)));
	let session_loop = Arc::new(SessionLoop::new(session));
	let scheduler = Arc::new(RecordingScheduler::default());
	let dispatcher = Dispatcher::new(Arc::clone(&session_loop), scheduler.clone(), "default")
		.with_mode(mode)
		.with_loop_options(LoopOptions {
			timeout: Duration::from_millis(100),
			auto_connect: false,
		});
	Harness {
		dispatcher,
		scheduler,
		session_loop,
		transport,
	}
}

async fn spawn_loop(h: &Harness) -> JoinHandle<Result<LoopExit>> {
	let lp = Arc::clone(&h.session_loop);
	let handle = tokio::spawn(async move {
		lp.run(LoopOptions {
			timeout: Duration::from_secs(60),
			auto_connect: false,
		})
		.await
	});
	h.session_loop.wait_until_listening(Duration::from_secs(1)).await.unwrap();
	handle
}

fn send_message() -> Action {
	Action::SendMessage {
		number: "341234567".to_string(),
		content: "hello".to_string(),
	}
}

#[tokio::test(start_paused = true)]
async fn idle_loop_triggers_one_start_and_one_retry() {
	let h = harness(DispatchMode::OnLoop);
	let task = TaskEnvelope::new(send_message(), "q1");
	let id = task.id;

	let outcome = h.dispatcher.execute(task).await.unwrap();

	assert_eq!(
		outcome,
		TaskOutcome::Retried {
			attempt: 1,
			countdown: DEFAULT_RETRY_DELAY
		}
	);
	let scheduled = h.scheduler.take();
	assert_eq!(scheduled.len(), 2);

	let (start, start_countdown) = &scheduled[0];
	assert_eq!(start.action, Action::Start);
	assert_eq!(start.queue, "default");
	assert_eq!(*start_countdown, Duration::ZERO);

	let (retry, retry_countdown) = &scheduled[1];
	assert_eq!(retry.id, id);
	assert_eq!(retry.queue, "q1");
	assert_eq!(retry.retries, 1);
	assert_eq!(*retry_countdown, Duration::from_millis(500));
	assert!(h.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_starts_the_loop_on_its_own_queue() {
	let h = harness(DispatchMode::OnLoop);

	h.dispatcher.execute(TaskEnvelope::new(Action::Connect, "q7")).await.unwrap();

	let scheduled = h.scheduler.take();
	assert_eq!(scheduled[0].0.action, Action::Start);
	assert_eq!(scheduled[0].0.queue, "q7");
	assert_eq!(h.transport.connect_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
	let h = harness(DispatchMode::OnLoop);
	let mut task = TaskEnvelope::new(Action::Disconnect, "default");
	task.retries = DEFAULT_MAX_RETRIES;

	let err = h.dispatcher.execute(task).await.unwrap_err();

	assert!(matches!(
		err,
		Error::RetriesExhausted {
			action: "disconnect",
			attempts: 3
		}
	));
	assert!(h.scheduler.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn listening_loop_runs_actions_without_new_start() {
	let h = harness(DispatchMode::OnLoop);
	let handle = spawn_loop(&h).await;

	let outcome = h.dispatcher.execute(TaskEnvelope::new(Action::Connect, "default")).await.unwrap();
	assert_eq!(outcome, TaskOutcome::Completed(ActionOutput::Accepted(true)));
	h.session_loop
		.session()
		.wait_connected(true, Duration::from_secs(5))
		.await
		.unwrap();

	match h.dispatcher.execute(TaskEnvelope::new(send_message(), "default")).await.unwrap() {
		TaskOutcome::Completed(ActionOutput::Entity(OutboundEntity::Text(m))) => {
			assert_eq!(m.to, "341234567@s.whatsapp.net");
			assert_eq!(m.body, "hello");
		}
		other => panic!("Expected text entity, got {other:?}"),
	}

	let outcome = h
		.dispatcher
		.execute(TaskEnvelope::new(
			Action::SendImage {
				number: "341234567".to_string(),
				path: "/tmp/cat.jpg".into(),
				caption: None,
			},
			"default",
		))
		.await
		.unwrap();
	assert!(matches!(outcome, TaskOutcome::Completed(ActionOutput::Id(_))));

	assert!(h.scheduler.take().is_empty());
	h.dispatcher.execute(TaskEnvelope::new(Action::Disconnect, "default")).await.unwrap();
	assert_eq!(handle.await.unwrap().unwrap(), LoopExit::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connection_required_is_not_retried() {
	let h = harness(DispatchMode::OnLoop);
	let handle = spawn_loop(&h).await;

	let err = h.dispatcher.execute(TaskEnvelope::new(Action::Disconnect, "default")).await.unwrap_err();

	assert!(matches!(err, Error::ConnectionRequired { operation: "disconnect" }));
	assert!(h.scheduler.take().is_empty());
	handle.abort();
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_while_listening() {
	let h = harness(DispatchMode::OnLoop);
	let handle = spawn_loop(&h).await;

	let outcome = h.dispatcher.execute(TaskEnvelope::new(Action::Start, "default")).await.unwrap();

	assert_eq!(outcome, TaskOutcome::Completed(ActionOutput::AlreadyListening));
	assert!(h.session_loop.is_listening());
	handle.abort();
}

#[tokio::test(start_paused = true)]
async fn start_runs_a_loop_invocation() {
	let h = harness(DispatchMode::OnLoop);

	let outcome = h.dispatcher.execute(TaskEnvelope::new(Action::Start, "default")).await.unwrap();

	assert_eq!(outcome, TaskOutcome::Completed(ActionOutput::LoopFinished(LoopExit::Timeout)));
	assert!(!h.session_loop.is_listening());
}

#[tokio::test(start_paused = true)]
async fn direct_mode_calls_session_from_worker_task() {
	let h = harness(DispatchMode::Direct);
	let handle = spawn_loop(&h).await;

	let outcome = h.dispatcher.execute(TaskEnvelope::new(Action::Connect, "default")).await.unwrap();

	assert_eq!(outcome, TaskOutcome::Completed(ActionOutput::Accepted(true)));
	assert_eq!(h.transport.connect_requests(), 1);
	handle.abort();
}
