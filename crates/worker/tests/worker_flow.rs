use std::sync::Arc;
use std::time::Duration;

use chatq_protocol::OutboundEntity;
use chatq_runtime::{Error, LoopExit, LoopbackTransport, LoopbackUploader};
use chatq_worker::{Action, ActionOutput, StartOptions, TaskState, Worker, WorkerConfig, WorkerStep};

const WAIT: Duration = Duration::from_secs(30);

fn login() -> StartOptions {
	StartOptions {
		login: Some("34123456789:c2VjcmV0".to_string()),
		..Default::default()
	}
}

fn start(config: WorkerConfig) -> (Worker, Arc<LoopbackTransport>) {
	let transport = Arc::new(LoopbackTransport::default());
	let step = WorkerStep::start(&login(), config, transport.clone(), Arc::new(LoopbackUploader)).unwrap();
	(Worker::spawn(step), transport)
}

async fn wait_not_listening(worker: &Worker) {
	let mut listening = worker.step().session_loop().subscribe_listening();
	tokio::time::timeout(WAIT, listening.wait_for(|l| !*l)).await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect_send_disconnect_through_the_queue() {
	let (worker, transport) = start(WorkerConfig::default());

	// nothing is listening yet: the task starts the loop and retries itself
	let connect = worker.submit(Action::Connect).unwrap();
	let state = worker.wait(connect, WAIT).await.unwrap();
	assert_eq!(
		state,
		TaskState::Succeeded {
			output: ActionOutput::Accepted(true)
		}
	);
	assert!(worker.step().session_loop().is_listening());
	worker.step().session().wait_connected(true, WAIT).await.unwrap();
	assert_eq!(transport.connect_requests(), 1);

	let send = worker
		.submit(Action::SendMessage {
			number: "341234567".to_string(),
			content: "hello".to_string(),
		})
		.unwrap();
	match worker.wait(send, WAIT).await.unwrap() {
		TaskState::Succeeded {
			output: ActionOutput::Entity(OutboundEntity::Text(message)),
		} => assert_eq!(message.to, "341234567@s.whatsapp.net"),
		other => panic!("Expected sent text, got {other:?}"),
	}

	let disconnect = worker.submit(Action::Disconnect).unwrap();
	assert_eq!(
		worker.wait(disconnect, WAIT).await.unwrap(),
		TaskState::Succeeded {
			output: ActionOutput::Accepted(true)
		}
	);
	wait_not_listening(&worker).await;
	assert!(!worker.step().session().is_connected());

	worker.shutdown().await.unwrap();
	assert_eq!(transport.disconnect_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_start_reports_loop_exit() {
	let config = WorkerConfig {
		loop_timeout_secs: 1,
		..Default::default()
	};
	let (worker, _transport) = start(config);

	let id = worker.submit(Action::Start).unwrap();
	assert_eq!(
		worker.wait(id, WAIT).await.unwrap(),
		TaskState::Succeeded {
			output: ActionOutput::LoopFinished(LoopExit::Timeout)
		}
	);
	worker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn guarded_action_fails_without_retry_when_disconnected() {
	let (worker, transport) = start(WorkerConfig::default());
	worker.submit(Action::Start).unwrap();
	worker
		.step()
		.session_loop()
		.wait_until_listening(WAIT)
		.await
		.unwrap();

	let id = worker
		.submit(Action::SendLocation {
			number: "341234567".to_string(),
			name: "office".to_string(),
			url: "https://maps".to_string(),
			latitude: 40.4,
			longitude: -3.7,
		})
		.unwrap();

	match worker.wait(id, WAIT).await.unwrap() {
		TaskState::Failed { error } => assert_eq!(error, "send_location needs to be connected"),
		other => panic!("Expected failure, got {other:?}"),
	}
	assert!(transport.sent().is_empty());
	worker.shutdown().await.unwrap();
}

#[test]
fn startup_needs_a_credentials_source() {
	let transport = Arc::new(LoopbackTransport::default());
	let err = match WorkerStep::start(&StartOptions::default(), WorkerConfig::default(), transport, Arc::new(LoopbackUploader)) {
		Err(err) => err,
		Ok(_) => panic!("Expected configuration error"),
	};
	assert!(matches!(&err, Error::Configuration(msg) if msg == "You must specify a configuration method"));
}

#[test]
fn startup_rejects_unknown_extension() {
	let config = WorkerConfig {
		extensions: vec!["stats".to_string(), "store".to_string()],
		..Default::default()
	};
	let transport = Arc::new(LoopbackTransport::default());
	let err = match WorkerStep::start(&login(), config, transport, Arc::new(LoopbackUploader)) {
		Err(err) => err,
		Ok(_) => panic!("Expected lookup error"),
	};
	assert!(matches!(&err, Error::Lookup(name) if name == "store"));
}

#[test]
fn stop_only_disconnects_a_connected_session() {
	let transport = Arc::new(LoopbackTransport::default());
	let config = WorkerConfig {
		extensions: vec!["stats".to_string()],
		..Default::default()
	};
	let step = WorkerStep::start(&login(), config, transport.clone(), Arc::new(LoopbackUploader)).unwrap();

	step.stop().unwrap();
	assert_eq!(transport.disconnect_requests(), 0);
	assert_eq!(step.session().own_jid(), "34123456789@s.whatsapp.net");
	assert!(step.encryption());
	assert_eq!(step.session().extensions().len(), 1);
}
