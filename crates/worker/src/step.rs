//! Worker start and stop steps.

use std::path::PathBuf;
use std::sync::Arc;

use chatq_runtime::{ConnectionSession, MediaUploader, Result, SessionLoop, Transport, resolve_extensions};

use crate::config::{Credentials, WorkerConfig, resolve_credentials};
use crate::dispatcher::Dispatcher;
use crate::queue::TaskQueue;

/// Credentials sources and switches given on the command line.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
	pub login: Option<String>,
	pub config: Option<PathBuf>,
	pub unmoxie: bool,
}

/// Everything a running worker shares between its consumers.
pub struct WorkerStep {
	credentials: Credentials,
	config: WorkerConfig,
	encryption: bool,
	session_loop: Arc<SessionLoop>,
	queue: Arc<TaskQueue>,
	dispatcher: Arc<Dispatcher>,
}

impl WorkerStep {
	/// Resolves credentials and extensions, then wires the session, loop,
	/// queue and dispatcher on top of `transport`.
	///
	/// # Errors
	///
	/// [`chatq_runtime::Error::Configuration`] for missing, ambiguous or invalid
	/// credentials, [`chatq_runtime::Error::Lookup`] for an unknown extension.
	pub fn start(
		options: &StartOptions,
		config: WorkerConfig,
		transport: Arc<dyn Transport>,
		uploader: Arc<dyn MediaUploader>,
	) -> Result<Self> {
		config.validate()?;
		let credentials = resolve_credentials(
			options.login.as_deref(),
			options.config.as_deref(),
			config.credentials_file.as_deref(),
		)?;
		let extensions = resolve_extensions(&config.extensions)?;
		let encryption = config.encryption && !options.unmoxie;

		let session = Arc::new(ConnectionSession::new(credentials.jid(), transport, uploader).with_extensions(extensions));
		let session_loop = Arc::new(SessionLoop::new(session).with_detached_delay(config.detached_delay()));
		let queue = Arc::new(TaskQueue::new(&config.queues)?);
		let dispatcher = Arc::new(
			Dispatcher::new(Arc::clone(&session_loop), queue.clone(), queue.default_queue())
				.with_retry_policy(config.retry_policy())
				.with_loop_options(config.loop_options()),
		);

		tracing::info!(target: "chatq::worker", encryption, queues = ?config.queues, "initialized for {}", credentials.phone);
		Ok(Self {
			credentials,
			config,
			encryption,
			session_loop,
			queue,
			dispatcher,
		})
	}

	/// Disconnects the session if it is connected.
	pub fn stop(&self) -> Result<()> {
		tracing::info!(target: "chatq::worker", "stopping");
		let session = self.session_loop.session();
		for ext in session.extensions() {
			if let Some(summary) = ext.summary() {
				tracing::info!(target: "chatq::worker", extension = ext.name(), "{summary}");
			}
		}
		if session.is_connected() {
			session.disconnect()?;
			tracing::info!(target: "chatq::worker", "disconnect requested");
		}
		Ok(())
	}

	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	pub fn config(&self) -> &WorkerConfig {
		&self.config
	}

	pub fn encryption(&self) -> bool {
		self.encryption
	}

	pub fn session_loop(&self) -> &Arc<SessionLoop> {
		&self.session_loop
	}

	pub fn session(&self) -> &Arc<ConnectionSession> {
		self.session_loop.session()
	}

	pub fn queue(&self) -> &Arc<TaskQueue> {
		&self.queue
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}
}
