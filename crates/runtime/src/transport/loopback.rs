//! In-process transport that answers like the remote service would.
//!
//! Logins succeed (or are rejected when configured), sent messages are
//! acked, upload requests are answered immediately, and disconnects are
//! confirmed with a `Disconnected` event. Tests and local runs inject
//! inbound traffic with [`LoopbackTransport::inject`] and read what the
//! session sent with [`LoopbackTransport::sent`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chatq_protocol::{
	AckClass, EntityId, IncomingAck, IncomingMessage, IncomingReceipt, InboundEvent, OutboundEntity, UploadResult,
};
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::mpsc;

use super::{PollOutcome, Transport};
use crate::error::{Error, Result};

const REJECT_REASON: &str = "not-authorized";

/// Behaviour knobs for [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackOptions {
	/// Answer every login with a failure followed by an authentication error.
	pub reject_auth: bool,
	/// Ack every message the session sends.
	pub ack_messages: bool,
	/// Answer upload requests with an upload result.
	pub answer_uploads: bool,
	/// Paths reported as already resident, so no upload is needed.
	pub resident_media: HashSet<PathBuf>,
	/// Host used to build upload urls.
	pub media_host: String,
}

impl Default for LoopbackOptions {
	fn default() -> Self {
		Self {
			reject_auth: false,
			ack_messages: true,
			answer_uploads: true,
			resident_media: HashSet::new(),
			media_host: "media.loopback".to_string(),
		}
	}
}

#[derive(Debug, Default)]
struct Link {
	up: bool,
	closed: bool,
	auth_error: Option<String>,
	fault: Option<String>,
}

/// Loopback implementation of [`Transport`].
pub struct LoopbackTransport {
	options: LoopbackOptions,
	inbound_tx: mpsc::UnboundedSender<InboundEvent>,
	inbound_rx: TokioMutex<mpsc::UnboundedReceiver<InboundEvent>>,
	sent: Mutex<Vec<OutboundEntity>>,
	link: Mutex<Link>,
	connect_requests: AtomicUsize,
	disconnect_requests: AtomicUsize,
}

impl LoopbackTransport {
	pub fn new(options: LoopbackOptions) -> Self {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		Self {
			options,
			inbound_tx,
			inbound_rx: TokioMutex::new(inbound_rx),
			sent: Mutex::new(Vec::new()),
			link: Mutex::new(Link::default()),
			connect_requests: AtomicUsize::new(0),
			disconnect_requests: AtomicUsize::new(0),
		}
	}

	/// Queues an inbound event for the next poll.
	pub fn inject(&self, event: InboundEvent) {
		// the receiver lives as long as self, so this cannot fail
		let _ = self.inbound_tx.send(event);
	}

	/// Simulates a text message from `from`.
	pub fn receive_message(&self, from: &str, body: &str) -> IncomingMessage {
		let message = IncomingMessage {
			id: EntityId::generate(),
			from: from.to_string(),
			body: Some(body.to_string()),
		};
		self.inject(InboundEvent::Message(message.clone()));
		message
	}

	/// Simulates a delivery receipt from `from`.
	pub fn receive_receipt(&self, from: &str) -> IncomingReceipt {
		let receipt = IncomingReceipt {
			id: EntityId::generate(),
			from: from.to_string(),
		};
		self.inject(InboundEvent::Receipt(receipt.clone()));
		receipt
	}

	/// Simulates a server ack for entity `id`.
	pub fn receive_ack(&self, id: EntityId, from: &str) -> IncomingAck {
		let ack = IncomingAck {
			id,
			from: from.to_string(),
			class: AckClass::Message,
		};
		self.inject(InboundEvent::Ack(ack.clone()));
		ack
	}

	/// Drops the simulated socket. The next poll reports [`PollOutcome::Closed`].
	pub fn close(&self) {
		let mut link = self.link.lock();
		link.up = false;
		link.closed = true;
	}

	/// Makes the next poll fail with a transport error.
	pub fn fail_next_poll(&self, message: impl Into<String>) {
		self.link.lock().fault = Some(message.into());
	}

	/// Everything the session has sent so far, oldest first.
	pub fn sent(&self) -> Vec<OutboundEntity> {
		self.sent.lock().clone()
	}

	/// Removes and returns the most recently sent entity.
	pub fn pop_sent(&self) -> Option<OutboundEntity> {
		self.sent.lock().pop()
	}

	pub fn clear_sent(&self) {
		self.sent.lock().clear();
	}

	pub fn connect_requests(&self) -> usize {
		self.connect_requests.load(Ordering::SeqCst)
	}

	pub fn disconnect_requests(&self) -> usize {
		self.disconnect_requests.load(Ordering::SeqCst)
	}

	pub fn is_link_up(&self) -> bool {
		self.link.lock().up
	}

	fn upload_result(&self, id: &EntityId, path: &Path, kind: &str) -> UploadResult {
		UploadResult {
			request_id: id.clone(),
			duplicate: self.options.resident_media.contains(path),
			url: format!("https://{}/{}/{}", self.options.media_host, kind, id),
			ip: Some("127.0.0.1".to_string()),
			resume_offset: 0,
		}
	}
}

impl Default for LoopbackTransport {
	fn default() -> Self {
		Self::new(LoopbackOptions::default())
	}
}

#[async_trait]
impl Transport for LoopbackTransport {
	fn connect(&self) -> Result<()> {
		self.connect_requests.fetch_add(1, Ordering::SeqCst);
		let mut link = self.link.lock();
		link.closed = false;
		if self.options.reject_auth {
			link.up = false;
			link.auth_error = Some(REJECT_REASON.to_string());
			self.inject(InboundEvent::Failure {
				reason: REJECT_REASON.to_string(),
			});
		} else {
			link.up = true;
			self.inject(InboundEvent::Success);
		}
		tracing::debug!(target: "chatq::loopback", reject = self.options.reject_auth, "connect requested");
		Ok(())
	}

	fn disconnect(&self) -> Result<()> {
		self.disconnect_requests.fetch_add(1, Ordering::SeqCst);
		self.link.lock().up = false;
		self.inject(InboundEvent::Disconnected {
			reason: Some("Connection closed".to_string()),
		});
		tracing::debug!(target: "chatq::loopback", "disconnect requested");
		Ok(())
	}

	fn send(&self, entity: OutboundEntity) -> Result<()> {
		tracing::debug!(target: "chatq::loopback", id = %entity.id(), kind = entity.kind(), "entity sent");
		match &entity {
			OutboundEntity::UploadRequest(request) if self.options.answer_uploads => {
				let result = self.upload_result(&request.id, &request.path, request.kind.as_str());
				self.inject(InboundEvent::UploadResult(result));
			}
			other if other.is_message() && self.options.ack_messages && self.is_link_up() => {
				self.inject(InboundEvent::Ack(IncomingAck {
					id: other.id().clone(),
					from: other.to().unwrap_or_default().to_string(),
					class: AckClass::Message,
				}));
			}
			_ => {}
		}
		self.sent.lock().push(entity);
		Ok(())
	}

	async fn poll(&self, timeout: Duration) -> Result<PollOutcome> {
		{
			let mut link = self.link.lock();
			if let Some(fault) = link.fault.take() {
				return Err(Error::Transport(fault));
			}
			if link.closed {
				return Ok(PollOutcome::Closed);
			}
		}

		let mut rx = self.inbound_rx.lock().await;
		let mut events = Vec::new();
		while let Ok(event) = rx.try_recv() {
			events.push(event);
		}

		if events.is_empty() {
			if let Some(reason) = self.link.lock().auth_error.take() {
				return Err(Error::Authentication(reason));
			}

			match tokio::time::timeout(timeout, rx.recv()).await {
				Ok(Some(event)) => {
					events.push(event);
					while let Ok(event) = rx.try_recv() {
						events.push(event);
					}
				}
				Ok(None) => return Ok(PollOutcome::Closed),
				Err(_) => {}
			}
		}

		Ok(PollOutcome::Events(events))
	}
}
