//! Connection state machine.
//!
//! [`ConnectionSession`] tracks whether the remote service has accepted the
//! login and guards every mutating operation on that state. It never drives
//! I/O itself: requests go down through the [`Transport`] and their outcome
//! comes back as [`InboundEvent`]s handed to [`ConnectionSession::handle_event`]
//! by the session loop.
//!
//! The `connected` flag can be read and watched from anywhere but is only
//! written here, in response to `Success`, `Failure` and `Disconnected`.

mod media;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chatq_protocol::{
	EntityId, InboundEvent, LocationMessage, MediaKind, OutboundEntity, TextMessage, UploadRequest, VCardMessage,
	normalize_address,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::{Error, Result};
use crate::extension::SessionExtension;
use crate::transport::Transport;
use crate::upload::{MediaEvent, MediaUploader};

const MEDIA_CHANNEL_CAPACITY: usize = 256;

/// Media send waiting for its upload result.
#[derive(Debug, Clone)]
struct PendingMedia {
	kind: MediaKind,
	jid: String,
	path: PathBuf,
	caption: Option<String>,
}

/// Session with the remote messaging service.
pub struct ConnectionSession {
	own_jid: String,
	connected: watch::Sender<bool>,
	transport: Arc<dyn Transport>,
	uploader: Arc<dyn MediaUploader>,
	pending_media: Mutex<HashMap<EntityId, PendingMedia>>,
	media_tx: broadcast::Sender<MediaEvent>,
	extensions: Vec<Arc<dyn SessionExtension>>,
}

impl ConnectionSession {
	/// Creates a disconnected session for the account `own_jid`.
	pub fn new(own_jid: impl Into<String>, transport: Arc<dyn Transport>, uploader: Arc<dyn MediaUploader>) -> Self {
		let (connected, _) = watch::channel(false);
		let (media_tx, _) = broadcast::channel(MEDIA_CHANNEL_CAPACITY);
		Self {
			own_jid: own_jid.into(),
			connected,
			transport,
			uploader,
			pending_media: Mutex::new(HashMap::new()),
			media_tx,
			extensions: Vec::new(),
		}
	}

	pub fn with_extensions(mut self, extensions: Vec<Arc<dyn SessionExtension>>) -> Self {
		self.extensions = extensions;
		self
	}

	pub fn own_jid(&self) -> &str {
		&self.own_jid
	}

	pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
		&self.transport
	}

	pub fn extensions(&self) -> &[Arc<dyn SessionExtension>] {
		&self.extensions
	}

	pub fn is_connected(&self) -> bool {
		*self.connected.borrow()
	}

	/// Receiver that observes every change of the `connected` flag.
	pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
		self.connected.subscribe()
	}

	/// Waits until `connected` equals `state`.
	///
	/// # Errors
	///
	/// Returns [`Error::Timeout`] if the state is not reached within `timeout`.
	pub async fn wait_connected(&self, state: bool, timeout: Duration) -> Result<()> {
		let mut rx = self.connected.subscribe();
		match tokio::time::timeout(timeout, rx.wait_for(|c| *c == state)).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout(format!("connected={state} not reached within {timeout:?}"))),
		}
	}

	/// Receiver for upload progress, completed media sends and upload failures.
	pub fn subscribe_media(&self) -> broadcast::Receiver<MediaEvent> {
		self.media_tx.subscribe()
	}

	/// Number of media sends still waiting for an upload result.
	pub fn pending_media(&self) -> usize {
		self.pending_media.lock().len()
	}

	/// Issues a login request.
	///
	/// Returns `false` without any I/O if already connected. The outcome of
	/// the login arrives later as a `Success` or `Failure` event.
	pub fn connect(&self) -> Result<bool> {
		if self.is_connected() {
			tracing::warn!(target: "chatq::session", "Already connected, disconnect first");
			return Ok(false);
		}
		self.transport.connect()?;
		tracing::debug!(target: "chatq::session", "connect requested");
		Ok(true)
	}

	/// Broadcasts a disconnect request.
	///
	/// `connected` flips on the `Disconnected` event that follows, not here.
	pub fn disconnect(&self) -> Result<bool> {
		self.require_connected("disconnect")?;
		self.transport.disconnect()?;
		tracing::debug!(target: "chatq::session", "disconnect requested");
		Ok(true)
	}

	pub fn send_message(&self, number: &str, content: &str) -> Result<TextMessage> {
		self.require_connected("send_message")?;
		let message = TextMessage {
			id: EntityId::generate(),
			to: normalize_address(number),
			body: content.to_string(),
		};
		self.emit(OutboundEntity::Text(message.clone()))?;
		Ok(message)
	}

	/// Requests an image upload. Returns the upload request id; the image
	/// message itself is reported on the media channel once sent.
	pub fn send_image(&self, number: &str, path: impl Into<PathBuf>, caption: Option<String>) -> Result<EntityId> {
		self.require_connected("send_image")?;
		self.request_upload(MediaKind::Image, number, path.into(), caption)
	}

	/// Requests an audio upload. See [`ConnectionSession::send_image`].
	pub fn send_audio(&self, number: &str, path: impl Into<PathBuf>) -> Result<EntityId> {
		self.require_connected("send_audio")?;
		self.request_upload(MediaKind::Audio, number, path.into(), None)
	}

	pub fn send_location(
		&self,
		number: &str,
		name: &str,
		url: &str,
		latitude: f64,
		longitude: f64,
	) -> Result<LocationMessage> {
		self.require_connected("send_location")?;
		let message = LocationMessage {
			id: EntityId::generate(),
			to: normalize_address(number),
			name: name.to_string(),
			url: url.to_string(),
			latitude,
			longitude,
		};
		self.emit(OutboundEntity::Location(message.clone()))?;
		Ok(message)
	}

	pub fn send_vcard(&self, number: &str, name: &str, data: &str) -> Result<VCardMessage> {
		self.require_connected("send_vcard")?;
		let message = VCardMessage {
			id: EntityId::generate(),
			to: normalize_address(number),
			name: name.to_string(),
			data: data.to_string(),
		};
		self.emit(OutboundEntity::VCard(message.clone()))?;
		Ok(message)
	}

	/// Applies one inbound event.
	///
	/// Only `Success`, `Failure` and `Disconnected` change `connected`.
	/// Messages and receipts are acked; acks are logged. Upload results
	/// continue pending media sends.
	///
	/// # Errors
	///
	/// [`Error::ConnectionRequired`] for a message, receipt or ack arriving
	/// while disconnected; transport errors from sending the reply ack.
	pub fn handle_event(self: &Arc<Self>, event: InboundEvent) -> Result<()> {
		for ext in &self.extensions {
			ext.on_inbound(&event);
		}

		match event {
			InboundEvent::Success => {
				self.connected.send_replace(true);
				tracing::info!(target: "chatq::session", jid = %self.own_jid, "Logged in");
			}
			InboundEvent::Failure { reason } => {
				self.connected.send_replace(false);
				tracing::error!(target: "chatq::session", %reason, "Login Failed");
			}
			InboundEvent::Disconnected { reason } => {
				self.connected.send_replace(false);
				tracing::info!(target: "chatq::session", reason = reason.as_deref().unwrap_or("unknown"), "Disconnected");
			}
			InboundEvent::Message(message) => {
				self.require_connected("on_message")?;
				tracing::debug!(target: "chatq::session", id = %message.id, from = %message.from, "message received");
				self.emit(OutboundEntity::Ack(message.ack()))?;
			}
			InboundEvent::Receipt(receipt) => {
				self.require_connected("on_receipt")?;
				tracing::debug!(target: "chatq::session", id = %receipt.id, from = %receipt.from, "receipt received");
				self.emit(OutboundEntity::Ack(receipt.ack()))?;
			}
			InboundEvent::Ack(ack) => {
				self.require_connected("on_ack")?;
				tracing::debug!(target: "chatq::session", id = %ack.id, class = ?ack.class, "ack received");
			}
			InboundEvent::UploadResult(result) => self.on_upload_result(result),
			InboundEvent::UploadError { request_id, reason } => self.on_upload_error(request_id, reason),
		}
		Ok(())
	}

	fn require_connected(&self, operation: &'static str) -> Result<()> {
		if self.is_connected() {
			Ok(())
		} else {
			Err(Error::ConnectionRequired { operation })
		}
	}

	fn request_upload(&self, kind: MediaKind, number: &str, path: PathBuf, caption: Option<String>) -> Result<EntityId> {
		let request = UploadRequest {
			id: EntityId::generate(),
			kind,
			path: path.clone(),
		};
		let id = request.id.clone();
		self.pending_media.lock().insert(
			id.clone(),
			PendingMedia {
				kind,
				jid: normalize_address(number),
				path,
				caption,
			},
		);

		if let Err(e) = self.emit(OutboundEntity::UploadRequest(request)) {
			self.pending_media.lock().remove(&id);
			return Err(e);
		}
		tracing::debug!(target: "chatq::media", id = %id, %kind, "upload requested");
		Ok(id)
	}

	fn emit(&self, entity: OutboundEntity) -> Result<()> {
		for ext in &self.extensions {
			ext.on_outbound(&entity);
		}
		self.transport.send(entity)
	}
}
