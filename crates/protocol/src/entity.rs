//! Outbound protocol entities.
//!
//! Every entity the session emits carries an [`EntityId`]. Ids follow the
//! `<unix seconds>-<sequence>` shape used by the remote service, so an ack
//! arriving later can be correlated with the entity that caused it.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identifier of a protocol entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
	/// Generates a fresh, process-unique id.
	pub fn generate() -> Self {
		let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
		let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
		Self(format!("{secs}-{seq}"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for EntityId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for EntityId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Kind of media carried by an upload request and the message that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
	Image,
	Audio,
}

impl MediaKind {
	pub fn as_str(self) -> &'static str {
		match self {
			MediaKind::Image => "image",
			MediaKind::Audio => "audio",
		}
	}
}

impl fmt::Display for MediaKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Plain text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
	pub id: EntityId,
	/// Normalized destination address.
	pub to: String,
	pub body: String,
}

/// Media message sent once the media is resident on the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMessage {
	pub id: EntityId,
	pub to: String,
	pub kind: MediaKind,
	/// Local file the media was read from.
	pub path: PathBuf,
	/// Remote location returned by the upload request.
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ip: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub caption: Option<String>,
}

/// Location message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
	pub id: EntityId,
	pub to: String,
	pub name: String,
	pub url: String,
	pub latitude: f64,
	pub longitude: f64,
}

/// Contact card message. `data` holds the raw vCard text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VCardMessage {
	pub id: EntityId,
	pub to: String,
	pub name: String,
	pub data: String,
}

/// What an outgoing [`Ack`] acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckClass {
	Message,
	Receipt,
}

/// Acknowledgement of an inbound entity. Reuses the inbound entity's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
	pub id: EntityId,
	pub to: String,
	pub class: AckClass,
}

/// Request asking the remote side where `path` should be uploaded.
///
/// Answered by [`InboundEvent::UploadResult`](crate::InboundEvent::UploadResult)
/// or [`InboundEvent::UploadError`](crate::InboundEvent::UploadError) carrying
/// this request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
	pub id: EntityId,
	pub kind: MediaKind,
	pub path: PathBuf,
}

/// Any entity handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEntity {
	Text(TextMessage),
	Media(MediaMessage),
	Location(LocationMessage),
	VCard(VCardMessage),
	Ack(Ack),
	UploadRequest(UploadRequest),
}

impl OutboundEntity {
	pub fn id(&self) -> &EntityId {
		match self {
			OutboundEntity::Text(m) => &m.id,
			OutboundEntity::Media(m) => &m.id,
			OutboundEntity::Location(m) => &m.id,
			OutboundEntity::VCard(m) => &m.id,
			OutboundEntity::Ack(a) => &a.id,
			OutboundEntity::UploadRequest(r) => &r.id,
		}
	}

	/// Destination address, if the entity is addressed to a peer.
	pub fn to(&self) -> Option<&str> {
		match self {
			OutboundEntity::Text(m) => Some(&m.to),
			OutboundEntity::Media(m) => Some(&m.to),
			OutboundEntity::Location(m) => Some(&m.to),
			OutboundEntity::VCard(m) => Some(&m.to),
			OutboundEntity::Ack(a) => Some(&a.to),
			OutboundEntity::UploadRequest(_) => None,
		}
	}

	/// Short tag used in logs and counters.
	pub fn kind(&self) -> &'static str {
		match self {
			OutboundEntity::Text(_) => "text",
			OutboundEntity::Media(m) => m.kind.as_str(),
			OutboundEntity::Location(_) => "location",
			OutboundEntity::VCard(_) => "vcard",
			OutboundEntity::Ack(_) => "ack",
			OutboundEntity::UploadRequest(_) => "upload_request",
		}
	}

	/// Returns true for entities that deliver content to a peer (and may be acked).
	pub fn is_message(&self) -> bool {
		matches!(
			self,
			OutboundEntity::Text(_) | OutboundEntity::Media(_) | OutboundEntity::Location(_) | OutboundEntity::VCard(_)
		)
	}
}
