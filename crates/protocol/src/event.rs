//! Inbound protocol events.
//!
//! The transport decodes whatever arrives from the remote side into one
//! [`InboundEvent`]. The session matches on the variant; there is no
//! tag-keyed handler registry.

use serde::{Deserialize, Serialize};

use crate::entity::{Ack, AckClass, EntityId};

/// Inbound text or media message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
	pub id: EntityId,
	/// Sender address.
	pub from: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
}

impl IncomingMessage {
	/// Acknowledgement telling the sender the message was delivered.
	pub fn ack(&self) -> Ack {
		Ack {
			id: self.id.clone(),
			to: self.from.clone(),
			class: AckClass::Message,
		}
	}
}

/// Delivery or read receipt for a message this session sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingReceipt {
	pub id: EntityId,
	pub from: String,
}

impl IncomingReceipt {
	pub fn ack(&self) -> Ack {
		Ack {
			id: self.id.clone(),
			to: self.from.clone(),
			class: AckClass::Receipt,
		}
	}
}

/// Server acknowledgement of an entity this session sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingAck {
	pub id: EntityId,
	pub from: String,
	pub class: AckClass,
}

/// Answer to an upload request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
	/// Id of the upload request being answered.
	pub request_id: EntityId,
	/// The media is already resident remotely; no upload is needed.
	pub duplicate: bool,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip: Option<String>,
	/// Byte offset to resume a partial upload from.
	#[serde(default)]
	pub resume_offset: u64,
}

/// Everything the transport delivers to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
	/// Login accepted.
	Success,
	/// Login rejected.
	Failure { reason: String },
	Ack(IncomingAck),
	Message(IncomingMessage),
	Receipt(IncomingReceipt),
	/// The underlying connection went away.
	Disconnected {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reason: Option<String>,
	},
	UploadResult(UploadResult),
	/// Upload request refused by the remote side.
	UploadError { request_id: EntityId, reason: String },
}

impl InboundEvent {
	/// Short tag used in logs and counters.
	pub fn kind(&self) -> &'static str {
		match self {
			InboundEvent::Success => "success",
			InboundEvent::Failure { .. } => "failure",
			InboundEvent::Ack(_) => "ack",
			InboundEvent::Message(_) => "message",
			InboundEvent::Receipt(_) => "receipt",
			InboundEvent::Disconnected { .. } => "disconnected",
			InboundEvent::UploadResult(_) => "upload_result",
			InboundEvent::UploadError { .. } => "upload_error",
		}
	}

	pub fn is_disconnected(&self) -> bool {
		matches!(self, InboundEvent::Disconnected { .. })
	}
}
