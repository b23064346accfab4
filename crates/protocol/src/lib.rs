//! Typed protocol entities for the chatq session bridge.
//!
//! The wire encoding of these entities belongs to the transport. This crate
//! only describes them as typed values so the session runtime can match on
//! them without string tags:
//!
//! - [`InboundEvent`] - everything the transport delivers upward
//! - [`OutboundEntity`] - everything the session hands down to the transport
//! - [`normalize_address`] - phone number to peer/group address mapping

pub mod address;
pub mod entity;
pub mod event;

pub use address::{GROUP_SUFFIX, PEER_SUFFIX, normalize_address};
pub use entity::{
	Ack, AckClass, EntityId, LocationMessage, MediaKind, MediaMessage, OutboundEntity, TextMessage, UploadRequest, VCardMessage,
};
pub use event::{IncomingAck, IncomingMessage, IncomingReceipt, InboundEvent, UploadResult};
