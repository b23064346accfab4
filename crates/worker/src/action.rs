//! Queue-schedulable actions and the envelopes that carry them.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chatq_protocol::{EntityId, OutboundEntity};
use chatq_runtime::LoopExit;
use serde::{Deserialize, Serialize};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Session operation exposed at the queue boundary.
///
/// Deserialized from JSON lines such as
/// `{"action": "send_message", "number": "341234567", "content": "hi"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
	/// Take ownership of the session loop for one invocation.
	Start,
	Connect,
	Disconnect,
	SendMessage {
		number: String,
		content: String,
	},
	SendImage {
		number: String,
		path: PathBuf,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		caption: Option<String>,
	},
	SendAudio {
		number: String,
		path: PathBuf,
	},
	SendLocation {
		number: String,
		name: String,
		url: String,
		latitude: f64,
		longitude: f64,
	},
	#[serde(rename = "send_vcard")]
	SendVCard {
		number: String,
		name: String,
		data: String,
	},
}

impl Action {
	pub fn name(&self) -> &'static str {
		match self {
			Action::Start => "start",
			Action::Connect => "connect",
			Action::Disconnect => "disconnect",
			Action::SendMessage { .. } => "send_message",
			Action::SendImage { .. } => "send_image",
			Action::SendAudio { .. } => "send_audio",
			Action::SendLocation { .. } => "send_location",
			Action::SendVCard { .. } => "send_vcard",
		}
	}

	/// Whether the session must be connected for this action to succeed.
	pub fn requires_connection(&self) -> bool {
		!matches!(self, Action::Start | Action::Connect)
	}

	/// Whether the action only runs while a loop is listening.
	///
	/// Everything but `start` is admitted this way; `start` is what makes the loop listen.
	pub fn requires_listening(&self) -> bool {
		!matches!(self, Action::Start)
	}
}

/// Task identifier, stable across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
	pub fn next() -> Self {
		Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "task-{}", self.0)
	}
}

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEnvelope {
	pub id: TaskId,
	pub action: Action,
	/// Queue the task was delivered on. Retries go back to the same queue.
	pub queue: String,
	/// Number of times the task has been rescheduled.
	pub retries: u32,
}

impl TaskEnvelope {
	pub fn new(action: Action, queue: impl Into<String>) -> Self {
		Self {
			id: TaskId::next(),
			action,
			queue: queue.into(),
			retries: 0,
		}
	}

	/// The same task, one retry further along.
	pub fn into_retry(self) -> Self {
		Self {
			retries: self.retries + 1,
			..self
		}
	}
}

/// Successful result of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionOutput {
	/// `start` found a loop already running.
	AlreadyListening,
	/// `start` ran a loop invocation to completion.
	LoopFinished(LoopExit),
	/// Plain acknowledgement.
	Accepted(bool),
	/// The outbound entity that was sent.
	Entity(OutboundEntity),
	/// Derived identifier, e.g. the upload request id of a media send.
	Id(EntityId),
}
