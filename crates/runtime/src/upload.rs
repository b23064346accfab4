//! Media upload collaborator and the media observability channel.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chatq_protocol::{EntityId, MediaMessage};

use crate::error::Result;

/// Progress callback, called with a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// One upload to perform, derived from an upload result.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
	pub request_id: EntityId,
	/// Destination address of the media message that follows.
	pub jid: String,
	pub own_jid: String,
	pub path: PathBuf,
	/// Upload location returned by the remote side.
	pub url: String,
	pub resume_offset: u64,
}

/// Moves media bytes to the location an upload result names.
#[async_trait]
pub trait MediaUploader: Send + Sync {
	/// Uploads `job.path` and returns the url the media message should carry.
	async fn upload(&self, job: UploadJob, progress: ProgressFn) -> Result<String>;
}

/// Uploader that reports progress and succeeds without moving bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackUploader;

#[async_trait]
impl MediaUploader for LoopbackUploader {
	async fn upload(&self, job: UploadJob, progress: ProgressFn) -> Result<String> {
		for percent in [0, 50, 100] {
			progress(percent);
			tokio::task::yield_now().await;
		}
		Ok(job.url)
	}
}

/// Media side channel event. Media sends never report through their return value.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
	Progress {
		request_id: EntityId,
		path: PathBuf,
		jid: String,
		percent: u8,
	},
	/// The media message went out.
	Sent { request_id: EntityId, message: MediaMessage },
	UploadFailed {
		request_id: EntityId,
		path: PathBuf,
		jid: String,
		reason: String,
	},
}

impl MediaEvent {
	pub fn request_id(&self) -> &EntityId {
		match self {
			MediaEvent::Progress { request_id, .. }
			| MediaEvent::Sent { request_id, .. }
			| MediaEvent::UploadFailed { request_id, .. } => request_id,
		}
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;

	#[tokio::test]
	async fn loopback_uploader_reports_progress_and_returns_url() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let progress: ProgressFn = Arc::new(move |p| sink.lock().push(p));

		let job = UploadJob {
			request_id: EntityId::from("1-1"),
			jid: "341234567@s.whatsapp.net".to_string(),
			own_jid: "34999@s.whatsapp.net".to_string(),
			path: PathBuf::from("/tmp/cat.jpg"),
			url: "https://media.loopback/image/1-1".to_string(),
			resume_offset: 0,
		};

		let url = LoopbackUploader.upload(job, progress).await.unwrap();
		assert_eq!(url, "https://media.loopback/image/1-1");
		assert_eq!(*seen.lock(), vec![0, 50, 100]);
	}
}
