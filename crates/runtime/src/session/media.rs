//! Completion of media sends once the remote side answers the upload request.

use std::sync::Arc;

use chatq_protocol::{EntityId, MediaMessage, OutboundEntity, UploadResult};

use super::{ConnectionSession, PendingMedia};
use crate::upload::{MediaEvent, ProgressFn, UploadJob};

impl ConnectionSession {
	pub(super) fn on_upload_result(self: &Arc<Self>, result: UploadResult) {
		let Some(pending) = self.pending_media.lock().remove(&result.request_id) else {
			tracing::warn!(target: "chatq::media", id = %result.request_id, "upload result for unknown request");
			return;
		};

		if result.duplicate {
			tracing::debug!(target: "chatq::media", id = %result.request_id, path = %pending.path.display(), "media already resident");
			self.send_media_message(result.request_id, pending, result.url, result.ip);
			return;
		}

		let job = UploadJob {
			request_id: result.request_id,
			jid: pending.jid.clone(),
			own_jid: self.own_jid.clone(),
			path: pending.path.clone(),
			url: result.url,
			resume_offset: result.resume_offset,
		};
		let session = Arc::clone(self);
		let ip = result.ip;
		tokio::spawn(async move {
			session.run_upload(job, pending, ip).await;
		});
	}

	pub(super) fn on_upload_error(&self, request_id: EntityId, reason: String) {
		let pending = self.pending_media.lock().remove(&request_id);
		match pending {
			Some(pending) => self.upload_failed(request_id, pending, reason),
			None => tracing::warn!(target: "chatq::media", id = %request_id, %reason, "upload error for unknown request"),
		}
	}

	/// Fails every media send still waiting for an upload result.
	///
	/// Results only arrive through a running loop, so the loop calls this on exit.
	pub(crate) fn abandon_pending_media(&self, reason: &str) {
		let abandoned: Vec<(EntityId, PendingMedia)> = self.pending_media.lock().drain().collect();
		for (request_id, pending) in abandoned {
			self.upload_failed(request_id, pending, reason.to_string());
		}
	}

	async fn run_upload(&self, job: UploadJob, pending: PendingMedia, ip: Option<String>) {
		let media_tx = self.media_tx.clone();
		let (request_id, path, jid) = (job.request_id.clone(), job.path.clone(), job.jid.clone());
		let progress: ProgressFn = Arc::new(move |percent| {
			tracing::debug!(target: "chatq::media", id = %request_id, path = %path.display(), percent, "upload progress");
			let _ = media_tx.send(MediaEvent::Progress {
				request_id: request_id.clone(),
				path: path.clone(),
				jid: jid.clone(),
				percent,
			});
		});

		let request_id = job.request_id.clone();
		match self.uploader.upload(job, progress).await {
			Ok(url) => self.send_media_message(request_id, pending, url, ip),
			Err(e) => self.upload_failed(request_id, pending, e.to_string()),
		}
	}

	fn send_media_message(&self, request_id: EntityId, pending: PendingMedia, url: String, ip: Option<String>) {
		let message = MediaMessage {
			id: EntityId::generate(),
			to: pending.jid.clone(),
			kind: pending.kind,
			path: pending.path.clone(),
			url,
			ip,
			caption: pending.caption.clone(),
		};

		match self.emit(OutboundEntity::Media(message.clone())) {
			Ok(()) => {
				tracing::info!(target: "chatq::media", id = %request_id, to = %message.to, kind = %message.kind, "media sent");
				let _ = self.media_tx.send(MediaEvent::Sent { request_id, message });
			}
			Err(e) => self.upload_failed(request_id, pending, e.to_string()),
		}
	}

	fn upload_failed(&self, request_id: EntityId, pending: PendingMedia, reason: String) {
		tracing::error!(target: "chatq::media", id = %request_id, path = %pending.path.display(), jid = %pending.jid, %reason, "Request failed");
		let _ = self.media_tx.send(MediaEvent::UploadFailed {
			request_id,
			path: pending.path,
			jid: pending.jid,
			reason,
		});
	}
}
