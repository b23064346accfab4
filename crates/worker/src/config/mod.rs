//! Worker configuration.
//!
//! Two inputs: the credentials (see [`credentials`]) and an optional JSON
//! worker configuration. Every JSON field has a default, so `{}` is a
//! valid configuration.

pub mod credentials;

pub use credentials::{Credentials, parse_key_values, resolve_credentials};

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatq_runtime::{Error, LoopOptions, Result};
use serde::{Deserialize, Serialize};

use crate::dispatcher::RetryPolicy;

/// The `start` action occupies one consumer for the loop's lifetime.
pub const MIN_CONCURRENCY: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
	pub queues: Vec<String>,
	/// Consumer tasks per queue.
	pub concurrency: usize,
	pub loop_timeout_secs: u64,
	pub auto_connect: bool,
	pub detached_delay_ms: u64,
	pub retry_delay_ms: u64,
	pub max_retries: u32,
	/// Credentials file used when neither a login nor a config file is given.
	pub credentials_file: Option<PathBuf>,
	/// Extension names resolved at startup.
	pub extensions: Vec<String>,
	pub encryption: bool,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			queues: vec!["default".to_string()],
			concurrency: MIN_CONCURRENCY,
			loop_timeout_secs: 10,
			auto_connect: false,
			detached_delay_ms: 200,
			retry_delay_ms: 500,
			max_retries: 3,
			credentials_file: None,
			extensions: Vec::new(),
			encryption: true,
		}
	}
}

impl WorkerConfig {
	/// Loads and validates a JSON worker configuration.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| Error::Configuration(format!("cannot read worker config {}: {e}", path.display())))?;
		let config: Self = serde_json::from_str(&text)
			.map_err(|e| Error::Configuration(format!("invalid worker config {}: {e}", path.display())))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.queues.is_empty() || self.queues.iter().any(|q| q.trim().is_empty()) {
			return Err(Error::Configuration("queues must be non-empty names".to_string()));
		}
		if self.concurrency < MIN_CONCURRENCY {
			return Err(Error::Configuration(format!(
				"concurrency must be at least {MIN_CONCURRENCY}, got {}",
				self.concurrency
			)));
		}
		if self.loop_timeout_secs == 0 {
			return Err(Error::Configuration("loop_timeout_secs must be positive".to_string()));
		}
		Ok(())
	}

	pub fn loop_options(&self) -> LoopOptions {
		LoopOptions {
			timeout: Duration::from_secs(self.loop_timeout_secs),
			auto_connect: self.auto_connect,
		}
	}

	pub fn detached_delay(&self) -> Duration {
		Duration::from_millis(self.detached_delay_ms)
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			delay: Duration::from_millis(self.retry_delay_ms),
			max_retries: self.max_retries,
		}
	}
}

#[cfg(test)]
mod tests;
