//! Error types for the chatq runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the session, the loop and the layers built on them.
#[derive(Debug, Error)]
pub enum Error {
	/// Credentials or worker configuration missing, ambiguous or invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// A configured extension could not be resolved.
	#[error("Lookup error: unknown extension '{0}'")]
	Lookup(String),

	/// A mutating operation was attempted while disconnected.
	#[error("{operation} needs to be connected")]
	ConnectionRequired { operation: &'static str },

	/// Login rejected by the remote side. Ends the current loop invocation.
	#[error("Authentication Error: {0}")]
	Authentication(String),

	/// Any other fault that escaped the loop, with the original error kept as source.
	#[error("Unexpected error: {message}")]
	Unexpected {
		message: String,
		#[source]
		source: Box<Error>,
	},

	/// Work was submitted to the loop while no loop is running.
	#[error("Session loop is not listening")]
	NotListening,

	/// A second loop was started while one is already running.
	#[error("Session loop is already listening")]
	AlreadyListening,

	/// The loop never became ready within the admission retry budget.
	#[error("{action} gave up after {attempts} retries waiting for the session loop")]
	RetriesExhausted { action: &'static str, attempts: u32 },

	/// Transport-level failure.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Upload of media bytes failed.
	#[error("Upload error: {0}")]
	Upload(String),

	/// A queue or reply channel closed before delivering.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Timed out waiting for a state change.
	#[error("Timeout: {0}")]
	Timeout(String),
}

impl Error {
	/// Wraps `source` as an [`Error::Unexpected`], keeping its message.
	pub fn unexpected(source: Error) -> Self {
		Error::Unexpected {
			message: source.to_string(),
			source: Box::new(source),
		}
	}

	/// Returns true if this is a connection-required guard violation.
	pub fn is_connection_required(&self) -> bool {
		matches!(self, Error::ConnectionRequired { .. })
	}

	/// Returns true if this error ended a loop invocation.
	pub fn is_fatal_to_loop(&self) -> bool {
		matches!(self, Error::Authentication(_) | Error::Unexpected { .. })
	}

	/// Returns true if this error must stop worker startup.
	pub fn is_startup_error(&self) -> bool {
		matches!(self, Error::Configuration(_) | Error::Lookup(_))
	}
}
