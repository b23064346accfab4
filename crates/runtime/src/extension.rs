//! Session extensions.
//!
//! Extensions observe traffic flowing through a [`ConnectionSession`] without
//! being able to alter it. They are named in the worker configuration and
//! resolved once at startup; an unknown name is a startup error.
//!
//! [`ConnectionSession`]: crate::ConnectionSession

use std::collections::BTreeMap;
use std::sync::Arc;

use chatq_protocol::{InboundEvent, OutboundEntity};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Observer hooked into the session's inbound and outbound paths.
pub trait SessionExtension: Send + Sync {
	fn name(&self) -> &'static str;

	/// Called for every inbound event before the session handles it.
	fn on_inbound(&self, _event: &InboundEvent) {}

	/// Called for every entity right before it is handed to the transport.
	fn on_outbound(&self, _entity: &OutboundEntity) {}

	/// One-line summary logged when the worker stops.
	fn summary(&self) -> Option<String> {
		None
	}
}

/// Logs every entity at debug level.
#[derive(Debug, Default)]
pub struct TraceExtension;

impl SessionExtension for TraceExtension {
	fn name(&self) -> &'static str {
		"trace"
	}

	fn on_inbound(&self, event: &InboundEvent) {
		tracing::debug!(target: "chatq::trace", direction = "in", kind = event.kind(), ?event);
	}

	fn on_outbound(&self, entity: &OutboundEntity) {
		tracing::debug!(target: "chatq::trace", direction = "out", kind = entity.kind(), id = %entity.id(), ?entity);
	}
}

/// Counts inbound and outbound entities by kind.
#[derive(Debug, Default)]
pub struct StatsExtension {
	inbound: Mutex<BTreeMap<&'static str, u64>>,
	outbound: Mutex<BTreeMap<&'static str, u64>>,
}

impl StatsExtension {
	pub fn inbound_count(&self, kind: &str) -> u64 {
		self.inbound.lock().get(kind).copied().unwrap_or(0)
	}

	pub fn outbound_count(&self, kind: &str) -> u64 {
		self.outbound.lock().get(kind).copied().unwrap_or(0)
	}
}

impl SessionExtension for StatsExtension {
	fn name(&self) -> &'static str {
		"stats"
	}

	fn on_inbound(&self, event: &InboundEvent) {
		*self.inbound.lock().entry(event.kind()).or_default() += 1;
	}

	fn on_outbound(&self, entity: &OutboundEntity) {
		*self.outbound.lock().entry(entity.kind()).or_default() += 1;
	}

	fn summary(&self) -> Option<String> {
		let render = |counts: &BTreeMap<&'static str, u64>| {
			counts.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
		};
		Some(format!("in[{}] out[{}]", render(&self.inbound.lock()), render(&self.outbound.lock())))
	}
}

/// Names accepted by [`resolve_extensions`].
pub const KNOWN_EXTENSIONS: &[&str] = &["trace", "stats"];

/// Resolves configured extension names, in order.
///
/// # Errors
///
/// Returns [`Error::Lookup`] naming the first unknown extension.
pub fn resolve_extensions(names: &[String]) -> Result<Vec<Arc<dyn SessionExtension>>> {
	names
		.iter()
		.map(|name| -> Result<Arc<dyn SessionExtension>> {
			match name.trim() {
				"trace" => Ok(Arc::new(TraceExtension)),
				"stats" => Ok(Arc::new(StatsExtension::default())),
				other => Err(Error::Lookup(other.to_string())),
			}
		})
		.collect()
}
