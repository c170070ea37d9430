//! Optional observability helpers for cache, storage, and broker flows.
//!
//! # Feature Flags
//!
//! - `tracing` (on by default): spans named `oidc_token_cache.flow` carrying `flow`,
//!   `stage`, and `correlation_id`, plus events for faults the storage and broker layers
//!   absorb instead of returning.
//! - `metrics`: the `oidc_token_cache_flow_total{flow,outcome}` counter and the
//!   `oidc_token_cache_broker_pending_requests` gauge.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Silent cache lookup performed by the decision engine.
	SilentCache,
	/// Ordered token-source fallback driven by the lookup policy.
	SilentFallback,
	/// Broker discovery handshake.
	BrokerHandshake,
	/// Correlated broker request/response.
	BrokerRequest,
	/// Encrypted store initialization and mirror maintenance.
	StorageInit,
}
impl FlowKind {
	/// Every kind, for exhaustive dashboards and tests.
	pub const ALL: [FlowKind; 5] = [
		FlowKind::SilentCache,
		FlowKind::SilentFallback,
		FlowKind::BrokerHandshake,
		FlowKind::BrokerRequest,
		FlowKind::StorageInit,
	];

	/// Metric and span label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::SilentCache => "silent_cache",
			FlowKind::SilentFallback => "silent_fallback",
			FlowKind::BrokerHandshake => "broker_handshake",
			FlowKind::BrokerRequest => "broker_request",
			FlowKind::StorageInit => "storage_init",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure returned to the caller.
	Failure,
	/// Fault logged and treated as missing data instead of being returned.
	Absorbed,
}
impl FlowOutcome {
	/// Metric label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Absorbed => "absorbed",
		}
	}

	/// Success or failure label for a finished call.
	pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
		if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure }
	}
}
