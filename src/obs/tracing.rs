// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// Future returned by [`FlowSpan::instrument`].
#[cfg(feature = "tracing")]
pub type Traced<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`].
#[cfg(not(feature = "tracing"))]
pub type Traced<F> = F;

/// Span covering one pass through a cache, storage, or broker flow.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	inner: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at call site `stage`; the correlation id starts empty.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		let span = Self {
			inner: tracing::info_span!(
				"oidc_token_cache.flow",
				flow = kind.as_str(),
				stage,
				correlation_id = tracing::field::Empty,
			),
		};
		#[cfg(not(feature = "tracing"))]
		let span = {
			let _ = (kind, stage);

			Self {}
		};

		span
	}

	/// Records the request correlation id on the span.
	pub fn with_correlation_id(self, correlation_id: &str) -> Self {
		#[cfg(feature = "tracing")]
		self.inner.record("correlation_id", correlation_id);
		#[cfg(not(feature = "tracing"))]
		let _ = correlation_id;

		self
	}

	/// Runs a synchronous section inside the span.
	pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
		#[cfg(feature = "tracing")]
		return self.inner.in_scope(f);
		#[cfg(not(feature = "tracing"))]
		return f();
	}

	/// Attaches the span to `fut` without holding a guard across `.await` points.
	pub fn instrument<F>(&self, fut: F) -> Traced<F>
	where
		F: Future,
	{
		#[cfg(feature = "tracing")]
		return tracing::Instrument::instrument(fut, self.inner.clone());
		#[cfg(not(feature = "tracing"))]
		return fut;
	}
}

/// Logs a routine transition (cache hit, handshake result).
pub fn debug_event(kind: FlowKind, stage: &'static str, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(flow = kind.as_str(), stage, "{message}");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, stage, message);
}

/// Logs a fault that is treated as missing data and counts it as
/// [`FlowOutcome::Absorbed`].
pub fn absorbed_fault(kind: FlowKind, stage: &'static str, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(flow = kind.as_str(), stage, "{message}");
	#[cfg(not(feature = "tracing"))]
	let _ = (stage, message);

	obs::record_flow_outcome(kind, FlowOutcome::Absorbed);
}
