// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counts one flow outcome on the global recorder.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"oidc_token_cache_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Publishes the number of broker requests awaiting a response.
pub fn record_pending_requests(pending: usize) {
	#[cfg(feature = "metrics")]
	metrics::gauge!("oidc_token_cache_broker_pending_requests").set(pending as f64);
	#[cfg(not(feature = "metrics"))]
	let _ = pending;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_accept_every_label() {
		for kind in FlowKind::ALL {
			for outcome in
				[FlowOutcome::Attempt, FlowOutcome::Success, FlowOutcome::Failure, FlowOutcome::Absorbed]
			{
				record_flow_outcome(kind, outcome);
			}
		}

		record_pending_requests(3);
	}

	#[test]
	fn outcome_of_result() {
		assert_eq!(FlowOutcome::of(&Ok::<_, ()>(1)), FlowOutcome::Success);
		assert_eq!(FlowOutcome::of(&Err::<(), _>("boom")), FlowOutcome::Failure);
	}
}
