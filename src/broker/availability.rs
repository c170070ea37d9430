//! Gate deciding whether a request may be delegated to the broker.

// self
use crate::{broker::BrokerChannel, cache::AuthenticationScheme, config::BrokerOptions};

/// Returns true when delegation is enabled, a channel is connected, and the requested
/// scheme (if any) is one the broker serves.
pub fn is_broker_available(
	options: &BrokerOptions,
	channel: Option<&BrokerChannel>,
	scheme: Option<AuthenticationScheme>,
) -> bool {
	if !options.allow_broker {
		return false;
	}

	let Some(channel) = channel else {
		return false;
	};

	if channel.is_closed() {
		return false;
	}

	match scheme {
		Some(AuthenticationScheme::Bearer | AuthenticationScheme::Pop) | None => true,
		Some(AuthenticationScheme::Ssh) => false,
	}
}
