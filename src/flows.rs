//! Silent token acquisition: the cache decision engine and the policy-driven fallback
//! orchestrator built on top of it.

pub mod fallback;
pub mod silent;

pub use fallback::*;
pub use silent::*;

// crates.io
use uuid::Uuid;

/// Generates a random (version 4) UUID correlation id.
pub fn new_correlation_id() -> String {
	Uuid::new_v4().to_string()
}
