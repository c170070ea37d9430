//! Typed credential cache: entities, key derivation, key-index registries, and the
//! matching store.

pub mod credential_store;
pub mod entity;
pub mod index;
pub mod key;
pub mod secret;

pub use credential_store::*;
pub use entity::*;
pub use secret::*;
