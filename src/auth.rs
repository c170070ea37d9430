//! Auth-domain identifiers, scope sets, authorities, accounts, and ID-token claims.

pub mod account;
pub mod authority;
pub mod claims;
pub mod id;
pub mod scope;

pub use account::*;
pub use authority::*;
pub use claims::*;
pub use id::*;
pub use scope::*;
