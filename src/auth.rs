//! Credential contracts, the authenticator capability set, and a ready-made bearer credential.

pub mod authenticator;
pub mod credential;
pub mod secret;

pub use authenticator::*;
pub use credential::*;
pub use secret::*;
