//! Credential handling for data-source connections.
//!
//! Passwords and tokens are held in zeroizing containers, never appear in
//! `Debug` output, and are released from memory when the resolved config
//! that owns them is dropped at the end of a connector call.

mod credentials;

pub use credentials::{Credentials, Secret};
