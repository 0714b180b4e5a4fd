//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers outside the crate (the binary,
//! transports) can expose credentials without naming secrecy directly.

pub use secrecy::{ExposeSecret, SecretString};
