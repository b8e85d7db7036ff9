//! Request extractors.

pub mod credentials;
pub use credentials::Credentials;
