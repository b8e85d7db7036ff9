//! Request pipeline: parameter validation, execution against a store, and result shaping.

pub mod executor;
pub mod params;
pub mod shaper;
mod validation;

pub use executor::{Executor, Phase};
pub use params::validate_request;
pub use shaper::{Meta, Outcome};
pub use validation::BodyValidator;
