//! `herald-providers`: the uniform publish contract and its implementations.
//!
//! Every external platform implements [`Provider`], returning a three-way
//! [`PublishResult`]. The [`ProviderRegistry`] resolves logical target names
//! (e.g. `"confluence"`, `"social-stub"`) to implementations.

pub mod confluence;
pub mod error;
pub mod provider;
pub mod registry;
pub mod stub;

pub use error::{ProviderError, Result};
pub use provider::{Provider, PublishRequest, PublishResult};
pub use registry::ProviderRegistry;
