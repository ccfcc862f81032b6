//! Maps logical target names to publish implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use herald_core::config::ProvidersConfig;
use tracing::{info, warn};

use crate::confluence::ConfluenceProvider;
use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::stub::{ConfluenceStubProvider, SocialStubProvider};

/// Registry of publish targets keyed by lower-case name.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    default_target: String,
}

impl ProviderRegistry {
    /// Empty registry. `default_target` is resolved lazily, so it may be
    /// registered after construction.
    pub fn new(default_target: &str) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_target: normalize(default_target),
        }
    }

    /// Registry with the in-process stubs (`confluence-stub`, its alias
    /// `stub`, and `social-stub`).
    pub fn with_stubs(default_target: &str) -> Self {
        let mut registry = Self::new(default_target);
        let confluence_stub: Arc<dyn Provider> = Arc::new(ConfluenceStubProvider);
        registry.register("confluence-stub", Arc::clone(&confluence_stub));
        registry.register("stub", confluence_stub);
        registry.register("social-stub", Arc::new(SocialStubProvider));
        registry
    }

    /// Build the registry from config: the stubs plus every configured
    /// external platform.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::with_stubs(&config.default_target);

        if let Some(ref confluence) = config.confluence {
            let provider = ConfluenceProvider::new(confluence)?;
            info!(base_url = %provider.base_url(), "publish target: confluence");
            registry.register("confluence", Arc::new(provider));
        }

        if !registry.contains(&config.default_target) {
            warn!(
                target = %config.default_target,
                "default provider target is not registered; requests without a target will fail"
            );
        }
        Ok(registry)
    }

    /// Register (or replace) a provider under `name`.
    pub fn register(&mut self, name: &str, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(normalize(name), provider);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&normalize(name))
    }

    /// Resolve a target name. Fails with `UnknownProvider`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&normalize(name))
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider {
                name: name.to_string(),
            })
    }

    /// Resolve `name`, or the default target when `None`. Returns the
    /// canonical target name alongside the provider.
    pub fn resolve_or_default(&self, name: Option<&str>) -> Result<(String, Arc<dyn Provider>)> {
        let target = name
            .map(normalize)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.default_target.clone());
        let provider = self.resolve(&target)?;
        Ok((target, provider))
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    /// Registered target names in sorted order.
    pub fn targets(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
