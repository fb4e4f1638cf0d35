use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::CarrierAdapter;
use crate::andreani::{self, AndreaniAdapter};
use crate::correo_argentino::{self, CorreoArgentinoAdapter};
use crate::error::AdapterError;
use crate::fetch::{HttpFetcher, PageFetcher, RenderedFetcher};
use crate::rules::RuleBook;

/// How carrier pages are acquired.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Base URL of a browserless-compatible rendering service. Without one,
    /// client-side rendered carriers are fetched over plain HTTP and their
    /// pages will not parse.
    pub renderer_url: Option<String>,
    /// Concurrent pages the rendering service may hold open.
    pub renderer_capacity: usize,
    /// How long to wait for a carrier page's timeline selector.
    pub wait_timeout: Duration,
    /// Whole-fetch deadline.
    pub fetch_timeout: Duration,
    pub andreani_base_url: String,
    pub correo_argentino_endpoint: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            renderer_url: None,
            renderer_capacity: 2,
            wait_timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(30),
            andreani_base_url: andreani::DEFAULT_BASE_URL.to_owned(),
            correo_argentino_endpoint: correo_argentino::DEFAULT_ENDPOINT.to_owned(),
        }
    }
}

/// Adapters keyed by carrier slug.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn CarrierAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapters for every supported carrier.
    pub fn standard(config: &AcquisitionConfig, rules: &RuleBook) -> Result<Self, AdapterError> {
        let http: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
        let rendered: Arc<dyn PageFetcher> = match &config.renderer_url {
            Some(url) => Arc::new(RenderedFetcher::new(
                url.clone(),
                config.renderer_capacity,
                config.wait_timeout,
                config.fetch_timeout,
            )?),
            None => {
                warn!(
                    carrier = andreani::SLUG,
                    "no rendering service configured; client-rendered tracking pages are \
                     fetched as plain HTML and will fail to parse"
                );
                Arc::clone(&http)
            }
        };

        let mut registry = Self::new();
        registry.register(Arc::new(AndreaniAdapter::new(
            config.andreani_base_url.clone(),
            rendered,
            rules.require(andreani::SLUG)?,
        )));
        registry.register(Arc::new(CorreoArgentinoAdapter::new(
            config.correo_argentino_endpoint.clone(),
            http,
            rules.require(correo_argentino::SLUG)?,
        )));

        info!(
            carriers = ?registry.slugs(),
            renderer = config.renderer_url.as_deref().unwrap_or("none"),
            "carrier adapters registered"
        );
        Ok(registry)
    }

    /// Add an adapter, replacing any previous one for the same slug.
    pub fn register(&mut self, adapter: Arc<dyn CarrierAdapter>) {
        self.adapters.insert(adapter.slug().to_owned(), adapter);
    }

    pub fn get(&self, slug: &str) -> Option<Arc<dyn CarrierAdapter>> {
        self.adapters.get(slug).cloned()
    }

    /// Registered slugs, sorted.
    pub fn slugs(&self) -> Vec<&str> {
        let mut slugs: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        slugs.sort_unstable();
        slugs
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn standard_registry_serves_known_carriers_only() {
        let rules = RuleBook::builtin().unwrap();
        let registry = AdapterRegistry::standard(&AcquisitionConfig::default(), &rules).unwrap();
        assert_eq!(registry.slugs(), vec!["andreani", "correo-argentino"]);
        assert!(registry.get("oca").is_none());

        let andreani = registry.get("andreani").unwrap();
        assert!(andreani.validate("360002423941550").is_ok());
        assert!(andreani.validate("000500076393019A3G0C701").is_err());
    }

    #[test]
    #[traced_test]
    fn missing_renderer_is_reported() {
        let rules = RuleBook::builtin().unwrap();
        AdapterRegistry::standard(&AcquisitionConfig::default(), &rules).unwrap();
        assert!(logs_contain("no rendering service configured"));

        let config = AcquisitionConfig {
            renderer_url: Some("http://renderer.test".into()),
            ..AcquisitionConfig::default()
        };
        let registry = AdapterRegistry::standard(&config, &rules).unwrap();
        assert!(registry.get("andreani").is_some());
    }
}
