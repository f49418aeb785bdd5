//! Adapter configuration (SPEC_FULL.md §6.1): an ambient addition the
//! distilled interface spec leaves implicit but a buildable crate needs.

use std::env;

/// `host`/`namespace` feed URL building (`url::build`); the two
/// `max_requests_per_*` caps are the fan-out guards from spec.md §7.
#[derive(Clone, Debug)]
pub struct JsonApiConfig {
    pub host: Option<String>,
    pub namespace: Option<String>,
    pub max_requests_per_fetch: usize,
    pub max_requests_per_transform: usize,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            host: None,
            namespace: None,
            max_requests_per_fetch: 25,
            max_requests_per_transform: 25,
        }
    }
}

impl JsonApiConfig {
    /// Reads `CONDUIT_JSONAPI_HOST` / `CONDUIT_JSONAPI_NAMESPACE` /
    /// `CONDUIT_JSONAPI_MAX_REQUESTS_PER_FETCH` /
    /// `CONDUIT_JSONAPI_MAX_REQUESTS_PER_TRANSFORM`, falling back to
    /// `Default` for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("CONDUIT_JSONAPI_HOST").ok(),
            namespace: env::var("CONDUIT_JSONAPI_NAMESPACE").ok(),
            max_requests_per_fetch: env::var("CONDUIT_JSONAPI_MAX_REQUESTS_PER_FETCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_requests_per_fetch),
            max_requests_per_transform: env::var("CONDUIT_JSONAPI_MAX_REQUESTS_PER_TRANSFORM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_requests_per_transform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_caps_are_positive() {
        let cfg = JsonApiConfig::default();
        assert!(cfg.max_requests_per_fetch > 0);
        assert!(cfg.max_requests_per_transform > 0);
    }
}
