//! Key-value settings provider with a pull-through TTL cache.
//!
//! The engine never reads `Config` directly for platform credentials or
//! feed URLs; it goes through [`SettingsProvider`] so deployments can back
//! the keys with a database or secrets store instead of the YAML file.

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const PLATFORM_API_BASE_URL: &str = "PLATFORM_API_BASE_URL";
pub const PLATFORM_API_LOGIN: &str = "PLATFORM_API_LOGIN";
pub const PLATFORM_API_KEY: &str = "PLATFORM_API_KEY";
pub const PRODUCTS_FULL_FEED_URL: &str = "PRODUCTS_FULL_FEED_URL";
pub const PRODUCTS_PARTIAL_FEED_URL: &str = "PRODUCTS_PARTIAL_FEED_URL";

pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Adapts the file config to the settings key space.
pub struct ConfigSettings {
    cfg: Config,
}

impl ConfigSettings {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }
}

impl SettingsProvider for ConfigSettings {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            PLATFORM_API_BASE_URL => Some(self.cfg.platform.base_url.clone()),
            PLATFORM_API_LOGIN => Some(self.cfg.platform.api_login.clone()),
            PLATFORM_API_KEY => Some(self.cfg.platform.api_key.clone()),
            PRODUCTS_FULL_FEED_URL => Some(self.cfg.feeds.full_products_url.clone()),
            PRODUCTS_PARTIAL_FEED_URL => self.cfg.feeds.partial_products_url.clone(),
            _ => None,
        }
    }
}

/// Pull-through cache over any provider. Entries expire after `ttl`;
/// lookups past expiry re-read the inner provider. Absent keys are not
/// negatively cached.
pub struct CachedSettings<P> {
    inner: P,
    ttl: Duration,
    cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl<P: SettingsProvider> CachedSettings<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: SettingsProvider> SettingsProvider for CachedSettings<P> {
    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let cache = self.cache.lock().expect("settings cache poisoned");
            if let Some((value, stored_at)) = cache.get(key) {
                if now.duration_since(*stored_at) < self.ttl {
                    return Some(value.clone());
                }
            }
        }
        let value = self.inner.get(key)?;
        let mut cache = self.cache.lock().expect("settings cache poisoned");
        cache.insert(key.to_string(), (value.clone(), now));
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        hits: AtomicUsize,
    }

    impl SettingsProvider for CountingProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if key == "K" {
                Some("v".into())
            } else {
                None
            }
        }
    }

    #[test]
    fn config_settings_maps_keys() {
        let cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        let settings = ConfigSettings::new(cfg);
        assert_eq!(
            settings.get(PLATFORM_API_LOGIN).as_deref(),
            Some("YOUR_API_LOGIN")
        );
        assert!(settings.get("UNKNOWN_KEY").is_none());
    }

    #[test]
    fn cache_serves_within_ttl() {
        let cached = CachedSettings::new(
            CountingProvider {
                hits: AtomicUsize::new(0),
            },
            Duration::from_secs(3600),
        );
        assert_eq!(cached.get("K").as_deref(), Some("v"));
        assert_eq!(cached.get("K").as_deref(), Some("v"));
        assert_eq!(cached.inner.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cached = CachedSettings::new(
            CountingProvider {
                hits: AtomicUsize::new(0),
            },
            Duration::from_millis(0),
        );
        cached.get("K");
        cached.get("K");
        assert_eq!(cached.inner.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn absent_keys_are_not_cached() {
        let cached = CachedSettings::new(
            CountingProvider {
                hits: AtomicUsize::new(0),
            },
            Duration::from_secs(3600),
        );
        assert!(cached.get("MISSING").is_none());
        assert!(cached.get("MISSING").is_none());
        assert_eq!(cached.inner.hits.load(Ordering::SeqCst), 2);
    }
}
