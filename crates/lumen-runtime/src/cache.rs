//! Verdict cache.
//!
//! The same image with the same alt text shows up across pages of a site
//! (logos, icons, shared banners). Caching by `(alt, src)` avoids paying for
//! a classifier call per page.

use moka::future::Cache;
use std::time::Duration;

use lumen_core::ClassificationVerdict;

/// Cache key: exact alt text and image URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VerdictKey {
    pub alt: String,
    pub src: String,
}

impl VerdictKey {
    pub fn new(alt: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            alt: alt.into(),
            src: src.into(),
        }
    }
}

/// Bounded, TTL-expiring verdict cache shared across audits.
pub struct VerdictCache {
    cache: Cache<VerdictKey, ClassificationVerdict>,
}

impl VerdictCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &VerdictKey) -> Option<ClassificationVerdict> {
        self.cache.get(key).await
    }

    /// Only validated verdicts are stored; parse failures are never cached.
    pub async fn insert(&self, key: VerdictKey, verdict: ClassificationVerdict) {
        self.cache.insert(key, verdict).await;
    }
}

impl Default for VerdictCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Verdict;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = VerdictCache::default();
        let key = VerdictKey::new("Company logo", "https://example.com/logo.png");

        assert!(cache.get(&key).await.is_none());

        let verdict = ClassificationVerdict {
            verdict: Verdict::Appropriate,
            suggested_text: "Company logo".to_string(),
        };
        cache.insert(key.clone(), verdict.clone()).await;
        assert_eq!(cache.get(&key).await, Some(verdict));

        // Same alt on a different image is a different entry
        let other = VerdictKey::new("Company logo", "https://example.com/banner.png");
        assert!(cache.get(&other).await.is_none());
    }
}
