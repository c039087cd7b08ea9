//! Cache buckets and the storage that names them.

use crate::network::{cache_key_for, FetchRequest, FetchResponse, ResponseSource};
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use loto_common::now_millis;
use url::Url;

/// A cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL (fragment stripped).
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response for `request`.
    pub fn from_response(request: &FetchRequest, response: &FetchResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: cache_key_for(&request.url),
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from this entry.
    ///
    /// Returns `None` if the stored URL or status no longer parses.
    pub fn to_response(&self) -> Option<FetchResponse> {
        let url = Url::parse(&self.url).ok()?;
        let status = StatusCode::from_u16(self.status).ok()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        Some(FetchResponse {
            url,
            status,
            headers,
            body: self.body.clone(),
            source: ResponseSource::Cache,
        })
    }
}

/// A named cache bucket.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name (the version identifier).
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request. Non-GET requests never match.
    pub fn match_request(&self, request: &FetchRequest) -> Option<&CacheEntry> {
        self.entries.get(&request.cache_key()?)
    }

    /// Match a URL as a GET.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(&cache_key_for(url))
    }

    /// Store an entry, replacing any entry for the same URL.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete the entry for `url`.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries.remove(&cache_key_for(url)).is_some()
    }

    /// Cached URLs, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache buckets of one origin.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Look up a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Cache names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.caches.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Match a request across all caches, in name order.
    pub fn match_request(&self, request: &FetchRequest) -> Option<&CacheEntry> {
        self.keys()
            .into_iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_request(request))
    }

    /// Match a URL across all caches, in name order.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.keys()
            .into_iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn url(path: &str) -> Url {
        Url::parse("https://loto.example/").unwrap().join(path).unwrap()
    }

    fn entry(path: &str, body: &'static str) -> CacheEntry {
        let request = FetchRequest::get(url(path));
        let response = FetchResponse::new(url(path), StatusCode::OK, body);
        CacheEntry::from_response(&request, &response)
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1");
        cache.put(entry("/offline.html", "offline"));

        let hit = cache.match_url(&url("/offline.html")).unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"offline"));
        assert!(cache.match_url(&url("/other.html")).is_none());
    }

    #[test]
    fn test_cache_put_replaces() {
        let mut cache = Cache::new("v1");
        cache.put(entry("/", "old"));
        cache.put(entry("/", "new"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_url(&url("/")).unwrap().body, "new");
    }

    #[test]
    fn test_post_never_matches() {
        let mut cache = Cache::new("v1");
        cache.put(entry("/api", "cached"));

        let post = FetchRequest::get(url("/api")).with_method(Method::POST);
        assert!(cache.match_request(&post).is_none());
        assert!(cache.match_request(&FetchRequest::get(url("/api"))).is_some());
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        cache.put(entry("/style.css", "body{}"));
        assert!(cache.delete(&url("/style.css")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_roundtrips_to_response() {
        let request = FetchRequest::get(url("/manifest.webmanifest"));
        let mut response = FetchResponse::new(url("/manifest.webmanifest"), StatusCode::OK, "{}");
        response.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/manifest+json"),
        );

        let cached = CacheEntry::from_response(&request, &response)
            .to_response()
            .unwrap();
        assert!(cached.from_cache());
        assert_eq!(cached.status, StatusCode::OK);
        assert_eq!(
            cached.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/manifest+json"
        );
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("v1"));

        storage.open("v2");
        storage.open("v1").put(entry("/", "home"));
        assert_eq!(storage.keys(), vec!["v1", "v2"]);
        assert!(storage.match_url(&url("/")).is_some());

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
        assert!(storage.match_url(&url("/")).is_none());
    }
}
