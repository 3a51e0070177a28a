//! Album artwork lookup via the iTunes Search API
//!
//! Best-effort: any failure returns an empty URL and the presence
//! activity simply goes without art. Results (including misses) are
//! cached per (artist, album) for the lifetime of the process.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "artworkUrl100", default)]
    artwork_url_100: String,
}

pub struct ArtworkLookup {
    cache: Mutex<HashMap<String, String>>,
    client: Option<reqwest::Client>,
    endpoint: String,
}

impl ArtworkLookup {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .ok();

        Self {
            cache: Mutex::new(HashMap::new()),
            client,
            endpoint: ITUNES_SEARCH_URL.to_string(),
        }
    }

    /// Artwork URL for the album, or empty when unavailable.
    pub async fn lookup(&self, artist: &str, album: &str) -> String {
        let key = format!("{}|{}", artist, album);

        {
            let cache = self.cache.lock().await;
            if let Some(url) = cache.get(&key) {
                return url.clone();
            }
        }

        let url = self.fetch(artist, album).await;
        self.cache.lock().await.insert(key, url.clone());
        url
    }

    async fn fetch(&self, artist: &str, album: &str) -> String {
        let Some(client) = &self.client else {
            return String::new();
        };

        let response = match client
            .get(&self.endpoint)
            .query(&[
                ("term", format!("{} {}", artist, album).as_str()),
                ("entity", "album"),
                ("limit", "1"),
            ])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "artwork search rejected");
                return String::new();
            }
            Err(e) => {
                debug!(error = %e, "artwork search failed");
                return String::new();
            }
        };

        let parsed: SearchResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "artwork response unparseable");
                return String::new();
            }
        };

        match parsed.results.first() {
            Some(result) if !result.artwork_url_100.is_empty() => {
                upscale_artwork_url(&result.artwork_url_100)
            }
            _ => String::new(),
        }
    }
}

impl Default for ArtworkLookup {
    fn default() -> Self {
        Self::new()
    }
}

/// The search API returns 100x100 thumbnails; the same CDN serves
/// 600x600 under a predictable path.
fn upscale_artwork_url(url: &str) -> String {
    url.replacen("100x100bb", "600x600bb", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upscales_thumbnail_urls() {
        assert_eq!(
            upscale_artwork_url("https://example.org/a/100x100bb.jpg"),
            "https://example.org/a/600x600bb.jpg"
        );
        // Unexpected shapes pass through untouched.
        assert_eq!(
            upscale_artwork_url("https://example.org/a/cover.jpg"),
            "https://example.org/a/cover.jpg"
        );
    }

    #[tokio::test]
    async fn cache_short_circuits_lookups() {
        let lookup = ArtworkLookup::new();
        lookup
            .cache
            .lock()
            .await
            .insert("Artist|Album".to_string(), "cached-url".to_string());

        assert_eq!(lookup.lookup("Artist", "Album").await, "cached-url");
    }

    #[test]
    fn search_response_parses() {
        let body = r#"{"resultCount":1,"results":[{"artworkUrl100":"https://x/100x100bb.jpg"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].artwork_url_100, "https://x/100x100bb.jpg");
    }
}
