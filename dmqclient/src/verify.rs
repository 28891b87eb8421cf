//! Vérification du cookie SESSDATA contre l'API nav de Bilibili.
//!
//! Cette vérification réseau est faite par le contrôleur AVANT de prendre le
//! verrou d'état au démarrage : la durée de détention du verrou reste ainsi
//! indépendante de la latence réseau.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, ORIGIN, REFERER, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use crate::SessdataVerifier;

const NAV_URL: &str = "https://api.bilibili.com/x/web-interface/nav";

const DEFAULT_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

/// Vérificateur SESSDATA basé sur l'endpoint `x/web-interface/nav`.
pub struct NavApiVerifier {
    client: reqwest::Client,
}

impl NavApiVerifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for NavApiVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessdataVerifier for NavApiVerifier {
    async fn verify(&self, sessdata: &str) -> Result<String, String> {
        let sessdata = sessdata.trim();
        if sessdata.is_empty() {
            return Err("SESSDATA is empty".to_string());
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        headers.insert(REFERER, HeaderValue::from_static("https://www.bilibili.com/"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.bilibili.com"));
        let cookie = format!("SESSDATA={}", sessdata);
        let cookie_value = HeaderValue::from_str(&cookie)
            .map_err(|_| "SESSDATA contains invalid characters".to_string())?;
        headers.insert(COOKIE, cookie_value);

        let resp = self
            .client
            .get(NAV_URL)
            .headers(headers)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("SESSDATA check failed, HTTP {}", resp.status()));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("invalid nav response: {}", e))?;

        let code = data.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        if code != 0 {
            debug!(code, "SESSDATA rejected by nav endpoint");
            return Err(format!("SESSDATA is invalid (nav code {})", code));
        }

        let uname = data
            .get("data")
            .and_then(|d| d.get("uname"))
            .and_then(|u| u.as_str())
            .unwrap_or("unknown");
        Ok(format!("SESSDATA valid, user: {}", uname))
    }
}
