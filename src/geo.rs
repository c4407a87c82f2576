//! Geo-IP lookup for "where is my laptop" answers
//!
//! The gateway only knows a device's public address; turning that into a
//! city is an external service's job. The default locator answers nothing,
//! which degrades the webhook response to "Unknown location".

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;

/// A resolved coarse location
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub city: String,
    #[serde(rename = "region_name")]
    pub region: String,
    #[serde(rename = "country_name")]
    pub country: String,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.city, self.region, self.country)
    }
}

/// Resolves an IP address to a coarse location
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Best-effort lookup; `None` means the location is unknown
    async fn locate(&self, ip: IpAddr) -> Option<Location>;
}

/// Locator that never knows anything; used when no geo service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeoLocator;

#[async_trait]
impl GeoLocator for NullGeoLocator {
    async fn locate(&self, _ip: IpAddr) -> Option<Location> {
        None
    }
}

/// Locator backed by an HTTP geo-IP service returning
/// `{"city": ..., "region_name": ..., "country_name": ...}` for `GET {base}/{ip}`
#[derive(Debug, Clone)]
pub struct HttpGeoLocator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGeoLocator {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> Option<Location> {
        let url = format!("{}/{ip}", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, %ip, "geo lookup request failed");
                return None;
            }
        };

        match response.json::<Location>().await {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::warn!(error = %e, %ip, "geo lookup returned unusable body");
                None
            }
        }
    }
}
