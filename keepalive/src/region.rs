//! Cloud Foundry regions and URL-based region detection

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static US_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.us10(-001)?\.hana\.ondemand\.com$").expect("valid US pattern"));
static AP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.ap21\.hana\.ondemand\.com$").expect("valid AP pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionCode {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "AP")]
    Ap,
}

impl RegionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionCode::Us => "US",
            RegionCode::Ap => "AP",
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API and UAA endpoints of one region, plus the hostname pattern of its apps.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: RegionCode,
    pub api_url: String,
    pub uaa_url: String,
    pattern: Regex,
}

impl Region {
    pub fn matches_host(&self, host: &str) -> bool {
        self.pattern.is_match(host)
    }
}

/// The fixed set of supported regions.
#[derive(Debug, Clone)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self {
            regions: vec![
                Region {
                    code: RegionCode::Us,
                    api_url: "https://api.cf.us10-001.hana.ondemand.com".to_string(),
                    uaa_url: "https://uaa.cf.us10-001.hana.ondemand.com".to_string(),
                    pattern: US_PATTERN.clone(),
                },
                Region {
                    code: RegionCode::Ap,
                    api_url: "https://api.cf.ap21.hana.ondemand.com".to_string(),
                    uaa_url: "https://uaa.cf.ap21.hana.ondemand.com".to_string(),
                    pattern: AP_PATTERN.clone(),
                },
            ],
        }
    }
}

impl RegionTable {
    /// Point a region at different API/UAA endpoints, keeping its hostname pattern.
    pub fn with_endpoints(
        mut self,
        code: RegionCode,
        api_url: impl Into<String>,
        uaa_url: impl Into<String>,
    ) -> Self {
        if let Some(region) = self.regions.iter_mut().find(|r| r.code == code) {
            region.api_url = api_url.into();
            region.uaa_url = uaa_url.into();
        }
        self
    }

    pub fn get(&self, code: RegionCode) -> Option<&Region> {
        self.regions.iter().find(|r| r.code == code)
    }

    /// Returns the region whose domain pattern matches the URL's hostname.
    pub fn detect(&self, url: &str) -> Option<&Region> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.regions.iter().find(|r| r.matches_host(host))
    }
}

/// Region detection against the default table.
pub fn detect_region_from_url(url: &str) -> Option<RegionCode> {
    RegionTable::default().detect(url).map(|r| r.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_us_region_with_and_without_suffix() {
        assert_eq!(
            detect_region_from_url("https://myapp.cfapps.us10-001.hana.ondemand.com"),
            Some(RegionCode::Us)
        );
        assert_eq!(
            detect_region_from_url("https://myapp.cfapps.us10.hana.ondemand.com/health"),
            Some(RegionCode::Us)
        );
    }

    #[test]
    fn test_detects_ap_region() {
        assert_eq!(
            detect_region_from_url("https://shop.cfapps.ap21.hana.ondemand.com/"),
            Some(RegionCode::Ap)
        );
    }

    #[test]
    fn test_unknown_hosts_have_no_region() {
        assert_eq!(detect_region_from_url("https://example.com"), None);
        assert_eq!(
            detect_region_from_url("https://app.cfapps.eu10.hana.ondemand.com"),
            None
        );
        assert_eq!(detect_region_from_url("not a url"), None);
    }

    #[test]
    fn test_pattern_is_anchored_to_hostname_end() {
        // the region suffix appearing in the path must not count
        assert_eq!(
            detect_region_from_url("https://example.com/x.ap21.hana.ondemand.com"),
            None
        );
    }

    #[test]
    fn test_endpoint_override_keeps_pattern() {
        let table = RegionTable::default().with_endpoints(
            RegionCode::Us,
            "http://127.0.0.1:1/api",
            "http://127.0.0.1:1/uaa",
        );
        let region = table
            .detect("https://a.cfapps.us10-001.hana.ondemand.com")
            .expect("region");
        assert_eq!(region.api_url, "http://127.0.0.1:1/api");
        assert_eq!(region.uaa_url, "http://127.0.0.1:1/uaa");
    }
}
