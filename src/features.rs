//! Fixed-schema feature vector and the extractor that fills it.

use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LOCATION;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::browser;
use crate::config::AppConfig;
use crate::content::PageContent;
use crate::dns::{DnsResolve, RecordType};
use crate::domain_utils;
use crate::visual;
use crate::whois::{WhoisLookup, WhoisRecord};

pub const FEATURE_COUNT: usize = 29;

/// Sentinel for a signal that could not be computed
pub const UNAVAILABLE: i32 = -1;

/// `screenshot_ocr` value when the page could not be rendered or scored
pub const VISUAL_UNAVAILABLE: i32 = 0;

static SHORTENER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:.+\.)?(?:bit\.ly|bitly\.com|goo\.gl|tinyurl\.com|t\.co|ow\.ly|is\.gd|buff\.ly|adf\.ly|cutt\.ly|shorte\.st|x\.co|tiny\.cc|rebrand\.ly|rb\.gy|s\.id|v\.gd|qr\.ae|bl\.ink|lnkd\.in|db\.tt|po\.st|tr\.im|cli\.gs|yfrog\.com|migre\.me|ff\.im|url4\.eu|twit\.ac|su\.pr|twurl\.nl|snipurl\.com|short\.to|budurl\.com|ping\.fm|post\.ly|just\.as|bkite\.com|snipr\.com|fic\.kr|loopt\.us|doiop\.com|short\.ie|kl\.am|wp\.me|u\.to|j\.mp|1url\.com|tweez\.me|v\.gd|link\.zip\.net|shorturl\.at|tiny\.one|t\.ly)$",
    )
    .unwrap()
});

/// TLDs with strict registration policies or long-standing reputations
const SAFE_TLDS: &[&str] = &[
    "com", "org", "net", "edu", "gov", "mil", "int", "us", "uk", "ca", "au", "de", "fr", "it", "es", "nl", "be",
    "ch", "at", "se", "no", "dk", "fi", "ie", "jp", "kr", "nz", "sg",
];

/// One named slot of the feature vector, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    HavingIpAddress,
    UrlLength,
    UrlDepth,
    ShortiningService,
    HavingAtSymbol,
    DoubleSlashRedirecting,
    PrefixSuffix,
    HavingSubDomain,
    SslfinalState,
    DomainRegistrationLength,
    Favicon,
    Port,
    HttpsToken,
    RequestUrl,
    UrlOfAnchor,
    LinksInTags,
    Sfh,
    SubmittingToEmail,
    AbnormalUrl,
    Redirect,
    OnMouseover,
    Rightclick,
    Popupwindow,
    Iframe,
    AgeOfDomain,
    Dnsrecord,
    MaliciousContent,
    SafeTld,
    ScreenshotOcr,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::HavingIpAddress,
        Feature::UrlLength,
        Feature::UrlDepth,
        Feature::ShortiningService,
        Feature::HavingAtSymbol,
        Feature::DoubleSlashRedirecting,
        Feature::PrefixSuffix,
        Feature::HavingSubDomain,
        Feature::SslfinalState,
        Feature::DomainRegistrationLength,
        Feature::Favicon,
        Feature::Port,
        Feature::HttpsToken,
        Feature::RequestUrl,
        Feature::UrlOfAnchor,
        Feature::LinksInTags,
        Feature::Sfh,
        Feature::SubmittingToEmail,
        Feature::AbnormalUrl,
        Feature::Redirect,
        Feature::OnMouseover,
        Feature::Rightclick,
        Feature::Popupwindow,
        Feature::Iframe,
        Feature::AgeOfDomain,
        Feature::Dnsrecord,
        Feature::MaliciousContent,
        Feature::SafeTld,
        Feature::ScreenshotOcr,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name used in datasets and model files
    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "having_ip_address",
    "url_length",
    "url_depth",
    "shortining_service",
    "having_at_symbol",
    "double_slash_redirecting",
    "prefix_suffix",
    "having_sub_domain",
    "sslfinal_state",
    "domain_registration_length",
    "favicon",
    "port",
    "https_token",
    "request_url",
    "url_of_anchor",
    "links_in_tags",
    "sfh",
    "submitting_to_email",
    "abnormal_url",
    "redirect",
    "on_mouseover",
    "rightclick",
    "popupwindow",
    "iframe",
    "age_of_domain",
    "dnsrecord",
    "malicious_content",
    "safe_tld",
    "screenshot_ocr",
];

/// The 29 ordered feature values for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureVector([i32; FEATURE_COUNT]);

impl FeatureVector {
    /// Every slot set to the unavailable sentinel
    pub fn unavailable() -> Self {
        Self([UNAVAILABLE; FEATURE_COUNT])
    }

    pub fn from_array(values: [i32; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, feature: Feature) -> i32 {
        self.0[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: i32) {
        self.0[feature.index()] = value;
    }

    pub fn to_array(&self) -> [i32; FEATURE_COUNT] {
        self.0
    }

    /// Name-keyed view, in schema order
    pub fn to_mapping(&self) -> Map<String, Value> {
        Feature::ALL
            .iter()
            .map(|f| (f.name().to_string(), Value::from(self.get(*f))))
            .collect()
    }
}

/// Which remote sub-signals the extractor may use
#[derive(Debug, Clone, Copy)]
pub struct ExtractorOptions {
    pub whois: bool,
    pub visual: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self { whois: true, visual: true }
    }
}

/// Page fetched over plain HTTP with redirects followed by hand
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub redirects: usize,
    pub body: String,
}

/// Anything that can turn a URL into a feature vector.
#[async_trait::async_trait]
pub trait FeatureSource: Send + Sync {
    async fn extract(&self, url: &str) -> FeatureVector;
}

pub struct FeatureExtractor {
    config: AppConfig,
    options: ExtractorOptions,
    resolver: Arc<dyn DnsResolve>,
    whois: Arc<dyn WhoisLookup>,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl FeatureExtractor {
    pub fn new(
        config: AppConfig,
        resolver: Arc<dyn DnsResolve>,
        whois: Arc<dyn WhoisLookup>,
        options: ExtractorOptions,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.http.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.http.user_agent.clone())
            // Redirects are followed manually so they can be counted
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;
        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.http.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create certificate-probe HTTP client")?;

        Ok(Self {
            config,
            options,
            resolver,
            whois,
            client,
            insecure_client,
        })
    }

    /// Fetch `url`, following up to `max_redirects` redirects.
    pub async fn fetch_page(&self, url: &str) -> Option<FetchedPage> {
        let mut current = Url::parse(&domain_utils::normalize_url(url)).ok()?;
        let mut redirects = 0usize;

        loop {
            let response = match self.client.get(current.clone()).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!("Failed to fetch {}: {}", current, e);
                    return None;
                }
            };

            if response.status().is_redirection() {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok());
                match next {
                    Some(next) if redirects < self.config.http.max_redirects => {
                        redirects += 1;
                        debug!("Redirect {} for {}: {}", redirects, url, next);
                        current = next;
                        continue;
                    }
                    Some(_) => {
                        debug!("Giving up on {} after {} redirects", url, redirects);
                        redirects += 1;
                        return Some(FetchedPage {
                            final_url: current.to_string(),
                            redirects,
                            body: String::new(),
                        });
                    }
                    None => {}
                }
            }

            let final_url = current.to_string();
            return match response.text().await {
                Ok(body) => Some(FetchedPage { final_url, redirects, body }),
                Err(e) => {
                    debug!("Failed to read body of {}: {}", final_url, e);
                    None
                }
            };
        }
    }

    /// Rendered page source: the browser DOM when available, else the
    /// HTTP body, else an empty string.
    pub async fn page_source(&self, url: &str) -> String {
        if let Some(html) = browser::render_source(&self.config.browser, url).await {
            return html;
        }
        self.fetch_page(url).await.map(|page| page.body).unwrap_or_default()
    }

    /// HTTPS with a trusted certificate, HTTPS that only works with
    /// certificate checks off, or no HTTPS at all.
    async fn ssl_state(&self, url: &str) -> i32 {
        let normalized = domain_utils::normalize_url(url);
        if !normalized.to_lowercase().starts_with("https://") {
            return -1;
        }
        if self.client.head(&normalized).send().await.is_ok() {
            return 1;
        }
        if self.insecure_client.head(&normalized).send().await.is_ok() {
            return 0;
        }
        -1
    }

    async fn whois_record(&self, url: &str) -> Option<WhoisRecord> {
        if !self.options.whois {
            return None;
        }
        let root = domain_utils::root_domain(url);
        if domain_utils::is_ip_literal(&root) || root.is_empty() {
            return None;
        }
        match self.whois.lookup(&root).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("WHOIS unavailable for {}: {}", root, e);
                None
            }
        }
    }

    async fn dns_record(&self, url: &str) -> i32 {
        let host = domain_utils::host_name(url);
        if self.resolver.resolve(&host, RecordType::A).await.has_records() {
            1
        } else {
            -1
        }
    }

    /// Render the page and check it against the configured brands.
    async fn screenshot_signal(&self, url: &str) -> i32 {
        if !self.options.visual {
            return VISUAL_UNAVAILABLE;
        }
        let timeout = self.config.browser.page_load_timeout();
        let Some(artifact) = browser::capture_page(&self.config.browser, url, timeout).await else {
            return VISUAL_UNAVAILABLE;
        };

        let visual_config = self.config.visual.clone();
        let root = domain_utils::root_domain(url);
        // The artifact moves into the task and is deleted when scoring ends
        let task = tokio::task::spawn_blocking(move || -> Result<Option<String>, visual::VisualError> {
            let shot = visual::load_gray(artifact.path())?;
            let text = if visual_config.ocr_enabled {
                match visual::ocr_text(&shot) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        debug!("OCR skipped: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            Ok(visual::impersonated_brand(&shot, &root, &visual_config, text.as_deref()))
        });

        match task.await {
            Ok(Ok(Some(brand))) => {
                debug!("{} looks like an impersonation of {}", url, brand);
                -1
            }
            Ok(Ok(None)) => 1,
            Ok(Err(e)) => {
                debug!("Visual scoring failed for {}: {}", url, e);
                VISUAL_UNAVAILABLE
            }
            Err(e) => {
                warn!("Visual scoring task for {} panicked: {}", url, e);
                VISUAL_UNAVAILABLE
            }
        }
    }

    /// Build the full vector. Never fails: unavailable signals take their
    /// sentinel value.
    pub async fn extract(&self, url: &str) -> FeatureVector {
        let mut vector = lexical_features(url);

        let (page, ssl, record, dns, visual_signal) = tokio::join!(
            self.fetch_page(url),
            self.ssl_state(url),
            self.whois_record(url),
            self.dns_record(url),
            self.screenshot_signal(url),
        );

        vector.set(Feature::SslfinalState, ssl);
        vector.set(Feature::Dnsrecord, dns);
        vector.set(Feature::ScreenshotOcr, visual_signal);

        let now = Utc::now();
        let host = domain_utils::host_name(url);
        if let Some(record) = &record {
            if let Some(expires) = record.expires {
                vector.set(
                    Feature::DomainRegistrationLength,
                    if (expires - now).num_days() > 365 { 1 } else { -1 },
                );
            }
            if let Some(created) = record.created {
                vector.set(Feature::AgeOfDomain, if (now - created).num_days() >= 180 { 1 } else { -1 });
            }
            if let Some(name) = &record.domain_name {
                vector.set(Feature::AbnormalUrl, if host.contains(name.as_str()) { 1 } else { -1 });
            }
        }

        if let Some(page) = &page {
            vector.set(Feature::Redirect, redirect_band(page.redirects));
            if !page.body.trim().is_empty() {
                apply_content_features(&mut vector, &PageContent::parse(&page.body, &page.final_url));
            }
        }

        debug!("Extracted features for {}: {:?}", url, vector.to_array());
        vector
    }
}

#[async_trait::async_trait]
impl FeatureSource for FeatureExtractor {
    async fn extract(&self, url: &str) -> FeatureVector {
        FeatureExtractor::extract(self, url).await
    }
}

fn redirect_band(redirects: usize) -> i32 {
    match redirects {
        0..=1 => 1,
        2..=3 => 0,
        _ => -1,
    }
}

fn apply_content_features(vector: &mut FeatureVector, page: &PageContent) {
    vector.set(Feature::Favicon, page.favicon());
    vector.set(Feature::RequestUrl, page.request_url());
    vector.set(Feature::UrlOfAnchor, page.url_of_anchor());
    vector.set(Feature::LinksInTags, page.links_in_tags());
    vector.set(Feature::Sfh, page.sfh());
    vector.set(Feature::SubmittingToEmail, page.submitting_to_email());
    vector.set(Feature::OnMouseover, page.on_mouseover());
    vector.set(Feature::Rightclick, page.rightclick());
    vector.set(Feature::Popupwindow, page.popupwindow());
    vector.set(Feature::Iframe, page.iframe());
    vector.set(Feature::MaliciousContent, page.malicious_content());
}

/// Path segments between the host and any query or fragment
fn url_depth(url: &str) -> i32 {
    let trimmed = url.trim();
    let rest = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    // Slashes inside a query or fragment are not path separators
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => return 0,
    };
    path.split('/').filter(|s| !s.is_empty()).count() as i32
}

/// Features computed from the URL text alone. Everything else starts at
/// the unavailable sentinel.
pub fn lexical_features(url: &str) -> FeatureVector {
    let mut vector = FeatureVector::unavailable();
    let host = domain_utils::host_name(url);
    let len = url.chars().count();

    let flag = |phishy: bool| if phishy { -1 } else { 1 };

    vector.set(Feature::HavingIpAddress, flag(domain_utils::is_ip_literal(&host)));
    vector.set(
        Feature::UrlLength,
        match len {
            0..=53 => 1,
            54..=75 => 0,
            _ => -1,
        },
    );
    vector.set(Feature::UrlDepth, url_depth(url));
    vector.set(Feature::ShortiningService, flag(SHORTENER_REGEX.is_match(&host)));
    vector.set(Feature::HavingAtSymbol, flag(url.contains('@')));
    vector.set(
        Feature::DoubleSlashRedirecting,
        flag(url.rfind("//").map(|pos| pos > 6).unwrap_or(false)),
    );
    vector.set(Feature::PrefixSuffix, flag(host.contains('-')));

    let without_www = host.strip_prefix("www.").unwrap_or(&host);
    vector.set(
        Feature::HavingSubDomain,
        match without_www.matches('.').count() {
            0..=1 => 1,
            2 => 0,
            _ => -1,
        },
    );
    vector.set(
        Feature::Port,
        flag(domain_utils::explicit_port(url).map(|p| p != 80 && p != 443).unwrap_or(false)),
    );
    vector.set(Feature::HttpsToken, flag(host.contains("https")));

    let tld = domain_utils::top_level_domain(url);
    vector.set(Feature::SafeTld, if SAFE_TLDS.contains(&tld.as_str()) { 1 } else { -1 });

    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_29_names_in_enum_order() {
        assert_eq!(Feature::ALL.len(), 29);
        assert_eq!(FEATURE_NAMES.len(), 29);
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }
        assert_eq!(Feature::HavingIpAddress.name(), "having_ip_address");
        assert_eq!(Feature::ScreenshotOcr.name(), "screenshot_ocr");
        assert_eq!(Feature::Sfh.name(), "sfh");
    }

    #[test]
    fn test_mapping_matches_array() {
        let mut values = [0i32; FEATURE_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as i32 - 10;
        }
        let vector = FeatureVector::from_array(values);
        let mapping = vector.to_mapping();
        let array = vector.to_array();
        assert_eq!(mapping.len(), FEATURE_COUNT);
        for (i, (name, value)) in mapping.iter().enumerate() {
            assert_eq!(name, FEATURE_NAMES[i]);
            assert_eq!(value.as_i64(), Some(array[i] as i64));
        }
    }

    #[test]
    fn test_lexical_features_for_plain_url() {
        let v = lexical_features("https://www.example.com/account/login");
        assert_eq!(v.get(Feature::HavingIpAddress), 1);
        assert_eq!(v.get(Feature::UrlLength), 1);
        assert_eq!(v.get(Feature::UrlDepth), 2);
        assert_eq!(v.get(Feature::ShortiningService), 1);
        assert_eq!(v.get(Feature::HavingAtSymbol), 1);
        assert_eq!(v.get(Feature::DoubleSlashRedirecting), 1);
        assert_eq!(v.get(Feature::PrefixSuffix), 1);
        assert_eq!(v.get(Feature::HavingSubDomain), 1);
        assert_eq!(v.get(Feature::Port), 1);
        assert_eq!(v.get(Feature::HttpsToken), 1);
        assert_eq!(v.get(Feature::SafeTld), 1);
        // Network-backed slots stay at the sentinel
        assert_eq!(v.get(Feature::SslfinalState), UNAVAILABLE);
        assert_eq!(v.get(Feature::Favicon), UNAVAILABLE);
    }

    #[test]
    fn test_lexical_features_for_suspicious_url() {
        let url = "http://0x7f000001:8080/secure-login//http://paypal.com@evil.test/a/b/c?session=0123456789";
        let v = lexical_features(url);
        assert_eq!(v.get(Feature::HavingAtSymbol), -1);
        assert_eq!(v.get(Feature::DoubleSlashRedirecting), -1);
        assert_eq!(v.get(Feature::UrlLength), -1);

        let v = lexical_features("http://192.168.0.1:8080/login");
        assert_eq!(v.get(Feature::HavingIpAddress), -1);
        assert_eq!(v.get(Feature::Port), -1);
        assert_eq!(v.get(Feature::SafeTld), -1);

        let v = lexical_features("http://https-paypal.secure.account.verify.xyz/");
        assert_eq!(v.get(Feature::PrefixSuffix), -1);
        assert_eq!(v.get(Feature::HttpsToken), -1);
        assert_eq!(v.get(Feature::HavingSubDomain), -1);
        assert_eq!(v.get(Feature::SafeTld), -1);

        assert_eq!(lexical_features("https://bit.ly/3xYz").get(Feature::ShortiningService), -1);
        assert_eq!(lexical_features("http://login.example.com/").get(Feature::HavingSubDomain), 0);
    }

    #[test]
    fn test_url_depth() {
        assert_eq!(url_depth("http://example.com"), 0);
        assert_eq!(url_depth("http://example.com/"), 0);
        assert_eq!(url_depth("http://example.com/a//b/?q=/x/y"), 2);
        assert_eq!(url_depth("example.com/a/b/c#frag/d"), 3);
        assert_eq!(url_depth("http://example.com?next=/a/b/c"), 0);
        assert_eq!(url_depth("http://example.com#/x/y"), 0);
        assert_eq!(url_depth("http://example.com/login?next=/a/b"), 1);
    }

    #[test]
    fn test_redirect_band() {
        assert_eq!(redirect_band(0), 1);
        assert_eq!(redirect_band(1), 1);
        assert_eq!(redirect_band(3), 0);
        assert_eq!(redirect_band(4), -1);
    }
}
