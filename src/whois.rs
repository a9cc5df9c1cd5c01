use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Command;
use std::time::Duration;
use tracing::debug;
use whois_rust::{WhoIs, WhoIsLookupOptions};

use crate::config::WhoisConfig;

static STATUS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:domain\s+)?status:\s*(.+?)\s*$").unwrap()
});

static CREATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:creation date|created(?: on)?|registered(?: on)?|registration time|domain registration date):\s*(.+?)\s*$").unwrap()
});

static EXPIRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:registry expiry date|registrar registration expiration date|expiration date|expiry date|expires(?: on)?|paid-till):\s*(.+?)\s*$").unwrap()
});

static DOMAIN_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*domain(?: name)?:\s*([A-Za-z0-9.\-]+)\s*$").unwrap()
});

/// Fields parsed out of a raw WHOIS response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    pub domain_name: Option<String>,
    /// EPP status strings; `None` when the registry publishes none
    pub statuses: Option<Vec<String>>,
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

impl WhoisRecord {
    pub fn parse(raw: &str) -> Self {
        let statuses: Vec<String> = STATUS_REGEX
            .captures_iter(raw)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
            .collect();

        Self {
            domain_name: DOMAIN_NAME_REGEX
                .captures(raw)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_lowercase()),
            statuses: if statuses.is_empty() { None } else { Some(statuses) },
            created: first_date(&CREATION_REGEX, raw),
            expires: first_date(&EXPIRY_REGEX, raw),
        }
    }

    /// True when any status carries a registrar or registry hold.
    pub fn is_on_hold(&self) -> bool {
        self.statuses
            .as_ref()
            .map(|statuses| statuses.iter().any(|s| s.contains("clientHold") || s.contains("serverHold")))
            .unwrap_or(false)
    }
}

fn first_date(regex: &Regex, raw: &str) -> Option<DateTime<Utc>> {
    regex
        .captures_iter(raw)
        .filter_map(|cap| cap.get(1))
        .find_map(|m| parse_whois_date(m.as_str()))
}

/// Parse the handful of date layouts registries actually emit.
pub fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d-%b-%Y %H:%M:%S",
    ];
    for fmt in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc());
        }
    }

    // Date-only layouts, ignoring any trailing timezone text
    let date_part = value.split_whitespace().next().unwrap_or(value);
    let date_formats = ["%Y-%m-%d", "%d-%b-%Y", "%d.%m.%Y", "%Y.%m.%d", "%Y/%m/%d", "%d/%m/%Y"];
    for fmt in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

/// Registration data source.
#[async_trait]
pub trait WhoisLookup: Send + Sync {
    /// Raw lookup. `Err` means the registry could not be queried or
    /// answered with something unusable.
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord>;
}

/// whois-rust client with a system `whois` fallback
pub struct WhoisClient {
    timeout: Duration,
    system_fallback: bool,
}

impl WhoisClient {
    pub fn from_config(config: &WhoisConfig) -> Self {
        Self {
            timeout: config.timeout(),
            system_fallback: config.system_fallback,
        }
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord> {
        debug!("Looking up registration data for domain: {}", domain);

        let raw = match try_native_whois(domain, self.timeout).await {
            Ok(raw) => raw,
            Err(e) if self.system_fallback => {
                debug!("Native WHOIS failed for {} ({}), trying system whois", domain, e);
                try_system_whois(domain, self.timeout).await?
            }
            Err(e) => return Err(e),
        };

        if raw.trim().is_empty() {
            return Err(anyhow!("Empty WHOIS response for {}", domain));
        }
        if is_not_found_response(&raw) {
            return Err(anyhow!("No WHOIS match for {}", domain));
        }

        Ok(WhoisRecord::parse(&raw))
    }
}

fn is_not_found_response(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    ["no match for", "not found", "no data found", "no entries found", "domain not found"]
        .iter()
        .any(|marker| lower.contains(marker))
        && !lower.contains("domain status:")
}

async fn try_native_whois(domain: &str, timeout: Duration) -> Result<String> {
    debug!("Trying whois-rust library lookup for domain: {}", domain);

    let whois = WhoIs::from_path("whois-servers.json")
        .or_else(|_| {
            WhoIs::from_string(r#"{
                "com": "whois.verisign-grs.com",
                "net": "whois.verisign-grs.com",
                "org": "whois.pir.org",
                "info": "whois.afilias.net",
                "io": "whois.nic.io",
                "co": "whois.nic.co",
                "": "whois.iana.org"
            }"#)
        })
        .map_err(|e| anyhow!("Failed to create WHOIS client: {}", e))?;

    let mut lookup_options = WhoIsLookupOptions::from_string(domain)
        .map_err(|e| anyhow!("Invalid domain for WHOIS lookup: {}", e))?;
    lookup_options.timeout = Some(timeout);

    match tokio::time::timeout(
        timeout + Duration::from_secs(1),
        tokio::task::spawn_blocking(move || whois.lookup(lookup_options)),
    )
    .await
    {
        Ok(Ok(Ok(whois_result))) => Ok(whois_result),
        Ok(Ok(Err(e))) => Err(anyhow!("whois-rust lookup failed: {}", e)),
        Ok(Err(_)) => Err(anyhow!("whois-rust lookup task panicked")),
        Err(_) => Err(anyhow!("whois-rust lookup timed out")),
    }
}

async fn try_system_whois(domain: &str, timeout: Duration) -> Result<String> {
    let domain_owned = domain.to_string();

    match tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || execute_whois_command(&domain_owned)),
    )
    .await
    {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Err(anyhow!("System whois failed: {}", e)),
        Ok(Err(_)) => Err(anyhow!("System whois task panicked")),
        Err(_) => Err(anyhow!("System whois timed out")),
    }
}

fn execute_whois_command(domain: &str) -> Result<String> {
    let whois_commands = if cfg!(windows) {
        vec!["whois.exe", "whois"]
    } else {
        vec!["whois", "/usr/bin/whois", "/usr/local/bin/whois"]
    };

    for cmd in whois_commands {
        match Command::new(cmd).arg(domain).output() {
            Ok(output) => {
                if output.status.success() {
                    return Ok(String::from_utf8_lossy(&output.stdout).to_string());
                }
            }
            Err(_) => continue,
        }
    }

    Err(anyhow!("No working whois command found"))
}
