//! Domain liveness gate.
//!
//! Phishing domains are frequently taken down within hours. Anything that
//! no longer resolves, or that a registrar has placed on hold, is not worth
//! rendering or scoring.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::dns::{DnsLookup, DnsResolve, RecordType};
use crate::domain_utils;
use crate::whois::WhoisLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Live,
    Dead,
    Unknown,
}

/// Liveness verdict together with the DNS answer it was based on
#[derive(Debug, Clone, PartialEq)]
pub struct Liveness {
    pub state: LivenessState,
    pub dns: DnsLookup,
}

impl Liveness {
    /// Only live targets go on to feature extraction.
    pub fn is_analyzable(&self) -> bool {
        self.state == LivenessState::Live
    }
}

/// Registration hold status of a root domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    OnHold,
    NotOnHold,
}

/// Decides whether a URL is worth analysing.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self, url: &str) -> Liveness;
}

pub struct LivenessGate {
    resolver: Arc<dyn DnsResolve>,
    whois: Arc<dyn WhoisLookup>,
}

impl LivenessGate {
    pub fn new(resolver: Arc<dyn DnsResolve>, whois: Arc<dyn WhoisLookup>) -> Self {
        Self { resolver, whois }
    }

    /// Registration-hold lookup for a root domain.
    ///
    /// A failed lookup counts as on hold; a registry that publishes no
    /// status lines at all counts as not on hold.
    pub async fn hold_status(&self, root_domain: &str) -> HoldStatus {
        match self.whois.lookup(root_domain).await {
            Ok(record) => {
                if record.is_on_hold() {
                    info!("{} carries a registration hold: {:?}", root_domain, record.statuses);
                    HoldStatus::OnHold
                } else {
                    HoldStatus::NotOnHold
                }
            }
            Err(e) => {
                debug!("WHOIS lookup failed for {}, treating as on hold: {}", root_domain, e);
                HoldStatus::OnHold
            }
        }
    }
}

#[async_trait]
impl LivenessProbe for LivenessGate {
    async fn check(&self, url: &str) -> Liveness {
        let host = domain_utils::host_name(url);
        let dns = self.resolver.resolve(&host, RecordType::A).await;

        let state = match &dns {
            DnsLookup::Timeout => LivenessState::Unknown,
            DnsLookup::NxDomain | DnsLookup::NoAnswer => LivenessState::Dead,
            DnsLookup::Records(_) => {
                let root = domain_utils::root_domain(url);
                match self.hold_status(&root).await {
                    HoldStatus::OnHold => LivenessState::Dead,
                    HoldStatus::NotOnHold => LivenessState::Live,
                }
            }
        };

        debug!("Liveness for {} ({}): {:?} via DNS {}", url, host, state, dns.label());
        Liveness { state, dns }
    }
}
