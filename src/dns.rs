use async_trait::async_trait;
use hickory_resolver::config::{LookupIpStrategy, NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::debug;

use crate::config::DnsConfig;

pub use hickory_resolver::proto::rr::RecordType;

/// Outcome of a single DNS lookup.
///
/// Callers need to tell all four apart: a missing domain and a slow
/// resolver mean different things to the liveness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsLookup {
    /// The name exists and has records of the requested type
    Records(Vec<String>),
    /// The name does not exist
    NxDomain,
    /// The resolver did not answer within the configured timeout
    Timeout,
    /// No records of this type, or any other resolver failure
    NoAnswer,
}

impl DnsLookup {
    pub fn has_records(&self) -> bool {
        matches!(self, DnsLookup::Records(records) if !records.is_empty())
    }

    pub fn label(&self) -> &'static str {
        match self {
            DnsLookup::Records(_) => "records",
            DnsLookup::NxDomain => "nxdomain",
            DnsLookup::Timeout => "timeout",
            DnsLookup::NoAnswer => "no answer",
        }
    }
}

/// Anything that can answer a DNS question.
#[async_trait]
pub trait DnsResolve: Send + Sync {
    async fn resolve(&self, domain: &str, record_type: RecordType) -> DnsLookup;
}

/// hickory-backed resolver
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsResolver {
    /// Build a resolver from configuration. Explicit name servers take
    /// precedence over the system configuration.
    pub fn from_config(config: &DnsConfig) -> anyhow::Result<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeout();
        opts.attempts = config.attempts;
        opts.ip_strategy = LookupIpStrategy::Ipv4thenIpv6;
        opts.use_hosts_file = true;

        let resolver = if config.name_servers.is_empty() {
            match hickory_resolver::system_conf::read_system_conf() {
                Ok((system_config, _)) => TokioAsyncResolver::tokio(system_config, opts),
                Err(e) => {
                    debug!("System resolver configuration unavailable ({}), using Cloudflare", e);
                    TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts)
                }
            }
        } else {
            let mut resolver_config = ResolverConfig::new();
            for address in &config.name_servers {
                let socket_addr = address
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid DNS server address '{}': {}", address, e))?;
                resolver_config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));
            }
            TokioAsyncResolver::tokio(resolver_config, opts)
        };

        // Overall ceiling across every attempt
        let timeout = config.timeout() * config.attempts.max(1) as u32 + Duration::from_millis(500);

        Ok(Self { resolver, timeout })
    }
}

#[async_trait]
impl DnsResolve for DnsResolver {
    async fn resolve(&self, domain: &str, record_type: RecordType) -> DnsLookup {
        resolve_dns(&self.resolver, domain, record_type, self.timeout).await
    }
}

/// Look up `record_type` records for `domain` and classify the result.
pub async fn resolve_dns(
    resolver: &TokioAsyncResolver,
    domain: &str,
    record_type: RecordType,
    timeout: Duration,
) -> DnsLookup {
    let domain = domain.trim().trim_end_matches('.');
    if domain.is_empty() {
        return DnsLookup::NoAnswer;
    }

    debug!("Querying {} records for domain: {}", record_type, domain);

    match tokio::time::timeout(timeout, resolver.lookup(domain, record_type)).await {
        Ok(Ok(lookup)) => {
            let records: Vec<String> = lookup.iter().map(|rdata| rdata.to_string()).collect();
            debug!("Found {} {} records for {}", records.len(), record_type, domain);
            if records.is_empty() {
                DnsLookup::NoAnswer
            } else {
                DnsLookup::Records(records)
            }
        }
        Ok(Err(e)) => {
            let outcome = classify_error(&e);
            debug!("{} lookup for {} failed ({}): {}", record_type, domain, outcome.label(), e);
            outcome
        }
        Err(_) => {
            debug!("{} lookup for {} timed out after {:?}", record_type, domain, timeout);
            DnsLookup::Timeout
        }
    }
}

/// Map a resolver error onto the lookup outcome it represents.
pub fn classify_error(error: &ResolveError) -> DnsLookup {
    classify_error_kind(error.kind())
}

fn classify_error_kind(kind: &ResolveErrorKind) -> DnsLookup {
    match kind {
        ResolveErrorKind::NoRecordsFound { response_code, .. } if *response_code == ResponseCode::NXDomain => {
            DnsLookup::NxDomain
        }
        ResolveErrorKind::NoRecordsFound { .. } => DnsLookup::NoAnswer,
        ResolveErrorKind::Timeout => DnsLookup::Timeout,
        _ => DnsLookup::NoAnswer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_is_timeout() {
        assert_eq!(classify_error_kind(&ResolveErrorKind::Timeout), DnsLookup::Timeout);
    }

    #[test]
    fn test_other_errors_are_no_answer() {
        let kind = ResolveErrorKind::Message("connection refused");
        assert_eq!(classify_error_kind(&kind), DnsLookup::NoAnswer);
    }

    #[test]
    fn test_has_records() {
        assert!(DnsLookup::Records(vec!["93.184.216.34".to_string()]).has_records());
        assert!(!DnsLookup::Records(vec![]).has_records());
        assert!(!DnsLookup::NxDomain.has_records());
    }

    #[tokio::test]
    async fn test_empty_domain_is_no_answer() {
        let resolver = DnsResolver::from_config(&DnsConfig {
            timeout_secs: 1,
            attempts: 1,
            name_servers: vec!["127.0.0.1:53".to_string()],
        })
        .unwrap();
        assert_eq!(resolver.resolve("", RecordType::A).await, DnsLookup::NoAnswer);
    }
}
