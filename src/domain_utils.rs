//! URL and domain helpers shared by the liveness gate and the feature extractor.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Prepend `http://` when the URL carries no scheme.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Network-location component of a URL (userinfo and port included).
///
/// Works with or without a scheme: `http://a.example.com:8080/x` and
/// `a.example.com:8080/x` both yield `a.example.com:8080`.
pub fn host_domain(url: &str) -> String {
    let trimmed = url.trim();
    let rest = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed.strip_prefix("//").unwrap_or(trimmed),
    };
    let end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    rest[..end].to_string()
}

/// Host name only: the network location without userinfo or port, lowercased.
pub fn host_name(url: &str) -> String {
    let netloc = host_domain(url);
    let without_user = match netloc.rfind('@') {
        Some(idx) => &netloc[idx + 1..],
        None => netloc.as_str(),
    };

    // Bracketed IPv6 literal keeps its colons
    if let Some(stripped) = without_user.strip_prefix('[') {
        if let Some(close) = stripped.find(']') {
            return stripped[..close].to_lowercase();
        }
    }

    let host = match without_user.rfind(':') {
        Some(idx) if without_user[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &without_user[..idx]
        }
        _ => without_user,
    };
    host.trim_end_matches('.').to_lowercase()
}

/// Explicit port in the network location, if any.
pub fn explicit_port(url: &str) -> Option<u16> {
    let netloc = host_domain(url);
    let without_user = match netloc.rfind('@') {
        Some(idx) => &netloc[idx + 1..],
        None => netloc.as_str(),
    };
    let after_bracket = match without_user.rfind(']') {
        Some(idx) => &without_user[idx + 1..],
        None => without_user,
    };
    after_bracket
        .rfind(':')
        .and_then(|idx| after_bracket[idx + 1..].parse::<u16>().ok())
}

/// Registrable portion of the host: its last two labels, or the whole
/// host when it has fewer than two.
pub fn root_domain(url: &str) -> String {
    let host = host_name(url);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 1 {
        parts[parts.len() - 2..].join(".")
    } else {
        host
    }
}

/// Top-level label of the host (empty for IP literals).
pub fn top_level_domain(url: &str) -> String {
    let host = host_name(url);
    if is_ip_literal(&host) {
        return String::new();
    }
    host.rsplit('.').next().unwrap_or_default().to_string()
}

/// True for dotted-quad IPv4, IPv6, and the hex/decimal encodings
/// (`0x7f000001`, `2130706433`) phishing kits use to hide an address.
pub fn is_ip_literal(host: &str) -> bool {
    if host.parse::<Ipv4Addr>().is_ok() || host.parse::<Ipv6Addr>().is_ok() {
        return true;
    }
    if let Some(hex) = host.strip_prefix("0x").or_else(|| host.strip_prefix("0X")) {
        return !hex.is_empty() && hex.len() <= 8 && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if !host.is_empty() && host.len() <= 10 && host.chars().all(|c| c.is_ascii_digit()) {
        return host.parse::<u64>().map(|n| n <= u32::MAX as u64).unwrap_or(false);
    }
    // Dotted hex octets such as 0xC0.0xA8.0x00.0x01
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            o.strip_prefix("0x")
                .map(|h| !h.is_empty() && h.len() <= 2 && h.chars().all(|c| c.is_ascii_hexdigit()))
                .unwrap_or(false)
        })
}

/// Same registrable domain check used for "external resource" ratios.
pub fn is_same_site(resource_host: &str, page_host: &str) -> bool {
    if resource_host.is_empty() {
        return true;
    }
    let resource_root = root_domain(resource_host);
    let page_root = root_domain(page_host);
    resource_root.eq_ignore_ascii_case(&page_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_domain_keeps_netloc() {
        assert_eq!(host_domain("https://login.example.com/path?q=1"), "login.example.com");
        assert_eq!(host_domain("http://example.com:8080/"), "example.com:8080");
        assert_eq!(host_domain("ftp://files.example.org"), "files.example.org");
        assert_eq!(host_domain("example.com/index.html"), "example.com");
        assert_eq!(host_domain("http://user@evil.test/x"), "user@evil.test");
    }

    #[test]
    fn test_host_name_strips_user_and_port() {
        assert_eq!(host_name("http://user:pw@Evil.Test:8443/x"), "evil.test");
        assert_eq!(host_name("http://[::1]:8080/"), "::1");
        assert_eq!(host_name("https://example.com./"), "example.com");
    }

    #[test]
    fn test_root_domain() {
        assert_eq!(root_domain("https://a.b.example.com/x"), "example.com");
        assert_eq!(root_domain("http://example.com"), "example.com");
        assert_eq!(root_domain("http://localhost/"), "localhost");
        assert_eq!(root_domain("http://secure.paypal.com.evil.co/login"), "evil.co");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_explicit_port() {
        assert_eq!(explicit_port("http://example.com:8080/"), Some(8080));
        assert_eq!(explicit_port("http://example.com/"), None);
        assert_eq!(explicit_port("http://[::1]:9000/"), Some(9000));
    }

    #[test]
    fn test_ip_literal_detection() {
        assert!(is_ip_literal("192.168.0.1"));
        assert!(is_ip_literal("::1"));
        assert!(is_ip_literal("0x7f000001"));
        assert!(is_ip_literal("2130706433"));
        assert!(is_ip_literal("0xC0.0xA8.0x00.0x01"));
        assert!(!is_ip_literal("example.com"));
        assert!(!is_ip_literal("99999999999"));
    }

    #[test]
    fn test_is_same_site() {
        assert!(is_same_site("cdn.example.com", "www.example.com"));
        assert!(is_same_site("", "www.example.com"));
        assert!(!is_same_site("tracker.net", "www.example.com"));
    }

    #[test]
    fn test_top_level_domain() {
        assert_eq!(top_level_domain("https://www.example.org/"), "org");
        assert_eq!(top_level_domain("http://10.0.0.1/"), "");
    }
}
