//! HTML content signals computed from a fetched page.
//!
//! Every function here is pure over the page source and the page URL so the
//! extractor can score a document regardless of how it was obtained.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain_utils;

// Selector::parse only fails on invalid CSS; these are fixed valid selectors.
static FAVICON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[rel~="icon"], link[rel="shortcut icon"], link[rel="apple-touch-icon"]"#).unwrap()
});

static MEDIA_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img[src], audio[src], video[src], embed[src], source[src], iframe[src]").unwrap()
});

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a").unwrap()
});

static TAG_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("link[href], script[src], meta[content]").unwrap()
});

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("form").unwrap()
});

static PASSWORD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"input[type="password"]"#).unwrap()
});

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script").unwrap()
});

static IFRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("iframe").unwrap()
});

static MOUSEOVER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)onmouseover\s*=\s*["'][^"']*window\.status"#).unwrap()
});

static RIGHTCLICK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)event\.button\s*={2,3}\s*2|oncontextmenu\s*=\s*.?return\s+false|contextmenu.{0,80}preventDefault").unwrap()
});

static MAIL_CALL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bmail\s*\(").unwrap()
});

static OBFUSCATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)eval\s*\(\s*(?:unescape|atob|function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k)|document\.write\s*\(\s*(?:unescape|atob)|String\.fromCharCode\s*\((?:\s*\d+\s*,){10,}").unwrap()
});

/// Page being scored: its parsed DOM and the URL it was served from
pub struct PageContent {
    document: Html,
    raw: String,
    base: Option<Url>,
    host: String,
}

impl PageContent {
    pub fn parse(html: &str, page_url: &str) -> Self {
        let normalized = domain_utils::normalize_url(page_url);
        Self {
            document: Html::parse_document(html),
            raw: html.to_string(),
            base: Url::parse(&normalized).ok(),
            host: domain_utils::host_name(&normalized),
        }
    }

    /// Host of `reference` resolved against the page URL; empty for
    /// relative references.
    fn resource_host(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.starts_with("//") || reference.contains("://") {
            let absolute = match &self.base {
                Some(base) => base.join(reference).ok(),
                None => Url::parse(reference).ok(),
            };
            return absolute
                .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
                .unwrap_or_default();
        }
        String::new()
    }

    fn is_external(&self, reference: &str) -> bool {
        !domain_utils::is_same_site(&self.resource_host(reference), &self.host)
    }

    /// Percentage of `references` that point off-site; 0 when there are none.
    fn external_percentage<'a>(&self, references: impl Iterator<Item = &'a str>) -> f64 {
        let (total, external) = references.fold((0usize, 0usize), |(t, e), r| {
            (t + 1, e + usize::from(self.is_external(r)))
        });
        if total == 0 {
            0.0
        } else {
            external as f64 * 100.0 / total as f64
        }
    }

    /// Favicon loaded from another domain
    pub fn favicon(&self) -> i32 {
        let external = self
            .document
            .select(&FAVICON_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .any(|href| self.is_external(href));
        if external { -1 } else { 1 }
    }

    /// Share of embedded media served from other domains
    pub fn request_url(&self) -> i32 {
        let pct = self.external_percentage(
            self.document
                .select(&MEDIA_SELECTOR)
                .filter_map(|el| el.value().attr("src")),
        );
        banded(pct, 22.0, 61.0)
    }

    /// Share of anchors that go nowhere, run script, or leave the site
    pub fn url_of_anchor(&self) -> i32 {
        let mut total = 0usize;
        let mut unsafe_count = 0usize;
        for anchor in self.document.select(&ANCHOR_SELECTOR) {
            total += 1;
            let href = anchor.value().attr("href").unwrap_or("").trim();
            let lower = href.to_lowercase();
            if href.is_empty()
                || href.starts_with('#')
                || lower.starts_with("javascript:")
                || lower.starts_with("mailto:")
                || self.is_external(href)
            {
                unsafe_count += 1;
            }
        }
        let pct = if total == 0 { 0.0 } else { unsafe_count as f64 * 100.0 / total as f64 };
        banded(pct, 31.0, 67.0)
    }

    /// Share of `<meta>`, `<script>` and `<link>` references that leave the site
    pub fn links_in_tags(&self) -> i32 {
        let references = self.document.select(&TAG_LINK_SELECTOR).filter_map(|el| {
            let value = el.value();
            match value.name() {
                "link" => value.attr("href"),
                "script" => value.attr("src"),
                // Only meta tags that carry a URL count
                _ => value.attr("content").filter(|c| c.contains("://")),
            }
        });
        let pct = self.external_percentage(references);
        banded(pct, 17.0, 81.0)
    }

    /// Server form handler: blank handlers are phishy, off-site ones suspicious
    pub fn sfh(&self) -> i32 {
        let mut result = 1;
        for form in self.document.select(&FORM_SELECTOR) {
            let action = form.value().attr("action").unwrap_or("").trim().to_lowercase();
            if action.is_empty() || action == "about:blank" {
                return -1;
            }
            if self.is_external(&action) {
                result = 0;
            }
        }
        result
    }

    pub fn submitting_to_email(&self) -> i32 {
        let mailto_form = self.document.select(&FORM_SELECTOR).any(|form| {
            form.value()
                .attr("action")
                .map(|a| a.trim().to_lowercase().starts_with("mailto:"))
                .unwrap_or(false)
        });
        if mailto_form || MAIL_CALL_REGEX.is_match(&self.raw) { -1 } else { 1 }
    }

    pub fn on_mouseover(&self) -> i32 {
        if MOUSEOVER_REGEX.is_match(&self.raw) { -1 } else { 1 }
    }

    pub fn rightclick(&self) -> i32 {
        if RIGHTCLICK_REGEX.is_match(&self.raw) { -1 } else { 1 }
    }

    /// Script-driven prompt dialogs asking for input
    pub fn popupwindow(&self) -> i32 {
        let prompts = self
            .document
            .select(&SCRIPT_SELECTOR)
            .any(|script| script.text().collect::<String>().contains("prompt("));
        if prompts { -1 } else { 1 }
    }

    pub fn iframe(&self) -> i32 {
        if self.document.select(&IFRAME_SELECTOR).any(is_invisible_frame) { -1 } else { 1 }
    }

    /// Obfuscated script, or a password field posted to another domain
    pub fn malicious_content(&self) -> i32 {
        let obfuscated = self
            .document
            .select(&SCRIPT_SELECTOR)
            .any(|script| OBFUSCATION_REGEX.is_match(&script.text().collect::<String>()));
        if obfuscated {
            return -1;
        }

        let harvests = self.document.select(&FORM_SELECTOR).any(|form| {
            let has_password = form.select(&PASSWORD_SELECTOR).next().is_some();
            let action = form.value().attr("action").unwrap_or("");
            has_password && self.is_external(action)
        });
        if harvests { -1 } else { 1 }
    }
}

/// Low percentages are legitimate, mid-range suspicious, high phishy.
fn banded(pct: f64, legit_below: f64, suspicious_up_to: f64) -> i32 {
    if pct < legit_below {
        1
    } else if pct <= suspicious_up_to {
        0
    } else {
        -1
    }
}

fn is_invisible_frame(frame: ElementRef) -> bool {
    let value = frame.value();
    let zero = |attr: &str| {
        value
            .attr(attr)
            .map(|v| v.trim().trim_end_matches("px").trim() == "0")
            .unwrap_or(false)
    };
    let style = value
        .attr("style")
        .map(|s| s.to_lowercase().replace(' ', ""))
        .unwrap_or_default();

    zero("frameborder")
        || zero("width")
        || zero("height")
        || value.attr("hidden").is_some()
        || style.contains("display:none")
        || style.contains("visibility:hidden")
}
