//! Email candidate extraction and filtering.
//!
//! Addresses are case-folded before any check so every filter decision is
//! made on the same string that ends up in the output.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::driver::Anchor;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email pattern"));

static STRICT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("valid strict email pattern"));

static PERCENT_ENCODED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%[0-9a-f]{2}").expect("valid percent pattern"));

static MEDIA_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)icon|image").expect("valid media token pattern"));

/// Where on a page an address was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Mailto,
    Text,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCandidate {
    pub address: String,
    pub provenance: Provenance,
}

/// Ordered, duplicate-free candidates. The first sighting of an address
/// keeps its provenance.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    seen: HashSet<String>,
    items: Vec<EmailCandidate>,
}

impl CandidateSet {
    pub fn push(&mut self, address: String, provenance: Provenance) -> bool {
        if !self.seen.insert(address.clone()) {
            return false;
        }
        self.items.push(EmailCandidate { address, provenance });
        true
    }

    pub fn extend(&mut self, other: CandidateSet) {
        for c in other.items {
            self.push(c.address, c.provenance);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn candidates(&self) -> &[EmailCandidate] {
        &self.items
    }

    pub fn addresses(&self) -> Vec<String> {
        self.items.iter().map(|c| c.address.clone()).collect()
    }
}

/// Address from a `mailto:` href, without its query part.
pub fn mailto_address(href: &str) -> Option<String> {
    let href = href.trim();
    let prefix = href.get(..7)?;
    if !prefix.eq_ignore_ascii_case("mailto:") {
        return None;
    }
    let address = href[7..].split('?').next().unwrap_or("").trim();
    if address.is_empty() {
        None
    } else {
        Some(address.to_lowercase())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailFilter {
    blocklist: Vec<String>,
}

impl EmailFilter {
    pub fn new<I, S>(blocklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocklist: blocklist
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Case-fold and check one address.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let address = raw.trim().to_lowercase();
        self.accepts(&address).then_some(address)
    }

    /// Expects an already lowercased address.
    pub fn accepts(&self, address: &str) -> bool {
        if self.blocklist.iter().any(|b| address.contains(b.as_str())) {
            return false;
        }

        if PERCENT_ENCODED.is_match(address) || address.ends_with(".svg") || MEDIA_TOKEN.is_match(address) {
            return false;
        }

        let local = address.split('@').next().unwrap_or("");
        if local.is_empty() || local.chars().all(|c| c.is_ascii_digit()) || local == "undefined" {
            return false;
        }

        STRICT_SHAPE.is_match(address)
    }

    /// Every accepted address in `text`, deduplicated in order of appearance.
    pub fn scan(&self, text: &str) -> Vec<String> {
        self.filter_all(EMAIL_PATTERN.find_iter(text).map(|m| m.as_str()))
    }

    pub fn filter_all<I, S>(&self, addresses: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        addresses
            .into_iter()
            .filter_map(|a| self.normalize(a.as_ref()))
            .filter(|a| seen.insert(a.clone()))
            .collect()
    }

    /// Mailto links first, then visible text.
    pub fn primary_candidates(&self, anchors: &[Anchor], text: &str) -> CandidateSet {
        let mut set = CandidateSet::default();
        let mailto = anchors.iter().filter_map(|a| mailto_address(&a.href));
        for address in self.filter_all(mailto) {
            set.push(address, Provenance::Mailto);
        }
        for address in self.scan(text) {
            set.push(address, Provenance::Text);
        }
        set
    }

    pub fn add_html(&self, set: &mut CandidateSet, html: &str) {
        for address in self.scan(html) {
            set.push(address, Provenance::Html);
        }
    }
}
