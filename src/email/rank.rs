//! Relevance ranking for a site's email candidates.

use std::cmp::Reverse;

use once_cell::sync::Lazy;
use regex::Regex;

static PERSONAL_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z](\.[a-z]+)?$").expect("valid local part pattern"));

const DOMAIN_AFFINITY: i32 = 100;
const PERSONAL_LOCAL_PART: i32 = 50;
const DOTTED_LOCAL_PART: i32 = 30;
const ROLE_ACCOUNT: i32 = -20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredEmail {
    pub address: String,
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct EmailRanker {
    role_words: Vec<String>,
}

impl Default for EmailRanker {
    fn default() -> Self {
        Self::new(["info", "contact", "hello", "support", "sales", "admin"])
    }
}

impl EmailRanker {
    pub fn new<I, S>(role_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            role_words: role_words.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    /// `site_domain` is the site's host without `www.`; empty disables the
    /// affinity bonus.
    pub fn score(&self, address: &str, site_domain: &str) -> i32 {
        let (local, domain) = address.split_once('@').unwrap_or((address, ""));
        let mut score = 0;

        if !site_domain.is_empty() && domain.contains(site_domain) {
            score += DOMAIN_AFFINITY;
        }
        if PERSONAL_SHAPE.is_match(local) {
            score += PERSONAL_LOCAL_PART;
        }
        if local.contains('.') {
            score += DOTTED_LOCAL_PART;
        }
        if self.role_words.iter().any(|w| w == local) {
            score += ROLE_ACCOUNT;
        }

        score
    }

    /// Highest score first; ties keep input order. `max_results` of 0 keeps
    /// everything.
    pub fn rank(&self, addresses: &[String], site_domain: &str, max_results: usize) -> Vec<ScoredEmail> {
        let mut scored: Vec<ScoredEmail> = addresses
            .iter()
            .map(|a| ScoredEmail {
                address: a.clone(),
                score: self.score(a, site_domain),
            })
            .collect();

        scored.sort_by_key(|s| Reverse(s.score));
        if max_results > 0 {
            scored.truncate(max_results);
        }
        scored
    }
}
