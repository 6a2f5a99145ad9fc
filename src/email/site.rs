//! Per-site email resolution.
//!
//! The homepage is read first; when it yields too few addresses a single
//! contact page is tried, found either through a keyword-matching link or by
//! probing a short list of well-known paths.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::extract::{CandidateSet, EmailFilter};
use super::rank::{EmailRanker, ScoredEmail};
use super::NONE_FOUND;
use crate::config::EmailConfig;
use crate::domain_utils::{is_http_url, join_url, parse_site_url, site_domain};
use crate::driver::{Anchor, BrowserSession, Page};

/// Cheap existence check for a candidate contact URL.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn exists(&self, url: &str, timeout: Duration) -> bool;
}

/// HEAD request; only a 200 counts.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client for contact page probing")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkProbe for HttpProbe {
    async fn exists(&self, url: &str, timeout: Duration) -> bool {
        match self.client.head(url).timeout(timeout).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("HEAD probe of {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Turns one site URL into its result string.
#[async_trait]
pub trait SiteResolver: Send + Sync {
    /// Comma-joined ranked emails, or `"NA"`.
    async fn resolve(&self, session: &dyn BrowserSession, url: &str) -> String;
}

pub struct EmailResolver {
    filter: EmailFilter,
    ranker: EmailRanker,
    probe: Arc<dyn LinkProbe>,
    navigation_timeout: Duration,
    probe_timeout: Duration,
    max_results: usize,
    min_primary_yield: usize,
    contact_keywords: Vec<String>,
    contact_paths: Vec<String>,
}

impl EmailResolver {
    pub fn from_config(config: &EmailConfig, probe: Arc<dyn LinkProbe>) -> Self {
        Self {
            filter: EmailFilter::new(&config.blocklist),
            ranker: if config.role_words.is_empty() {
                EmailRanker::default()
            } else {
                EmailRanker::new(&config.role_words)
            },
            probe,
            navigation_timeout: config.navigation_timeout(),
            probe_timeout: config.probe_timeout(),
            max_results: config.max_per_site,
            min_primary_yield: config.min_primary_yield,
            contact_keywords: config.contact_keywords.iter().map(|k| k.to_lowercase()).collect(),
            contact_paths: config.contact_paths.clone(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    async fn resolve_on_page(&self, page: &dyn Page, url: &str) -> String {
        let Some(target) = parse_site_url(url) else {
            return NONE_FOUND.to_string();
        };
        let target = target.to_string();

        if let Err(e) = page.goto(&target, self.navigation_timeout).await {
            debug!("Homepage {} unreachable: {}", target, e);
            return NONE_FOUND.to_string();
        }

        let mut found = self.extract_from_page(page).await;

        if found.len() < self.min_primary_yield {
            if let Some(contact) = self.find_contact_page(page, &target).await {
                if contact != target {
                    match page.goto(&contact, self.navigation_timeout).await {
                        Ok(()) => {
                            let more = self.extract_from_page(page).await;
                            debug!("Contact page {} added {} candidates", contact, more.len());
                            found.extend(more);
                        }
                        Err(e) => debug!("Contact page {} unreachable: {}", contact, e),
                    }
                }
            }
        }

        let ranked = self.ranker.rank(&found.addresses(), &site_domain(url), self.max_results);
        format_result(&ranked)
    }

    async fn extract_from_page(&self, page: &dyn Page) -> CandidateSet {
        let anchors = page.anchors().await.unwrap_or_else(|e| {
            debug!("Could not read links: {}", e);
            Vec::new()
        });
        let text = page.inner_text().await.unwrap_or_else(|e| {
            debug!("Could not read page text: {}", e);
            String::new()
        });

        let mut found = self.filter.primary_candidates(&anchors, &text);
        if found.len() < self.min_primary_yield {
            match page.content().await {
                Ok(html) => self.filter.add_html(&mut found, &html),
                Err(e) => debug!("Could not read page HTML: {}", e),
            }
        }
        found
    }

    async fn find_contact_page(&self, page: &dyn Page, base: &str) -> Option<String> {
        if let Ok(anchors) = page.anchors().await {
            if let Some(link) = anchors.iter().find(|a| is_http_url(&a.href) && self.is_contact_link(a)) {
                return Some(link.href.clone());
            }
        }

        for path in &self.contact_paths {
            let Some(candidate) = join_url(base, path) else { continue };
            if self.probe.exists(&candidate, self.probe_timeout).await {
                return Some(candidate);
            }
        }

        None
    }

    fn is_contact_link(&self, anchor: &Anchor) -> bool {
        let text = anchor.text.to_lowercase();
        let href = anchor.href.to_lowercase();
        self.contact_keywords
            .iter()
            .any(|k| text.contains(k.as_str()) || href.contains(k.as_str()))
    }
}

#[async_trait]
impl SiteResolver for EmailResolver {
    async fn resolve(&self, session: &dyn BrowserSession, url: &str) -> String {
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                debug!("Could not open a page for {}: {}", url, e);
                return NONE_FOUND.to_string();
            }
        };

        let result = self.resolve_on_page(page.as_ref(), url).await;

        if let Err(e) = page.close().await {
            debug!("Error closing page for {}: {}", url, e);
        }
        result
    }
}

pub fn format_result(ranked: &[ScoredEmail]) -> String {
    if ranked.is_empty() {
        NONE_FOUND.to_string()
    } else {
        ranked.iter().map(|s| s.address.as_str()).collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DEFAULT_CONFIG};

    struct NeverProbe;

    #[async_trait]
    impl LinkProbe for NeverProbe {
        async fn exists(&self, _url: &str, _timeout: Duration) -> bool {
            false
        }
    }

    fn resolver() -> EmailResolver {
        let config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        EmailResolver::from_config(&config.emails, Arc::new(NeverProbe))
    }

    #[test]
    fn test_format_result() {
        assert_eq!(format_result(&[]), "NA");
        let ranked = vec![
            ScoredEmail { address: "a@x.com".into(), score: 1 },
            ScoredEmail { address: "b@x.com".into(), score: 0 },
        ];
        assert_eq!(format_result(&ranked), "a@x.com, b@x.com");
    }

    #[test]
    fn test_contact_link_matches_text_or_href() {
        let r = resolver();
        let by_text = Anchor { text: "Get In Touch".into(), href: "https://acme.com/p/12".into() };
        let by_href = Anchor { text: "More".into(), href: "https://acme.com/Contacto".into() };
        let neither = Anchor { text: "Shop".into(), href: "https://acme.com/shop".into() };
        assert!(r.is_contact_link(&by_text));
        assert!(r.is_contact_link(&by_href));
        assert!(!r.is_contact_link(&neither));
    }
}
