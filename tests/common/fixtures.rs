use std::path::PathBuf;

use leadscout::config::{AppConfig, DEFAULT_CONFIG};
use leadscout::driver::Locator;
use leadscout::extract::FieldCandidates;
use leadscout::pacing::DelayRange;
use leadscout::retry::RetryPolicy;

pub const ITEM_PREFIX: &str = "https://maps.test/place/";

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// The shipped config with every pause zeroed and locators simplified to
/// what the fake driver scripts.
pub fn fast_config(output_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::from_toml(DEFAULT_CONFIG).expect("shipped config parses");

    config.listings.output_dir = output_dir.to_path_buf();
    config.listings.diagnostics_dir = output_dir.join("diagnostics");
    config.listings.batch_delay_ms = DelayRange::zero();
    config.listings.query_delay_ms = DelayRange::zero();
    config.listings.target_delay_ms = DelayRange::zero();

    let discovery = &mut config.discovery;
    discovery.settle_ms = 0;
    discovery.scroll_delay_ms = DelayRange::zero();
    discovery.load_more_settle_ms = 0;
    discovery.item_url_prefix = ITEM_PREFIX.to_string();
    discovery.consent = Vec::new();
    discovery.ready = vec![Locator::css("div.results")];
    discovery.containers = vec![Locator::css("div.missing-feed"), Locator::css("div.feed")];
    discovery.overflow_candidates = None;
    discovery.load_more = vec![Locator::parse("button:has-text(\"More\")")];

    let detail = &mut config.detail;
    detail.settle_ms = 0;
    detail.ready = vec![Locator::css("h1")];
    detail.retry = RetryPolicy::no_delay(2);
    detail.fields.name = FieldCandidates::text(["h1.hero", "h1"]);
    detail.fields.category = FieldCandidates::text(["span.category"]);
    detail.fields.address = FieldCandidates::text(["button.address", "div.address"]);
    detail.fields.website = FieldCandidates::attribute("href", ["a.website"]);
    detail.fields.phone = FieldCandidates::text(["button.phone"]);

    config.targets.clear();
    config
}

pub fn item_url(id: usize) -> String {
    format!("{}{}", ITEM_PREFIX, id)
}
