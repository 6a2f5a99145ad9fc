//! Per-site email resolution: homepage first, one contact page at most.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fake_driver::{FakeDriver, ScriptedPage, ScriptedProbe};
use common::fixtures::fast_config;
use common::wiremock_helpers::{mock_site_with_paths, mock_site_with_status};
use leadscout::email::{EmailResolver, HttpProbe, LinkProbe, SiteResolver};
use tempfile::TempDir;

fn resolver(probe: Arc<ScriptedProbe>) -> EmailResolver {
    let tmp = TempDir::new().unwrap();
    let config = fast_config(tmp.path());
    EmailResolver::from_config(&config.emails, probe)
}

fn no_probe() -> Arc<ScriptedProbe> {
    Arc::new(ScriptedProbe::new([]))
}

#[tokio::test]
async fn test_homepage_with_enough_emails_skips_contact_page() {
    let driver = FakeDriver::new();
    driver.page(
        "https://acme.test/",
        ScriptedPage::new()
            .link("Write us", "mailto:Ana.Garcia@acme.test?subject=Hola")
            .link("Contact", "https://acme.test/contact")
            .text("Orders: luis@acme.test"),
    );
    let probe = no_probe();
    let session = driver.session();

    let result = resolver(probe.clone()).resolve(&session, "acme.test").await;

    assert_eq!(result, "ana.garcia@acme.test, luis@acme.test");
    driver.with_world(|w| {
        assert_eq!(w.goto_count("https://acme.test/contact"), 0);
        assert_eq!(w.pages_opened, 1);
        assert_eq!(w.pages_closed, 1);
    });
    assert!(probe.calls().is_empty());
}

#[tokio::test]
async fn test_contact_link_followed_when_homepage_is_thin() {
    let driver = FakeDriver::new();
    driver
        .page(
            "https://shop.test/",
            ScriptedPage::new()
                .link("Products", "https://shop.test/products")
                .link("Get in touch", "https://shop.test/p/42")
                .text("Owner: m.lopez@shop.test"),
        )
        .page(
            "https://shop.test/p/42",
            ScriptedPage::new().text("ventas.madrid@shop.test / m.lopez@shop.test / info@shop.test"),
        );
    let session = driver.session();

    let result = resolver(no_probe()).resolve(&session, "https://shop.test/").await;

    // m.lopez: domain + personal + dotted; ventas.madrid: domain + dotted.
    assert_eq!(result, "m.lopez@shop.test, ventas.madrid@shop.test");
}

#[tokio::test]
async fn test_html_fallback_used_before_contact_page() {
    let driver = FakeDriver::new();
    driver.page(
        "https://deco.test/",
        ScriptedPage::new()
            .text("Welcome")
            .html("<footer><!-- a.ruiz@deco.test --><span data-mail=\"p.gil@deco.test\"></span></footer>"),
    );
    let probe = no_probe();
    let session = driver.session();

    let result = resolver(probe.clone()).resolve(&session, "deco.test").await;

    assert_eq!(result, "a.ruiz@deco.test, p.gil@deco.test");
    assert!(probe.calls().is_empty());
}

#[tokio::test]
async fn test_contact_paths_probed_in_order_until_one_exists() {
    let driver = FakeDriver::new();
    driver
        .page("https://probe.test/", ScriptedPage::new().text("No emails here"))
        .page("https://probe.test/about", ScriptedPage::new().text("team@probe.test"));
    let probe = Arc::new(ScriptedProbe::new(["https://probe.test/about"]));
    let session = driver.session();

    let result = resolver(probe.clone()).resolve(&session, "probe.test").await;

    assert_eq!(result, "team@probe.test");
    assert_eq!(
        probe.calls(),
        vec![
            "https://probe.test/contact",
            "https://probe.test/contact-us",
            "https://probe.test/about",
        ]
    );
}

#[tokio::test]
async fn test_unreachable_homepage_is_na() {
    let driver = FakeDriver::new();
    let session = driver.session();

    let result = resolver(no_probe()).resolve(&session, "https://down.test").await;

    assert_eq!(result, "NA");
    driver.with_world(|w| assert_eq!(w.pages_closed, 1));
}

#[tokio::test]
async fn test_only_blocked_addresses_is_na() {
    let driver = FakeDriver::new();
    driver.page(
        "https://blocked.test/",
        ScriptedPage::new()
            .link("Mail", "mailto:info@blocked.test")
            .text("noreply@blocked.test logo@2x.png 12345@blocked.test"),
    );
    let session = driver.session();

    let result = resolver(no_probe()).resolve(&session, "blocked.test").await;

    assert_eq!(result, "NA");
}

#[tokio::test]
async fn test_unparsable_url_is_na_without_navigation() {
    let driver = FakeDriver::new();
    let session = driver.session();

    let result = resolver(no_probe()).resolve(&session, "not a url").await;

    assert_eq!(result, "NA");
    driver.with_world(|w| assert!(w.gotos.is_empty()));
}

#[tokio::test]
async fn test_result_truncated_to_max_results() {
    let driver = FakeDriver::new();
    driver.page(
        "https://many.test/",
        ScriptedPage::new().text("x.y@other.org a.b@many.test c.d@many.test e@many.test"),
    );
    let session = driver.session();

    let result = resolver(no_probe())
        .with_max_results(2)
        .resolve(&session, "many.test")
        .await;

    // a.b and c.d tie on score and keep page order; e and x.y fall off.
    assert_eq!(result, "a.b@many.test, c.d@many.test");
}

// ─────────────────────────────────────────────────────────────────────────────
// HEAD probe against a live mock server
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_probe_accepts_only_200() {
    let server = mock_site_with_paths(&["/contact"]).await;
    let probe = HttpProbe::new("leadscout-test").unwrap();
    let timeout = Duration::from_secs(2);

    assert!(probe.exists(&format!("{}/contact", server.uri()), timeout).await);
    assert!(!probe.exists(&format!("{}/about", server.uri()), timeout).await);
}

#[tokio::test]
async fn test_http_probe_rejects_other_success_codes() {
    let server = mock_site_with_status("/contact-us", 204).await;
    let probe = HttpProbe::new("leadscout-test").unwrap();

    assert!(!probe.exists(&format!("{}/contact-us", server.uri()), Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_http_probe_unreachable_host_is_false() {
    let probe = HttpProbe::new("leadscout-test").unwrap();

    assert!(!probe.exists("http://127.0.0.1:9/contact", Duration::from_millis(500)).await);
}
