//! Headless Chrome implementation of the page driver.
//!
//! Each Chrome process consumes a few hundred MB of RAM, so the number of
//! live browsers is capped by a counting semaphore shared by every session a
//! [`ChromeDriver`] opens. The semaphore uses std::sync primitives because
//! launching happens inside `spawn_blocking`.
//!
//! headless_chrome is a blocking API. Every page operation runs on the
//! blocking pool and element lookups are expressed as small scripts.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Network, Page as CdpPage};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Anchor, BrowserSession, DriverError, Locator, Page, PageDriver};
use crate::config::BrowserConfig;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);
const SCROLL_MARKER_ATTR: &str = "data-leadscout-scroll";

/// A simple counting semaphore that works inside blocking closures.
struct BrowserSemaphore {
    state: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl BrowserSemaphore {
    fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(0),
            condvar: Condvar::new(),
            max: max.max(1),
        }
    }

    /// Acquire a permit, blocking until one is available.
    fn acquire(self: &Arc<Self>) -> BrowserPermit {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *count >= self.max {
            count = self.condvar.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count += 1;
        BrowserPermit { semaphore: Arc::clone(self) }
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        self.condvar.notify_one();
    }
}

/// RAII guard that releases a browser permit on drop.
struct BrowserPermit {
    semaphore: Arc<BrowserSemaphore>,
}

impl Drop for BrowserPermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// A Chrome process with its permit. Dropping it kills the process and
/// frees the permit.
struct BrowserGuard {
    browser: Browser,
    _permit: BrowserPermit,
}

pub struct ChromeDriver {
    settings: Arc<BrowserConfig>,
    semaphore: Arc<BrowserSemaphore>,
}

impl ChromeDriver {
    pub fn new(settings: BrowserConfig) -> Self {
        let semaphore = Arc::new(BrowserSemaphore::new(settings.max_instances));
        Self {
            settings: Arc::new(settings),
            semaphore,
        }
    }
}

fn is_container() -> bool {
    std::env::var("LEADSCOUT_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

fn chrome_path() -> Option<PathBuf> {
    std::env::var("CHROME_PATH").ok().map(PathBuf::from)
}

fn next_debug_port() -> u16 {
    // Unique debug port per instance, wrapping inside a small range above Chrome's default.
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(9222);
    let port = PORT_COUNTER.fetch_add(1, Ordering::Relaxed);
    if port > 9322 {
        PORT_COUNTER.store(9222, Ordering::Relaxed);
    }
    port
}

fn launch(settings: &BrowserConfig, semaphore: &Arc<BrowserSemaphore>) -> Result<BrowserGuard, DriverError> {
    let permit = semaphore.acquire();

    let mut args: Vec<String> = settings.extra_args.clone();
    if settings.block_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
    }
    let arg_refs: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

    let options = LaunchOptions::default_builder()
        .headless(settings.headless)
        .sandbox(!is_container())
        .path(chrome_path())
        .port(Some(next_debug_port()))
        .window_size(Some((settings.window_width, settings.window_height)))
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
        .args(arg_refs)
        .build()
        .map_err(|e| DriverError::Launch(format!("invalid launch options: {}", e)))?;

    let browser = Browser::new(options).map_err(|e| DriverError::Launch(e.to_string()))?;
    debug!("Launched headless Chrome (headless={})", settings.headless);

    Ok(BrowserGuard {
        browser,
        _permit: permit,
    })
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn new_session(&self) -> Result<Arc<dyn BrowserSession>, DriverError> {
        let settings = Arc::clone(&self.settings);
        let semaphore = Arc::clone(&self.semaphore);
        let guard = tokio::task::spawn_blocking(move || launch(&settings, &semaphore))
            .await
            .map_err(|e| DriverError::Launch(format!("launch task failed: {}", e)))??;

        Ok(Arc::new(ChromeSession {
            guard: Mutex::new(Some(guard)),
            settings: Arc::clone(&self.settings),
        }))
    }
}

pub struct ChromeSession {
    guard: Mutex<Option<BrowserGuard>>,
    settings: Arc<BrowserConfig>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        let browser = {
            let guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(g) => g.browser.clone(),
                None => return Err(DriverError::Closed("session already closed".to_string())),
            }
        };
        let settings = Arc::clone(&self.settings);

        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>, DriverError> {
            let tab = browser
                .new_tab()
                .map_err(|e| DriverError::Launch(format!("failed to create tab: {}", e)))?;
            tab.set_user_agent(&settings.user_agent, Some(&settings.accept_language), None)
                .map_err(|e| DriverError::Script(format!("failed to set user agent: {}", e)))?;
            if settings.stealth {
                if let Err(e) = tab.enable_stealth_mode() {
                    warn!("Stealth mode unavailable: {}", e);
                }
            }
            Ok(tab)
        })
        .await
        .map_err(|e| DriverError::Closed(format!("tab task failed: {}", e)))??;

        Ok(Box::new(ChromePage { tab }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        let guard = self.guard.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(guard) = guard {
            // Dropping the Browser kills the process; keep that off the async threads.
            tokio::task::spawn_blocking(move || drop(guard))
                .await
                .map_err(|e| DriverError::Closed(format!("close task failed: {}", e)))?;
        }
        Ok(())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

/// Envelope every evaluated script returns, so exceptions surface as errors.
#[derive(Deserialize)]
struct ScriptResult<T> {
    ok: Option<T>,
    err: Option<String>,
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Script expression producing an array of every element the locator matches.
fn resolve_all(locator: &Locator) -> String {
    match locator {
        Locator::Css(css) => format!("Array.from(document.querySelectorAll({}))", js_string(css)),
        Locator::XPath(expr) => format!(
            "(() => {{ const r = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()",
            js_string(expr)
        ),
        Locator::CssWithText { css, text } => format!(
            "Array.from(document.querySelectorAll({})).filter(e => (e.textContent || '').includes({}))",
            js_string(css),
            js_string(text)
        ),
    }
}

fn first_match(locator: &Locator) -> String {
    format!("({})[0]", resolve_all(locator))
}

fn evaluate_json<T: DeserializeOwned>(tab: &Tab, body: &str) -> Result<Option<T>, DriverError> {
    let script = format!(
        "(() => {{ try {{ const ok = (() => {{ {} }})(); return JSON.stringify({{ ok: ok === undefined ? null : ok }}); }} \
         catch (e) {{ return JSON.stringify({{ err: String(e) }}); }} }})()",
        body
    );
    let remote = tab
        .evaluate(&script, false)
        .map_err(|e| DriverError::Script(e.to_string()))?;
    let raw = match remote.value {
        Some(serde_json::Value::String(s)) => s,
        other => return Err(DriverError::Script(format!("unexpected script result: {:?}", other))),
    };
    let parsed: ScriptResult<T> =
        serde_json::from_str(&raw).map_err(|e| DriverError::Script(format!("bad script payload: {}", e)))?;
    match parsed.err {
        Some(err) => Err(DriverError::Script(err)),
        None => Ok(parsed.ok),
    }
}

impl ChromePage {
    async fn blocking<T, F>(&self, op: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| DriverError::Closed(format!("page task failed: {}", e)))?
    }

    async fn eval<T>(&self, body: String) -> Result<Option<T>, DriverError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.blocking(move |tab| evaluate_json::<T>(tab, &body)).await
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| DriverError::Navigation {
                    url: url.clone(),
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn wait_for_any(&self, locators: &[Locator], timeout: Duration) -> Result<usize, DriverError> {
        let checks: Vec<String> = locators
            .iter()
            .map(|l| format!("({}).length > 0", resolve_all(l)))
            .collect();
        let body = format!("const found = [{}]; return found.indexOf(true);", checks.join(", "));

        self.blocking(move |tab| {
            let deadline = Instant::now() + timeout;
            loop {
                // Script errors (a bad selector, a page mid-navigation) count as "not yet".
                if let Ok(Some(idx)) = evaluate_json::<i64>(tab, &body) {
                    if idx >= 0 {
                        return Ok(idx as usize);
                    }
                }
                if Instant::now() >= deadline {
                    return Err(DriverError::Timeout(timeout));
                }
                std::thread::sleep(READY_POLL_INTERVAL);
            }
        })
        .await
    }

    async fn text(&self, locator: &Locator) -> Result<Option<String>, DriverError> {
        let body = format!("const e = {}; return e ? (e.textContent || '') : null;", first_match(locator));
        self.eval(body).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DriverError> {
        let body = format!(
            "const e = {}; return e ? e.getAttribute({}) : null;",
            first_match(locator),
            js_string(name)
        );
        self.eval(body).await
    }

    async fn anchors(&self) -> Result<Vec<Anchor>, DriverError> {
        let body = "return Array.from(document.querySelectorAll('a')).map(a => ({ \
                    text: (a.innerText || a.textContent || '').trim(), href: a.href || '' }));"
            .to_string();
        Ok(self.eval::<Vec<Anchor>>(body).await?.unwrap_or_default())
    }

    async fn inner_text(&self) -> Result<String, DriverError> {
        let body = "return document.body ? document.body.innerText : '';".to_string();
        Ok(self.eval::<String>(body).await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.blocking(|tab| tab.get_content().map_err(|e| DriverError::Script(e.to_string())))
            .await
    }

    async fn scroll_extent(&self, locator: &Locator) -> Result<Option<f64>, DriverError> {
        let body = format!("const e = {}; return e ? e.scrollHeight : null;", first_match(locator));
        self.eval(body).await
    }

    async fn scroll_by(&self, locator: &Locator, dy: f64) -> Result<(), DriverError> {
        let body = format!(
            "const e = {}; if (!e) return false; e.scrollBy(0, {}); return true;",
            first_match(locator),
            dy
        );
        match self.eval::<bool>(body).await? {
            Some(true) => Ok(()),
            _ => Err(DriverError::Script(format!("scroll target not found: {}", locator))),
        }
    }

    async fn find_overflowing(&self, candidates: &Locator) -> Result<Option<Locator>, DriverError> {
        let body = format!(
            "const e = ({}).find(el => el.scrollHeight > el.clientHeight); \
             if (!e) return false; e.setAttribute({}, '1'); return true;",
            resolve_all(candidates),
            js_string(SCROLL_MARKER_ATTR)
        );
        match self.eval::<bool>(body).await? {
            Some(true) => Ok(Some(Locator::Css(format!("[{}=\"1\"]", SCROLL_MARKER_ATTR)))),
            _ => Ok(None),
        }
    }

    async fn click(&self, locator: &Locator) -> Result<bool, DriverError> {
        let body = format!(
            "const e = {}; if (!e) return false; e.click(); return true;",
            first_match(locator)
        );
        Ok(self.eval::<bool>(body).await?.unwrap_or(false))
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        self.blocking(|tab| {
            tab.call_method(Network::ClearBrowserCookies(None))
                .map(|_| ())
                .map_err(|e| DriverError::Script(format!("failed to clear cookies: {}", e)))
        })
        .await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let path = path.to_path_buf();
        self.blocking(move |tab| {
            let png = tab
                .capture_screenshot(CdpPage::CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| DriverError::Script(format!("screenshot failed: {}", e)))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, png)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.blocking(|tab| {
            tab.close(true)
                .map(|_| ())
                .map_err(|e| DriverError::Closed(e.to_string()))
        })
        .await
    }
}
