//! Scripted in-memory page driver.
//!
//! Pages are keyed by URL. Every tab opened from any session shares one
//! [`World`], so tests can script content up front and inspect counters
//! afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadscout::driver::{Anchor, BrowserSession, DriverError, Locator, Page, PageDriver};

/// A container whose scroll height grows by `step` for the first
/// `grows_for` scrolls and then stays put.
#[derive(Debug, Clone)]
pub struct ScrollScript {
    pub locator: Locator,
    pub start: f64,
    pub step: f64,
    pub grows_for: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub anchors: Vec<Anchor>,
    pub text: String,
    pub html: String,
    pub elements: HashMap<Locator, String>,
    pub attributes: HashMap<(Locator, String), String>,
    pub present: HashSet<Locator>,
    pub clickable: HashSet<Locator>,
    pub container: Option<ScrollScript>,
    pub overflowing: Option<Locator>,
    /// `anchors()` errors on this page.
    pub broken_links: bool,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(mut self, locator: &str) -> Self {
        self.present.insert(Locator::parse(locator));
        self
    }

    pub fn element(mut self, locator: &str, text: &str) -> Self {
        let locator = Locator::parse(locator);
        self.present.insert(locator.clone());
        self.elements.insert(locator, text.to_string());
        self
    }

    pub fn attribute(mut self, locator: &str, name: &str, value: &str) -> Self {
        self.attributes
            .insert((Locator::parse(locator), name.to_string()), value.to_string());
        self
    }

    pub fn link(mut self, text: &str, href: &str) -> Self {
        self.anchors.push(Anchor {
            text: text.to_string(),
            href: href.to_string(),
        });
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn clickable(mut self, locator: &str) -> Self {
        self.clickable.insert(Locator::parse(locator));
        self
    }

    pub fn scrolls(mut self, locator: &str, grows_for: u32) -> Self {
        self.container = Some(ScrollScript {
            locator: Locator::parse(locator),
            start: 1000.0,
            step: 500.0,
            grows_for,
        });
        self
    }

    pub fn overflowing(mut self, locator: &str) -> Self {
        self.overflowing = Some(Locator::parse(locator));
        self
    }

    pub fn broken_links(mut self) -> Self {
        self.broken_links = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct World {
    pub pages: HashMap<String, ScriptedPage>,
    /// Remaining navigation failures per URL.
    pub goto_failures: HashMap<String, u32>,
    pub fail_sessions: bool,
    pub gotos: Vec<String>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
    pub screenshots: Vec<PathBuf>,
    pub clicks: Vec<Locator>,
    pub cookie_clears: usize,
    pub scroll_calls: usize,
    /// Every scroll delta, in call order.
    pub scroll_deltas: Vec<f64>,
}

impl World {
    pub fn goto_count(&self, url: &str) -> usize {
        self.gotos.iter().filter(|u| u.as_str() == url).count()
    }
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    world: Arc<Mutex<World>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, page: ScriptedPage) -> &Self {
        self.world.lock().unwrap().pages.insert(url.to_string(), page);
        self
    }

    pub fn fail_goto(&self, url: &str, times: u32) -> &Self {
        self.world.lock().unwrap().goto_failures.insert(url.to_string(), times);
        self
    }

    pub fn fail_sessions(&self) -> &Self {
        self.world.lock().unwrap().fail_sessions = true;
        self
    }

    /// Inspect the shared state.
    pub fn with_world<R>(&self, f: impl FnOnce(&World) -> R) -> R {
        f(&self.world.lock().unwrap())
    }

    pub fn session(&self) -> FakeSession {
        self.world.lock().unwrap().sessions_opened += 1;
        FakeSession {
            world: self.world.clone(),
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn new_session(&self) -> Result<Arc<dyn BrowserSession>, DriverError> {
        if self.world.lock().unwrap().fail_sessions {
            return Err(DriverError::Launch("scripted launch failure".into()));
        }
        Ok(Arc::new(self.session()))
    }
}

pub struct FakeSession {
    world: Arc<Mutex<World>>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        self.world.lock().unwrap().pages_opened += 1;
        Ok(Box::new(FakeTab {
            world: self.world.clone(),
            current: Mutex::new(None),
            scrolls: Mutex::new(0),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.world.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}

pub struct FakeTab {
    world: Arc<Mutex<World>>,
    current: Mutex<Option<String>>,
    scrolls: Mutex<u32>,
}

impl FakeTab {
    fn with_page<R>(&self, f: impl FnOnce(&ScriptedPage) -> R) -> Option<R> {
        let url = self.current.lock().unwrap().clone()?;
        let world = self.world.lock().unwrap();
        world.pages.get(&url).map(f)
    }

    fn extent_of(&self, locator: &Locator) -> Option<f64> {
        let scrolls = *self.scrolls.lock().unwrap();
        self.with_page(|p| {
            p.container
                .as_ref()
                .filter(|c| &c.locator == locator)
                .map(|c| c.start + c.step * scrolls.min(c.grows_for) as f64)
        })
        .flatten()
    }
}

#[async_trait]
impl Page for FakeTab {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let mut world = self.world.lock().unwrap();
        world.gotos.push(url.to_string());

        if let Some(remaining) = world.goto_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: "scripted failure".into(),
                });
            }
        }
        if !world.pages.contains_key(url) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }

        *self.current.lock().unwrap() = Some(url.to_string());
        *self.scrolls.lock().unwrap() = 0;
        Ok(())
    }

    async fn wait_for_any(&self, locators: &[Locator], timeout: Duration) -> Result<usize, DriverError> {
        self.with_page(|p| locators.iter().position(|l| p.present.contains(l)))
            .flatten()
            .ok_or(DriverError::Timeout(timeout))
    }

    async fn text(&self, locator: &Locator) -> Result<Option<String>, DriverError> {
        Ok(self.with_page(|p| p.elements.get(locator).cloned()).flatten())
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DriverError> {
        let key = (locator.clone(), name.to_string());
        Ok(self.with_page(|p| p.attributes.get(&key).cloned()).flatten())
    }

    async fn anchors(&self) -> Result<Vec<Anchor>, DriverError> {
        if self.with_page(|p| p.broken_links).unwrap_or(false) {
            return Err(DriverError::Script("link collection failed".into()));
        }
        Ok(self.with_page(|p| p.anchors.clone()).unwrap_or_default())
    }

    async fn inner_text(&self) -> Result<String, DriverError> {
        Ok(self.with_page(|p| p.text.clone()).unwrap_or_default())
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok(self.with_page(|p| p.html.clone()).unwrap_or_default())
    }

    async fn scroll_extent(&self, locator: &Locator) -> Result<Option<f64>, DriverError> {
        Ok(self.extent_of(locator))
    }

    async fn scroll_by(&self, locator: &Locator, dy: f64) -> Result<(), DriverError> {
        if self.extent_of(locator).is_none() {
            return Err(DriverError::Script(format!("no container {}", locator)));
        }
        *self.scrolls.lock().unwrap() += 1;
        let mut world = self.world.lock().unwrap();
        world.scroll_calls += 1;
        world.scroll_deltas.push(dy);
        Ok(())
    }

    async fn find_overflowing(&self, _candidates: &Locator) -> Result<Option<Locator>, DriverError> {
        Ok(self.with_page(|p| p.overflowing.clone()).flatten())
    }

    async fn click(&self, locator: &Locator) -> Result<bool, DriverError> {
        let hit = self.with_page(|p| p.clickable.contains(locator)).unwrap_or(false);
        if hit {
            self.world.lock().unwrap().clicks.push(locator.clone());
        }
        Ok(hit)
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        self.world.lock().unwrap().cookie_clears += 1;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.world.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.world.lock().unwrap().pages_closed += 1;
        Ok(())
    }
}

/// Contact-path probe answering from a fixed set of URLs.
#[derive(Default)]
pub struct ScriptedProbe {
    existing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new<I: IntoIterator<Item = &'static str>>(existing: I) -> Self {
        Self {
            existing: existing.into_iter().map(str::to_string).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl leadscout::email::LinkProbe for ScriptedProbe {
    async fn exists(&self, url: &str, _timeout: Duration) -> bool {
        self.calls.lock().unwrap().push(url.to_string());
        self.existing.contains(url)
    }
}
