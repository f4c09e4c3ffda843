//! Browser-automation gating and failure screenshots.
//!
//! End-to-end browser tests only run with `E2E=yes`; otherwise the
//! dependent test must be skipped, not failed. `E2E_WEBDRIVER_BROWSERS`
//! selects which browsers to drive (space-separated, default one).
//! When a browser-driven test fails, a screenshot is written to
//! `.e2e_screenshots/` named by test module, test function and
//! timestamp; with `E2E_OUTPUT=base64` the image is additionally
//! emitted base64-encoded through the log for CI systems without
//! artifact storage.
//!
//! No browser is implemented here: drivers plug in behind the narrow
//! [`WebDriver`] trait.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::Utc;
use testkit_common::env::{env_flag, env_or};

use crate::error::FixtureResult;

/// Enables end-to-end browser tests when set to `yes`.
pub const ENV_E2E: &str = "E2E";

/// Space-separated list of browsers to drive.
pub const ENV_E2E_BROWSERS: &str = "E2E_WEBDRIVER_BROWSERS";

/// Screenshot emission mode (`base64` to log the encoded image).
pub const ENV_E2E_OUTPUT: &str = "E2E_OUTPUT";

/// Default browser when none is configured.
pub const DEFAULT_BROWSER: &str = "chrome";

/// Directory failure screenshots are written to.
pub const SCREENSHOTS_DIR: &str = ".e2e_screenshots";

/// Outcome of the end-to-end gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserGate {
    /// Browser tests are enabled for the listed browsers; the test is
    /// run once per browser.
    Enabled(Vec<String>),
    /// Browser tests are disabled; the dependent test must be
    /// reported as skipped, not failed.
    Skipped(String),
}

/// Evaluate the end-to-end environment gate.
pub fn browser_gate() -> BrowserGate {
    if !env_flag(ENV_E2E) {
        return BrowserGate::Skipped(format!(
            "end-to-end tests skipped because the {} environment variable is not set to 'yes'",
            ENV_E2E
        ));
    }

    let browsers: Vec<String> = env_or(ENV_E2E_BROWSERS, DEFAULT_BROWSER)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    BrowserGate::Enabled(browsers)
}

/// Narrow driver seam; real drivers (WebDriver protocol clients) and
/// test doubles both implement it.
pub trait WebDriver: Send {
    fn navigate(&mut self, url: &str) -> FixtureResult<()>;
    fn title(&self) -> FixtureResult<String>;
    fn screenshot_png(&self) -> FixtureResult<Vec<u8>>;
    fn quit(self: Box<Self>) -> FixtureResult<()>;
}

/// A browser session bound to one test, responsible for capturing a
/// screenshot when the test fails and quitting the driver.
pub struct BrowserSession {
    driver: Box<dyn WebDriver>,
    module: String,
    test: String,
    screenshots_dir: PathBuf,
}

impl BrowserSession {
    pub fn new(
        driver: Box<dyn WebDriver>,
        module: impl Into<String>,
        test: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            module: module.into(),
            test: test.into(),
            screenshots_dir: PathBuf::from(SCREENSHOTS_DIR),
        }
    }

    /// Override the screenshot directory (used by tests).
    pub fn with_screenshots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshots_dir = dir.into();
        self
    }

    /// The underlying driver.
    pub fn driver(&mut self) -> &mut dyn WebDriver {
        self.driver.as_mut()
    }

    /// End the session. When `failed`, a screenshot is captured and
    /// persisted first; the driver quits either way. Returns the path
    /// of the written screenshot, if any.
    pub fn finish(self, failed: bool) -> FixtureResult<Option<PathBuf>> {
        let screenshot = if failed {
            Some(self.capture_failure_screenshot()?)
        } else {
            None
        };

        self.driver.quit()?;
        Ok(screenshot)
    }

    fn capture_failure_screenshot(&self) -> FixtureResult<PathBuf> {
        let png = self.driver.screenshot_png()?;
        let path = screenshot_path(&self.screenshots_dir, &self.module, &self.test);
        fs::create_dir_all(&self.screenshots_dir)?;
        fs::write(&path, &png)?;

        if env_or(ENV_E2E_OUTPUT, "file") == "base64" {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
            tracing::info!(screenshot_base64 = %encoded, "screenshot of failing test");
        } else {
            tracing::info!(screenshot = %path.display(), "screenshot of failing test");
        }
        Ok(path)
    }
}

/// Screenshot file path: `{module}::{test}::{timestamp}.png`.
fn screenshot_path(dir: &Path, module: &str, test: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f");
    dir.join(format!("{}::{}::{}.png", module, test, timestamp))
}
