//! Browser session behavior with a stub driver: screenshots on failure
//! and unconditional driver quit.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use support::init_test_tracing;
use testkit::browser::{BrowserSession, WebDriver};
use testkit::FixtureResult;

const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nstub";

struct StubDriver {
    quit_called: Arc<AtomicBool>,
}

impl StubDriver {
    fn new() -> (Box<Self>, Arc<AtomicBool>) {
        let quit_called = Arc::new(AtomicBool::new(false));
        (
            Box::new(Self {
                quit_called: quit_called.clone(),
            }),
            quit_called,
        )
    }
}

impl WebDriver for StubDriver {
    fn navigate(&mut self, _url: &str) -> FixtureResult<()> {
        Ok(())
    }

    fn title(&self) -> FixtureResult<String> {
        Ok("Stub Page".to_string())
    }

    fn screenshot_png(&self) -> FixtureResult<Vec<u8>> {
        Ok(FAKE_PNG.to_vec())
    }

    fn quit(self: Box<Self>) -> FixtureResult<()> {
        self.quit_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_failing_test_writes_a_screenshot() {
    init_test_tracing();
    let dir = tempfile::tempdir().expect("tempdir failed");
    let (driver, quit_called) = StubDriver::new();

    let session = BrowserSession::new(driver, "login_tests", "test_redirect")
        .with_screenshots_dir(dir.path());
    let path = session
        .finish(true)
        .expect("finish failed")
        .expect("no screenshot written");

    let name = path.file_name().and_then(|n| n.to_str()).expect("bad file name");
    assert!(name.starts_with("login_tests::test_redirect::"));
    assert!(name.ends_with(".png"));
    assert_eq!(std::fs::read(&path).expect("read failed"), FAKE_PNG);
    assert!(quit_called.load(Ordering::SeqCst));
}

#[test]
fn test_passing_test_leaves_no_screenshot() {
    init_test_tracing();
    let dir = tempfile::tempdir().expect("tempdir failed");
    let (driver, quit_called) = StubDriver::new();

    let session = BrowserSession::new(driver, "login_tests", "test_ok")
        .with_screenshots_dir(dir.path());
    let screenshot = session.finish(false).expect("finish failed");

    assert!(screenshot.is_none());
    assert!(quit_called.load(Ordering::SeqCst), "driver quits on success too");
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir failed")
        .collect();
    assert!(entries.is_empty());
}

#[test]
fn test_driver_seam_is_usable_before_finish() {
    init_test_tracing();
    let (driver, _) = StubDriver::new();
    let mut session = BrowserSession::new(driver, "nav_tests", "test_title");

    session.driver().navigate("https://example.org").expect("navigate failed");
    assert_eq!(session.driver().title().expect("title failed"), "Stub Page");
    session.finish(false).expect("finish failed");
}
