//! Rasterizing the force page through a headless browser

use crate::error::BrowserError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Executables tried, in order, when no browser is configured
const BROWSER_CANDIDATES: [&str; 7] = [
    "msedge",
    "microsoft-edge",
    "microsoft-edge-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Install locations that are usually not on PATH
const WELL_KNOWN_LOCATIONS: [&str; 4] = [
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// Screenshot settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Run the screenshot step at all
    pub enabled: bool,
    /// Browser executable; searched on PATH when unset
    pub browser: Option<PathBuf>,
    /// Time the page gets to finish rendering before capture
    pub render_wait_ms: u64,
    /// Hard limit for the whole browser session
    pub timeout_ms: u64,
    pub window_size: (u32, u32),
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            browser: None,
            render_wait_ms: 5000,
            timeout_ms: 30_000,
            window_size: (1280, 800),
        }
    }
}

/// Turns a local webpage into an image
pub trait PageRasterizer {
    fn rasterize(&self, html: &Path, output: &Path) -> Result<(), BrowserError>;
}

/// Rasterizer for hosts without a browser; never writes anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRasterizer;

impl PageRasterizer for NoopRasterizer {
    fn rasterize(&self, html: &Path, _output: &Path) -> Result<(), BrowserError> {
        debug!(page = %html.display(), "Screenshot disabled, skipping");
        Ok(())
    }
}

/// Edge/Chrome/Chromium driven through its headless command line
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    config: ScreenshotConfig,
    /// Chromium refuses to start sandboxed under uid 0
    no_sandbox: bool,
}

/// Kills and reaps the browser however the session ends
struct BrowserSession {
    child: Child,
    finished: bool,
}

impl BrowserSession {
    fn wait_with_timeout(&mut self, timeout: Duration) -> Result<std::process::ExitStatus, BrowserError> {
        let started = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.finished = true;
                    return Ok(status);
                }
                Ok(None) if started.elapsed() >= timeout => {
                    return Err(BrowserError::Driver(format!(
                        "browser did not finish within {} ms",
                        timeout.as_millis()
                    )));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(BrowserError::Other(format!("waiting for browser: {}", e))),
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
            debug!("Browser session closed");
        }
    }
}

impl HeadlessBrowser {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self {
            config,
            no_sandbox: running_as_root(),
        }
    }

    /// Browser executable to launch
    pub fn locate(&self) -> Result<PathBuf, BrowserError> {
        if let Some(path) = &self.config.browser {
            if path.is_file() {
                return Ok(path.clone());
            }
            return find_on_path(path.as_os_str().to_string_lossy().as_ref()).ok_or_else(|| {
                BrowserError::NotFound(format!("configured browser {} does not exist", path.display()))
            });
        }

        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| find_on_path(name))
            .or_else(|| {
                WELL_KNOWN_LOCATIONS
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.is_file())
            })
            .ok_or_else(|| {
                BrowserError::NotFound(format!(
                    "none of {} found on PATH",
                    BROWSER_CANDIDATES.join(", ")
                ))
            })
    }

    fn command(&self, browser: &Path, page_url: &str, output: &Path) -> Command {
        let (width, height) = self.config.window_size;
        let mut cmd = Command::new(browser);
        if self.no_sandbox {
            cmd.arg("--no-sandbox");
        }
        cmd.arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-first-run")
            .arg("--allow-file-access-from-files")
            .arg(format!("--window-size={},{}", width, height))
            .arg(format!("--virtual-time-budget={}", self.config.render_wait_ms))
            .arg(format!("--screenshot={}", output.display()))
            .arg(page_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl PageRasterizer for HeadlessBrowser {
    fn rasterize(&self, html: &Path, output: &Path) -> Result<(), BrowserError> {
        let html = html
            .canonicalize()
            .map_err(|e| BrowserError::Other(format!("page {}: {}", html.display(), e)))?;
        let output = absolute(output).map_err(|e| BrowserError::Other(e.to_string()))?;
        let page_url = file_url(&html)?;

        let browser = self.locate()?;
        info!(browser = %browser.display(), page = %html.display(), "Capturing page");

        if output.exists() {
            std::fs::remove_file(&output).map_err(|e| BrowserError::Other(e.to_string()))?;
        }

        let child = self.command(&browser, &page_url, &output).spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                BrowserError::NotFound(format!("cannot launch {}: {}", browser.display(), e))
            }
            _ => BrowserError::Other(format!("spawning {}: {}", browser.display(), e)),
        })?;

        let mut session = BrowserSession {
            child,
            finished: false,
        };
        let timeout = Duration::from_millis(self.config.timeout_ms.max(self.config.render_wait_ms));
        let status = session.wait_with_timeout(timeout)?;

        if !status.success() {
            return Err(BrowserError::Driver(format!("browser exited with {}", status)));
        }

        if !output.is_file() {
            return Err(BrowserError::Driver(format!(
                "browser exited without writing {}",
                output.display()
            )));
        }

        Ok(())
    }
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let with_exe = dir.join(format!("{}.exe", name));
        with_exe.is_file().then_some(with_exe)
    })
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// `file://` URL for an absolute local path
pub(crate) fn file_url(path: &Path) -> Result<String, BrowserError> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| BrowserError::Other(format!("{} is not an absolute path", path.display())))
}

#[cfg(target_os = "linux")]
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;

    std::fs::metadata("/proc/self").map(|m| m.uid() == 0).unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn running_as_root() -> bool {
    false
}
