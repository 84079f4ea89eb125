//! Blocking WebDriver client.

use crate::capture::tile::CaptureRect;
use crate::sync::provider::{Browser, BrowserError, BrowserLauncher, BrowserResult, PageMetrics};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PAGE_METRICS_SCRIPT: &str = "return [document.body.offsetWidth, \
     document.body.parentNode.scrollHeight, document.body.clientWidth, window.innerHeight];";
const SCROLL_STATE_SCRIPT: &str =
    "return [window.scrollX, window.scrollY, window.devicePixelRatio || 1];";
const READY_STATE_SCRIPT: &str = "return document.readyState;";

/// Settings for launching WebDriver sessions.
#[derive(Debug, Clone)]
pub struct WebDriverOptions {
    /// WebDriver server root, e.g. `http://localhost:9515`.
    pub server_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub timeout: Duration,
}

/// Starts Chrome sessions through a WebDriver server.
pub struct WebDriverLauncher {
    client: Client,
    options: WebDriverOptions,
}

impl WebDriverLauncher {
    pub fn new(options: WebDriverOptions) -> BrowserResult<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self { client, options })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![format!(
            "--window-size={},{}",
            self.options.window_width, self.options.window_height
        )];
        if self.options.headless {
            args.push("--headless=new".to_string());
            args.push("--hide-scrollbars".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

impl BrowserLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    fn launch(&self) -> BrowserResult<Self::Session> {
        let started_at = Instant::now();
        let base_url = self.options.server_url.trim_end_matches('/').to_string();
        let value = send(
            &self.client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(self.capabilities()),
        )?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::InvalidResponse("new session has no sessionId".into()))?
            .to_string();

        let mut session = WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{base_url}/session/{session_id}"),
            session_id: Some(session_id),
        };
        session.command(
            Method::POST,
            "window/rect",
            Some(json!({
                "width": self.options.window_width,
                "height": self.options.window_height
            })),
        )?;

        info!(
            "event=browser_launch module=webdriver status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(session)
    }
}

/// One live WebDriver session.
pub struct WebDriverSession {
    client: Client,
    session_url: String,
    session_id: Option<String>,
}

impl WebDriverSession {
    fn command(&mut self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        if self.session_id.is_none() {
            return Err(BrowserError::SessionClosed);
        }
        let url = if path.is_empty() {
            self.session_url.clone()
        } else {
            format!("{}/{path}", self.session_url)
        };
        send(&self.client, method, &url, body)
    }

    fn execute(&mut self, script: &str) -> BrowserResult<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
    }

    fn scroll_state(&mut self) -> BrowserResult<(f64, f64, f64)> {
        let value = self.execute(SCROLL_STATE_SCRIPT)?;
        let numbers = number_array(&value, 3)?;
        Ok((numbers[0], numbers[1], numbers[2].max(0.1)))
    }

    fn screenshot(&mut self) -> BrowserResult<RgbaImage> {
        let value = self.command(Method::GET, "screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::InvalidResponse("screenshot is not a string".into()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| BrowserError::InvalidResponse(format!("screenshot base64: {err}")))?;
        Ok(image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgba8())
    }
}

impl Browser for WebDriverSession {
    fn open(&mut self, url: &str) -> BrowserResult<()> {
        debug!("event=browser_open module=webdriver url={}", url);
        self.command(Method::POST, "url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn wait_for_ready(&mut self, timeout: Duration) -> BrowserResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.execute(READY_STATE_SCRIPT)?;
            if state.as_str() == Some("complete") {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn page_metrics(&mut self) -> BrowserResult<PageMetrics> {
        let value = self.execute(PAGE_METRICS_SCRIPT)?;
        let numbers = number_array(&value, 4)?;
        let to_px = |value: f64| value.round().max(0.0) as u32;
        Ok(PageMetrics {
            total_width: to_px(numbers[0]),
            total_height: to_px(numbers[1]),
            viewport_width: to_px(numbers[2]),
            viewport_height: to_px(numbers[3]),
        })
    }

    fn scroll(&mut self, x: u32, y: u32) -> BrowserResult<()> {
        self.execute(&format!("window.scrollTo({x}, {y}); return null;"))?;
        Ok(())
    }

    fn capture_viewport(&mut self, rect: &CaptureRect) -> BrowserResult<RgbaImage> {
        let (scroll_x, scroll_y, scale) = self.scroll_state()?;
        let screenshot = self.screenshot()?;
        let crop = device_crop(rect, scroll_x, scroll_y, scale, &screenshot)?;
        let tile = imageops::crop_imm(&screenshot, crop.0, crop.1, crop.2, crop.3).to_image();

        if tile.width() == rect.width() && tile.height() == rect.height() {
            return Ok(tile);
        }
        Ok(imageops::resize(
            &tile,
            rect.width(),
            rect.height(),
            FilterType::Triangle,
        ))
    }

    fn close(&mut self) -> BrowserResult<()> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let result = self.command(Method::DELETE, "", None).map(|_| ());
        self.session_id = None;
        result
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.session_id.is_some() {
            if let Err(err) = self.close() {
                warn!(
                    "event=browser_close module=webdriver status=error error={}",
                    err
                );
            }
        }
    }
}

/// Maps a page rect to screenshot pixels given the actual scroll position.
///
/// Browsers clamp scrolling at the page end, so the rect may sit below the
/// viewport top; the offset is taken from the real scroll position.
fn device_crop(
    rect: &CaptureRect,
    scroll_x: f64,
    scroll_y: f64,
    scale: f64,
    screenshot: &RgbaImage,
) -> BrowserResult<(u32, u32, u32, u32)> {
    let to_device = |css: f64| (css * scale).round().max(0.0) as u32;
    let x = to_device(f64::from(rect.x_start) - scroll_x);
    let y = to_device(f64::from(rect.y_start) - scroll_y);
    if x >= screenshot.width() || y >= screenshot.height() {
        return Err(BrowserError::InvalidResponse(format!(
            "rect ({}, {}) is outside the captured viewport",
            rect.x_start, rect.y_start
        )));
    }
    let width = to_device(f64::from(rect.width())).min(screenshot.width() - x);
    let height = to_device(f64::from(rect.height())).min(screenshot.height() - y);
    Ok((x, y, width.max(1), height.max(1)))
}

fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> BrowserResult<Value> {
    let request = client.request(method, url);
    let request = match body {
        Some(body) => request.json(&body),
        None => request,
    };
    let response = request.send()?;
    let status = response.status();
    let payload: Value = response.json()?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        return Err(BrowserError::WebDriver {
            error: field("error"),
            message: field("message"),
        });
    }
    Ok(value)
}

fn number_array(value: &Value, len: usize) -> BrowserResult<Vec<f64>> {
    let numbers: Vec<f64> = value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if numbers.len() != len {
        return Err(BrowserError::InvalidResponse(format!(
            "expected {len} numbers from script, got `{value}`"
        )));
    }
    Ok(numbers)
}
