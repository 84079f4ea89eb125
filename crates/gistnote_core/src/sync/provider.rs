//! Collaborator contracts consumed by the sync orchestrator.
//!
//! # Responsibility
//! - Define the item source, browser and note-store seams.
//! - Define per-seam error types so callers can classify failures.
//!
//! # Invariants
//! - `NoteStoreError::Rejected` is the only error the orchestrator absorbs.
//! - Adapters never retry; every failure is surfaced once.

use crate::capture::tile::CaptureRect;
use crate::model::gist::GistItem;
use crate::model::note::NoteDraft;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type SourceResult<T> = Result<T, SourceError>;
pub type BrowserResult<T> = Result<T, BrowserError>;
pub type NoteStoreResult<T> = Result<T, NoteStoreError>;

/// Item listing / raw content fetch failure.
#[derive(Debug)]
pub enum SourceError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Api(String),
    InvalidResponse(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(err) => write!(f, "item source request failed: {err}"),
            Self::Status { status, body } => {
                write!(f, "item source returned status {status}: {body}")
            }
            Self::Api(message) => write!(f, "item source api error: {message}"),
            Self::InvalidResponse(message) => {
                write!(f, "invalid item source response: {message}")
            }
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Browser automation failure.
#[derive(Debug)]
pub enum BrowserError {
    Http(reqwest::Error),
    WebDriver { error: String, message: String },
    Image(image::ImageError),
    InvalidResponse(String),
    SessionClosed,
}

impl Display for BrowserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(err) => write!(f, "webdriver request failed: {err}"),
            Self::WebDriver { error, message } => write!(f, "webdriver error `{error}`: {message}"),
            Self::Image(err) => write!(f, "screenshot decode failed: {err}"),
            Self::InvalidResponse(message) => write!(f, "invalid webdriver response: {message}"),
            Self::SessionClosed => write!(f, "browser session already closed"),
        }
    }
}

impl Error for BrowserError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<image::ImageError> for BrowserError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}

/// Note-store failure.
#[derive(Debug)]
pub enum NoteStoreError {
    /// The store refused the payload or its references (bad notebook, bad
    /// note GUID, malformed ENML). The item is abandoned, the pass continues.
    Rejected { reason: String },
    /// Service-side failure such as rate limiting.
    System { code: i32, message: String },
    Http(reqwest::Error),
    /// Non-2xx HTTP answer from the note-store endpoint.
    Status { status: u16 },
    Protocol(String),
}

impl NoteStoreError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

impl Display for NoteStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "note store rejected note: {reason}"),
            Self::System { code, message } => {
                write!(f, "note store system error {code}: {message}")
            }
            Self::Http(err) => write!(f, "note store request failed: {err}"),
            Self::Status { status } => write!(f, "note store returned http status {status}"),
            Self::Protocol(message) => write!(f, "note store protocol error: {message}"),
        }
    }
}

impl Error for NoteStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NoteStoreError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Source of gists to synchronize.
pub trait ItemSource {
    /// Lists gists pushed strictly after `since`; `None` lists everything.
    fn list_items(&self, since: Option<DateTime<Utc>>) -> SourceResult<Vec<GistItem>>;

    /// Fetches raw gist content used for change detection.
    fn fetch_raw(&self, content_ref: &str) -> SourceResult<Vec<u8>>;
}

/// Scrollable page geometry in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub total_width: u32,
    pub total_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// One live browser session.
pub trait Browser {
    fn open(&mut self, url: &str) -> BrowserResult<()>;

    /// Waits until the page reports ready; `Ok(false)` on timeout.
    fn wait_for_ready(&mut self, timeout: Duration) -> BrowserResult<bool>;

    fn page_metrics(&mut self) -> BrowserResult<PageMetrics>;

    fn scroll(&mut self, x: u32, y: u32) -> BrowserResult<()>;

    /// Captures the visible viewport cropped to `rect`.
    fn capture_viewport(&mut self, rect: &CaptureRect) -> BrowserResult<RgbaImage>;

    fn close(&mut self) -> BrowserResult<()>;
}

/// Starts browser sessions; one session serves a whole pass.
pub trait BrowserLauncher {
    type Session: Browser;

    fn launch(&self) -> BrowserResult<Self::Session>;
}

/// Remote note store.
pub trait NoteStore {
    /// Creates a note and returns its reference.
    fn create_note(&self, draft: &NoteDraft) -> NoteStoreResult<String>;

    /// Replaces title, content and resources of `note_ref`.
    fn update_note(&self, note_ref: &str, draft: &NoteDraft) -> NoteStoreResult<String>;
}
