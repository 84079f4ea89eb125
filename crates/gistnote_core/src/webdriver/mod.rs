//! W3C WebDriver browser adapter.
//!
//! # Responsibility
//! - Launch one browser session through a running WebDriver server.
//! - Implement navigation, scrolling, readiness polling and viewport capture.
//!
//! # Invariants
//! - Captured tiles are returned in CSS pixels, cropped to the requested rect.
//! - A session is deleted at most once.

mod session;

pub use session::{WebDriverLauncher, WebDriverOptions, WebDriverSession};
