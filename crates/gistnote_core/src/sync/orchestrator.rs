//! Sync pass orchestration.
//!
//! # Responsibility
//! - Decide create / update / skip per gist from the ledger and content hash.
//! - Drive one shared browser session per pass for page captures.
//! - Persist ledger progress after every synced gist.
//!
//! # Invariants
//! - Unchanged gists cause no browser and no note-store calls.
//! - A rejected note leaves the ledger untouched for that gist.
//! - The browser session is closed on every exit path once launched.
//! - `cold_start` is cleared only by a pass with no rejected gists.
//! - The listing cursor advances to a pass's start time only when that pass
//!   completes; an aborted pass relists from the previous cursor.

use super::provider::{
    Browser, BrowserError, BrowserLauncher, ItemSource, NoteStore, NoteStoreError, SourceError,
};
use crate::capture::encode_png;
use crate::capture::stitch::{StitchError, Stitcher};
use crate::capture::tile::{TilePlan, TilePlanError};
use crate::digest::content_hash;
use crate::enml::{note_title, NoteBuilder};
use crate::model::gist::GistItem;
use crate::model::ledger::LedgerEntry;
use crate::model::note::Resource;
use crate::repo::ledger_repo::{LedgerError, LedgerRepository};
use chrono::Utc;
use image::RgbaImage;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Fatal pass error; processing stops at the failing gist.
#[derive(Debug)]
pub enum SyncError {
    Source(SourceError),
    Browser(BrowserError),
    Plan(TilePlanError),
    Stitch(StitchError),
    Encode(image::ImageError),
    NoteStore(NoteStoreError),
    Ledger(LedgerError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "{err}"),
            Self::Browser(err) => write!(f, "{err}"),
            Self::Plan(err) => write!(f, "invalid page geometry: {err}"),
            Self::Stitch(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "screenshot encode failed: {err}"),
            Self::NoteStore(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "ledger write failed: {err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Browser(err) => Some(err),
            Self::Plan(err) => Some(err),
            Self::Stitch(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::NoteStore(err) => Some(err),
            Self::Ledger(err) => Some(err),
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<BrowserError> for SyncError {
    fn from(value: BrowserError) -> Self {
        Self::Browser(value)
    }
}

impl From<TilePlanError> for SyncError {
    fn from(value: TilePlanError) -> Self {
        Self::Plan(value)
    }
}

impl From<StitchError> for SyncError {
    fn from(value: StitchError) -> Self {
        Self::Stitch(value)
    }
}

impl From<image::ImageError> for SyncError {
    fn from(value: image::ImageError) -> Self {
        Self::Encode(value)
    }
}

impl From<LedgerError> for SyncError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

/// Per-pass tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Bounded wait for page readiness after navigation.
    pub ready_timeout: Duration,
    /// Wait after each scroll before capturing.
    pub settle_delay: Duration,
    /// Target notebook; `None` uses the account default.
    pub notebook_guid: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(2),
            settle_delay: crate::capture::stitch::DEFAULT_SETTLE_DELAY,
            notebook_guid: None,
        }
    }
}

/// Outcome of one gist within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created { note_ref: String },
    Updated { note_ref: String },
    Skipped,
    Rejected { reason: String },
}

/// Gist abandoned because the note store refused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    pub item_id: String,
    pub reason: String,
}

/// Summary of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub run_id: String,
    pub listed: usize,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub rejected: Vec<RejectedItem>,
    /// Whether the pass listed everything (`since = None`).
    pub full_listing: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "listed={} created={} updated={} skipped={} rejected={}",
            self.listed,
            self.created.len(),
            self.updated.len(),
            self.skipped.len(),
            self.rejected.len()
        )
    }
}

/// Explicit pass context: collaborators, ledger and options.
///
/// Constructed once and threaded through every per-gist step; nothing is
/// shared through globals.
pub struct SyncService<S, L, N, R>
where
    S: ItemSource,
    L: BrowserLauncher,
    N: NoteStore,
    R: LedgerRepository,
{
    source: S,
    launcher: L,
    notes: N,
    ledger: R,
    options: SyncOptions,
}

impl<S, L, N, R> SyncService<S, L, N, R>
where
    S: ItemSource,
    L: BrowserLauncher,
    N: NoteStore,
    R: LedgerRepository,
{
    pub fn new(source: S, launcher: L, notes: N, ledger: R, options: SyncOptions) -> Self {
        Self {
            source,
            launcher,
            notes,
            ledger,
            options,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn notes(&self) -> &N {
        &self.notes
    }

    pub fn ledger(&self) -> &R {
        &self.ledger
    }

    pub fn into_ledger(self) -> R {
        self.ledger
    }

    /// Runs one full pass over the listed gists.
    ///
    /// # Errors
    /// - Listing failure aborts before any gist is processed.
    /// - Browser, fetch, note-store transport and ledger failures abort the
    ///   remaining pass; gists already synced stay recorded.
    pub fn run_pass(&mut self) -> Result<SyncReport, SyncError> {
        let started_at = Instant::now();
        let run_id = Uuid::new_v4().simple().to_string();
        let pass_started_at = Utc::now();
        let cold_start = self.ledger.is_cold_start();
        let since = if cold_start || self.ledger.is_empty() {
            None
        } else {
            self.ledger.last_pass_at()
        };

        info!(
            "event=sync_pass module=sync status=start run_id={} cold_start={} since={}",
            run_id,
            cold_start,
            since.map_or_else(|| "none".to_string(), |at| at.to_rfc3339())
        );

        let items = match self.source.list_items(since) {
            Ok(items) => items,
            Err(err) => {
                error!(
                    "event=sync_pass module=sync status=error run_id={} error_code=list_failed error={}",
                    run_id, err
                );
                return Err(err.into());
            }
        };

        let mut report = SyncReport {
            run_id: run_id.clone(),
            listed: items.len(),
            full_listing: since.is_none(),
            ..SyncReport::default()
        };
        let mut session: Option<L::Session> = None;

        for item in &items {
            match self.sync_item(item, &mut session) {
                Ok(outcome) => record_outcome(&mut report, item, outcome),
                Err(err) => {
                    error!(
                        "event=sync_item module=sync status=error run_id={} item_id={} error={}",
                        run_id, item.id, err
                    );
                    close_session(&mut session);
                    return Err(err);
                }
            }
        }
        close_session(&mut session);

        self.ledger
            .finish_pass(pass_started_at, !report.is_clean())?;

        info!(
            "event=sync_pass module=sync status=ok run_id={} {} duration_ms={}",
            run_id,
            report,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn sync_item(
        &mut self,
        item: &GistItem,
        session: &mut Option<L::Session>,
    ) -> Result<ItemOutcome, SyncError> {
        let raw = self.source.fetch_raw(&item.content_ref)?;
        let hash = content_hash(&raw);
        let prior = self.ledger.get(&item.id).cloned();

        if prior
            .as_ref()
            .is_some_and(|entry| entry.content_hash == hash)
        {
            debug!(
                "event=sync_item module=sync status=skipped item_id={} hash={}",
                item.id, hash
            );
            return Ok(ItemOutcome::Skipped);
        }

        if session.is_none() {
            info!("event=browser_launch module=sync status=start");
            *session = Some(self.launcher.launch()?);
        }
        let Some(browser) = session.as_mut() else {
            return Err(SyncError::Browser(BrowserError::SessionClosed));
        };
        let image = capture_page(browser, &item.url, &self.options)?;
        let png = encode_png(&image)?;
        drop(image);

        let draft = NoteBuilder::new(note_title(&item.description))
            .link(&item.url)
            .attach(Resource::png(png))
            .notebook(self.options.notebook_guid.clone())
            .build();

        let result = match &prior {
            None => self.notes.create_note(&draft),
            Some(entry) => self.notes.update_note(&entry.artifact_ref, &draft),
        };
        let note_ref = match result {
            Ok(note_ref) => note_ref,
            Err(NoteStoreError::Rejected { reason }) => {
                warn!(
                    "event=sync_item module=sync status=rejected item_id={} reason={}",
                    item.id, reason
                );
                return Ok(ItemOutcome::Rejected { reason });
            }
            Err(err) => return Err(SyncError::NoteStore(err)),
        };

        let entry = LedgerEntry::new(item.id.clone(), hash, note_ref.clone())
            .with_raw_fields(item.raw_fields());
        match prior {
            None => {
                self.ledger.save(entry)?;
                info!(
                    "event=sync_item module=sync status=created item_id={} note_ref={}",
                    item.id, note_ref
                );
                Ok(ItemOutcome::Created { note_ref })
            }
            Some(_) => {
                self.ledger.update(entry)?;
                info!(
                    "event=sync_item module=sync status=updated item_id={} note_ref={}",
                    item.id, note_ref
                );
                Ok(ItemOutcome::Updated { note_ref })
            }
        }
    }
}

/// Opens `url` and captures the whole scrollable page as one image.
///
/// A readiness timeout is logged and capture proceeds with whatever rendered.
pub fn capture_page<B: Browser>(
    browser: &mut B,
    url: &str,
    options: &SyncOptions,
) -> Result<RgbaImage, SyncError> {
    browser.open(url)?;
    if !browser.wait_for_ready(options.ready_timeout)? {
        warn!(
            "event=page_ready module=sync status=timeout timeout_ms={} url={}",
            options.ready_timeout.as_millis(),
            url
        );
    }

    let metrics = browser.page_metrics()?;
    debug!(
        "event=page_metrics module=sync total={}x{} viewport={}x{}",
        metrics.total_width, metrics.total_height, metrics.viewport_width, metrics.viewport_height
    );
    let plan = TilePlan::new(
        metrics.total_width,
        metrics.total_height,
        metrics.viewport_width,
        metrics.viewport_height,
    )?;

    let browser = RefCell::new(browser);
    let image = Stitcher::new(options.settle_delay).stitch(
        &plan,
        |rect| browser.borrow_mut().capture_viewport(rect),
        |x, y| browser.borrow_mut().scroll(x, y),
    )?;
    Ok(image)
}

fn record_outcome(report: &mut SyncReport, item: &GistItem, outcome: ItemOutcome) {
    match outcome {
        ItemOutcome::Created { .. } => report.created.push(item.id.clone()),
        ItemOutcome::Updated { .. } => report.updated.push(item.id.clone()),
        ItemOutcome::Skipped => report.skipped.push(item.id.clone()),
        ItemOutcome::Rejected { reason } => report.rejected.push(RejectedItem {
            item_id: item.id.clone(),
            reason,
        }),
    }
}

fn close_session<B: Browser>(session: &mut Option<B>) {
    if let Some(mut browser) = session.take() {
        match browser.close() {
            Ok(()) => info!("event=browser_close module=sync status=ok"),
            Err(err) => warn!(
                "event=browser_close module=sync status=error error={}",
                err
            ),
        }
    }
}
