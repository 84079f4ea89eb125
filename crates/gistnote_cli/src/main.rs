//! `gistnote` entry point.
//!
//! # Responsibility
//! - Run exactly one sync pass with configuration from file and environment.
//! - Print the pass report; exit non-zero when the pass aborts.

use gistnote_core::config;
use gistnote_core::{
    init_logging, open_state_dir, EvernoteNoteStore, GistClient, JsonLedger, SyncReport,
    SyncService, WebDriverLauncher,
};
use log::{error, info};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={}", err);
            eprintln!("gistnote: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<SyncReport, Box<dyn Error>> {
    let config = config::load()?;
    init_logging(&config.log_options()?)?;
    info!(
        "event=cli_start module=cli status=ok version={} state_dir={}",
        gistnote_core::core_version(),
        config.state_dir.display()
    );

    let state_dir = open_state_dir(&config.state_dir)?;
    let ledger = JsonLedger::open(&state_dir)?;
    let source = GistClient::new(config.gist_client_options())?;
    let launcher = WebDriverLauncher::new(config.webdriver_options())?;
    let notes = EvernoteNoteStore::new(config.evernote_options())?;

    let mut service = SyncService::new(source, launcher, notes, ledger, config.sync_options());
    Ok(service.run_pass()?)
}

fn print_report(report: &SyncReport) {
    println!("run {}: {}", report.run_id, report);
    for item_id in &report.created {
        println!("  created  {item_id}");
    }
    for item_id in &report.updated {
        println!("  updated  {item_id}");
    }
    for rejected in &report.rejected {
        println!("  rejected {} ({})", rejected.item_id, rejected.reason);
    }
}
