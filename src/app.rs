// src/app.rs

use ratatui::widgets::ScrollbarState;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vanguard_recon::core::flatten::{FlatRecord, Flattener};
use vanguard_recon::core::models::RunOutcome;
use vanguard_recon::{export, logging, Target};

pub const SPINNER_CHARS: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Lines of the log file kept for the log panel.
const LOG_TAIL: usize = 200;

pub enum ExportStatus {
    Idle,
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Scanning,
    Finished,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    pub outcome: Option<RunOutcome>,
    /// Set when the input was rejected before any probe ran.
    pub error: Option<String>,
    pub flat: FlatRecord,
    pub flattener: Flattener,
    pub scroll_offset: usize,
    pub report_scroll_state: ScrollbarState,
    pub export_status: ExportStatus,
    pub spinner_frame: usize,
    pub cancel: Option<CancellationToken>,
    pub show_logs: bool,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
}

impl App {
    pub fn new(flattener: Flattener) -> Self {
        Self {
            should_quit: false,
            state: AppState::Idle,
            input: String::new(),
            outcome: None,
            error: None,
            flat: FlatRecord::new(),
            flattener,
            scroll_offset: 0,
            report_scroll_state: ScrollbarState::default(),
            export_status: ExportStatus::Idle,
            spinner_frame: 0,
            cancel: None,
            show_logs: false,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
        }
    }

    /// Switches to `Scanning` and returns the token that cancels this run.
    pub fn start_scan(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.state = AppState::Scanning;
        self.error = None;
        self.export_status = ExportStatus::Idle;
        token
    }

    pub fn cancel_scan(&mut self) {
        if let Some(token) = &self.cancel {
            info!("Cancelling the running analysis.");
            token.cancel();
        }
    }

    pub fn finish(&mut self, message: Result<RunOutcome, String>) {
        self.cancel = None;
        self.state = AppState::Finished;
        self.scroll_offset = 0;
        match message {
            Ok(outcome) => {
                self.flat = outcome.report.flatten_with(&self.flattener);
                self.outcome = Some(outcome);
            }
            Err(e) => {
                self.flat.clear();
                self.outcome = None;
                self.error = Some(e);
            }
        }
        self.report_scroll_state = ScrollbarState::new(self.flat.len()).position(0);
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
        self.report_scroll_state = self.report_scroll_state.position(self.scroll_offset);
    }

    pub fn scroll_down(&mut self) {
        if self.scroll_offset + 1 < self.flat.len() {
            self.scroll_offset += 1;
        }
        self.report_scroll_state = self.report_scroll_state.position(self.scroll_offset);
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
        if self.show_logs {
            self.refresh_logs();
        }
    }

    /// Writes the current report as JSON and CSV into `dir`.
    pub fn export_to(&mut self, dir: &Path) {
        let Some(outcome) = &self.outcome else {
            self.export_status = ExportStatus::Error("Nothing to export.".to_string());
            return;
        };
        let stem = match Target::parse(&self.input) {
            Ok(target) => export::default_stem(&target),
            Err(_) => "recon_report".to_string(),
        };
        self.export_status = match export::export_all(&outcome.report, &self.flattener, dir, &stem) {
            Ok((json_path, csv_path)) => {
                info!(json = %json_path.display(), csv = %csv_path.display(), "Report exported.");
                ExportStatus::Success(json_path.with_extension("").display().to_string())
            }
            Err(e) => {
                warn!(error = %e, "Export failed.");
                ExportStatus::Error(e.to_string())
            }
        };
    }

    pub fn on_tick(&mut self) {
        if self.state == AppState::Scanning {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        }
        if self.show_logs {
            self.refresh_logs();
        }
    }

    fn refresh_logs(&mut self) {
        self.log_content = logging::tail(&logging::log_file_path(), LOG_TAIL);
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn reset(&mut self) {
        let flattener = self.flattener.clone();
        let show_logs = self.show_logs;
        *self = Self::new(flattener);
        self.show_logs = show_logs;
    }
}
