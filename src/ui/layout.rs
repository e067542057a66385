// src/ui/layout.rs

use ratatui::layout::{Constraint, Layout, Rect};

/// Screen regions of the interface, computed once per frame.
pub struct AppLayout {
    pub input: Rect,
    pub report: Rect,
    pub summary: Rect,
    pub footer: Rect,
    /// Empty when the log panel is hidden.
    pub log_panel: Rect,
}

/// Input box on top, footer at the bottom, and in between the flattened
/// report next to the section summary. The summary keeps enough width for the
/// longest section name; with `show_logs` the log panel takes a third column.
pub fn create_layout(frame_size: Rect, show_logs: bool) -> AppLayout {
    let [input, content, footer] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)]).areas(frame_size);

    if show_logs {
        let [report, summary, log_panel] = Layout::horizontal([
            Constraint::Percentage(45),
            Constraint::Min(28),
            Constraint::Percentage(33),
        ])
        .areas(content);
        AppLayout { input, report, summary, footer, log_panel }
    } else {
        let [report, summary] = Layout::horizontal([Constraint::Min(0), Constraint::Length(34)]).areas(content);
        AppLayout { input, report, summary, footer, log_panel: Rect::default() }
    }
}
