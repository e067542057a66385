// src/ui/widgets/summary.rs

use crate::app::{App, AppState, ExportStatus};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};
use vanguard_recon::{RunState, Section};

/// Renders the run summary: terminal state, completeness gauge, per-section
/// status and the result of the last export.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Summary");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // State
            Constraint::Length(1), // Gauge
            Constraint::Length(1), // Spacer
            Constraint::Length(9), // Sections
            Constraint::Min(0),    // Export status
        ])
        .split(area);

    if app.state != AppState::Finished {
        return;
    }
    let Some(outcome) = &app.outcome else {
        return;
    };
    let summary = &outcome.summary;

    // --- State ---
    let state_style = match summary.state {
        RunState::Completed => Style::default().fg(Color::Green),
        RunState::PartiallyFailed => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Cyan),
    };
    let total = summary.succeeded.len() + summary.failed.len();
    let state_text = Text::from(vec![
        Line::from(summary.state.to_string().bold()).style(state_style),
        Line::from(format!("{}/{} sections succeeded", summary.succeeded.len(), total)),
    ]);
    frame.render_widget(Paragraph::new(state_text).alignment(Alignment::Center), summary_chunks[0]);

    // --- Gauge ---
    let percent = if total == 0 { 0 } else { (summary.succeeded.len() * 100 / total) as u16 };
    let gauge = Gauge::default()
        .percent(percent)
        .label("")
        .style(Style::default().fg(if percent == 100 {
            Color::Green
        } else if percent >= 50 {
            Color::Yellow
        } else {
            Color::Red
        }));
    frame.render_widget(gauge, summary_chunks[1]);

    // --- Sections ---
    let mut section_lines = Vec::new();
    for section in Section::probe_sections() {
        let failure = summary.failed.iter().find(|(s, _)| *s == section).map(|(_, kind)| kind);
        let line = match failure {
            None => Line::from(vec![
                Span::styled("✓ ", Style::default().fg(Color::Green)),
                Span::raw(section.to_string()),
            ]),
            Some(kind) => Line::from(vec![
                Span::styled("✗ ", Style::default().fg(Color::Red)),
                Span::raw(section.to_string()),
                Span::styled(format!(" ({kind})"), Style::default().fg(Color::DarkGray)),
            ]),
        };
        section_lines.push(line);
    }
    let sections_block = Block::default().title("SECTIONS".bold());
    frame.render_widget(Paragraph::new(section_lines).block(sections_block), summary_chunks[3]);

    // --- Export ---
    let export_line = match &app.export_status {
        ExportStatus::Idle => Line::from("Press E to export JSON + CSV."),
        ExportStatus::Success(path) => {
            Line::from(Span::styled(format!("Saved: {path}.json/.csv"), Style::default().fg(Color::Green)))
        }
        ExportStatus::Error(e) => Line::from(Span::styled(format!("Export failed: {e}"), Style::default().fg(Color::Red))),
    };
    frame.render_widget(Paragraph::new(export_line).wrap(Wrap { trim: true }), summary_chunks[4]);
}
