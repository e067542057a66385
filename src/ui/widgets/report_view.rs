// src/ui/widgets/report_view.rs

use crate::app::{App, AppState, SPINNER_CHARS};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, Table, Wrap},
};

/// Renders the flattened report, one key/value row per entry.
pub fn render_report_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default()
        .borders(Borders::ALL)
        .title("Report (Navigate with ↑ ↓)");

    match app.state {
        AppState::Idle => {
            let hint = Paragraph::new("Enter a target and press Enter. Results will appear here...")
                .alignment(Alignment::Center)
                .block(main_block);
            frame.render_widget(hint, area);
            return;
        }
        AppState::Scanning => {
            let spinner_char = SPINNER_CHARS[app.spinner_frame];
            let content = Paragraph::new(Line::from(vec![
                Span::styled(format!("{} ", spinner_char), Style::default().fg(Color::Cyan)),
                Span::raw("Analyzing... Please wait."),
            ]))
            .alignment(Alignment::Center)
            .block(main_block);
            frame.render_widget(content, area);
            return;
        }
        AppState::Finished => {}
    }

    if let Some(error) = &app.error {
        let content = Paragraph::new(Span::styled(error.as_str(), Style::default().fg(Color::Red)))
            .wrap(Wrap { trim: true })
            .block(main_block);
        frame.render_widget(content, area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let key_width = app
        .flat
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(10)
        .min(inner_area.width as usize / 2) as u16;

    let rows: Vec<Row> = app
        .flat
        .iter()
        .skip(app.scroll_offset)
        .map(|(key, value)| {
            // Failed sections and per-item failures end in `_error`.
            let style = if key.ends_with("error") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(key.as_str()).style(Style::default().fg(Color::Cyan)),
                Cell::from(value.as_str()).style(style),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(key_width), Constraint::Min(0)])
        .header(Row::new(vec!["Key", "Value"]).style(Style::default().bold().underlined()))
        .column_spacing(2);
    frame.render_widget(table, inner_area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
    frame.render_stateful_widget(scrollbar, inner_area, &mut app.report_scroll_state);
}
