use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::app::PickerApp;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);

pub fn render(frame: &mut Frame, app: &mut PickerApp) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(4),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    app.set_page_size(table_rows_visible(root[1]));

    render_header(frame, root[0], app);
    render_table(frame, root[1], app);
    render_prompt(frame, root[2], app);
    render_footer(frame, root[3], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &PickerApp) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " podsh ", Color::White, PL_A, PL_B);
    let target = match app.header() {
        Some(header) => format!(
            " {} @ {}  snapshot {} ",
            header.context,
            display_cluster_endpoint(&header.cluster),
            header.captured_at
        ),
        None => " pods ".to_string(),
    };
    push_powerline_segment(&mut spans, target, Color::White, PL_B, BG);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_table(frame: &mut Frame, area: Rect, app: &PickerApp) {
    let header_row = Row::new(
        ["Name", "Namespace", "Status", "Node", "Age"]
            .into_iter()
            .map(|header| Cell::from(header).style(Style::default().add_modifier(Modifier::BOLD))),
    )
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = app.visible_rows().map(|(_, row)| {
        Row::new(vec![
            Cell::from(row.label.clone()).style(Style::default().fg(Color::White)),
            Cell::from(compact_text(&row.namespace, 24)).style(Style::default().fg(MUTED)),
            Cell::from(row.phase.clone()).style(Style::default().fg(phase_color(&row.phase))),
            Cell::from(compact_text(&row.node, 28)).style(Style::default().fg(MUTED)),
            Cell::from(row.age.clone()).style(Style::default().fg(MUTED)),
        ])
    });

    let block = Block::default()
        .title(format!("Pods ({}/{})", app.matched(), app.total()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let table = Table::new(
        rows,
        vec![
            Constraint::Percentage(40),
            Constraint::Percentage(18),
            Constraint::Length(10),
            Constraint::Percentage(22),
            Constraint::Length(6),
        ],
    )
    .header(header_row)
    .block(block)
    .column_spacing(1)
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(24, 36, 58))
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    let mut state = TableState::default();
    state.select(app.selected_position());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_prompt(frame: &mut Frame, area: Rect, app: &PickerApp) {
    let line = Line::from(vec![
        Span::styled("> ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::styled(app.query().to_string(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);

    let cursor_x = prompt_cursor_x(area, app.query().chars().count());
    frame.set_cursor_position((cursor_x, area.y));
}

/// Column just past the typed query, clamped to the prompt line.
fn prompt_cursor_x(area: Rect, typed_chars: usize) -> u16 {
    let typed = u16::try_from(typed_chars).unwrap_or(u16::MAX);
    area.x
        .saturating_add(2)
        .saturating_add(typed)
        .min(area.right().saturating_sub(1))
}

fn render_footer(frame: &mut Frame, area: Rect, app: &PickerApp) {
    let (label, color) = if app.total() > 0 && app.matched() == 0 {
        (" no match ", WARN)
    } else {
        (" select ", PL_A)
    };
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, label, Color::Black, color, BG);
    spans.push(Span::styled(
        " enter: exec  esc/ctrl-c: cancel  ↑/↓ ctrl-n/p: move  ctrl-u: clear",
        Style::default().fg(MUTED),
    ));
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn phase_color(phase: &str) -> Color {
    match phase {
        "Running" | "Succeeded" => ACCENT,
        "Pending" => WARN,
        "Failed" => ERROR,
        _ => MUTED,
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    text: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        text.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn table_rows_visible(area: Rect) -> usize {
    area.height.saturating_sub(3).max(1) as usize
}

fn compact_text(value: &str, max_chars: usize) -> String {
    let count = value.chars().count();
    if count <= max_chars {
        return value.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let mut out = value.chars().take(max_chars - 1).collect::<String>();
    out.push('…');
    out
}

fn display_cluster_endpoint(cluster: &str) -> String {
    let trimmed = cluster
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    compact_text(trimmed, 40)
}
