use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Axis, Block, Borders, Cell, Chart, Clear, Dataset, Gauge, GraphType, Paragraph, Row, Table,
    TableState, Wrap,
};

use crate::app::{App, InputMode};
use crate::model::{Severity, Tab};
use crate::session::SessionState;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const CPU_LINE: Color = Color::Rgb(96, 165, 250);
const MEM_LINE: Color = Color::Rgb(52, 211, 153);

pub fn render(frame: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_tabs_line(frame, root[0], app);
    render_gauge_line(frame, root[1], app);
    render_body(frame, root[2], app);
    render_footer(frame, root[3], app);

    if app.node_detail().is_some() {
        render_node_detail_modal(frame, app);
    }
    if app.show_help() {
        render_help_modal(frame);
    }
}

fn render_tabs_line(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            " PERISCOPE ",
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {} ", app.server()), Style::default().fg(MUTED)),
    ];

    for (index, tab) in app.tabs().iter().enumerate() {
        let style = if *tab == app.active_tab() {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        };
        spans.push(Span::styled(
            format!(" {}:{} ", index + 1, tab.title()),
            style,
        ));
    }

    // Hidden at zero, count otherwise.
    let badge = app.alert_badge();
    if badge > 0 {
        spans.push(Span::styled(
            format!("  {badge}"),
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG).fg(Color::White)),
        area,
    );
}

/// Persistent mirror of the average CPU value: the gauge ratio and its label
/// are derived from the same number.
fn render_gauge_line(frame: &mut Frame, area: Rect, app: &App) {
    let snapshot = app.snapshot();
    let cpu = snapshot.averages.cpu.clamp(0.0, 100.0);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(18)])
        .split(area);

    let gauge = Gauge::default()
        .ratio(cpu / 100.0)
        .label(format!("CPU {cpu:.0}%"))
        .gauge_style(Style::default().fg(CPU_LINE).bg(PANEL));
    frame.render_widget(gauge, chunks[0]);

    let nodes = Paragraph::new(format!(
        " nodes {}/{} ",
        snapshot.ready_nodes(),
        snapshot.nodes.len()
    ))
    .alignment(Alignment::Right)
    .style(Style::default().bg(BG).fg(MUTED));
    frame.render_widget(nodes, chunks[1]);
}

fn render_body(frame: &mut Frame, area: Rect, app: &mut App) {
    match app.active_tab() {
        Tab::Dashboard => render_dashboard(frame, area, app),
        Tab::Nodes => render_nodes(frame, area, app),
        Tab::Pods => render_pods(frame, area, app),
        Tab::Terminal => render_terminal(frame, area, app),
    }
}

fn render_dashboard(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(9),
        ])
        .split(area);

    render_summary_cards(frame, rows[0], app);
    render_resource_chart(frame, rows[1], app);

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(rows[2]);
    render_log_panel(frame, panels[0], app);
    render_cost_panel(frame, panels[1], app);
    render_scan_panel(frame, panels[2], app);
}

fn render_summary_cards(frame: &mut Frame, area: Rect, app: &App) {
    let snapshot = app.snapshot();
    let cards = [
        ("Pods", format!("{}", snapshot.pods.len())),
        (
            "Nodes",
            format!("{}/{}", snapshot.ready_nodes(), snapshot.nodes.len()),
        ),
        ("CPU", format!("{:.0}%", snapshot.averages.cpu)),
        ("Memory", format!("{:.0}%", snapshot.averages.memory)),
    ];

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    for (chunk, (label, value)) in chunks.iter().zip(cards) {
        let card = Paragraph::new(Line::from(vec![
            Span::styled(format!(" {label}: "), Style::default().fg(MUTED)),
            Span::styled(value, Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        ]))
        .block(Block::default().borders(Borders::ALL).style(Style::default().bg(PANEL)));
        frame.render_widget(card, *chunk);
    }
}

/// Rolling CPU/memory chart over the full historical series. The data is
/// rebuilt from the whole series every frame, no windowing.
fn render_resource_chart(frame: &mut Frame, area: Rect, app: &App) {
    let historical = &app.snapshot().historical;
    let cpu_points: Vec<(f64, f64)> = historical
        .cpu
        .iter()
        .enumerate()
        .map(|(index, value)| (index as f64, *value))
        .collect();
    let memory_points: Vec<(f64, f64)> = historical
        .memory
        .iter()
        .enumerate()
        .map(|(index, value)| (index as f64, *value))
        .collect();

    let x_max = cpu_points.len().max(2).saturating_sub(1) as f64;
    let x_labels: Vec<Span> = match historical.timestamps.as_slice() {
        [] => Vec::new(),
        [only] => vec![Span::styled(only.clone(), Style::default().fg(MUTED))],
        stamps => vec![
            Span::styled(stamps[0].clone(), Style::default().fg(MUTED)),
            Span::styled(
                stamps[stamps.len() - 1].clone(),
                Style::default().fg(MUTED),
            ),
        ],
    };

    let datasets = vec![
        Dataset::default()
            .name("CPU")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(CPU_LINE))
            .data(&cpu_points),
        Dataset::default()
            .name("Memory")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(MEM_LINE))
            .data(&memory_points),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(" Resource Usage ")
                .borders(Borders::ALL)
                .style(Style::default().bg(PANEL)),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .labels(x_labels)
                .style(Style::default().fg(MUTED)),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, 100.0])
                .labels(vec![
                    Span::styled("0", Style::default().fg(MUTED)),
                    Span::styled("50", Style::default().fg(MUTED)),
                    Span::styled("100", Style::default().fg(MUTED)),
                ])
                .style(Style::default().fg(MUTED)),
        );

    frame.render_widget(chart, area);
}

fn render_log_panel(frame: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = app
        .logs()
        .iter()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp.format("%H:%M:%S")),
                    Style::default().fg(MUTED),
                ),
                Span::styled(
                    entry.message.clone(),
                    Style::default().fg(severity_color(entry.severity)),
                ),
            ])
        })
        .collect();

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Activity (c: clear) ")
            .borders(Borders::ALL)
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(panel, area);
}

fn render_cost_panel(frame: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();
    match app.cost() {
        Some(cost) => {
            lines.push(Line::from(Span::styled(
                format!(" ${:.2}/day", cost.daily),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            )));
            if let Some(monthly) = cost.predicted_monthly {
                lines.push(Line::from(Span::styled(
                    format!(" ~${monthly:.2}/month"),
                    Style::default().fg(MUTED),
                )));
            }
            for item in &cost.breakdown {
                lines.push(Line::from(Span::styled(
                    format!(" {:<10} ${:.2}", item.service, item.cost),
                    Style::default().fg(Color::White),
                )));
            }
        }
        None => lines.push(Line::from(Span::styled(
            " no cost data",
            Style::default().fg(MUTED),
        ))),
    }

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Cost ")
            .borders(Borders::ALL)
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(panel, area);
}

fn render_scan_panel(frame: &mut Frame, area: Rect, app: &App) {
    let title = if app.scanning() {
        " Security (scanning…) "
    } else {
        " Security (s: scan) "
    };

    let mut lines = Vec::new();
    match app.scan() {
        Some(report) if report.vulnerabilities.is_empty() => {
            lines.push(Line::from(Span::styled(
                " no findings",
                Style::default().fg(ACCENT),
            )));
        }
        Some(report) => {
            for vuln in &report.vulnerabilities {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!(" {} ", vuln.id),
                        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("({}) {}", vuln.severity, vuln.component),
                        Style::default().fg(scan_severity_color(&vuln.severity)),
                    ),
                ]));
            }
        }
        None => lines.push(Line::from(Span::styled(
            " not scanned yet",
            Style::default().fg(MUTED),
        ))),
    }

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(panel, area);
}

fn render_nodes(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3)])
        .split(area);
    render_search_bar(frame, chunks[0], app, Tab::Nodes);

    let rows: Vec<Row> = app
        .visible_node_rows()
        .iter()
        .map(|node| {
            Row::new(vec![
                Cell::from(Line::from(vec![
                    Span::styled("● ", Style::default().fg(status_color(&node.status))),
                    Span::raw(node.name.clone()),
                ])),
                // Unrecognized statuses render with their literal text.
                Cell::from(Span::styled(
                    node.status.clone(),
                    Style::default().fg(status_color(&node.status)),
                )),
                Cell::from(format!("{} {:>3.0}%", meter(node.cpu, 10), node.cpu)),
                Cell::from(format!("{} {:>3.0}%", meter(node.memory, 10), node.memory)),
                Cell::from(format!("{}", node.pods)),
            ])
        })
        .collect();

    let mut state = TableState::default();
    state.select(Some(app.selected_index(Tab::Nodes)));
    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(5),
        ],
    )
    .header(
        Row::new(["Node", "Status", "CPU", "Memory", "Pods"])
            .style(Style::default().fg(MUTED).add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().bg(PANEL).add_modifier(Modifier::BOLD))
    .block(
        Block::default()
            .title(" Nodes (enter: details) ")
            .borders(Borders::ALL),
    );
    frame.render_stateful_widget(table, chunks[1], &mut state);
}

fn render_pods(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3)])
        .split(area);
    render_search_bar(frame, chunks[0], app, Tab::Pods);

    let rows: Vec<Row> = app
        .visible_pod_rows()
        .iter()
        .map(|pod| {
            Row::new(vec![
                Cell::from(pod.name.clone()),
                Cell::from(Span::styled(
                    pod.status.clone(),
                    Style::default().fg(status_color(&pod.status)),
                )),
                Cell::from(pod.node.clone()),
                Cell::from(pod.age.clone()),
                Cell::from(format!("{}", pod.restarts)),
            ])
        })
        .collect();

    let mut state = TableState::default();
    state.select(Some(app.selected_index(Tab::Pods)));
    let table = Table::new(
        rows,
        [
            Constraint::Min(24),
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(6),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(["Pod", "Status", "Node", "Age", "Restarts"])
            .style(Style::default().fg(MUTED).add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().bg(PANEL).add_modifier(Modifier::BOLD))
    .block(
        Block::default()
            .title(" Pods (enter: terminal) ")
            .borders(Borders::ALL),
    );
    frame.render_stateful_widget(table, chunks[1], &mut state);
}

fn render_search_bar(frame: &mut Frame, area: Rect, app: &App, tab: Tab) {
    let editing = app.mode() == InputMode::Search && app.active_tab() == tab;
    let input = app.search_input(tab);
    let style = if editing {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(MUTED)
    };
    let cursor = if editing { "█" } else { "" };
    let line = Line::from(vec![
        Span::styled(" /", style),
        Span::styled(input.to_string(), Style::default().fg(Color::White)),
        Span::styled(cursor, style),
    ]);
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}

fn render_terminal(frame: &mut Frame, area: Rect, app: &App) {
    let (title, body_style) = match app.session().state() {
        SessionState::Closed => (
            " Terminal (select a pod and press enter) ".to_string(),
            Style::default().fg(MUTED),
        ),
        SessionState::Opening => (
            format!(
                " Terminal: {} (connecting...) ",
                app.session().pod().unwrap_or("?")
            ),
            Style::default().fg(Color::White),
        ),
        SessionState::Open => (
            format!(
                " Terminal: {} (ctrl+]: detach, x: close) ",
                app.session().pod().unwrap_or("?")
            ),
            Style::default().fg(Color::White),
        ),
    };

    // Raw passthrough: show the tail of the byte stream as-is.
    let visible_lines = area.height.saturating_sub(2) as usize;
    let text: Vec<Line> = app
        .terminal_buffer()
        .lines()
        .rev()
        .take(visible_lines.max(1))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|line| Line::from(line.to_string()))
        .collect();

    let view = Paragraph::new(Text::from(text))
        .style(body_style)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(view, area);
}

fn render_node_detail_modal(frame: &mut Frame, app: &App) {
    let Some(detail) = app.node_detail() else {
        return;
    };
    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![Line::from(Span::styled(
        format!(" {} ({})", detail.name, detail.status),
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    ))];
    lines.push(Line::from(Span::styled(
        " capacity:",
        Style::default().fg(MUTED),
    )));
    for (key, value) in &detail.capacity {
        lines.push(Line::from(format!("   {key}: {value}")));
    }
    lines.push(Line::from(Span::styled(
        " usage:",
        Style::default().fg(MUTED),
    )));
    for (key, value) in &detail.usage {
        lines.push(Line::from(format!("   {key}: {value}")));
    }
    if !detail.conditions.is_empty() {
        lines.push(Line::from(Span::styled(
            " conditions:",
            Style::default().fg(MUTED),
        )));
        for condition in &detail.conditions {
            lines.push(Line::from(format!(
                "   {} = {}",
                condition.kind, condition.status
            )));
        }
    }

    let modal = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(" Node Detail (esc: close) ")
            .borders(Borders::ALL)
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(modal, area);
}

fn render_help_modal(frame: &mut Frame) {
    let area = centered_rect(50, 50, frame.area());
    frame.render_widget(Clear, area);

    let lines = [
        "1-4 / tab    switch tab",
        "j/k          move selection",
        "/            search (300ms debounce)",
        "enter        node details / pod terminal",
        "r            refresh now",
        "s            security scan",
        "c            clear activity log",
        "x            close terminal session",
        "ctrl+]       detach from terminal",
        "q            quit",
    ]
    .iter()
    .map(|line| Line::from(format!(" {line}")))
    .collect::<Vec<_>>();

    let modal = Paragraph::new(lines).block(
        Block::default()
            .title(" Help (esc: close) ")
            .borders(Borders::ALL)
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(modal, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode() {
        InputMode::Normal => "NORMAL",
        InputMode::Search => "SEARCH",
        InputMode::Terminal => "TERMINAL",
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {mode} "),
            Style::default().fg(Color::Black).bg(ACCENT),
        ),
        Span::styled(format!(" {}", app.status()), Style::default().fg(MUTED)),
        Span::styled("  ?: help", Style::default().fg(MUTED)),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(BG)),
        area,
    );
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => MUTED,
        Severity::Warning => WARN,
        Severity::Critical => ERROR,
    }
}

fn status_color(status: &str) -> Color {
    match status.to_ascii_lowercase().as_str() {
        "ready" | "running" => ACCENT,
        "pending" | "notready" => WARN,
        "error" | "failed" | "crashloopbackoff" => ERROR,
        _ => MUTED,
    }
}

fn scan_severity_color(severity: &str) -> Color {
    match severity.to_ascii_lowercase().as_str() {
        "critical" | "high" => ERROR,
        "medium" => WARN,
        _ => MUTED,
    }
}

/// Textual usage meter, e.g. `▰▰▰▰▱▱▱▱▱▱`.
fn meter(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let mut bar = String::with_capacity(width * 3);
    for index in 0..width {
        bar.push(if index < filled { '▰' } else { '▱' });
    }
    bar
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::meter;

    #[test]
    fn meter_scales_with_percent() {
        assert_eq!(meter(0.0, 4), "▱▱▱▱");
        assert_eq!(meter(50.0, 4), "▰▰▱▱");
        assert_eq!(meter(100.0, 4), "▰▰▰▰");
        assert_eq!(meter(250.0, 4), "▰▰▰▰");
    }
}
