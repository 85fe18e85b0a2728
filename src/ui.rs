use crate::acknowledgment::{AckState, RenewalAcknowledgment};
use crate::dashboard::{build_rows, progress_bar, DashboardRow};
use crate::db::{RecordStore, VpsInstance};
use crate::expiry::{Clock, Severity};
use crate::renewal::RenewalEngine;
use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const BAR_WIDTH: usize = 12;

pub struct App {
    pub records: Vec<VpsInstance>,
    pub rows: Vec<DashboardRow>,
    /// One per display slot, index-aligned with `rows`
    pub acknowledgments: Vec<RenewalAcknowledgment>,
    pub state: TableState,
    pub show_detail: bool,
    pub lead_days: i64,
    pub status: Option<String>,
}

impl App {
    pub fn new(lead_days: i64) -> Self {
        Self {
            records: Vec::new(),
            rows: Vec::new(),
            acknowledgments: Vec::new(),
            state: TableState::default(),
            show_detail: false,
            lead_days,
            status: None,
        }
    }

    /// Replace the displayed records, keeping each slot's acknowledgment
    /// only while it still shows the same record
    pub fn load(&mut self, records: Vec<VpsInstance>, today: NaiveDate) {
        self.rows = build_rows(&records, today);

        self.acknowledgments.truncate(records.len());
        for (slot, record) in records.iter().enumerate() {
            match self.acknowledgments.get_mut(slot) {
                Some(ack) => ack.track(record.id),
                None => self.acknowledgments.push(RenewalAcknowledgment::new(record.id)),
            }
        }
        self.records = records;

        let selected = match (self.state.selected(), self.records.len()) {
            (_, 0) => None,
            (Some(i), len) if i >= len => Some(len - 1),
            (Some(i), _) => Some(i),
            (None, _) => Some(0),
        };
        self.state.select(selected);
    }

    /// Re-read, run renewals that became due, and re-read again if anything changed
    pub fn refresh<S: RecordStore + ?Sized>(&mut self, store: &S, today: NaiveDate) -> Result<()> {
        self.load(store.list_all()?, today);

        let lead_days = self.lead_days;
        let tickets: Vec<_> = self
            .acknowledgments
            .iter_mut()
            .zip(&self.rows)
            .enumerate()
            .filter_map(|(slot, (ack, row))| ack.evaluate(row.days_to_expiry, lead_days).map(|t| (slot, t)))
            .collect();

        if tickets.is_empty() {
            self.status = Some(format!("Refreshed {} servers", self.rows.len()));
            return Ok(());
        }

        let engine = RenewalEngine::new(store);
        let mut renewed = 0;
        let mut failed = Vec::new();
        for (slot, ticket) in tickets {
            let outcome = engine.renew(ticket.record_id);
            match &outcome {
                Ok(_) => renewed += 1,
                Err(e) => failed.push(format!("#{}: {}", ticket.record_id, e)),
            }
            self.acknowledgments[slot].resolve(ticket, &outcome);
        }

        self.load(store.list_all()?, today);
        self.status = Some(if failed.is_empty() {
            format!("Renewed {} server(s)", renewed)
        } else {
            format!("Renewed {}, failed {}: {}", renewed, failed.len(), failed.join("; "))
        });
        Ok(())
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected(&self) -> Option<(&VpsInstance, &DashboardRow, &RenewalAcknowledgment)> {
        let i = self.state.selected()?;
        Some((self.records.get(i)?, self.rows.get(i)?, self.acknowledgments.get(i)?))
    }

    fn selected_ack(&mut self) -> Option<&mut RenewalAcknowledgment> {
        let i = self.state.selected()?;
        self.acknowledgments.get_mut(i)
    }

    /// `a`: ask before enabling auto-renewal for the selected row
    pub fn request_acknowledgment(&mut self) {
        let Some(name) = self.selected().map(|(vps, _, _)| vps.name.clone()) else {
            return;
        };
        let armed = self.selected_ack().map_or(false, |ack| ack.request_confirmation());
        self.status = Some(if armed {
            format!("Auto-renew {} when due? (y/n)", name)
        } else {
            format!("{} is already set to auto-renew", name)
        });
    }

    /// `y`
    pub fn confirm_acknowledgment(&mut self) {
        if self.selected_ack().map_or(false, |ack| ack.confirm()) {
            self.status = Some("Auto-renewal acknowledged".to_string());
        }
    }

    /// `n`: drop a pending question, or withdraw an acknowledgment not yet used
    pub fn cancel_acknowledgment(&mut self) {
        let Some(ack) = self.selected_ack() else {
            return;
        };
        if ack.is_confirmation_pending() {
            ack.cancel_confirmation();
            self.status = Some("Cancelled".to_string());
        } else if ack.state() == AckState::Acknowledged {
            ack.revoke();
            self.status = Some("Auto-renewal withdrawn".to_string());
        }
    }

    pub fn next(&mut self) {
        let len = self.rows.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.rows.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui<S: RecordStore + ?Sized>(app: &mut App, store: &S, clock: &dyn Clock) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, store, clock);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend, S: RecordStore + ?Sized>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    store: &S,
    clock: &dyn Clock,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Char('a') => app.request_acknowledgment(),
                KeyCode::Char('y') => app.confirm_acknowledgment(),
                KeyCode::Char('n') => app.cancel_acknowledgment(),
                KeyCode::Char('r') => {
                    if let Err(e) = app.refresh(store, clock.today()) {
                        tracing::error!(error = %format!("{:#}", e), "refresh failed");
                        app.status = Some(format!("Refresh failed: {}", e));
                    }
                }
                _ => {}
            }
        }
    }
}

fn severity_color(severity: Option<Severity>) -> Color {
    match severity {
        Some(Severity::Safe) => Color::Green,
        Some(Severity::Warning) => Color::Yellow,
        Some(Severity::Critical) => Color::Red,
        Some(Severity::Expired) => Color::DarkGray,
        None => Color::Gray,
    }
}

fn ack_color(state: AckState) -> Color {
    match state {
        AckState::Unacknowledged => Color::DarkGray,
        AckState::Acknowledged => Color::Cyan,
        AckState::Renewing => Color::Magenta,
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Table (+ detail)
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let count = |severity: Severity| {
        app.rows
            .iter()
            .filter(|r| r.billing.progress.severity == Some(severity))
            .count()
    };

    let spans = vec![
        Span::styled(
            "VPSight",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Servers: {}", app.rows.len()), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(format!("Critical {}", count(Severity::Critical)), Style::default().fg(Color::Red)),
        Span::raw("  "),
        Span::styled(format!("Warning {}", count(Severity::Warning)), Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(format!("Expired {}", count(Severity::Expired)), Style::default().fg(Color::DarkGray)),
        Span::raw("  |  "),
        Span::styled(format!("Lead: {}d", app.lead_days), Style::default().fg(Color::Cyan)),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Name", "Cycle", "End Date", "Remaining", "Billing", "Renewal"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.rows.iter().zip(&app.acknowledgments).map(|(row, ack)| {
        let progress = row.billing.progress;
        let color = severity_color(progress.severity);
        let renewal = if ack.is_confirmation_pending() {
            "confirm? y/n"
        } else {
            ack.state().label()
        };

        Row::new(vec![
            Cell::from(truncate(&row.name, 24)),
            Cell::from(row.billing_cycle.clone()),
            Cell::from(row.billing.end_date.clone().unwrap_or_else(|| "N/A".to_string())),
            Cell::from(row.days_to_expiry.label()).style(Style::default().fg(color)),
            Cell::from(format!("{} {:>5.1}%", progress_bar(progress.percentage, BAR_WIDTH), progress.percentage))
                .style(Style::default().fg(color)),
            Cell::from(renewal).style(Style::default().fg(ack_color(ack.state()))),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(BAR_WIDTH as u16 + 8),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Servers "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.rows.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = &app.status {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Green)));
    }

    for (key, label) in [("Enter", " Details"), ("a", " Auto-renew"), ("r", " Refresh"), ("j/k", " Nav")] {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
    }
    spans.push(Span::raw(" | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn detail_line<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Server Details ");

    let Some((vps, row, ack)) = app.selected() else {
        f.render_widget(Paragraph::new("No server selected").block(block), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let or_na = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());
    let window = row.billing.window;
    let content = vec![
        Line::from(""),
        detail_line("  Name: ", vps.name.clone()),
        detail_line("  Type: ", row.system.clone()),
        detail_line("  Group: ", or_na(&vps.group_name)),
        detail_line("  Location: ", row.country_region.clone()),
        detail_line("  Price: ", row.price.clone()),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        detail_line("  Cycle: ", row.billing_cycle.clone()),
        detail_line("  Start: ", or_na(&vps.billing_start_date)),
        detail_line("  End: ", or_na(&vps.billing_end_date)),
        detail_line(
            "  Cycle start: ",
            window
                .start_date
                .map_or_else(|| "N/A".to_string(), |d| d.format("%Y-%m-%d").to_string()),
        ),
        detail_line("  Days in cycle: ", window.total_days_in_cycle.to_string()),
        detail_line("  Remaining: ", row.days_to_expiry.label()),
        detail_line("  Renewal: ", ack.state().label().to_string()),
        Line::from(""),
        detail_line("  Bandwidth: ", row.plan_bandwidth.clone()),
        detail_line("  Traffic: ", row.plan_traffic_type.clone()),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )]),
    ];

    f.render_widget(Paragraph::new(content).block(block), chunks[0]);

    let progress = row.billing.progress;
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Billing cycle "))
        .gauge_style(Style::default().fg(severity_color(progress.severity)))
        .ratio((progress.percentage / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.1}%", progress.percentage));

    f.render_widget(gauge, chunks[1]);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::parse_date;
    use crate::db::{NewVpsInstance, SqliteStore};

    fn today() -> NaiveDate {
        parse_date("2024-06-01").unwrap()
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory("http://localhost:3000").unwrap()
    }

    fn add(store: &SqliteStore, name: &str, end: &str, cycle: &str) -> i64 {
        store
            .insert(&NewVpsInstance {
                name: name.to_string(),
                billing_end_date: Some(end.to_string()),
                billing_cycle: Some(cycle.to_string()),
                ..Default::default()
            })
            .unwrap()
    }

    fn acknowledge_selected(app: &mut App) {
        app.request_acknowledgment();
        app.confirm_acknowledgment();
    }

    #[test]
    fn test_unacknowledged_rows_are_never_renewed() {
        let store = store();
        let id = add(&store, "edge-1", "2024-05-20", "Monthly");
        let mut app = App::new(0);

        app.refresh(&store, today()).unwrap();
        app.refresh(&store, today()).unwrap();

        let record = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(record.billing_end_date.as_deref(), Some("2024-05-20"));
        assert_eq!(app.acknowledgments[0].state(), AckState::Unacknowledged);
    }

    #[test]
    fn test_acknowledged_row_renews_exactly_once_within_lead() {
        let store = store();
        let id = add(&store, "edge-1", "2024-06-06", "Monthly");
        let mut app = App::new(7);
        app.refresh(&store, today()).unwrap();

        acknowledge_selected(&mut app);
        assert_eq!(app.acknowledgments[0].state(), AckState::Acknowledged);

        app.refresh(&store, today()).unwrap();
        app.refresh(&store, today()).unwrap();

        let record = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(record.billing_end_date.as_deref(), Some("2024-07-06"));
        assert_eq!(app.acknowledgments[0].state(), AckState::Unacknowledged);
        assert_eq!(app.rows[0].days_to_expiry.as_days(), Some(35));
    }

    #[test]
    fn test_failed_renewal_keeps_acknowledgment() {
        let store = store();
        add(&store, "edge-1", "2024-05-20", "whenever");
        let mut app = App::new(0);
        app.refresh(&store, today()).unwrap();
        acknowledge_selected(&mut app);

        app.refresh(&store, today()).unwrap();
        assert_eq!(app.acknowledgments[0].state(), AckState::Acknowledged);
        assert!(app.status.as_deref().unwrap().contains("failed 1"));
    }

    #[test]
    fn test_slot_resets_when_record_changes() {
        let store = store();
        let first = add(&store, "edge-1", "2024-07-01", "Monthly");
        let mut app = App::new(0);
        app.refresh(&store, today()).unwrap();
        acknowledge_selected(&mut app);

        store.delete(first).unwrap();
        let second = add(&store, "edge-2", "2024-05-01", "Monthly");
        app.refresh(&store, today()).unwrap();

        assert_eq!(app.acknowledgments[0].record_id(), second);
        assert_eq!(app.acknowledgments[0].state(), AckState::Unacknowledged);
        let record = store.get_by_id(second).unwrap().unwrap();
        assert_eq!(record.billing_end_date.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn test_cancel_and_revoke() {
        let store = store();
        add(&store, "edge-1", "2024-07-01", "Monthly");
        let mut app = App::new(0);
        app.refresh(&store, today()).unwrap();

        app.request_acknowledgment();
        assert!(app.acknowledgments[0].is_confirmation_pending());
        app.cancel_acknowledgment();
        app.confirm_acknowledgment();
        assert_eq!(app.acknowledgments[0].state(), AckState::Unacknowledged);

        acknowledge_selected(&mut app);
        app.cancel_acknowledgment();
        assert_eq!(app.acknowledgments[0].state(), AckState::Unacknowledged);
    }

    #[test]
    fn test_navigation_wraps() {
        let store = store();
        add(&store, "a", "2024-07-01", "Monthly");
        add(&store, "b", "2024-07-01", "Monthly");
        let mut app = App::new(0);
        app.refresh(&store, today()).unwrap();

        assert_eq!(app.state.selected(), Some(0));
        app.previous();
        assert_eq!(app.state.selected(), Some(1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-server-name", 10), "a-very-...");
    }
}
