// 🖥️ Terminal dashboard - four tabs over one DashboardSnapshot
//
// Tab | Shift+Tab cycle views, 1-4 jump straight to one, j/k move through
// the credit history, q quits.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

use crate::dashboard::{DashboardSnapshot, View};
use crate::models::{CreditTransaction, PollutantKind, TransactionStatus};

pub struct App {
    pub snapshot: DashboardSnapshot,
    pub transactions: Vec<CreditTransaction>,
    pub current_view: View,
    pub state: TableState,
}

impl App {
    pub fn new(snapshot: DashboardSnapshot, transactions: Vec<CreditTransaction>) -> Self {
        let mut state = TableState::default();
        if !transactions.is_empty() {
            state.select(Some(0));
        }

        App {
            snapshot,
            transactions,
            current_view: View::Overview,
            state,
        }
    }

    pub fn next_view(&mut self) {
        self.current_view = self.current_view.next();
    }

    pub fn previous_view(&mut self) {
        self.current_view = self.current_view.previous();
    }

    pub fn next(&mut self) {
        if self.transactions.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.transactions.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.transactions.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.transactions.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn selected_transaction(&self) -> Option<&CreditTransaction> {
        self.state.selected().and_then(|i| self.transactions.get(i))
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        tracing::error!(error = %err, "dashboard exited with an error");
    }

    Ok(res?)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_view();
                    } else {
                        app.next_view();
                    }
                }
                KeyCode::BackTab => app.previous_view(),
                KeyCode::Char('1') => app.current_view = View::Overview,
                KeyCode::Char('2') => app.current_view = View::Emissions,
                KeyCode::Char('3') => app.current_view = View::Credits,
                KeyCode::Char('4') => app.current_view = View::SacRating,
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_view {
        View::Overview => render_overview(f, chunks[1], app),
        View::Emissions => render_emissions(f, chunks[1], app),
        View::Credits => render_credits(f, chunks[1], app),
        View::SacRating => render_rating(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, view) in View::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *view == app.current_view {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(view.title(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        app.snapshot.company.name.clone(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!(
            "{} → {}",
            app.snapshot.emissions.window.start, app.snapshot.emissions.window.end
        ),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn stat_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<22}", label), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ])
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let stats = &app.snapshot.overview;
    let ledger = &app.snapshot.ledger;

    let (change, change_color) = match stats.emissions_change_percent {
        Some(p) if p <= 0.0 => (format!("{:+.1}% vs previous period", p), Color::Green),
        Some(p) => (format!("{:+.1}% vs previous period", p), Color::Red),
        None => ("no previous period".to_string(), Color::DarkGray),
    };

    let content = vec![
        Line::from(""),
        stat_line("Total emissions", format!("{:.2} t", stats.total_emissions), Color::White),
        stat_line("Change", change, change_color),
        stat_line("Credit balance", format!("{:.2} credits", stats.credit_balance), Color::Cyan),
        stat_line(
            "Balance change",
            stats
                .credit_change_percent
                .map(|p| format!("{:+.1}% over the window", p))
                .unwrap_or_else(|| "no opening balance".to_string()),
            Color::Cyan,
        ),
        stat_line(
            "Credit value",
            format!("{:.2} {}", stats.credit_balance * ledger.market_price, ledger.currency),
            Color::Cyan,
        ),
        stat_line(
            "SAC grade",
            stats.grade.clone().unwrap_or_else(|| "not assessed".to_string()),
            Color::Yellow,
        ),
        stat_line(
            "Compliance score",
            stats
                .compliance_score
                .map(|s| format!("{:.0}/100", s))
                .unwrap_or_else(|| "-".to_string()),
            Color::Yellow,
        ),
        stat_line(
            "Compliance change",
            stats
                .compliance_change
                .map(|c| format!("{:+.0} pts since last assessment", c))
                .unwrap_or_else(|| "-".to_string()),
            Color::Yellow,
        ),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Overview - {} ", app.snapshot.company.location)),
    );

    f.render_widget(paragraph, area);
}

fn render_emissions(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let summary = &app.snapshot.emissions;

    let mut header_labels: Vec<&str> = vec!["Period"];
    header_labels.extend(PollutantKind::ALL.iter().map(|p| p.as_str()));
    header_labels.push("Total");

    let header = Row::new(header_labels.into_iter().map(|h| {
        Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = summary.buckets.iter().map(|bucket| {
        let mut cells = vec![Cell::from(bucket.period.label.clone())];
        cells.extend(
            PollutantKind::ALL
                .iter()
                .map(|&p| Cell::from(format!("{:.2}", bucket.get(p)))),
        );
        cells.push(
            Cell::from(format!("{:.2}", bucket.total))
                .style(Style::default().add_modifier(Modifier::BOLD)),
        );
        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(10)];
    widths.extend(PollutantKind::ALL.iter().map(|_| Constraint::Length(10)));
    widths.push(Constraint::Length(12));

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Emission trend (tonnes, {:?}) ", summary.granularity)),
    );
    f.render_widget(table, chunks[0]);

    // Distribution as bars, whole tonnes
    let bars: Vec<(&str, u64)> = summary
        .distribution
        .iter()
        .map(|slice| (slice.pollutant.as_str(), slice.total.max(0.0).round() as u64))
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" Distribution - {:.2} t total ", summary.total)),
        )
        .data(bars.as_slice())
        .bar_width(8)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Green))
        .value_style(Style::default().fg(Color::Black).bg(Color::Green));
    f.render_widget(chart, chunks[1]);
}

fn render_credits(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)])
        .split(area);

    let ledger = &app.snapshot.ledger;
    let summary = Paragraph::new(vec![
        stat_line("Balance", format!("{:.2} credits", ledger.balance), Color::Cyan),
        stat_line("Pending", format!("{:+.2} credits", ledger.pending_credits), Color::Yellow),
        stat_line(
            "Market price",
            format!("{:.2} {} / credit", ledger.market_price, ledger.currency),
            Color::White,
        ),
        stat_line("Available", format!("{:.0} credits", ledger.available_credits), Color::White),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Carbon Credit Ledger "),
    );
    f.render_widget(summary, chunks[0]);

    let header = Row::new(["Date", "Kind", "Credits", "Price", "Total", "Status"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = app.transactions.iter().map(|tx| {
        let status_color = match tx.status {
            TransactionStatus::Pending => Color::Yellow,
            TransactionStatus::Completed => Color::Green,
            TransactionStatus::Cancelled => Color::DarkGray,
        };

        Row::new(vec![
            Cell::from(tx.transaction_date.to_string()),
            Cell::from(tx.kind.as_str()),
            Cell::from(format!("{:.2}", tx.credits)),
            Cell::from(format!("{:.2}", tx.price_per_credit)),
            Cell::from(format!("{:.2}", tx.total_amount)),
            Cell::from(tx.status.as_str()).style(Style::default().fg(status_color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Transactions ({}) ", app.transactions.len())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.state);
}

fn render_rating(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(" SAC Rating ");

    let Some(rating) = &app.snapshot.rating else {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from("  No assessment recorded yet."),
            Line::from("  Run: carbon-audit rating assess <company> ..."),
        ])
        .block(block);
        f.render_widget(empty, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(" Grade {} ", rating.grade)))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio((rating.overall / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.0}/100", rating.overall));
    f.render_widget(gauge, chunks[0]);

    let percentile = rating
        .percentile
        .map(|p| format!("{} of MSMEs in {}", p.label(), app.snapshot.company.location))
        .unwrap_or_else(|| "-".to_string());

    let details = Paragraph::new(vec![
        Line::from(""),
        stat_line("Pollutant knowledge", format!("{:.0}/100", rating.sub_scores.knowledge), Color::White),
        stat_line("Compliance", format!("{:.0}/100", rating.sub_scores.compliance), Color::White),
        stat_line("Reduction efforts", format!("{:.0}/100", rating.sub_scores.reduction), Color::White),
        Line::from(""),
        stat_line("Peer position", percentile, Color::Cyan),
        stat_line("Trend", rating.trend.as_str().to_string(), Color::Yellow),
        stat_line("Assessed on", rating.assessment_date.to_string(), Color::DarkGray),
    ])
    .block(block);
    f.render_widget(details, chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(" {} ", app.current_view.title()),
        Style::default().fg(Color::Cyan),
    )];

    if app.current_view == View::Credits {
        if let Some(tx) = app.selected_transaction() {
            status_spans.push(Span::raw(" | "));
            status_spans.push(Span::styled(tx.id.clone(), Style::default().fg(Color::DarkGray)));
        }
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" View | "));
    status_spans.push(Span::styled("1-4", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Jump | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::SqliteStore;
    use crate::models::{Company, DateRange, SubScores, TransactionKind};
    use crate::store::RecordStore;
    use chrono::NaiveDate;
    use ratatui::backend::TestBackend;

    fn build_app(count: usize, assessments: &[(f64, NaiveDate)]) -> App {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let company = Company::new("Acme Industries Ltd.", "Textiles", "Indore");
        store.insert_company(&company).unwrap();

        let config = AppConfig::default();
        let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        for _ in 0..count {
            config
                .ledger()
                .record_transaction(&mut store, &company.id, TransactionKind::Purchase, 5.0, 2500.0, day)
                .unwrap();
        }

        let rating = config.rating_engine().unwrap();
        for &(compliance, on) in assessments {
            let scores = SubScores { knowledge: 85.0, compliance, reduction: 80.0 };
            rating.assess(&mut store, &company.id, scores, on, None).unwrap();
        }

        let window = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap();
        let snapshot = DashboardSnapshot::build(&store, &config, &company.id, &window).unwrap();
        let transactions = store.list_transactions(&company.id).unwrap();

        App::new(snapshot, transactions)
    }

    fn app_with_transactions(count: usize) -> App {
        build_app(count, &[])
    }

    fn render(app: &mut App, view: View) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        app.current_view = view;
        terminal.draw(|f| ui(f, app)).unwrap();

        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_view_navigation() {
        let mut app = app_with_transactions(0);
        assert_eq!(app.current_view, View::Overview);

        app.next_view();
        app.next_view();
        assert_eq!(app.current_view, View::Credits);

        app.previous_view();
        app.previous_view();
        app.previous_view();
        assert_eq!(app.current_view, View::SacRating);
    }

    #[test]
    fn test_row_selection_wraps() {
        let mut app = app_with_transactions(3);
        assert_eq!(app.state.selected(), Some(0));

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        assert!(app.selected_transaction().is_some());

        let mut empty = app_with_transactions(0);
        empty.next();
        assert_eq!(empty.state.selected(), None);
        assert!(empty.selected_transaction().is_none());
    }

    #[test]
    fn test_every_view_renders() {
        let mut app = app_with_transactions(2);

        for view in View::ALL {
            assert!(render(&mut app, view).contains(view.title()));
        }
        assert!(render(&mut app, View::SacRating).contains("No assessment recorded yet."));
    }

    #[test]
    fn test_rating_view_renders_gauge() {
        let mut app = build_app(
            0,
            &[
                (85.0, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()),
                (90.0, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
            ],
        );

        let screen = render(&mut app, View::SacRating);
        assert!(screen.contains("Grade B+"));
        assert!(screen.contains("85/100"));
        assert!(screen.contains("Improved"));
        assert!(!screen.contains("No assessment recorded yet."));

        let overview = render(&mut app, View::Overview);
        assert!(overview.contains("+5 pts since last assessment"));
    }
}
