mod app;

use std::io;
use std::time::Duration;

use app::{format_age, format_cents, format_usd, truncate, AppState, ConnectionStatus};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

/// Matches the dashboard page's poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();

    let result = run_loop(&mut terminal, &mut app, &client, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    table_state: &mut TableState,
) -> io::Result<()> {
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, table_state))?;

        let timeout = POLL_INTERVAL
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.trigger_refresh(client).await;
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('w') | KeyCode::Char('W') => {
                            app.toggle_rewards_only();
                            table_state.select(None);
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.visible().len().saturating_sub(1);
                            let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
                            table_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = table_state.selected().map_or(0, |i| i.saturating_sub(1));
                            table_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= POLL_INTERVAL {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // records
            Constraint::Length(1), // selection detail
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_records_table(f, app, table_state, chunks[1]);
    render_detail(f, app, table_state, chunks[2]);
    render_footer(f, app, chunks[3]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let data = &app.data;
    let (state_text, state_color) = if data.loading {
        ("loading first snapshot".to_string(), Color::Yellow)
    } else if data.in_flight {
        (
            format!(
                "refreshing {} markets / {} rewards",
                data.progress.markets, data.progress.rewards
            ),
            Color::Yellow,
        )
    } else {
        (data.progress.status.clone(), Color::Green)
    };

    let spans = vec![
        Span::styled(
            " Polymarket Rewards  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(state_text, Style::default().fg(state_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} markets", data.total_count),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("★ {} in rewards", data.rewards_count),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("updated {}", format_age(data.last_updated, chrono::Utc::now())),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_records_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["★", "Market", "Yes", "No", "Spread", "Vol 24h", "Liquidity"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        });
    let header = Row::new(header_cells).height(1);

    let visible = app.visible();
    let rows: Vec<Row> = visible
        .iter()
        .map(|r| {
            let star = if r.has_rewards {
                Cell::from("★").style(Style::default().fg(Color::Yellow))
            } else {
                Cell::from(" ")
            };
            Row::new(vec![
                star,
                Cell::from(truncate(&r.question, 60)),
                Cell::from(format_cents(r.yes_price)).style(Style::default().fg(Color::Green)),
                Cell::from(format_cents(r.no_price)).style(Style::default().fg(Color::Red)),
                Cell::from(format_cents(r.spread)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_usd(r.volume_24hr)),
                Cell::from(format_usd(r.liquidity)),
            ])
        })
        .collect();

    let title = if app.rewards_only {
        format!(" REWARDS MARKETS ({}) ", visible.len())
    } else {
        format!(" ALL MARKETS ({}) ", visible.len())
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Min(20),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_detail(f: &mut Frame, app: &AppState, state: &TableState, area: Rect) {
    let visible = app.visible();
    let line = match state.selected().and_then(|i| visible.get(i)) {
        Some(r) => Line::from(vec![
            Span::styled(
                format!(" {} ", truncate(&r.event_title, 40)),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(format!("/{}", r.slug), Style::default().fg(Color::DarkGray)),
            Span::raw("  ends "),
            Span::raw(r.end_date.as_deref().unwrap_or("—").to_string()),
        ]),
        None => Line::from(Span::styled(" no selection", Style::default().fg(Color::DarkGray))),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let trigger = app
        .last_trigger
        .as_deref()
        .map_or(String::new(), |t| format!("last trigger: {t}  "));
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[w] ", Style::default().fg(Color::Yellow)),
        Span::raw(if app.rewards_only { "show all  " } else { "rewards only  " }),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll  "),
        Span::styled(trigger, Style::default().fg(Color::DarkGray)),
        Span::styled("poll: 5s", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
