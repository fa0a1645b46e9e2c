//! merki-telemetry — TUI diagnostics tool for the merki decal engine.
//!
//! Connects to a running merki host via UDP and displays live decal pool
//! metrics in a btop-style terminal dashboard using ratatui.
//!
//! Run a merki host with the `diagnostics` feature (on by default), then
//! `cargo run -p merki-telemetry`. The `stress` example is a ready-made
//! sender.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use ratatui::Terminal;
use serde::Deserialize;

// ── Wire types (must match merki's JSON format) ──────────────────────────

#[derive(Deserialize, Clone, Default)]
struct DecalSnapshot {
    frame: u64,
    list_count: usize,
    decal_count: usize,
    pooled_vertex_bytes: usize,
    vertex_budget_bytes: usize,
    max_decals_per_model: usize,
    stats: DecalStats,
}

#[derive(Deserialize, Clone, Default)]
struct DecalStats {
    decals_added: u64,
    retired_vertex_budget: u64,
    retired_global_count: u64,
    retired_model_count: u64,
    retired_index_ceiling: u64,
    triangles_tested: u64,
    triangles_clipped: u64,
    triangles_emitted: u64,
    draw_calls: u64,
    draw_vertices: u64,
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;

struct App {
    latest: DecalSnapshot,
    count_history: VecDeque<u64>,
    add_history: VecDeque<u64>,
    /// Running total from the previous snapshot, for the per-snapshot delta.
    prev_added: u64,
    paused: bool,
    connected: bool,
}

impl App {
    fn new() -> Self {
        Self {
            latest: DecalSnapshot::default(),
            count_history: VecDeque::with_capacity(HISTORY_CAP),
            add_history: VecDeque::with_capacity(HISTORY_CAP),
            prev_added: 0,
            paused: false,
            connected: false,
        }
    }

    fn push_snapshot(&mut self, snap: DecalSnapshot) {
        if self.paused {
            return;
        }

        if self.count_history.len() >= HISTORY_CAP {
            self.count_history.pop_front();
        }
        self.count_history.push_back(snap.decal_count as u64);

        let added = snap.stats.decals_added.saturating_sub(self.prev_added);
        self.prev_added = snap.stats.decals_added;
        if self.add_history.len() >= HISTORY_CAP {
            self.add_history.pop_front();
        }
        self.add_history.push_back(added);

        self.latest = snap;
        self.connected = true;
    }
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:9870")
        .expect("Failed to bind UDP port 9870 — is another merki-telemetry running?");
    socket
        .set_nonblocking(true)
        .expect("Failed to set non-blocking");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let mut buf = [0u8; 65536];

    loop {
        // Drain all pending datagrams.
        loop {
            match socket.recv(&mut buf) {
                Ok(n) => {
                    if let Ok(snap) = serde_json::from_slice::<DecalSnapshot>(&buf[..n]) {
                        app.push_snapshot(snap);
                    }
                }
                Err(_) => break,
            }
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,
        _ => {}
    }
    false
}

// ── UI rendering ─────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(8), // sparklines
            Constraint::Length(3), // pool gauge
            Constraint::Min(6),    // retirements
            Constraint::Length(3), // pipeline
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_sparklines(f, app, chunks[1]);
    draw_pool_gauge(f, app, chunks[2]);
    draw_retirements(f, app, chunks[3]);
    draw_pipeline(f, app, chunks[4]);
    draw_help_bar(f, chunks[5]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let status = if app.paused {
        " PAUSED "
    } else if app.connected {
        " LIVE "
    } else {
        " WAITING "
    };
    let status_color = if app.paused {
        Color::Yellow
    } else if app.connected {
        Color::Green
    } else {
        Color::DarkGray
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {} ", status),
            Style::default().bg(status_color).fg(Color::Black),
        ),
        Span::raw("  "),
        Span::styled("Frame: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", s.frame), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Lists: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.list_count),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Decals: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.decal_count),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  (cap {}/model)", s.max_decals_per_model),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let block = Block::default()
        .title(" merki-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_sparklines(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let count_data: Vec<u64> = app.count_history.iter().copied().collect();
    let (c_min, c_avg, c_max) = stats(&count_data);
    let count_block = Block::default()
        .title(" Live Decals ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = count_block.inner(chunks[0]);
    f.render_widget(count_block, chunks[0]);
    if inner.height >= 2 {
        let spark_area = Rect {
            height: inner.height - 1,
            ..inner
        };
        let stats_area = Rect {
            y: inner.y + inner.height - 1,
            height: 1,
            ..inner
        };
        let sparkline = Sparkline::default()
            .data(&count_data)
            .style(Style::default().fg(Color::Green));
        f.render_widget(sparkline, spark_area);
        let stats_text = Line::from(vec![Span::styled(
            format!("min: {:.0}  avg: {:.0}  max: {:.0}", c_min, c_avg, c_max),
            Style::default().fg(Color::DarkGray),
        )]);
        f.render_widget(Paragraph::new(stats_text), stats_area);
    }

    let add_data: Vec<u64> = app.add_history.iter().copied().collect();
    let (a_min, a_avg, a_max) = stats(&add_data);
    let add_block = Block::default()
        .title(" Adds / Snapshot ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = add_block.inner(chunks[1]);
    f.render_widget(add_block, chunks[1]);
    if inner.height >= 2 {
        let spark_area = Rect {
            height: inner.height - 1,
            ..inner
        };
        let stats_area = Rect {
            y: inner.y + inner.height - 1,
            height: 1,
            ..inner
        };
        let sparkline = Sparkline::default()
            .data(&add_data)
            .style(Style::default().fg(Color::Yellow));
        f.render_widget(sparkline, spark_area);
        let stats_text = Line::from(vec![Span::styled(
            format!("min: {:.0}  avg: {:.1}  max: {:.0}", a_min, a_avg, a_max),
            Style::default().fg(Color::DarkGray),
        )]);
        f.render_widget(Paragraph::new(stats_text), stats_area);
    }
}

fn draw_pool_gauge(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let block = Block::default()
        .title(format!(
            " Vertex Pool ({} budget) ",
            format_bytes(s.vertex_budget_bytes)
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let pct = if s.vertex_budget_bytes > 0 {
        s.pooled_vertex_bytes as f64 / s.vertex_budget_bytes as f64
    } else {
        0.0
    };
    let bar_color = if pct < 0.5 {
        Color::Green
    } else if pct < 0.85 {
        Color::Yellow
    } else {
        Color::Red
    };

    let label = format!(
        " {} ({:.0}%) ",
        format_bytes(s.pooled_vertex_bytes),
        pct * 100.0
    );
    let bar_width = (inner.width as usize).saturating_sub(label.len() + 1);
    let filled = (pct.min(1.0) * bar_width as f64).round() as usize;
    let empty = bar_width.saturating_sub(filled);
    let bar: String = format!("{}{}", "\u{2588}".repeat(filled), "\u{2591}".repeat(empty));

    let text = Line::from(vec![
        Span::styled(
            label,
            Style::default().fg(bar_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(bar, Style::default().fg(bar_color)),
    ]);
    f.render_widget(Paragraph::new(text), inner);
}

fn draw_retirements(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest.stats;
    let rows = [
        ("model cap", s.retired_model_count),
        ("vertex budget", s.retired_vertex_budget),
        ("global count", s.retired_global_count),
        ("index ceiling", s.retired_index_ceiling),
    ];
    let total: u64 = rows.iter().map(|(_, n)| n).sum();

    let block = Block::default()
        .title(format!(" Retirements ({}) ", total))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let max = rows.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1);
    let bar_max_width = inner.width.saturating_sub(26) as usize;

    let mut lines: Vec<Line> = Vec::with_capacity(rows.len());
    for (label, count) in rows {
        let bar_len = if count > 0 {
            (((count as f64 / max as f64) * bar_max_width as f64).round() as usize).max(1)
        } else {
            0
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:14}", label), Style::default().fg(Color::White)),
            Span::styled(format!("{:>8} ", count), Style::default().fg(Color::DarkGray)),
            Span::styled(
                "\u{2588}".repeat(bar_len),
                Style::default().fg(Color::Yellow),
            ),
        ]));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_pipeline(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest.stats;
    let block = Block::default()
        .title(" Pipeline ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Line::from(vec![
        Span::styled("  Added: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", s.decals_added), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Tris tested: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.triangles_tested),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Clipped: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.triangles_clipped),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Emitted: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.triangles_emitted),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Draw calls: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", s.draw_calls), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Draw verts: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.draw_vertices),
            Style::default().fg(Color::White),
        ),
    ]);

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_help_bar(f: &mut ratatui::Frame, area: Rect) {
    let help = Line::from(vec![
        Span::styled(" [p]", Style::default().fg(Color::Cyan)),
        Span::raw(" pause  "),
        Span::styled("[q]", Style::default().fg(Color::Cyan)),
        Span::raw(" quit"),
    ]);
    f.render_widget(Paragraph::new(help), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn stats(data: &[u64]) -> (f64, f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let min = *data.iter().min().unwrap() as f64;
    let max = *data.iter().max().unwrap() as f64;
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (min, avg, max)
}

fn format_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
