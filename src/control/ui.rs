use std::error::Error;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use crossbeam_channel::unbounded;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};

use crate::backend::Backend;
use crate::control::api::{self, SharedSession};
use crate::control::feeder::ToneFeeder;
use crate::group::GroupStatus;
use crate::session::SessionStatus;

const TICK_RATE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct AppState {
    status: Option<SessionStatus>,
    selected: usize,
    message: Option<String>,
    last_update: Option<Instant>,
}

/// Run the ratatui-based developer console until `q` is pressed.
pub fn run<B>(session: &SharedSession<B>, feeder: Option<&ToneFeeder>) -> Result<(), Box<dyn Error>>
where
    B: Backend + Send + 'static,
{
    setup_terminal()?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (status_tx, status_rx) = unbounded();
    let weak = Arc::downgrade(session);
    std::thread::spawn(move || {
        while let Some(session) = weak.upgrade() {
            let status = api::get_status(&session);
            drop(session);
            if status_tx.send(status).is_err() {
                break;
            }
            std::thread::sleep(TICK_RATE);
        }
    });

    let mut app = AppState::default();

    loop {
        terminal.draw(|frame| draw(frame, &app, feeder))?;

        if let Some(status) = try_recv_latest(&status_rx) {
            let group_len = status.groups.len();
            app.status = Some(status);
            app.last_update = Some(Instant::now());
            app.selected = app.selected.min(group_len.saturating_sub(1));
        }

        if event::poll(Duration::from_millis(10))? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(&mut app, feeder, key) {
                    break;
                }
            }
        }
    }

    restore_terminal()?;
    Ok(())
}

fn setup_terminal() -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(())
}

fn restore_terminal() -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn try_recv_latest<T>(rx: &Receiver<T>) -> Option<T> {
    let mut last = None;
    while let Ok(value) = rx.try_recv() {
        last = Some(value);
    }
    last
}

fn handle_key(app: &mut AppState, feeder: Option<&ToneFeeder>, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Up => {
            app.selected = app.selected.saturating_sub(1);
        }
        KeyCode::Down => {
            if let Some(status) = &app.status {
                if app.selected + 1 < status.groups.len() {
                    app.selected += 1;
                }
            }
        }
        KeyCode::Char(' ') => {
            if let (Some(group), Some(feeder)) = (current_group(app), feeder) {
                app.message = match feeder.toggle(group.id) {
                    Some(true) => Some(format!("Tone on for {}", group.name)),
                    Some(false) => Some(format!("Tone off for {}", group.name)),
                    None => Some(format!("{} has no feeder", group.name)),
                };
            }
        }
        _ => {}
    }
    false
}

fn current_group(app: &AppState) -> Option<GroupStatus> {
    app.status.as_ref()?.groups.get(app.selected).cloned()
}

fn draw(frame: &mut ratatui::Frame<'_>, app: &AppState, feeder: Option<&ToneFeeder>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(4),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_groups(frame, chunks[1], app, feeder);
    draw_midi(frame, chunks[2], app);
    draw_footer(frame, chunks[3], app);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("jackmux").borders(Borders::ALL);

    let content = match &app.status {
        Some(status) if status.active => Paragraph::new(format!(
            "Sample Rate: {} Hz    Buffer: {} frames    Block: {:.2} ms    Groups: {}",
            status.sample_rate,
            status.buffer_size,
            status.latency_ms,
            status.groups.len(),
        )),
        Some(_) => Paragraph::new(Line::from(vec![Span::styled(
            "Client inactive",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )])),
        None => Paragraph::new(Line::from(vec![Span::styled(
            "No session",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )])),
    };

    frame.render_widget(content.block(block), area);
}

fn draw_groups(
    frame: &mut ratatui::Frame<'_>,
    area: ratatui::prelude::Rect,
    app: &AppState,
    feeder: Option<&ToneFeeder>,
) {
    let block = Block::default().title("Groups").borders(Borders::ALL);

    let Some(status) = &app.status else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let header = Row::new(vec![
        Cell::from(""),
        Cell::from("Id"),
        Cell::from("Name"),
        Cell::from("In/Out"),
        Cell::from("Tone"),
        Cell::from("Out fill %"),
        Cell::from("Blocks"),
        Cell::from("Signals"),
        Cell::from("Underruns"),
        Cell::from("Overruns"),
        Cell::from("Dropped"),
    ])
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let rows = status.groups.iter().enumerate().map(|(idx, group)| {
        let indicator = if idx == app.selected { ">" } else { "" };
        let tone = match feeder.and_then(|f| f.is_enabled(group.id)) {
            Some(true) => "On",
            Some(false) => "Off",
            None => "-",
        };
        let counters = &group.counters;
        let mut row = Row::new(vec![
            Cell::from(indicator.to_string()),
            Cell::from(group.id.to_string()),
            Cell::from(group.name.clone()),
            Cell::from(format!("{}/{}", group.inputs, group.outputs)),
            Cell::from(tone),
            Cell::from(format!("{:.1}", group.output_fill() * 100.0)),
            Cell::from(counters.blocks.to_string()),
            Cell::from(format!(
                "{} ({} coalesced)",
                counters.need_data_signals, counters.coalesced_signals
            )),
            Cell::from(counters.underruns.to_string()),
            Cell::from(counters.overruns.to_string()),
            Cell::from(counters.dropped_writes.to_string()),
        ]);
        if idx == app.selected {
            row = row.style(Style::default().fg(Color::Yellow));
        }
        row
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(4),
            Constraint::Length(16),
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(block)
    .column_spacing(1);

    frame.render_widget(table, area);
}

fn draw_midi(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("MIDI").borders(Borders::ALL);
    let lines: Vec<Line> = app
        .status
        .iter()
        .flat_map(|status| status.midi.iter())
        .map(|channel| {
            Line::from(format!(
                "{}  events={}  bytes={}  dropped={}",
                channel.port_name,
                channel.counters.events,
                channel.counters.bytes,
                channel.counters.dropped,
            ))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let info = "Up/Down: Select  •  Space: Toggle tone  •  q: Quit";
    let mut lines = vec![Line::from(info)];
    if let Some(message) = &app.message {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(updated) = app.last_update {
        let ago = updated.elapsed().as_secs_f32();
        lines.push(Line::from(Span::styled(
            format!("Last update {:.1}s ago", ago),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
