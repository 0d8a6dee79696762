//! Pane layout: display (disassembly/dump/watch), registers, stack, and
//! the command window, with a one-line status bar underneath.

use tui::backend::Backend;
use tui::layout::{Constraint, Direction, Layout, Rect};
use tui::style::{Color, Style};
use tui::text::Spans;
use tui::widgets::{Block, Borders, Paragraph};
use tui::Frame;

use crate::app::{App, DisplayMode};

const REGISTER_WIDTH: u16 = 25;
const REGISTER_HEIGHT: u16 = 10;
const CMD_HEIGHT: u16 = 10;

pub fn draw<B: Backend>(frame: &mut Frame<B>, app: &mut App) {
    let size = frame.size();

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(4),
            Constraint::Length(CMD_HEIGHT),
            Constraint::Length(1),
        ])
        .split(size);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(REGISTER_WIDTH)])
        .split(vertical[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(REGISTER_HEIGHT), Constraint::Min(3)])
        .split(main[1]);

    draw_display(frame, app, main[0]);
    draw_registers(frame, app, right[0]);
    draw_stack(frame, app, right[1]);
    draw_command(frame, app, vertical[1]);
    draw_status(frame, app, vertical[2]);
}

fn draw_display<B: Backend>(frame: &mut Frame<B>, app: &mut App, area: Rect) {
    let title = match app.display_mode {
        DisplayMode::Dump => "Dump",
        DisplayMode::Disasm => "Disassembly",
        DisplayMode::Watch => "Watches",
    };
    let lines = app.display_lines(area.height);
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(title),
    );
    frame.render_widget(widget, area);
}

fn draw_registers<B: Backend>(frame: &mut Frame<B>, app: &mut App, area: Rect) {
    let widget = Paragraph::new(app.register_lines()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title("Registers"),
    );
    frame.render_widget(widget, area);
}

fn draw_stack<B: Backend>(frame: &mut Frame<B>, app: &mut App, area: Rect) {
    let lines = app.stack_lines(area.height);
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title("Stack"),
    );
    frame.render_widget(widget, area);
}

fn draw_command<B: Backend>(frame: &mut Frame<B>, app: &mut App, area: Rect) {
    let rows = area.height.saturating_sub(2) as usize;

    // The transcript tail, with the prompt as the last line.
    let mut lines: Vec<Spans> = app
        .log
        .iter()
        .rev()
        .take(rows.saturating_sub(1))
        .rev()
        .map(|entry| Spans::from(format!(" {}", entry)))
        .collect();
    lines.push(Spans::from(format!(" > {}", app.input)));

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Command"),
    );
    frame.render_widget(widget, area);
}

fn draw_status<B: Backend>(frame: &mut Frame<B>, app: &mut App, area: Rect) {
    let widget = Paragraph::new(app.status_line())
        .style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_widget(widget, area);
}
