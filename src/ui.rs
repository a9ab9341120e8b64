use std::cell::Cell;
use std::io::{self, Stdout};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use tracing::{debug, info};
use unicode_width::UnicodeWidthStr;

use crate::cellart::CellArt;
use crate::engine::{self, Modal, Model, Pane, ProfileField, ITEM_LINES};
use crate::feed::{FeedItem, ItemStatus, FEED_VIEWS};
use crate::media::Resolution;
use crate::message::{Command, ComposeKind, Message};
use crate::post::Post;
use crate::thread::depth_of;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const REPLY_DEPTH_COLORS: [Color; 3] = [
    Color::Rgb(250, 179, 135),
    Color::Rgb(166, 227, 161),
    Color::Rgb(203, 166, 247),
];
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn reply_depth_color(depth: usize) -> Color {
    REPLY_DEPTH_COLORS[depth % REPLY_DEPTH_COLORS.len()]
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

struct Spinner {
    index: usize,
}

impl Spinner {
    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % SPINNER_FRAMES.len();
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

fn wrap_with_prefix(text: &str, width: usize, prefix: &str, style: Style) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(prefix.to_string(), style))];
    }
    let wrap_width = width.max(prefix.chars().count() + 1);
    let options = WrapOptions::new(wrap_width)
        .break_words(true)
        .initial_indent(prefix)
        .subsequent_indent(prefix);
    text.lines()
        .flat_map(|paragraph| wrap(paragraph, options.clone()))
        .map(|cow| Line::from(Span::styled(cow.into_owned(), style)))
        .collect()
}

fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_with_prefix(text, width, "", style)
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }
    for line in lines {
        let current: usize = line
            .spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum();
        if current >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        line.spans.push(Span::styled(" ".repeat(width - current), pad_style));
    }
}

/// Draws cell art as background-colored blanks, one line per grid row.
fn art_lines(art: &CellArt, indent: usize, base: Style) -> Vec<Line<'static>> {
    art.cells
        .iter()
        .map(|row| {
            let mut spans = vec![Span::styled(" ".repeat(indent), base)];
            spans.extend(row.iter().map(|cell| match cell {
                Some([r, g, b]) => Span::styled(" ", Style::default().bg(Color::Rgb(*r, *g, *b))),
                None => Span::styled(" ", base),
            }));
            Line::from(spans)
        })
        .collect()
}

fn age_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds().max(0);
    match seconds {
        0..=59 => format!("{seconds}s"),
        60..=3_599 => format!("{}m", seconds / 60),
        3_600..=86_399 => format!("{}h", seconds / 3_600),
        _ => created_at.format("%Y-%m-%d").to_string(),
    }
}

fn post_header(post: &Post, status: Option<ItemStatus>, now: DateTime<Utc>) -> String {
    let like = if post.liked { "♥" } else { "♡" };
    let mut header = format!(
        "{} · {} · {like} {} · ↩ {}",
        post.author_label(),
        age_label(post.created_at, now),
        post.likes_count,
        post.replies_count,
    );
    if !post.media.is_empty() {
        let kinds: Vec<&str> = post.media.iter().map(|media| media.kind.label()).collect();
        header.push_str(&format!(" · [{}]", kinds.join(", ")));
    }
    if let Some(marker) = status.map(|status| status.marker()).filter(|m| !m.is_empty()) {
        header.push_str(&format!(" · {marker}"));
    }
    header
}

/// Renders one list entry into exactly `ITEM_LINES` lines.
fn item_lines(item: &FeedItem, width: usize, selected: bool, now: DateTime<Utc>) -> Vec<Line<'static>> {
    let background = if selected {
        COLOR_PANEL_SELECTED_BG
    } else {
        COLOR_PANEL_BG
    };
    let meta_color = match item.status {
        ItemStatus::Failed => COLOR_ERROR,
        status if status.is_pending() => COLOR_TEXT_SECONDARY,
        _ => COLOR_ACCENT,
    };
    let mut meta_style = Style::default().fg(meta_color).bg(background);
    if selected {
        meta_style = meta_style.add_modifier(Modifier::BOLD);
    }
    let body_style = Style::default().fg(COLOR_TEXT_PRIMARY).bg(background);

    let header = post_header(&item.post, Some(item.status), now);
    let mut lines = vec![Line::from(Span::styled(header, meta_style))];
    let body = item.post.content.replace('\n', " ");
    lines.extend(wrap_plain(&body, width, body_style).into_iter().take(ITEM_LINES - 2));
    if let Some(error) = &item.error {
        lines.truncate(ITEM_LINES - 1);
        lines.push(Line::from(Span::styled(
            format!("! {error} (x retry, z dismiss)"),
            Style::default().fg(COLOR_ERROR).bg(background),
        )));
    }
    while lines.len() < ITEM_LINES {
        lines.push(Line::from(Span::styled(String::new(), body_style)));
    }
    lines.truncate(ITEM_LINES);
    pad_lines_to_width(&mut lines, width as u16);
    lines
}

#[derive(Debug, Clone)]
pub struct Options {
    pub tick: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(120),
        }
    }
}

/// Terminal host: draws engine state, turns input into messages and runs
/// commands on worker threads.
pub struct App {
    model: Model,
    options: Options,
    response_tx: Sender<Message>,
    response_rx: Receiver<Message>,
    in_flight: usize,
    spinner: Spinner,
    needs_redraw: bool,
    feed_rows: Cell<u16>,
    notice: Option<String>,
}

impl App {
    pub fn new(model: Model, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            model,
            options,
            response_tx,
            response_rx,
            in_flight: 0,
            spinner: Spinner { index: 0 },
            needs_redraw: true,
            feed_rows: Cell::new(0),
            notice: None,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let commands = self.model.init();
        self.spawn(commands);

        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = self.options.tick;
        let mut rows_sent = 0u16;

        loop {
            if self.poll_async() {
                self.needs_redraw = true;
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
                let rows = self.feed_rows.get();
                if rows != rows_sent {
                    rows_sent = rows;
                    self.dispatch(Message::Resize { rows });
                }
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                        self.needs_redraw = true;
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => self.needs_redraw = true,
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.dispatch(Message::Tick);
                if self.in_flight > 0 {
                    self.spinner.advance();
                } else {
                    self.spinner.reset();
                }
                self.needs_redraw = true;
            }
        }

        info!("exiting");
        Ok(())
    }

    fn dispatch(&mut self, message: Message) {
        let commands = self.model.update(message);
        self.spawn(commands);
    }

    fn spawn(&mut self, commands: Vec<Command>) {
        for command in commands {
            debug!(label = command.label(), "running command");
            self.in_flight += 1;
            let tx = self.response_tx.clone();
            thread::spawn(move || {
                let _ = tx.send(command.run());
            });
        }
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.dispatch(message);
            changed = true;
        }
        changed
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        self.notice = None;
        if self.model.has_modal_open() {
            self.handle_modal_key(key);
            return false;
        }

        let selected = self.model.selected_post().cloned();
        let selected_id = selected.as_ref().map(|post| post.id.clone());
        let author = selected.as_ref().map(|post| post.account_id.clone());
        let page = (self.feed_rows.get() as usize / ITEM_LINES).max(1) as isize;

        let message = match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => Some(Message::MoveCursor(1)),
            KeyCode::Char('k') | KeyCode::Up => Some(Message::MoveCursor(-1)),
            KeyCode::PageDown | KeyCode::Char(' ') => Some(Message::MoveCursor(page)),
            KeyCode::PageUp => Some(Message::MoveCursor(-page)),
            KeyCode::Char('J') => Some(Message::Scroll(1)),
            KeyCode::Char('K') => Some(Message::Scroll(-1)),
            KeyCode::Tab => Some(Message::NextView),
            KeyCode::Char(ch @ '1'..='4') => {
                let index = ch as usize - '1' as usize;
                FEED_VIEWS.get(index).copied().map(Message::SwitchView)
            }
            KeyCode::Char('t') => Some(Message::OpenTagPrompt),
            KeyCode::Char('r') => Some(Message::Refresh),
            KeyCode::Char('n') => Some(Message::LoadMore),
            KeyCode::Enter | KeyCode::Char('l') => Some(Message::OpenSelected),
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Backspace => match self.model.active_pane() {
                Pane::Detail => Some(Message::CloseDetail),
                Pane::Profile => Some(Message::CloseProfile),
                Pane::Feed => None,
            },
            KeyCode::Char('c') => Some(Message::OpenCompose(ComposeKind::New)),
            KeyCode::Char('e') => selected_id
                .clone()
                .map(|id| Message::OpenCompose(ComposeKind::Edit { id })),
            KeyCode::Char('R') => selected_id
                .clone()
                .map(|parent_id| Message::OpenCompose(ComposeKind::Reply { parent_id })),
            KeyCode::Char('f') => selected_id.clone().map(Message::ToggleLike),
            KeyCode::Char('D') => selected_id.clone().map(Message::DeletePost),
            KeyCode::Char('x') => selected_id.clone().map(Message::RetryItem),
            KeyCode::Char('z') => selected_id.clone().map(Message::DismissItem),
            KeyCode::Char('H') => selected_id.clone().map(Message::HidePost),
            KeyCode::Char('A') => author.clone().map(Message::HideAuthor),
            KeyCode::Char('.') => Some(Message::ToggleShowHidden),
            KeyCode::Char('F') => author.clone().map(|account| {
                if self.model.is_following(&account) == Some(true) {
                    Message::Unfollow(account)
                } else {
                    Message::Follow(account)
                }
            }),
            KeyCode::Char('B') => author.clone().map(Message::Block),
            KeyCode::Char('b') => Some(Message::OpenBlockedList),
            KeyCode::Char('p') => author.map(|account| Message::OpenProfile(Some(account))),
            KeyCode::Char('P') => Some(Message::OpenProfile(None)),
            KeyCode::Char('E') => Some(Message::EditProfile),
            KeyCode::Char('o') => {
                if let Some(post) = selected {
                    self.open_in_browser(&post);
                }
                None
            }
            _ => None,
        };
        if let Some(message) = message {
            self.dispatch(message);
        }
        false
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        let blocked = matches!(self.model.state().modal, Some(Modal::Blocked));
        let message = if blocked {
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Some(Message::CloseModal),
                KeyCode::Char('j') | KeyCode::Down => Some(Message::MoveCursor(1)),
                KeyCode::Char('k') | KeyCode::Up => Some(Message::MoveCursor(-1)),
                KeyCode::Char('u') | KeyCode::Enter => self
                    .model
                    .selected_blocked()
                    .map(|account| Message::Unblock(account.id.clone())),
                _ => None,
            }
        } else {
            let newline = key
                .modifiers
                .intersects(KeyModifiers::ALT | KeyModifiers::SHIFT);
            match key.code {
                KeyCode::Esc => Some(Message::CloseModal),
                KeyCode::Enter if newline => Some(Message::ModalNewline),
                KeyCode::Enter => Some(Message::ModalSubmit),
                KeyCode::Tab => Some(Message::ModalNextField),
                KeyCode::Backspace => Some(Message::ModalBackspace),
                KeyCode::Char(ch) => Some(Message::ModalInput(ch)),
                _ => None,
            }
        };
        if let Some(message) = message {
            self.dispatch(message);
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        if self.model.has_modal_open() {
            return;
        }
        let Some(message) = wheel_message(event.kind, self.model.active_pane()) else {
            return;
        };
        self.dispatch(message);
        self.needs_redraw = true;
    }

    fn open_in_browser(&mut self, post: &Post) {
        if post.url.trim().is_empty() {
            self.notice = Some("This post has no link.".into());
            return;
        }
        match webbrowser::open(&post.url) {
            Ok(_) => self.notice = Some("Opened post in your browser.".into()),
            Err(err) => {
                self.notice = Some(format!("Failed to open link: {err} (URL: {})", post.url));
            }
        }
    }
}

/// Lines plus the range the selected entry occupies, for scrolling.
struct Rendered {
    lines: Vec<Line<'static>>,
    selected: Option<(usize, usize)>,
}

impl Rendered {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            selected: None,
        }
    }

    fn push_entry(&mut self, lines: Vec<Line<'static>>, selected: bool) {
        let start = self.lines.len();
        self.lines.extend(lines);
        if selected {
            self.selected = Some((start, self.lines.len()));
        }
    }

    /// Drops leading lines so the selected entry is on screen.
    fn scrolled(mut self, height: usize) -> Vec<Line<'static>> {
        if let Some((start, end)) = self.selected {
            if end > height {
                let skip = start.saturating_sub(height / 3);
                self.lines.drain(..skip.min(self.lines.len()));
            }
        }
        self.lines
    }
}

impl App {
    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let state = self.model.state();
        let status = self.notice.as_deref().unwrap_or(state.status.as_str());
        let status_text = if self.in_flight > 0 {
            format!("{} {}", self.spinner.frame(), status).trim().to_string()
        } else {
            status.to_string()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(layout[1]);
        self.draw_feed(frame, main[0]);
        match self.model.active_pane() {
            Pane::Detail => self.draw_detail(frame, main[1]),
            Pane::Profile => self.draw_profile(frame, main[1]),
            Pane::Feed => self.draw_preview(frame, main[1]),
        }

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[2]);

        if let Some(modal) = &state.modal {
            self.draw_modal(frame, layout[1], modal);
        }
    }

    fn pane_block(&self, title: String, focused: bool) -> Block<'static> {
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_feed(&self, frame: &mut Frame<'_>, area: Rect) {
        let state = self.model.state();
        let feed = &state.feed;
        let mut title = feed.view.title().to_string();
        match feed.view {
            crate::feed::FeedView::PrimaryTag => title.push_str(&format!(" #{}", feed.primary_tag)),
            crate::feed::FeedView::CustomTag => title.push_str(&format!(" #{}", feed.custom_tag)),
            _ => {}
        }
        if state.moderation.show_hidden {
            title.push_str(" (showing hidden)");
        }
        let block = self.pane_block(title, self.model.active_pane() == Pane::Feed);
        let inner = block.inner(area);
        self.feed_rows.set(inner.height);
        let width = inner.width.max(1) as usize;
        let height = inner.height as usize;
        let secondary = Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG);

        let visible = self.model.visible_indices();
        let mut lines: Vec<Line<'static>> = Vec::new();
        if visible.is_empty() {
            let placeholder = if feed.is_loading() {
                "Loading posts…".to_string()
            } else if let Some(err) = &feed.error {
                format!("Could not load posts: {err}\nPress r to retry.")
            } else {
                "No posts yet.".to_string()
            };
            lines.extend(wrap_plain(&placeholder, width, secondary));
        }

        let now = Utc::now();
        for (position, &index) in visible.iter().enumerate().skip(feed.offset) {
            let Some(item) = feed.items.get(index) else {
                continue;
            };
            let mut entry = item_lines(item, width, index == feed.cursor, now);
            if position == feed.offset {
                entry.drain(..feed.top_line.min(entry.len()));
            }
            lines.extend(entry);
            if lines.len() >= height {
                break;
            }
        }
        if lines.len() < height && !visible.is_empty() {
            let tail = match feed.paging() {
                Some(paging) if paging.loading_more => "Loading older posts…",
                Some(paging) if paging.has_more => "n loads more",
                _ => "End of timeline",
            };
            lines.push(Line::from(Span::styled(tail.to_string(), secondary)));
        }

        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn media_lines(&self, post: &Post, resolution: Resolution) -> Vec<Line<'static>> {
        let base = Style::default().bg(COLOR_PANEL_BG);
        let Some(key) = engine::preview_key(post, resolution) else {
            return Vec::new();
        };
        let media = &self.model.state().media;
        match media.get(&key).and_then(|preview| preview.current()) {
            Some(art) => art_lines(art, 0, base),
            None if media.is_in_flight(&key) => vec![Line::from(Span::styled(
                "[loading preview…]".to_string(),
                base.fg(COLOR_TEXT_SECONDARY),
            ))],
            None if media.get(&key).is_some() => vec![Line::from(Span::styled(
                "[preview unavailable]".to_string(),
                base.fg(COLOR_TEXT_SECONDARY),
            ))],
            None => Vec::new(),
        }
    }

    fn post_lines(&self, post: &Post, width: usize, style: Style, resolution: Resolution) -> Vec<Line<'static>> {
        let header_style = style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
        let mut lines = wrap_plain(&post_header(post, None, Utc::now()), width, header_style);
        lines.extend(wrap_plain(&post.content, width, style));
        lines.extend(self.media_lines(post, resolution));
        lines
    }

    fn draw_preview(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block("Post".into(), false);
        let inner = block.inner(area);
        let width = inner.width.max(1) as usize;
        let style = Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG);
        let lines = match self.model.selected_post() {
            Some(post) => {
                let mut lines = self.post_lines(post, width, style, Resolution::Base);
                lines.push(Line::from(Span::styled(String::new(), style)));
                lines.extend(wrap_plain(
                    "Enter opens the thread · o opens in browser",
                    width,
                    style.fg(COLOR_TEXT_SECONDARY),
                ));
                lines
            }
            None => wrap_plain("Nothing selected.", width, style.fg(COLOR_TEXT_SECONDARY)),
        };
        frame.render_widget(
            Paragraph::new(Text::from(lines)).block(block).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn draw_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let detail = &self.model.state().detail;
        let mut title = "Thread".to_string();
        if !detail.back.is_empty() {
            title.push_str(&format!(" (depth {})", detail.back.len() + 1));
        }
        let block = self.pane_block(title, true);
        let inner = block.inner(area);
        let width = inner.width.max(1) as usize;
        let base = Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG);
        let secondary = base.fg(COLOR_TEXT_SECONDARY);

        let mut rendered = Rendered::new();
        for ancestor in &detail.ancestors {
            let text = format!("{}: {}", ancestor.author_label(), ancestor.content.replace('\n', " "));
            rendered.push_entry(wrap_with_prefix(&text, width, "↑ ", secondary), false);
        }
        let Some(focus) = detail.focus.as_ref() else {
            return;
        };
        let focus_style = if detail.cursor == 0 {
            base.bg(COLOR_PANEL_SELECTED_BG)
        } else {
            base
        };
        let resolution = if focus.media.len() == 1 {
            Resolution::Single
        } else {
            Resolution::Base
        };
        let mut focus_lines = self.post_lines(focus, width, focus_style, resolution);
        pad_lines_to_width(&mut focus_lines, inner.width);
        rendered.push_entry(focus_lines, detail.cursor == 0);

        let heading = if detail.loading && detail.replies.is_empty() {
            "Loading replies…".to_string()
        } else if let Some(err) = &detail.error {
            format!("Replies failed to load: {err}")
        } else if detail.replies.is_empty() {
            "No replies yet.".to_string()
        } else {
            format!("Replies ({}/{})", detail.visible_replies().len(), detail.replies.len())
        };
        rendered.push_entry(vec![Line::default(), Line::from(Span::styled(heading, secondary))], false);

        let posts: Vec<Post> = detail.replies.iter().map(|item| item.post.clone()).collect();
        let now = Utc::now();
        for (index, item) in detail.visible_replies().iter().enumerate() {
            let selected = detail.cursor == index + 1;
            let depth = depth_of(&focus.id, &item.post, &posts);
            let prefix = format!("{}│ ", "  ".repeat(depth.saturating_sub(1)));
            let background = if selected {
                COLOR_PANEL_SELECTED_BG
            } else {
                COLOR_PANEL_BG
            };
            let meta = Style::default().fg(reply_depth_color(depth)).bg(background);
            let body = Style::default().fg(COLOR_TEXT_PRIMARY).bg(background);
            let mut lines =
                wrap_with_prefix(&post_header(&item.post, Some(item.status), now), width, &prefix, meta);
            lines.extend(wrap_with_prefix(&item.post.content, width, &prefix, body));
            if let Some(err) = &item.error {
                lines.extend(wrap_with_prefix(
                    &format!("! {err} (x retry, z dismiss)"),
                    width,
                    &prefix,
                    body.fg(COLOR_ERROR),
                ));
            }
            pad_lines_to_width(&mut lines, inner.width);
            rendered.push_entry(lines, selected);
        }
        if detail.has_more_replies() {
            rendered.push_entry(
                vec![Line::from(Span::styled(
                    format!("{} more replies · n shows more", detail.replies.len() - detail.shown),
                    secondary,
                ))],
                false,
            );
        }

        let lines = rendered.scrolled(inner.height as usize);
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_profile(&self, frame: &mut Frame<'_>, area: Rect) {
        let state = self.model.state();
        let profile_state = &state.profile;
        let block = self.pane_block("Profile".into(), true);
        let inner = block.inner(area);
        let width = inner.width.max(1) as usize;
        let base = Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG);
        let secondary = base.fg(COLOR_TEXT_SECONDARY);

        let mut rendered = Rendered::new();
        match &profile_state.profile {
            Some(profile) => {
                if let Some(art) = state
                    .media
                    .get(&engine::avatar_key(&profile.avatar_url))
                    .and_then(|preview| preview.current())
                {
                    rendered.push_entry(art_lines(art, 0, base), false);
                }
                let mut header = vec![
                    Line::from(Span::styled(
                        profile.display_name.clone(),
                        base.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(Span::styled(format!("@{}", profile.handle), secondary)),
                    Line::from(Span::styled(
                        format!(
                            "{} posts · {} following · {} followers",
                            profile.posts_count, profile.following_count, profile.followers_count
                        ),
                        secondary,
                    )),
                ];
                let relationship = if state.session.account_id.as_deref() == Some(profile.id.as_str()) {
                    Some(("This is you · E edits your profile", COLOR_SUCCESS))
                } else {
                    match self.model.is_following(&profile.id) {
                        Some(true) => Some(("Following · F unfollows", COLOR_SUCCESS)),
                        Some(false) => Some(("Not following · F follows", COLOR_TEXT_SECONDARY)),
                        None => None,
                    }
                };
                if let Some((label, color)) = relationship {
                    header.push(Line::from(Span::styled(label.to_string(), base.fg(color))));
                }
                header.extend(wrap_plain(&profile.bio, width, base));
                header.push(Line::default());
                rendered.push_entry(header, false);
            }
            None => {
                let text = match &profile_state.error {
                    Some(err) => format!("Profile failed to load: {err}"),
                    None => "Loading profile…".to_string(),
                };
                rendered.push_entry(wrap_plain(&text, width, secondary), false);
            }
        }

        let now = Utc::now();
        for (index, item) in profile_state.posts.iter().enumerate() {
            let selected = index == profile_state.cursor;
            rendered.push_entry(item_lines(item, width, selected, now), selected);
        }
        if profile_state.paging.loading_more {
            rendered.push_entry(
                vec![Line::from(Span::styled("Loading older posts…".to_string(), secondary))],
                false,
            );
        }

        let lines = rendered.scrolled(inner.height as usize);
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_modal(&self, frame: &mut Frame<'_>, area: Rect, modal: &Modal) {
        let popup_area = centered_rect(70, 60, area);
        frame.render_widget(Clear, popup_area);
        let base = Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG);
        let secondary = base.fg(COLOR_TEXT_SECONDARY);
        let focused = base.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);

        let (title, mut lines) = match modal {
            Modal::Compose { kind, text } => {
                let title = match kind {
                    ComposeKind::New => "New post",
                    ComposeKind::Edit { .. } => "Edit post",
                    ComposeKind::Reply { .. } => "Reply",
                };
                let mut lines: Vec<Line<'static>> = text
                    .split('\n')
                    .map(|line| Line::from(Span::styled(line.to_string(), base)))
                    .collect();
                if let Some(last) = lines.last_mut() {
                    last.spans.push(Span::styled("▏", focused));
                }
                (title, lines)
            }
            Modal::ProfileEdit {
                display_name,
                bio,
                field,
            } => {
                let field_line = |label: &str, value: &str, active: bool| {
                    let marker = if active { "▸ " } else { "  " };
                    let cursor = if active { "▏" } else { "" };
                    Line::from(vec![
                        Span::styled(format!("{marker}{label}: "), if active { focused } else { secondary }),
                        Span::styled(format!("{value}{cursor}"), base),
                    ])
                };
                (
                    "Edit profile",
                    vec![
                        field_line("Display name", display_name, *field == ProfileField::DisplayName),
                        field_line("Bio", bio, *field == ProfileField::Bio),
                    ],
                )
            }
            Modal::TagPrompt(text) => (
                "Browse hashtag",
                vec![Line::from(vec![
                    Span::styled("#", focused),
                    Span::styled(format!("{}▏", text.trim_start_matches('#')), base),
                ])],
            ),
            Modal::Blocked => {
                let moderation = &self.model.state().moderation;
                let mut lines = Vec::new();
                if moderation.blocked_loading {
                    lines.push(Line::from(Span::styled("Loading…".to_string(), secondary)));
                } else if let Some(err) = &moderation.blocked_error {
                    lines.push(Line::from(Span::styled(format!("Failed: {err}"), base.fg(COLOR_ERROR))));
                } else if moderation.blocked.is_empty() {
                    lines.push(Line::from(Span::styled("You have not blocked anyone.".to_string(), secondary)));
                }
                for (index, account) in moderation.blocked.iter().enumerate() {
                    let style = if index == moderation.blocked_cursor {
                        focused.bg(COLOR_PANEL_SELECTED_BG)
                    } else {
                        base
                    };
                    let name = if account.display_name.is_empty() {
                        account.id.clone()
                    } else {
                        account.display_name.clone()
                    };
                    lines.push(Line::from(Span::styled(format!("{name} @{}", account.handle), style)));
                }
                ("Blocked accounts", lines)
            }
        };
        let hint = match modal {
            Modal::Compose { .. } => "Enter send · Alt+Enter newline · Esc cancel",
            Modal::ProfileEdit { .. } => "Tab switch field · Enter save · Esc cancel",
            Modal::TagPrompt(_) => "Enter browse · Esc cancel",
            Modal::Blocked => "j/k move · u unblock · Esc close",
        };
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(hint.to_string(), secondary)));

        let popup = Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .title(Span::styled(title, focused))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(COLOR_ACCENT))
                    .style(Style::default().bg(COLOR_PANEL_BG))
                    .padding(Padding::uniform(1)),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(popup, popup_area);
    }

    fn footer_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        match self.model.active_pane() {
            Pane::Feed => {
                parts.push("j/k move");
                parts.push("Tab/1-4 views");
                parts.push("t hashtag");
                parts.push("Enter thread");
                parts.push("n more");
            }
            Pane::Detail => {
                parts.push("j/k move");
                parts.push("Enter drill in");
                parts.push("R reply");
                parts.push("Esc back");
            }
            Pane::Profile => {
                parts.push("j/k move");
                parts.push("F follow");
                parts.push("Esc back");
            }
        }
        parts.extend([
            "c post",
            "e edit",
            "f like",
            "D delete",
            "H/A hide",
            "B block",
            "p profile",
            "r refresh",
            "q quit",
        ]);
        parts.join(" · ")
    }
}

/// The feed scrolls under the wheel; other panes move their cursor.
fn wheel_message(kind: MouseEventKind, pane: Pane) -> Option<Message> {
    let step = match kind {
        MouseEventKind::ScrollDown => 1,
        MouseEventKind::ScrollUp => -1,
        _ => return None,
    };
    Some(match pane {
        Pane::Feed => Message::Scroll(step),
        Pane::Profile | Pane::Detail => Message::MoveCursor(step),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn total_width(line: &Line<'_>) -> usize {
        line.spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum()
    }

    #[test]
    fn pad_lines_extends_to_width() {
        let mut lines = vec![Line::from(vec![Span::raw("abc")])];
        pad_lines_to_width(&mut lines, 6);
        assert_eq!(lines[0].spans.len(), 2);
        assert_eq!(total_width(&lines[0]), 6);
    }

    #[test]
    fn pad_lines_supports_wide_glyphs() {
        let mut lines = vec![Line::from(vec![Span::raw("🦀")])];
        pad_lines_to_width(&mut lines, 3);
        assert_eq!(total_width(&lines[0]), 3);
    }

    #[test]
    fn feed_items_have_fixed_height() {
        let post = Post {
            content: "a very long body ".repeat(40),
            ..crate::post::fixtures::post("1", 0)
        };
        let mut item = FeedItem::new(post);
        let now = Utc::now();
        assert_eq!(item_lines(&item, 30, false, now).len(), ITEM_LINES);
        item.mark_failed("boom");
        let lines = item_lines(&item, 30, true, now);
        assert_eq!(lines.len(), ITEM_LINES);
        assert!(lines[ITEM_LINES - 1].spans[0].content.contains("boom"));
    }

    #[test]
    fn art_rows_become_lines() {
        let art = CellArt {
            cols: 2,
            rows: 1,
            cells: vec![vec![Some([1, 2, 3]), None]],
        };
        let lines = art_lines(&art, 1, Style::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(total_width(&lines[0]), 3);
        assert_eq!(lines[0].spans[1].style.bg, Some(Color::Rgb(1, 2, 3)));
    }

    #[test]
    fn ages_are_compact() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).single().unwrap();
        let created = Utc.with_ymd_and_hms(2024, 5, 2, 11, 15, 0).single().unwrap();
        assert_eq!(age_label(created, now), "45m");
        let old = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).single().unwrap();
        assert_eq!(age_label(old, now), "2024-04-01");
    }

    #[test]
    fn scrolling_keeps_selection_on_screen() {
        let mut rendered = Rendered::new();
        for index in 0..10 {
            let line = Line::from(format!("line {index}"));
            rendered.push_entry(vec![line], index == 8);
        }
        let lines = rendered.scrolled(4);
        let texts: Vec<String> = lines.iter().map(|line| line.spans[0].content.to_string()).collect();
        assert!(texts.iter().take(4).any(|text| text == "line 8"));
    }

    #[test]
    fn wheel_scrolls_feed_and_moves_other_cursors() {
        assert!(matches!(
            wheel_message(MouseEventKind::ScrollDown, Pane::Feed),
            Some(Message::Scroll(1))
        ));
        assert!(matches!(
            wheel_message(MouseEventKind::ScrollUp, Pane::Detail),
            Some(Message::MoveCursor(-1))
        ));
        assert!(matches!(
            wheel_message(MouseEventKind::ScrollDown, Pane::Profile),
            Some(Message::MoveCursor(1))
        ));
        assert!(wheel_message(MouseEventKind::Moved, Pane::Feed).is_none());
    }
}
