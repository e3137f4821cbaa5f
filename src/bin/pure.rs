use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Position, Rect},
    style::Modifier,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};
use tdoc::{Document, markdown, parse, writer::Writer};

use pure_richtext::render::{CursorVisualPosition, RenderResult, render_session};
use pure_richtext::theme::Theme;
use pure_richtext::tree::{DocumentTree, Element, NodeId, Tag};
use pure_richtext::{
    BlockStyle, Direction, EditError, EditorConfig, EditorSession, HighlightError, Highlighter,
    InlineStyle, convert,
};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const TICK_RATE: Duration = Duration::from_millis(100);
const LOG_ENV: &str = "PURE_LOG";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DocumentFormat {
    Ftml,
    Markdown,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") | Some("mkd") | Some("mdown") | Some("mdtxt") => {
                DocumentFormat::Markdown
            }
            _ => DocumentFormat::Ftml,
        }
    }
}

fn main() -> Result<()> {
    init_logging()?;
    run()
}

/// Logging is off unless `PURE_LOG` holds a filter. Output goes to a file
/// because the terminal belongs to the editor.
fn init_logging() -> Result<()> {
    if env::var_os(LOG_ENV).is_none() {
        return Ok(());
    }
    let log_path = env::temp_dir().join("pure.log");
    let file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, "info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    log::info!("pure starting up, logging to {}", log_path.display());
    Ok(())
}

fn editor_wrap_configuration(width: usize) -> (usize, usize) {
    if width == 0 {
        return (1, 0);
    }
    if width < 60 {
        let wrap_width = width.saturating_sub(1).max(1);
        return (wrap_width, 0);
    }
    if width < 100 {
        let padding = 2.min(width / 2);
        let wrap_width = width.saturating_sub(padding.saturating_mul(2)).max(1);
        return (wrap_width, padding);
    }
    let max_padding = width.saturating_sub(1) / 2;
    let left_padding = (width.saturating_sub(100) / 2 + 4).min(max_padding);
    let wrap_width = width.saturating_sub(left_padding.saturating_mul(2)).max(1);
    (wrap_width, left_padding)
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(path_arg) = args.next() else {
        eprintln!("Usage: pure <file.ftml|file.md>");
        return Ok(());
    };
    let path = PathBuf::from(path_arg);

    let (config, config_status) = match EditorConfig::load() {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(err) => {
            log::warn!("{err}");
            (EditorConfig::default(), Some(format!("{err}. Using defaults.")))
        }
    };
    let (document, format, load_status) = load_document(&path)?;
    let session = EditorSession::new(convert::from_tdoc(&document), config);
    let mut app = App::new(session, path, format, load_status.or(config_status));

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to initialize terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().ok();

    let res = run_app(&mut terminal, &mut app).context("application error");

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn load_document(path: &Path) -> Result<(Document, DocumentFormat, Option<String>)> {
    let format = DocumentFormat::from_path(path);
    if !path.exists() {
        return Ok((Document::new(), format, Some("New document".to_string())));
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = match format {
        DocumentFormat::Ftml => parse(io::Cursor::new(content))
            .map_err(|err| -> Box<dyn std::error::Error + Send + Sync> { Box::new(err) }),
        DocumentFormat::Markdown => markdown::parse(io::Cursor::new(content)),
    };
    match parsed {
        Ok(doc) => Ok((doc, format, None)),
        Err(err) => {
            log::warn!("failed to parse {}: {err}", path.display());
            let message = format!("Parse error: {err}. Starting with empty document.");
            Ok((Document::new(), format, Some(message)))
        }
    }
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();
    let mut needs_redraw = true;

    while !app.should_quit {
        if needs_redraw {
            terminal
                .draw(|frame| app.draw(frame))
                .context("failed to draw frame")?;
            needs_redraw = false;
        }

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout).context("event poll failed")? {
            let evt = event::read().context("failed to read event")?;
            app.handle_event(evt)?;
            needs_redraw = true;
        }

        if last_tick.elapsed() >= TICK_RATE {
            if app.on_tick() {
                needs_redraw = true;
            }
            last_tick = Instant::now();
        }
    }

    Ok(())
}

/// Colors a handful of Rust keywords in code blocks.
struct KeywordHighlighter {
    color: &'static str,
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "const", "else", "enum", "fn", "for", "if", "impl", "in", "let",
    "loop", "match", "mod", "mut", "pub", "return", "self", "struct", "trait", "use", "where",
    "while",
];

impl Highlighter for KeywordHighlighter {
    fn highlight(&mut self, tree: &mut DocumentTree, code_block: NodeId) -> Result<(), HighlightError> {
        let has_atomics = tree
            .children(code_block)
            .iter()
            .any(|child| tree.is_atomic(*child));
        let text = tree.text_content(code_block);
        if has_atomics || text.is_empty() {
            return Ok(());
        }
        for child in tree.children(code_block).to_vec() {
            tree.detach(child);
        }

        let mut plain = String::new();
        for token in split_words(&text) {
            if KEYWORDS.contains(&token) {
                if !plain.is_empty() {
                    tree.append_text(code_block, std::mem::take(&mut plain));
                }
                let styled = Element::new(Tag::Styled).with_attr("color", self.color);
                let span = tree.append_element(code_block, styled);
                tree.append_text(span, token);
            } else {
                plain.push_str(token);
            }
        }
        if !plain.is_empty() {
            tree.append_text(code_block, plain);
        }
        Ok(())
    }
}

/// Alternating runs of identifier characters and everything else.
fn split_words(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_word = None;
    for (idx, ch) in text.char_indices() {
        let word = ch.is_alphanumeric() || ch == '_';
        if in_word.is_some_and(|current| current != word) {
            tokens.push(&text[start..idx]);
            start = idx;
        }
        in_word = Some(word);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

#[derive(Clone, Copy)]
enum MenuAction {
    SetBlockStyle(BlockStyle),
    ToggleList { ordered: bool },
    ToggleInlineStyle(InlineStyleKind),
    Undo,
    Redo,
    SelectAll,
}

#[derive(Clone, Copy)]
enum InlineStyleKind {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Highlight,
}

impl InlineStyleKind {
    fn style(self) -> InlineStyle {
        match self {
            InlineStyleKind::Bold => InlineStyle::Bold,
            InlineStyleKind::Italic => InlineStyle::Italic,
            InlineStyleKind::Underline => InlineStyle::Underline,
            InlineStyleKind::Strike => InlineStyle::Strike,
            InlineStyleKind::Code => InlineStyle::Code,
            InlineStyleKind::Highlight => InlineStyle::Highlight,
        }
    }
}

#[derive(Clone, Copy)]
struct MenuShortcut {
    key: char,
    requires_shift: bool,
}

impl MenuShortcut {
    const fn new(key: char) -> Self {
        Self {
            key,
            requires_shift: false,
        }
    }

    const fn with_shift(key: char) -> Self {
        Self {
            key,
            requires_shift: true,
        }
    }

    fn matches(&self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        match code {
            KeyCode::Char(ch) if ch == self.key => {
                if self.requires_shift {
                    modifiers == KeyModifiers::SHIFT
                } else {
                    modifiers.is_empty()
                }
            }
            _ => false,
        }
    }
}

#[derive(Clone, Copy)]
struct MenuItem {
    label: &'static str,
    action: Option<MenuAction>,
    shortcut: MenuShortcut,
}

impl MenuItem {
    fn new(label: &'static str, action: MenuAction, shortcut: MenuShortcut, enabled: bool) -> Self {
        Self {
            label,
            action: enabled.then_some(action),
            shortcut,
        }
    }

    fn is_enabled(&self) -> bool {
        self.action.is_some()
    }
}

enum MenuEntry {
    Section(&'static str),
    Separator,
    Item(MenuItem),
}

struct ContextMenuState {
    entries: Vec<MenuEntry>,
    selected_index: usize,
}

impl ContextMenuState {
    fn new(entries: Vec<MenuEntry>) -> Self {
        let selected_index = entries
            .iter()
            .position(|entry| matches!(entry, MenuEntry::Item(item) if item.is_enabled()))
            .unwrap_or(0);
        Self {
            entries,
            selected_index,
        }
    }

    fn move_selection(&mut self, delta: i32) {
        if self.entries.is_empty() {
            return;
        }
        let len = self.entries.len() as i32;
        let mut idx = self.selected_index as i32;
        for _ in 0..len {
            idx = (idx + delta).rem_euclid(len);
            if matches!(self.entries[idx as usize], MenuEntry::Item(_)) {
                self.selected_index = idx as usize;
                break;
            }
        }
    }

    fn current_action(&self) -> Option<MenuAction> {
        match self.entries.get(self.selected_index) {
            Some(MenuEntry::Item(item)) => item.action,
            _ => None,
        }
    }

    fn shortcut_action(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
    ) -> (bool, Option<MenuAction>) {
        for (idx, entry) in self.entries.iter().enumerate() {
            if let MenuEntry::Item(item) = entry
                && item.shortcut.matches(code, modifiers)
            {
                self.selected_index = idx;
                return (true, item.action);
            }
        }
        (false, None)
    }
}

fn build_context_menu_entries(session: &EditorSession) -> Vec<MenuEntry> {
    let has_selection = session.selection().is_some_and(|span| !span.is_collapsed());
    let block = |label, style, key| {
        MenuEntry::Item(MenuItem::new(
            label,
            MenuAction::SetBlockStyle(style),
            MenuShortcut::new(key),
            true,
        ))
    };
    let inline = |label, kind, shortcut| {
        MenuEntry::Item(MenuItem::new(
            label,
            MenuAction::ToggleInlineStyle(kind),
            shortcut,
            has_selection,
        ))
    };
    vec![
        MenuEntry::Section("Paragraph type"),
        block("Text", BlockStyle::Paragraph, '0'),
        block("Heading 1", BlockStyle::Heading(1), '1'),
        block("Heading 2", BlockStyle::Heading(2), '2'),
        block("Heading 3", BlockStyle::Heading(3), '3'),
        block("Quote", BlockStyle::Quote, '5'),
        block("Code", BlockStyle::CodeBlock, '6'),
        MenuEntry::Item(MenuItem::new(
            "Numbered List",
            MenuAction::ToggleList { ordered: true },
            MenuShortcut::new('7'),
            true,
        )),
        MenuEntry::Item(MenuItem::new(
            "Bullet List",
            MenuAction::ToggleList { ordered: false },
            MenuShortcut::new('8'),
            true,
        )),
        MenuEntry::Separator,
        MenuEntry::Section("Inline style"),
        inline("Bold", InlineStyleKind::Bold, MenuShortcut::new('b')),
        inline("Italic", InlineStyleKind::Italic, MenuShortcut::new('i')),
        inline("Underline", InlineStyleKind::Underline, MenuShortcut::new('u')),
        inline("Code", InlineStyleKind::Code, MenuShortcut::with_shift('C')),
        inline("Highlight", InlineStyleKind::Highlight, MenuShortcut::with_shift('H')),
        inline("Strikethrough", InlineStyleKind::Strike, MenuShortcut::with_shift('X')),
        MenuEntry::Separator,
        MenuEntry::Section("Edit"),
        MenuEntry::Item(MenuItem::new(
            "Undo",
            MenuAction::Undo,
            MenuShortcut::new('z'),
            session.can_undo(),
        )),
        MenuEntry::Item(MenuItem::new(
            "Redo",
            MenuAction::Redo,
            MenuShortcut::new('y'),
            session.can_redo(),
        )),
        MenuEntry::Item(MenuItem::new(
            "Select All",
            MenuAction::SelectAll,
            MenuShortcut::new('a'),
            true,
        )),
    ]
}

fn is_context_menu_shortcut(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Esc => modifiers.is_empty(),
        KeyCode::Char(' ') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn block_label(style: Option<BlockStyle>) -> String {
    match style {
        Some(BlockStyle::Paragraph) => "Text".to_string(),
        Some(BlockStyle::Heading(level)) => format!("Heading {level}"),
        Some(BlockStyle::Quote) => "Quote".to_string(),
        Some(BlockStyle::CodeBlock) => "Code".to_string(),
        None => "List".to_string(),
    }
}

struct App {
    session: EditorSession,
    highlighter: KeywordHighlighter,
    theme: Theme,
    file_path: PathBuf,
    document_format: DocumentFormat,
    scroll_top: usize,
    should_quit: bool,
    dirty: bool,
    status_message: Option<(String, Instant)>,
    context_menu: Option<ContextMenuState>,
    last_cursor: Option<CursorVisualPosition>,
    last_viewport_height: usize,
}

impl App {
    fn new(
        session: EditorSession,
        path: PathBuf,
        format: DocumentFormat,
        initial_status: Option<String>,
    ) -> Self {
        Self {
            session,
            highlighter: KeywordHighlighter { color: "magenta" },
            theme: Theme::default(),
            file_path: path,
            document_format: format,
            scroll_top: 0,
            should_quit: false,
            dirty: false,
            status_message: initial_status.map(|msg| (msg, Instant::now())),
            context_menu: None,
            last_cursor: None,
            last_viewport_height: 0,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if area.height == 0 || area.width == 0 {
            return;
        }

        let [editor_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(area);

        let (wrap_width, left_padding) = editor_wrap_configuration(editor_area.width as usize);
        let text_area = Rect {
            x: editor_area.x + left_padding as u16,
            width: (wrap_width as u16).min(editor_area.width),
            ..editor_area
        };

        let render = render_session(&self.session, wrap_width, &self.theme);
        let viewport_height = text_area.height as usize;
        self.last_cursor = render.cursor;
        self.last_viewport_height = viewport_height;
        self.adjust_scroll(&render, viewport_height);

        let paragraph = Paragraph::new(Text::from(render.lines.clone()))
            .style(ratatui::style::Style::default().bg(self.theme.background))
            .block(Block::default().borders(Borders::NONE))
            .scroll((self.scroll_top as u16, 0));
        frame.render_widget(paragraph, text_area);

        if let Some(cursor) = render.cursor
            && cursor.line >= self.scroll_top
            && cursor.line < self.scroll_top + viewport_height
        {
            let cursor_y = text_area.y + (cursor.line - self.scroll_top) as u16;
            let cursor_x = text_area.x + cursor.column.min(text_area.width.saturating_sub(1));
            frame.set_cursor_position(Position::new(cursor_x, cursor_y));
        }

        let status_line = self.status_line(render.total_lines, status_area.width as usize);
        let status_widget = Paragraph::new(status_line).style(self.theme.status_bar_style());
        frame.render_widget(status_widget, status_area);

        if self.context_menu.is_some() {
            self.render_context_menu(frame, area);
        }
    }

    fn render_context_menu(&self, frame: &mut Frame, area: Rect) {
        let Some(menu) = &self.context_menu else {
            return;
        };
        if area.width < 3 || area.height < 3 {
            return;
        }

        let mut label_width = 0usize;
        for entry in &menu.entries {
            match entry {
                MenuEntry::Item(item) => label_width = label_width.max(item.label.chars().count()),
                MenuEntry::Section(title) => label_width = label_width.max(title.chars().count()),
                MenuEntry::Separator => {}
            }
        }
        let content_width = (label_width + 3) as u16;
        let width = (content_width + 4).min(area.width).max(10.min(area.width));
        let height = (menu.entries.len() as u16 + 2).min(area.height);
        let popup_area = Rect::new(
            area.x + area.width.saturating_sub(width) / 2,
            area.y + area.height.saturating_sub(height) / 2,
            width,
            height,
        );
        frame.render_widget(Clear, popup_area);

        let popup_style = self.theme.menu_style();
        let separator_width = popup_area.width.saturating_sub(4).max(4) as usize;
        let items: Vec<ListItem> = menu
            .entries
            .iter()
            .map(|entry| match entry {
                MenuEntry::Section(title) => ListItem::new(Line::from(Span::styled(
                    *title,
                    popup_style.add_modifier(Modifier::BOLD),
                ))),
                MenuEntry::Separator => ListItem::new(Line::from(Span::styled(
                    "─".repeat(separator_width),
                    self.theme.menu_disabled_style(),
                ))),
                MenuEntry::Item(item) => {
                    let content = format!(
                        "{label:<label_width$}  {key}",
                        label = item.label,
                        key = item.shortcut.key,
                    );
                    let style = if item.is_enabled() {
                        popup_style
                    } else {
                        self.theme.menu_disabled_style()
                    };
                    ListItem::new(Line::from(Span::styled(content, style)))
                }
            })
            .collect();

        let mut state = ListState::default();
        state.select(Some(menu.selected_index));
        let list = List::new(items)
            .highlight_style(self.theme.menu_selected_style())
            .style(popup_style)
            .block(
                Block::default()
                    .title("Context Menu")
                    .borders(Borders::ALL)
                    .style(popup_style),
            );
        frame.render_stateful_widget(list, popup_area, &mut state);
    }

    fn handle_context_menu_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        let Some(menu) = self.context_menu.as_mut() else {
            return false;
        };
        match code {
            KeyCode::Esc => self.context_menu = None,
            KeyCode::Char(' ') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.context_menu = None
            }
            KeyCode::Up => menu.move_selection(-1),
            KeyCode::Down => menu.move_selection(1),
            KeyCode::Enter => {
                if let Some(action) = menu.current_action() {
                    self.context_menu = None;
                    self.execute_menu_action(action);
                }
            }
            KeyCode::Char(_) => {
                let (handled, action) = menu.shortcut_action(code, modifiers);
                if let Some(action) = action {
                    self.context_menu = None;
                    self.execute_menu_action(action);
                }
                return handled;
            }
            _ => return false,
        }
        true
    }

    fn execute_menu_action(&mut self, action: MenuAction) {
        let result = match action {
            MenuAction::SetBlockStyle(style) => self.session.set_block_style(style),
            MenuAction::ToggleList { ordered } => self.session.toggle_list(ordered),
            MenuAction::ToggleInlineStyle(kind) => self.session.toggle_inline_style(kind.style()),
            MenuAction::Undo => self.session.undo(),
            MenuAction::Redo => self.session.redo(),
            MenuAction::SelectAll => Ok(self.session.select_all()),
        };
        self.after_edit(result, !matches!(action, MenuAction::SelectAll));
    }

    /// Marks the document dirty and queues a highlight pass when an edit
    /// went through, or shows the error.
    fn after_edit(&mut self, result: Result<bool, EditError>, edits_document: bool) {
        match result {
            Ok(true) if edits_document => {
                self.dirty = true;
                if let Some(block) = self.session.code_block_at_caret() {
                    self.session.schedule_highlight(block, Instant::now());
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("edit failed: {err}");
                self.set_status(err.to_string());
            }
        }
    }

    fn status_line(&mut self, content_lines: usize, terminal_width: usize) -> Line<'static> {
        self.prune_status_message();
        let position = self.cursor_position_text();
        if let Some((message, _)) = &self.status_message {
            return Line::from(vec![Span::raw(format!("{position} ")), Span::raw(message.clone())]);
        }

        let marker = if self.dirty { "*" } else { "" };
        let word_count = self
            .session
            .tree()
            .text_content(self.session.tree().root())
            .split_whitespace()
            .count();
        let mut spans = vec![
            Span::raw(format!("{position} ")),
            Span::styled(
                format!("{}{marker}", self.file_path.display()),
                self.theme.filename_style(),
            ),
            Span::raw(format!(
                " {}, {content_lines} lines, {word_count} words",
                block_label(self.session.current_block_style())
            )),
        ];

        let left_width: usize = spans.iter().map(|span| span.content.chars().count()).sum();
        let mut shortcuts: Vec<&str> = Vec::new();
        let mut shortcuts_width = 0;
        for shortcut in ["^Q:Quit", "^S:Save", "^Z:Undo", "Esc:Menu"] {
            let width = shortcuts_width + usize::from(!shortcuts.is_empty()) + shortcut.len();
            if left_width + 1 + width > terminal_width {
                break;
            }
            shortcuts.insert(0, shortcut);
            shortcuts_width = width;
        }
        if !shortcuts.is_empty() {
            let padding = terminal_width
                .saturating_sub(left_width + shortcuts_width)
                .max(1);
            spans.push(Span::raw(" ".repeat(padding)));
            spans.push(Span::raw(shortcuts.join(" ")));
        }
        Line::from(spans)
    }

    fn prune_status_message(&mut self) {
        if let Some((_, instant)) = &self.status_message
            && instant.elapsed() > STATUS_TIMEOUT
        {
            self.status_message = None;
        }
    }

    fn cursor_position_text(&self) -> String {
        match self.last_cursor {
            Some(position) => format!("{}:{}", position.line + 1, position.column + 1),
            None => "?:?".to_string(),
        }
    }

    fn adjust_scroll(&mut self, render: &RenderResult, viewport_height: usize) {
        let viewport = viewport_height.max(1);
        let max_scroll = render.total_lines.saturating_sub(viewport);
        if let Some(cursor) = render.cursor {
            if cursor.line < self.scroll_top {
                self.scroll_top = cursor.line;
            } else if cursor.line >= self.scroll_top + viewport {
                self.scroll_top = cursor.line + 1 - viewport;
            }
        }
        self.scroll_top = self.scroll_top.min(max_scroll);
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            return Ok(());
        };

        if self.handle_context_menu_key(code, modifiers) || self.context_menu.is_some() {
            return Ok(());
        }
        if is_context_menu_shortcut(code, modifiers) {
            self.context_menu = Some(ContextMenuState::new(build_context_menu_entries(
                &self.session,
            )));
            return Ok(());
        }

        let extend = modifiers.contains(KeyModifiers::SHIFT);
        let control = modifiers.contains(KeyModifiers::CONTROL);
        match code {
            KeyCode::Char('q') | KeyCode::Char('c') if control => self.should_quit = true,
            KeyCode::Char('s') if control => self.save()?,
            KeyCode::Char('z') if control && extend => {
                let result = self.session.redo();
                self.after_edit(result, true);
            }
            KeyCode::Char('z') if control => {
                let result = self.session.undo();
                self.after_edit(result, true);
            }
            KeyCode::Char('y') if control => {
                let result = self.session.redo();
                self.after_edit(result, true);
            }
            KeyCode::Char('a') if control => {
                self.session.select_all();
            }
            KeyCode::Char('b') if control => self.toggle_style(InlineStyle::Bold),
            KeyCode::Char('i') if control => self.toggle_style(InlineStyle::Italic),
            KeyCode::Char('u') if control => self.toggle_style(InlineStyle::Underline),
            KeyCode::Left => self.move_caret(Direction::Left, extend),
            KeyCode::Right => self.move_caret(Direction::Right, extend),
            KeyCode::Up => self.move_caret(Direction::Up, extend),
            KeyCode::Down => self.move_caret(Direction::Down, extend),
            KeyCode::Home => self.move_caret(Direction::LineStart, extend),
            KeyCode::End => self.move_caret(Direction::LineEnd, extend),
            KeyCode::PageUp | KeyCode::PageDown => {
                let direction = if code == KeyCode::PageUp {
                    Direction::Up
                } else {
                    Direction::Down
                };
                for _ in 0..self.last_viewport_height.max(1) {
                    if !self.session.move_caret(direction, extend) {
                        break;
                    }
                }
            }
            KeyCode::Enter if extend => {
                let result = self.session.insert_line_break();
                self.after_edit(result, true);
            }
            KeyCode::Enter => {
                let result = self.session.split_block();
                self.after_edit(result, true);
            }
            KeyCode::Backspace => {
                let result = self.session.delete_backward();
                self.after_edit(result, true);
            }
            KeyCode::Delete => {
                let collapsed = self
                    .session
                    .selection()
                    .is_none_or(|span| span.is_caret());
                if collapsed && !self.session.move_caret(Direction::Right, false) {
                    return Ok(());
                }
                let result = self.session.delete_backward();
                self.after_edit(result, true);
            }
            KeyCode::Tab if self.session.code_block_at_caret().is_some() => {
                let result = self.session.insert_text("\t");
                self.after_edit(result, true);
            }
            KeyCode::Char(ch) if !control => {
                let result = self.session.insert_text(ch.encode_utf8(&mut [0; 4]));
                self.after_edit(result, true);
            }
            _ => {}
        }
        Ok(())
    }

    fn move_caret(&mut self, direction: Direction, extend: bool) {
        self.session.move_caret(direction, extend);
    }

    fn toggle_style(&mut self, style: InlineStyle) {
        let result = self.session.toggle_inline_style(style);
        self.after_edit(result, true);
    }

    /// Runs highlight passes that are due. Returns whether a redraw is needed.
    fn on_tick(&mut self) -> bool {
        let had_message = self.status_message.is_some();
        self.prune_status_message();
        let mut redraw = had_message && self.status_message.is_none();
        if self.session.has_pending_tasks() {
            match self
                .session
                .run_due_tasks(Instant::now(), &mut self.highlighter)
            {
                Ok(changed) => redraw |= changed > 0,
                Err(err) => {
                    log::warn!("highlighting failed: {err}");
                    self.set_status(err.to_string());
                    redraw = true;
                }
            }
        }
        redraw
    }

    fn save(&mut self) -> Result<()> {
        let document = convert::to_tdoc(self.session.tree());
        let contents = match self.document_format {
            DocumentFormat::Ftml => Writer::new()
                .write_to_string(&document)
                .context("failed to render FTML")?
                .into_bytes(),
            DocumentFormat::Markdown => {
                let mut contents = Vec::new();
                markdown::write(&mut contents, &document).context("failed to render Markdown")?;
                contents
            }
        };
        fs::write(&self.file_path, contents)
            .with_context(|| format!("failed to write {}", self.file_path.display()))?;
        log::info!("saved {}", self.file_path.display());

        self.dirty = false;
        self.set_status("Saved");
        Ok(())
    }
}
