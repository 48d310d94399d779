use crate::config::{CursorMode, Settings};
use crate::error::BrowseError;
use crate::mutation::{MutationOrchestrator, MutationOutcome, MutationState, PendingAction};
use crate::view::TableView;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    TableList,
    TableData,
}

/// Column/term entry for a search. Submitting needs a non-empty term.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPrompt {
    pub column: usize,
    pub term: String,
}

impl SearchPrompt {
    pub fn can_submit(&self) -> bool {
        !self.term.is_empty()
    }
}

pub struct App {
    pub focus: Focus,
    pub view: TableView,
    pub orchestrator: MutationOrchestrator,
    pub tables: Vec<String>,
    pub tables_list_state: ListState,
    pub table_data_state: TableState,
    pub selected_column: usize,
    pub cursor_mode: CursorMode,
    pub dark_theme: bool,
    pub search_prompt: Option<SearchPrompt>,
    pub error_message: Option<String>,
    pub status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(view: TableView, settings: &Settings) -> App {
        App {
            focus: Focus::TableList,
            view,
            orchestrator: MutationOrchestrator::new(),
            tables: Vec::new(),
            tables_list_state: ListState::default(),
            table_data_state: TableState::default(),
            selected_column: 0,
            cursor_mode: settings.cursor_mode,
            dark_theme: settings.dark_theme,
            search_prompt: None,
            error_message: None,
            status: None,
            should_quit: false,
        }
    }

    pub async fn load_tables(&mut self) {
        match self.view.gateway().list_tables().await {
            Ok(tables) => {
                self.tables = tables;
                if !self.tables.is_empty() {
                    self.tables_list_state.select(Some(0));
                }
            }
            Err(e) => self.report(e),
        }
    }

    pub async fn open_selected_table(&mut self) {
        let Some(table) = self
            .tables_list_state
            .selected()
            .and_then(|i| self.tables.get(i))
            .cloned()
        else {
            return;
        };

        match self.view.open_table(&table).await {
            Ok(()) => {
                self.focus = Focus::TableData;
                self.search_prompt = None;
                self.selected_column = 0;
                self.reset_row_selection();
                self.status = Some(format!("Opened {}", table));
            }
            Err(e) => self.report(e),
        }
    }

    pub fn next_table(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        let i = match self.tables_list_state.selected() {
            Some(i) if i + 1 < self.tables.len() => i + 1,
            _ => 0,
        };
        self.tables_list_state.select(Some(i));
    }

    pub fn previous_table(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        let i = match self.tables_list_state.selected() {
            Some(0) | None => self.tables.len() - 1,
            Some(i) => i - 1,
        };
        self.tables_list_state.select(Some(i));
    }

    pub fn next_row(&mut self) {
        if self.view.is_empty() {
            return;
        }
        let i = match self.table_data_state.selected() {
            Some(i) if i + 1 < self.view.len() => i + 1,
            _ => 0,
        };
        self.table_data_state.select(Some(i));
    }

    pub fn previous_row(&mut self) {
        if self.view.is_empty() {
            return;
        }
        let i = match self.table_data_state.selected() {
            Some(0) | None => self.view.len() - 1,
            Some(i) => i - 1,
        };
        self.table_data_state.select(Some(i));
    }

    pub fn next_column(&mut self) {
        let count = self.view.columns().len();
        if count > 0 {
            self.selected_column = (self.selected_column + 1) % count;
        }
    }

    pub fn previous_column(&mut self) {
        let count = self.view.columns().len();
        if count > 0 {
            self.selected_column = (self.selected_column + count - 1) % count;
        }
    }

    pub fn toggle_theme(&mut self) {
        self.dark_theme = !self.dark_theme;
    }

    pub fn change_cursor_mode(&mut self) {
        self.cursor_mode = self.cursor_mode.toggle();
    }

    pub async fn next_page(&mut self) {
        match self.view.next_page().await {
            Ok(true) => self.reset_row_selection(),
            Ok(false) => {}
            Err(e) => self.report(e),
        }
    }

    pub async fn previous_page(&mut self) {
        match self.view.previous_page().await {
            Ok(true) => self.reset_row_selection(),
            Ok(false) => {}
            Err(e) => self.report(e),
        }
    }

    /// Reloads the current page; also leaves search results.
    pub async fn refresh(&mut self) {
        if self.view.table().is_none() {
            return;
        }
        match self.view.refresh().await {
            Ok(()) => {
                self.reset_row_selection();
                self.status = Some("Refreshed".to_string());
            }
            Err(e) => self.report(e),
        }
    }

    pub fn open_search(&mut self) {
        if self.view.table().is_some() && !self.view.columns().is_empty() {
            self.search_prompt = Some(SearchPrompt {
                column: self.selected_column.min(self.view.columns().len() - 1),
                term: String::new(),
            });
        }
    }

    pub async fn submit_search(&mut self) {
        let Some(prompt) = self.search_prompt.clone() else {
            return;
        };
        if !prompt.can_submit() {
            return;
        }
        let Some(column) = self.view.columns().get(prompt.column).map(|c| c.name.clone()) else {
            return;
        };

        match self.view.apply_search(&column, &prompt.term).await {
            Ok(()) => {
                self.search_prompt = None;
                self.reset_row_selection();
                self.status = Some(format!("{} matches", self.view.len()));
            }
            Err(e) => self.report(e),
        }
    }

    pub async fn clear_search(&mut self) {
        match self.view.clear_search().await {
            Ok(()) => self.reset_row_selection(),
            Err(e) => self.report(e),
        }
    }

    pub fn request_delete(&mut self) {
        if let Some(handle) = self.selected_handle()
            && let Err(e) = self.orchestrator.request_delete(&self.view, handle)
        {
            self.report(e);
        }
    }

    pub fn request_edit(&mut self) {
        if let Some(handle) = self.selected_handle()
            && let Err(e) = self
                .orchestrator
                .request_edit(&self.view, handle, self.selected_column)
        {
            self.report(e);
        }
    }

    pub fn request_add(&mut self) {
        if let Err(e) = self.orchestrator.request_add(&self.view) {
            self.report(e);
        }
    }

    pub async fn confirm_pending(&mut self) {
        // failures stay in the orchestrator and are shown from there
        if let Ok(outcome) = self.orchestrator.confirm(&mut self.view).await {
            self.status = Some(match outcome {
                MutationOutcome::Deleted { affected: 1 } => "Deleted 1 row".to_string(),
                MutationOutcome::Deleted { affected } => format!("Deleted {} matching rows", affected),
                MutationOutcome::Updated { affected: 1 } => "Updated 1 row".to_string(),
                MutationOutcome::Updated { affected } => format!("Updated {} matching rows", affected),
                MutationOutcome::Inserted(_) => "Added 1 row".to_string(),
            });
            self.clamp_row_selection();
        }
    }

    pub async fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.error_message.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.error_message = None;
            }
            return;
        }

        match self.orchestrator.state() {
            MutationState::Failed(_) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    let _ = self.orchestrator.dismiss();
                }
                return;
            }
            MutationState::Confirming(_) => {
                self.handle_pending_key(key).await;
                return;
            }
            MutationState::Idle | MutationState::Applying => {}
        }

        if self.search_prompt.is_some() {
            self.handle_search_key(key).await;
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('`') => {
                self.toggle_theme();
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::TableList => match key.code {
                KeyCode::Down => self.next_table(),
                KeyCode::Up => self.previous_table(),
                KeyCode::Enter => self.open_selected_table().await,
                KeyCode::Tab if self.view.table().is_some() => self.focus = Focus::TableData,
                _ => {}
            },
            Focus::TableData => match key.code {
                KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.refresh().await
                }
                KeyCode::Down => self.next_row(),
                KeyCode::Up => self.previous_row(),
                KeyCode::Right => self.next_column(),
                KeyCode::Left => self.previous_column(),
                KeyCode::Char('c') => self.change_cursor_mode(),
                KeyCode::Char('d') => self.request_delete(),
                KeyCode::Char('e') => self.request_edit(),
                KeyCode::Char('a') => self.request_add(),
                KeyCode::Char('k') | KeyCode::PageDown => self.next_page().await,
                KeyCode::Char('j') | KeyCode::PageUp => self.previous_page().await,
                KeyCode::Char('/') => self.open_search(),
                KeyCode::Esc if self.view.search().is_some() => self.clear_search().await,
                KeyCode::Esc | KeyCode::Tab => self.focus = Focus::TableList,
                _ => {}
            },
        }
    }

    async fn handle_pending_key(&mut self, key: KeyEvent) {
        let is_delete = matches!(
            self.orchestrator.state(),
            MutationState::Confirming(PendingAction::DeleteRow { .. })
        );

        match key.code {
            KeyCode::Esc => {
                let _ = self.orchestrator.cancel();
            }
            KeyCode::Enter => self.confirm_pending().await,
            KeyCode::Char('y') if is_delete => self.confirm_pending().await,
            KeyCode::Char('n') if is_delete => {
                let _ = self.orchestrator.cancel();
            }
            code => {
                if let Some(pending) = self.orchestrator.pending_mut() {
                    match code {
                        KeyCode::Char(c) => pending.push_char(c),
                        KeyCode::Backspace => pending.pop_char(),
                        KeyCode::Tab | KeyCode::Down => pending.next_field(),
                        KeyCode::BackTab | KeyCode::Up => pending.previous_field(),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.search_prompt = None;
                return;
            }
            KeyCode::Enter => {
                self.submit_search().await;
                return;
            }
            _ => {}
        }

        let columns = self.view.columns().len();
        let Some(prompt) = self.search_prompt.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Tab | KeyCode::Right if columns > 0 => {
                prompt.column = (prompt.column + 1) % columns;
            }
            KeyCode::BackTab | KeyCode::Left if columns > 0 => {
                prompt.column = (prompt.column + columns - 1) % columns;
            }
            KeyCode::Backspace => {
                prompt.term.pop();
            }
            KeyCode::Char(c) => prompt.term.push(c),
            _ => {}
        }
    }

    fn selected_handle(&self) -> Option<crate::view::RowHandle> {
        self.table_data_state
            .selected()
            .and_then(|i| self.view.handle_at(i))
    }

    fn reset_row_selection(&mut self) {
        *self.table_data_state.offset_mut() = 0;
        self.table_data_state
            .select(if self.view.is_empty() { None } else { Some(0) });
    }

    fn clamp_row_selection(&mut self) {
        match self.table_data_state.selected() {
            _ if self.view.is_empty() => self.table_data_state.select(None),
            Some(i) if i >= self.view.len() => self.table_data_state.select(Some(self.view.len() - 1)),
            None => self.table_data_state.select(Some(0)),
            Some(_) => {}
        }
    }

    /// Shows a store or lookup failure in the error modal.
    fn report(&mut self, err: BrowseError) {
        if err.is_internal() {
            tracing::error!(error = %err, "internal state error");
        } else {
            tracing::warn!(error = %err, "operation failed");
        }
        self.error_message = Some(err.to_string());
    }

    fn theme(&self) -> Theme {
        if self.dark_theme {
            Theme {
                base: Style::default().fg(Color::White).bg(Color::Black),
                highlight: Style::default().bg(Color::LightBlue).fg(Color::Black),
                list_highlight: Style::default()
                    .bg(Color::LightGreen)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
                stripe: Style::default().bg(Color::Rgb(30, 30, 30)),
            }
        } else {
            Theme {
                base: Style::default().fg(Color::Black).bg(Color::White),
                highlight: Style::default().bg(Color::Blue).fg(Color::White),
                list_highlight: Style::default()
                    .bg(Color::Green)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
                stripe: Style::default().bg(Color::Rgb(230, 230, 230)),
            }
        }
    }
}

struct Theme {
    base: Style,
    highlight: Style,
    list_highlight: Style,
    stripe: Style,
}

pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key).await;
            if app.should_quit {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();
    let theme = app.theme();
    f.render_widget(Block::default().style(theme.base), size);

    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(2)])
        .split(size);

    let status = app
        .status
        .clone()
        .unwrap_or_else(|| app.view.gateway().path().display().to_string());
    f.render_widget(
        Paragraph::new(Text::styled(status, Style::default().fg(Color::Green))),
        content_chunks[0],
    );

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(0)])
        .split(content_chunks[1]);

    render_table_list(f, app, main_chunks[0], &theme);
    render_table_data(f, app, main_chunks[1], &theme);
    render_help(f, app, content_chunks[2]);

    if app.search_prompt.is_some() {
        render_search_prompt(f, app, size);
    }
    render_mutation_modal(f, app, size);
    if let Some(ref error) = app.error_message {
        render_error(f, error, size);
    }
}

fn render_table_list(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let items: Vec<ListItem> = app
        .tables
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();

    let border_style = if app.focus == Focus::TableList {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Tables"),
        )
        .highlight_style(theme.list_highlight);

    f.render_stateful_widget(list, area, &mut app.tables_list_state);
}

fn render_table_data(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let border_style = if app.focus == Focus::TableData {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let Some(table_name) = app.view.table().map(str::to_string) else {
        let placeholder = Paragraph::new("Select a table and press Enter").block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Table"),
        );
        f.render_widget(placeholder, area);
        return;
    };

    // Column name on the first header line, declared type below it
    let header_cells: Vec<Cell> = app
        .view
        .columns()
        .iter()
        .map(|c| {
            Cell::from(Text::from(vec![
                Line::styled(c.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Line::styled(c.decl_type.clone(), Style::default().add_modifier(Modifier::ITALIC)),
            ]))
        })
        .collect();
    let header = Row::new(header_cells).height(2);

    let selected = app.table_data_state.selected();
    let rows: Vec<Row> = app
        .view
        .rows()
        .enumerate()
        .map(|(i, (_, row))| {
            let is_selected = Some(i) == selected;
            let cells: Vec<Cell> = row
                .iter()
                .enumerate()
                .map(|(j, value)| {
                    let cell = Cell::from(value.to_string());
                    if is_selected && app.cursor_mode == CursorMode::Cell && j == app.selected_column {
                        cell.style(theme.highlight)
                    } else {
                        cell
                    }
                })
                .collect();

            let mut row = Row::new(cells).height(1);
            if is_selected && app.cursor_mode == CursorMode::Row {
                row = row.style(theme.highlight);
            } else if i % 2 == 1 {
                row = row.style(theme.stripe);
            }
            row
        })
        .collect();

    let widths: Vec<Constraint> = app
        .view
        .columns()
        .iter()
        .map(|_| Constraint::Percentage(100 / app.view.columns().len().max(1) as u16))
        .collect();

    let title = match app.view.search() {
        Some(search) => format!(
            "Table: {} [{} ~ '{}'] {} matches (Esc to clear)",
            table_name,
            search.column,
            search.pattern,
            app.view.len()
        ),
        None => {
            let (page, pages) = app.view.page_position();
            format!(
                "Table: {} (Page {}/{}, {} rows)",
                table_name,
                page,
                pages,
                app.view.row_count()
            )
        }
    };

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    );

    f.render_stateful_widget(table, area, &mut app.table_data_state);
}

fn render_help(f: &mut Frame, app: &App, area: Rect) {
    let text = match app.focus {
        Focus::TableList => "Use ↑↓ to navigate, Enter to open, Tab for data, ` theme, 'q' to quit",
        Focus::TableData => {
            "↑↓←→ move, k/j page, d delete, e edit, a add, / search, c cursor, Ctrl+R refresh, Esc back, 'q' quit"
        }
    };
    let help_text = Paragraph::new(Span::raw(text))
        .block(Block::default().borders(Borders::NONE))
        .style(Style::default().add_modifier(Modifier::ITALIC));
    f.render_widget(help_text, area);
}

fn render_search_prompt(f: &mut Frame, app: &App, area: Rect) {
    let Some(prompt) = &app.search_prompt else {
        return;
    };
    let column = app
        .view
        .columns()
        .get(prompt.column)
        .map(|c| c.name.as_str())
        .unwrap_or("");

    let button = if prompt.can_submit() {
        Span::styled("[ Search ]", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("[ Search ]", Style::default().fg(Color::DarkGray))
    };

    let lines = vec![
        Line::from(vec![Span::raw("Search column: "), Span::styled(format!("< {} >", column), Style::default().add_modifier(Modifier::BOLD))]),
        Line::from(format!("Search term: {}_", prompt.term)),
        Line::from(""),
        Line::from(vec![button, Span::raw("  Tab/←→ column, Enter search, Esc close")]),
    ];

    render_modal(f, "Search", Text::from(lines), Color::Cyan, centered_rect(60, 8, area));
}

fn render_mutation_modal(f: &mut Frame, app: &App, area: Rect) {
    match app.orchestrator.state() {
        MutationState::Confirming(PendingAction::DeleteRow { prior, .. }) => {
            let values = prior
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" | ");
            let text = Text::from(vec![
                Line::from("Are you sure you want to delete this row?"),
                Line::from(""),
                Line::styled(values, Style::default().add_modifier(Modifier::BOLD)),
                Line::from(""),
                Line::from("[y] Confirm   [n] Cancel"),
            ]);
            render_modal(f, "Delete row", text, Color::Yellow, centered_rect(60, 9, area));
        }
        MutationState::Confirming(PendingAction::EditCell { column, input, .. }) => {
            let name = app
                .view
                .columns()
                .get(*column)
                .map(|c| c.name.as_str())
                .unwrap_or("");
            let text = Text::from(vec![
                Line::from(format!("Enter the new value for '{}':", name)),
                Line::from(""),
                Line::styled(format!("{}_", input), Style::default().add_modifier(Modifier::BOLD)),
                Line::from(""),
                Line::from("Enter confirm, Esc cancel. Type NULL for a null value."),
            ]);
            render_modal(f, "Edit cell", text, Color::Yellow, centered_rect(60, 9, area));
        }
        MutationState::Confirming(PendingAction::AddRow { inputs, focus }) => {
            let mut lines: Vec<Line> = app
                .view
                .columns()
                .iter()
                .zip(inputs)
                .enumerate()
                .map(|(i, (column, input))| {
                    let marker = if i == *focus { "> " } else { "  " };
                    let line = format!("{}{} ({}): {}", marker, column.name, column.decl_type, input);
                    if i == *focus {
                        Line::styled(line, Style::default().add_modifier(Modifier::BOLD))
                    } else {
                        Line::from(line)
                    }
                })
                .collect();
            lines.push(Line::from(""));
            lines.push(Line::from("Tab/↑↓ field, Enter add row, Esc cancel. NULL for null."));

            let height = inputs.len() as u16 + 4;
            render_modal(f, "Add row", Text::from(lines), Color::Yellow, centered_rect(70, height, area));
        }
        MutationState::Applying => {
            render_modal(f, "Working", Text::from("Applying..."), Color::Yellow, centered_rect(30, 3, area));
        }
        MutationState::Failed(message) => render_error(f, message, area),
        MutationState::Idle => {}
    }
}

fn render_error(f: &mut Frame, message: &str, area: Rect) {
    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("Press Enter to dismiss"),
    ]);
    render_modal(f, "Error", text, Color::Red, centered_rect(60, 7, area));
}

fn render_modal(f: &mut Frame, title: &str, text: Text, color: Color, area: Rect) {
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(title.to_string()),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

/// A rect of `percent_x` width and `height` rows centered in `area`.
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = area.width * percent_x.min(100) / 100;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
