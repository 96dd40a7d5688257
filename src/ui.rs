use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_recon::{ReconciliationReport, ReconciliationRow, SlotType, VarianceStatus};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::BTreeMap;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Complexes,
    Report,
    Views,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterType {
    None,
    AllRows,
    Discrepancies,
    BySlot(SlotType),
    ByComplex(String),
}

#[derive(Debug, Clone)]
pub struct FilterState {
    pub active_filter: FilterType,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Complexes => Page::Report,
            Page::Report => Page::Views,
            Page::Views => Page::Complexes,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Complexes => Page::Views,
            Page::Report => Page::Complexes,
            Page::Views => Page::Report,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Complexes => "Conjuntos",
            Page::Report => "Reconciliacion",
            Page::Views => "Views",
        }
    }
}

/// Per-complex totals shown on the Conjuntos page
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSummary {
    pub complex: String,
    pub rows: usize,
    pub app: f64,
    pub sisco: f64,
}

impl ComplexSummary {
    pub fn validation(&self) -> f64 {
        self.app - self.sisco
    }
}

pub struct App {
    pub report: ReconciliationReport,
    pub filtered_rows: Vec<ReconciliationRow>,
    pub state: TableState,
    pub current_page: Page,
    pub complexes_state: TableState,
    pub show_detail: bool,
    pub filter_state: FilterState,
}

impl App {
    pub fn new(report: ReconciliationReport) -> Self {
        let mut state = TableState::default();
        if !report.rows.is_empty() {
            state.select(Some(0));
        }

        let mut complexes_state = TableState::default();
        complexes_state.select(Some(0));

        let filtered_rows = report.rows.clone();

        Self {
            report,
            filtered_rows,
            state,
            current_page: Page::Report,
            complexes_state,
            show_detail: false,
            filter_state: FilterState {
                active_filter: FilterType::None,
            },
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_row(&self) -> Option<&ReconciliationRow> {
        self.state.selected().and_then(|i| self.filtered_rows.get(i))
    }

    pub fn apply_filter(&mut self, filter: FilterType) {
        self.filter_state.active_filter = filter.clone();
        let tolerance = self.report.tolerance;

        self.filtered_rows = match filter {
            FilterType::None | FilterType::AllRows => self.report.rows.clone(),
            FilterType::Discrepancies => self.report.rows.iter()
                .filter(|r| r.status(tolerance) != VarianceStatus::Match)
                .cloned()
                .collect(),
            FilterType::BySlot(slot) => self.report.rows.iter()
                .filter(|r| r.slot == slot)
                .cloned()
                .collect(),
            FilterType::ByComplex(ref complex) => self.report.rows.iter()
                .filter(|r| &r.complex == complex)
                .cloned()
                .collect(),
        };

        // Reset selection to first item
        if !self.filtered_rows.is_empty() {
            self.state.select(Some(0));
        } else {
            self.state.select(None);
        }
    }

    pub fn clear_filter(&mut self) {
        self.apply_filter(FilterType::None);
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Totals per complex, sorted by complex name
    pub fn complex_summary(&self) -> Vec<ComplexSummary> {
        let mut summary: BTreeMap<&str, (usize, f64, f64)> = BTreeMap::new();

        for row in &self.report.rows {
            let entry = summary.entry(row.complex.as_str()).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += row.app;
            entry.2 += row.sisco;
        }

        summary
            .into_iter()
            .map(|(complex, (rows, app, sisco))| ComplexSummary {
                complex: complex.to_string(),
                rows,
                app,
                sisco,
            })
            .collect()
    }

    /// Show only the complex highlighted on the Conjuntos page
    pub fn drill_into_selected_complex(&mut self) {
        let selected = self
            .complexes_state
            .selected()
            .and_then(|i| self.complex_summary().get(i).map(|s| s.complex.clone()));

        if let Some(complex) = selected {
            self.apply_filter(FilterType::ByComplex(complex));
            self.current_page = Page::Report;
        }
    }

    fn active_list(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Complexes => {
                let len = self.complex_summary().len();
                (&mut self.complexes_state, len)
            }
            _ => (&mut self.state, self.filtered_rows.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) => (i + 20).min(len - 1),
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, _) = self.active_list();
        let i = state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn stats(&self) -> ReportStats {
        let mut stats = ReportStats::default();
        let tolerance = self.report.tolerance;

        for row in &self.report.rows {
            match row.status(tolerance) {
                VarianceStatus::Match => stats.match_count += 1,
                VarianceStatus::AppHigher => {
                    stats.app_higher_count += 1;
                    stats.app_higher_total += row.validation;
                }
                VarianceStatus::SiscoHigher => {
                    stats.sisco_higher_count += 1;
                    stats.sisco_higher_total += row.validation;
                }
            }
        }

        stats
    }
}

#[derive(Default)]
pub struct ReportStats {
    pub match_count: usize,
    pub app_higher_count: usize,
    pub app_higher_total: f64,
    pub sisco_higher_count: usize,
    pub sisco_higher_total: f64,
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
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
                KeyCode::Enter if app.current_page == Page::Complexes => {
                    app.drill_into_selected_complex()
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('c') => {
                    app.clear_filter();
                    app.current_page = Page::Report;
                }
                KeyCode::Char('1') if app.current_page == Page::Views => {
                    app.apply_filter(FilterType::AllRows);
                    app.current_page = Page::Report;
                }
                KeyCode::Char('2') if app.current_page == Page::Views => {
                    app.apply_filter(FilterType::Discrepancies);
                    app.current_page = Page::Report;
                }
                KeyCode::Char('3') if app.current_page == Page::Views => {
                    app.apply_filter(FilterType::BySlot(SlotType::Car));
                    app.current_page = Page::Report;
                }
                KeyCode::Char('4') if app.current_page == Page::Views => {
                    app.apply_filter(FilterType::BySlot(SlotType::Motorcycle));
                    app.current_page = Page::Report;
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    if !app.filtered_rows.is_empty() {
                        app.state.select(Some(app.filtered_rows.len() - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Report {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Complexes => render_complexes(f, chunks[1], app),
            Page::Report => render_table(f, chunks[1], app),
            Page::Views => render_views(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn status_color(status: VarianceStatus) -> Color {
    match status {
        VarianceStatus::Match => Color::Green,
        VarianceStatus::AppHigher => Color::Yellow,
        VarianceStatus::SiscoHigher => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();

    let mut tab_spans = vec![];
    for (i, page) in [Page::Complexes, Page::Report, Page::Views].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Rows: {}", app.report.rows.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("= {}", stats.match_count),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("APP↑ {}", stats.app_higher_count),
        Style::default().fg(Color::Yellow),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("SISCO↑ {}", stats.sisco_higher_count),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row<'a>(titles: &[&'a str]) -> Row<'a> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let unit_title = app.report.unit_column.clone();
    let header = header_row(&[unit_title.as_str(), "Conjunto", "Tipo", "APP", "SISCO", "Validacion"]);
    let tolerance = app.report.tolerance;

    let rows = app.filtered_rows.iter().map(|r| {
        let color = status_color(r.status(tolerance));

        Row::new(vec![
            Cell::from(r.unit_code.clone()),
            Cell::from(truncate(&r.complex, 24)),
            Cell::from(r.slot.display_label()),
            Cell::from(format!("{:.2}", r.app)),
            Cell::from(format!("{:.2}", r.sisco)),
            Cell::from(format!("{:.2}", r.validation)).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(26),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Reconciliacion APP vs SISCO "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_complexes(f: &mut Frame, area: Rect, app: &mut App) {
    let summary = app.complex_summary();
    let tolerance = app.report.tolerance;

    let rows = summary.iter().map(|s| {
        let color = if s.validation() == 0.0 || s.validation().abs() <= tolerance {
            Color::Green
        } else {
            Color::Red
        };

        Row::new(vec![
            Cell::from(s.complex.clone()),
            Cell::from(format!("{}", s.rows)),
            Cell::from(format!("{:.2}", s.app)),
            Cell::from(format!("{:.2}", s.sisco)),
            Cell::from(format!("{:.2}", s.validation())).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(8),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["Conjunto", "Filas", "APP", "SISCO", "Validacion"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Conjuntos - Enter to drill in "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.complexes_state);
}

fn render_views(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Quick Views & Filters",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::raw("  "),
            key("[1]"),
            Span::raw(format!(" All rows ({})", app.report.rows.len())),
        ]),
        Line::from(vec![
            Span::raw("  "),
            key("[2]"),
            Span::raw(format!(
                " Discrepancies only ({})",
                stats.app_higher_count + stats.sisco_higher_count
            )),
        ]),
        Line::from(vec![Span::raw("  "), key("[3]"), Span::raw(" Carro")]),
        Line::from(vec![Span::raw("  "), key("[4]"), Span::raw(" moto")]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  APP total:   ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.2}", app.report.total_app())),
        ]),
        Line::from(vec![
            Span::styled("  SISCO total: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.2}", app.report.total_sisco())),
        ]),
        Line::from(vec![
            Span::styled("  APP higher:  ", Style::default().fg(Color::Cyan)),
            Span::styled(
                format!("{:.2}", stats.app_higher_total),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(vec![
            Span::styled("  SISCO higher:", Style::default().fg(Color::Cyan)),
            Span::styled(
                format!(" {:.2}", stats.sisco_higher_total),
                Style::default().fg(Color::Red),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("  Reconciled at {}", app.report.reconciled_at.format("%Y-%m-%d %H:%M:%S UTC")),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Views - Quick Access Filters "),
    );

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Complexes => (
            app.complexes_state.selected().map(|i| i + 1).unwrap_or(0),
            app.complex_summary().len(),
        ),
        _ => (
            app.state.selected().map(|i| i + 1).unwrap_or(0),
            app.filtered_rows.len(),
        ),
    };

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if app.filter_state.active_filter != FilterType::None
        && app.filter_state.active_filter != FilterType::AllRows {
        let filter_name = match &app.filter_state.active_filter {
            FilterType::Discrepancies => "DISCREPANCIAS",
            FilterType::BySlot(slot) => slot.display_label(),
            FilterType::ByComplex(complex) => complex.as_str(),
            _ => "CUSTOM",
        };
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", filter_name),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
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

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let row = match app.selected_row() {
        Some(r) => r,
        None => {
            let no_selection = Paragraph::new("No row selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Detalle "),
            );
            f.render_widget(no_selection, area);
            return;
        }
    };

    let label = |text: &'static str| {
        Span::styled(text, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };
    let status = row.status(app.report.tolerance);
    let verdict = match status {
        VarianceStatus::Match => "Cuadra",
        VarianceStatus::AppHigher => "APP cobra mas que SISCO",
        VarianceStatus::SiscoHigher => "SISCO cobra mas que APP",
    };

    let content = vec![
        Line::from(""),
        Line::from(vec![label("  Unidad: "), Span::raw(row.unit_code.as_str())]),
        Line::from(""),
        Line::from(vec![label("  Conjunto: "), Span::raw(row.complex.as_str())]),
        Line::from(""),
        Line::from(vec![label("  Tipo: "), Span::raw(row.slot.display_label())]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(vec![label("  APP: "), Span::raw(format!("{:.2}", row.app))]),
        Line::from(vec![label("  SISCO: "), Span::raw(format!("{:.2}", row.sisco))]),
        Line::from(vec![
            label("  Validacion: "),
            Span::styled(
                format!("{:.2}", row.validation),
                Style::default().fg(status_color(status)),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", verdict),
            Style::default().fg(status_color(status)).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Detalle "),
    );

    f.render_widget(detail_panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
