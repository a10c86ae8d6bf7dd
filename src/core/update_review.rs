use crate::core::filemap::Filemap;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{debug, info, warn};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use std::{io, time::Duration};

/// One updated file offered for review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub path: String,
    pub summary: String,
    pub selected: bool,
}

impl ReviewItem {
    fn new(path: String, summary: String) -> Self {
        Self {
            path,
            summary,
            selected: true,
        }
    }
}

/// Line-count summary of an update: "N → M lines", "new, N lines" or
/// "unchanged".
pub fn summarize_change(original: &str, updated: &str, is_new: bool) -> String {
    if is_new {
        return format!("new, {} lines", updated.lines().count());
    }
    let before = original.lines().count();
    let after = updated.lines().count();
    if original == updated {
        "unchanged".to_string()
    } else {
        format!("{} → {} lines", before, after)
    }
}

pub fn review_items(filemap: &Filemap) -> Vec<ReviewItem> {
    filemap
        .entries()
        .filter_map(|entry| {
            let updated = entry.updated_content.as_deref()?;
            let is_new = !filemap.resolver().full_path(&entry.path).exists();
            Some(ReviewItem::new(
                entry.path.clone(),
                summarize_change(&entry.original_content, updated, is_new),
            ))
        })
        .collect()
}

struct ReviewList {
    items: Vec<ReviewItem>,
    state: ListState,
}

impl ReviewList {
    fn new(items: Vec<ReviewItem>) -> Self {
        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(0));
        }
        Self { items, state }
    }

    fn next(&mut self) {
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    fn previous(&mut self) {
        let i = match self.state.selected() {
            Some(0) | None => self.items.len().saturating_sub(1),
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    fn toggle_selected(&mut self) {
        if let Some(i) = self.state.selected() {
            if let Some(item) = self.items.get_mut(i) {
                item.selected = !item.selected;
            }
        }
    }

    fn set_all(&mut self, selected: bool) {
        for item in &mut self.items {
            item.selected = selected;
        }
    }

    fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }

    fn selected_paths(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.selected)
            .map(|item| item.path.clone())
            .collect()
    }
}

struct App {
    list: ReviewList,
    title: String,
    help_message: String,
}

impl App {
    fn new(items: Vec<ReviewItem>, title: String) -> App {
        App {
            list: ReviewList::new(items),
            title,
            help_message: String::from(
                "↑/↓: Navigate | Space: Toggle | Enter: Write selected | a: Select all | n: Deselect all | q: Done | Ctrl-C: Cancel",
            ),
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(f.area());

    let title = Paragraph::new(Span::styled(
        app.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    f.render_widget(title, chunks[0]);

    let selected_style = Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let items: Vec<ListItem> = app
        .list
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = if item.selected { "[✓] " } else { "[ ] " };
            let content = format!("{}{}  ({})", prefix, item.path, item.summary);
            let style = if app.list.state.selected() == Some(i) {
                selected_style
            } else if item.selected {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(content, style))
        })
        .collect();

    let update_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Updates ({} accepted of {})",
            app.list.selected_count(),
            app.list.items.len()
        )))
        .highlight_style(selected_style);

    f.render_stateful_widget(update_list, chunks[1], &mut app.list.state);

    let controls = Paragraph::new(Span::styled(
        app.help_message.clone(),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(controls, chunks[3]);
}

/// Returns the paths whose updates should be written. Non-interactive
/// review accepts everything.
pub fn review_updates(items: Vec<ReviewItem>, interactive: bool) -> anyhow::Result<Vec<String>> {
    if items.is_empty() {
        info!("No updates to review");
        return Ok(Vec::new());
    }

    if !interactive {
        info!("Accepting all {} update(s)", items.len());
        return Ok(items.into_iter().map(|item| item.path).collect());
    }

    debug!("Reviewing {} update(s)", items.len());
    run_tui(items)
}

/// Discards every update the reviewer rejected.
pub fn apply_review(filemap: &mut Filemap, accepted: &[String]) {
    for path in filemap.updated_paths() {
        if !accepted.contains(&path) {
            debug!("Update for {} rejected", path);
            filemap.discard_update(&path);
        }
    }
}

fn run_tui(items: Vec<ReviewItem>) -> anyhow::Result<Vec<String>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(items, "Review the suggested file updates".to_string());

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    match result {
        Ok(_) => {
            let accepted = app.list.selected_paths();
            info!("Accepted {} update(s)", accepted.len());
            Ok(accepted)
        }
        Err(err) => {
            warn!("Error during review: {}", err);
            Err(anyhow::anyhow!("Review cancelled: {}", err))
        }
    }
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        if app.list.selected_count() > 0 {
                            return Ok(());
                        } else {
                            return Err(anyhow::anyhow!("No updates selected"));
                        }
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Err(anyhow::anyhow!("Review cancelled"));
                    }
                    KeyCode::Char('a') => app.list.set_all(true),
                    KeyCode::Char('n') => app.list.set_all(false),
                    KeyCode::Char(' ') => app.list.toggle_selected(),
                    KeyCode::Down => app.list.next(),
                    KeyCode::Up => app.list.previous(),
                    KeyCode::Enter => {
                        if app.list.selected_count() > 0 {
                            return Ok(());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::marker_line;
    use std::fs;
    use tempfile::TempDir;

    fn items(paths: &[&str]) -> Vec<ReviewItem> {
        paths
            .iter()
            .map(|p| ReviewItem::new(p.to_string(), String::new()))
            .collect()
    }

    #[test]
    fn test_review_with_auto_accepts_all() {
        let accepted = review_updates(items(&["a.txt", "b.txt"]), false).unwrap();
        assert_eq!(accepted, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_review_with_empty_input() {
        assert!(review_updates(Vec::new(), true).unwrap().is_empty());
    }

    #[test]
    fn test_list_navigation_and_toggling() {
        let mut list = ReviewList::new(items(&["a", "b", "c"]));
        assert_eq!(list.selected_count(), 3);

        list.previous();
        assert_eq!(list.state.selected(), Some(2));
        list.next();
        assert_eq!(list.state.selected(), Some(0));

        list.next();
        list.toggle_selected();
        assert_eq!(list.selected_paths(), vec!["a", "c"]);

        list.set_all(false);
        assert_eq!(list.selected_count(), 0);
    }

    #[test]
    fn test_summarize_change() {
        assert_eq!(summarize_change("a\nb", "a\nb\nc", false), "2 → 3 lines");
        assert_eq!(summarize_change("x", "x", false), "unchanged");
        assert_eq!(summarize_change("", "one\ntwo", true), "new, 2 lines");
    }

    #[test]
    fn test_apply_review_discards_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();

        let mut filemap = Filemap::new(temp_dir.path());
        filemap
            .load_files(&["a.txt".to_string(), "b.txt".to_string()])
            .unwrap();
        let response = format!("{}\nA\n{}\nB\n", marker_line("a.txt"), marker_line("b.txt"));
        filemap.decode_from_output_text(&response).unwrap();

        let review = review_items(&filemap);
        assert_eq!(review.len(), 2);
        assert_eq!(review[0].summary, "1 → 1 lines");

        apply_review(&mut filemap, &["b.txt".to_string()]);
        assert_eq!(filemap.updated_paths(), vec!["b.txt".to_string()]);
    }
}
