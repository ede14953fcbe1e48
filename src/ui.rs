use std::io;
use std::time::{Duration as StdDuration, Instant};

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate};
use crossterm::event::{
	self, DisableBracketedPaste, EnableBracketedPaste, Event as CEvent, KeyCode, KeyEvent,
	KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{
	EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::warn;

use crate::clipboard::{PastedTodo, parse_paste};
use crate::domain::{ActivityRecord, DeadlineStatus, TodoItem};
use crate::report::Share;
use crate::storage::{KeyValueStore, SettingKey};
use crate::timefmt::{
	format_clock, format_duration, format_local_date, iso_date_only, local_clock_on_date,
	parse_iso_date,
	start_of_date,
};
use crate::tracker::{MoveDirection, TodoPatch, Tracker, TrackerError};

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);
const MIN_TICK_MILLIS: u64 = 100;

pub fn run_dashboard<S: KeyValueStore>(tracker: &mut Tracker<S>) -> Result<()> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	stdout.execute(EnableBracketedPaste)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, tracker);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

/// Fixed-rate redraw schedule for the running record's clock.
struct Ticker {
	interval: StdDuration,
	next: Instant,
}

impl Ticker {
	fn new(interval: StdDuration) -> Self {
		Self {
			interval,
			next: Instant::now() + interval,
		}
	}

	fn timeout(&self) -> StdDuration {
		self.next.saturating_duration_since(Instant::now())
	}

	/// Advances past every deadline that has already gone by.
	fn tick(&mut self) -> bool {
		let now = Instant::now();
		if now < self.next {
			return false;
		}
		while self.next <= now {
			self.next += self.interval;
		}
		true
	}
}

fn run_event_loop<S: KeyValueStore>(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	tracker: &mut Tracker<S>,
) -> Result<()> {
	let mut app = App::default();
	let interval = StdDuration::from_millis(tracker.config().tick_millis.max(MIN_TICK_MILLIS));
	let mut ticker = Ticker::new(interval);

	loop {
		let now = Local::now();
		let view = build_view(&app, tracker, &now);
		app.clamp_selection(&view);
		terminal.draw(|frame| draw_dashboard(frame, &app, &view))?;

		if event::poll(ticker.timeout())? {
			let should_quit = match event::read()? {
				CEvent::Key(key) if key.kind == KeyEventKind::Press => match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, tracker),
					InputMode::Select(_) => handle_select_key(&mut app, key.code, tracker),
					InputMode::Normal => handle_normal_key(&mut app, key, tracker, &view, &now),
				},
				CEvent::Paste(text) => {
					handle_paste(&mut app, tracker, &text);
					false
				}
				_ => false,
			};

			if should_quit {
				break;
			}
		}
		ticker.tick();
	}

	Ok(())
}

fn draw_dashboard(frame: &mut Frame, app: &App, view: &ViewModel) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(12), Constraint::Length(5)])
		.split(frame.area());

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage(34),
			Constraint::Percentage(36),
			Constraint::Percentage(30),
		])
		.split(layout[0]);

	let type_height = (view.type_rows.len() as u16).clamp(1, 10) + 2;
	let left = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(type_height), Constraint::Min(6)])
		.split(body[0]);
	let middle = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(6)])
		.split(body[1]);
	let right = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(8), Constraint::Length(9)])
		.split(body[2]);

	render_list_panel(
		frame,
		left[0],
		"Types",
		view.type_rows.clone(),
		app.type_index,
		app.focus == FocusPane::Types,
		"(no types, press a to add)",
	);
	render_list_panel(
		frame,
		left[1],
		"Todo",
		view.todo_rows.iter().map(|row| row.line.clone()).collect(),
		app.todo_index,
		app.focus == FocusPane::Todos,
		"(no todos, press a to add)",
	);

	let current = Paragraph::new(view.current.clone())
		.block(Block::default().borders(Borders::ALL).title("Current"));
	frame.render_widget(current, middle[0]);
	render_list_panel(
		frame,
		middle[1],
		"Today",
		view.history_rows.iter().map(|row| row.line.clone()).collect(),
		app.history_index,
		app.focus == FocusPane::History,
		"(nothing recorded today)",
	);

	let summary = Paragraph::new(view.summary.clone()).block(
		Block::default()
			.borders(Borders::ALL)
			.title(view.summary_title.clone())
			.border_style(border_style(app.focus == FocusPane::Summary)),
	);
	frame.render_widget(summary, right[0]);
	let subtotal = Paragraph::new(view.todo_detail.clone())
		.block(Block::default().borders(Borders::ALL).title("Todo subtotal"));
	frame.render_widget(subtotal, right[1]);

	render_footer(frame, layout[1], app, view);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_list_panel(
	frame: &mut Frame,
	area: Rect,
	title: &str,
	rows: Vec<Line<'static>>,
	selected: usize,
	focused: bool,
	empty_text: &str,
) {
	let mut state = ListState::default();
	if !rows.is_empty() && focused {
		state.select(Some(selected.min(rows.len() - 1)));
	}

	let items = if rows.is_empty() {
		vec![ListItem::new(empty_text.to_string())]
	} else {
		rows.into_iter().map(ListItem::new).collect()
	};
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(title.to_string())
				.border_style(border_style(focused)),
		)
		.highlight_style(
			Style::default()
				.bg(HIGHLIGHT_BACKGROUND_COLOR)
				.add_modifier(Modifier::BOLD),
		);

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App, view: &ViewModel) {
	let footer_lines = match &app.mode {
		InputMode::Normal => vec![
			Line::from(
				"Tab pane | j/k move | Enter start/resume | x finish | Alt+key start type | q quit",
			),
			Line::from(
				"a add | d delete | y type | t title | m memo | D deadline | g group | G groups \
					| K access key | h/l day | v details | s settings",
			),
			Line::from(format!("{} | storage {}", app.status, view.usage)),
		],
		InputMode::Prompt(prompt) => vec![
			Line::from(prompt.title.clone()),
			Line::from(format!("> {}", prompt.input)),
			Line::from("Enter submit | Esc cancel"),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from(format!(
				"Selected: {}",
				select
					.selected_option()
					.map(|option| option.label.as_str())
					.unwrap_or("(none)")
			)),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines)
		.block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(62, 55, frame.area());
	frame.render_widget(Clear, area);

	let items = if select.options.is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		select
			.options
			.iter()
			.map(|option| ListItem::new(option.label.clone()).style(option.style))
			.collect::<Vec<_>>()
	};

	let current = if select.options.is_empty() {
		0
	} else {
		select.selected.saturating_add(1)
	};
	let total = select.options.len();
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!("{} ({current}/{total})", select.title)),
		)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	if !select.options.is_empty() {
		state.select(Some(select.selected.min(select.options.len().saturating_sub(1))));
	}
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn build_view<S: KeyValueStore>(
	app: &App,
	tracker: &Tracker<S>,
	now: &DateTime<Local>,
) -> ViewModel {
	let current_record = tracker.current_record().map(|(_, record)| record);
	let current_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);

	let type_rows = tracker
		.types()
		.iter()
		.map(|kind| {
			let key = kind
				.access_key
				.as_ref()
				.map(|key| format!("[{key}] "))
				.unwrap_or_else(|| "    ".to_string());
			let is_current = current_record.is_some_and(|record| record.type_name() == kind.name);
			let style = if is_current { current_style } else { Style::default() };
			Line::from(vec![
				Span::styled(key, Style::default().fg(Color::DarkGray)),
				Span::styled(kind.name.clone(), style),
			])
		})
		.collect();

	let todo_rows = build_todo_rows(tracker, now, current_style);

	let current = match current_record {
		Some(record) => record_line(tracker, record, now),
		None => Line::from("(not started)"),
	};

	let history_rows = tracker
		.records_of_day(&start_of_date(now))
		.into_iter()
		.map(|(record_index, record)| HistoryRow {
			line: record_line(tracker, record, now),
			record_index,
		})
		.collect();

	let day_start = local_clock_on_date(&Local, app.selected_day, 0);
	let summary = tracker.daily_summary(&day_start, now);
	let detail = tracker.setting(SettingKey::DetailVisible);
	let include_bare = tracker.setting(SettingKey::NoTitleOrMemo);
	let mut summary_lines = vec![
		Line::from(format!("Total: {}", format_duration(summary.counted_seconds))),
		Line::from(""),
	];
	if summary.rows.is_empty() {
		summary_lines.push(Line::from("(no records)"));
	}
	for row in &summary.rows {
		let share = match row.share {
			Share::Percent(percent) => Span::raw(format!("[{percent}]")),
			Share::NotCounted => {
				Span::styled("[not counted]", Style::default().fg(Color::DarkGray))
			}
		};
		summary_lines.push(Line::from(vec![
			Span::styled(row.type_name.to_string(), Style::default().add_modifier(Modifier::BOLD)),
			Span::raw(" "),
			share,
			Span::raw(format!(" {}", format_duration(row.seconds))),
		]));
		if detail {
			for record in row.detail_records(include_bare) {
				summary_lines.push(Line::from(format!(
					"  {} ({}) {} {}",
					format_clock(&record.start().with_timezone(&Local)),
					format_duration(record.elapsed_seconds(now)),
					record.title().unwrap_or("-"),
					record.memo().unwrap_or("")
				)));
			}
		}
	}

	let todo_detail = app
		.selected_todo_index_in(&todo_rows)
		.map(|index| todo_detail_lines(tracker, index, now))
		.unwrap_or_else(|| vec![Line::from("(select a todo)")]);

	let usage = tracker.usage();

	ViewModel {
		type_rows,
		todo_rows,
		current,
		history_rows,
		summary: summary_lines,
		summary_title: format!("Summary {}", format_local_date(app.selected_day)),
		todo_detail,
		usage: format!(
			"{} / {} bytes ({})",
			usage.bytes_in_use,
			usage.quota_bytes,
			usage.percentage()
		),
	}
}

fn build_todo_rows<S: KeyValueStore>(
	tracker: &Tracker<S>,
	now: &DateTime<Local>,
	current_style: Style,
) -> Vec<TodoRow> {
	let subtotals = tracker.todo_subtotals(now);
	let use_deadline = tracker.setting(SettingKey::UseTodoDeadline);
	let todo_row = |index: usize, todo: &TodoItem| {
		let mut spans = Vec::new();
		if use_deadline {
			if let Some(deadline) = todo.deadline {
				let style = match todo.deadline_status(now) {
					Some(DeadlineStatus::Overdue) => Style::default().fg(Color::Red),
					Some(DeadlineStatus::Today) => Style::default().fg(Color::LightYellow),
					_ => Style::default().fg(Color::DarkGray),
				};
				spans.push(Span::styled(
					format!("{} ", iso_date_only(&deadline.with_timezone(&Local))),
					style,
				));
			}
		}
		let style = if tracker.is_current_todo(index) {
			current_style
		} else {
			Style::default()
		};
		spans.push(Span::styled(tracker.type_label(&todo.type_name), style));
		let title = if todo.title.is_empty() { "-" } else { todo.title.as_str() };
		let title = if todo.has_url_memo() {
			format!(" ({title})")
		} else {
			format!(" ({title}) {}", todo.memo.as_deref().unwrap_or(""))
		};
		spans.push(Span::styled(title, style));
		spans.push(Span::styled(
			format!(" {}", format_duration(subtotals[index].total_seconds)),
			Style::default().fg(Color::DarkGray),
		));
		TodoRow {
			line: Line::from(spans),
			todo_index: Some(index),
		}
	};

	if !tracker.setting(SettingKey::UseTodoGroup) {
		return tracker
			.todos()
			.iter()
			.enumerate()
			.map(|(index, todo)| todo_row(index, todo))
			.collect();
	}

	let mut rows = Vec::new();
	for bucket in tracker.grouped_todos() {
		rows.push(TodoRow {
			line: Line::from(Span::styled(
				format!("[{}] ({})", bucket.group.unwrap_or("ungrouped"), bucket.todos.len()),
				Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
			)),
			todo_index: None,
		});
		for (index, todo) in bucket.todos {
			rows.push(todo_row(index, todo));
		}
	}
	rows
}

fn todo_detail_lines<S: KeyValueStore>(
	tracker: &Tracker<S>,
	index: usize,
	now: &DateTime<Local>,
) -> Vec<Line<'static>> {
	let Some(todo) = tracker.todos().get(index) else {
		return Vec::new();
	};
	let subtotals = tracker.todo_subtotals(now);
	let subtotal = &subtotals[index];

	let mut lines = vec![Line::from(format!(
		"{} | total {}",
		if todo.title.is_empty() { "-" } else { todo.title.as_str() },
		format_duration(subtotal.total_seconds)
	))];
	if let Some(memo) = &todo.memo {
		lines.push(Line::from(memo.clone()));
	}
	for (day, seconds) in subtotal.by_day.iter().rev() {
		lines.push(Line::from(format!(
			"{} {}",
			format_local_date(*day),
			format_duration(*seconds)
		)));
	}
	lines
}

fn record_line<S: KeyValueStore>(
	tracker: &Tracker<S>,
	record: &ActivityRecord,
	now: &DateTime<Local>,
) -> Line<'static> {
	let end = record
		.end()
		.map(|end| format_clock(&end.with_timezone(&Local)))
		.unwrap_or_default();
	let mut spans = vec![
		Span::styled(
			format!("{}~{}", format_clock(&record.start().with_timezone(&Local)), end),
			Style::default().fg(Color::DarkGray),
		),
		Span::raw(format!(" ({}) ", format_duration(record.elapsed_seconds(now)))),
		Span::styled(
			tracker.type_label(record.type_name()),
			Style::default().add_modifier(Modifier::BOLD),
		),
	];
	if let Some(title) = record.title() {
		spans.push(Span::raw(format!(" | {title}")));
	}
	if let Some(memo) = record.memo() {
		spans.push(Span::styled(format!(" | {memo}"), Style::default().fg(Color::Gray)));
	}
	Line::from(spans)
}

fn handle_normal_key<S: KeyValueStore>(
	app: &mut App,
	key: KeyEvent,
	tracker: &mut Tracker<S>,
	view: &ViewModel,
	now: &DateTime<Local>,
) -> bool {
	if key.modifiers.contains(KeyModifiers::ALT) {
		if let KeyCode::Char(value) = key.code {
			app.status = report(
				tracker
					.start_access_key(&value.to_string(), now)
					.map(|record| record.type_name().to_string()),
				|name| format!("started: {name}"),
			);
		}
		return false;
	}

	match key.code {
		KeyCode::Char('q') | KeyCode::Esc => true,
		KeyCode::Tab => {
			app.focus = app.focus.next();
			false
		}
		KeyCode::BackTab => {
			app.focus = app.focus.prev();
			false
		}
		KeyCode::Up | KeyCode::Char('k') => {
			app.move_selection(-1, view);
			false
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.move_selection(1, view);
			false
		}
		KeyCode::Left | KeyCode::Char('h') => {
			app.selected_day -= Duration::days(1);
			false
		}
		KeyCode::Right | KeyCode::Char('l') => {
			app.selected_day += Duration::days(1);
			false
		}
		KeyCode::Enter => {
			app.status = match app.focus {
				FocusPane::Types => {
					let selected =
						tracker.types().get(app.type_index).map(|kind| kind.name.clone());
					match selected {
						Some(name) => {
							report(tracker.start_type(&name, now), |_| format!("started: {name}"))
						}
						None => "Add a type first".to_string(),
					}
				}
				FocusPane::Todos => match app.selected_todo_index(view) {
					Some(index) => report(tracker.start_todo(index, now), |record| {
						format!("started: {}", record.title().unwrap_or(record.type_name()))
					}),
					None => "Select a todo".to_string(),
				},
				FocusPane::History => match app.selected_record_index(view) {
					Some(index) => report(tracker.resume_record(index, now), |record| {
						format!("resumed: {}", record.type_name())
					}),
					None => "Select a record".to_string(),
				},
				FocusPane::Summary => {
					app.selected_day = now.date_naive();
					"Back to today".to_string()
				}
			};
			false
		}
		KeyCode::Char('x') => {
			app.status = report(tracker.finish_current(now), |_| "finished".to_string());
			false
		}
		KeyCode::Char('a') => {
			match app.focus {
				FocusPane::Types => {
					let prompt = PromptState::new("Type name", PromptKind::AddTypeName);
					app.mode = InputMode::Prompt(prompt);
				}
				FocusPane::Todos => {
					let select = build_type_select(
						tracker,
						None,
						"Type of new todo",
						SelectKind::AddTodoType,
					);
					match select {
						Some(select) => app.mode = InputMode::Select(select),
						None => app.status = "Add a type first".to_string(),
					}
				}
				_ => app.status = "Focus Types or Todo to add".to_string(),
			}
			false
		}
		KeyCode::Char('d') => {
			let target = match app.focus {
				FocusPane::Types => tracker
					.types()
					.get(app.type_index)
					.map(|kind| (DeleteTarget::Type(app.type_index), kind.name.clone())),
				FocusPane::Todos => app.selected_todo_index(view).and_then(|index| {
					tracker
						.todos()
						.get(index)
						.map(|todo| (DeleteTarget::Todo(index), todo.title.clone()))
				}),
				_ => None,
			};
			match target {
				Some((target, label)) => {
					app.mode = InputMode::Select(build_delete_confirm(target, &label))
				}
				None => app.status = "Nothing selected to delete".to_string(),
			}
			false
		}
		KeyCode::Char('y') => {
			let select = match app.focus {
				FocusPane::History => app.selected_record_index(view).and_then(|index| {
					let current = tracker.records()[index].type_name().to_string();
					let kind = SelectKind::RecordType { index };
					build_type_select(tracker, Some(&current), "Record type", kind)
				}),
				FocusPane::Todos => app.selected_todo_index(view).and_then(|index| {
					let current = tracker.todos()[index].type_name.clone();
					let kind = SelectKind::TodoType { index };
					build_type_select(tracker, Some(&current), "Todo type", kind)
				}),
				_ => None,
			};
			match select {
				Some(select) => app.mode = InputMode::Select(select),
				None => app.status = "Select a record or todo".to_string(),
			}
			false
		}
		KeyCode::Char('t') | KeyCode::Char('m') => {
			let is_title = key.code == KeyCode::Char('t');
			let prompt = match app.focus {
				FocusPane::History => app.selected_record_index(view).map(|index| {
					let record = &tracker.records()[index];
					if is_title {
						let kind = PromptKind::RecordTitle { index };
						PromptState::with_input("Record title", kind, record.title())
					} else {
						let kind = PromptKind::RecordMemo { index };
						PromptState::with_input("Record memo", kind, record.memo())
					}
				}),
				FocusPane::Todos => app.selected_todo_index(view).map(|index| {
					let todo = &tracker.todos()[index];
					if is_title {
						let kind = PromptKind::TodoTitle { index };
						PromptState::with_input("Todo title", kind, Some(todo.title.as_str()))
					} else {
						let kind = PromptKind::TodoMemo { index };
						PromptState::with_input("Todo memo / URL", kind, todo.memo.as_deref())
					}
				}),
				_ => None,
			};
			match prompt {
				Some(prompt) => app.mode = InputMode::Prompt(prompt),
				None => app.status = "Select a record or todo".to_string(),
			}
			false
		}
		KeyCode::Char('D') => {
			match app.selected_todo_index(view).filter(|_| app.focus == FocusPane::Todos) {
				Some(index) => {
					let current = tracker.todos()[index]
						.deadline
						.map(|deadline| iso_date_only(&deadline.with_timezone(&Local)));
					app.mode = InputMode::Prompt(PromptState::with_input(
						"Deadline (YYYY-MM-DD, empty clears)",
						PromptKind::TodoDeadline { index },
						current.as_deref(),
					));
				}
				None => app.status = "Select a todo".to_string(),
			}
			false
		}
		KeyCode::Char('g') => {
			match app.selected_todo_index(view).filter(|_| app.focus == FocusPane::Todos) {
				Some(index) => {
					app.mode = InputMode::Select(build_todo_group_select(tracker, index))
				}
				None => app.status = "Select a todo".to_string(),
			}
			false
		}
		KeyCode::Char('G') => {
			app.mode = InputMode::Select(build_group_manager(tracker));
			false
		}
		KeyCode::Char('K') => {
			match tracker.types().get(app.type_index).filter(|_| app.focus == FocusPane::Types) {
				Some(kind) => {
					app.mode = InputMode::Prompt(PromptState::with_input(
						format!("Access key for {} (empty clears)", kind.name),
						PromptKind::TypeKey { index: app.type_index },
						kind.access_key.as_deref(),
					));
				}
				None => app.status = "Select a type".to_string(),
			}
			false
		}
		KeyCode::Char('v') => {
			let value = !tracker.setting(SettingKey::DetailVisible);
			app.status = report(tracker.set_setting(SettingKey::DetailVisible, value), |_| {
				format!("details {}", if value { "shown" } else { "hidden" })
			});
			false
		}
		KeyCode::Char('s') => {
			app.mode = InputMode::Select(build_settings_select(tracker));
			false
		}
		_ => false,
	}
}

fn handle_paste<S: KeyValueStore>(app: &mut App, tracker: &mut Tracker<S>, text: &str) {
	if let InputMode::Prompt(prompt) = &mut app.mode {
		prompt.input.push_str(text.trim_end_matches(['\r', '\n']));
		return;
	}
	if matches!(app.mode, InputMode::Select(_)) {
		return;
	}

	if !tracker.setting(SettingKey::ClipboardToTodo) {
		app.status = "Paste ignored: enable 'clipboard-to-todo' in settings".to_string();
		return;
	}
	// Terminals deliver plain text only, so links come through as bare text.
	let paste = parse_paste(None, text);
	if paste.text.is_empty() {
		return;
	}
	let title = format!("Type for pasted todo: {}", paste.text);
	match build_type_select(tracker, None, title, SelectKind::PasteType { paste }) {
		Some(select) => app.mode = InputMode::Select(select),
		None => app.status = "Add a type first".to_string(),
	}
}

fn handle_prompt_key<S: KeyValueStore>(
	app: &mut App,
	code: KeyCode,
	tracker: &mut Tracker<S>,
) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(prompt.clone(), tracker) {
				Ok(PromptOutcome::NextPrompt(next_prompt)) => {
					app.mode = InputMode::Prompt(next_prompt)
				}
				Ok(PromptOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					warn!(error = %err, "prompt rejected");
					app.mode = InputMode::Prompt(prompt);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key<S: KeyValueStore>(
	app: &mut App,
	code: KeyCode,
	tracker: &mut Tracker<S>,
) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			match submit_select(select.clone(), tracker) {
				Ok(SelectOutcome::NextPrompt(prompt)) => app.mode = InputMode::Prompt(prompt),
				Ok(SelectOutcome::NextSelect(next_select)) => {
					app.mode = InputMode::Select(next_select)
				}
				Ok(SelectOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					warn!(error = %err, "selection rejected");
					app.mode = InputMode::Select(select);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn submit_prompt<S: KeyValueStore>(
	prompt: PromptState,
	tracker: &mut Tracker<S>,
) -> Result<PromptOutcome, TrackerError> {
	match prompt.kind {
		PromptKind::AddTypeName => {
			let name = required_text(&prompt.input, "type name")?;
			Ok(PromptOutcome::NextPrompt(PromptState::new(
				"Access key (optional, one character)",
				PromptKind::AddTypeKey { name },
			)))
		}
		PromptKind::AddTypeKey { name } => {
			tracker.add_type(&name, optional_text(&prompt.input).as_deref())?;
			Ok(PromptOutcome::Done(format!("added type: {name}")))
		}
		PromptKind::TypeKey { index } => {
			tracker.set_type_access_key(index, optional_text(&prompt.input).as_deref())?;
			Ok(PromptOutcome::Done("updated access key".to_string()))
		}
		PromptKind::AddTodoTitle { type_name } => Ok(PromptOutcome::NextPrompt(PromptState::new(
			"Todo memo / URL (optional)",
			PromptKind::AddTodoMemo {
				type_name,
				title: prompt.input.trim().to_string(),
			},
		))),
		PromptKind::AddTodoMemo { type_name, title } => {
			let todo = TodoItem::new(type_name, title.clone(), optional_text(&prompt.input));
			tracker.add_todo(todo)?;
			Ok(PromptOutcome::Done(format!("added todo: {title}")))
		}
		PromptKind::RecordTitle { index } => {
			tracker.set_record_title(index, optional_text(&prompt.input))?;
			Ok(PromptOutcome::Done("updated title".to_string()))
		}
		PromptKind::RecordMemo { index } => {
			tracker.set_record_memo(index, optional_text(&prompt.input))?;
			Ok(PromptOutcome::Done("updated memo".to_string()))
		}
		PromptKind::TodoTitle { index } => {
			let patch = TodoPatch {
				title: Some(prompt.input.trim().to_string()),
				..TodoPatch::default()
			};
			tracker.update_todo(index, patch)?;
			Ok(PromptOutcome::Done("updated todo title".to_string()))
		}
		PromptKind::TodoMemo { index } => {
			let patch = TodoPatch {
				memo: Some(optional_text(&prompt.input)),
				..TodoPatch::default()
			};
			tracker.update_todo(index, patch)?;
			Ok(PromptOutcome::Done("updated todo memo".to_string()))
		}
		PromptKind::TodoDeadline { index } => {
			let input = prompt.input.trim();
			if input.is_empty() {
				tracker.set_todo_deadline(index, None, &Local)?;
				return Ok(PromptOutcome::Done("cleared deadline".to_string()));
			}
			match parse_iso_date(input) {
				Some(day) => {
					tracker.set_todo_deadline(index, Some(day), &Local)?;
					Ok(PromptOutcome::Done(format!("deadline set to {}", format_local_date(day))))
				}
				None => Ok(PromptOutcome::Done(format!("ignored invalid date '{input}'"))),
			}
		}
		PromptKind::AddGroupName => {
			let name = required_text(&prompt.input, "group name")?;
			tracker.add_group(&name)?;
			Ok(PromptOutcome::Done(format!("added group: {name}")))
		}
	}
}

fn submit_select<S: KeyValueStore>(
	select: SelectState,
	tracker: &mut Tracker<S>,
) -> Result<SelectOutcome, TrackerError> {
	let Some(selected_value) = select.selected_option().map(|option| option.value.clone()) else {
		return Ok(SelectOutcome::Done("nothing selected".to_string()));
	};

	match select.kind {
		SelectKind::AddTodoType => {
			let type_name = selected_value.unwrap_or_default();
			Ok(SelectOutcome::NextPrompt(PromptState::new(
				format!("Todo title ({type_name})"),
				PromptKind::AddTodoTitle { type_name },
			)))
		}
		SelectKind::PasteType { paste } => {
			let title = paste.text.clone();
			tracker.add_todo_from_paste(paste, &selected_value.unwrap_or_default())?;
			Ok(SelectOutcome::Done(format!("added todo: {title}")))
		}
		SelectKind::RecordType { index } => {
			tracker.set_record_type(index, &selected_value.unwrap_or_default())?;
			Ok(SelectOutcome::Done("updated record type".to_string()))
		}
		SelectKind::TodoType { index } => {
			let patch = TodoPatch {
				type_name: selected_value,
				..TodoPatch::default()
			};
			tracker.update_todo(index, patch)?;
			Ok(SelectOutcome::Done("updated todo type".to_string()))
		}
		SelectKind::TodoGroup { index } => {
			let patch = TodoPatch {
				group: Some(selected_value),
				..TodoPatch::default()
			};
			tracker.update_todo(index, patch)?;
			Ok(SelectOutcome::Done("updated todo group".to_string()))
		}
		SelectKind::ConfirmDelete { target } => {
			if selected_value.as_deref() != Some("delete") {
				return Ok(SelectOutcome::Done("Delete cancelled".to_string()));
			}
			let message = match target {
				DeleteTarget::Type(index) => {
					format!("deleted type: {}", tracker.delete_type(index)?.name)
				}
				DeleteTarget::Todo(index) => {
					format!("deleted todo: {}", tracker.delete_todo(index)?.title)
				}
				DeleteTarget::Group(index) => {
					format!("deleted group: {}", tracker.delete_group(index)?)
				}
			};
			Ok(SelectOutcome::Done(message))
		}
		SelectKind::GroupManager => match selected_value.as_deref() {
			Some("add") => Ok(SelectOutcome::NextPrompt(PromptState::new(
				"Group name",
				PromptKind::AddGroupName,
			))),
			Some(raw) => match raw.parse::<usize>() {
				Ok(index) => Ok(SelectOutcome::NextSelect(build_group_actions(tracker, index))),
				Err(_) => Ok(SelectOutcome::Done("unknown group".to_string())),
			},
			None => Ok(SelectOutcome::Done("Groups closed".to_string())),
		},
		SelectKind::GroupAction { index } => match selected_value.as_deref() {
			Some("up") => {
				tracker.move_group(index, MoveDirection::Up)?;
				Ok(SelectOutcome::NextSelect(build_group_manager(tracker)))
			}
			Some("down") => {
				tracker.move_group(index, MoveDirection::Down)?;
				Ok(SelectOutcome::NextSelect(build_group_manager(tracker)))
			}
			Some("delete") => {
				let name = tracker.groups().get(index).cloned().unwrap_or_default();
				let confirm = build_delete_confirm(DeleteTarget::Group(index), &name);
				Ok(SelectOutcome::NextSelect(confirm))
			}
			_ => Ok(SelectOutcome::NextSelect(build_group_manager(tracker))),
		},
		SelectKind::Settings => {
			let Some(key) = selected_value.and_then(|raw| raw.parse::<SettingKey>().ok()) else {
				return Ok(SelectOutcome::Done("Settings closed".to_string()));
			};
			let value = !tracker.setting(key);
			tracker.set_setting(key, value)?;
			Ok(SelectOutcome::NextSelect(build_settings_select(tracker)))
		}
	}
}

fn build_type_select<S: KeyValueStore>(
	tracker: &Tracker<S>,
	current: Option<&str>,
	title: impl Into<String>,
	kind: SelectKind,
) -> Option<SelectState> {
	let names = match current {
		Some(current) => tracker.type_choices(current),
		None => tracker.types().iter().map(|kind| kind.name.clone()).collect(),
	};
	if names.is_empty() {
		return None;
	}

	let mut select = SelectState::new(
		title,
		kind,
		names
			.into_iter()
			.map(|name| SelectOption::new(tracker.type_label(&name), Some(name), Style::default()))
			.collect(),
	);
	if let Some(current) = current {
		select.selected = select
			.options
			.iter()
			.position(|option| option.value.as_deref() == Some(current))
			.unwrap_or(0);
	}
	Some(select)
}

fn build_todo_group_select<S: KeyValueStore>(tracker: &Tracker<S>, index: usize) -> SelectState {
	let ungrouped = SelectOption::new("(ungrouped)", None, Style::default().fg(Color::Gray));
	let mut options = vec![ungrouped];
	for group in tracker.groups() {
		options.push(SelectOption::new(group.clone(), Some(group.clone()), Style::default()));
	}
	let mut select = SelectState::new("Todo group", SelectKind::TodoGroup { index }, options);
	let current = tracker.todos().get(index).and_then(|todo| todo.group.clone());
	select.selected = select
		.options
		.iter()
		.position(|option| option.value == current)
		.unwrap_or(0);
	select
}

fn build_group_manager<S: KeyValueStore>(tracker: &Tracker<S>) -> SelectState {
	let mut options = tracker
		.groups()
		.iter()
		.enumerate()
		.map(|(index, group)| {
			SelectOption::new(group.clone(), Some(index.to_string()), Style::default())
		})
		.collect::<Vec<_>>();
	options.push(SelectOption::new(
		"+ add group",
		Some("add".to_string()),
		Style::default().fg(Color::Green),
	));
	options.push(SelectOption::new("Close", None, Style::default().fg(Color::Gray)));
	SelectState::new("Todo groups", SelectKind::GroupManager, options)
}

fn build_group_actions<S: KeyValueStore>(tracker: &Tracker<S>, index: usize) -> SelectState {
	let name = tracker.groups().get(index).cloned().unwrap_or_default();
	let options = vec![
		SelectOption::new("Move up", Some("up".to_string()), Style::default()),
		SelectOption::new("Move down", Some("down".to_string()), Style::default()),
		SelectOption::new("Delete", Some("delete".to_string()), Style::default().fg(Color::Red)),
		SelectOption::new("Back", None, Style::default().fg(Color::Gray)),
	];
	SelectState::new(format!("Group: {name}"), SelectKind::GroupAction { index }, options)
}

fn build_delete_confirm(target: DeleteTarget, label: &str) -> SelectState {
	let options = vec![
		SelectOption::new("Cancel", None, Style::default().fg(Color::Gray)),
		SelectOption::new("Delete", Some("delete".to_string()), Style::default().fg(Color::Red)),
	];
	SelectState::new(format!("Delete '{label}'?"), SelectKind::ConfirmDelete { target }, options)
}

fn build_settings_select<S: KeyValueStore>(tracker: &Tracker<S>) -> SelectState {
	let mut options = SettingKey::ALL
		.into_iter()
		.map(|key| {
			let enabled = tracker.setting(key);
			SelectOption::new(
				format!("[{}] {}", if enabled { "x" } else { " " }, key.label()),
				Some(key.name().to_string()),
				Style::default(),
			)
		})
		.collect::<Vec<_>>();
	options.push(SelectOption::new("Close", None, Style::default().fg(Color::Gray)));
	SelectState::new("Settings", SelectKind::Settings, options)
}

/// Status text for a command result, logging failures.
fn report<T>(result: Result<T, TrackerError>, message: impl FnOnce(T) -> String) -> String {
	match result {
		Ok(value) => message(value),
		Err(err) => {
			warn!(error = %err, "command failed");
			format!("error: {err}")
		}
	}
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

fn required_text(input: &str, field_name: &'static str) -> Result<String, TrackerError> {
	let value = input.trim();
	if value.is_empty() {
		Err(TrackerError::EmptyName(field_name))
	} else {
		Ok(value.to_string())
	}
}

fn optional_text(input: &str) -> Option<String> {
	let value = input.trim();
	if value.is_empty() {
		None
	} else {
		Some(value.to_string())
	}
}

#[derive(Debug, Clone)]
enum PromptOutcome {
	NextPrompt(PromptState),
	Done(String),
}

#[derive(Debug, Clone)]
enum SelectOutcome {
	NextPrompt(PromptState),
	NextSelect(SelectState),
	Done(String),
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind) -> Self {
		Self::with_input(title, kind, None)
	}

	fn with_input(title: impl Into<String>, kind: PromptKind, input: Option<&str>) -> Self {
		Self {
			title: title.into(),
			input: input.unwrap_or_default().to_string(),
			kind,
		}
	}
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		if self.options.is_empty() {
			self.selected = 0;
			return;
		}

		if delta > 0 {
			self.selected = (self.selected + delta as usize).min(self.options.len() - 1);
		} else {
			self.selected = self.selected.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	value: Option<String>,
	style: Style,
}

impl SelectOption {
	fn new(label: impl Into<String>, value: Option<String>, style: Style) -> Self {
		Self {
			label: label.into(),
			value,
			style,
		}
	}
}

#[derive(Debug, Clone)]
enum PromptKind {
	AddTypeName,
	AddTypeKey { name: String },
	TypeKey { index: usize },
	AddTodoTitle { type_name: String },
	AddTodoMemo { type_name: String, title: String },
	RecordTitle { index: usize },
	RecordMemo { index: usize },
	TodoTitle { index: usize },
	TodoMemo { index: usize },
	TodoDeadline { index: usize },
	AddGroupName,
}

#[derive(Debug, Clone, Copy)]
enum DeleteTarget {
	Type(usize),
	Todo(usize),
	Group(usize),
}

#[derive(Debug, Clone)]
enum SelectKind {
	AddTodoType,
	PasteType { paste: PastedTodo },
	RecordType { index: usize },
	TodoType { index: usize },
	TodoGroup { index: usize },
	ConfirmDelete { target: DeleteTarget },
	GroupManager,
	GroupAction { index: usize },
	Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusPane {
	Types,
	Todos,
	History,
	Summary,
}

impl FocusPane {
	fn next(self) -> Self {
		match self {
			FocusPane::Types => FocusPane::Todos,
			FocusPane::Todos => FocusPane::History,
			FocusPane::History => FocusPane::Summary,
			FocusPane::Summary => FocusPane::Types,
		}
	}

	fn prev(self) -> Self {
		match self {
			FocusPane::Types => FocusPane::Summary,
			FocusPane::Todos => FocusPane::Types,
			FocusPane::History => FocusPane::Todos,
			FocusPane::Summary => FocusPane::History,
		}
	}
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

#[derive(Debug, Clone)]
struct App {
	focus: FocusPane,
	selected_day: NaiveDate,
	type_index: usize,
	todo_index: usize,
	history_index: usize,
	mode: InputMode,
	status: String,
}

impl Default for App {
	fn default() -> Self {
		Self {
			focus: FocusPane::Types,
			selected_day: Local::now().date_naive(),
			type_index: 0,
			todo_index: 0,
			history_index: 0,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
		}
	}
}

impl App {
	fn clamp_selection(&mut self, view: &ViewModel) {
		self.type_index = clamp_index(self.type_index, view.type_rows.len());
		self.todo_index = clamp_index(self.todo_index, view.todo_rows.len());
		self.history_index = clamp_index(self.history_index, view.history_rows.len());
	}

	fn move_selection(&mut self, delta: i32, view: &ViewModel) {
		let (index, len) = match self.focus {
			FocusPane::Types => (&mut self.type_index, view.type_rows.len()),
			FocusPane::Todos => (&mut self.todo_index, view.todo_rows.len()),
			FocusPane::History => (&mut self.history_index, view.history_rows.len()),
			FocusPane::Summary => {
				// Up/down page through days in the summary.
				self.selected_day += Duration::days(delta.into());
				return;
			}
		};

		if delta > 0 {
			*index = clamp_index(*index + delta as usize, len);
		} else {
			*index = index.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_todo_index(&self, view: &ViewModel) -> Option<usize> {
		self.selected_todo_index_in(&view.todo_rows)
	}

	fn selected_todo_index_in(&self, rows: &[TodoRow]) -> Option<usize> {
		rows.get(self.todo_index).and_then(|row| row.todo_index)
	}

	fn selected_record_index(&self, view: &ViewModel) -> Option<usize> {
		view.history_rows.get(self.history_index).map(|row| row.record_index)
	}
}

fn clamp_index(index: usize, len: usize) -> usize {
	if len == 0 { 0 } else { index.min(len - 1) }
}

struct ViewModel {
	type_rows: Vec<Line<'static>>,
	todo_rows: Vec<TodoRow>,
	current: Line<'static>,
	history_rows: Vec<HistoryRow>,
	summary: Vec<Line<'static>>,
	summary_title: String,
	todo_detail: Vec<Line<'static>>,
	usage: String,
}

struct TodoRow {
	line: Line<'static>,
	/// `None` for group header rows.
	todo_index: Option<usize>,
}

struct HistoryRow {
	line: Line<'static>,
	record_index: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ticker_skips_missed_deadlines() {
		let mut ticker = Ticker::new(StdDuration::from_secs(1));
		ticker.next = Instant::now() - StdDuration::from_millis(3500);
		assert!(ticker.tick());
		assert!(ticker.next > Instant::now());
		assert!(!ticker.tick());
		assert!(ticker.timeout() <= StdDuration::from_secs(1));
	}

	#[test]
	fn select_moves_within_bounds() {
		let options = vec![
			SelectOption::new("a", None, Style::default()),
			SelectOption::new("b", Some("b".to_string()), Style::default()),
		];
		let mut select = SelectState::new("t", SelectKind::Settings, options);
		select.move_selection(-1);
		assert_eq!(select.selected, 0);
		select.move_selection(5);
		assert_eq!(select.selected, 1);
		assert_eq!(select.selected_option().and_then(|option| option.value.as_deref()), Some("b"));
	}

	#[test]
	fn prompt_text_helpers_trim() {
		assert!(matches!(
			required_text("  ", "type name"),
			Err(TrackerError::EmptyName("type name"))
		));
		assert_eq!(required_text(" dev ", "type name").unwrap(), "dev");
		assert_eq!(optional_text(" "), None);
		assert_eq!(optional_text(" memo "), Some("memo".to_string()));
	}
}
