mod clipboard;
mod config;
mod domain;
mod logging;
mod report;
mod storage;
mod timefmt;
mod tracker;
mod ui;

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing::level_filters::LevelFilter;

use crate::clipboard::parse_paste;
use crate::config::{load_config, resolve_store_path, state_dir};
use crate::domain::{DeadlineStatus, TodoItem};
use crate::logging::enable_logging;
use crate::report::Share;
use crate::storage::{JsonFileStore, SettingKey};
use crate::timefmt::{
	format_clock, format_duration, format_local_date, iso_date_only, parse_iso_date, start_of_date,
};
use crate::tracker::{MoveDirection, TodoPatch, Tracker};
use crate::ui::run_dashboard;

#[derive(Debug, Parser)]
#[command(name = "time-tracker", version, about = "Personal time tracker")]
struct Cli {
	#[arg(long, help = "Store file. Defaults to $TIME_TRACKER_STORE or the state directory")]
	store: Option<PathBuf>,
	#[arg(long, help = "Config file. Defaults to config.toml in the state directory")]
	config: Option<PathBuf>,
	#[arg(long, help = "Also print logs to stderr")]
	log: bool,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	#[command(about = "Create the store file if it does not exist")]
	Init,
	#[command(about = "Open the interactive dashboard")]
	Dashboard,
	#[command(about = "List types")]
	Types,
	AddType {
		#[arg(long)]
		name: String,
		#[arg(long)]
		key: Option<String>,
	},
	SetKey {
		#[arg(long)]
		index: usize,
		#[arg(long, help = "New access key; omit to clear")]
		key: Option<String>,
	},
	RemoveType {
		#[arg(long)]
		index: usize,
		#[arg(long)]
		yes: bool,
	},
	#[command(about = "Start a record of a type, by name or access key")]
	Start {
		#[arg(long = "type", conflicts_with = "key", required_unless_present = "key")]
		type_name: Option<String>,
		#[arg(long)]
		key: Option<String>,
	},
	StartTodo {
		#[arg(long)]
		index: usize,
	},
	#[command(about = "Start a new record copying a past one")]
	Resume {
		#[arg(long)]
		index: usize,
	},
	Stop,
	#[command(about = "Edit a record's type, title or memo")]
	Edit {
		#[arg(long)]
		index: usize,
		#[arg(long = "type")]
		type_name: Option<String>,
		#[arg(long)]
		title: Option<String>,
		#[arg(long)]
		memo: Option<String>,
	},
	#[command(about = "List records of a day (YYYY-MM-DD, default today)")]
	Records {
		#[arg(long)]
		day: Option<String>,
	},
	Todos {
		#[arg(long, help = "Show per-day subtotals")]
		detail: bool,
	},
	AddTodo {
		#[arg(long = "type")]
		type_name: String,
		#[arg(long, default_value = "")]
		title: String,
		#[arg(long)]
		memo: Option<String>,
		#[arg(long)]
		group: Option<String>,
		#[arg(long)]
		deadline: Option<String>,
	},
	EditTodo {
		#[arg(long)]
		index: usize,
		#[arg(long = "type")]
		type_name: Option<String>,
		#[arg(long)]
		title: Option<String>,
		#[arg(long)]
		memo: Option<String>,
		#[arg(long, help = "Group name; empty string ungroups")]
		group: Option<String>,
		#[arg(long, help = "YYYY-MM-DD; empty string clears")]
		deadline: Option<String>,
	},
	RemoveTodo {
		#[arg(long)]
		index: usize,
		#[arg(long)]
		yes: bool,
	},
	#[command(about = "Add a todo from pasted text or HTML")]
	Paste {
		#[arg(long = "type")]
		type_name: String,
		#[arg(long, help = "Plain text; read from stdin when omitted")]
		text: Option<String>,
		#[arg(long, help = "File holding the HTML flavour of the paste")]
		html: Option<PathBuf>,
	},
	Groups,
	AddGroup {
		#[arg(long)]
		name: String,
	},
	RemoveGroup {
		#[arg(long)]
		index: usize,
		#[arg(long)]
		yes: bool,
	},
	MoveGroup {
		#[arg(long)]
		index: usize,
		#[arg(long, conflicts_with = "down", required_unless_present = "down")]
		up: bool,
		#[arg(long)]
		down: bool,
	},
	#[command(about = "Per-type totals of a day (YYYY-MM-DD, default today)")]
	Summary {
		#[arg(long)]
		day: Option<String>,
	},
	#[command(about = "Show settings, or set one")]
	Setting {
		key: Option<SettingKey>,
		value: Option<bool>,
	},
	#[command(about = "Show store size against its quota")]
	Usage,
}

fn main() {
	if let Err(err) = run() {
		error!("{err:?}");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

fn run() -> Result<()> {
	let cli = Cli::parse();

	let log_level = cli.log.then_some(LevelFilter::DEBUG);
	enable_logging(&state_dir(), log_level, cli.log).context("failed to set up logging")?;

	let config = load_config(cli.config.as_deref())?;
	let store_path = resolve_store_path(cli.store);
	let store = JsonFileStore::open(&store_path)
		.with_context(|| format!("failed to open store {}", store_path.display()))?;
	let mut tracker = Tracker::open(store, config, &Local);
	let now = Local::now();

	match cli.command.unwrap_or(Command::Dashboard) {
		Command::Init => {
			tracker.store().flush()?;
			println!("initialized store at {}", tracker.store().path().display());
		}
		Command::Dashboard => {
			run_dashboard(&mut tracker)?;
		}
		Command::Types => print_types(&tracker),
		Command::AddType { name, key } => {
			tracker.add_type(&name, key.as_deref())?;
			println!("added type {name}");
		}
		Command::SetKey { index, key } => {
			tracker.set_type_access_key(to_index(index)?, key.as_deref())?;
			println!("updated access key");
		}
		Command::RemoveType { index, yes } => {
			let index = to_index(index)?;
			let Some(kind) = tracker.types().get(index) else {
				bail!("type #{} does not exist", index + 1);
			};
			if yes || confirm(&format!("delete type '{}'?", kind.name))? {
				let removed = tracker.delete_type(index)?;
				println!("deleted type {}", removed.name);
			}
		}
		Command::Start { type_name, key } => {
			let record = match (type_name, key) {
				(Some(name), _) => tracker.start_type(&name, &now)?,
				(None, Some(key)) => tracker.start_access_key(&key, &now)?,
				(None, None) => bail!("pass --type or --key"),
			};
			println!("started {}", record.type_name());
		}
		Command::StartTodo { index } => {
			let record = tracker.start_todo(to_index(index)?, &now)?;
			println!("started {} ({})", record.type_name(), record.title().unwrap_or("-"));
		}
		Command::Resume { index } => {
			let record = tracker.resume_record(to_index(index)?, &now)?;
			println!("resumed {}", record.type_name());
		}
		Command::Stop => {
			tracker.finish_current(&now)?;
			println!("stopped");
		}
		Command::Edit {
			index,
			type_name,
			title,
			memo,
		} => {
			let index = to_index(index)?;
			if let Some(type_name) = type_name {
				tracker.set_record_type(index, &type_name)?;
			}
			if let Some(title) = title {
				tracker.set_record_title(index, Some(title))?;
			}
			if let Some(memo) = memo {
				tracker.set_record_memo(index, Some(memo))?;
			}
			println!("updated record #{}", index + 1);
		}
		Command::Records { day } => {
			print_records(&tracker, &day_start(day.as_deref(), &now)?, &now)
		}
		Command::Todos { detail } => print_todos(&tracker, &now, detail),
		Command::AddTodo {
			type_name,
			title,
			memo,
			group,
			deadline,
		} => {
			let mut todo = TodoItem::new(type_name, title, memo);
			todo.group = group.filter(|group| !group.is_empty());
			tracker.add_todo(todo)?;
			if let Some(deadline) = deadline.as_deref().and_then(parse_iso_date) {
				tracker.set_todo_deadline(tracker.todos().len() - 1, Some(deadline), &Local)?;
			}
			println!("added todo #{}", tracker.todos().len());
		}
		Command::EditTodo {
			index,
			type_name,
			title,
			memo,
			group,
			deadline,
		} => {
			let index = to_index(index)?;
			tracker.update_todo(
				index,
				TodoPatch {
					type_name,
					title,
					memo: memo.map(Some),
					group: group.map(Some),
				},
			)?;
			match deadline.as_deref().map(str::trim) {
				Some("") => tracker.set_todo_deadline(index, None, &Local)?,
				Some(raw) => match parse_iso_date(raw) {
					Some(day) => tracker.set_todo_deadline(index, Some(day), &Local)?,
					None => eprintln!("warning: ignoring invalid deadline '{raw}'"),
				},
				None => {}
			}
			println!("updated todo #{}", index + 1);
		}
		Command::RemoveTodo { index, yes } => {
			let index = to_index(index)?;
			let Some(todo) = tracker.todos().get(index) else {
				bail!("todo #{} does not exist", index + 1);
			};
			if yes || confirm(&format!("delete todo '{}'?", todo.title))? {
				let removed = tracker.delete_todo(index)?;
				println!("deleted todo {}", removed.title);
			}
		}
		Command::Paste {
			type_name,
			text,
			html,
		} => {
			let text = match text {
				Some(text) => text,
				None => {
					let mut buffer = String::new();
					io::stdin().read_to_string(&mut buffer)?;
					buffer
				}
			};
			let html = html
				.map(|path| {
					fs::read_to_string(&path)
						.with_context(|| format!("failed to read {}", path.display()))
				})
				.transpose()?;
			let paste = parse_paste(html.as_deref(), &text);
			let title = paste.text.clone();
			tracker.add_todo_from_paste(paste, &type_name)?;
			println!("added todo {title}");
		}
		Command::Groups => {
			for (index, group) in tracker.groups().iter().enumerate() {
				println!("{:>2}. {group}", index + 1);
			}
		}
		Command::AddGroup { name } => {
			tracker.add_group(&name)?;
			println!("added group {}", name.trim());
		}
		Command::RemoveGroup { index, yes } => {
			let index = to_index(index)?;
			let Some(group) = tracker.groups().get(index) else {
				bail!("group #{} does not exist", index + 1);
			};
			if yes || confirm(&format!("delete group '{group}'?"))? {
				let removed = tracker.delete_group(index)?;
				println!("deleted group {removed}");
			}
		}
		Command::MoveGroup { index, up, down: _ } => {
			let direction = if up { MoveDirection::Up } else { MoveDirection::Down };
			let moved = tracker.move_group(to_index(index)?, direction)?;
			println!("group is now #{}", moved + 1);
		}
		Command::Summary { day } => {
			print_summary(&tracker, &day_start(day.as_deref(), &now)?, &now)
		}
		Command::Setting { key, value } => match (key, value) {
			(Some(key), Some(value)) => {
				tracker.set_setting(key, value)?;
				println!("{} = {value}", key.name());
			}
			(Some(key), None) => println!("{} = {}", key.name(), tracker.setting(key)),
			(None, _) => {
				for key in SettingKey::ALL {
					println!("{} = {} | {}", key.name(), tracker.setting(key), key.label());
				}
			}
		},
		Command::Usage => {
			let usage = tracker.usage();
			println!(
				"{} / {} bytes ({})",
				usage.bytes_in_use,
				usage.quota_bytes,
				usage.percentage()
			);
		}
	}

	Ok(())
}

/// Command-line indices are 1-based.
fn to_index(index: usize) -> Result<usize> {
	index.checked_sub(1).context("indices start at 1")
}

fn confirm(question: &str) -> Result<bool> {
	print!("{question} [y/N] ");
	io::stdout().flush()?;
	let mut answer = String::new();
	io::stdin().lock().read_line(&mut answer)?;
	Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn day_start(input: Option<&str>, now: &DateTime<Local>) -> Result<DateTime<Local>> {
	let Some(raw) = input else {
		return Ok(start_of_date(now));
	};
	let day = parse_iso_date(raw)
		.with_context(|| format!("invalid day '{raw}', expected YYYY-MM-DD"))?;
	Ok(timefmt::local_clock_on_date(&Local, day, 0))
}

fn print_types(tracker: &Tracker<JsonFileStore>) {
	if tracker.types().is_empty() {
		println!("no types yet");
		return;
	}

	let current = tracker.current_record().map(|(_, record)| record.type_name());
	for (index, kind) in tracker.types().iter().enumerate() {
		println!(
			"{:>2}. {}{}{}",
			index + 1,
			kind.name,
			kind.access_key
				.as_ref()
				.map(|key| format!(" [{key}]"))
				.unwrap_or_default(),
			if current == Some(kind.name.as_str()) { " *" } else { "" }
		);
	}
}

fn print_records(
	tracker: &Tracker<JsonFileStore>,
	day_start: &DateTime<Local>,
	now: &DateTime<Local>,
) {
	let records = tracker.records_of_day(day_start);
	println!("records since {}", format_local_date(day_start.date_naive()));
	if records.is_empty() {
		println!("no records");
		return;
	}

	for (index, record) in records {
		println!(
			"{:>3}. {}~{} ({}) | {} | {} | {}",
			index + 1,
			format_clock(&record.start().with_timezone(&Local)),
			record
				.end()
				.map(|end| format_clock(&end.with_timezone(&Local)))
				.unwrap_or_default(),
			format_duration(record.elapsed_seconds(now)),
			tracker.type_label(record.type_name()),
			record.title().unwrap_or("-"),
			record.memo().unwrap_or("")
		);
	}
}

fn print_todos(tracker: &Tracker<JsonFileStore>, now: &DateTime<Local>, detail: bool) {
	if tracker.todos().is_empty() {
		println!("no todos yet");
		return;
	}

	let subtotals = tracker.todo_subtotals(now);
	let use_groups = tracker.setting(SettingKey::UseTodoGroup);
	let use_deadline = tracker.setting(SettingKey::UseTodoDeadline);
	let buckets = tracker.grouped_todos();

	for bucket in buckets {
		if use_groups {
			println!("[{}]", bucket.group.unwrap_or("ungrouped"));
		} else if bucket.group.is_some() {
			continue;
		}
		let todos = if use_groups {
			bucket.todos
		} else {
			tracker.todos().iter().enumerate().collect()
		};

		for (index, todo) in todos {
			let deadline = match (use_deadline, todo.deadline) {
				(true, Some(deadline)) => {
					let marker = match todo.deadline_status(now) {
						Some(DeadlineStatus::Overdue) => "!",
						Some(DeadlineStatus::Today) => "*",
						_ => "",
					};
					format!(" due {}{marker}", iso_date_only(&deadline.with_timezone(&Local)))
				}
				_ => String::new(),
			};
			println!(
				"{:>3}. {}{} | {} | {} | {}{}",
				index + 1,
				if tracker.is_current_todo(index) { "* " } else { "" },
				tracker.type_label(&todo.type_name),
				if todo.title.is_empty() { "-" } else { todo.title.as_str() },
				todo.memo.as_deref().unwrap_or(""),
				format_duration(subtotals[index].total_seconds),
				deadline
			);
			if detail {
				for (day, seconds) in &subtotals[index].by_day {
					println!("       {} {}", format_local_date(*day), format_duration(*seconds));
				}
			}
		}
	}
}

fn print_summary(
	tracker: &Tracker<JsonFileStore>,
	day_start: &DateTime<Local>,
	now: &DateTime<Local>,
) {
	let summary = tracker.daily_summary(day_start, now);
	let include_bare = tracker.setting(SettingKey::NoTitleOrMemo);
	let detail = tracker.setting(SettingKey::DetailVisible);

	println!("summary for {}", format_local_date(day_start.date_naive()));
	println!("Total: {}", format_duration(summary.counted_seconds));
	if summary.rows.is_empty() {
		println!("no records for this day");
		return;
	}

	for row in &summary.rows {
		let share = match row.share {
			Share::Percent(percent) => percent.to_string(),
			Share::NotCounted => "not counted".to_string(),
		};
		println!("{} | [{share}] {}", row.type_name, format_duration(row.seconds));
		if detail {
			for record in row.detail_records(include_bare) {
				println!(
					"    {} ({}) {} {}",
					format_clock(&record.start().with_timezone(&Local)),
					format_duration(record.elapsed_seconds(now)),
					record.title().unwrap_or("-"),
					record.memo().unwrap_or("")
				);
			}
		}
	}
}
