use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing::warn;

use crate::complete::ShellHelper;
use crate::session::Session;

type LineEditor = Editor<ShellHelper, DefaultHistory>;

fn prompt() -> String {
	match env::current_dir() {
		Ok(dir) => format!("{} $ ", dir.display()),
		Err(_) => "$ ".to_owned(),
	}
}

fn load_history(rl: &mut LineEditor, history_path: &Option<PathBuf>) {
	if let Some(path) = history_path {
		if let Err(e) = rl.load_history(path) {
			let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound);
			if !is_not_found {
				warn!("Failed to load history: {}", e);
			}
		}
	}
}

fn save_history(rl: &mut LineEditor, history_path: &Option<PathBuf>) {
	if let Some(path) = history_path {
		if let Err(e) = rl.save_history(path) {
			warn!("Failed to save history: {}", e);
		}
	}
}

/// Interactive loop. Returns the status the shell should exit with.
pub fn run(session: &mut Session) -> Result<i32> {
	let rl_config = rustyline::Config::builder()
		.max_history_size(session.config.history_size)
		.context("Invalid history size")?
		.auto_add_history(false)
		.build();
	let mut rl = LineEditor::with_config(rl_config).context("Failed to create editor")?;
	rl.set_helper(Some(ShellHelper::new(session.search_cache.clone())));
	let history_path = session.config.history_path.clone();
	load_history(&mut rl, &history_path);

	loop {
		session.poll();
		match rl.readline(&prompt()) {
			Ok(line) => {
				if line.trim().is_empty() {
					continue;
				}
				if let Err(e) = rl.add_history_entry(line.as_str()) {
					warn!("Failed to add history entry: {}", e);
				}
				session.run_line(&line);
				if let Some(code) = session.exit_requested() {
					save_history(&mut rl, &history_path);
					return Ok(code);
				}
			},
			Err(ReadlineError::Interrupted) => continue,
			Err(ReadlineError::Eof) => {
				println!();
				break;
			},
			Err(e) => {
				save_history(&mut rl, &history_path);
				return Err(e).context("Failed to read line");
			},
		}
	}

	save_history(&mut rl, &history_path);
	Ok(session.last_status())
}

/// Runs lines from a non-terminal input until EOF or `exit`.
pub fn run_stream<R: BufRead>(session: &mut Session, input: R) -> Result<i32> {
	for line in input.lines() {
		let line = line.context("Failed to read input")?;
		session.poll();
		session.run_line(&line);
		if let Some(code) = session.exit_requested() {
			return Ok(code);
		}
	}
	Ok(session.last_status())
}
