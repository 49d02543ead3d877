use std::env;
use std::path::PathBuf;

use crate::job::{JobId, JobState};
use crate::session::{Session, EXIT_STOPPED};

pub type Builtin = fn(&mut Session, &[String]) -> i32;

pub const NAMES: [&str; 8] = ["cd", "exit", "export", "fg", "jobs", "pwd", "rehash", "unset"];

fn usage(message: &str) -> i32 {
	eprintln!("jsh: {}", message);
	1
}

pub fn builtin_cd(_: &mut Session, args: &[String]) -> i32 {
	let target = match args.first() {
		Some(dir) => PathBuf::from(dir),
		None => env::var_os("HOME").map_or_else(|| PathBuf::from("/"), PathBuf::from),
	};
	match env::set_current_dir(&target) {
		Ok(()) => 0,
		Err(e) => usage(&format!("cd: {}: {}", target.display(), e)),
	}
}

pub fn builtin_pwd(_: &mut Session, _: &[String]) -> i32 {
	match env::current_dir() {
		Ok(dir) => {
			println!("{}", dir.display());
			0
		},
		Err(e) => usage(&format!("pwd: {}", e)),
	}
}

pub fn builtin_export(_: &mut Session, args: &[String]) -> i32 {
	let assignment = match args.first() {
		Some(a) => a,
		None => return usage("usage: export KEY=VALUE"),
	};
	match assignment.split_once('=') {
		Some((key, value)) if !key.is_empty() && !key.contains('\0') && !value.contains('\0') => {
			env::set_var(key, value);
			0
		},
		_ => usage("export expects KEY=VALUE"),
	}
}

pub fn builtin_unset(_: &mut Session, args: &[String]) -> i32 {
	match args.first() {
		Some(key) if !key.is_empty() && !key.contains('=') && !key.contains('\0') => {
			env::remove_var(key);
			0
		},
		Some(_) => usage("unset: invalid variable name"),
		None => usage("usage: unset KEY"),
	}
}

/// Lists every job, then forgets the ones it just reported as done.
pub fn builtin_jobs(state: &mut Session, _: &[String]) -> i32 {
	for job in state.jobs.list() {
		println!("{}", job);
	}
	state.jobs.remove_done();
	0
}

fn parse_job_id(arg: &str) -> Option<JobId> {
	arg.strip_prefix('%').unwrap_or(arg).parse().ok()
}

pub fn builtin_fg(state: &mut Session, args: &[String]) -> i32 {
	let id = match args.first() {
		Some(arg) => match parse_job_id(arg) {
			Some(id) => id,
			None => return usage(&format!("fg: {}: no such job", arg)),
		},
		None => match state.jobs.current() {
			Some(id) => id,
			None => return usage("fg: no current job"),
		},
	};
	let job = match state.jobs.find_by_id(id) {
		Some(job) => job,
		None => return usage(&format!("fg: %{}: no such job", id)),
	};
	println!("{}", job.label);
	let terminal = state.executor.terminal().copied();
	if !state.jobs.set_foreground(id, terminal.as_ref()) {
		return usage(&format!("fg: %{}: job has terminated", id));
	}
	match state.jobs.find_by_id(id) {
		Some(job) if job.state() == JobState::Done => {
			state.jobs.remove(id);
			job.exit_code().unwrap_or(0)
		},
		Some(_) => {
			state.announce_stopped(id);
			EXIT_STOPPED
		},
		None => 0,
	}
}

pub fn builtin_exit(state: &mut Session, args: &[String]) -> i32 {
	let code = match args.first() {
		Some(arg) => match arg.parse::<i32>() {
			Ok(code) => code,
			Err(_) => {
				eprintln!("jsh: exit: {}: numeric argument required", arg);
				2
			},
		},
		None => state.last_status(),
	};
	state.request_exit(code);
	code
}

pub fn builtin_rehash(state: &mut Session, _: &[String]) -> i32 {
	state.search_cache.borrow_mut().rehash();
	0
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"exit" => Some(builtin_exit),
		"export" => Some(builtin_export),
		"fg" => Some(builtin_fg),
		"jobs" => Some(builtin_jobs),
		"pwd" => Some(builtin_pwd),
		"rehash" => Some(builtin_rehash),
		"unset" => Some(builtin_unset),
		_ => None,
	}
}
