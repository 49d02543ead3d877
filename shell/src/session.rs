use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::builtin;
use crate::config::Config;
use crate::eval::{ExecOutcome, Executor};
use crate::job::{self, JobTable};
use crate::parser;
use crate::search::SearchCache;
use crate::signal;
use crate::terminal::Terminal;
use crate::types::Pipeline;

/// Status reported for a line that does not parse.
pub const EXIT_SYNTAX_ERROR: i32 = 2;
/// Status of a foreground pipeline suspended from the terminal (128 + SIGTSTP).
pub const EXIT_STOPPED: i32 = 148;

/// Everything one shell instance owns, from start-up to exit.
pub struct Session {
	pub config: Config,
	pub jobs: JobTable,
	/// Shared with the line editor's completer.
	pub search_cache: Rc<RefCell<SearchCache>>,
	pub(crate) executor: Executor,
	last_status: i32,
	exit_code: Option<i32>,
}

impl Session {
	pub fn new(config: Config) -> Session {
		let terminal = if config.interactive { Terminal::detect() } else { None };
		Session {
			config,
			jobs: JobTable::new(),
			search_cache: Rc::new(RefCell::new(SearchCache::new())),
			executor: Executor::new(terminal),
			last_status: 0,
			exit_code: None,
		}
	}

	pub fn last_status(&self) -> i32 {
		self.last_status
	}

	/// Set once `exit` ran.
	pub fn exit_requested(&self) -> Option<i32> {
		self.exit_code
	}

	pub fn request_exit(&mut self, code: i32) {
		self.exit_code = Some(code);
	}

	/// Once per main-loop iteration: collects children that changed state
	/// if SIGCHLD was seen since the last call.
	pub fn poll(&mut self) {
		if signal::take_child_event() {
			self.reap();
		}
	}

	/// Drains terminated children into the job table and forgets finished
	/// jobs. Interactive sessions announce them first.
	pub fn reap(&mut self) {
		let n = job::reap(&mut self.jobs);
		debug!(count = n, "reaped children");
		for job in self.jobs.remove_done() {
			if self.config.interactive {
				println!("[{}]  Done  {}", job.id, job.label);
			}
		}
	}

	/// Parses and runs one input line, returning its status.
	pub fn run_line(&mut self, line: &str) -> i32 {
		let status = match parser::parse(line) {
			Ok(Some(pipeline)) => self.run_pipeline(&pipeline),
			Ok(None) => return self.last_status,
			Err(e) => {
				eprintln!("jsh: {}", e);
				EXIT_SYNTAX_ERROR
			},
		};
		self.last_status = status;
		status
	}

	/// A lone foreground command without redirections may be a builtin;
	/// anything else is handed to the executor.
	pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> i32 {
		if let [command] = pipeline.commands.as_slice() {
			if !pipeline.background && command.redirections.is_empty() {
				if let Some(builtin) = builtin::match_builtin(command.name()) {
					return builtin(self, &command.argv[1 ..]);
				}
			}
		}
		match self.executor.execute(&mut self.jobs, pipeline) {
			Ok(ExecOutcome::Foreground { exit_code }) => exit_code,
			Ok(ExecOutcome::Background { job_id, group }) => {
				println!("[{}] {}", job_id, group);
				0
			},
			Ok(ExecOutcome::Stopped { job_id, .. }) => {
				self.announce_stopped(job_id);
				EXIT_STOPPED
			},
			Err(e) => {
				debug!(error = ?e, "pipeline launch failed");
				eprintln!("jsh: {}", e);
				1
			},
		}
	}

	pub(crate) fn announce_stopped(&self, job_id: job::JobId) {
		if let Some(job) = self.jobs.find_by_id(job_id) {
			println!("\n[{}]  Stopped  {}", job.id, job.label);
		}
	}
}
