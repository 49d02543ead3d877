use std::ffi::{CString, NulError};
use std::ptr;

use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag};
use nix::unistd::{ForkResult, Pid};
use tracing::{debug, info, warn};

use crate::error::ExecError;
use crate::job::{JobBuilder, JobId, JobTable, ProcessStatus, WaitStatusExt};
use crate::pipe::Topology;
use crate::redirect;
use crate::signal;
use crate::terminal::Terminal;
use crate::types::{Command, Pipeline};

/// A redirection target could not be opened.
pub const EXIT_REDIRECT_FAILED: i32 = 1;
/// The child could not rewire itself before exec.
pub const EXIT_SETUP_FAILED: i32 = 126;
/// The program could not be found or executed.
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
	/// The pipeline ran to completion; the code is the last stage's.
	Foreground { exit_code: i32 },
	Background { job_id: JobId, group: Pid },
	/// A foreground stage was stopped from the terminal and the pipeline
	/// now lives in the job table.
	Stopped { job_id: JobId, group: Pid },
}

/// One command, converted up front so the child never allocates.
/// `argv_ptrs` is the NULL-terminated array `execvp(3)` takes; it points into
/// `argv`, whose buffers never move once built.
struct Stage {
	argv: Vec<CString>,
	argv_ptrs: Vec<*const libc::c_char>,
	targets: Vec<redirect::Target>,
}

impl Stage {
	fn prepare(command: &Command) -> Result<Stage, NulError> {
		let argv = command.argv.iter().map(|arg| CString::new(arg.as_bytes())).collect::<Result<Vec<_>, _>>()?;
		let argv_ptrs = argv.iter().map(|arg| arg.as_ptr()).chain(Some(ptr::null())).collect();
		let targets = redirect::prepare(&command.redirections)?;
		Ok(Stage { argv, argv_ptrs, targets })
	}
}

type Fork<'a> = dyn FnMut(&mut JobBuilder) -> Result<ForkResult, ExecError> + 'a;

/// Launches pipelines. With a terminal, foreground pipelines are handed the
/// terminal while they run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor {
	terminal: Option<Terminal>,
}

impl Executor {
	pub fn new(terminal: Option<Terminal>) -> Executor {
		Executor { terminal }
	}

	pub fn terminal(&self) -> Option<&Terminal> {
		self.terminal.as_ref()
	}

	pub fn execute(&self, jobs: &mut JobTable, pipeline: &Pipeline) -> Result<ExecOutcome, ExecError> {
		self.launch(jobs, pipeline, &mut JobBuilder::push_fork)
	}

	fn launch(&self, jobs: &mut JobTable, pipeline: &Pipeline, fork: &mut Fork<'_>) -> Result<ExecOutcome, ExecError> {
		assert!(!pipeline.commands.is_empty() && pipeline.commands.iter().all(|c| !c.argv.is_empty()),
		        "pipeline with an empty command");
		let stages = pipeline.commands.iter().map(Stage::prepare).collect::<Result<Vec<_>, _>>()?;
		let terminal = if pipeline.background { None } else { self.terminal };

		let mut topology = Topology::build(stages.len()).map_err(ExecError::ResourceExhausted)?;
		let mut job_builder = JobBuilder::new(stages.len());
		for (i, stage) in stages.iter().enumerate() {
			match fork(&mut job_builder) {
				Ok(ForkResult::Child) => exec_stage(stage, i, &job_builder, terminal.as_ref(), &mut topology),
				Ok(ForkResult::Parent { .. }) => {
					if i == 0 {
						if let (Some(terminal), Some(group)) = (terminal, job_builder.group()) {
							if let Err(e) = terminal.give_to(group) {
								warn!(group = %group, error = %e, "could not hand over terminal");
							}
						}
					}
				},
				Err(e) => {
					topology.close_all();
					job_builder.abandon();
					if let Some(terminal) = terminal {
						if let Err(e) = terminal.reclaim() {
							warn!(error = %e, "could not reclaim terminal");
						}
					}
					return Err(e);
				},
			}
		}
		topology.close_all();

		let group = match job_builder.group() {
			Some(group) => group,
			None => unreachable!("pipeline forked no stage"),
		};
		let label = pipeline.to_string();
		if pipeline.background {
			let job_id = jobs.register(group, label, job_builder.pids());
			return Ok(ExecOutcome::Background { job_id, group });
		}

		let outcome = wait_foreground(jobs, group, label, job_builder.pids());
		if let Some(terminal) = terminal {
			if let Err(e) = terminal.reclaim() {
				warn!(error = %e, "could not reclaim terminal");
			}
		}
		outcome
	}
}

/// Waits for each stage in order. Stops short if one is stopped, in which
/// case the whole pipeline is moved to the job table.
fn wait_foreground(jobs: &mut JobTable, group: Pid, label: String, pids: &[Pid]) -> Result<ExecOutcome, ExecError> {
	let mut statuses = Vec::with_capacity(pids.len());
	for &pid in pids {
		let status = loop {
			match wait::waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
				Ok(ws) => match ws.process_status() {
					Some(ProcessStatus::Running) | None => continue,
					Some(st) => break st,
				},
				Err(Errno::EINTR) => continue,
				Err(e) => return Err(ExecError::Setup { op: "waitpid", source: e }),
			}
		};
		debug!(pid = %pid, ?status, "foreground stage changed state");
		statuses.push((pid, status));
		if let ProcessStatus::Stopped(..) = status {
			let job_id = jobs.register(group, label, pids);
			for (pid, status) in statuses {
				jobs.record_exit(pid, status);
			}
			info!(job = job_id, "foreground pipeline stopped");
			return Ok(ExecOutcome::Stopped { job_id, group });
		}
	}
	let exit_code = statuses.last().and_then(|&(_, st)| st.exit_code()).unwrap_or(0);
	Ok(ExecOutcome::Foreground { exit_code })
}

/// Writes straight to descriptor 2; usable between fork and exec.
fn child_report(parts: &[&[u8]]) {
	for part in parts {
		// SAFETY: write(2) is async-signal-safe and `part` outlives the call.
		unsafe { libc::write(libc::STDERR_FILENO, part.as_ptr() as *const libc::c_void, part.len()) };
	}
}

fn child_setup_failed(op: &str, e: nix::Error) -> i32 {
	child_report(&[b"jsh: ", op.as_bytes(), b": ", e.desc().as_bytes(), b"\n"]);
	EXIT_SETUP_FAILED
}

/// Child side: join the group, take the terminal if foreground, restore
/// signals, wire pipes, apply redirections and exec. Never returns.
fn exec_stage(stage: &Stage, index: usize, job_builder: &JobBuilder, terminal: Option<&Terminal>,
              topology: &mut Topology) -> ! {
	let status = match prepare_child(stage, index, job_builder, terminal, topology) {
		Ok(()) => {
			let name = &stage.argv[0];
			// SAFETY: `argv_ptrs` is NULL-terminated and borrows from `argv`.
			unsafe { libc::execvp(stage.argv_ptrs[0], stage.argv_ptrs.as_ptr()) };
			let e = Errno::last();
			if e == Errno::ENOENT {
				child_report(&[b"jsh: ", name.to_bytes(), b": command not found\n"]);
			} else {
				child_report(&[b"jsh: ", name.to_bytes(), b": ", e.desc().as_bytes(), b"\n"]);
			}
			EXIT_NOT_FOUND
		},
		Err(code) => code,
	};
	// SAFETY: skips atexit handlers and stdio flushing inherited from the shell.
	unsafe { libc::_exit(status) }
}

fn prepare_child(stage: &Stage, index: usize, job_builder: &JobBuilder, terminal: Option<&Terminal>,
                 topology: &mut Topology) -> Result<(), i32> {
	let group = job_builder.join_group().map_err(|e| child_setup_failed("setpgid", e))?;
	if let Some(terminal) = terminal {
		// SIGTTOU is still ignored here, so this cannot stop us.
		let _ = terminal.give_to(group);
	}
	signal::reset_for_child();
	topology.take_stage(index).install().map_err(|(op, e)| child_setup_failed(op, e))?;
	redirect::apply(&stage.targets).map_err(|e| {
		child_report(&[b"jsh: ", e.path.to_bytes(), b": ", e.source.desc().as_bytes(), b"\n"]);
		EXIT_REDIRECT_FAILED
	})?;
	Ok(())
}
