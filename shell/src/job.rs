use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, info, warn};

use crate::error::ExecError;
use crate::terminal::Terminal;

pub type JobId = usize;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProcessStatus {
	Running,
	Stopped(Signal),
	Exited(i32),
	Signaled(Signal),
}

impl ProcessStatus {
	pub fn is_terminal(self) -> bool {
		match self {
			ProcessStatus::Exited(..) | ProcessStatus::Signaled(..) => true,
			ProcessStatus::Running | ProcessStatus::Stopped(..) => false,
		}
	}

	/// Exit code in shell convention: death by signal `n` is `128 + n`.
	pub fn exit_code(self) -> Option<i32> {
		match self {
			ProcessStatus::Exited(code) => Some(code),
			ProcessStatus::Signaled(sig) => Some(128 + sig as i32),
			ProcessStatus::Running | ProcessStatus::Stopped(..) => None,
		}
	}
}

pub trait WaitStatusExt {
	fn process_status(self) -> Option<ProcessStatus>;
}

impl WaitStatusExt for WaitStatus {
	fn process_status(self) -> Option<ProcessStatus> {
		match self {
			WaitStatus::Exited(_, code) => Some(ProcessStatus::Exited(code)),
			WaitStatus::Signaled(_, sig, _) => Some(ProcessStatus::Signaled(sig)),
			WaitStatus::Stopped(_, sig) => Some(ProcessStatus::Stopped(sig)),
			WaitStatus::Continued(_) => Some(ProcessStatus::Running),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum JobState { Running, Stopped, Done }

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.pad(match *self {
			JobState::Running => "Running",
			JobState::Stopped => "Stopped",
			JobState::Done => "Done",
		})
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: ProcessStatus,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	pub id: JobId,
	pub group: Pid,
	pub label: String,
	pub processes: Vec<Process>,
}

impl Job {
	/// `Done` once every member is terminal, `Stopped` while every live
	/// member is stopped, `Running` otherwise.
	pub fn state(&self) -> JobState {
		let mut live = self.processes.iter().filter(|pr| !pr.status.is_terminal()).peekable();
		if live.peek().is_none() {
			JobState::Done
		} else if live.all(|pr| matches!(pr.status, ProcessStatus::Stopped(..))) {
			JobState::Stopped
		} else {
			JobState::Running
		}
	}

	/// The last stage's exit code, once it has one.
	pub fn exit_code(&self) -> Option<i32> {
		self.processes.last().and_then(|pr| pr.status.exit_code())
	}
}

impl fmt::Display for Job {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}] {}  {:<8} {}", self.id, self.group, self.state(), self.label)
	}
}

/// Forks the stages of one pipeline and keeps them in a single process
/// group led by the first child.
#[derive(Debug)]
pub struct JobBuilder {
	group: Option<Pid>,
	pids: Vec<Pid>,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder { group: None, pids: Vec::with_capacity(size_hint) }
	}

	/// The group id, or `None` before the first fork.
	pub fn group(&self) -> Option<Pid> {
		self.group
	}

	pub fn pids(&self) -> &[Pid] {
		&self.pids
	}

	/// Forks one stage. The parent places the child in the group before
	/// returning, so the next stage is never forked ahead of it. The child
	/// must join the group itself as well; see `join_group`.
	pub fn push_fork(&mut self) -> Result<ForkResult, ExecError> {
		// SAFETY: the child only runs async-signal-safe code before exec/_exit.
		let r = unsafe { unistd::fork() }.map_err(ExecError::setup("fork"))?;
		if let ForkResult::Parent { child } = r {
			let group = *self.group.get_or_insert(child);
			self.pids.push(child);
			match unistd::setpgid(child, group) {
				Ok(()) => {},
				// The child already joined and exec'd.
				Err(Errno::EACCES) => debug!(pid = %child, "setpgid raced with exec"),
				Err(e) => return Err(ExecError::Setup { op: "setpgid", source: e }),
			}
			debug!(pid = %child, group = %group, "forked stage");
		}
		Ok(r)
	}

	/// Child side of `push_fork`.
	pub fn join_group(&self) -> nix::Result<Pid> {
		let group = self.group.unwrap_or_else(|| Pid::from_raw(0));
		unistd::setpgid(Pid::from_raw(0), group)?;
		Ok(unistd::getpgrp())
	}

	/// Collects whatever children already exited after a failed launch.
	/// Children still running are left to the reaper.
	pub fn abandon(self) {
		for pid in self.pids {
			match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) => debug!(pid = %pid, "abandoned stage still running"),
				Ok(status) => debug!(pid = %pid, ?status, "reaped abandoned stage"),
				Err(e) => debug!(pid = %pid, error = %e, "abandoned stage not reapable"),
			}
		}
	}
}

/// Registry of jobs launched in the background (or stopped in the
/// foreground). Lookups hand out copies.
#[derive(Debug)]
pub struct JobTable {
	next_id: JobId,
	jobs: Vec<Job>,
}

impl Default for JobTable {
	fn default() -> JobTable {
		JobTable::new()
	}
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable { next_id: 1, jobs: vec![] }
	}

	/// Ids start at 1 and are never handed out twice.
	pub fn register(&mut self, group: Pid, label: String, pids: &[Pid]) -> JobId {
		let id = self.next_id;
		self.next_id += 1;
		let processes = pids.iter().map(|&pid| Process { pid, status: ProcessStatus::Running }).collect();
		info!(job = id, group = %group, label = %label, "registered job");
		self.jobs.push(Job { id, group, label, processes });
		id
	}

	/// Updates the live member with `pid`. A pid no job is still waiting on
	/// is ignored, so a finished member whose pid the kernel handed out again
	/// never absorbs the new process's status.
	pub fn record_exit(&mut self, pid: Pid, status: ProcessStatus) -> Option<JobId> {
		let is_live = |pr: &Process| pr.pid == pid && !pr.status.is_terminal();
		let job = self.jobs.iter_mut().find(|job| job.processes.iter().any(is_live))?;
		let before = job.state();
		for pr in job.processes.iter_mut().filter(|pr| is_live(pr)) {
			pr.status = status;
		}
		let after = job.state();
		if before != after {
			info!(job = job.id, from = %before, to = %after, "job changed state");
		}
		Some(job.id)
	}

	pub fn find_by_id(&self, id: JobId) -> Option<Job> {
		self.jobs.iter().find(|job| job.id == id).cloned()
	}

	pub fn find_by_group(&self, group: Pid) -> Option<Job> {
		self.jobs.iter().find(|job| job.group == group).cloned()
	}

	/// Ascending id order.
	pub fn list(&self) -> Vec<Job> {
		self.jobs.clone()
	}

	/// The most recently registered job that has not finished.
	pub fn current(&self) -> Option<JobId> {
		self.jobs.iter().rev().find(|job| job.state() != JobState::Done).map(|job| job.id)
	}

	pub fn remove(&mut self, id: JobId) -> Option<Job> {
		let i = self.jobs.iter().position(|job| job.id == id)?;
		Some(self.jobs.remove(i))
	}

	/// Forgets finished jobs and returns them for reporting.
	pub fn remove_done(&mut self) -> Vec<Job> {
		let (done, live): (Vec<Job>, Vec<Job>) = self.jobs.drain(..).partition(|job| job.state() == JobState::Done);
		self.jobs = live;
		done
	}

	/// Brings a job to the foreground: hands it the terminal, continues it if
	/// stopped, and blocks until it finishes or stops again. Returns false
	/// when the job is unknown or already done.
	pub fn set_foreground(&mut self, id: JobId, terminal: Option<&Terminal>) -> bool {
		let job = match self.find_by_id(id) {
			Some(job) if job.state() != JobState::Done => job,
			_ => return false,
		};
		if let Some(terminal) = terminal {
			if let Err(e) = terminal.give_to(job.group) {
				warn!(job = id, error = %e, "could not hand over terminal");
			}
		}
		// Continue on any stopped member, even when others still run.
		if job.processes.iter().any(|pr| matches!(pr.status, ProcessStatus::Stopped(..))) {
			if let Err(e) = signal::killpg(job.group, Signal::SIGCONT) {
				warn!(job = id, error = %e, "could not continue job");
			}
			for pr in &job.processes {
				if let ProcessStatus::Stopped(..) = pr.status {
					self.record_exit(pr.pid, ProcessStatus::Running);
				}
			}
		}
		self.wait_while_running(id, job.group);
		if let Some(terminal) = terminal {
			if let Err(e) = terminal.reclaim() {
				warn!(error = %e, "could not reclaim terminal");
			}
		}
		true
	}

	fn wait_while_running(&mut self, id: JobId, group: Pid) {
		while self.find_by_id(id).map_or(false, |job| job.state() == JobState::Running) {
			match wait::waitpid(Pid::from_raw(-group.as_raw()), Some(WaitPidFlag::WUNTRACED)) {
				Ok(status) => {
					if let (Some(pid), Some(st)) = (status.pid(), status.process_status()) {
						self.record_exit(pid, st);
					}
				},
				Err(Errno::EINTR) => {},
				Err(e) => {
					warn!(job = id, error = %e, "lost track of job members");
					break;
				},
			}
		}
	}
}

/// Drains every child that changed state without blocking and records it.
/// Returns how many statuses were collected.
pub fn reap(jobs: &mut JobTable) -> usize {
	let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
	let mut count = 0;
	loop {
		match wait::waitpid(Pid::from_raw(-1), Some(flags)) {
			Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
			Ok(status) => {
				if let (Some(pid), Some(st)) = (status.pid(), status.process_status()) {
					debug!(pid = %pid, status = ?st, "reaped");
					jobs.record_exit(pid, st);
					count += 1;
				}
			},
			Err(Errno::EINTR) => {},
			Err(e) => {
				warn!(error = %e, "waitpid failed while reaping");
				break;
			},
		}
	}
	count
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pid(n: i32) -> Pid {
		Pid::from_raw(n)
	}

	#[test]
	fn ids_are_sequential_from_one_and_never_reused() {
		let mut table = JobTable::new();
		let first = table.register(pid(100), "a".into(), &[pid(100)]);
		let second = table.register(pid(200), "b".into(), &[pid(200)]);
		assert_eq!((first, second), (1, 2));
		table.record_exit(pid(100), ProcessStatus::Exited(0));
		assert_eq!(table.remove_done().len(), 1);
		let third = table.register(pid(300), "c".into(), &[pid(300)]);
		assert_eq!(third, 3);
	}

	#[test]
	fn done_only_when_every_member_is_terminal() {
		let mut table = JobTable::new();
		let id = table.register(pid(10), "a | b".into(), &[pid(10), pid(11)]);
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Running);
		table.record_exit(pid(11), ProcessStatus::Exited(3));
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Running);
		table.record_exit(pid(10), ProcessStatus::Signaled(Signal::SIGPIPE));
		let job = table.find_by_id(id).unwrap();
		assert_eq!(job.state(), JobState::Done);
		assert_eq!(job.exit_code(), Some(3));
	}

	#[test]
	fn unknown_pid_is_a_no_op() {
		let mut table = JobTable::new();
		table.register(pid(10), "a".into(), &[pid(10)]);
		let before = table.list();
		assert_eq!(table.record_exit(pid(99), ProcessStatus::Exited(0)), None);
		assert_eq!(table.list(), before);
	}

	#[test]
	fn reused_pid_goes_to_the_job_still_waiting_on_it() {
		let mut table = JobTable::new();
		let old = table.register(pid(500), "old".into(), &[pid(500)]);
		table.record_exit(pid(500), ProcessStatus::Exited(0));
		let new = table.register(pid(400), "new | reused".into(), &[pid(400), pid(500)]);

		assert_eq!(table.record_exit(pid(400), ProcessStatus::Exited(0)), Some(new));
		assert_eq!(table.record_exit(pid(500), ProcessStatus::Exited(9)), Some(new));
		let job = table.find_by_id(new).unwrap();
		assert_eq!(job.state(), JobState::Done);
		assert_eq!(job.exit_code(), Some(9));
		assert_eq!(table.find_by_id(old).unwrap().exit_code(), Some(0));
	}

	#[test]
	fn terminal_status_is_final() {
		let mut table = JobTable::new();
		let id = table.register(pid(10), "a".into(), &[pid(10)]);
		table.record_exit(pid(10), ProcessStatus::Exited(1));
		table.record_exit(pid(10), ProcessStatus::Running);
		assert_eq!(table.find_by_id(id).unwrap().exit_code(), Some(1));
	}

	#[test]
	fn stopped_when_every_live_member_is_stopped() {
		let mut table = JobTable::new();
		let id = table.register(pid(10), "a | b".into(), &[pid(10), pid(11)]);
		table.record_exit(pid(10), ProcessStatus::Stopped(Signal::SIGTSTP));
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Running);
		table.record_exit(pid(11), ProcessStatus::Exited(0));
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Stopped);
		table.record_exit(pid(10), ProcessStatus::Running);
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Running);
	}

	#[test]
	fn snapshots_do_not_follow_updates() {
		let mut table = JobTable::new();
		let id = table.register(pid(10), "a".into(), &[pid(10)]);
		let snapshot = table.find_by_group(pid(10)).unwrap();
		table.record_exit(pid(10), ProcessStatus::Exited(0));
		assert_eq!(snapshot.state(), JobState::Running);
		assert_eq!(table.find_by_id(id).unwrap().state(), JobState::Done);
	}

	#[test]
	fn list_is_ordered_by_id() {
		let mut table = JobTable::new();
		for n in 1 .. 4 {
			table.register(pid(n * 10), format!("job {}", n), &[pid(n * 10)]);
		}
		let ids: Vec<JobId> = table.list().iter().map(|job| job.id).collect();
		assert_eq!(ids, vec![1, 2, 3]);
		assert_eq!(table.current(), Some(3));
	}

	#[test]
	fn foreground_rejects_unknown_and_done_jobs() {
		let mut table = JobTable::new();
		assert!(!table.set_foreground(1, None));
		let id = table.register(pid(10), "a".into(), &[pid(10)]);
		table.record_exit(pid(10), ProcessStatus::Exited(0));
		assert!(!table.set_foreground(id, None));
	}

	#[test]
	fn signal_deaths_map_above_128() {
		assert_eq!(ProcessStatus::Signaled(Signal::SIGKILL).exit_code(), Some(137));
		assert_eq!(ProcessStatus::Exited(2).exit_code(), Some(2));
		assert_eq!(ProcessStatus::Running.exit_code(), None);
	}

	#[test]
	fn display_lists_id_group_state_label() {
		let mut table = JobTable::new();
		table.register(pid(4242), "sleep 5 &".into(), &[pid(4242)]);
		assert_eq!(table.list()[0].to_string(), "[1] 4242  Running  sleep 5 &");
	}
}
