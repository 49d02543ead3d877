#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use jsh::job::{self, JobId, JobState, JobTable};
use jsh::Command;

static LOCK: Mutex<()> = Mutex::new(());

/// Tests that fork hold this so that reaping in one never collects another's
/// children.
pub fn serial() -> MutexGuard<'static, ()> {
	LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn cmd(argv: &[&str]) -> Command {
	Command::new(argv.iter().copied())
}

/// Reaps until job `id` reaches `state`, for at most five seconds.
pub fn reap_until(jobs: &mut JobTable, id: JobId, state: JobState) -> bool {
	for _ in 0 .. 500 {
		job::reap(jobs);
		if jobs.find_by_id(id).map(|job| job.state()) == Some(state) {
			return true;
		}
		thread::sleep(Duration::from_millis(10));
	}
	false
}

pub fn open_fds() -> usize {
	std::fs::read_dir("/proc/self/fd").map(|d| d.count()).unwrap_or(0)
}
