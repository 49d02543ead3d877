//! Shell-side signal dispositions.
//!
//! The SIGCHLD handler only raises a flag. The job table is updated later,
//! from the main loop, by whoever calls `take_child_event`.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static CHILD_EVENT: AtomicBool = AtomicBool::new(false);

/// Signals a job-control shell handles itself and children must not inherit.
pub const JOB_CONTROL_SIGNALS: [Signal; 6] = [
	Signal::SIGINT,
	Signal::SIGQUIT,
	Signal::SIGTSTP,
	Signal::SIGTTIN,
	Signal::SIGTTOU,
	Signal::SIGCHLD,
];

extern "C" fn on_sigchld(_: libc::c_int) {
	CHILD_EVENT.store(true, Ordering::SeqCst);
}

/// Installs the SIGCHLD flag handler. Interactive shells also ignore the
/// keyboard and terminal-access signals so that only the foreground job
/// receives them.
pub fn install_shell_handlers(interactive: bool) -> nix::Result<()> {
	if interactive {
		for &sig in &JOB_CONTROL_SIGNALS[.. 5] {
			// SAFETY: SIG_IGN runs no code in signal context.
			unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
		}
	}
	let action = SigAction::new(SigHandler::Handler(on_sigchld), SaFlags::SA_RESTART, SigSet::empty());
	// SAFETY: the handler only touches an atomic.
	unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
	Ok(())
}

/// Restores default dispositions. Runs in a forked child before exec.
pub fn reset_for_child() {
	for &sig in &JOB_CONTROL_SIGNALS {
		// SAFETY: SIG_DFL runs no code in signal context.
		let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
	}
}

/// Returns whether a child changed state since the last call, and clears
/// the flag.
pub fn take_child_event() -> bool {
	CHILD_EVENT.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flag_is_consumed_once() {
		on_sigchld(libc::SIGCHLD);
		assert!(take_child_event());
		assert!(!take_child_event());
	}
}
