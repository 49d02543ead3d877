use std::io::{self, IsTerminal};
use std::os::unix::io::AsFd;

use nix::unistd::{self, Pid};

/// The controlling terminal of an interactive shell, reached through stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
	shell_group: Pid,
}

impl Terminal {
	/// Returns `None` when stdin is not a terminal.
	pub fn detect() -> Option<Terminal> {
		if io::stdin().is_terminal() {
			Some(Terminal { shell_group: unistd::getpgrp() })
		} else {
			None
		}
	}

	pub fn shell_group(&self) -> Pid {
		self.shell_group
	}

	/// Makes `group` the terminal's foreground process group.
	pub fn give_to(&self, group: Pid) -> nix::Result<()> {
		unistd::tcsetpgrp(io::stdin().as_fd(), group)
	}

	pub fn reclaim(&self) -> nix::Result<()> {
		self.give_to(self.shell_group)
	}
}
