//! Owned file descriptors.
//!
//! An `Fd` is closed exactly once: when it is dropped, or when it is consumed
//! by `install_as`. It cannot be cloned, so every copy that survives a fork is
//! a deliberate move.

use std::fmt;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::fcntl::{self, FcntlArg, FdFlag};
use nix::unistd;

pub struct Fd(OwnedFd);

impl Fd {
	pub fn is_cloexec(&self) -> nix::Result<bool> {
		let flags = fcntl::fcntl(self.as_raw_fd(), FcntlArg::F_GETFD)?;
		Ok(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC))
	}

	pub fn set_cloexec(&self, on: bool) -> nix::Result<()> {
		let flags = fcntl::fcntl(self.as_raw_fd(), FcntlArg::F_GETFD)?;
		let mut flags = FdFlag::from_bits_truncate(flags);
		flags.set(FdFlag::FD_CLOEXEC, on);
		fcntl::fcntl(self.as_raw_fd(), FcntlArg::F_SETFD(flags))?;
		Ok(())
	}

	/// Rebinds `target` to this descriptor and closes the original.
	///
	/// The new binding never carries close-on-exec, so it survives into the
	/// exec'd program. If the descriptor already sits at `target` it is kept
	/// open with the flag cleared.
	pub fn install_as(self, target: RawFd) -> nix::Result<()> {
		if self.as_raw_fd() == target {
			self.set_cloexec(false)?;
			let _ = self.into_raw_fd();
			return Ok(());
		}
		unistd::dup2(self.as_raw_fd(), target)?;
		Ok(())
	}
}

impl From<OwnedFd> for Fd {
	fn from(fd: OwnedFd) -> Fd {
		Fd(fd)
	}
}

impl AsFd for Fd {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.0.as_fd()
	}
}

impl AsRawFd for Fd {
	fn as_raw_fd(&self) -> RawFd {
		self.0.as_raw_fd()
	}
}

impl IntoRawFd for Fd {
	fn into_raw_fd(self) -> RawFd {
		self.0.into_raw_fd()
	}
}

impl FromRawFd for Fd {
	unsafe fn from_raw_fd(fd: RawFd) -> Fd {
		Fd(OwnedFd::from_raw_fd(fd))
	}
}

impl fmt::Debug for Fd {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Fd({})", self.as_raw_fd())
	}
}
