//! Explicit `<`, `>` and `>>` redirections, applied inside a forked child
//! after its pipe ends are in place.

use std::ffi::{CStr, CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::FromRawFd;

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use thiserror::Error;

use crate::fd::Fd;
use crate::types::{RedirectKind, Redirection};

/// A redirection whose path is already a C string, so the child does not
/// have to allocate between fork and exec.
#[derive(Debug, Clone)]
pub struct Target {
	pub kind: RedirectKind,
	pub path: CString,
}

#[derive(Debug, Error)]
#[error("{}: {source}", .path.to_string_lossy())]
pub struct RedirectError<'a> {
	pub path: &'a CStr,
	#[source]
	pub source: nix::Error,
}

pub fn prepare(redirections: &[Redirection]) -> Result<Vec<Target>, NulError> {
	redirections.iter()
		.map(|r| -> Result<Target, NulError> {
			Ok(Target { kind: r.kind, path: CString::new(r.target.as_os_str().as_bytes())? })
		})
		.collect()
}

/// Opens a redirection target. The descriptor is close-on-exec until it is
/// installed onto a standard stream.
pub fn open(kind: RedirectKind, path: &CStr) -> nix::Result<Fd> {
	let flags = match kind {
		RedirectKind::Input => OFlag::O_RDONLY,
		RedirectKind::OutputTruncate => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
		RedirectKind::OutputAppend => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
	};
	let mode = Mode::from_bits_truncate(0o644);
	let raw = fcntl::open(path, flags | OFlag::O_CLOEXEC, mode)?;
	// SAFETY: `open` just returned this descriptor and nothing else owns it.
	Ok(unsafe { Fd::from_raw_fd(raw) })
}

/// Applies redirections in order. A later redirection of the same stream
/// replaces an earlier one.
pub fn apply(targets: &[Target]) -> Result<(), RedirectError<'_>> {
	for target in targets {
		let fd = open(target.kind, &target.path)
			.map_err(|source| RedirectError { path: &target.path, source })?;
		fd.install_as(target.kind.stream())
			.map_err(|source| RedirectError { path: &target.path, source })?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use std::io::Write;
	use std::os::unix::io::{AsRawFd, IntoRawFd};

	fn cpath(path: &std::path::Path) -> CString {
		CString::new(path.as_os_str().as_bytes()).unwrap()
	}

	fn write_through(fd: Fd, data: &[u8]) {
		let mut file = unsafe { fs::File::from_raw_fd(fd.into_raw_fd()) };
		file.write_all(data).unwrap();
	}

	#[test]
	fn truncate_discards_old_contents() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out");
		fs::write(&path, "old contents\n").unwrap();
		let fd = open(RedirectKind::OutputTruncate, &cpath(&path)).unwrap();
		write_through(fd, b"new\n");
		assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
	}

	#[test]
	fn append_keeps_old_contents() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out");
		fs::write(&path, "old\n").unwrap();
		let fd = open(RedirectKind::OutputAppend, &cpath(&path)).unwrap();
		write_through(fd, b"new\n");
		assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
	}

	#[test]
	fn output_creates_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("fresh");
		let fd = open(RedirectKind::OutputTruncate, &cpath(&path)).unwrap();
		assert!(fd.is_cloexec().unwrap());
		drop(fd);
		assert!(path.exists());
	}

	#[test]
	fn input_requires_existing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = cpath(&dir.path().join("missing"));
		let err = open(RedirectKind::Input, &path).unwrap_err();
		assert_eq!(err, nix::Error::ENOENT);
	}

	#[test]
	fn input_is_read_only() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("in");
		fs::write(&path, "data").unwrap();
		let fd = open(RedirectKind::Input, &cpath(&path)).unwrap();
		let flags = fcntl::fcntl(fd.as_raw_fd(), fcntl::FcntlArg::F_GETFL).unwrap();
		assert_eq!(OFlag::from_bits_truncate(flags) & OFlag::O_ACCMODE, OFlag::O_RDONLY);
	}

	#[test]
	fn error_names_the_path() {
		let path = CString::new("/nonexistent/x").unwrap();
		let err = RedirectError { path: &path, source: nix::Error::ENOENT };
		assert!(err.to_string().starts_with("/nonexistent/x: "));
	}

	#[test]
	fn prepare_rejects_nul() {
		let redirections = vec![Redirection::new(RedirectKind::Input, "bad\0path")];
		assert!(prepare(&redirections).is_err());
	}
}
