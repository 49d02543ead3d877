//! Pipe plumbing for an N-stage pipeline.

use nix::fcntl::OFlag;
use nix::unistd;

use crate::fd::Fd;

#[derive(Debug)]
struct PipeEnds {
	read: Option<Fd>,
	write: Option<Fd>,
}

/// The N-1 pipes joining N stages. Pipe `i` carries stage `i`'s stdout to
/// stage `i+1`'s stdin.
#[derive(Debug)]
pub struct Topology {
	pipes: Vec<PipeEnds>,
}

/// The pipe ends one stage keeps for its standard streams.
#[derive(Debug, Default)]
pub struct StageEnds {
	pub stdin: Option<Fd>,
	pub stdout: Option<Fd>,
}

/// Indexes of the pipes a stage reads from and writes to.
pub fn stage_wiring(stage: usize, stages: usize) -> (Option<usize>, Option<usize>) {
	let input = if stage > 0 { Some(stage - 1) } else { None };
	let output = if stage + 1 < stages { Some(stage) } else { None };
	(input, output)
}

impl Topology {
	/// Every end is created close-on-exec.
	pub fn build(stages: usize) -> nix::Result<Topology> {
		let count = stages.saturating_sub(1);
		let mut pipes = Vec::with_capacity(count);
		for _ in 0 .. count {
			let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
			pipes.push(PipeEnds { read: Some(read.into()), write: Some(write.into()) });
		}
		Ok(Topology { pipes })
	}

	pub fn pipe_count(&self) -> usize {
		self.pipes.len()
	}

	pub fn open_ends(&self) -> usize {
		self.pipes.iter().map(|p| p.read.is_some() as usize + p.write.is_some() as usize).sum()
	}

	/// Moves out the ends `stage` needs and closes every other end, including
	/// those of pipes the stage has nothing to do with.
	pub fn take_stage(&mut self, stage: usize) -> StageEnds {
		let (input, output) = stage_wiring(stage, self.pipes.len() + 1);
		let ends = StageEnds {
			stdin: input.and_then(|i| self.pipes[i].read.take()),
			stdout: output.and_then(|i| self.pipes[i].write.take()),
		};
		self.close_all();
		ends
	}

	pub fn close_all(&mut self) {
		self.pipes.clear();
	}
}

impl StageEnds {
	/// Rebinds stdin/stdout onto the held pipe ends. The original
	/// descriptors are closed afterwards.
	pub fn install(self) -> Result<(), (&'static str, nix::Error)> {
		if let Some(fd) = self.stdin {
			fd.install_as(libc::STDIN_FILENO).map_err(|e| ("dup2(pipe in)", e))?;
		}
		if let Some(fd) = self.stdout {
			fd.install_as(libc::STDOUT_FILENO).map_err(|e| ("dup2(pipe out)", e))?;
		}
		Ok(())
	}
}
