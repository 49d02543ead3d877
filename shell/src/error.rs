use std::ffi::NulError;

use thiserror::Error;

/// Failure to launch a pipeline. Nothing was left running unreaped.
#[derive(Debug, Error)]
pub enum ExecError {
	#[error("pipe: {0}")]
	ResourceExhausted(#[source] nix::Error),
	#[error("{op}: {source}")]
	Setup {
		op: &'static str,
		#[source]
		source: nix::Error,
	},
	#[error("argument contains a NUL byte: {0}")]
	InvalidArgument(#[from] NulError),
}

impl ExecError {
	pub fn setup(op: &'static str) -> impl FnOnce(nix::Error) -> ExecError {
		move |source| ExecError::Setup { op, source }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn setup_failure_names_the_operation() {
		let err = ExecError::setup("fork")(nix::Error::EAGAIN);
		assert!(err.to_string().starts_with("fork: "));
		let err = ExecError::ResourceExhausted(nix::Error::EMFILE);
		assert!(err.to_string().starts_with("pipe: "));
	}
}
