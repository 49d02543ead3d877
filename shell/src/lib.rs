//! A small job-control shell: pipelines of external programs wired through
//! pipes, one process group per pipeline, and a table of background jobs.

pub mod builtin;
pub mod complete;
pub mod config;
pub mod error;
pub mod eval;
pub mod fd;
pub mod job;
pub mod parser;
pub mod pipe;
pub mod redirect;
pub mod repl;
pub mod search;
pub mod session;
pub mod signal;
pub mod terminal;
pub mod types;

pub use crate::error::ExecError;
pub use crate::eval::{ExecOutcome, Executor};
pub use crate::job::{Job, JobId, JobState, JobTable, ProcessStatus};
pub use crate::session::Session;
pub use crate::types::{Command, Pipeline, RedirectKind, Redirection};
