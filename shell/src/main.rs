use std::env;
use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jsh::config::Config;
use jsh::{repl, signal, Session};

fn main() -> ExitCode {
	tracing_subscriber::registry()
		.with(fmt::layer().with_writer(io::stderr))
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.init();

	match run() {
		Ok(code) => ExitCode::from(code as u8),
		Err(e) => {
			eprintln!("jsh: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn start(config: Config) -> Result<Session> {
	signal::install_shell_handlers(config.interactive)
		.context("Failed to install signal handlers")?;
	Ok(Session::new(config))
}

fn run() -> Result<i32> {
	let args: Vec<String> = env::args().collect();

	match args.get(1).map(|s| s.as_str()) {
		None => {
			let mut session = start(Config::from_env())?;
			if session.config.interactive {
				repl::run(&mut session)
			} else {
				repl::run_stream(&mut session, io::stdin().lock())
			}
		}

		Some("-c") => {
			let line = args.get(2)
				.context("-c requires a command argument")?;
			let mut session = start(Config::from_env().with_interactive(false))?;
			Ok(session.run_line(line))
		}

		Some("--help" | "-h") => {
			print_help();
			Ok(0)
		}

		Some("--version" | "-V") => {
			println!("jsh {}", env!("CARGO_PKG_VERSION"));
			Ok(0)
		}

		Some(unknown) => {
			eprintln!("Unknown option: {unknown}");
			eprintln!("Run 'jsh --help' for usage.");
			Ok(2)
		}
	}
}

fn print_help() {
	println!(r#"jsh {}

Usage:
  jsh                 Interactive shell (reads lines from stdin when it is not a terminal)
  jsh -c <line>       Run one line and exit with its status

Options:
  -c <line>           Run a command line and exit
  -h, --help          Show this help
  -V, --version       Show version

Environment:
  JSH_HISTFILE        History file (default: $HOME/.jsh_history, empty disables)
  JSH_HISTSIZE        History entries kept (default: 1000)
  RUST_LOG            Diagnostic log filter (default: warn)
"#, env!("CARGO_PKG_VERSION"));
}
