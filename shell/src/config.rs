use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

const HISTFILE_KEY: &str = "JSH_HISTFILE";
const HISTSIZE_KEY: &str = "JSH_HISTSIZE";
const DEFAULT_HISTFILE: &str = ".jsh_history";
const DEFAULT_HISTSIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Job control, prompt and completion notices are on.
	pub interactive: bool,
	pub history_path: Option<PathBuf>,
	pub history_size: usize,
}

impl Default for Config {
	fn default() -> Config {
		Config { interactive: false, history_path: None, history_size: DEFAULT_HISTSIZE }
	}
}

impl Config {
	pub fn from_env() -> Config {
		Config::from_vars(|key| env::var_os(key).map(|v| v.to_string_lossy().into_owned()))
			.with_interactive(io::stdin().is_terminal())
	}

	fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Config {
		let history_path = match var(HISTFILE_KEY) {
			Some(path) if path.is_empty() => None,
			Some(path) => Some(PathBuf::from(path)),
			None => var("HOME").map(|home| PathBuf::from(home).join(DEFAULT_HISTFILE)),
		};
		let history_size = var(HISTSIZE_KEY)
			.and_then(|s| s.trim().parse().ok())
			.unwrap_or(DEFAULT_HISTSIZE);
		Config { interactive: false, history_path, history_size }
	}

	pub fn with_interactive(mut self, interactive: bool) -> Config {
		self.interactive = interactive;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn config(vars: &[(&str, &str)]) -> Config {
		let vars: HashMap<String, String> = vars.iter().map(|&(k, v)| (k.to_owned(), v.to_owned())).collect();
		Config::from_vars(|key| vars.get(key).cloned())
	}

	#[test]
	fn history_defaults_to_home() {
		let c = config(&[("HOME", "/home/me")]);
		assert_eq!(c.history_path, Some(PathBuf::from("/home/me/.jsh_history")));
		assert_eq!(c.history_size, 1000);
		assert!(!c.interactive);
	}

	#[test]
	fn overrides() {
		let c = config(&[("HOME", "/home/me"), ("JSH_HISTFILE", "/tmp/h"), ("JSH_HISTSIZE", "50")]);
		assert_eq!(c.history_path, Some(PathBuf::from("/tmp/h")));
		assert_eq!(c.history_size, 50);
	}

	#[test]
	fn empty_histfile_disables_history() {
		assert_eq!(config(&[("HOME", "/h"), ("JSH_HISTFILE", "")]).history_path, None);
		assert_eq!(config(&[]).history_path, None);
	}

	#[test]
	fn bad_histsize_falls_back() {
		assert_eq!(config(&[("JSH_HISTSIZE", "lots")]).history_size, 1000);
	}
}
