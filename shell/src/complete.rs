//! Line-editor glue: tab completion and the colored prompt.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::builtin;
use crate::search::SearchCache;

const PROMPT_SUFFIX: &str = " $ ";
const BLUE: &str = "\x1b[1;34m";
const RESET: &str = "\x1b[0m";

pub struct ShellHelper {
	commands: Rc<RefCell<SearchCache>>,
	filenames: FilenameCompleter,
}

impl ShellHelper {
	pub fn new(commands: Rc<RefCell<SearchCache>>) -> ShellHelper {
		ShellHelper { commands, filenames: FilenameCompleter::new() }
	}

	fn command_names(&self, prefix: &str) -> Vec<Pair> {
		let cache = self.commands.borrow();
		let names: BTreeSet<&str> = builtin::NAMES.iter().copied()
			.filter(|name| name.starts_with(prefix))
			.chain(cache.matching(prefix))
			.collect();
		names.into_iter()
			.map(|name| Pair { display: name.to_owned(), replacement: name.to_owned() })
			.collect()
	}
}

/// Byte offset where the word under the cursor begins.
fn word_start(head: &str) -> usize {
	head.char_indices()
		.rev()
		.find(|&(_, c)| c.is_whitespace() || "|&<>".contains(c))
		.map_or(0, |(i, c)| i + c.len_utf8())
}

/// True when the text before a word leaves it in command position.
fn is_command_position(before: &str) -> bool {
	let before = before.trim_end();
	before.is_empty() || before.ends_with('|')
}

impl Completer for ShellHelper {
	type Candidate = Pair;

	fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
		let head = &line[.. pos];
		let start = word_start(head);
		let word = &head[start ..];
		if is_command_position(&head[.. start]) && !word.contains('/') {
			Ok((start, self.command_names(word)))
		} else {
			self.filenames.complete(line, pos, ctx)
		}
	}
}

impl Hinter for ShellHelper {
	type Hint = String;
}

impl Highlighter for ShellHelper {
	fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
		match prompt.strip_suffix(PROMPT_SUFFIX) {
			Some(dir) => Cow::Owned(format!("{}{}{}{}", BLUE, dir, RESET, PROMPT_SUFFIX)),
			None => Cow::Borrowed(prompt),
		}
	}
}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_word_start() {
		assert_eq!(word_start("ec"), 0);
		assert_eq!(word_start("ls -l fi"), 6);
		assert_eq!(word_start("cat<in"), 4);
		assert_eq!(word_start("ls "), 3);
	}

	#[test]
	fn command_positions() {
		assert!(is_command_position(""));
		assert!(is_command_position("ls | "));
		assert!(is_command_position("ls|"));
		assert!(!is_command_position("ls "));
		assert!(!is_command_position("cat <"));
	}

	#[test]
	fn completes_builtins() {
		let helper = ShellHelper::new(Rc::new(RefCell::new(SearchCache::default())));
		let names: Vec<String> = helper.command_names("ex").into_iter().map(|p| p.replacement).collect();
		assert_eq!(names, vec!["exit", "export"]);
	}

	#[test]
	fn colors_the_directory() {
		let helper = ShellHelper::new(Rc::new(RefCell::new(SearchCache::default())));
		assert_eq!(helper.highlight_prompt("/tmp $ ", true), "\x1b[1;34m/tmp\x1b[0m $ ");
		assert_eq!(helper.highlight_prompt("$ ", true), "$ ");
	}
}
