use std::fmt;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind { Input, OutputTruncate, OutputAppend }

impl RedirectKind {
	/// The standard stream this redirection rebinds.
	pub fn stream(self) -> RawFd {
		match self {
			RedirectKind::Input => libc::STDIN_FILENO,
			RedirectKind::OutputTruncate | RedirectKind::OutputAppend => libc::STDOUT_FILENO,
		}
	}

	pub fn operator(self) -> &'static str {
		match self {
			RedirectKind::Input => "<",
			RedirectKind::OutputTruncate => ">",
			RedirectKind::OutputAppend => ">>",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
	pub kind: RedirectKind,
	pub target: PathBuf,
}

impl Redirection {
	pub fn new<P: Into<PathBuf>>(kind: RedirectKind, target: P) -> Redirection {
		Redirection { kind, target: target.into() }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
	pub argv: Vec<String>,
	pub redirections: Vec<Redirection>,
}

impl Command {
	pub fn new<I, S>(argv: I) -> Command where I: IntoIterator<Item = S>, S: Into<String> {
		Command { argv: argv.into_iter().map(Into::into).collect(), redirections: vec![] }
	}

	pub fn redirect<P: Into<PathBuf>>(mut self, kind: RedirectKind, target: P) -> Command {
		self.redirections.push(Redirection::new(kind, target));
		self
	}

	pub fn name(&self) -> &str {
		self.argv.first().map_or("", |s| s.as_str())
	}
}

/// Stage 0 first. Never empty once it leaves the parser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub background: bool,
}

impl Pipeline {
	pub fn new(commands: Vec<Command>) -> Pipeline {
		Pipeline { commands, background: false }
	}

	pub fn background(mut self) -> Pipeline {
		self.background = true;
		self
	}
}

fn write_word(f: &mut fmt::Formatter, word: &str) -> fmt::Result {
	let plain = !word.is_empty() && word.chars().all(|c| !c.is_whitespace() && !"|&<>'\"\\".contains(c));
	if plain {
		f.write_str(word)
	} else {
		write!(f, "'{}'", word.replace('\'', "'\\''"))
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, arg) in self.argv.iter().enumerate() {
			if i > 0 { f.write_str(" ")?; }
			write_word(f, arg)?;
		}
		for redirection in &self.redirections {
			write!(f, " {} ", redirection.kind.operator())?;
			write_word(f, &redirection.target.to_string_lossy())?;
		}
		Ok(())
	}
}

impl fmt::Display for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, command) in self.commands.iter().enumerate() {
			if i > 0 { f.write_str(" | ")?; }
			write!(f, "{}", command)?;
		}
		if self.background {
			f.write_str(" &")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pipeline_renders_as_command_line() {
		let pipeline = Pipeline::new(vec![
			Command::new(["grep", "a b"]).redirect(RedirectKind::Input, "in.txt"),
			Command::new(["wc", "-l"]).redirect(RedirectKind::OutputAppend, "out.txt"),
		]).background();
		assert_eq!(pipeline.to_string(), "grep 'a b' < in.txt | wc -l >> out.txt &");
	}

	#[test]
	fn quotes_embedded_single_quote() {
		let command = Command::new(["echo", "it's"]);
		assert_eq!(command.to_string(), "echo 'it'\\''s'");
	}

	#[test]
	fn redirection_streams() {
		assert_eq!(RedirectKind::Input.stream(), 0);
		assert_eq!(RedirectKind::OutputTruncate.stream(), 1);
		assert_eq!(RedirectKind::OutputAppend.stream(), 1);
	}
}
