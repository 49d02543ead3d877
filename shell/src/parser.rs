use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("unterminated quote")]
	UnterminatedQuote,
	#[error("dangling escape")]
	DanglingEscape,
	#[error("empty command")]
	EmptyCommand,
	#[error("expected file after {0}")]
	MissingTarget(&'static str),
	#[error("& must be at end")]
	TrailingAmpersand,
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	Word(String),
	Pipe,
	Amp,
	Redirect(RedirectKind),
}

struct Lexer<'a> {
	chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
	fn is_operator(c: char) -> bool {
		matches!(c, '|' | '&' | '<' | '>')
	}

	fn skip_whitespaces(&mut self) {
		while let Some(&c) = self.chars.peek() {
			if !c.is_whitespace() { break; }
			self.chars.next();
		}
	}

	fn escaped(&mut self) -> ParseResult<char> {
		self.chars.next().ok_or(ParseError::DanglingEscape)
	}

	fn read_operator(&mut self, c: char) -> Token {
		match c {
			'|' => Token::Pipe,
			'&' => Token::Amp,
			'<' => Token::Redirect(RedirectKind::Input),
			_ => if self.chars.peek() == Some(&'>') {
				self.chars.next();
				Token::Redirect(RedirectKind::OutputAppend)
			} else {
				Token::Redirect(RedirectKind::OutputTruncate)
			},
		}
	}

	fn read_word(&mut self) -> ParseResult<String> {
		let mut word = String::new();
		while let Some(&c) = self.chars.peek() {
			if c.is_whitespace() || Lexer::is_operator(c) { break; }
			self.chars.next();
			match c {
				'\'' => loop {
					match self.chars.next() {
						Some('\'') => break,
						Some(c) => word.push(c),
						None => return Err(ParseError::UnterminatedQuote),
					}
				},
				'"' => loop {
					match self.chars.next() {
						Some('"') => break,
						Some('\\') => word.push(self.escaped()?),
						Some(c) => word.push(c),
						None => return Err(ParseError::UnterminatedQuote),
					}
				},
				'\\' => word.push(self.escaped()?),
				c => word.push(c),
			}
		}
		Ok(word)
	}

	fn tokenize(mut self) -> ParseResult<Vec<Token>> {
		let mut tokens = vec![];
		loop {
			self.skip_whitespaces();
			match self.chars.peek() {
				None => return Ok(tokens),
				Some(&c) if Lexer::is_operator(c) => {
					self.chars.next();
					tokens.push(self.read_operator(c));
				},
				Some(_) => tokens.push(Token::Word(self.read_word()?)),
			}
		}
	}
}

struct Parser {
	tokens: std::vec::IntoIter<Token>,
}

impl Parser {
	fn parse_pipeline(&mut self) -> ParseResult<Option<Pipeline>> {
		let mut commands: Vec<Command> = vec![];
		let mut current = Command::default();
		let mut background = false;

		while let Some(token) = self.tokens.next() {
			if background {
				return Err(ParseError::TrailingAmpersand);
			}
			match token {
				Token::Word(word) => current.argv.push(word),
				Token::Pipe => {
					if current.argv.is_empty() {
						return Err(ParseError::EmptyCommand);
					}
					commands.push(std::mem::take(&mut current));
				},
				Token::Amp => background = true,
				Token::Redirect(kind) => match self.tokens.next() {
					Some(Token::Word(target)) => current.redirections.push(Redirection::new(kind, target)),
					_ => return Err(ParseError::MissingTarget(kind.operator())),
				},
			}
		}

		if current.argv.is_empty() {
			if commands.is_empty() && current.redirections.is_empty() && !background {
				return Ok(None);
			}
			return Err(ParseError::EmptyCommand);
		}
		commands.push(current);
		Ok(Some(Pipeline { commands, background }))
	}
}

/// Parses one input line. A blank line is `Ok(None)`.
pub fn parse(line: &str) -> ParseResult<Option<Pipeline>> {
	let tokens = Lexer { chars: line.chars().peekable() }.tokenize()?;
	Parser { tokens: tokens.into_iter() }.parse_pipeline()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parsed(line: &str) -> Pipeline {
		parse(line).unwrap().unwrap()
	}

	#[test]
	fn blank_line_is_nothing() {
		assert_eq!(parse("   \t").unwrap(), None);
		assert_eq!(parse("").unwrap(), None);
	}

	#[test]
	fn simple_pipeline() {
		let pipeline = parsed("echo hi | wc -l");
		assert_eq!(pipeline, Pipeline::new(vec![Command::new(["echo", "hi"]), Command::new(["wc", "-l"])]));
	}

	#[test]
	fn operators_need_no_spaces() {
		let pipeline = parsed("cat<in|sort>>out&");
		assert!(pipeline.background);
		assert_eq!(pipeline.commands[0], Command::new(["cat"]).redirect(RedirectKind::Input, "in"));
		assert_eq!(pipeline.commands[1], Command::new(["sort"]).redirect(RedirectKind::OutputAppend, "out"));
	}

	#[test]
	fn redirections_keep_their_order() {
		let pipeline = parsed("> a echo x >> a");
		assert_eq!(pipeline.commands[0], Command::new(["echo", "x"])
			.redirect(RedirectKind::OutputTruncate, "a")
			.redirect(RedirectKind::OutputAppend, "a"));
	}

	#[test]
	fn quotes_and_escapes() {
		let pipeline = parsed(r#"echo 'a | b' "c \"d\"" e\ f"#);
		assert_eq!(pipeline.commands[0].argv, vec!["echo", "a | b", "c \"d\"", "e f"]);
	}

	#[test]
	fn errors() {
		assert_eq!(parse("echo 'abc"), Err(ParseError::UnterminatedQuote));
		assert_eq!(parse("echo abc\\"), Err(ParseError::DanglingEscape));
		assert_eq!(parse("| wc"), Err(ParseError::EmptyCommand));
		assert_eq!(parse("ls |"), Err(ParseError::EmptyCommand));
		assert_eq!(parse("ls | | wc"), Err(ParseError::EmptyCommand));
		assert_eq!(parse("cat <"), Err(ParseError::MissingTarget("<")));
		assert_eq!(parse("cat > | wc"), Err(ParseError::MissingTarget(">")));
		assert_eq!(parse("sleep 1 & ls"), Err(ParseError::TrailingAmpersand));
		assert_eq!(parse("&"), Err(ParseError::EmptyCommand));
	}
}
