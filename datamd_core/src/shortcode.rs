use std::ops::Range;

use logos::Logos;
use snailquote::unescape;

use crate::cache::CacheParams;

/// Raw tokens of a single shortcode line.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawToken {
	#[token("{{")]
	Open,
	#[token("}}")]
	Close,
	#[token("=")]
	Equals,
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[{}]")]
	Brace,
	#[regex(r#"[^ \t\r\n"'={}]+"#)]
	Word,
}

/// A single argument following the path of a shortcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
	/// A bare word or quoted string.
	Positional(String),
	/// `key=value` or `key="quoted value"`.
	Keyword(String, String),
}

/// A parsed `{{ command "path" args }}` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
	pub command: String,
	pub path: String,
	pub args: Vec<Argument>,
}

impl Shortcode {
	/// Positional arguments in order.
	pub fn positional(&self) -> Vec<&str> {
		self.args
			.iter()
			.filter_map(|arg| {
				match arg {
					Argument::Positional(value) => Some(value.as_str()),
					Argument::Keyword(..) => None,
				}
			})
			.collect()
	}

	pub fn positional_at(&self, index: usize) -> Option<&str> {
		self.positional().get(index).copied()
	}

	/// The last value given for `key`.
	pub fn keyword(&self, key: &str) -> Option<&str> {
		self.args.iter().rev().find_map(|arg| {
			match arg {
				Argument::Keyword(name, value) if name == key => Some(value.as_str()),
				_ => None,
			}
		})
	}

	pub fn keywords(&self) -> impl Iterator<Item = (&str, &str)> {
		self.args.iter().filter_map(|arg| {
			match arg {
				Argument::Keyword(name, value) => Some((name.as_str(), value.as_str())),
				Argument::Positional(_) => None,
			}
		})
	}

	/// Parameters that identify this rendering in the cache. Positional
	/// arguments are keyed by their index.
	pub fn cache_params(&self) -> CacheParams {
		let mut params = CacheParams::new();
		params.insert("command".to_string(), self.command.clone());

		for (index, value) in self.positional().into_iter().enumerate() {
			params.insert(format!("arg{index}"), value.to_string());
		}

		for (key, value) in self.keywords() {
			params.insert(key.to_string(), value.to_string());
		}

		params
	}
}

/// Parse a line into a [`Shortcode`].
///
/// The line must start with `{{`, followed by a command word, a non empty
/// double quoted path, optional arguments and `}}`. Text after the closing
/// `}}` is ignored. Returns `None` for any other line.
pub fn parse_shortcode(line: &str) -> Option<Shortcode> {
	let tokens: Vec<(Result<RawToken, ()>, Range<usize>)> =
		RawToken::lexer(line).spanned().collect();
	let mut cursor = Cursor {
		source: line,
		tokens,
		index: 0,
	};

	if !cursor.eat(RawToken::Open) {
		return None;
	}
	cursor.skip_whitespace();

	let command = cursor.take(RawToken::Word)?;
	if !command.chars().all(|c| c.is_alphanumeric() || c == '_') {
		return None;
	}

	if !cursor.eat(RawToken::Whitespace) {
		return None;
	}

	let quoted = cursor.take(RawToken::DoubleQuotedString)?;
	let path = &quoted[1..quoted.len() - 1];
	if path.is_empty() {
		return None;
	}

	let mut args = vec![];
	loop {
		let separated = cursor.skip_whitespace();
		match cursor.peek() {
			Some(Ok(RawToken::Close)) => break,
			None => return None,
			Some(_) if !separated => return None,
			Some(_) => args.push(cursor.argument()?),
		}
	}

	Some(Shortcode {
		command: command.to_string(),
		path: path.to_string(),
		args,
	})
}

/// Whether `line` would be treated as a shortcode.
pub fn is_shortcode(line: &str) -> bool {
	parse_shortcode(line).is_some()
}

struct Cursor<'a> {
	source: &'a str,
	tokens: Vec<(Result<RawToken, ()>, Range<usize>)>,
	index: usize,
}

impl<'a> Cursor<'a> {
	fn peek(&self) -> Option<Result<RawToken, ()>> {
		self.tokens.get(self.index).map(|(token, _)| *token)
	}

	fn slice(&self) -> &'a str {
		let (_, span) = &self.tokens[self.index];
		&self.source[span.clone()]
	}

	fn eat(&mut self, expected: RawToken) -> bool {
		if self.peek() == Some(Ok(expected)) {
			self.index += 1;
			return true;
		}

		false
	}

	fn take(&mut self, expected: RawToken) -> Option<&'a str> {
		if self.peek() != Some(Ok(expected)) {
			return None;
		}

		let slice = self.slice();
		self.index += 1;
		Some(slice)
	}

	/// Skip whitespace and report whether any was found.
	fn skip_whitespace(&mut self) -> bool {
		let mut skipped = false;
		while self.eat(RawToken::Whitespace) {
			skipped = true;
		}

		skipped
	}

	/// Read one argument: every token up to the next whitespace or `}}`.
	fn argument(&mut self) -> Option<Argument> {
		let mut parts: Vec<(RawToken, &'a str)> = vec![];

		while let Some(token) = self.peek() {
			match token {
				Ok(RawToken::Whitespace | RawToken::Close) => break,
				Ok(RawToken::Open) | Err(()) => return None,
				Ok(token) => {
					parts.push((token, self.slice()));
					self.index += 1;
				}
			}
		}

		let is_keyword = matches!(
			parts.as_slice(),
			[(RawToken::Word, key), (RawToken::Equals, _), ..] if is_identifier(key)
		);

		if is_keyword {
			let key = parts[0].1.to_string();
			return Some(Argument::Keyword(key, join_parts(&parts[2..])?));
		}

		Some(Argument::Positional(join_parts(&parts)?))
	}
}

fn is_identifier(value: &str) -> bool {
	let mut chars = value.chars();
	chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn join_parts(parts: &[(RawToken, &str)]) -> Option<String> {
	let mut value = String::new();

	for (token, slice) in parts {
		match token {
			RawToken::DoubleQuotedString | RawToken::SingleQuotedString => {
				let inner = &slice[1..slice.len() - 1];
				if inner.contains('\\') {
					value.push_str(&unescape(inner).ok()?);
				} else {
					value.push_str(inner);
				}
			}
			_ => value.push_str(slice),
		}
	}

	Some(value)
}
