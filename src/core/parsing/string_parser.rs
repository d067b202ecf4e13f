// Token parser for chat-command arguments.
//
// Prefix commands arrive as one raw string ("!remind 10m \"stand up\" --silent").
// This module splits that string into tokens the way users expect from a
// shell-like prompt, and separates `--flag value` style named arguments from
// positional ones. Every token remembers where it came from in the input so
// argument errors can point at the offending text.
//
// NO Discord dependencies here - converters and the Discord layer build on top.

use std::ops::Range;
use thiserror::Error;

// ============================================================================
// TOKENS
// ============================================================================

/// A single argument token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The unescaped, unquoted text of the token.
    pub value: String,
    /// Whether the token opened with a quote character.
    /// Quoted tokens are never treated as flags.
    pub quoted: bool,
    /// Byte range of the token in the original input.
    pub span: Range<usize>,
}

/// A `--name value` or `--name=value` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedToken {
    /// Lowercased flag name, without the leading dashes.
    pub name: String,
    /// `None` when the flag was given without a value.
    pub value: Option<Token>,
    /// Byte range covering the flag and its value.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unterminated quote starting at position {position}")]
    UnterminatedQuote { position: usize },

    #[error("Dangling escape character at position {position}")]
    DanglingEscape { position: usize },
}

impl ParseError {
    /// Byte offset in the input the error refers to.
    pub fn position(&self) -> usize {
        match self {
            ParseError::UnterminatedQuote { position } => *position,
            ParseError::DanglingEscape { position } => *position,
        }
    }
}

// ============================================================================
// CURSOR-BASED PARSER
// ============================================================================

/// Walks an input string one token at a time.
///
/// Rules:
/// - whitespace separates tokens, runs of whitespace collapse
/// - `"..."` groups text and may appear mid-word (`ab"c d"` is `abc d`)
/// - `'...'` groups text only when it opens a token, so apostrophes in
///   words like `don't` stay literal
/// - a backslash escapes a following quote, backslash or whitespace;
///   any other backslash is kept as-is
#[derive(Debug, Clone)]
pub struct StringParser<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> StringParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    /// Current byte offset into the input.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Everything that has not been consumed yet, minus leading whitespace.
    pub fn remaining(&self) -> &'a str {
        self.input[self.cursor..].trim_start()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_empty()
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&self) -> Result<Option<Token>, ParseError> {
        self.clone().next_token()
    }

    /// Consume and return the next token, or `None` once the input is used up.
    pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        let input = self.input;
        let rest = &input[self.cursor..];
        let skipped = rest.len() - rest.trim_start().len();
        let start = self.cursor + skipped;

        if start >= input.len() {
            self.cursor = input.len();
            return Ok(None);
        }

        let mut value = String::new();
        let mut quote: Option<(char, usize)> = None;
        let mut quoted = false;
        let mut end = input.len();

        let mut chars = input[start..].char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            let position = start + offset;

            if c == '\\' {
                match chars.peek() {
                    None => return Err(ParseError::DanglingEscape { position }),
                    Some(&(_, next)) if is_escapable(next) => {
                        value.push(next);
                        chars.next();
                    }
                    Some(_) => value.push('\\'),
                }
                continue;
            }

            match quote {
                Some((open, _)) if c == open => quote = None,
                Some(_) => value.push(c),
                None if c == '"' => {
                    if position == start {
                        quoted = true;
                    }
                    quote = Some((c, position));
                }
                None if c == '\'' && position == start => {
                    quoted = true;
                    quote = Some((c, position));
                }
                None if c.is_whitespace() => {
                    end = position;
                    break;
                }
                None => value.push(c),
            }
        }

        if let Some((_, position)) = quote {
            return Err(ParseError::UnterminatedQuote { position });
        }

        self.cursor = end;
        Ok(Some(Token {
            value,
            quoted,
            span: start..end,
        }))
    }
}

fn is_escapable(c: char) -> bool {
    c == '"' || c == '\'' || c == '\\' || c.is_whitespace()
}

/// Split the whole input into tokens, ignoring flag syntax.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut parser = StringParser::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = parser.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

// ============================================================================
// POSITIONAL / NAMED SPLIT
// ============================================================================

/// Input split into positional tokens and named flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub positional: Vec<Token>,
    pub named: Vec<NamedToken>,
    /// Byte offset of a bare `--` separator, if one was given.
    pub separator: Option<usize>,
    pub raw: String,
}

impl ParsedInput {
    /// Text of all positional tokens from `index` onwards.
    ///
    /// Returns the raw input slice when nothing in that range was quoted,
    /// escaped or interleaved with flags, so newlines and spacing survive.
    /// Otherwise the token values are joined with single spaces.
    pub fn rest_from(&self, index: usize) -> Option<String> {
        let first = self.positional.get(index)?;
        let tail = &self.positional[index..];

        let flags_after = self
            .named
            .iter()
            .any(|named| named.span.start > first.span.start)
            || self.separator.is_some_and(|sep| sep > first.span.start);
        let verbatim = tail
            .iter()
            .all(|token| token.value == self.raw[token.span.clone()]);

        if !flags_after && verbatim {
            let last = tail.last().map(|t| t.span.end).unwrap_or(first.span.end);
            return Some(self.raw[first.span.start..last].to_string());
        }

        Some(
            tail.iter()
                .map(|token| token.value.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Tokenize `input` and split named flags from positional arguments.
///
/// `--name value` and `--name=value` are flags. A flag directly followed by
/// another flag (or the end of input) has no value. A bare `--` ends flag
/// parsing; everything after it is positional.
pub fn parse(input: &str) -> Result<ParsedInput, ParseError> {
    parse_flags_before(input, usize::MAX)
}

/// Like [`parse`], but tokens starting at or after byte `flags_end` are
/// always positional.
pub fn parse_flags_before(input: &str, flags_end: usize) -> Result<ParsedInput, ParseError> {
    let mut parser = StringParser::new(input);
    let mut positional = Vec::new();
    let mut named = Vec::new();
    let mut separator = None;
    let mut pending: Option<(String, Range<usize>)> = None;

    while let Some(token) = parser.next_token()? {
        if separator.is_none() && !token.quoted && token.span.start < flags_end {
            if token.value == "--" {
                if let Some((name, span)) = pending.take() {
                    named.push(NamedToken { name, value: None, span });
                }
                separator = Some(token.span.start);
                continue;
            }

            if let Some((name, inline_value)) = split_flag(input, &token) {
                if let Some((name, span)) = pending.take() {
                    named.push(NamedToken { name, value: None, span });
                }
                match inline_value {
                    Some(value) => named.push(NamedToken {
                        name,
                        value: Some(value),
                        span: token.span.clone(),
                    }),
                    None => pending = Some((name, token.span.clone())),
                }
                continue;
            }
        }

        if let Some((name, span)) = pending.take() {
            named.push(NamedToken {
                name,
                span: span.start..token.span.end,
                value: Some(token),
            });
            continue;
        }

        positional.push(token);
    }

    if let Some((name, span)) = pending.take() {
        named.push(NamedToken { name, value: None, span });
    }

    Ok(ParsedInput {
        positional,
        named,
        separator,
        raw: input.to_string(),
    })
}

/// Recognise `--name` / `--name=value`. Flag names start with a letter.
fn split_flag(input: &str, token: &Token) -> Option<(String, Option<Token>)> {
    let body = token.value.strip_prefix("--")?;
    let first = body.chars().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }

    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (body, None),
    };

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    let value = value.map(|value| {
        let raw = &input[token.span.clone()];
        let value_start = raw
            .find('=')
            .map(|idx| token.span.start + idx + 1)
            .unwrap_or(token.span.end);
        Token {
            value: value.to_string(),
            quoted: input[value_start..token.span.end].starts_with(['"', '\'']),
            span: value_start..token.span.end,
        }
    });

    Some((name.to_ascii_lowercase(), value))
}
