//! JSON lexer
//!
//! Scans the input lazily, one token per call, tracking the byte offset of
//! each token for error reporting. String literals are decoded (escapes
//! included) straight into blocks from the session's allocator; numbers are
//! classified as Int or Float while scanning.
//!
//! A lexer never seeks backwards. To restart, build a new one at a saved
//! offset with [`Lexer::at`].

use memchr::memchr2;

use super::alloc::{Allocator, AllocatorAdapter};
use super::builder::{Guard, StrBuilder};
use super::error::{LexErrorKind, ParseError};
use super::value::Str;

/// A token produced by the lexer
pub(crate) enum Token<'h, A: Allocator> {
    /// `{`
    BeginObject,
    /// `}`
    EndObject,
    /// `[`
    BeginArray,
    /// `]`
    EndArray,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// Decoded string literal
    String(Guard<'h, A, Str>),
    /// Number without fraction or exponent that fits in i64
    Int(i64),
    /// Any other number
    Float(f64),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// End of input
    End,
}

impl<A: Allocator> Token<'_, A> {
    /// Short description used in syntax errors
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Token::BeginObject => "'{'",
            Token::EndObject => "'}'",
            Token::BeginArray => "'['",
            Token::EndArray => "']'",
            Token::Colon => "':'",
            Token::Comma => "','",
            Token::String(_) => "a string",
            Token::Int(_) | Token::Float(_) => "a number",
            Token::True | Token::False => "a boolean",
            Token::Null => "null",
            Token::End => "end of input",
        }
    }
}

/// A token and the byte offset where it starts
pub(crate) struct Lexed<'h, A: Allocator> {
    pub(crate) token: Token<'h, A>,
    pub(crate) offset: usize,
}

/// Lazy token scanner over a byte buffer
pub(crate) struct Lexer<'a, 'h, A: Allocator> {
    input: &'a [u8],
    pos: usize,
    heap: &'h AllocatorAdapter<A>,
}

#[inline]
fn lex_error(kind: LexErrorKind, offset: usize) -> ParseError {
    ParseError::Lexical { kind, offset }
}

#[inline]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

impl<'a, 'h, A: Allocator> Lexer<'a, 'h, A> {
    /// Lexer at the start of `input`
    ///
    /// `input` must be valid UTF-8.
    pub(crate) fn new(input: &'a [u8], heap: &'h AllocatorAdapter<A>) -> Self {
        Self::at(input, 0, heap)
    }

    /// Lexer resuming at byte `offset`
    pub(crate) fn at(input: &'a [u8], offset: usize, heap: &'h AllocatorAdapter<A>) -> Self {
        Self {
            input,
            pos: offset.min(input.len()),
            heap,
        }
    }

    /// Scan the next token
    pub(crate) fn next_token(&mut self) -> Result<Lexed<'h, A>, ParseError> {
        self.skip_whitespace();
        let offset = self.pos;

        let Some(&b) = self.input.get(self.pos) else {
            return Ok(Lexed {
                token: Token::End,
                offset,
            });
        };

        let token = match b {
            b'{' => self.punct(Token::BeginObject),
            b'}' => self.punct(Token::EndObject),
            b'[' => self.punct(Token::BeginArray),
            b']' => self.punct(Token::EndArray),
            b':' => self.punct(Token::Colon),
            b',' => self.punct(Token::Comma),
            b'"' => {
                self.pos += 1;
                Token::String(self.lex_string()?)
            }
            b'-' | b'0'..=b'9' => self.lex_number()?,
            b't' => self.lex_literal(b"true", Token::True)?,
            b'f' => self.lex_literal(b"false", Token::False)?,
            b'n' => self.lex_literal(b"null", Token::Null)?,
            _ => return Err(lex_error(LexErrorKind::UnexpectedCharacter, offset)),
        };

        Ok(Lexed { token, offset })
    }

    #[inline]
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && is_whitespace(self.input[self.pos]) {
            self.pos += 1;
        }
    }

    #[inline]
    fn punct(&mut self, token: Token<'h, A>) -> Token<'h, A> {
        self.pos += 1;
        token
    }

    fn lex_literal(
        &mut self,
        word: &'static [u8],
        token: Token<'h, A>,
    ) -> Result<Token<'h, A>, ParseError> {
        if self.input[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(token)
        } else {
            Err(lex_error(LexErrorKind::InvalidLiteral, self.pos))
        }
    }

    /// Decode a string body; `pos` is just past the opening quote
    fn lex_string(&mut self) -> Result<Guard<'h, A, Str>, ParseError> {
        let mut out = StrBuilder::new(self.heap);

        loop {
            let rest = &self.input[self.pos..];
            let Some(stop) = memchr2(b'"', b'\\', rest) else {
                if let Some(at) = rest.iter().position(|&b| b < 0x20) {
                    return Err(lex_error(LexErrorKind::ControlCharacter, self.pos + at));
                }
                return Err(lex_error(
                    LexErrorKind::UnterminatedString,
                    self.input.len(),
                ));
            };

            let run = &rest[..stop];
            if let Some(at) = run.iter().position(|&b| b < 0x20) {
                return Err(lex_error(LexErrorKind::ControlCharacter, self.pos + at));
            }
            out.extend(run)?;
            self.pos += stop;

            if self.input[self.pos] == b'"' {
                self.pos += 1;
                return Ok(out.finish()?);
            }

            let escape_at = self.pos;
            let Some(&e) = self.input.get(self.pos + 1) else {
                return Err(lex_error(
                    LexErrorKind::UnterminatedString,
                    self.input.len(),
                ));
            };
            self.pos += 2;

            match e {
                b'"' => out.push(b'"')?,
                b'\\' => out.push(b'\\')?,
                b'/' => out.push(b'/')?,
                b'b' => out.push(0x08)?,
                b'f' => out.push(0x0c)?,
                b'n' => out.push(b'\n')?,
                b'r' => out.push(b'\r')?,
                b't' => out.push(b'\t')?,
                b'u' => {
                    let c = self.lex_unicode_escape(escape_at)?;
                    out.push_char(c)?;
                }
                _ => return Err(lex_error(LexErrorKind::InvalidEscape, escape_at)),
            }
        }
    }

    /// Four hex digits at `pos`
    fn hex4(&mut self, escape_at: usize) -> Result<u32, ParseError> {
        let digits = self
            .input
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| lex_error(LexErrorKind::InvalidEscape, escape_at))?;

        let mut code = 0u32;
        for &d in digits {
            let nibble = (d as char)
                .to_digit(16)
                .ok_or_else(|| lex_error(LexErrorKind::InvalidEscape, escape_at))?;
            code = code << 4 | nibble;
        }
        self.pos += 4;
        Ok(code)
    }

    /// Rest of a `\u` escape; `pos` is just past the `u`
    ///
    /// A high surrogate must be followed by a `\u` low surrogate.
    fn lex_unicode_escape(&mut self, escape_at: usize) -> Result<char, ParseError> {
        let invalid = || lex_error(LexErrorKind::InvalidEscape, escape_at);
        let first = self.hex4(escape_at)?;

        let code = match first {
            0xD800..=0xDBFF => {
                if !self.input[self.pos..].starts_with(b"\\u") {
                    return Err(invalid());
                }
                let low_at = self.pos;
                self.pos += 2;
                let second = self.hex4(low_at)?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(lex_error(LexErrorKind::InvalidEscape, low_at));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(invalid()),
            _ => first,
        };

        char::from_u32(code).ok_or_else(invalid)
    }

    /// Number starting at `pos`
    fn lex_number(&mut self) -> Result<Token<'h, A>, ParseError> {
        let input = self.input;
        let start = self.pos;
        let mut p = start;

        let digits_from = |mut p: usize| {
            while p < input.len() && input[p].is_ascii_digit() {
                p += 1;
            }
            p
        };

        if input.get(p) == Some(&b'-') {
            p += 1;
        }
        match input.get(p) {
            Some(b'0') => {
                p += 1;
                if input.get(p).is_some_and(u8::is_ascii_digit) {
                    return Err(lex_error(LexErrorKind::InvalidNumber, p));
                }
            }
            Some(b'1'..=b'9') => p = digits_from(p + 1),
            _ => return Err(lex_error(LexErrorKind::InvalidNumber, p)),
        }

        let mut is_float = false;
        if input.get(p) == Some(&b'.') {
            p += 1;
            if !input.get(p).is_some_and(u8::is_ascii_digit) {
                return Err(lex_error(LexErrorKind::InvalidNumber, p));
            }
            p = digits_from(p);
            is_float = true;
        }
        if matches!(input.get(p), Some(b'e' | b'E')) {
            p += 1;
            if matches!(input.get(p), Some(b'+' | b'-')) {
                p += 1;
            }
            if !input.get(p).is_some_and(u8::is_ascii_digit) {
                return Err(lex_error(LexErrorKind::InvalidNumber, p));
            }
            p = digits_from(p);
            is_float = true;
        }

        self.pos = p;
        // SAFETY: the scanned range holds only ASCII sign, digit, '.', 'e'
        // and 'E' bytes
        let text = unsafe { std::str::from_utf8_unchecked(&input[start..p]) };

        if !is_float {
            // Integers beyond i64 fall through to the nearest f64
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Token::Int(n));
            }
        }
        match text.parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(Token::Float(x)),
            Ok(_) => Err(lex_error(LexErrorKind::NumberOutOfRange, start)),
            Err(_) => Err(lex_error(LexErrorKind::InvalidNumber, start)),
        }
    }
}
