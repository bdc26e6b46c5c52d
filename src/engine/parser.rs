//! Recursive-descent JSON parser
//!
//! Consumes the lexer's tokens and builds the value tree through the
//! session's adapter:
//!
//! ```text
//! value  := object | array | string | number | "true" | "false" | "null"
//! object := "{" (string ":" value ("," string ":" value)*)? "}"
//! array  := "[" (value ("," value)*)? "]"
//! ```
//!
//! Containers under construction are owned by builders, so any error
//! (lexical, syntactic, depth or out-of-memory) releases everything built so
//! far before it reaches the caller.

use super::alloc::{Allocator, AllocatorAdapter};
use super::builder::{ArrayBuilder, Guard, ObjectBuilder};
use super::error::ParseError;
use super::lexer::{Lexed, Lexer, Token};
use super::value::Value;

/// Default maximum nesting depth of arrays and objects
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Parser state for one input
pub(crate) struct Parser<'a, 'h, A: Allocator> {
    lexer: Lexer<'a, 'h, A>,
    heap: &'h AllocatorAdapter<A>,
    max_depth: usize,
    depth: usize,
}

impl<'a, 'h, A: Allocator> Parser<'a, 'h, A> {
    /// Parser over `input`, which must be valid UTF-8
    pub(crate) fn new(input: &'a [u8], heap: &'h AllocatorAdapter<A>, max_depth: usize) -> Self {
        Self {
            lexer: Lexer::new(input, heap),
            heap,
            max_depth,
            depth: 0,
        }
    }

    /// Parse exactly one value followed by end of input
    pub(crate) fn parse_document(mut self) -> Result<Guard<'h, A, Value>, ParseError> {
        let first = self.lexer.next_token()?;
        let root = self.parse_value(first)?;

        let rest = self.lexer.next_token()?;
        match rest.token {
            Token::End => Ok(root),
            _ => Err(unexpected(&rest, "end of input")),
        }
    }

    /// Parse the value starting with `lexed`
    fn parse_value(&mut self, lexed: Lexed<'h, A>) -> Result<Guard<'h, A, Value>, ParseError> {
        let scalar = match lexed.token {
            Token::BeginObject => return self.parse_object(lexed.offset),
            Token::BeginArray => return self.parse_array(lexed.offset),
            Token::String(s) => return Ok(s.map(Value::String)),
            Token::Int(n) => Value::Int(n),
            Token::Float(x) => Value::Float(x),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            _ => return Err(unexpected(&lexed, "a value")),
        };
        Ok(Guard::new(scalar, self.heap))
    }

    /// Enter a container, failing if that crosses the depth limit
    #[inline]
    fn enter(&mut self, offset: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::DepthExceeded {
                depth: self.depth,
                max_depth: self.max_depth,
                offset,
            });
        }
        Ok(())
    }

    #[inline]
    fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Array body; the `[` at `offset` is consumed
    fn parse_array(&mut self, offset: usize) -> Result<Guard<'h, A, Value>, ParseError> {
        self.enter(offset)?;
        let mut items = ArrayBuilder::new(self.heap);

        let mut next = self.lexer.next_token()?;
        if matches!(next.token, Token::EndArray) {
            self.exit();
            return Ok(items.finish());
        }

        loop {
            let item = self.parse_value(next)?;
            items.push(item)?;

            let sep = self.lexer.next_token()?;
            match sep.token {
                Token::Comma => {
                    next = self.lexer.next_token()?;
                    if matches!(next.token, Token::EndArray) {
                        // trailing comma
                        return Err(unexpected(&next, "a value"));
                    }
                }
                Token::EndArray => break,
                _ => return Err(unexpected(&sep, "',' or ']'")),
            }
        }

        self.exit();
        Ok(items.finish())
    }

    /// Object body; the `{` at `offset` is consumed
    fn parse_object(&mut self, offset: usize) -> Result<Guard<'h, A, Value>, ParseError> {
        self.enter(offset)?;
        let mut fields = ObjectBuilder::new(self.heap);

        let mut next = self.lexer.next_token()?;
        if matches!(next.token, Token::EndObject) {
            self.exit();
            return Ok(fields.finish());
        }

        loop {
            let key = match next.token {
                Token::String(key) => key,
                _ => return Err(unexpected(&next, "a string key")),
            };

            let colon = self.lexer.next_token()?;
            if !matches!(colon.token, Token::Colon) {
                return Err(unexpected(&colon, "':'"));
            }

            let start = self.lexer.next_token()?;
            let value = self.parse_value(start)?;
            fields.insert(key, value)?;

            let sep = self.lexer.next_token()?;
            match sep.token {
                Token::Comma => {
                    next = self.lexer.next_token()?;
                    if matches!(next.token, Token::EndObject) {
                        // trailing comma
                        return Err(unexpected(&next, "a string key"));
                    }
                }
                Token::EndObject => break,
                _ => return Err(unexpected(&sep, "',' or '}'")),
            }
        }

        self.exit();
        Ok(fields.finish())
    }
}

#[inline]
fn unexpected<A: Allocator>(lexed: &Lexed<'_, A>, expected: &'static str) -> ParseError {
    ParseError::Syntax {
        expected,
        found: lexed.token.describe(),
        offset: lexed.offset,
    }
}

/// Parse `input` into a guarded tree
pub(crate) fn parse<'h, A: Allocator>(
    input: &[u8],
    heap: &'h AllocatorAdapter<A>,
    max_depth: usize,
) -> Result<Guard<'h, A, Value>, ParseError> {
    Parser::new(input, heap, max_depth).parse_document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alloc::CountingAllocator;
    use crate::engine::error::LexErrorKind;

    fn check<F: FnOnce(&Value)>(input: &str, f: F) {
        let counting = CountingAllocator::new();
        let heap = AllocatorAdapter::new(&counting);
        let root = parse(input.as_bytes(), &heap, DEFAULT_MAX_DEPTH).unwrap();
        f(root.get());
        drop(root);
        assert_eq!(counting.outstanding_blocks(), 0, "leak parsing {:?}", input);
    }

    fn fail(input: &str) -> ParseError {
        let counting = CountingAllocator::new();
        let heap = AllocatorAdapter::new(&counting);
        let err = match parse(input.as_bytes(), &heap, 8) {
            Ok(v) => panic!("{:?} parsed as {:?}", input, v.get()),
            Err(e) => e,
        };
        assert_eq!(counting.outstanding_blocks(), 0, "leak parsing {:?}", input);
        err
    }

    #[test]
    fn test_scalars_at_top_level() {
        check("true", |v| assert_eq!(v.as_bool(), Ok(true)));
        check(" false ", |v| assert_eq!(v.as_bool(), Ok(false)));
        check("null", |v| assert!(v.is_null()));
        check("3", |v| assert_eq!(v.as_int(), Ok(3)));
        check("3.0", |v| assert_eq!(v.as_float(), Ok(3.0)));
        check("\"hi\"", |v| assert_eq!(v.as_str(), Ok("hi")));
    }

    #[test]
    fn test_nested_containers() {
        check(r#"{"a": [1, {"b": null}], "c": {}}"#, |v| {
            let a = v.object_get("a").unwrap().unwrap();
            assert_eq!(a.array_len(), Ok(2));
            let inner = a.array_get(1).unwrap();
            assert!(inner.object_get("b").unwrap().unwrap().is_null());
            assert_eq!(v.object_get("c").unwrap().unwrap().object_len(), Ok(0));
        });
        check("[[], [[]]]", |v| {
            assert_eq!(v.array_len(), Ok(2));
            assert_eq!(v.array_get(1).unwrap().array_len(), Ok(1));
        });
    }

    #[test]
    fn test_trailing_commas_rejected() {
        assert_eq!(
            fail("[1, 2,]"),
            ParseError::Syntax {
                expected: "a value",
                found: "']'",
                offset: 6
            }
        );
        assert_eq!(
            fail(r#"{"a": 1,}"#),
            ParseError::Syntax {
                expected: "a string key",
                found: "'}'",
                offset: 8
            }
        );
    }

    #[test]
    fn test_grammar_violations() {
        assert_eq!(
            fail("[1 2]"),
            ParseError::Syntax {
                expected: "',' or ']'",
                found: "a number",
                offset: 3
            }
        );
        assert_eq!(
            fail(r#"{"a" 1}"#),
            ParseError::Syntax {
                expected: "':'",
                found: "a number",
                offset: 5
            }
        );
        assert_eq!(
            fail("{1: 2}"),
            ParseError::Syntax {
                expected: "a string key",
                found: "a number",
                offset: 1
            }
        );
        assert_eq!(
            fail(""),
            ParseError::Syntax {
                expected: "a value",
                found: "end of input",
                offset: 0
            }
        );
        assert_eq!(
            fail("[\"x\"] ]"),
            ParseError::Syntax {
                expected: "end of input",
                found: "']'",
                offset: 6
            }
        );
    }

    #[test]
    fn test_errors_release_partial_trees() {
        fail(r#"{"keep": ["a", "b", {"c": "d"}], "bad": [1, "e", tru]}"#);
        fail(r#"["a", "b", "c" "#);
        fail(r#"{"a": "b", "a": "c", "#);
    }

    #[test]
    fn test_depth_limit() {
        let ok = "[".repeat(8) + &"]".repeat(8);
        let counting = CountingAllocator::new();
        let heap = AllocatorAdapter::new(&counting);
        assert!(parse(ok.as_bytes(), &heap, 8).is_ok());

        assert_eq!(
            fail(&"[".repeat(9)),
            ParseError::DepthExceeded {
                depth: 9,
                max_depth: 8,
                offset: 8
            }
        );
        assert!(matches!(
            fail(&r#"{"a":"#.repeat(20)),
            ParseError::DepthExceeded { depth: 9, .. }
        ));
    }

    #[test]
    fn test_lexical_error_surfaces() {
        assert_eq!(
            fail(r#"[1, "unterminated"#),
            ParseError::Lexical {
                kind: LexErrorKind::UnterminatedString,
                offset: 17
            }
        );
    }
}
