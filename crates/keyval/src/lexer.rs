//! Log-line tokenizer.
//!
//! Index-based scanning over a fixed byte buffer: the input is never
//! mutated, lexemes are spans into it, and [`Lexer::rewind`] supports the
//! parser's two-pass strategy. Invalid UTF-8 bytes are treated as word
//! content so they pass through unmodified.

use bstr::decode_utf8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    WhiteSpace,
    /// Word followed by a single `=` that introduces a value.
    Key,
    /// `"…"`, escapes processed by the parser's unquote step.
    QuotedValue,
    /// `"…"` followed by `=`.
    QuotedKey,
    EndOfInput,
}

pub(crate) struct Lexer<'a> {
    input: &'a [u8],
    /// Scan cursor: first byte not yet consumed.
    cursor: usize,
    kind: TokenKind,
    /// Byte offset where the current token starts.
    tok_start: usize,
    /// Lexeme span; excludes consumed separators (`=` after a key, the `:`
    /// absorbed after a quoted value or terminating an unquoted value).
    lex_start: usize,
    lex_end: usize,
    /// Kind of the previous token; an unquoted `:` only terminates a value
    /// when the previous token was a key.
    prev: TokenKind,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        let mut lex = Lexer {
            input,
            cursor: 0,
            kind: TokenKind::EndOfInput,
            tok_start: 0,
            lex_start: 0,
            lex_end: 0,
            prev: TokenKind::EndOfInput,
        };
        lex.next();
        lex
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.kind
    }

    pub(crate) fn lexeme(&self) -> &'a [u8] {
        &self.input[self.lex_start..self.lex_end]
    }

    /// Byte offset of the current token's first byte.
    pub(crate) fn token_start(&self) -> usize {
        self.tok_start
    }

    /// Rewind to the start of the input and re-prime the first token.
    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
        self.prev = TokenKind::EndOfInput;
        self.next();
    }

    pub(crate) fn skip_ws(&mut self) {
        while self.kind == TokenKind::WhiteSpace {
            self.next();
        }
    }

    pub(crate) fn next(&mut self) {
        self.prev = self.kind;
        self.tok_start = self.cursor;
        self.lex_start = self.cursor;

        if self.cursor >= self.input.len() {
            self.kind = TokenKind::EndOfInput;
            self.lex_end = self.cursor;
            return;
        }

        let (ch, size) = decode_utf8(&self.input[self.cursor..]);
        match ch {
            Some(c) if c.is_whitespace() => self.white_space(),
            Some('"') => self.quoted(),
            _ => self.word(size),
        }
    }

    fn white_space(&mut self) {
        while self.cursor < self.input.len() {
            let (ch, size) = decode_utf8(&self.input[self.cursor..]);
            match ch {
                Some(c) if c.is_whitespace() => self.cursor += size,
                _ => break,
            }
        }
        self.kind = TokenKind::WhiteSpace;
        self.lex_end = self.cursor;
    }

    fn quoted(&mut self) {
        self.cursor += 1; // opening quote
        while self.cursor < self.input.len() {
            match self.input[self.cursor] {
                b'\\' => {
                    // skip the escape and whatever it escapes
                    self.cursor += 2;
                }
                b'"' => {
                    self.cursor += 1;
                    break;
                }
                _ => self.cursor += 1,
            }
        }
        // premature end of input still yields a best-effort token
        self.cursor = self.cursor.min(self.input.len());
        self.lex_end = self.cursor;
        self.kind = TokenKind::QuotedValue;

        // A `:` after the closing quote is punctuation sugar; an `=` makes
        // this a key. Either way the separator is consumed, not part of the
        // lexeme.
        match self.input.get(self.cursor) {
            Some(b':') => self.cursor += 1,
            Some(b'=') => {
                self.cursor += 1;
                self.kind = TokenKind::QuotedKey;
            }
            _ => {}
        }
    }

    fn word(&mut self, first_size: usize) {
        let in_value = matches!(self.prev, TokenKind::Key | TokenKind::QuotedKey);
        self.cursor += first_size;

        // first char may itself be `=` or `:`; both are plain content at the
        // start of a word
        loop {
            if self.cursor >= self.input.len() {
                break;
            }
            let (ch, size) = decode_utf8(&self.input[self.cursor..]);
            match ch {
                Some(c) if c.is_whitespace() => break,
                Some('=') => {
                    let run = self.input[self.cursor..]
                        .iter()
                        .take_while(|&&b| b == b'=')
                        .count();
                    let after = self.cursor + run;
                    if run == 1 && after < self.input.len() && !starts_with_space(&self.input[after..]) {
                        // single `=` introducing a value: this word is a key
                        // and the `=` is consumed, not part of the lexeme
                        self.lex_end = self.cursor;
                        self.cursor = after;
                        self.kind = TokenKind::Key;
                        return;
                    }
                    // `=` at end of input, before whitespace, or in a run of
                    // two or more: ordinary content (base64 padding, `==`)
                    self.cursor = after;
                }
                Some(':') if in_value => {
                    // unquoted `:` terminates a value; consumed, not kept
                    self.lex_end = self.cursor;
                    self.cursor += 1;
                    self.kind = TokenKind::Word;
                    return;
                }
                _ => self.cursor += size,
            }
        }

        self.lex_end = self.cursor;
        self.kind = TokenKind::Word;
    }
}

fn starts_with_space(rest: &[u8]) -> bool {
    matches!(decode_utf8(rest).0, Some(c) if c.is_whitespace())
}
