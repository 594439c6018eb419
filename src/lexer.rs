use crate::error::{Error, Result};
use crate::location::{Location, Span};
use crate::token::{Token, TokenKind};

fn keyword_kind(identifier: &str) -> TokenKind {
    match identifier {
        "var" => TokenKind::Var,
        "function" => TokenKind::Function,
        "echo" => TokenKind::Echo,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "end" => TokenKind::End,
        "if" => TokenKind::If,
        "elseif" => TokenKind::ElseIf,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "while" => TokenKind::While,
        "return" => TokenKind::Return,
        _ => TokenKind::Identifier,
    }
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_part(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    path: &'a str,
    pos: usize,
    location: Location,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, path: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            path,
            pos: 0,
            location: Location::start(),
        }
    }

    pub fn scan_all(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            if self.is_at_end() {
                break;
            }

            let byte = self.peek();
            let token = if is_identifier_start(byte) {
                self.identifier()
            } else if byte.is_ascii_digit() {
                self.number()
            } else if byte == b'\'' || byte == b'"' {
                self.string_literal()?
            } else {
                self.symbol()?
            };
            tokens.push(token);
        }

        tokens.push(Token::new(
            TokenKind::EndOfFile,
            "",
            Span::new(self.location, self.location),
        ));
        Ok(tokens)
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.bytes.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let byte = self.bytes[self.pos];
        self.pos += 1;
        self.location = self.location.advance(byte);
        byte
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.bytes[self.pos] != expected {
            return false;
        }
        self.advance();
        true
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        while !self.is_at_end() {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_next() == b'*' => {
                    self.block_comment()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn block_comment(&mut self) -> Result<()> {
        let start = self.location;
        self.advance();
        self.advance();
        while !self.is_at_end() {
            if self.peek() == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }
        Err(Error::lex("unterminated block comment", self.path, start))
    }

    fn identifier(&mut self) -> Token {
        let start = self.location;
        let start_index = self.pos;
        self.advance();
        while !self.is_at_end() && is_identifier_part(self.peek()) {
            self.advance();
        }
        let text = &self.source[start_index..self.pos];
        Token::new(keyword_kind(text), text, Span::new(start, self.location))
    }

    fn number(&mut self) -> Token {
        let start = self.location;
        let start_index = self.pos;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = &self.source[start_index..self.pos];
        Token::new(TokenKind::Number, text, Span::new(start, self.location))
    }

    fn string_literal(&mut self) -> Result<Token> {
        let start = self.location;
        let start_index = self.pos;
        let quote = self.advance();
        let mut terminated = false;
        while !self.is_at_end() {
            let byte = self.peek();
            if byte == quote {
                self.advance();
                terminated = true;
                break;
            }
            if byte == b'\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
            }
            self.advance();
        }

        if !terminated {
            return Err(Error::lex("unterminated string", self.path, start));
        }

        // The raw literal including quotes is kept; escapes are decoded by
        // the evaluator.
        let text = &self.source[start_index..self.pos];
        Ok(Token::new(
            TokenKind::String,
            text,
            Span::new(start, self.location),
        ))
    }

    fn symbol(&mut self) -> Result<Token> {
        let start = self.location;
        let byte = self.advance();
        let (kind, lexeme) = match byte {
            b'(' => (TokenKind::LeftParen, "("),
            b')' => (TokenKind::RightParen, ")"),
            b'[' => (TokenKind::LeftBracket, "["),
            b']' => (TokenKind::RightBracket, "]"),
            b'{' => (TokenKind::LeftBrace, "{"),
            b'}' => (TokenKind::RightBrace, "}"),
            b',' => (TokenKind::Comma, ","),
            b':' => (TokenKind::Colon, ":"),
            b';' => (TokenKind::Semicolon, ";"),
            b'+' => {
                if self.matches(b'=') {
                    (TokenKind::PlusEqual, "+=")
                } else {
                    (TokenKind::Plus, "+")
                }
            }
            b'-' => {
                if self.matches(b'=') {
                    (TokenKind::MinusEqual, "-=")
                } else {
                    (TokenKind::Minus, "-")
                }
            }
            b'*' => {
                if self.matches(b'=') {
                    (TokenKind::StarEqual, "*=")
                } else {
                    (TokenKind::Star, "*")
                }
            }
            b'/' => {
                if self.matches(b'=') {
                    (TokenKind::SlashEqual, "/=")
                } else {
                    (TokenKind::Slash, "/")
                }
            }
            b'%' => {
                if self.matches(b'=') {
                    (TokenKind::PercentEqual, "%=")
                } else {
                    (TokenKind::Percent, "%")
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    (TokenKind::EqualEqual, "==")
                } else {
                    (TokenKind::Equal, "=")
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    (TokenKind::NotEqual, "!=")
                } else {
                    return Err(Error::lex("unexpected character: !", self.path, start));
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    (TokenKind::LessEqual, "<=")
                } else {
                    (TokenKind::Less, "<")
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    (TokenKind::GreaterEqual, ">=")
                } else {
                    (TokenKind::Greater, ">")
                }
            }
            b'.' => {
                if self.matches(b'.') {
                    if self.matches(b'=') {
                        (TokenKind::DotDotEqual, "..=")
                    } else {
                        (TokenKind::DotDot, "..")
                    }
                } else {
                    return Err(Error::lex("unexpected character: .", self.path, start));
                }
            }
            other => {
                return Err(Error::lex(
                    format!("unexpected character: {}", other as char),
                    self.path,
                    start,
                ));
            }
        };
        Ok(Token::new(kind, lexeme, Span::new(start, self.location)))
    }
}

pub fn tokenize(source: &str, path: &str) -> Result<Vec<Token>> {
    Lexer::new(source, path).scan_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use indoc::indoc;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "test.pol")
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn scans_declaration_and_echo() {
        let source = indoc! {r#"
            var greeting = "hi"
            echo greeting .. "!"
        "#};
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::String,
                TokenKind::Echo,
                TokenKind::Identifier,
                TokenKind::DotDot,
                TokenKind::String,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        let tokens = tokenize("if elseif else end whilee", "").expect("tokenize");
        let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::If,
                TokenKind::ElseIf,
                TokenKind::Else,
                TokenKind::End,
                TokenKind::Identifier,
                TokenKind::EndOfFile,
            ]
        );
        assert_eq!(tokens[4].lexeme, "whilee");
    }

    #[test]
    fn scans_multi_char_operators_with_longest_match() {
        assert_eq!(
            kinds("== != <= >= += -= *= /= %= .. ..= ="),
            vec![
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::SlashEqual,
                TokenKind::PercentEqual,
                TokenKind::DotDot,
                TokenKind::DotDotEqual,
                TokenKind::Equal,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn number_dot_requires_following_digit() {
        // `1..2` is a concat of two numbers, not a malformed float.
        let tokens = tokenize("1..2 3.5", "").expect("tokenize");
        let lexemes: Vec<_> = tokens.iter().map(|token| token.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["1", "..", "2", "3.5", ""]);
    }

    #[test]
    fn string_lexeme_keeps_quotes_and_escapes() {
        let tokens = tokenize(r#"'a\'b' "c\n""#, "").expect("tokenize");
        assert_eq!(tokens[0].lexeme, r"'a\'b'");
        assert_eq!(tokens[1].lexeme, "\"c\\n\"");
    }

    #[test]
    fn spans_cover_lexemes() {
        let source = "var x\n= 12";
        let tokens = tokenize(source, "").expect("tokenize");
        for token in &tokens {
            assert_eq!(
                token.span.end,
                token.span.start.advance_over(&token.lexeme),
                "span mismatch for {:?}",
                token.kind
            );
        }
        let eof = tokens.last().expect("eof token");
        assert_eq!(eof.span.start.offset, source.len());
    }

    #[test]
    fn skips_block_comments_across_newlines() {
        let source = indoc! {"
            var x /* a
            multi line
            comment */ = 1
        "};
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn errors_on_unterminated_comment() {
        let error = tokenize("var x /* open", "test.pol").expect_err("expected lex failure");
        assert_eq!(error.kind, ErrorKind::Lex);
        assert!(error.to_string().contains("unterminated block comment"));
        assert_eq!(error.location.column, 7);
    }

    #[test]
    fn errors_on_unterminated_string() {
        let error = tokenize("echo 'open", "test.pol").expect_err("expected lex failure");
        assert_eq!(error.kind, ErrorKind::Lex);
        assert!(error.to_string().contains("unterminated string"));
        assert_eq!(error.location.column, 6);
    }

    #[test]
    fn escaped_quote_does_not_terminate_string() {
        let error = tokenize(r#"echo "oops\""#, "").expect_err("expected lex failure");
        assert!(error.to_string().contains("unterminated string"));
    }

    #[test]
    fn errors_on_stray_dot_and_bang() {
        let error = tokenize("a . b", "").expect_err("expected lex failure");
        assert!(error.to_string().contains("unexpected character: ."));

        let error = tokenize("a ! b", "").expect_err("expected lex failure");
        assert!(error.to_string().contains("unexpected character: !"));
    }

    #[test]
    fn errors_on_unknown_byte() {
        let error = tokenize("x = 1 @ 2", "").expect_err("expected lex failure");
        assert_eq!(error.kind, ErrorKind::Lex);
        assert!(error.to_string().contains("unexpected character: @"));
        assert_eq!(error.location.column, 7);
    }
}
