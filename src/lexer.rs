use std::{iter::Peekable, ops::Range};

use tracing::debug;

use crate::token::{Span, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 1_024;

/// Returns a lazy token stream over the provided source.
pub fn lex(src: &str) -> Lexer<'_> {
    Lexer::new(src)
}

/// A convenience function that collects every token into a new buffer.
pub fn lex_in_new(src: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    tokens.extend(lex(src));
    tokens
}

/// The vinyl lexer.
///
/// Whitespace and unrecognized characters never become tokens. The latter are
/// recorded in [`Lexer::discarded`] so callers may report them.
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    discarded: Vec<(char, Span)>,
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Token<'src>> {
        loop {
            if self.iter.peek().is_none() {
                return None;
            }
            if let Some(kind) = self.scan_token_kind() {
                return Some(self.produce(kind));
            }
        }
    }
}

impl Lexer<'_> {
    /// Tries to scan the current character. Returns `None` if it was skipped.
    fn scan_token_kind(&mut self) -> Option<TokenKind> {
        use TokenKind::*;
        let kind = match self.mark_advance() {
            '#' => self.comment(),
            c if c.is_ascii_digit() => self.int(),
            c if c.is_ascii_alphabetic() => self.identifier_or_keyword(),
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            ';' => Semicolon,
            '=' => Equal,
            ',' => Comma,
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '^' => Caret,
            c if c.is_whitespace() => return None,
            c => {
                let span = self.span();
                debug!(char = ?c, %span, "discarding unrecognized character");
                self.discarded.push((c, span));
                return None;
            }
        };
        Some(kind)
    }

    fn comment(&mut self) -> TokenKind {
        while !matches!(self.peek(), '\n' | '\0') {
            self.advance();
        }
        // The line break belongs to the comment.
        if self.peek() == '\n' {
            self.advance();
        }
        TokenKind::Comment
    }

    fn int(&mut self) -> TokenKind {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        TokenKind::Int
    }

    /// Keywords are matched by prefix, so `letter` is `let` followed by the
    /// identifier `ter`.
    fn identifier_or_keyword(&mut self) -> TokenKind {
        let rest = &self.src[self.current_lo..];
        if let Some((keyword, &kind)) = KEYWORDS
            .entries()
            .find(|(keyword, _)| rest.starts_with(**keyword))
        {
            // The first character is already consumed.
            for _ in 1..keyword.len() {
                self.advance();
            }
            return kind;
        }
        while self.peek().is_ascii_alphanumeric() {
            self.advance();
        }
        TokenKind::Identifier
    }
}

impl<'src> Lexer<'src> {
    /// Constructs a new lexer with the default state.
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            discarded: Vec::new(),
        }
    }

    /// Characters skipped so far because no rule matched them.
    pub fn discarded(&self) -> &[(char, Span)] {
        &self.discarded
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next char and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Returns the next char without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the current range.
    fn range(&self) -> Range<usize> {
        self.current_lo..self.cursor
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.range())
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &'src str {
        &self.src[self.range()]
    }

    /// Produces a token using the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, self.substr(), self.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_input() {
        assert!(lex_in_new("").is_empty());
        assert!(lex_in_new(" \n\t ").is_empty());
    }

    #[test]
    fn test_comment_at_end_of_input() {
        let tokens = lex_in_new("exit(1); # bye");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Comment);
        assert_eq!(last.text, "# bye");
    }

    #[test]
    fn test_comment_keeps_line_break() {
        let tokens = lex_in_new("# one\nlet");
        assert_eq!(tokens[0].text, "# one\n");
        assert_eq!(tokens[1].kind, TokenKind::Let);
    }

    #[test]
    fn test_unrecognized_characters_are_discarded() {
        use TokenKind::*;
        let mut lexer = lex("let $x = 1@;");
        let kinds: Vec<_> = lexer.by_ref().map(|t| t.kind).collect();
        assert_eq!(kinds, [Let, Identifier, Equal, Int, Semicolon]);
        let discarded: Vec<_> = lexer.discarded().iter().map(|(c, s)| (*c, *s)).collect();
        assert_eq!(
            discarded,
            [
                ('$', Span::new_of_bounds(4..5)),
                ('@', Span::new_of_bounds(10..11)),
            ]
        );
    }

    #[test]
    fn test_keywords_match_by_prefix() {
        use TokenKind::*;
        let tokens: Vec<_> = lex("exit exitcode letter fn fnord print return lex")
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(
            tokens,
            [
                (Exit, "exit"),
                (Exit, "exit"),
                (Identifier, "code"),
                (Let, "let"),
                (Identifier, "ter"),
                (Fn, "fn"),
                (Fn, "fn"),
                (Identifier, "ord"),
                (Print, "print"),
                (Return, "return"),
                (Identifier, "lex"),
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_spans() {
        use TokenKind::*;
        let lexed: Vec<_> = lex_in_new("returnx1")
            .into_iter()
            .map(|t| (t.kind, t.span()))
            .collect();
        assert_eq!(
            lexed,
            [
                (Return, Span::new_of_bounds(0..6)),
                (Identifier, Span::new_of_bounds(6..8)),
            ]
        );
    }

    #[test]
    fn test_significant_characters_round_trip() {
        let src = "
            # adds things
            fn add(a, b) { return a + b; }
            let x = 10 * 2 ^ 3 - 4 / 1;
            add(x, 2);
            print(42);
            exit(x);
        ";
        let joined: String = lex(src)
            .filter(|t| !t.is_trivia())
            .map(|t| t.text)
            .collect();
        let without_comments: String = src
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default())
            .collect();
        let expected: String = without_comments
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "();{}=," => [
                (LParen, 0..1),
                (RParen, 1..2),
                (Semicolon, 2..3),
                (LBrace, 3..4),
                (RBrace, 4..5),
                (Equal, 5..6),
                (Comma, 6..7),
            ],
            "+-*/^" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Caret, 4..5),
            ],
            "1 11 0042 123456789" => [
                (Int, 0..1),
                (Int, 2..4),
                (Int, 5..9),
                (Int, 10..19),
            ],
            "x foo B a1b2 9lives" => [
                (Identifier, 0..1),
                (Identifier, 2..5),
                (Identifier, 6..7),
                (Identifier, 8..12),
                (Int, 13..14),
                (Identifier, 14..19),
            ],
            "let x = 42;exit(x);" => [
                (Let, 0..3),
                (Identifier, 4..5),
                (Equal, 6..7),
                (Int, 8..10),
                (Semicolon, 10..11),
                (Exit, 11..15),
                (LParen, 15..16),
                (Identifier, 16..17),
                (RParen, 17..18),
                (Semicolon, 18..19),
            ],
            "fn main() { # nothing\n}" => [
                (Fn, 0..2),
                (Identifier, 3..7),
                (LParen, 7..8),
                (RParen, 8..9),
                (LBrace, 10..11),
                (Comment, 12..22),
                (RBrace, 22..23),
            ],
        });

        for (input, tokens) in cases {
            let lexed: Vec<_> = lex_in_new(input)
                .into_iter()
                .map(|t| (t.kind, t.span()))
                .collect();
            assert_eq!(lexed, tokens.as_slice());
        }
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(($kind, Span::new_of_bounds($range.start..$range.end))),*
                ],
            )),*]
        }};
    }
    use cases;
}
