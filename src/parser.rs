use tracing::debug;

use crate::{
    ast::{
        Associativity, BinaryOperator, Block, Expr, ExprKind, Function, Ident, Program, Stmt,
        StmtKind,
    },
    lexer::{self, SUGGESTED_TOKENS_CAPACITY},
    token::{Span, Spanned, Token, TokenKind},
};

type Result<T, E = ()> = std::result::Result<T, E>;

/// The parsed value is always present. Diagnostics turn the result into an
/// `Err` that still carries it.
pub type ParseResult<T> = Result<T, (T, Vec<Spanned<Error>>)>;

/// How chains of binary operators are grouped.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExprParsing {
    /// Every operator folds into the running left-hand side, so
    /// `1 + 2 * 3` is `(1 + 2) * 3`.
    #[default]
    LeftFold,
    /// Precedence climbing over [`BinaryOperator::descriptor`].
    Precedence,
}

pub fn parse(src: &str) -> ParseResult<Program> {
    parse_with(src, ExprParsing::default())
}

pub fn parse_with(src: &str, mode: ExprParsing) -> ParseResult<Program> {
    let mut lexer = lexer::lex(src);
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    tokens.extend(lexer.by_ref().filter(|token| !token.is_trivia()));

    let mut p = Parser::new(src, &tokens, mode);
    for &(c, span) in lexer.discarded() {
        p.errors.push(span.wrap(Error::UnrecognizedChar(c)));
    }
    let program = p.parse_program();

    debug!(
        tokens = tokens.len(),
        statements = program.statements.len(),
        diagnostics = p.errors.len(),
        "parsed program"
    );

    if p.errors.is_empty() {
        Ok(program)
    } else {
        let mut errors = p.errors;
        errors.sort_by_key(|error| error.span.lo);
        Err((program, errors))
    }
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token<'src>],
    cursor: usize,
    mode: ExprParsing,
    errors: Vec<Spanned<Error>>,
    /// Set once an error is recorded. Cleared by a complete statement, a
    /// skipped `;` or a token that starts a statement. Errors found
    /// meanwhile, skipped tokens included, are not reported.
    recovering: bool,
}

impl<'src> Parser<'src, '_> {
    fn parse_program(&mut self) -> Program {
        let mut statements = Vec::with_capacity(16);
        while !self.at_end() {
            self.parse_statement_or_skip(&mut statements);
        }
        Program { statements }
    }

    fn parse_statement_or_skip(&mut self, statements: &mut Vec<Stmt>) {
        if self.at_statement_start() {
            self.recovering = false;
        }
        if let Some(stmt) = self.parse_statement() {
            self.recovering = false;
            statements.push(stmt);
        } else {
            self.skip();
        }
    }

    /// Tries every statement form in order. The cursor is left untouched if
    /// none of them matches.
    fn parse_statement(&mut self) -> Option<Stmt> {
        self.attempt(Self::parse_function)
            .or_else(|| self.attempt(Self::parse_exit))
            .or_else(|| self.attempt(Self::parse_print))
            .or_else(|| self.attempt(Self::parse_return))
            .or_else(|| self.attempt(Self::parse_call))
            .or_else(|| self.attempt(Self::parse_let))
            .or_else(|| self.attempt(Self::parse_block))
    }

    fn parse_function(&mut self) -> Result<Stmt> {
        let Some(keyword) = self.take_token(TokenKind::Fn) else {
            return Err(());
        };
        let name = self.parse_ident()?;
        self.consume(TokenKind::LParen)?;
        let params = self.parse_list(TokenKind::RParen, Self::parse_ident)?;
        self.consume(TokenKind::RParen)?;
        let (body, body_span) = self.parse_block_body()?;
        Ok(Stmt {
            kind: StmtKind::Function(Function { name, params, body }),
            span: keyword.span().to(body_span),
        })
    }

    fn parse_exit(&mut self) -> Result<Stmt> {
        let Some(keyword) = self.take_token(TokenKind::Exit) else {
            return Err(());
        };
        let status = self.parse_parenthesized()?;
        let end = self.consume(TokenKind::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Exit { status },
            span: keyword.span().to(end.span()),
        })
    }

    fn parse_print(&mut self) -> Result<Stmt> {
        let Some(keyword) = self.take_token(TokenKind::Print) else {
            return Err(());
        };
        let message = self.parse_parenthesized()?;
        let end = self.consume(TokenKind::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Print { message },
            span: keyword.span().to(end.span()),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let Some(keyword) = self.take_token(TokenKind::Return) else {
            return Err(());
        };
        let value = self.parse_expr()?;
        let end = self.consume(TokenKind::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Return { value },
            span: keyword.span().to(end.span()),
        })
    }

    fn parse_call(&mut self) -> Result<Stmt> {
        // A lone identifier is not a call, so only commit once the opening
        // parenthesis is in sight.
        if !(self.is(TokenKind::Identifier) && self.is_nth(1, TokenKind::LParen)) {
            return Err(());
        }
        let callee = self.parse_ident()?;
        self.consume(TokenKind::LParen)?;
        let args = self.parse_list(TokenKind::RParen, Self::parse_expr)?;
        self.consume(TokenKind::RParen)?;
        let end = self.consume(TokenKind::Semicolon)?;
        let span = callee.span.to(end.span());
        Ok(Stmt {
            kind: StmtKind::Call { callee, args },
            span,
        })
    }

    fn parse_let(&mut self) -> Result<Stmt> {
        let Some(keyword) = self.take_token(TokenKind::Let) else {
            return Err(());
        };
        let name = self.parse_ident()?;
        self.consume(TokenKind::Equal)?;
        let value = self.parse_expr()?;
        let end = self.consume(TokenKind::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Let { name, value },
            span: keyword.span().to(end.span()),
        })
    }

    fn parse_block(&mut self) -> Result<Stmt> {
        if !self.is(TokenKind::LBrace) {
            return Err(());
        }
        let (block, span) = self.parse_block_body()?;
        Ok(Stmt {
            kind: StmtKind::Block(block),
            span,
        })
    }

    /// Parses `{ stmt* }`. Once the opening brace is consumed this never
    /// fails: unmatched tokens are skipped and a missing closing brace is
    /// reported and tolerated.
    fn parse_block_body(&mut self) -> Result<(Block, Span)> {
        let open = self.consume(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        let close = loop {
            match self.peek() {
                Some(token) if token.kind == TokenKind::RBrace => {
                    self.advance();
                    break token.span();
                }
                Some(_) => self.parse_statement_or_skip(&mut statements),
                None => {
                    self.errors.push(open.span().wrap(Error::UnclosedBlock));
                    self.recovering = true;
                    break self.previous_span();
                }
            }
        };
        Ok((Block { statements }, open.span().to(close)))
    }

    /// Parses `( expr )`.
    fn parse_parenthesized(&mut self) -> Result<Expr> {
        self.consume(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(Ident {
            name: Box::from(token.text),
            span: token.span(),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        match self.mode {
            ExprParsing::LeftFold => self.parse_expr_left_fold(),
            ExprParsing::Precedence => self.parse_expr_bp(0),
        }
    }

    /// `(((a op b) op c) op d)`, whatever the operators are.
    fn parse_expr_left_fold(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.peek_operator() {
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.peek_operator() {
            let (lbp, rbp) = Self::infix_binding_power(op);
            if lbp < min_bp {
                // Operator binds less tightly than the minimum required
                break;
            }
            self.advance();
            let rhs = self.parse_expr_bp(rbp)?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn infix_binding_power(op: BinaryOperator) -> (u8, u8) {
        let descriptor = op.descriptor();
        let bp = descriptor.precedence * 2;
        match descriptor.associativity {
            Associativity::Left => (bp, bp + 1),
            Associativity::Right => (bp + 1, bp),
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Int) => {
                let token = self.advance_token();
                let Ok(value) = token.text.parse() else {
                    self.error(token.span().wrap(Error::ParseInt));
                    return Err(());
                };
                Ok(Expr {
                    kind: ExprKind::Int(value),
                    span: token.span(),
                })
            }
            Some(TokenKind::Identifier) => {
                let ident = self.parse_ident()?;
                Ok(Expr {
                    span: ident.span,
                    kind: ExprKind::Id(ident),
                })
            }
            actual => {
                let span = self.current_span();
                self.error(span.wrap(Error::ExpectedExpr { actual }));
                Err(())
            }
        }
    }

    fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Expr {
        Expr {
            span: lhs.span.to(rhs.span),
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    /// Parses `item (',' item)*` until `end_delim` is found. Does **NOT**
    /// consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        if self.is(end_delim) {
            return Ok(items);
        }
        loop {
            items.push(parse_item(self)?);
            if !self.take(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }
}

impl<'src, 'tok> Parser<'src, 'tok> {
    fn new(src: &'src str, tokens: &'tok [Token<'src>], mode: ExprParsing) -> Parser<'src, 'tok> {
        Parser {
            src,
            tokens,
            cursor: 0,
            mode,
            errors: Vec::with_capacity(8),
            recovering: false,
        }
    }

    /// Records an error, unless the parser is still recovering from a
    /// previous one or the same error was just recorded by another statement
    /// form.
    fn error(&mut self, error: Spanned<Error>) {
        if !self.recovering && self.errors.last() != Some(&error) {
            self.errors.push(error);
        }
        self.recovering = true;
    }

    /// Runs `f`, restoring the cursor if it fails.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Option<T> {
        let start = self.cursor;
        match f(self) {
            Ok(value) => Some(value),
            Err(()) => {
                self.cursor = start;
                None
            }
        }
    }

    /// Drops the current token, which starts no statement.
    fn skip(&mut self) {
        let Some(token) = self.advance() else {
            return;
        };
        self.error(token.span().wrap(Error::Skipped { token: token.kind }));
        if token.kind == TokenKind::Semicolon {
            self.recovering = false;
        }
    }

    fn at_statement_start(&self) -> bool {
        use TokenKind::*;
        match self.peek().map(|t| t.kind) {
            Some(Fn | Exit | Print | Return | Let | LBrace) => true,
            Some(Identifier) => self.is_nth(1, LParen),
            _ => false,
        }
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    /// Returns the current token.
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.cursor).copied()
    }

    fn peek_operator(&self) -> Option<BinaryOperator> {
        self.peek()
            .and_then(|token| BinaryOperator::from_token(token.kind))
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<Token<'src>> {
        let c = self.peek();
        if c.is_some() {
            self.cursor += 1;
        }
        c
    }

    /// Advances over a token the caller has already peeked.
    fn advance_token(&mut self) -> Token<'src> {
        let token = self.tokens[self.cursor];
        self.cursor += 1;
        token
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.is_nth(0, expect)
    }

    /// Checks whether the token `n` positions ahead matches the given one.
    fn is_nth(&self, n: usize, expect: TokenKind) -> bool {
        self.tokens
            .get(self.cursor + n)
            .is_some_and(|token| token.kind == expect)
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        self.take_token(expect).is_some()
    }

    fn take_token(&mut self, expect: TokenKind) -> Option<Token<'src>> {
        if self.is(expect) {
            self.advance()
        } else {
            None
        }
    }

    /// Advances if the current token matches the provided one. If not,
    /// records an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token<'src>> {
        if let Some(token) = self.take_token(expect) {
            return Ok(token);
        }
        let span = self.current_span();
        self.error(span.wrap(Error::Unexpected {
            expected: expect,
            actual: self.peek().map(|t| t.kind),
        }));
        Err(())
    }

    /// Span of the current token, or an empty span at the end of the source.
    fn current_span(&self) -> Span {
        match self.peek() {
            Some(token) => token.span(),
            None => Span::new_of_length(self.src.len(), 0),
        }
    }

    fn previous_span(&self) -> Span {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| self.current_span(), Token::span)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected token {expected:?}, but got {}", found(.actual))]
    Unexpected {
        expected: TokenKind,
        actual: Option<TokenKind>,
    },
    #[error("expected expression, but got {}", found(.actual))]
    ExpectedExpr { actual: Option<TokenKind> },
    #[error("unexpected token {token:?}, skipping")]
    Skipped { token: TokenKind },
    #[error("unclosed block")]
    UnclosedBlock,
    #[error("parse int error, out of bounds")]
    ParseInt,
    #[error("unrecognized character {0:?}")]
    UnrecognizedChar(char),
}

fn found(actual: &Option<TokenKind>) -> String {
    match actual {
        Some(kind) => format!("{kind:?}"),
        None => String::from("end of input"),
    }
}
