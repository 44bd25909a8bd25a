// program ::= stmt*
// stmt ::= fn ID '(' [ID (',' ID)*] ')' block
//        | exit '(' expr ')' ';'
//        | print '(' expr ')' ';'
//        | return expr ';'
//        | ID '(' [expr (',' expr)*] ')' ';'
//        | let ID '=' expr ';'
//        | block
// block ::= '{' stmt* '}'
// expr ::= term (op term)*
// term ::= INT | ID
// op ::= '+' | '-' | '*' | '/' | '^'

// Precedence (only honored by `ExprParsing::Precedence`)
//
// ^      right
// * /    left
// + -    left

use std::fmt;

use crate::token::{Span, TokenKind};

#[derive(Debug, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum StmtKind {
    Let {
        name: Ident,
        value: Expr,
    },
    Exit {
        status: Expr,
    },
    Print {
        message: Expr,
    },
    Function(Function),
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Return {
        value: Expr,
    },
    Block(Block),
}

#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: Ident,
    /// Formal parameters, in declaration order.
    pub params: Vec<Ident>,
    pub body: Block,
}

#[derive(Debug, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Id(Ident),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub name: Box<str>,
    pub span: Span,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperatorDescriptor {
    pub symbol: char,
    pub precedence: u8,
    pub associativity: Associativity,
}

impl BinaryOperator {
    pub const ALL: &[BinaryOperator] = &[
        BinaryOperator::Add,
        BinaryOperator::Sub,
        BinaryOperator::Mul,
        BinaryOperator::Div,
        BinaryOperator::Pow,
    ];

    pub const fn descriptor(self) -> OperatorDescriptor {
        use Associativity::*;
        let (symbol, precedence, associativity) = match self {
            BinaryOperator::Add => ('+', 1, Left),
            BinaryOperator::Sub => ('-', 1, Left),
            BinaryOperator::Mul => ('*', 2, Left),
            BinaryOperator::Div => ('/', 2, Left),
            BinaryOperator::Pow => ('^', 3, Right),
        };
        OperatorDescriptor {
            symbol,
            precedence,
            associativity,
        }
    }

    pub fn from_token(kind: TokenKind) -> Option<BinaryOperator> {
        let op = match kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            TokenKind::Caret => BinaryOperator::Pow,
            _ => return None,
        };
        Some(op)
    }

    /// Evaluates the operator over two known operands. Returns `None` on
    /// overflow, division by zero or a negative exponent.
    pub fn fold(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            BinaryOperator::Add => lhs.checked_add(rhs),
            BinaryOperator::Sub => lhs.checked_sub(rhs),
            BinaryOperator::Mul => lhs.checked_mul(rhs),
            BinaryOperator::Div => lhs.checked_div(rhs),
            BinaryOperator::Pow => u32::try_from(rhs)
                .ok()
                .and_then(|exp| lhs.checked_pow(exp)),
        }
    }

    /// The lowercase mnemonic used by the IR.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Pow => "pow",
        }
    }
}
