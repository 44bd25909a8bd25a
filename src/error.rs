use crate::{codegen, lower, parser, token::Spanned};

/// Every way a compilation can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Parser diagnostics, only fatal in strict mode.
    #[error("{} syntax error(s)", count(.0))]
    Syntax(Vec<Spanned<parser::Error>>),
    #[error(transparent)]
    Semantic(#[from] Spanned<lower::Error>),
    #[error(transparent)]
    Codegen(#[from] codegen::interface::Error),
}

fn count(errors: &[Spanned<parser::Error>]) -> usize {
    errors.len()
}
