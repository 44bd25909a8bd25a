/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// Lowering checks names and arities, folds constants and maps the AST into a
/// flat instruction listing.
pub mod lower;

/// The code generators render the instruction listing as assembly.
pub mod codegen {
    pub mod aarch64;
    pub mod backend;
    mod generator;
    pub mod interface;
    pub mod x86_64;
}

/// Threads the source through every stage.
pub mod driver;

pub mod ast;
pub mod error;
pub mod ir;
pub mod token;

pub mod util {
    pub mod fmt {
        pub mod tree;
    }
    #[cfg(test)]
    pub(crate) mod test_utils;
}

pub use codegen::interface::Arch;
pub use driver::{compile, Options};
pub use error::Error;
