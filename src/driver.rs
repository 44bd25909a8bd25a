use tracing::{debug, warn};

use crate::{
    ast::Program,
    codegen::interface::{self, Arch},
    error::Error,
    ir::Instruction,
    lower,
    parser::{self, ExprParsing},
    token::Spanned,
};

/// Compilation settings. The architecture has no default.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub arch: Arch,
    pub expr_parsing: ExprParsing,
    /// Turns parser diagnostics into a hard [`Error::Syntax`].
    pub strict: bool,
}

impl Options {
    pub fn new(arch: Arch) -> Options {
        Options {
            arch,
            expr_parsing: ExprParsing::default(),
            strict: false,
        }
    }

    #[must_use]
    pub fn with_expr_parsing(mut self, expr_parsing: ExprParsing) -> Options {
        self.expr_parsing = expr_parsing;
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Options {
        self.strict = strict;
        self
    }
}

/// A pass run between parsing and lowering. It may rewrite the program or
/// reject it.
pub trait Analyser {
    fn analyse(&self, program: Program) -> Result<Program, Error>;
}

/// Accepts every program unchanged.
pub struct NoAnalysis;

impl Analyser for NoAnalysis {
    fn analyse(&self, program: Program) -> Result<Program, Error> {
        Ok(program)
    }
}

pub struct Parsed {
    pub program: Program,
    pub diagnostics: Vec<Spanned<parser::Error>>,
}

#[derive(Debug)]
pub struct Output {
    pub assembly: String,
    pub diagnostics: Vec<Spanned<parser::Error>>,
}

pub fn compile(src: &str, options: &Options) -> Result<Output, Error> {
    compile_with(src, options, &NoAnalysis)
}

pub fn compile_with(
    src: &str,
    options: &Options,
    analyser: &impl Analyser,
) -> Result<Output, Error> {
    let Parsed {
        program,
        diagnostics,
    } = parse(src, options)?;
    let program = analyser.analyse(program)?;
    let listing = lower(&program)?;
    let assembly = interface::generate(options.arch, &listing)?;
    Ok(Output {
        assembly,
        diagnostics,
    })
}

/// Parses `src`, logging every diagnostic.
pub fn parse(src: &str, options: &Options) -> Result<Parsed, Error> {
    let (program, diagnostics) = match parser::parse_with(src, options.expr_parsing) {
        Ok(program) => (program, Vec::new()),
        Err((program, diagnostics)) => (program, diagnostics),
    };
    for diagnostic in &diagnostics {
        warn!(span = %diagnostic.span, "{}", diagnostic.inner);
    }
    if options.strict && !diagnostics.is_empty() {
        return Err(Error::Syntax(diagnostics));
    }
    Ok(Parsed {
        program,
        diagnostics,
    })
}

pub fn lower(program: &Program) -> Result<Vec<Instruction>, Error> {
    let listing = lower::lower(program)?;
    debug!(instructions = listing.len(), "lowering finished");
    Ok(listing)
}
