use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use vinyl::{
    driver::{self, Options},
    ir, lexer,
    parser::ExprParsing,
    util::fmt::tree,
};

use crate::toolchain::Toolchain;

mod target;
mod toolchain;

/// Compiles vinyl programs into static, freestanding executables.
#[derive(Parser)]
#[command(name = "vinylc", version)]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Output path. Defaults to the input path with the extension of the
    /// emitted stage.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = target::DEFAULT_ARCH)]
    arch: target::Arch,

    /// Last stage to run.
    #[arg(long, value_enum, default_value_t = Emit::Exe)]
    emit: Emit,

    /// Treat syntax diagnostics as errors.
    #[arg(long)]
    strict: bool,

    /// Group operators by precedence instead of strictly left to right.
    #[arg(long)]
    precedence: bool,

    /// Prefix of the assembler and linker binaries [default: <arch>-linux-gnu-]
    #[arg(long)]
    cross_prefix: Option<String>,

    /// Version suffix of the gcc binary used to link.
    #[arg(long, default_value = "11")]
    gcc_version: String,

    /// More logging; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Ir,
    Asm,
    Exe,
}

impl Emit {
    const fn extension(self) -> &'static str {
        match self {
            Emit::Tokens => "tokens",
            Emit::Ast => "ast",
            Emit::Ir => "ir",
            Emit::Asm => "asm",
            Emit::Exe => "exe",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let src = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let expr_parsing = if cli.precedence {
        ExprParsing::Precedence
    } else {
        ExprParsing::LeftFold
    };
    let options = Options::new(cli.arch.into())
        .with_expr_parsing(expr_parsing)
        .with_strict(cli.strict);
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension(cli.emit.extension()));

    match cli.emit {
        Emit::Tokens => {
            let mut listing = String::new();
            for token in lexer::lex(&src) {
                writeln!(listing, "{token:?}")?;
            }
            write_output(&output, &listing)
        }
        Emit::Ast => {
            let parsed = driver::parse(&src, &options)?;
            write_output(&output, &tree::print_program_string(&parsed.program))
        }
        Emit::Ir => {
            let parsed = driver::parse(&src, &options)?;
            let listing = driver::lower(&parsed.program)?;
            write_output(&output, &ir::print_listing_string(&listing))
        }
        Emit::Asm => {
            let compiled = driver::compile(&src, &options)?;
            write_output(&output, &compiled.assembly)
        }
        Emit::Exe => {
            let compiled = driver::compile(&src, &options)?;
            let asm = output.with_extension("asm");
            let object = output.with_extension("o");
            write_output(&asm, &compiled.assembly)?;

            let prefix = cli
                .cross_prefix
                .as_deref()
                .unwrap_or(options.arch.toolchain_prefix());
            let toolchain = Toolchain::new(prefix, cli.gcc_version.as_str());
            toolchain.assemble(&asm, &object)?;
            toolchain.link(&object, &output)?;
            info!(exe = %output.display(), arch = %cli.arch, "built executable");
            Ok(())
        }
    }
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();
}
