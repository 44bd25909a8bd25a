use tracing::debug;

use crate::{
    codegen::{aarch64::Aarch64, generator::Generator, x86_64::X86_64},
    ir::Instruction,
};

/// Renders the instruction listing as GNU assembler text for `arch`.
pub fn generate(arch: Arch, instructions: &[Instruction]) -> Result<String, Error> {
    let asm = match arch {
        Arch::Aarch64 => Generator::<Aarch64>::new().generate(instructions)?,
        Arch::X86_64 => Generator::<X86_64>::new().generate(instructions)?,
    };
    debug!(%arch, bytes = asm.len(), "generated assembly");
    Ok(asm)
}

/// Rounds `bytes` up to the next multiple of 16.
pub const fn stack_alignment(bytes: u32) -> u32 {
    if bytes % 16 == 0 {
        bytes
    } else {
        ((bytes >> 4) + 1) << 4
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    X86_64,
}

impl Arch {
    pub const ALL: &[Arch] = &[Arch::Aarch64, Arch::X86_64];

    /// Prefix of the GNU cross toolchain binaries, such as
    /// `aarch64-linux-gnu-as`.
    pub const fn toolchain_prefix(&self) -> &'static str {
        match self {
            Arch::Aarch64 => "aarch64-linux-gnu-",
            Arch::X86_64 => "x86_64-linux-gnu-",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::Aarch64 => f.write_str("aarch64"),
            Arch::X86_64 => f.write_str("x86_64"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no stack slot holds `{0}`")]
    UnresolvedName(Box<str>),
    #[error("`{0}` needs a stack slot, but no frame is open")]
    NoFrame(Box<str>),
    #[error("frame of {bytes} bytes cannot hold another slot for `{name}`")]
    FrameOverflow { bytes: u32, name: Box<str> },
    #[error("frame of {bytes} bytes exceeds the maximum of {max}")]
    FrameTooLarge { bytes: u32, max: u32 },
    #[error("epilog of {found} bytes does not close the open frame ({})", open_frame(.expected))]
    UnbalancedEpilog { expected: Option<u32>, found: u32 },
    #[error("argument {index} exceeds the {max} register arguments of {arch}")]
    TooManyArguments { index: usize, max: usize, arch: Arch },
    #[error("`{name}` lives {offset} bytes above the stack pointer, beyond the reach of {max}")]
    OffsetOutOfRange {
        name: Box<str>,
        offset: u32,
        max: u32,
    },
    #[error("frame of {bytes} bytes is never closed")]
    UnclosedFrame { bytes: u32 },
    #[error("`return` outside of a function")]
    ReturnOutsideFunction,
}

fn open_frame(expected: &Option<u32>) -> String {
    match expected {
        Some(bytes) => format!("{bytes} bytes"),
        None => String::from("none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_alignment() {
        assert_eq!(stack_alignment(0), 0);
        assert_eq!(stack_alignment(8), 16);
        assert_eq!(stack_alignment(16), 16);
        assert_eq!(stack_alignment(17), 32);
        assert_eq!(stack_alignment(40), 48);
    }

    #[test]
    fn test_stack_alignment_properties() {
        for n in (0..2_048).chain([u32::MAX - 15 - 1024, 65_535]) {
            let aligned = stack_alignment(n);
            assert_eq!(aligned % 16, 0, "{n} aligned to {aligned}");
            assert!(aligned >= n);
            assert!(aligned - n < 16);
            assert_eq!(stack_alignment(aligned), aligned);
        }
    }

    #[test]
    fn test_arch_names() {
        let names: Vec<_> = Arch::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["aarch64", "x86_64"]);
        assert_eq!(Arch::Aarch64.toolchain_prefix(), "aarch64-linux-gnu-");
    }
}
