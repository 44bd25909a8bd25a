//! The flat intermediate representation produced by [`crate::lower`] and
//! consumed by the code generators.

use std::fmt;

use crate::ast::BinaryOperator;

/// Size, in bytes, of every stack slot.
pub const SLOT_SIZE: u32 = 8;

/// Name of the program entry point.
pub const ENTRY_POINT: &str = "_start";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Exports a symbol.
    Global(Box<str>),
    Section(Section),
    /// A `print` literal, emitted as `p<index>` in the data section.
    Literal {
        index: usize,
        text: Box<str>,
    },
    Label(Box<str>),
    /// Stores `src` in the slot of the variable `dst`, declaring it in the
    /// current frame if needed.
    Copy {
        dst: Box<str>,
        src: Operand,
    },
    /// Computes `lhs op rhs` into a fresh temporary.
    Binary {
        op: BinaryOperator,
        lhs: Operand,
        rhs: Operand,
        dst: u32,
    },
    Exit(Operand),
    /// Writes the literal `p<index>` to the standard output.
    Print(usize),
    Return(Operand),
    /// Places the 1-based argument `index` of the next call.
    StoreParameter {
        index: usize,
        value: Operand,
    },
    Call(Box<str>),
    Ret,
    /// Opens a stack frame of the given size in bytes.
    Prolog(u32),
    /// Closes the innermost stack frame, which must have the given size.
    Epilog(u32),
    /// Declares the 1-based formal `index` of the current function.
    Parameter {
        index: usize,
        size: u32,
        name: Box<str>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Section {
    Data,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Int(i64),
    Var(Box<str>),
    Temp(u32),
}

impl Instruction {
    pub const fn opcode(&self) -> &'static str {
        match self {
            Instruction::Global(_) => "global",
            Instruction::Section(_) => "section",
            Instruction::Literal { .. } => "ascii",
            Instruction::Label(_) => "label",
            Instruction::Copy { .. } => "=",
            Instruction::Binary { op, .. } => op.mnemonic(),
            Instruction::Exit(_) => "exit",
            Instruction::Print(_) => "print",
            Instruction::Return(_) => "return",
            Instruction::StoreParameter { .. } => "store_parameter",
            Instruction::Call(_) => "call",
            Instruction::Ret => "ret",
            Instruction::Prolog(_) => "prolog",
            Instruction::Epilog(_) => "epilog",
            Instruction::Parameter { .. } => "parameter",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode();
        match self {
            Instruction::Global(symbol) => write!(f, "{opcode:<16}{symbol}"),
            Instruction::Section(section) => write!(f, "{opcode:<16}{section}"),
            Instruction::Literal { index, text } => write!(f, "{opcode:<16}{index}, {text:?}"),
            Instruction::Label(name) => write!(f, "{opcode:<16}{name}"),
            Instruction::Copy { dst, src } => write!(f, "{opcode:<16}{dst}, {src}"),
            Instruction::Binary { lhs, rhs, dst, .. } => {
                write!(f, "{opcode:<16}{lhs}, {rhs}, {}", Operand::Temp(*dst))
            }
            Instruction::Exit(status) => write!(f, "{opcode:<16}{status}"),
            Instruction::Print(index) => write!(f, "{opcode:<16}{index}"),
            Instruction::Return(value) => write!(f, "{opcode:<16}{value}"),
            Instruction::StoreParameter { index, value } => {
                write!(f, "{opcode:<16}{index}, {value}")
            }
            Instruction::Call(name) => write!(f, "{opcode:<16}{name}"),
            Instruction::Ret => f.write_str(opcode),
            Instruction::Prolog(bytes) | Instruction::Epilog(bytes) => {
                write!(f, "{opcode:<16}{bytes}")
            }
            Instruction::Parameter { index, size, name } => {
                write!(f, "{opcode:<16}{index}, {size}, {name}")
            }
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Data => f.write_str("data"),
            Section::Text => f.write_str("text"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(int) => write!(f, "{int}"),
            Operand::Var(name) => f.write_str(name),
            Operand::Temp(index) => write!(f, "%t{index}"),
        }
    }
}

/// Renders a listing, one instruction per line.
pub fn print_listing_string(instructions: &[Instruction]) -> String {
    let mut buf = String::with_capacity(instructions.len() * 24);
    for instruction in instructions {
        buf += &instruction.to_string();
        buf.push('\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_pads_opcode() {
        let listing = print_listing_string(&[
            Instruction::Global(ENTRY_POINT.into()),
            Instruction::Section(Section::Data),
            Instruction::Literal {
                index: 0,
                text: "42".into(),
            },
            Instruction::Copy {
                dst: "x".into(),
                src: Operand::Int(-3),
            },
            Instruction::Binary {
                op: BinaryOperator::Mul,
                lhs: Operand::Var("x".into()),
                rhs: Operand::Int(2),
                dst: 0,
            },
            Instruction::StoreParameter {
                index: 1,
                value: Operand::Temp(0),
            },
            Instruction::Parameter {
                index: 2,
                size: SLOT_SIZE,
                name: "y".into(),
            },
            Instruction::Ret,
        ]);
        let expected = indoc::indoc! {r#"
            global          _start
            section         data
            ascii           0, "42"
            =               x, -3
            mul             x, 2, %t0
            store_parameter 1, %t0
            parameter       2, 8, y
            ret
        "#};
        assert_eq!(listing, expected);
    }
}
