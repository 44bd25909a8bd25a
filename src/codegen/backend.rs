use std::fmt;

use crate::{ast::BinaryOperator, codegen::interface::Arch, ir::Section};

/// Where an operand lives once the generator has resolved it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Loc {
    Imm(i64),
    /// Byte offset from the stack pointer.
    Stack(u32),
}

/// Instruction selection for one architecture.
///
/// Implementations are stateless; every method appends to the [`Asm`]
/// buffer. Stack offsets are already resolved by the generator.
pub trait Backend {
    const ARCH: Arch;

    /// Registers available for call arguments.
    const MAX_REGISTER_ARGS: usize;

    /// Largest frame a single prologue may allocate.
    const MAX_FRAME_BYTES: u32;

    /// Largest offset from the stack pointer a load or store can address.
    const MAX_STACK_OFFSET: u32;

    fn emit_header(asm: &mut Asm, entry: &str);

    /// `after_data` is set when the text section follows a data section.
    fn emit_section(asm: &mut Asm, section: Section, after_data: bool);

    fn emit_literal(asm: &mut Asm, index: usize, text: &str);

    fn emit_label(asm: &mut Asm, name: &str);

    /// `outermost` is set for the first frame of a function or entry point.
    fn emit_prologue(asm: &mut Asm, bytes: u32, outermost: bool);

    fn emit_epilogue(asm: &mut Asm, bytes: u32, outermost: bool);

    fn emit_copy(asm: &mut Asm, dst: u32, src: Loc);

    fn emit_binary_op(asm: &mut Asm, op: BinaryOperator, lhs: Loc, rhs: Loc, dst: u32);

    fn emit_syscall_exit(asm: &mut Asm, status: Loc);

    fn emit_syscall_write(asm: &mut Asm, index: usize);

    /// Places the 1-based argument `position` of the next call.
    fn emit_argument(asm: &mut Asm, position: usize, value: Loc);

    /// Spills the 1-based incoming argument `position` into its slot.
    fn emit_parameter(asm: &mut Asm, position: usize, dst: u32);

    fn emit_call(asm: &mut Asm, name: &str);

    /// Returns `value` from the current function, first releasing `unwind`
    /// bytes of stack when frames are open.
    fn emit_return(asm: &mut Asm, value: Loc, unwind: Option<u32>);

    fn emit_ret(asm: &mut Asm);
}

/// Line-oriented assembly buffer.
pub struct Asm {
    buf: String,
    labels: u32,
}

impl Asm {
    const INDENT: &str = "        ";

    pub fn new() -> Asm {
        Asm {
            buf: String::with_capacity(4 * 1024),
            labels: 0,
        }
    }

    /// Prints an unindented line, such as a directive or label.
    pub fn directive(&mut self, line: impl fmt::Display) {
        self.buf += &line.to_string();
        self.buf.push('\n');
    }

    /// Prints an indented instruction.
    pub fn instr(&mut self, line: impl fmt::Display) {
        self.buf += Self::INDENT;
        self.directive(line);
    }

    /// Prints an empty line.
    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Returns a local label that was never handed out before.
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!(".L{prefix}{}", self.labels);
        self.labels += 1;
        label
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

impl Default for Asm {
    fn default() -> Asm {
        Asm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asm_lines() {
        let mut asm = Asm::new();
        asm.directive(".global _start");
        asm.blank();
        asm.directive("_start:");
        asm.instr(format_args!("svc {}", 0));
        assert_eq!(asm.finish(), ".global _start\n\n_start:\n        svc 0\n");
    }

    #[test]
    fn test_fresh_labels_are_unique() {
        let mut asm = Asm::new();
        assert_eq!(asm.fresh_label("pow"), ".Lpow0");
        assert_eq!(asm.fresh_label("pow"), ".Lpow1");
    }
}
