use std::format_args as f;

use crate::{
    ast::BinaryOperator,
    codegen::{
        backend::{Asm, Backend, Loc},
        interface::Arch,
    },
    ir::Section,
};

/// x86-64 Linux, AT&T syntax.
///
/// `%rax` is the accumulator and `%rcx` the scratch register. The outermost
/// frame of a function saves `%rbp`, so returning never needs to know how
/// many frames are open.
pub struct X86_64;

const ARGUMENT_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

const SYS_WRITE: u32 = 1;
const SYS_EXIT: u32 = 60;

impl Backend for X86_64 {
    const ARCH: Arch = Arch::X86_64;
    const MAX_REGISTER_ARGS: usize = ARGUMENT_REGISTERS.len();
    const MAX_FRAME_BYTES: u32 = 0x7fff_fff0;
    const MAX_STACK_OFFSET: u32 = 0x7fff_ffff;

    /// Opens the text section before exporting the entry point.
    fn emit_header(asm: &mut Asm, entry: &str) {
        asm.directive(".text");
        asm.directive(f!(".globl {entry}"));
    }

    fn emit_section(asm: &mut Asm, section: Section, after_data: bool) {
        match section {
            Section::Data => asm.directive(".data"),
            Section::Text => {
                if after_data {
                    asm.blank();
                    asm.directive(".text");
                }
                asm.blank();
            }
        }
    }

    fn emit_literal(asm: &mut Asm, index: usize, text: &str) {
        asm.directive(f!("p{index}:"));
        asm.instr(f!(".ascii \"{text}\\n\""));
        asm.directive(f!("p{index}_len = . - p{index}"));
    }

    fn emit_label(asm: &mut Asm, name: &str) {
        asm.directive(f!("{name}:"));
    }

    fn emit_prologue(asm: &mut Asm, bytes: u32, outermost: bool) {
        if outermost {
            asm.instr("push %rbp");
            asm.instr("mov %rsp, %rbp");
        }
        asm.instr(f!("sub ${bytes}, %rsp"));
    }

    fn emit_epilogue(asm: &mut Asm, bytes: u32, outermost: bool) {
        if outermost {
            asm.instr("mov %rbp, %rsp");
            asm.instr("pop %rbp");
        } else {
            asm.instr(f!("add ${bytes}, %rsp"));
        }
    }

    fn emit_copy(asm: &mut Asm, dst: u32, src: Loc) {
        load(asm, "%rax", src);
        store(asm, "%rax", dst);
    }

    fn emit_binary_op(asm: &mut Asm, op: BinaryOperator, lhs: Loc, rhs: Loc, dst: u32) {
        let instructions: &[&str] = match op {
            BinaryOperator::Add => &["add %rcx, %rax"],
            BinaryOperator::Sub => &["sub %rcx, %rax"],
            BinaryOperator::Mul => &["imul %rcx, %rax"],
            BinaryOperator::Div => &["cqo", "idiv %rcx"],
            BinaryOperator::Pow => {
                emit_pow(asm, lhs, rhs);
                store(asm, "%rax", dst);
                return;
            }
        };
        load(asm, "%rax", lhs);
        load(asm, "%rcx", rhs);
        for instruction in instructions {
            asm.instr(instruction);
        }
        store(asm, "%rax", dst);
    }

    fn emit_syscall_exit(asm: &mut Asm, status: Loc) {
        asm.instr(f!("mov ${SYS_EXIT}, %rax"));
        load(asm, "%rdi", status);
        asm.instr("syscall");
    }

    fn emit_syscall_write(asm: &mut Asm, index: usize) {
        asm.instr(f!("mov ${SYS_WRITE}, %rax"));
        asm.instr("mov $1, %rdi");
        asm.instr(f!("lea p{index}(%rip), %rsi"));
        asm.instr(f!("mov $p{index}_len, %rdx"));
        asm.instr("syscall");
    }

    fn emit_argument(asm: &mut Asm, position: usize, value: Loc) {
        load(asm, ARGUMENT_REGISTERS[position - 1], value);
    }

    fn emit_parameter(asm: &mut Asm, position: usize, dst: u32) {
        store(asm, ARGUMENT_REGISTERS[position - 1], dst);
    }

    fn emit_call(asm: &mut Asm, name: &str) {
        asm.instr(f!("call {name}"));
    }

    fn emit_return(asm: &mut Asm, value: Loc, unwind: Option<u32>) {
        load(asm, "%rax", value);
        if unwind.is_some() {
            asm.instr("mov %rbp, %rsp");
            asm.instr("pop %rbp");
        }
        asm.instr("ret");
    }

    fn emit_ret(asm: &mut Asm) {
        asm.instr("ret");
        asm.blank();
    }
}

/// `%rax = lhs ^ rhs`, counting `%rdx` down to zero.
fn emit_pow(asm: &mut Asm, lhs: Loc, rhs: Loc) {
    let top = asm.fresh_label("pow");
    let end = format!("{top}_end");
    load(asm, "%rcx", lhs);
    load(asm, "%rdx", rhs);
    asm.instr("mov $1, %rax");
    asm.directive(f!("{top}:"));
    asm.instr("cmp $0, %rdx");
    asm.instr(f!("jle {end}"));
    asm.instr("imul %rcx, %rax");
    asm.instr("dec %rdx");
    asm.instr(f!("jmp {top}"));
    asm.directive(f!("{end}:"));
}

fn load(asm: &mut Asm, reg: &str, loc: Loc) {
    match loc {
        Loc::Imm(int) if i32::try_from(int).is_ok() => asm.instr(f!("mov ${int}, {reg}")),
        Loc::Imm(int) => asm.instr(f!("movabs ${int}, {reg}")),
        Loc::Stack(offset) => asm.instr(f!("mov {offset}(%rsp), {reg}")),
    }
}

fn store(asm: &mut Asm, reg: &str, offset: u32) {
    asm.instr(f!("mov {reg}, {offset}(%rsp)"));
}
