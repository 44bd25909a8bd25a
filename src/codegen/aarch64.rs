use std::format_args as f;

use crate::{
    ast::BinaryOperator,
    codegen::{
        backend::{Asm, Backend, Loc},
        interface::Arch,
    },
    ir::Section,
};

/// AArch64 Linux, GNU syntax.
///
/// `x1` is the accumulator and `x0` the scratch register; arguments are
/// passed in `x0..x7` and the result is returned in `x0`.
pub struct Aarch64;

/// Largest magnitude a single `mov` is trusted with.
const MOV_IMMEDIATE: i64 = 0xffff;

/// Largest stack adjustment encodable by a single `add`/`sub`.
const MAX_SP_ADJUSTMENT: u32 = 0xff0;

const SYS_WRITE: u32 = 0x40;
const SYS_EXIT: u32 = 0x5d;

impl Backend for Aarch64 {
    const ARCH: Arch = Arch::Aarch64;
    const MAX_REGISTER_ARGS: usize = 8;
    const MAX_FRAME_BYTES: u32 = 0xfff;
    /// Unsigned 12-bit immediate scaled by 8.
    const MAX_STACK_OFFSET: u32 = 0x7ff8;

    fn emit_header(asm: &mut Asm, entry: &str) {
        asm.directive(f!(".global {entry}"));
    }

    fn emit_section(asm: &mut Asm, section: Section, after_data: bool) {
        match section {
            Section::Data => {
                asm.blank();
                asm.directive(".data");
            }
            Section::Text => {
                if after_data {
                    asm.blank();
                }
                asm.directive(".section .text");
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

    fn emit_prologue(asm: &mut Asm, bytes: u32, _outermost: bool) {
        asm.instr(f!("sub sp, sp, #{bytes:#x}"));
    }

    fn emit_epilogue(asm: &mut Asm, bytes: u32, _outermost: bool) {
        asm.instr(f!("add sp, sp, #{bytes:#x}"));
    }

    fn emit_copy(asm: &mut Asm, dst: u32, src: Loc) {
        load(asm, "x1", src);
        store(asm, "x1", dst);
    }

    fn emit_binary_op(asm: &mut Asm, op: BinaryOperator, lhs: Loc, rhs: Loc, dst: u32) {
        let mnemonic = match op {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "sdiv",
            BinaryOperator::Pow => {
                emit_pow(asm, lhs, rhs);
                store(asm, "x1", dst);
                return;
            }
        };
        load(asm, "x1", lhs);
        load(asm, "x0", rhs);
        asm.instr(f!("{mnemonic} x1, x1, x0"));
        store(asm, "x1", dst);
    }

    fn emit_syscall_exit(asm: &mut Asm, status: Loc) {
        asm.instr(f!("mov x8, #{SYS_EXIT:#x}"));
        load(asm, "x0", status);
        asm.instr("svc 0");
    }

    fn emit_syscall_write(asm: &mut Asm, index: usize) {
        asm.instr(f!("mov x8, #{SYS_WRITE:#x}"));
        asm.instr("mov x0, #0x1");
        asm.instr(f!("ldr x1, =p{index}"));
        asm.instr(f!("ldr x2, =p{index}_len"));
        asm.instr("svc 0");
    }

    fn emit_argument(asm: &mut Asm, position: usize, value: Loc) {
        load(asm, &argument_register(position), value);
    }

    fn emit_parameter(asm: &mut Asm, position: usize, dst: u32) {
        store(asm, &argument_register(position), dst);
    }

    fn emit_call(asm: &mut Asm, name: &str) {
        asm.instr("str x30, [sp, #-16]!");
        asm.instr(f!("bl {name}"));
        asm.instr("ldr x30, [sp], #16");
    }

    fn emit_return(asm: &mut Asm, value: Loc, unwind: Option<u32>) {
        load(asm, "x0", value);
        let mut remaining = unwind.unwrap_or(0);
        while remaining > 0 {
            let step = remaining.min(MAX_SP_ADJUSTMENT);
            asm.instr(f!("add sp, sp, #{step:#x}"));
            remaining -= step;
        }
        asm.instr("ret");
    }

    fn emit_ret(asm: &mut Asm) {
        asm.instr("ret");
        asm.blank();
    }
}

/// `x1 = lhs ^ rhs`, counting `x0` down to zero.
fn emit_pow(asm: &mut Asm, lhs: Loc, rhs: Loc) {
    let top = asm.fresh_label("pow");
    let end = format!("{top}_end");
    load(asm, "x2", lhs);
    load(asm, "x0", rhs);
    asm.instr("mov x1, #0x1");
    asm.directive(f!("{top}:"));
    asm.instr("cmp x0, #0x0");
    asm.instr(f!("b.le {end}"));
    asm.instr("mul x1, x1, x2");
    asm.instr("sub x0, x0, #0x1");
    asm.instr(f!("b {top}"));
    asm.directive(f!("{end}:"));
}

fn load(asm: &mut Asm, reg: &str, loc: Loc) {
    match loc {
        Loc::Imm(int) if (-MOV_IMMEDIATE..=MOV_IMMEDIATE).contains(&int) => {
            asm.instr(f!("mov {reg}, #{}", hex(int)));
        }
        Loc::Imm(int) => asm.instr(f!("ldr {reg}, ={}", hex(int))),
        Loc::Stack(offset) => asm.instr(f!("ldr {reg}, [sp, #{offset:#x}]")),
    }
}

fn store(asm: &mut Asm, reg: &str, offset: u32) {
    asm.instr(f!("str {reg}, [sp, #{offset:#x}]"));
}

fn argument_register(position: usize) -> String {
    format!("x{}", position - 1)
}

fn hex(int: i64) -> String {
    if int < 0 {
        format!("-{:#x}", int.unsigned_abs())
    } else {
        format!("{int:#x}")
    }
}
