use std::marker::PhantomData;

use tracing::trace;

use crate::{
    codegen::{
        backend::{Asm, Backend, Loc},
        interface::Error,
    },
    ir::{Instruction, Operand, Section, ENTRY_POINT, SLOT_SIZE},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Walks the listing, keeping one declaration table per open frame, and
/// hands resolved operands to the backend `B`.
pub struct Generator<B> {
    asm: Asm,
    frames: Vec<Frame>,
    in_data: bool,
    in_function: bool,
    _backend: PhantomData<B>,
}

struct Frame {
    bytes: u32,
    outermost: bool,
    /// Declared variables and temporaries. The position is the slot index.
    places: Vec<Operand>,
}

impl<B> Generator<B>
where
    B: Backend,
{
    pub fn new() -> Generator<B> {
        Generator {
            asm: Asm::new(),
            frames: Vec::new(),
            in_data: false,
            in_function: false,
            _backend: PhantomData,
        }
    }

    pub fn generate(mut self, instructions: &[Instruction]) -> Result<String> {
        for instruction in instructions {
            trace!(%instruction, "generating");
            self.g_instruction(instruction)?;
        }
        if let Some(frame) = self.frames.last() {
            return Err(Error::UnclosedFrame { bytes: frame.bytes });
        }
        Ok(self.asm.finish())
    }

    fn g_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        let asm = &mut self.asm;
        match instruction {
            Instruction::Global(symbol) => B::emit_header(asm, symbol),
            Instruction::Section(section) => {
                B::emit_section(asm, *section, self.in_data);
                self.in_data = *section == Section::Data;
            }
            Instruction::Literal { index, text } => B::emit_literal(asm, *index, text),
            Instruction::Label(name) => {
                if let Some(frame) = self.frames.last() {
                    return Err(Error::UnclosedFrame { bytes: frame.bytes });
                }
                self.in_function = &**name != ENTRY_POINT;
                B::emit_label(asm, name);
            }
            Instruction::Copy { dst, src } => {
                let src = self.resolve(src)?;
                let dst = self.declare(Operand::Var(dst.clone()))?;
                B::emit_copy(&mut self.asm, dst, src);
            }
            Instruction::Binary { op, lhs, rhs, dst } => {
                let lhs = self.resolve(lhs)?;
                let rhs = self.resolve(rhs)?;
                let dst = self.declare(Operand::Temp(*dst))?;
                B::emit_binary_op(&mut self.asm, *op, lhs, rhs, dst);
            }
            Instruction::Exit(status) => {
                let status = self.resolve(status)?;
                B::emit_syscall_exit(&mut self.asm, status);
            }
            Instruction::Print(index) => B::emit_syscall_write(asm, *index),
            Instruction::Return(value) => {
                if !self.in_function {
                    return Err(Error::ReturnOutsideFunction);
                }
                let value = self.resolve(value)?;
                let unwind = (!self.frames.is_empty())
                    .then(|| self.frames.iter().map(|frame| frame.bytes).sum());
                B::emit_return(&mut self.asm, value, unwind);
            }
            Instruction::StoreParameter { index, value } => {
                Self::check_argument(*index)?;
                let value = self.resolve(value)?;
                B::emit_argument(&mut self.asm, *index, value);
            }
            Instruction::Call(name) => B::emit_call(asm, name),
            Instruction::Ret => B::emit_ret(asm),
            Instruction::Prolog(bytes) => {
                if *bytes > B::MAX_FRAME_BYTES {
                    return Err(Error::FrameTooLarge {
                        bytes: *bytes,
                        max: B::MAX_FRAME_BYTES,
                    });
                }
                let outermost = self.frames.is_empty();
                self.frames.push(Frame {
                    bytes: *bytes,
                    outermost,
                    places: Vec::new(),
                });
                B::emit_prologue(asm, *bytes, outermost);
            }
            Instruction::Epilog(bytes) => match self.frames.last() {
                Some(frame) if frame.bytes == *bytes => {
                    let outermost = frame.outermost;
                    self.frames.pop();
                    B::emit_epilogue(asm, *bytes, outermost);
                }
                open => {
                    return Err(Error::UnbalancedEpilog {
                        expected: open.map(|frame| frame.bytes),
                        found: *bytes,
                    })
                }
            },
            Instruction::Parameter { index, name, .. } => {
                Self::check_argument(*index)?;
                let dst = self.declare(Operand::Var(name.clone()))?;
                B::emit_parameter(&mut self.asm, *index, dst);
            }
        }
        Ok(())
    }

    fn check_argument(index: usize) -> Result<()> {
        if index == 0 || index > B::MAX_REGISTER_ARGS {
            return Err(Error::TooManyArguments {
                index,
                max: B::MAX_REGISTER_ARGS,
                arch: B::ARCH,
            });
        }
        Ok(())
    }
}

/// Declaration tables.
impl<B> Generator<B>
where
    B: Backend,
{
    /// Finds the slot of `place` in the innermost frame that declares it. The
    /// offset accounts for every frame opened after that one.
    fn resolve(&self, place: &Operand) -> Result<Loc> {
        if let Operand::Int(int) = place {
            return Ok(Loc::Imm(*int));
        }
        let mut above: u32 = 0;
        for frame in self.frames.iter().rev() {
            if let Some(slot) = frame.places.iter().position(|p| p == place) {
                let offset = slot_offset(slot).saturating_add(above);
                if offset > B::MAX_STACK_OFFSET {
                    return Err(Error::OffsetOutOfRange {
                        name: place.to_string().into(),
                        offset,
                        max: B::MAX_STACK_OFFSET,
                    });
                }
                return Ok(Loc::Stack(offset));
            }
            above = above.saturating_add(frame.bytes);
        }
        Err(Error::UnresolvedName(place.to_string().into()))
    }

    /// Returns the slot of `place` in the current frame, declaring it first if
    /// needed.
    fn declare(&mut self, place: Operand) -> Result<u32> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(Error::NoFrame(place.to_string().into()));
        };
        let slot = match frame.places.iter().position(|p| *p == place) {
            Some(slot) => slot,
            None => {
                if slot_offset(frame.places.len()) + SLOT_SIZE > frame.bytes {
                    return Err(Error::FrameOverflow {
                        bytes: frame.bytes,
                        name: place.to_string().into(),
                    });
                }
                frame.places.push(place);
                frame.places.len() - 1
            }
        };
        Ok(slot_offset(slot))
    }
}

fn slot_offset(slot: usize) -> u32 {
    u32::try_from(slot + 1).map_or(u32::MAX, |words| words.saturating_mul(SLOT_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{aarch64::Aarch64, x86_64::X86_64};

    /// `x` in a 16 byte frame, read from below `depth` frames of 0xff0 bytes.
    fn nested_read(depth: usize) -> Vec<Instruction> {
        let mut listing = vec![
            Instruction::Label(ENTRY_POINT.into()),
            Instruction::Prolog(16),
            Instruction::Copy {
                dst: "x".into(),
                src: Operand::Int(1),
            },
        ];
        listing.extend((0..depth).map(|_| Instruction::Prolog(0xff0)));
        listing.push(Instruction::Exit(Operand::Var("x".into())));
        listing.extend((0..depth).map(|_| Instruction::Epilog(0xff0)));
        listing.push(Instruction::Epilog(16));
        listing
    }

    #[test]
    fn test_outer_offset_within_reach() {
        // 8 + 7 * 0xff0 = 28568
        let asm = Generator::<Aarch64>::new().generate(&nested_read(7)).unwrap();
        assert!(asm.contains("ldr x0, [sp, #0x6f98]"));
    }

    #[test]
    fn test_outer_offset_out_of_reach() {
        // 8 + 9 * 0xff0 = 36728
        let error = Generator::<Aarch64>::new()
            .generate(&nested_read(9))
            .unwrap_err();
        assert_eq!(
            error,
            Error::OffsetOutOfRange {
                name: "x".into(),
                offset: 36_728,
                max: 0x7ff8,
            }
        );
        assert!(Generator::<X86_64>::new().generate(&nested_read(9)).is_ok());
    }
}
