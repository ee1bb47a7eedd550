//! The instruction unit: instruction pointer, code fetch, jumps, program
//! loading, and the call/return protocol with its private return stack.
//!
//! Fetch never moves the instruction pointer; the CPU's main loop advances
//! it explicitly after consuming each byte.  The return stack holds
//! (return address, saved frame pointer) pairs and is not addressable by
//! programs.

use log::trace;

use crate::common::{Addr32, Byte, ContextId, Page, Word};
use crate::mem::{AccessMode, MemError, MemUnit, StackView};

use super::error::RuntimeError;
use super::flags::{Flag, Flags};

/// Bytes per code page.
const PAGE_SIZE: Addr32 = 65536;

/// One entry of the return stack.
#[derive(Clone, Copy, Debug)]
struct ReturnFrame {
    return_address: Word,
    saved_fp: i32,
}

pub struct InstructionUnit {
    ir: Word,
    code_ctx: ContextId,
    return_stack: Vec<ReturnFrame>,
}

impl InstructionUnit {
    pub fn new(code_ctx: ContextId) -> InstructionUnit {
        InstructionUnit {
            ir: 0,
            code_ctx,
            return_stack: Vec::new(),
        }
    }

    pub fn ir(&self) -> Word {
        self.ir
    }

    pub fn set_ir(&mut self, addr: Word) {
        self.ir = addr;
    }

    pub fn advance_ir(&mut self, delta: Word) {
        self.ir = self.ir.wrapping_add(delta);
    }

    /// Depth of the return stack; zero outside any subroutine.
    pub fn return_depth(&self) -> usize {
        self.return_stack.len()
    }

    /// Fetch the byte at IR without advancing.
    pub fn read_byte_at_ir(&self, mem: &mut MemUnit) -> Result<Byte, MemError> {
        let addr = Addr32::from(self.ir);
        let mut code = mem.paged(self.code_ctx, AccessMode::ReadOnly)?;
        code.set_page((addr / PAGE_SIZE) as Page);
        code.read_byte((addr % PAGE_SIZE) as Word)
    }

    /// Fetch the little-endian word at IR without advancing.
    pub fn read_word_at_ir(&self, mem: &mut MemUnit) -> Result<Word, MemError> {
        let addr = Addr32::from(self.ir);
        let mut code = mem.paged(self.code_ctx, AccessMode::ReadOnly)?;
        code.set_page((addr / PAGE_SIZE) as Page);
        code.read_word((addr % PAGE_SIZE) as Word)
    }

    /// Fetch `count` bytes starting at IR without advancing.
    pub fn read_bytes_at_ir(&self, mem: &mut MemUnit, count: usize) -> Result<Vec<Byte>, MemError> {
        let addr = Addr32::from(self.ir);
        let mut code = mem.paged(self.code_ctx, AccessMode::ReadOnly)?;
        code.set_page((addr / PAGE_SIZE) as Page);
        code.bulk_read((addr % PAGE_SIZE) as Word, count as Addr32)
    }

    pub fn jump_to(&mut self, addr: Word) {
        self.ir = addr;
    }

    /// Jump iff `flag` matches `expected`.
    pub fn jump_if(&mut self, addr: Word, flag: Flag, expected: bool, flags: &Flags) {
        if flags.is_set(flag) == expected {
            self.ir = addr;
        }
    }

    /// Write a program image into the code context starting at address 0,
    /// spanning pages as needed.  Protected mode only.
    pub fn load_program(&self, mem: &mut MemUnit, program: &[Byte]) -> Result<(), MemError> {
        let mut code = mem.paged(self.code_ctx, AccessMode::ReadWrite)?;
        let mut addr: Addr32 = 0;
        while (addr as usize) < program.len() {
            let offset = addr % PAGE_SIZE;
            let in_page = (PAGE_SIZE - offset) as usize;
            let remaining = program.len() - addr as usize;
            let chunk = in_page.min(remaining);
            code.set_page((addr / PAGE_SIZE) as Page);
            code.bulk_write(offset as Word, &program[addr as usize..addr as usize + chunk])?;
            addr += chunk as Addr32;
        }
        trace!("loaded {} code bytes", program.len());
        Ok(())
    }

    /// Enter a subroutine: remember (IR, FP) on the return stack, jump to
    /// `target`, push the call flag, and make it the new frame base.
    pub fn call_subroutine(
        &mut self,
        target: Word,
        with_return_value: bool,
        stack: &mut StackView<'_>,
    ) -> Result<(), RuntimeError> {
        self.return_stack.push(ReturnFrame {
            return_address: self.ir,
            saved_fp: stack.frame_pointer(),
        });
        self.ir = target;
        stack.push_byte(if with_return_value { 1 } else { 0 })?;
        stack.set_frame_to_top();
        trace!("call to {target:#06x}, depth {}", self.return_stack.len());
        Ok(())
    }

    /// Leave a subroutine, unwinding the frame installed by
    /// [`call_subroutine`].  If the call flag says a value is returned,
    /// the top word survives the unwind and is re-pushed for the caller.
    pub fn return_from_subroutine(&mut self, stack: &mut StackView<'_>) -> Result<(), RuntimeError> {
        let frame = self
            .return_stack
            .pop()
            .ok_or(RuntimeError::ReturnStackUnderflow)?;

        self.ir = frame.return_address;

        let has_return_value = stack.peek_byte_from_frame(0)? != 0;
        if has_return_value {
            let value = stack.pop_word()?;
            stack.flush();
            stack.set_frame_pointer(frame.saved_fp)?;
            stack.pop_byte()?;
            stack.push_word(value)?;
        } else {
            stack.flush();
            stack.set_frame_pointer(frame.saved_fp)?;
            stack.pop_byte()?;
        }
        trace!(
            "return to {:#06x}, depth {}",
            frame.return_address,
            self.return_stack.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{Mode, Stack};

    fn setup() -> (MemUnit, InstructionUnit, Stack) {
        let mut mem = MemUnit::new();
        let stack = Stack::new(&mut mem, 64).unwrap();
        let code_ctx = mem.create_context(0x20000).unwrap();
        mem.set_mode(Mode::Protected);
        (mem, InstructionUnit::new(code_ctx), stack)
    }

    #[test]
    fn fetch_does_not_advance_ir() {
        let (mut mem, mut iu, _stack) = setup();
        iu.load_program(&mut mem, &[0x11, 0x22, 0x33]).unwrap();
        assert_eq!(iu.read_byte_at_ir(&mut mem).unwrap(), 0x11);
        assert_eq!(iu.read_byte_at_ir(&mut mem).unwrap(), 0x11);
        assert_eq!(iu.ir(), 0);
        iu.advance_ir(1);
        assert_eq!(iu.read_byte_at_ir(&mut mem).unwrap(), 0x22);
        assert_eq!(iu.read_word_at_ir(&mut mem).unwrap(), 0x3322);
    }

    #[test]
    fn load_program_spans_pages() {
        let (mut mem, mut iu, _stack) = setup();
        let program: Vec<Byte> = (0..0x10010).map(|i| (i % 251) as Byte).collect();
        iu.load_program(&mut mem, &program).unwrap();
        // A byte on the second page survives the page arithmetic.
        iu.set_ir(0);
        assert_eq!(iu.read_byte_at_ir(&mut mem).unwrap(), 0);
        drop(iu);
        // Raw check beyond the first page boundary.
        let want = (0x10005 % 251) as Byte;
        let ctx = mem.find_context_for_address(64 + 0x10005).unwrap().id();
        assert_eq!(mem.read_byte(ctx, 0x10005).unwrap(), want);
    }

    #[test]
    fn conditional_jumps_consult_the_flag_word() {
        let (_mem, mut iu, _stack) = setup();
        let mut flags = Flags::new();
        flags.set(Flag::Zero);

        iu.jump_if(0x0100, Flag::Zero, true, &flags);
        assert_eq!(iu.ir(), 0x0100);
        iu.jump_if(0x0200, Flag::Zero, false, &flags);
        assert_eq!(iu.ir(), 0x0100);
        iu.jump_if(0x0300, Flag::Carry, false, &flags);
        assert_eq!(iu.ir(), 0x0300);
        iu.jump_to(0x0001);
        assert_eq!(iu.ir(), 0x0001);
    }

    #[test]
    fn call_and_return_without_value_restore_state() {
        let (mut mem, mut iu, mut stack) = setup();
        iu.set_ir(0x0040);
        {
            let mut view = stack.view(&mut mem, AccessMode::ReadWrite).unwrap();
            view.push_word(0xAAAA).unwrap();
            iu.call_subroutine(0x0100, false, &mut view).unwrap();
            assert_eq!(iu.ir(), 0x0100);
            assert_eq!(iu.return_depth(), 1);
            // Callee pushes some locals.
            view.push_word(0x1234).unwrap();
            view.push_byte(0x56).unwrap();

            iu.return_from_subroutine(&mut view).unwrap();
        }
        assert_eq!(iu.ir(), 0x0040);
        assert_eq!(iu.return_depth(), 0);
        assert_eq!(stack.sp(), 2);
        assert_eq!(stack.fp(), -1);
    }

    #[test]
    fn call_and_return_with_value_leaves_it_on_top() {
        let (mut mem, mut iu, mut stack) = setup();
        iu.set_ir(0x0010);
        let mut view = stack.view(&mut mem, AccessMode::ReadWrite).unwrap();
        iu.call_subroutine(0x0200, true, &mut view).unwrap();
        view.push_word(0x00AB).unwrap();
        iu.return_from_subroutine(&mut view).unwrap();

        assert_eq!(iu.ir(), 0x0010);
        assert_eq!(view.peek_word().unwrap(), 0x00AB);
        assert_eq!(view.size(), 2);
        assert_eq!(view.frame_pointer(), -1);
    }

    #[test]
    fn nested_calls_unwind_in_order() {
        let (mut mem, mut iu, mut stack) = setup();
        iu.set_ir(1);
        let mut view = stack.view(&mut mem, AccessMode::ReadWrite).unwrap();
        iu.call_subroutine(0x10, false, &mut view).unwrap();
        iu.call_subroutine(0x20, false, &mut view).unwrap();
        assert_eq!(iu.return_depth(), 2);

        iu.return_from_subroutine(&mut view).unwrap();
        assert_eq!(iu.ir(), 0x10);
        iu.return_from_subroutine(&mut view).unwrap();
        assert_eq!(iu.ir(), 1);
        assert!(view.is_empty());
    }

    #[test]
    fn return_with_empty_stack_underflows() {
        let (mut mem, mut iu, mut stack) = setup();
        let mut view = stack.view(&mut mem, AccessMode::ReadWrite).unwrap();
        assert_eq!(
            iu.return_from_subroutine(&mut view),
            Err(RuntimeError::ReturnStackUnderflow)
        );
    }
}
