//! The CPU: fetch, decode, dispatch.
//!
//! One `step` is one instruction: read the opcode byte at IR, advance IR,
//! read the opcode's operand bytes, advance IR past them, then execute.
//! Side effects are applied in that order, so a conditional jump always
//! sees flags from the preceding instruction and its own operand fetch
//! never observes a half-advanced IR.

use log::trace;

use crate::common::{Addr32, Byte, ContextId, Page, Word};
use crate::isa::{Opcode, RegCode, SysCall};
use crate::mem::{AccessMode, MemError, MemUnit, Mode, Stack};

use super::alu;
use super::error::{Fault, RuntimeError};
use super::flags::{Flag, Flags};
use super::iunit::InstructionUnit;
use super::reg::Registers;
use super::syscall::{self, LineIo};

fn reg_at(params: &[Byte], i: usize) -> Result<RegCode, RuntimeError> {
    RegCode::decode(params[i]).ok_or(RuntimeError::UnknownRegister { code: params[i] })
}

fn word_at(params: &[Byte], i: usize) -> Word {
    Word::from_le_bytes([params[i], params[i + 1]])
}

fn addr_at(params: &[Byte], i: usize) -> Addr32 {
    Addr32::from_le_bytes([params[i], params[i + 1], params[i + 2], params[i + 3]])
}

pub struct Cpu {
    regs: Registers,
    flags: Flags,
    stack: Stack,
    iunit: InstructionUnit,
    data_ctx: ContextId,
    halted: bool,
}

impl Cpu {
    /// Build the CPU's contexts in declaration order: the stack's own
    /// context first, then code, then data.  Unprotected mode only.
    pub fn new(
        mem: &mut MemUnit,
        stack_capacity: Addr32,
        code_capacity: Addr32,
        data_capacity: Addr32,
    ) -> Result<Cpu, MemError> {
        let stack = Stack::new(mem, stack_capacity)?;
        let code_ctx = mem.create_context(code_capacity)?;
        let data_ctx = mem.create_context(data_capacity)?;
        Ok(Cpu {
            regs: Registers::new(),
            flags: Flags::new(),
            stack,
            iunit: InstructionUnit::new(code_ctx),
            data_ctx,
            halted: false,
        })
    }

    pub fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn iunit(&self) -> &InstructionUnit {
        &self.iunit
    }

    pub fn data_ctx(&self) -> ContextId {
        self.data_ctx
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Write a program image into code memory.  Protected mode only.
    pub fn load_program(&self, mem: &mut MemUnit, program: &[Byte]) -> Result<(), MemError> {
        self.iunit.load_program(mem, program)
    }

    /// Run until HALT or a fault.  Enters protected mode for the duration
    /// and drops back to unprotected on the way out.
    pub fn run(&mut self, mem: &mut MemUnit, io: &mut dyn LineIo) -> Result<(), Fault> {
        mem.set_mode(Mode::Protected);
        let result = loop {
            match self.step(mem, io) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(fault) => break Err(fault),
            }
        };
        mem.set_mode(Mode::Unprotected);
        result
    }

    /// Execute one instruction.  `Ok(false)` means the CPU halted.
    pub fn step(&mut self, mem: &mut MemUnit, io: &mut dyn LineIo) -> Result<bool, Fault> {
        let ir_start = self.iunit.ir();
        let opcode_byte = self.iunit.read_byte_at_ir(mem).map_err(|e| Fault {
            opcode: 0x00,
            ir: ir_start,
            source: e.into(),
        })?;
        self.iunit.advance_ir(1);
        self.dispatch(opcode_byte, mem, io).map_err(|source| Fault {
            opcode: opcode_byte,
            ir: ir_start,
            source,
        })
    }

    fn dispatch(
        &mut self,
        opcode_byte: Byte,
        mem: &mut MemUnit,
        io: &mut dyn LineIo,
    ) -> Result<bool, RuntimeError> {
        let op = Opcode::decode(opcode_byte).ok_or(RuntimeError::UnknownOpcode {
            opcode: opcode_byte,
        })?;

        match op {
            Opcode::Halt => {
                trace!("{:#06x}: HALT", self.iunit.ir().wrapping_sub(1));
                self.halted = true;
                return Ok(false);
            }
            Opcode::Nop => return Ok(true),
            _ => {}
        }

        let count = op.additional_bytes();
        let params = self.iunit.read_bytes_at_ir(mem, count)?;
        self.iunit.advance_ir(count as Word);
        self.execute(op, &params, mem, io)?;
        Ok(true)
    }

    fn data_read_byte(&self, mem: &mut MemUnit, addr: Addr32) -> Result<Byte, MemError> {
        let mut data = mem.paged(self.data_ctx, AccessMode::ReadOnly)?;
        data.set_page((addr >> 16) as Page);
        data.read_byte(addr as Word)
    }

    fn data_read_word(&self, mem: &mut MemUnit, addr: Addr32) -> Result<Word, MemError> {
        let mut data = mem.paged(self.data_ctx, AccessMode::ReadOnly)?;
        data.set_page((addr >> 16) as Page);
        data.read_word(addr as Word)
    }

    fn data_write_byte(&self, mem: &mut MemUnit, addr: Addr32, value: Byte) -> Result<(), MemError> {
        let mut data = mem.paged(self.data_ctx, AccessMode::ReadWrite)?;
        data.set_page((addr >> 16) as Page);
        data.write_byte(addr as Word, value)
    }

    fn data_write_word(&self, mem: &mut MemUnit, addr: Addr32, value: Word) -> Result<(), MemError> {
        let mut data = mem.paged(self.data_ctx, AccessMode::ReadWrite)?;
        data.set_page((addr >> 16) as Page);
        data.write_word(addr as Word, value)
    }

    fn execute(
        &mut self,
        op: Opcode,
        params: &[Byte],
        mem: &mut MemUnit,
        io: &mut dyn LineIo,
    ) -> Result<(), RuntimeError> {
        use Opcode::*;

        trace!("execute {op} {params:02x?}");
        match op {
            Nop | Halt => {}

            // Loads, stores, swap
            LdImm => {
                let reg = reg_at(params, 0)?;
                self.regs.get_mut(reg).set_value(word_at(params, 1));
            }
            LdReg => {
                let value = self.regs.get(reg_at(params, 1)?).value();
                self.regs.get_mut(reg_at(params, 0)?).set_value(value);
            }
            Swp => {
                let a = reg_at(params, 0)?;
                let b = reg_at(params, 1)?;
                let tmp = self.regs.get(a).value();
                let other = self.regs.get(b).value();
                self.regs.get_mut(a).set_value(other);
                self.regs.get_mut(b).set_value(tmp);
            }
            LdhImm => {
                self.regs.get_mut(reg_at(params, 0)?).set_high(params[1]);
            }
            LdhReg => {
                let value = self.regs.get(reg_at(params, 1)?).high();
                self.regs.get_mut(reg_at(params, 0)?).set_high(value);
            }
            LdlImm => {
                self.regs.get_mut(reg_at(params, 0)?).set_low(params[1]);
            }
            LdlReg => {
                let value = self.regs.get(reg_at(params, 1)?).low();
                self.regs.get_mut(reg_at(params, 0)?).set_low(value);
            }
            Lda => {
                let value = self.data_read_word(mem, addr_at(params, 1))?;
                self.regs.get_mut(reg_at(params, 0)?).set_value(value);
            }
            Ldab => {
                let value = self.data_read_byte(mem, addr_at(params, 1))?;
                self.regs
                    .get_mut(reg_at(params, 0)?)
                    .set_value(Word::from(value));
            }
            Ldah => {
                let value = self.data_read_byte(mem, addr_at(params, 1))?;
                self.regs.get_mut(reg_at(params, 0)?).set_high(value);
            }
            Ldal => {
                let value = self.data_read_byte(mem, addr_at(params, 1))?;
                self.regs.get_mut(reg_at(params, 0)?).set_low(value);
            }
            Sta => {
                let value = self.regs.get(reg_at(params, 4)?).value();
                self.data_write_word(mem, addr_at(params, 0), value)?;
            }
            Stah => {
                let value = self.regs.get(reg_at(params, 4)?).high();
                self.data_write_byte(mem, addr_at(params, 0), value)?;
            }
            Stal => {
                let value = self.regs.get(reg_at(params, 4)?).low();
                self.data_write_byte(mem, addr_at(params, 0), value)?;
            }

            // Stack
            Push => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                self.stack.view(mem, AccessMode::ReadWrite)?.push_word(value)?;
            }
            Pushh => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                self.stack.view(mem, AccessMode::ReadWrite)?.push_byte(value)?;
            }
            Pushl => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                self.stack.view(mem, AccessMode::ReadWrite)?.push_byte(value)?;
            }
            Pop => {
                let value = self.stack.view(mem, AccessMode::ReadWrite)?.pop_word()?;
                self.regs.get_mut(reg_at(params, 0)?).set_value(value);
            }
            Poph => {
                let value = self.stack.view(mem, AccessMode::ReadWrite)?.pop_byte()?;
                self.regs.get_mut(reg_at(params, 0)?).set_high(value);
            }
            Popl => {
                let value = self.stack.view(mem, AccessMode::ReadWrite)?.pop_byte()?;
                self.regs.get_mut(reg_at(params, 0)?).set_low(value);
            }
            Peek => {
                let offset = Addr32::from(word_at(params, 1));
                let value = self
                    .stack
                    .view(mem, AccessMode::ReadOnly)?
                    .peek_word_from_base(offset)?;
                self.regs.get_mut(reg_at(params, 0)?).set_value(value);
            }
            Peekf => {
                let offset = Addr32::from(word_at(params, 1));
                let value = self
                    .stack
                    .view(mem, AccessMode::ReadOnly)?
                    .peek_word_from_frame(offset)?;
                self.regs.get_mut(reg_at(params, 0)?).set_value(value);
            }
            Peekb => {
                let offset = Addr32::from(word_at(params, 1));
                let value = self
                    .stack
                    .view(mem, AccessMode::ReadOnly)?
                    .peek_byte_from_base(offset)?;
                self.regs.get_mut(reg_at(params, 0)?).set_low(value);
            }
            Peekfb => {
                let offset = Addr32::from(word_at(params, 1));
                let value = self
                    .stack
                    .view(mem, AccessMode::ReadOnly)?
                    .peek_byte_from_frame(offset)?;
                self.regs.get_mut(reg_at(params, 0)?).set_low(value);
            }
            Flsh => {
                self.stack.view(mem, AccessMode::ReadWrite)?.flush();
            }
            PageImm => {
                let mut data = mem.paged(self.data_ctx, AccessMode::ReadOnly)?;
                data.set_page(word_at(params, 0));
            }
            PageReg => {
                let page = self.regs.get(reg_at(params, 0)?).value();
                let mut data = mem.paged(self.data_ctx, AccessMode::ReadOnly)?;
                data.set_page(page);
            }
            Setf => {
                self.stack
                    .view(mem, AccessMode::ReadWrite)?
                    .set_frame_pointer(i32::from(word_at(params, 0)))?;
            }
            Pushw => {
                self.stack
                    .view(mem, AccessMode::ReadWrite)?
                    .push_word(word_at(params, 0))?;
            }
            Pushb => {
                self.stack
                    .view(mem, AccessMode::ReadWrite)?
                    .push_byte(params[0])?;
            }

            // Jumps: the target is a code address; IR is 16 bits wide.
            Jmp => self.iunit.jump_to(addr_at(params, 0) as Word),
            Jpz => self.jump_if(params, Flag::Zero, true),
            Jpnz => self.jump_if(params, Flag::Zero, false),
            Jpc => self.jump_if(params, Flag::Carry, true),
            Jpnc => self.jump_if(params, Flag::Carry, false),
            Jps => self.jump_if(params, Flag::Sign, true),
            Jpns => self.jump_if(params, Flag::Sign, false),
            Jpo => self.jump_if(params, Flag::Overflow, true),
            Jpno => self.jump_if(params, Flag::Overflow, false),

            // Subroutines
            Call => {
                let target = addr_at(params, 0) as Word;
                let with_return = params[4] != 0;
                let mut view = self.stack.view(mem, AccessMode::ReadWrite)?;
                self.iunit.call_subroutine(target, with_return, &mut view)?;
            }
            Ret => {
                let mut view = self.stack.view(mem, AccessMode::ReadWrite)?;
                self.iunit.return_from_subroutine(&mut view)?;
            }

            // Addition
            AddImm => alu::add(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            AddReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::add(self.regs.acc_mut(), &mut self.flags, value);
            }
            AdbImm => alu::add_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            AdhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::add_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            AdlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::add_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Subtraction
            SubImm => alu::sub(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            SubReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::sub(self.regs.acc_mut(), &mut self.flags, value);
            }
            SbbImm => alu::sub_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            SbhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::sub_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            SblReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::sub_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Multiplication
            MulImm => alu::mul(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            MulReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::mul(self.regs.acc_mut(), &mut self.flags, value);
            }
            MlbImm => alu::mul_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            MlhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::mul_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            MllReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::mul_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Division
            DivImm => alu::div(self.regs.acc_mut(), &mut self.flags, word_at(params, 0))?,
            DivReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::div(self.regs.acc_mut(), &mut self.flags, value)?;
            }
            DvbImm => alu::div_byte(self.regs.acc_mut(), &mut self.flags, params[0])?,
            DvhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::div_byte(self.regs.acc_mut(), &mut self.flags, value)?;
            }
            DvlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::div_byte(self.regs.acc_mut(), &mut self.flags, value)?;
            }

            // Remainder
            RemImm => alu::rem(self.regs.acc_mut(), &mut self.flags, word_at(params, 0))?,
            RemReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::rem(self.regs.acc_mut(), &mut self.flags, value)?;
            }
            RmbImm => alu::rem_byte(self.regs.acc_mut(), &mut self.flags, params[0])?,
            RmhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::rem_byte(self.regs.acc_mut(), &mut self.flags, value)?;
            }
            RmlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::rem_byte(self.regs.acc_mut(), &mut self.flags, value)?;
            }

            // Bitwise AND
            AndImm => alu::bit_and(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            AndReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::bit_and(self.regs.acc_mut(), &mut self.flags, value);
            }
            AnbImm => alu::bit_and_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            AnhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::bit_and_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            AnlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::bit_and_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Bitwise OR
            OrImm => alu::bit_or(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            OrReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::bit_or(self.regs.acc_mut(), &mut self.flags, value);
            }
            OrbImm => alu::bit_or_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            OrhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::bit_or_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            OrlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::bit_or_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Bitwise XOR
            XorImm => alu::bit_xor(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            XorReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::bit_xor(self.regs.acc_mut(), &mut self.flags, value);
            }
            XobImm => alu::bit_xor_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            XohReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::bit_xor_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            XolReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::bit_xor_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Bitwise NOT
            NotImm => alu::bit_not(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            NotReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::bit_not(self.regs.acc_mut(), &mut self.flags, value);
            }
            NotbImm => alu::bit_not_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            NothReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::bit_not_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            NotlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::bit_not_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Shift left
            ShlImm => alu::shl(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            ShlReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::shl(self.regs.acc_mut(), &mut self.flags, value);
            }
            SlbImm => alu::shl_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            SlhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::shl_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            SllReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::shl_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Shift right
            ShrImm => alu::shr(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            ShrReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::shr(self.regs.acc_mut(), &mut self.flags, value);
            }
            ShrbImm => alu::shr_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            ShrhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::shr_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            ShrlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::shr_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Rotate left
            RolImm => alu::rol(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            RolReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::rol(self.regs.acc_mut(), &mut self.flags, value);
            }
            RolbImm => alu::rol_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            RolhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::rol_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            RollReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::rol_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Rotate right
            RorImm => alu::ror(self.regs.acc_mut(), &mut self.flags, word_at(params, 0)),
            RorReg => {
                let value = self.regs.get(reg_at(params, 0)?).value();
                alu::ror(self.regs.acc_mut(), &mut self.flags, value);
            }
            RorbImm => alu::ror_byte(self.regs.acc_mut(), &mut self.flags, params[0]),
            RorhReg => {
                let value = self.regs.get(reg_at(params, 0)?).high();
                alu::ror_byte(self.regs.acc_mut(), &mut self.flags, value);
            }
            RorlReg => {
                let value = self.regs.get(reg_at(params, 0)?).low();
                alu::ror_byte(self.regs.acc_mut(), &mut self.flags, value);
            }

            // Increment / decrement
            Inc => self.regs.get_mut(reg_at(params, 0)?).inc(&mut self.flags),
            Dec => self.regs.get_mut(reg_at(params, 0)?).dec(&mut self.flags),

            // Compare
            CmpRegReg => {
                let a = self.regs.get(reg_at(params, 0)?).value();
                let b = self.regs.get(reg_at(params, 1)?).value();
                alu::cmp(&mut self.flags, a, b);
            }
            CmpRegImm => {
                let a = self.regs.get(reg_at(params, 0)?).value();
                alu::cmp(&mut self.flags, a, word_at(params, 1));
            }
            CphRegReg => {
                let a = self.regs.get(reg_at(params, 0)?).high();
                let b = self.regs.get(reg_at(params, 1)?).high();
                alu::cmp_byte(&mut self.flags, a, b);
            }
            CphRegImm => {
                let a = self.regs.get(reg_at(params, 0)?).high();
                alu::cmp_byte(&mut self.flags, a, params[1]);
            }
            CplRegReg => {
                let a = self.regs.get(reg_at(params, 0)?).low();
                let b = self.regs.get(reg_at(params, 1)?).low();
                alu::cmp_byte(&mut self.flags, a, b);
            }
            CplRegImm => {
                let a = self.regs.get(reg_at(params, 0)?).low();
                alu::cmp_byte(&mut self.flags, a, params[1]);
            }

            // System call
            Sys => {
                let id = word_at(params, 0);
                let call = SysCall::decode(id).ok_or(RuntimeError::UnknownSyscall { id })?;
                let mut view = self.stack.view(mem, AccessMode::ReadWrite)?;
                syscall::dispatch(call, &mut view, io)?;
            }
        }
        Ok(())
    }

    fn jump_if(&mut self, params: &[Byte], flag: Flag, expected: bool) {
        self.iunit
            .jump_if(addr_at(params, 0) as Word, flag, expected, &self.flags);
    }
}
