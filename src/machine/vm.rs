//! The VM facade: owns the memory unit and the CPU, loads binaries, runs
//! them, and manages the protection-mode transitions around both.

use log::{debug, info};

use crate::common::{Addr, Addr32, Page, Word};
use crate::mem::{AccessMode, MemError, MemUnit, Mode, StackView};

use super::cpu::Cpu;
use super::error::{Fault, RuntimeError};
use super::loader::Binary;
use super::syscall::LineIo;

/// Machine geometry.
#[derive(Clone, Copy, Debug)]
pub struct VmConfig {
    pub stack_capacity: Addr32,
    pub code_capacity: Addr32,
    pub data_capacity: Addr32,
}

impl Default for VmConfig {
    /// 1 KiB stack, 64 KiB code space, 32 KiB data space.
    fn default() -> Self {
        VmConfig {
            stack_capacity: 1024,
            code_capacity: 65536,
            data_capacity: 32768,
        }
    }
}

pub struct Vm {
    mem: MemUnit,
    cpu: Cpu,
}

impl Vm {
    pub fn new(config: VmConfig) -> Result<Vm, MemError> {
        let mut mem = MemUnit::new();
        let cpu = Cpu::new(
            &mut mem,
            config.stack_capacity,
            config.code_capacity,
            config.data_capacity,
        )?;
        Ok(Vm { mem, cpu })
    }

    /// Install a parsed binary: the data segment goes into the data
    /// context starting at `load_address`, the code segment into the code
    /// context at 0.
    pub fn load(&mut self, binary: &Binary, load_address: Addr) -> Result<(), RuntimeError> {
        info!(
            "loading '{}': {} data bytes at {load_address:#06x}, {} code bytes",
            binary.header.program_name,
            binary.data.len(),
            binary.code.len()
        );
        self.mem.set_mode(Mode::Protected);
        let result = self.load_segments(binary, load_address);
        self.mem.set_mode(Mode::Unprotected);
        result
    }

    fn load_segments(&mut self, binary: &Binary, load_address: Addr) -> Result<(), RuntimeError> {
        if !binary.data.is_empty() {
            let mut data = self.mem.paged(self.cpu.data_ctx(), AccessMode::ReadWrite)?;
            let mut addr = Addr32::from(load_address);
            for byte in &binary.data {
                data.set_page((addr >> 16) as Page);
                data.write_byte(addr as Word, *byte)?;
                addr += 1;
            }
        }
        self.cpu.load_program(&mut self.mem, &binary.code)?;
        Ok(())
    }

    /// Run until HALT or a fault.
    pub fn run(&mut self, io: &mut dyn LineIo) -> Result<(), Fault> {
        debug!("starting execution");
        self.cpu.run(&mut self.mem, io)
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn mem(&self) -> &MemUnit {
        &self.mem
    }

    /// Inspect the stack through a temporary protected-mode view.
    /// Intended for embedders and tests.
    pub fn with_stack<R>(
        &mut self,
        f: impl FnOnce(&mut StackView<'_>) -> R,
    ) -> Result<R, MemError> {
        let previous = self.mem.mode();
        self.mem.set_mode(Mode::Protected);
        let result = self
            .cpu
            .stack_mut()
            .view(&mut self.mem, AccessMode::ReadWrite)
            .map(|mut view| f(&mut view));
        self.mem.set_mode(previous);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::RegCode;
    use crate::machine::loader::Header;
    use crate::machine::loader::Version;
    use crate::machine::syscall::BufferIo;

    fn binary_with(data: Vec<u8>, code: Vec<u8>) -> Binary {
        Binary {
            header: Header {
                header_size: 0,
                header_version: Version::from(crate::isa::HEADER_VERSION),
                machine_name: crate::isa::MACHINE_NAME.to_string(),
                machine_version: Version::from(crate::isa::MACHINE_VERSION),
                program_name: "test".to_string(),
            },
            data,
            code,
        }
    }

    #[test]
    fn loads_data_at_the_load_address() {
        let mut vm = Vm::new(VmConfig::default()).unwrap();
        // Data [0xAA, 0xBB] at 0x0100; LDA AX, 0x0100 reads it back.
        let binary = binary_with(
            vec![0xAA, 0xBB],
            vec![0x09, 1, 0x00, 0x01, 0x00, 0x00, 0x01],
        );
        vm.load(&binary, 0x0100).unwrap();
        let mut io = BufferIo::default();
        vm.run(&mut io).unwrap();
        assert_eq!(vm.cpu().regs().get(RegCode::Ax).value(), 0xBBAA);
        assert!(!vm.mem().is_protected());
    }

    #[test]
    fn minimal_halt_program_runs_cleanly() {
        let mut vm = Vm::new(VmConfig::default()).unwrap();
        let binary = binary_with(vec![], vec![0x01]);
        vm.load(&binary, 0).unwrap();
        let mut io = BufferIo::default();
        vm.run(&mut io).unwrap();
        assert!(vm.cpu().halted());
    }

    #[test]
    fn with_stack_restores_mode() {
        let mut vm = Vm::new(VmConfig::default()).unwrap();
        let size = vm.with_stack(|view| view.size()).unwrap();
        assert_eq!(size, 0);
        assert!(!vm.mem().is_protected());
    }
}
