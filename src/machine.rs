//! The machine: registers, ALU, instruction unit, CPU dispatch loop,
//! binary loader, system calls, and the VM facade that wires them to the
//! memory unit.

pub mod alu;
pub mod cpu;
pub mod error;
pub mod flags;
pub mod iunit;
pub mod loader;
pub mod reg;
pub mod syscall;
pub mod vm;

pub use cpu::Cpu;
pub use error::{Fault, RuntimeError};
pub use flags::{Flag, Flags};
pub use iunit::InstructionUnit;
pub use loader::{Binary, LoadError};
pub use reg::{Reg, Registers};
pub use syscall::{BufferIo, LineIo, StdLineIo};
pub use vm::{Vm, VmConfig};
