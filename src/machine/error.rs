//! Runtime error types for the machine.

use derive_more::{Display, Error};

use crate::common::Word;
use crate::mem::MemError;

/// Anything that can abort instruction execution.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
pub enum RuntimeError {
    #[display("{source}")]
    Mem { source: MemError },
    #[display("unknown register code {code:#04x}")]
    UnknownRegister { code: u8 },
    #[display("unknown opcode {opcode:#04x}")]
    UnknownOpcode { opcode: u8 },
    #[display("unknown system call {id:#06x}")]
    UnknownSyscall { id: Word },
    #[display("division by zero")]
    DivisionByZero,
    #[display("return stack underflow")]
    ReturnStackUnderflow,
    #[display("i/o failure: {message}")]
    Io { message: String },
}

impl From<MemError> for RuntimeError {
    fn from(source: MemError) -> Self {
        RuntimeError::Mem { source }
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io {
            message: err.to_string(),
        }
    }
}

/// A runtime error annotated with where the CPU was when it happened.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display("at IR {ir:#06x}, opcode {opcode:#04x}: {source}")]
pub struct Fault {
    pub opcode: u8,
    pub ir: Word,
    pub source: RuntimeError,
}
