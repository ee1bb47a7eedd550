//! The flag word: four independently addressable bits in one byte.
//!
//! The CPU owns the single flag word and threads it by `&mut` into the
//! register file's inc/dec, the ALU, and conditional jumps, so exactly one
//! mutator touches it per instruction.

use derive_more::Display;

use crate::common::Byte;

/// The four condition flags.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[repr(u8)]
pub enum Flag {
    #[display("Z")]
    Zero = 0x01,
    #[display("C")]
    Carry = 0x02,
    #[display("S")]
    Sign = 0x04,
    #[display("V")]
    Overflow = 0x08,
}

/// The flag word.  Bits outside the four flags always read as zero.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Flags(Byte);

impl Flags {
    pub fn new() -> Flags {
        Flags(0)
    }

    pub fn set(&mut self, flag: Flag) {
        self.0 |= flag as Byte;
    }

    pub fn clear(&mut self, flag: Flag) {
        self.0 &= !(flag as Byte);
    }

    pub fn assign(&mut self, flag: Flag, state: bool) {
        if state {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    pub fn is_set(&self, flag: Flag) -> bool {
        self.0 & flag as Byte != 0
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn bits(&self) -> Byte {
        self.0
    }
}
