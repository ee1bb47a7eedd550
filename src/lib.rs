//! The Pendragon virtual machine and its assembler as a library.  See the
//! `src/bin` directory for the executable programs (`lvm`, `lasm`) using
//! this library.

pub mod common;
pub mod isa;
pub mod mem;
pub mod machine;
pub mod front;
pub mod middle;
pub mod back;
pub mod pipeline;
