//! The Pendragon instruction set.
//!
//! One table drives everything that has to agree about the wire format: the
//! CPU's decoder, the per-opcode operand byte counts, and the assembler's
//! mnemonic lookup.  Keeping the operand signature on each opcode (instead
//! of a hand-maintained byte count) means the decoder and the encoder can
//! never drift apart.

use derive_more::Display;

use crate::common::Word;

/// Machine name stamped into every binary header.
pub const MACHINE_NAME: &str = "Pendragon";
/// Binary header format version (major, minor, revision).
pub const HEADER_VERSION: (u8, u8, u16) = (1, 0, 0);
/// Machine version (major, minor, revision).
pub const MACHINE_VERSION: (u8, u8, u16) = (1, 0, 0);
/// Program names are truncated to this many bytes at write time.
pub const PROGRAM_NAME_MAX: usize = 32;

/// Kinds of operand an instruction can carry, with their encoded widths.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum OperandKind {
    /// A register code, one byte (1..=5).
    #[display("reg")]
    Reg,
    /// An 8-bit immediate.
    #[display("imm8")]
    Imm8,
    /// A 16-bit immediate, little-endian.
    #[display("imm16")]
    Imm16,
    /// A 32-bit address, little-endian.
    #[display("addr")]
    Addr32,
}

impl OperandKind {
    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            OperandKind::Reg | OperandKind::Imm8 => 1,
            OperandKind::Imm16 => 2,
            OperandKind::Addr32 => 4,
        }
    }
}

macro_rules! opcodes {
    ($(($value:literal, $name:ident, $mnemonic:literal, [$($op:ident),*])),* $(,)?) => {
        /// Every opcode the machine executes, tagged with its encoding value.
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[display($mnemonic)]
                $name = $value,
            )*
        }

        impl Opcode {
            /// Decode a single opcode byte.  `None` for reserved encodings.
            pub fn decode(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $value => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// The operand signature of this opcode, in encoding order.
            pub fn operands(self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$op ),* ], )*
                }
            }

            /// The canonical mnemonic (several opcodes share one).
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }
        }
    };
}

opcodes! {
    // System
    (0x00, Nop, "NOP", []),
    (0x01, Halt, "HALT", []),
    // Load / store / swap
    (0x02, LdImm, "LD", [Reg, Imm16]),
    (0x03, LdReg, "LD", [Reg, Reg]),
    (0x04, Swp, "SWP", [Reg, Reg]),
    (0x05, LdhImm, "LDH", [Reg, Imm8]),
    (0x06, LdhReg, "LDH", [Reg, Reg]),
    (0x07, LdlImm, "LDL", [Reg, Imm8]),
    (0x08, LdlReg, "LDL", [Reg, Reg]),
    (0x09, Lda, "LDA", [Reg, Addr32]),
    (0x0A, Ldab, "LDAB", [Reg, Addr32]),
    (0x0B, Ldah, "LDAH", [Reg, Addr32]),
    (0x0C, Ldal, "LDAL", [Reg, Addr32]),
    (0x0D, Sta, "STA", [Addr32, Reg]),
    (0x0E, Stah, "STAH", [Addr32, Reg]),
    (0x0F, Stal, "STAL", [Addr32, Reg]),
    // Stack
    (0x10, Push, "PUSH", [Reg]),
    (0x11, Pushh, "PUSHH", [Reg]),
    (0x12, Pushl, "PUSHL", [Reg]),
    (0x13, Pop, "POP", [Reg]),
    (0x14, Poph, "POPH", [Reg]),
    (0x15, Popl, "POPL", [Reg]),
    (0x16, Peek, "PEEK", [Reg, Imm16]),
    (0x17, Peekf, "PEEKF", [Reg, Imm16]),
    (0x18, Peekb, "PEEKB", [Reg, Imm16]),
    (0x19, Peekfb, "PEEKFB", [Reg, Imm16]),
    (0x1A, Flsh, "FLSH", []),
    (0x1B, PageImm, "PAGE", [Imm16]),
    (0x1C, PageReg, "PAGE", [Reg]),
    (0x1D, Setf, "SETF", [Imm16]),
    // Jumps
    (0x1E, Jmp, "JMP", [Addr32]),
    (0x1F, Jpz, "JPZ", [Addr32]),
    (0x20, Jpnz, "JPNZ", [Addr32]),
    (0x21, Jpc, "JPC", [Addr32]),
    (0x22, Jpnc, "JPNC", [Addr32]),
    (0x23, Jps, "JPS", [Addr32]),
    (0x24, Jpns, "JPNS", [Addr32]),
    (0x25, Jpo, "JPO", [Addr32]),
    (0x26, Jpno, "JPNO", [Addr32]),
    // Subroutines
    (0x27, Call, "CALL", [Addr32, Imm8]),
    (0x28, Ret, "RET", []),
    // Addition
    (0x29, AddImm, "ADD", [Imm16]),
    (0x2A, AddReg, "ADD", [Reg]),
    (0x2B, AdbImm, "ADB", [Imm8]),
    (0x2C, AdhReg, "ADH", [Reg]),
    (0x2D, AdlReg, "ADL", [Reg]),
    // Subtraction
    (0x2E, SubImm, "SUB", [Imm16]),
    (0x2F, SubReg, "SUB", [Reg]),
    (0x30, SbbImm, "SBB", [Imm8]),
    (0x31, SbhReg, "SBH", [Reg]),
    (0x32, SblReg, "SBL", [Reg]),
    // Multiplication
    (0x33, MulImm, "MUL", [Imm16]),
    (0x34, MulReg, "MUL", [Reg]),
    (0x35, MlbImm, "MLB", [Imm8]),
    (0x36, MlhReg, "MLH", [Reg]),
    (0x37, MllReg, "MLL", [Reg]),
    // Division
    (0x38, DivImm, "DIV", [Imm16]),
    (0x39, DivReg, "DIV", [Reg]),
    (0x3A, DvbImm, "DVB", [Imm8]),
    (0x3B, DvhReg, "DVH", [Reg]),
    (0x3C, DvlReg, "DVL", [Reg]),
    // Remainder
    (0x3D, RemImm, "REM", [Imm16]),
    (0x3E, RemReg, "REM", [Reg]),
    (0x3F, RmbImm, "RMB", [Imm8]),
    (0x40, RmhReg, "RMH", [Reg]),
    (0x41, RmlReg, "RML", [Reg]),
    // Bitwise AND
    (0x42, AndImm, "AND", [Imm16]),
    (0x43, AndReg, "AND", [Reg]),
    (0x44, AnbImm, "ANB", [Imm8]),
    (0x45, AnhReg, "ANH", [Reg]),
    (0x46, AnlReg, "ANL", [Reg]),
    // Bitwise OR
    (0x47, OrImm, "OR", [Imm16]),
    (0x48, OrReg, "OR", [Reg]),
    (0x49, OrbImm, "ORB", [Imm8]),
    (0x4A, OrhReg, "ORH", [Reg]),
    (0x4B, OrlReg, "ORL", [Reg]),
    // Bitwise XOR
    (0x4C, XorImm, "XOR", [Imm16]),
    (0x4D, XorReg, "XOR", [Reg]),
    (0x4E, XobImm, "XOB", [Imm8]),
    (0x4F, XohReg, "XOH", [Reg]),
    (0x50, XolReg, "XOL", [Reg]),
    // Bitwise NOT
    (0x51, NotImm, "NOT", [Imm16]),
    (0x52, NotReg, "NOT", [Reg]),
    (0x53, NotbImm, "NOTB", [Imm8]),
    (0x54, NothReg, "NOTH", [Reg]),
    (0x55, NotlReg, "NOTL", [Reg]),
    // Shift left
    (0x56, ShlImm, "SHL", [Imm16]),
    (0x57, ShlReg, "SHL", [Reg]),
    (0x58, SlbImm, "SLB", [Imm8]),
    (0x59, SlhReg, "SLH", [Reg]),
    (0x5A, SllReg, "SLL", [Reg]),
    // Shift right
    (0x5B, ShrImm, "SHR", [Imm16]),
    (0x5C, ShrReg, "SHR", [Reg]),
    (0x5D, ShrbImm, "SHRB", [Imm8]),
    (0x5E, ShrhReg, "SHRH", [Reg]),
    (0x5F, ShrlReg, "SHRL", [Reg]),
    // Rotate left
    (0x60, RolImm, "ROL", [Imm16]),
    (0x61, RolReg, "ROL", [Reg]),
    (0x62, RolbImm, "ROLB", [Imm8]),
    (0x63, RolhReg, "ROLH", [Reg]),
    (0x64, RollReg, "ROLL", [Reg]),
    // Rotate right
    (0x65, RorImm, "ROR", [Imm16]),
    (0x66, RorReg, "ROR", [Reg]),
    (0x67, RorbImm, "RORB", [Imm8]),
    (0x68, RorhReg, "RORH", [Reg]),
    (0x69, RorlReg, "RORL", [Reg]),
    // Increment / decrement
    (0x6A, Inc, "INC", [Reg]),
    (0x6B, Dec, "DEC", [Reg]),
    // Compare
    (0x6C, CmpRegReg, "CMP", [Reg, Reg]),
    (0x6D, CmpRegImm, "CMP", [Reg, Imm16]),
    (0x6E, CphRegReg, "CPH", [Reg, Reg]),
    (0x6F, CphRegImm, "CPH", [Reg, Imm8]),
    (0x70, CplRegReg, "CPL", [Reg, Reg]),
    (0x71, CplRegImm, "CPL", [Reg, Imm8]),
    // Push immediate
    (0x75, Pushw, "PUSHW", [Imm16]),
    (0x76, Pushb, "PUSHB", [Imm8]),
    // System call
    (0x7F, Sys, "SYS", [Imm16]),
}

impl Opcode {
    /// How many bytes of operand data follow the opcode byte.
    pub fn additional_bytes(self) -> usize {
        self.operands().iter().map(|op| op.width()).sum()
    }
}

/// The five general-purpose registers, by their 1-based encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
#[repr(u8)]
pub enum RegCode {
    #[display("AX")]
    Ax = 1,
    #[display("BX")]
    Bx = 2,
    #[display("CX")]
    Cx = 3,
    #[display("DX")]
    Dx = 4,
    #[display("EX")]
    Ex = 5,
}

impl RegCode {
    pub fn decode(byte: u8) -> Option<RegCode> {
        match byte {
            1 => Some(RegCode::Ax),
            2 => Some(RegCode::Bx),
            3 => Some(RegCode::Cx),
            4 => Some(RegCode::Dx),
            5 => Some(RegCode::Ex),
            _ => None,
        }
    }

    pub fn encode(self) -> u8 {
        self as u8
    }
}

/// Which view of a register an assembly name selects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegPart {
    Word,
    High,
    Low,
}

/// A register name as written in assembly: base register plus byte view.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RegName {
    pub code: RegCode,
    pub part: RegPart,
}

impl RegName {
    /// Parse an assembly register name, case-insensitively.
    /// `AX..EX` select the word view, `AH..EH` / `AL..EL` the byte views.
    pub fn parse(name: &str) -> Option<RegName> {
        let mut chars = name.chars();
        let (first, second) = (chars.next()?, chars.next()?);
        if chars.next().is_some() {
            return None;
        }
        let code = match first.to_ascii_uppercase() {
            'A' => RegCode::Ax,
            'B' => RegCode::Bx,
            'C' => RegCode::Cx,
            'D' => RegCode::Dx,
            'E' => RegCode::Ex,
            _ => return None,
        };
        let part = match second.to_ascii_uppercase() {
            'X' => RegPart::Word,
            'H' => RegPart::High,
            'L' => RegPart::Low,
            _ => return None,
        };
        Some(RegName { code, part })
    }

    pub fn is_byte(&self) -> bool {
        self.part != RegPart::Word
    }
}

/// System call identifiers dispatched by the `SYS` opcode.
/// Ids 0x0000–0x000F are reserved for exit modes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SysCall {
    /// Pop a count, pop that many bytes, write them as a string.
    #[display("PRINT_STRING")]
    PrintString,
    /// As `PrintString`, followed by a newline.
    #[display("PRINT_LINE")]
    PrintLine,
    /// Pop a max length, read one line, push it in reverse plus its length.
    #[display("READ_LINE")]
    ReadLine,
}

impl SysCall {
    pub fn decode(id: Word) -> Option<SysCall> {
        match id {
            0x0010 => Some(SysCall::PrintString),
            0x0011 => Some(SysCall::PrintLine),
            0x0012 => Some(SysCall::ReadLine),
            _ => None,
        }
    }
}

/// Operand shapes the assembler sees after parsing, used to pick between
/// opcode variants of one mnemonic.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ArgShape {
    #[display("register")]
    Register,
    #[display("immediate")]
    Immediate,
    #[display("address")]
    Address,
}

/// Pick the opcode for a mnemonic given the shapes of its written operands.
///
/// Accumulator-implicit families (the ALU groups) are listed with their
/// explicit accumulator form first; the lowering pass strips the leading
/// accumulator operand before encoding.  Returns `None` when the mnemonic
/// is unknown or no variant matches the shapes.
pub fn select_opcode(mnemonic: &str, shapes: &[ArgShape]) -> Option<Opcode> {
    use ArgShape::*;
    use Opcode::*;

    let upper = mnemonic.to_ascii_uppercase();
    let op = match (upper.as_str(), shapes) {
        ("NOP", []) => Nop,
        ("HALT", []) => Halt,

        ("LD", [Register, Immediate]) => LdImm,
        ("LD", [Register, Register]) => LdReg,
        ("SWP", [Register, Register]) => Swp,
        ("LDH", [Register, Immediate]) => LdhImm,
        ("LDH", [Register, Register]) => LdhReg,
        ("LDL", [Register, Immediate]) => LdlImm,
        ("LDL", [Register, Register]) => LdlReg,
        ("LDA", [Register, Address]) => Lda,
        ("LDAB", [Register, Address]) => Ldab,
        ("LDAH", [Register, Address]) => Ldah,
        ("LDAL", [Register, Address]) => Ldal,
        ("STA", [Address, Register]) => Sta,
        ("STAH", [Address, Register]) => Stah,
        ("STAL", [Address, Register]) => Stal,

        ("PUSH", [Register]) => Push,
        ("PUSHH", [Register]) => Pushh,
        ("PUSHL", [Register]) => Pushl,
        ("POP", [Register]) => Pop,
        ("POPH", [Register]) => Poph,
        ("POPL", [Register]) => Popl,
        ("PEEK", [Register, Immediate]) => Peek,
        ("PEEKF", [Register, Immediate]) => Peekf,
        ("PEEKB", [Register, Immediate]) => Peekb,
        ("PEEKFB", [Register, Immediate]) => Peekfb,
        ("FLSH", []) => Flsh,
        ("PAGE", [Immediate]) => PageImm,
        ("PAGE", [Register]) => PageReg,
        ("SETF", [Immediate]) => Setf,

        ("JMP", [Address]) => Jmp,
        ("JPZ" | "JZ", [Address]) => Jpz,
        ("JPNZ" | "JNZ", [Address]) => Jpnz,
        ("JPC", [Address]) => Jpc,
        ("JPNC", [Address]) => Jpnc,
        ("JPS", [Address]) => Jps,
        ("JPNS", [Address]) => Jpns,
        ("JPO", [Address]) => Jpo,
        ("JPNO", [Address]) => Jpno,
        ("CALL", [Address] | [Address, Immediate]) => Call,
        ("RET", []) => Ret,

        ("ADD", [Register, Immediate]) => AddImm,
        ("ADD", [Register, Register]) => AddReg,
        ("ADB", [Register, Immediate] | [Immediate]) => AdbImm,
        ("ADH", [Register, Register] | [Register]) => AdhReg,
        ("ADL", [Register, Register] | [Register]) => AdlReg,

        ("SUB", [Register, Immediate]) => SubImm,
        ("SUB", [Register, Register]) => SubReg,
        ("SBB", [Register, Immediate] | [Immediate]) => SbbImm,
        ("SBH", [Register, Register] | [Register]) => SbhReg,
        ("SBL", [Register, Register] | [Register]) => SblReg,

        ("MUL", [Register, Immediate]) => MulImm,
        ("MUL", [Register, Register]) => MulReg,
        ("MLB", [Register, Immediate] | [Immediate]) => MlbImm,
        ("MLH", [Register, Register] | [Register]) => MlhReg,
        ("MLL", [Register, Register] | [Register]) => MllReg,

        ("DIV", [Register, Immediate]) => DivImm,
        ("DIV", [Register, Register]) => DivReg,
        ("DVB", [Register, Immediate] | [Immediate]) => DvbImm,
        ("DVH", [Register, Register] | [Register]) => DvhReg,
        ("DVL", [Register, Register] | [Register]) => DvlReg,

        ("REM", [Register, Immediate]) => RemImm,
        ("REM", [Register, Register]) => RemReg,
        ("RMB", [Register, Immediate] | [Immediate]) => RmbImm,
        ("RMH", [Register, Register] | [Register]) => RmhReg,
        ("RML", [Register, Register] | [Register]) => RmlReg,

        ("AND", [Register, Immediate]) => AndImm,
        ("AND", [Register, Register]) => AndReg,
        ("ANB", [Register, Immediate] | [Immediate]) => AnbImm,
        ("ANH", [Register, Register] | [Register]) => AnhReg,
        ("ANL", [Register, Register] | [Register]) => AnlReg,

        ("OR", [Register, Immediate]) => OrImm,
        ("OR", [Register, Register]) => OrReg,
        ("ORB", [Register, Immediate] | [Immediate]) => OrbImm,
        ("ORH", [Register, Register] | [Register]) => OrhReg,
        ("ORL", [Register, Register] | [Register]) => OrlReg,

        ("XOR", [Register, Immediate]) => XorImm,
        ("XOR", [Register, Register]) => XorReg,
        ("XOB", [Register, Immediate] | [Immediate]) => XobImm,
        ("XOH", [Register, Register] | [Register]) => XohReg,
        ("XOL", [Register, Register] | [Register]) => XolReg,

        ("NOT", [Immediate]) => NotImm,
        ("NOT", [Register]) => NotReg,
        ("NOTB", [Immediate]) => NotbImm,
        ("NOTH", [Register]) => NothReg,
        ("NOTL", [Register]) => NotlReg,

        ("SHL", [Register, Immediate]) => ShlImm,
        ("SHL", [Register, Register]) => ShlReg,
        ("SLB", [Register, Immediate] | [Immediate]) => SlbImm,
        ("SLH", [Register, Register] | [Register]) => SlhReg,
        ("SLL", [Register, Register] | [Register]) => SllReg,

        ("SHR", [Register, Immediate]) => ShrImm,
        ("SHR", [Register, Register]) => ShrReg,
        ("SHRB", [Register, Immediate] | [Immediate]) => ShrbImm,
        ("SHRH", [Register, Register] | [Register]) => ShrhReg,
        ("SHRL", [Register, Register] | [Register]) => ShrlReg,

        ("ROL", [Register, Immediate]) => RolImm,
        ("ROL", [Register, Register]) => RolReg,
        ("ROLB", [Register, Immediate] | [Immediate]) => RolbImm,
        ("ROLH", [Register, Register] | [Register]) => RolhReg,
        ("ROLL", [Register, Register] | [Register]) => RollReg,

        ("ROR", [Register, Immediate]) => RorImm,
        ("ROR", [Register, Register]) => RorReg,
        ("RORB", [Register, Immediate] | [Immediate]) => RorbImm,
        ("RORH", [Register, Register] | [Register]) => RorhReg,
        ("RORL", [Register, Register] | [Register]) => RorlReg,

        ("INC", [Register]) => Inc,
        ("DEC", [Register]) => Dec,

        ("CMP", [Register, Register]) => CmpRegReg,
        ("CMP", [Register, Immediate]) => CmpRegImm,
        ("CPH", [Register, Register]) => CphRegReg,
        ("CPH", [Register, Immediate]) => CphRegImm,
        ("CPL", [Register, Register]) => CplRegReg,
        ("CPL", [Register, Immediate]) => CplRegImm,

        ("PUSHW", [Immediate]) => Pushw,
        ("PUSHB", [Immediate]) => Pushb,

        ("SYS" | "SYSCALL", [Immediate]) => Sys,

        _ => return None,
    };
    Some(op)
}

/// Is this mnemonic one of the families that operate on the accumulator,
/// where the assembler requires (and strips) an explicit AX first operand?
pub fn is_accumulator_family(mnemonic: &str) -> bool {
    matches!(
        mnemonic.to_ascii_uppercase().as_str(),
        "ADD" | "ADB" | "ADH" | "ADL"
            | "SUB" | "SBB" | "SBH" | "SBL"
            | "MUL" | "MLB" | "MLH" | "MLL"
            | "DIV" | "DVB" | "DVH" | "DVL"
            | "REM" | "RMB" | "RMH" | "RML"
            | "AND" | "ANB" | "ANH" | "ANL"
            | "OR" | "ORB" | "ORH" | "ORL"
            | "XOR" | "XOB" | "XOH" | "XOL"
            | "SHL" | "SLB" | "SLH" | "SLL"
            | "SHR" | "SHRB" | "SHRH" | "SHRL"
            | "ROL" | "ROLB" | "ROLH" | "ROLL"
            | "ROR" | "RORB" | "RORH" | "RORL"
    )
}
