//! The arithmetic/logic unit.
//!
//! Every operation targets the accumulator and derives the flag word from
//! its 16-bit result.  The 8-bit entry points widen their operand to a
//! word and reuse the word implementation.  `cmp` is the one exception to
//! the write-back rule: it only derives flags, as if computing
//! `lhs − rhs`, and leaves the registers untouched.

use crate::common::{Byte, Word};

use super::error::RuntimeError;
use super::flags::{Flag, Flags};
use super::reg::Reg;

/// Derive Z and S from a result; the caller supplies C and V.
fn base_flags(flags: &mut Flags, result: Word, carry: bool, overflow: bool) {
    flags.clear_all();
    flags.assign(Flag::Zero, result == 0);
    flags.assign(Flag::Sign, result & 0x8000 != 0);
    flags.assign(Flag::Carry, carry);
    flags.assign(Flag::Overflow, overflow);
}

fn add_flags(flags: &mut Flags, a: Word, b: Word, result: Word) {
    let carry = result < a || result < b;
    let overflow = (a ^ result) & (b ^ result) & 0x8000 != 0;
    base_flags(flags, result, carry, overflow);
}

fn sub_flags(flags: &mut Flags, a: Word, b: Word, result: Word) {
    let carry = a < b;
    let overflow = (a ^ b) & (a ^ result) & 0x8000 != 0;
    base_flags(flags, result, carry, overflow);
}

pub fn add(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let a = acc.value();
    let result = a.wrapping_add(value);
    acc.set_value(result);
    add_flags(flags, a, value, result);
}

pub fn add_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    add(acc, flags, Word::from(value));
}

pub fn sub(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let a = acc.value();
    let result = a.wrapping_sub(value);
    acc.set_value(result);
    sub_flags(flags, a, value, result);
}

pub fn sub_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    sub(acc, flags, Word::from(value));
}

/// Multiply; C is set iff the high half of the 32-bit product is non-zero.
pub fn mul(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let a = acc.value();
    let product = u32::from(a) * u32::from(value);
    let result = product as Word;
    acc.set_value(result);
    base_flags(flags, result, product > 0xFFFF, false);
}

pub fn mul_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    mul(acc, flags, Word::from(value));
}

pub fn div(acc: &mut Reg, flags: &mut Flags, value: Word) -> Result<(), RuntimeError> {
    if value == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let result = acc.value() / value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
    Ok(())
}

pub fn div_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) -> Result<(), RuntimeError> {
    div(acc, flags, Word::from(value))
}

pub fn rem(acc: &mut Reg, flags: &mut Flags, value: Word) -> Result<(), RuntimeError> {
    if value == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let result = acc.value() % value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
    Ok(())
}

pub fn rem_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) -> Result<(), RuntimeError> {
    rem(acc, flags, Word::from(value))
}

pub fn bit_and(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let result = acc.value() & value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn bit_and_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    bit_and(acc, flags, Word::from(value));
}

pub fn bit_or(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let result = acc.value() | value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn bit_or_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    bit_or(acc, flags, Word::from(value));
}

pub fn bit_xor(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let result = acc.value() ^ value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn bit_xor_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    bit_xor(acc, flags, Word::from(value));
}

/// Complement `value` into the accumulator.
pub fn bit_not(acc: &mut Reg, flags: &mut Flags, value: Word) {
    let result = !value;
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn bit_not_byte(acc: &mut Reg, flags: &mut Flags, value: Byte) {
    bit_not(acc, flags, Word::from(value));
}

/// Shift left; counts of 16 or more saturate to zero.
pub fn shl(acc: &mut Reg, flags: &mut Flags, count: Word) {
    let result = if count >= 16 {
        0
    } else {
        acc.value() << count
    };
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn shl_byte(acc: &mut Reg, flags: &mut Flags, count: Byte) {
    shl(acc, flags, Word::from(count));
}

/// Shift right; counts of 16 or more saturate to zero.
pub fn shr(acc: &mut Reg, flags: &mut Flags, count: Word) {
    let result = if count >= 16 {
        0
    } else {
        acc.value() >> count
    };
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn shr_byte(acc: &mut Reg, flags: &mut Flags, count: Byte) {
    shr(acc, flags, Word::from(count));
}

/// Rotate left; the count is taken mod 16.
pub fn rol(acc: &mut Reg, flags: &mut Flags, count: Word) {
    let result = acc.value().rotate_left(u32::from(count) % 16);
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn rol_byte(acc: &mut Reg, flags: &mut Flags, count: Byte) {
    rol(acc, flags, Word::from(count));
}

/// Rotate right; the count is taken mod 16.
pub fn ror(acc: &mut Reg, flags: &mut Flags, count: Word) {
    let result = acc.value().rotate_right(u32::from(count) % 16);
    acc.set_value(result);
    base_flags(flags, result, false, false);
}

pub fn ror_byte(acc: &mut Reg, flags: &mut Flags, count: Byte) {
    ror(acc, flags, Word::from(count));
}

/// Derive flags as for `lhs − rhs` without writing any register: Z means
/// equal, C means `lhs < rhs` unsigned.
pub fn cmp(flags: &mut Flags, lhs: Word, rhs: Word) {
    let result = lhs.wrapping_sub(rhs);
    sub_flags(flags, lhs, rhs, result);
}

pub fn cmp_byte(flags: &mut Flags, lhs: Byte, rhs: Byte) {
    cmp(flags, Word::from(lhs), Word::from(rhs));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(value: Word) -> Reg {
        let mut reg = Reg::default();
        reg.set_value(value);
        reg
    }

    #[test]
    fn add_sets_carry_on_unsigned_wrap() {
        let mut a = acc(0xFFFF);
        let mut flags = Flags::new();
        add(&mut a, &mut flags, 1);
        assert_eq!(a.value(), 0);
        assert!(flags.is_set(Flag::Zero));
        assert!(flags.is_set(Flag::Carry));
        assert!(!flags.is_set(Flag::Sign));
        assert!(!flags.is_set(Flag::Overflow));
    }

    #[test]
    fn add_sets_overflow_on_signed_wrap() {
        let mut a = acc(0x7FFF);
        let mut flags = Flags::new();
        add(&mut a, &mut flags, 1);
        assert_eq!(a.value(), 0x8000);
        assert!(flags.is_set(Flag::Overflow));
        assert!(flags.is_set(Flag::Sign));
        assert!(!flags.is_set(Flag::Carry));
    }

    #[test]
    fn sub_sets_borrow() {
        let mut a = acc(5);
        let mut flags = Flags::new();
        sub(&mut a, &mut flags, 10);
        assert_eq!(a.value(), 0xFFFB);
        assert!(flags.is_set(Flag::Carry));
        assert!(flags.is_set(Flag::Sign));
    }

    #[test]
    fn mul_sets_carry_when_high_half_nonzero() {
        let mut a = acc(0x1000);
        let mut flags = Flags::new();
        mul(&mut a, &mut flags, 0x10);
        assert_eq!(a.value(), 0);
        assert!(flags.is_set(Flag::Carry));
        assert!(flags.is_set(Flag::Zero));

        let mut a = acc(3);
        mul(&mut a, &mut flags, 4);
        assert_eq!(a.value(), 12);
        assert!(!flags.is_set(Flag::Carry));
    }

    #[test]
    fn div_and_rem() {
        let mut a = acc(17);
        let mut flags = Flags::new();
        div(&mut a, &mut flags, 5).unwrap();
        assert_eq!(a.value(), 3);

        let mut a = acc(17);
        rem(&mut a, &mut flags, 5).unwrap();
        assert_eq!(a.value(), 2);

        let mut a = acc(17);
        assert_eq!(
            div(&mut a, &mut flags, 0),
            Err(RuntimeError::DivisionByZero)
        );
        // The accumulator is untouched on failure.
        assert_eq!(a.value(), 17);
        assert_eq!(
            rem(&mut a, &mut flags, 0),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn bitwise_ops_clear_carry_and_overflow() {
        let mut a = acc(0xF0F0);
        let mut flags = Flags::new();
        flags.set(Flag::Carry);
        flags.set(Flag::Overflow);
        bit_and(&mut a, &mut flags, 0x0FF0);
        assert_eq!(a.value(), 0x00F0);
        assert!(!flags.is_set(Flag::Carry));
        assert!(!flags.is_set(Flag::Overflow));

        bit_xor(&mut a, &mut flags, 0x00F0);
        assert_eq!(a.value(), 0);
        assert!(flags.is_set(Flag::Zero));
    }

    #[test]
    fn not_complements_the_operand() {
        let mut a = acc(0);
        let mut flags = Flags::new();
        bit_not(&mut a, &mut flags, 0x00FF);
        assert_eq!(a.value(), 0xFF00);
        assert!(flags.is_set(Flag::Sign));

        bit_not_byte(&mut a, &mut flags, 0x0F);
        assert_eq!(a.value(), 0xFFF0);
    }

    #[test]
    fn shifts_saturate_past_fifteen() {
        let mut a = acc(0xFFFF);
        let mut flags = Flags::new();
        shl(&mut a, &mut flags, 16);
        assert_eq!(a.value(), 0);
        assert!(flags.is_set(Flag::Zero));

        let mut a = acc(0xFFFF);
        shr(&mut a, &mut flags, 100);
        assert_eq!(a.value(), 0);

        let mut a = acc(0x0001);
        shl(&mut a, &mut flags, 4);
        assert_eq!(a.value(), 0x0010);
    }

    #[test]
    fn rotates_wrap_their_count() {
        let mut a = acc(0x8001);
        let mut flags = Flags::new();
        rol(&mut a, &mut flags, 1);
        assert_eq!(a.value(), 0x0003);

        let mut a = acc(0x8001);
        rol(&mut a, &mut flags, 17);
        assert_eq!(a.value(), 0x0003);

        let mut a = acc(0x8001);
        ror(&mut a, &mut flags, 16);
        assert_eq!(a.value(), 0x8001);
    }

    #[test]
    fn cmp_is_flag_only() {
        let mut flags = Flags::new();
        cmp(&mut flags, 5, 5);
        assert!(flags.is_set(Flag::Zero));
        assert!(!flags.is_set(Flag::Carry));

        cmp(&mut flags, 4, 5);
        assert!(!flags.is_set(Flag::Zero));
        assert!(flags.is_set(Flag::Carry));

        cmp(&mut flags, 6, 5);
        assert!(!flags.is_set(Flag::Zero));
        assert!(!flags.is_set(Flag::Carry));
    }

    #[test]
    fn byte_variants_widen() {
        let mut a = acc(0x00FF);
        let mut flags = Flags::new();
        add_byte(&mut a, &mut flags, 1);
        assert_eq!(a.value(), 0x0100);
        assert!(!flags.is_set(Flag::Carry));

        let mut flags = Flags::new();
        cmp_byte(&mut flags, 0x10, 0x10);
        assert!(flags.is_set(Flag::Zero));
    }
}
