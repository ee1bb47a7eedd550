//! End-to-end scenarios: assemble real source text and run it on a fresh
//! machine, checking architectural state afterwards.

use pendragon::isa::RegCode;
use pendragon::machine::{Binary, BufferIo, Flag, RuntimeError, Vm, VmConfig};
use pendragon::pipeline::assemble;

fn build(source: &str) -> Binary {
    let output = assemble(source, "scenario").expect("assembly should succeed");
    Binary::parse(&output.binary).expect("emitted binary should parse")
}

fn run(source: &str) -> (Vm, BufferIo) {
    run_with_input(source, &[])
}

fn run_with_input(source: &str, input: &[&str]) -> (Vm, BufferIo) {
    let binary = build(source);
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(&binary, 0).unwrap();
    let mut io = BufferIo::with_input(input);
    vm.run(&mut io).expect("program should halt cleanly");
    (vm, io)
}

#[test]
fn smallest_valid_program() {
    let binary = build("CODE\nHALT\n");
    assert_eq!(binary.code, vec![0x01]);

    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(&binary, 0).unwrap();
    let mut io = BufferIo::default();
    vm.run(&mut io).unwrap();
    assert!(vm.cpu().halted());
    // IR advanced over the HALT opcode and nothing else.
    assert_eq!(vm.cpu().iunit().ir(), 1);
}

#[test]
fn integer_add_through_registers() {
    let (vm, _) = run(
        "CODE\n\
         LD AX, 0x0007\n\
         LD BX, 0x0005\n\
         ADD AX, BX\n\
         HALT\n",
    );
    assert_eq!(vm.cpu().regs().get(RegCode::Ax).value(), 0x000C);
    assert_eq!(vm.cpu().regs().get(RegCode::Bx).value(), 0x0005);
    assert!(!vm.cpu().flags().is_set(Flag::Zero));
    assert!(!vm.cpu().flags().is_set(Flag::Carry));
    assert!(!vm.cpu().flags().is_set(Flag::Sign));
}

#[test]
fn loop_with_conditional_jump() {
    let (vm, _) = run(
        "CODE\n\
         START: LD CX, 0x0003\n\
         LOOP:  DEC CX\n\
         JNZ LOOP\n\
         HALT\n",
    );
    assert_eq!(vm.cpu().regs().get(RegCode::Cx).value(), 0);
    // The final DEC left Z set, so the final JNZ fell through.
    assert!(vm.cpu().flags().is_set(Flag::Zero));
}

#[test]
fn subroutine_with_return_value() {
    let (mut vm, _) = run(
        "CODE\n\
         MAIN:  CALL SUB\n\
         HALT\n\
         SUB:   PUSHW 0x00AB\n\
         RET\n",
    );
    assert_eq!(vm.cpu().iunit().return_depth(), 0);
    let (top, fp, size) = vm
        .with_stack(|stack| {
            (
                stack.peek_word().unwrap(),
                stack.frame_pointer(),
                stack.size(),
            )
        })
        .unwrap();
    assert_eq!(top, 0x00AB);
    assert_eq!(fp, -1);
    assert_eq!(size, 2);
}

#[test]
fn hello_world_via_print_line() {
    let mut source = String::from("CODE\n");
    for byte in "Hello, World!".bytes().rev() {
        source.push_str(&format!("PUSHB {byte}\n"));
    }
    source.push_str("PUSHW 13\nSYS 0x0011\nHALT\n");

    let (mut vm, io) = run(&source);
    assert_eq!(io.output(), "Hello, World!\n");
    let empty = vm.with_stack(|stack| stack.is_empty()).unwrap();
    assert!(empty);
}

#[test]
fn division_by_zero_aborts_before_halt() {
    let binary = build(
        "CODE\n\
         LD AX, 0x0010\n\
         LD BX, 0x0000\n\
         DIV AX, BX\n\
         HALT\n",
    );
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(&binary, 0).unwrap();
    let mut io = BufferIo::default();
    let fault = vm.run(&mut io).unwrap_err();
    assert_eq!(fault.source, RuntimeError::DivisionByZero);
    assert!(!vm.cpu().halted());
    assert_eq!(vm.cpu().regs().get(RegCode::Ax).value(), 0x0010);
}

#[test]
fn read_line_round_trip() {
    // Read a line (max 32), then print it back with a newline.
    let (_, io) = run_with_input(
        "CODE\n\
         PUSHW 32\n\
         SYS 0x0012\n\
         SYS 0x0011\n\
         HALT\n",
        &["ping"],
    );
    assert_eq!(io.output(), "ping\n");
}

#[test]
fn data_segment_loads_and_reads_back() {
    // The block at data address 0 is [size_lo, size_hi, payload...]; the
    // word at the label address is the size prefix, the payload follows.
    let (vm, _) = run(
        "DATA\n\
         VALUE: DW [0x1234]\n\
         CODE\n\
         LDA AX, VALUE\n\
         LDA BX, (VALUE + 2)\n\
         HALT\n",
    );
    assert_eq!(vm.cpu().regs().get(RegCode::Ax).value(), 2); // prefix
    assert_eq!(vm.cpu().regs().get(RegCode::Bx).value(), 0x1234);
}

#[test]
fn sugar_load_indexes_into_a_table() {
    let (vm, _) = run(
        "DATA\n\
         TABLE: DW [0x1111, 0x2222, 0x3333]\n\
         CODE\n\
         LD AX, [TABLE + 4]\n\
         HALT\n",
    );
    // Skip the 2-byte prefix and the first element.
    assert_eq!(vm.cpu().regs().get(RegCode::Ax).value(), 0x2222);
}

#[test]
fn call_without_return_value_discards_locals() {
    let (mut vm, _) = run(
        "CODE\n\
         CALL SUB, 0\n\
         HALT\n\
         SUB: PUSHW 0x1234\n\
         PUSHW 0x5678\n\
         RET\n",
    );
    let (size, fp) = vm
        .with_stack(|stack| (stack.size(), stack.frame_pointer()))
        .unwrap();
    assert_eq!(size, 0);
    assert_eq!(fp, -1);
}

#[test]
fn nested_subroutines_balance() {
    let (mut vm, _) = run(
        "CODE\n\
         CALL OUTER\n\
         HALT\n\
         OUTER: CALL INNER\n\
         RET\n\
         INNER: PUSHW 0x0042\n\
         RET\n",
    );
    // INNER returns 0x42 to OUTER's frame; OUTER returns it again.
    let top = vm.with_stack(|stack| stack.peek_word().unwrap()).unwrap();
    assert_eq!(top, 0x0042);
    assert_eq!(vm.cpu().iunit().return_depth(), 0);
}

#[test]
fn runtime_error_message_names_opcode_and_ir() {
    let binary = build("CODE\nDIV AX, 0\nHALT\n");
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(&binary, 0).unwrap();
    let mut io = BufferIo::default();
    let fault = vm.run(&mut io).unwrap_err();
    let message = fault.to_string();
    assert!(message.contains("division by zero"), "{message}");
    assert!(message.contains("opcode 0x38"), "{message}");
}
