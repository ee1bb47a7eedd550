//! System calls: the line-oriented I/O surface.
//!
//! Every call works against the managed stack: strings travel as a pushed
//! character sequence topped by a 16-bit count.  The host side is a
//! [`LineIo`] channel; the binaries use [`StdLineIo`], tests a [`BufferIo`].

use std::io::{BufRead, Write};

use log::debug;

use crate::isa::SysCall;
use crate::mem::StackView;

use super::error::RuntimeError;

/// A line-oriented I/O channel for the machine.
pub trait LineIo {
    fn write_str(&mut self, s: &str) -> std::io::Result<()>;
    fn write_line(&mut self, s: &str) -> std::io::Result<()>;
    fn read_line(&mut self) -> std::io::Result<String>;
}

/// Standard input/output.
#[derive(Default)]
pub struct StdLineIo;

impl LineIo for StdLineIo {
    fn write_str(&mut self, s: &str) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(s.as_bytes())?;
        out.flush()
    }

    fn write_line(&mut self, s: &str) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(s.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        // Strip the trailing newline (and a CR if present).
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

/// An in-memory channel: scripted input lines, captured output.
#[derive(Default)]
pub struct BufferIo {
    input: std::collections::VecDeque<String>,
    output: String,
}

impl BufferIo {
    pub fn with_input(lines: &[&str]) -> BufferIo {
        BufferIo {
            input: lines.iter().map(|s| s.to_string()).collect(),
            output: String::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl LineIo for BufferIo {
    fn write_str(&mut self, s: &str) -> std::io::Result<()> {
        self.output.push_str(s);
        Ok(())
    }

    fn write_line(&mut self, s: &str) -> std::io::Result<()> {
        self.output.push_str(s);
        self.output.push('\n');
        Ok(())
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        Ok(self.input.pop_front().unwrap_or_default())
    }
}

/// Pop a counted string: a 16-bit length, then that many bytes, top byte
/// first.
fn pop_string(stack: &mut StackView<'_>) -> Result<String, RuntimeError> {
    let count = stack.pop_word()?;
    let mut bytes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        bytes.push(stack.pop_byte()?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Execute one system call against the stack and the I/O channel.
pub fn dispatch(
    call: SysCall,
    stack: &mut StackView<'_>,
    io: &mut dyn LineIo,
) -> Result<(), RuntimeError> {
    debug!("syscall {call}");
    match call {
        SysCall::PrintString => {
            let text = pop_string(stack)?;
            io.write_str(&text)?;
        }
        SysCall::PrintLine => {
            let text = pop_string(stack)?;
            io.write_line(&text)?;
        }
        SysCall::ReadLine => {
            let max_len = stack.pop_word()?;
            let mut bytes = io.read_line()?.into_bytes();
            bytes.truncate(usize::from(max_len));
            // Reverse push, so the first character ends up on top once the
            // count is above it.
            for byte in bytes.iter().rev() {
                stack.push_byte(*byte)?;
            }
            stack.push_word(bytes.len() as u16)?;
        }
    }
    Ok(())
}
