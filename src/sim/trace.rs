use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::tick::Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Load,
    Store,
    Exe,
}

impl Op {
    pub fn is_mem(self) -> bool {
        matches!(self, Op::Load | Op::Store)
    }
}

/// One trace line, carried through the window until retirement.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Op,
    pub eip: Addr,
    pub target_vaddr: Addr,
    pub target_paddr: Addr,
    pub ready_to_commit: bool,
    pub already_translated: bool,
}

impl Instruction {
    fn exe(eip: Addr) -> Self {
        Self {
            op: Op::Exe,
            eip,
            target_vaddr: 0,
            target_paddr: 0,
            ready_to_commit: false,
            already_translated: false,
        }
    }

    fn mem(op: Op, eip: Addr, vaddr: Addr) -> Self {
        Self {
            op,
            eip,
            target_vaddr: vaddr,
            target_paddr: 0,
            ready_to_commit: false,
            already_translated: false,
        }
    }
}

/// Streaming reader for the whitespace-separated trace format:
/// `op_type EIP [target_addr]`, one instruction per line.
///
/// End-of-file just ends the stream; a malformed line is a bug in the input
/// and terminates the process with a diagnostic.
pub struct Trace {
    label: String,
    lines: Box<dyn Iterator<Item = std::io::Result<String>>>,
    lineno: usize,
}

impl Trace {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("cannot open trace file {}", path.display()))?;
        Ok(Self::from_reader(
            path.display().to_string(),
            BufReader::new(file),
        ))
    }

    pub fn from_reader<R: BufRead + 'static>(label: String, reader: R) -> Self {
        Self {
            label,
            lines: Box::new(reader.lines()),
            lineno: 0,
        }
    }

    pub fn next_instruction(&mut self) -> Option<Instruction> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line.unwrap_or_else(|e| {
                    panic!("read error in trace {}: {e}", self.label);
                }),
                None => return None,
            };
            self.lineno += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(self.parse_line(&line));
        }
    }

    fn parse_line(&self, line: &str) -> Instruction {
        let mut tokens = line.split_whitespace();
        let op = tokens.next();
        let eip = tokens.next().map(|t| self.parse_num(t, line));
        match (op, eip) {
            (Some("E"), Some(eip)) => Instruction::exe(eip),
            (Some(op @ ("L" | "S")), Some(eip)) => {
                let vaddr = tokens
                    .next()
                    .map(|t| self.parse_num(t, line))
                    .unwrap_or_else(|| self.malformed(line));
                let op = if op == "L" { Op::Load } else { Op::Store };
                Instruction::mem(op, eip, vaddr)
            }
            _ => self.malformed(line),
        }
    }

    fn parse_num(&self, token: &str, line: &str) -> Addr {
        token.parse().unwrap_or_else(|_| self.malformed(line))
    }

    fn malformed(&self, line: &str) -> ! {
        panic!(
            "malformed trace line in {} at line {}: {line:?}",
            self.label, self.lineno
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn trace(text: &str) -> Trace {
        Trace::from_reader("test".to_string(), Cursor::new(text.to_string()))
    }

    #[test]
    fn parses_all_three_ops() {
        let mut t = trace("E 4096\nL 4100 8192\nS 4104 8256\n");
        let i = t.next_instruction().unwrap();
        assert_eq!(i.op, Op::Exe);
        assert_eq!(i.eip, 4096);
        let i = t.next_instruction().unwrap();
        assert_eq!(i.op, Op::Load);
        assert_eq!(i.target_vaddr, 8192);
        let i = t.next_instruction().unwrap();
        assert_eq!(i.op, Op::Store);
        assert_eq!(i.target_vaddr, 8256);
        assert!(t.next_instruction().is_none());
    }

    #[test]
    fn truncated_trace_just_ends() {
        let mut t = trace("E 1\n");
        assert!(t.next_instruction().is_some());
        assert!(t.next_instruction().is_none());
        assert!(t.next_instruction().is_none());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut t = trace("\nE 1\n\nE 2\n");
        assert_eq!(t.next_instruction().unwrap().eip, 1);
        assert_eq!(t.next_instruction().unwrap().eip, 2);
    }

    #[test]
    #[should_panic(expected = "malformed trace line")]
    fn load_without_address_panics() {
        let mut t = trace("L 4096\n");
        t.next_instruction();
    }

    #[test]
    #[should_panic(expected = "malformed trace line")]
    fn unknown_op_panics() {
        let mut t = trace("X 1 2\n");
        t.next_instruction();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Trace::from_file(Path::new("/nonexistent/trace.t")).is_err());
    }
}
