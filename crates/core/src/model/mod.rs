//! Core data model for binaries, functions, instructions, and stack frames.
//!
//! Everything here is plain data: the loader and the disassembler produce
//! these records, the analyzers consume them. Identity rules: internal
//! functions are identified by virtual address, imports and synthetic nodes
//! by name.

use serde::{Deserialize, Serialize};

/// A function-like symbol recovered from the binary.
///
/// `name` is the raw symbol string and stays the identity everywhere;
/// `demangled` is a best-effort rendering kept alongside for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub demangled: Option<String>,
    pub address: u64,
    pub size: u64,
    /// Name of the executable section holding the function body.
    pub section: String,
    /// Other symbol names that resolved to the same address.
    pub aliases: Vec<String>,
}

/// An imported symbol, usually reached through a PLT stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    pub plt_stub: Option<u64>,
}

/// A retained section: executable sections keep their raw bytes so the
/// disassembler can slice function bodies out of them after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub offset: u64,
    pub executable: bool,
    pub data: Vec<u8>,
}

impl Section {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.address + self.size
    }
}

/// Normalized operand form; downstream code never inspects raw operand text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    Immediate,
    Register,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub value: Option<i64>,
}

/// Effect of an instruction on the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpDelta {
    /// SP moves by a known signed amount (negative = allocation).
    Constant(i64),
    /// SP moves by a runtime-computed amount (`alloca`, VLAs).
    Dynamic,
}

/// Architecture-independent classification of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnKind {
    /// Call with an immediate target.
    CallDirect { target: u64 },
    /// Call through a register or memory operand.
    CallIndirect,
    /// Unconditional jump; a tail call when it leaves the function.
    /// `target` is `None` for register/memory jumps.
    TailJump { target: Option<u64> },
    Return,
    SpAdjust { delta: SpDelta },
    Other,
}

/// A decoded instruction in normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub size: usize,
    pub mnemonic: String,
    /// Full `mnemonic op_str` rendering, used verbatim in reports.
    pub text: String,
    pub operands: Vec<Operand>,
    pub kind: InsnKind,
}

/// A range the decoder could not make sense of. Gaps are recorded in the
/// stream and never abort the surrounding function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeGap {
    pub address: u64,
    pub skipped: usize,
}

/// The decoded body of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsnStream {
    pub insns: Vec<Instruction>,
    pub gaps: Vec<DecodeGap>,
}

/// How much trust to put in a recovered stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    Heuristic,
    Unknown,
}

/// Local stack frame recovered from a function's prologue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub local_bytes: u64,
    pub dynamic_alloca: bool,
    pub confidence: Confidence,
}
