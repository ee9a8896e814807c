//! Multi-architecture disassembly and instruction classification.
//!
//! [`Disassembler`] wraps capstone, decoding one function at a time into a
//! cached [`InsnStream`] of normalized [`Instruction`]s. A byte sequence
//! the decoder rejects becomes a [`DecodeGap`] and decoding resumes at the
//! next aligned address; a gap never aborts the function.
//!
//! Classification is driven entirely by the [`ArchSpec`] descriptor
//! tables. This module is the only place that looks at raw operand text;
//! everything downstream sees normalized operands and [`InsnKind`] tags.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use capstone::Capstone;
use log::trace;
use thiserror::Error;

use crate::arch::{Arch, ArchSpec};
use crate::loader::Binary;
use crate::model::{
    DecodeGap, Function, InsnKind, InsnStream, Instruction, Operand, OperandKind, SpDelta,
};

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("failed to initialize the {arch} decoder: {source}")]
    Backend {
        arch: &'static str,
        source: capstone::Error,
    },
}

/// Capstone-backed decoder with a write-once per-function cache.
pub struct Disassembler {
    spec: &'static ArchSpec,
    cs: Capstone,
    /// Thumb-mode decoder, built lazily alongside the ARM one.
    cs_thumb: Option<Capstone>,
    cache: RefCell<HashMap<u64, Rc<InsnStream>>>,
}

impl Disassembler {
    pub fn new(binary: &Binary) -> Result<Self, DisasmError> {
        let spec = ArchSpec::for_arch(binary.arch);
        let endian = binary.endianness.capstone();
        let backend = |source| DisasmError::Backend {
            arch: binary.arch.name(),
            source,
        };
        let cs = spec.build_capstone(endian, false).map_err(backend)?;
        let cs_thumb = if binary.arch == Arch::Arm {
            Some(spec.build_capstone(endian, true).map_err(backend)?)
        } else {
            None
        };
        Ok(Self {
            spec,
            cs,
            cs_thumb,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn spec(&self) -> &'static ArchSpec {
        self.spec
    }

    /// Decodes a function, returning the cached stream on a repeat call.
    pub fn decode(&self, binary: &Binary, function: &Function) -> Rc<InsnStream> {
        if let Some(stream) = self.cache.borrow().get(&function.address) {
            return Rc::clone(stream);
        }
        let stream = Rc::new(self.decode_uncached(binary, function));
        self.cache
            .borrow_mut()
            .insert(function.address, Rc::clone(&stream));
        stream
    }

    fn decode_uncached(&self, binary: &Binary, function: &Function) -> InsnStream {
        let Some(bytes) = binary.function_bytes(function) else {
            return InsnStream::default();
        };

        let thumb = self.spec.arch == Arch::Arm && function.address & 1 == 1;
        let cs = if thumb {
            self.cs_thumb.as_ref().unwrap_or(&self.cs)
        } else {
            &self.cs
        };
        let base = if thumb {
            function.address & !1
        } else {
            function.address
        };

        let mut stream = InsnStream::default();
        let align = self.spec.insn_alignment.max(1);
        let mut offset = 0usize;

        while offset < bytes.len() {
            let address = base + offset as u64;
            let decoded = cs.disasm_count(&bytes[offset..], address, 1);
            let insn = match &decoded {
                Ok(list) => list.iter().next(),
                Err(_) => None,
            };
            match insn {
                Some(i) => {
                    let size = i.bytes().len().max(1);
                    stream.insns.push(self.normalize(address, size, i));
                    offset += size;
                }
                None => {
                    let skip = (align - address % align) as usize;
                    trace!("decode gap at {address:#x} in `{}`", function.name);
                    match stream.gaps.last_mut() {
                        Some(gap) if gap.address + gap.skipped as u64 == address => {
                            gap.skipped += skip;
                        }
                        _ => stream.gaps.push(DecodeGap {
                            address,
                            skipped: skip,
                        }),
                    }
                    offset += skip;
                }
            }
        }

        stream
    }

    fn normalize(&self, address: u64, size: usize, insn: &capstone::Insn) -> Instruction {
        let mnemonic = insn.mnemonic().unwrap_or("").to_string();
        let op_str = insn.op_str().unwrap_or("");
        let text = if op_str.is_empty() {
            mnemonic.clone()
        } else {
            format!("{mnemonic} {op_str}")
        };
        let operands = parse_operands(op_str);
        let kind = classify(self.spec, &mnemonic, op_str, &operands);
        Instruction {
            address,
            size,
            mnemonic,
            text,
            operands,
            kind,
        }
    }
}

/// Classifies one instruction against the architecture descriptor.
fn classify(spec: &ArchSpec, mnemonic: &str, op_str: &str, operands: &[Operand]) -> InsnKind {
    if spec.call_mnemonics.contains(&mnemonic) {
        return match first_immediate(operands) {
            Some(v) => InsnKind::CallDirect { target: v as u64 },
            None => InsnKind::CallIndirect,
        };
    }
    if spec.jump_mnemonics.contains(&mnemonic) {
        return InsnKind::TailJump {
            target: first_immediate(operands).map(|v| v as u64),
        };
    }
    if spec.return_mnemonics.contains(&mnemonic) {
        return InsnKind::Return;
    }
    if let Some(delta) = sp_adjust(spec, mnemonic, op_str) {
        return InsnKind::SpAdjust { delta };
    }
    InsnKind::Other
}

/// Recognizes the stack-pointer adjustment forms listed in the descriptor.
/// Returns `None` when the instruction leaves SP alone.
fn sp_adjust(spec: &ArchSpec, mnemonic: &str, op_str: &str) -> Option<SpDelta> {
    let ops = split_operands(op_str);
    let is_sp = |tok: &str| spec.sp_names.contains(&tok.trim());

    if spec.push_mnemonics.contains(&mnemonic) {
        let count = register_list_len(op_str, &ops);
        return Some(SpDelta::Constant(-((spec.push_size * count as u64) as i64)));
    }
    if spec.pop_mnemonics.contains(&mnemonic) {
        let count = register_list_len(op_str, &ops);
        return Some(SpDelta::Constant((spec.push_size * count as u64) as i64));
    }

    // sub sp, sp, #N | sub rsp, N | sub sp, sp, reg (dynamic)
    if spec.sub_sp_mnemonics.contains(&mnemonic) && ops.first().is_some_and(|o| is_sp(o)) {
        let last = ops.last()?;
        return Some(match parse_imm(last) {
            Some(v) => SpDelta::Constant(-v),
            None => SpDelta::Dynamic,
        });
    }

    // add sp, sp, #N | addiu $sp, $sp, -N | add rsp, N
    if spec.add_sp_mnemonics.contains(&mnemonic) && ops.first().is_some_and(|o| is_sp(o)) {
        // Frame-pointer setup like `add x29, sp, #0` writes FP, not SP, and
        // lands here only when the first operand really is SP.
        let last = ops.last()?;
        return Some(match parse_imm(last) {
            Some(v) => SpDelta::Constant(v),
            None => SpDelta::Dynamic,
        });
    }

    // stp x29, x30, [sp, #-16]! | str x0, [sp, #-8]! | stwu r1, -32(r1)
    if spec.store_update_mnemonics.contains(&mnemonic) {
        if let Some(delta) =
            writeback_delta(&ops, &is_sp).or_else(|| ppc_update_delta(&ops, &is_sp))
        {
            return Some(SpDelta::Constant(delta));
        }
        return None;
    }

    // ldp x29, x30, [sp], #16 | ldr x0, [sp], #8
    if spec.load_update_mnemonics.contains(&mnemonic) {
        if let Some(delta) = post_index_delta(&ops, &is_sp) {
            return Some(SpDelta::Constant(delta));
        }
        return None;
    }

    // lea rsp, [rsp - 0x20]
    if mnemonic == "lea" && ops.first().is_some_and(|o| is_sp(o)) {
        let inner = op_str.split('[').nth(1)?.split(']').next()?;
        if spec.sp_names.iter().any(|sp| inner.contains(sp)) {
            if let Some(pos) = inner.find(['-', '+']) {
                let sign = if inner.as_bytes()[pos] == b'-' { -1 } else { 1 };
                if let Some(v) = parse_imm(inner[pos + 1..].trim()) {
                    return Some(SpDelta::Constant(sign * v));
                }
            }
        }
        return Some(SpDelta::Dynamic);
    }

    None
}

/// `[sp, #-16]!` pre-index writeback: delta is the bracketed displacement.
fn writeback_delta(ops: &[String], is_sp: &dyn Fn(&str) -> bool) -> Option<i64> {
    let mem = ops.iter().find(|o| o.starts_with('['))?;
    if !mem.ends_with("]!") {
        // stwu r1, -32(r1) keeps the displacement outside brackets.
        return None;
    }
    let inner = mem.strip_prefix('[')?.strip_suffix("]!")?;
    let mut parts = inner.splitn(2, ',');
    let base = parts.next()?.trim();
    if !is_sp(base) {
        return None;
    }
    parse_imm(parts.next()?.trim())
}

/// `[sp], #16` post-index writeback: the displacement is the trailing
/// top-level operand after a bare `[sp]`.
fn post_index_delta(ops: &[String], is_sp: &dyn Fn(&str) -> bool) -> Option<i64> {
    let pos = ops.iter().position(|o| {
        o.strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .is_some_and(|base| is_sp(base.trim()))
    })?;
    parse_imm(ops.get(pos + 1)?.trim())
}

/// PowerPC-style `stwu r1, -32(r1)`: store-with-update through SP.
fn ppc_update_delta(ops: &[String], is_sp: &dyn Fn(&str) -> bool) -> Option<i64> {
    let mem = ops.iter().find(|o| o.contains('('))?;
    let open = mem.find('(')?;
    let base = mem[open + 1..].trim_end_matches(')').trim();
    if !is_sp(base) {
        return None;
    }
    parse_imm(mem[..open].trim())
}

/// Number of registers moved by a push/pop style instruction; `push {r4,
/// r5, lr}` counts the braces, plain `push rbp` counts one.
fn register_list_len(op_str: &str, ops: &[String]) -> usize {
    if let Some(open) = op_str.find('{') {
        let inner = &op_str[open + 1..op_str.find('}').unwrap_or(op_str.len())];
        return inner.split(',').filter(|s| !s.trim().is_empty()).count().max(1);
    }
    ops.len().max(1)
}

/// Splits operand text on top-level commas, leaving bracketed memory
/// operands and register lists intact.
fn split_operands(op_str: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in op_str.chars() {
        match c {
            '[' | '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let tok = current.trim().to_string();
                if !tok.is_empty() {
                    out.push(tok);
                }
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    let tok = current.trim().to_string();
    if !tok.is_empty() {
        out.push(tok);
    }
    out
}

fn parse_operands(op_str: &str) -> Vec<Operand> {
    split_operands(op_str)
        .iter()
        .map(|tok| {
            if tok.contains('[') || tok.contains('(') {
                Operand {
                    kind: OperandKind::Memory,
                    value: None,
                }
            } else if let Some(v) = parse_imm(tok) {
                Operand {
                    kind: OperandKind::Immediate,
                    value: Some(v),
                }
            } else {
                Operand {
                    kind: OperandKind::Register,
                    value: None,
                }
            }
        })
        .collect()
}

fn first_immediate(operands: &[Operand]) -> Option<i64> {
    operands
        .iter()
        .find(|o| o.kind == OperandKind::Immediate)
        .and_then(|o| o.value)
}

/// Parses `#0x20`, `0x20`, `-0x20`, `#-16`, and plain decimal immediates.
fn parse_imm(token: &str) -> Option<i64> {
    let t = token.trim().trim_start_matches('#').trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let v = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()? as i64
    } else if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) {
        t.parse::<u64>().ok()? as i64
    } else {
        return None;
    };
    Some(if neg { v.wrapping_neg() } else { v })
}
