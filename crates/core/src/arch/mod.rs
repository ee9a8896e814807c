//! Architecture descriptors.
//!
//! Everything the disassembler and the analyzers need to know about a
//! machine lives in one [`ArchSpec`] record: the capstone configuration,
//! instruction alignment, word and push sizes, the stack/frame register
//! names, and the mnemonic classifier tables. Adding an architecture is a
//! data change.

use capstone::prelude::*;
use capstone::{Capstone, Endian};
use serde::{Deserialize, Serialize};

/// Supported instruction-set architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    Arm,
    Aarch64,
    Mips,
    Mips64,
    Ppc,
    Ppc64,
    Riscv32,
    Riscv64,
}

impl Arch {
    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
            Arch::Ppc => "ppc",
            Arch::Ppc64 => "ppc64",
            Arch::Riscv32 => "riscv32",
            Arch::Riscv64 => "riscv64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-architecture descriptor driving decoding and classification.
#[derive(Debug, Clone)]
pub struct ArchSpec {
    pub arch: Arch,
    /// Minimum instruction alignment; the decoder realigns to this after a
    /// failed decode.
    pub insn_alignment: u64,
    pub word_size: u64,
    /// Bytes pushed per register by a push-style instruction.
    pub push_size: u64,
    pub sp_names: &'static [&'static str],
    pub fp_names: &'static [&'static str],
    pub call_mnemonics: &'static [&'static str],
    /// Unconditional jumps; tail-call candidates when they leave the
    /// function.
    pub jump_mnemonics: &'static [&'static str],
    pub return_mnemonics: &'static [&'static str],
    pub push_mnemonics: &'static [&'static str],
    pub pop_mnemonics: &'static [&'static str],
    /// SP-lowering arithmetic (`sub sp, ...`).
    pub sub_sp_mnemonics: &'static [&'static str],
    /// SP-raising or signed-immediate arithmetic (`add sp, ...`,
    /// `addiu $sp, $sp, -N`).
    pub add_sp_mnemonics: &'static [&'static str],
    /// Stores with base-register update (`stp ..., [sp, #-16]!`,
    /// `stwu r1, -32(r1)`).
    pub store_update_mnemonics: &'static [&'static str],
    /// Loads with base-register update (`ldp ..., [sp], #16`).
    pub load_update_mnemonics: &'static [&'static str],
    /// Frame-setup moves that keep the prologue window open
    /// (`mov rbp, rsp`, `mov x29, sp`).
    pub frame_move_mnemonics: &'static [&'static str],
    /// Padding/marker instructions tolerated inside the prologue window
    /// (`endbr64`, `nop`).
    pub prologue_neutral_mnemonics: &'static [&'static str],
}

impl ArchSpec {
    pub fn for_arch(arch: Arch) -> &'static ArchSpec {
        match arch {
            Arch::X86 => &X86,
            Arch::X86_64 => &X86_64,
            Arch::Arm => &ARM,
            Arch::Aarch64 => &AARCH64,
            Arch::Mips => &MIPS,
            Arch::Mips64 => &MIPS64,
            Arch::Ppc => &PPC,
            Arch::Ppc64 => &PPC64,
            Arch::Riscv32 => &RISCV32,
            Arch::Riscv64 => &RISCV64,
        }
    }

    /// Builds a capstone handle for this architecture.
    ///
    /// `thumb` selects the Thumb decoder variant and is only meaningful for
    /// 32-bit ARM.
    pub fn build_capstone(
        &self,
        endian: Endian,
        thumb: bool,
    ) -> Result<Capstone, capstone::Error> {
        match self.arch {
            Arch::X86 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .build(),
            Arch::X86_64 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .build(),
            Arch::Arm => {
                let mode = if thumb {
                    arch::arm::ArchMode::Thumb
                } else {
                    arch::arm::ArchMode::Arm
                };
                Capstone::new().arm().mode(mode).endian(endian).build()
            }
            Arch::Aarch64 => Capstone::new()
                .arm64()
                .mode(arch::arm64::ArchMode::Arm)
                .build(),
            Arch::Mips => Capstone::new()
                .mips()
                .mode(arch::mips::ArchMode::Mips32)
                .endian(endian)
                .build(),
            Arch::Mips64 => Capstone::new()
                .mips()
                .mode(arch::mips::ArchMode::Mips64)
                .endian(endian)
                .build(),
            Arch::Ppc => Capstone::new()
                .ppc()
                .mode(arch::ppc::ArchMode::Mode32)
                .endian(endian)
                .build(),
            Arch::Ppc64 => Capstone::new()
                .ppc()
                .mode(arch::ppc::ArchMode::Mode64)
                .endian(endian)
                .build(),
            Arch::Riscv32 => Capstone::new()
                .riscv()
                .mode(arch::riscv::ArchMode::RiscV32)
                .build(),
            Arch::Riscv64 => Capstone::new()
                .riscv()
                .mode(arch::riscv::ArchMode::RiscV64)
                .build(),
        }
    }
}

static X86: ArchSpec = ArchSpec {
    arch: Arch::X86,
    insn_alignment: 1,
    word_size: 4,
    push_size: 4,
    sp_names: &["esp"],
    fp_names: &["ebp"],
    call_mnemonics: &["call", "lcall"],
    jump_mnemonics: &["jmp", "ljmp"],
    return_mnemonics: &["ret", "retf"],
    push_mnemonics: &["push", "pushad"],
    pop_mnemonics: &["pop", "popad"],
    sub_sp_mnemonics: &["sub"],
    add_sp_mnemonics: &["add"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mov"],
    prologue_neutral_mnemonics: &["endbr32", "nop"],
};

static X86_64: ArchSpec = ArchSpec {
    arch: Arch::X86_64,
    insn_alignment: 1,
    word_size: 8,
    push_size: 8,
    sp_names: &["rsp", "esp"],
    fp_names: &["rbp", "ebp"],
    call_mnemonics: &["call", "callq", "lcall"],
    jump_mnemonics: &["jmp", "jmpq", "ljmp"],
    return_mnemonics: &["ret", "retq", "retf"],
    push_mnemonics: &["push", "pushq"],
    pop_mnemonics: &["pop", "popq"],
    sub_sp_mnemonics: &["sub"],
    add_sp_mnemonics: &["add"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mov"],
    prologue_neutral_mnemonics: &["endbr64", "nop"],
};

static ARM: ArchSpec = ArchSpec {
    arch: Arch::Arm,
    insn_alignment: 4,
    word_size: 4,
    push_size: 4,
    sp_names: &["sp", "r13"],
    fp_names: &["fp", "r11"],
    call_mnemonics: &["bl", "blx"],
    jump_mnemonics: &["b", "bx"],
    return_mnemonics: &[],
    push_mnemonics: &["push", "stmdb"],
    pop_mnemonics: &["pop", "ldmia"],
    sub_sp_mnemonics: &["sub", "subs"],
    add_sp_mnemonics: &["add", "adds"],
    store_update_mnemonics: &["str", "strd"],
    load_update_mnemonics: &["ldr", "ldrd"],
    frame_move_mnemonics: &["mov", "add"],
    prologue_neutral_mnemonics: &["nop"],
};

static AARCH64: ArchSpec = ArchSpec {
    arch: Arch::Aarch64,
    insn_alignment: 4,
    word_size: 8,
    push_size: 8,
    sp_names: &["sp"],
    fp_names: &["x29"],
    call_mnemonics: &["bl", "blr"],
    jump_mnemonics: &["b", "br"],
    return_mnemonics: &["ret", "retaa", "retab"],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &["sub"],
    add_sp_mnemonics: &["add"],
    store_update_mnemonics: &["stp", "str"],
    load_update_mnemonics: &["ldp", "ldr"],
    frame_move_mnemonics: &["mov", "add"],
    prologue_neutral_mnemonics: &["nop", "bti", "paciasp", "pacibsp"],
};

static MIPS: ArchSpec = ArchSpec {
    arch: Arch::Mips,
    insn_alignment: 4,
    word_size: 4,
    push_size: 4,
    sp_names: &["$sp", "sp"],
    fp_names: &["$fp", "fp", "$30"],
    call_mnemonics: &["jal", "jalr", "bal"],
    jump_mnemonics: &["j", "jr", "b"],
    return_mnemonics: &[],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &["subu", "sub"],
    add_sp_mnemonics: &["addiu", "addi", "addu"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["move", "addu"],
    prologue_neutral_mnemonics: &["nop"],
};

static MIPS64: ArchSpec = ArchSpec {
    arch: Arch::Mips64,
    insn_alignment: 4,
    word_size: 8,
    push_size: 8,
    sp_names: &["$sp", "sp"],
    fp_names: &["$fp", "fp", "$30"],
    call_mnemonics: &["jal", "jalr", "bal"],
    jump_mnemonics: &["j", "jr", "b"],
    return_mnemonics: &[],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &["dsubu", "subu", "sub"],
    add_sp_mnemonics: &["daddiu", "daddi", "addiu", "addi"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["move", "daddu"],
    prologue_neutral_mnemonics: &["nop"],
};

static PPC: ArchSpec = ArchSpec {
    arch: Arch::Ppc,
    insn_alignment: 4,
    word_size: 4,
    push_size: 4,
    sp_names: &["r1", "1"],
    fp_names: &["r31"],
    call_mnemonics: &["bl", "bla"],
    jump_mnemonics: &["b", "ba"],
    return_mnemonics: &["blr"],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &[],
    add_sp_mnemonics: &["addi"],
    store_update_mnemonics: &["stwu"],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mr"],
    prologue_neutral_mnemonics: &["nop", "mflr"],
};

static PPC64: ArchSpec = ArchSpec {
    arch: Arch::Ppc64,
    insn_alignment: 4,
    word_size: 8,
    push_size: 8,
    sp_names: &["r1", "1"],
    fp_names: &["r31"],
    call_mnemonics: &["bl", "bla"],
    jump_mnemonics: &["b", "ba"],
    return_mnemonics: &["blr"],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &[],
    add_sp_mnemonics: &["addi"],
    store_update_mnemonics: &["stdu", "stwu"],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mr"],
    prologue_neutral_mnemonics: &["nop", "mflr"],
};

static RISCV32: ArchSpec = ArchSpec {
    arch: Arch::Riscv32,
    insn_alignment: 2,
    word_size: 4,
    push_size: 4,
    sp_names: &["sp"],
    fp_names: &["s0", "fp"],
    call_mnemonics: &["jal", "jalr"],
    jump_mnemonics: &["j", "c.j"],
    return_mnemonics: &["ret"],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &["sub"],
    add_sp_mnemonics: &["addi", "c.addi", "c.addi16sp"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mv", "addi"],
    prologue_neutral_mnemonics: &["nop"],
};

static RISCV64: ArchSpec = ArchSpec {
    arch: Arch::Riscv64,
    insn_alignment: 2,
    word_size: 8,
    push_size: 8,
    sp_names: &["sp"],
    fp_names: &["s0", "fp"],
    call_mnemonics: &["jal", "jalr"],
    jump_mnemonics: &["j", "c.j"],
    return_mnemonics: &["ret"],
    push_mnemonics: &[],
    pop_mnemonics: &[],
    sub_sp_mnemonics: &["sub"],
    add_sp_mnemonics: &["addi", "c.addi", "c.addi16sp"],
    store_update_mnemonics: &[],
    load_update_mnemonics: &[],
    frame_move_mnemonics: &["mv", "addi"],
    prologue_neutral_mnemonics: &["nop"],
};
