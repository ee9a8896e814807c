//! Hand-rolled ELF64 fixtures.
//!
//! Builds minimal but well-formed little-endian ELF executables with a
//! `.text` section, a symbol table, and hand-assembled x86-64 bodies, so
//! the whole pipeline can be exercised without external tooling.

#![allow(dead_code)]

pub const TEXT_ADDR: u64 = 0x401000;

/// Every function occupies one fixed-size slot so call targets can be
/// planned before the bytes are emitted.
pub const SLOT: usize = 32;

pub struct ElfBuilder {
    machine: u16,
    text_addr: u64,
    code: Vec<u8>,
    symbols: Vec<(String, u64, u64)>,
    text_size_override: Option<u64>,
}

impl ElfBuilder {
    pub fn x86_64() -> Self {
        Self {
            machine: 62,
            text_addr: TEXT_ADDR,
            code: Vec::new(),
            symbols: Vec::new(),
            text_size_override: None,
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Declares `.text` larger than the file to provoke truncation errors.
    pub fn oversized_text(mut self, size: u64) -> Self {
        self.text_size_override = Some(size);
        self
    }

    pub fn slot_addr(&self, index: usize) -> u64 {
        self.text_addr + (index * SLOT) as u64
    }

    /// Appends a function at the next slot boundary, padding with `nop`.
    pub fn add_function(&mut self, name: &str, code: &[u8]) -> u64 {
        assert!(code.len() <= SLOT, "function body exceeds one slot");
        let addr = self.text_addr + self.code.len() as u64;
        self.symbols.push((name.to_string(), addr, code.len() as u64));
        let end = self.code.len() + SLOT;
        self.code.extend_from_slice(code);
        self.code.resize(end, 0x90);
        addr
    }

    /// Adds a raw symbol without emitting code (aliases, size-zero syms).
    pub fn add_symbol(&mut self, name: &str, addr: u64, size: u64) {
        self.symbols.push((name.to_string(), addr, size));
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for (name, _, _) in &self.symbols {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let mut shstrtab = vec![0u8];
        let mut sh_names = [0u32; 4];
        for (i, name) in [".text", ".symtab", ".strtab", ".shstrtab"]
            .iter()
            .enumerate()
        {
            sh_names[i] = shstrtab.len() as u32;
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }

        let text_off = 64u64;
        let symtab_off = align8(text_off + self.code.len() as u64);
        let symtab_size = 24 * (self.symbols.len() as u64 + 1);
        let strtab_off = symtab_off + symtab_size;
        let shstrtab_off = strtab_off + strtab.len() as u64;
        let shoff = align8(shstrtab_off + shstrtab.len() as u64);

        let mut out = Vec::new();
        // ELF header
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        u16le(&mut out, 2); // ET_EXEC
        u16le(&mut out, self.machine);
        u32le(&mut out, 1);
        u64le(&mut out, self.text_addr); // entry point
        u64le(&mut out, 0); // phoff
        u64le(&mut out, shoff);
        u32le(&mut out, 0); // flags
        u16le(&mut out, 64); // ehsize
        u16le(&mut out, 0); // phentsize
        u16le(&mut out, 0); // phnum
        u16le(&mut out, 64); // shentsize
        u16le(&mut out, 5); // shnum
        u16le(&mut out, 4); // shstrndx
        assert_eq!(out.len(), 64);

        out.extend_from_slice(&self.code);
        pad_to(&mut out, symtab_off);

        // null symbol
        out.extend_from_slice(&[0u8; 24]);
        for (i, (_, addr, size)) in self.symbols.iter().enumerate() {
            u32le(&mut out, name_offsets[i]);
            out.push(0x12); // GLOBAL | FUNC
            out.push(0);
            u16le(&mut out, 1); // .text
            u64le(&mut out, *addr);
            u64le(&mut out, *size);
        }

        out.extend_from_slice(&strtab);
        out.extend_from_slice(&shstrtab);
        pad_to(&mut out, shoff);

        let text_size = self
            .text_size_override
            .unwrap_or(self.code.len() as u64);

        // section headers: NULL, .text, .symtab, .strtab, .shstrtab
        out.extend_from_slice(&[0u8; 64]);
        section_header(
            &mut out,
            sh_names[0],
            1,          // PROGBITS
            0x2 | 0x4,  // ALLOC | EXECINSTR
            self.text_addr,
            text_off,
            text_size,
            0,
            0,
            16,
            0,
        );
        section_header(
            &mut out,
            sh_names[1],
            2, // SYMTAB
            0,
            0,
            symtab_off,
            symtab_size,
            3, // link: .strtab
            1, // info: first global symbol
            8,
            24,
        );
        section_header(
            &mut out,
            sh_names[2],
            3, // STRTAB
            0,
            0,
            strtab_off,
            strtab.len() as u64,
            0,
            0,
            1,
            0,
        );
        section_header(
            &mut out,
            sh_names[3],
            3,
            0,
            0,
            shstrtab_off,
            shstrtab.len() as u64,
            0,
            0,
            1,
            0,
        );

        out
    }
}

fn align8(v: u64) -> u64 {
    (v + 7) & !7
}

fn pad_to(out: &mut Vec<u8>, offset: u64) {
    assert!(out.len() as u64 <= offset);
    out.resize(offset as usize, 0);
}

fn u16le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn u64le(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[allow(clippy::too_many_arguments)]
fn section_header(
    out: &mut Vec<u8>,
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
) {
    u32le(out, name);
    u32le(out, sh_type);
    u64le(out, flags);
    u64le(out, addr);
    u64le(out, offset);
    u64le(out, size);
    u32le(out, link);
    u32le(out, info);
    u64le(out, addralign);
    u64le(out, entsize);
}

// --- hand-assembled x86-64 ------------------------------------------------

/// `push rbp; mov rbp, rsp; sub rsp, extra` followed by `body`, closed with
/// `leave; ret`. The local frame is `8 + extra` bytes.
pub fn function_body(extra: u8, body: &[u8]) -> Vec<u8> {
    let mut code = vec![0x55, 0x48, 0x89, 0xe5, 0x48, 0x83, 0xec, extra];
    code.extend_from_slice(body);
    code.extend_from_slice(&[0xc9, 0xc3]);
    code
}

/// Offset of `body` inside [`function_body`].
pub const BODY_OFFSET: u64 = 8;

pub fn call_rel(site: u64, target: u64) -> [u8; 5] {
    let disp = target.wrapping_sub(site + 5) as u32;
    let d = disp.to_le_bytes();
    [0xe8, d[0], d[1], d[2], d[3]]
}

pub fn jmp_rel(site: u64, target: u64) -> [u8; 5] {
    let disp = target.wrapping_sub(site + 5) as u32;
    let d = disp.to_le_bytes();
    [0xe9, d[0], d[1], d[2], d[3]]
}

/// `call rax`
pub const CALL_RAX: [u8; 2] = [0xff, 0xd0];

/// `sub rsp, rax` — a dynamic stack adjustment.
pub const SUB_RSP_RAX: [u8; 3] = [0x48, 0x29, 0xc4];

/// Builds the S1 chain `main -> helper -> leaf`, 16-byte frames each.
pub fn chain() -> Vec<u8> {
    let mut b = ElfBuilder::x86_64();
    let leaf = b.slot_addr(0);
    let helper = b.slot_addr(1);
    let main = b.slot_addr(2);
    b.add_function("leaf", &function_body(8, &[]));
    b.add_function("helper", &function_body(8, &call_rel(helper + BODY_OFFSET, leaf)));
    b.add_function("main", &function_body(8, &call_rel(main + BODY_OFFSET, helper)));
    b.build()
}
