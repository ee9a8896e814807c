//! ELF loading and symbol extraction.
//!
//! [`Binary::load`] opens a file, validates the header, maps the machine
//! field to a supported architecture, and extracts everything downstream
//! stages need: executable sections with their raw bytes, a function table
//! sorted by address, the import list, and the PLT stub map used to rewrite
//! calls-to-stubs into calls-to-imported-symbols. All file I/O happens
//! here; the rest of the pipeline works on the returned [`Binary`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use goblin::elf::{header, section_header, sym, Elf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arch::Arch;
use crate::model::{Function, Import, Section};

/// Assumed size of one PLT slot. The first slot is the lazy-resolver
/// header and carries no import.
const PLT_ENTRY_SIZE: u64 = 16;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not an ELF file: {0}")]
    NotAnElf(String),
    #[error(
        "truncated ELF: section `{section}` spans {start:#x}..{end:#x} but the file has {len:#x} bytes"
    )]
    TruncatedFile {
        section: String,
        start: u64,
        end: u64,
        len: u64,
    },
    #[error("unsupported architecture (e_machine = {0:#x})")]
    UnsupportedArch(u16),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn capstone(self) -> capstone::Endian {
        match self {
            Endianness::Little => capstone::Endian::Little,
            Endianness::Big => capstone::Endian::Big,
        }
    }
}

/// A loaded and validated ELF image, the context object threaded through
/// the analysis pipeline. Immutable after load.
#[derive(Debug, Clone)]
pub struct Binary {
    pub path: PathBuf,
    pub arch: Arch,
    pub bitness: u8,
    pub endianness: Endianness,
    pub entry_point: u64,
    pub is_shared_object: bool,
    /// Executable sections, raw bytes included.
    pub sections: Vec<Section>,
    /// Internal functions, sorted by address.
    pub functions: Vec<Function>,
    pub imports: Vec<Import>,
    /// PLT stub address -> imported symbol name.
    pub plt_map: BTreeMap<u64, String>,
}

impl Binary {
    /// Reads and parses an ELF file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Binary, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        Self::parse(path, &data)
    }

    /// Parses an in-memory ELF image.
    pub fn parse(path: &Path, data: &[u8]) -> Result<Binary, LoadError> {
        if data.len() < 6 || &data[..4] != b"\x7fELF" {
            return Err(LoadError::NotAnElf("bad magic".into()));
        }
        if !matches!(data[4], 1 | 2) || !matches!(data[5], 1 | 2) {
            return Err(LoadError::NotAnElf("invalid class or data encoding".into()));
        }

        let elf = Elf::parse(data).map_err(|e| LoadError::NotAnElf(e.to_string()))?;

        let arch = map_machine(elf.header.e_machine, elf.is_64)
            .ok_or(LoadError::UnsupportedArch(elf.header.e_machine))?;
        let endianness = if elf.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };

        let sections = extract_sections(&elf, data)?;
        let functions = extract_functions(&elf, &sections);
        let (plt_map, imports) = extract_imports(&elf);

        debug!(
            "loaded {}: {} ({} functions, {} imports, {} executable sections)",
            path.display(),
            arch,
            functions.len(),
            imports.len(),
            sections.len()
        );

        Ok(Binary {
            path: path.to_path_buf(),
            arch,
            bitness: if elf.is_64 { 64 } else { 32 },
            endianness,
            entry_point: elf.entry,
            is_shared_object: elf.header.e_type == header::ET_DYN,
            sections,
            functions,
            imports,
            plt_map,
        })
    }

    /// The internal function whose extent contains `address`, if any.
    pub fn function_at(&self, address: u64) -> Option<&Function> {
        let idx = self
            .functions
            .partition_point(|f| f.address <= address)
            .checked_sub(1)?;
        let f = &self.functions[idx];
        (address < f.address + f.size.max(1)).then_some(f)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name == name || f.aliases.iter().any(|a| a == name))
    }

    pub fn section_containing(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }

    /// Raw bytes of a function body, sliced out of its section.
    pub fn function_bytes(&self, function: &Function) -> Option<&[u8]> {
        // Thumb symbols carry the mode bit in the address.
        let address = if self.arch == Arch::Arm {
            function.address & !1
        } else {
            function.address
        };
        let section = self.section_containing(address)?;
        let start = (address - section.address) as usize;
        let end = start.checked_add(function.size as usize)?.min(section.data.len());
        section.data.get(start..end)
    }
}

fn map_machine(machine: u16, is_64: bool) -> Option<Arch> {
    match machine {
        header::EM_386 => Some(Arch::X86),
        header::EM_X86_64 => Some(Arch::X86_64),
        header::EM_ARM => Some(Arch::Arm),
        header::EM_AARCH64 => Some(Arch::Aarch64),
        header::EM_MIPS => Some(if is_64 { Arch::Mips64 } else { Arch::Mips }),
        header::EM_PPC => Some(Arch::Ppc),
        header::EM_PPC64 => Some(Arch::Ppc64),
        header::EM_RISCV => Some(if is_64 { Arch::Riscv64 } else { Arch::Riscv32 }),
        _ => None,
    }
}

/// Walks the section header table, validating ranges and retaining every
/// executable section together with its bytes.
fn extract_sections(elf: &Elf, data: &[u8]) -> Result<Vec<Section>, LoadError> {
    let mut sections = Vec::new();

    for sh in &elf.section_headers {
        if sh.sh_type == section_header::SHT_NULL || sh.sh_type == section_header::SHT_NOBITS {
            continue;
        }
        let name = elf
            .shdr_strtab
            .get_at(sh.sh_name)
            .unwrap_or_default()
            .to_string();
        if sh.sh_size == 0 {
            continue;
        }

        let start = sh.sh_offset;
        let end = sh.sh_offset.saturating_add(sh.sh_size);
        if end > data.len() as u64 {
            return Err(LoadError::TruncatedFile {
                section: name,
                start,
                end,
                len: data.len() as u64,
            });
        }

        if sh.sh_flags & section_header::SHF_EXECINSTR as u64 != 0 {
            sections.push(Section {
                name,
                address: sh.sh_addr,
                size: sh.sh_size,
                offset: sh.sh_offset,
                executable: true,
                data: data[start as usize..end as usize].to_vec(),
            });
        }
    }

    Ok(sections)
}

/// One symbol-table candidate before alias collapsing.
struct Candidate {
    name: String,
    address: u64,
    size: u64,
    global: bool,
}

fn extract_functions(elf: &Elf, sections: &[Section]) -> Vec<Function> {
    let mut candidates: Vec<Candidate> = Vec::new();

    let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
    for (symtab, strtab) in tables {
        for s in symtab.iter() {
            if !matches!(s.st_type(), sym::STT_FUNC | sym::STT_GNU_IFUNC) {
                continue;
            }
            if s.st_shndx == 0 || s.st_value == 0 {
                continue;
            }
            let Some(name) = strtab.get_at(s.st_name) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            // A size-zero symbol only counts when it points at executable
            // bytes; its extent is repaired below.
            let in_exec = sections.iter().any(|sec| sec.contains(s.st_value & !1));
            if !in_exec {
                continue;
            }
            candidates.push(Candidate {
                name: name.to_string(),
                address: s.st_value,
                size: s.st_size,
                global: matches!(s.st_bind(), sym::STB_GLOBAL | sym::STB_WEAK),
            });
        }
    }

    // Collapse aliases: one function per address, global names preferred as
    // canonical, the rest recorded as aliases.
    let mut by_addr: BTreeMap<u64, Vec<Candidate>> = BTreeMap::new();
    for c in candidates {
        by_addr.entry(c.address).or_default().push(c);
    }

    let mut functions: Vec<Function> = Vec::with_capacity(by_addr.len());
    for (address, mut group) in by_addr {
        group.sort_by(|a, b| b.global.cmp(&a.global).then(a.name.cmp(&b.name)));
        let mut seen = std::collections::BTreeSet::new();
        group.retain(|c| seen.insert(c.name.clone()));
        let size = group.iter().map(|c| c.size).max().unwrap_or(0);
        let canonical = group.remove(0);
        let aliases = group.into_iter().map(|c| c.name).collect();
        let section = sections
            .iter()
            .find(|sec| sec.contains(address & !1))
            .map(|sec| sec.name.clone())
            .unwrap_or_default();
        let demangled = demangle(&canonical.name);
        functions.push(Function {
            name: canonical.name,
            demangled,
            address,
            size,
            section,
            aliases,
        });
    }

    // Repair size-zero extents: until the next symbol or the section end.
    for i in 0..functions.len() {
        if functions[i].size != 0 {
            continue;
        }
        let address = functions[i].address;
        let next = functions.get(i + 1).map(|f| f.address);
        let section_end = sections
            .iter()
            .find(|sec| sec.contains(address & !1))
            .map(|sec| sec.address + sec.size);
        let end = match (next, section_end) {
            (Some(n), Some(e)) => n.min(e),
            (Some(n), None) => n,
            (None, Some(e)) => e,
            (None, None) => address,
        };
        functions[i].size = end.saturating_sub(address);
        debug!(
            "extended size-zero symbol `{}` to {} bytes",
            functions[i].name, functions[i].size
        );
    }

    functions
}

/// Builds the PLT stub map and the import list from the dynamic symbol
/// table and the `.rel.plt`/`.rela.plt` relocations.
fn extract_imports(elf: &Elf) -> (BTreeMap<u64, String>, Vec<Import>) {
    let mut plt_map = BTreeMap::new();

    let plt = find_section(elf, ".plt");
    let plt_sec = find_section(elf, ".plt.sec");

    for (i, reloc) in elf.pltrelocs.iter().enumerate() {
        let Some(s) = elf.dynsyms.get(reloc.r_sym) else {
            continue;
        };
        let Some(name) = elf.dynstrtab.get_at(s.st_name) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        if let Some((addr, size)) = plt {
            let stub = addr + (i as u64 + 1) * PLT_ENTRY_SIZE;
            if stub < addr + size {
                plt_map.insert(stub, name.to_string());
            } else {
                warn!("PLT slot for `{name}` falls outside .plt; skipping");
            }
        }
        if let Some((addr, size)) = plt_sec {
            let stub = addr + i as u64 * PLT_ENTRY_SIZE;
            if stub < addr + size {
                plt_map.insert(stub, name.to_string());
            }
        }
    }

    let mut imports: BTreeMap<String, Import> = BTreeMap::new();
    for s in elf.dynsyms.iter() {
        if s.st_shndx != 0 || !matches!(s.st_type(), sym::STT_FUNC | sym::STT_GNU_IFUNC) {
            continue;
        }
        let Some(name) = elf.dynstrtab.get_at(s.st_name) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let plt_stub = plt_map
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(addr, _)| *addr);
        imports.entry(name.to_string()).or_insert(Import {
            name: name.to_string(),
            plt_stub,
        });
    }

    (plt_map, imports.into_values().collect())
}

fn find_section(elf: &Elf, name: &str) -> Option<(u64, u64)> {
    elf.section_headers.iter().find_map(|sh| {
        (elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
            .then_some((sh.sh_addr, sh.sh_size))
    })
}

/// Best-effort demangling; the raw name is always preserved as identity.
fn demangle(name: &str) -> Option<String> {
    let demangled = rustc_demangle::demangle(name).to_string();
    (demangled != name).then_some(demangled)
}
