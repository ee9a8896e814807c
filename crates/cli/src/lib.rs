use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use elfscope_core::analysis::QueryError;
use elfscope_core::loader::LoadError;

pub mod commands;

/// Maps an error chain to the documented process exit codes: 2 for bad
/// input, 3 for an unsupported architecture, 4 for an unknown function,
/// 1 for anything else.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(load) = err.downcast_ref::<LoadError>() {
        return match load {
            LoadError::UnsupportedArch(_) => 3,
            _ => 2,
        };
    }
    if err.downcast_ref::<QueryError>().is_some() {
        return 4;
    }
    1
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}
