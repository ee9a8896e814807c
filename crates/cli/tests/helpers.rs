use std::fs;

use anyhow::anyhow;
use tempfile::tempdir;

use elfscope_cli::{exit_code_for, sha256_file};
use elfscope_core::analysis::QueryError;
use elfscope_core::loader::LoadError;

#[test]
fn sha256_of_a_known_payload() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("payload.bin");
    fs::write(&path, b"abc").expect("write payload");

    let digest = sha256_file(&path).expect("hashing succeeds");
    assert_eq!(
        digest,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn sha256_of_a_missing_file_fails() {
    let dir = tempdir().expect("tempdir");
    assert!(sha256_file(&dir.path().join("missing")).is_err());
}

#[test]
fn exit_codes_follow_the_error_taxonomy() {
    let not_elf = anyhow::Error::from(LoadError::NotAnElf("bad magic".into()));
    assert_eq!(exit_code_for(&not_elf), 2);

    let truncated = anyhow::Error::from(LoadError::TruncatedFile {
        section: ".text".into(),
        start: 0,
        end: 0x1000,
        len: 0x10,
    });
    assert_eq!(exit_code_for(&truncated), 2);

    let unsupported = anyhow::Error::from(LoadError::UnsupportedArch(0x1234));
    assert_eq!(exit_code_for(&unsupported), 3);

    let unknown = anyhow::Error::from(QueryError::UnknownFunction("main".into()));
    assert_eq!(exit_code_for(&unknown), 4);

    assert_eq!(exit_code_for(&anyhow!("something else broke")), 1);
}

#[test]
fn context_wrapping_preserves_the_exit_code() {
    use anyhow::Context;
    let err = Err::<(), _>(LoadError::UnsupportedArch(7))
        .context("while loading")
        .unwrap_err();
    assert_eq!(exit_code_for(&err), 3);
}
