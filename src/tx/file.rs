//! Transaction files exchanged between the online and offline machines
//!
//! A file holds one line: the `0x`-prefixed hex of the canonical encoding.
//! The signed file sits next to the unsigned one with `.signed` appended.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! failed write never leaves a truncated transaction behind.

use super::record::{SignedTransaction, UnsignedTransaction};
use crate::error::{AirgapError, AirgapResult};

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SIGNED_SUFFIX: &str = ".signed";

/// Path of the signed file that belongs to `unsigned`
pub fn signed_path(unsigned: &Path) -> PathBuf {
    let mut name = unsigned.as_os_str().to_owned();
    name.push(SIGNED_SUFFIX);
    PathBuf::from(name)
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(text: &str) -> AirgapResult<Vec<u8>> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| AirgapError::MalformedEncoding("missing 0x prefix".to_string()))?;
    hex::decode(digits).map_err(|e| AirgapError::MalformedEncoding(format!("invalid hex: {}", e)))
}

/// Atomically write `bytes` as a hex transaction file
pub fn write_transaction(path: &Path, bytes: &[u8]) -> AirgapResult<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| AirgapError::Validation(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    if let Err(e) = fs::write(&tmp, to_hex(bytes)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn read_transaction(path: &Path) -> AirgapResult<Vec<u8>> {
    let text = fs::read_to_string(path)?;
    from_hex(&text)
}

pub fn read_unsigned(path: &Path) -> AirgapResult<UnsignedTransaction> {
    UnsignedTransaction::decode(&read_transaction(path)?)
}

pub fn write_unsigned(path: &Path, tx: &UnsignedTransaction) -> AirgapResult<()> {
    write_transaction(path, &tx.encoding())
}

pub fn read_signed(path: &Path) -> AirgapResult<SignedTransaction> {
    SignedTransaction::decode(&read_transaction(path)?)
}

/// Write `tx` next to its unsigned source, returning the new path
pub fn write_signed(unsigned_path: &Path, tx: &SignedTransaction) -> AirgapResult<PathBuf> {
    let path = signed_path(unsigned_path);
    write_transaction(&path, &tx.encoding())?;
    Ok(path)
}
