use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use std::io::Write;

use crate::Hash;

/// Compute SHA256(SHA256(data))
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Compute SHA256(data)
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Streams bytes into a SHA256 state so objects can be hashed without an
/// intermediate buffer.
#[derive(Clone)]
pub struct HashWriter(Sha256);

impl HashWriter {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn finalize(self) -> [u8; 32] {
        self.0.finalize().into()
    }

    /// Second SHA256 round over the streamed data.
    pub fn finalize_double(self) -> Hash {
        Hash::from(sha256(&self.finalize()))
    }
}

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Default for HashWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Double SHA256 of the borsh encoding of `value`.
pub fn hash_borsh<T: BorshSerialize + ?Sized>(value: &T) -> Hash {
    let mut writer = HashWriter::new();
    value
        .serialize(&mut writer)
        .expect("HashWriter never fails a write");
    writer.finalize_double()
}
