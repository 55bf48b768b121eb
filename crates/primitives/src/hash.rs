//! Hashing routines used for tree nodes, content commitments and job identifiers.

use borsh::BorshSerialize;
use digest::Digest;
use sha2::Sha256;

use crate::buf::Buf32;

const NODE_TAG: &[u8] = b"node";

/// Computes the sha256 of a raw byte slice.
pub fn raw(buf: &[u8]) -> Buf32 {
    Buf32(Sha256::digest(buf).into())
}

/// Computes the sha256 of several byte slices, fed in order.
pub fn raw_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Buf32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Buf32(hasher.finalize().into())
}

/// Combines a left and right node into their parent.
pub fn hash_node(left: &Buf32, right: &Buf32) -> Buf32 {
    raw_concat([NODE_TAG, left.as_slice(), right.as_slice()])
}

/// Hashes the borsh encoding of a value.
pub fn compute_borsh_hash<T: BorshSerialize>(v: &T) -> Buf32 {
    let mut hasher = Sha256::new();
    // Writing into a hasher cannot fail, so the result carries no information.
    let _ = borsh::to_writer(&mut DigestWriter(&mut hasher), v);
    Buf32(hasher.finalize().into())
}

struct DigestWriter<'a, D: Digest>(&'a mut D);

impl<D: Digest> std::io::Write for DigestWriter<'_, D> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
