use std::sync::atomic::{AtomicUsize, Ordering};

use arbitrary::{Arbitrary, Unstructured};
use rand::{rngs::OsRng, RngCore};

pub mod fixtures;

const ARB_GEN_LEN: usize = 1 << 20; // 1 MiB

/// Hands out arbitrary instances carved from a shared random buffer.
#[derive(Debug)]
pub struct ArbitraryGenerator {
    buf: Vec<u8>,
    off: AtomicUsize,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::new_with_size(ARB_GEN_LEN)
    }

    pub fn new_with_size(n: usize) -> Self {
        let mut buf = vec![0; n];
        OsRng.fill_bytes(&mut buf);
        ArbitraryGenerator {
            buf,
            off: AtomicUsize::new(0),
        }
    }

    pub fn generate<'a, T: Arbitrary<'a> + Clone>(&'a self) -> T {
        let off = self.off.load(Ordering::Relaxed);
        let mut u = Unstructured::new(&self.buf[off..]);
        let prev_len = u.len();
        let inst = T::arbitrary(&mut u).expect("failed to generate arbitrary instance");
        self.off.store(off + (prev_len - u.len()), Ordering::Relaxed);
        inst
    }
}
