//! Seeded pseudo-random generator for reproducible workloads.
//!
//! The algorithm is mulberry32 and is fixed: two generators built from the same seed and driven
//! by the same call sequence produce bit-identical output, on every platform and in every
//! implementation that follows the same definition. Do not change it without bumping the
//! recorded reference vectors in the tests.

use loadkit_common::EmptyInputError;
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

const INCREMENT: u32 = 0x6D2B_79F5;
const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone)]
pub struct Prng {
    seed: u32,
    state: u32,
}

impl Prng {
    pub fn new(seed: u32) -> Self {
        Self { seed, state: seed }
    }

    /// Seed from the wall clock (milliseconds, truncated to 32 bits).
    pub fn from_time() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self::new(millis as u32)
    }

    /// The seed this generator was constructed with.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    fn next_raw(&mut self) -> u32 {
        self.state = self.state.wrapping_add(INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform float in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        self.next_raw() as f64 / TWO_POW_32
    }

    /// Integer in `[min, max)`. Callers must ensure `max > min`; otherwise `min` is returned.
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        debug_assert!(max > min, "Prng::int requires max > min (got {min}..{max})");
        if max <= min {
            return min;
        }
        (self.next() * (max - min) as f64).floor() as i64 + min
    }

    /// Index in `[0, len)`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.int(0, len as i64) as usize
    }

    /// Float in `[min, max)`.
    pub fn float(&mut self, min: f64, max: f64) -> f64 {
        self.next() * (max - min) + min
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next() < p
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Result<&'a T, EmptyInputError> {
        if items.is_empty() {
            return Err(EmptyInputError);
        }
        Ok(&items[self.index(items.len())])
    }

    /// In-place Fisher–Yates. Consumes exactly `len - 1` draws, `int(0, i + 1)` for `i` from
    /// `len - 1` down to `1`.
    pub fn shuffle<'a, T>(&mut self, items: &'a mut [T]) -> &'a mut [T] {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
        items
    }
}

impl RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        self.next_raw()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_raw() as u64;
        let lo = self.next_raw() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_raw().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
