//! Scenario random number generator.
//!
//! Each scenario owns exactly one seeded generator. Its internal state is a
//! plain serializable value (a 64-bit seed, a cursor strictly in
//! `[0, 1390]`, and a 1391-word pool), so a halted run can be snapshotted
//! and resumed bit-for-bit. The state shape is externally significant: any
//! serializer sitting on the persistence boundary must preserve it exactly.
//!
//! The generator is the WELL44497b member of the WELL family (Panneton,
//! L'Ecuyer, Matsumoto), a long-period equidistributed generator commonly
//! used by population-simulation stacks. It is **not** cryptographic.

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Pool length in 32-bit words.
const R: usize = 1391;

/// Number of discarded bits in the top word.
const P: u32 = 15;

const MASK_U: u32 = u32::MAX >> (32 - P);
const MASK_L: u32 = !MASK_U;

const M1: usize = 23;
const M2: usize = 481;
const M3: usize = 229;

// Matsumoto-Kurita tempering constants for the "b" variant.
const TEMPER_B: u32 = 0x93dd_1400;
const TEMPER_C: u32 = 0xfa11_8000;

/// Serializable snapshot of a [`Well44497`] generator.
///
/// `cursor` is strictly within `[0, 1390]` and `pool` holds exactly 1391
/// words; both are validated on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    /// The seed the generator was created from.
    pub seed: u64,
    /// Current position in the pool.
    pub cursor: usize,
    /// The 1391-word state pool.
    pub pool: Vec<u32>,
}

/// WELL44497b pseudo-random generator with a serializable state.
///
/// # Examples
///
/// ```
/// use kairos::rng::Well44497;
///
/// let mut a = Well44497::seeded(42);
/// let mut b = Well44497::seeded(42);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Debug, Clone)]
pub struct Well44497 {
    seed: u64,
    cursor: usize,
    pool: Vec<u32>,
}

impl Well44497 {
    /// Creates a generator from a 64-bit seed.
    ///
    /// The pool is filled with the same integer recurrence the reference
    /// implementations use, so equal seeds produce equal streams.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        let mut pool = vec![0u32; R];
        #[allow(clippy::cast_possible_truncation)]
        {
            pool[0] = (seed >> 32) as u32;
            pool[1] = (seed & 0xffff_ffff) as u32;
        }
        for i in 2..R {
            let prev = pool[i - 1];
            #[allow(clippy::cast_possible_truncation)]
            {
                pool[i] = 1_812_433_253u32
                    .wrapping_mul(prev ^ (prev >> 30))
                    .wrapping_add(i as u32);
            }
        }
        Self {
            seed,
            cursor: 0,
            pool,
        }
    }

    /// Returns the seed this generator was created from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Snapshots the full generator state.
    #[must_use]
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            cursor: self.cursor,
            pool: self.pool.clone(),
        }
    }

    /// Restores a generator from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::InvalidRngState` if the cursor is out of
    /// `[0, 1390]` or the pool is not exactly 1391 words.
    pub fn restore(state: RngState) -> Result<Self, ContractError> {
        if state.pool.len() != R {
            return Err(ContractError::InvalidRngState {
                reason: format!("pool has {} words, expected {R}", state.pool.len()),
            });
        }
        if state.cursor >= R {
            return Err(ContractError::InvalidRngState {
                reason: format!("cursor {} out of range [0, {}]", state.cursor, R - 1),
            });
        }
        Ok(Self {
            seed: state.seed,
            cursor: state.cursor,
            pool: state.pool,
        })
    }

    #[inline]
    fn at(&self, offset: usize) -> u32 {
        self.pool[(self.cursor + offset) % R]
    }

    // MAT5(9, 0xb729fcec, 0xfbffffff, 0x00020000) from the WELL reference
    // code: a masked 9-bit rotation with a conditional xor.
    #[inline]
    fn mat5(v: u32) -> u32 {
        let rotated = v.rotate_left(9) & 0xfbff_ffff;
        if v & 0x0002_0000 == 0 {
            rotated
        } else {
            rotated ^ 0xb729_fcec
        }
    }

    /// Produces the next 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        let v0 = self.at(0);
        let vm1 = self.at(M1);
        let vm2 = self.at(M2);
        let vm3 = self.at(M3);
        let vrm1 = self.at(R - 1);
        let vrm2 = self.at(R - 2);

        let z0 = (vrm1 & MASK_L) | (vrm2 & MASK_U);
        let z1 = (v0 ^ (v0 << 24)) ^ (vm1 ^ (vm1 >> 30));
        let z2 = (vm2 ^ (vm2 << 10)) ^ (vm3 << 26);
        let new_v1 = z1 ^ z2;
        let new_v0 = z0 ^ (z1 ^ (z1 >> 20)) ^ Self::mat5(z2) ^ new_v1;

        self.pool[self.cursor] = new_v1;
        let prev = (self.cursor + R - 1) % R;
        self.pool[prev] = new_v0;
        self.cursor = prev;

        // "b" variant output tempering.
        let mut y = new_v0;
        y ^= (y << 7) & TEMPER_B;
        y ^= (y << 15) & TEMPER_C;
        y
    }

    /// Produces the next 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    /// Produces a uniform `f64` in `[0, 1)` with 53 bits of precision.
    pub fn next_f64(&mut self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    /// Produces a uniform boolean.
    pub fn next_bool(&mut self) -> bool {
        self.next_u32() & 1 == 1
    }

    /// Produces a uniform index in `[0, n)` via rejection sampling.
    ///
    /// Returns 0 when `n == 0`.
    pub fn sample_index(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        let bound = n as u64;
        let range = 1u64 << 32;
        if bound <= range {
            let limit = range - (range % bound);
            loop {
                let draw = u64::from(self.next_u32());
                if draw < limit {
                    #[allow(clippy::cast_possible_truncation)]
                    return (draw % bound) as usize;
                }
            }
        }
        // Bounds past 2^32 need a 64-bit draw. `reject` is 2^64 mod bound,
        // computed without overflowing; a 32-bit limit of 0 would otherwise
        // reject every draw.
        let reject = (u64::MAX % bound + 1) % bound;
        loop {
            let draw = self.next_u64();
            if reject == 0 || draw < 0u64.wrapping_sub(reject) {
                #[allow(clippy::cast_possible_truncation)]
                return (draw % bound) as usize;
            }
        }
    }
}
