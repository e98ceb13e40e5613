//! SplitMix64, hand-rolled rather than taken from `rand`'s internals.
//!
//! The spec requires that the same seed yield an identical sample sequence
//! "across platforms and reimplementations" — a guarantee only a fully
//! specified, dependency-free algorithm can make; `rand`'s own generators make
//! no such cross-version stability promise. SplitMix64 is specified completely
//! by its constants and is trivial to jump ahead deterministically, which is
//! exactly what per-run, per-declaration sub-RNG derivation needs.

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Folds a path of indices (run index, declaration name hash, timestep index, …)
/// into a derived seed, independent of any generator's mutable draw state. Two
/// calls with the same `(root_seed, path)` always return the same seed,
/// regardless of how many values have been drawn from any other generator.
fn derive_seed(root_seed: u64, path: &[u64]) -> u64 {
    let mut h = root_seed;
    for &p in path {
        h = mix64(h.wrapping_add(p).wrapping_add(GOLDEN_GAMMA));
    }
    h
}

/// Hashes a string component of a sub-RNG path (e.g. a declaration name) into a
/// stable `u64` using FNV-1a, so callers can derive sub-RNGs from
/// `(run_index, "variable_name", timestep)` tuples.
pub fn hash_path_component(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

#[derive(Debug, Clone)]
pub struct Rng {
    root_seed: u64,
    state: u64,
}

impl Rng {
    pub fn from_seed(seed: u64) -> Self {
        Self { root_seed: seed, state: seed }
    }

    /// Derives an independent sub-generator from this generator's root seed and
    /// a stable path. Parallelising work across `path` values never changes
    /// results, since each sub-RNG's seed depends only on `(root_seed, path)`.
    pub fn sub_rng(&self, path: &[u64]) -> Rng {
        let seed = derive_seed(self.root_seed, path);
        Rng { root_seed: seed, state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        mix64(self.state)
    }

    /// Uniform draw in `[0, 1)`, using the top 53 bits for full `f64` mantissa precision.
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.next_u64() >> 11;
        bits as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_produces_identical_sequence() {
        let mut a = Rng::from_seed(42);
        let mut b = Rng::from_seed(42);
        let seq_a: Vec<u64> = (0..10).map(|_| a.next_u64()).collect();
        let seq_b: Vec<u64> = (0..10).map(|_| b.next_u64()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Rng::from_seed(1);
        let mut b = Rng::from_seed(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn sub_rng_is_order_independent() {
        let root = Rng::from_seed(7);
        let a = root.sub_rng(&[3, hash_path_component("x")]);
        let b = root.sub_rng(&[3, hash_path_component("x")]);
        assert_eq!(a.root_seed, b.root_seed);
    }

    #[test]
    fn sub_rng_differs_by_path() {
        let root = Rng::from_seed(7);
        let a = root.sub_rng(&[0]);
        let b = root.sub_rng(&[1]);
        assert_ne!(a.root_seed, b.root_seed);
    }

    #[test]
    fn next_f64_stays_in_unit_interval() {
        let mut rng = Rng::from_seed(123);
        for _ in 0..1000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
