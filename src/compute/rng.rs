//! Portable seeded randomness for sequence shuffling.
//!
//! The generator and shuffle are spelled out explicitly so that the same record
//! produces the same DNA on every platform and in every process.

const LCG_MULTIPLIER: u64 = 2862933555777941757;
const LCG_INCREMENT: u64 = 3037000493;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit linear congruential generator.
///
/// `state = state * 2862933555777941757 + 3037000493 (mod 2^64)`; each call
/// returns the updated state.
#[derive(Debug, Clone)]
pub struct SequenceRng {
    state: u64,
}

impl SequenceRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from the FNV-1a hash of a string identifier.
    pub fn from_identifier(id: &str) -> Self {
        Self::new(fnv1a_64(id.as_bytes()))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Fisher-Yates shuffle, walking from the back: for i in (1..len).rev(),
    /// swap i with `next_u64() % (i + 1)`.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

/// FNV-1a 64-bit hash. Stable across runs, unlike `std::hash`.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_first_outputs() {
        let mut rng = SequenceRng::new(0);
        assert_eq!(rng.next_u64(), LCG_INCREMENT);
        let expected = LCG_INCREMENT
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        assert_eq!(rng.next_u64(), expected);
    }

    #[test]
    fn test_fnv_known_vectors() {
        assert_eq!(fnv1a_64(b""), FNV_OFFSET_BASIS);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut items: Vec<u32> = (0..100).collect();
        SequenceRng::new(42).shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(items, sorted, "100 items should not survive a shuffle in order");
    }

    #[test]
    fn test_shuffle_reproducible() {
        let mut a: Vec<u32> = (0..64).collect();
        let mut b = a.clone();
        SequenceRng::from_identifier("habit-1").shuffle(&mut a);
        SequenceRng::from_identifier("habit-1").shuffle(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_short_slices() {
        let mut empty: Vec<u8> = Vec::new();
        SequenceRng::new(1).shuffle(&mut empty);
        let mut one = vec![7u8];
        SequenceRng::new(1).shuffle(&mut one);
        assert_eq!(one, vec![7]);
    }
}
