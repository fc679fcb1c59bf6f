use serde::{Deserialize, Serialize};

/// Small LCG driving every simulator decision, so a seed fully determines a
/// run on any platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Value in `[0, upper_exclusive)`; zero when the range is empty.
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        // High bits of an LCG are far better distributed than low ones.
        (self.next_u64() >> 33) % upper_exclusive
    }

    /// Index into a collection of `len` elements.
    pub fn next_index(&mut self, len: usize) -> usize {
        let bound = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.next_bounded(bound)).unwrap_or(0)
    }

    /// Uniform choice from `items`.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.next_index(items.len()))
    }

    /// Bernoulli trial with integer percent.
    pub fn hit_rate_percent(&mut self, percent: u8) -> bool {
        match percent {
            0 => false,
            100.. => true,
            p => self.next_bounded(100) < u64::from(p),
        }
    }

    /// Index drawn in proportion to `weights`. Falls back to 0 when every
    /// weight is zero.
    pub fn weighted(&mut self, weights: &[u32]) -> usize {
        let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
        let mut roll = self.next_bounded(total);
        for (i, &w) in weights.iter().enumerate() {
            let w = u64::from(w);
            if roll < w {
                return i;
            }
            roll -= w;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = DeterministicRng::new(9);
        let mut b = DeterministicRng::new(9);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn bounded_values_stay_in_range() {
        let mut rng = DeterministicRng::new(1);
        assert_eq!(rng.next_bounded(0), 0);
        for _ in 0..256 {
            assert!(rng.next_bounded(7) < 7);
        }
        assert!(rng.pick::<u8>(&[]).is_none());
    }

    #[test]
    fn zero_weights_are_never_chosen() {
        let mut rng = DeterministicRng::new(3);
        for _ in 0..256 {
            assert_eq!(rng.weighted(&[0, 5, 0]), 1);
        }
    }
}
