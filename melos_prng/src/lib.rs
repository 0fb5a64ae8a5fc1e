// Seeded random source for the melody generator.
//
// xoshiro256++ (Blackman & Vigna, 2019), with the 256-bit state expanded
// from a single u64 by SplitMix64. Written out by hand rather than pulled
// from `rand` so that one seed replays a whole composition bit-for-bit on
// any platform and across dependency upgrades.
//
// `melos_ga` owns exactly one `MelosRng` per run and passes it by `&mut`
// to everything that draws: initial rhythms and pitches, parent choice,
// crossover cut points, mutation triggers and operator selection.
//
// Floats are derived from the integer stream only, never from platform
// math, so optimization level cannot change a run.

use serde::{Deserialize, Serialize};

/// xoshiro256++ state.
///
/// Cloning forks the stream: the clone replays exactly what the original
/// would have produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MelosRng {
    s: [u64; 4],
}

impl MelosRng {
    /// Seed a generator. Equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let mut state = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            *word = splitmix64(&mut state);
        }
        MelosRng { s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let [s0, s1, s2, s3] = self.s;
        let out = s0.wrapping_add(s3).rotate_left(23).wrapping_add(s0);

        let shifted = s1 << 17;
        let s2 = s2 ^ s0;
        let s3 = s3 ^ s1;
        let s1 = s1 ^ s2;
        let s0 = s0 ^ s3;
        self.s = [s0, s1, s2 ^ shifted, s3.rotate_left(45)];

        out
    }

    /// Uniform in [0, 1), 53 bits of precision.
    pub fn next_f64(&mut self) -> f64 {
        const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
        (self.next_u64() >> 11) as f64 * SCALE
    }

    /// Uniform integer in `low..high`, without modulo bias.
    ///
    /// # Panics
    /// If the range is empty.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(high > low, "range_u64: empty range {low}..{high}");
        let span = high - low;
        if span & (span - 1) == 0 {
            return low + (self.next_u64() & (span - 1));
        }
        // Draws below this bound would over-represent small residues.
        let reject_below = span.wrapping_neg() % span;
        let mut draw = self.next_u64();
        while draw < reject_below {
            draw = self.next_u64();
        }
        low + draw % span
    }

    /// `range_u64` for indices.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// True with probability `p`; 0 never fires and 1 always does.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    pub fn coin_flip(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }

    /// Uniform pick from a slice; `None` when it is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        match items.len() {
            0 => None,
            n => items.get(self.range_usize(0, n)),
        }
    }

    /// Pick an index with probability proportional to its weight.
    ///
    /// Walks the cumulative sum once. Negative and NaN weights count as zero.
    /// Returns `None` when no weight is positive. Floating-point slack at the
    /// top of the range lands on the last positive weight.
    pub fn pick_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let clean = |w: f64| if w > 0.0 { w } else { 0.0 };
        let total: f64 = weights.iter().copied().map(clean).sum();
        if total <= 0.0 {
            return None;
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (index, weight) in weights.iter().copied().map(clean).enumerate() {
            if weight == 0.0 {
                continue;
            }
            cumulative += weight;
            last_positive = Some(index);
            if target < cumulative {
                return Some(index);
            }
        }
        last_positive
    }
}

/// One SplitMix64 step; only used to expand seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
