use crate::Vector2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// A seedable, splittable pseudo random number generator.
///
/// All randomness of the completion flows through this type, parallel work
/// obtains its own stream via [`RandomGenerator::fork`] so that a single
/// threaded run is fully reproducible from its seed.
#[derive(Clone, Debug)]
pub struct RandomGenerator {
    rng: Pcg32,
}

impl RandomGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Derives an independent child generator, advancing this one
    pub fn fork(&mut self) -> Self {
        Self::new(self.rng.gen::<u64>())
    }

    /// Uniform value in `[low, high]`
    #[inline]
    pub fn scalar(&mut self, low: f32, high: f32) -> f32 {
        debug_assert!(low <= high);
        self.rng.gen_range(low..=high)
    }

    /// Vector with both elements uniform in `[low, high]`
    #[inline]
    pub fn vector2(&mut self, low: f32, high: f32) -> Vector2 {
        let x = self.scalar(low, high);
        let y = self.scalar(low, high);
        Vector2::new(x, y)
    }

    /// Uniform index in `[0, bound)`, `bound` must not be zero
    #[inline]
    pub fn index(&mut self, bound: u32) -> u32 {
        debug_assert!(bound != 0);
        self.rng.gen_range(0..bound)
    }
}
