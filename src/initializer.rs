use crate::{
    errors::InvalidRange,
    frame::Frame,
    layer::Layer,
    mapping::{Interior, MappingField, PATCH_SIZE},
    mask::Mask,
    Error, RandomGenerator, Vector2, Worker,
};
use std::ops::Range;

/// Seeds the mapping field of every hole pixel with the best of a number of
/// random source positions.
///
/// Trials are ranked by the plain SSD of a small patch around the target and
/// the candidate plus half their squared distance, which prefers nearby
/// content. Pixels are independent of each other, so the rows can be split
/// across threads.
#[derive(Copy, Clone, Debug)]
pub struct Initializer {
    trials: u32,
    patch_size: u32,
}

impl Initializer {
    /// `trials` must be at least 1 and `patch_size` one of 1, 3 or 5
    pub fn new(trials: u32, patch_size: u32) -> Result<Self, Error> {
        if trials == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: u32::MAX as f32,
                value: trials as f32,
                name: "initializer-trials",
            }));
        }

        if patch_size % 2 == 0 || patch_size > PATCH_SIZE {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: PATCH_SIZE as f32,
                value: patch_size as f32,
                name: "initializer-patch-size",
            }));
        }

        Ok(Self { trials, patch_size })
    }

    #[inline]
    pub fn trials(&self) -> u32 {
        self.trials
    }

    #[inline]
    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Assigns an initial source position to every hole pixel of `layer`.
    ///
    /// Without a worker the whole image consumes `rng` directly, so the
    /// result is reproducible from the seed. With a worker every row band
    /// draws from its own fork of `rng`.
    pub fn invoke(
        &self,
        layer: &mut Layer<'_>,
        rng: &mut RandomGenerator,
        worker: Option<&Worker>,
    ) {
        self.initialize(layer, rng, worker, false);
    }

    /// Like [`Initializer::invoke`], but only hole pixels whose current
    /// mapping is illegal are initialized, e.g. the ones
    /// [`Layer::adopt`] could not seed
    pub fn fill_illegal(
        &self,
        layer: &mut Layer<'_>,
        rng: &mut RandomGenerator,
        worker: Option<&Worker>,
    ) {
        self.initialize(layer, rng, worker, true);
    }

    fn initialize(
        &self,
        layer: &mut Layer<'_>,
        rng: &mut RandomGenerator,
        worker: Option<&Worker>,
        illegal_only: bool,
    ) {
        let height = layer.frame().height();
        let interior = layer.interior();
        let (frame, mask, mapping) = layer.parts_mut();

        let bands = match worker {
            Some(worker) if worker.threads() > 1 => worker.bands(0..height, 1),
            _ => vec![0..height],
        };

        tracing::debug!(
            hole_pixels = mask.hole_pixel_count(),
            trials = self.trials,
            patch_size = self.patch_size,
            bands = bands.len(),
            illegal_only,
            "initializing mapping"
        );

        match worker {
            Some(worker) if bands.len() > 1 => {
                let jobs: Vec<_> = bands.into_iter().map(|band| (band, rng.fork())).collect();
                let frame: &Frame = frame;
                let snapshot: &MappingField = mapping;

                let results = worker.execute(jobs, |(band, mut band_rng)| {
                    let mut positions = snapshot.rows(band.clone()).to_vec();
                    self.initialize_rows(
                        frame,
                        mask,
                        interior,
                        band.clone(),
                        &mut positions,
                        &mut band_rng,
                        illegal_only,
                    );
                    (band, positions)
                });

                for (band, positions) in results {
                    mapping.rows_mut(band).copy_from_slice(&positions);
                }
            }
            _ => {
                let rows = mapping.rows_mut(0..height);
                self.initialize_rows(frame, mask, interior, 0..height, rows, rng, illegal_only);
            }
        }
    }

    /// Initializes the hole pixels of `rows`, `positions` holds the mapping
    /// entries of exactly those rows
    #[allow(clippy::too_many_arguments)]
    fn initialize_rows(
        &self,
        frame: &Frame,
        mask: &Mask,
        interior: Interior,
        rows: Range<u32>,
        positions: &mut [Vector2],
        rng: &mut RandomGenerator,
        illegal_only: bool,
    ) {
        let width = frame.width();
        let low = interior.low();
        let high = interior.high();

        for (y, row) in rows.zip(positions.chunks_exact_mut(width as usize)) {
            for (x, entry) in (0..width).zip(row.iter_mut()) {
                if !mask.is_hole(x, y) {
                    continue;
                }

                if illegal_only && interior.legal(*entry, mask).is_some() {
                    continue;
                }

                let target = Vector2::new(x as f32, y as f32);
                let mut best: Option<(f32, Vector2)> = None;
                let mut remaining = self.trials;

                // the first legal trial always counts, the remaining ones
                // may be rejected
                while remaining > 0 {
                    let candidate = Vector2::new(rng.scalar(low, high.x), rng.scalar(low, high.y));

                    let legal = interior.legal(candidate, mask);
                    if legal.is_none() && best.is_none() {
                        continue;
                    }
                    remaining -= 1;

                    if legal.is_none() {
                        continue;
                    }

                    let cost = self.trial_cost(frame, x, y, candidate)
                        + 0.5 * target.sqr_distance(candidate);

                    if best.map_or(true, |(best_cost, _)| cost < best_cost) {
                        best = Some((cost, candidate));
                    }
                }

                if let Some((_, position)) = best {
                    *entry = position;
                }
            }
        }
    }

    /// SSD between the target patch and the patch of the nearest pixel of
    /// `candidate`, without any border weighting
    fn trial_cost(&self, frame: &Frame, x: u32, y: u32, candidate: Vector2) -> f32 {
        let r = (self.patch_size / 2) as i32;
        let (sx, sy) = candidate.rounded();
        let (x, y) = (x as i32, y as i32);

        let mut ssd = 0u32;
        for dy in -r..=r {
            for dx in -r..=r {
                let target = frame.mirrored(x + dx, y + dy);
                let source = frame.mirrored(sx + dx, sy + dy);

                for (&t, &s) in target.iter().zip(source) {
                    let diff = i32::from(t) - i32::from(s);
                    ssd += (diff * diff) as u32;
                }
            }
        }

        ssd as f32
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Rect;

    fn gradient_layer(mask: &Mask) -> Layer<'_> {
        let mut frame = Frame::new(mask.width(), mask.height(), 1).unwrap();
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                frame.pixel_mut(x, y)[0] = (x * 7 + y * 3) as u8;
            }
        }
        Layer::new(frame, mask).unwrap()
    }

    #[test]
    fn validates_parameters() {
        assert!(Initializer::new(0, 1).is_err());
        assert!(Initializer::new(10, 2).is_err());
        assert!(Initializer::new(10, 7).is_err());
        assert!(Initializer::new(1, 5).is_ok());
    }

    #[test]
    fn every_hole_pixel_is_legal() {
        let mut mask = Mask::new(20, 20);
        mask.set_hole(Rect::new(8, 8, 4, 4));

        for &patch_size in &[1, 3, 5] {
            let mut layer = gradient_layer(&mask);
            Initializer::new(100, patch_size)
                .unwrap()
                .invoke(&mut layer, &mut RandomGenerator::new(0), None);

            assert!(layer.is_mapping_legal());
        }
    }

    #[test]
    fn single_trial_is_legal_next_to_corners() {
        let mut mask = Mask::new(16, 12);
        for &(x, y) in &[(0, 0), (15, 0), (0, 11), (15, 11)] {
            mask.set_hole(Rect::new(x, y, 1, 1));
        }

        let mut layer = gradient_layer(&mask);
        Initializer::new(1, 1)
            .unwrap()
            .invoke(&mut layer, &mut RandomGenerator::new(5), None);

        assert!(layer.is_mapping_legal());
    }

    #[test]
    fn same_seed_same_mapping() {
        let mut mask = Mask::new(24, 18);
        mask.set_hole(Rect::new(5, 6, 9, 4));

        let run = || {
            let mut layer = gradient_layer(&mask);
            Initializer::new(20, 3)
                .unwrap()
                .invoke(&mut layer, &mut RandomGenerator::new(77), None);
            layer.into_parts().1
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn threaded_bands_are_legal() {
        let mut mask = Mask::new(32, 32);
        mask.set_hole(Rect::new(10, 4, 12, 24));

        let mut layer = gradient_layer(&mask);
        Initializer::new(30, 1).unwrap().invoke(
            &mut layer,
            &mut RandomGenerator::new(1),
            Some(&Worker::new(4)),
        );

        assert!(layer.is_mapping_legal());
    }

    #[test]
    fn resolved_entries_stay_untouched() {
        let mut mask = Mask::new(12, 12);
        mask.set_hole(Rect::new(5, 5, 2, 2));

        let mut layer = gradient_layer(&mask);
        Initializer::new(10, 1)
            .unwrap()
            .invoke(&mut layer, &mut RandomGenerator::new(2), None);

        assert_eq!(layer.mapping().position(0, 0), Vector2::default());
        assert_eq!(layer.mapping().position(11, 11), Vector2::default());
    }

    #[test]
    fn fill_illegal_keeps_legal_entries() {
        let mut mask = Mask::new(16, 16);
        mask.set_hole(Rect::new(6, 6, 3, 3));

        let mut layer = gradient_layer(&mask);
        let kept = Vector2::new(3.0, 12.0);
        layer.mapping_mut().set_position(6, 6, kept);
        // inside the hole, so illegal
        layer.mapping_mut().set_position(7, 7, Vector2::new(7.0, 7.0));

        Initializer::new(10, 1)
            .unwrap()
            .fill_illegal(&mut layer, &mut RandomGenerator::new(3), None);

        assert!(layer.is_mapping_legal());
        assert_eq!(layer.mapping().position(6, 6), kept);
        assert_ne!(layer.mapping().position(7, 7), Vector2::new(7.0, 7.0));
    }
}
