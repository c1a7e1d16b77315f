use crate::{
    errors::{InvalidRange, SizeMismatch},
    frame::{Frame, Pixels},
    layer::Layer,
    mapping::{self, SourcePosition},
    mask::Mask,
    optimizer::{self, AppearanceCost, OptimizationStats, OptimizerParams},
    Error, RandomGenerator, Worker,
};

/// Relative weights of the two appearance terms of the reference cost
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReferenceWeights {
    /// Weight of the comparison against the image being completed
    pub image: u32,
    /// Weight of the comparison against the reference image
    pub reference: u32,
}

impl Default for ReferenceWeights {
    fn default() -> Self {
        Self {
            image: 1,
            reference: 5,
        }
    }
}

struct ReferenceAppearance<'r> {
    reference: &'r Frame,
    border_factor: u32,
    weights: ReferenceWeights,
}

impl AppearanceCost for ReferenceAppearance<'_> {
    #[inline]
    fn cost<P: Pixels>(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        pixels: &P,
        mask: &Mask,
    ) -> u64 {
        mapping::reference_cost(
            pixels,
            self.reference,
            mask,
            x,
            y,
            source,
            self.border_factor,
            self.weights,
        )
    }
}

/// An [`Optimizer`](crate::Optimizer) whose appearance term also compares
/// every target patch against a second, read only image, e.g. the previous
/// frame of a video or an unmasked rendition of the same scene.
#[derive(Copy, Clone, Debug)]
pub struct ReferenceOptimizer<'r> {
    params: OptimizerParams,
    reference: &'r Frame,
    weights: ReferenceWeights,
}

impl<'r> ReferenceOptimizer<'r> {
    pub fn new(
        params: OptimizerParams,
        reference: &'r Frame,
        weights: ReferenceWeights,
    ) -> Result<Self, Error> {
        params.check()?;

        if weights.image == 0 && weights.reference == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: 1024.0,
                value: 0.0,
                name: "reference-weights",
            }));
        }

        Ok(Self {
            params,
            reference,
            weights,
        })
    }

    #[inline]
    pub fn params(&self) -> &OptimizerParams {
        &self.params
    }

    #[inline]
    pub fn weights(&self) -> ReferenceWeights {
        self.weights
    }

    /// Optimizes the mapping of every hole pixel of `layer`, which must have
    /// been initialized before. Fails if the reference image does not have
    /// the size and channel count of the layer's image.
    pub fn invoke(
        &self,
        layer: &mut Layer<'_>,
        rng: &mut RandomGenerator,
        worker: Option<&Worker>,
    ) -> Result<OptimizationStats, Error> {
        let frame = layer.frame();

        if frame.dims() != self.reference.dims() {
            return Err(Error::SizeMismatch(SizeMismatch {
                what: "reference",
                expected: (frame.width(), frame.height()),
                actual: (self.reference.width(), self.reference.height()),
            }));
        }

        if frame.channels() != self.reference.channels() {
            return Err(Error::ChannelMismatch(frame.channels(), self.reference.channels()));
        }

        let appearance = ReferenceAppearance {
            reference: self.reference,
            border_factor: self.params.border_factor,
            weights: self.weights,
        };

        Ok(optimizer::run(&self.params, &appearance, layer, rng, worker))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Initializer, Optimizer, Rect};

    fn noise_frame(width: u32, height: u32, channels: u32, seed: u64) -> Frame {
        let mut rng = RandomGenerator::new(seed);
        let mut frame = Frame::new(width, height, channels).unwrap();
        for y in 0..height {
            for v in frame.row_mut(y) {
                *v = rng.index(256) as u8;
            }
        }
        frame
    }

    #[test]
    fn rejects_mismatched_reference() {
        let mut mask = Mask::new(12, 12);
        mask.set_hole(Rect::new(5, 5, 2, 2));
        let mut layer = Layer::new(noise_frame(12, 12, 3, 0), &mask).unwrap();

        let smaller = noise_frame(12, 11, 3, 1);
        let optimizer = ReferenceOptimizer::new(
            OptimizerParams::default(),
            &smaller,
            ReferenceWeights::default(),
        )
        .unwrap();
        assert!(matches!(
            optimizer.invoke(&mut layer, &mut RandomGenerator::new(0), None),
            Err(Error::SizeMismatch(_))
        ));

        let gray = noise_frame(12, 12, 1, 1);
        let optimizer =
            ReferenceOptimizer::new(OptimizerParams::default(), &gray, ReferenceWeights::default())
                .unwrap();
        assert!(matches!(
            optimizer.invoke(&mut layer, &mut RandomGenerator::new(0), None),
            Err(Error::ChannelMismatch(3, 1))
        ));
    }

    #[test]
    fn rejects_zero_weights() {
        let reference = noise_frame(8, 8, 1, 0);
        let weights = ReferenceWeights {
            image: 0,
            reference: 0,
        };

        assert!(ReferenceOptimizer::new(OptimizerParams::default(), &reference, weights).is_err());
    }

    #[test]
    fn identical_reference_matches_plain_optimizer() {
        // while the image stays equal to the reference every appearance cost
        // is scaled by the same factor, so without a spatial term all
        // comparisons and therefore all results agree
        let mut mask = Mask::new(20, 20);
        mask.set_hole(Rect::new(8, 8, 4, 4));
        let frame = noise_frame(20, 20, 1, 3);

        let params = OptimizerParams {
            weight_factor: 0,
            apply_initial_mapping: false,
            update_frame: false,
            ..OptimizerParams::default()
        };

        let initialized = || {
            let mut layer = Layer::new(frame.clone(), &mask).unwrap();
            Initializer::new(10, 1)
                .unwrap()
                .invoke(&mut layer, &mut RandomGenerator::new(4), None);
            layer
        };

        let mut plain = initialized();
        Optimizer::new(params)
            .unwrap()
            .invoke(&mut plain, &mut RandomGenerator::new(5), None);

        let reference = frame.clone();
        let weights = ReferenceWeights {
            image: 1,
            reference: 5,
        };
        let mut guided = initialized();
        ReferenceOptimizer::new(params, &reference, weights)
            .unwrap()
            .invoke(&mut guided, &mut RandomGenerator::new(5), None)
            .unwrap();

        assert!(guided.is_mapping_legal());
        assert_eq!(guided.mapping(), plain.mapping());
    }
}
