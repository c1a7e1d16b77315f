use crate::{
    errors::InvalidRange,
    frame::{Frame, FrameBand, Pixels, PixelsMut},
    layer::Layer,
    mapping::{
        self, Interior, MappingBand, MappingField, Positions, PositionsMut, SourcePosition,
        PATCH_SIZE,
    },
    mask::Mask,
    Error, RandomGenerator, Vector2, Worker,
};
use std::ops::Range;

/// The radii of the random search around the best position of a pixel.
///
/// The first radius is the larger image dimension, every following one is
/// `decay` times its predecessor but never smaller than `min_radius`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RadiusSchedule {
    pub decay: f32,
    pub min_radius: f32,
}

impl Default for RadiusSchedule {
    fn default() -> Self {
        Self {
            decay: 0.5,
            min_radius: 1.0,
        }
    }
}

impl RadiusSchedule {
    pub fn radii(&self, first: f32, count: u32) -> Vec<f32> {
        let mut radius = first;

        (0..count)
            .map(|_| {
                let current = radius.max(self.min_radius);
                radius *= self.decay;
                current
            })
            .collect()
    }
}

/// Settings of an optimizer run
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OptimizerParams {
    /// Number of random search samples per pixel and pass, one per radius
    pub search_radii: u32,
    /// Number of forward and backward pass pairs
    pub iterations: u32,
    /// Weight of the spatial cost relative to the appearance cost
    pub weight_factor: u32,
    /// Weight of appearance differences on unresolved pixels
    pub border_factor: u32,
    /// Upper bound of the spatial cost
    pub max_spatial_cost: f64,
    /// Render all hole pixels from the initial mapping before the first pass
    pub apply_initial_mapping: bool,
    /// Re-render a pixel as soon as a better mapping is accepted
    pub update_frame: bool,
    pub radius_schedule: RadiusSchedule,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            search_radii: 5,
            iterations: 4,
            weight_factor: 5,
            border_factor: 25,
            max_spatial_cost: f64::from(u32::MAX),
            apply_initial_mapping: true,
            update_frame: true,
            radius_schedule: RadiusSchedule::default(),
        }
    }
}

impl OptimizerParams {
    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.border_factor == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: 1024.0,
                value: 0.0,
                name: "border-factor",
            }));
        }

        let decay = self.radius_schedule.decay;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: 1.0,
                value: decay,
                name: "radius-decay",
            }));
        }

        let min_radius = self.radius_schedule.min_radius;
        if !(min_radius >= 0.0 && min_radius.is_finite()) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: f32::MAX,
                value: min_radius,
                name: "min-radius",
            }));
        }

        if !(self.max_spatial_cost > 0.0 && self.max_spatial_cost.is_finite()) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: f32::MAX,
                value: self.max_spatial_cost as f32,
                name: "max-spatial-cost",
            }));
        }

        Ok(())
    }
}

/// Counters of an optimizer run
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Number of completed iterations
    pub iterations: u32,
    /// Number of legal candidates which were scored
    pub scored: u64,
    /// Number of candidates which improved their pixel
    pub accepted: u64,
}

impl std::ops::AddAssign for OptimizationStats {
    fn add_assign(&mut self, rhs: Self) {
        self.iterations += rhs.iterations;
        self.scored += rhs.scored;
        self.accepted += rhs.accepted;
    }
}

/// The appearance term of the optimizer's cost
pub(crate) trait AppearanceCost: Sync {
    fn cost<P: Pixels>(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        pixels: &P,
        mask: &Mask,
    ) -> u64;
}

/// Appearance measured against the image itself
struct SelfAppearance {
    border_factor: u32,
}

impl AppearanceCost for SelfAppearance {
    #[inline]
    fn cost<P: Pixels>(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        pixels: &P,
        mask: &Mask,
    ) -> u64 {
        mapping::appearance_cost(pixels, mask, x, y, source, self.border_factor)
    }
}

/// Refines the mapping field of a layer by propagation and random search.
///
/// Each iteration runs a forward pass, top to bottom and left to right from a
/// random start row, followed by a backward pass in the opposite direction.
/// Without a worker, passes are strictly sequential and every accepted
/// mapping is visible to the pixels visited after it, which makes the result
/// reproducible from the seed. With a worker, rows are split into bands
/// which are optimized independently against the state at the start of the
/// pass, the result is legal but differs from the sequential one.
#[derive(Copy, Clone, Debug)]
pub struct Optimizer {
    params: OptimizerParams,
}

impl Optimizer {
    pub fn new(params: OptimizerParams) -> Result<Self, Error> {
        params.check()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &OptimizerParams {
        &self.params
    }

    /// Optimizes the mapping of every hole pixel of `layer`, which must have
    /// been initialized before
    pub fn invoke(
        &self,
        layer: &mut Layer<'_>,
        rng: &mut RandomGenerator,
        worker: Option<&Worker>,
    ) -> OptimizationStats {
        let appearance = SelfAppearance {
            border_factor: self.params.border_factor,
        };

        run(&self.params, &appearance, layer, rng, worker)
    }
}

pub(crate) fn run<A: AppearanceCost>(
    params: &OptimizerParams,
    appearance: &A,
    layer: &mut Layer<'_>,
    rng: &mut RandomGenerator,
    worker: Option<&Worker>,
) -> OptimizationStats {
    let mut total = OptimizationStats::default();

    if layer.mask().hole_pixel_count() == 0 {
        return total;
    }

    let worker = worker.filter(|worker| worker.threads() > 1);

    if params.apply_initial_mapping {
        layer.apply_mapping(None, worker);
    }

    let interior = layer.interior();
    let (frame, mask, mapping) = layer.parts_mut();

    let first_radius = frame.width().max(frame.height()) as f32;
    let radii = params.radius_schedule.radii(first_radius, params.search_radii);

    let scorer = Scorer {
        appearance,
        interior,
        radii: &radii,
        weight_factor: f64::from(params.weight_factor),
        max_spatial_cost: params.max_spatial_cost,
        normalization: mapping::appearance_normalization(frame.channels()),
        update_frame: params.update_frame,
    };

    for iteration in 0..params.iterations {
        let mut stats = OptimizationStats {
            iterations: 1,
            ..OptimizationStats::default()
        };

        for &down in &[true, false] {
            match worker {
                Some(worker) => {
                    stats += scorer.parallel_pass(worker, frame, mask, mapping, down, rng);
                }
                None => {
                    let height = frame.height();
                    let row_offset = rng.index(height);
                    let mut local = rng.fork();

                    tracing::trace!(down, row_offset, "optimizer pass");

                    let mut state = PassState {
                        frame: &mut *frame,
                        mask,
                        mapping: &mut *mapping,
                        rng: &mut local,
                        stats: OptimizationStats::default(),
                    };
                    scorer.pass(&mut state, 0..height, down, row_offset);
                    stats += state.stats;
                }
            }
        }

        tracing::debug!(
            iteration,
            scored = stats.scored,
            accepted = stats.accepted,
            "optimizer iteration"
        );

        total += stats;
    }

    total
}

/// The mutable state a single pass works on, either the whole layer or a
/// band of it
struct PassState<'p, F, M> {
    frame: &'p mut F,
    mask: &'p Mask,
    mapping: &'p mut M,
    rng: &'p mut RandomGenerator,
    stats: OptimizationStats,
}

struct Scorer<'c, A> {
    appearance: &'c A,
    interior: Interior,
    radii: &'c [f32],
    weight_factor: f64,
    max_spatial_cost: f64,
    normalization: u64,
    update_frame: bool,
}

impl<A: AppearanceCost> Scorer<'_, A> {
    #[inline]
    fn cost<F: Pixels, M: Positions>(
        &self,
        state: &PassState<'_, F, M>,
        x: u32,
        y: u32,
        source: SourcePosition,
    ) -> f64 {
        let spatial = mapping::spatial_cost(
            &*state.mapping,
            x,
            y,
            source,
            state.mask,
            self.normalization,
            self.max_spatial_cost,
        );
        let appearance = self
            .appearance
            .cost(x, y, source, &*state.frame, state.mask);

        self.weight_factor * spatial + appearance as f64
    }

    /// Visits every hole pixel of `rows`, starting `row_offset` rows into the
    /// range and wrapping around
    fn pass<F: PixelsMut, M: PositionsMut>(
        &self,
        state: &mut PassState<'_, F, M>,
        rows: Range<u32>,
        down: bool,
        row_offset: u32,
    ) {
        let width = state.frame.dims().width;
        let count = rows.end - rows.start;

        for i in 0..count {
            let i = if down { i } else { count - 1 - i };
            let y = rows.start + (i + row_offset) % count;

            for j in 0..width {
                let x = if down { j } else { width - 1 - j };

                if state.mask.is_hole(x, y) {
                    self.optimize_pixel(state, x, y, down);
                }
            }
        }
    }

    fn optimize_pixel<F: PixelsMut, M: PositionsMut>(
        &self,
        state: &mut PassState<'_, F, M>,
        x: u32,
        y: u32,
        down: bool,
    ) {
        let current = state.mapping.position(x, y);
        let mut best = match self.interior.legal(current, state.mask) {
            Some(source) => (current, self.cost(state, x, y, source)),
            None => (current, f64::INFINITY),
        };

        // the neighbors visited right before this pixel, and the shift which
        // continues their mapping onto this pixel
        let (step, shift) = if down { (-1, 1.0) } else { (1, -1.0) };
        let dims = state.frame.dims();
        let (width, height) = (dims.width as i32, dims.height as i32);
        let neighbors = [
            (x as i32 + step, y as i32, Vector2::new(shift, 0.0)),
            (x as i32, y as i32 + step, Vector2::new(0.0, shift)),
        ];

        for &(nx, ny, offset) in &neighbors {
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }

            let (nx, ny) = (nx as u32, ny as u32);
            if state.mask.is_hole(nx, ny) {
                let candidate = state.mapping.position(nx, ny) + offset;
                self.try_candidate(state, x, y, candidate, &mut best);
            }
        }

        for &radius in self.radii {
            let candidate = best.0 + state.rng.vector2(-radius, radius);
            self.try_candidate(state, x, y, candidate, &mut best);
        }
    }

    /// Accepts `candidate` if it is legal and strictly cheaper than `best`
    #[inline]
    fn try_candidate<F: PixelsMut, M: PositionsMut>(
        &self,
        state: &mut PassState<'_, F, M>,
        x: u32,
        y: u32,
        candidate: Vector2,
        best: &mut (Vector2, f64),
    ) {
        if candidate == best.0 {
            return;
        }

        let source = match self.interior.legal(candidate, state.mask) {
            Some(source) => source,
            None => return,
        };

        state.stats.scored += 1;
        let cost = self.cost(state, x, y, source);

        if cost < best.1 {
            *best = (candidate, cost);
            state.mapping.set_position(x, y, candidate);
            state.stats.accepted += 1;

            if self.update_frame {
                mapping::render_pixel(&mut *state.frame, state.mask, x, y, candidate);
            }
        }
    }

    /// Runs one pass with every row band optimized on a private copy of its
    /// own rows, then writes the bands back.
    ///
    /// Reads outside a band go to the state at the start of the pass, which
    /// all bands share.
    fn parallel_pass(
        &self,
        worker: &Worker,
        frame: &mut Frame,
        mask: &Mask,
        mapping: &mut MappingField,
        down: bool,
        rng: &mut RandomGenerator,
    ) -> OptimizationStats {
        let bands = worker.bands(0..frame.height(), PATCH_SIZE);
        let jobs: Vec<_> = bands.into_iter().map(|band| (band, rng.fork())).collect();

        tracing::trace!(down, bands = jobs.len(), "parallel optimizer pass");

        let frame_snapshot: &Frame = frame;
        let mapping_snapshot: &MappingField = mapping;

        let results = worker.execute(jobs, |(band, mut band_rng)| {
            let mut band_frame = FrameBand::new(frame_snapshot, band.clone());
            let mut band_mapping = MappingBand::new(mapping_snapshot, band.clone());
            let row_offset = band_rng.index(band.end - band.start);

            let mut state = PassState {
                frame: &mut band_frame,
                mask,
                mapping: &mut band_mapping,
                rng: &mut band_rng,
                stats: OptimizationStats::default(),
            };
            self.pass(&mut state, band.clone(), down, row_offset);
            let stats = state.stats;

            (band, band_frame.into_rows(), band_mapping.into_rows(), stats)
        });

        let mut stats = OptimizationStats::default();

        for (band, pixels, positions, band_stats) in results {
            for (i, y) in band.clone().enumerate() {
                frame.row_mut(y).copy_from_slice(pixels.row(i as u32));
            }
            mapping.rows_mut(band).copy_from_slice(&positions);
            stats += band_stats;
        }

        stats
    }
}
