//! The per-pixel mapping field and the cost model scoring its entries

use crate::{
    frame::{self, BilinearSample, Frame, Pixels, PixelsMut, MAX_CHANNELS},
    mask::{Mask, NON_HOLE},
    reference::ReferenceWeights,
    Dims, Rect, Vector2, Worker,
};
use std::ops::Range;

/// Edge length of the square patch the appearance cost compares
pub const PATCH_SIZE: u32 = 5;
/// Distance from the patch center to its edge
pub const PATCH_RADIUS: u32 = PATCH_SIZE / 2;

const PATCH_AREA: u64 = (PATCH_SIZE * PATCH_SIZE) as u64;
const PATCH_BUFFER: usize = (PATCH_SIZE * PATCH_SIZE * MAX_CHANNELS) as usize;

/// The region a source position must lie in so that a full patch around it
/// can be sampled without leaving the image.
///
/// A position `p` is inside if `radius <= p < dim - radius - 1` holds on both
/// axes, which keeps the bilinear footprint of every patch sample in bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interior {
    width: u32,
    height: u32,
    radius: u32,
}

impl Interior {
    pub fn new(width: u32, height: u32, radius: u32) -> Self {
        Self {
            width,
            height,
            radius,
        }
    }

    /// The interior for the appearance patch of an image
    pub fn for_dims(dims: Dims) -> Self {
        Self::new(dims.width, dims.height, PATCH_RADIUS)
    }

    /// Lower bound of valid positions on both axes
    #[inline]
    pub fn low(&self) -> f32 {
        self.radius as f32
    }

    /// Exclusive upper bounds of valid positions
    #[inline]
    pub fn high(&self) -> Vector2 {
        Vector2::new(
            self.width as f32 - self.radius as f32 - 1.0,
            self.height as f32 - self.radius as f32 - 1.0,
        )
    }

    #[inline]
    pub fn contains(&self, position: Vector2) -> bool {
        let high = self.high();
        let low = self.low();

        position.x >= low && position.y >= low && position.x < high.x && position.y < high.y
    }

    /// Returns the position as a legal source if it is inside the interior and
    /// rounds onto a resolved pixel of `mask`
    #[inline]
    pub fn legal(&self, position: Vector2, mask: &Mask) -> Option<SourcePosition> {
        if !self.contains(position) {
            return None;
        }

        let (x, y) = position.rounded();
        if mask.is_hole(x as u32, y as u32) {
            return None;
        }

        Some(SourcePosition(position))
    }

    /// Whether any pixel a legal position can round to is resolved
    pub fn has_source_pixels(&self, mask: &Mask) -> bool {
        let r = self.radius;
        if self.width < 2 * r + 2 || self.height < 2 * r + 2 {
            return false;
        }

        (r..self.height - r).any(|y| (r..self.width - r).any(|x| !mask.is_hole(x, y)))
    }
}

/// A sub-pixel position known to be legal for the mask it was checked
/// against, only [`Interior::legal`] creates these
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SourcePosition(Vector2);

impl SourcePosition {
    #[inline]
    pub fn position(self) -> Vector2 {
        self.0
    }
}

impl From<SourcePosition> for Vector2 {
    fn from(source: SourcePosition) -> Self {
        source.0
    }
}

/// One sub-pixel source position per pixel of the image.
///
/// Only the entries of hole pixels carry meaning, all other entries are left
/// at their initial value.
#[derive(Clone, Debug, PartialEq)]
pub struct MappingField {
    positions: Vec<Vector2>,
    width: u32,
    height: u32,
}

impl MappingField {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            positions: vec![Vector2::default(); width as usize * height as usize],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn position(&self, x: u32, y: u32) -> Vector2 {
        self.positions[self.index(x, y)]
    }

    /// Overwrites an entry, legality of `position` is up to the caller
    #[inline]
    pub fn set_position(&mut self, x: u32, y: u32, position: Vector2) {
        let ind = self.index(x, y);
        self.positions[ind] = position;
    }

    pub(crate) fn rows(&self, rows: Range<u32>) -> &[Vector2] {
        let width = self.width as usize;
        &self.positions[rows.start as usize * width..rows.end as usize * width]
    }

    pub(crate) fn rows_mut(&mut self, rows: Range<u32>) -> &mut [Vector2] {
        let width = self.width as usize;
        &mut self.positions[rows.start as usize * width..rows.end as usize * width]
    }

    /// Squared difference between the patch around the target pixel and the
    /// bilinearly resampled patch around `source`, normalized so that it can
    /// be compared against [`MappingField::spatial_cost_4_neighborhood`].
    ///
    /// Patch offsets reaching past the image border are mirrored back, and
    /// every offset whose mask value is not resolved weighs `border_factor`
    /// times.
    pub fn appearance_cost(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        frame: &Frame,
        mask: &Mask,
        border_factor: u32,
    ) -> u64 {
        debug_assert_eq!(frame.dims(), self.dims());
        appearance_cost(frame, mask, x, y, source, border_factor)
    }

    /// Appearance cost against the image itself plus appearance cost against
    /// `reference`, each normalized on its own and weighted by `weights`.
    ///
    /// Both terms share one resampled source patch taken from `frame`, so for
    /// a reference identical to `frame` the result is exactly
    /// `(weights.image + weights.reference) * appearance_cost`.
    #[allow(clippy::too_many_arguments)]
    pub fn appearance_reference_cost(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        frame: &Frame,
        reference: &Frame,
        mask: &Mask,
        border_factor: u32,
        weights: ReferenceWeights,
    ) -> u64 {
        debug_assert_eq!(frame.dims(), self.dims());
        reference_cost(frame, reference, mask, x, y, source, border_factor, weights)
    }

    /// Spatial coherence of `source` with the current mappings of the four
    /// direct neighbors which are holes themselves.
    ///
    /// Each such neighbor predicts its own mapping shifted back by one pixel
    /// toward the target, the cost is the smallest squared distance between
    /// `source` and any prediction, scaled by `appearance_normalization` and
    /// capped at `max_cost`. Without any hole neighbor the cost is `max_cost`.
    pub fn spatial_cost_4_neighborhood(
        &self,
        x: u32,
        y: u32,
        source: SourcePosition,
        mask: &Mask,
        appearance_normalization: u64,
        max_cost: f64,
    ) -> f64 {
        spatial_cost(self, x, y, source, mask, appearance_normalization, max_cost)
    }

    /// Scale applied to appearance costs, the squared image diagonal
    #[inline]
    pub fn spatial_normalization(&self) -> u64 {
        spatial_normalization(self.dims())
    }

    /// Renders every hole pixel inside `rect` from its mapping.
    ///
    /// A rendered value only depends on the mapping and the resolved pixels
    /// of the frame, so applying the same mapping again yields the same frame
    /// regardless of visiting order or the number of threads.
    pub fn apply_mapping(
        &self,
        frame: &mut Frame,
        mask: &Mask,
        rect: Rect,
        worker: Option<&Worker>,
    ) {
        debug_assert!(rect.right_end() <= self.width && rect.bottom_end() <= self.height);

        let rows = rect.top..rect.bottom_end();

        let worker = match worker {
            Some(worker) if worker.threads() > 1 => worker,
            _ => {
                for y in rows {
                    for x in rect.left..rect.right_end() {
                        if mask.is_hole(x, y) {
                            render_pixel(frame, mask, x, y, self.position(x, y));
                        }
                    }
                }
                return;
            }
        };

        let bands = worker.bands(rows, 1);
        let channels = frame.channels() as usize;
        let snapshot: &Frame = frame;

        let rendered = worker.execute(bands, |band| {
            let mut values = Vec::with_capacity(
                (band.end - band.start) as usize * rect.width as usize * channels,
            );
            let mut value = [0u8; MAX_CHANNELS as usize];

            for y in band.clone() {
                for x in rect.left..rect.right_end() {
                    if mask.is_hole(x, y) {
                        let position = self.position(x, y);
                        resolved_sample(snapshot, mask, position, &mut value[..channels]);
                        values.extend_from_slice(&value[..channels]);
                    }
                }
            }

            (band, values)
        });

        for (band, values) in rendered {
            let mut values = values.chunks_exact(channels);

            for y in band {
                for x in rect.left..rect.right_end() {
                    if mask.is_hole(x, y) {
                        if let Some(value) = values.next() {
                            frame.pixel_mut(x, y).copy_from_slice(value);
                        }
                    }
                }
            }
        }
    }
}

/// Read access to the entries of a mapping which may be stitched together
/// from more than one buffer
pub(crate) trait Positions {
    fn dims(&self) -> Dims;
    fn position(&self, x: u32, y: u32) -> Vector2;
}

pub(crate) trait PositionsMut: Positions {
    fn set_position(&mut self, x: u32, y: u32, position: Vector2);
}

impl Positions for MappingField {
    #[inline]
    fn dims(&self) -> Dims {
        MappingField::dims(self)
    }

    #[inline]
    fn position(&self, x: u32, y: u32) -> Vector2 {
        MappingField::position(self, x, y)
    }
}

impl PositionsMut for MappingField {
    #[inline]
    fn set_position(&mut self, x: u32, y: u32, position: Vector2) {
        MappingField::set_position(self, x, y, position);
    }
}

/// A private copy of a band of mapping rows laid over a shared mapping, the
/// counterpart of [`FrameBand`](crate::frame::FrameBand)
pub(crate) struct MappingBand<'m> {
    shared: &'m MappingField,
    rows: Vec<Vector2>,
    top: u32,
}

impl<'m> MappingBand<'m> {
    pub(crate) fn new(shared: &'m MappingField, band: Range<u32>) -> Self {
        Self {
            shared,
            rows: shared.rows(band.clone()).to_vec(),
            top: band.start,
        }
    }

    #[inline]
    fn band_index(&self, x: u32, y: u32) -> Option<usize> {
        let width = self.shared.width as usize;
        let row = y.checked_sub(self.top)? as usize;

        if row * width < self.rows.len() {
            Some(row * width + x as usize)
        } else {
            None
        }
    }

    /// The band entries, row by row starting at the top row of the band
    pub(crate) fn into_rows(self) -> Vec<Vector2> {
        self.rows
    }
}

impl Positions for MappingBand<'_> {
    #[inline]
    fn dims(&self) -> Dims {
        self.shared.dims()
    }

    #[inline]
    fn position(&self, x: u32, y: u32) -> Vector2 {
        match self.band_index(x, y) {
            Some(ind) => self.rows[ind],
            None => self.shared.position(x, y),
        }
    }
}

impl PositionsMut for MappingBand<'_> {
    #[inline]
    fn set_position(&mut self, x: u32, y: u32, position: Vector2) {
        let ind = self.band_index(x, y);
        debug_assert!(ind.is_some(), "row {} is outside the band", y);

        if let Some(ind) = ind {
            self.rows[ind] = position;
        }
    }
}

/// See [`MappingField::appearance_cost`]
pub(crate) fn appearance_cost<P: Pixels>(
    pixels: &P,
    mask: &Mask,
    x: u32,
    y: u32,
    source: SourcePosition,
    border_factor: u32,
) -> u64 {
    let channels = pixels.channels() as usize;

    let mut patch = [0u8; PATCH_BUFFER];
    let patch = &mut patch[..PATCH_AREA as usize * channels];
    frame::interpolate_patch(pixels, source.position(), PATCH_SIZE, patch);

    let ssd = patch_ssd(pixels, mask, x, y, patch, border_factor);
    normalize_appearance(ssd, spatial_normalization(pixels.dims()))
}

/// See [`MappingField::appearance_reference_cost`]
#[allow(clippy::too_many_arguments)]
pub(crate) fn reference_cost<P: Pixels>(
    pixels: &P,
    reference: &Frame,
    mask: &Mask,
    x: u32,
    y: u32,
    source: SourcePosition,
    border_factor: u32,
    weights: ReferenceWeights,
) -> u64 {
    debug_assert!(pixels.dims() == reference.dims() && pixels.channels() == reference.channels());
    let channels = pixels.channels() as usize;

    let mut patch = [0u8; PATCH_BUFFER];
    let patch = &mut patch[..PATCH_AREA as usize * channels];
    frame::interpolate_patch(pixels, source.position(), PATCH_SIZE, patch);

    let normalization = spatial_normalization(pixels.dims());

    let own = normalize_appearance(
        patch_ssd(pixels, mask, x, y, patch, border_factor),
        normalization,
    );
    let fidelity = normalize_appearance(
        patch_ssd(reference, mask, x, y, patch, border_factor),
        normalization,
    );

    u64::from(weights.image) * own + u64::from(weights.reference) * fidelity
}

/// See [`MappingField::spatial_cost_4_neighborhood`]
pub(crate) fn spatial_cost<M: Positions>(
    mapping: &M,
    x: u32,
    y: u32,
    source: SourcePosition,
    mask: &Mask,
    appearance_normalization: u64,
    max_cost: f64,
) -> f64 {
    let Dims { width, height } = mapping.dims();
    let source = source.position();
    let (sx, sy) = (f64::from(source.x), f64::from(source.y));

    let sqr_distance = |nx: u32, ny: u32, shift_x: f64, shift_y: f64| {
        let neighbor = mapping.position(nx, ny);
        let dx = f64::from(neighbor.x) + shift_x - sx;
        let dy = f64::from(neighbor.y) + shift_y - sy;
        dx * dx + dy * dy
    };

    let mut best = max_cost;

    if y > 0 && mask.is_hole(x, y - 1) {
        best = best.min(sqr_distance(x, y - 1, 0.0, 1.0));
    }
    if x > 0 && mask.is_hole(x - 1, y) {
        best = best.min(sqr_distance(x - 1, y, 1.0, 0.0));
    }
    if x + 1 < width && mask.is_hole(x + 1, y) {
        best = best.min(sqr_distance(x + 1, y, -1.0, 0.0));
    }
    if y + 1 < height && mask.is_hole(x, y + 1) {
        best = best.min(sqr_distance(x, y + 1, 0.0, -1.0));
    }

    (best * appearance_normalization as f64).min(max_cost)
}

#[inline]
fn spatial_normalization(dims: Dims) -> u64 {
    u64::from(dims.width) * u64::from(dims.width) + u64::from(dims.height) * u64::from(dims.height)
}

/// Scale applied to spatial costs, the largest possible squared difference of
/// a single pixel
#[inline]
pub fn appearance_normalization(channels: u32) -> u64 {
    u64::from(channels) * 255 * 255
}

#[inline]
fn normalize_appearance(ssd: u64, spatial_normalization: u64) -> u64 {
    ssd * spatial_normalization / PATCH_AREA
}

/// Border weighted SSD between the 5x5 patch of `target` around `(x, y)` and
/// an already sampled source `patch`
fn patch_ssd<P: Pixels>(
    target: &P,
    mask: &Mask,
    x: u32,
    y: u32,
    patch: &[u8],
    border_factor: u32,
) -> u64 {
    match target.channels() {
        1 => patch_ssd_n::<1, P>(target, mask, x, y, patch, border_factor),
        2 => patch_ssd_n::<2, P>(target, mask, x, y, patch, border_factor),
        3 => patch_ssd_n::<3, P>(target, mask, x, y, patch, border_factor),
        _ => patch_ssd_n::<4, P>(target, mask, x, y, patch, border_factor),
    }
}

#[inline]
fn patch_ssd_n<const CHANNELS: usize, P: Pixels>(
    target: &P,
    mask: &Mask,
    x: u32,
    y: u32,
    patch: &[u8],
    border_factor: u32,
) -> u64 {
    let r = PATCH_RADIUS as i32;
    let (x, y) = (x as i32, y as i32);

    let mut sum = 0u64;
    let mut samples = patch.chunks_exact(CHANNELS);

    for dy in -r..=r {
        for dx in -r..=r {
            let target_pixel = target.mirrored(x + dx, y + dy);
            let source_pixel = match samples.next() {
                Some(source_pixel) => source_pixel,
                None => return sum,
            };

            let mut ssd = 0u64;
            for c in 0..CHANNELS {
                let diff = i32::from(target_pixel[c]) - i32::from(source_pixel[c]);
                ssd += (diff * diff) as u64;
            }

            if mask.mirrored_value(x + dx, y + dy) != NON_HOLE {
                ssd *= u64::from(border_factor);
            }

            sum += ssd;
        }
    }

    sum
}

/// Bilinear sample at `position` restricted to the resolved pixels of its
/// footprint, with the weights renormalized over those pixels
pub(crate) fn resolved_sample<P: Pixels>(
    frame: &P,
    mask: &Mask,
    position: Vector2,
    out: &mut [u8],
) {
    let sample = BilinearSample::new(frame.dims(), position);
    let footprint = sample.footprint(0, 0);

    let mut sums = [0u32; MAX_CHANNELS as usize];
    let mut total_weight = 0u32;

    for &((fx, fy), weight) in &footprint {
        if weight == 0 || mask.is_hole(fx, fy) {
            continue;
        }

        total_weight += weight;
        for (sum, &value) in sums.iter_mut().zip(frame.pixel(fx, fy)) {
            *sum += u32::from(value) * weight;
        }
    }

    if total_weight == 0 {
        // only reachable for illegal positions, fall back to plain sampling
        sample.interpolate(frame, 0, 0, out);
        return;
    }

    for (value, sum) in out.iter_mut().zip(&sums) {
        *value = ((sum + total_weight / 2) / total_weight) as u8;
    }
}

/// Re-renders a single hole pixel from `position`
#[inline]
pub(crate) fn render_pixel<P: PixelsMut>(
    frame: &mut P,
    mask: &Mask,
    x: u32,
    y: u32,
    position: Vector2,
) {
    debug_assert!(mask.is_hole(x, y));

    let channels = frame.channels() as usize;
    let mut value = [0u8; MAX_CHANNELS as usize];
    resolved_sample(frame, mask, position, &mut value[..channels]);
    frame.pixel_mut(x, y).copy_from_slice(&value[..channels]);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RandomGenerator;

    fn random_frame(width: u32, height: u32, channels: u32, seed: u64) -> Frame {
        let mut rng = RandomGenerator::new(seed);
        let mut frame = Frame::new(width, height, channels).unwrap();
        for y in 0..height {
            for v in frame.row_mut(y) {
                *v = rng.index(256) as u8;
            }
        }
        frame
    }

    fn holed_mask(width: u32, height: u32, hole: Rect) -> Mask {
        let mut mask = Mask::new(width, height);
        mask.set_hole(hole);
        mask
    }

    #[test]
    fn interior_bounds() {
        let interior = Interior::new(10, 8, 2);

        assert!(interior.contains(Vector2::new(2.0, 2.0)));
        assert!(interior.contains(Vector2::new(6.99, 4.99)));
        assert!(!interior.contains(Vector2::new(7.0, 3.0)));
        assert!(!interior.contains(Vector2::new(3.0, 5.0)));
        assert!(!interior.contains(Vector2::new(1.99, 3.0)));
    }

    #[test]
    fn legal_positions_avoid_holes() {
        let mask = holed_mask(12, 12, Rect::new(4, 4, 3, 3));
        let interior = Interior::for_dims(mask.dims());

        assert!(interior.legal(Vector2::new(5.0, 5.0), &mask).is_none());
        // rounds to (4, 4)
        assert!(interior.legal(Vector2::new(3.6, 3.6), &mask).is_none());
        assert!(interior.legal(Vector2::new(3.4, 3.6), &mask).is_some());
        assert!(interior.legal(Vector2::new(0.0, 0.0), &mask).is_none());
    }

    #[test]
    fn source_pixels_require_resolved_interior() {
        let full = holed_mask(8, 8, Rect::new(2, 2, 4, 4));
        assert!(!Interior::for_dims(full.dims()).has_source_pixels(&full));

        let partial = holed_mask(8, 8, Rect::new(2, 2, 3, 4));
        assert!(Interior::for_dims(partial.dims()).has_source_pixels(&partial));
    }

    #[test]
    fn identical_patch_costs_nothing() {
        let frame = random_frame(16, 16, 3, 1);
        let mask = holed_mask(16, 16, Rect::new(12, 12, 2, 2));
        let mapping = MappingField::new(16, 16);
        let interior = Interior::for_dims(mask.dims());

        let source = interior.legal(Vector2::new(6.0, 7.0), &mask).unwrap();
        assert_eq!(mapping.appearance_cost(6, 7, source, &frame, &mask, 25), 0);

        let other = interior.legal(Vector2::new(8.0, 7.0), &mask).unwrap();
        assert!(mapping.appearance_cost(6, 7, other, &frame, &mask, 25) > 0);
    }

    #[test]
    fn border_factor_weighs_unresolved_offsets() {
        let frame = random_frame(16, 16, 1, 2);
        let mask = holed_mask(16, 16, Rect::new(6, 6, 3, 3));
        let mapping = MappingField::new(16, 16);
        let interior = Interior::for_dims(mask.dims());
        let source = interior.legal(Vector2::new(11.25, 3.5), &mask).unwrap();

        let unweighted = mapping.appearance_cost(7, 7, source, &frame, &mask, 1);
        let weighted = mapping.appearance_cost(7, 7, source, &frame, &mask, 10);
        assert!(weighted > unweighted);

        // a target far away from the hole is not affected
        let a = mapping.appearance_cost(12, 12, source, &frame, &mask, 1);
        let b = mapping.appearance_cost(12, 12, source, &frame, &mask, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn border_factor_scales_hole_offsets_only() {
        let mask = holed_mask(16, 16, Rect::new(6, 6, 3, 3));
        let mapping = MappingField::new(16, 16);
        let interior = Interior::for_dims(mask.dims());
        // a source patch of plain 100s
        let source = interior.legal(Vector2::new(3.0, 12.0), &mask).unwrap();

        // only the 9 hole pixels of the target patch differ from the source
        let mut holed = Frame::filled(16, 16, 1, 100);
        holed.sub_frame_set_value(6, 6, 3, 3, &[50]);
        let plain = mapping.appearance_cost(7, 7, source, &holed, &mask, 1);
        assert_eq!(plain, 9 * 2500 * 512 / 25);
        assert_eq!(mapping.appearance_cost(7, 7, source, &holed, &mask, 10), 10 * plain);

        // only a resolved pixel of the target patch differs
        let mut resolved = Frame::filled(16, 16, 1, 100);
        resolved.pixel_mut(5, 5)[0] = 50;
        let plain = mapping.appearance_cost(7, 7, source, &resolved, &mask, 1);
        assert_eq!(plain, 2500 * 512 / 25);
        assert_eq!(mapping.appearance_cost(7, 7, source, &resolved, &mask, 10), plain);
    }

    #[test]
    fn mirrored_patch_at_corners() {
        let frame = random_frame(10, 10, 2, 3);
        let mask = holed_mask(10, 10, Rect::new(0, 0, 1, 1));
        let mapping = MappingField::new(10, 10);
        let interior = Interior::for_dims(mask.dims());
        let source = interior.legal(Vector2::new(4.5, 5.5), &mask).unwrap();

        for &(x, y) in &[(0, 0), (9, 0), (0, 9), (9, 9)] {
            let cost = mapping.appearance_cost(x, y, source, &frame, &mask, 25);
            assert!(cost < u64::MAX / 2);
        }
    }

    #[test]
    fn reference_cost_of_identical_frames() {
        let frame = random_frame(20, 14, 4, 4);
        let reference = frame.clone();
        let mask = holed_mask(20, 14, Rect::new(8, 5, 4, 4));
        let mapping = MappingField::new(20, 14);
        let interior = Interior::for_dims(mask.dims());
        let weights = ReferenceWeights::default();

        let mut rng = RandomGenerator::new(9);
        for _ in 0..50 {
            let position = Vector2::new(rng.scalar(2.0, 16.9), rng.scalar(2.0, 10.9));
            let source = match interior.legal(position, &mask) {
                Some(source) => source,
                None => continue,
            };

            for &(x, y) in &[(9, 6), (11, 8), (0, 0), (19, 13)] {
                let plain = mapping.appearance_cost(x, y, source, &frame, &mask, 25);
                let combined = mapping.appearance_reference_cost(
                    x, y, source, &frame, &reference, &mask, 25, weights,
                );

                assert_eq!(combined, u64::from(weights.image + weights.reference) * plain);
            }
        }
    }

    #[test]
    fn spatial_cost_prefers_coherent_offsets() {
        let mask = holed_mask(20, 20, Rect::new(8, 8, 4, 4));
        let mut mapping = MappingField::new(20, 20);
        let interior = Interior::for_dims(mask.dims());
        let norm = appearance_normalization(1);
        let max_cost = f64::from(u32::MAX);

        // the left neighbor maps to (3, 4), so (4, 4) continues its offset
        mapping.set_position(8, 9, Vector2::new(3.0, 4.0));

        let coherent = interior.legal(Vector2::new(4.0, 4.0), &mask).unwrap();
        let off = interior.legal(Vector2::new(4.0, 6.0), &mask).unwrap();

        let zero = mapping.spatial_cost_4_neighborhood(9, 9, coherent, &mask, norm, max_cost);
        let four = mapping.spatial_cost_4_neighborhood(9, 9, off, &mask, norm, max_cost);

        assert!(zero.abs() < 1e-6);
        assert!((four - 4.0 * norm as f64).abs() < 1e-3);
    }

    #[test]
    fn spatial_cost_without_hole_neighbors_is_capped() {
        let mask = holed_mask(12, 12, Rect::new(6, 6, 1, 1));
        let mapping = MappingField::new(12, 12);
        let interior = Interior::for_dims(mask.dims());
        let source = interior.legal(Vector2::new(3.0, 3.0), &mask).unwrap();

        let cost = mapping.spatial_cost_4_neighborhood(6, 6, source, &mask, 65025, 1000.0);
        assert!((cost - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rendering_uses_resolved_pixels_only() {
        let mut frame = Frame::new(8, 8, 1).unwrap();
        frame.set_value(&[100]);
        frame.pixel_mut(5, 4)[0] = 0;

        // (5, 4) is a hole, sampling halfway between (4, 4) and (5, 4) must
        // only see (4, 4)
        let mask = holed_mask(8, 8, Rect::new(5, 4, 1, 1));
        let mut out = [0u8];
        resolved_sample(&frame, &mask, Vector2::new(4.5, 4.0), &mut out);
        assert_eq!(out[0], 100);
    }

    #[test]
    fn apply_mapping_is_idempotent() {
        let mut frame = random_frame(24, 24, 3, 5);
        let mask = holed_mask(24, 24, Rect::new(9, 9, 6, 6));
        let interior = Interior::for_dims(mask.dims());
        let mut mapping = MappingField::new(24, 24);

        let mut rng = RandomGenerator::new(11);
        for y in 9..15 {
            for x in 9..15 {
                let position = loop {
                    let candidate = Vector2::new(rng.scalar(2.0, 20.9), rng.scalar(2.0, 20.9));
                    if interior.legal(candidate, &mask).is_some() {
                        break candidate;
                    }
                };
                mapping.set_position(x, y, position);
            }
        }

        let rect = Rect::from_dims(frame.dims());
        mapping.apply_mapping(&mut frame, &mask, rect, None);
        let once = frame.clone();
        mapping.apply_mapping(&mut frame, &mask, rect, None);
        assert_eq!(frame, once);

        let mut threaded = random_frame(24, 24, 3, 5);
        mapping.apply_mapping(&mut threaded, &mask, rect, Some(&Worker::new(3)));
        assert_eq!(threaded, once);
    }

    #[test]
    fn apply_mapping_respects_rect() {
        let mut frame = random_frame(16, 16, 1, 6);
        let original = frame.clone();
        let mask = holed_mask(16, 16, Rect::new(4, 4, 8, 8));
        let mut mapping = MappingField::new(16, 16);
        for y in 4..12 {
            for x in 4..12 {
                mapping.set_position(x, y, Vector2::new(2.0, 2.0));
            }
        }

        mapping.apply_mapping(&mut frame, &mask, Rect::new(4, 4, 4, 8), None);

        assert_eq!(frame.pixel(5, 5), original.pixel(2, 2));
        assert_eq!(frame.pixel(9, 5), original.pixel(9, 5));
    }

    #[test]
    fn band_costs_match_whole_field_costs() {
        let frame = random_frame(20, 20, 3, 7);
        let mask = holed_mask(20, 20, Rect::new(7, 6, 6, 8));
        let interior = Interior::for_dims(mask.dims());

        let mut mapping = MappingField::new(20, 20);
        for y in 6..14 {
            for x in 7..13 {
                mapping.set_position(x, y, Vector2::new(3.0 + (x % 3) as f32, 3.5));
            }
        }

        let frame_band = frame::FrameBand::new(&frame, 8..11);
        let mapping_band = MappingBand::new(&mapping, 8..11);
        let source = interior.legal(Vector2::new(4.25, 15.5), &mask).unwrap();
        let norm = appearance_normalization(3);

        // rows 8 and 10 have neighbors outside the band
        for &(x, y) in &[(7, 8), (9, 9), (12, 10)] {
            assert_eq!(
                appearance_cost(&frame_band, &mask, x, y, source, 25),
                mapping.appearance_cost(x, y, source, &frame, &mask, 25)
            );

            let banded = spatial_cost(&mapping_band, x, y, source, &mask, norm, 1e9);
            let whole = mapping.spatial_cost_4_neighborhood(x, y, source, &mask, norm, 1e9);
            assert!((banded - whole).abs() < 1e-9);
        }
    }

    #[test]
    fn mapping_band_writes_stay_in_band() {
        let mut shared = MappingField::new(4, 6);
        shared.set_position(1, 1, Vector2::new(2.0, 2.0));

        let mut band = MappingBand::new(&shared, 2..4);
        band.set_position(3, 3, Vector2::new(1.5, 1.5));

        assert_eq!(Positions::position(&band, 1, 1), Vector2::new(2.0, 2.0));
        assert_eq!(Positions::position(&band, 3, 3), Vector2::new(1.5, 1.5));
        assert_eq!(shared.position(3, 3), Vector2::default());

        let rows = band.into_rows();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[7], Vector2::new(1.5, 1.5));
    }
}
