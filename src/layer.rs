use crate::{
    errors::SizeMismatch,
    frame::Frame,
    mapping::{Interior, MappingField, PATCH_SIZE},
    mask::Mask,
    Error, Rect, Vector2, Worker,
};

/// The unit of work of a completion, an image together with its hole mask
/// and the mapping field that fills the hole.
///
/// The mask is borrowed, it is never modified or duplicated by a layer.
#[derive(Clone, Debug)]
pub struct Layer<'a> {
    frame: Frame,
    mask: &'a Mask,
    mapping: MappingField,
}

impl<'a> Layer<'a> {
    /// Creates a layer with an empty mapping field.
    ///
    /// Fails if the mask geometry differs from the frame, if the frame is
    /// smaller than 6x6 pixels, or if the mask has holes but no resolved
    /// pixel a mapping could ever point to.
    pub fn new(frame: Frame, mask: &'a Mask) -> Result<Self, Error> {
        let mapping = MappingField::new(frame.width(), frame.height());
        Self::with_mapping(frame, mask, mapping)
    }

    /// Creates a layer around an existing mapping field
    pub fn with_mapping(
        frame: Frame,
        mask: &'a Mask,
        mapping: MappingField,
    ) -> Result<Self, Error> {
        check_geometry(&frame, mask)?;

        if mapping.dims() != frame.dims() {
            return Err(Error::SizeMismatch(SizeMismatch {
                what: "mapping",
                expected: (frame.width(), frame.height()),
                actual: (mapping.width(), mapping.height()),
            }));
        }

        Ok(Self {
            frame,
            mask,
            mapping,
        })
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Mutable access to the pixels, the geometry can't be changed through it
    #[inline]
    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    #[inline]
    pub fn mask(&self) -> &'a Mask {
        self.mask
    }

    #[inline]
    pub fn mapping(&self) -> &MappingField {
        &self.mapping
    }

    #[inline]
    pub fn mapping_mut(&mut self) -> &mut MappingField {
        &mut self.mapping
    }

    /// The legal region for source positions of this layer
    #[inline]
    pub fn interior(&self) -> Interior {
        Interior::for_dims(self.frame.dims())
    }

    /// Splits the layer into the pieces an optimizer pass mutates
    #[inline]
    pub(crate) fn parts_mut(&mut self) -> (&mut Frame, &'a Mask, &mut MappingField) {
        (&mut self.frame, self.mask, &mut self.mapping)
    }

    /// Renders every hole pixel inside `rect` from its mapping, or every hole
    /// pixel of the layer if `rect` is `None`
    pub fn apply_mapping(&mut self, rect: Option<Rect>, worker: Option<&Worker>) {
        let rect = rect.unwrap_or_else(|| Rect::from_dims(self.frame.dims()));

        tracing::debug!(
            left = rect.left,
            top = rect.top,
            width = rect.width,
            height = rect.height,
            threads = worker.map_or(1, Worker::threads),
            "applying mapping"
        );

        self.mapping.apply_mapping(&mut self.frame, self.mask, rect, worker);
    }

    /// Seeds the mapping of every hole pixel from `coarser`, the same image
    /// at an integer fraction of this layer's size, e.g. the next level of an
    /// image pyramid.
    ///
    /// A hole pixel first tries the mapping of the coarse pixel covering it,
    /// then the mappings of that pixel's four hole neighbors continued onto
    /// it, each scaled up to this layer. The first legal one is taken.
    /// Returns the number of hole pixels without any legal candidate, their
    /// mapping is left as it was.
    pub fn adopt(&mut self, coarser: &Layer<'_>) -> Result<u32, Error> {
        let (width, height) = (self.frame.width(), self.frame.height());
        let (coarse_width, coarse_height) = (coarser.frame.width(), coarser.frame.height());

        if coarse_width > width || coarse_height > height {
            return Err(Error::SizeMismatch(SizeMismatch {
                what: "coarser layer",
                expected: (width, height),
                actual: (coarse_width, coarse_height),
            }));
        }

        let (factor_x, factor_y) = (width / coarse_width, height / coarse_height);
        let interior = self.interior();
        let mut unresolved = 0;

        // the coarse neighbor and the shift continuing its mapping onto the
        // coarse pixel in the middle
        let neighborhood = [
            (0, 0, 0.0, 0.0),
            (0, -1, 0.0, 1.0),
            (-1, 0, 1.0, 0.0),
            (1, 0, -1.0, 0.0),
            (0, 1, 0.0, -1.0),
        ];

        for y in 0..height {
            for x in 0..width {
                if !self.mask.is_hole(x, y) {
                    continue;
                }

                let ax = (x / factor_x).min(coarse_width - 1);
                let ay = (y / factor_y).min(coarse_height - 1);
                let offset = Vector2::new((x - ax * factor_x) as f32, (y - ay * factor_y) as f32);

                let adopted = neighborhood.iter().find_map(|&(dx, dy, shift_x, shift_y)| {
                    let (nx, ny) = (ax as i32 + dx, ay as i32 + dy);
                    if nx < 0 || ny < 0 || nx >= coarse_width as i32 || ny >= coarse_height as i32 {
                        return None;
                    }

                    let (nx, ny) = (nx as u32, ny as u32);
                    if !coarser.mask.is_hole(nx, ny) {
                        return None;
                    }

                    let coarse = coarser.mapping.position(nx, ny);
                    let candidate = Vector2::new(
                        (coarse.x + shift_x) * factor_x as f32,
                        (coarse.y + shift_y) * factor_y as f32,
                    ) + offset;

                    interior.legal(candidate, self.mask).map(|_| candidate)
                });

                match adopted {
                    Some(position) => self.mapping.set_position(x, y, position),
                    None => unresolved += 1,
                }
            }
        }

        tracing::debug!(
            factor_x,
            factor_y,
            unresolved,
            "adopted coarser mapping"
        );

        Ok(unresolved)
    }

    /// Sum of the appearance costs of all hole pixels at their current mapping
    pub fn appearance_cost_sum(&self, border_factor: u32) -> u64 {
        let interior = self.interior();
        let mut sum = 0;

        for y in 0..self.frame.height() {
            for x in 0..self.frame.width() {
                if !self.mask.is_hole(x, y) {
                    continue;
                }

                if let Some(source) = interior.legal(self.mapping.position(x, y), self.mask) {
                    sum += self.mapping.appearance_cost(
                        x,
                        y,
                        source,
                        &self.frame,
                        self.mask,
                        border_factor,
                    );
                }
            }
        }

        sum
    }

    /// Whether every hole pixel maps to a legal source position
    pub fn is_mapping_legal(&self) -> bool {
        let interior = self.interior();

        (0..self.frame.height()).all(|y| {
            (0..self.frame.width()).all(|x| {
                !self.mask.is_hole(x, y)
                    || interior
                        .legal(self.mapping.position(x, y), self.mask)
                        .is_some()
            })
        })
    }

    /// Returns the completed frame and the mapping that produced it
    pub fn into_parts(self) -> (Frame, MappingField) {
        (self.frame, self.mapping)
    }
}

/// Checks that `frame` and `mask` can form a layer: same size, at least 6x6
/// pixels, and a resolved pixel to copy from if there is any hole
pub(crate) fn check_geometry(frame: &Frame, mask: &Mask) -> Result<(), Error> {
    if mask.dims() != frame.dims() {
        return Err(Error::SizeMismatch(SizeMismatch {
            what: "mask",
            expected: (frame.width(), frame.height()),
            actual: (mask.width(), mask.height()),
        }));
    }

    if frame.width() <= PATCH_SIZE || frame.height() <= PATCH_SIZE {
        return Err(Error::FrameTooSmall(frame.width(), frame.height()));
    }

    if mask.hole_pixel_count() > 0 && !Interior::for_dims(frame.dims()).has_source_pixels(mask) {
        return Err(Error::NoSourcePixels);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_mismatched_mask() {
        let frame = Frame::new(10, 10, 3).unwrap();
        let mask = Mask::new(10, 9);

        match Layer::new(frame, &mask) {
            Err(Error::SizeMismatch(sm)) => {
                assert_eq!(sm.expected, (10, 10));
                assert_eq!(sm.actual, (10, 9));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_mismatched_mapping() {
        let frame = Frame::new(10, 10, 1).unwrap();
        let mask = Mask::new(10, 10);

        assert!(matches!(
            Layer::with_mapping(frame, &mask, MappingField::new(11, 10)),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn rejects_tiny_frames() {
        let frame = Frame::new(5, 40, 1).unwrap();
        let mask = Mask::new(5, 40);

        assert!(matches!(
            Layer::new(frame, &mask),
            Err(Error::FrameTooSmall(5, 40))
        ));
    }

    #[test]
    fn rejects_masks_without_sources() {
        let frame = Frame::new(8, 8, 1).unwrap();
        let mut mask = Mask::new(8, 8);
        mask.set_hole(Rect::new(1, 1, 6, 6));

        assert!(matches!(
            Layer::new(frame, &mask),
            Err(Error::NoSourcePixels)
        ));
    }

    #[test]
    fn accepts_smallest_frame() {
        let frame = Frame::new(6, 6, 2).unwrap();
        let mut mask = Mask::new(6, 6);
        mask.set_hole(Rect::new(0, 0, 2, 2));

        let layer = Layer::new(frame, &mask).unwrap();
        assert!(!layer.is_mapping_legal());
    }

    fn holed(size: u32, hole: Rect) -> Mask {
        let mut mask = Mask::new(size, size);
        mask.set_hole(hole);
        mask
    }

    fn coarse_layer<'a>(mask: &'a Mask, positions: &[((u32, u32), Vector2)]) -> Layer<'a> {
        let mut layer = Layer::new(Frame::new(10, 10, 1).unwrap(), mask).unwrap();
        for &((x, y), position) in positions {
            layer.mapping_mut().set_position(x, y, position);
        }
        layer
    }

    #[test]
    fn adopts_scaled_coarse_mapping() {
        let coarse_mask = holed(10, Rect::new(4, 4, 2, 2));
        let coarse = coarse_layer(
            &coarse_mask,
            &[
                ((4, 4), Vector2::new(2.0, 5.0)),
                ((5, 4), Vector2::new(3.0, 5.0)),
                ((4, 5), Vector2::new(2.0, 6.0)),
                ((5, 5), Vector2::new(3.0, 6.0)),
            ],
        );

        let mask = holed(20, Rect::new(8, 8, 4, 4));
        let mut layer = Layer::new(Frame::new(20, 20, 1).unwrap(), &mask).unwrap();

        assert_eq!(layer.adopt(&coarse).unwrap(), 0);
        assert!(layer.is_mapping_legal());
        assert_eq!(layer.mapping().position(8, 8), Vector2::new(4.0, 10.0));
        assert_eq!(layer.mapping().position(9, 8), Vector2::new(5.0, 10.0));
        assert_eq!(layer.mapping().position(11, 11), Vector2::new(7.0, 13.0));
    }

    #[test]
    fn adopts_from_coarse_neighbors() {
        let coarse_mask = holed(10, Rect::new(4, 4, 2, 2));
        // (4, 4) points into the hole once scaled, its right neighbor doesn't
        let coarse = coarse_layer(
            &coarse_mask,
            &[
                ((4, 4), Vector2::new(4.5, 4.5)),
                ((5, 4), Vector2::new(3.0, 5.0)),
            ],
        );

        let mask = holed(20, Rect::new(8, 8, 4, 4));
        let mut layer = Layer::new(Frame::new(20, 20, 1).unwrap(), &mask).unwrap();
        layer.adopt(&coarse).unwrap();

        assert_eq!(layer.mapping().position(8, 8), Vector2::new(4.0, 10.0));
        assert_eq!(layer.mapping().position(9, 9), Vector2::new(5.0, 11.0));
    }

    #[test]
    fn counts_pixels_without_legal_candidates() {
        let coarse_mask = holed(10, Rect::new(4, 4, 2, 2));
        // every entry is still at the origin, which is outside the interior
        let coarse = coarse_layer(&coarse_mask, &[]);

        let mask = holed(20, Rect::new(8, 8, 4, 4));
        let mut layer = Layer::new(Frame::new(20, 20, 1).unwrap(), &mask).unwrap();
        let before = layer.mapping().clone();

        assert_eq!(layer.adopt(&coarse).unwrap(), 16);
        assert_eq!(*layer.mapping(), before);
    }

    #[test]
    fn rejects_larger_coarse_layers() {
        let mask = holed(10, Rect::new(4, 4, 2, 2));
        let larger_mask = holed(20, Rect::new(8, 8, 4, 4));

        let larger = Layer::new(Frame::new(20, 20, 1).unwrap(), &larger_mask).unwrap();
        let mut layer = Layer::new(Frame::new(10, 10, 1).unwrap(), &mask).unwrap();

        assert!(matches!(layer.adopt(&larger), Err(Error::SizeMismatch(_))));
    }
}
