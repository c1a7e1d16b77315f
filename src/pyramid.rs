//! Half resolution renditions of an image and its mask, completed from the
//! smallest one up so that every level starts from the mapping of the one
//! before it

use crate::{
    frame::{Frame, MAX_CHANNELS},
    layer,
    mapping::PATCH_SIZE,
    mask::{Mask, HOLE},
};

pub(crate) struct Level {
    pub(crate) frame: Frame,
    pub(crate) mask: Mask,
}

/// The levels above the full resolution image, each half the size of the
/// one below it
pub(crate) struct Pyramid {
    levels: Vec<Level>,
}

impl Pyramid {
    /// Builds up to `levels - 1` levels above `frame`.
    ///
    /// Stops early at the first level which could not be completed on its
    /// own, because it is too small or has no resolved pixel left to copy
    /// from. Level masks are graded like session masks, with `mask_distance`.
    pub(crate) fn new(frame: &Frame, mask: &Mask, levels: u32, mask_distance: u8) -> Self {
        let mut pyramid: Vec<Level> = Vec::new();

        for _ in 1..levels {
            let (finer_frame, finer_mask) = match pyramid.last() {
                Some(level) => (&level.frame, &level.mask),
                None => (frame, mask),
            };

            if finer_frame.width() / 2 <= PATCH_SIZE || finer_frame.height() / 2 <= PATCH_SIZE {
                break;
            }

            let (coarse_frame, mut coarse_mask) = halve(finer_frame, finer_mask);
            coarse_mask.determine_distances_to_border(mask_distance, true);

            if layer::check_geometry(&coarse_frame, &coarse_mask).is_err() {
                break;
            }

            pyramid.push(Level {
                frame: coarse_frame,
                mask: coarse_mask,
            });
        }

        tracing::debug!(
            requested = levels,
            built = pyramid.len() + 1,
            "built image pyramid"
        );

        Self { levels: pyramid }
    }

    /// The levels from the smallest to the largest, the full resolution
    /// image is not part of it
    pub(crate) fn coarse_to_fine(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter().rev()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.levels.len()
    }
}

/// Halves both dimensions, a trailing odd row or column is dropped.
///
/// A coarse pixel averages the resolved pixels among its four children and
/// is a hole as soon as one child is. Coarse pixels without any resolved
/// child are 0.
pub(crate) fn halve(frame: &Frame, mask: &Mask) -> (Frame, Mask) {
    let (width, height) = (frame.width() / 2, frame.height() / 2);

    let mut coarse_frame = Frame::filled(width, height, frame.channels(), 0);
    let mut coarse_mask = Mask::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let children = [
                (2 * x, 2 * y),
                (2 * x + 1, 2 * y),
                (2 * x, 2 * y + 1),
                (2 * x + 1, 2 * y + 1),
            ];

            let mut sums = [0u32; MAX_CHANNELS as usize];
            let mut resolved = 0u32;

            for &(cx, cy) in &children {
                if mask.is_hole(cx, cy) {
                    continue;
                }

                resolved += 1;
                for (sum, &value) in sums.iter_mut().zip(frame.pixel(cx, cy)) {
                    *sum += u32::from(value);
                }
            }

            if resolved < children.len() as u32 {
                coarse_mask.set_value(x, y, HOLE);
            }

            if resolved > 0 {
                for (value, sum) in coarse_frame.pixel_mut(x, y).iter_mut().zip(&sums) {
                    *value = ((sum + resolved / 2) / resolved) as u8;
                }
            }
        }
    }

    (coarse_frame, coarse_mask)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Rect;

    #[test]
    fn halving_averages_resolved_children() {
        let mut frame = Frame::filled(8, 8, 2, 10);
        frame.pixel_mut(0, 0).copy_from_slice(&[30, 50]);
        frame.pixel_mut(3, 2).copy_from_slice(&[200, 200]);

        let mut mask = Mask::new(8, 8);
        mask.set_hole(Rect::new(2, 2, 1, 1));

        let (coarse, coarse_mask) = halve(&frame, &mask);

        assert_eq!(coarse.dims(), crate::Dims::new(4, 4));
        // (30 + 3 * 10) / 4 and (50 + 3 * 10) / 4
        assert_eq!(coarse.pixel(0, 0), [15u8, 20]);
        // (2, 2) is a hole and is left out, (10 + 200 + 10) / 3 rounds to 73
        assert_eq!(coarse.pixel(1, 1), [73u8, 73]);
        assert!(coarse_mask.is_hole(1, 1));
        assert_eq!(coarse_mask.hole_pixel_count(), 1);
    }

    #[test]
    fn odd_sizes_drop_the_last_row_and_column() {
        let frame = Frame::filled(15, 13, 1, 90);
        let mut mask = Mask::new(15, 13);
        mask.set_hole(Rect::new(14, 12, 1, 1));

        let (coarse, coarse_mask) = halve(&frame, &mask);

        assert_eq!((coarse.width(), coarse.height()), (7, 6));
        assert_eq!(coarse_mask.hole_pixel_count(), 0);
    }

    #[test]
    fn stops_before_levels_become_too_small() {
        let frame = Frame::filled(40, 30, 3, 128);
        let mut mask = Mask::new(40, 30);
        mask.set_hole(Rect::new(16, 12, 6, 4));

        // 20x15 and 10x7 can be completed, 5x3 can't
        let pyramid = Pyramid::new(&frame, &mask, 8, 6);
        assert_eq!(pyramid.len(), 2);

        let sizes: Vec<_> = pyramid
            .coarse_to_fine()
            .map(|level| (level.frame.width(), level.mask.height()))
            .collect();
        assert_eq!(sizes, vec![(10, 7), (20, 15)]);

        assert_eq!(Pyramid::new(&frame, &mask, 1, 6).len(), 0);
    }

    #[test]
    fn stops_when_the_hole_swallows_the_interior() {
        let frame = Frame::filled(24, 24, 1, 128);
        let mut mask = Mask::new(24, 24);
        // the 12x12 level has hole pixels at every legal source position
        mask.set_hole(Rect::new(3, 3, 18, 18));

        assert_eq!(Pyramid::new(&frame, &mask, 3, 6).len(), 0);
    }
}
