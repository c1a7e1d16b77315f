//! Graded 8-bit hole masks

use crate::{frame::Frame, Dims, Error, Rect};

/// The mask value of a fully resolved pixel, every other value marks a hole
pub const NON_HOLE: u8 = 0xFF;

/// The mask value [`Mask::from_binary`] assigns to hole pixels
pub const HOLE: u8 = 0x00;

/// A single channel mask with the same geometry as the image it belongs to.
///
/// Pixels equal to [`NON_HOLE`] are resolved, all other pixels are holes which
/// may additionally carry their distance to the resolved region, see
/// [`Mask::determine_distances_to_border`].
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    frame: Frame,
}

impl Mask {
    /// Creates a mask without any hole pixel
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Frame::filled(width, height, 1, NON_HOLE),
        }
    }

    /// Wraps a single channel frame holding graded mask values
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        if frame.channels() != 1 {
            return Err(Error::UnsupportedChannels(frame.channels()));
        }

        Ok(Self { frame })
    }

    /// Creates a mask from the first channel of `frame`, any value other than
    /// `0xFF` becomes a hole pixel
    pub fn from_binary(frame: &Frame) -> Self {
        let mut mask = Self::new(frame.width(), frame.height());

        for y in 0..frame.height() {
            for x in 0..frame.width() {
                if frame.pixel(x, y)[0] != NON_HOLE {
                    mask.set_value(x, y, HOLE);
                }
            }
        }

        mask
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.frame.dims()
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.frame.pixel(x, y)[0]
    }

    #[inline]
    pub fn set_value(&mut self, x: u32, y: u32, value: u8) {
        self.frame.pixel_mut(x, y)[0] = value;
    }

    #[inline]
    pub fn is_hole(&self, x: u32, y: u32) -> bool {
        self.value(x, y) != NON_HOLE
    }

    /// Reads the mask with the same edge mirroring as [`Frame::mirrored`]
    #[inline]
    pub fn mirrored_value(&self, x: i32, y: i32) -> u8 {
        self.frame.mirrored(x, y)[0]
    }

    /// Marks every pixel inside `rect` as a hole
    pub fn set_hole(&mut self, rect: Rect) {
        self.frame
            .sub_frame_set_value(rect.left, rect.top, rect.width, rect.height, &[HOLE]);
    }

    pub fn hole_pixel_count(&self) -> usize {
        (0..self.height())
            .map(|y| self.frame.row(y).iter().filter(|&&v| v != NON_HOLE).count())
            .sum()
    }

    /// The smallest rectangle containing every hole pixel, `None` if the
    /// mask has no hole
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0, 0);
        let mut found = false;

        for y in 0..self.height() {
            for (x, &value) in self.frame.row(y).iter().enumerate() {
                if value != NON_HOLE {
                    let x = x as u32;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                    found = true;
                }
            }
        }

        if found {
            Some(Rect::new(min.0, min.1, max.0 - min.0 + 1, max.1 - min.1 + 1))
        } else {
            None
        }
    }

    /// Replaces the value of every hole pixel with its chessboard distance to
    /// the nearest resolved pixel, 1 for pixels touching the resolved region
    /// up to `max_distance`.
    ///
    /// Hole pixels farther away than `max_distance` receive 0, or
    /// `max_distance` if `assign_final` is set. The image border does not
    /// count as resolved. `max_distance` is capped at 254 so that no hole
    /// pixel can collide with [`NON_HOLE`].
    pub fn determine_distances_to_border(&mut self, max_distance: u8, assign_final: bool) {
        let max_distance = max_distance.min(NON_HOLE - 1);
        let (width, height) = (self.width() as i32, self.height() as i32);

        let mut distances = vec![0u8; width as usize * height as usize];
        let index = |x: i32, y: i32| y as usize * width as usize + x as usize;

        let mut frontier = Vec::new();
        if max_distance >= 1 {
            for y in 0..height {
                for x in 0..width {
                    let touches_resolved = neighbors(x, y, width, height)
                        .any(|(nx, ny)| !self.is_hole(nx as u32, ny as u32));

                    if self.is_hole(x as u32, y as u32) && touches_resolved {
                        distances[index(x, y)] = 1;
                        frontier.push((x, y));
                    }
                }
            }
        }

        for distance in 2..=max_distance {
            let mut next = Vec::new();

            for &(x, y) in &frontier {
                for (nx, ny) in neighbors(x, y, width, height) {
                    if self.is_hole(nx as u32, ny as u32) && distances[index(nx, ny)] == 0 {
                        distances[index(nx, ny)] = distance;
                        next.push((nx, ny));
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let unreached = if assign_final { max_distance } else { 0 };

        for y in 0..height {
            for x in 0..width {
                if self.is_hole(x as u32, y as u32) {
                    let distance = distances[index(x, y)];
                    self.set_value(
                        x as u32,
                        y as u32,
                        if distance == 0 { unreached } else { distance },
                    );
                }
            }
        }
    }
}

/// The up to 8 in-bounds neighbors of `(x, y)`
fn neighbors(x: i32, y: i32, width: i32, height: i32) -> impl Iterator<Item = (i32, i32)> {
    (-1..=1)
        .flat_map(move |dy| (-1..=1).map(move |dx| (x + dx, y + dy)))
        .filter(move |&(nx, ny)| {
            (nx, ny) != (x, y) && nx >= 0 && ny >= 0 && nx < width && ny < height
        })
}

#[cfg(test)]
mod test {
    use super::*;

    fn mask_with_hole(width: u32, height: u32, hole: Rect) -> Mask {
        let mut mask = Mask::new(width, height);
        mask.set_hole(hole);
        mask
    }

    #[test]
    fn binary_threshold() {
        let mut frame = Frame::new(3, 1, 2).unwrap();
        frame.pixel_mut(0, 0).copy_from_slice(&[0xFF, 0]);
        frame.pixel_mut(1, 0).copy_from_slice(&[0xFE, 0xFF]);
        frame.pixel_mut(2, 0).copy_from_slice(&[0, 0xFF]);

        let mask = Mask::from_binary(&frame);
        assert!(!mask.is_hole(0, 0));
        assert!(mask.is_hole(1, 0));
        assert!(mask.is_hole(2, 0));
        assert_eq!(mask.hole_pixel_count(), 2);
    }

    #[test]
    fn bounding_box_of_hole() {
        let hole = Rect::new(3, 5, 4, 2);
        let mask = mask_with_hole(12, 10, hole);

        assert_eq!(mask.bounding_box(), Some(hole));
        assert_eq!(Mask::new(4, 4).bounding_box(), None);
    }

    #[test]
    fn chessboard_distances() {
        let mut mask = mask_with_hole(11, 11, Rect::new(2, 2, 7, 7));
        mask.determine_distances_to_border(6, false);

        // outer ring of the hole touches resolved ground
        assert_eq!(mask.value(2, 2), 1);
        assert_eq!(mask.value(8, 5), 1);
        assert_eq!(mask.value(3, 3), 2);
        assert_eq!(mask.value(4, 6), 3);
        assert_eq!(mask.value(5, 5), 4);
        assert_eq!(mask.value(0, 0), NON_HOLE);
        assert_eq!(mask.hole_pixel_count(), 49);
    }

    #[test]
    fn distances_beyond_maximum() {
        let hole = Rect::new(1, 1, 9, 9);

        let mut zeroed = mask_with_hole(11, 11, hole);
        zeroed.determine_distances_to_border(2, false);
        assert_eq!(zeroed.value(2, 2), 2);
        assert_eq!(zeroed.value(5, 5), 0);

        let mut capped = mask_with_hole(11, 11, hole);
        capped.determine_distances_to_border(2, true);
        assert_eq!(capped.value(5, 5), 2);
        assert!(capped.is_hole(5, 5));
    }

    #[test]
    fn image_border_is_not_resolved() {
        let mut mask = mask_with_hole(8, 8, Rect::new(0, 0, 4, 8));
        mask.determine_distances_to_border(10, false);

        assert_eq!(mask.value(3, 0), 1);
        assert_eq!(mask.value(0, 0), 4);
        assert_eq!(mask.value(0, 7), 4);
    }

    #[test]
    fn graded_frames() {
        assert!(matches!(
            Mask::from_frame(Frame::new(4, 4, 3).unwrap()),
            Err(Error::UnsupportedChannels(3))
        ));

        let mut frame = Frame::filled(4, 4, 1, NON_HOLE);
        frame.pixel_mut(2, 1)[0] = 3;

        let mask = Mask::from_frame(frame).unwrap();
        assert!(mask.is_hole(2, 1));
        assert_eq!(mask.value(2, 1), 3);
        assert_eq!(mask.hole_pixel_count(), 1);
    }
}
