//! Row-major 8-bit pixel buffers with optional row padding

use crate::{errors::BufferTooSmall, Dims, Error, Vector2};
use std::ops::Range;

/// The largest number of interleaved channels a frame can have.
pub const MAX_CHANNELS: u32 = 4;

/// An owned image with `channels` interleaved 8-bit values per pixel.
///
/// Every row is followed by `padding_elements` bytes which belong to the
/// buffer but never to the image, no operation in this crate reads or writes
/// them.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u32,
    padding_elements: u32,
}

impl Frame {
    /// Creates a zero-initialized frame without padding
    pub fn new(width: u32, height: u32, channels: u32) -> Result<Self, Error> {
        Self::with_padding(width, height, channels, 0)
    }

    /// Creates a zero-initialized frame with `padding_elements` extra bytes
    /// at the end of each row
    pub fn with_padding(
        width: u32,
        height: u32,
        channels: u32,
        padding_elements: u32,
    ) -> Result<Self, Error> {
        check_channels(channels)?;
        let stride = row_elements(width, channels) + padding_elements as usize;
        Self::from_raw(
            width,
            height,
            channels,
            padding_elements,
            vec![0; stride * height as usize],
        )
    }

    /// Creates a frame without padding with every channel set to `value`
    pub(crate) fn filled(width: u32, height: u32, channels: u32, value: u8) -> Self {
        debug_assert!(channels >= 1 && channels <= MAX_CHANNELS);

        Self {
            data: vec![value; row_elements(width, channels) * height as usize],
            width,
            height,
            channels,
            padding_elements: 0,
        }
    }

    /// Wraps an existing buffer, which must be at least
    /// `(width * channels + padding_elements) * height` bytes long
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u32,
        padding_elements: u32,
        data: Vec<u8>,
    ) -> Result<Self, Error> {
        check_channels(channels)?;

        let stride = row_elements(width, channels) + padding_elements as usize;
        let required = stride * height as usize;
        if data.len() < required {
            return Err(Error::BufferTooSmall(BufferTooSmall {
                required,
                actual: data.len(),
            }));
        }

        Ok(Self {
            data,
            width,
            height,
            channels,
            padding_elements,
        })
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
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    pub fn padding_elements(&self) -> u32 {
        self.padding_elements
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height)
    }

    /// Number of bytes between the starts of two consecutive rows
    #[inline]
    pub fn stride_elements(&self) -> usize {
        row_elements(self.width, self.channels) + self.padding_elements as usize
    }

    /// Whether both frames have the same width, height and channel count
    pub fn has_same_layout(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.stride_elements() + x as usize * self.channels as usize
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ind = self.index(x, y);
        &self.data[ind..ind + self.channels as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let ind = self.index(x, y);
        let channels = self.channels as usize;
        &mut self.data[ind..ind + channels]
    }

    /// The pixel values of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = self.index(0, y);
        &self.data[start..start + row_elements(self.width, self.channels)]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = self.index(0, y);
        let len = row_elements(self.width, self.channels);
        &mut self.data[start..start + len]
    }

    /// Reads a pixel with edge mirroring for coordinates outside the frame,
    /// -1 maps to 0, -2 to 1, `width` to `width - 1` and so on
    #[inline]
    pub fn mirrored(&self, x: i32, y: i32) -> &[u8] {
        Pixels::mirrored(self, x, y)
    }

    /// Sets every pixel of the frame to `value`
    pub fn set_value(&mut self, value: &[u8]) {
        self.sub_frame_set_value(0, 0, self.width, self.height, value);
    }

    /// Sets every pixel of the given sub-rectangle to `value`
    pub fn sub_frame_set_value(
        &mut self,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        value: &[u8],
    ) {
        debug_assert_eq!(value.len(), self.channels as usize);
        debug_assert!(left + width <= self.width && top + height <= self.height);

        for y in top..top + height {
            for x in left..left + width {
                self.pixel_mut(x, y).copy_from_slice(value);
            }
        }
    }

    /// Bilinearly interpolates the frame at a sub-pixel `position`, pixel
    /// centers are located at integer coordinates. Positions outside the
    /// frame are clamped to the border pixels.
    pub fn interpolate_pixel(&self, position: Vector2, out: &mut [u8]) {
        let sample = BilinearSample::new(self.dims(), position);
        sample.interpolate(self, 0, 0, out);
    }

    /// Bilinearly interpolates a `patch_size` x `patch_size` patch centered at
    /// the sub-pixel `center` into `out`, row by row.
    ///
    /// The patch must fit into the frame, so `center` has to be at least
    /// `patch_size / 2` away from the left and top border and strictly less
    /// than `patch_size / 2 + 1` away from the right and bottom border.
    pub(crate) fn interpolate_patch(&self, center: Vector2, patch_size: u32, out: &mut [u8]) {
        interpolate_patch(self, center, patch_size, out);
    }

    /// Converts a decoded image into a frame, 8-bit gray, gray-alpha, RGB and
    /// RGBA images keep their channel layout, everything else becomes RGBA
    pub fn from_dynamic(img: image::DynamicImage) -> Self {
        use image::DynamicImage as Di;

        let (width, height, channels, data) = match img {
            Di::ImageLuma8(buf) => (buf.width(), buf.height(), 1, buf.into_raw()),
            Di::ImageLumaA8(buf) => (buf.width(), buf.height(), 2, buf.into_raw()),
            Di::ImageRgb8(buf) => (buf.width(), buf.height(), 3, buf.into_raw()),
            Di::ImageRgba8(buf) => (buf.width(), buf.height(), 4, buf.into_raw()),
            other => {
                let buf = other.to_rgba();
                (buf.width(), buf.height(), 4, buf.into_raw())
            }
        };

        Self {
            data,
            width,
            height,
            channels,
            padding_elements: 0,
        }
    }

    /// Converts the frame back into a decoded image, dropping any padding
    pub fn to_dynamic(&self) -> image::DynamicImage {
        use image::DynamicImage as Di;

        let mut compact =
            Vec::with_capacity(row_elements(self.width, self.channels) * self.height as usize);
        for y in 0..self.height {
            compact.extend_from_slice(self.row(y));
        }

        let (w, h) = (self.width, self.height);

        // the buffer length always matches, the constructors can't fail
        match self.channels {
            1 => image::GrayImage::from_raw(w, h, compact).map(Di::ImageLuma8),
            2 => image::GrayAlphaImage::from_raw(w, h, compact).map(Di::ImageLumaA8),
            3 => image::RgbImage::from_raw(w, h, compact).map(Di::ImageRgb8),
            _ => image::RgbaImage::from_raw(w, h, compact).map(Di::ImageRgba8),
        }
        .unwrap_or_else(|| Di::new_rgba8(w, h))
    }

    #[cfg(test)]
    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    #[cfg(test)]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Read access to the pixels of an image which may be stitched together from
/// more than one buffer
pub(crate) trait Pixels {
    fn dims(&self) -> Dims;
    fn channels(&self) -> u32;
    fn pixel(&self, x: u32, y: u32) -> &[u8];

    /// See [`Frame::mirrored`]
    #[inline]
    fn mirrored(&self, x: i32, y: i32) -> &[u8] {
        let dims = self.dims();
        self.pixel(mirror_index(x, dims.width), mirror_index(y, dims.height))
    }
}

pub(crate) trait PixelsMut: Pixels {
    fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8];
}

impl Pixels for Frame {
    #[inline]
    fn dims(&self) -> Dims {
        Frame::dims(self)
    }

    #[inline]
    fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> &[u8] {
        Frame::pixel(self, x, y)
    }
}

impl PixelsMut for Frame {
    #[inline]
    fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        Frame::pixel_mut(self, x, y)
    }
}

/// A private copy of a band of rows laid over a shared frame.
///
/// Rows inside the band are read from and written to the copy, every other
/// row is read from the shared frame. Writing outside the band is a bug.
pub(crate) struct FrameBand<'f> {
    shared: &'f Frame,
    rows: Frame,
    top: u32,
}

impl<'f> FrameBand<'f> {
    pub(crate) fn new(shared: &'f Frame, band: Range<u32>) -> Self {
        debug_assert!(band.start <= band.end && band.end <= shared.height);

        let mut rows = Frame::filled(
            shared.width,
            band.end - band.start,
            shared.channels,
            0,
        );
        for (i, y) in band.clone().enumerate() {
            rows.row_mut(i as u32).copy_from_slice(shared.row(y));
        }

        Self {
            shared,
            rows,
            top: band.start,
        }
    }

    #[inline]
    fn in_band(&self, y: u32) -> bool {
        y >= self.top && y - self.top < self.rows.height
    }

    /// The band rows, the first row of the returned frame is the top row of
    /// the band
    pub(crate) fn into_rows(self) -> Frame {
        self.rows
    }
}

impl Pixels for FrameBand<'_> {
    #[inline]
    fn dims(&self) -> Dims {
        self.shared.dims()
    }

    #[inline]
    fn channels(&self) -> u32 {
        self.shared.channels
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> &[u8] {
        if self.in_band(y) {
            self.rows.pixel(x, y - self.top)
        } else {
            self.shared.pixel(x, y)
        }
    }
}

impl PixelsMut for FrameBand<'_> {
    #[inline]
    fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        debug_assert!(self.in_band(y), "row {} is outside the band", y);
        self.rows.pixel_mut(x, y - self.top)
    }
}

/// Bilinearly interpolates a `patch_size` x `patch_size` patch of `pixels`,
/// see [`Frame::interpolate_patch`]
pub(crate) fn interpolate_patch<P: Pixels>(
    pixels: &P,
    center: Vector2,
    patch_size: u32,
    out: &mut [u8],
) {
    let patch_radius = (patch_size / 2) as i32;
    let channels = pixels.channels() as usize;

    debug_assert!(out.len() >= (patch_size * patch_size) as usize * channels);
    debug_assert!(center.x >= patch_radius as f32 && center.y >= patch_radius as f32);

    let sample = BilinearSample::new(pixels.dims(), center);

    let mut n = 0;
    for dy in -patch_radius..=patch_radius {
        for dx in -patch_radius..=patch_radius {
            sample.interpolate(pixels, dx, dy, &mut out[n..n + channels]);
            n += channels;
        }
    }
}

fn check_channels(channels: u32) -> Result<(), Error> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(Error::UnsupportedChannels(channels));
    }

    Ok(())
}

/// Number of pixel values in a row, computed in `usize` so that large
/// layouts can't overflow `u32`
#[inline]
fn row_elements(width: u32, channels: u32) -> usize {
    width as usize * channels as usize
}

#[inline]
pub(crate) fn mirror_index(index: i32, size: u32) -> u32 {
    let size = size as i32;

    let mirrored = if index < 0 {
        -index - 1
    } else if index >= size {
        2 * size - index - 1
    } else {
        index
    };

    debug_assert!(mirrored >= 0 && mirrored < size, "patch exceeds the mirror range");
    mirrored as u32
}

/// The integer footprint and 7-bit fixed point weights of a bilinear sample,
/// shared by all samples of a patch since they have the same sub-pixel offset
#[derive(Clone, Copy, Debug)]
pub(crate) struct BilinearSample {
    left: i32,
    top: i32,
    fx: u32,
    fy: u32,
    width: u32,
    height: u32,
}

impl BilinearSample {
    pub(crate) fn new(dims: Dims, position: Vector2) -> Self {
        let Dims { width, height } = dims;
        let x = position.x.max(0.0).min((width - 1) as f32);
        let y = position.y.max(0.0).min((height - 1) as f32);

        let left = x as u32;
        let top = y as u32;

        Self {
            left: left as i32,
            top: top as i32,
            fx: ((x - left as f32) * 128.0 + 0.5) as u32,
            fy: ((y - top as f32) * 128.0 + 0.5) as u32,
            width,
            height,
        }
    }

    /// The four pixel locations of the footprint shifted by `(dx, dy)`,
    /// top-left, top-right, bottom-left, bottom-right, together with their
    /// weights which sum up to `128 * 128`
    #[inline]
    pub(crate) fn footprint(&self, dx: i32, dy: i32) -> [((u32, u32), u32); 4] {
        let x0 = (self.left + dx).max(0).min(self.width as i32 - 1) as u32;
        let y0 = (self.top + dy).max(0).min(self.height as i32 - 1) as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx_ = 128 - self.fx;
        let fy_ = 128 - self.fy;

        [
            ((x0, y0), fx_ * fy_),
            ((x1, y0), self.fx * fy_),
            ((x0, y1), fx_ * self.fy),
            ((x1, y1), self.fx * self.fy),
        ]
    }

    #[inline]
    pub(crate) fn interpolate<P: Pixels + ?Sized>(
        &self,
        pixels: &P,
        dx: i32,
        dy: i32,
        out: &mut [u8],
    ) {
        let footprint = self.footprint(dx, dy);

        for (c, value) in out.iter_mut().enumerate() {
            let sum: u32 = footprint
                .iter()
                .map(|&((x, y), weight)| u32::from(pixels.pixel(x, y)[c]) * weight)
                .sum();

            *value = ((sum + 8192) >> 14) as u8;
        }
    }
}
