use crate::{errors::InvalidRange, frame::Frame, mask::Mask, Error};
use std::path::Path;

/// Helper type used to define the source of `ImageSource`'s data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the session
    Image(image::DynamicImage),
    /// A pixel buffer, used as is including its row padding
    Frame(Frame),
}

impl<'a> ImageSource<'a> {
    pub fn from_path(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<Frame> for ImageSource<'a> {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
        ImageSource::Frame(frame) => Ok(frame.to_dynamic()),
    }
}

pub(crate) fn load_frame(src: ImageSource<'_>) -> Result<Frame, Error> {
    match src {
        ImageSource::Frame(frame) => Ok(frame),
        other => Ok(Frame::from_dynamic(load_dynamic_image(other)?)),
    }
}

/// Helper type used to select a channel of an image as the hole mask
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMask {
    R,
    G,
    B,
    A,
}

impl ChannelMask {
    /// Index of the channel in an image with `channels` interleaved channels,
    /// gray images answer the color channels with their single luma channel
    fn index(self, channels: u32) -> Option<u32> {
        let has_color = channels >= 3;
        let has_alpha = channels == 2 || channels == 4;

        match self {
            Self::A => has_alpha.then(|| channels - 1),
            Self::G if has_color => Some(1),
            Self::B if has_color => Some(2),
            Self::R | Self::G | Self::B => Some(0),
        }
    }
}

/// The origin of the hole mask of a session
pub enum MaskSource<'a> {
    /// A binary mask image, every pixel whose first channel is not 255 is a
    /// hole pixel
    Binary(ImageSource<'a>),
    /// A channel of the image being completed, used as a binary mask
    Channel(ChannelMask),
    /// A graded mask, used as is
    Graded(Mask),
}

impl<'a> From<ImageSource<'a>> for MaskSource<'a> {
    fn from(src: ImageSource<'a>) -> Self {
        Self::Binary(src)
    }
}

impl<'a, S> From<&'a S> for MaskSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Binary(ImageSource::Path(path.as_ref()))
    }
}

impl<'a> From<ChannelMask> for MaskSource<'a> {
    fn from(channel: ChannelMask) -> Self {
        Self::Channel(channel)
    }
}

impl<'a> From<Mask> for MaskSource<'a> {
    fn from(mask: Mask) -> Self {
        Self::Graded(mask)
    }
}

/// Copies a single channel of `frame` into a new single channel frame
pub(crate) fn extract_channel(frame: &Frame, channel: ChannelMask) -> Result<Frame, Error> {
    let index = channel.index(frame.channels()).ok_or_else(|| {
        Error::InvalidRange(InvalidRange {
            min: 0.0,
            max: (frame.channels() - 1) as f32,
            value: 3.0,
            name: "mask-channel",
        })
    })?;

    let mut extracted = Frame::new(frame.width(), frame.height(), 1)?;
    for y in 0..frame.height() {
        let src = frame.row(y).chunks_exact(frame.channels() as usize);
        for (dst, pixel) in extracted.row_mut(y).iter_mut().zip(src) {
            *dst = pixel[index as usize];
        }
    }

    Ok(extracted)
}
