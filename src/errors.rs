use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub struct SizeMismatch {
    pub(crate) what: &'static str,
    pub(crate) expected: (u32, u32),
    pub(crate) actual: (u32, u32),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the {} size ({}x{}) must match the image size ({}x{})",
            self.what, self.actual.0, self.actual.1, self.expected.0, self.expected.1
        )
    }
}

#[derive(Debug)]
pub struct BufferTooSmall {
    pub(crate) required: usize,
    pub(crate) actual: usize,
}

impl fmt::Display for BufferTooSmall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the frame layout requires {} bytes, but only {} were provided",
            self.required, self.actual
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The mask, mapping or reference frame does not have the geometry of
    /// the image being completed
    SizeMismatch(SizeMismatch),
    /// The reference frame has a different channel count than the image
    ChannelMismatch(u32, u32),
    /// Only 1 to 4 interleaved 8-bit channels are supported
    UnsupportedChannels(u32),
    /// The raw buffer handed to a frame is shorter than its layout requires
    BufferTooSmall(BufferTooSmall),
    /// The image cannot hold a single cost patch inside its legal interior
    FrameTooSmall(u32, u32),
    /// Every pixel inside the legal interior is a hole pixel, so there is
    /// nothing to copy content from
    NoSourcePixels,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::Io(io) => write!(f, "{}", io),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::SizeMismatch(sm) => write!(f, "{}", sm),
            Self::ChannelMismatch(image, reference) => write!(
                f,
                "the image has {} channel(s), but the reference frame has {}",
                image, reference
            ),
            Self::UnsupportedChannels(channels) => write!(
                f,
                "{} channel(s) are not supported, only 1 to 4 channels are",
                channels
            ),
            Self::BufferTooSmall(bts) => write!(f, "{}", bts),
            Self::FrameTooSmall(width, height) => write!(
                f,
                "a {}x{} image is too small to be completed, at least 6x6 is required",
                width, height
            ),
            Self::NoSourcePixels => write!(
                f,
                "at least 1 non-hole pixel must be available as a sampling source"
            ),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}
