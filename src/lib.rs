// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `patch-inpaint` fills the masked ("hole") region of an image with content
//! resampled from the rest of the same image, optionally guided by a second
//! reference image.
//!
//! Every hole pixel owns a sub-pixel source position in a mapping field. A
//! randomized initializer seeds the field, then an iterative optimizer
//! alternates forward and backward raster passes which propagate good
//! positions from visited neighbors and run a shrinking random search around
//! the current best position. Candidates are scored by a patch appearance term
//! plus a spatial coherence term, and only strictly better candidates are
//! accepted. Large holes can be completed coarse to fine, every level of an
//! image pyramid then starts from the scaled up mapping of the level above.
//!
//! The simplest way in is a `Session`, built via a `SessionBuilder`, which
//! follows the builder pattern. Calling `build` loads the image and the mask
//! and checks for various errors, `run` completes the image and returns it as
//! a `CompletedImage`.
//!
//! ## Usage
//!
//! ```no_run
//! // Create a new session with default parameters
//! let session = patch_inpaint::Session::builder()
//!     // Set some parameters
//!     .seed(10)
//!     .iterations(6)
//!     // Build the session from an image and a mask, white mask pixels are
//!     // kept, all others are filled
//!     .build(&"imgs/photo.png", &"imgs/photo_mask.png")
//!     .expect("failed to build session");
//!
//! // Fill the hole
//! let completed = session.run().expect("failed to complete image");
//!
//! // Save the completed image to disk
//! completed.save("photo_filled.png").expect("failed to save completed image");
//! ```
//!
//! The individual stages (`Layer`, `Initializer`, `Optimizer`,
//! `ReferenceOptimizer`) are public as well, for callers that want to drive
//! the completion themselves.
mod errors;
pub mod frame;
mod initializer;
mod layer;
pub mod mapping;
pub mod mask;
mod optimizer;
mod pyramid;
mod reference;
mod rng;
pub mod session;
mod utils;
mod worker;

pub use image;
use std::path::Path;

pub use errors::Error;
pub use frame::Frame;
pub use initializer::Initializer;
pub use layer::Layer;
pub use mapping::{Interior, MappingField, SourcePosition};
pub use mask::Mask;
pub use optimizer::{OptimizationStats, Optimizer, OptimizerParams, RadiusSchedule};
pub use reference::{ReferenceOptimizer, ReferenceWeights};
pub use rng::RandomGenerator;
pub use session::{Session, SessionBuilder};
pub use utils::{load_dynamic_image, ChannelMask, ImageSource, MaskSource};
pub use worker::Worker;

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An axis aligned pixel rectangle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// The rectangle covering an entire image
    pub fn from_dims(dims: Dims) -> Self {
        Self::new(0, 0, dims.width, dims.height)
    }

    #[inline]
    pub fn right_end(&self) -> u32 {
        self.left + self.width
    }

    #[inline]
    pub fn bottom_end(&self) -> u32 {
        self.top + self.height
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right_end() && y >= self.top && y < self.bottom_end()
    }
}

/// A 2D sub-pixel position or offset
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn sqr_distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// The pixel this position falls into, rounding half away from the
    /// pixel center
    #[inline]
    pub fn rounded(self) -> (i32, i32) {
        ((self.x + 0.5).floor() as i32, (self.y + 0.5).floor() as i32)
    }
}

impl std::ops::Add for Vector2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vector2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

struct Parameters {
    seed: u64,
    max_thread_count: Option<usize>,
    initializer_trials: u32,
    initializer_patch_size: u32,
    search_radii: u32,
    iterations: u32,
    weight_factor: u32,
    border_factor: u32,
    max_spatial_cost: f64,
    apply_initial_mapping: bool,
    update_frame: bool,
    reference_weights: ReferenceWeights,
    radius_schedule: RadiusSchedule,
    mask_distance: u8,
    pyramid_levels: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            seed: 0,
            max_thread_count: None,
            initializer_trials: 100,
            initializer_patch_size: 1,
            search_radii: 5,
            iterations: 4,
            weight_factor: 5,
            border_factor: 25,
            max_spatial_cost: f64::from(u32::MAX),
            apply_initial_mapping: true,
            update_frame: true,
            reference_weights: ReferenceWeights::default(),
            radius_schedule: RadiusSchedule::default(),
            mask_distance: mapping::PATCH_SIZE as u8 + 1,
            pyramid_levels: 1,
        }
    }
}

impl Parameters {
    fn to_optimizer_params(&self) -> OptimizerParams {
        OptimizerParams {
            search_radii: self.search_radii,
            iterations: self.iterations,
            weight_factor: self.weight_factor,
            border_factor: self.border_factor,
            max_spatial_cost: self.max_spatial_cost,
            apply_initial_mapping: self.apply_initial_mapping,
            update_frame: self.update_frame,
            radius_schedule: self.radius_schedule,
        }
    }

    /// `None` for the deterministic single threaded path
    fn to_worker(&self) -> Option<Worker> {
        match self.max_thread_count {
            Some(threads) if threads > 1 => Some(Worker::new(threads)),
            _ => None,
        }
    }
}

/// An image completed by a `Session::run()`
pub struct CompletedImage {
    frame: Frame,
    mask: Mask,
    mapping: MappingField,
}

impl CompletedImage {
    /// Saves the completed image to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(&parent_path)?;
        }

        self.frame.to_dynamic().save(&path)?;
        Ok(())
    }

    /// Writes the completed image to the specified stream
    pub fn write<W: std::io::Write>(
        self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = self.into_image();
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// Saves debug information: the graded mask the completion worked with,
    /// and the mapping field, where the red and green channels of every hole
    /// pixel encode the horizontal and vertical source position.
    pub fn save_debug<P: AsRef<Path>>(&self, dir: P) -> Result<(), Error> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(&dir)?;

        self.mask.frame().to_dynamic().save(&dir.join("mask.png"))?;
        self.mapping_image().save(&dir.join("mapping.png"))?;

        Ok(())
    }

    fn mapping_image(&self) -> image::RgbImage {
        let (width, height) = (self.mapping.width(), self.mapping.height());
        let scale = |v: f32, size: u32| (v / (size - 1).max(1) as f32 * 255.0).round() as u8;

        image::RgbImage::from_fn(width, height, |x, y| {
            if self.mask.is_hole(x, y) {
                let position = self.mapping.position(x, y);
                image::Rgb([scale(position.x, width), scale(position.y, height), 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        })
    }

    /// The completed pixel buffer
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The graded mask the completion worked with
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// The final source position of every hole pixel
    pub fn mapping(&self) -> &MappingField {
        &self.mapping
    }

    /// Returns the completed image
    pub fn into_image(self) -> image::DynamicImage {
        self.frame.to_dynamic()
    }
}

impl AsRef<Frame> for CompletedImage {
    fn as_ref(&self) -> &Frame {
        &self.frame
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rounds_to_nearest_pixel() {
        assert_eq!(Vector2::new(2.49, 3.5).rounded(), (2, 4));
        assert_eq!(Vector2::new(0.0, 7.999).rounded(), (0, 8));
    }

    #[test]
    fn squared_distance() {
        let a = Vector2::new(1.0, 2.0);
        let b = Vector2::new(4.0, 6.0);
        assert!((a.sqr_distance(b) - 25.0).abs() < f32::EPSILON);
        assert_eq!(a + b - b, a);
    }

    #[test]
    fn rect_bounds() {
        let rect = Rect::new(2, 3, 4, 5);
        assert!(rect.contains(2, 3));
        assert!(rect.contains(5, 7));
        assert!(!rect.contains(6, 7));
        assert!(!rect.contains(5, 8));
        assert_eq!(Rect::from_dims(Dims::new(9, 4)), Rect::new(0, 0, 9, 4));
    }

    #[test]
    fn single_thread_by_default() {
        let params = Parameters::default();
        assert!(params.to_worker().is_none());

        let params = Parameters {
            max_thread_count: Some(3),
            ..Parameters::default()
        };
        assert_eq!(params.to_worker().map(|w| w.threads()), Some(3));
    }
}
