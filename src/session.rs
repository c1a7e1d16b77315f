use crate::{pyramid::Pyramid, *};

/// Image completion session.
///
/// Calling `run()` fills the hole of the image and returns the result,
/// consuming the session in the process.
///
/// # Example
/// ```no_run
/// let session = patch_inpaint::Session::builder()
///     .seed(10)
///     .iterations(2)
///     .build(&"imgs/photo.png", patch_inpaint::ChannelMask::A)
///     .expect("failed to build session");
///
/// let completed = session.run().expect("failed to complete image");
/// completed.save("photo_filled.png").expect("failed to save image");
/// ```
pub struct Session {
    frame: Frame,
    mask: Mask,
    reference: Option<Frame>,
    params: Parameters,
}

impl Session {
    /// Creates a new session with default parameters.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// The graded mask the session will complete the image with
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Runs the initializer and the optimizer and outputs the completed
    /// image. Pixels outside of the hole keep their values.
    pub fn run(self) -> Result<CompletedImage, Error> {
        let Self {
            frame,
            mask,
            reference,
            params,
        } = self;

        let bounding_box = match mask.bounding_box() {
            Some(rect) => rect,
            None => {
                tracing::warn!("the mask has no hole pixels, the image is returned unchanged");
                let mapping = MappingField::new(frame.width(), frame.height());
                return Ok(CompletedImage {
                    frame,
                    mask,
                    mapping,
                });
            }
        };

        let worker = params.to_worker();
        let worker = worker.as_ref();
        let mut rng = RandomGenerator::new(params.seed);

        let initializer =
            Initializer::new(params.initializer_trials, params.initializer_patch_size)?;
        let optimizer_params = params.to_optimizer_params();

        // the levels above the image are completed without the reference
        let pyramid = Pyramid::new(&frame, &mask, params.pyramid_levels, params.mask_distance);
        let mut coarser: Option<Layer<'_>> = None;

        for level in pyramid.coarse_to_fine() {
            let mut layer = Layer::new(level.frame.clone(), &level.mask)?;
            seed_mapping(&initializer, &mut layer, coarser.as_ref(), &mut rng, worker)?;

            let stats = Optimizer::new(optimizer_params)?.invoke(&mut layer, &mut rng, worker);
            tracing::debug!(
                width = level.frame.width(),
                height = level.frame.height(),
                accepted = stats.accepted,
                "completed pyramid level"
            );

            coarser = Some(layer);
        }

        let mut layer = Layer::new(frame, &mask)?;
        seed_mapping(&initializer, &mut layer, coarser.as_ref(), &mut rng, worker)?;

        let stats = match &reference {
            Some(reference) => {
                ReferenceOptimizer::new(optimizer_params, reference, params.reference_weights)?
                    .invoke(&mut layer, &mut rng, worker)?
            }
            None => Optimizer::new(optimizer_params)?.invoke(&mut layer, &mut rng, worker),
        };

        layer.apply_mapping(Some(bounding_box), worker);

        tracing::debug!(
            hole_pixels = mask.hole_pixel_count(),
            levels = pyramid.len() + 1,
            iterations = stats.iterations,
            scored = stats.scored,
            accepted = stats.accepted,
            threads = worker.map_or(1, Worker::threads),
            "completed image"
        );

        let (frame, mapping) = layer.into_parts();

        Ok(CompletedImage {
            frame,
            mask,
            mapping,
        })
    }
}

/// Builds a session by setting parameters and an optional reference image,
/// calling `build` will load the image and its mask and check all of the
/// inputs to verify that the completion can run
#[derive(Default)]
pub struct SessionBuilder<'a> {
    reference: Option<ImageSource<'a>>,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a reference image, e.g. the previous frame of a video.
    ///
    /// When set, every target patch is also compared against the same
    /// position of the reference, which must have the size and channel
    /// count of the image being completed.
    pub fn load_reference<I: Into<ImageSource<'a>>>(mut self, reference: I) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Changes the seed of the random generator.
    ///
    /// With a single thread the same seed and inputs always produce the same
    /// image.
    ///
    /// Default: 0
    pub fn seed(mut self, value: u64) -> Self {
        self.params.seed = value;
        self
    }

    /// Controls the maximum number of threads that will be spawned at any one
    /// time in parallel.
    ///
    /// Leaving this unset, or setting it to `1`, runs every stage on the
    /// calling thread, which makes the completion completely deterministic.
    /// With more threads the image rows are split into bands, the result is
    /// equally valid but depends on the thread count.
    ///
    /// Default: 1
    pub fn max_thread_count(mut self, count: usize) -> Self {
        self.params.max_thread_count = Some(count);
        self
    }

    /// The number of random source positions the initializer tries for every
    /// hole pixel.
    ///
    /// Default: 100
    pub fn initializer_trials(mut self, count: u32) -> Self {
        self.params.initializer_trials = count;
        self
    }

    /// The size of the patch the initializer ranks its trials with, one of
    /// 1, 3 or 5.
    ///
    /// Default: 1
    pub fn initializer_patch_size(mut self, size: u32) -> Self {
        self.params.initializer_patch_size = size;
        self
    }

    /// The number of random search candidates per pixel and pass, each one
    /// drawn within a smaller radius around the current best position.
    ///
    /// Default: 5
    pub fn search_radii(mut self, count: u32) -> Self {
        self.params.search_radii = count;
        self
    }

    /// How the random search radius shrinks, starting from the larger image
    /// dimension.
    ///
    /// Default: halved per candidate, never below 1 pixel
    pub fn radius_schedule(mut self, schedule: RadiusSchedule) -> Self {
        self.params.radius_schedule = schedule;
        self
    }

    /// The number of optimizer iterations, each one a forward and a backward
    /// pass over the image.
    ///
    /// Default: 4
    pub fn iterations(mut self, count: u32) -> Self {
        self.params.iterations = count;
        self
    }

    /// Weight of the spatial coherence term relative to the appearance term.
    ///
    /// Larger values favor copying whole connected regions, 0 disables the
    /// spatial term.
    ///
    /// Default: 5
    pub fn weight_factor(mut self, value: u32) -> Self {
        self.params.weight_factor = value;
        self
    }

    /// Weight of patch pixels which lie inside the hole or close to it,
    /// ordinary resolved pixels have a weight of 1.
    ///
    /// Default: 25
    pub fn border_factor(mut self, value: u32) -> Self {
        self.params.border_factor = value;
        self
    }

    /// The upper bound of the spatial cost of a single neighbor.
    ///
    /// Default: `u32::MAX`
    pub fn max_spatial_cost(mut self, value: f64) -> Self {
        self.params.max_spatial_cost = value;
        self
    }

    /// Renders every hole pixel from the initial mapping before the first
    /// optimizer pass, so that the appearance term compares against
    /// plausible content instead of the original hole values.
    ///
    /// Default: true
    pub fn apply_initial_mapping(mut self, value: bool) -> Self {
        self.params.apply_initial_mapping = value;
        self
    }

    /// Re-renders a hole pixel as soon as the optimizer accepts a better
    /// source position for it.
    ///
    /// Default: true
    pub fn update_frame(mut self, value: bool) -> Self {
        self.params.update_frame = value;
        self
    }

    /// The weights of the image and the reference comparison, only used with
    /// a reference image.
    ///
    /// Default: 1 for the image, 5 for the reference
    pub fn reference_weights(mut self, weights: ReferenceWeights) -> Self {
        self.params.reference_weights = weights;
        self
    }

    /// The number of image pyramid levels to complete, from the smallest one
    /// up to the image itself. Every level halves the size of the one below
    /// it and seeds that level's mapping with its own, scaled up.
    ///
    /// Levels which would be smaller than 6x6 pixels, or whose hole would
    /// cover every possible source position, are left out. `1` completes the
    /// image directly. Range [1, 16].
    ///
    /// Default: 1
    pub fn pyramid_levels(mut self, levels: u32) -> Self {
        self.params.pyramid_levels = levels;
        self
    }

    /// Binary masks are graded by the distance of every hole pixel to the
    /// resolved region, up to this many pixels. Range [1, 254].
    ///
    /// Default: 6
    pub fn mask_distance(mut self, value: u8) -> Self {
        self.params.mask_distance = value;
        self
    }

    /// Creates a `Session` which completes `image`, or returns an error if
    /// invalid parameters or inputs were specified.
    ///
    /// The mask is either a binary image of the same size, where every pixel
    /// that is not pure white is filled, a channel of `image` used the same
    /// way, or an already graded [`Mask`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let session = patch_inpaint::Session::builder()
    ///     .build(&"imgs/photo.png", &"imgs/photo_mask.png")
    ///     .expect("failed to build session");
    /// ```
    pub fn build<I, M>(self, image: I, mask: M) -> Result<Session, Error>
    where
        I: Into<ImageSource<'a>>,
        M: Into<MaskSource<'a>>,
    {
        self.check_parameters_validity()?;

        let frame = utils::load_frame(image.into())?;

        let mask = match mask.into() {
            MaskSource::Graded(mask) => mask,
            MaskSource::Binary(src) => self.graded(Mask::from_binary(&utils::load_frame(src)?)),
            MaskSource::Channel(channel) => {
                self.graded(Mask::from_binary(&utils::extract_channel(&frame, channel)?))
            }
        };

        let reference = match self.reference {
            Some(src) => Some(utils::load_frame(src)?),
            None => None,
        };

        Self::check_images_validity(&frame, &mask, reference.as_ref())?;

        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            channels = frame.channels(),
            hole_pixels = mask.hole_pixel_count(),
            reference = reference.is_some(),
            "built session"
        );

        Ok(Session {
            frame,
            mask,
            reference,
            params: self.params,
        })
    }

    fn graded(&self, mut mask: Mask) -> Mask {
        mask.determine_distances_to_border(self.params.mask_distance, true);
        mask
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        if let Some(max_count) = self.params.max_thread_count {
            if max_count == 0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 1.0,
                    max: 1024.0,
                    value: max_count as f32,
                    name: "max-thread-count",
                }));
            }
        }

        if self.params.mask_distance == 0 || self.params.mask_distance == mask::NON_HOLE {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: f32::from(mask::NON_HOLE - 1),
                value: f32::from(self.params.mask_distance),
                name: "mask-distance",
            }));
        }

        if self.params.pyramid_levels == 0 || self.params.pyramid_levels > 16 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: 16.0,
                value: self.params.pyramid_levels as f32,
                name: "pyramid-levels",
            }));
        }

        if self.reference.is_some() {
            let weights = self.params.reference_weights;
            if weights.image == 0 && weights.reference == 0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 1.0,
                    max: 1024.0,
                    value: 0.0,
                    name: "reference-weights",
                }));
            }
        }

        Initializer::new(
            self.params.initializer_trials,
            self.params.initializer_patch_size,
        )?;

        self.params.to_optimizer_params().check()
    }

    fn check_images_validity(
        frame: &Frame,
        mask: &Mask,
        reference: Option<&Frame>,
    ) -> Result<(), Error> {
        layer::check_geometry(frame, mask)?;

        if let Some(reference) = reference {
            if reference.dims() != frame.dims() {
                return Err(Error::SizeMismatch(errors::SizeMismatch {
                    what: "reference",
                    expected: (frame.width(), frame.height()),
                    actual: (reference.width(), reference.height()),
                }));
            }

            if reference.channels() != frame.channels() {
                return Err(Error::ChannelMismatch(frame.channels(), reference.channels()));
            }
        }

        Ok(())
    }
}

/// Initializes the mapping of `layer` from scratch, or from the mapping of
/// the next coarser pyramid level
fn seed_mapping(
    initializer: &Initializer,
    layer: &mut Layer<'_>,
    coarser: Option<&Layer<'_>>,
    rng: &mut RandomGenerator,
    worker: Option<&Worker>,
) -> Result<(), Error> {
    match coarser {
        Some(coarser) => {
            if layer.adopt(coarser)? > 0 {
                initializer.fill_illegal(layer, rng, worker);
            }
        }
        None => initializer.invoke(layer, rng, worker),
    }

    Ok(())
}
