//! Boundary types for the camera-tracking reconstruction service.
//!
//! The compositor consumes motion-tracking results through this narrow
//! numeric API and treats the solver itself as a black box: handles for a
//! track set and camera intrinsics go in, per-track positions, camera
//! poses and reprojection errors come out, with progress reported through
//! a callback. Logging verbosity is explicit per-solve configuration
//! rather than process-global state.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// A 2D marker: one track observed in one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Frame index.
    pub image: i32,
    /// Track identifier.
    pub track: i32,
    /// Marker position in pixels.
    pub x: f64,
    /// Marker position in pixels.
    pub y: f64,
}

/// A set of markers across images, the solver's main input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tracks {
    markers: Vec<Marker>,
}

impl Tracks {
    /// Create an empty track set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one observation of a track in an image.
    pub fn insert(&mut self, image: i32, track: i32, x: f64, y: f64) {
        self.markers.push(Marker { image, track, x, y });
    }

    /// All markers in insertion order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Markers belonging to one track.
    pub fn markers_for_track(&self, track: i32) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |m| m.track == track)
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Camera intrinsics: focal length, principal point and lens distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Principal point.
    pub principal_point_x: f64,
    /// Principal point.
    pub principal_point_y: f64,
    /// Radial distortion coefficients.
    pub k1: f64,
    /// Radial distortion coefficients.
    pub k2: f64,
    /// Radial distortion coefficients.
    pub k3: f64,
    /// Tangential distortion coefficients.
    pub p1: f64,
    /// Tangential distortion coefficients.
    pub p2: f64,
    /// Image dimensions the intrinsics refer to.
    pub image_width: i32,
    /// Image dimensions the intrinsics refer to.
    pub image_height: i32,
}

/// Bitmask selecting which intrinsics the solver may refine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefineFlags(pub u32);

impl RefineFlags {
    /// Refine nothing.
    pub const NONE: RefineFlags = RefineFlags(0);
    /// Refine focal length.
    pub const FOCAL_LENGTH: RefineFlags = RefineFlags(1 << 0);
    /// Refine the principal point.
    pub const PRINCIPAL_POINT: RefineFlags = RefineFlags(1 << 1);
    /// Refine radial distortion k1.
    pub const RADIAL_K1: RefineFlags = RefineFlags(1 << 2);
    /// Refine radial distortion k2. The gap in the bit layout is part of
    /// the service's wire contract.
    pub const RADIAL_K2: RefineFlags = RefineFlags(1 << 4);

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: RefineFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RefineFlags {
    type Output = RefineFlags;

    fn bitor(self, rhs: RefineFlags) -> RefineFlags {
        RefineFlags(self.0 | rhs.0)
    }
}

/// Options controlling one reconstruction solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionOptions {
    /// Let the solver pick keyframes itself.
    pub select_keyframes: bool,
    /// Manual keyframe pair, used when `select_keyframes` is false.
    pub keyframe1: i32,
    /// Manual keyframe pair, used when `select_keyframes` is false.
    pub keyframe2: i32,
    /// Which intrinsics the solver may refine.
    pub refine: RefineFlags,
    /// Reprojection-error threshold for a successful solve.
    pub success_threshold: f64,
    /// Fall back to a less constrained reconstruction when the threshold
    /// is missed.
    pub use_fallback: bool,
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            select_keyframes: true,
            keyframe1: 0,
            keyframe2: 0,
            refine: RefineFlags::NONE,
            success_threshold: 1e-3,
            use_fallback: false,
        }
    }
}

/// Explicit solver configuration.
///
/// Carried into the service instead of ambient global logging state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Logging verbosity (0 = quiet).
    pub verbosity: i32,
}

/// Progress callback: fraction in `0..=1` plus a status message.
pub type SolveProgress<'a> = dyn Fn(f64, &str) + Send + Sync + 'a;

/// Queryable result of a reconstruction solve.
pub trait Reconstruction {
    /// 3D position of a track, when reconstructed.
    fn point_for_track(&self, track: i32) -> Option<[f64; 3]>;

    /// Reprojection error of one track across all images.
    fn error_for_track(&self, track: i32) -> f64;

    /// Reprojection error of one image across all tracks.
    fn error_for_image(&self, image: i32) -> f64;

    /// Camera pose for an image as a 4x4 matrix, when solved.
    fn camera_for_image(&self, image: i32) -> Option<[[f64; 4]; 4]>;

    /// Overall average reprojection error.
    fn error(&self) -> f64;
}

/// The reconstruction service itself.
///
/// Implementations wrap an external solver; the compositor core never
/// looks inside.
pub trait ReconstructionSolver {
    /// Solve camera motion for a track set.
    fn solve(
        &self,
        tracks: &Tracks,
        intrinsics: &CameraIntrinsics,
        options: &ReconstructionOptions,
        config: &SolverConfig,
        progress: Option<&SolveProgress<'_>>,
    ) -> Box<dyn Reconstruction>;
}
