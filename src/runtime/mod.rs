//! # Runtime Seam
//!
//! The boundary between the frame loop and the OpenXR runtime.
//!
//! ## Plain English Explanation
//!
//! Everything the VR layer asks of the headset goes through the
//! [`XrRuntime`] trait: wait for the next frame, tell me where the eyes are,
//! give me an image to draw into, show these layers. The real
//! implementation ([`openxr::OpenXrRuntime`]) wraps the `openxr` crate;
//! tests use a scripted stand-in that records every call.
//!
//! Runtime objects (spaces, swapchains) are referred to by small copyable
//! handles so the frame loop never borrows the runtime across calls.

pub mod openxr;

#[cfg(test)]
pub mod mock;

use ::openxr as xr;

use crate::error::VrResult;
use crate::math::{Fov, Pose};

pub use self::openxr::OpenXrRuntime;

// ============================================
// HANDLES
// ============================================

/// Handle to a runtime reference space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpaceId(pub u64);

/// Handle to a runtime swapchain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapchainId(pub u64);

/// Identity of a runtime session, used to filter events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

// ============================================
// EVENTS
// ============================================

/// Runtime events the frame loop reacts to
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeEvent {
    /// The runtime's event queue overflowed
    EventsLost { count: u32 },
    /// The runtime is going away at `loss_time`
    InstanceLossPending { loss_time: xr::Time },
    /// A controller profile was bound or changed
    InteractionProfileChanged,
    /// The headset switched refresh rate
    DisplayRefreshRateChanged { from: f32, to: f32 },
    /// A reference space origin is about to move (e.g. the user recentered)
    ReferenceSpaceChangePending {
        session: SessionId,
        space_type: xr::ReferenceSpaceType,
    },
    /// The session moved through its lifecycle
    SessionStateChanged {
        session: SessionId,
        state: xr::SessionState,
    },
    /// Anything we don't act on
    Other,
}

// ============================================
// FRAME DATA
// ============================================

/// Result of waiting for the next frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    /// When the frame will hit the display; used for every pose query
    pub predicted_display_time: xr::Time,
    /// Whether the compositor will show the frame at all
    pub should_render: bool,
}

/// One eye's pose and field of view for a frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EyeView {
    pub pose: Pose,
    pub fov: Fov,
}

/// Per-view swapchain size limits reported by the runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewConfigView {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

/// Swapchain creation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// GL internal format
    pub format: u32,
    pub width: u32,
    pub height: u32,
    /// 2 for multiview eye buffers, 1 for the overlay
    pub array_size: u32,
    /// Depth attachment rather than color
    pub depth: bool,
}

/// Sub-rectangle of a swapchain image, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ImageRect {
    /// Rectangle covering a whole `width` × `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: width as i32,
            height: height as i32,
        }
    }
}

// ============================================
// COMPOSITOR LAYERS
// ============================================

/// One eye of a projection layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionView {
    pub pose: Pose,
    pub fov: Fov,
    pub swapchain: SwapchainId,
    pub image_array_index: u32,
    pub rect: ImageRect,
}

/// Stereo layer that covers the whole view
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionLayer {
    pub flags: xr::CompositionLayerFlags,
    pub space: SpaceId,
    pub views: [ProjectionView; 2],
}

/// Flat rectangle placed somewhere in a space
#[derive(Clone, Debug, PartialEq)]
pub struct QuadLayer {
    pub flags: xr::CompositionLayerFlags,
    pub space: SpaceId,
    pub swapchain: SwapchainId,
    pub rect: ImageRect,
    pub pose: Pose,
    /// Width and height in meters
    pub size: (f32, f32),
}

/// A layer handed to the compositor at end of frame, back to front
#[derive(Clone, Debug, PartialEq)]
pub enum CompositionLayer {
    Projection(ProjectionLayer),
    Quad(QuadLayer),
}

impl CompositionLayer {
    /// True for the stereo projection layer
    pub fn is_projection(&self) -> bool {
        matches!(self, Self::Projection(_))
    }
}

// ============================================
// THE RUNTIME TRAIT
// ============================================

/// Everything the frame loop needs from an OpenXR runtime.
///
/// All calls happen on the render thread. `wait_frame` is the only call
/// expected to block.
pub trait XrRuntime {
    /// Identity of the session, for filtering per-session events
    fn session_id(&self) -> SessionId;

    /// Pops the next pending event without blocking
    fn poll_event(&mut self) -> VrResult<Option<RuntimeEvent>>;

    /// Starts the session with the stereo view configuration
    fn begin_session(&mut self) -> VrResult<()>;

    /// Ends a running session
    fn end_session(&mut self) -> VrResult<()>;

    /// Blocks until the runtime wants the next frame
    fn wait_frame(&mut self) -> VrResult<FrameTiming>;

    /// Marks the start of rendering for the waited frame
    fn begin_frame(&mut self) -> VrResult<()>;

    /// Submits the frame's layers
    fn end_frame(&mut self, display_time: xr::Time, layers: &[CompositionLayer]) -> VrResult<()>;

    /// Per-eye poses and fields of view, relative to `space`
    fn locate_views(&mut self, display_time: xr::Time, space: SpaceId) -> VrResult<Vec<EyeView>>;

    /// Pose of `space` relative to `base`
    fn locate_space(&mut self, space: SpaceId, base: SpaceId, display_time: xr::Time)
        -> VrResult<Pose>;

    /// Reference space types the runtime offers
    fn reference_space_types(&mut self) -> VrResult<Vec<xr::ReferenceSpaceType>>;

    /// Creates a reference space offset by `pose`
    fn create_reference_space(
        &mut self,
        space_type: xr::ReferenceSpaceType,
        pose: Pose,
    ) -> VrResult<SpaceId>;

    /// Destroys a reference space
    fn destroy_space(&mut self, space: SpaceId) -> VrResult<()>;

    /// Size limits for each view of the stereo configuration
    fn view_configuration_views(&mut self) -> VrResult<Vec<ViewConfigView>>;

    /// GL internal formats the runtime can allocate, in its preference order
    fn swapchain_formats(&mut self) -> VrResult<Vec<u32>>;

    /// Allocates a swapchain
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VrResult<SwapchainId>;

    /// GL texture names of the swapchain's images
    fn swapchain_images(&mut self, swapchain: SwapchainId) -> VrResult<Vec<u32>>;

    /// Acquires the next image and returns its index
    fn acquire_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<u32>;

    /// Waits (without timeout) until the acquired image may be written
    fn wait_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()>;

    /// Hands the acquired image back to the compositor
    fn release_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()>;

    /// Frees a swapchain
    fn destroy_swapchain(&mut self, swapchain: SwapchainId) -> VrResult<()>;

    /// Current display refresh rate, if the runtime can report it
    fn display_refresh_rate(&mut self) -> VrResult<Option<f32>>;
}
