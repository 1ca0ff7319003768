//! # Compositor Layers
//!
//! Builds the list of layers submitted with each frame.
//!
//! ## Plain English Explanation
//!
//! Normally the compositor gets two layers:
//!
//! 1. A **projection layer**: the stereo world image, one half per eye.
//! 2. A **quad layer**: the HUD/menu overlay, a flat picture floating half a
//!    meter in front of the face.
//!
//! Two situations change that:
//!
//! - **Weapon zoom**: the scope view is drawn mono into the overlay. The
//!   stereo layer is dropped and the quad is shown opaque.
//! - **Single-player intermission**: the podium scene. The overlay is pinned
//!   in the world in front of where the player was looking when the scene
//!   started, so they can look around while it stays put.

use ::openxr as xr;
use glam::{Vec2, Vec3};
use log::debug;

use crate::math::{position_in_front, yaw_rotation, Fov, Pose};
use crate::runtime::{
    CompositionLayer, EyeView, ImageRect, ProjectionLayer, ProjectionView, QuadLayer, SpaceId,
    SwapchainId,
};

/// Distance of the head-locked overlay from the eyes, in meters
pub const HUD_DISTANCE: f32 = 0.5;

/// Overlay extent relative to the field of view
pub const HUD_MARGIN: f32 = 1.1;

/// How far below the initial head height the intermission overlay sits
pub const INTERMISSION_DROP: f32 = 1.1;

/// Distance of the intermission overlay from the initial head position
pub const INTERMISSION_DISTANCE: f32 = 2.0;

// ============================================
// QUAD PLACEMENT
// ============================================

/// Head-locked overlay pose and size.
///
/// The quad is centred on the middle of the field of view, which on
/// asymmetric displays is not straight ahead. It covers the field of view
/// plus a margin, shrunk on one axis to match the overlay texture's aspect.
pub fn head_locked_quad(fov: &Fov, texture_aspect: f32) -> (Pose, Vec2) {
    let (left, right) = (fov.left.tan(), fov.right.tan());
    let (down, up) = (fov.down.tan(), fov.up.tan());

    let centre = Vec3::new(
        (left + right) * 0.5 * HUD_DISTANCE,
        (down + up) * 0.5 * HUD_DISTANCE,
        -HUD_DISTANCE,
    );

    let mut width = (right - left) * HUD_DISTANCE * HUD_MARGIN;
    let mut height = (up - down) * HUD_DISTANCE * HUD_MARGIN;
    if texture_aspect > 0.0 {
        if width / height > texture_aspect {
            width = height * texture_aspect;
        } else {
            height = width / texture_aspect;
        }
    }

    (Pose::from_position(centre), Vec2::new(width, height))
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct AnchorCapture {
    head: Vec3,
    yaw: f32,
    target_height: f32,
}

/// World anchor for the intermission overlay.
///
/// Captured on the first intermission frame and held until [`reset`](Self::reset).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntermissionAnchor {
    capture: Option<AnchorCapture>,
}

impl IntermissionAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_captured(&self) -> bool {
        self.capture.is_some()
    }

    /// Forgets the capture so the next intermission starts fresh
    pub fn reset(&mut self) {
        if self.capture.take().is_some() {
            debug!("Intermission anchor cleared");
        }
    }

    /// World pose and size of the overlay for this frame
    pub fn update(&mut self, head: &Pose, head_locked_size: Vec2) -> (Pose, Vec2) {
        let capture = *self.capture.get_or_insert_with(|| {
            let capture = AnchorCapture {
                head: head.position,
                yaw: head.yaw(),
                target_height: head.position.y - INTERMISSION_DROP,
            };
            debug!(
                "Intermission anchor captured at {:?}, yaw {:.1} deg",
                capture.head,
                capture.yaw.to_degrees()
            );
            capture
        });

        let initial = Pose::new(capture.head, yaw_rotation(capture.yaw));
        let mut position = position_in_front(&initial, INTERMISSION_DISTANCE);
        // Follow the tracking origin's vertical drift
        position.y = capture.target_height - (head.position.y - capture.head.y);

        let size = head_locked_size * (INTERMISSION_DISTANCE / HUD_DISTANCE);
        (Pose::new(position, yaw_rotation(capture.yaw)), size)
    }
}

// ============================================
// ASSEMBLY
// ============================================

/// What this frame produced, for layer assembly
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub views: [EyeView; 2],
    /// Head pose in the world space
    pub head: Pose,
    /// Average FOV of both eyes
    pub fov: Fov,
    pub world_space: SpaceId,
    pub head_space: SpaceId,
    pub color: SwapchainId,
    pub eye_size: (u32, u32),
    /// Overlay swapchain, when an image was acquired and rendered this frame
    pub overlay: Option<SwapchainId>,
    pub weapon_zoom_mono: bool,
    pub intermission: bool,
}

/// Builds the layer list, updating the intermission anchor on the way
pub fn assemble(frame: &FrameOutput, anchor: &mut IntermissionAnchor) -> Vec<CompositionLayer> {
    if !frame.intermission {
        anchor.reset();
    }

    let mut layers = Vec::with_capacity(2);
    let rect = ImageRect::full(frame.eye_size.0, frame.eye_size.1);

    if !frame.weapon_zoom_mono {
        let view = |eye: usize| ProjectionView {
            pose: frame.views[eye].pose,
            fov: frame.views[eye].fov,
            swapchain: frame.color,
            image_array_index: eye as u32,
            rect,
        };
        layers.push(CompositionLayer::Projection(ProjectionLayer {
            flags: xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA
                | xr::CompositionLayerFlags::CORRECT_CHROMATIC_ABERRATION,
            space: frame.world_space,
            views: [view(0), view(1)],
        }));
    }

    if let Some(overlay) = frame.overlay {
        let aspect = frame.eye_size.0 as f32 / frame.eye_size.1.max(1) as f32;
        let (head_pose, head_size) = head_locked_quad(&frame.fov, aspect);

        let (space, pose, size) = if frame.intermission && !frame.weapon_zoom_mono {
            let (pose, size) = anchor.update(&frame.head, head_size);
            (frame.world_space, pose, size)
        } else {
            (frame.head_space, head_pose, head_size)
        };

        let flags = if frame.weapon_zoom_mono {
            xr::CompositionLayerFlags::EMPTY
        } else {
            xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA
        };

        layers.push(CompositionLayer::Quad(QuadLayer {
            flags,
            space,
            swapchain: overlay,
            rect,
            pose,
            size: (size.x, size.y),
        }));
    }

    layers
}

// ============================================
// TESTS
// ============================================
