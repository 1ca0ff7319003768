//! Projection matrices handed to the game renderer each frame.
//!
//! The game wants an infinite far plane and a near plane of one unit, so
//! every matrix here is built with `near = 1.0, far = 0.0`.

use glam::Mat4;

use crate::math::{projection_fov, Fov};
use crate::runtime::EyeView;

/// Half-angle of the fixed projection used for head-locked HUD elements
pub const MONO_HUD_HALF_ANGLE: f32 = 15.0 * std::f32::consts::PI / 180.0;

const GAME_NEAR: f32 = 1.0;
const GAME_FAR: f32 = 0.0;

/// All per-frame projection data
#[derive(Clone, Debug, PartialEq)]
pub struct FrameProjections {
    /// Average of both eyes' FOV, before zoom
    pub combined_fov: Fov,
    /// Combined projection narrowed by the zoom level
    pub projection: Mat4,
    pub mono: Mat4,
    pub eyes: [Mat4; 2],
    /// Degrees, after zoom
    pub fov_x: f32,
    /// Degrees, after zoom
    pub fov_y: f32,
    pub half_ipd: f32,
}

impl FrameProjections {
    /// Builds the matrices from this frame's eye views and the zoom divisor
    pub fn compute(eyes: &[EyeView; 2], zoom_level: f32) -> Self {
        let combined_fov = Fov::average(&[eyes[0].fov, eyes[1].fov]);
        let zoomed = combined_fov.zoomed(zoom_level);

        Self {
            combined_fov,
            projection: projection_fov(&zoomed, GAME_NEAR, GAME_FAR),
            mono: projection_fov(&Fov::symmetric(MONO_HUD_HALF_ANGLE), GAME_NEAR, GAME_FAR),
            eyes: [
                projection_fov(&eyes[0].fov.zoomed(zoom_level), GAME_NEAR, GAME_FAR),
                projection_fov(&eyes[1].fov.zoomed(zoom_level), GAME_NEAR, GAME_FAR),
            ],
            fov_x: zoomed.horizontal_degrees(),
            fov_y: zoomed.vertical_degrees(),
            half_ipd: eyes[0].pose.position.distance(eyes[1].pose.position) * 0.5,
        }
    }
}
