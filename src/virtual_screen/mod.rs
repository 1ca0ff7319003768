//! # Virtual Screen
//!
//! A flat or curved "TV" floating in front of the player, showing a
//! flattened copy of the game image while menus, the console or cutscenes
//! are up.
//!
//! ## Plain English Explanation
//!
//! Each frame the left eye image is copied (with a 4:3 crop centred on the
//! lens's optical centre) into a texture. That texture is then drawn onto a
//! surface 2.5 m in front of the player, above a faint floor grid.
//!
//! Where the surface sits depends on the mode:
//!
//! - **Fixed**: placed once, stays put until the next recenter.
//! - **Follow**: drifts after the head, lazily:
//!
//! ```text
//!   head drift from target   what happens
//!   ───────────────────────  ──────────────────────────────────
//!   < 0.1 m                  stop chasing, target stays
//!   > 1.5 m (or chasing)     target = spot in front of the head
//!   > 3.0 m                  jump straight to the target
//!   always                   ease 1% of the way towards target,
//!                            then keep it exactly 2.5 m away
//! ```

pub mod mesh;

use glam::{Mat4, Vec3};

use crate::config::{VirtualScreenMode, VrConfig};
use crate::graphics::{Rect, TextureId, VirtualScreenDraw};
use crate::math::{position_in_front, projection_fov, quat_yaw, view_matrix, yaw_facing, Fov, Pose};
use crate::runtime::EyeView;

/// Distance from the head to the screen, in meters
pub const SCREEN_DISTANCE: f32 = 2.5;

/// Fraction of the remaining way covered per frame in follow mode
pub const FOLLOW_LERP: f32 = 0.01;

/// Drift below which the screen stops chasing the head
pub const SETTLE_DISTANCE: f32 = 0.1;

/// Drift above which the screen starts chasing the head
pub const FOLLOW_DISTANCE: f32 = 1.5;

/// Drift above which the screen jumps instead of easing
pub const SNAP_DISTANCE: f32 = 3.0;

/// Screen width in meters
pub const SCREEN_SCALE: f32 = 3.0;

/// How far the screen sits below eye level
pub const SCREEN_DROP: f32 = 0.2;

/// Floor grid size in meters; the negative Z keeps the grid's UVs matching the room
pub const FLOOR_SCALE: Vec3 = Vec3::new(30.0, 30.0, -30.0);

/// Aspect ratio of the flattened image
pub const CONTENT_ASPECT: f32 = 4.0 / 3.0;

const SPHERE_TOLERANCE: f32 = 0.001;
const NEAR_PLANE: f32 = 0.01;
const FAR_PLANE: f32 = 100.0;

// ============================================
// PLACEMENT
// ============================================

/// Where the screen is and where it is heading
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenPlacement {
    current: Option<Vec3>,
    target: Vec3,
    /// Starts set so a fresh placement settles onto the head's heading
    chasing: bool,
}

impl Default for ScreenPlacement {
    fn default() -> Self {
        Self {
            current: None,
            target: Vec3::ZERO,
            chasing: true,
        }
    }
}

impl ScreenPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the placement; the next update places the screen afresh
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current position, if placed
    pub fn current(&self) -> Option<Vec3> {
        self.current
    }

    /// Position the screen is easing towards
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Advances the placement one frame and returns the screen position
    pub fn update(&mut self, head: &Pose, mode: VirtualScreenMode) -> Vec3 {
        let in_front = position_in_front(head, SCREEN_DISTANCE);

        let Some(mut current) = self.current else {
            self.current = Some(in_front);
            self.target = in_front;
            return in_front;
        };

        if mode == VirtualScreenMode::Fixed {
            return current;
        }

        let drift = in_front.distance(self.target);
        if drift < SETTLE_DISTANCE {
            self.chasing = false;
        } else if drift > FOLLOW_DISTANCE || self.chasing {
            self.target = in_front;
            self.chasing = true;
        }

        if drift > SNAP_DISTANCE {
            current = self.target;
        }
        current = current.lerp(self.target, FOLLOW_LERP);

        // Keep the screen on the sphere around the head
        let offset = current - head.position;
        let distance = offset.length();
        if (distance - SCREEN_DISTANCE).abs() > SPHERE_TOLERANCE && distance > f32::EPSILON {
            current = head.position + offset / distance * SCREEN_DISTANCE;
        }

        self.current = Some(current);
        current
    }
}

// ============================================
// MODEL MATRICES
// ============================================

/// Screen model matrix: scaled, lowered, turned to face the viewer
pub fn screen_model(position: Vec3, viewer: Vec3, fov: &Fov) -> Mat4 {
    let rotation = yaw_facing(position, viewer);
    let fov_x = fov.horizontal_degrees().max(f32::EPSILON);
    let height = SCREEN_SCALE * (1.0 / CONTENT_ASPECT) * fov.vertical_degrees() / fov_x;

    Mat4::from_translation(position - Vec3::Y * SCREEN_DROP)
        * Mat4::from_quat(rotation)
        * Mat4::from_scale(Vec3::new(SCREEN_SCALE, height, SCREEN_SCALE))
}

/// Floor grid model matrix, counter-rotated so the grid stays aligned with the room
pub fn floor_model(recenter_yaw: f32) -> Mat4 {
    Mat4::from_rotation_y(-recenter_yaw) * Mat4::from_scale(FLOOR_SCALE)
}

/// 4:3 region of an eye image centred on the lens's optical centre.
///
/// The optical centre is where the straight-ahead direction lands, which on
/// most headsets is not the middle of the image.
pub fn optical_center_crop(width: u32, height: u32, fov: &Fov) -> Rect {
    let (w, h) = (width as f32, height as f32);
    let (crop_w, crop_h) = if w >= h * CONTENT_ASPECT {
        (h * CONTENT_ASPECT, h)
    } else {
        (w, w / CONTENT_ASPECT)
    };

    let center = |low: f32, high: f32, size: f32| {
        let (tan_low, tan_high) = (low.tan(), high.tan());
        let span = tan_high - tan_low;
        if span.abs() < f32::EPSILON {
            size * 0.5
        } else {
            -tan_low / span * size
        }
    };
    let center_x = center(fov.left, fov.right, w);
    let center_y = center(fov.down, fov.up, h);

    let x = (center_x - crop_w * 0.5).clamp(0.0, w - crop_w);
    let y = (center_y - crop_h * 0.5).clamp(0.0, h - crop_h);
    Rect::new(
        x.round() as i32,
        y.round() as i32,
        crop_w.round() as i32,
        crop_h.round() as i32,
    )
}

// ============================================
// RENDERER
// ============================================

/// Virtual screen state carried across frames
#[derive(Clone, Debug, Default)]
pub struct VirtualScreen {
    placement: ScreenPlacement,
    yaw: f32,
}

impl VirtualScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the placement (recenter, or screen hidden)
    pub fn reset(&mut self) {
        self.placement.reset();
        self.yaw = 0.0;
    }

    pub fn placement(&self) -> &ScreenPlacement {
        &self.placement
    }

    /// Heading of the screen in degrees, for the in-game menu
    pub fn yaw_degrees(&self) -> f32 {
        self.yaw.to_degrees()
    }

    /// Updates the placement and builds this frame's draw
    pub fn prepare(
        &mut self,
        head: &Pose,
        eyes: &[EyeView; 2],
        fov: &Fov,
        recenter_yaw: f32,
        config: &VrConfig,
        texture: TextureId,
    ) -> VirtualScreenDraw {
        let position = self.placement.update(head, config.virtual_screen_mode);
        let screen = screen_model(position, head.position, fov);
        self.yaw = quat_yaw(yaw_facing(position, head.position));

        VirtualScreenDraw {
            texture,
            shape: config.virtual_screen_shape,
            screen_model: screen,
            floor_model: floor_model(recenter_yaw),
            views: [view_matrix(&eyes[0].pose), view_matrix(&eyes[1].pose)],
            projection: projection_fov(fov, NEAR_PLANE, FAR_PLANE),
            camera: eyes[0].pose.position,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::yaw_rotation;

    const EPS: f32 = 1e-3;

    fn head_at(x: f32, z: f32, yaw_degrees: f32) -> Pose {
        Pose::new(Vec3::new(x, 1.6, z), yaw_rotation(yaw_degrees.to_radians()))
    }

    #[test]
    fn test_first_update_places_in_front() {
        let mut placement = ScreenPlacement::new();
        let p = placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);

        assert!(p.distance(Vec3::new(0.0, 1.6, -2.5)) < EPS);
        assert_eq!(placement.target(), p);
    }

    #[test]
    fn test_fixed_mode_never_moves() {
        let mut placement = ScreenPlacement::new();
        let first = placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Fixed);

        for (x, z, yaw) in [(1.0, 0.0, 90.0), (5.0, 5.0, 180.0), (-3.0, 2.0, -45.0)] {
            let p = placement.update(&head_at(x, z, yaw), VirtualScreenMode::Fixed);
            assert_eq!(p, first);
        }
    }

    #[test]
    fn test_small_drift_keeps_target() {
        let mut placement = ScreenPlacement::new();
        placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);
        let target = placement.target();

        placement.update(&head_at(0.05, 0.0, 0.0), VirtualScreenMode::Follow);
        assert_eq!(placement.target(), target);

        // Between the settle and follow distances nothing is chased either
        placement.update(&head_at(0.0, 0.0, 20.0), VirtualScreenMode::Follow);
        assert_eq!(placement.target(), target);
    }

    #[test]
    fn test_fresh_placement_chases_first_move() {
        let mut placement = ScreenPlacement::new();
        placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);

        // Well under the follow distance, but a new screen is still settling
        let head = head_at(0.0, 0.0, 20.0);
        placement.update(&head, VirtualScreenMode::Follow);
        assert!(placement.target().distance(position_in_front(&head, SCREEN_DISTANCE)) < EPS);

        // Resetting starts a new settle
        placement.reset();
        placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);
        let head = head_at(0.0, 0.0, -20.0);
        placement.update(&head, VirtualScreenMode::Follow);
        assert!(placement.target().distance(position_in_front(&head, SCREEN_DISTANCE)) < EPS);
    }

    #[test]
    fn test_floor_and_projection_match_draw_setup() {
        let floor = floor_model(0.0);
        let corner = floor.transform_point3(Vec3::new(0.5, 0.0, 0.5));
        assert!(corner.distance(Vec3::new(15.0, 0.0, -15.0)) < EPS);

        let mut screen = VirtualScreen::new();
        let head = head_at(0.0, 0.0, 0.0);
        let fov = Fov::symmetric(0.8);
        let eyes = [EyeView { pose: head, fov }, EyeView { pose: head, fov }];
        let draw = screen.prepare(&head, &eyes, &fov, 0.0, &VrConfig::default(), TextureId(1));
        assert_eq!(draw.projection, projection_fov(&fov, 0.01, 100.0));
    }

    #[test]
    fn test_large_drift_starts_chasing() {
        let mut placement = ScreenPlacement::new();
        let start = placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);

        let head = head_at(0.0, 0.0, 45.0);
        let p = placement.update(&head, VirtualScreenMode::Follow);

        assert!(placement.target().distance(position_in_front(&head, SCREEN_DISTANCE)) < EPS);
        // Eased, not jumped
        assert!(p.distance(start) < 0.1);
        assert!((p.distance(head.position) - SCREEN_DISTANCE).abs() < EPS);
    }

    #[test]
    fn test_huge_drift_snaps() {
        let mut placement = ScreenPlacement::new();
        placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Follow);

        let head = head_at(0.0, 0.0, 180.0);
        let p = placement.update(&head, VirtualScreenMode::Follow);

        assert!(p.distance(position_in_front(&head, SCREEN_DISTANCE)) < EPS);
        assert!(p.distance(placement.target()) < EPS);
    }

    #[test]
    fn test_reset_replaces_screen() {
        let mut placement = ScreenPlacement::new();
        placement.update(&head_at(0.0, 0.0, 0.0), VirtualScreenMode::Fixed);
        placement.reset();
        assert!(placement.current().is_none());

        let head = head_at(0.0, 0.0, 90.0);
        let p = placement.update(&head, VirtualScreenMode::Fixed);
        assert!(p.distance(position_in_front(&head, SCREEN_DISTANCE)) < EPS);
    }

    #[test]
    fn test_optical_crop_follows_lens_center() {
        // Narrower than 4:3, so the full width is kept and the crop is centred
        let centred = optical_center_crop(1600, 1440, &Fov::symmetric(0.8));
        assert_eq!(centred, Rect::new(0, 120, 1600, 1200));
    }

    #[test]
    fn test_optical_crop_shifts_with_asymmetric_fov() {
        let fov = Fov::new(-0.9, 0.7, 0.9, -0.5);
        let crop = optical_center_crop(2000, 2000, &fov);
        let centred = optical_center_crop(2000, 2000, &Fov::symmetric(0.8));

        assert_eq!((crop.width, crop.height), (2000, 1500));
        // More field above than below: the straight-ahead point sits low
        assert!(crop.y < centred.y);
    }

    #[test]
    fn test_screen_model_faces_viewer_and_drops() {
        let viewer = Vec3::new(0.0, 1.6, 0.0);
        let position = Vec3::new(0.0, 1.6, -2.5);
        let model = screen_model(position, viewer, &Fov::symmetric(0.8));

        let centre = model.transform_point3(Vec3::ZERO);
        assert!((centre.y - (1.6 - SCREEN_DROP)).abs() < EPS);

        let normal = model.transform_vector3(Vec3::Z).normalize();
        assert!(normal.z > 0.99);
    }

    #[test]
    fn test_prepare_reports_menu_yaw() {
        let mut screen = VirtualScreen::new();
        let head = head_at(0.0, 0.0, 90.0);
        let eyes = [
            EyeView { pose: head, fov: Fov::symmetric(0.8) },
            EyeView { pose: head, fov: Fov::symmetric(0.8) },
        ];

        screen.prepare(
            &head,
            &eyes,
            &Fov::symmetric(0.8),
            0.0,
            &VrConfig::default(),
            TextureId(1),
        );

        // Screen sits at -X facing back at the viewer, same heading as the head
        assert!((screen.yaw_degrees() - 90.0).abs() < 0.1);
    }
}
