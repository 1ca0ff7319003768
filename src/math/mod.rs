//! # Math and Geometry Helpers
//!
//! Poses, fields of view and the handful of transforms the frame loop needs.
//!
//! ## Plain English Explanation
//!
//! OpenXR describes where things are with a **pose** (a position plus a
//! rotation) and what an eye can see with a **field of view** given as four
//! angles. The game engine wants classic projection matrices and Quake-style
//! pitch/yaw/roll in degrees. This module converts between the two worlds.
//!
//! Coordinate convention (OpenXR): +X right, +Y up, -Z forward.

use glam::{Mat4, Quat, Vec3};
use openxr as xr;

// ============================================
// POSE
// ============================================

/// A rigid transform: where something is and which way it faces
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Position in meters
    pub position: Vec3,
    /// Orientation as a unit quaternion
    pub orientation: Quat,
}

impl Pose {
    /// The identity pose: at the origin, looking down -Z
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Creates a pose from its parts
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// A pose that only translates
    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Heading around +Y in radians (0 = looking down -Z, positive = turned left)
    pub fn yaw(&self) -> f32 {
        quat_yaw(self.orientation)
    }

    /// Converts to the runtime's pose struct
    pub fn to_xr(self) -> xr::Posef {
        xr::Posef {
            orientation: xr::Quaternionf {
                x: self.orientation.x,
                y: self.orientation.y,
                z: self.orientation.z,
                w: self.orientation.w,
            },
            position: xr::Vector3f {
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
            },
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<xr::Posef> for Pose {
    fn from(pose: xr::Posef) -> Self {
        Self {
            position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
            orientation: Quat::from_xyzw(
                pose.orientation.x,
                pose.orientation.y,
                pose.orientation.z,
                pose.orientation.w,
            ),
        }
    }
}

// ============================================
// FIELD OF VIEW
// ============================================

/// Asymmetric field of view, angles in radians
///
/// `left` and `down` are usually negative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fov {
    pub left: f32,
    pub right: f32,
    pub up: f32,
    pub down: f32,
}

impl Fov {
    /// Creates a field of view from its four angles
    pub fn new(left: f32, right: f32, up: f32, down: f32) -> Self {
        Self {
            left,
            right,
            up,
            down,
        }
    }

    /// A symmetric field of view spanning `half_angle` on every side
    pub fn symmetric(half_angle: f32) -> Self {
        Self::new(-half_angle, half_angle, half_angle, -half_angle)
    }

    /// Averages a set of per-eye fields of view into one combined view
    pub fn average(fovs: &[Fov]) -> Self {
        if fovs.is_empty() {
            return Self::default();
        }
        let n = fovs.len() as f32;
        fovs.iter().fold(Self::default(), |acc, f| Self {
            left: acc.left + f.left / n,
            right: acc.right + f.right / n,
            up: acc.up + f.up / n,
            down: acc.down + f.down / n,
        })
    }

    /// Narrows every angle by `divisor` (weapon zoom)
    pub fn zoomed(&self, divisor: f32) -> Self {
        Self::new(
            self.left / divisor,
            self.right / divisor,
            self.up / divisor,
            self.down / divisor,
        )
    }

    /// Total horizontal extent in degrees
    pub fn horizontal_degrees(&self) -> f32 {
        (self.right - self.left).to_degrees()
    }

    /// Total vertical extent in degrees
    pub fn vertical_degrees(&self) -> f32 {
        (self.up - self.down).to_degrees()
    }

    /// Converts to the runtime's field-of-view struct
    pub fn to_xr(self) -> xr::Fovf {
        xr::Fovf {
            angle_left: self.left,
            angle_right: self.right,
            angle_up: self.up,
            angle_down: self.down,
        }
    }
}

impl From<xr::Fovf> for Fov {
    fn from(fov: xr::Fovf) -> Self {
        Self::new(fov.angle_left, fov.angle_right, fov.angle_up, fov.angle_down)
    }
}

// ============================================
// PROJECTION
// ============================================

/// OpenGL projection matrix for an asymmetric field of view.
///
/// Clip-space Z runs from -1 to 1. When `far <= near` the far plane is placed
/// at infinity.
pub fn projection_fov(fov: &Fov, near: f32, far: f32) -> Mat4 {
    let tan_left = fov.left.tan();
    let tan_right = fov.right.tan();
    let tan_down = fov.down.tan();
    let tan_up = fov.up.tan();

    let width = tan_right - tan_left;
    let height = tan_up - tan_down;
    let offset_z = near;

    let (z_scale, z_offset) = if far <= near {
        (-1.0, -(near + offset_z))
    } else {
        (
            -(far + offset_z) / (far - near),
            -(far * (near + offset_z)) / (far - near),
        )
    };

    Mat4::from_cols_array(&[
        2.0 / width,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 / height,
        0.0,
        0.0,
        (tan_right + tan_left) / width,
        (tan_up + tan_down) / height,
        z_scale,
        -1.0,
        0.0,
        0.0,
        z_offset,
        0.0,
    ])
}

/// World-to-eye matrix for a pose: inverse(translation × rotation)
pub fn view_matrix(pose: &Pose) -> Mat4 {
    (Mat4::from_translation(pose.position) * Mat4::from_quat(pose.orientation)).inverse()
}

// ============================================
// YAW HELPERS
// ============================================

/// Heading of a rotation around +Y, in radians
pub fn quat_yaw(q: Quat) -> f32 {
    (2.0 * (q.w * q.y + q.x * q.z)).atan2(1.0 - 2.0 * (q.x * q.x + q.y * q.y))
}

/// Rotation of `yaw` radians around +Y: (0, sin(yaw/2), 0, cos(yaw/2))
pub fn yaw_rotation(yaw: f32) -> Quat {
    let half = yaw * 0.5;
    Quat::from_xyzw(0.0, half.sin(), 0.0, half.cos())
}

/// Point `distance` meters ahead of a pose, using its heading only.
///
/// The result stays at the pose's height, so looking up or down does not
/// lift the point.
pub fn position_in_front(pose: &Pose, distance: f32) -> Vec3 {
    let yaw = pose.yaw();
    let forward = Vec3::new(-yaw.sin(), 0.0, -yaw.cos());
    pose.position + forward * distance
}

/// Rotation around +Y that turns an object at `object` so its +Z side faces `viewer`
pub fn yaw_facing(object: Vec3, viewer: Vec3) -> Quat {
    let dir = viewer - object;
    if dir.x.abs() < f32::EPSILON && dir.z.abs() < f32::EPSILON {
        return Quat::IDENTITY;
    }
    yaw_rotation(dir.x.atan2(dir.z))
}

// ============================================
// ENGINE ANGLES
// ============================================

/// Quake-style view angles in degrees
///
/// Pitch is positive looking down, yaw positive turning left, roll positive
/// tilting right.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EulerAngles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl EulerAngles {
    /// Extracts engine view angles from a head orientation
    pub fn from_quat(q: Quat) -> Self {
        let forward = q * Vec3::NEG_Z;
        let right = q * Vec3::X;
        let up = q * Vec3::Y;

        Self {
            pitch: -forward.y.clamp(-1.0, 1.0).asin().to_degrees(),
            yaw: (-forward.x).atan2(-forward.z).to_degrees(),
            roll: (-right.y).atan2(up.y).to_degrees(),
        }
    }
}

// ============================================
// TESTS
// ============================================
