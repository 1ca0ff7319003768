//! # Configuration Module
//!
//! This module holds every user-adjustable VR setting.
//!
//! ## Plain English Explanation
//!
//! In the engine these are console variables (`vr_superSampling`,
//! `vr_desktopMode`, ...). The VR layer reads them once per frame and writes
//! one of them back: the headset refresh rate, which the runtime may change
//! under our feet.
//!
//! Settings include:
//! - How much to supersample the eye buffers
//! - What the desktop window mirrors, and how it fits the window
//! - How the in-VR virtual screen behaves and what shape it has
//! - How strong controller vibration feels

use log::warn;
use thiserror::Error;

// ============================================
// DESKTOP MIRROR OPTIONS
// ============================================

/// Which eye image the desktop window shows
///
/// The values form a bitmask: `BothEyes` is `LeftEye | RightEye`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DesktopView {
    /// Only the left eye fills the window
    LeftEye = 1,
    /// Only the right eye fills the window
    RightEye = 2,
    /// Left eye in the left half, right eye in the right half
    #[default]
    BothEyes = 3,
}

impl DesktopView {
    /// Decodes the `vr_desktopMode` console value (0 = left, 1 = right, 2 = both).
    pub fn from_cvar(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::LeftEye),
            1 => Some(Self::RightEye),
            2 => Some(Self::BothEyes),
            _ => None,
        }
    }

    /// True when the left eye contributes to the window
    pub fn shows_left(self) -> bool {
        (self as u8) & (Self::LeftEye as u8) != 0
    }

    /// True when the right eye contributes to the window
    pub fn shows_right(self) -> bool {
        (self as u8) & (Self::RightEye as u8) != 0
    }
}

/// How an eye image is fitted into its part of the desktop window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DesktopFit {
    /// Fill the window, cutting away whatever sticks out
    #[default]
    Crop,
    /// Show the whole image, leaving black bars
    Letterbox,
}

impl DesktopFit {
    /// Decodes the `vr_desktopFit` console value.
    pub fn from_cvar(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Crop),
            1 => Some(Self::Letterbox),
            _ => None,
        }
    }
}

// ============================================
// VIRTUAL SCREEN OPTIONS
// ============================================

/// Whether the virtual screen follows the head
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VirtualScreenMode {
    /// Placed once in front of the player and never moved until recentered
    Fixed,
    /// Drifts after the head when the player looks or walks away
    #[default]
    Follow,
}

impl VirtualScreenMode {
    /// Decodes the `vr_virtualScreenMode` console value.
    pub fn from_cvar(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Fixed),
            1 => Some(Self::Follow),
            _ => None,
        }
    }
}

/// Surface the virtual screen is drawn on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VirtualScreenShape {
    /// Section of a cylinder wrapping around the viewer
    #[default]
    Curved,
    /// Plain quad
    Flat,
}

impl VirtualScreenShape {
    /// Decodes the `vr_virtualScreenShape` console value.
    pub fn from_cvar(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Curved),
            1 => Some(Self::Flat),
            _ => None,
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

/// All VR settings
///
/// ## Plain English
///
/// This is the "VR options menu". The frame loop reads it each frame, so
/// changes take effect on the next frame, except `super_sampling`, which
/// only applies when swapchains are (re)created.
#[derive(Clone, Debug, PartialEq)]
pub struct VrConfig {
    // ----------------------------------------
    // RESOLUTION
    // ----------------------------------------
    /// Eye buffer size multiplier over the runtime's recommendation
    ///
    /// ## Limits
    /// - 0 means "use the default" (1.1)
    /// - Otherwise clamped to 0.5 ..= 4.0 when swapchains are created
    pub super_sampling: f32,

    // ----------------------------------------
    // DESKTOP WINDOW
    // ----------------------------------------
    /// Mirror the headset view into the desktop window
    pub desktop_mirror: bool,

    /// Which eye(s) the mirror shows
    pub desktop_view: DesktopView,

    /// How the mirror fits the window
    pub desktop_fit: DesktopFit,

    // ----------------------------------------
    // VIRTUAL SCREEN
    // ----------------------------------------
    /// Fixed or head-following placement
    pub virtual_screen_mode: VirtualScreenMode,

    /// Curved or flat surface
    pub virtual_screen_shape: VirtualScreenShape,

    // ----------------------------------------
    // DEBUG
    // ----------------------------------------
    /// Third-person spectator debug mode (tints the eye buffer clear color)
    pub third_person_spectator: bool,

    // ----------------------------------------
    // FEEDBACK
    // ----------------------------------------
    /// Controller vibration strength (0.0 disables vibration)
    pub haptic_intensity: f32,

    // ----------------------------------------
    // RUNTIME-REPORTED
    // ----------------------------------------
    /// Headset refresh rate in Hz, written back when the runtime changes it
    pub refresh_rate: f32,
}

/// Multiplier used when `super_sampling` is 0
pub const DEFAULT_SUPER_SAMPLING: f32 = 1.1;

/// Smallest accepted supersampling multiplier
pub const MIN_SUPER_SAMPLING: f32 = 0.5;

/// Largest accepted supersampling multiplier
pub const MAX_SUPER_SAMPLING: f32 = 4.0;

impl VrConfig {
    /// Creates a configuration with all default values
    pub fn new() -> Self {
        Self {
            super_sampling: 0.0,
            desktop_mirror: true,
            desktop_view: DesktopView::default(),
            desktop_fit: DesktopFit::default(),
            virtual_screen_mode: VirtualScreenMode::default(),
            virtual_screen_shape: VirtualScreenShape::default(),
            third_person_spectator: false,
            haptic_intensity: 1.0,
            refresh_rate: 72.0,
        }
    }

    /// Creates a configuration for weaker GPUs
    ///
    /// ## When to Use
    /// Standalone headsets or older desktop cards: renders below the
    /// recommended size and skips the desktop mirror blits.
    pub fn performance() -> Self {
        Self {
            super_sampling: 0.8,
            desktop_mirror: false,
            virtual_screen_shape: VirtualScreenShape::Flat,
            ..Self::new()
        }
    }

    /// The multiplier actually applied to the recommended eye size
    pub fn effective_super_sampling(&self) -> f32 {
        if self.super_sampling == 0.0 {
            DEFAULT_SUPER_SAMPLING
        } else {
            self.super_sampling
                .clamp(MIN_SUPER_SAMPLING, MAX_SUPER_SAMPLING)
        }
    }

    /// True when vibration should be sent to the controllers
    pub fn haptics_enabled(&self) -> bool {
        self.haptic_intensity > 0.1
    }

    /// Validates the configuration and returns errors if invalid
    ///
    /// ## Plain English
    /// Makes sure all settings are within reasonable bounds.
    /// Returns a list of problems, or empty if all is well.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.super_sampling != 0.0
            && !(MIN_SUPER_SAMPLING..=MAX_SUPER_SAMPLING).contains(&self.super_sampling)
        {
            errors.push(ConfigError::SuperSamplingOutOfRange(self.super_sampling));
        }

        if !(0.0..=1.0).contains(&self.haptic_intensity) {
            errors.push(ConfigError::HapticIntensityOutOfRange(self.haptic_intensity));
        }

        if self.refresh_rate <= 0.0 {
            errors.push(ConfigError::InvalidRefreshRate(self.refresh_rate));
        }

        errors
    }

    /// Accepts or rejects the settings as a whole.
    ///
    /// Every problem is logged; the first one is returned.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut errors = self.validate().into_iter();
        let Some(first) = errors.next() else {
            return Ok(());
        };
        warn!("Invalid VR setting: {}", first);
        for error in errors {
            warn!("Invalid VR setting: {}", error);
        }
        Err(first)
    }
}

impl Default for VrConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// CONFIGURATION ERRORS
// ============================================

/// Errors that can occur with configuration values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Supersampling multiplier is outside 0.5 ..= 4.0
    #[error("supersampling {0} is outside the valid range (0.5-4.0, or 0 for default)")]
    SuperSamplingOutOfRange(f32),

    /// Vibration strength is outside 0.0 ..= 1.0
    #[error("haptic intensity {0} is outside the valid range (0.0-1.0)")]
    HapticIntensityOutOfRange(f32),

    /// Refresh rate must be positive
    #[error("refresh rate {0} Hz is not positive")]
    InvalidRefreshRate(f32),
}

// ============================================
// TESTS
// ============================================
