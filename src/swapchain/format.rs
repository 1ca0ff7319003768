//! Swapchain format and size negotiation.
//!
//! ## Plain English
//!
//! The runtime offers a list of GL formats it can allocate. We walk our own
//! preference list and take the first one it offers. Eye buffer size is the
//! runtime's recommendation times the supersampling setting, shrunk
//! uniformly when that would exceed what the runtime allows.

use log::{info, warn};

use crate::error::{FormatErrorKind, VrError, VrResult};
use crate::runtime::ViewConfigView;

/// Color formats in order of preference
pub const COLOR_FORMATS: [u32; 5] = [
    glow::SRGB8_ALPHA8,
    glow::RGBA16F,
    glow::RGBA8,
    glow::RGB10_A2,
    glow::RGBA8_SNORM,
];

/// Depth formats in order of preference
pub const DEPTH_FORMATS: [u32; 4] = [
    glow::DEPTH_COMPONENT32F,
    glow::DEPTH_COMPONENT32,
    glow::DEPTH_COMPONENT24,
    glow::DEPTH_COMPONENT16,
];

/// A negotiated format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatChoice {
    pub format: u32,
    /// False when we had to settle for something below our first choice
    pub preferred: bool,
}

/// Human-readable GL format name for logs
pub fn format_name(format: u32) -> &'static str {
    match format {
        glow::SRGB8_ALPHA8 => "GL_SRGB8_ALPHA8",
        glow::RGBA16F => "GL_RGBA16F",
        glow::RGBA8 => "GL_RGBA8",
        glow::RGB10_A2 => "GL_RGB10_A2",
        glow::RGBA8_SNORM => "GL_RGBA8_SNORM",
        glow::DEPTH_COMPONENT32F => "GL_DEPTH_COMPONENT32F",
        glow::DEPTH_COMPONENT32 => "GL_DEPTH_COMPONENT32",
        glow::DEPTH_COMPONENT24 => "GL_DEPTH_COMPONENT24",
        glow::DEPTH_COMPONENT16 => "GL_DEPTH_COMPONENT16",
        _ => "unknown",
    }
}

fn describe(available: &[u32]) -> String {
    available
        .iter()
        .map(|f| format!("{} (0x{:x})", format_name(*f), f))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select(preferences: &[u32], available: &[u32]) -> Option<FormatChoice> {
    preferences
        .iter()
        .position(|f| available.contains(f))
        .map(|index| FormatChoice {
            format: preferences[index],
            preferred: index == 0,
        })
}

/// Picks the eye buffer color format
pub fn select_color_format(available: &[u32]) -> VrResult<FormatChoice> {
    let choice = select(&COLOR_FORMATS, available).ok_or_else(|| {
        VrError::Format(FormatErrorKind::NoColorFormat {
            available: available.to_vec(),
        })
    })?;

    if !choice.preferred {
        warn!(
            "{} not offered, falling back to {}. Available: {}",
            format_name(COLOR_FORMATS[0]),
            format_name(choice.format),
            describe(available)
        );
    }
    info!("Color swapchain format: {}", format_name(choice.format));
    Ok(choice)
}

/// Picks the eye buffer depth format
pub fn select_depth_format(available: &[u32]) -> VrResult<FormatChoice> {
    let choice = select(&DEPTH_FORMATS, available).ok_or_else(|| {
        VrError::Format(FormatErrorKind::NoDepthFormat {
            available: available.to_vec(),
        })
    })?;
    info!("Depth swapchain format: {}", format_name(choice.format));
    Ok(choice)
}

/// Eye buffer size for a view, given an already-clamped supersampling factor
pub fn negotiate_resolution(view: &ViewConfigView, super_sampling: f32) -> (u32, u32) {
    let recommended_w = view.recommended_width as f32;
    let recommended_h = view.recommended_height as f32;

    let mut factor = super_sampling;
    if recommended_w * factor > view.max_width as f32
        || recommended_h * factor > view.max_height as f32
    {
        factor = (view.max_width as f32 / recommended_w).min(view.max_height as f32 / recommended_h);
        info!(
            "Supersampling {:.2} exceeds {}x{}, using {:.3}",
            super_sampling, view.max_width, view.max_height, factor
        );
    }

    let width = ((recommended_w * factor) as u32).min(view.max_width);
    let height = ((recommended_h * factor) as u32).min(view.max_height);
    (width, height)
}
