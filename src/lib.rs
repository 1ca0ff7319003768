//! # Q3VR XR
//!
//! OpenXR head-mounted display support for an OpenGL first-person shooter
//! client: session lifecycle, reference spaces, swapchains, the per-frame
//! loop and compositor layers, a floating "virtual screen" for menus, and a
//! desktop mirror window.
//!
//! ## Architecture Overview
//!
//! The crate is structured into independent modules:
//!
//! - `runtime`: The OpenXR seam (`XrRuntime`) and its real implementation
//! - `graphics`: The OpenGL seam (`GraphicsBackend`) and its glow implementation
//! - `session`: Runtime events and the session state machine
//! - `space`: Reference spaces and recentering
//! - `swapchain`: Format/size negotiation, image sets, desktop mirror planning
//! - `frame`: The frame loop, projections and compositor layers
//! - `virtual_screen`: Placement and meshes for the floating screen
//! - `haptics`: Controller vibration and external haptic devices
//! - `hooks`: What the engine provides and receives
//! - `math`: Poses, fields of view and projection matrices
//! - `config`: User settings
//! - `error`: Error types
//!
//! ## Frame Flow
//!
//! ```text
//!   engine main loop
//!        │
//!        ▼
//!   FrameOrchestrator::process_frame
//!        │  poll events ─► wait ─► begin ─► acquire
//!        │
//!        ├──► GameHooks::run_game_frame  (engine renders)
//!        │
//!        └──► release ─► desktop mirror ─► layers ─► end
//! ```

// ============================================
// MODULE DECLARATIONS
// ============================================

pub mod config;
pub mod error;
pub mod frame;
pub mod graphics;
pub mod haptics;
pub mod hooks;
pub mod math;
pub mod runtime;
pub mod session;
pub mod space;
pub mod swapchain;
pub mod virtual_screen;

// ============================================
// RE-EXPORTS
// ============================================

pub use config::VrConfig;
pub use error::{VrError, VrResult};
pub use frame::FrameOrchestrator;
pub use graphics::{GlBackend, GraphicsBackend};
pub use haptics::{HapticsBackend, NoopHaptics};
pub use hooks::{FramePresenter, GameHooks};
pub use runtime::{OpenXrRuntime, XrRuntime};

/// Frame orchestrator over the real OpenXR runtime and GL backend
pub type HmdRenderer = FrameOrchestrator<OpenXrRuntime, GlBackend>;

// ============================================
// LOGGING
// ============================================

/// Initialize logging for the platform.
///
/// Safe to call more than once.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Info)
                .with_tag("Q3VR"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .try_init();
    }
}

// ============================================
// TESTS
// ============================================
