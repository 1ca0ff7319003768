//! # Error Types Module
//!
//! This module defines the error types used throughout the VR layer.
//!
//! ## Plain English Explanation
//!
//! Almost every call we make goes to the OpenXR runtime or to the GPU driver.
//! When one of those calls fails, the frame loop cannot sensibly continue:
//! a half-submitted frame or a missing swapchain leaves the headset showing
//! garbage. So errors here come in two flavours:
//!
//! - **Described errors** (`VrError`): returned with `?` from every internal
//!   function, carrying the operation name and the runtime's result code.
//! - **Fatal errors**: at the public per-frame entry points, any `VrError`
//!   is logged and turned into a panic with [`fatal`]. Release builds abort
//!   on panic, which ends the process with the diagnostic in the log.
//!
//! Transient runtime conditions (session not yet focused, frame not ready to
//! render) are never errors; they are ordinary control flow.

use log::error;
use openxr as xr;
use thiserror::Error;

use crate::config::ConfigError;

// ============================================
// MAIN ERROR
// ============================================

/// The main error type for the VR layer
#[derive(Debug, Error)]
pub enum VrError {
    /// The OpenXR loader could not be found or initialised
    #[error("OpenXR loader unavailable: {0}")]
    Loader(String),

    /// A required runtime extension is missing
    #[error("OpenXR extension {0} is not supported by the runtime")]
    MissingExtension(&'static str),

    /// An OpenXR call returned a failure code
    ///
    /// ## Examples
    /// - `xrWaitFrame` returning `XR_ERROR_SESSION_LOST`
    /// - `xrCreateSwapchain` rejecting a format
    #[error("[OpenXR] {operation} failed: {} ({code})", .code.into_raw())]
    Runtime {
        /// The OpenXR function that failed
        operation: &'static str,
        /// The raw result reported by the runtime
        code: xr::sys::Result,
    },

    /// The frame or session state machine was driven out of order
    ///
    /// ## Examples
    /// - Beginning a frame while one is already open
    /// - A READY transition while the session is already running
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Swapchain negotiation failed
    #[error("swapchain negotiation failed: {0}")]
    Format(FormatErrorKind),

    /// A GL object could not be created or is incomplete
    #[error("graphics error: {0}")]
    Graphics(String),

    /// A handle did not refer to a live runtime object
    #[error("unknown {kind} handle {id}")]
    UnknownHandle {
        /// What kind of object was looked up
        kind: &'static str,
        /// The handle value
        id: u64,
    },

    /// Configuration rejected at startup
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl VrError {
    /// Wraps a failed OpenXR call.
    pub fn runtime(operation: &'static str, code: xr::sys::Result) -> Self {
        Self::Runtime { operation, code }
    }

    /// Builds a protocol violation from anything printable.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Specific swapchain negotiation failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatErrorKind {
    /// None of the preferred color formats are offered
    #[error("no supported color format among {available:?}")]
    NoColorFormat { available: Vec<u32> },

    /// None of the preferred depth formats are offered
    #[error("no supported depth format among {available:?}")]
    NoDepthFormat { available: Vec<u32> },

    /// The two eyes report different recommended sizes
    #[error("eye sizes differ: {left:?} vs {right:?}")]
    EyeSizeMismatch { left: (u32, u32), right: (u32, u32) },

    /// The runtime reported an unexpected number of views
    #[error("expected 2 views, runtime reported {0}")]
    ViewCount(usize),
}

/// Result alias used across the crate
pub type VrResult<T> = Result<T, VrError>;

// ============================================
// FATAL HANDLING
// ============================================

/// Logs an unrecoverable error and stops the frame loop.
///
/// The release profile aborts on panic, so this terminates the process.
#[track_caller]
pub fn fatal(context: &str, err: &VrError) -> ! {
    error!("Fatal error while {}: {}", context, err);
    panic!("fatal VR error while {context}: {err}");
}

/// Converts a `VrResult` into a value or a fatal stop.
pub trait OrFatal<T> {
    /// Returns the value, or logs and panics with `context`.
    fn or_fatal(self, context: &str) -> T;
}

impl<T> OrFatal<T> for VrResult<T> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(context, &err),
        }
    }
}

// ============================================
// TESTS
// ============================================
