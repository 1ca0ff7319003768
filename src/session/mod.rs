//! # Session & Event Processing
//!
//! Drains runtime events and tracks the session lifecycle.
//!
//! ## Plain English Explanation
//!
//! The runtime tells us what is going on through a queue of events: the
//! headset was put on, taken off, the user recentered, the refresh rate
//! changed. We empty that queue once per frame and keep three flags:
//!
//! ```text
//!   READY ─► (begin session) ─► active
//!   SYNCHRONIZED ─► running but not shown
//!   VISIBLE ─► shown, no input focus (system menu on top)
//!   FOCUSED ─► shown with input
//!   STOPPING ─► (end session) ─► inactive
//! ```

use ::openxr as xr;
use log::{info, warn};

use crate::config::VrConfig;
use crate::error::{VrError, VrResult};
use crate::hooks::GameHooks;
use crate::runtime::{RuntimeEvent, XrRuntime};

/// Session liveness flags
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    /// Session has begun and frames must be submitted
    pub active: bool,
    /// Input goes to us
    pub focused: bool,
    /// Our frames are shown
    pub visible: bool,
    /// Refresh rate last reported by the runtime
    pub refresh_rate: Option<f32>,
    /// The runtime announced it is going away
    pub loss_pending: Option<xr::Time>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains all pending events.
    ///
    /// Returns true when a recenter was requested by the runtime.
    pub fn poll_events<R>(
        &mut self,
        runtime: &mut R,
        hooks: &mut dyn GameHooks,
        config: &mut VrConfig,
    ) -> VrResult<bool>
    where
        R: XrRuntime + ?Sized,
    {
        let mut recenter = false;
        while let Some(event) = runtime.poll_event()? {
            recenter |= self.handle_event(event, runtime, hooks, config)?;
        }
        Ok(recenter)
    }

    fn handle_event<R>(
        &mut self,
        event: RuntimeEvent,
        runtime: &mut R,
        hooks: &mut dyn GameHooks,
        config: &mut VrConfig,
    ) -> VrResult<bool>
    where
        R: XrRuntime + ?Sized,
    {
        match event {
            RuntimeEvent::EventsLost { count } => {
                warn!("[OpenXR] {} events lost", count);
            }
            RuntimeEvent::InstanceLossPending { loss_time } => {
                // Instance recreation is left to the embedding application
                warn!(
                    "[OpenXR] Instance loss pending at {} ns",
                    loss_time.as_nanos()
                );
                self.loss_pending = Some(loss_time);
            }
            RuntimeEvent::InteractionProfileChanged => {
                info!("[OpenXR] Interaction profile changed");
            }
            RuntimeEvent::DisplayRefreshRateChanged { from, to } => {
                info!("[OpenXR] Display refresh rate {} Hz -> {} Hz", from, to);
                self.refresh_rate = Some(to);
                config.refresh_rate = to;
            }
            RuntimeEvent::ReferenceSpaceChangePending {
                session,
                space_type,
            } => {
                info!(
                    "[OpenXR] Reference space change pending for {:?}",
                    space_type
                );
                if session == runtime.session_id() {
                    return Ok(true);
                }
            }
            RuntimeEvent::SessionStateChanged { session, state } => {
                if session != runtime.session_id() {
                    return Ok(false);
                }
                self.handle_state(state, runtime, hooks)?;
            }
            RuntimeEvent::Other => {}
        }
        Ok(false)
    }

    fn handle_state<R>(
        &mut self,
        state: xr::SessionState,
        runtime: &mut R,
        hooks: &mut dyn GameHooks,
    ) -> VrResult<()>
    where
        R: XrRuntime + ?Sized,
    {
        info!("[OpenXR] Session state -> {:?}", state);

        match state {
            xr::SessionState::FOCUSED => {
                self.focused = true;
                self.visible = true;
            }
            xr::SessionState::VISIBLE => {
                self.focused = false;
                self.visible = true;
            }
            xr::SessionState::SYNCHRONIZED => {
                if self.visible {
                    // Headset taken off or system overlay opened
                    hooks.open_menu_and_pause_if_possible();
                }
                self.focused = false;
                self.visible = false;
            }
            xr::SessionState::READY => {
                self.visible = false;
                if self.active {
                    return Err(VrError::protocol("READY received for an active session"));
                }
                runtime.begin_session()?;
                self.active = true;
                info!("[OpenXR] Session started");
            }
            xr::SessionState::STOPPING => {
                self.visible = false;
                self.focused = false;
                if !self.active {
                    return Err(VrError::protocol("STOPPING received for an inactive session"));
                }
                runtime.end_session()?;
                self.active = false;
                info!("[OpenXR] Session ended");
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
