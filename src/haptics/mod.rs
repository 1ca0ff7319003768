//! # Haptics Module
//!
//! Controller vibration scheduling and an optional haptic-vest backend.
//!
//! ## Plain English Explanation
//!
//! Game code says "buzz the right controller at 60% for 120 ms". The
//! scheduler remembers that per channel and, once per frame, turns it into
//! commands the input layer applies to the controllers: start at this
//! strength, or stop.
//!
//! Richer feedback devices (vests, arm bands) get named events through the
//! [`HapticsBackend`] trait. Nothing ships with one; [`NoopHaptics`] is the
//! default.

use std::time::Instant;

use log::{debug, info};

use crate::config::VrConfig;
use crate::error::VrResult;

/// Channel mask bit for the left controller
pub const CHANNEL_LEFT: u8 = 1;

/// Channel mask bit for the right controller
pub const CHANNEL_RIGHT: u8 = 2;

/// Duration meaning "until told otherwise"
pub const CONTINUOUS: f32 = -1.0;

/// Which controller a command targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// What the input layer should do with a controller this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChannelCommand {
    Apply { hand: Hand, intensity: f32 },
    Stop { hand: Hand },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Remaining {
    Idle,
    Millis(f32),
    Continuous,
}

#[derive(Clone, Copy, Debug)]
struct Channel {
    remaining: Remaining,
    intensity: f32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            remaining: Remaining::Idle,
            intensity: 0.0,
        }
    }
}

// ============================================
// SCHEDULER
// ============================================

/// Per-controller vibration state
#[derive(Debug, Default)]
pub struct VibrationScheduler {
    channels: [Channel; 2],
}

impl VibrationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a vibration on the channels in `mask`.
    ///
    /// A channel already running a timed vibration keeps it. A continuous
    /// vibration can only be replaced by a zero-length request, which stops it.
    /// Channels are visited left then right, and the first busy one ends the
    /// request, so channels after it are left alone.
    pub fn vibrate(&mut self, duration_ms: f32, mask: u8, intensity: f32) {
        for hand in [Hand::Left, Hand::Right] {
            let bit = match hand {
                Hand::Left => CHANNEL_LEFT,
                Hand::Right => CHANNEL_RIGHT,
            };
            if mask & bit == 0 {
                continue;
            }

            let channel = &mut self.channels[hand.index()];
            match channel.remaining {
                Remaining::Millis(_) => return,
                Remaining::Continuous if duration_ms != 0.0 => return,
                _ => {}
            }

            channel.remaining = if duration_ms == CONTINUOUS {
                Remaining::Continuous
            } else if duration_ms > 0.0 {
                Remaining::Millis(duration_ms)
            } else {
                Remaining::Idle
            };
            channel.intensity = intensity;
        }
    }

    /// Advances time by `elapsed_ms` and reports what each controller should do.
    ///
    /// Stop commands are only sent when a channel runs out.
    pub fn tick(&mut self, elapsed_ms: f32) -> Vec<ChannelCommand> {
        let mut commands = Vec::new();
        for hand in [Hand::Left, Hand::Right] {
            let channel = &mut self.channels[hand.index()];
            match channel.remaining {
                Remaining::Idle => {
                    if channel.intensity != 0.0 {
                        channel.intensity = 0.0;
                        commands.push(ChannelCommand::Stop { hand });
                    }
                }
                Remaining::Continuous => commands.push(ChannelCommand::Apply {
                    hand,
                    intensity: channel.intensity,
                }),
                Remaining::Millis(left) => {
                    commands.push(ChannelCommand::Apply {
                        hand,
                        intensity: channel.intensity,
                    });
                    let left = left - elapsed_ms;
                    channel.remaining = if left > 0.0 {
                        Remaining::Millis(left)
                    } else {
                        Remaining::Idle
                    };
                }
            }
        }
        commands
    }

    /// True while any channel is vibrating
    pub fn is_active(&self) -> bool {
        self.channels
            .iter()
            .any(|c| c.remaining != Remaining::Idle)
    }
}

// ============================================
// EXTERNAL BACKEND
// ============================================

/// A named feedback event for body-worn haptic devices
#[derive(Clone, Debug, PartialEq)]
pub struct HapticPattern {
    /// Event name, e.g. "pain_chest" or "fire_railgun"
    pub event: String,
    /// Which side of the body, in the same mask as the controller channels
    pub position: u8,
    pub intensity: f32,
    /// Direction the hit came from, degrees relative to the player's facing
    pub yaw: f32,
    /// Hit height relative to the chest, -0.5 ..= 0.5
    pub height: f32,
}

/// A pluggable haptic device
pub trait HapticsBackend {
    fn init(&mut self) -> VrResult<()>;
    fn shutdown(&mut self);
    fn submit_pattern(&mut self, pattern: &HapticPattern);
}

/// Backend that does nothing
#[derive(Debug, Default)]
pub struct NoopHaptics;

impl HapticsBackend for NoopHaptics {
    fn init(&mut self) -> VrResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn submit_pattern(&mut self, _pattern: &HapticPattern) {}
}

// ============================================
// COMBINED FRONT END
// ============================================

/// Controller scheduler plus external backend, scaled by the user setting
pub struct Haptics {
    scheduler: VibrationScheduler,
    backend: Box<dyn HapticsBackend>,
    last_tick: Option<Instant>,
}

impl Haptics {
    /// Creates the front end and initialises the backend
    pub fn new(mut backend: Box<dyn HapticsBackend>) -> VrResult<Self> {
        backend.init()?;
        Ok(Self {
            scheduler: VibrationScheduler::new(),
            backend,
            last_tick: None,
        })
    }

    /// Requests a controller vibration, scaled by `config.haptic_intensity`
    pub fn vibrate(&mut self, config: &VrConfig, duration_ms: f32, mask: u8, intensity: f32) {
        if !config.haptics_enabled() {
            return;
        }
        self.scheduler
            .vibrate(duration_ms, mask, intensity * config.haptic_intensity);
    }

    /// Sends a named event to the external device
    pub fn event(&mut self, config: &VrConfig, pattern: &HapticPattern) {
        if !config.haptics_enabled() {
            return;
        }
        debug!("Haptic event {} at {:.2}", pattern.event, pattern.intensity);
        self.backend.submit_pattern(&HapticPattern {
            intensity: pattern.intensity * config.haptic_intensity,
            ..pattern.clone()
        });
    }

    /// Advances the scheduler to `now`
    pub fn tick(&mut self, now: Instant) -> Vec<ChannelCommand> {
        let elapsed_ms = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32() * 1000.0)
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.scheduler.tick(elapsed_ms)
    }

    /// Stops the backend
    pub fn shutdown(&mut self) {
        info!("Shutting down haptics");
        self.backend.shutdown();
    }
}

// ============================================
// TESTS
// ============================================
