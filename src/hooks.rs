//! # Engine Hooks
//!
//! What the VR layer needs from the game engine, and what it hands back.
//!
//! ## Plain English Explanation
//!
//! The VR layer runs the frame; the engine runs the game. Between
//! "begin frame" and "end frame" we call [`GameHooks::run_game_frame`] and
//! the engine draws into the framebuffer we prepared. Around that, we ask the
//! engine a few questions (is a menu open? is this the intermission scene?)
//! and tell it a few things (where the head is, which projection to use).
//!
//! While loading a map the engine may block for seconds inside its frame.
//! To keep the headset fed, it gets a [`FramePresenter`] and can push a frame
//! through on its own.

use glam::{Mat4, Vec3};

use crate::graphics::FramebufferId;
use crate::haptics::ChannelCommand;
use crate::math::{EulerAngles, Fov};

/// Client connection phase, as far as the frame loop cares
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Map and assets loading
    Loading,
    /// Loaded, waiting for the first snapshot
    Primed,
    Active,
}

impl ConnectionState {
    /// True while frames are produced only by loading-screen submissions
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::Primed)
    }
}

/// Head pose in engine terms, for consumers that read a single head transform
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadTracking {
    /// Meters, in the current reference space
    pub position: Vec3,
    /// Degrees, engine convention
    pub angles: EulerAngles,
    /// Combined field of view of both eyes
    pub fov: Fov,
}

/// Everything the game renderer needs for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct RendererParams {
    /// Multiview framebuffer to draw the world into
    pub framebuffer: FramebufferId,
    /// Overlay framebuffer for HUD and menus, when one was acquired
    pub overlay_framebuffer: Option<FramebufferId>,
    pub width: u32,
    pub height: u32,
    /// Combined stereo projection, narrowed by weapon zoom
    pub projection: Mat4,
    /// ±15° projection for head-locked HUD elements
    pub mono_projection: Mat4,
    /// Per-eye asymmetric projections
    pub eye_projections: [Mat4; 2],
    /// Combined horizontal field of view in degrees
    pub fov_x: f32,
    /// Combined vertical field of view in degrees
    pub fov_y: f32,
    /// Half the distance between the eyes, in meters
    pub half_ipd: f32,
    /// Render the scope view mono into the overlay
    pub weapon_zoom_mono: bool,
}

/// Lets the engine submit frames from inside its own frame
pub trait FramePresenter {
    /// Ends the open frame and begins a new one while loading.
    ///
    /// Returns false when not loading or no frame is open.
    fn submit_loading_frame(&mut self, hooks: &mut dyn GameHooks) -> bool;

    /// Recovers after the renderer was torn down mid-frame
    fn restore_state(&mut self, hooks: &mut dyn GameHooks);
}

/// Engine callbacks
pub trait GameHooks {
    /// Runs one frame of the game, rendering into the prepared framebuffer
    fn run_game_frame(&mut self, presenter: &mut dyn FramePresenter);

    /// Pumps desktop window input while the headset is not rendering
    fn poll_desktop_input(&mut self);

    /// Opens the in-game menu (and pauses in single player) when possible
    fn open_menu_and_pause_if_possible(&mut self);

    /// UI, console or cinematic state calls for the flattened virtual screen
    fn should_render_to_virtual_screen(&self) -> bool;

    /// Single-player end-of-level scene
    fn is_single_player_intermission(&self) -> bool;

    /// Spectating another player from their eyes
    fn is_following_in_first_person(&self) -> bool;

    /// Current client connection phase
    fn connection_state(&self) -> ConnectionState;

    /// The player is looking through a zoomed weapon scope
    fn is_weapon_zoomed(&self) -> bool;

    /// Desktop window size in pixels
    fn desktop_window_size(&self) -> (u32, u32);

    /// Receives the head pose for this frame
    fn update_head_tracking(&mut self, tracking: &HeadTracking);

    /// Samples controller input for the frame's display time
    fn sync_input(&mut self, display_time_nanos: i64);

    /// Receives projection and framebuffer choices for this frame
    fn set_renderer_params(&mut self, params: &RendererParams);

    /// Heading in degrees the in-game menu should face
    fn set_menu_yaw(&mut self, yaw_degrees: f32);

    /// Forwards vibration commands to the controllers
    fn apply_haptics(&mut self, commands: &[ChannelCommand]);

    /// Swaps the desktop window's buffers
    fn end_desktop_frame(&mut self);
}
