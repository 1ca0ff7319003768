//! # Frame Orchestrator
//!
//! Drives one headset frame around one game frame.
//!
//! ## Plain English Explanation
//!
//! The headset sets the pace. Every frame goes through the same steps:
//!
//! ```text
//!   wait ─► begin ─► where are the eyes? ─► grab images ─► [game draws]
//!                                                              │
//!   end-frame ◄─ pick layers ◄─ mirror to desktop ◄─ give images back
//! ```
//!
//! "Wait" blocks until the runtime wants the next frame, which is what paces
//! the whole engine to the display refresh rate.
//!
//! Two things can interrupt a game frame from the inside:
//!
//! - **Map loading** blocks the game for seconds. The game calls
//!   [`FramePresenter::submit_loading_frame`] from its loading screen to push
//!   a frame through so the headset doesn't freeze.
//! - **Renderer restart** tears down GL state mid-frame. The game calls
//!   [`FramePresenter::restore_state`] afterwards to open a fresh frame.

pub mod layers;
pub mod projection;

use std::time::Instant;

use ::openxr as xr;
use log::{debug, info, warn};

use crate::config::{DesktopFit, VrConfig};
use crate::error::{FormatErrorKind, OrFatal, VrError, VrResult};
use crate::graphics::{FramebufferId, GraphicsBackend, Rect};
use crate::haptics::{Haptics, HapticsBackend};
use crate::hooks::{FramePresenter, GameHooks, HeadTracking, RendererParams};
use crate::math::{EulerAngles, Pose};
use crate::runtime::{EyeView, XrRuntime};
use crate::session::SessionState;
use crate::space::ReferenceSpaces;
use crate::swapchain::desktop::{plan_eye_blits, plan_screen_blit};
use crate::swapchain::{StereoImages, SwapchainSet};
use crate::virtual_screen::{optical_center_crop, VirtualScreen, CONTENT_ASPECT};

use self::layers::{FrameOutput, IntermissionAnchor};
use self::projection::FrameProjections;

/// Stereo clear color
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Stereo clear color in third-person spectator mode
const SPECTATOR_CLEAR_COLOR: [f32; 4] = [0.12, 0.0, 0.05, 1.0];

// ============================================
// WEAPON ZOOM
// ============================================

/// Highest zoom divisor
pub const ZOOM_MAX: f32 = 2.5;

/// Zoom added per frame while zoomed
pub const ZOOM_IN_STEP: f32 = 0.05;

/// Zoom removed per frame otherwise
pub const ZOOM_OUT_STEP: f32 = 0.25;

/// Eased weapon zoom divisor: 1.0 is no zoom
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomState {
    level: f32,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self { level: 1.0 }
    }
}

impl ZoomState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Advances one frame: zoom in slowly, zoom out fast
    pub fn update(&mut self, zoomed: bool) {
        self.level = if zoomed {
            (self.level + ZOOM_IN_STEP).min(ZOOM_MAX)
        } else {
            (self.level - ZOOM_OUT_STEP).max(1.0)
        };
    }
}

// ============================================
// ORCHESTRATOR
// ============================================

/// State valid between begin and end of one frame
#[derive(Clone, Debug)]
struct FrameContext {
    display_time: xr::Time,
    views: [EyeView; 2],
    /// Left eye pose, the single head pose legacy consumers read
    head: Pose,
    projections: FrameProjections,
    stereo: StereoImages,
    overlay: Option<u32>,
    weapon_zoom_mono: bool,
    /// Set when the runtime was replaced while this frame was open
    session_lost: bool,
}

/// Owns the runtime session and renders every headset frame.
///
/// At most one frame is open at a time; `frame` is `Some` exactly between
/// begin and end.
pub struct FrameOrchestrator<R: XrRuntime, G: GraphicsBackend> {
    runtime: R,
    graphics: G,
    config: VrConfig,
    session: SessionState,
    spaces: ReferenceSpaces,
    swapchains: SwapchainSet,
    screen: VirtualScreen,
    zoom: ZoomState,
    anchor: IntermissionAnchor,
    haptics: Haptics,
    frame: Option<FrameContext>,
    last_display_time: Option<xr::Time>,
    recenter_after_first_frame: bool,
    frames_submitted: u64,
}

impl<R: XrRuntime, G: GraphicsBackend> FrameOrchestrator<R, G> {
    /// Creates spaces, swapchains and virtual-screen resources.
    ///
    /// ## Parameters
    /// - `runtime`: A created (not yet running) session
    /// - `graphics`: GL backend current on this thread
    /// - `config`: User settings; `refresh_rate` is overwritten from the runtime
    /// - `haptics`: Backend for body-worn devices, or [`crate::haptics::NoopHaptics`]
    pub fn new(
        mut runtime: R,
        mut graphics: G,
        mut config: VrConfig,
        haptics: Box<dyn HapticsBackend>,
    ) -> VrResult<Self> {
        config.check()?;

        let mut session = SessionState::new();
        if let Some(rate) = runtime.display_refresh_rate()? {
            info!("Display refresh rate {} Hz", rate);
            config.refresh_rate = rate;
            session.refresh_rate = Some(rate);
        }

        let mut spaces = ReferenceSpaces::new(&mut runtime)?;
        // No frame yet, so nothing to measure; the real recenter follows the first frame
        spaces.recenter(&mut runtime, None)?;

        let swapchains =
            SwapchainSet::create(&mut runtime, &mut graphics, config.effective_super_sampling())?;
        graphics.init_virtual_screen()?;
        let haptics = Haptics::new(haptics)?;

        info!(
            "Frame orchestrator ready: {}x{} per eye",
            swapchains.width, swapchains.height
        );

        Ok(Self {
            runtime,
            graphics,
            config,
            session,
            spaces,
            swapchains,
            screen: VirtualScreen::new(),
            zoom: ZoomState::new(),
            anchor: IntermissionAnchor::new(),
            haptics,
            frame: None,
            last_display_time: None,
            recenter_after_first_frame: true,
            frames_submitted: 0,
        })
    }

    /// Per-eye render size
    pub fn resolution(&self) -> (u32, u32) {
        (self.swapchains.width, self.swapchains.height)
    }

    pub fn config(&self) -> &VrConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut VrConfig {
        &mut self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Number of frames handed to the compositor so far
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// True between begin and end of a frame
    pub fn is_frame_open(&self) -> bool {
        self.frame.is_some()
    }

    /// Requests a controller vibration; see [`crate::haptics::VibrationScheduler::vibrate`]
    pub fn vibrate(&mut self, duration_ms: f32, channels: u8, intensity: f32) {
        self.haptics
            .vibrate(&self.config, duration_ms, channels, intensity);
    }

    pub fn haptics_mut(&mut self) -> &mut Haptics {
        &mut self.haptics
    }

    /// Runs one full frame: events, begin, game, end.
    ///
    /// Runtime failures are fatal.
    pub fn process_frame(&mut self, hooks: &mut dyn GameHooks) {
        self.try_process_frame(hooks)
            .or_fatal("processing a frame");
    }

    fn try_process_frame(&mut self, hooks: &mut dyn GameHooks) -> VrResult<()> {
        self.zoom.update(hooks.is_weapon_zoomed());

        let needs_recenter =
            self.session
                .poll_events(&mut self.runtime, hooks, &mut self.config)?;
        if !self.session.active {
            // Keep the desktop window responsive while the headset is idle
            hooks.poll_desktop_input();
            return Ok(());
        }

        self.begin_frame(hooks, needs_recenter)?;
        hooks.run_game_frame(self);
        self.end_frame(hooks)?;

        if self.recenter_after_first_frame {
            self.recenter_after_first_frame = false;
            let time = self.last_display_time;
            self.recenter(hooks, time)?;
        }

        let commands = self.haptics.tick(Instant::now());
        if !commands.is_empty() {
            hooks.apply_haptics(&commands);
        }
        Ok(())
    }

    fn recenter(&mut self, hooks: &mut dyn GameHooks, time: Option<xr::Time>) -> VrResult<()> {
        self.spaces.recenter(&mut self.runtime, time)?;
        self.screen.reset();
        hooks.set_menu_yaw(0.0);
        Ok(())
    }

    /// Whether this frame is shown flattened on the virtual screen.
    ///
    /// The single-player intermission keeps the menu up but is rendered in
    /// the world.
    fn uses_virtual_screen(hooks: &dyn GameHooks) -> bool {
        !hooks.is_single_player_intermission()
            && (hooks.should_render_to_virtual_screen() || hooks.is_following_in_first_person())
    }

    // ============================================
    // BEGIN
    // ============================================

    fn begin_frame(&mut self, hooks: &mut dyn GameHooks, needs_recenter: bool) -> VrResult<()> {
        if self.frame.is_some() {
            return Err(VrError::protocol("begin frame while a frame is already open"));
        }

        let timing = self.runtime.wait_frame()?;
        let display_time = timing.predicted_display_time;
        if let Some(last) = self.last_display_time {
            if display_time.as_nanos() < last.as_nanos() {
                warn!(
                    "[OpenXR] Predicted display time went backwards: {} ns -> {} ns",
                    last.as_nanos(),
                    display_time.as_nanos()
                );
            }
        }
        self.last_display_time = Some(display_time);

        if needs_recenter {
            self.recenter(hooks, Some(display_time))?;
        }

        self.runtime.begin_frame()?;

        let located = self
            .runtime
            .locate_views(display_time, self.spaces.current()?)?;
        let views: [EyeView; 2] = located
            .as_slice()
            .try_into()
            .map_err(|_| VrError::Format(FormatErrorKind::ViewCount(located.len())))?;
        let head = views[0].pose;

        let projections = FrameProjections::compute(&views, self.zoom.level());
        hooks.update_head_tracking(&HeadTracking {
            position: head.position,
            angles: EulerAngles::from_quat(head.orientation),
            fov: projections.combined_fov,
        });
        hooks.sync_input(display_time.as_nanos());

        let (width, height) = self.resolution();
        let stereo = self.swapchains.acquire_stereo(&mut self.runtime)?;
        let framebuffer = self.swapchains.stereo_framebuffer(stereo.color)?;
        self.graphics.bind_draw_framebuffer(Some(framebuffer));
        let clear_color = if self.config.third_person_spectator {
            SPECTATOR_CLEAR_COLOR
        } else {
            CLEAR_COLOR
        };
        self.graphics.clear(Rect::full(width, height), clear_color);

        // Nothing draws into the overlay while loading or on the virtual screen
        let overlay = if hooks.connection_state().is_loading() || Self::uses_virtual_screen(hooks)
        {
            None
        } else {
            Some(self.swapchains.acquire_overlay(&mut self.runtime)?)
        };
        let overlay_framebuffer = overlay
            .map(|index| self.swapchains.overlay_framebuffer(index))
            .transpose()?;
        let weapon_zoom_mono = overlay.is_some() && hooks.is_weapon_zoomed();

        hooks.set_renderer_params(&RendererParams {
            framebuffer,
            overlay_framebuffer,
            width,
            height,
            projection: projections.projection,
            mono_projection: projections.mono,
            eye_projections: projections.eyes,
            fov_x: projections.fov_x,
            fov_y: projections.fov_y,
            half_ipd: projections.half_ipd,
            weapon_zoom_mono,
        });

        self.frame = Some(FrameContext {
            display_time,
            views,
            head,
            projections,
            stereo,
            overlay,
            weapon_zoom_mono,
            session_lost: false,
        });
        Ok(())
    }

    // ============================================
    // END
    // ============================================

    fn end_frame(&mut self, hooks: &mut dyn GameHooks) -> VrResult<()> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| VrError::protocol("end frame without an open frame"))?;
        let (width, height) = self.resolution();
        let eyes = self.swapchains.eye_framebuffers(frame.stereo.color)?;
        let use_screen = Self::uses_virtual_screen(hooks);

        if use_screen {
            self.graphics.blit(
                eyes[0],
                optical_center_crop(width, height, &frame.views[0].fov),
                Some(self.swapchains.screen_framebuffer),
                Rect::full(width, height),
            );

            self.graphics
                .bind_draw_framebuffer(Some(self.swapchains.stereo_framebuffer(frame.stereo.color)?));
            self.graphics.clear(Rect::full(width, height), CLEAR_COLOR);

            let draw = self.screen.prepare(
                &frame.head,
                &frame.views,
                &frame.projections.combined_fov,
                self.spaces.recenter_yaw(),
                &self.config,
                self.swapchains.screen_texture,
            );
            self.graphics.draw_virtual_screen(&draw);
            hooks.set_menu_yaw(self.screen.yaw_degrees());
        } else {
            self.screen.reset();
            hooks.set_menu_yaw(EulerAngles::from_quat(frame.head.orientation).yaw);
        }

        self.swapchains.release_stereo(&mut self.runtime)?;
        if frame.overlay.is_some() {
            self.swapchains.release_overlay(&mut self.runtime)?;
        }
        self.graphics.bind_draw_framebuffer(None);

        if self.config.desktop_mirror {
            self.mirror_to_desktop(hooks, eyes, use_screen);
        }

        let output = FrameOutput {
            views: frame.views,
            head: frame.head,
            fov: frame.projections.combined_fov,
            world_space: self.spaces.current()?,
            head_space: self.spaces.head(),
            color: self.swapchains.color.id,
            eye_size: (width, height),
            overlay: frame.overlay.map(|_| self.swapchains.overlay.id),
            weapon_zoom_mono: frame.weapon_zoom_mono,
            intermission: hooks.is_single_player_intermission(),
        };
        let layers = layers::assemble(&output, &mut self.anchor);
        self.runtime.end_frame(frame.display_time, &layers)?;
        self.frames_submitted += 1;

        hooks.end_desktop_frame();
        Ok(())
    }

    /// Copies the eye images, or the flattened screen, into the desktop window
    fn mirror_to_desktop(
        &mut self,
        hooks: &mut dyn GameHooks,
        eyes: [FramebufferId; 2],
        use_screen: bool,
    ) {
        let window = hooks.desktop_window_size();
        let eye_size = self.resolution();
        let fit = self.config.desktop_fit;

        let blits = if use_screen {
            plan_screen_blit(
                self.swapchains.screen_framebuffer,
                eye_size,
                CONTENT_ASPECT,
                fit,
                window,
            )
            .into_iter()
            .collect()
        } else {
            plan_eye_blits(self.config.desktop_view, fit, eyes, eye_size, window)
        };

        if fit == DesktopFit::Letterbox && !blits.is_empty() {
            self.graphics
                .clear(Rect::full(window.0, window.1), CLEAR_COLOR);
        }
        for blit in blits {
            self.graphics
                .blit(blit.source, blit.source_rect, None, blit.destination_rect);
        }
    }

    // ============================================
    // RECOVERY
    // ============================================

    fn try_submit_loading_frame(&mut self, hooks: &mut dyn GameHooks) -> VrResult<bool> {
        if !hooks.connection_state().is_loading() || self.frame.is_none() {
            return Ok(false);
        }
        debug!("Submitting loading frame");
        self.end_frame(hooks)?;
        self.begin_frame(hooks, false)?;
        Ok(true)
    }

    /// Closes an open frame on its own session with no layers.
    ///
    /// A frame whose session was replaced is only forgotten.
    fn abandon_frame(&mut self) -> VrResult<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        if frame.session_lost {
            debug!("Dropping frame opened on a replaced session");
            return Ok(());
        }

        self.swapchains.release_all(&mut self.runtime)?;
        self.graphics.bind_draw_framebuffer(None);
        self.runtime.end_frame(frame.display_time, &[])?;
        Ok(())
    }

    fn try_restore_state(&mut self, hooks: &mut dyn GameHooks) -> VrResult<()> {
        if self.frame.is_none() {
            return Ok(());
        }
        info!("Restoring frame state after renderer restart");
        self.abandon_frame()?;

        while !self.session.active {
            self.session
                .poll_events(&mut self.runtime, hooks, &mut self.config)?;
            if !self.session.active {
                hooks.poll_desktop_input();
            }
        }

        self.begin_frame(hooks, true)
    }

    /// Swaps in a recreated runtime and rebuilds everything that lived on it.
    ///
    /// Returns the old runtime. A frame left open stays open; call
    /// [`FramePresenter::restore_state`] next to begin a frame on the new session.
    pub fn replace_runtime(&mut self, runtime: R) -> VrResult<R> {
        info!("Replacing runtime session");
        let old = std::mem::replace(&mut self.runtime, runtime);

        self.session = SessionState::new();
        self.last_display_time = None;
        if let Some(frame) = self.frame.as_mut() {
            frame.session_lost = true;
        }

        // The old swapchains die with the old session
        self.swapchains.discard_acquisitions();
        self.swapchains.destroy_graphics(&mut self.graphics);

        self.spaces.rebuild(&mut self.runtime)?;
        self.screen.reset();
        self.swapchains = SwapchainSet::create(
            &mut self.runtime,
            &mut self.graphics,
            self.config.effective_super_sampling(),
        )?;
        Ok(old)
    }

    /// Frees every runtime and GL resource and returns the runtime
    pub fn shutdown(mut self) -> VrResult<R> {
        info!(
            "Shutting down after {} submitted frames",
            self.frames_submitted
        );
        if self.frame.is_some() {
            warn!("Shutting down with a frame still open");
            self.abandon_frame()?;
        }

        self.swapchains.destroy(&mut self.runtime, &mut self.graphics)?;
        self.graphics.destroy_virtual_screen();
        self.spaces.destroy(&mut self.runtime)?;
        self.haptics.shutdown();
        Ok(self.runtime)
    }
}

impl<R: XrRuntime, G: GraphicsBackend> FramePresenter for FrameOrchestrator<R, G> {
    fn submit_loading_frame(&mut self, hooks: &mut dyn GameHooks) -> bool {
        self.try_submit_loading_frame(hooks)
            .or_fatal("submitting a loading frame")
    }

    fn restore_state(&mut self, hooks: &mut dyn GameHooks) {
        self.try_restore_state(hooks)
            .or_fatal("restoring frame state");
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::graphics::mock::{GfxCall, MockGraphics};
    use crate::haptics::{ChannelCommand, NoopHaptics, CHANNEL_LEFT};
    use crate::hooks::ConnectionState;
    use crate::runtime::mock::{Call, MockRuntime};
    use crate::runtime::{CompositionLayer, RuntimeEvent, SpaceId};

    type Orchestrator = FrameOrchestrator<MockRuntime, MockGraphics>;
    type GameFrame = fn(&mut RecordingHooks, &mut dyn FramePresenter);

    /// Hooks that answer from fields and record everything they are told
    struct RecordingHooks {
        virtual_screen: bool,
        intermission: bool,
        following: bool,
        zoomed: bool,
        connection: ConnectionState,
        on_game_frame: Option<GameFrame>,

        game_frames: u32,
        desktop_polls: u32,
        desktop_frames: u32,
        tracking: Vec<HeadTracking>,
        params: Vec<RendererParams>,
        menu_yaw: Vec<f32>,
        haptics: Vec<ChannelCommand>,
        synced: Vec<i64>,
        loading_results: Vec<bool>,
    }

    impl Default for RecordingHooks {
        fn default() -> Self {
            Self {
                virtual_screen: false,
                intermission: false,
                following: false,
                zoomed: false,
                connection: ConnectionState::Active,
                on_game_frame: None,
                game_frames: 0,
                desktop_polls: 0,
                desktop_frames: 0,
                tracking: Vec::new(),
                params: Vec::new(),
                menu_yaw: Vec::new(),
                haptics: Vec::new(),
                synced: Vec::new(),
                loading_results: Vec::new(),
            }
        }
    }

    impl GameHooks for RecordingHooks {
        fn run_game_frame(&mut self, presenter: &mut dyn FramePresenter) {
            self.game_frames += 1;
            if let Some(game_frame) = self.on_game_frame {
                game_frame(self, presenter);
            }
        }
        fn poll_desktop_input(&mut self) {
            self.desktop_polls += 1;
        }
        fn open_menu_and_pause_if_possible(&mut self) {}
        fn should_render_to_virtual_screen(&self) -> bool {
            self.virtual_screen
        }
        fn is_single_player_intermission(&self) -> bool {
            self.intermission
        }
        fn is_following_in_first_person(&self) -> bool {
            self.following
        }
        fn connection_state(&self) -> ConnectionState {
            self.connection
        }
        fn is_weapon_zoomed(&self) -> bool {
            self.zoomed
        }
        fn desktop_window_size(&self) -> (u32, u32) {
            (1920, 1080)
        }
        fn update_head_tracking(&mut self, tracking: &HeadTracking) {
            self.tracking.push(*tracking);
        }
        fn sync_input(&mut self, display_time_nanos: i64) {
            self.synced.push(display_time_nanos);
        }
        fn set_renderer_params(&mut self, params: &RendererParams) {
            self.params.push(params.clone());
        }
        fn set_menu_yaw(&mut self, yaw_degrees: f32) {
            self.menu_yaw.push(yaw_degrees);
        }
        fn apply_haptics(&mut self, commands: &[ChannelCommand]) {
            self.haptics.extend_from_slice(commands);
        }
        fn end_desktop_frame(&mut self) {
            self.desktop_frames += 1;
        }
    }

    fn submit_from_loading_screen(hooks: &mut RecordingHooks, presenter: &mut dyn FramePresenter) {
        let submitted = presenter.submit_loading_frame(hooks);
        hooks.loading_results.push(submitted);
    }

    fn restart_renderer(hooks: &mut RecordingHooks, presenter: &mut dyn FramePresenter) {
        presenter.restore_state(hooks);
    }

    fn running_runtime() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        for state in [
            xr::SessionState::READY,
            xr::SessionState::SYNCHRONIZED,
            xr::SessionState::VISIBLE,
            xr::SessionState::FOCUSED,
        ] {
            runtime.push_state(state);
        }
        runtime
    }

    fn orchestrator_with(config: VrConfig) -> Orchestrator {
        FrameOrchestrator::new(
            running_runtime(),
            MockGraphics::new(),
            config,
            Box::new(NoopHaptics),
        )
        .unwrap()
    }

    fn orchestrator() -> Orchestrator {
        orchestrator_with(VrConfig::default())
    }

    fn count(orch: &Orchestrator, call: Call) -> usize {
        orch.runtime.count(|c| *c == call)
    }

    fn end_frames(orch: &Orchestrator) -> usize {
        orch.runtime.count(|c| matches!(c, Call::EndFrame(_)))
    }

    /// Most frames ever open at once, and how many are still open
    fn frame_nesting(runtime: &MockRuntime) -> (usize, usize) {
        let (mut open, mut deepest) = (0usize, 0usize);
        for call in &runtime.calls {
            match call {
                Call::BeginFrame => {
                    open += 1;
                    deepest = deepest.max(open);
                }
                Call::EndFrame(_) => open = open.saturating_sub(1),
                _ => {}
            }
        }
        (deepest, open)
    }

    fn quad_space(layers: &[CompositionLayer]) -> Option<SpaceId> {
        layers.iter().find_map(|l| match l {
            CompositionLayer::Quad(q) => Some(q.space),
            _ => None,
        })
    }

    #[test]
    fn test_zoom_eases_in_and_snaps_out() {
        let mut zoom = ZoomState::new();
        for _ in 0..10 {
            zoom.update(true);
        }
        assert!((zoom.level() - 1.5).abs() < 1e-4);

        for _ in 0..100 {
            zoom.update(true);
        }
        assert_eq!(zoom.level(), ZOOM_MAX);

        for _ in 0..6 {
            zoom.update(false);
        }
        assert_eq!(zoom.level(), 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = VrConfig::default();
        config.haptic_intensity = -1.0;
        config.refresh_rate = -90.0;
        let result = FrameOrchestrator::new(
            running_runtime(),
            MockGraphics::new(),
            config,
            Box::new(NoopHaptics),
        );
        assert!(matches!(
            result,
            Err(VrError::Config(ConfigError::HapticIntensityOutOfRange(_)))
        ));
    }

    #[test]
    fn test_new_reads_refresh_rate_and_resolution() {
        let orch = orchestrator();
        assert_eq!(orch.config().refresh_rate, 90.0);
        assert_eq!(orch.resolution(), (1760, 1584));
        assert_eq!(orch.graphics.calls.first(), Some(&GfxCall::InitVirtualScreen));
    }

    #[test]
    fn test_inactive_session_only_polls_desktop() {
        let mut orch = FrameOrchestrator::new(
            MockRuntime::new(),
            MockGraphics::new(),
            VrConfig::default(),
            Box::new(NoopHaptics),
        )
        .unwrap();
        let mut hooks = RecordingHooks::default();

        orch.process_frame(&mut hooks);

        assert_eq!(hooks.desktop_polls, 1);
        assert_eq!(hooks.game_frames, 0);
        assert_eq!(count(&orch, Call::WaitFrame), 0);
    }

    #[test]
    fn test_frames_pair_begin_and_end() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();

        for _ in 0..3 {
            orch.process_frame(&mut hooks);
            assert!(!orch.is_frame_open());
        }

        assert_eq!(count(&orch, Call::WaitFrame), 3);
        assert_eq!(count(&orch, Call::BeginFrame), 3);
        assert_eq!(end_frames(&orch), 3);
        assert_eq!(hooks.game_frames, 3);
        assert_eq!(hooks.desktop_frames, 3);

        // Every begin is followed by its end before the next begin
        let mut open = false;
        for call in &orch.runtime.calls {
            match call {
                Call::BeginFrame => {
                    assert!(!open);
                    open = true;
                }
                Call::EndFrame(_) => {
                    assert!(open);
                    open = false;
                }
                _ => {}
            }
        }

        for id in [
            orch.swapchains.color.id,
            orch.swapchains.depth.id,
            orch.swapchains.overlay.id,
        ] {
            assert_eq!(count(&orch, Call::Acquire(id)), 3);
            assert_eq!(count(&orch, Call::Release(id)), 3);
        }

        // Input is synced with strictly increasing display times
        assert!(hooks.synced.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_first_frame_triggers_recenter_once() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();

        orch.process_frame(&mut hooks);
        assert_eq!(count(&orch, Call::LocateSpace), 1);
        assert_eq!(hooks.menu_yaw.last(), Some(&0.0));

        orch.process_frame(&mut hooks);
        assert_eq!(count(&orch, Call::LocateSpace), 1);
    }

    #[test]
    fn test_runtime_recenter_request() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.process_frame(&mut hooks);

        let session = orch.runtime.session_id();
        orch.runtime
            .events
            .push_back(RuntimeEvent::ReferenceSpaceChangePending {
                session,
                space_type: xr::ReferenceSpaceType::STAGE,
            });
        orch.process_frame(&mut hooks);

        assert_eq!(count(&orch, Call::LocateSpace), 2);
    }

    #[test]
    fn test_normal_frame_layers_and_params() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.process_frame(&mut hooks);

        let layers = orch.runtime.last_layers().unwrap().clone();
        assert_eq!(layers.len(), 2);
        assert!(layers[0].is_projection());
        assert_eq!(quad_space(&layers), Some(orch.spaces.head()));

        let params = &hooks.params[0];
        assert!(params.overlay_framebuffer.is_some());
        assert!(!params.weapon_zoom_mono);
        assert!((params.half_ipd - 0.032).abs() < 1e-5);
        assert_eq!((params.width, params.height), orch.resolution());
        assert_eq!(hooks.tracking.len(), 1);
    }

    #[test]
    fn test_weapon_zoom_mono_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            zoomed: true,
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        let layers = orch.runtime.last_layers().unwrap();
        assert!(layers.iter().all(|l| !l.is_projection()));
        match &layers[0] {
            CompositionLayer::Quad(q) => {
                assert!(!q
                    .flags
                    .contains(xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA));
            }
            other => panic!("expected a quad, got {:?}", other),
        }
        assert!(hooks.params[0].weapon_zoom_mono);
    }

    #[test]
    fn test_virtual_screen_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            virtual_screen: true,
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        assert_eq!(orch.graphics.draws(), 1);
        // Overlay skipped: only the projection layer
        let layers = orch.runtime.last_layers().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(count(&orch, Call::Acquire(orch.swapchains.overlay.id)), 0);

        let screen = orch.swapchains.screen_framebuffer;
        let blits = orch.graphics.blits();
        assert!(matches!(
            blits[0],
            GfxCall::Blit { destination: Some(d), .. } if *d == screen
        ));
        // The desktop shows the flattened image
        assert!(matches!(
            blits.last(),
            Some(GfxCall::Blit { source, destination: None, .. }) if *source == screen
        ));
    }

    #[test]
    fn test_following_in_first_person_uses_virtual_screen() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            following: true,
            ..Default::default()
        };
        orch.process_frame(&mut hooks);
        assert_eq!(orch.graphics.draws(), 1);
    }

    #[test]
    fn test_intermission_skips_virtual_screen_and_anchors_quad() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            virtual_screen: true,
            intermission: true,
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        assert_eq!(orch.graphics.draws(), 0);
        let world = orch.spaces.current().unwrap();
        // The deferred first recenter replaced the world space after this frame
        let layers = orch.runtime.last_layers().unwrap().clone();
        assert!(quad_space(&layers).is_some());
        assert_ne!(quad_space(&layers), Some(orch.spaces.head()));
        assert!(orch.anchor.is_captured());

        orch.process_frame(&mut hooks);
        let layers = orch.runtime.last_layers().unwrap().clone();
        assert_eq!(quad_space(&layers), Some(world));

        hooks.intermission = false;
        orch.process_frame(&mut hooks);
        assert!(!orch.anchor.is_captured());
    }

    #[test]
    fn test_loading_frame_submission() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            connection: ConnectionState::Loading,
            on_game_frame: Some(submit_from_loading_screen),
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        assert_eq!(hooks.loading_results, vec![true]);
        assert_eq!(count(&orch, Call::WaitFrame), 2);
        assert_eq!(end_frames(&orch), 2);
        assert_eq!(count(&orch, Call::Acquire(orch.swapchains.overlay.id)), 0);
        assert!(!orch.is_frame_open());
    }

    #[test]
    fn test_loading_frame_refused_when_active() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            on_game_frame: Some(submit_from_loading_screen),
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        assert_eq!(hooks.loading_results, vec![false]);
        assert_eq!(end_frames(&orch), 1);

        // No open frame: nothing to submit either
        hooks.connection = ConnectionState::Primed;
        assert!(!orch.submit_loading_frame(&mut hooks));
    }

    #[test]
    fn test_restore_state_restarts_open_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            on_game_frame: Some(restart_renderer),
            ..Default::default()
        };
        orch.process_frame(&mut hooks);

        // The interrupted frame is ended, empty, before the next begins
        assert_eq!(count(&orch, Call::BeginFrame), 2);
        assert_eq!(end_frames(&orch), 2);
        assert_eq!(frame_nesting(&orch.runtime), (1, 0));
        let first_end = orch
            .runtime
            .calls
            .iter()
            .find_map(|c| match c {
                Call::EndFrame(layers) => Some(layers.clone()),
                _ => None,
            })
            .unwrap();
        assert!(first_end.is_empty());
        // Forced recenter plus the deferred first-frame one
        assert_eq!(count(&orch, Call::LocateSpace), 2);

        let color = orch.swapchains.color.id;
        assert_eq!(count(&orch, Call::Acquire(color)), 2);
        assert_eq!(count(&orch, Call::Release(color)), 2);
        assert!(!orch.is_frame_open());
    }

    #[test]
    fn test_frames_stay_paired_across_repeated_restores() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks {
            on_game_frame: Some(restart_renderer),
            ..Default::default()
        };
        for _ in 0..3 {
            orch.process_frame(&mut hooks);
        }

        assert_eq!(frame_nesting(&orch.runtime), (1, 0));
        assert_eq!(count(&orch, Call::BeginFrame), 6);
        assert_eq!(end_frames(&orch), 6);
    }

    #[test]
    fn test_restore_state_without_open_frame_is_noop() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.restore_state(&mut hooks);
        assert_eq!(count(&orch, Call::WaitFrame), 0);
    }

    #[test]
    fn test_replace_runtime_mid_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.process_frame(&mut hooks);

        // Frame opened, then the session is lost and recreated
        orch.begin_frame(&mut hooks, false).unwrap();
        let old = orch.replace_runtime(running_runtime()).unwrap();
        assert!(!orch.session().active);

        orch.restore_state(&mut hooks);
        orch.end_frame(&mut hooks).unwrap();

        assert_eq!(count(&orch, Call::BeginSession), 1);
        assert_eq!(count(&orch, Call::BeginFrame), 1);
        assert_eq!(end_frames(&orch), 1);
        assert_eq!(frame_nesting(&orch.runtime), (1, 0));
        // The abandoned frame died with its session and is not ended
        assert_eq!(old.count(|c| *c == Call::BeginFrame), 2);
        assert_eq!(old.count(|c| matches!(c, Call::EndFrame(_))), 1);
    }

    #[test]
    fn test_shutdown_ends_open_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.process_frame(&mut hooks);
        orch.begin_frame(&mut hooks, false).unwrap();

        let runtime = orch.shutdown().unwrap();
        assert_eq!(frame_nesting(&runtime), (1, 0));
        assert!(runtime.live_swapchains.is_empty());
    }

    #[test]
    fn test_begin_and_end_must_alternate() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.process_frame(&mut hooks);

        assert!(matches!(
            orch.end_frame(&mut hooks),
            Err(VrError::Protocol(_))
        ));
        orch.begin_frame(&mut hooks, false).unwrap();
        assert!(matches!(
            orch.begin_frame(&mut hooks, false),
            Err(VrError::Protocol(_))
        ));
    }

    #[test]
    fn test_spectator_clear_color() {
        let mut config = VrConfig::default();
        config.third_person_spectator = true;
        let mut orch = orchestrator_with(config);
        orch.process_frame(&mut RecordingHooks::default());

        assert!(orch
            .graphics
            .calls
            .iter()
            .any(|c| matches!(c, GfxCall::Clear(_, color) if *color == SPECTATOR_CLEAR_COLOR)));
    }

    #[test]
    fn test_desktop_mirror_both_eyes() {
        let mut orch = orchestrator();
        orch.process_frame(&mut RecordingHooks::default());

        let desktop: Vec<_> = orch
            .graphics
            .blits()
            .into_iter()
            .filter(|c| matches!(c, GfxCall::Blit { destination: None, .. }))
            .collect();
        assert_eq!(desktop.len(), 2);
    }

    #[test]
    fn test_desktop_mirror_disabled() {
        let mut config = VrConfig::default();
        config.desktop_mirror = false;
        let mut orch = orchestrator_with(config);
        orch.process_frame(&mut RecordingHooks::default());

        assert!(orch.graphics.blits().is_empty());
    }

    #[test]
    fn test_vibration_forwarded_each_frame() {
        let mut orch = orchestrator();
        let mut hooks = RecordingHooks::default();
        orch.vibrate(500.0, CHANNEL_LEFT, 1.0);
        orch.process_frame(&mut hooks);

        assert!(matches!(
            hooks.haptics.as_slice(),
            [ChannelCommand::Apply { .. }]
        ));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut orch = orchestrator();
        orch.process_frame(&mut RecordingHooks::default());
        let runtime = orch.shutdown().unwrap();

        assert!(runtime.live_spaces.is_empty());
        assert!(runtime.live_swapchains.is_empty());
    }
}
