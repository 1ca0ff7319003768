//! Scripted runtime for unit tests.
//!
//! Records every call in order and answers from fields the test sets up.

use std::collections::{HashMap, VecDeque};

use ::openxr as xr;
use glam::Vec3;

use super::*;
use crate::error::{VrError, VrResult};
use crate::math::{Fov, Pose};

/// One recorded runtime call
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    BeginSession,
    EndSession,
    WaitFrame,
    BeginFrame,
    EndFrame(Vec<CompositionLayer>),
    LocateViews,
    LocateSpace,
    CreateSpace(xr::ReferenceSpaceType, Pose),
    DestroySpace(SpaceId),
    CreateSwapchain(SwapchainDesc),
    Acquire(SwapchainId),
    Wait(SwapchainId),
    Release(SwapchainId),
    DestroySwapchain(SwapchainId),
}

pub struct MockRuntime {
    pub calls: Vec<Call>,
    pub events: VecDeque<RuntimeEvent>,
    pub head_pose: Pose,
    pub views: Vec<EyeView>,
    pub view_configs: Vec<ViewConfigView>,
    pub formats: Vec<u32>,
    pub reference_spaces: Vec<xr::ReferenceSpaceType>,
    pub refresh_rate: Option<f32>,
    pub images_per_swapchain: u32,
    /// Image index every acquire returns, when set
    pub forced_image_index: Option<u32>,
    pub live_spaces: HashMap<SpaceId, (xr::ReferenceSpaceType, Pose)>,
    pub live_swapchains: HashMap<SwapchainId, SwapchainDesc>,
    next_handle: u64,
    next_time: i64,
    acquire_counter: HashMap<SwapchainId, u32>,
}

impl MockRuntime {
    pub fn new() -> Self {
        let fov = Fov::new(-0.8, 0.8, 0.8, -0.8);
        Self {
            calls: Vec::new(),
            events: VecDeque::new(),
            head_pose: Pose::from_position(Vec3::new(0.0, 1.6, 0.0)),
            views: vec![
                EyeView {
                    pose: Pose::from_position(Vec3::new(-0.032, 1.6, 0.0)),
                    fov,
                },
                EyeView {
                    pose: Pose::from_position(Vec3::new(0.032, 1.6, 0.0)),
                    fov,
                },
            ],
            view_configs: vec![
                ViewConfigView {
                    recommended_width: 1600,
                    recommended_height: 1440,
                    max_width: 4096,
                    max_height: 4096,
                };
                2
            ],
            formats: vec![glow::SRGB8_ALPHA8, glow::RGBA8, glow::DEPTH_COMPONENT24],
            reference_spaces: vec![
                xr::ReferenceSpaceType::VIEW,
                xr::ReferenceSpaceType::LOCAL,
                xr::ReferenceSpaceType::STAGE,
            ],
            refresh_rate: Some(90.0),
            images_per_swapchain: 3,
            live_spaces: HashMap::new(),
            live_swapchains: HashMap::new(),
            forced_image_index: None,
            next_handle: 100,
            next_time: 1_000_000,
            acquire_counter: HashMap::new(),
        }
    }

    /// Queues a session state change for this runtime's session
    pub fn push_state(&mut self, state: xr::SessionState) {
        let session = self.session_id();
        self.events
            .push_back(RuntimeEvent::SessionStateChanged { session, state });
    }

    /// The layers submitted by the most recent end-frame
    pub fn last_layers(&self) -> Option<&Vec<CompositionLayer>> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::EndFrame(layers) => Some(layers),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Poses of every live space of `space_type`
    pub fn spaces_of(&self, space_type: xr::ReferenceSpaceType) -> Vec<Pose> {
        self.live_spaces
            .values()
            .filter(|(t, _)| *t == space_type)
            .map(|(_, p)| *p)
            .collect()
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl XrRuntime for MockRuntime {
    fn session_id(&self) -> SessionId {
        SessionId(42)
    }

    fn poll_event(&mut self) -> VrResult<Option<RuntimeEvent>> {
        Ok(self.events.pop_front())
    }

    fn begin_session(&mut self) -> VrResult<()> {
        self.calls.push(Call::BeginSession);
        Ok(())
    }

    fn end_session(&mut self) -> VrResult<()> {
        self.calls.push(Call::EndSession);
        Ok(())
    }

    fn wait_frame(&mut self) -> VrResult<FrameTiming> {
        self.calls.push(Call::WaitFrame);
        self.next_time += 11_111_111;
        Ok(FrameTiming {
            predicted_display_time: xr::Time::from_nanos(self.next_time),
            should_render: true,
        })
    }

    fn begin_frame(&mut self) -> VrResult<()> {
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self, _display_time: xr::Time, layers: &[CompositionLayer]) -> VrResult<()> {
        self.calls.push(Call::EndFrame(layers.to_vec()));
        Ok(())
    }

    fn locate_views(&mut self, _display_time: xr::Time, _space: SpaceId) -> VrResult<Vec<EyeView>> {
        self.calls.push(Call::LocateViews);
        Ok(self.views.clone())
    }

    fn locate_space(
        &mut self,
        space: SpaceId,
        base: SpaceId,
        _display_time: xr::Time,
    ) -> VrResult<Pose> {
        self.calls.push(Call::LocateSpace);
        for id in [space, base] {
            if !self.live_spaces.contains_key(&id) {
                return Err(VrError::UnknownHandle { kind: "space", id: id.0 });
            }
        }
        Ok(self.head_pose)
    }

    fn reference_space_types(&mut self) -> VrResult<Vec<xr::ReferenceSpaceType>> {
        Ok(self.reference_spaces.clone())
    }

    fn create_reference_space(
        &mut self,
        space_type: xr::ReferenceSpaceType,
        pose: Pose,
    ) -> VrResult<SpaceId> {
        self.calls.push(Call::CreateSpace(space_type, pose));
        let id = SpaceId(self.handle());
        self.live_spaces.insert(id, (space_type, pose));
        Ok(id)
    }

    fn destroy_space(&mut self, space: SpaceId) -> VrResult<()> {
        self.calls.push(Call::DestroySpace(space));
        self.live_spaces
            .remove(&space)
            .map(|_| ())
            .ok_or(VrError::UnknownHandle { kind: "space", id: space.0 })
    }

    fn view_configuration_views(&mut self) -> VrResult<Vec<ViewConfigView>> {
        Ok(self.view_configs.clone())
    }

    fn swapchain_formats(&mut self) -> VrResult<Vec<u32>> {
        Ok(self.formats.clone())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VrResult<SwapchainId> {
        self.calls.push(Call::CreateSwapchain(*desc));
        let id = SwapchainId(self.handle());
        self.live_swapchains.insert(id, *desc);
        Ok(id)
    }

    fn swapchain_images(&mut self, swapchain: SwapchainId) -> VrResult<Vec<u32>> {
        let base = swapchain.0 as u32 * 10;
        Ok((0..self.images_per_swapchain).map(|i| base + i).collect())
    }

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<u32> {
        self.calls.push(Call::Acquire(swapchain));
        let count = self.images_per_swapchain;
        let counter = self.acquire_counter.entry(swapchain).or_insert(0);
        let index = *counter % count;
        *counter += 1;
        Ok(self.forced_image_index.unwrap_or(index))
    }

    fn wait_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        self.calls.push(Call::Wait(swapchain));
        Ok(())
    }

    fn release_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        self.calls.push(Call::Release(swapchain));
        Ok(())
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        self.calls.push(Call::DestroySwapchain(swapchain));
        self.live_swapchains.remove(&swapchain);
        Ok(())
    }

    fn display_refresh_rate(&mut self) -> VrResult<Option<f32>> {
        Ok(self.refresh_rate)
    }
}
