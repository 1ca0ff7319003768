//! # OpenXR Runtime Backend
//!
//! The production [`XrRuntime`] built on the `openxr` crate with the OpenGL
//! graphics binding.
//!
//! ## Plain English Explanation
//!
//! Bootstrapping an OpenXR application is a fixed dance:
//!
//! ```text
//!   load loader ─► check extensions ─► create instance ─► find HMD system
//!        │
//!        ▼
//!   query GL requirements (mandatory!) ─► create session from GL context
//! ```
//!
//! After that, the session hands back a *frame waiter* (blocks until the
//! compositor wants a frame) and a *frame stream* (begin/end frame). Those
//! three objects plus the spaces and swapchains we create live here, keyed by
//! the small handles the frame loop passes around.

use std::collections::HashMap;

use ::openxr as xr;
use log::{debug, info, warn};

use super::{
    CompositionLayer, EyeView, FrameTiming, ImageRect, ProjectionLayer, QuadLayer, RuntimeEvent,
    SessionId, SpaceId, SwapchainDesc, SwapchainId, ViewConfigView, XrRuntime,
};
use crate::error::{VrError, VrResult};
use crate::math::Pose;

const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;

/// Application identity reported to the runtime
#[derive(Clone, Copy, Debug)]
pub struct AppInfo<'a> {
    pub application_name: &'a str,
    pub application_version: u32,
    pub engine_name: &'a str,
    pub engine_version: u32,
}

impl Default for AppInfo<'_> {
    fn default() -> Self {
        Self {
            application_name: "Quake3 VR",
            application_version: 1,
            engine_name: "ioq3",
            engine_version: 1,
        }
    }
}

// ============================================
// RUNTIME
// ============================================

/// A live OpenXR instance + session driving an OpenGL context
pub struct OpenXrRuntime {
    instance: xr::Instance,
    system: xr::SystemId,
    session: xr::Session<xr::OpenGL>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<xr::OpenGL>,
    event_buffer: xr::EventDataBuffer,

    spaces: HashMap<SpaceId, xr::Space>,
    swapchains: HashMap<SwapchainId, xr::Swapchain<xr::OpenGL>>,
    next_handle: u64,
}

fn check(operation: &'static str) -> impl FnOnce(xr::sys::Result) -> VrError {
    move |code| VrError::runtime(operation, code)
}

impl OpenXrRuntime {
    /// Loads the runtime and creates a session bound to the caller's GL context.
    ///
    /// # Safety
    /// `graphics` must describe a valid, current OpenGL context that outlives
    /// the returned runtime.
    pub unsafe fn new(
        app: AppInfo<'_>,
        graphics: &xr::opengl::SessionCreateInfo,
    ) -> VrResult<Self> {
        let entry = xr::Entry::load().map_err(|e| VrError::Loader(format!("{e:?}")))?;

        let available = entry
            .enumerate_extensions()
            .map_err(check("xrEnumerateInstanceExtensionProperties"))?;
        if !available.khr_opengl_enable {
            return Err(VrError::MissingExtension("XR_KHR_opengl_enable"));
        }

        let mut extensions = xr::ExtensionSet::default();
        extensions.khr_opengl_enable = true;
        extensions.fb_display_refresh_rate = available.fb_display_refresh_rate;
        extensions.ext_debug_utils = available.ext_debug_utils;

        let instance = entry
            .create_instance(
                &xr::ApplicationInfo {
                    application_name: app.application_name,
                    application_version: app.application_version,
                    engine_name: app.engine_name,
                    engine_version: app.engine_version,
                    api_version: xr::Version::new(1, 0, 0),
                },
                &extensions,
                &[],
            )
            .map_err(check("xrCreateInstance"))?;

        let properties = instance
            .properties()
            .map_err(check("xrGetInstanceProperties"))?;
        info!(
            "[OpenXR] Runtime {} {}.{}.{}",
            properties.runtime_name,
            properties.runtime_version.major(),
            properties.runtime_version.minor(),
            properties.runtime_version.patch()
        );

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(check("xrGetSystem"))?;

        let system_properties = instance
            .system_properties(system)
            .map_err(check("xrGetSystemProperties"))?;
        info!(
            "[OpenXR] System '{}': max swapchain {}x{}, {} layers, orientation tracking {}, position tracking {}",
            system_properties.system_name,
            system_properties.graphics_properties.max_swapchain_image_width,
            system_properties.graphics_properties.max_swapchain_image_height,
            system_properties.graphics_properties.max_layer_count,
            system_properties.tracking_properties.orientation_tracking,
            system_properties.tracking_properties.position_tracking
        );

        // Runtimes reject session creation until the requirements were queried
        let requirements = instance
            .graphics_requirements::<xr::OpenGL>(system)
            .map_err(check("xrGetOpenGLGraphicsRequirementsKHR"))?;
        info!(
            "[OpenXR] OpenGL {}.{} .. {}.{} supported",
            requirements.min_api_version_supported.major(),
            requirements.min_api_version_supported.minor(),
            requirements.max_api_version_supported.major(),
            requirements.max_api_version_supported.minor()
        );

        let (session, frame_waiter, frame_stream) = instance
            .create_session::<xr::OpenGL>(system, graphics)
            .map_err(check("xrCreateSession"))?;

        Ok(Self {
            instance,
            system,
            session,
            frame_waiter,
            frame_stream,
            event_buffer: xr::EventDataBuffer::new(),
            spaces: HashMap::new(),
            swapchains: HashMap::new(),
            next_handle: 1,
        })
    }

    /// The underlying instance, for subsystems that create their own objects
    /// (input actions, controller spaces)
    pub fn instance(&self) -> &xr::Instance {
        &self.instance
    }

    /// The underlying session
    pub fn session(&self) -> &xr::Session<xr::OpenGL> {
        &self.session
    }

    fn allocate_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn space(&self, id: SpaceId) -> VrResult<&xr::Space> {
        self.spaces.get(&id).ok_or(VrError::UnknownHandle {
            kind: "space",
            id: id.0,
        })
    }

    fn swapchain_mut(&mut self, id: SwapchainId) -> VrResult<&mut xr::Swapchain<xr::OpenGL>> {
        self.swapchains.get_mut(&id).ok_or(VrError::UnknownHandle {
            kind: "swapchain",
            id: id.0,
        })
    }
}

fn lookup<'a, K: std::hash::Hash + Eq, V>(
    map: &'a HashMap<K, V>,
    key: &K,
    kind: &'static str,
    id: u64,
) -> VrResult<&'a V> {
    map.get(key).ok_or(VrError::UnknownHandle { kind, id })
}

fn to_rect(rect: ImageRect) -> xr::Rect2Di {
    xr::Rect2Di {
        offset: xr::Offset2Di {
            x: rect.x,
            y: rect.y,
        },
        extent: xr::Extent2Di {
            width: rect.width,
            height: rect.height,
        },
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================

impl XrRuntime for OpenXrRuntime {
    fn session_id(&self) -> SessionId {
        SessionId(self.session.as_raw().into_raw())
    }

    fn poll_event(&mut self) -> VrResult<Option<RuntimeEvent>> {
        use xr::Event::*;

        let event = self
            .instance
            .poll_event(&mut self.event_buffer)
            .map_err(check("xrPollEvent"))?;

        Ok(event.map(|event| match event {
            EventsLost(e) => RuntimeEvent::EventsLost {
                count: e.lost_event_count(),
            },
            InstanceLossPending(e) => RuntimeEvent::InstanceLossPending {
                loss_time: e.loss_time(),
            },
            InteractionProfileChanged(_) => RuntimeEvent::InteractionProfileChanged,
            DisplayRefreshRateChangedFB(e) => RuntimeEvent::DisplayRefreshRateChanged {
                from: e.from_display_refresh_rate(),
                to: e.to_display_refresh_rate(),
            },
            ReferenceSpaceChangePending(e) => RuntimeEvent::ReferenceSpaceChangePending {
                session: SessionId(e.session().into_raw()),
                space_type: e.reference_space_type(),
            },
            SessionStateChanged(e) => RuntimeEvent::SessionStateChanged {
                session: SessionId(e.session().into_raw()),
                state: e.state(),
            },
            _ => RuntimeEvent::Other,
        }))
    }

    fn begin_session(&mut self) -> VrResult<()> {
        self.session
            .begin(VIEW_TYPE)
            .map_err(check("xrBeginSession"))?;
        Ok(())
    }

    fn end_session(&mut self) -> VrResult<()> {
        self.session.end().map_err(check("xrEndSession"))?;
        Ok(())
    }

    fn wait_frame(&mut self) -> VrResult<FrameTiming> {
        let state = self.frame_waiter.wait().map_err(check("xrWaitFrame"))?;
        Ok(FrameTiming {
            predicted_display_time: state.predicted_display_time,
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> VrResult<()> {
        self.frame_stream.begin().map_err(check("xrBeginFrame"))?;
        Ok(())
    }

    fn end_frame(&mut self, display_time: xr::Time, layers: &[CompositionLayer]) -> VrResult<()> {
        let spaces = &self.spaces;
        let swapchains = &self.swapchains;

        // Projection views must outlive the layer structs that point at them
        let mut projection_views = Vec::new();
        for layer in layers {
            if let CompositionLayer::Projection(ProjectionLayer { views, .. }) = layer {
                let mut built = Vec::with_capacity(views.len());
                for view in views {
                    let swapchain = lookup(swapchains, &view.swapchain, "swapchain", view.swapchain.0)?;
                    built.push(
                        xr::CompositionLayerProjectionView::new()
                            .pose(view.pose.to_xr())
                            .fov(view.fov.to_xr())
                            .sub_image(
                                xr::SwapchainSubImage::new()
                                    .swapchain(swapchain)
                                    .image_array_index(view.image_array_index)
                                    .image_rect(to_rect(view.rect)),
                            ),
                    );
                }
                projection_views.push(built);
            }
        }

        let mut projections = Vec::new();
        let mut quads = Vec::new();
        let mut views_iter = projection_views.iter();
        for layer in layers {
            match layer {
                CompositionLayer::Projection(ProjectionLayer { flags, space, .. }) => {
                    let views = views_iter
                        .next()
                        .ok_or_else(|| VrError::protocol("projection views out of step"))?;
                    projections.push(
                        xr::CompositionLayerProjection::new()
                            .layer_flags(*flags)
                            .space(lookup(spaces, space, "space", space.0)?)
                            .views(views),
                    );
                }
                CompositionLayer::Quad(QuadLayer {
                    flags,
                    space,
                    swapchain,
                    rect,
                    pose,
                    size,
                }) => {
                    quads.push(
                        xr::CompositionLayerQuad::new()
                            .layer_flags(*flags)
                            .space(lookup(spaces, space, "space", space.0)?)
                            .eye_visibility(xr::EyeVisibility::BOTH)
                            .sub_image(
                                xr::SwapchainSubImage::new()
                                    .swapchain(lookup(swapchains, swapchain, "swapchain", swapchain.0)?)
                                    .image_array_index(0)
                                    .image_rect(to_rect(*rect)),
                            )
                            .pose(pose.to_xr())
                            .size(xr::Extent2Df {
                                width: size.0,
                                height: size.1,
                            }),
                    );
                }
            }
        }

        // Keep submission order identical to the descriptor order
        let mut projection_iter = projections.iter();
        let mut quad_iter = quads.iter();
        let mut bases: Vec<&xr::CompositionLayerBase<xr::OpenGL>> = Vec::with_capacity(layers.len());
        for layer in layers {
            match layer {
                CompositionLayer::Projection(_) => {
                    if let Some(p) = projection_iter.next() {
                        bases.push(p);
                    }
                }
                CompositionLayer::Quad(_) => {
                    if let Some(q) = quad_iter.next() {
                        bases.push(q);
                    }
                }
            }
        }

        self.frame_stream
            .end(display_time, xr::EnvironmentBlendMode::OPAQUE, &bases)
            .map_err(check("xrEndFrame"))?;
        Ok(())
    }

    fn locate_views(&mut self, display_time: xr::Time, space: SpaceId) -> VrResult<Vec<EyeView>> {
        let space = self.space(space)?;
        let (_flags, views) = self
            .session
            .locate_views(VIEW_TYPE, display_time, space)
            .map_err(check("xrLocateViews"))?;

        Ok(views
            .into_iter()
            .map(|v| EyeView {
                pose: v.pose.into(),
                fov: v.fov.into(),
            })
            .collect())
    }

    fn locate_space(
        &mut self,
        space: SpaceId,
        base: SpaceId,
        display_time: xr::Time,
    ) -> VrResult<Pose> {
        let location = self
            .space(space)?
            .locate(self.space(base)?, display_time)
            .map_err(check("xrLocateSpace"))?;

        if !location
            .location_flags
            .contains(xr::SpaceLocationFlags::ORIENTATION_VALID)
        {
            debug!("[OpenXR] Space {:?} orientation not valid", space);
        }
        Ok(location.pose.into())
    }

    fn reference_space_types(&mut self) -> VrResult<Vec<xr::ReferenceSpaceType>> {
        self.session
            .enumerate_reference_spaces()
            .map_err(check("xrEnumerateReferenceSpaces"))
    }

    fn create_reference_space(
        &mut self,
        space_type: xr::ReferenceSpaceType,
        pose: Pose,
    ) -> VrResult<SpaceId> {
        let space = self
            .session
            .create_reference_space(space_type, pose.to_xr())
            .map_err(check("xrCreateReferenceSpace"))?;
        let id = SpaceId(self.allocate_handle());
        self.spaces.insert(id, space);
        Ok(id)
    }

    fn destroy_space(&mut self, space: SpaceId) -> VrResult<()> {
        // Dropping the wrapper calls xrDestroySpace
        match self.spaces.remove(&space) {
            Some(_) => Ok(()),
            None => Err(VrError::UnknownHandle {
                kind: "space",
                id: space.0,
            }),
        }
    }

    fn view_configuration_views(&mut self) -> VrResult<Vec<ViewConfigView>> {
        let views = self
            .instance
            .enumerate_view_configuration_views(self.system, VIEW_TYPE)
            .map_err(check("xrEnumerateViewConfigurationViews"))?;

        Ok(views
            .into_iter()
            .map(|v| ViewConfigView {
                recommended_width: v.recommended_image_rect_width,
                recommended_height: v.recommended_image_rect_height,
                max_width: v.max_image_rect_width,
                max_height: v.max_image_rect_height,
            })
            .collect())
    }

    fn swapchain_formats(&mut self) -> VrResult<Vec<u32>> {
        self.session
            .enumerate_swapchain_formats()
            .map_err(check("xrEnumerateSwapchainFormats"))
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VrResult<SwapchainId> {
        let usage_flags = if desc.depth {
            xr::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            xr::SwapchainUsageFlags::COLOR_ATTACHMENT | xr::SwapchainUsageFlags::SAMPLED
        };

        let swapchain = self
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags,
                format: desc.format,
                sample_count: 1,
                width: desc.width,
                height: desc.height,
                face_count: 1,
                array_size: desc.array_size,
                mip_count: 1,
            })
            .map_err(check("xrCreateSwapchain"))?;

        let id = SwapchainId(self.allocate_handle());
        self.swapchains.insert(id, swapchain);
        Ok(id)
    }

    fn swapchain_images(&mut self, swapchain: SwapchainId) -> VrResult<Vec<u32>> {
        self.swapchain_mut(swapchain)?
            .enumerate_images()
            .map_err(check("xrEnumerateSwapchainImages"))
    }

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<u32> {
        self.swapchain_mut(swapchain)?
            .acquire_image()
            .map_err(check("xrAcquireSwapchainImage"))
    }

    fn wait_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        self.swapchain_mut(swapchain)?
            .wait_image(xr::Duration::INFINITE)
            .map_err(check("xrWaitSwapchainImage"))?;
        Ok(())
    }

    fn release_swapchain_image(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        self.swapchain_mut(swapchain)?
            .release_image()
            .map_err(check("xrReleaseSwapchainImage"))?;
        Ok(())
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) -> VrResult<()> {
        match self.swapchains.remove(&swapchain) {
            Some(_) => Ok(()),
            None => Err(VrError::UnknownHandle {
                kind: "swapchain",
                id: swapchain.0,
            }),
        }
    }

    fn display_refresh_rate(&mut self) -> VrResult<Option<f32>> {
        let Some(ext) = self.instance.exts().fb_display_refresh_rate.as_ref() else {
            return Ok(None);
        };

        let mut rate = 0.0f32;
        let result = unsafe { (ext.get_display_refresh_rate)(self.session.as_raw(), &mut rate) };
        if result.into_raw() < 0 {
            warn!("[OpenXR] xrGetDisplayRefreshRateFB failed: {}", result);
            return Err(VrError::runtime("xrGetDisplayRefreshRateFB", result));
        }
        Ok(Some(rate))
    }
}
