//! # Swapchain Manager
//!
//! Owns the images the headset displays and the framebuffers around them.
//!
//! ## Plain English Explanation
//!
//! A swapchain is a small ring of images owned by the compositor. Each frame
//! we borrow one (acquire), wait until the compositor is done reading it,
//! draw into it, and hand it back (release). Forgetting to hand it back, or
//! borrowing twice, stalls or breaks the headset.
//!
//! We keep three sets of images:
//!
//! ```text
//!   color (2 layers) ┐
//!                    ├─ multiview framebuffer: the game draws both eyes at once
//!   depth (2 layers) ┘
//!   overlay (1 layer) ─ HUD / menus / weapon scope, shown as a quad layer
//!   screen texture    ─ plain GL texture, the flattened "virtual screen"
//! ```

pub mod desktop;
pub mod format;

use log::{debug, info};

use crate::error::{FormatErrorKind, VrError, VrResult};
use crate::graphics::{FramebufferId, GraphicsBackend, TextureId};
use crate::runtime::{SwapchainDesc, SwapchainId, XrRuntime};

/// Views in the stereo configuration
pub const VIEW_COUNT: u32 = 2;

// ============================================
// SINGLE SWAPCHAIN
// ============================================

/// One runtime swapchain and its acquisition state
#[derive(Debug)]
pub struct Swapchain {
    pub id: SwapchainId,
    pub format: u32,
    pub width: u32,
    pub height: u32,
    /// GL texture names, indexed by image index
    pub images: Vec<u32>,
    acquired: Option<u32>,
}

impl Swapchain {
    fn create<R: XrRuntime + ?Sized>(runtime: &mut R, desc: SwapchainDesc) -> VrResult<Self> {
        let id = runtime.create_swapchain(&desc)?;
        let images = runtime.swapchain_images(id)?;
        debug!(
            "Swapchain {:?}: {} images, {}x{}x{}",
            id,
            images.len(),
            desc.width,
            desc.height,
            desc.array_size
        );
        Ok(Self {
            id,
            format: desc.format,
            width: desc.width,
            height: desc.height,
            images,
            acquired: None,
        })
    }

    /// Acquires and waits for the next image, returning its index
    pub fn acquire<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<u32> {
        debug_assert!(
            self.acquired.is_none(),
            "swapchain {:?} acquired twice",
            self.id
        );
        let index = runtime.acquire_swapchain_image(self.id)?;
        if index as usize >= self.images.len() {
            return Err(VrError::protocol(format!(
                "swapchain {:?} returned image {} of {}",
                self.id,
                index,
                self.images.len()
            )));
        }
        runtime.wait_swapchain_image(self.id)?;
        self.acquired = Some(index);
        Ok(index)
    }

    /// Releases the acquired image
    pub fn release<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        if self.acquired.take().is_none() {
            return Err(VrError::protocol(format!(
                "release of swapchain {:?} without acquire",
                self.id
            )));
        }
        runtime.release_swapchain_image(self.id)
    }

    /// Index of the currently acquired image
    pub fn acquired(&self) -> Option<u32> {
        self.acquired
    }

    fn texture(&self, index: usize) -> TextureId {
        TextureId(self.images[index])
    }
}

// ============================================
// THE FULL SET
// ============================================

/// Image indices acquired for the eye buffers this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StereoImages {
    pub color: u32,
    pub depth: u32,
}

/// Every swapchain and framebuffer the frame loop renders through
pub struct SwapchainSet {
    pub width: u32,
    pub height: u32,
    pub color: Swapchain,
    pub depth: Swapchain,
    pub overlay: Swapchain,

    stereo_framebuffers: Vec<FramebufferId>,
    eye_framebuffers: [Vec<FramebufferId>; 2],
    overlay_framebuffers: Vec<FramebufferId>,

    /// Flattened game image shown on the virtual screen
    pub screen_texture: TextureId,
    pub screen_framebuffer: FramebufferId,
}

impl SwapchainSet {
    /// Negotiates formats and size, then allocates everything.
    ///
    /// `super_sampling` must already be clamped.
    pub fn create<R, G>(runtime: &mut R, graphics: &mut G, super_sampling: f32) -> VrResult<Self>
    where
        R: XrRuntime + ?Sized,
        G: GraphicsBackend + ?Sized,
    {
        let views = runtime.view_configuration_views()?;
        if views.len() != VIEW_COUNT as usize {
            return Err(VrError::Format(FormatErrorKind::ViewCount(views.len())));
        }
        let (left, right) = (&views[0], &views[1]);
        if (left.recommended_width, left.recommended_height)
            != (right.recommended_width, right.recommended_height)
        {
            return Err(VrError::Format(FormatErrorKind::EyeSizeMismatch {
                left: (left.recommended_width, left.recommended_height),
                right: (right.recommended_width, right.recommended_height),
            }));
        }

        let formats = runtime.swapchain_formats()?;
        let color_format = format::select_color_format(&formats)?;
        let depth_format = format::select_depth_format(&formats)?;
        let (width, height) = format::negotiate_resolution(left, super_sampling);
        info!(
            "Eye buffers {}x{} (recommended {}x{}, supersampling {:.2})",
            width, height, left.recommended_width, left.recommended_height, super_sampling
        );

        let color = Swapchain::create(
            runtime,
            SwapchainDesc {
                format: color_format.format,
                width,
                height,
                array_size: VIEW_COUNT,
                depth: false,
            },
        )?;
        let depth = Swapchain::create(
            runtime,
            SwapchainDesc {
                format: depth_format.format,
                width,
                height,
                array_size: VIEW_COUNT,
                depth: true,
            },
        )?;
        let overlay = Swapchain::create(
            runtime,
            SwapchainDesc {
                format: color_format.format,
                width,
                height,
                array_size: 1,
                depth: false,
            },
        )?;

        if color.images.len() != depth.images.len() {
            return Err(VrError::Graphics(format!(
                "color and depth swapchains differ in length ({} vs {})",
                color.images.len(),
                depth.images.len()
            )));
        }

        let mut stereo_framebuffers = Vec::with_capacity(color.images.len());
        let mut eye_framebuffers = [Vec::new(), Vec::new()];
        for index in 0..color.images.len() {
            stereo_framebuffers.push(graphics.create_multiview_framebuffer(
                color.texture(index),
                depth.texture(index),
                VIEW_COUNT,
            )?);
            for (eye, list) in eye_framebuffers.iter_mut().enumerate() {
                list.push(graphics.create_layer_framebuffer(color.texture(index), eye as u32)?);
            }
        }

        let mut overlay_framebuffers = Vec::with_capacity(overlay.images.len());
        for index in 0..overlay.images.len() {
            overlay_framebuffers.push(graphics.create_texture_framebuffer(overlay.texture(index))?);
        }

        let screen_texture = graphics.create_texture(width, height)?;
        let screen_framebuffer = graphics.create_texture_framebuffer(screen_texture)?;

        Ok(Self {
            width,
            height,
            color,
            depth,
            overlay,
            stereo_framebuffers,
            eye_framebuffers,
            overlay_framebuffers,
            screen_texture,
            screen_framebuffer,
        })
    }

    /// Acquires color and depth images for the eye buffers
    pub fn acquire_stereo<R: XrRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
    ) -> VrResult<StereoImages> {
        let color = self.color.acquire(runtime)?;
        let depth = self.depth.acquire(runtime)?;
        if color != depth {
            debug!("Color image {} paired with depth image {}", color, depth);
        }
        Ok(StereoImages { color, depth })
    }

    /// Releases the eye buffer images
    pub fn release_stereo<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        self.color.release(runtime)?;
        self.depth.release(runtime)
    }

    /// Acquires an overlay image
    pub fn acquire_overlay<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<u32> {
        self.overlay.acquire(runtime)
    }

    /// Releases the overlay image
    pub fn release_overlay<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        self.overlay.release(runtime)
    }

    /// Multiview framebuffer for a color image
    pub fn stereo_framebuffer(&self, index: u32) -> VrResult<FramebufferId> {
        lookup(&self.stereo_framebuffers, index, "stereo")
    }

    /// Single-eye read framebuffers for a color image
    pub fn eye_framebuffers(&self, index: u32) -> VrResult<[FramebufferId; 2]> {
        Ok([
            lookup(&self.eye_framebuffers[0], index, "left eye")?,
            lookup(&self.eye_framebuffers[1], index, "right eye")?,
        ])
    }

    /// Framebuffer for an overlay image
    pub fn overlay_framebuffer(&self, index: u32) -> VrResult<FramebufferId> {
        lookup(&self.overlay_framebuffers, index, "overlay")
    }

    /// Releases whatever is still acquired
    pub fn release_all<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        for swapchain in [&mut self.color, &mut self.depth, &mut self.overlay] {
            if swapchain.acquired().is_some() {
                swapchain.release(runtime)?;
            }
        }
        Ok(())
    }

    /// Forgets acquisitions made on a session that no longer exists
    pub fn discard_acquisitions(&mut self) {
        self.color.acquired = None;
        self.depth.acquired = None;
        self.overlay.acquired = None;
    }

    /// Frees the GL objects; the runtime swapchains are left alone
    pub fn destroy_graphics<G: GraphicsBackend + ?Sized>(&mut self, graphics: &mut G) {
        let [left, right] = &mut self.eye_framebuffers;
        let framebuffers = self
            .stereo_framebuffers
            .drain(..)
            .chain(left.drain(..))
            .chain(right.drain(..))
            .chain(self.overlay_framebuffers.drain(..));
        for framebuffer in framebuffers {
            graphics.delete_framebuffer(framebuffer);
        }
        graphics.delete_framebuffer(self.screen_framebuffer);
        graphics.delete_texture(self.screen_texture);
    }

    /// Frees everything
    pub fn destroy<R, G>(mut self, runtime: &mut R, graphics: &mut G) -> VrResult<()>
    where
        R: XrRuntime + ?Sized,
        G: GraphicsBackend + ?Sized,
    {
        self.release_all(runtime)?;
        self.destroy_graphics(graphics);
        runtime.destroy_swapchain(self.color.id)?;
        runtime.destroy_swapchain(self.depth.id)?;
        runtime.destroy_swapchain(self.overlay.id)?;
        info!("Swapchains destroyed");
        Ok(())
    }
}

fn lookup(framebuffers: &[FramebufferId], index: u32, what: &str) -> VrResult<FramebufferId> {
    framebuffers.get(index as usize).copied().ok_or_else(|| {
        VrError::protocol(format!(
            "no {} framebuffer for image {} ({} images)",
            what,
            index,
            framebuffers.len()
        ))
    })
}

// ============================================
// TESTS
// ============================================
