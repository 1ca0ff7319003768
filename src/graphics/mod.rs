//! # Graphics Seam
//!
//! The GL work the VR layer does itself, behind the [`GraphicsBackend`] trait.
//!
//! ## Plain English Explanation
//!
//! The game draws its world on its own. What's left for us is plumbing:
//!
//! - Wrap each swapchain image in a framebuffer the game can render into
//! - Clear the eye buffers at the start of a frame
//! - Copy (blit) pictures between framebuffers: eye → virtual screen,
//!   eye → desktop window
//! - Draw the virtual screen and its floor grid into both eyes
//!
//! [`gl::GlBackend`] does this with `glow`; tests use a recorder.

pub mod gl;
pub mod shaders;

#[cfg(test)]
pub mod mock;

use glam::{Mat4, Vec3};

use crate::config::VirtualScreenShape;
use crate::error::VrResult;

pub use self::gl::GlBackend;

/// Handle to a framebuffer object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Handle to a texture object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Pixel rectangle for blits and viewports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` × `height` surface
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }
}

/// Everything needed to draw the virtual screen into both eyes
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualScreenDraw {
    /// Texture holding the flattened game image
    pub texture: TextureId,
    pub shape: VirtualScreenShape,
    pub screen_model: Mat4,
    pub floor_model: Mat4,
    /// Per-eye world-to-eye matrices
    pub views: [Mat4; 2],
    pub projection: Mat4,
    /// Left eye position, for the floor's distance fade
    pub camera: Vec3,
}

/// GL operations used by the frame loop
pub trait GraphicsBackend {
    /// Framebuffer rendering into both layers of a color/depth array pair at once
    fn create_multiview_framebuffer(
        &mut self,
        color: TextureId,
        depth: TextureId,
        view_count: u32,
    ) -> VrResult<FramebufferId>;

    /// Framebuffer reading a single layer of an array texture
    fn create_layer_framebuffer(&mut self, color: TextureId, layer: u32)
        -> VrResult<FramebufferId>;

    /// Framebuffer around a plain 2D texture
    fn create_texture_framebuffer(&mut self, texture: TextureId) -> VrResult<FramebufferId>;

    /// Allocates an RGBA 2D texture
    fn create_texture(&mut self, width: u32, height: u32) -> VrResult<TextureId>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn delete_texture(&mut self, texture: TextureId);

    /// Makes `framebuffer` the draw target (`None` = desktop window)
    fn bind_draw_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Clears color and depth of the bound target within `area`
    fn clear(&mut self, area: Rect, color: [f32; 4]);

    /// Copies pixels with linear filtering (`None` = desktop window)
    fn blit(
        &mut self,
        source: FramebufferId,
        source_rect: Rect,
        destination: Option<FramebufferId>,
        destination_rect: Rect,
    );

    /// Uploads the virtual screen meshes and shaders
    fn init_virtual_screen(&mut self) -> VrResult<()>;

    /// Draws floor grid then screen into the bound multiview framebuffer
    fn draw_virtual_screen(&mut self, draw: &VirtualScreenDraw);

    /// Frees what `init_virtual_screen` created
    fn destroy_virtual_screen(&mut self);
}
