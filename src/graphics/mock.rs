//! Recording graphics backend for unit tests.

use super::*;

/// One recorded graphics operation
#[derive(Clone, Debug, PartialEq)]
pub enum GfxCall {
    Bind(Option<FramebufferId>),
    Clear(Rect, [f32; 4]),
    Blit {
        source: FramebufferId,
        source_rect: Rect,
        destination: Option<FramebufferId>,
        destination_rect: Rect,
    },
    DrawVirtualScreen(VirtualScreenDraw),
    InitVirtualScreen,
    DestroyVirtualScreen,
    DeleteFramebuffer(FramebufferId),
    DeleteTexture(TextureId),
}

#[derive(Default)]
pub struct MockGraphics {
    pub calls: Vec<GfxCall>,
    next: u32,
}

impl MockGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blits(&self) -> Vec<&GfxCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Blit { .. }))
            .collect()
    }

    pub fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::DrawVirtualScreen(_)))
            .count()
    }

    fn id(&mut self) -> u32 {
        self.next += 1;
        1000 + self.next
    }
}

impl GraphicsBackend for MockGraphics {
    fn create_multiview_framebuffer(
        &mut self,
        _color: TextureId,
        _depth: TextureId,
        _view_count: u32,
    ) -> VrResult<FramebufferId> {
        Ok(FramebufferId(self.id()))
    }

    fn create_layer_framebuffer(
        &mut self,
        _color: TextureId,
        _layer: u32,
    ) -> VrResult<FramebufferId> {
        Ok(FramebufferId(self.id()))
    }

    fn create_texture_framebuffer(&mut self, _texture: TextureId) -> VrResult<FramebufferId> {
        Ok(FramebufferId(self.id()))
    }

    fn create_texture(&mut self, _width: u32, _height: u32) -> VrResult<TextureId> {
        Ok(TextureId(self.id()))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(GfxCall::DeleteFramebuffer(framebuffer));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.calls.push(GfxCall::DeleteTexture(texture));
    }

    fn bind_draw_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.calls.push(GfxCall::Bind(framebuffer));
    }

    fn clear(&mut self, area: Rect, color: [f32; 4]) {
        self.calls.push(GfxCall::Clear(area, color));
    }

    fn blit(
        &mut self,
        source: FramebufferId,
        source_rect: Rect,
        destination: Option<FramebufferId>,
        destination_rect: Rect,
    ) {
        self.calls.push(GfxCall::Blit {
            source,
            source_rect,
            destination,
            destination_rect,
        });
    }

    fn init_virtual_screen(&mut self) -> VrResult<()> {
        self.calls.push(GfxCall::InitVirtualScreen);
        Ok(())
    }

    fn draw_virtual_screen(&mut self, draw: &VirtualScreenDraw) {
        self.calls.push(GfxCall::DrawVirtualScreen(draw.clone()));
    }

    fn destroy_virtual_screen(&mut self) {
        self.calls.push(GfxCall::DestroyVirtualScreen);
    }
}
