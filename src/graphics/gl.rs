//! # OpenGL Backend
//!
//! [`GraphicsBackend`] implemented with `glow` on the engine's GL context.
//!
//! ## Plain English Explanation
//!
//! Swapchain images arrive from the runtime as bare GL texture names. Here we
//! wrap them in framebuffer objects, copy pictures between them, and own the
//! two small shader programs that draw the virtual screen and floor grid.
//!
//! All calls must happen on the thread that owns the GL context.

use std::num::NonZeroU32;

use glow::HasContext;
use log::{debug, info};

use super::shaders;
use super::{FramebufferId, GraphicsBackend, Rect, TextureId, VirtualScreenDraw};
use crate::config::VirtualScreenShape;
use crate::error::{VrError, VrResult};
use crate::virtual_screen::mesh::{self, Mesh, Vertex};

// ============================================
// HANDLE CONVERSION
// ============================================

fn native_texture(id: TextureId) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id.0).map(glow::NativeTexture)
}

fn native_framebuffer(id: FramebufferId) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id.0).map(glow::NativeFramebuffer)
}

// ============================================
// GPU RESOURCES
// ============================================

struct MeshBuffers {
    vertex_array: glow::NativeVertexArray,
    vertex_buffer: glow::NativeBuffer,
    index_buffer: glow::NativeBuffer,
    index_count: i32,
}

struct ScreenResources {
    screen_program: glow::NativeProgram,
    floor_program: glow::NativeProgram,
    flat: MeshBuffers,
    curved: MeshBuffers,
    floor: MeshBuffers,
}

/// glow-backed graphics operations
pub struct GlBackend {
    gl: glow::Context,
    screen: Option<ScreenResources>,
}

impl GlBackend {
    /// Wraps an already-current GL context
    pub fn new(gl: glow::Context) -> Self {
        Self { gl, screen: None }
    }

    /// Loads GL entry points with the platform's proc-address lookup.
    ///
    /// # Safety
    /// A GL context must be current on this thread.
    pub unsafe fn from_loader<F>(loader: F) -> Self
    where
        F: FnMut(&str) -> *const std::ffi::c_void,
    {
        Self::new(glow::Context::from_loader_function(loader))
    }

    /// The wrapped context, for callers that need raw GL access
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn check_framebuffer(&self, what: &str) -> VrResult<()> {
        let status = unsafe { self.gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER) };
        if status != glow::FRAMEBUFFER_COMPLETE {
            return Err(VrError::Graphics(format!(
                "{} framebuffer incomplete (status 0x{:x})",
                what, status
            )));
        }
        Ok(())
    }

    unsafe fn compile_program(&self, vertex: &str, fragment: &str) -> VrResult<glow::NativeProgram> {
        let gl = &self.gl;
        let program = gl.create_program().map_err(VrError::Graphics)?;

        let mut compiled = Vec::with_capacity(2);
        for (kind, source) in [(glow::VERTEX_SHADER, vertex), (glow::FRAGMENT_SHADER, fragment)] {
            let shader = gl.create_shader(kind).map_err(VrError::Graphics)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                gl.delete_program(program);
                return Err(VrError::Graphics(format!("shader compile failed: {}", log)));
            }
            gl.attach_shader(program, shader);
            compiled.push(shader);
        }

        gl.link_program(program);
        for shader in compiled {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }
        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(VrError::Graphics(format!("program link failed: {}", log)));
        }
        Ok(program)
    }

    unsafe fn upload_mesh(&self, mesh: &Mesh) -> VrResult<MeshBuffers> {
        let gl = &self.gl;
        let vertex_array = gl.create_vertex_array().map_err(VrError::Graphics)?;
        let vertex_buffer = gl.create_buffer().map_err(VrError::Graphics)?;
        let index_buffer = gl.create_buffer().map_err(VrError::Graphics)?;

        gl.bind_vertex_array(Some(vertex_array));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
            glow::STATIC_DRAW,
        );
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(index_buffer));
        gl.buffer_data_u8_slice(
            glow::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(&mesh.indices),
            glow::STATIC_DRAW,
        );

        let stride = std::mem::size_of::<Vertex>() as i32;
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 12);

        gl.bind_vertex_array(None);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);

        Ok(MeshBuffers {
            vertex_array,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as i32,
        })
    }

    unsafe fn delete_mesh(&self, mesh: &MeshBuffers) {
        self.gl.delete_vertex_array(mesh.vertex_array);
        self.gl.delete_buffer(mesh.vertex_buffer);
        self.gl.delete_buffer(mesh.index_buffer);
    }

    unsafe fn set_matrices(
        &self,
        program: glow::NativeProgram,
        model: &glam::Mat4,
        draw: &VirtualScreenDraw,
    ) {
        let gl = &self.gl;
        let mut views = [0.0f32; 32];
        views[..16].copy_from_slice(&draw.views[0].to_cols_array());
        views[16..].copy_from_slice(&draw.views[1].to_cols_array());

        gl.uniform_matrix_4_f32_slice(
            gl.get_uniform_location(program, "u_model").as_ref(),
            false,
            &model.to_cols_array(),
        );
        gl.uniform_matrix_4_f32_slice(
            gl.get_uniform_location(program, "u_view").as_ref(),
            false,
            &views,
        );
        gl.uniform_matrix_4_f32_slice(
            gl.get_uniform_location(program, "u_projection").as_ref(),
            false,
            &draw.projection.to_cols_array(),
        );
    }

    unsafe fn draw_mesh(&self, mesh: &MeshBuffers) {
        self.gl.bind_vertex_array(Some(mesh.vertex_array));
        self.gl
            .draw_elements(glow::TRIANGLES, mesh.index_count, glow::UNSIGNED_SHORT, 0);
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================

impl GraphicsBackend for GlBackend {
    fn create_multiview_framebuffer(
        &mut self,
        color: TextureId,
        depth: TextureId,
        view_count: u32,
    ) -> VrResult<FramebufferId> {
        unsafe {
            let framebuffer = self.gl.create_framebuffer().map_err(VrError::Graphics)?;
            self.gl
                .bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_multiview_ovr(
                glow::DRAW_FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                native_texture(depth),
                0,
                0,
                view_count as i32,
            );
            self.gl.framebuffer_texture_multiview_ovr(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                native_texture(color),
                0,
                0,
                view_count as i32,
            );
            let status = self.check_framebuffer("multiview");
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            status?;
            Ok(FramebufferId(framebuffer.0.get()))
        }
    }

    fn create_layer_framebuffer(
        &mut self,
        color: TextureId,
        layer: u32,
    ) -> VrResult<FramebufferId> {
        unsafe {
            let framebuffer = self.gl.create_framebuffer().map_err(VrError::Graphics)?;
            self.gl
                .bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_layer(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                native_texture(color),
                0,
                layer as i32,
            );
            let status = self.check_framebuffer("eye layer");
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            status?;
            Ok(FramebufferId(framebuffer.0.get()))
        }
    }

    fn create_texture_framebuffer(&mut self, texture: TextureId) -> VrResult<FramebufferId> {
        unsafe {
            let framebuffer = self.gl.create_framebuffer().map_err(VrError::Graphics)?;
            self.gl
                .bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                native_texture(texture),
                0,
            );
            let status = self.check_framebuffer("texture");
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            status?;
            Ok(FramebufferId(framebuffer.0.get()))
        }
    }

    fn create_texture(&mut self, width: u32, height: u32) -> VrResult<TextureId> {
        unsafe {
            let texture = self.gl.create_texture().map_err(VrError::Graphics)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_storage_2d(
                glow::TEXTURE_2D,
                1,
                glow::RGBA8,
                width as i32,
                height as i32,
            );
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            debug!("Created {}x{} texture {}", width, height, texture.0);
            Ok(TextureId(texture.0.get()))
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(fb) = native_framebuffer(framebuffer) {
            unsafe { self.gl.delete_framebuffer(fb) };
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(tex) = native_texture(texture) {
            unsafe { self.gl.delete_texture(tex) };
        }
    }

    fn bind_draw_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        unsafe {
            self.gl.bind_framebuffer(
                glow::DRAW_FRAMEBUFFER,
                framebuffer.and_then(native_framebuffer),
            );
        }
    }

    fn clear(&mut self, area: Rect, color: [f32; 4]) {
        unsafe {
            let gl = &self.gl;
            gl.viewport(area.x, area.y, area.width, area.height);
            gl.enable(glow::SCISSOR_TEST);
            gl.scissor(area.x, area.y, area.width, area.height);
            gl.depth_mask(true);
            gl.clear_color(color[0], color[1], color[2], color[3]);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            gl.disable(glow::SCISSOR_TEST);
        }
    }

    fn blit(
        &mut self,
        source: FramebufferId,
        source_rect: Rect,
        destination: Option<FramebufferId>,
        destination_rect: Rect,
    ) {
        unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, native_framebuffer(source));
            gl.bind_framebuffer(
                glow::DRAW_FRAMEBUFFER,
                destination.and_then(native_framebuffer),
            );
            gl.blit_framebuffer(
                source_rect.x,
                source_rect.y,
                source_rect.x + source_rect.width,
                source_rect.y + source_rect.height,
                destination_rect.x,
                destination_rect.y,
                destination_rect.x + destination_rect.width,
                destination_rect.y + destination_rect.height,
                glow::COLOR_BUFFER_BIT,
                glow::LINEAR,
            );
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
        }
    }

    fn init_virtual_screen(&mut self) -> VrResult<()> {
        if self.screen.is_some() {
            return Ok(());
        }

        unsafe {
            let screen_program = self.compile_program(shaders::VERTEX, shaders::SCREEN_FRAGMENT)?;
            let floor_program = self.compile_program(shaders::VERTEX, shaders::FLOOR_FRAGMENT)?;
            let flat = self.upload_mesh(&mesh::flat_quad())?;
            let curved = self.upload_mesh(&mesh::cylinder_section(
                mesh::CURVED_ARC,
                mesh::CURVED_SEGMENTS,
            ))?;
            let floor = self.upload_mesh(&mesh::floor_quad())?;

            self.screen = Some(ScreenResources {
                screen_program,
                floor_program,
                flat,
                curved,
                floor,
            });
        }

        info!("Virtual screen resources created");
        Ok(())
    }

    fn draw_virtual_screen(&mut self, draw: &VirtualScreenDraw) {
        let Some(res) = self.screen.as_ref() else {
            return;
        };

        unsafe {
            let gl = &self.gl;
            // Floor then screen, blended in draw order. The engine caches GL
            // state, so everything touched here is put back afterwards.
            let blend_was_enabled = gl.is_enabled(glow::BLEND);
            let depth_test_was_enabled = gl.is_enabled(glow::DEPTH_TEST);
            let cull_was_enabled = gl.is_enabled(glow::CULL_FACE);
            let depth_writes: bool = gl.get_parameter_bool(glow::DEPTH_WRITEMASK);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.depth_mask(false);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);

            gl.use_program(Some(res.floor_program));
            self.set_matrices(res.floor_program, &draw.floor_model, draw);
            gl.uniform_3_f32(
                gl.get_uniform_location(res.floor_program, "u_camera").as_ref(),
                draw.camera.x,
                draw.camera.y,
                draw.camera.z,
            );
            self.draw_mesh(&res.floor);

            gl.use_program(Some(res.screen_program));
            self.set_matrices(res.screen_program, &draw.screen_model, draw);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, native_texture(draw.texture));
            gl.uniform_1_i32(
                gl.get_uniform_location(res.screen_program, "u_texture").as_ref(),
                0,
            );
            match draw.shape {
                VirtualScreenShape::Curved => self.draw_mesh(&res.curved),
                VirtualScreenShape::Flat => self.draw_mesh(&res.flat),
            }

            if !blend_was_enabled {
                gl.disable(glow::BLEND);
            }
            if depth_test_was_enabled {
                gl.enable(glow::DEPTH_TEST);
            }
            if cull_was_enabled {
                gl.enable(glow::CULL_FACE);
            }
            gl.depth_mask(depth_writes);
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    }

    fn destroy_virtual_screen(&mut self) {
        if let Some(res) = self.screen.take() {
            unsafe {
                self.delete_mesh(&res.flat);
                self.delete_mesh(&res.curved);
                self.delete_mesh(&res.floor);
                self.gl.delete_program(res.screen_program);
                self.gl.delete_program(res.floor_program);
            }
        }
    }
}
