//! Mesh generation for the virtual screen surfaces and the floor.
//!
//! Every mesh is unit sized and centred on the origin; the model matrix
//! scales and places it.

use bytemuck::{Pod, Zeroable};

/// Number of columns in the curved screen
pub const CURVED_SEGMENTS: u32 = 64;

/// Angle the curved screen wraps around the viewer, in radians
pub const CURVED_ARC: f32 = std::f32::consts::FRAC_PI_2;

/// Interleaved position + texture coordinate
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

/// Unit quad in the XY plane facing +Z
pub fn flat_quad() -> Mesh {
    Mesh {
        vertices: vec![
            Vertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 0.0] },
            Vertex { position: [0.5, -0.5, 0.0], uv: [1.0, 0.0] },
            Vertex { position: [0.5, 0.5, 0.0], uv: [1.0, 1.0] },
            Vertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 1.0] },
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// Unit quad in the XZ plane facing +Y
pub fn floor_quad() -> Mesh {
    Mesh {
        vertices: vec![
            Vertex { position: [-0.5, 0.0, 0.5], uv: [0.0, 0.0] },
            Vertex { position: [0.5, 0.0, 0.5], uv: [1.0, 0.0] },
            Vertex { position: [0.5, 0.0, -0.5], uv: [1.0, 1.0] },
            Vertex { position: [-0.5, 0.0, -0.5], uv: [0.0, 1.0] },
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// Section of a cylinder with a chord one unit wide and one unit tall.
///
/// The middle column sits at z = 0 and the edges bend towards +Z, so the
/// surface wraps around a viewer in front of it.
pub fn cylinder_section(arc: f32, segments: u32) -> Mesh {
    let segments = segments.max(1);
    let radius = 0.5 / (arc * 0.5).sin();

    let mut vertices = Vec::with_capacity(2 * (segments as usize + 1));
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let theta = (t - 0.5) * arc;
        let x = radius * theta.sin();
        let z = radius * (1.0 - theta.cos());

        vertices.push(Vertex { position: [x, -0.5, z], uv: [t, 0.0] });
        vertices.push(Vertex { position: [x, 0.5, z], uv: [t, 1.0] });
    }

    let mut indices = Vec::with_capacity(6 * segments as usize);
    for i in 0..segments as u16 {
        let bottom = i * 2;
        let top = bottom + 1;
        let next_bottom = bottom + 2;
        let next_top = bottom + 3;
        indices.extend_from_slice(&[bottom, next_bottom, next_top, bottom, next_top, top]);
    }

    Mesh { vertices, indices }
}
