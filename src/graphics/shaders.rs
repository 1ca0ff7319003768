//! GLSL sources for the virtual screen and floor grid.
//!
//! Both programs render to the two-layer eye buffers in one pass using
//! `GL_OVR_multiview2`; `gl_ViewID_OVR` picks the eye's view matrix.

/// Shared vertex stage: position + uv, per-eye view matrix
pub const VERTEX: &str = r#"#version 430 core
#extension GL_OVR_multiview2 : require
layout(num_views = 2) in;

layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_uv;

uniform mat4 u_model;
uniform mat4 u_view[2];
uniform mat4 u_projection;

out vec2 v_uv;
out vec3 v_world;

void main() {
    vec4 world = u_model * vec4(a_position, 1.0);
    v_world = world.xyz;
    v_uv = a_uv;
    gl_Position = u_projection * u_view[gl_ViewID_OVR] * world;
}
"#;

/// Samples the flattened game image
pub const SCREEN_FRAGMENT: &str = r#"#version 430 core

in vec2 v_uv;
in vec3 v_world;

uniform sampler2D u_texture;

out vec4 frag_color;

void main() {
    frag_color = vec4(texture(u_texture, v_uv).rgb, 1.0);
}
"#;

/// Procedural grid: thin lines every meter, dots at crossings, faded with distance
pub const FLOOR_FRAGMENT: &str = r#"#version 430 core

in vec2 v_uv;
in vec3 v_world;

uniform vec3 u_camera;

out vec4 frag_color;

void main() {
    vec2 coord = v_world.xz;
    vec2 width = fwidth(coord);

    vec2 grid = abs(fract(coord - 0.5) - 0.5) / width;
    float line = 1.0 - min(min(grid.x, grid.y), 1.0);

    vec2 cell = abs(fract(coord) - 0.5);
    float dot_radius = 0.03;
    float dots = 1.0 - smoothstep(dot_radius - length(width), dot_radius + length(width), length(0.5 - cell));

    float distance_to_camera = length(v_world.xz - u_camera.xz);
    float fade = 1.0 - smoothstep(3.0, 12.0, distance_to_camera);

    float intensity = max(line * 0.35, dots * 0.8);
    vec3 base = vec3(0.02, 0.02, 0.03);
    frag_color = vec4(base + vec3(0.25, 0.45, 0.6) * intensity, fade);
}
"#;
