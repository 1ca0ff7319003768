//! Desktop mirror planning.
//!
//! Works out which part of which eye image lands where in the desktop
//! window. The window is split into as many equal columns as eyes shown;
//! each image is then either cropped to fill its column or letterboxed into
//! it.

use crate::config::{DesktopFit, DesktopView};
use crate::graphics::{FramebufferId, Rect};

/// One copy into the desktop window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MirrorBlit {
    pub source: FramebufferId,
    pub source_rect: Rect,
    pub destination_rect: Rect,
}

/// Fits a `width` × `height` image whose content has `content_aspect`
/// (width / height of what it depicts) into `area`.
///
/// Returns the source and destination rectangles.
pub fn fit_image(
    width: u32,
    height: u32,
    content_aspect: f32,
    area: Rect,
    fit: DesktopFit,
) -> (Rect, Rect) {
    let area_aspect = area.width as f32 / area.height.max(1) as f32;
    let full = Rect::full(width, height);

    match fit {
        DesktopFit::Crop => {
            let source = if content_aspect > area_aspect {
                // Wider than the window: cut the sides
                let keep = (width as f32 * area_aspect / content_aspect).round() as i32;
                Rect::new((width as i32 - keep) / 2, 0, keep, height as i32)
            } else {
                // Taller than the window: cut top and bottom
                let keep = (height as f32 * content_aspect / area_aspect).round() as i32;
                Rect::new(0, (height as i32 - keep) / 2, width as i32, keep)
            };
            (source, area)
        }
        DesktopFit::Letterbox => {
            let destination = if content_aspect > area_aspect {
                let h = (area.width as f32 / content_aspect).round() as i32;
                Rect::new(area.x, area.y + (area.height - h) / 2, area.width, h)
            } else {
                let w = (area.height as f32 * content_aspect).round() as i32;
                Rect::new(area.x + (area.width - w) / 2, area.y, w, area.height)
            };
            (full, destination)
        }
    }
}

/// Blits mirroring the eye images
///
/// `eyes` holds one framebuffer per eye reading the acquired image.
pub fn plan_eye_blits(
    view: DesktopView,
    fit: DesktopFit,
    eyes: [FramebufferId; 2],
    eye_size: (u32, u32),
    window: (u32, u32),
) -> Vec<MirrorBlit> {
    let shown: Vec<usize> = [(0, view.shows_left()), (1, view.shows_right())]
        .into_iter()
        .filter_map(|(eye, on)| on.then_some(eye))
        .collect();
    if shown.is_empty() || window.0 == 0 || window.1 == 0 {
        return Vec::new();
    }

    let part_width = window.0 as i32 / shown.len() as i32;
    let aspect = eye_size.0 as f32 / eye_size.1.max(1) as f32;

    shown
        .iter()
        .enumerate()
        .map(|(column, &eye)| {
            let area = Rect::new(column as i32 * part_width, 0, part_width, window.1 as i32);
            let (source_rect, destination_rect) =
                fit_image(eye_size.0, eye_size.1, aspect, area, fit);
            MirrorBlit {
                source: eyes[eye],
                source_rect,
                destination_rect,
            }
        })
        .collect()
}

/// Blit mirroring the flattened virtual-screen image over the whole window
pub fn plan_screen_blit(
    source: FramebufferId,
    size: (u32, u32),
    content_aspect: f32,
    fit: DesktopFit,
    window: (u32, u32),
) -> Option<MirrorBlit> {
    if window.0 == 0 || window.1 == 0 {
        return None;
    }
    let (source_rect, destination_rect) =
        fit_image(size.0, size.1, content_aspect, Rect::full(window.0, window.1), fit);
    Some(MirrorBlit {
        source,
        source_rect,
        destination_rect,
    })
}
