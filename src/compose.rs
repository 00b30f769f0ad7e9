use image::RgbaImage;

use crate::{
    flatten::{DocumentSnapshot, LayerBitmaps},
    foundation::core::BBox,
};

/// Straight (non-premultiplied) RGBA8 pixel.
pub type Rgba8 = [u8; 4];

/// Straight-alpha Porter-Duff "over": `src` (scaled by `opacity`) on top of `dst`.
pub fn over(dst: Rgba8, src: Rgba8, opacity: f32) -> Rgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return [src[0], src[1], src[2], 255];
    }

    let inv = 255u16 - u16::from(sa);
    let da = mul_div255(u16::from(dst[3]), inv);
    // sa + dst_a * (1 - sa) never exceeds 255 with round-half-up division.
    let out_a = u32::from(sa) + u32::from(da);
    if out_a == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * u32::from(sa) + u32::from(dst[i]) * u32::from(da);
        out[i] = ((num + out_a / 2) / out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    out
}

/// Where a composite landed on the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Destination region that received pixels; `None` when fully off-canvas.
    pub painted: Option<BBox>,
    /// The source extended past the destination and was cut to the overlap.
    pub clipped: bool,
}

/// Composite `src` onto `dst` with its top-left corner at `(left, top)`.
///
/// Anything outside `dst` is dropped; placement never fails.
pub fn composite_at(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    left: i32,
    top: i32,
    opacity: f32,
) -> Placement {
    let dst_bounds = BBox::from_origin_size(0, 0, dst.width(), dst.height());
    let placed = BBox::from_origin_size(left, top, src.width(), src.height());
    let Some(visible) = placed.intersect(dst_bounds) else {
        return Placement {
            painted: None,
            clipped: !placed.is_degenerate(),
        };
    };

    for y in visible.top..visible.bottom {
        let sy = (i64::from(y) - i64::from(top)) as u32;
        for x in visible.left..visible.right {
            let sx = (i64::from(x) - i64::from(left)) as u32;
            let s = src.get_pixel(sx, sy).0;
            let d = dst.get_pixel_mut(x as u32, y as u32);
            d.0 = over(d.0, s, opacity);
        }
    }

    Placement {
        painted: Some(visible),
        clipped: visible != placed,
    }
}

/// Composite every visible leaf of the snapshot at its own bbox, in paint order.
///
/// This is the "source as authored" raster: the detection image is drawn on top of it, and an
/// identity layout must reproduce it.
pub fn compose_layers(snapshot: &DocumentSnapshot, bitmaps: &LayerBitmaps) -> RgbaImage {
    let mut canvas = RgbaImage::new(snapshot.width, snapshot.height);
    for layer in &snapshot.layers {
        if layer.kind.is_group() || !layer.visible || layer.bbox.is_degenerate() {
            continue;
        }
        let Some(bitmap) = bitmaps.get(layer.id) else {
            continue;
        };
        composite_at(
            &mut canvas,
            bitmap,
            layer.bbox.left,
            layer.bbox.top,
            layer.opacity,
        );
    }
    canvas
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/compose.rs"]
mod tests;
