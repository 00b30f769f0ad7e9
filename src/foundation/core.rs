use crate::foundation::error::{RefitError, RefitResult};

/// Canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Build a canvas, rejecting zero area.
    pub fn new(width: u32, height: u32) -> RefitResult<Self> {
        let canvas = Self { width, height };
        canvas.validate()?;
        Ok(canvas)
    }

    /// Reject canvases with zero area.
    pub fn validate(self) -> RefitResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RefitError::config(format!(
                "canvas must have positive area, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Full-canvas rectangle `(0, 0, width, height)`.
    pub fn bounds(self) -> BBox {
        BBox::new(0, 0, to_coord(self.width), to_coord(self.height))
    }
}

/// Axis-aligned rectangle in canvas-space integers. `right`/`bottom` are exclusive.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BBox {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl BBox {
    /// Rectangle from its four edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at `(left, top)` with the given size.
    pub fn from_origin_size(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            right: left.saturating_add(to_coord(width)),
            bottom: top.saturating_add(to_coord(height)),
        }
    }

    /// Width, zero for inverted rectangles.
    pub fn width(self) -> u32 {
        u32::try_from(i64::from(self.right) - i64::from(self.left)).unwrap_or(0)
    }

    /// Height, zero for inverted rectangles.
    pub fn height(self) -> u32 {
        u32::try_from(i64::from(self.bottom) - i64::from(self.top)).unwrap_or(0)
    }

    /// `width * height` without overflow.
    pub fn area(self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// True when the rectangle covers no pixels.
    pub fn is_degenerate(self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Clamp into `[0, width] x [0, height]`, keeping `right >= left` and `bottom >= top`.
    ///
    /// Inverted input collapses onto its clamped top-left corner. The result may be degenerate;
    /// callers treat that as "nothing to paint".
    pub fn clamp(self, width: u32, height: u32) -> Self {
        let w = to_coord(width);
        let h = to_coord(height);
        let left = self.left.clamp(0, w);
        let top = self.top.clamp(0, h);
        Self {
            left,
            top,
            right: self.right.clamp(left, w),
            bottom: self.bottom.clamp(top, h),
        }
    }

    /// Overlapping region, `None` when the rectangles share no pixels.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let out = Self {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        (!out.is_degenerate()).then_some(out)
    }

    /// Smallest rectangle covering both.
    pub fn union(self, other: Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// True when `other` lies fully inside `self`.
    pub fn contains(self, other: Self) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

fn to_coord(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
