//! Bounding-box arithmetic on annotation pixel coordinates.
//!
//! All boxes use a TOPLEFT origin: `t < b` for any non-degenerate box.
//! Rotated annotation boxes are represented by their axis-aligned enclosure
//! (see [`BBox::enclosing_rotated`]), which over-approximates the true shape;
//! boundary-crossing tests on rotated boxes are therefore conservative.

use serde::{Deserialize, Serialize};

/// A 2D control point of an annotation path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    #[must_use = "returns a new Point"]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bounding box with left, top, right, bottom coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub l: f64, // left (x_min)
    pub t: f64, // top (y_min)
    pub r: f64, // right (x_max)
    pub b: f64, // bottom (y_max)
}

impl BBox {
    /// Create a new bounding box
    #[inline]
    #[must_use = "returns a new BBox instance"]
    pub const fn new(l: f64, t: f64, r: f64, b: f64) -> Self {
        Self { l, t, r, b }
    }

    #[inline]
    #[must_use = "returns the box width"]
    pub fn width(&self) -> f64 {
        (self.r - self.l).abs()
    }

    #[inline]
    #[must_use = "returns the box height"]
    pub fn height(&self) -> f64 {
        (self.b - self.t).abs()
    }

    /// Calculate area of the bounding box
    #[inline]
    #[must_use = "returns the bounding box area"]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Calculate intersection area with another bbox
    #[inline]
    #[must_use = "returns the intersection area"]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_left = self.l.max(other.l);
        let y_top = self.t.max(other.t);
        let x_right = self.r.min(other.r);
        let y_bottom = self.b.min(other.b);

        let width = (x_right - x_left).max(0.0);
        let height = (y_bottom - y_top).max(0.0);

        width * height
    }

    /// Fraction of this box's area that lies inside `other`.
    ///
    /// This is `intersection_area / self.area`, NOT `IoU`. Degenerate boxes
    /// (zero area) are never contained.
    #[inline]
    #[must_use = "returns the contained fraction"]
    pub fn fraction_inside(&self, other: &Self) -> f64 {
        let self_area = self.area();
        if self_area > 0.0 {
            self.intersection_area(other) / self_area
        } else {
            0.0
        }
    }

    /// Check whether `point` lies inside this box, widened by `tolerance`
    /// pixels on every side.
    #[inline]
    #[must_use = "returns whether the point hits the box"]
    pub fn contains_point(&self, point: Point, tolerance: f64) -> bool {
        point.x >= self.l - tolerance
            && point.x <= self.r + tolerance
            && point.y >= self.t - tolerance
            && point.y <= self.b + tolerance
    }

    /// Smallest box enclosing both boxes
    #[inline]
    #[must_use = "returns the union box"]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            l: self.l.min(other.l),
            t: self.t.min(other.t),
            r: self.r.max(other.r),
            b: self.b.max(other.b),
        }
    }

    /// Shift horizontally by `dx` pixels
    #[inline]
    #[must_use = "returns the shifted box"]
    pub fn shifted_x(&self, dx: f64) -> Self {
        Self::new(self.l + dx, self.t, self.r + dx, self.b)
    }

    /// Divide every coordinate by `scale`
    #[inline]
    #[must_use = "returns the scaled box"]
    pub fn scaled_down(&self, scale: f64) -> Self {
        if scale == 0.0 || scale == 1.0 {
            return *self;
        }
        Self::new(self.l / scale, self.t / scale, self.r / scale, self.b / scale)
    }

    /// Axis-aligned box enclosing this box rotated by `rotation_deg` about its
    /// centre (clockwise in screen coordinates, as CVAT stores it).
    #[must_use = "returns the enclosing box"]
    pub fn enclosing_rotated(&self, rotation_deg: f64) -> Self {
        if rotation_deg.rem_euclid(360.0) == 0.0 {
            return *self;
        }

        let cx = (self.l + self.r) / 2.0;
        let cy = (self.t + self.b) / 2.0;
        let (sin, cos) = rotation_deg.to_radians().sin_cos();

        let corners = [
            (self.l, self.t),
            (self.r, self.t),
            (self.r, self.b),
            (self.l, self.b),
        ];

        corners
            .into_iter()
            .map(|(x, y)| {
                let dx = x - cx;
                let dy = y - cy;
                let rx = cx + dx * cos - dy * sin;
                let ry = cy + dx * sin + dy * cos;
                Self::new(rx, ry, rx, ry)
            })
            .reduce(|acc, corner| acc.union(&corner))
            .unwrap_or(*self)
    }
}
