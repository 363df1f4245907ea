use serde::{Deserialize, Serialize};

/// A point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Whether `p` lies on the segment `a`-`b`, within `epsilon`
pub fn on_segment(a: Point, b: Point, p: Point, epsilon: f64) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
    if cross.abs() > epsilon * length.max(1.0) {
        return false;
    }

    p.x >= a.x.min(b.x) - epsilon
        && p.x <= a.x.max(b.x) + epsilon
        && p.y >= a.y.min(b.y) - epsilon
        && p.y <= a.y.max(b.y) + epsilon
}

/// Crossing-number point-in-polygon. Points on an edge or vertex count as
/// inside. The polygon is closed implicitly (last point joins the first).
pub fn contains(polygon: &[Point], p: Point, epsilon: f64) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];

        if on_segment(a, b, p, epsilon) {
            return true;
        }

        if (a.y > p.y) != (b.y > p.y) {
            let crossing_x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < crossing_x {
                inside = !inside;
            }
        }

        j = i;
    }

    inside
}
