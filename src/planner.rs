//! Waypoint planning for the scan arc.
//!
//! A scan visits points on a quarter circle (0° to 90°) around the scan origin. The
//! raw arc is densely sampled, clamped into the legal travel of the X/Z stages, and then
//! resampled by arc length so consecutive visits are physically equidistant even where
//! clamping flattened part of the arc against a limit.
//!
//! ```text
//! build_arc(radius) -> clamp_to_bounds(bounds) -> resample(count)
//! ```
//!
//! Everything in this module is pure.

use serde::{Deserialize, Serialize};

/// Minimum number of samples on the raw arc.
pub const MIN_ARC_SAMPLES: usize = 64;

/// Raw arc sampling density.
const SAMPLES_PER_DEGREE: f64 = 2.0;

/// Points closer than this to the previous kept point are dropped after clamping.
pub const MIN_POINT_SPACING: f64 = 0.001;

/// Inclusive legal range of the translational axes, in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    /// Lowest scene x
    pub x_min: f64,
    /// Highest scene x
    pub x_max: f64,
    /// Lowest scene z
    pub z_min: f64,
    /// Highest scene z
    pub z_max: f64,
}

impl AxisBounds {
    /// Whether `min <= max` holds for both axes.
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.z_min <= self.z_max
    }

    /// Clamp `point` into the bounds.
    pub fn clamp(&self, point: Waypoint) -> Waypoint {
        Waypoint::new(
            point.x.clamp(self.x_min, self.x_max),
            point.z.clamp(self.z_min, self.z_max),
        )
    }
}

/// A planned target position in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Scene x
    pub x: f64,
    /// Scene z
    pub z: f64,
}

impl Waypoint {
    /// Waypoint at scene (`x`, `z`).
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Euclidean distance in scene units.
    pub fn distance_to(&self, other: &Waypoint) -> f64 {
        (self.x - other.x).hypot(self.z - other.z)
    }

    fn lerp(&self, other: &Waypoint, t: f64) -> Waypoint {
        Waypoint::new(
            self.x + (other.x - self.x) * t,
            self.z + (other.z - self.z) * t,
        )
    }
}

/// Sample a quarter circle of `radius` around `origin`, from 0° (towards +X) to 90° (+Z).
pub fn build_arc(origin: Waypoint, radius: f64) -> Vec<Waypoint> {
    let span_degrees = 90.0_f64;
    let samples = ((span_degrees * SAMPLES_PER_DEGREE).ceil() as usize).max(MIN_ARC_SAMPLES);

    (0..=samples)
        .map(|i| {
            let theta = (span_degrees * i as f64 / samples as f64).to_radians();
            Waypoint::new(
                origin.x + radius * theta.cos(),
                origin.z + radius * theta.sin(),
            )
        })
        .collect()
}

/// Clamp every point into `bounds` and drop points that collapse onto their predecessor.
pub fn clamp_to_bounds(points: &[Waypoint], bounds: &AxisBounds) -> Vec<Waypoint> {
    let mut kept: Vec<Waypoint> = Vec::with_capacity(points.len());
    for point in points {
        let clamped = bounds.clamp(*point);
        match kept.last() {
            Some(prev) if prev.distance_to(&clamped) < MIN_POINT_SPACING => {}
            _ => kept.push(clamped),
        }
    }
    kept
}

/// Resample a polyline to exactly `count` points equally spaced along its arc length.
///
/// `count <= 1` yields the first point alone, and a zero-length path yields the first
/// point repeated `count` times. An empty input yields an empty output.
pub fn resample(points: &[Waypoint], count: usize) -> Vec<Waypoint> {
    let Some(first) = points.first().copied() else {
        return Vec::new();
    };
    if count <= 1 {
        return vec![first];
    }

    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].distance_to(&pair[1]);
        cumulative.push(total);
    }

    if total <= 0.0 {
        return vec![first; count];
    }

    let step = total / (count - 1) as f64;
    let mut out = Vec::with_capacity(count);
    let mut segment = 0;
    for i in 0..count {
        let target = if i == count - 1 { total } else { step * i as f64 };
        while segment + 1 < cumulative.len() - 1 && cumulative[segment + 1] < target {
            segment += 1;
        }
        let start = cumulative[segment];
        let length = cumulative[segment + 1] - start;
        let t = if length > 0.0 {
            ((target - start) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(points[segment].lerp(&points[segment + 1], t));
    }
    out
}

/// Full planning pipeline used for path preview and for scan start.
pub fn plan_waypoints(
    origin: Waypoint,
    radius: f64,
    count: usize,
    bounds: &AxisBounds,
) -> Vec<Waypoint> {
    let arc = build_arc(origin, radius);
    let clamped = clamp_to_bounds(&arc, bounds);
    resample(&clamped, count)
}
