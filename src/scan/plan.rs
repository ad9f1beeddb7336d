//! Expansion of settings and waypoints into the ordered list of scan steps.
//!
//! A cycle is an outbound pass over the waypoints followed by a return pass. The
//! outbound pass rotates R by one revolution per waypoint in the positive direction,
//! the return pass in the negative direction, so every full cycle leaves R where it
//! started.
//!
//! With `start_at_center` only the first outbound pass is shortened (it begins at the
//! middle waypoint); its return pass and all later cycles traverse the full list.

use serde::{Deserialize, Serialize};

use super::settings::{ScanSettings, StartDirection};
use crate::planner::Waypoint;

/// Direction of the per-waypoint revolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationSign {
    /// First pass of a cycle
    Positive,
    /// Second pass of a cycle
    Negative,
}

impl RotationSign {
    /// +1.0 or -1.0
    pub fn factor(self) -> f64 {
        match self {
            RotationSign::Positive => 1.0,
            RotationSign::Negative => -1.0,
        }
    }
}

/// One waypoint visit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    /// Zero-based cycle number
    pub cycle: usize,
    /// Index into [`ScanPlan::waypoints`]
    pub waypoint_index: usize,
    /// Target of this step
    pub waypoint: Waypoint,
    /// Direction of the revolution after the translation
    pub sign: RotationSign,
}

#[derive(Debug, Clone, PartialEq)]
struct Pass {
    indices: Vec<usize>,
    sign: RotationSign,
}

/// Ordered steps of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    waypoints: Vec<Waypoint>,
    cycles: Vec<[Pass; 2]>,
}

impl ScanPlan {
    /// Lay out every cycle for `waypoints` under `settings`.
    pub fn build(waypoints: Vec<Waypoint>, settings: &ScanSettings) -> Self {
        let n = waypoints.len();
        let ordered: Vec<usize> = match settings.start_direction {
            StartDirection::Forward => (0..n).collect(),
            StartDirection::Reverse => (0..n).rev().collect(),
        };
        let returning: Vec<usize> = ordered.iter().rev().copied().collect();

        let cycles = (0..settings.repeats)
            .map(|cycle| {
                let skip = if cycle == 0 && settings.start_at_center {
                    n / 2
                } else {
                    0
                };
                [
                    Pass {
                        indices: ordered[skip..].to_vec(),
                        sign: RotationSign::Positive,
                    },
                    Pass {
                        indices: returning.clone(),
                        sign: RotationSign::Negative,
                    },
                ]
            })
            .collect();

        Self { waypoints, cycles }
    }

    /// Waypoints of one pass, in arc order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Number of back-and-forth cycles.
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    /// Number of waypoint visits across all cycles.
    pub fn total_steps(&self) -> usize {
        self.cycles
            .iter()
            .flat_map(|passes| passes.iter())
            .map(|pass| pass.indices.len())
            .sum()
    }

    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = PlannedStep> + '_ {
        self.cycles.iter().enumerate().flat_map(move |(cycle, passes)| {
            passes.iter().flat_map(move |pass| {
                pass.indices.iter().map(move |&index| PlannedStep {
                    cycle,
                    waypoint_index: index,
                    waypoint: self.waypoints[index],
                    sign: pass.sign,
                })
            })
        })
    }

    /// Waypoint the final step visits.
    pub fn last_waypoint(&self) -> Option<Waypoint> {
        self.steps().last().map(|step| step.waypoint)
    }
}

/// Running R target across a scan.
///
/// Only the sequencer advances it; each call moves the target by exactly one
/// revolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAccumulator {
    initial: f64,
    current: f64,
    units_per_rev: f64,
}

impl RotationAccumulator {
    /// Start at `initial`, moving `units_per_rev` per revolution.
    pub fn new(initial: f64, units_per_rev: f64) -> Self {
        Self {
            initial,
            current: initial,
            units_per_rev,
        }
    }

    /// Current R target.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Move one revolution in `sign` direction and return the new target.
    pub fn advance(&mut self, sign: RotationSign) -> f64 {
        self.current += sign.factor() * self.units_per_rev;
        self.current
    }

    /// Signed revolutions since the start of the run.
    pub fn net_revolutions(&self) -> f64 {
        (self.current - self.initial) / self.units_per_rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Waypoint> {
        (0..n).map(|i| Waypoint::new(i as f64, 0.0)).collect()
    }

    fn indices(plan: &ScanPlan) -> Vec<usize> {
        plan.steps().map(|s| s.waypoint_index).collect()
    }

    #[test]
    fn forward_cycle_goes_out_and_back() {
        let plan = ScanPlan::build(points(3), &ScanSettings::default());
        assert_eq!(indices(&plan), vec![0, 1, 2, 2, 1, 0]);
        assert_eq!(plan.total_steps(), 6);
        let signs: Vec<_> = plan.steps().map(|s| s.sign).collect();
        assert_eq!(&signs[..3], &[RotationSign::Positive; 3]);
        assert_eq!(&signs[3..], &[RotationSign::Negative; 3]);
    }

    #[test]
    fn reverse_start_flips_pass_order() {
        let settings = ScanSettings {
            start_direction: StartDirection::Reverse,
            repeats: 2,
            ..Default::default()
        };
        let plan = ScanPlan::build(points(3), &settings);
        assert_eq!(indices(&plan), vec![2, 1, 0, 0, 1, 2, 2, 1, 0, 0, 1, 2]);
        assert_eq!(plan.cycle_count(), 2);
    }

    #[test]
    fn center_start_shortens_only_first_outbound_pass() {
        let settings = ScanSettings {
            start_at_center: true,
            repeats: 2,
            ..Default::default()
        };
        let plan = ScanPlan::build(points(5), &settings);
        // (5 - 2) + 5 for the first cycle, 2 * 5 for the second
        assert_eq!(plan.total_steps(), 3 + 5 + 10);
        assert_eq!(
            indices(&plan)[..8].to_vec(),
            vec![2, 3, 4, 4, 3, 2, 1, 0]
        );
        assert_eq!(plan.steps().count(), plan.total_steps());
    }

    #[test]
    fn single_waypoint_plan() {
        let plan = ScanPlan::build(points(1), &ScanSettings::default());
        assert_eq!(plan.total_steps(), 2);
        assert_eq!(plan.last_waypoint(), Some(Waypoint::new(0.0, 0.0)));
    }

    #[test]
    fn accumulator_tracks_signed_revolutions() {
        let mut acc = RotationAccumulator::new(150.0, 3000.0);
        assert_eq!(acc.advance(RotationSign::Positive), 3150.0);
        assert_eq!(acc.advance(RotationSign::Positive), 6150.0);
        assert_eq!(acc.net_revolutions(), 2.0);
        acc.advance(RotationSign::Negative);
        acc.advance(RotationSign::Negative);
        assert_eq!(acc.current(), 150.0);
        assert_eq!(acc.net_revolutions(), 0.0);
    }
}
