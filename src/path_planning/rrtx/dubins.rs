//! Dubins edges over `[x, y, theta, ...]`
//!
//! Shortest curvature-constrained paths for a forward-only car. The six words
//! LSL, RSR, LSR, RSL, RLR and LRL are evaluated in the normalised frame where
//! the turning radius is 1 and the start lies at the origin; the shortest valid
//! one is kept. Heading lives at dimension 2, further dimensions are carried
//! over from the endpoints unchanged.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::common::{EdgeModel, Point2D, Position, Trajectory};
use crate::path_planning::rrtx::distance::Wrapping;
use crate::path_planning::rrtx::obstacle::ObstacleSet;

const HEADING: usize = 2;

fn mod2pi(theta: f64) -> f64 {
    let m = theta.rem_euclid(2.0 * PI);
    // rounding noise just below a full turn is a zero-length arc
    if 2.0 * PI - m < 1e-9 {
        0.0
    } else {
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Left,
    Straight,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DubinsWord {
    LSL,
    RSR,
    LSR,
    RSL,
    RLR,
    LRL,
}

impl DubinsWord {
    pub const ALL: [DubinsWord; 6] = [
        DubinsWord::LSL,
        DubinsWord::RSR,
        DubinsWord::LSR,
        DubinsWord::RSL,
        DubinsWord::RLR,
        DubinsWord::LRL,
    ];

    pub fn segments(self) -> [Segment; 3] {
        use Segment::*;
        match self {
            DubinsWord::LSL => [Left, Straight, Left],
            DubinsWord::RSR => [Right, Straight, Right],
            DubinsWord::LSR => [Left, Straight, Right],
            DubinsWord::RSL => [Right, Straight, Left],
            DubinsWord::RLR => [Right, Left, Right],
            DubinsWord::LRL => [Left, Right, Left],
        }
    }

    /// Normalised segment lengths `(t, p, q)` for the word, if it exists
    fn solve(self, alpha: f64, beta: f64, d: f64) -> Option<[f64; 3]> {
        let (sa, sb) = (alpha.sin(), beta.sin());
        let (ca, cb) = (alpha.cos(), beta.cos());
        let c_ab = (alpha - beta).cos();
        let d_sq = d * d;

        match self {
            DubinsWord::LSL => {
                let p_sq = 2.0 + d_sq - 2.0 * c_ab + 2.0 * d * (sa - sb);
                if p_sq < -1e-10 {
                    return None;
                }
                let p_sq = p_sq.max(0.0);
                let tmp = (cb - ca).atan2(d + sa - sb);
                Some([mod2pi(tmp - alpha), p_sq.sqrt(), mod2pi(beta - tmp)])
            }
            DubinsWord::RSR => {
                let p_sq = 2.0 + d_sq - 2.0 * c_ab + 2.0 * d * (sb - sa);
                if p_sq < -1e-10 {
                    return None;
                }
                let p_sq = p_sq.max(0.0);
                let tmp = (ca - cb).atan2(d - sa + sb);
                Some([mod2pi(alpha - tmp), p_sq.sqrt(), mod2pi(tmp - beta)])
            }
            DubinsWord::LSR => {
                let p_sq = -2.0 + d_sq + 2.0 * c_ab + 2.0 * d * (sa + sb);
                if p_sq < -1e-10 {
                    return None;
                }
                let p_sq = p_sq.max(0.0);
                let p = p_sq.sqrt();
                let tmp = (-ca - cb).atan2(d + sa + sb) - (-2.0f64).atan2(p);
                Some([mod2pi(tmp - alpha), p, mod2pi(tmp - mod2pi(beta))])
            }
            DubinsWord::RSL => {
                let p_sq = -2.0 + d_sq + 2.0 * c_ab - 2.0 * d * (sa + sb);
                if p_sq < -1e-10 {
                    return None;
                }
                let p_sq = p_sq.max(0.0);
                let p = p_sq.sqrt();
                let tmp = (ca + cb).atan2(d - sa - sb) - 2.0f64.atan2(p);
                Some([mod2pi(alpha - tmp), p, mod2pi(beta - tmp)])
            }
            DubinsWord::RLR => {
                let tmp = (6.0 - d_sq + 2.0 * c_ab + 2.0 * d * (sa - sb)) / 8.0;
                if tmp.abs() > 1.0 {
                    return None;
                }
                let phi = (ca - cb).atan2(d - sa + sb);
                let p = mod2pi(2.0 * PI - tmp.acos());
                let t = mod2pi(alpha - phi + mod2pi(p / 2.0));
                Some([t, p, mod2pi(alpha - beta - t + mod2pi(p))])
            }
            DubinsWord::LRL => {
                let tmp = (6.0 - d_sq + 2.0 * c_ab + 2.0 * d * (sb - sa)) / 8.0;
                if tmp.abs() > 1.0 {
                    return None;
                }
                let phi = (ca - cb).atan2(d + sa - sb);
                let p = mod2pi(2.0 * PI - tmp.acos());
                let t = mod2pi(-alpha - phi + p / 2.0);
                Some([t, p, mod2pi(mod2pi(beta) - alpha - t + mod2pi(p))])
            }
        }
    }
}

/// Advance a unit-radius pose `(x, y, theta)` along one segment by `t`
fn advance(segment: Segment, (x, y, th): (f64, f64, f64), t: f64) -> (f64, f64, f64) {
    match segment {
        Segment::Left => (x + (th + t).sin() - th.sin(), y - (th + t).cos() + th.cos(), th + t),
        Segment::Right => (x - (th - t).sin() + th.sin(), y + (th - t).cos() - th.cos(), th - t),
        Segment::Straight => (x + th.cos() * t, y + th.sin() * t, th),
    }
}

#[derive(Debug, Clone)]
pub struct DubinsModel {
    min_turning_radius: f64,
    resolution: f64,
    velocity: f64,
    wrapping: Arc<Wrapping>,
}

impl DubinsModel {
    pub fn new(min_turning_radius: f64, resolution: f64, velocity: f64, wrapping: Wrapping) -> Self {
        Self {
            min_turning_radius,
            resolution,
            velocity,
            wrapping: Arc::new(wrapping),
        }
    }

    /// Shortest word between two poses and its normalised segment lengths
    pub fn shortest(&self, from: &Position, to: &Position) -> Option<(DubinsWord, [f64; 3])> {
        let rho = self.min_turning_radius;
        let dx = to[0] - from[0];
        let dy = to[1] - from[1];
        let d = (dx * dx + dy * dy).sqrt() / rho;
        let theta = if d > 0.0 { mod2pi(dy.atan2(dx)) } else { 0.0 };
        let alpha = mod2pi(from[HEADING] - theta);
        let beta = mod2pi(to[HEADING] - theta);

        DubinsWord::ALL
            .iter()
            .filter_map(|&word| word.solve(alpha, beta, d).map(|params| (word, params)))
            .min_by(|a, b| {
                let la: f64 = a.1.iter().sum();
                let lb: f64 = b.1.iter().sum();
                la.total_cmp(&lb)
            })
    }
}

impl EdgeModel for DubinsModel {
    type Edge = DubinsEdge;

    fn connect(&self, from: &Position, to: &Position) -> DubinsEdge {
        let (word, params, length) = if (to - from).norm() < 1e-12 {
            (None, [0.0; 3], 0.0)
        } else {
            match self.shortest(from, to) {
                Some((word, params)) => {
                    let length = params.iter().sum::<f64>() * self.min_turning_radius;
                    (Some(word), params, length)
                }
                None => (None, [0.0; 3], f64::INFINITY),
            }
        };
        DubinsEdge {
            start: from.clone(),
            end: to.clone(),
            word,
            params,
            length,
            model: self.clone(),
        }
    }

    fn reach(&self, delta: f64) -> f64 {
        delta + 4.0 * PI * self.min_turning_radius
    }
}

#[derive(Debug, Clone)]
pub struct DubinsEdge {
    start: Position,
    end: Position,
    word: Option<DubinsWord>,
    params: [f64; 3],
    length: f64,
    model: DubinsModel,
}

impl DubinsEdge {
    pub fn word(&self) -> Option<DubinsWord> {
        self.word
    }

    /// Poses every `resolution` along the edge, endpoints included
    pub fn sampled_poses(&self) -> Vec<Position> {
        if !self.length.is_finite() || self.length <= 0.0 {
            return vec![self.start.clone(), self.end.clone()];
        }
        let step = self.model.resolution.max(1e-3);
        let count = (self.length / step).ceil() as usize;
        (0..=count)
            .map(|i| self.pose_at_distance((i as f64 * step).min(self.length)))
            .collect()
    }
}

impl Trajectory for DubinsEdge {
    fn start(&self) -> &Position {
        &self.start
    }

    fn end(&self) -> &Position {
        &self.end
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn feasible(&self, obstacles: &ObstacleSet, robot_radius: f64) -> bool {
        if !self.length.is_finite() {
            return false;
        }
        if obstacles.is_empty() {
            return true;
        }
        let poses = self.sampled_poses();
        poses.windows(2).all(|w| {
            obstacles.segment_free(Point2D::from_position(&w[0]), Point2D::from_position(&w[1]), robot_radius)
        })
    }

    fn saturate(&self, max_length: f64) -> Self {
        if self.length <= max_length {
            return self.clone();
        }
        let end = self.pose_at_distance(max_length);
        DubinsEdge {
            start: self.start.clone(),
            end,
            word: self.word,
            params: self.params,
            length: max_length,
            model: self.model.clone(),
        }
    }

    fn pose_at_distance(&self, distance: f64) -> Position {
        let Some(word) = self.word else {
            return if distance <= 0.0 { self.start.clone() } else { self.end.clone() };
        };
        let rho = self.model.min_turning_radius;
        let mut remaining = (distance.clamp(0.0, self.length)) / rho;
        let mut q = (0.0, 0.0, self.start[HEADING]);
        for (segment, &len) in word.segments().iter().zip(self.params.iter()) {
            let t = remaining.min(len);
            q = advance(*segment, q, t);
            remaining -= t;
            if remaining <= 0.0 {
                break;
            }
        }

        let mut pose = self.start.clone();
        pose[0] = self.start[0] + q.0 * rho;
        pose[1] = self.start[1] + q.1 * rho;
        pose[HEADING] = mod2pi(q.2);
        self.model.wrapping.normalize(&mut pose);
        pose
    }

    fn pose_at_time(&self, time: f64) -> Position {
        self.pose_at_distance(time * self.model.velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WrapSpec;
    use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleId};
    use nalgebra::DVector;

    fn pos(v: &[f64]) -> Position {
        DVector::from_row_slice(v)
    }

    fn model() -> DubinsModel {
        let wrapping = Wrapping::new(&[WrapSpec::new(2, 2.0 * PI)], &pos(&[-50.0, -50.0, 0.0]));
        DubinsModel::new(1.0, 0.1, 10.0, wrapping)
    }

    fn assert_pose_close(a: &Position, b: &Position) {
        assert!((a[0] - b[0]).abs() < 1e-6, "{a} vs {b}");
        assert!((a[1] - b[1]).abs() < 1e-6, "{a} vs {b}");
        let dth = (a[2] - b[2]).rem_euclid(2.0 * PI);
        assert!(dth < 1e-6 || (2.0 * PI - dth) < 1e-6, "{a} vs {b}");
    }

    #[test]
    fn test_straight_ahead_is_a_line() {
        let edge = model().connect(&pos(&[0.0, 0.0, 0.0]), &pos(&[10.0, 0.0, 0.0]));
        assert!((edge.length() - 10.0).abs() < 1e-9);
        assert_pose_close(&edge.pose_at_distance(4.0), &pos(&[4.0, 0.0, 0.0]));
    }

    #[test]
    fn test_endpoint_reached_for_every_word() {
        let m = model();
        let cases = [
            (pos(&[0.0, 0.0, 0.0]), pos(&[4.0, 4.0, PI / 2.0])),
            (pos(&[0.0, 0.0, 0.0]), pos(&[4.0, -4.0, 3.0 * PI / 2.0])),
            (pos(&[0.0, 0.0, PI / 2.0]), pos(&[6.0, 0.0, 3.0 * PI / 2.0])),
            (pos(&[0.0, 0.0, 0.0]), pos(&[0.5, 0.5, PI])),
            (pos(&[10.0, 10.0, 5.0 * PI / 4.0]), pos(&[0.0, 0.0, 5.0 * PI / 4.0])),
        ];
        for (from, to) in cases {
            let edge = m.connect(&from, &to);
            assert!(edge.length().is_finite());
            assert!(edge.length() + 1e-9 >= (Point2D::from_position(&from)).distance(&Point2D::from_position(&to)));
            assert_pose_close(&edge.pose_at_distance(edge.length()), &to);
        }
    }

    #[test]
    fn test_turn_then_straight_length() {
        // left quarter circle of radius 1, then 5 straight up
        let edge = model().connect(&pos(&[0.0, 0.0, 0.0]), &pos(&[1.0, 6.0, PI / 2.0]));
        assert!((edge.length() - (PI / 2.0 + 5.0)).abs() < 1e-6);
        assert!(edge.word().is_some());
    }

    #[test]
    fn test_saturate_truncates_along_path() {
        let m = model();
        let edge = m.connect(&pos(&[0.0, 0.0, 0.0]), &pos(&[30.0, 0.0, 0.0]));
        let short = edge.saturate(10.0);
        assert!((short.length() - 10.0).abs() < 1e-12);
        assert_pose_close(short.end(), &pos(&[10.0, 0.0, 0.0]));
    }

    #[test]
    fn test_feasibility_samples_the_curve() {
        let m = model();
        let mut obstacles = ObstacleSet::new();
        obstacles.insert(ObstacleId(0), CircleObstacle::new(5.0, 0.0, 1.0));
        let through = m.connect(&pos(&[0.0, 0.0, 0.0]), &pos(&[10.0, 0.0, 0.0]));
        assert!(!through.feasible(&obstacles, 0.5));
        let beside = m.connect(&pos(&[0.0, 5.0, 0.0]), &pos(&[10.0, 5.0, 0.0]));
        assert!(beside.feasible(&obstacles, 0.5));
    }

    #[test]
    fn test_reach_covers_turning_loops() {
        assert!(model().reach(10.0) > 10.0);
    }
}
