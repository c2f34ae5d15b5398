//! Pure geometric tests over landmarks.

use serde::{Deserialize, Serialize};

use crate::landmarks::{Finger, HandSkeleton, Landmark};

pub fn distance(a: Landmark, b: Landmark) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Tip farther from the base than from the intermediate joint.
pub fn is_finger_extended(tip: Landmark, base: Landmark, mid_joint: Landmark) -> bool {
    distance(tip, base) > distance(tip, mid_joint)
}

/// Tip farther from the wrist than the base is, by `ratio`.
pub fn is_extended_from_wrist(tip: Landmark, base: Landmark, wrist: Landmark, ratio: f32) -> bool {
    distance(tip, wrist) > distance(base, wrist) * ratio
}

pub fn is_touching(a: Landmark, b: Landmark, threshold: f32) -> bool {
    distance(a, b) < threshold
}

pub fn is_ringlike(a: Landmark, b: Landmark, lo: f32, hi: f32) -> bool {
    let d = distance(a, b);
    d > lo && d < hi
}

pub fn is_clustered(points: &[Landmark], max_gap: f32) -> bool {
    points.windows(2).all(|w| distance(w[0], w[1]) < max_gap)
}

/// The two tips sit in the opposite horizontal order from their bases.
pub fn is_crossed(a_base: Landmark, a_tip: Landmark, b_base: Landmark, b_tip: Landmark) -> bool {
    (a_base.x - b_base.x) * (a_tip.x - b_tip.x) < 0.0
}

/// How a classifier decides whether a finger is extended. The two formulas
/// disagree near the boundary, so a classifier is bound to one of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtensionStrategy {
    /// `distance(tip, base) > distance(tip, pip)`
    JointChain,
    /// `distance(tip, wrist) > distance(base, wrist) * ratio`
    WristRatio { ratio: f32 },
}

impl ExtensionStrategy {
    pub const DEFAULT_WRIST_RATIO: f32 = 1.2;

    pub fn finger_extended(&self, hand: &HandSkeleton, finger: Finger) -> bool {
        let tip = hand.point(finger.tip());
        let base = hand.point(finger.base());
        match *self {
            ExtensionStrategy::JointChain => {
                is_finger_extended(tip, base, hand.point(finger.mid()))
            }
            ExtensionStrategy::WristRatio { ratio } => {
                is_extended_from_wrist(tip, base, hand.wrist(), ratio)
            }
        }
    }

    /// Extension flags in thumb, index, middle, ring, pinky order.
    pub fn extended(&self, hand: &HandSkeleton) -> [bool; 5] {
        Finger::ALL.map(|f| self.finger_extended(hand, f))
    }
}
