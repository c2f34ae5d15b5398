//! Hand skeleton model: 21 landmarks with fixed joint roles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Landmark indices of the finger chain: base (MCP, or CMC for the
    /// thumb), PIP, DIP, tip.
    pub const fn chain(self) -> [usize; 4] {
        let first = match self {
            Finger::Thumb => 1,
            Finger::Index => 5,
            Finger::Middle => 9,
            Finger::Ring => 13,
            Finger::Pinky => 17,
        };
        [first, first + 1, first + 2, first + 3]
    }

    pub const fn base(self) -> usize {
        self.chain()[0]
    }

    pub const fn mid(self) -> usize {
        self.chain()[1]
    }

    pub const fn tip(self) -> usize {
        self.chain()[3]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("hand skeleton needs exactly {LANDMARK_COUNT} landmarks, got {0}")]
    WrongCount(usize),
}

/// Exactly 21 landmarks. Every predicate indexes into this by joint role, so
/// the count is checked once here and never again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct HandSkeleton {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandSkeleton {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn point(&self, idx: usize) -> Landmark {
        self.points[idx]
    }

    pub fn wrist(&self) -> Landmark {
        self.points[WRIST]
    }

    #[cfg(test)]
    pub fn points_mut(&mut self) -> &mut [Landmark; LANDMARK_COUNT] {
        &mut self.points
    }
}

impl TryFrom<Vec<Landmark>> for HandSkeleton {
    type Error = LandmarkError;

    fn try_from(v: Vec<Landmark>) -> Result<Self, Self::Error> {
        let n = v.len();
        let points: [Landmark; LANDMARK_COUNT] =
            v.try_into().map_err(|_| LandmarkError::WrongCount(n))?;
        Ok(Self { points })
    }
}

impl From<HandSkeleton> for Vec<Landmark> {
    fn from(s: HandSkeleton) -> Self {
        s.points.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One tracked hand in one frame, as handed over by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    pub handedness: Handedness,
    pub score: f32,
    pub landmarks: HandSkeleton,
}
