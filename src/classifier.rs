//! Rule-table gesture classifier.
//!
//! A hand is reduced to a handful of booleans (five extension flags plus a
//! few auxiliary cues) and matched against an ordered list of rules. The
//! first rule that holds wins; nothing matching means `idle`. Several rules
//! share the exact same predicate, in which case the later one can never
//! fire. That is kept on purpose: reordering or splitting them would change
//! which symbol a given hand shape maps to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gestures::GestureSymbol;
use crate::landmarks::{
    HandSkeleton, INDEX_MCP, INDEX_PIP, INDEX_TIP, MIDDLE_MCP, MIDDLE_TIP, PINKY_TIP,
    RING_TIP, THUMB_TIP,
};
use crate::predicates::{
    ExtensionStrategy, distance, is_clustered, is_crossed, is_ringlike, is_touching,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vocabulary {
    /// hello/thanks/help/wait/repeat/yes/no, by finger count and hand height
    Macro,
    /// macro gestures, letters and digits
    Alphabet,
}

impl Vocabulary {
    pub fn rules(self) -> &'static [Rule] {
        match self {
            Vocabulary::Macro => MACRO_RULES,
            Vocabulary::Alphabet => ALPHABET_RULES,
        }
    }

    pub fn default_strategy(self) -> ExtensionStrategy {
        match self {
            Vocabulary::Macro => ExtensionStrategy::WristRatio {
                ratio: ExtensionStrategy::DEFAULT_WRIST_RATIO,
            },
            Vocabulary::Alphabet => ExtensionStrategy::JointChain,
        }
    }
}

/// Distances in normalized frame units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueThresholds {
    pub touch: f32,
    pub ring_min: f32,
    pub ring_max: f32,
    pub cluster_gap: f32,
    /// Wrist above this line (smaller y) counts as a raised hand.
    pub raised_height: f32,
}

impl Default for CueThresholds {
    fn default() -> Self {
        Self {
            touch: 0.05,
            ring_min: 0.03,
            ring_max: 0.08,
            cluster_gap: 0.06,
            raised_height: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingers {
    Any,
    /// thumb, index, middle, ring, pinky
    Exact([bool; 5]),
    /// `None` means either state is fine
    Partial([Option<bool>; 5]),
    Count(usize),
}

impl Fingers {
    fn matches(&self, ext: &[bool; 5]) -> bool {
        match self {
            Fingers::Any => true,
            Fingers::Exact(want) => want == ext,
            Fingers::Partial(want) => want
                .iter()
                .zip(ext)
                .all(|(w, e)| w.is_none_or(|w| w == *e)),
            Fingers::Count(n) => ext.iter().filter(|e| **e).count() == *n,
        }
    }
}

/// `TIMRP` initials for extended, `.` for curled, `?` for either.
impl fmt::Display for Fingers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const INITIALS: [char; 5] = ['T', 'I', 'M', 'R', 'P'];
        let want: [Option<bool>; 5] = match self {
            Fingers::Any => return f.write_str("any"),
            Fingers::Count(n) => return write!(f, "{n} up"),
            Fingers::Exact(e) => e.map(Some),
            Fingers::Partial(p) => *p,
        };
        for (c, w) in INITIALS.iter().zip(want) {
            let ch = match w {
                Some(true) => *c,
                Some(false) => '.',
                None => '?',
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    ThumbIndexTouch,
    ThumbIndexRing,
    /// thumb and index tips farther apart than a ring
    ThumbIndexApart,
    TipsClustered,
    IndexMiddleCrossed,
    ThumbOnIndexPip,
    Raised,
    Lowered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandFeatures {
    pub extended: [bool; 5],
    pub thumb_index_touch: bool,
    pub thumb_index_ring: bool,
    pub thumb_index_apart: bool,
    pub tips_clustered: bool,
    pub index_middle_crossed: bool,
    pub thumb_on_index_pip: bool,
    pub raised: bool,
}

impl HandFeatures {
    fn has(&self, cue: Cue) -> bool {
        match cue {
            Cue::ThumbIndexTouch => self.thumb_index_touch,
            Cue::ThumbIndexRing => self.thumb_index_ring,
            Cue::ThumbIndexApart => self.thumb_index_apart,
            Cue::TipsClustered => self.tips_clustered,
            Cue::IndexMiddleCrossed => self.index_middle_crossed,
            Cue::ThumbOnIndexPip => self.thumb_on_index_pip,
            Cue::Raised => self.raised,
            Cue::Lowered => !self.raised,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub symbol: GestureSymbol,
    pub fingers: Fingers,
    pub cues: &'static [Cue],
}

impl Rule {
    pub fn matches(&self, f: &HandFeatures) -> bool {
        self.fingers.matches(&f.extended) && self.cues.iter().all(|c| f.has(*c))
    }

    pub fn same_predicate(&self, other: &Rule) -> bool {
        self.fingers == other.fingers && self.cues == other.cues
    }
}

const fn rule(symbol: GestureSymbol, fingers: Fingers, cues: &'static [Cue]) -> Rule {
    Rule {
        symbol,
        fingers,
        cues,
    }
}

const X: bool = true;
const O: bool = false;

use Cue::*;
use Fingers::{Any, Count, Exact, Partial};
use GestureSymbol as G;

const MACRO_RULES: &[Rule] = &[
    rule(G::Hello, Count(5), &[Raised]),
    rule(G::Thanks, Count(5), &[Lowered]),
    rule(G::Wait, Count(4), &[]),
    rule(G::Repeat, Count(3), &[]),
    rule(G::No, Count(2), &[]),
    rule(G::Help, Count(1), &[Raised]),
    rule(G::Yes, Count(0), &[]),
];

const ALPHABET_RULES: &[Rule] = &[
    // macro gestures, only with the hand raised
    rule(G::Hello, Exact([X, X, X, X, X]), &[Raised]),
    rule(G::Thanks, Exact([O, X, X, X, X]), &[Raised, TipsClustered]),
    rule(G::Wait, Exact([O, X, X, X, X]), &[Raised]),
    rule(G::Help, Exact([X, O, O, O, O]), &[Raised]),
    rule(G::Yes, Exact([O, O, O, O, O]), &[Raised]),
    rule(G::No, Exact([O, X, X, O, O]), &[Raised]),
    rule(G::Repeat, Exact([X, O, O, O, X]), &[Raised]),
    // letters that need more than the extension flags; the clustered-tip
    // ones are restricted to a full fist
    rule(
        G::F,
        Partial([None, None, Some(X), Some(X), Some(X)]),
        &[ThumbIndexTouch],
    ),
    rule(G::R, Exact([O, X, X, O, O]), &[IndexMiddleCrossed]),
    rule(G::T, Exact([O, O, O, O, O]), &[ThumbOnIndexPip]),
    rule(G::C, Exact([O, O, O, O, O]), &[TipsClustered, ThumbIndexApart]),
    rule(G::O, Exact([O, O, O, O, O]), &[TipsClustered, ThumbIndexRing]),
    rule(G::E, Exact([O, O, O, O, O]), &[TipsClustered]),
    // thumb/index circle
    rule(G::Six, Any, &[ThumbIndexRing]),
    rule(G::Seven, Any, &[ThumbIndexRing]),
    rule(G::Eight, Any, &[ThumbIndexRing]),
    rule(G::Nine, Any, &[ThumbIndexRing]),
    rule(G::Zero, Any, &[ThumbIndexRing]),
    // plain finger patterns
    rule(G::A, Exact([X, O, O, O, O]), &[]),
    rule(G::B, Exact([O, X, X, X, X]), &[]),
    rule(G::D, Exact([O, X, O, O, O]), &[]),
    rule(G::G, Exact([X, X, O, O, O]), &[]),
    rule(G::H, Exact([O, X, X, O, O]), &[]),
    rule(G::I, Exact([O, O, O, O, X]), &[]),
    rule(G::J, Exact([O, O, O, O, X]), &[]),
    rule(G::K, Exact([X, X, X, O, O]), &[]),
    rule(G::L, Exact([X, X, O, O, O]), &[]),
    rule(G::M, Exact([O, O, O, O, O]), &[]),
    rule(G::N, Exact([O, O, O, O, O]), &[]),
    rule(G::P, Exact([X, X, X, O, O]), &[]),
    rule(G::Q, Exact([X, X, O, O, O]), &[]),
    rule(G::S, Exact([O, O, O, O, O]), &[]),
    rule(G::U, Exact([O, X, X, O, O]), &[]),
    rule(G::V, Exact([O, X, X, O, O]), &[]),
    rule(G::W, Exact([O, X, X, X, O]), &[]),
    rule(G::X, Exact([O, X, O, O, O]), &[]),
    rule(G::Y, Exact([X, O, O, O, X]), &[]),
    rule(G::Z, Exact([O, X, O, O, O]), &[]),
    rule(G::One, Exact([O, X, O, O, O]), &[]),
    rule(G::Two, Exact([O, X, X, O, O]), &[]),
    rule(G::Three, Exact([X, X, X, O, O]), &[]),
    rule(G::Four, Exact([O, X, X, X, X]), &[]),
    rule(G::Five, Exact([X, X, X, X, X]), &[]),
];

/// A rule that can never fire because an earlier rule has the same predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadowed {
    pub rule: Rule,
    pub by: GestureSymbol,
}

/// Stateless: the same skeleton always gives the same symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    vocabulary: Vocabulary,
    strategy: ExtensionStrategy,
    thresholds: CueThresholds,
}

impl Classifier {
    pub fn new(
        vocabulary: Vocabulary,
        strategy: ExtensionStrategy,
        thresholds: CueThresholds,
    ) -> Self {
        Self {
            vocabulary,
            strategy,
            thresholds,
        }
    }

    pub fn alphabet() -> Self {
        Self::new(
            Vocabulary::Alphabet,
            Vocabulary::Alphabet.default_strategy(),
            CueThresholds::default(),
        )
    }

    pub fn macro_gestures() -> Self {
        Self::new(
            Vocabulary::Macro,
            Vocabulary::Macro.default_strategy(),
            CueThresholds {
                raised_height: 0.5,
                ..CueThresholds::default()
            },
        )
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    pub fn strategy(&self) -> ExtensionStrategy {
        self.strategy
    }

    pub fn rules(&self) -> &'static [Rule] {
        self.vocabulary.rules()
    }

    pub fn features(&self, hand: &HandSkeleton) -> HandFeatures {
        let th = &self.thresholds;
        let thumb = hand.point(THUMB_TIP);
        let index = hand.point(INDEX_TIP);
        let tips = [
            hand.point(INDEX_TIP),
            hand.point(MIDDLE_TIP),
            hand.point(RING_TIP),
            hand.point(PINKY_TIP),
        ];
        HandFeatures {
            extended: self.strategy.extended(hand),
            thumb_index_touch: is_touching(thumb, index, th.touch),
            thumb_index_ring: is_ringlike(thumb, index, th.ring_min, th.ring_max),
            thumb_index_apart: distance(thumb, index) > th.ring_max,
            tips_clustered: is_clustered(&tips, th.cluster_gap),
            index_middle_crossed: is_crossed(
                hand.point(INDEX_MCP),
                index,
                hand.point(MIDDLE_MCP),
                hand.point(MIDDLE_TIP),
            ),
            thumb_on_index_pip: is_touching(thumb, hand.point(INDEX_PIP), th.touch),
            raised: hand.wrist().y < th.raised_height,
        }
    }

    pub fn classify(&self, hand: &HandSkeleton) -> GestureSymbol {
        let f = self.features(hand);
        self.rules()
            .iter()
            .find(|r| r.matches(&f))
            .map(|r| r.symbol)
            .unwrap_or(GestureSymbol::Idle)
    }

    /// Every symbol this classifier can produce, idle included, in rule order.
    pub fn symbols(&self) -> Vec<GestureSymbol> {
        let mut out = vec![GestureSymbol::Idle];
        for r in self.rules() {
            if !out.contains(&r.symbol) {
                out.push(r.symbol);
            }
        }
        out
    }

    pub fn shadowed(&self) -> Vec<Shadowed> {
        let rules = self.rules();
        rules
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                rules[..i]
                    .iter()
                    .find(|earlier| earlier.same_predicate(r))
                    .map(|earlier| Shadowed {
                        rule: *r,
                        by: earlier.symbol,
                    })
            })
            .collect()
    }
}
