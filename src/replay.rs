//! Offline runs over recorded frames.

use crate::classifier::Classifier;
use crate::engine::{GesturePrediction, SignEngine};
use crate::gestures::GestureSymbol;
use crate::input::{FrameRecord, timeline};

#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub frame: usize,
    pub timestamp_ms: u64,
    pub prediction: GesturePrediction,
}

/// Feeds every frame through the engine on the recording's own clock.
pub fn replay(engine: &mut SignEngine, frames: &[FrameRecord]) -> Vec<Emission> {
    timeline(frames)
        .into_iter()
        .zip(frames)
        .enumerate()
        .filter_map(|(i, (t, f))| {
            engine.on_frame_at(&f.hands, t).map(|prediction| Emission {
                frame: i + 1,
                timestamp_ms: t,
                prediction,
            })
        })
        .collect()
}

/// Per-frame classifier output before any filtering, one symbol per hand.
pub fn classify_frames(classifier: &Classifier, frames: &[FrameRecord]) -> Vec<Vec<GestureSymbol>> {
    frames
        .iter()
        .map(|f| {
            f.hands
                .iter()
                .map(|h| classifier.classify(&h.landmarks))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::landmarks::testkit::detection;

    fn rec(ext: Option<[bool; 5]>) -> FrameRecord {
        FrameRecord {
            timestamp_ms: None,
            hands: ext.map(|e| vec![detection(e, 0.9)]).unwrap_or_default(),
        }
    }

    const THUMB: [bool; 5] = [true, false, false, false, false];

    #[test]
    fn replay_reports_frame_numbers_and_times() {
        let frames = [
            rec(Some(THUMB)),
            rec(Some(THUMB)),
            rec(Some(THUMB)),
            rec(None),
            rec(Some(THUMB)),
            rec(Some(THUMB)),
            rec(Some(THUMB)),
        ];
        let mut engine = SignEngine::new(Classifier::alphabet(), EngineConfig::default(), |_| {});
        let out = replay(&mut engine, &frames);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].frame, out[0].timestamp_ms), (3, 66));
        assert_eq!((out[1].frame, out[1].timestamp_ms), (7, 198));
        assert!(out.iter().all(|e| e.prediction.symbol == GestureSymbol::A));
    }

    #[test]
    fn raw_classification_keeps_every_hand() {
        let mut two = rec(Some(THUMB));
        two.hands.push(detection([true; 5], 0.1));
        let out = classify_frames(&Classifier::alphabet(), &[two, rec(None)]);
        assert_eq!(out, vec![vec![GestureSymbol::A, GestureSymbol::Five], vec![]]);
    }
}
