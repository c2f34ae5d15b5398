//! Stability/debounce filter over per-frame classifications.
//!
//! One `SignEngine` owns one session's state. Frames go in through
//! [`SignEngine::on_frame`]; a prediction comes out only when the newest
//! classification has held for `stability_threshold` frames and differs from
//! the last one emitted.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Instant};

use crate::classifier::{Classifier, Vocabulary};
use crate::gestures::GestureSymbol;
use crate::history::HistoryBuffer;
use crate::landmarks::HandDetection;

/// Stored as given. Nothing here is range-checked; profile loading does that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub confidence_threshold: f32,
    pub stability_threshold: usize,
    pub gesture_cooldown_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            stability_threshold: 3,
            gesture_cooldown_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GesturePrediction {
    pub symbol: GestureSymbol,
    pub confidence: f32,
    pub text: String,
    pub is_stable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub vocabulary: Vocabulary,
    pub config: EngineConfig,
    pub last_stable: GestureSymbol,
    pub history: Vec<GestureSymbol>,
    pub frames: u64,
    pub emitted: u64,
}

pub type PredictionHandler = Box<dyn FnMut(&GesturePrediction) + Send>;

#[derive(Debug, Clone, Default)]
struct EngineState {
    history: HistoryBuffer,
    last_stable: GestureSymbol,
    last_emit_ms: Option<u64>,
}

impl EngineState {
    /// No qualifying hand: forget the streak but keep the emit time.
    fn reset_streak(&mut self) {
        self.history.clear();
        self.last_stable = GestureSymbol::Idle;
    }
}

pub struct SignEngine {
    classifier: Classifier,
    config: EngineConfig,
    captions: HashMap<GestureSymbol, String>,
    state: EngineState,
    handler: PredictionHandler,
    running: bool,
    clock: Instant,
    frames: u64,
    emitted: u64,
}

impl SignEngine {
    pub fn new<F>(classifier: Classifier, config: EngineConfig, handler: F) -> Self
    where
        F: FnMut(&GesturePrediction) + Send + 'static,
    {
        Self {
            classifier,
            config,
            captions: HashMap::new(),
            state: EngineState::default(),
            handler: Box::new(handler),
            running: true,
            clock: Instant::now(),
            frames: 0,
            emitted: 0,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Applies from the next frame on.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn set_captions(&mut self, captions: HashMap<GestureSymbol, String>) {
        self.captions = captions;
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Swapping rule tables invalidates the history, so the session restarts.
    pub fn set_classifier(&mut self, classifier: Classifier) {
        if classifier != self.classifier {
            self.classifier = classifier;
            self.state = EngineState::default();
        }
    }

    pub fn caption(&self, symbol: GestureSymbol) -> String {
        self.captions
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| symbol.display_text().to_string())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames delivered after this are ignored until `start`.
    pub fn stop(&mut self) {
        if self.running {
            debug!("engine stopped");
        }
        self.running = false;
        self.state = EngineState::default();
    }

    pub fn start(&mut self) {
        if !self.running {
            debug!("engine started");
        }
        self.running = true;
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running,
            vocabulary: self.classifier.vocabulary(),
            config: self.config,
            last_stable: self.state.last_stable,
            history: self.state.history.to_vec(),
            frames: self.frames,
            emitted: self.emitted,
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    pub fn on_frame(&mut self, hands: &[HandDetection]) -> Option<GesturePrediction> {
        let now = self.now_ms();
        self.on_frame_at(hands, now)
    }

    /// Same as [`on_frame`](Self::on_frame) with an explicit clock in ms.
    pub fn on_frame_at(&mut self, hands: &[HandDetection], now_ms: u64) -> Option<GesturePrediction> {
        if !self.running {
            return None;
        }
        self.frames += 1;

        let cfg = self.config;
        let mut accepted = hands
            .iter()
            .filter(|h| h.score >= cfg.confidence_threshold)
            .peekable();

        if accepted.peek().is_none() {
            if !self.state.history.is_empty() || !self.state.last_stable.is_idle() {
                trace!("no qualifying hand ({} tracked); reset", hands.len());
            }
            self.state.reset_streak();
            return None;
        }

        for hand in accepted {
            let symbol = self.classifier.classify(&hand.landmarks);
            self.state.history.push(symbol);
            let stable = self
                .state
                .history
                .is_stable(symbol, cfg.stability_threshold);
            trace!("{:?} hand -> {symbol} (stable={stable})", hand.handedness);

            let cooling = self
                .state
                .last_emit_ms
                .is_some_and(|t| now_ms.saturating_sub(t) < cfg.gesture_cooldown_ms);
            if cooling && !stable {
                trace!("cooldown: holding back unstable {symbol}");
                continue;
            }

            if stable && symbol != self.state.last_stable {
                let prediction = GesturePrediction {
                    symbol,
                    confidence: self.state.history.confidence(symbol),
                    text: self.caption(symbol),
                    is_stable: true,
                };
                self.state.last_stable = symbol;
                self.state.last_emit_ms = Some(now_ms);
                self.emitted += 1;
                debug!(
                    "emit {symbol} ({:.2}) after {} frames",
                    prediction.confidence, self.frames
                );
                (self.handler)(&prediction);
                return Some(prediction);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::testkit::detection;
    use std::sync::{Arc, Mutex};
    use GestureSymbol as G;

    const THUMB_ONLY: [bool; 5] = [true, false, false, false, false];
    const ALL_FIVE: [bool; 5] = [true; 5];
    const PINKY_ONLY: [bool; 5] = [false, false, false, false, true];

    fn engine(config: EngineConfig) -> (SignEngine, Arc<Mutex<Vec<GesturePrediction>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let e = SignEngine::new(Classifier::alphabet(), config, move |p| {
            sink.lock().unwrap().push(p.clone());
        });
        (e, seen)
    }

    fn frame(ext: [bool; 5]) -> Vec<HandDetection> {
        vec![detection(ext, 0.9)]
    }

    #[test]
    fn scenario_a_emits_once_on_third_frame() {
        let (mut e, seen) = engine(EngineConfig::default());
        let out: Vec<_> = (0..5)
            .map(|i| e.on_frame_at(&frame(THUMB_ONLY), i * 33))
            .collect();
        assert!(out[0].is_none() && out[1].is_none());
        let p = out[2].as_ref().expect("emission on frame 3");
        assert_eq!(p.symbol, G::A);
        assert_eq!(p.text, "A");
        assert!(p.is_stable);
        assert_eq!(p.confidence, 1.0);
        assert!(out[3].is_none() && out[4].is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn scenario_a_holds_with_close_fingers() {
        use crate::landmarks::Handedness;
        use crate::landmarks::testkit::{LOW, NARROW, spaced_hand};

        let (mut e, _) = engine(EngineConfig::default());
        let hands = vec![HandDetection {
            handedness: Handedness::Right,
            score: 0.9,
            landmarks: spaced_hand(THUMB_ONLY, LOW, NARROW),
        }];
        let out: Vec<_> = (0..5)
            .map(|i| e.on_frame_at(&hands, i * 33).map(|p| p.symbol))
            .collect();
        assert_eq!(out, vec![None, None, Some(G::A), None, None]);
    }

    #[test]
    fn scenario_b_empty_frames_reset_silently() {
        let (mut e, seen) = engine(EngineConfig::default());
        for i in 0..3 {
            e.on_frame_at(&frame(THUMB_ONLY), i * 33);
        }
        assert_eq!(e.status().last_stable, G::A);
        for i in 3..6 {
            assert!(e.on_frame_at(&[], i * 33).is_none());
        }
        let st = e.status();
        assert_eq!(st.last_stable, G::Idle);
        assert!(st.history.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn scenario_c_stability_overrides_cooldown() {
        let (mut e, _) = engine(EngineConfig::default());
        // X = a, Y = 5, Z = i
        let base = 10_000;
        e.on_frame_at(&frame(THUMB_ONLY), base - 66);
        e.on_frame_at(&frame(THUMB_ONLY), base - 33);
        let x = e.on_frame_at(&frame(THUMB_ONLY), base);
        assert_eq!(x.map(|p| p.symbol), Some(G::A));

        for (i, ext) in [ALL_FIVE, PINKY_ONLY, ALL_FIVE, PINKY_ONLY].iter().enumerate() {
            let t = base + 100 + i as u64 * 125;
            assert!(e.on_frame_at(&frame(*ext), t).is_none());
        }

        assert!(e.on_frame_at(&frame(ALL_FIVE), base + 600).is_none());
        assert!(e.on_frame_at(&frame(ALL_FIVE), base + 633).is_none());
        let y = e
            .on_frame_at(&frame(ALL_FIVE), base + 666)
            .expect("stable symbol inside the cooldown window");
        assert_eq!(y.symbol, G::Five);
        assert!((y.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn scenario_d_confidence_counts_the_window() {
        let (mut e, _) = engine(EngineConfig::default());
        let seq = [THUMB_ONLY, THUMB_ONLY, PINKY_ONLY, THUMB_ONLY];
        for (i, ext) in seq.iter().enumerate() {
            assert!(e.on_frame_at(&frame(*ext), i as u64 * 33).is_none());
        }
        // lowering the threshold takes effect on the next frame
        e.set_config(EngineConfig {
            stability_threshold: 2,
            ..e.config()
        });
        let p = e.on_frame_at(&frame(THUMB_ONLY), 132).expect("emission");
        assert_eq!(p.symbol, G::A);
        assert!((p.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_hands_are_ignored() {
        let (mut e, _) = engine(EngineConfig::default());
        e.on_frame_at(&frame(THUMB_ONLY), 0);
        e.on_frame_at(&frame(THUMB_ONLY), 33);
        // a low-score hand counts as no hand at all
        e.on_frame_at(&[detection(THUMB_ONLY, 0.4)], 66);
        assert!(e.status().history.is_empty());

        let mixed = vec![detection(PINKY_ONLY, 0.2), detection(THUMB_ONLY, 0.95)];
        for i in 0..2 {
            assert!(e.on_frame_at(&mixed, 100 + i * 33).is_none());
        }
        assert_eq!(e.status().history, vec![G::A, G::A]);
        let p = e.on_frame_at(&mixed, 166).expect("emission");
        assert_eq!(p.symbol, G::A);
    }

    #[test]
    fn unchanged_stable_symbol_is_not_re_emitted() {
        let (mut e, seen) = engine(EngineConfig {
            gesture_cooldown_ms: 0,
            ..EngineConfig::default()
        });
        for i in 0..20 {
            e.on_frame_at(&frame(THUMB_ONLY), i * 33);
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn at_most_one_emission_per_frame() {
        let (mut e, seen) = engine(EngineConfig {
            stability_threshold: 1,
            ..EngineConfig::default()
        });
        let two = vec![detection(THUMB_ONLY, 0.9), detection(PINKY_ONLY, 0.9)];
        let p = e.on_frame_at(&two, 0).expect("emission");
        assert_eq!(p.symbol, G::A);
        assert_eq!(seen.lock().unwrap().len(), 1);
        // the second hand was never reached
        assert_eq!(e.status().history, vec![G::A]);
    }

    #[test]
    fn stop_ignores_frames_and_resets() {
        let (mut e, seen) = engine(EngineConfig::default());
        e.on_frame_at(&frame(THUMB_ONLY), 0);
        e.on_frame_at(&frame(THUMB_ONLY), 33);
        e.stop();
        assert!(!e.is_running());
        assert!(e.on_frame_at(&frame(THUMB_ONLY), 66).is_none());
        let st = e.status();
        assert!(st.history.is_empty());
        assert_eq!(st.frames, 2);

        e.start();
        for i in 0..3 {
            e.on_frame_at(&frame(THUMB_ONLY), 100 + i * 33);
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn caption_overrides_replace_display_text() {
        let (mut e, _) = engine(EngineConfig::default());
        e.set_captions(HashMap::from([(G::A, "Letter A".to_string())]));
        let mut last = None;
        for i in 0..3 {
            last = e.on_frame_at(&frame(THUMB_ONLY), i * 33);
        }
        assert_eq!(last.map(|p| p.text), Some("Letter A".to_string()));
        assert_eq!(e.caption(G::B), "B");
    }

    #[test]
    fn status_is_a_snapshot() {
        let (mut e, _) = engine(EngineConfig::default());
        e.on_frame_at(&frame(THUMB_ONLY), 0);
        let snap = e.status();
        e.on_frame_at(&frame(THUMB_ONLY), 33);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(e.status().history.len(), 2);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["config"]["stability_threshold"], 3);
        assert_eq!(json["history"], serde_json::json!(["a"]));
    }

    #[test]
    fn swapping_classifier_restarts_the_session() {
        let (mut e, _) = engine(EngineConfig::default());
        e.on_frame_at(&frame(THUMB_ONLY), 0);
        e.set_classifier(Classifier::macro_gestures());
        assert!(e.status().history.is_empty());
        assert_eq!(e.status().vocabulary, Vocabulary::Macro);
    }
}
