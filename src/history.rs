//! Bounded ring of the most recent classifications.

use std::collections::VecDeque;

use crate::gestures::GestureSymbol;

pub const HISTORY_CAPACITY: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryBuffer {
    entries: VecDeque<GestureSymbol>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, symbol: GestureSymbol) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(symbol);
    }

    /// The `n` most recent entries, oldest first.
    pub fn last(&self, n: usize) -> impl Iterator<Item = GestureSymbol> + '_ {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// At least `threshold` entries and the newest `threshold` all equal
    /// `symbol`.
    pub fn is_stable(&self, symbol: GestureSymbol, threshold: usize) -> bool {
        self.entries.len() >= threshold && self.last(threshold).all(|s| s == symbol)
    }

    /// Share of `symbol` among the last `min(5, len)` entries.
    pub fn confidence(&self, symbol: GestureSymbol) -> f32 {
        let window = self.entries.len().min(HISTORY_CAPACITY);
        if window == 0 {
            return 0.0;
        }
        let hits = self.last(window).filter(|s| *s == symbol).count();
        hits as f32 / window as f32
    }

    pub fn to_vec(&self) -> Vec<GestureSymbol> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GestureSymbol as G;

    fn filled(items: &[GestureSymbol]) -> HistoryBuffer {
        let mut h = HistoryBuffer::new();
        for s in items {
            h.push(*s);
        }
        h
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let h = filled(&[G::A, G::B, G::C, G::D, G::E, G::F]);
        assert_eq!(h.to_vec().len(), HISTORY_CAPACITY);
        assert_eq!(h.to_vec(), vec![G::B, G::C, G::D, G::E, G::F]);
    }

    #[test]
    fn last_returns_most_recent_last() {
        let h = filled(&[G::A, G::B, G::C]);
        assert_eq!(h.last(2).collect::<Vec<_>>(), vec![G::B, G::C]);
        assert_eq!(h.last(9).collect::<Vec<_>>(), vec![G::A, G::B, G::C]);
        assert_eq!(h.last(0).count(), 0);
    }

    #[test]
    fn shorter_than_threshold_is_never_stable() {
        let h = filled(&[G::A, G::A]);
        assert!(!h.is_stable(G::A, 3));
        assert!(h.is_stable(G::A, 2));
    }

    #[test]
    fn stability_needs_the_whole_tail_to_match() {
        let h = filled(&[G::B, G::A, G::A, G::A]);
        assert!(h.is_stable(G::A, 3));
        assert!(!h.is_stable(G::A, 4));
        assert!(!h.is_stable(G::B, 3));
    }

    #[test]
    fn threshold_above_capacity_is_unreachable() {
        let h = filled(&[G::A; 8]);
        assert!(!h.is_stable(G::A, HISTORY_CAPACITY + 1));
    }

    #[test]
    fn confidence_over_window() {
        let h = filled(&[G::A, G::A, G::B, G::A, G::A]);
        assert!((h.confidence(G::A) - 0.8).abs() < 1e-6);

        let short = filled(&[G::B, G::A, G::A]);
        assert!((short.confidence(G::A) - 2.0 / 3.0).abs() < 1e-6);

        let full = filled(&[G::A; 5]);
        assert_eq!(full.confidence(G::A), 1.0);
        assert_eq!(HistoryBuffer::new().confidence(G::A), 0.0);
    }

    #[test]
    fn clear_empties() {
        let mut h = filled(&[G::A, G::B]);
        h.clear();
        assert!(h.is_empty());
    }
}
