//! Recorded tracker output: one JSON frame per line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

use crate::landmarks::HandDetection;

/// Spacing used when a recording has no timestamps (~30 fps).
pub const DEFAULT_FRAME_MS: u64 = 33;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub hands: Vec<HandDetection>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: read failed: {source}")]
    Io {
        line: usize,
        #[source]
        source: io::Error,
    },
}

pub fn parse_frames<R: BufRead>(reader: R) -> Result<Vec<FrameRecord>, FrameError> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line_no = n + 1;
        let line = line.map_err(|source| FrameError::Io {
            line: line_no,
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let rec: FrameRecord = serde_json::from_str(trimmed).map_err(|source| FrameError::Parse {
            line: line_no,
            source,
        })?;
        out.push(rec);
    }
    Ok(out)
}

/// `-` reads stdin.
pub fn read_frames(path: &str) -> Result<Vec<FrameRecord>> {
    if path == "-" {
        let stdin = io::stdin();
        return parse_frames(stdin.lock()).context("failed to read frames from stdin");
    }
    let p = Path::new(path);
    let f = File::open(p).with_context(|| format!("failed to open {}", p.display()))?;
    parse_frames(BufReader::new(f)).with_context(|| format!("failed to parse {}", p.display()))
}

/// Timestamps for replay: recorded ones where present, otherwise a fixed
/// step after the previous frame.
pub fn timeline(frames: &[FrameRecord]) -> Vec<u64> {
    let mut out = Vec::with_capacity(frames.len());
    let mut prev: Option<u64> = None;
    for f in frames {
        let t = match (f.timestamp_ms, prev) {
            (Some(t), _) => t,
            (None, Some(p)) => p + DEFAULT_FRAME_MS,
            (None, None) => 0,
        };
        out.push(t);
        prev = Some(t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::testkit::detection;

    fn line(ts: Option<u64>, hands: usize) -> String {
        let rec = FrameRecord {
            timestamp_ms: ts,
            hands: (0..hands)
                .map(|_| detection([true, false, false, false, false], 0.9))
                .collect(),
        };
        serde_json::to_string(&rec).unwrap()
    }

    #[test]
    fn parses_lines_and_skips_blanks_and_comments() {
        let text = format!("# recorded\n{}\n\n{}\n", line(Some(0), 1), line(None, 0));
        let frames = parse_frames(text.as_bytes()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].hands.len(), 1);
        assert!(frames[1].hands.is_empty());
    }

    #[test]
    fn bad_line_reports_its_number() {
        let text = format!("{}\n{{\"hands\": [{{\"handedness\": \"Left\", \"score\": 1.0, \"landmarks\": []}}]}}\n", line(Some(0), 1));
        let err = parse_frames(text.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("line 2:"), "{msg}");
        assert!(msg.contains("got 0"), "{msg}");
    }

    #[test]
    fn timeline_fills_missing_timestamps() {
        let text = [line(None, 1), line(None, 1), line(Some(500), 1), line(None, 1)].join("\n");
        let frames = parse_frames(text.as_bytes()).unwrap();
        assert_eq!(timeline(&frames), vec![0, 33, 500, 533]);
    }
}
