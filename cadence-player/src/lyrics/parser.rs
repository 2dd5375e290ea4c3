//! LRC lyric parsing
//!
//! Supported input: `[mm:ss]`, `[mm:ss.xx]` and `[mm:ss:xx]` time tags, any
//! number of them in front of one text line, and an `[offset:+/-ms]` tag.
//! Other `[key:value]` tags (title, artist, ...) are skipped.

use serde::Serialize;

/// One timed lyric line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricLine {
    /// Start time in seconds
    pub time: f64,
    pub text: String,
}

/// Parsed lyric, sorted by start time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LyricTimeline {
    lines: Vec<LyricLine>,
}

impl LyricTimeline {
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    /// Index of the last line starting at or before `time`
    ///
    /// `None` before the first line.
    pub fn position(&self, time: f64) -> Option<usize> {
        self.lines
            .partition_point(|line| line.time <= time)
            .checked_sub(1)
    }
}

/// LRC parser
pub struct LrcParser;

impl LrcParser {
    /// Parse raw LRC text; malformed tags are ignored
    pub fn parse(raw: &str) -> LyricTimeline {
        let mut offset_ms: i64 = 0;
        let mut lines = Vec::new();

        for raw_line in raw.lines() {
            let mut rest = raw_line.trim();
            let mut stamps = Vec::new();

            while let Some(tag_end) = rest.strip_prefix('[').and_then(|r| r.find(']')) {
                let tag = &rest[1..=tag_end];
                rest = &rest[tag_end + 2..];

                if let Some(seconds) = parse_time_tag(tag) {
                    stamps.push(seconds);
                } else if let Some(value) = tag.strip_prefix("offset:") {
                    if let Ok(ms) = value.trim().parse::<i64>() {
                        offset_ms = ms;
                    }
                }
            }

            let text = rest.trim();
            lines.extend(stamps.into_iter().map(|time| LyricLine {
                time,
                text: text.to_string(),
            }));
        }

        // A positive offset shows lyrics earlier
        let shift = offset_ms as f64 / 1000.0;
        for line in &mut lines {
            line.time = (line.time - shift).max(0.0);
        }
        lines.sort_by(|a, b| a.time.total_cmp(&b.time));

        LyricTimeline { lines }
    }
}

/// `mm:ss`, `mm:ss.xx` or `mm:ss:xx` to seconds
fn parse_time_tag(tag: &str) -> Option<f64> {
    let (minutes, rest) = tag.split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;

    let (seconds, fraction) = match rest.split_once(['.', ':']) {
        Some((s, f)) => (s, Some(f)),
        None => (rest, None),
    };
    let seconds: u32 = seconds.trim().parse().ok()?;
    let fraction = match fraction {
        Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => {
            format!("0.{}", f).parse::<f64>().ok()?
        }
        Some(_) => return None,
        None => 0.0,
    };

    Some(minutes as f64 * 60.0 + seconds as f64 + fraction)
}
