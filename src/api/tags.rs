//! Tag aggregator for `GET /tags` (§4.7).
//!
//! Grounded on `TagAdder` in `internal/api/core.go`. REDESIGN FLAG applied:
//! the tag key is quoted in the emitted JSON object, unlike the original,
//! which produces invalid JSON for tags containing non-identifier
//! characters (Design Notes §9 open question, resolved as a compatibility
//! fix).

use std::collections::BTreeMap;

struct TagBounds {
    start_ts: i64,
    start_dt: String,
    end_ts: i64,
    end_dt: String,
}

/// Accumulates per-tag `(startTs, startDt, endTs, endDt)` across a stream
/// of records, in tag-insertion order stabilized by `BTreeMap` for
/// byte-identical repeat responses (§8 idempotent filtering).
#[derive(Default)]
pub struct TagTracker {
    tracked: BTreeMap<String, TagBounds>,
}

impl TagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one record's `(tag, ts, dt)`. No-op if any piece is absent.
    pub fn observe(&mut self, tag: &str, ts: i64, dt: &str) {
        match self.tracked.get_mut(tag) {
            None => {
                self.tracked.insert(
                    tag.to_string(),
                    TagBounds {
                        start_ts: ts,
                        start_dt: dt.to_string(),
                        end_ts: ts,
                        end_dt: dt.to_string(),
                    },
                );
            }
            Some(bounds) => {
                if ts >= bounds.end_ts {
                    bounds.end_ts = ts;
                    bounds.end_dt = dt.to_string();
                } else if ts <= bounds.start_ts {
                    bounds.start_ts = ts;
                    bounds.start_dt = dt.to_string();
                }
            }
        }
    }

    /// Render the accumulated tag map as the JSON array body (without the
    /// surrounding meta header/footer).
    pub fn render(&self) -> String {
        let mut buffer = String::new();
        for (idx, (tag, bounds)) in self.tracked.iter().enumerate() {
            if idx > 0 {
                buffer.push(',');
            }
            buffer.push_str(&format!(
                "{{{}: [{}, {}, {}, {}]}}",
                serde_json::to_string(tag).unwrap_or_else(|_| "\"\"".to_string()),
                bounds.start_ts,
                serde_json::to_string(&bounds.start_dt).unwrap_or_else(|_| "\"\"".to_string()),
                bounds.end_ts,
                serde_json::to_string(&bounds.end_dt).unwrap_or_else(|_| "\"\"".to_string()),
            ));
        }
        buffer
    }
}
