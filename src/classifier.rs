//! Sub-field auto-detection and the handler rewrite pipeline (C3).
//!
//! Each `\``-delimited payload segment becomes a positional `field<N>` entry
//! (§4.3), then a handler — selected by the `field0` raw value — renames a
//! left-to-right-gated run of those positional entries to stable names
//! (§4.3.1). Grounded on `internal/messages/core.go` and the `detectJSON`
//! helper in `internal/receiver/core.go`.

use std::collections::BTreeMap;

use crate::config::HandlersConfig;
use crate::model::Entry;

const FIELD_PREFIX: &str = "field";
const TAG_KEY: &str = "tag";

/// Turn raw payload segments into positional `field0`, `field1`, ... entries,
/// auto-detecting array vs. object vs. raw for each (§4.3 steps 1-3).
pub fn detect_fields(segments: &[&str]) -> BTreeMap<String, Entry> {
    let mut out = BTreeMap::new();
    for (idx, segment) in segments.iter().enumerate() {
        let entry = classify_segment(segment);
        out.insert(format!("{}{}", FIELD_PREFIX, idx), entry);
    }
    out
}

/// Array is tried before object; anything that is neither parses as raw.
fn classify_segment(segment: &str) -> Entry {
    if let Ok(array) = serde_json::from_str::<Vec<serde_json::Value>>(segment) {
        return Entry::Array { array };
    }
    if let Ok(object) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(segment)
    {
        return Entry::Object { object };
    }
    Entry::raw(segment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Event,
    Start,
    Replay,
    Player,
    Default,
}

/// Run the full handler pipeline: select a handler from `field0`, rewrite
/// the gated run of positional fields to stable names, then retire any
/// leftover `fieldN` keys under their original key (§4.3 step 5) and apply
/// the empty-type rewrite (§4.3 step 4) if enabled.
pub fn handle_entries(
    mut entries: BTreeMap<String, Entry>,
    settings: &HandlersConfig,
) -> BTreeMap<String, Entry> {
    if entries.is_empty() {
        return entries;
    }

    let kind = select_handler(&entries, settings);
    let mut names: BTreeMap<String, String> = BTreeMap::new();
    apply_handler(kind, &entries, &mut names);

    let mut renamed = BTreeMap::new();
    for (key, entry) in entries.drain() {
        let mut entry = entry;
        if settings.empty && entry.is_empty_candidate() {
            entry = Entry::Empty;
        }
        let final_name = names.get(&key).cloned().unwrap_or(key);
        renamed.insert(final_name, entry);
    }
    renamed
}

fn select_handler(entries: &BTreeMap<String, Entry>, settings: &HandlersConfig) -> HandlerKind {
    let Some(first) = entries.get("field0") else {
        return HandlerKind::Default;
    };
    let first_raw = if settings.handle_fields() {
        first.raw_str()
    } else {
        None
    };
    match first_raw {
        Some("event") if settings.event => HandlerKind::Event,
        Some("start") if settings.start => HandlerKind::Start,
        Some("replay") if settings.replay => HandlerKind::Replay,
        Some("player") if settings.player => HandlerKind::Player,
        _ => HandlerKind::Default,
    }
}

/// Rename `field` to `name` in `names` if `field` exists and passes `check`.
/// Returns whether the rewrite happened, for the caller's gating chain.
fn rewrite_name(
    name: &str,
    field: &str,
    check: impl Fn(&Entry) -> bool,
    entries: &BTreeMap<String, Entry>,
    names: &mut BTreeMap<String, String>,
) -> bool {
    match entries.get(field) {
        Some(entry) if check(entry) => {
            names.insert(field.to_string(), name.to_string());
            true
        }
        _ => false,
    }
}

fn apply_handler(
    kind: HandlerKind,
    entries: &BTreeMap<String, Entry>,
    names: &mut BTreeMap<String, String>,
) {
    match kind {
        HandlerKind::Default => {}
        HandlerKind::Event => {
            rewrite_name("event", "field0", |_| true, entries, names);
            if rewrite_name("tag", "field1", Entry::is_tag, entries, names) {
                if rewrite_name("playerid", "field2", Entry::is_raw, entries, names) {
                    if rewrite_name("type", "field3", Entry::is_raw, entries, names) {
                        if rewrite_name("data", "field4", Entry::is_not_raw, entries, names) {
                            rewrite_name("simtime", "field5", Entry::is_raw, entries, names);
                        }
                    }
                }
            }
        }
        HandlerKind::Start => {
            rewrite_name("start", "field0", |_| true, entries, names);
        }
        HandlerKind::Player => {
            rewrite_name("player", "field0", |_| true, entries, names);
            if rewrite_name("playerid", "field1", Entry::is_raw, entries, names) {
                rewrite_name("name", "field2", Entry::is_raw, entries, names);
            }
        }
        HandlerKind::Replay => {
            rewrite_name("replay", "field0", |_| true, entries, names);
            if rewrite_name("mission", "field1", Entry::is_tag, entries, names) {
                if rewrite_name("world", "field2", Entry::is_raw, entries, names) {
                    if rewrite_name("daytime", "field3", Entry::is_raw, entries, names) {
                        rewrite_name("version", "field4", Entry::is_not_raw, entries, names);
                    }
                }
            }
        }
    }
}

/// Name of the dotted-path sub-key the tag handler rename lands under, for
/// callers building a default predicate converter entry (`fields.tag.raw`).
pub const TAG_FIELD_NAME: &str = TAG_KEY;

#[cfg(test)]
mod tests {
    use super::*;

    fn handlers(overrides: impl FnOnce(&mut HandlersConfig)) -> HandlersConfig {
        let mut h = HandlersConfig::default();
        overrides(&mut h);
        h
    }

    #[test]
    fn test_detect_fields_raw_array_object() {
        let segments = vec!["hello", "[1,2,3]", r#"{"a":1}"#];
        let fields = detect_fields(&segments);
        assert!(fields.get("field0").unwrap().is_raw());
        assert!(matches!(fields.get("field1").unwrap(), Entry::Array { .. }));
        assert!(matches!(fields.get("field2").unwrap(), Entry::Object { .. }));
    }

    #[test]
    fn test_event_handler_full_chain() {
        let segments = vec!["event", "jzml", "p1", "kind", "[1]", "12345"];
        let fields = detect_fields(&segments);
        let settings = HandlersConfig::default();
        let renamed = handle_entries(fields, &settings);

        assert!(renamed.contains_key("event"));
        assert!(renamed.contains_key("tag"));
        assert!(renamed.contains_key("playerid"));
        assert!(renamed.contains_key("type"));
        assert!(renamed.contains_key("data"));
        assert!(renamed.contains_key("simtime"));
        assert!(!renamed.contains_key("field0"));
    }

    #[test]
    fn test_event_handler_gate_stops_on_non_tag() {
        // field1 is not a 4-char lowercase tag, so the chain stops there:
        // playerid/type/data/simtime keep their original field keys.
        let segments = vec!["event", "nottag", "p1", "kind"];
        let fields = detect_fields(&segments);
        let settings = HandlersConfig::default();
        let renamed = handle_entries(fields, &settings);

        assert!(renamed.contains_key("event"));
        assert!(!renamed.contains_key("tag"));
        assert!(renamed.contains_key("field1"));
        assert!(renamed.contains_key("field2"));
        assert!(renamed.contains_key("field3"));
    }

    #[test]
    fn test_start_handler() {
        let segments = vec!["start", "anything"];
        let fields = detect_fields(&segments);
        let renamed = handle_entries(fields, &HandlersConfig::default());
        assert!(renamed.contains_key("start"));
        assert!(renamed.contains_key("field1"));
    }

    #[test]
    fn test_player_handler() {
        let segments = vec!["player", "p1", "alice"];
        let fields = detect_fields(&segments);
        let renamed = handle_entries(fields, &HandlersConfig::default());
        assert!(renamed.contains_key("player"));
        assert!(renamed.contains_key("playerid"));
        assert!(renamed.contains_key("name"));
    }

    #[test]
    fn test_replay_handler() {
        let segments = vec!["replay", "jzml", "earth", "1200", "[1]"];
        let fields = detect_fields(&segments);
        let renamed = handle_entries(fields, &HandlersConfig::default());
        assert!(renamed.contains_key("replay"));
        assert!(renamed.contains_key("mission"));
        assert!(renamed.contains_key("world"));
        assert!(renamed.contains_key("daytime"));
        assert!(renamed.contains_key("version"));
    }

    #[test]
    fn test_default_handler_noop() {
        let segments = vec!["nonsense", "abc"];
        let fields = detect_fields(&segments);
        let renamed = handle_entries(fields, &HandlersConfig::default());
        assert!(renamed.contains_key("field0"));
        assert!(renamed.contains_key("field1"));
    }

    #[test]
    fn test_handlers_disabled_falls_back_to_default() {
        let segments = vec!["event", "jzml", "p1", "kind"];
        let fields = detect_fields(&segments);
        let settings = handlers(|h| h.event = false);
        let renamed = handle_entries(fields, &settings);
        assert!(!renamed.contains_key("event"));
        assert!(renamed.contains_key("field0"));
    }

    #[test]
    fn test_empty_rewrite() {
        let mut fields = BTreeMap::new();
        fields.insert("field0".to_string(), Entry::raw(""));
        let settings = HandlersConfig::default();
        let renamed = handle_entries(fields, &settings);
        assert!(matches!(renamed.get("field0"), Some(Entry::Empty)));
    }

    #[test]
    fn test_empty_rewrite_disabled() {
        let mut fields = BTreeMap::new();
        fields.insert("field0".to_string(), Entry::raw(""));
        let settings = handlers(|h| h.empty = false);
        let renamed = handle_entries(fields, &settings);
        assert!(matches!(renamed.get("field0"), Some(Entry::Raw { .. })));
    }
}
