//! The `/` and `/tags` request-handling algorithm (§4.7).
//!
//! Grounded on `Handle`/`loadFile`/`getDate` in `internal/api/core.go`. The
//! directory walk, predicate application and response assembly are
//! synchronous (file I/O bound) and run inside `spawn_blocking`. The body
//! here is a sequence of precomputed record chunks (mirroring the
//! original's incremental `io.Writer` calls); the caller (`api::mod`) joins
//! them with the meta header/footer into one response (see DESIGN.md for
//! why a literal streaming body wasn't used).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::context::QueryContext;
use crate::api::tags::TagTracker;
use crate::classifier;
use crate::config::HandlersConfig;
use crate::predicate::Predicate;

const LIMITED_SENTINEL: &str = ", {\"limited\": \"true\"}";

/// Raw multi-valued query parameters, preserving repeats (`filter` appears
/// any number of times).
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    fn all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.all(key).next()
    }
}

struct ParsedParams {
    filters: Vec<Predicate>,
    limit: i64,
    skip: i64,
    files_prefix: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    seek: bool,
}

fn parse_params(params: &RawParams, ctx: &QueryContext, apply_limit: bool) -> ParsedParams {
    let mut filters = Vec::new();
    for raw in params.all("filter") {
        match Predicate::parse(raw, &ctx.converters) {
            Ok(p) => filters.push(p),
            Err(err) => debug!(filter = raw, error = %err, "dropping unparseable filter"),
        }
    }
    if let Some(v) = params.first("start") {
        match Predicate::time_bound("ge", v, &ctx.converters) {
            Ok(p) => filters.push(p),
            Err(err) => debug!(error = %err, "dropping invalid start bound"),
        }
    }
    if let Some(v) = params.first("end") {
        match Predicate::time_bound("le", v, &ctx.converters) {
            Ok(p) => filters.push(p),
            Err(err) => debug!(error = %err, "dropping invalid end bound"),
        }
    }

    let mut limit = if apply_limit { ctx.default_limit } else { 0 };
    if apply_limit {
        if let Some(v) = params.first("limit").and_then(|s| s.parse::<i64>().ok()) {
            limit = v;
        }
    }

    let mut skip = 0;
    if let Some(v) = params.first("skip").and_then(|s| s.parse::<i64>().ok()) {
        if v > 0 {
            skip = v;
        }
    }

    ParsedParams {
        filters,
        limit,
        skip,
        files_prefix: params.first("files").map(|s| s.trim().to_string()),
        start_date: params.first("startdate").map(|s| s.trim().to_string()),
        end_date: params.first("enddate").map(|s| s.trim().to_string()),
        seek: params.first("seek").is_some(),
    }
}

/// Parse an optional `YYYY-MM-DD` string, or default to `now + offset_days`,
/// truncated to local midnight (`getDate` in the original).
fn resolve_date(in_str: Option<&str>, offset_days: i64) -> NaiveDate {
    match in_str {
        Some(s) if !s.is_empty() => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| Local::now().date_naive())
        }
        _ => (Local::now() + chrono::Duration::days(offset_days)).date_naive(),
    }
}

/// Keep directories whose **modtime**, not name, falls in `[stime, etime]`
/// (§4.7 step 3; the original filters on `d.ModTime()`, never the entry's
/// name).
fn candidate_directories(root: &Path, seek: bool, stime: NaiveDate, etime: NaiveDate) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(root) {
        Ok(rd) => rd
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect(),
        Err(err) => {
            warn!(directory = %root.display(), error = %err, "unable to read output directory");
            return Vec::new();
        }
    };
    entries.sort();

    if seek {
        return entries.into_iter().last().into_iter().collect();
    }

    let lower = Local
        .from_local_datetime(&stime.and_hms_opt(0, 0, 0).unwrap())
        .single();
    let upper = Local
        .from_local_datetime(&etime.and_hms_opt(23, 59, 59).unwrap())
        .single();

    entries
        .into_iter()
        .filter(|p| {
            let (Some(lower), Some(upper)) = (lower, upper) else {
                return false;
            };
            let modified = match fs::metadata(p).and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(err) => {
                    warn!(directory = %p.display(), error = %err, "unable to stat output directory");
                    return false;
                }
            };
            let modified: DateTime<Local> = modified.into();
            modified >= lower && modified <= upper
        })
        .collect()
}

fn candidate_files(dirs: &[PathBuf], prefix: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "unable to read output subdir");
                continue;
            }
        };
        let mut names: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        names.sort();
        for path in names {
            if let Some(prefix) = prefix {
                if !prefix.is_empty() {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if !name.starts_with(prefix) {
                        continue;
                    }
                }
            }
            files.push(path);
        }
    }
    files
}

/// A record loaded off disk: the literal bytes as read, plus a parsed value
/// for filter evaluation. When `handlers.enable` is set, `value` also
/// carries the re-run handler pipeline and `dump` stripping (§4.7 step 4c)
/// and is what gets emitted; when it's unset, the literal `raw` bytes are
/// emitted untouched (§6: "query engine returns raw records untouched").
struct LoadedRecord {
    raw: Vec<u8>,
    value: Value,
}

fn load_file(path: &Path, handlers: &HandlersConfig) -> Option<LoadedRecord> {
    let raw = match fs::read(path) {
        Ok(b) => b,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "error reading record file");
            return None;
        }
    };
    let mut obj: serde_json::Map<String, Value> = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "skipping unparseable record");
            return None;
        }
    };

    if handlers.enable {
        if !handlers.dump {
            obj.remove("dump");
        }
        if let Some(Value::Object(fields)) = obj.get("fields").cloned() {
            let entries: std::collections::BTreeMap<String, crate::model::Entry> = fields
                .into_iter()
                .filter_map(|(k, v)| serde_json::from_value(v).ok().map(|e| (k, e)))
                .collect();
            let rewritten = classifier::handle_entries(entries, handlers);
            if let Ok(v) = serde_json::to_value(rewritten) {
                obj.insert("fields".to_string(), v);
            }
        }
    }

    Some(LoadedRecord {
        raw,
        value: Value::Object(obj),
    })
}

/// Walk the dotted path of a predicate's field against a loaded record,
/// returning the terminal raw JSON bytes if every segment resolves.
fn project(obj: &Value, field_path: &str) -> Option<Vec<u8>> {
    let mut current = obj;
    for segment in field_path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    serde_json::to_vec(current).ok()
}

fn passes_filters(obj: &Value, filters: &[Predicate]) -> bool {
    filters.iter().all(|f| match project(obj, &f.field) {
        Some(raw) => f.check(&raw),
        None => false,
    })
}

pub enum Sink<'a> {
    /// Plain data stream (`/`): raw bytes, comma-joined, verbatim.
    Data(&'a mut Vec<Vec<u8>>),
    /// Tag aggregation (`/tags`): records are absorbed, never echoed.
    Tags(&'a mut TagTracker),
}

/// Run the full request algorithm. Returns the ordered body chunks,
/// excluding the meta header/footer (the caller wraps those).
pub fn handle(
    ctx: &QueryContext,
    handlers: &HandlersConfig,
    params: RawParams,
    mut sink: Sink,
) -> Vec<u8> {
    let apply_limit = matches!(sink, Sink::Data(_));
    let parsed = parse_params(&params, ctx, apply_limit);

    let stime = resolve_date(parsed.start_date.as_deref(), ctx.scan_start_days);
    let etime = resolve_date(parsed.end_date.as_deref(), ctx.scan_end_days);

    let dirs = candidate_directories(Path::new(&ctx.directory), parsed.seek, stime, etime);
    let files = candidate_files(&dirs, parsed.files_prefix.as_deref());

    let mut emitted: i64 = 0;
    let mut has_more = false;
    let mut skip = parsed.skip;

    for path in files {
        if parsed.limit > 0 && emitted >= parsed.limit {
            has_more = emitted > 0;
            break;
        }
        let Some(loaded) = load_file(&path, handlers) else {
            continue;
        };
        if !passes_filters(&loaded.value, &parsed.filters) {
            continue;
        }
        if skip > 0 {
            skip -= 1;
            continue;
        }
        match &mut sink {
            Sink::Data(chunks) => {
                let bytes = if handlers.enable {
                    serde_json::to_vec(&loaded.value).unwrap_or_else(|_| b"{}".to_vec())
                } else {
                    loaded.raw
                };
                chunks.push(bytes);
            }
            Sink::Tags(tracker) => {
                let tag = loaded
                    .value
                    .get("fields")
                    .and_then(|f| f.get("tag"))
                    .and_then(|t| t.get("raw"))
                    .and_then(Value::as_str);
                let ts = loaded.value.get("ts").and_then(Value::as_i64);
                let dt = loaded.value.get("dt").and_then(Value::as_str);
                if let (Some(tag), Some(ts), Some(dt)) = (tag, ts, dt) {
                    tracker.observe(tag, ts, dt);
                }
            }
        }
        emitted += 1;
    }

    let mut body = Vec::new();
    match sink {
        Sink::Data(chunks) => {
            for (idx, chunk) in chunks.iter().enumerate() {
                if idx > 0 {
                    body.push(b',');
                }
                body.extend_from_slice(chunk);
            }
        }
        Sink::Tags(tracker) => {
            body.extend_from_slice(tracker.render().as_bytes());
        }
    }
    if has_more {
        body.extend_from_slice(LIMITED_SENTINEL.as_bytes());
    }
    body
}

/// Extract request query-string pairs from axum into the shape [`RawParams`]
/// expects, preserving repeated keys such as multiple `filter=`.
pub fn parse_raw_query(query: &str) -> RawParams {
    RawParams::new(
        form_urlencoded_pairs(query)
            .into_iter()
            .collect::<Vec<_>>(),
    )
}

fn form_urlencoded_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut it = pair.splitn(2, '=');
            let k = it.next().unwrap_or("");
            let v = it.next().unwrap_or("");
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(s: &str) -> String {
    percent_decode(s.replace('+', " ").as_bytes())
}

fn percent_decode(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
