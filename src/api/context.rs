//! Per-server query context (C7): the pieces of `Server` the query engine
//! needs on every request, computed once at startup.
//!
//! Grounded on `Context`/`SetMeta` in `internal/api/core.go`.

use std::collections::HashMap;

use crate::predicate::Kind;

pub struct QueryContext {
    pub directory: String,
    pub default_limit: i64,
    pub converters: HashMap<String, Kind>,
    pub scan_start_days: i64,
    pub scan_end_days: i64,
    pub meta_header: String,
    pub meta_footer: String,
}

const SPEC_VERSION: &str = "0.1";

impl QueryContext {
    pub fn new(
        directory: String,
        default_limit: i64,
        converters: HashMap<String, Kind>,
        scan_start_days: i64,
        scan_end_days: i64,
        api_version: &str,
        host: &str,
    ) -> Self {
        let meta_header = format!(
            "{{\"meta\": {{\"spec\": \"{}\", \"api\": \"{}\", \"server\": \"{}\"}}, \"data\": [",
            SPEC_VERSION, api_version, host
        );
        Self {
            directory,
            default_limit,
            converters,
            scan_start_days,
            scan_end_days,
            meta_header,
            meta_footer: "]}".to_string(),
        }
    }
}
