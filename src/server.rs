//! The consolidated server value (Design Notes §9).
//!
//! The original keeps the pending queue, GC list and seen-set as
//! process-wide globals. Here they are fields of one `Server`, built once
//! at startup and shared (via `Arc`) by the watcher, the worker pool and
//! the HTTP handlers.

use chrono::Local;

use crate::config::Config;
use crate::predicate::{Kind, Predicate};
use crate::queue::{GcList, Queue, SeenSet};

pub struct Server {
    pub config: Config,
    pub queue: Queue,
    pub gc_list: GcList,
    pub seen_set: SeenSet,
    /// Stamp minted once at process start, used as the `id` prefix (§3).
    pub start_stamp: String,
    pub hostname: String,
    pub converters: std::collections::HashMap<String, Kind>,
    /// `/api`'s `started` body, rendered once at startup (§4.7: `/api` is
    /// static metadata, not re-evaluated per request).
    pub api_started: String,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let now = Local::now();
        let start_stamp = now.format("%Y-%m-%dT%H-%M-%S").to_string();
        let api_started = now.format("%Y-%m-%dT%H:%M:%S").to_string();
        let hostname = hostname_or_unknown();
        Self {
            config,
            queue: Queue::new(),
            gc_list: GcList::new(),
            seen_set: SeenSet::new(),
            start_stamp,
            hostname,
            converters: Predicate::default_converters(),
            api_started,
        }
    }
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_construction_stamps_once() {
        let server = Server::new(Config::default());
        assert!(!server.start_stamp.is_empty());
        assert!(!server.api_started.is_empty());
        assert!(server.converters.contains_key("ts"));
    }
}
