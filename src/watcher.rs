//! Poll-based spool watcher and GC scheduler (C4).
//!
//! Grounded on `fileReceive`/`scan`/`runCollector` in
//! `internal/receiver/core.go`: a single scheduler loop, no filesystem
//! event subscription. The teacher's `notify`-based watcher does not fit —
//! the testable properties here (seen-set dedup, age threshold, periodic
//! GC) are specified as a poll loop, not an event stream.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::warn;

use crate::queue::QueueItem;
use crate::server::Server;

/// Run the watcher loop forever on the calling thread. Intended to be
/// spawned onto its own `std::thread` by `main`.
pub fn run(server: Arc<Server>) {
    let mut tick: u32 = 0;
    let gc_ticks = server.config.files.gc;
    let sleep = Duration::from_millis(server.config.files.sleep);

    loop {
        if tick > gc_ticks {
            run_collector(&server);
            tick = 0;
        }
        scan_once(&server);
        std::thread::sleep(sleep);
        tick += 1;
    }
}

fn run_collector(server: &Server) {
    for name in server.gc_list.drain() {
        let path = Path::new(&server.config.files.directory).join(&name);
        if let Err(err) = fs::remove_file(&path) {
            warn!(file = %name, error = %err, "failed to remove spool file during GC");
        }
        server.seen_set.evict(&name);
    }
}

fn scan_once(server: &Server) {
    let dir = &server.config.files.directory;
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(directory = %dir, error = %err, "spool scan failed, retrying next tick");
            return;
        }
    };

    let threshold = Local::now() + chrono::Duration::seconds(server.config.files.after);

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if server.seen_set.contains(&name) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(err) => {
                warn!(file = %name, error = %err, "unable to stat spool file, skipping this tick");
                continue;
            }
        };
        let modified: chrono::DateTime<Local> = modified.into();
        if modified > threshold {
            continue;
        }

        server.seen_set.insert(name.clone());
        match fs::read(entry.path()) {
            Ok(data) => {
                server.queue.enqueue(QueueItem {
                    id: name,
                    data,
                    gc: true,
                });
            }
            Err(err) => {
                warn!(file = %name, error = %err, "spool read error, name stays in seen-set for retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_server(dir: &Path, after: i64) -> Server {
        let mut config = Config::default();
        config.files.directory = dir.to_string_lossy().into_owned();
        config.files.after = after;
        config.files.gc = 2;
        Server::new(config)
    }

    #[test]
    fn test_scan_enqueues_unseen_old_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("drop1"), b"hello").unwrap();
        // a positive `after` pushes the threshold into the future, so a
        // file written "now" already qualifies as old enough.
        let server = test_server(dir.path(), 3600);

        scan_once(&server);

        let item = server.queue.dequeue().expect("file should be enqueued");
        assert_eq!(item.id, "drop1");
        assert_eq!(item.data, b"hello");
        assert!(server.seen_set.contains("drop1"));
    }

    #[test]
    fn test_scan_skips_already_seen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("drop1"), b"hello").unwrap();
        let server = test_server(dir.path(), 3600);

        scan_once(&server);
        server.queue.dequeue();
        scan_once(&server);

        assert!(server.queue.dequeue().is_none());
    }

    #[test]
    fn test_scan_skips_too_recent_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("drop1"), b"hello").unwrap();
        // a threshold pushed far into the past means "now" is always after
        // it, so a fresh file never qualifies as old enough to pick up.
        let server = test_server(dir.path(), -(10 * 365 * 24 * 3600));

        scan_once(&server);

        assert!(server.queue.dequeue().is_none());
        assert!(!server.seen_set.contains("drop1"));
    }

    #[test]
    fn test_collector_removes_file_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop1");
        std::fs::write(&path, b"hello").unwrap();
        let server = test_server(dir.path(), -3600);

        server.seen_set.insert("drop1".to_string());
        server.gc_list.mark("drop1".to_string());
        run_collector(&server);

        assert!(!path.exists());
        assert!(!server.seen_set.contains("drop1"));
    }
}
