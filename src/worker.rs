//! Ingest worker pool (C5): dequeue, classify, write, cooldown ladder.
//!
//! Grounded on `writerWorker`/`resetWorker`/`createWorker` in
//! `internal/receiver/core.go`. One `std::thread` per worker, matching the
//! original's one-goroutine-per-worker model with a blocking-ish dequeue
//! loop rather than a channel (Design Notes §9 accepts either; the
//! cooldown ladder is the part that must survive).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use tracing::warn;

use crate::classifier;
use crate::error::RecordWriteError;
use crate::model::{DumpField, Record};
use crate::queue::QueueItem;
use crate::server::Server;

const DELIMITER: char = '`';
const SLEEP_CYCLE_MIN: u32 = 90;
const SLEEP_CYCLE_MAX: u32 = 108;

/// Spawn `workers` threads, each running [`run`] against a shared `Server`.
pub fn spawn_pool(server: Arc<Server>) -> Vec<std::thread::JoinHandle<()>> {
    let count = server.config.global.workers;
    (0..count)
        .map(|id| {
            let server = Arc::clone(&server);
            std::thread::spawn(move || run(id, server))
        })
        .collect()
}

/// Run a single worker's loop forever on the calling thread.
pub fn run(id: usize, server: Arc<Server>) {
    let mut state = WorkerState::new(id, &server);
    let mut last_worked: u32 = 0;

    loop {
        let worked = match server.queue.dequeue() {
            Some(item) => process_item(&mut state, &server, item),
            None => false,
        };

        if worked {
            last_worked = 0;
            continue;
        }

        let cooldown = match () {
            _ if last_worked < SLEEP_CYCLE_MIN => 1,
            _ if last_worked < SLEEP_CYCLE_MAX => {
                state.reset_partition(&server);
                5
            }
            _ if id > 0 => 30,
            _ => 1,
        };
        if last_worked < SLEEP_CYCLE_MAX {
            last_worked += 1;
        }
        std::thread::sleep(Duration::from_secs(cooldown));
    }
}

struct WorkerState {
    id: usize,
    counter: u64,
    out_dir: PathBuf,
}

impl WorkerState {
    fn new(id: usize, server: &Server) -> Self {
        let out_dir = partition_dir(server);
        Self {
            id,
            counter: 0,
            out_dir,
        }
    }

    fn reset_partition(&mut self, server: &Server) {
        self.counter = 0;
        self.out_dir = partition_dir(server);
    }
}

fn partition_dir(server: &Server) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let dir = PathBuf::from(&server.config.global.output).join(today);
    if !dir.exists() {
        if let Err(io_err) = fs::create_dir_all(&dir) {
            let err = RecordWriteError::Partition(dir.display().to_string(), io_err);
            warn!(error = %err, "failed to create output partition");
        }
    }
    dir
}

/// Process one queue item; returns whether it was handled successfully
/// (requeue happens on failure per §4.5 step 3).
fn process_item(state: &mut WorkerState, server: &Server, item: QueueItem) -> bool {
    let record = match build_record(state, server, &item) {
        Ok(record) => record,
        Err(err) => {
            warn!(file = %item.id, error = %err, "unable to classify payload (not critical)");
            server.queue.requeue(item);
            return false;
        }
    };

    let path = state.out_dir.join(&record.id);
    let bytes = match serde_json::to_vec(&record) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(file = %item.id, error = %err, "unable to marshal record");
            server.queue.requeue(item);
            return false;
        }
    };

    if let Err(io_err) = fs::write(&path, &bytes) {
        let err = RecordWriteError::Write(path.display().to_string(), io_err);
        warn!(error = %err, "error saving results");
        server.queue.requeue(item);
        return false;
    }

    if item.gc {
        server.gc_list.mark(item.id.clone());
    }
    state.counter += 1;
    true
}

fn build_record(
    state: &WorkerState,
    server: &Server,
    item: &QueueItem,
) -> Result<Record, std::string::FromUtf8Error> {
    let payload = String::from_utf8(item.data.clone())?;
    let mut parts = payload.split(DELIMITER);
    let ts_str = parts.next().unwrap_or("");
    let vers = parts.next().unwrap_or("").to_string();
    let segments: Vec<&str> = parts.collect();

    let ts = ts_str.parse::<i64>().unwrap_or_else(|_| {
        warn!(file = %item.id, "unable to parse timestamp (not critical)");
        -1
    });
    let dt = Local
        .timestamp_millis_opt(ts)
        .single()
        .unwrap_or_else(Local::now)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    let raw_fields = classifier::detect_fields(&segments);
    let fields = classifier::handle_entries(raw_fields, &server.config.api.handlers);

    let dump = if server.config.global.dump {
        DumpField::enabled(&payload)
    } else {
        DumpField::disabled()
    };

    Ok(Record {
        id: format!("{}.{}.{}.{}", server.start_stamp, ts, state.id, state.counter),
        ts,
        vers,
        file: item.id.clone(),
        dt,
        dump,
        fields,
    })
}
