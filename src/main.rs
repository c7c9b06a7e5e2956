//! Thin demo binary: tails a single file and drives it through
//! `log-source-core`'s ack tracking, flow control and bookmark persistence,
//! the way a real syslog-ng-style source would sit in front of this crate.
//!
//! This is a demonstration of the external interface described in the
//! crate's design notes, not a replacement for the parsers/sinks/config
//! layer the core deliberately leaves out of scope.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use log_source_core::{
    AckHandle, AckTrackingPolicy, AckTracker, AckType, ConfigDefaults, FlowControlWindow,
    HostResolver, IngestedRecord, LogSourceCore, LogSourceOptions, Pipe, QueueCallback,
    TracingInternalEvents,
};

#[derive(Parser, Debug)]
#[command(about = "Tails a file through log-source-core's ack/flow-control engine")]
struct Cli {
    /// File to tail.
    path: PathBuf,

    /// JSON file the last-acked position is persisted to.
    #[arg(long, default_value = "./checkpoint.json")]
    checkpoint_file: PathBuf,

    /// Flow-control window size (also the static tracker's ring capacity).
    #[arg(long, default_value_t = 100)]
    window_size: i64,

    /// Which ack-tracking variant to drive the source with.
    #[arg(long, value_enum, default_value_t = AckPolicyArg::LateStatic)]
    ack_policy: AckPolicyArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AckPolicyArg {
    Early,
    LateStatic,
    LateDynamic,
}

impl From<AckPolicyArg> for AckTrackingPolicy {
    fn from(value: AckPolicyArg) -> Self {
        match value {
            AckPolicyArg::Early => AckTrackingPolicy::EarlyAck,
            AckPolicyArg::LateStatic => AckTrackingPolicy::LateAckStatic,
            AckPolicyArg::LateDynamic => AckTrackingPolicy::LateAckDynamic,
        }
    }
}

/// Durable store for the one position this demo ever tracks: how far into the
/// tailed file the last saved bookmark reached. Mirrors the shape of the
/// ack-tracker's own bookmark callbacks -- `update` is cheap and in-memory,
/// `flush` is the best-effort, occasional disk write.
struct PositionStore {
    path: PathBuf,
    positions: Mutex<BTreeMap<String, u64>>,
}

impl PositionStore {
    fn load(path: PathBuf) -> Self {
        let positions = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            path,
            positions: Mutex::new(positions),
        }
    }

    fn get(&self, key: &str) -> Option<u64> {
        self.positions.lock().unwrap().get(key).copied()
    }

    fn update(&self, key: &str, position: u64) {
        self.positions.lock().unwrap().insert(key.to_string(), position);
    }

    fn flush(&self) -> anyhow::Result<()> {
        let snapshot = self.positions.lock().unwrap().clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Resolves every sender to the machine's own hostname -- there is exactly one
/// sender, the tailed file, so DNS/socket introspection would be wasted effort.
struct LocalHostResolver;

impl HostResolver for LocalHostResolver {
    fn resolve(&self, _sender_addr: &str) -> String {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
    }
}

/// Prints each forwarded line and immediately acks it -- this demo has no real
/// downstream, so "processing" completes synchronously in `queue`.
struct StdoutPipe;

impl Pipe for StdoutPipe {
    fn queue(&self, record: IngestedRecord, handle: AckHandle) {
        tracing::info!(
            host = record.host.as_deref().unwrap_or("-"),
            program = record.program.as_deref().unwrap_or("-"),
            "forwarded line"
        );
        handle.ack(AckType::Processed, &TracingInternalEvents);
    }
}

struct NoopQueueCallback;

impl QueueCallback for NoopQueueCallback {
    fn on_enqueue(&self, _record: &mut IngestedRecord) -> bool {
        true
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();

    let window = Arc::new(FlowControlWindow::new(args.window_size, true));
    let tracker = match args.ack_policy {
        AckPolicyArg::Early => AckTracker::new_early(Arc::clone(&window)),
        AckPolicyArg::LateStatic => {
            AckTracker::new_late_static(Arc::clone(&window), args.window_size as usize)
        }
        AckPolicyArg::LateDynamic => AckTracker::new_late_dynamic(Arc::clone(&window)),
    };

    let options = LogSourceOptions::builder()
        .ack_tracking(args.ack_policy.into())
        .init_window_size(args.window_size)
        .build(&ConfigDefaults::default())?;

    let store = Arc::new(PositionStore::load(args.checkpoint_file.clone()));
    let sender_addr = args.path.display().to_string();
    let start_position = store.get(&sender_addr).unwrap_or(0);

    let source = Arc::new(LogSourceCore::new(
        sender_addr.clone(),
        options,
        Arc::clone(&window),
        Arc::clone(&tracker),
        Arc::new(TracingInternalEvents),
        Arc::new(LocalHostResolver),
        vec![Arc::new(NoopQueueCallback)],
        Arc::new(StdoutPipe),
        true,
    ));

    let path = args.path.clone();
    let tail = tokio::task::spawn_blocking(move || {
        tail_file(&path, start_position, source, window, store, sender_addr)
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
        result = tail => {
            result??;
        }
    }

    Ok(())
}

fn tail_file(
    path: &Path,
    start_position: u64,
    source: Arc<LogSourceCore>,
    window: Arc<FlowControlWindow>,
    store: Arc<PositionStore>,
    sender_addr: String,
) -> anyhow::Result<()> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start_position))?;
    let mut reader = BufReader::new(file);
    let mut position = start_position;
    let mut line = String::new();

    loop {
        if !window.free_to_send() {
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }

        line.clear();
        let bytes_read = reader.read_line(&mut line)? as u64;
        if bytes_read == 0 || !line.ends_with('\n') {
            store.flush().ok();
            std::thread::sleep(Duration::from_millis(250));
            continue;
        }
        position += bytes_read;

        let now = unix_now();
        let record = IngestedRecord {
            origin_stamp_unix: now,
            receive_stamp_unix: now,
            sender_addr: sender_addr.clone(),
            host_from: String::new(),
            host: None,
            program: None,
            simple_hostname: true,
            local: true,
            tags: Vec::new(),
        };

        let store = Arc::clone(&store);
        let sender_addr_for_save = sender_addr.clone();
        source.post(record, move |bookmark| {
            bookmark.write_position::<u64>(position);
            bookmark.install(
                Box::new(move |container, _| {
                    store.update(&sender_addr_for_save, container.get::<u64>());
                    true
                }),
                Box::new(|_| {}),
            );
        });
    }
}
