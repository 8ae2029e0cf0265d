// dispatcher: spawns one worker task per device and fans queued command
// envelopes to the matching worker (spec.md 4.I).

use banner_db::SqliteFixtureDb;
use banner_dispatcher::{config, worker::DeviceWorker};
use banner_journal::Journal;
use banner_protocol::{CommandType, Role};
use banner_queue::Queue;
use banner_registry::DeviceRegistry;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Per-device message dispatcher for the banner fleet")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Every `CommandType` the queue carries, used to build the supervisor's
/// poll filter cross-product. Kept local to the binary: the queue itself
/// has no notion of "all types", only per-triple filters (spec.md 4.A).
const COMMAND_TYPES: [CommandType; 7] = [
    CommandType::NewMessage,
    CommandType::ClearSign,
    CommandType::SequenceChange,
    CommandType::StopMessage,
    CommandType::ShowSignMessages,
    CommandType::HardwareUpdate,
    CommandType::ApplianceSync,
];

/// Every role that can originate an envelope addressed to the dispatcher.
const SOURCE_ROLES: [Role; 5] = [
    Role::LaunchUi,
    Role::Sequencer,
    Role::Cgi,
    Role::Hardware,
    Role::BannerBoard,
];

const POLL_IDLE_BACKOFF: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "banner-dispatcher starting");

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config_from_path(path),
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let db = match SqliteFixtureDb::open(Path::new(&cfg.db_path)) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("FATAL: db-init: {e}");
            std::process::exit(1);
        }
    };

    let queue = match Queue::open(Path::new(&cfg.queue_path)) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("FATAL: queue-write: failed to open queue: {e}");
            std::process::exit(1);
        }
    };
    let queue = Arc::new(Mutex::new(queue));

    if cfg.purge_on_startup {
        match queue.lock().await.purge_all() {
            Ok(n) => info!(rows = n, "startup purge: stale queue rows dropped"),
            Err(e) => warn!(error = %e, "startup purge failed; continuing with existing queue contents"),
        }
    }

    let registry = match DeviceRegistry::build(db.as_ref(), cfg.slot_capacity) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("FATAL: db-init: failed to build device registry: {e}");
            std::process::exit(1);
        }
    };

    let journal_dir = PathBuf::from(&cfg.journal_dir);
    if let Err(e) = std::fs::create_dir_all(&journal_dir) {
        eprintln!("FATAL: journal-io: failed to create journal dir: {e}");
        std::process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let rotate_logs = Arc::new(AtomicBool::new(false));
    install_signal_handlers(Arc::clone(&shutdown), Arc::clone(&rotate_logs));

    let device_ids = registry.kind_order().await;
    let mut inboxes = Vec::with_capacity(device_ids.len());
    for record_number in &device_ids {
        let Some(entry) = registry.lookup(*record_number).await else {
            continue;
        };
        let (tx, rx) = mpsc::channel(64);
        let journal = Journal::new(journal_dir.join(format!("{record_number}.jsonl")));
        let worker = DeviceWorker {
            entry,
            db: Arc::clone(&db),
            journal,
            registry: Arc::clone(&registry),
            queue: Arc::clone(&queue),
            inbox: rx,
        };
        tokio::spawn(worker.run());
        inboxes.push((*record_number, tx));
        info!(device = record_number, "device worker spawned");
    }

    let liveness_registry = Arc::clone(&registry);
    let liveness_interval = Duration::from_secs(cfg.liveness_interval_secs);
    let liveness_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        liveness_loop(liveness_registry, liveness_interval, liveness_shutdown).await;
    });

    info!("entering queue poll loop");
    while !shutdown.load(Ordering::Relaxed) {
        if rotate_logs.swap(false, Ordering::Relaxed) {
            info!("SIGXFSZ received: log rotation requested (host log manager handles the actual rotation)");
        }

        let mut any_read = false;
        'poll: for command_type in COMMAND_TYPES {
            for source in SOURCE_ROLES {
                let env = match queue.lock().await.read(command_type, source, Role::Dispatcher) {
                    Ok(Some(env)) => env,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "queue-write: read failed");
                        continue;
                    }
                };
                any_read = true;
                let Some((_, tx)) = inboxes.iter().find(|(recno, _)| *recno == env.hardware_recno) else {
                    warn!(recno = env.hardware_recno, "envelope addressed to unknown device; dropped");
                    continue 'poll;
                };
                if tx.send(env).await.is_err() {
                    warn!("device worker inbox closed; envelope dropped");
                }
            }
        }

        if !any_read {
            tokio::time::sleep(POLL_IDLE_BACKOFF).await;
        }
    }

    info!("shutdown flag observed; closing down");
}

async fn liveness_loop(registry: Arc<DeviceRegistry>, interval: Duration, shutdown: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        for record_number in registry.kind_order().await {
            let Some(entry) = registry.lookup(record_number).await else {
                continue;
            };
            match banner_transport::probe_liveness(&entry).await {
                Ok(()) => tracing::debug!(device = record_number, "liveness probe: alive"),
                Err(e) => tracing::debug!(device = record_number, error = %e, "liveness probe: dead"),
            }
        }
    }
}

/// `HUP`/`USR1`/`PIPE` each set a cooperative shutdown flag observed at the
/// next safe point in the poll loop; `SIGXFSZ` sets a log-rotation flag
/// instead (spec.md 4.I). Grounded on the teacher's `shutdown_signal` in
/// `services/server/src/main.rs`, generalized from two signals to four and
/// from "await once" to "set a flag the main loop polls", since this
/// supervisor's main loop is not a single `axum::serve` future.
fn install_signal_handlers(shutdown: Arc<AtomicBool>, rotate_logs: Arc<AtomicBool>) {
    use tokio::signal::unix::{signal, SignalKind};

    for kind in [SignalKind::hangup(), SignalKind::user_defined1(), SignalKind::pipe()] {
        let flag = Arc::clone(&shutdown);
        let mut stream = match signal(kind) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install signal handler");
                continue;
            }
        };
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!("shutdown signal received");
                flag.store(true, Ordering::Relaxed);
            }
        });
    }

    match signal(SignalKind::from_raw(libc_sigxfsz())) {
        Ok(mut stream) => {
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    rotate_logs.store(true, Ordering::Relaxed);
                }
            });
        }
        Err(e) => warn!(error = %e, "failed to install SIGXFSZ handler"),
    }
}

/// `SIGXFSZ`'s value on every target this workspace deploys to (Linux,
/// all architectures): 25. `tokio::signal::unix::SignalKind` has no named
/// constant for it.
fn libc_sigxfsz() -> i32 {
    25
}
