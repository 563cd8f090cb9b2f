use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use japa_core::config;
use japa_core::paths::japa_root;
use japa_sync::CounterSession;

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, socket_path, stderr_log_path, stdout_log_path};
use crate::protocol::{
    DaemonRequest, DaemonResponse, CMD_INCREMENT, CMD_OFFLINE, CMD_ONLINE, CMD_RESET, CMD_STATUS,
    CMD_STOP, CMD_SYNC,
};

/// State shared by every socket client.
struct DaemonContext {
    home: PathBuf,
    session: Arc<CounterSession>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let config = config::load_at(&home)?;
    let session = Arc::new(CounterSession::open_configured(&home, &config)?);
    tracing::info!(
        user = %config.user_id,
        device = %config.device_profile,
        online = session.monitor().is_online(),
        pending = session.pending_count().await,
        "daemon starting",
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let ctx = Arc::new(DaemonContext {
        home: home.clone(),
        session: session.clone(),
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    });

    let reconnect_handle = session.spawn_reconnect_listener(shutdown_tx.subscribe());

    let startup_handle = {
        let session = session.clone();
        tokio::spawn(async move {
            if let Some(report) = session.drain_on_start().await {
                tracing::info!(
                    synced = report.synced,
                    pending = report.pending_after,
                    "startup drain finished",
                );
            }
            Ok::<(), DaemonError>(())
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (reconnect_result, startup_result, socket_result, rotation_result, signal_result) = tokio::join!(
        reconnect_handle,
        startup_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("reconnect_listener", reconnect_result.map(Ok))?;
    handle_join("startup_drain", startup_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;

    tracing::info!(
        pending = session.pending_count().await,
        "daemon stopped"
    );
    Ok(())
}

async fn socket_server_task(
    ctx: Arc<DaemonContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&ctx.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    ctx: Arc<DaemonContext>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = handle_request(&ctx, &request).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

async fn handle_request(ctx: &DaemonContext, request: &DaemonRequest) -> DaemonResponse {
    let session = &ctx.session;
    match request.cmd.as_str() {
        CMD_STATUS => match build_status_payload(ctx).await {
            Ok(payload) => DaemonResponse::ok(payload),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        CMD_INCREMENT => {
            let delta = request.delta.unwrap_or(1);
            match session.increment(delta, request.category.as_deref()).await {
                Ok(receipt) => {
                    tracing::info!(
                        local_id = %receipt.event.local_id,
                        today = receipt.today_count,
                        synced = receipt.synced,
                        "increment recorded",
                    );
                    ok_json(&receipt)
                }
                Err(err) => {
                    tracing::error!(error = %err, "increment not saved");
                    DaemonResponse::error(err.to_string())
                }
            }
        }
        CMD_SYNC => match session.sync_now().await {
            Ok(report) => ok_json(&report),
            Err(err) => {
                tracing::warn!(error = %err, "manual sync rejected");
                DaemonResponse::error(err.to_string())
            }
        },
        CMD_RESET => match session.reset_today().await {
            Ok(()) => DaemonResponse::ok(json!({ "today": 0 })),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        CMD_ONLINE | CMD_OFFLINE => {
            let online = request.cmd == CMD_ONLINE;
            let changed = session.monitor().report(online);
            DaemonResponse::ok(json!({ "online": online, "changed": changed }))
        }
        CMD_STOP => {
            let _ = ctx.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

async fn build_status_payload(ctx: &DaemonContext) -> Result<Value, DaemonError> {
    let status = ctx.session.status().await?;
    let key = ctx.session.key();
    Ok(json!({
        "running": true,
        "started_at_unix": ctx.started_at_unix,
        "user": key.user.to_string(),
        "device": key.device.to_string(),
        "online": status.sync.online,
        "pending": status.sync.pending,
        "in_flight": status.sync.in_flight,
        "last_sync_at": status.sync.last_synced_at.map(|at| at.to_rfc3339()),
        "today": {
            "date": status.today.date.to_string(),
            "count": status.today.count,
        },
        "socket": socket_path(&ctx.home).display().to_string(),
    }))
}

fn ok_json<T: Serialize>(value: &T) -> DaemonResponse {
    match serde_json::to_value(value) {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(format!("failed to encode response: {err}")),
    }
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [japa_root(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Everything goes to `daemon.log`; warnings and errors also go to
/// `daemon-err.log`.
fn init_tracing(home: &Path) {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_log = append_writer(stdout_log_path(home));
    let stderr_log = append_writer(stderr_log_path(home)).with_max_level(tracing::Level::WARN);
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(stdout_log.and(stderr_log))
        .try_init();
}

/// Reopened per event, so a rotation never leaves the daemon writing to the
/// renamed file.
fn append_writer(path: PathBuf) -> impl Fn() -> Box<dyn io::Write> + Send + Sync + 'static {
    move || -> Box<dyn io::Write> {
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::stderr()),
        }
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
