//! rollcalld - The rollcall background service
//!
//! This is the main entry point for the rollcalld service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine and its scheduler
//! - External verifier
//! - IPC server

mod verifier;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use rollcall_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, Request, Response, ResponsePayload,
};
use rollcall_config::{Config, load_config};
use rollcall_core::{
    CheckInError, CoreEngine, CoreEvent, NoVerifier, Scheduler, SessionError, Verifier,
};
use rollcall_ipc::{IpcServer, ServerMessage};
use rollcall_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use rollcall_util::{ClientId, RateLimiter, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::verifier::CommandVerifier;

/// rollcalld - Attendance sessions and check-in verification
#[derive(Parser, Debug)]
#[command(name = "rollcalld")]
#[command(about = "Attendance session and check-in verification service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set ROLLCALL_SOCKET env var)
    #[arg(short, long, env = "ROLLCALL_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Main service state
struct Service {
    engine: Arc<CoreEngine>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    tick_interval: Duration,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(config_path = %args.config.display(), "Configuration loaded");
            config
        } else {
            info!(config_path = %args.config.display(), "No configuration file, using defaults");
            Config::default()
        };

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("rollcall.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let verifier: Arc<dyn Verifier> = match &config.verifier {
            Some(settings) => {
                info!(program = %settings.program, "External verifier configured");
                Arc::new(CommandVerifier::new(settings.program.clone(), settings.args.clone()))
            }
            None => {
                warn!("No verifier configured, biometric, facial and NFC check-ins will be refused");
                Arc::new(NoVerifier)
            }
        };

        let engine = Arc::new(CoreEngine::new(&config.service, store.clone(), verifier));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
            tick_interval: config.service.tick_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .ok_or_else(|| anyhow!("IPC message receiver already taken"))?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Scheduler and request handlers both report through this channel
        let (event_tx, mut core_events) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(self.engine.clone(), self.tick_interval).start(event_tx.clone());

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        // 30 requests per second per client
        let mut rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(event) = core_events.recv() => {
                    ipc.broadcast_event(to_event(event));
                }

                Some(msg) = ipc_messages.recv() => match msg {
                    ServerMessage::Request { client_id, request } => {
                        if !rate_limiter.check(&client_id) {
                            let response = Response::error(
                                request.request_id,
                                ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                            );
                            let _ = ipc.send_response(&client_id, response).await;
                            continue;
                        }

                        // Check-ins may wait on the verifier; never stall the loop
                        let engine = self.engine.clone();
                        let ipc = ipc.clone();
                        let events = event_tx.clone();
                        tokio::spawn(async move {
                            let response = handle_request(&engine, &events, &client_id, request).await;
                            if let Err(e) = ipc.send_response(&client_id, response).await {
                                debug!(client_id = %client_id, error = %e, "Response not delivered");
                            }
                        });
                    }

                    ServerMessage::ClientConnected { client_id, info } => {
                        debug!(client_id = %client_id, uid = ?info.uid, "Client registered");
                    }

                    ServerMessage::ClientDisconnected { client_id } => {
                        debug!(client_id = %client_id, "Client disconnected");
                        rate_limiter.remove(&client_id);
                    }
                },
            }
        }

        info!("Shutting down rollcalld");

        scheduler.stop().await;

        // Flush whatever the last tick produced
        while let Ok(event) = core_events.try_recv() {
            ipc.broadcast_event(to_event(event));
        }
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self.store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_request(
    engine: &CoreEngine,
    events: &mpsc::UnboundedSender<CoreEvent>,
    client_id: &ClientId,
    request: Request,
) -> Response {
    let request_id = request.request_id;
    match handle_command(engine, events, client_id, request.command).await {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => Response::error(request_id, e),
    }
}

async fn handle_command(
    engine: &CoreEngine,
    events: &mpsc::UnboundedSender<CoreEvent>,
    client_id: &ClientId,
    command: Command,
) -> Result<ResponsePayload, ErrorInfo> {
    let now = rollcall_util::now();
    let publish = |emitted: Vec<CoreEvent>| {
        for event in emitted {
            let _ = events.send(event);
        }
    };

    match command {
        Command::GetHealth => Ok(ResponsePayload::Health(engine.health())),

        Command::Ping => Ok(ResponsePayload::Pong),

        Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
            client_id: client_id.clone(),
        }),

        Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),

        Command::CreateSession { draft } => {
            let session = engine.create_session(draft, now).await.map_err(session_error)?;
            Ok(ResponsePayload::Session(session))
        }

        Command::UpdateSession { session_id, draft } => {
            let session = engine
                .update_session(&session_id, draft)
                .await
                .map_err(session_error)?;
            Ok(ResponsePayload::Session(session))
        }

        Command::OpenSession { session_id } => {
            let applied = engine.open_session(&session_id, now).await.map_err(session_error)?;
            publish(applied.events);
            Ok(ResponsePayload::Session(applied.session))
        }

        Command::CloseSession { session_id } => {
            let applied = engine.close_session(&session_id, now).await.map_err(session_error)?;
            publish(applied.events);
            Ok(ResponsePayload::Session(applied.session))
        }

        Command::CancelSession { session_id } => {
            let applied = engine.cancel_session(&session_id, now).await.map_err(session_error)?;
            publish(applied.events);
            Ok(ResponsePayload::Session(applied.session))
        }

        Command::ArchiveSession { session_id } => {
            let applied = engine.archive_session(&session_id, now).await.map_err(session_error)?;
            publish(applied.events);
            Ok(ResponsePayload::Session(applied.session))
        }

        Command::GetToken { session_id } => {
            let (token, emitted) = engine
                .current_token(&session_id, now)
                .await
                .map_err(session_error)?;
            publish(emitted);
            Ok(ResponsePayload::Token(token))
        }

        Command::GetSession { session_id } => {
            let session = engine.get_session(&session_id).map_err(session_error)?;
            Ok(ResponsePayload::Session(session))
        }

        Command::ListSessions { status, owner_id } => {
            let sessions = engine
                .list_sessions(status, owner_id.as_ref())
                .map_err(session_error)?;
            Ok(ResponsePayload::Sessions { sessions })
        }

        Command::ListAttendance { session_id } => {
            let records = engine.list_attendance(&session_id).map_err(session_error)?;
            Ok(ResponsePayload::Attendance { records })
        }

        Command::ExportAttendance { owner_id } => {
            let rows = engine
                .export_attendance(owner_id.as_ref())
                .map_err(session_error)?;
            Ok(ResponsePayload::Export { rows })
        }

        Command::CheckIn { session_id, attempt } => {
            let (record, event) = engine
                .check_in(&session_id, attempt, now)
                .await
                .map_err(check_in_error)?;
            publish(vec![event]);
            Ok(ResponsePayload::CheckedIn(record))
        }
    }
}

fn session_error(e: SessionError) -> ErrorInfo {
    if let SessionError::Store(inner) = &e {
        error!(error = %inner, "Store failure");
    }
    ErrorInfo::new(e.code(), e.to_string())
}

fn check_in_error(e: CheckInError) -> ErrorInfo {
    if let CheckInError::Store(inner) = &e {
        error!(error = %inner, "Store failure during check-in");
    }
    ErrorInfo::new(e.code(), e.to_string())
}

fn to_event(event: CoreEvent) -> Event {
    let payload = match event {
        CoreEvent::SessionOpened {
            session_id,
            title,
            ends_at,
        } => EventPayload::SessionOpened {
            session_id,
            title,
            ends_at,
        },
        CoreEvent::SessionClosingSoon {
            session_id,
            closes_at,
        } => EventPayload::SessionClosingSoon {
            session_id,
            closes_at,
        },
        CoreEvent::SessionClosed { session_id, reason } => {
            EventPayload::SessionClosed { session_id, reason }
        }
        CoreEvent::OccurrenceScheduled {
            session_id,
            series_id,
            start_time,
        } => EventPayload::OccurrenceScheduled {
            session_id,
            series_id,
            start_time,
        },
        CoreEvent::TokenRotated {
            session_id,
            expires_at,
        } => EventPayload::TokenRotated {
            session_id,
            expires_at,
        },
        CoreEvent::CheckInRecorded {
            session_id,
            attendee_id,
            status,
        } => EventPayload::CheckInRecorded {
            session_id,
            attendee_id,
            status,
        },
    };
    Event::new(payload)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "rollcalld starting"
    );
    if rollcall_util::is_mock_time_active() {
        warn!(now = %rollcall_util::now(), "Mock time is active, schedules follow the mock clock");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
