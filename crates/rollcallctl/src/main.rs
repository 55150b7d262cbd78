//! rollcallctl - command-line client for rollcalld
//!
//! Talks to the service over its socket. Session definitions are TOML files
//! in the same format `rollcall-config` validates.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rollcall_api::{
    AttendanceExportRow, AttendanceRecord, CheckInAttempt, Command, Coordinate, ResponsePayload,
    Session, SessionStatus, VerificationMethod,
};
use rollcall_config::load_session_draft;
use rollcall_ipc::IpcClient;
use rollcall_util::{AttendeeId, OwnerId, SessionId, default_socket_path, format_datetime_full};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rollcallctl")]
#[command(about = "Manage attendance sessions and check-ins", long_about = None)]
struct Args {
    /// Socket path (or set ROLLCALL_SOCKET env var)
    #[arg(short, long, env = "ROLLCALL_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON responses
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Service health
    Health,

    /// List sessions
    Sessions {
        #[arg(long)]
        status: Option<SessionStatus>,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show one session
    Show { session: SessionId },

    /// Create a session from a definition file
    Create { file: PathBuf },

    /// Replace a scheduled session's definition
    Update { session: SessionId, file: PathBuf },

    Open { session: SessionId },
    Close { session: SessionId },
    Cancel { session: SessionId },
    Archive { session: SessionId },

    /// Current verification token of an open session
    Token { session: SessionId },

    /// Submit a check-in attempt
    CheckIn {
        session: SessionId,
        #[arg(long)]
        attendee: String,
        #[arg(long)]
        method: VerificationMethod,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
        #[arg(long)]
        device: Option<String>,
        /// Method-specific proof as JSON, passed to the verifier
        #[arg(long)]
        proof: Option<String>,
    },

    /// Attendance records of one session
    Attendance { session: SessionId },

    /// Attendance across sessions
    Export {
        #[arg(long)]
        owner: Option<String>,
        /// Write CSV instead of a table
        #[arg(long)]
        csv: bool,
    },

    /// Stream service events until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to rollcalld at {}", args.socket.display()))?;

    if let Cmd::Watch = args.command {
        let mut events = client.subscribe().await?;
        loop {
            let event = events.next().await?;
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    let csv = matches!(args.command, Cmd::Export { csv: true, .. });
    let command = build_command(args.command)?;
    debug!(?command, "Sending command");

    let mut client = client;
    let payload = client.request(command).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print_payload(payload, csv);
    Ok(())
}

fn build_command(cmd: Cmd) -> Result<Command> {
    let command = match cmd {
        Cmd::Health => Command::GetHealth,
        Cmd::Sessions { status, owner } => Command::ListSessions {
            status,
            owner_id: owner.map(OwnerId::new),
        },
        Cmd::Show { session } => Command::GetSession { session_id: session },
        Cmd::Create { file } => Command::CreateSession {
            draft: load_session_draft(&file)
                .with_context(|| format!("Invalid session file {}", file.display()))?,
        },
        Cmd::Update { session, file } => Command::UpdateSession {
            session_id: session,
            draft: load_session_draft(&file)
                .with_context(|| format!("Invalid session file {}", file.display()))?,
        },
        Cmd::Open { session } => Command::OpenSession { session_id: session },
        Cmd::Close { session } => Command::CloseSession { session_id: session },
        Cmd::Cancel { session } => Command::CancelSession { session_id: session },
        Cmd::Archive { session } => Command::ArchiveSession { session_id: session },
        Cmd::Token { session } => Command::GetToken { session_id: session },
        Cmd::CheckIn {
            session,
            attendee,
            method,
            token,
            latitude,
            longitude,
            device,
            proof,
        } => {
            let location = match (latitude, longitude) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
                _ => None,
            };
            let proof = proof
                .map(|p| serde_json::from_str(&p).context("--proof must be valid JSON"))
                .transpose()?;
            if method == VerificationMethod::Qr && token.is_none() {
                bail!("QR check-in needs --token");
            }
            Command::CheckIn {
                session_id: session,
                attempt: CheckInAttempt {
                    attendee_id: AttendeeId::new(attendee),
                    method,
                    token,
                    location,
                    device_id: device,
                    proof,
                },
            }
        }
        Cmd::Attendance { session } => Command::ListAttendance { session_id: session },
        Cmd::Export { owner, .. } => Command::ExportAttendance {
            owner_id: owner.map(OwnerId::new),
        },
        Cmd::Watch => bail!("watch is handled separately"),
    };
    Ok(command)
}

fn print_payload(payload: ResponsePayload, csv: bool) {
    match payload {
        ResponsePayload::Session(session) => print_session(&session),
        ResponsePayload::Sessions { sessions } => {
            if sessions.is_empty() {
                println!("No sessions");
            }
            for s in &sessions {
                println!(
                    "{}  {:<9}  {}  #{:<3} {}",
                    s.id,
                    s.status.as_str(),
                    format_datetime_full(&s.start_time),
                    s.occurrence,
                    s.title
                );
            }
        }
        ResponsePayload::Token(token) => {
            println!("{}", token.value);
            println!("expires {}", format_datetime_full(&token.expires_at));
        }
        ResponsePayload::CheckedIn(record) => {
            println!(
                "{} checked in at {} ({})",
                record.attendee_id,
                format_datetime_full(&record.check_in_time),
                record.status.as_str()
            );
        }
        ResponsePayload::Attendance { records } => print_records(&records),
        ResponsePayload::Export { rows } => {
            if csv {
                print!("{}", export_csv(&rows));
            } else {
                for row in &rows {
                    println!(
                        "{}  {}  {:<8} {:<9} {}",
                        format_datetime_full(&row.check_in_time),
                        row.attendee_id,
                        row.status.as_str(),
                        row.verification_method,
                        row.session_title
                    );
                }
            }
        }
        ResponsePayload::Health(health) => {
            println!("live: {}", health.live);
            println!("ready: {}", health.ready);
            println!("store: {}", if health.store_ok { "ok" } else { "failing" });
            println!("open sessions: {}", health.open_sessions);
        }
        ResponsePayload::Subscribed { client_id } => println!("subscribed as {client_id}"),
        ResponsePayload::Unsubscribed => println!("unsubscribed"),
        ResponsePayload::Pong => println!("pong"),
    }
}

fn print_session(s: &Session) {
    println!("{} ({})", s.title, s.id);
    println!("  owner:      {}", s.owner_id);
    println!("  status:     {}{}", s.status, if s.archived { " (archived)" } else { "" });
    println!("  start:      {}", format_datetime_full(&s.start_time));
    println!("  end:        {}", format_datetime_full(&s.end_boundary()));
    println!("  grace:      {} min", s.grace_period_minutes);
    let methods: Vec<&str> = s.methods.methods().iter().map(|m| m.as_str()).collect();
    println!("  methods:    {}", methods.join(", "));
    if let Some(fence) = &s.geofence {
        println!("  geofence:   {} r={}m", fence.center, fence.radius_meters);
    }
    if s.is_recurring() {
        println!("  series:     {} occurrence {}", s.series_id, s.occurrence);
    }
    if let Some(next) = &s.next_occurrence {
        println!("  next:       {}", format_datetime_full(next));
    }
    if let Some(reason) = &s.close_reason {
        println!("  closed:     {reason:?}");
    }
}

fn print_records(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No check-ins");
    }
    for r in records {
        println!(
            "{}  {:<8} {:<9} {}",
            format_datetime_full(&r.check_in_time),
            r.status.as_str(),
            r.verification_method,
            r.attendee_id
        );
    }
}

fn export_csv(rows: &[AttendanceExportRow]) -> String {
    let mut out = String::from(
        "session_id,session_title,session_start,owner_id,attendee_id,check_in_time,status,verification_method\n",
    );
    for row in rows {
        let fields = [
            row.session_id.to_string(),
            row.session_title.clone(),
            row.session_start.to_rfc3339(),
            row.owner_id.to_string(),
            row.attendee_id.to_string(),
            row.check_in_time.to_rfc3339(),
            row.status.as_str().to_string(),
            row.verification_method.as_str().to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use rollcall_api::AttendanceStatus;

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("Maths, Group B"), "\"Maths, Group B\"");
        assert_eq!(csv_field("the \"big\" one"), "\"the \"\"big\"\" one\"");
    }

    #[test]
    fn test_export_csv() {
        let at = Local.with_ymd_and_hms(2024, 3, 4, 10, 2, 0).unwrap();
        let rows = vec![AttendanceExportRow {
            session_id: SessionId::new(),
            session_title: "Physics, Lab 2".into(),
            session_start: at,
            owner_id: OwnerId::new("t-1"),
            attendee_id: AttendeeId::new("s-9"),
            check_in_time: at,
            status: AttendanceStatus::Late,
            verification_method: VerificationMethod::Nfc,
        }];

        let csv = export_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("session_id,"));
        assert!(lines[1].contains("\"Physics, Lab 2\""));
        assert!(lines[1].ends_with(",late,nfc"));
    }

    #[test]
    fn test_check_in_command() {
        let cmd = build_command(Cmd::CheckIn {
            session: SessionId::new(),
            attendee: "s-1".into(),
            method: VerificationMethod::Location,
            token: None,
            latitude: Some(51.5),
            longitude: Some(-0.12),
            device: None,
            proof: None,
        })
        .unwrap();
        match cmd {
            Command::CheckIn { attempt, .. } => {
                assert_eq!(attempt.location, Some(Coordinate::new(51.5, -0.12)));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let missing_token = build_command(Cmd::CheckIn {
            session: SessionId::new(),
            attendee: "s-1".into(),
            method: VerificationMethod::Qr,
            token: None,
            latitude: None,
            longitude: None,
            device: None,
            proof: None,
        });
        assert!(missing_token.is_err());
    }
}
