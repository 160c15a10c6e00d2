pub mod attendance;
pub mod audio;
pub mod console;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod payload;
pub mod scanner;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use attendance::{AttendanceService, HttpAttendanceService};
use audio::{CueClips, FeedbackPlayer, RodioFeedbackPlayer, SilentFeedback};
use console::{render_entries, render_event, render_status, ConsoleCommand, HELP};
use coordinator::{
    spawn_session, SessionHandle, SessionParts, SessionSettings, SubmissionCoordinator,
};
use db::Database;
use events::EventBus;
use models::StaffSessionFile;
use payload::PayloadParser;
use scanner::{FacingMode, QrFrameDecoder, SpoolCamera};
use settings::{debug_enabled, ScannerSettings, SettingsStore};

#[derive(Parser, Debug)]
#[command(name = "tb-scanner")]
#[command(about = "QR attendance scanner for Target Board")]
#[command(version)]
struct Cli {
    /// Directory holding settings.json and the local database
    #[arg(long, default_value = ".tb-scanner", env = "TB_SCANNER_DATA_DIR")]
    data_dir: PathBuf,

    /// Staff record written by the login flow (defaults to <data-dir>/staff.json)
    #[arg(long, env = "TB_SCANNER_STAFF_FILE")]
    staff_file: Option<PathBuf>,

    /// Spool directory the capture process writes frames into
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Attendance service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Preferred camera: environment (rear) or user (front)
    #[arg(long, default_value = "environment")]
    facing: FacingMode,

    /// Skip audio feedback
    #[arg(long)]
    mute: bool,
}

pub struct AppState {
    pub settings: ScannerSettings,
    pub db: Option<Database>,
    pub session: SessionHandle,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug_enabled() {
        logger.filter_module("tb_scanner_lib::scanner", log::LevelFilter::Debug);
    }
    logger.init();

    info!("tb-scanner starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_scanner(cli))
}

async fn run_scanner(cli: Cli) -> Result<()> {
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create {}", cli.data_dir.display()))?;

    let store = SettingsStore::new(cli.data_dir.join("settings.json"))?;
    store.apply_env_overrides();
    let mut settings = store.get();
    if let Some(url) = &cli.api_url {
        settings.api_base_url = url.clone();
    }
    if let Some(frames_dir) = &cli.frames_dir {
        settings.frames_dir = frames_dir.clone();
    }

    let db = open_database(&cli, &settings).await;

    let staff_file = cli
        .staff_file
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("staff.json"));
    let service: Arc<dyn AttendanceService> = Arc::new(HttpAttendanceService::new(
        &settings.api_base_url,
        &settings.attendance_path,
        settings.request_timeout(),
    )?);
    let feedback: Arc<dyn FeedbackPlayer> = if cli.mute {
        Arc::new(SilentFeedback)
    } else {
        Arc::new(RodioFeedbackPlayer::new(
            CueClips {
                success: settings.success_clip.clone(),
                failure: settings.failure_clip.clone(),
            },
            settings.volume(),
        ))
    };

    info!(
        "frames from {}, submitting to {}{}",
        settings.frames_dir.display(),
        settings.api_base_url,
        settings.attendance_path
    );

    let parts = SessionParts {
        camera: Box::new(SpoolCamera::new(
            settings.frames_dir.clone(),
            format!("tb-scanner pid {}", std::process::id()),
        )),
        decoder: Arc::new(QrFrameDecoder),
        coordinator: SubmissionCoordinator::new(
            PayloadParser::new(settings.payload_prefixes.clone()),
            Arc::new(StaffSessionFile::new(staff_file)),
            service,
            settings.request_timeout(),
        ),
        feedback,
        database: db.clone(),
        settings: SessionSettings::from_settings(&settings, cli.facing),
    };

    let bus = EventBus::default();
    let printer = tokio::spawn(print_events(bus.subscribe()));
    let (session, session_task) = spawn_session(parts, bus).await;

    let state = AppState {
        settings,
        db,
        session,
    };
    println!("{HELP}");
    read_commands(&state).await;

    state.session.close().await;
    if let Err(err) = session_task.await {
        warn!("session task ended abnormally: {err}");
    }
    printer.abort();
    info!("tb-scanner stopped");
    Ok(())
}

/// Local persistence is optional; the scanner runs without it.
async fn open_database(cli: &Cli, settings: &ScannerSettings) -> Option<Database> {
    if !settings.persist_entries {
        return None;
    }

    let database = match Database::new(cli.data_dir.join("tb-scanner.sqlite3")) {
        Ok(database) => database,
        Err(err) => {
            warn!("local persistence disabled: {err:#}");
            return None;
        }
    };

    // Sessions still open were cut short by a crash or kill.
    match database.mark_open_sessions_interrupted(Utc::now()).await {
        Ok(0) => {}
        Ok(count) => warn!("marked {count} unfinished scan session(s) as interrupted"),
        Err(err) => warn!("could not recover unfinished scan sessions: {err:#}"),
    }
    Some(database)
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<events::ScanEvent>) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", render_event(&event)),
            Err(RecvError::Lagged(skipped)) => warn!("view skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn read_commands(state: &AppState) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, closing scanner");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("failed to read operator input: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => dispatch(state, command).await,
            Err(message) => println!("{message}"),
        }
    }
}

async fn dispatch(state: &AppState, command: ConsoleCommand) {
    let result = match command {
        ConsoleCommand::Retry => state.session.retry().await,
        ConsoleCommand::List => state
            .session
            .snapshot()
            .await
            .map(|snapshot| println!("{}", render_entries(&snapshot.entries))),
        ConsoleCommand::Clear => state.session.clear().await.map(|_| println!("list cleared")),
        ConsoleCommand::Status => state.session.snapshot().await.map(|snapshot| {
            println!("{}", render_status(&snapshot));
            println!(
                "api {} | local store {}",
                state.settings.api_base_url,
                state
                    .db
                    .as_ref()
                    .map(|db| db.path().display().to_string())
                    .unwrap_or_else(|| "off".into())
            );
        }),
        ConsoleCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        ConsoleCommand::Quit => Ok(()),
    };

    if let Err(err) = result {
        println!("{}", err.operator_message());
    }
}
