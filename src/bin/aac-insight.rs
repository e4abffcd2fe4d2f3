//! aac-insight CLI - Inspect and drive the behavior analytics engine
//!
//! Commands:
//! - record: Append one interaction to the event log
//! - import: Append events from an NDJSON or JSON-array file
//! - sessions: Print segmented sessions
//! - analyze: Run one analysis cycle and print pattern and recommendations
//! - apply: Apply recommendations to a settings file
//! - doctor: Diagnose event store health
//! - export: Dump the event log

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aac_insight::analytics::types::{
    BehaviorPattern, EventData, InteractionEvent, InteractionType, Priority, Recommendation,
    Session,
};
use aac_insight::analytics::{AnalysisOutcome, AnalyticsEngine, ApplyStatus, ApplySummary};
use aac_insight::store::{decode_events, FileStore, KeyValueStore};
use aac_insight::{AnalyticsError, BoardSettings, EngineConfig, AAC_INSIGHT_VERSION, PRODUCER_NAME};

/// aac-insight - Behavior analytics and adaptive recommendations for AAC boards
#[derive(Parser)]
#[command(name = "aac-insight")]
#[command(author = "Synheart AI Inc")]
#[command(version = AAC_INSIGHT_VERSION)]
#[command(about = "Analyze AAC board usage and recommend settings", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    /// Output format
    #[arg(long, global = true, default_value = "json-pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Directory holding the event store
    #[arg(long, global = true, default_value = ".aac-insight")]
    store: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum inactivity gap inside one session, in milliseconds
    #[arg(long, global = true)]
    session_gap_ms: Option<i64>,

    /// Trailing analysis window in hours
    #[arg(long, global = true)]
    window_hours: Option<i64>,

    /// Minimum window events before a pattern is computed
    #[arg(long, global = true)]
    min_events: Option<usize>,

    /// Offset from UTC used for hour-of-day bucketing (defaults to local time)
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one interaction to the event log
    Record {
        /// Interaction type (tile_click, category_switch, voice_command, ...)
        #[arg(value_name = "TYPE")]
        event_type: InteractionType,

        /// Tile identifier
        #[arg(long)]
        tile: Option<String>,

        /// Tile category
        #[arg(long)]
        category: Option<String>,

        /// Whether the interaction succeeded
        #[arg(long)]
        success: Option<bool>,

        /// Error classification for failed interactions
        #[arg(long)]
        error_type: Option<String>,

        /// Duration in milliseconds
        #[arg(long)]
        duration_ms: Option<i64>,

        /// Event time (RFC 3339); now when omitted
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Append events from a file, preserving their timestamps
    Import {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Print segmented sessions for the analysis window
    Sessions {
        /// Segment the whole log instead of the window
        #[arg(long)]
        all: bool,
    },

    /// Run one analysis cycle and print pattern and recommendations
    Analyze,

    /// Apply recommendations to a settings file
    Apply {
        /// Settings file (JSON); created with defaults when missing
        #[arg(short, long)]
        settings: PathBuf,

        /// Recommendation id to apply
        #[arg(long, conflicts_with = "batch")]
        id: Option<String>,

        /// Apply every active recommendation in the selected priorities
        #[arg(long)]
        batch: bool,

        /// Priorities included in a batch
        #[arg(long, value_delimiter = ',', default_value = "high,medium")]
        priority: Vec<Priority>,
    },

    /// Diagnose event store health
    Doctor,

    /// Dump the event log
    Export {
        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Export format
        #[arg(long, default_value = "ndjson")]
        export_format: InputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), InsightCliError> {
    let format = cli.format;
    match cli.command {
        Commands::Record {
            event_type,
            tile,
            category,
            success,
            error_type,
            duration_ms,
            at,
        } => {
            let data = EventData {
                tile_id: tile,
                category,
                duration: duration_ms,
                success,
                error_type,
                session_id: None,
            };
            cmd_record(&cli.engine, event_type, data, at, format)
        }
        Commands::Import {
            input,
            input_format,
        } => cmd_import(&cli.engine, &input, input_format, format),
        Commands::Sessions { all } => cmd_sessions(&cli.engine, all, format),
        Commands::Analyze => cmd_analyze(&cli.engine, format),
        Commands::Apply {
            settings,
            id,
            batch,
            priority,
        } => cmd_apply(&cli.engine, &settings, id.as_deref(), batch, &priority, format),
        Commands::Doctor => cmd_doctor(&cli.engine, format),
        Commands::Export {
            output,
            export_format,
        } => cmd_export(&cli.engine, &output, export_format),
    }
}

fn cmd_record(
    args: &EngineArgs,
    event_type: InteractionType,
    data: EventData,
    at: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> Result<(), InsightCliError> {
    let mut engine = open_engine(args)?;
    match at {
        Some(ts) => {
            engine.check_timestamp(ts)?;
            engine.record_interaction_at(event_type, data, ts)
        }
        None => engine.record_interaction(event_type, data),
    }
    if engine.persist_failures() > 0 {
        return Err(InsightCliError::NotPersisted(engine.persist_failures()));
    }

    let report = RecordReport {
        recorded: engine.events().last(),
        total_events: engine.events().len(),
    };
    emit(&report, format)
}

fn cmd_import(
    args: &EngineArgs,
    input: &Path,
    input_format: InputFormat,
    format: OutputFormat,
) -> Result<(), InsightCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => serde_json::from_str::<Vec<InteractionEvent>>(&input_data)?,
    };
    if events.is_empty() {
        return Err(InsightCliError::NoEvents);
    }

    let mut engine = open_engine(args)?;
    let imported = engine.import_events(events)?;
    log::info!("Imported {imported} events into {}", args.store.display());

    let report = ImportReport {
        imported,
        total_events: engine.events().len(),
    };
    emit(&report, format)
}

fn cmd_sessions(args: &EngineArgs, all: bool, format: OutputFormat) -> Result<(), InsightCliError> {
    let engine = open_engine(args)?;
    let sessions = if all {
        engine.sessions()
    } else {
        engine.window_sessions(engine.now())
    };

    let average_duration_ms = aac_insight::analytics::segmenter::average_duration_ms(&sessions);
    let report = SessionsReport {
        scope: if all { "all" } else { "window" },
        count: sessions.len(),
        average_duration_ms,
        sessions,
    };
    emit(&report, format)
}

fn cmd_analyze(args: &EngineArgs, format: OutputFormat) -> Result<(), InsightCliError> {
    let mut engine = open_engine(args)?;
    let outcome = engine.run_analysis();

    let report = AnalyzeReport {
        outcome,
        pattern: engine.current_pattern(),
        recommendations: engine.current_recommendations(),
    };
    emit(&report, format)
}

fn cmd_apply(
    args: &EngineArgs,
    settings_path: &Path,
    id: Option<&str>,
    batch: bool,
    priorities: &[Priority],
    format: OutputFormat,
) -> Result<(), InsightCliError> {
    let id = match (id, batch) {
        (Some(id), _) => Some(id),
        (None, true) => None,
        (None, false) => return Err(InsightCliError::NoSelection),
    };

    let mut settings = BoardSettings::load_or_default(settings_path)?;
    let mut engine = open_engine(args)?;
    engine.run_analysis();

    let summary = match id {
        Some(id) => engine.apply_recommendation(id, &mut settings),
        None => engine.apply_recommendations(priorities, &mut settings),
    };

    match &summary.status {
        ApplyStatus::Applied => write_atomically(settings_path, settings.to_json()?.as_bytes())?,
        ApplyStatus::NothingToApply => {}
        ApplyStatus::NotFound => {
            return Err(InsightCliError::UnknownRecommendation(
                id.unwrap_or_default().to_string(),
            ))
        }
        ApplyStatus::Rejected(reason) => return Err(InsightCliError::Rejected(reason.clone())),
        ApplyStatus::Busy => return Err(InsightCliError::Busy),
    }

    let report = ApplyReport {
        summary: &summary,
        settings: &settings,
    };
    emit(&report, format)
}

fn cmd_doctor(args: &EngineArgs, format: OutputFormat) -> Result<(), InsightCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("aac-insight version {}", AAC_INSIGHT_VERSION),
    });

    let config = match load_config(args) {
        Ok(config) => {
            checks.push(DoctorCheck::ok("config", "Configuration valid"));
            config
        }
        Err(e) => {
            checks.push(DoctorCheck::error("config", format!("Invalid configuration: {}", e)));
            EngineConfig::default()
        }
    };

    let mut event_count = 0;
    let mut last_event = None;

    match FileStore::open(&args.store) {
        Ok(store) => match store.load(&config.storage_key) {
            Ok(None) => checks.push(DoctorCheck {
                name: "event_log".to_string(),
                status: CheckStatus::Warning,
                message: format!("No event log under {}", store.path_for(&config.storage_key).display()),
            }),
            Ok(Some(bytes)) => match decode_events(&bytes) {
                Ok(events) => {
                    checks.push(DoctorCheck::ok(
                        "event_log",
                        format!("Event log readable ({} events)", events.len()),
                    ));
                    let out_of_order = events
                        .windows(2)
                        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
                        .count();
                    if out_of_order == 0 {
                        checks.push(DoctorCheck::ok("ordering", "Timestamps are non-decreasing"));
                    } else {
                        checks.push(DoctorCheck::error(
                            "ordering",
                            format!("{} events precede their predecessor", out_of_order),
                        ));
                    }
                    event_count = events.len();
                    last_event = events.last().cloned();
                }
                Err(e) => checks.push(DoctorCheck::error(
                    "event_log",
                    format!("Event log unreadable; the engine will start empty: {}", e),
                )),
            },
            Err(e) => checks.push(DoctorCheck::error(
                "event_log",
                format!("Cannot read event log: {}", e),
            )),
        },
        Err(e) => checks.push(DoctorCheck::error(
            "store",
            format!("Cannot open store {}: {}", args.store.display(), e),
        )),
    }

    // Interactive use vs piped import
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)")
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (import - ready)")
    };
    checks.push(stdin_check);

    let has_errors = checks.iter().any(|c| matches!(c.status, CheckStatus::Error));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: AAC_INSIGHT_VERSION.to_string(),
        store: args.store.display().to_string(),
        event_count,
        last_event,
        checks,
    };
    emit(&report, format)?;

    if has_errors {
        Err(InsightCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_export(
    args: &EngineArgs,
    output: &Path,
    export_format: InputFormat,
) -> Result<(), InsightCliError> {
    let engine = open_engine(args)?;
    let events = engine.events();

    let data = match export_format {
        InputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::with_capacity(events.len());
            for event in events {
                lines.push(serde_json::to_string(event)?);
            }
            if lines.is_empty() {
                String::new()
            } else {
                lines.join("\n") + "\n"
            }
        }
        InputFormat::Json => serde_json::to_string(events)?,
    };

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Helper functions

fn load_config(args: &EngineArgs) -> Result<EngineConfig, InsightCliError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(gap) = args.session_gap_ms {
        config.session_gap_ms = gap;
    }
    if let Some(hours) = args.window_hours {
        config.analysis_window_hours = hours;
    }
    if let Some(min) = args.min_events {
        config.min_events_for_analysis = min;
    }
    if let Some(minutes) = args.utc_offset_minutes {
        config.utc_offset_minutes = Some(minutes);
    }
    config.validate()?;
    Ok(config)
}

fn open_engine(args: &EngineArgs) -> Result<AnalyticsEngine<FileStore>, InsightCliError> {
    let config = load_config(args)?;
    let store = FileStore::open(&args.store)?;
    let mut engine = AnalyticsEngine::open(store, config)?;
    if let Some(warning) = engine.take_load_warning() {
        log::warn!(
            "Event log {} could not be read and was reset: {}",
            warning.key,
            warning.message
        );
    }
    Ok(engine)
}

fn parse_ndjson(data: &str) -> Result<Vec<InteractionEvent>, InsightCliError> {
    let mut events = Vec::new();
    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: InteractionEvent = serde_json::from_str(trimmed).map_err(|e| {
            InsightCliError::ParseError(format!("Line {}: {}", line_no + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), InsightCliError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), InsightCliError> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{}", text);
    Ok(())
}

// Error types

#[derive(Debug)]
enum InsightCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    ParseError(String),
    NoEvents,
    NoSelection,
    NotPersisted(u64),
    UnknownRecommendation(String),
    Rejected(String),
    Busy,
    DoctorFailed,
}

impl From<io::Error> for InsightCliError {
    fn from(e: io::Error) -> Self {
        InsightCliError::Io(e)
    }
}

impl From<AnalyticsError> for InsightCliError {
    fn from(e: AnalyticsError) -> Self {
        InsightCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for InsightCliError {
    fn from(e: serde_json::Error) -> Self {
        InsightCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<InsightCliError> for CliError {
    fn from(e: InsightCliError) -> Self {
        match e {
            InsightCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            InsightCliError::Analytics(AnalyticsError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Check --config and the tuning flags".to_string()),
            },
            InsightCliError::Analytics(e) => CliError {
                code: "ANALYTICS_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'aac-insight doctor' for details".to_string()),
            },
            InsightCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            InsightCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one {timestamp, type, data} event".to_string()),
            },
            InsightCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            InsightCliError::NoSelection => CliError {
                code: "NO_SELECTION".to_string(),
                message: "Nothing selected to apply".to_string(),
                hint: Some("Pass --id <ID> or --batch".to_string()),
            },
            InsightCliError::NotPersisted(count) => CliError {
                code: "NOT_PERSISTED".to_string(),
                message: format!("{} event writes failed", count),
                hint: Some("Check that the store directory is writable".to_string()),
            },
            InsightCliError::UnknownRecommendation(id) => CliError {
                code: "RECOMMENDATION_NOT_FOUND".to_string(),
                message: format!("No active recommendation with id '{}'", id),
                hint: Some("Run 'aac-insight analyze' to list active recommendations".to_string()),
            },
            InsightCliError::Rejected(reason) => CliError {
                code: "SETTINGS_REJECTED".to_string(),
                message: reason,
                hint: Some("The settings file was left unchanged".to_string()),
            },
            InsightCliError::Busy => CliError {
                code: "BUSY".to_string(),
                message: "An analysis cycle is in flight".to_string(),
                hint: Some("Retry once the cycle completes".to_string()),
            },
            InsightCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct RecordReport<'a> {
    recorded: Option<&'a InteractionEvent>,
    total_events: usize,
}

#[derive(Serialize)]
struct ImportReport {
    imported: usize,
    total_events: usize,
}

#[derive(Serialize)]
struct SessionsReport {
    scope: &'static str,
    count: usize,
    average_duration_ms: f64,
    sessions: Vec<Session>,
}

#[derive(Serialize)]
struct AnalyzeReport<'a> {
    outcome: AnalysisOutcome,
    pattern: Option<&'a BehaviorPattern>,
    recommendations: &'a [Recommendation],
}

#[derive(Serialize)]
struct ApplyReport<'a> {
    summary: &'a ApplySummary,
    settings: &'a BoardSettings,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    store: String,
    event_count: usize,
    last_event: Option<InteractionEvent>,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
