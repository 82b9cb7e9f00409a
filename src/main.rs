use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use smart_button::config::DEFAULT_TIMEZONE;
use smart_button::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound on advancer calls while listing occurrences
const MAX_LOOKAHEAD: usize = 1000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// IANA time zone, overrides the document's "tz"
    #[arg(long, global = true)]
    tz: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the upcoming occurrences of every event
    Next {
        /// Events document
        file: PathBuf,
        /// Local time to start from (YYYY-MM-DD HH:MM:SS), defaults to now
        #[arg(short, long, value_parser = parse_local)]
        at: Option<NaiveDateTime>,
        /// Occurrences listed per event
        #[arg(short, long, default_value_t = 5)]
        count: usize,
    },
    /// Validate an events document
    Check {
        /// Events document
        file: PathBuf,
    },
    /// Replay a stretch of time and print every notification
    Simulate {
        /// Events document
        file: PathBuf,
        /// Local start time (YYYY-MM-DD HH:MM:SS)
        #[arg(long, value_parser = parse_local)]
        from: NaiveDateTime,
        /// Local end time (YYYY-MM-DD HH:MM:SS)
        #[arg(long, value_parser = parse_local)]
        to: NaiveDateTime,
        /// Simulated poll interval in seconds
        #[arg(short, long, default_value_t = 60)]
        step: u32,
    },
}

fn parse_local(value: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("expected YYYY-MM-DD HH:MM[:SS]: {e}"))
}

fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("smart_button=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    match cli.command {
        Commands::Next { file, at, count } => {
            let document = load(&file)?;
            let zone = resolve_zone(cli.tz.as_deref(), &document)?;
            let at = match at {
                Some(at) => CalendarDateTime::from(at),
                None => CalendarDateTime::from_instant(SystemClock.now(), &zone),
            };
            list_next(&document, &zone, at, count);
        }
        Commands::Check { file } => {
            let document = load(&file)?;
            let zone = resolve_zone(cli.tz.as_deref(), &document)?;
            check(&document, &zone);
        }
        Commands::Simulate { file, from, to, step } => {
            if step == 0 {
                return Err(eyre!("step must be at least one second"));
            }
            let document = load(&file)?;
            let zone = resolve_zone(cli.tz.as_deref(), &document)?;
            simulate(document, &zone, from, to, step)?;
        }
    }

    Ok(())
}

fn load(file: &Path) -> Result<ParsedDocument> {
    load_events_file(file).wrap_err_with(|| format!("loading {}", file.display()))
}

/// Flag first, then the document, then the built-in zone
fn resolve_zone(flag: Option<&str>, document: &ParsedDocument) -> Result<LocalZone> {
    let name = flag
        .or(document.timezone.as_deref())
        .unwrap_or(DEFAULT_TIMEZONE);
    debug!("Using time zone {}", name);
    Ok(name.parse()?)
}

/// Print the next `count` firing occurrences of each event
#[instrument(skip(document, zone))]
fn list_next(document: &ParsedDocument, zone: &LocalZone, at: CalendarDateTime, count: usize) {
    let at = at.normalized(zone);
    println!("Occurrences after {} ({})", at, zone.as_str());

    for definition in &document.definitions {
        println!("{} [{}]", definition.description, definition.frequency);

        let mut next = advance(&definition.start, definition.frequency, &at, zone);
        let mut listed = 0;
        for _ in 0..MAX_LOOKAHEAD {
            if listed == count || next.is_expired_sentinel() {
                break;
            }
            let occurrence = next.normalized(zone);
            if definition
                .end
                .is_some_and(|end| occurrence.to_instant(zone) >= end.to_instant(zone))
            {
                break;
            }
            if is_excluded(definition.exclude, occurrence.weekday) {
                debug!("Skipping excluded {}", occurrence);
            } else {
                println!("  {}", occurrence);
                listed += 1;
            }
            next = advance(&next, definition.frequency, &occurrence, zone);
        }

        if listed == 0 {
            println!("  (no future occurrences)");
        }
    }
}

fn check(document: &ParsedDocument, zone: &LocalZone) {
    println!("Time zone: {}", zone.as_str());
    for definition in &document.definitions {
        println!(
            "OK   {:<30} {:<8} from {}{} pattern {:?} color {:#010x}",
            definition.description,
            definition.frequency.to_string(),
            definition.start.normalized(zone),
            definition
                .end
                .map(|end| format!(" until {}", end.normalized(zone)))
                .unwrap_or_default(),
            definition.pattern,
            definition.color.to_wire()
        );
    }
    if document.skipped > 0 {
        warn!("{} records were skipped", document.skipped);
    }
    println!(
        "{} events valid, {} skipped",
        document.definitions.len(),
        document.skipped
    );
}

/// Step the detector over simulated time and print what it dispatches
#[instrument(skip(document, zone))]
fn simulate(
    document: ParsedDocument,
    zone: &LocalZone,
    from: NaiveDateTime,
    to: NaiveDateTime,
    step: u32,
) -> Result<()> {
    let settings = Settings::default();
    if f64::from(step) > settings.detection_window_secs {
        warn!(
            "Step of {}s exceeds the {}s detection window, occurrences may be missed",
            step, settings.detection_window_secs
        );
    }

    let start = CalendarDateTime::from(from).to_instant(zone);
    let end = CalendarDateTime::from(to).to_instant(zone);

    let mut store = EventStore::new();
    let loaded_at = CalendarDateTime::from_instant(start, zone);
    for definition in document.definitions {
        store.insert(definition, &loaded_at, zone)?;
    }
    info!("Simulating {} events", store.len());

    // Drained after every step, so one slot per event is enough
    let (dispatcher, mut rx) = dispatch_channel(store.len().max(1));
    let mut fired = 0;
    let mut now = start;
    while now <= end {
        let local_now = CalendarDateTime::from_instant(now, zone);
        scan(&mut store, &local_now, settings.detection_window_secs, zone, &dispatcher);
        while let Ok(message) = rx.try_recv() {
            fired += 1;
            println!(
                "{}  #{} {}",
                message.occurred_at,
                message.event_id,
                message.speech_text()
            );
        }
        now += i64::from(step);
    }

    println!("{} notifications", fired);
    Ok(())
}
