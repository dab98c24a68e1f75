use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use medtrack_core::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_ROUTINE: &str = "I wake up around 7 AM, work from 9 AM to 5 PM, have dinner at 7 PM, and go to bed around 11 PM.";
const MIN_ROUTINE_LEN: usize = 10;
const CHART_WIDTH: u32 = 24;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication adherence tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List medications with their next dose (default)
    List,

    /// Add a medication
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        dosage: String,

        /// pill, liquid, injection or other
        #[arg(long, default_value = "pill")]
        form: String,

        /// Time of day (HH:MM); repeat or comma-separate for several
        #[arg(long = "time", required = true, value_delimiter = ',')]
        times: Vec<String>,

        /// Weekday indices for a weekly schedule (0 = Sunday)
        #[arg(long, value_delimiter = ',', conflicts_with = "interval_days")]
        weekly_days: Option<Vec<u8>>,

        /// Repeat every N days
        #[arg(long)]
        interval_days: Option<u32>,

        #[arg(long)]
        instructions: Option<String>,
    },

    /// Log a dose as taken
    Take {
        /// Medication id, id prefix or name
        medication: String,
    },

    /// Log a dose as skipped
    Skip {
        /// Medication id, id prefix or name
        medication: String,
    },

    /// Show the adherence percentage and daily chart
    Stats {
        /// Trailing window for the percentage
        #[arg(long)]
        window_days: Option<u32>,

        /// Days shown in the chart
        #[arg(long)]
        chart_days: Option<u32>,
    },

    /// Ask the model for a better schedule for one medication
    Suggest {
        /// Medication id, id prefix or name
        medication: String,

        /// Description of your daily routine
        #[arg(long, default_value = DEFAULT_ROUTINE)]
        routine: String,

        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Generate synthetic history for the current medications
    Seed {
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Probability that a dose was taken
        #[arg(long, default_value_t = medtrack_core::seed::DEFAULT_ADHERENCE_RATE)]
        rate: f64,

        /// RNG seed for reproducible history
        #[arg(long)]
        seed: Option<u64>,

        /// Add the sample medications first
        #[arg(long)]
        samples: bool,
    },

    /// Delete a medication (its dose history is kept)
    Remove {
        /// Medication id, id prefix or name
        medication: String,
    },
}

fn main() {
    medtrack_core::logging::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let mut tracker = Tracker::open(FileRepository::new(&data_dir))?;
    tracing::debug!("Using data directory {:?}", data_dir);

    match cli.command {
        None | Some(Commands::List) => cmd_list(&tracker),
        Some(Commands::Add {
            name,
            dosage,
            form,
            times,
            weekly_days,
            interval_days,
            instructions,
        }) => {
            let kind = match (weekly_days, interval_days) {
                (Some(days), _) => ScheduleKind::Weekly { days },
                (None, Some(interval_days)) => ScheduleKind::Interval { interval_days },
                (None, None) => ScheduleKind::Daily,
            };
            let input = NewMedication {
                name,
                dosage,
                form: form.parse()?,
                kind,
                times,
                instructions,
            };
            cmd_add(&mut tracker, input)
        }
        Some(Commands::Take { medication }) => cmd_log(&mut tracker, &medication, DoseStatus::Taken),
        Some(Commands::Skip { medication }) => cmd_log(&mut tracker, &medication, DoseStatus::Skipped),
        Some(Commands::Stats {
            window_days,
            chart_days,
        }) => cmd_stats(
            &tracker,
            window_days.unwrap_or(config.adherence.window_days),
            chart_days.unwrap_or(config.adherence.chart_days),
        ),
        Some(Commands::Suggest {
            medication,
            routine,
            timeout_secs,
        }) => {
            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.suggestion.timeout());
            cmd_suggest(&tracker, &config, &medication, &routine, timeout)
        }
        Some(Commands::Seed {
            days,
            rate,
            seed,
            samples,
        }) => cmd_seed(&mut tracker, days, rate, seed, samples),
        Some(Commands::Remove { medication }) => cmd_remove(&mut tracker, &medication),
    }
}

fn cmd_list<R: Repository>(tracker: &Tracker<R>) -> Result<()> {
    if tracker.medications().is_empty() {
        println!("No medications yet. Add one with `medtrack add`.");
        return Ok(());
    }

    let now = Local::now();
    for (medication, next) in tracker.next_doses(&now) {
        display_medication(medication, &next);
    }
    Ok(())
}

fn cmd_add<R: Repository>(tracker: &mut Tracker<R>, input: NewMedication) -> Result<()> {
    let medication = tracker.add_medication(input)?;
    println!("✓ {} has been added to your schedule.", medication.name);
    display_medication(&medication, &next_dose(&medication.schedule, &Local::now()));
    Ok(())
}

fn cmd_log<R: Repository>(tracker: &mut Tracker<R>, query: &str, status: DoseStatus) -> Result<()> {
    let id = resolve_medication(tracker, query)?;
    let log = tracker.log_dose(id, status, Utc::now())?;

    let name = tracker
        .medication(id)
        .map(|m| m.name.as_str())
        .unwrap_or("medication");
    let local = log.action_time.with_timezone(&Local);
    match status {
        DoseStatus::Taken => println!("✓ {} taken at {}", name, local.format("%H:%M")),
        DoseStatus::Skipped => println!("– {} skipped at {}", name, local.format("%H:%M")),
    }
    Ok(())
}

fn cmd_stats<R: Repository>(tracker: &Tracker<R>, window_days: u32, chart_days: u32) -> Result<()> {
    let now = Local::now();
    let stats = tracker.stats(now.with_timezone(&Utc), window_days);

    println!("Adherence (last {} days): {}%", window_days, stats.adherence_percentage);
    println!(
        "  Taken {} · Skipped {} · Total {}",
        stats.taken_doses, stats.skipped_doses, stats.total_doses
    );
    println!();
    println!("Last {} days", chart_days);

    let series = tracker.daily_series(&now, chart_days);
    let max_total = series.iter().map(DailyAdherence::total).max().unwrap_or(0);
    for day in &series {
        println!(
            "  {} {:<width$} {}/{}",
            day.date.format("%a"),
            bar(day, max_total),
            day.taken,
            day.skipped,
            width = CHART_WIDTH as usize
        );
    }
    Ok(())
}

/// Stacked bar: taken as solid blocks, skipped as shaded blocks
fn bar(day: &DailyAdherence, max_total: u32) -> String {
    if max_total == 0 {
        return String::new();
    }
    let scale = |n: u32| ((n * CHART_WIDTH) as f64 / max_total as f64).round() as usize;
    format!("{}{}", "█".repeat(scale(day.taken)), "░".repeat(scale(day.skipped)))
}

fn cmd_suggest<R: Repository>(
    tracker: &Tracker<R>,
    config: &Config,
    query: &str,
    routine: &str,
    timeout: Duration,
) -> Result<()> {
    if routine.trim().len() < MIN_ROUTINE_LEN {
        return Err(Error::validation(
            "routine",
            "please describe your daily routine in a bit more detail",
        ));
    }

    let id = resolve_medication(tracker, query)?;
    let medication = tracker
        .medication(id)
        .ok_or_else(|| Error::NotFound(format!("medication {}", id)))?;
    let logs: Vec<DoseLog> = tracker.logs_for(id).cloned().collect();
    let request = SuggestionRequest::for_medication(medication, &logs, routine);

    let client = SuggestionClient::new(GeminiBackend::from_config(&config.suggestion)?)
        .with_timeout(timeout);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    println!("Generating a schedule for {}...", medication.name);
    let suggestion = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        client.suggest_with_cancel(&request, &cancel).await
    })?;

    println!();
    println!("Suggested schedule");
    println!("  {}", suggestion.suggested_schedule);
    println!();
    println!("Why");
    println!("  {}", suggestion.explanation);
    Ok(())
}

fn cmd_seed<R: Repository>(
    tracker: &mut Tracker<R>,
    days: u32,
    rate: f64,
    seed: Option<u64>,
    samples: bool,
) -> Result<()> {
    if samples {
        let imported = tracker.import_medications(get_sample_medications())?;
        println!("✓ Added {} sample medications", imported);
    }

    if tracker.medications().is_empty() {
        return Err(Error::Other(
            "no medications to seed history for (try --samples)".into(),
        ));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let logs = seed_history(tracker.medications(), &Local::now(), days, rate, &mut rng)?;
    let count = tracker.record_logs(logs)?;
    println!("✓ Seeded {} dose logs over {} days", count, days);
    Ok(())
}

fn cmd_remove<R: Repository>(tracker: &mut Tracker<R>, query: &str) -> Result<()> {
    let id = resolve_medication(tracker, query)?;
    let removed = tracker.remove_medication(id)?;
    println!("✓ Removed {}", removed.name);
    Ok(())
}

/// Match a medication by full id, id prefix, or case-insensitive name
fn resolve_medication<R: Repository>(tracker: &Tracker<R>, query: &str) -> Result<Uuid> {
    let query = query.trim();
    if let Ok(id) = Uuid::parse_str(query) {
        if tracker.medication(id).is_some() {
            return Ok(id);
        }
    }

    let lowered = query.to_lowercase();
    let matches: Vec<&Medication> = tracker
        .medications()
        .iter()
        .filter(|m| {
            m.name.to_lowercase() == lowered
                || (!lowered.is_empty() && m.id.to_string().starts_with(&lowered))
        })
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.id),
        [] => Err(Error::NotFound(format!("no medication matches '{}'", query))),
        _ => Err(Error::validation(
            "medication",
            format!("'{}' matches {} medications; use the id", query, matches.len()),
        )),
    }
}

fn display_medication(medication: &Medication, next: &DateTime<Local>) {
    println!(
        "{} {} ({}, {})  [{}]",
        medication.name,
        medication.dosage,
        medication.form,
        medication.schedule.kind.label(),
        short_id(medication.id)
    );
    println!("  {}", medication.schedule.describe());
    println!(
        "  Next dose: {} ({})",
        next.format("%-I:%M %p"),
        next.format("%b %-d")
    );
    if let Some(ref instructions) = medication.instructions {
        println!("  ℹ {}", instructions);
    }
    println!();
}

fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
