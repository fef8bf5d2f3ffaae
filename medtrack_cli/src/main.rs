use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use medtrack_core::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Personal medication dose tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every medication and when it may next be taken (default)
    Status,

    /// Start tracking a medication
    AddMed {
        name: String,

        /// Minimum hours between doses
        #[arg(long)]
        min_interval: Option<u32>,

        /// Maximum doses in any 24-hour window
        #[arg(long)]
        max_per_day: Option<u32>,
    },

    /// Take a dose now, if the medication's limits allow it
    Take {
        med_id: MedicationId,

        /// Only report eligibility, don't record anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a dose taken in the past (UTC, e.g. 2024-03-10T08:30)
    AddPast {
        med_id: MedicationId,
        timestamp: String,
    },

    /// Show all doses of a medication
    History { med_id: MedicationId },

    /// Change when a dose was taken (UTC, e.g. 2024-03-10T08:30)
    EditDose { dose_id: DoseId, timestamp: String },

    /// Delete a single dose
    DeleteDose { dose_id: DoseId },

    /// Delete a medication and all its history
    DeleteMed { med_id: MedicationId },

    /// Export the dose history as CSV
    Export {
        /// Output file (defaults to <data-dir>/doses.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rewrite the journal without deleted or superseded entries
    Compact,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        medtrack_core::logging::init();
    } else {
        medtrack_core::logging::init_with_level("warn");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let tracker = Tracker::open(&data_dir);
    let now = utc_now();

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => cmd_status(&tracker, now),
        Commands::AddMed {
            name,
            min_interval,
            max_per_day,
        } => cmd_add_med(&tracker, &config, &name, min_interval, max_per_day),
        Commands::Take { med_id, dry_run } => cmd_take(&tracker, med_id, dry_run, now),
        Commands::AddPast { med_id, timestamp } => {
            let taken_at = parse_timestamp(&timestamp)?;
            if taken_at > now {
                tracing::warn!("Recording a dose in the future: {}", taken_at);
            }
            let dose = tracker.add_past_dose(med_id, taken_at)?;
            println!("✓ Past dose {} recorded at {}", dose.id, format_time(dose.taken_at));
            Ok(())
        }
        Commands::History { med_id } => cmd_history(&tracker, med_id, now),
        Commands::EditDose { dose_id, timestamp } => {
            let taken_at = parse_timestamp(&timestamp)?;
            let dose = tracker.edit_dose(dose_id, taken_at)?;
            println!("✓ Dose {} moved to {}", dose.id, format_time(dose.taken_at));
            Ok(())
        }
        Commands::DeleteDose { dose_id } => {
            let dose = tracker.delete_dose(dose_id)?;
            println!("✓ Deleted dose {} ({})", dose.id, format_time(dose.taken_at));
            Ok(())
        }
        Commands::DeleteMed { med_id } => {
            let (medication, doses) = tracker.delete_medication(med_id)?;
            println!(
                "✓ Deleted {} and {} recorded doses",
                medication.name, doses
            );
            Ok(())
        }
        Commands::Export { output } => {
            let path = output.unwrap_or_else(|| data_dir.join("doses.csv"));
            let count = export_csv(&tracker.ledger()?, &path)?;
            println!("✓ Exported {} doses to CSV", count);
            println!("  CSV: {}", path.display());
            Ok(())
        }
        Commands::Compact => {
            let report = tracker.compact()?;
            println!(
                "✓ Compacted journal: {} -> {} entries",
                report.entries_before, report.entries_after
            );
            Ok(())
        }
    }
}

fn cmd_status(tracker: &Tracker, now: NaiveDateTime) -> Result<()> {
    let statuses = tracker.statuses(now)?;

    println!("Server time: {} UTC", now.format("%Y-%m-%d %H:%M:%S"));
    println!();

    if statuses.is_empty() {
        println!("No medications tracked yet. Add one with `medtrack add-med <NAME>`.");
        return Ok(());
    }

    let name_width = statuses
        .iter()
        .map(|s| s.medication.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());

    println!(
        "  {:<4}  {:<name_width$}  {:>12}  {:>9}  {:<16}  Next Allowed",
        "ID", "Name", "Min Interval", "Max/Day", "Last Taken"
    );
    for status in &statuses {
        let last = status
            .last_dose
            .as_ref()
            .map(|d| format_time(d.taken_at))
            .unwrap_or_else(|| "Never".to_string());
        println!(
            "  {:<4}  {:<name_width$}  {:>11}h  {:>9}  {:<16}  {}",
            status.medication.id.to_string(),
            status.medication.name,
            status.medication.policy.min_interval_hours,
            status.medication.policy.max_doses_per_day,
            last,
            status.display
        );
    }

    Ok(())
}

fn cmd_add_med(
    tracker: &Tracker,
    config: &Config,
    name: &str,
    min_interval: Option<u32>,
    max_per_day: Option<u32>,
) -> Result<()> {
    let policy = config.defaults.policy(min_interval, max_per_day)?;
    let medication = tracker.add_medication(name, policy)?;

    println!("✓ Added {} as {}", medication.name, medication.id);
    println!(
        "  Min interval: {}h, max doses per 24h: {}",
        policy.min_interval_hours, policy.max_doses_per_day
    );
    Ok(())
}

fn cmd_take(
    tracker: &Tracker,
    med_id: MedicationId,
    dry_run: bool,
    now: NaiveDateTime,
) -> Result<()> {
    if dry_run {
        let eligibility = tracker.check_dose(med_id, now)?;
        let display = NextDoseDisplay::new(eligibility.next_allowed, now);
        if eligibility.is_eligible() {
            println!("Dose allowed now");
        } else {
            let wait = eligibility.wait();
            println!(
                "{}: next dose {} (in {}h {:02}m)",
                eligibility.constraint.refusal(),
                display,
                wait.num_hours(),
                wait.num_minutes() % 60
            );
        }
        println!("\n[Dry run - not logging dose]");
        return Ok(());
    }

    let dose = tracker.take_dose(med_id, now)?;
    println!("✓ Dose {} recorded at {}", dose.id, format_time(dose.taken_at));
    Ok(())
}

fn cmd_history(tracker: &Tracker, med_id: MedicationId, now: NaiveDateTime) -> Result<()> {
    let history = tracker.history(med_id, now)?;

    println!("Dose history for {}", history.status.medication.name);
    println!(
        "You can take this medication again {}",
        history.status.display.sentence()
    );
    println!();

    if history.doses.is_empty() {
        println!("No doses recorded for this medication.");
        return Ok(());
    }

    println!("  {:<6}  Timestamp (UTC)", "Dose");
    for dose in &history.doses {
        println!(
            "  {:<6}  {}",
            dose.id.to_string(),
            dose.taken_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn format_time(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}
