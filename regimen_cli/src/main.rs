mod store;

use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone};
use clap::{Parser, Subcommand};
use regimen_core::*;
use std::io;
use std::path::PathBuf;
use store::ItemStore;

#[derive(Parser)]
#[command(name = "regimen")]
#[command(about = "Medication schedule tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretend the current time is this ISO-8601 instant
    #[arg(long, global = true)]
    at: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of every item (default)
    Status,

    /// Start tracking an item
    Add {
        /// Display name
        name: String,

        #[command(flatten)]
        definition: Definition,
    },

    /// Change an item's definition, keeping its history
    Update {
        /// Item id or name
        item: String,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        definition: Definition,
    },

    /// Stop tracking an item
    Remove {
        /// Item id or name
        item: String,
    },

    /// Record a dose as taken
    Take {
        /// Item id or name
        item: String,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Record a dose as skipped
    Skip {
        /// Item id or name
        item: String,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// List recorded doses in a time range
    History {
        /// Range start (default: seven days ago)
        #[arg(long)]
        from: Option<String>,

        /// Range end (default: now)
        #[arg(long)]
        to: Option<String>,
    },

    /// Export every recorded dose as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Item definition flags shared by `add` and `update`
#[derive(clap::Args)]
struct Definition {
    /// Dosage description, e.g. "500mg"
    #[arg(long)]
    dosage: Option<String>,

    /// daily, weekly, monthly or as_needed
    #[arg(long)]
    frequency: Option<Frequency>,

    /// Time of day in HH:MM (repeatable)
    #[arg(long = "time")]
    times: Vec<String>,

    /// First active day or instant
    #[arg(long)]
    from: Option<ActiveBound>,

    /// Last active day or instant
    #[arg(long)]
    until: Option<ActiveBound>,

    /// Free-text notes
    #[arg(long)]
    notes: Option<String>,
}

impl Definition {
    /// Apply these flags over an existing label and rule.
    fn apply(self, mut label: ItemLabel, rule: &RecurrenceRule) -> Result<(ItemLabel, RecurrenceRule)> {
        if let Some(dosage) = self.dosage {
            label.dosage = dosage;
        }
        if let Some(notes) = self.notes {
            label.notes = notes;
        }

        let frequency = self.frequency.unwrap_or(rule.frequency);
        let mut updated = if self.times.is_empty() {
            RecurrenceRule {
                frequency,
                ..rule.clone()
            }
        } else {
            RecurrenceRule {
                active_from: rule.active_from.clone(),
                active_until: rule.active_until.clone(),
                ..RecurrenceRule::new(frequency, &self.times)?
            }
        };
        if let Some(from) = self.from {
            updated.active_from = Some(from);
        }
        if let Some(until) = self.until {
            updated.active_until = Some(until);
        }

        Ok((label, updated))
    }
}

struct Context {
    store: ItemStore,
    schedule: ScheduleConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    regimen_core::logging::init_for_verbosity(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    let ctx = Context {
        store: ItemStore::new(data_dir),
        schedule: config.schedule.clone(),
    };

    // Local calendar unless a clock override carries its own offset
    match &cli.at {
        Some(at) => {
            let now = parse_instant(at)?;
            run(cli.command, &ctx, now)
        }
        None => run(cli.command, &ctx, Local::now()),
    }
}

fn run<Tz: TimeZone>(command: Option<Commands>, ctx: &Context, now: DateTime<Tz>) -> Result<()> {
    match command {
        Some(Commands::Status) | None => cmd_status(ctx, &now),
        Some(Commands::Add { name, definition }) => cmd_add(ctx, name, definition),
        Some(Commands::Update {
            item,
            name,
            definition,
        }) => cmd_update(ctx, &item, name, definition),
        Some(Commands::Remove { item }) => cmd_remove(ctx, &item),
        Some(Commands::Take { item, notes }) => cmd_record(ctx, &item, Outcome::Taken, &now, &notes),
        Some(Commands::Skip { item, notes }) => {
            cmd_record(ctx, &item, Outcome::Skipped, &now, &notes)
        }
        Some(Commands::History { from, to }) => cmd_history(ctx, &now, from, to),
        Some(Commands::Export { output }) => cmd_export(ctx, output),
    }
}

fn cmd_status<Tz: TimeZone>(ctx: &Context, now: &DateTime<Tz>) -> Result<()> {
    let mut loaded = ctx.store.load(&ctx.schedule)?;
    store::warn_rejected(&loaded.failures);

    if loaded.registry.is_empty() {
        println!("No items tracked yet. Add one with `regimen add <name>`.");
        return Ok(());
    }

    let changes = loaded.registry.evaluate_all(now);

    println!(
        "{:<20} {:<9} {:<17} {:<17} {:>9}",
        "NAME", "STATUS", "NEXT DUE", "LAST TAKEN", "ADHERENCE"
    );
    for item in loaded.registry.iter() {
        println!(
            "{:<20} {:<9} {:<17} {:<17} {:>8.0}%",
            item.label().name,
            item.current_status().as_str(),
            format_instant(item.next_due(), now),
            format_instant(item.ledger().last_taken(), now),
            item.ledger().adherence_rate()
        );
    }

    for change in &changes {
        let event = serde_json::json!({
            "event": change.event_name(),
            "data": change.payload(),
        });
        println!("{}", event);
    }

    Ok(())
}

fn cmd_add(ctx: &Context, name: String, definition: Definition) -> Result<()> {
    let frequency = definition.frequency.unwrap_or(Frequency::Daily);
    let rule = RecurrenceRule::new(frequency, Vec::<String>::new())?;
    let (label, rule) = definition.apply(ItemLabel::new(name, ""), &rule)?;

    let name = label.name.clone();
    let id = ctx
        .store
        .update(&ctx.schedule, |registry| Ok(registry.add(label, rule)))?;

    println!("✓ Tracking {} ({})", name, id);
    Ok(())
}

fn cmd_update(
    ctx: &Context,
    key: &str,
    name: Option<String>,
    definition: Definition,
) -> Result<()> {
    let name = ctx.store.update(&ctx.schedule, |registry| {
        let item = registry.resolve(key)?;
        let id = item.id().to_string();

        let mut label = item.label().clone();
        if let Some(name) = name {
            label.name = name;
        }
        let (label, rule) = definition.apply(label, item.rule())?;
        let name = label.name.clone();

        registry.update(&id, label, rule)?;
        Ok(name)
    })?;

    println!("✓ Updated {}", name);
    Ok(())
}

fn cmd_remove(ctx: &Context, key: &str) -> Result<()> {
    let removed = ctx
        .store
        .update(&ctx.schedule, |registry| registry.remove(key))?;

    println!(
        "✓ Removed {} ({} doses in history)",
        removed.label().name,
        removed.ledger().len()
    );
    Ok(())
}

fn cmd_record<Tz: TimeZone>(
    ctx: &Context,
    key: &str,
    outcome: Outcome,
    now: &DateTime<Tz>,
    notes: &str,
) -> Result<()> {
    let (name, evaluation) = ctx.store.update(&ctx.schedule, |registry| {
        let evaluation = registry.record(key, outcome, now, notes)?;
        let name = registry.resolve(key)?.label().name.clone();
        Ok((name, evaluation))
    })?;

    let verb = match outcome {
        Outcome::Taken => "Taken",
        Outcome::Skipped => "Skipped",
    };
    println!("✓ {}: {} at {}", verb, name, now.naive_local().format("%Y-%m-%d %H:%M"));
    println!("  Status: {}", evaluation.status);
    Ok(())
}

fn cmd_history<Tz: TimeZone>(
    ctx: &Context,
    now: &DateTime<Tz>,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let end = match to {
        Some(to) => parse_instant(&to)?,
        None => now.fixed_offset(),
    };
    let start = match from {
        Some(from) => parse_instant(&from)?,
        None => end - Duration::days(7),
    };

    let loaded = ctx.store.load(&ctx.schedule)?;
    store::warn_rejected(&loaded.failures);

    let entries = loaded.registry.history(&start, &end);
    if entries.is_empty() {
        println!("No doses recorded in this range.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}",
            entry.start.with_timezone(&now.timezone()).naive_local().format("%Y-%m-%d %H:%M"),
            entry.summary
        );
    }
    Ok(())
}

fn cmd_export(ctx: &Context, output: Option<PathBuf>) -> Result<()> {
    let loaded = ctx.store.load(&ctx.schedule)?;
    store::warn_rejected(&loaded.failures);

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)?;
            let count = write_history_csv(loaded.registry.iter(), file)?;
            eprintln!("✓ Exported {} doses to {}", count, path.display());
        }
        None => {
            write_history_csv(loaded.registry.iter(), io::stdout().lock())?;
        }
    }
    Ok(())
}

fn format_instant<Tz: TimeZone>(instant: Option<DateTime<FixedOffset>>, now: &DateTime<Tz>) -> String {
    match instant {
        Some(instant) => instant
            .with_timezone(&now.timezone())
            .naive_local()
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "-".to_string(),
    }
}
