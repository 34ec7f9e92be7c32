//! Command handlers for the `recall` binary

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use recall_srs::config::{load_config, Config, DEFAULT_CONFIG};
use recall_srs::migrate::{migrate as migrate_stats, migrate_items};
use recall_srs::storage::{open_store, RawState};
use recall_srs::{Engine, Grade, PracticeMode, SchedulerContext, SrsError};

const CONFIG_FILE: &str = "config.toml";

fn load(data_dir: &Path) -> Result<Config> {
    Ok(load_config(&data_dir.join(CONFIG_FILE))?)
}

fn open_engine(data_dir: &Path) -> Result<Engine> {
    let config = load(data_dir)?;
    let ctx = SchedulerContext::system(config.scheduler_config()?)?;
    let store = open_store(data_dir, config.storage.backend)?;
    let engine = Engine::open(store, ctx)?;

    let report = engine.load_report();
    for problem in report.dropped.iter().chain(report.anomalies.iter()) {
        warn!("{}", problem);
    }
    Ok(engine)
}

/// Create the data directory, default config and an empty state
pub fn init(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)?;
        info!("Created default configuration at {:?}", config_path);
    }

    let mut engine = open_engine(data_dir)?;
    engine.flush()?;
    println!("✅ Recall initialized at {}", data_dir.display());
    println!("   State: {}", engine.store_location());
    Ok(())
}

pub fn add(data_dir: &Path, word: &str, level: &str, forms: Vec<String>) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    let forms = forms
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    let item = engine.add_item(word, level, forms)?;
    println!("Added {}", item.id);
    Ok(())
}

pub fn remove(data_dir: &Path, id: &str) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    let item = engine.remove_item(id)?;
    println!("Removed {} ({})", item.id, item.word);
    Ok(())
}

pub fn list(data_dir: &Path, as_json: bool) -> Result<()> {
    let engine = open_engine(data_dir)?;
    let stats = engine
        .items()
        .iter()
        .map(|item| engine.get_stats(&item.id))
        .collect::<Result<Vec<_>, SrsError>>()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    if stats.is_empty() {
        println!("No words yet. Add one with 'recall add <word>'");
        return Ok(());
    }
    for s in stats {
        println!(
            "{:<28} {:<9} ease {:.2}  interval {:>4}d  due {}{}",
            s.item.id,
            s.record.phase,
            s.record.ease,
            s.record.interval_days,
            s.record.due_at.format("%Y-%m-%d %H:%M"),
            if s.due { "  *" } else { "" }
        );
    }
    Ok(())
}

pub fn due(data_dir: &Path, mode: Option<PracticeMode>, as_json: bool) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    let mode = mode.unwrap_or_else(|| engine.practice_mode());
    let queue = engine.get_due_queue(mode);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
        return Ok(());
    }
    if queue.is_empty() {
        println!("Nothing due ({} mode)", mode);
        return Ok(());
    }
    println!("{} due ({} mode):", queue.len(), mode);
    for id in queue {
        let word = engine.item(&id).map(|item| item.word.as_str()).unwrap_or("?");
        println!("  {:<28} {}", id, word);
    }
    Ok(())
}

pub fn answer(data_dir: &Path, grade: Grade, id: Option<&str>) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    let (id, record) = match id {
        Some(id) => (id.to_string(), engine.apply_answer(id, grade)?),
        None => {
            let (item, record) = engine.answer_current(grade)?;
            (item.id, record)
        }
    };
    println!(
        "{} -> {} (step {}, interval {}d, ease {:.2}), next due {}",
        id,
        record.phase,
        record.step_index,
        record.interval_days,
        record.ease,
        record.due_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

pub fn start(data_dir: &Path) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    let count = engine.start_session()?;
    println!("Started {} session with {} cards", engine.practice_mode(), count);
    Ok(())
}

pub fn next(data_dir: &Path) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    match engine.current_card() {
        Ok(Some(item)) => {
            println!("{}\t{}", item.id, item.word);
            if !item.forms.is_empty() {
                println!("\t{}", item.forms.join(", "));
            }
        }
        Ok(None) => println!("Session finished"),
        Err(SrsError::NoActiveSession) => {
            println!("No active session. Run 'recall start' first.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn mode(data_dir: &Path, mode: Option<PracticeMode>) -> Result<()> {
    let mut engine = open_engine(data_dir)?;
    match mode {
        None => println!("{}", engine.practice_mode()),
        Some(mode) => {
            if engine.switch_practice_mode(mode)? {
                println!("Switched to {} mode", mode);
            } else {
                println!("Already in {} mode", mode);
            }
        }
    }
    Ok(())
}

pub fn stats(data_dir: &Path, id: Option<&str>, as_json: bool) -> Result<()> {
    let mut engine = open_engine(data_dir)?;

    if let Some(id) = id {
        let stats = engine.get_stats(id)?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("{} ({})", stats.item.word, stats.item.id);
            println!("  Phase:    {}", stats.record.phase);
            println!("  Step:     {}", stats.record.step_index);
            println!("  Interval: {} days", stats.record.interval_days);
            println!("  Ease:     {:.2}", stats.record.ease);
            println!("  Lapses:   {}", stats.record.lapses);
            println!("  Due:      {}{}", stats.record.due_at, if stats.due { " (now)" } else { "" });
        }
        return Ok(());
    }

    let summary = engine.summary();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Recall Statistics");
    println!("=================");
    println!();
    println!("Words: {}", summary.total_items);
    println!("  New:      {}", summary.new_items);
    println!("  Learning: {}", summary.learning_items);
    println!("  Review:   {}", summary.review_items);
    println!("Due now: {}", summary.due_now);
    println!("In flight: {}", summary.in_flight);
    println!("Lapses: {}", summary.total_lapses);
    if let Some(ease) = summary.average_ease {
        println!("Average ease: {:.2}", ease);
    }
    if let Some(next) = summary.next_due_at {
        println!("Next due: {}", next.format("%Y-%m-%d %H:%M"));
    }
    println!();
    println!("Today ({}):", summary.today.date);
    println!(
        "  New introduced: {} ({} left)",
        summary.today.new_introduced_count, summary.new_remaining
    );
    println!(
        "  Reviews:        {} ({} left)",
        summary.today.review_answer_count, summary.reviews_remaining
    );
    Ok(())
}

/// Migrate a state document offline, leaving the data directory untouched
pub fn migrate(data_dir: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let config = load(data_dir)?.scheduler_config()?;
    let ctx = SchedulerContext::system(config)?;

    let content = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let raw: RawState = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", input.display()))?;

    let (items, item_problems) = migrate_items(&raw.learning_words);
    let empty = serde_json::Map::new();
    let stats = raw.word_stats.as_object().unwrap_or(&empty);
    let report = migrate_stats(stats, &ctx.config, ctx.now());

    let practice_mode = if raw.practice_mode.is_null() {
        json!(PracticeMode::default())
    } else {
        raw.practice_mode
    };
    let migrated = json!({
        "learningWords": items,
        "wordStats": report.stored(),
        "srsDay": raw.srs_day,
        "practiceMode": practice_mode,
        "session": raw.session,
    });
    let text = serde_json::to_string_pretty(&migrated)?;

    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }

    for problem in item_problems.iter().chain(&report.dropped).chain(&report.anomalies) {
        eprintln!("  {}", problem);
    }
    eprintln!(
        "Migrated {} records ({} upgraded, {} dropped, {} anomalies)",
        report.records.len(),
        report.upgraded,
        report.dropped.len(),
        report.anomalies.len()
    );
    Ok(())
}

pub fn status(data_dir: &Path) -> Result<()> {
    println!("Recall Status");
    println!("=============");
    println!();

    if !data_dir.exists() {
        println!("Status: NOT INITIALIZED");
        println!("Run 'recall init' to initialize");
        return Ok(());
    }

    let config = load(data_dir)?;
    let mut engine = open_engine(data_dir)?;
    let counters = engine.day_counters();

    println!("Status: INITIALIZED");
    println!("Data directory: {}", data_dir.display());
    println!("Backend: {:?}", config.storage.backend);
    println!("State: {}", engine.store_location());
    println!("Words: {}", engine.items().len());
    println!("Mode: {}", engine.practice_mode());
    match engine.session().queue() {
        Some(queue) => println!(
            "Session: {} of {} cards left (started {})",
            queue.remaining(),
            queue.ids.len(),
            queue.started_on
        ),
        None => println!("Session: none"),
    }
    println!(
        "Today: {} new, {} reviews",
        counters.new_introduced_count, counters.review_answer_count
    );

    let report = engine.load_report();
    if !report.is_clean() {
        println!(
            "Last load: {} upgraded, {} dropped, {} anomalies",
            report.upgraded,
            report.dropped.len(),
            report.anomalies.len()
        );
    }
    Ok(())
}
