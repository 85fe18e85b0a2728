use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::path::Path;

use vpsight::auth::ensure_initial_admin;
use vpsight::dashboard::{build_rows, progress_bar};
use vpsight::forms::load_csv;
use vpsight::{init_tracing, AppConfig, Clock, RecordStore, RenewalEngine, SqliteStore, SystemClock};

const USAGE: &str = "usage: vpsight [import <file.csv> | list | renew <id>]";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    // The terminal dashboard owns the screen; only warnings go to stderr there
    let interactive = args.len() < 2;
    init_tracing(if interactive { "vpsight=warn" } else { "vpsight=info" });

    let config = AppConfig::from_env()?;

    match args.get(1).map(String::as_str) {
        None => run_ui_mode(&config),
        Some("import") => {
            let path = args.get(2).context(USAGE)?;
            run_import(&config, Path::new(path))
        }
        Some("list") => run_list(&config),
        Some("renew") => {
            let id = args
                .get(2)
                .context(USAGE)?
                .parse::<i64>()
                .context("server id must be an integer")?;
            run_renew(&config, id)
        }
        Some(other) => bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.db_path, &config.public_url)?.with_actor("cli");
    ensure_initial_admin(&*store.connection()?, config)?;
    Ok(store)
}

fn run_import(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Importing servers from {}", csv_path.display());

    let file = File::open(csv_path).with_context(|| format!("Failed to open CSV file {:?}", csv_path))?;
    let store = open_store(config)?;

    let mut imported = 0;
    let mut skipped = 0;
    for (line, row) in load_csv(file) {
        match row {
            Ok(new) => {
                let id = store.insert(&new)?;
                println!("  ✓ line {}: {} (#{})", line, new.name, id);
                imported += 1;
            }
            Err(reason) => {
                eprintln!("  ✗ line {}: skipped, {}", line, reason);
                skipped += 1;
            }
        }
    }

    println!("\n✅ Imported {} server(s), skipped {}", imported, skipped);
    Ok(())
}

fn run_list(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let records = store.list_all()?;
    if records.is_empty() {
        println!("No servers yet. Add one with `vpsight import <file.csv>` or the admin page.");
        return Ok(());
    }

    let rows = build_rows(&records, SystemClock.today());
    println!(
        "{:>4}  {:<24} {:<14} {:<11} {:>9}  Billing",
        "ID", "Name", "Cycle", "End Date", "Remaining"
    );
    for (record, row) in records.iter().zip(&rows) {
        let progress = row.billing.progress;
        println!(
            "{:>4}  {:<24} {:<14} {:<11} {:>9}  {} {:>5.1}% {}",
            record.id,
            row.name,
            row.billing_cycle,
            record.billing_end_date.as_deref().unwrap_or("N/A"),
            row.days_to_expiry.label(),
            progress_bar(progress.percentage, 12),
            progress.percentage,
            progress.severity.map_or("", |s| s.as_str()),
        );
    }
    Ok(())
}

fn run_renew(config: &AppConfig, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let renewal = RenewalEngine::new(&store).renew(id)?;
    println!(
        "✓ Renewed #{}: {} → {} ({})",
        renewal.id,
        renewal.previous_end_date,
        renewal.new_end_date,
        renewal.cycle.label()
    );
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    use vpsight::ui;

    let store = open_store(config)?;
    let clock = SystemClock;

    let mut app = ui::App::new(config.renew_lead_days);
    app.refresh(&store, clock.today())?;
    ui::run_ui(&mut app, &store, &clock)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web UI: cargo run --bin vpsight-server --features server");
    eprintln!("   {}", USAGE);
    std::process::exit(1);
}
