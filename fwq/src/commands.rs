//! Command implementations.

use std::io;
use std::path::Path;

use depot::derive::{total, DerivedName};
use depot::region::format_ms;
use depot::{Config, Depot, Region, SyncOptions, TableName};

fn open(root: Option<&Path>) -> depot::Result<Depot> {
    let config = match root {
        Some(root) => Config::load_from(root)?,
        None => Config::load()?,
    };
    Depot::open(config)
}

fn describe_ms(ms: i64) -> String {
    format_ms(ms).unwrap_or_else(|| ms.to_string())
}

pub fn load(root: Option<&Path>, regions: &[Region], json: bool) -> depot::Result<()> {
    let depot = open(root)?;
    let report = depot.load_current(regions);

    if json {
        println!("{}", serde_json::to_string_pretty(&*report)?);
        return Ok(());
    }

    println!("Window: {}", report.window);
    for (region, load) in &report.regions {
        let bundle = &load.bundle;
        let unit = region.unit();
        println!();
        println!("{} (from {}, {} records)", region, load.origin, bundle.raw.total_records());
        for table in TableName::ALL {
            println!("  {:<12} {:>6}", table.as_str(), bundle.table(table).len());
        }
        println!(
            "  theft total  {:.2} {}  (moving avg {})",
            total(bundle.daily(DerivedName::TheftDaily)),
            unit,
            bundle.summary.on_highway.theft_moving_average
        );
        println!(
            "  refill total {:.2} {}  (moving avg {})",
            total(bundle.daily(DerivedName::FillDaily)),
            unit,
            bundle.summary.on_highway.refill_moving_average
        );
        println!(
            "  theft TP/FP  {:.2}% / {:.2}%",
            bundle.rates.on_highway.theft.true_positive_pct,
            bundle.rates.on_highway.theft.false_positive_pct
        );
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  {}", warning);
        }
    }
    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  {}", error);
        }
    }
    Ok(())
}

pub fn sync(root: Option<&Path>, regions: &[Region], rebuild: bool) -> depot::Result<()> {
    let depot = open(root)?;
    let window = depot.config().current_window();
    println!("Syncing {}", window);

    let outcomes = depot.sync(regions, window, SyncOptions { rebuild });
    for outcome in &outcomes {
        println!("  {}", outcome);
    }

    let failures: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.is_synced())
        .map(|o| o.to_string())
        .collect();
    if !failures.is_empty() {
        return Err(depot::Error::RegionsFailed {
            action: "sync".to_string(),
            failures,
        });
    }
    Ok(())
}

pub fn refresh(root: Option<&Path>, regions: &[Region]) -> depot::Result<()> {
    let depot = open(root)?;
    let window = depot.config().current_window();
    depot.refresh(regions, window)?;
    for region in regions {
        println!("Reset {} checkpoint to {}", region, describe_ms(window.start_ms));
    }
    Ok(())
}

pub fn seed(root: Option<&Path>, dir: &Path, regions: &[Region]) -> depot::Result<()> {
    let depot = open(root)?;
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("seed directory not found: {}", dir.display()),
        )
        .into());
    }

    let stats = depot.seed(dir, regions);
    let mut failures = Vec::new();
    for stat in &stats {
        let checkpoint = stat
            .checkpoint
            .map(describe_ms)
            .unwrap_or_else(|| "none".to_string());
        println!(
            "{}: {} tables, {} records, checkpoint {}",
            stat.region, stat.tables_written, stat.records, checkpoint
        );
        for error in &stat.errors {
            println!("  error: {}", error);
        }
        failures.extend(stat.errors.iter().map(|e| format!("{}: {}", stat.region, e)));
    }

    if !failures.is_empty() {
        return Err(depot::Error::RegionsFailed {
            action: "seed".to_string(),
            failures,
        });
    }
    Ok(())
}

pub fn checkpoint(root: Option<&Path>, regions: &[Region]) -> depot::Result<()> {
    let depot = open(root)?;
    for (region, checkpoint) in depot.checkpoints(regions)? {
        match checkpoint {
            Some(ms) => println!("{:<5} {} ({})", region, describe_ms(ms), ms),
            None => println!("{:<5} never synced", region),
        }
    }
    Ok(())
}
