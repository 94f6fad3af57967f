//! Command handlers
//!
//! Each handler wires the engine, store, and scheduler together for one
//! subcommand and returns the process exit code: 0 for a valid result or
//! a successful side command, 1 for connectivity failures and invalid
//! results.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::info;

use crate::cache;
use crate::cli::commands::{Cli, Commands, ExportFormat};
use crate::config::SpeedTestConfig;
use crate::engine::result::TestResult;
use crate::engine::retry::run_with_retry;
use crate::engine::tester::SpeedTestEngine;
use crate::providers::HttpMeasurementProvider;
use crate::scheduler::ScheduledRunner;
use crate::storage::ResultStore;

/// Dispatches the parsed CLI to its handler.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run { json } => handle_run(&cli.config, &cli.db, json).await,
        Commands::Schedule { interval, max_runtime, immediate } => {
            handle_schedule(&cli.config, &cli.db, interval, max_runtime, immediate).await
        }
        Commands::Stats { days } => handle_stats(&cli.db, days),
        Commands::History { limit } => handle_history(&cli.db, limit),
        Commands::Export { format, output, days } => handle_export(&cli.db, format, &output, days),
        Commands::Info => handle_info(&cli.db),
        Commands::Cleanup { keep_days } => handle_cleanup(&cli.db, keep_days),
        Commands::CreateConfig => handle_create_config(&cli.config),
    }
}

fn build_engine(config: &Arc<SpeedTestConfig>) -> Result<Arc<SpeedTestEngine>> {
    let provider = HttpMeasurementProvider::new(Duration::from_secs_f64(config.speedtest_timeout))?;
    Ok(Arc::new(SpeedTestEngine::new(
        Arc::clone(config),
        Arc::new(provider),
    )))
}

async fn handle_run(config_path: &Path, db_path: &Path, json: bool) -> Result<i32> {
    let config = Arc::new(SpeedTestConfig::load(config_path));
    let engine = build_engine(&config)?;

    if !json {
        println!("Internet Speed Test Tool");
        println!("-------------------------");
        println!("Checking network connectivity...");
    }

    if !engine.check_connectivity().await {
        eprintln!("Error: No internet connection detected.");
        eprintln!("Please check your network connection and try again.");
        return Ok(1);
    }

    if config.show_detailed_progress && !json {
        engine.set_progress_callback(Box::new(|message, progress| match progress {
            Some(fraction) => println!("[{:3.0}%] {message}", fraction * 100.0),
            None => println!("{message}"),
        }));
    }

    let result = run_with_retry(&engine).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if result.is_valid && config.save_results_to_database {
        let store = ResultStore::open(db_path)?;
        match store.save(&result) {
            Ok(id) => {
                if !json {
                    println!("Result saved to database (ID: {id}).");
                }
            }
            Err(e) => eprintln!("Warning: failed to save result to database: {e:#}"),
        }
        store.close();
    }

    cache::write_widget_cache(&result);

    Ok(if result.is_valid { 0 } else { 1 })
}

async fn handle_schedule(
    config_path: &Path,
    db_path: &Path,
    interval_minutes: u64,
    max_runtime_minutes: u64,
    immediate: bool,
) -> Result<i32> {
    let config = Arc::new(SpeedTestConfig::load(config_path));
    let engine = build_engine(&config)?;
    let store = Arc::new(ResultStore::open(db_path)?);
    let runner = ScheduledRunner::new(
        Duration::from_secs(interval_minutes * 60),
        engine,
        Arc::clone(&store),
        config,
    );

    if immediate {
        runner.run_immediate().await;
        let status = runner.status();
        store.close();
        return Ok(if status.tests_completed > 0 { 0 } else { 1 });
    }

    println!("Speed Test Scheduler");
    println!("====================");
    println!("Test interval: {interval_minutes} minutes");
    println!("Max runtime: {max_runtime_minutes} minutes");
    println!("Press Ctrl+C to stop");

    runner.start();

    let max_runtime = Duration::from_secs(max_runtime_minutes * 60);
    let started = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                if started.elapsed() >= max_runtime {
                    info!("Maximum runtime reached");
                    break;
                }
                ticks += 1;
                // Status line every ten minutes.
                if ticks % 60 == 0 {
                    let status = runner.status();
                    println!(
                        "Status: {} completed, {} failed, runtime: {:.0}s",
                        status.tests_completed,
                        status.tests_failed,
                        status.runtime_seconds.unwrap_or(0.0)
                    );
                }
            }
        }
    }

    runner.stop().await;
    store.close();
    println!("Scheduler shut down gracefully");
    Ok(0)
}

fn handle_stats(db_path: &Path, days: u32) -> Result<i32> {
    let store = ResultStore::open(db_path)?;
    let stats = store.statistics(days)?;
    store.close();

    if stats.count == 0 {
        println!("No valid test results found in the last {days} days.");
        return Ok(0);
    }

    println!("Speed Test Statistics (last {days} days)");
    println!("==================================================");
    println!("Total tests: {}", stats.count);
    println!(
        "Period: {} to {}",
        stats.first_test.as_deref().unwrap_or("-"),
        stats.last_test.as_deref().unwrap_or("-")
    );
    println!();

    let print_metric = |name: &str, data: &crate::storage::MetricStats| {
        println!("{name}:");
        println!("  Average: {:.2}", data.mean);
        println!("  Median:  {:.2}", data.median);
        println!("  Min:     {:.2}", data.min);
        println!("  Max:     {:.2}", data.max);
        println!();
    };

    print_metric("Download (Mbps)", &stats.download);
    print_metric("Upload (Mbps)", &stats.upload);
    print_metric("Ping (ms)", &stats.ping);

    Ok(0)
}

fn handle_history(db_path: &Path, limit: usize) -> Result<i32> {
    let store = ResultStore::open(db_path)?;
    let records = store.recent(limit)?;
    store.close();

    if records.is_empty() {
        println!("No test results recorded yet.");
        return Ok(0);
    }

    println!("Recent Test Results");
    println!("===================");
    for record in records {
        println!(
            "{}  {:8.2} Mbps down  {:8.2} Mbps up  {:6.1} ms  {}",
            record.test_date,
            record.download_mbps,
            record.upload_mbps,
            record.ping_ms,
            record.server_info
        );
        if !record.warnings.is_empty() {
            println!("    Warnings: {}", record.warnings.join("; "));
        }
    }

    Ok(0)
}

fn handle_export(
    db_path: &Path,
    format: ExportFormat,
    output: &Path,
    days: Option<u32>,
) -> Result<i32> {
    let store = ResultStore::open(db_path)?;
    let count = match format {
        ExportFormat::Csv => store.export_csv(output, days)?,
        ExportFormat::Json => store.export_json(output, days)?,
    };
    store.close();

    let period = match days {
        Some(days) => format!("last {days} days"),
        None => "all time".to_string(),
    };
    println!("Exported {count} results ({period}) to {}", output.display());

    Ok(0)
}

fn handle_info(db_path: &Path) -> Result<i32> {
    let store = ResultStore::open(db_path)?;
    let info = store.info()?;
    store.close();

    println!("Database Information");
    println!("====================");
    println!("Path: {}", info.database_path);
    println!("Size: {} MB", info.database_size_mb);
    println!("Total records: {}", info.total_records);
    println!("Valid records: {}", info.valid_records);
    if let (Some(first), Some(last)) = (&info.first_test, &info.last_test) {
        println!("Date range: {first} to {last}");
    }

    Ok(0)
}

fn handle_cleanup(db_path: &Path, keep_days: u32) -> Result<i32> {
    let store = ResultStore::open(db_path)?;
    let deleted = store.cleanup(keep_days)?;
    store.close();

    println!("Cleaned up {deleted} old records (keeping last {keep_days} days)");
    Ok(0)
}

fn handle_create_config(config_path: &Path) -> Result<i32> {
    if SpeedTestConfig::create_sample(config_path)? {
        println!("Sample configuration file created: {}", config_path.display());
        println!("Edit this file to customize speed test settings.");
    } else {
        println!("Configuration file already exists: {}", config_path.display());
    }
    Ok(0)
}

fn print_result(result: &TestResult) {
    if result.is_cancelled {
        println!("\nTest cancelled.");
        return;
    }

    println!();
    println!("========================================");
    println!("SPEED TEST RESULTS");
    println!("========================================");
    println!("Download: {:.2} Mbps", result.download_mbps);
    println!("Upload:   {:.2} Mbps", result.upload_mbps);
    println!("Ping:     {:.1} ms", result.ping_ms);
    if !result.server_info.is_empty() {
        println!("Server:   {}", result.server_info);
    }
    println!("========================================");

    for warning in &result.warnings {
        println!("Warning: {warning}");
    }
    if !result.is_valid {
        println!("\nSpeed test failed. Please try again.");
    }
}
