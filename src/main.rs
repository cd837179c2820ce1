mod airtable;
mod config;
mod db;
mod extract;
mod record;
mod service;

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::json;

use crate::airtable::schema::SchemaCache;
use crate::airtable::validate::ExcludedField;
use crate::config::SyncConfig;
use crate::extract::orchestrator::{FileSource, HttpSource, Orchestrator, TokioClock};
use crate::record::ProfileRecord;

#[derive(Parser)]
#[command(name = "profile_sync", about = "LinkedIn profile extraction and Airtable sync")]
struct Cli {
    /// Path to the connection config
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,
    /// Print response envelopes as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a profile from a saved page or a live URL
    Extract {
        /// Saved HTML file to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Address to fetch the page from
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Extract a profile, then write the record to Airtable
    Sync {
        /// Saved HTML file to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Address to fetch the page from
        #[arg(short, long)]
        url: Option<String>,
        /// Map and validate only; skip the write
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify the configured token, base, and table
    TestConnection,
    /// Round-trip a test record through the mapping pipeline
    TestMapping {
        /// Saved HTML file to read (omit to use a built-in test record)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Address to fetch the page from
        #[arg(short, long)]
        url: Option<String>,
    },
    /// List the target table's fields and types
    Fields,
    /// Show recent sync attempts
    History {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = SyncConfig::load(&cli.config)?;
    config.apply_env();

    let result = match cli.command {
        Commands::Extract { input, url } => {
            let resp = extract_from(input, url).await?;
            if cli.json {
                print_json(&resp)
            } else if let Some(record) = resp.data {
                print_record(&record);
                Ok(())
            } else {
                anyhow::bail!(
                    "extraction failed: {}",
                    resp.error.unwrap_or_default()
                )
            }
        }
        Commands::Sync { input, url, dry_run } => {
            let resp = extract_from(input, url).await?;
            let Some(record) = resp.data else {
                if cli.json {
                    return print_json(&resp);
                }
                anyhow::bail!(
                    "extraction failed: {}",
                    resp.error.unwrap_or_default()
                )
            };

            let conn = db::connect()?;
            db::init_schema(&conn)?;

            if dry_run {
                // Offline pass: only the durable schema copy is consulted.
                let schema = match db::load_schema_cache(&conn, &config.table_identity()) {
                    Ok(Some((schema, _))) => Some(schema),
                    _ => None,
                };
                let prepared =
                    airtable::prepare_fields(&record, &config.field_mappings, schema.as_ref());
                if cli.json {
                    return print_json(&json!({
                        "success": true,
                        "dryRun": true,
                        "fields": prepared.fields,
                        "excludedFields": prepared.excluded,
                    }));
                }
                println!("Would send {} field(s):", prepared.fields.len());
                for (name, value) in &prepared.fields {
                    println!("  {:<20} {}", name, value);
                }
                print_exclusions(&prepared.excluded);
                return Ok(());
            }

            let mut cache = SchemaCache::new();
            let resp = service::save_to_airtable(&record, &config, &mut cache, Some(&conn)).await;
            if cli.json {
                print_json(&resp)
            } else if resp.success {
                if let Some(message) = &resp.message {
                    println!("{message}");
                }
                if let Some(id) = &resp.record_id {
                    println!("Record: {id}");
                }
                print_exclusions(&resp.excluded_fields);
                Ok(())
            } else {
                print_exclusions(&resp.excluded_fields);
                for f in &resp.field_errors {
                    match &f.hint {
                        Some(hint) => println!("  {}: {} ({})", f.field, f.message, hint),
                        None => println!("  {}: {}", f.field, f.message),
                    }
                }
                anyhow::bail!("sync failed: {}", resp.error.unwrap_or_default())
            }
        }
        Commands::TestConnection => {
            let resp = service::test_airtable_connection(&config).await;
            if cli.json {
                print_json(&resp)
            } else if resp.success {
                println!("{}", resp.message.unwrap_or_default());
                Ok(())
            } else {
                anyhow::bail!(
                    "connection test failed: {}",
                    resp.error.unwrap_or_default()
                )
            }
        }
        Commands::TestMapping { input, url } => {
            let record = match (input, url) {
                (None, None) => service::sample_record(),
                (input, url) => {
                    let resp = extract_from(input, url).await?;
                    match resp.data {
                        Some(record) => record,
                        None => {
                            if cli.json {
                                return print_json(&resp);
                            }
                            anyhow::bail!(
                                "extraction failed: {}",
                                resp.error.unwrap_or_default()
                            )
                        }
                    }
                }
            };

            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let mut cache = SchemaCache::new();
            let resp =
                service::test_field_mappings(&record, &config, &mut cache, Some(&conn)).await;
            if cli.json {
                print_json(&resp)
            } else if resp.success {
                println!("{}", resp.message.unwrap_or_default());
                Ok(())
            } else {
                for field in &resp.unknown_fields {
                    println!("  unknown field: {field}");
                }
                for f in &resp.field_errors {
                    match &f.hint {
                        Some(hint) => println!("  {}: {} ({})", f.field, f.message, hint),
                        None => println!("  {}: {}", f.field, f.message),
                    }
                }
                anyhow::bail!(
                    "mapping test failed: {}",
                    resp.error.unwrap_or_default()
                )
            }
        }
        Commands::Fields => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let resp = service::fetch_available_fields(&config, Some(&conn)).await;
            if cli.json {
                print_json(&resp)
            } else if resp.success {
                println!("{:<28} | {}", "Field", "Type");
                println!("{}", "-".repeat(50));
                for f in &resp.fields {
                    println!("{:<28} | {}", truncate(&f.name, 28), f.field_type);
                }
                println!("\n{} fields", resp.fields.len());
                Ok(())
            } else {
                anyhow::bail!(
                    "field listing failed: {}",
                    resp.error.unwrap_or_default()
                )
            }
        }
        Commands::History { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, limit)?;
            if cli.json {
                print_json(&rows)
            } else if rows.is_empty() {
                println!("No sync history yet.");
                Ok(())
            } else {
                println!(
                    "{:>4} | {:<20} | {:<30} | {:<14} | {:>4} | {}",
                    "#", "Name", "Profile", "Outcome", "Excl", "When"
                );
                println!("{}", "-".repeat(100));
                for r in &rows {
                    println!(
                        "{:>4} | {:<20} | {:<30} | {:<14} | {:>4} | {}",
                        r.id,
                        truncate(&r.full_name, 20),
                        truncate(&r.profile_url, 30),
                        truncate(&r.outcome, 14),
                        r.excluded_count,
                        r.synced_at
                    );
                }

                let failures: Vec<_> = rows.iter().filter(|r| r.detail.is_some()).collect();
                if !failures.is_empty() {
                    println!("\n--- Details ---");
                    for r in &failures {
                        println!("  #{}: {}", r.id, r.detail.as_deref().unwrap_or_default());
                    }
                }
                Ok(())
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Build the right source for the flags and run one extraction pass.
async fn extract_from(
    input: Option<PathBuf>,
    url: Option<String>,
) -> anyhow::Result<service::ExtractResponse> {
    match (input, url) {
        (Some(path), None) => {
            let orch = Orchestrator::new(FileSource::new(path), TokioClock);
            Ok(with_spinner(service::extract_profile(&orch)).await)
        }
        (None, Some(url)) => {
            let orch = Orchestrator::new(HttpSource::new(url), TokioClock);
            Ok(with_spinner(service::extract_profile(&orch)).await)
        }
        _ => anyhow::bail!("provide exactly one of --input or --url"),
    }
}

async fn with_spinner<T>(fut: impl Future<Output = T>) -> T {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("extracting...");
    let out = fut.await;
    pb.finish_and_clear();
    out
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_record(record: &ProfileRecord) {
    println!("Name:     {}", record.full_name);
    println!("Title:    {}", dash_if_empty(&record.job_title));
    println!("Company:  {}", dash_if_empty(&record.company));
    println!("Location: {}", dash_if_empty(&record.location));
    println!("URL:      {}", dash_if_empty(&record.profile_url));
    println!("Picture:  {}", dash_if_empty(&record.profile_picture));
    println!("Scraped:  {}", record.scraped_at.to_rfc3339());
}

fn print_exclusions(excluded: &[ExcludedField]) {
    if excluded.is_empty() {
        return;
    }
    println!("Excluded {} field(s):", excluded.len());
    for e in excluded {
        match &e.expected_type {
            Some(t) => println!("  {} ({}): {}", e.field, t, e.reason),
            None => println!("  {}: {}", e.field, e.reason),
        }
    }
}

fn dash_if_empty(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
