//! 🚀 mgx: the front door. Parses the command line, loads config, sets up logging,
//! then lets the library do the heavy lifting. Like a manager. 🦆
//!
//! ```text
//! mgx store                                            # back up the configured database
//! mgx restore --path vault/nightly/shop --latest       # newest backup of one database
//! mgx restore --path vault/nightly/shop/shop2024-01-01_00_00_00
//! mgx restore --path vault/nightly --latest --match '^alpha' --keep-going
//! mgx version
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_BORDERS_ONLY};
use mgx::{BackupReport, ErrorPolicy, RestoreOutcome, RestoreReport, RestoreRequest};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mgx", about = "Stream MongoDB backups into object storage and back")]
struct Cli {
    /// Configuration file (TOML). Missing file = environment variables (MGX_*) only.
    #[arg(long, short, global = true, default_value = "mgx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Back up the configured database into the configured bucket.
    Store,
    /// Download a backup into the dump directory.
    Restore {
        /// bucket[/uploadPath]/database (with --latest), the full instance path, or bucket[/uploadPath] (with --match).
        #[arg(long)]
        path: String,
        /// Pick the most recent backup under the path.
        #[arg(long)]
        latest: bool,
        /// Restore the latest backup of every database whose name matches this regex.
        #[arg(long = "match", value_name = "REGEX")]
        pattern: Option<String>,
        /// Hide the download progress bar.
        #[arg(long)]
        no_progress: bool,
        /// With --match: keep restoring the other databases after one fails.
        #[arg(long)]
        keep_going: bool,
    },
    /// Print the version and exit.
    Version,
}

fn backup_table(report: &BackupReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["collection", "documents", "bytes", "key"]);
    for object in &report.objects {
        table.add_row(vec![
            Cell::new(&object.collection),
            Cell::new(object.documents).set_alignment(CellAlignment::Right),
            Cell::new(object.bytes).set_alignment(CellAlignment::Right),
            Cell::new(&object.key),
        ]);
    }
    table
}

fn restore_table(reports: &[RestoreReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["instance", "file", "bytes"]);
    for report in reports {
        for file in &report.files {
            table.add_row(vec![
                Cell::new(&report.instance.name),
                Cell::new(file.path.display()),
                Cell::new(file.bytes).set_alignment(CellAlignment::Right),
            ]);
        }
    }
    table
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Version = cli.command {
        println!("mgx {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // -- 🔒 a missing default file is fine (env-only); an unreadable path is not
    let config_file = cli.config.as_path();
    let config_file: Option<&Path> = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => None,
    };
    let app_config = mgx::app_config::load_config(config_file)
        .context("💀 Couldn't load the configuration. Take a look at the file and the MGX_* variables.")?;

    match cli.command {
        Command::Store => {
            let report = mgx::run_backup(app_config).await?;
            info!(
                "✅ backup {} stored under {}/{}",
                report.instance_name, report.bucket, report.instance_prefix
            );
            println!("{}", backup_table(&report));
        }
        Command::Restore {
            path,
            latest,
            pattern,
            no_progress,
            keep_going,
        } => {
            let request = RestoreRequest {
                path,
                latest,
                pattern,
                show_progress: no_progress.then_some(false),
                error_policy: keep_going.then_some(ErrorPolicy::ContinueOnError),
            };
            match mgx::run_restore(app_config, request).await? {
                RestoreOutcome::Single(report) => {
                    println!("{}", restore_table(std::slice::from_ref(&report)));
                }
                RestoreOutcome::Matched(summary) => {
                    info!("🎯 matched databases: {:?}", summary.matched);
                    println!("{}", restore_table(&summary.restored));
                }
            }
        }
        Command::Version => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut looks_like_connection_trouble = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("Server selection timeout")
                || cause_str.contains("dispatch failure")
                || cause_str.contains("onnection refused")
                || cause_str.contains("dns error")
            {
                looks_like_connection_trouble = true;
            }
        }
        if looks_like_connection_trouble {
            error!(
                "🔧 hint: looks like MongoDB or the object store isn't reachable. \
                 Check hostnames, ports, credentials, and that the services are actually up."
            );
        }
        std::process::exit(1);
    }
}
