//! `stackpatch` — a thin CLI wiring `stackpatch_adapters` into
//! `stackpatch_core`'s use cases: one `main.rs`, a `Commands` enum,
//! progress bars via `indicatif`, a confirmation prompt via `dialoguer`
//! before the one destructive path (an update that may delete
//! tombstoned files).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use stackpatch_adapters::{
    network, settings, telemetry, FsPatchStore, FsRunConfigScanner, GlobalMirrorPoolCache,
    HttpDownloader,
};
use stackpatch_core::entities::RunConfig;
use stackpatch_core::ports::NoopVirtualJsonSource;
use stackpatch_core::use_cases::update::{FileStage, GlobalUpdateOutcome, UpdateEnvironment};
use stackpatch_core::use_cases::{resolve_binary, resolve_json, Resolver, StackUpdater};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about = "Layered patch stack resolver and mirror updater", long_about = None)]
struct Cli {
    /// Path to the runconfig JSON file.
    #[arg(short, long, global = true, default_value = "config.js")]
    runconfig: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a file through the patch stack and print where it comes from.
    Resolve {
        /// The filename to resolve (as patched code would request it).
        fn_: String,

        /// Resolve as a JSON overlay instead of a binary file.
        #[arg(long, default_value = "false")]
        json: bool,

        /// Write resolved binary bytes to this path instead of summarizing.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synchronize every patch in the runconfig's stack against its mirrors.
    Update {
        /// Skip the confirmation prompt before updating.
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// Scan a directory for sibling runconfigs and update every patch they
    /// reference, filtered by that directory's `games.js`.
    GlobalUpdate {
        /// Directory to scan. Defaults to the runconfig's own directory.
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long, default_value = "false")]
        yes: bool,
    },
}

fn load_run_config(path: &std::path::Path) -> anyhow::Result<RunConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read runconfig {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("failed to parse runconfig {}: {e}", path.display()))
}

fn build_update_environment() -> anyhow::Result<UpdateEnvironment> {
    let client = network::build_patch_client()?;
    Ok(UpdateEnvironment::new(
        Arc::new(FsPatchStore::new()),
        Arc::new(HttpDownloader::new(client)),
        Arc::new(GlobalMirrorPoolCache::new()),
        Arc::new(FsRunConfigScanner::new()),
    ))
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn print_outcomes(results: &[(String, stackpatch_core::use_cases::update::PatchUpdateOutcome)]) {
    for (id, outcome) in results {
        println!(
            "{id}: {:?} ({} file(s) changed)",
            outcome.status, outcome.files_changed
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = settings::load_settings().unwrap_or_default();
    let _guard = telemetry::init_subscriber("stackpatch_cli", &settings.log_level);

    let cli = Cli::parse();

    match &cli.command {
        Commands::Resolve { fn_, json, output } => {
            let run_config = load_run_config(&cli.runconfig)?;
            let store = FsPatchStore::new();
            let vfs = NoopVirtualJsonSource;
            let resolver = Resolver::new(&store, &vfs);

            if *json {
                let (value, bytes) = resolve_json(&resolver, &run_config, fn_).await;
                match value {
                    Some(value) => {
                        println!("{}", serde_json::to_string_pretty(&value)?);
                        info!(bytes, "resolved json overlay");
                    }
                    None => {
                        println!("not found: {fn_}");
                        std::process::exit(1);
                    }
                }
            } else {
                match resolve_binary(&resolver, &run_config, fn_).await {
                    Some((bytes, size)) => {
                        if let Some(output) = output {
                            std::fs::write(output, &bytes)?;
                            println!("wrote {size} bytes to {}", output.display());
                        } else {
                            println!("resolved {fn_} ({size} bytes)");
                        }
                    }
                    None => {
                        println!("not found: {fn_}");
                        std::process::exit(1);
                    }
                }
            }
        }

        Commands::Update { yes } => {
            let run_config = load_run_config(&cli.runconfig)?;
            if !*yes
                && !Confirm::new()
                    .with_prompt(format!(
                        "Update {} patch(es) against their mirrors?",
                        run_config.patches.len()
                    ))
                    .default(true)
                    .interact()
                    .unwrap_or(true)
            {
                println!("aborted");
                return Ok(());
            }

            let env = build_update_environment()?;
            let updater = StackUpdater::new(env);
            let bar = progress_bar(run_config.patches.len() as u64);
            let results = updater
                .stack_update(&run_config, &|_| true, |progress| {
                    bar.set_position(progress.stack_index as u64);
                    bar.set_message(format!("{}: {}", progress.patch.id, progress.file));
                    match progress.stage {
                        FileStage::Stored => {
                            info!(patch = %progress.patch.id, file = progress.file, "stored")
                        }
                        FileStage::Deleted => {
                            info!(patch = %progress.patch.id, file = progress.file, "deleted")
                        }
                        FileStage::Failed => {
                            warn!(patch = %progress.patch.id, file = progress.file, "failed")
                        }
                        _ => {}
                    }
                })
                .await;
            bar.finish_and_clear();

            print_outcomes(&results);
        }

        Commands::GlobalUpdate { dir, yes } => {
            let dir = dir.clone().unwrap_or_else(|| {
                cli.runconfig
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

            if !*yes
                && !Confirm::new()
                    .with_prompt(format!("Run a global update scanning {}?", dir.display()))
                    .default(true)
                    .interact()
                    .unwrap_or(true)
            {
                println!("aborted");
                return Ok(());
            }

            let env = build_update_environment()?;
            let updater = StackUpdater::new(env);
            let bar = progress_bar(0);
            match updater
                .global_update(&dir, |progress| {
                    bar.set_length(progress.stack_total as u64);
                    bar.set_position(progress.stack_index as u64);
                    bar.set_message(format!("{}: {}", progress.patch.id, progress.file));
                })
                .await
            {
                Ok(GlobalUpdateOutcome::NoGamesJs) => {
                    bar.finish_and_clear();
                    println!("no games.js found under {}, nothing to do", dir.display());
                }
                Ok(GlobalUpdateOutcome::Updated(results)) => {
                    bar.finish_and_clear();
                    print_outcomes(&results);
                }
                Err(e) => {
                    bar.finish_and_clear();
                    error!(error = %e, "global update failed");
                    return Err(anyhow::anyhow!(e.to_string()));
                }
            }
        }
    }

    Ok(())
}
