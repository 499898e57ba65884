use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::server::{self, AppState};
use filemanager_core::catalog::Catalog;
use filemanager_core::config::{self, AppConfig};
use filemanager_core::explorer::{self, ListOptions};
use filemanager_core::{FileSystem, OsFs, SyncEngine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    cli::logging::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::List {
            dir,
            depth,
            include,
            exclude,
            pattern,
            hidden,
            json,
        } => {
            let options = ListOptions {
                depth: depth.unwrap_or(cfg.explorer.default_depth),
                include,
                exclude,
                regex_pattern: pattern,
                show_hidden: hidden || cfg.explorer.show_hidden,
            };
            run_list(&dir, &options, json)
        }
        Commands::Children { dir, json } => run_children(&dir, json),
        Commands::Sync {
            source,
            dest,
            force,
            json,
        } => run_sync(&cfg, &source, &dest, force, json).await,
        Commands::Pairs { json } => run_pairs(&cfg, json).await,
        Commands::Jobs { pair, json } => run_jobs(&cfg, pair, json).await,
        Commands::Serve { port } => run_serve(cfg, port).await,
    }
}

#[derive(Parser)]
#[command(name = "filemanager")]
#[command(about = "Directory explorer and content-addressed file sync", long_about = None)]
struct Cli {
    /// Path to config file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory tree with filters
    List {
        dir: String,
        /// Levels to descend; 0 or 1 = root level only, negative = unlimited
        #[arg(long, allow_hyphen_values = true)]
        depth: Option<i32>,
        /// Only list files matching these globs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        /// Skip entries matching these globs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Only list files whose name matches this regex
        #[arg(long)]
        pattern: Option<String>,
        /// Include hidden entries
        #[arg(long, default_value_t = false)]
        hidden: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List the immediate children of a directory
    Children {
        dir: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy new or changed top-level files from source into dest
    Sync {
        source: String,
        dest: String,
        /// Create the sync pair if it does not exist yet
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List known sync pairs
    Pairs {
        #[arg(long)]
        json: bool,
    },
    /// List sync jobs, optionally for one pair
    Jobs {
        #[arg(long)]
        pair: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn run_list(dir: &str, options: &ListOptions, json: bool) -> Result<()> {
    let files = explorer::list(&OsFs, dir, options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }
    for f in &files {
        println!(
            "{} {:>10} {} {}{}",
            f.permissions,
            f.size,
            f.mod_time.format("%Y-%m-%d %H:%M"),
            f.path,
            f.mime_type
                .as_deref()
                .map(|m| format!("  [{m}]"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn run_children(dir: &str, json: bool) -> Result<()> {
    let entries = explorer::list_children(&OsFs, dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for e in &entries {
        let kind = if e.is_dir { "dir " } else { "file" };
        println!("{} {:>10} {}", kind, e.size, e.name);
    }
    Ok(())
}

async fn open_engine(cfg: &AppConfig) -> Result<(SyncEngine, Arc<dyn Catalog>)> {
    let catalog: Arc<dyn Catalog> = Arc::new(filemanager_core::open_catalog(&cfg.database).await?);
    let fs: Arc<dyn FileSystem> = Arc::new(OsFs);
    Ok((SyncEngine::new(fs, catalog.clone()), catalog))
}

async fn run_sync(cfg: &AppConfig, source: &str, dest: &str, force: bool, json: bool) -> Result<()> {
    let (engine, _) = open_engine(cfg).await?;
    match engine.sync_dirs(source, dest, force).await {
        Ok(report) => {
            if json {
                let out = serde_json::json!({
                    "status": "completed",
                    "job_id": report.job_id,
                    "copied": report.copied,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("job {}: copied {} file(s)", report.job_id, report.copied.len());
                for name in &report.copied {
                    println!("  {name}");
                }
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                let out = serde_json::json!({
                    "status": "failed",
                    "job_id": failure.job_id,
                    "copied": failure.copied,
                    "error": failure.error.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if !failure.copied.is_empty() {
                eprintln!("copied before failure: {}", failure.copied.join(", "));
            }
            Err(failure.into())
        }
    }
}

async fn run_pairs(cfg: &AppConfig, json: bool) -> Result<()> {
    let (_, catalog) = open_engine(cfg).await?;
    let pairs = catalog.list_pairs().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
    } else {
        for p in &pairs {
            println!("{:>4}  {} -> {}", p.id, p.source_dir, p.dest_dir);
        }
    }
    Ok(())
}

async fn run_jobs(cfg: &AppConfig, pair: Option<i64>, json: bool) -> Result<()> {
    let (_, catalog) = open_engine(cfg).await?;
    let pair_ids: Vec<i64> = match pair {
        Some(id) => vec![id],
        None => catalog.list_pairs().await?.iter().map(|p| p.id).collect(),
    };
    let mut jobs = Vec::new();
    for id in pair_ids {
        jobs.extend(catalog.jobs_for_pair(id).await?);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        for j in &jobs {
            println!(
                "{:>4}  pair {:>4}  {:<9}  started {}  finished {}",
                j.id,
                j.pair_id,
                j.status,
                j.started_at,
                j.completed_at.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
            );
        }
    }
    Ok(())
}

async fn run_serve(mut cfg: AppConfig, port: Option<u16>) -> Result<()> {
    if let Some(p) = port {
        cfg.server.port = p;
    }
    let (engine, _) = open_engine(&cfg).await?;
    let state = Arc::new(AppState {
        fs: Arc::new(OsFs),
        engine,
        default_depth: cfg.explorer.default_depth,
        show_hidden: cfg.explorer.show_hidden,
    });
    let app = server::router(state);

    let addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, db = %cfg.database.path, "filemanager API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
