use anyhow::{Result, bail};
use clap::Parser;
use flowlens::{cli, config, indexer, server};
use std::path::Path;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Index { path } => {
            let cfg = load_config(args.config.as_deref(), &path)?;
            println!("Indexing project at: {}", path.display());

            let indexer = indexer::Indexer::new(cfg, &path);
            let result = indexer.run()?;

            println!();
            println!("Indexing complete!");
            println!("  Packages: {}", result.package_count);
            println!("  Symbols:  {}", result.symbol_count);
            println!("  Duration: {:.0?}", result.duration);
            println!("  Database: {}", result.db_path.display());
            Ok(())
        }
        cli::Command::Ui {
            path,
            port,
            no_browser,
        } => {
            let project_dir = path.canonicalize().unwrap_or(path);

            let index_path = project_dir.join(".flowlens").join("index.db");
            if !index_path.exists() {
                bail!(
                    "no FlowLens index found at {}\nRun 'flowlens index {}' first to create the index",
                    index_path.display(),
                    project_dir.display()
                );
            }

            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();

            let url = format!("http://localhost:{port}");
            println!("Starting FlowLens UI server at {url}");
            println!("Project: {}", project_dir.display());
            println!("Press Ctrl+C to stop");

            if !no_browser {
                open_browser(&url);
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(server::ServerConfig {
                port,
                project_dir,
            }))
        }
    }
}

fn load_config(config_path: Option<&Path>, project_dir: &Path) -> Result<config::Config> {
    match config_path {
        Some(path) => config::Config::load(path),
        None => config::Config::load_from_dir(project_dir),
    }
}

fn open_browser(url: &str) {
    let command = if cfg!(target_os = "macos") {
        Some(("open", vec![url.to_string()]))
    } else if cfg!(target_os = "linux") {
        Some(("xdg-open", vec![url.to_string()]))
    } else if cfg!(target_os = "windows") {
        Some(("cmd", vec!["/c".to_string(), "start".to_string(), url.to_string()]))
    } else {
        None
    };

    if let Some((program, cmd_args)) = command {
        let _ = std::process::Command::new(program)
            .args(cmd_args)
            .spawn();
    }
}
