use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flowlens",
    version,
    about = "Visualize forward call graphs from Go entrypoints",
    after_help = r#"Examples:
  flowlens index .
  flowlens index ./my-service --config flowlens.yaml
  flowlens ui . --port 8080
  flowlens ui ./my-service --no-browser
"#
)]
pub struct Args {
    /// Config file (default is ./flowlens.yaml in the project directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Index a Go project and build the call graph.
    Index {
        /// Project directory to index.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Start the FlowLens UI server over an existing index.
    Ui {
        /// Project directory (must already be indexed).
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Port to run the UI server on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
        /// Don't open the browser automatically.
        #[arg(long)]
        no_browser: bool,
    },
}
