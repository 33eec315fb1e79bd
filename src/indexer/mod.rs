pub mod callgraph;
pub mod cfg;
pub mod entrypoints;
pub mod handler_discovery;
pub mod loader;
pub mod ssa;
pub mod symbols;
pub mod syntax;
pub mod tagger;

use crate::config::Config;
use crate::db::Store;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Results of one indexing run.
#[derive(Debug, Default)]
pub struct IndexResult {
    pub package_count: i64,
    pub symbol_count: i64,
    pub call_edge_count: usize,
    pub static_calls: usize,
    pub interface_calls: usize,
    pub defer_calls: usize,
    pub go_calls: usize,
    pub entrypoint_count: i64,
    pub http_entrypoints: usize,
    pub grpc_entrypoints: usize,
    pub cli_entrypoints: usize,
    pub main_entrypoints: usize,
    pub tag_count: usize,
    pub io_tags: usize,
    pub layer_tags: usize,
    pub purity_tags: usize,
    pub duration: Duration,
    pub db_path: PathBuf,
}

/// Coordinates the indexing pipeline: load → symbols → entrypoints → SSA →
/// call edges → handler discovery → tags → metadata. Readers never observe
/// a partial generation; each stage commits as a whole.
pub struct Indexer {
    cfg: Config,
    project_dir: PathBuf,
}

impl Indexer {
    pub fn new(cfg: Config, project_dir: &Path) -> Self {
        let project_dir = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());
        Self { cfg, project_dir }
    }

    pub fn run(&self) -> Result<IndexResult> {
        let start = Instant::now();

        let store = Store::open(&self.project_dir).context("opening store")?;
        store.clear().context("clearing store")?;

        println!("Loading packages...");
        let mut loader = loader::Loader::new(self.cfg.clone(), &self.project_dir);
        loader.load().context("loading packages")?;
        report_loader_errors(loader.errors());
        println!("Loaded {} packages", loader.packages().len());

        println!("Extracting symbols...");
        let symbol_count =
            symbols::extract_symbols(&loader, &self.cfg, &store).context("extracting symbols")?;
        println!("Extracted {symbol_count} symbols");

        println!("Detecting entrypoints...");
        let ep_result = {
            let batch = store.begin_batch().context("starting entrypoint batch")?;
            let result = entrypoints::EntrypointDetector::new(&loader).detect(&batch)?;
            batch.commit().context("committing entrypoint batch")?;
            result
        };
        println!(
            "Found {} entrypoints ({} http, {} grpc, {} cli, {} main)",
            ep_result.total_count,
            ep_result.http_count,
            ep_result.grpc_count,
            ep_result.cli_count,
            ep_result.main_count
        );

        println!("Building call graph...");
        let program = ssa::build_program(&loader);
        let mut builder = callgraph::CallGraphBuilder::new(&loader, &program);
        builder.set_progress_callback(|current, total| {
            if current % 500 == 0 || current == total {
                println!("  Processing functions: {current}/{total}");
            }
        });
        let cg_result = builder
            .extract_call_edges(&store)
            .context("extracting call edges")?;
        println!(
            "Extracted {} call edges ({} static, {} interface, {} defer, {} go)",
            cg_result.edge_count,
            cg_result.static_calls,
            cg_result.interface_calls,
            cg_result.defer_calls,
            cg_result.go_calls
        );

        let discovered = {
            let batch = store.begin_batch().context("starting discovery batch")?;
            let result =
                handler_discovery::HandlerDiscovery::new(&loader, &program).discover(&batch)?;
            batch.commit().context("committing discovery batch")?;
            result
        };
        if discovered.total_count > 0 {
            println!(
                "Discovered {} handlers by signature",
                discovered.total_count
            );
        }

        println!("Applying tags...");
        let tag_result = tagger::Tagger::new(&self.cfg, &store)
            .tag()
            .context("tagging")?;
        println!(
            "Applied {} tags ({} io, {} layer, {} purity)",
            tag_result.total_tags, tag_result.io_tags, tag_result.layer_tags, tag_result.purity_tags
        );

        store
            .set_metadata("indexed_at", &chrono::Utc::now().to_rfc3339())
            .context("storing metadata")?;
        store
            .set_metadata("project_dir", &self.project_dir.to_string_lossy())
            .context("storing metadata")?;

        let stats = store.get_stats().context("getting stats")?;
        store.write_index_json().context("writing index.json")?;

        Ok(IndexResult {
            package_count: stats.package_count,
            symbol_count: stats.symbol_count,
            call_edge_count: cg_result.edge_count,
            static_calls: cg_result.static_calls,
            interface_calls: cg_result.interface_calls,
            defer_calls: cg_result.defer_calls,
            go_calls: cg_result.go_calls,
            entrypoint_count: stats.entrypoint_count,
            http_entrypoints: ep_result.http_count + discovered.total_count,
            grpc_entrypoints: ep_result.grpc_count,
            cli_entrypoints: ep_result.cli_count,
            main_entrypoints: ep_result.main_count,
            tag_count: tag_result.total_tags,
            io_tags: tag_result.io_tags,
            layer_tags: tag_result.layer_tags,
            purity_tags: tag_result.purity_tags,
            duration: start.elapsed(),
            db_path: store.db_path().to_path_buf(),
        })
    }
}

/// Print the first few loader errors verbatim with a total count. Loading
/// is tolerant: indexing continues if any packages loaded.
fn report_loader_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("Warning: {} package loading errors", errors.len());
    for err in errors.iter().take(5) {
        println!("  - {err}");
    }
    if errors.len() > 5 {
        println!("  ... and {} more", errors.len() - 5);
    }
}
