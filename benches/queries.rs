use criterion::{Criterion, black_box, criterion_group, criterion_main};
use flowlens::config::Config;
use flowlens::db::Store;
use flowlens::graph::{GraphBuilder, GraphFilter};
use flowlens::indexer::Indexer;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Generate and index a synthetic layered project with a few hundred
/// functions so graph traversal has something to chew on.
fn setup_indexed_project() -> (PathBuf, Store) {
    let root = std::env::temp_dir().join(format!(
        "flowlens-bench-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("go.mod"), "module bench.example/app\n").unwrap();

    for pkg in 0..10 {
        let dir = root.join(format!("pkg{pkg}"));
        std::fs::create_dir_all(&dir).unwrap();
        let mut source = format!("package pkg{pkg}\n\n");
        if pkg > 0 {
            writeln!(source, "import \"bench.example/app/pkg{}\"\n", pkg - 1).unwrap();
        }
        for f in 0..30 {
            writeln!(source, "func Fn{f}() {{").unwrap();
            if f + 1 < 30 {
                writeln!(source, "\tFn{}()", f + 1).unwrap();
            } else if pkg > 0 {
                writeln!(source, "\tpkg{}.Fn0()", pkg - 1).unwrap();
            }
            writeln!(source, "}}\n").unwrap();
        }
        std::fs::write(dir.join("funcs.go"), source).unwrap();
    }

    Indexer::new(Config::default(), &root).run().unwrap();
    let store = Store::open(&root).unwrap();
    (root, store)
}

fn bench_queries(c: &mut Criterion) {
    let (root, store) = setup_indexed_project();
    let root_id = store
        .get_symbol_id("bench.example/app/pkg9", "Fn0", "")
        .unwrap()
        .unwrap();

    c.bench_function("graph_root_depth_6", |b| {
        b.iter(|| {
            let graph = GraphBuilder::new(&store, GraphFilter::default())
                .build_from_root(black_box(root_id), 6)
                .unwrap();
            black_box(graph.nodes.len())
        })
    });

    c.bench_function("search_symbols", |b| {
        b.iter(|| {
            let results = store.search_symbols(black_box("Fn1"), 50).unwrap();
            black_box(results.len())
        })
    });

    let _ = std::fs::remove_dir_all(&root);
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
