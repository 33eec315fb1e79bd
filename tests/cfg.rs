use flowlens::config::Config;
use flowlens::db::Store;
use flowlens::error::QueryError;
use flowlens::indexer::Indexer;
use flowlens::indexer::cfg::{CfgBuilder, CfgInfo};
use std::fs;
use tempfile::TempDir;

fn index_project(files: &[(&str, &str)]) -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    Indexer::new(Config::default(), dir.path()).run().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

const PROJECT: &[(&str, &str)] = &[
    ("go.mod", "module example.com/flow\n"),
    (
        "main.go",
        r#"package main

func main() {
	process(true)
}

func process(ok bool) int {
	n := 0
	if !ok {
		n = fallback()
	} else {
		n = 1
	}
	return n
}

func fallback() int {
	return -1
}

func looper(limit int) int {
	total := 0
	for i := 0; i < limit; i++ {
		total += i
	}
	return total
}
"#,
    ),
];

fn build(store: &Store, pkg: &str, name: &str) -> CfgInfo {
    let id = store.get_symbol_id(pkg, name, "").unwrap().unwrap();
    CfgBuilder::new(store).build_cfg(id).unwrap()
}

#[test]
fn branching_function_has_entry_exits_and_condition() {
    let (_dir, store) = index_project(PROJECT);
    let cfg = build(&store, "example.com/flow", "process");

    assert_eq!(cfg.name, "process");
    assert_eq!(cfg.entry_block, 0);
    assert!(cfg.blocks.len() >= 4);
    assert!(cfg.blocks[0].is_entry);
    assert_eq!(cfg.blocks[0].successors.len(), 2);
    assert_eq!(cfg.blocks[0].branch_cond, "!ok");
    assert!(!cfg.exit_blocks.is_empty());
    for exit in &cfg.exit_blocks {
        assert!(cfg.blocks[*exit].is_exit);
        assert!(cfg.blocks[*exit].successors.is_empty());
    }

    // The then-branch call to fallback carries its resolved symbol id.
    let fallback_id = store
        .get_symbol_id("example.com/flow", "fallback", "")
        .unwrap()
        .unwrap();
    let callee_ids: Vec<i64> = cfg
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter_map(|i| i.callee_id)
        .collect();
    assert!(callee_ids.contains(&fallback_id));

    // The join block carries a phi for the branch-assigned variable.
    let has_phi = cfg
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| i.op == "phi");
    assert!(has_phi);
}

#[test]
fn predecessors_mirror_successors() {
    let (_dir, store) = index_project(PROJECT);
    let cfg = build(&store, "example.com/flow", "looper");

    for block in &cfg.blocks {
        for succ in &block.successors {
            assert!(
                cfg.blocks[*succ].predecessors.contains(&block.index),
                "block {} missing predecessor {}",
                succ,
                block.index
            );
        }
    }

    // The loop produces a back edge.
    assert!(cfg
        .blocks
        .iter()
        .any(|b| b.successors.iter().any(|s| *s < b.index)));
}

#[test]
fn missing_symbol_is_not_found() {
    let (_dir, store) = index_project(PROJECT);
    let err = CfgBuilder::new(&store).build_cfg(99999).unwrap_err();
    assert!(matches!(err, QueryError::NotFound(_)));
}

#[test]
fn non_function_symbol_is_analysis_error() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/types\n"),
        (
            "main.go",
            "package main\n\ntype Widget struct{}\n\nfunc main() {}\n",
        ),
    ]);
    let widget = store
        .get_symbol_id("example.com/types", "Widget", "")
        .unwrap()
        .unwrap();
    let err = CfgBuilder::new(&store).build_cfg(widget).unwrap_err();
    assert!(matches!(err, QueryError::Analysis(_)));
}
