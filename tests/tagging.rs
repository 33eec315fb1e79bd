use flowlens::config::Config;
use flowlens::db::Store;
use flowlens::indexer::Indexer;
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

fn tag_reason(store: &Store, id: i64, tag: &str) -> Option<String> {
    store
        .get_symbol_tags(id)
        .unwrap()
        .into_iter()
        .find(|t| t.tag == tag)
        .map(|t| t.reason)
}

const LAYERED_PROJECT: &[(&str, &str)] = &[
    ("go.mod", "module example.com/layered\n"),
    (
        "internal/store/users/user.go",
        r#"package users

type UserStore struct{}

func (s *UserStore) FindByID(id int) int {
	return id
}
"#,
    ),
    (
        "internal/service/users/service.go",
        r#"package users

import storeusers "example.com/layered/internal/store/users"

type UserService struct {
	users *storeusers.UserStore
}

func (s *UserService) GetUser(id int) int {
	return s.users.FindByID(id)
}
"#,
    ),
    (
        "internal/util/math.go",
        r#"package util

func Helper() int {
	return 1
}

func Main() int {
	return Helper()
}
"#,
    ),
];

#[test]
fn receiver_type_gets_io_db_tag() {
    let (_dir, store) = index_project(LAYERED_PROJECT);
    let find = store
        .get_symbol_id("example.com/layered/internal/store/users", "FindByID", "*UserStore")
        .unwrap()
        .unwrap();
    assert_eq!(
        tag_reason(&store, find, "io:db"),
        Some("Method on *UserStore type".to_string())
    );
}

#[test]
fn layer_tags_follow_package_paths() {
    let (_dir, store) = index_project(LAYERED_PROJECT);

    let find = store
        .get_symbol_id("example.com/layered/internal/store/users", "FindByID", "*UserStore")
        .unwrap()
        .unwrap();
    assert_eq!(
        tag_reason(&store, find, "layer:store"),
        Some("Package path matches store layer pattern".to_string())
    );

    let get_user = store
        .get_symbol_id(
            "example.com/layered/internal/service/users",
            "GetUser",
            "*UserService",
        )
        .unwrap()
        .unwrap();
    assert!(tag_reason(&store, get_user, "layer:service").is_some());

    let helper = store
        .get_symbol_id("example.com/layered/internal/util", "Helper", "")
        .unwrap()
        .unwrap();
    assert!(store
        .get_symbol_tags(helper)
        .unwrap()
        .iter()
        .all(|t| !t.tag.starts_with("layer:")));
}

#[test]
fn purity_propagates_from_depth_one_callees() {
    let (_dir, store) = index_project(LAYERED_PROJECT);

    // Leaf with no outgoing calls.
    let helper = store
        .get_symbol_id("example.com/layered/internal/util", "Helper", "")
        .unwrap()
        .unwrap();
    assert_eq!(
        tag_reason(&store, helper, "pure-ish"),
        Some("No outgoing function calls".to_string())
    );

    // Caller whose only callee carries no io tag.
    let main_fn = store
        .get_symbol_id("example.com/layered/internal/util", "Main", "")
        .unwrap()
        .unwrap();
    assert_eq!(
        tag_reason(&store, main_fn, "pure-ish"),
        Some("No calls to I/O functions".to_string())
    );

    // Caller of an io:db method is not pure-ish.
    let get_user = store
        .get_symbol_id(
            "example.com/layered/internal/service/users",
            "GetUser",
            "*UserService",
        )
        .unwrap()
        .unwrap();
    assert_eq!(tag_reason(&store, get_user, "pure-ish"), None);
}

#[test]
fn one_layer_tag_per_symbol() {
    let (_dir, store) = index_project(LAYERED_PROJECT);
    let find = store
        .get_symbol_id("example.com/layered/internal/store/users", "FindByID", "*UserStore")
        .unwrap()
        .unwrap();
    let layer_tags: Vec<_> = store
        .get_symbol_tags(find)
        .unwrap()
        .into_iter()
        .filter(|t| t.tag.starts_with("layer:"))
        .collect();
    assert_eq!(layer_tags.len(), 1);
}

#[test]
fn type_symbols_are_not_tagged() {
    let (_dir, store) = index_project(LAYERED_PROJECT);
    let user_store = store
        .get_symbol_id("example.com/layered/internal/store/users", "UserStore", "")
        .unwrap()
        .unwrap();
    assert!(store.get_symbol_tags(user_store).unwrap().is_empty());
}
