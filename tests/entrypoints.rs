use flowlens::config::Config;
use flowlens::db::Store;
use flowlens::indexer::Indexer;
use flowlens::model::{EntrypointFilter, EntrypointType, EntrypointWithSymbol};
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

fn entrypoints_of(store: &Store, ep_type: EntrypointType) -> Vec<EntrypointWithSymbol> {
    store
        .get_entrypoints(&EntrypointFilter {
            ep_type: Some(ep_type),
            ..Default::default()
        })
        .unwrap()
}

#[test]
fn chi_router_three_routes() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/api\n"),
        (
            "main.go",
            r#"package main

import (
	"net/http"

	"github.com/go-chi/chi/v5"
)

func main() {
	r := chi.NewRouter()
	r.Get("/u", GetU)
	r.Post("/u", CreateU)
	r.Delete("/u/{id}", DeleteU)
	http.ListenAndServe(":8080", r)
}

func GetU(w http.ResponseWriter, r *http.Request)    {}
func CreateU(w http.ResponseWriter, r *http.Request) {}
func DeleteU(w http.ResponseWriter, r *http.Request) {}
"#,
        ),
    ]);

    let https = entrypoints_of(&store, EntrypointType::Http);
    let labels: Vec<&str> = https
        .iter()
        .map(|ep| ep.entrypoint.label.as_str())
        .collect();
    assert!(labels.contains(&"GET /u"));
    assert!(labels.contains(&"POST /u"));
    assert!(labels.contains(&"DELETE /u/{id}"));
    assert_eq!(https.len(), 3);

    let get_u = https
        .iter()
        .find(|ep| ep.entrypoint.label == "GET /u")
        .unwrap();
    assert_eq!(get_u.symbol.name, "GetU");
    let meta: serde_json::Value = serde_json::from_str(&get_u.entrypoint.meta_json).unwrap();
    assert_eq!(meta["method"], "GET");
    assert_eq!(meta["path"], "/u");
}

#[test]
fn gin_uppercase_verbs_and_any() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/ginapp\n"),
        (
            "main.go",
            r#"package main

import "github.com/gin-gonic/gin"

func main() {
	r := gin.Default()
	r.GET("/items", ListItems)
	r.Any("/ping", Ping)
}

func ListItems(c *gin.Context) {}
func Ping(c *gin.Context)      {}
"#,
        ),
    ]);

    let https = entrypoints_of(&store, EntrypointType::Http);
    let labels: Vec<&str> = https
        .iter()
        .map(|ep| ep.entrypoint.label.as_str())
        .collect();
    assert!(labels.contains(&"GET /items"));
    assert!(labels.contains(&"ANY /ping"));
}

#[test]
fn cobra_commands_run_and_run_e() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/tool\n"),
        (
            "main.go",
            r#"package main

import "github.com/spf13/cobra"

var serveCmd = &cobra.Command{
	Use: "serve",
	Run: runServe,
}

var migrateCmd = &cobra.Command{
	Use:  "migrate [target]",
	RunE: runMigrate,
}

func runServe(cmd *cobra.Command, args []string)         {}
func runMigrate(cmd *cobra.Command, args []string) error { return nil }

func main() {}
"#,
        ),
    ]);

    let clis = entrypoints_of(&store, EntrypointType::Cli);
    assert_eq!(clis.len(), 2);

    let serve = clis
        .iter()
        .find(|ep| ep.entrypoint.label == "serve")
        .unwrap();
    assert_eq!(serve.symbol.name, "runServe");
    let meta: serde_json::Value = serde_json::from_str(&serve.entrypoint.meta_json).unwrap();
    assert_eq!(meta["command"], "serve");
    assert!(meta.get("uses_run_e").is_none());

    let migrate = clis
        .iter()
        .find(|ep| ep.entrypoint.label == "migrate")
        .unwrap();
    assert_eq!(migrate.symbol.name, "runMigrate");
    let meta: serde_json::Value = serde_json::from_str(&migrate.entrypoint.meta_json).unwrap();
    assert_eq!(meta["command"], "migrate");
    assert_eq!(meta["uses_run_e"], true);
}

#[test]
fn grpc_service_registration() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/rpcapp\n"),
        (
            "main.go",
            r#"package main

import (
	"context"

	pb "example.com/rpcapp/gen"
	"google.golang.org/grpc"
)

type userServer struct{}

func (s *userServer) GetUser(ctx context.Context, req *pb.GetUserRequest) (*pb.GetUserResponse, error) {
	return nil, nil
}

func (s *userServer) unexported(ctx context.Context, req *pb.GetUserRequest) (*pb.GetUserResponse, error) {
	return nil, nil
}

func main() {
	srv := grpc.NewServer()
	pb.RegisterUserServiceServer(srv, &userServer{})
}
"#,
        ),
    ]);

    let grpcs = entrypoints_of(&store, EntrypointType::Grpc);
    assert_eq!(grpcs.len(), 1);
    assert_eq!(grpcs[0].entrypoint.label, "UserService/GetUser");
    assert_eq!(grpcs[0].symbol.name, "GetUser");
    assert_eq!(grpcs[0].symbol.recv_type, "*userServer");

    let meta: serde_json::Value =
        serde_json::from_str(&grpcs[0].entrypoint.meta_json).unwrap();
    assert_eq!(meta["service"], "UserService");
    assert_eq!(meta["method"], "GetUser");
}

#[test]
fn handler_discovered_by_signature() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/disco\n"),
        (
            "main.go",
            r#"package main

import "net/http"

func main() {
	http.HandleFunc("/registered", Registered)
}

func Registered(w http.ResponseWriter, r *http.Request) {}

func Orphan(w http.ResponseWriter, r *http.Request) {}

func helper(w http.ResponseWriter, r *http.Request) {}
"#,
        ),
    ]);

    let https = entrypoints_of(&store, EntrypointType::Http);

    let registered = https
        .iter()
        .find(|ep| ep.symbol.name == "Registered")
        .unwrap();
    assert_eq!(registered.entrypoint.discovery_method, "router");

    // Exported, unregistered, handler-shaped: picked up by signature.
    let orphan = https.iter().find(|ep| ep.symbol.name == "Orphan").unwrap();
    assert_eq!(orphan.entrypoint.discovery_method, "signature");
    assert_eq!(orphan.entrypoint.label, "Orphan");
    let meta: serde_json::Value = serde_json::from_str(&orphan.entrypoint.meta_json).unwrap();
    assert_eq!(meta["method"], "ANY");
    assert_eq!(meta["path"], "");

    // Unexported functions are not discovered.
    assert!(!https.iter().any(|ep| ep.symbol.name == "helper"));
}

#[test]
fn query_filter_matches_labels_and_names() {
    let (_dir, store) = index_project(&[
        ("go.mod", "module example.com/filters\n"),
        (
            "main.go",
            r#"package main

import "net/http"

func main() {
	http.HandleFunc("/users", HandleUsers)
	http.HandleFunc("/orders", HandleOrders)
}

func HandleUsers(w http.ResponseWriter, r *http.Request)  {}
func HandleOrders(w http.ResponseWriter, r *http.Request) {}
"#,
        ),
    ]);

    let filtered = store
        .get_entrypoints(&EntrypointFilter {
            ep_type: Some(EntrypointType::Http),
            query: Some("users".to_string()),
            limit: None,
        })
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].symbol.name, "HandleUsers");

    let limited = store
        .get_entrypoints(&EntrypointFilter {
            ep_type: None,
            query: None,
            limit: Some(1),
        })
        .unwrap();
    assert_eq!(limited.len(), 1);
}
