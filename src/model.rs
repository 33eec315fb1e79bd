use serde::{Deserialize, Serialize};

/// Row id of a symbol in the store.
pub type SymbolId = i64;
/// Row id of an entrypoint in the store.
pub type EntrypointId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Func,
    Method,
    Type,
    Var,
    Const,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Func => "func",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Var => "var",
            SymbolKind::Const => "const",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "func" => Some(SymbolKind::Func),
            "method" => Some(SymbolKind::Method),
            "type" => Some(SymbolKind::Type),
            "var" => Some(SymbolKind::Var),
            "const" => Some(SymbolKind::Const),
            _ => None,
        }
    }

    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Func | SymbolKind::Method)
    }
}

/// How a call site reaches its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Direct function call.
    Static,
    /// Call through an interface method.
    Interface,
    /// Call through a function value.
    Funcval,
    /// Deferred call.
    Defer,
    /// Goroutine launch.
    Go,
    /// Dynamic dispatch the extractor could not resolve. Kept in the schema
    /// for forward compatibility; never emitted today.
    Unknown,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Static => "static",
            CallKind::Interface => "interface",
            CallKind::Funcval => "funcval",
            CallKind::Defer => "defer",
            CallKind::Go => "go",
            CallKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "static" => Some(CallKind::Static),
            "interface" => Some(CallKind::Interface),
            "funcval" => Some(CallKind::Funcval),
            "defer" => Some(CallKind::Defer),
            "go" => Some(CallKind::Go),
            "unknown" => Some(CallKind::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointType {
    Http,
    Grpc,
    Cli,
    Main,
}

impl EntrypointType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntrypointType::Http => "http",
            EntrypointType::Grpc => "grpc",
            EntrypointType::Cli => "cli",
            EntrypointType::Main => "main",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(EntrypointType::Http),
            "grpc" => Some(EntrypointType::Grpc),
            "cli" => Some(EntrypointType::Cli),
            "main" => Some(EntrypointType::Main),
            _ => None,
        }
    }
}

/// A top-level Go declaration (function, method, type, var, const).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub pkg_path: String,
    pub name: String,
    pub kind: SymbolKind,
    /// For methods, the receiver type name with a leading `*` for pointer
    /// receivers. Empty for non-methods.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recv_type: String,
    pub file: String,
    pub line: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sig: String,
}

/// A Go package as loaded from the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub pkg_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    pub dir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub layer: String,
}

/// A directed caller → callee relation, one row per call-site location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller_id: SymbolId,
    pub callee_id: SymbolId,
    pub caller_file: String,
    pub caller_line: i64,
    pub call_kind: CallKind,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrypoint {
    pub id: EntrypointId,
    #[serde(rename = "type")]
    pub ep_type: EntrypointType,
    /// Human-readable label, e.g. "GET /api/users".
    pub label: String,
    pub symbol_id: SymbolId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub meta_json: String,
    pub discovery_method: String,
}

/// An entrypoint joined with its handler symbol, as served to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointWithSymbol {
    #[serde(flatten)]
    pub entrypoint: Entrypoint,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub symbol_id: SymbolId,
    pub tag: String,
    pub reason: String,
}

/// Filter for entrypoint listing.
#[derive(Debug, Clone, Default)]
pub struct EntrypointFilter {
    pub ep_type: Option<EntrypointType>,
    pub query: Option<String>,
    pub limit: Option<usize>,
}

/// A callee of a symbol, as read back from the store.
#[derive(Debug, Clone, Serialize)]
pub struct CalleeInfo {
    pub symbol: Symbol,
    pub call_kind: CallKind,
    pub count: i64,
    pub caller_file: String,
    pub caller_line: i64,
}

/// A caller of a symbol, as read back from the store.
#[derive(Debug, Clone, Serialize)]
pub struct CallerInfo {
    pub symbol: Symbol,
    pub call_kind: CallKind,
    pub count: i64,
    pub caller_file: String,
    pub caller_line: i64,
}

/// Slim symbol view used by the tagging passes.
#[derive(Debug, Clone)]
pub struct SymbolForTagging {
    pub id: SymbolId,
    pub pkg_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub recv_type: String,
}

/// A callee with its tags, used by the purity pass.
#[derive(Debug, Clone)]
pub struct SymbolCallee {
    pub callee_id: SymbolId,
    pub tags: Vec<String>,
}

/// Index statistics reported by `/api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub package_count: i64,
    pub symbol_count: i64,
    pub call_edge_count: i64,
    pub entrypoint_count: i64,
    pub tag_count: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub indexed_at: String,
}

/// Sidecar document written next to the database for quick UI boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: String,
    pub project_path: String,
    pub indexed_at: String,
    pub package_count: i64,
    pub symbol_count: i64,
    pub entrypoint_count: i64,
    pub packages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        for kind in [
            SymbolKind::Func,
            SymbolKind::Method,
            SymbolKind::Type,
            SymbolKind::Var,
            SymbolKind::Const,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("module"), None);
    }

    #[test]
    fn call_kind_round_trips() {
        for kind in [
            CallKind::Static,
            CallKind::Interface,
            CallKind::Funcval,
            CallKind::Defer,
            CallKind::Go,
            CallKind::Unknown,
        ] {
            assert_eq!(CallKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn entrypoint_serializes_type_field() {
        let ep = Entrypoint {
            id: 1,
            ep_type: EntrypointType::Http,
            label: "GET /users".to_string(),
            symbol_id: 42,
            meta_json: String::new(),
            discovery_method: "router".to_string(),
        };
        let value = serde_json::to_value(&ep).unwrap();
        assert_eq!(value["type"], "http");
        assert_eq!(value["label"], "GET /users");
    }
}
