use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Project configuration, read from `flowlens.yaml` at the project root.
/// Keys present in the file replace the corresponding built-in default
/// wholesale; absent keys keep the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exclude: ExcludeConfig,
    pub layers: BTreeMap<String, Vec<String>>,
    pub io_packages: BTreeMap<String, Vec<String>>,
    pub noise_packages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    pub dirs: Vec<String>,
    pub files_glob: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(
            "handler".to_string(),
            vec_of(&["**/handlers/**", "**/http/**", "**/api/**"]),
        );
        layers.insert(
            "service".to_string(),
            vec_of(&["**/service/**", "**/services/**"]),
        );
        layers.insert(
            "store".to_string(),
            vec_of(&["**/store/**", "**/stores/**", "**/repo/**", "**/repository/**"]),
        );
        layers.insert(
            "domain".to_string(),
            vec_of(&["**/domain/**", "**/model/**", "**/models/**"]),
        );

        let mut io_packages = BTreeMap::new();
        io_packages.insert(
            "db".to_string(),
            vec_of(&[
                "database/sql",
                "github.com/jackc/pgx",
                "github.com/jackc/pgx/*",
                "github.com/lib/pq",
                "gorm.io/*",
                "github.com/go-sql-driver/mysql",
                "go.mongodb.org/mongo-driver/*",
            ]),
        );
        io_packages.insert(
            "net".to_string(),
            vec_of(&[
                "net/http",
                "google.golang.org/grpc",
                "google.golang.org/grpc/*",
                "github.com/go-resty/resty/*",
            ]),
        );
        io_packages.insert("fs".to_string(), vec_of(&["os", "io/ioutil", "io/fs"]));
        io_packages.insert(
            "bus".to_string(),
            vec_of(&[
                "github.com/nats-io/*",
                "github.com/segmentio/kafka-go",
                "github.com/rabbitmq/amqp091-go",
            ]),
        );

        Self {
            exclude: ExcludeConfig {
                dirs: vec_of(&["vendor", "third_party", "testdata"]),
                files_glob: vec_of(&["**/*.pb.go", "**/*_gen.go", "**/*_mock.go"]),
            },
            layers,
            io_packages,
            noise_packages: vec_of(&[
                "log",
                "log/slog",
                "go.uber.org/zap",
                "go.uber.org/zap/*",
                "github.com/sirupsen/logrus",
                "github.com/rs/zerolog",
                "github.com/rs/zerolog/*",
                "github.com/prometheus/client_golang/*",
                "go.opentelemetry.io/otel/*",
            ]),
        }
    }
}

fn vec_of(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(config_path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading config {}", config_path.display()));
            }
        };

        let file_cfg: Config = serde_yaml_ng::from_str(&data)
            .with_context(|| format!("parsing config {}", config_path.display()))?;

        let mut cfg = Self::default();
        cfg.merge(file_cfg);
        Ok(cfg)
    }

    /// Load `flowlens.yaml` from the given project directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load(&dir.join("flowlens.yaml"))
    }

    fn merge(&mut self, other: Config) {
        if !other.exclude.dirs.is_empty() {
            self.exclude.dirs = other.exclude.dirs;
        }
        if !other.exclude.files_glob.is_empty() {
            self.exclude.files_glob = other.exclude.files_glob;
        }
        if !other.layers.is_empty() {
            self.layers = other.layers;
        }
        if !other.io_packages.is_empty() {
            self.io_packages = other.io_packages;
        }
        if !other.noise_packages.is_empty() {
            self.noise_packages = other.noise_packages;
        }
    }

    /// Whether a module-relative directory path is excluded from indexing.
    pub fn is_excluded_dir(&self, rel_dir: &str) -> bool {
        let first = rel_dir.split('/').next().unwrap_or(rel_dir);
        self.exclude.dirs.iter().any(|d| d == first || d == rel_dir)
    }

    /// Whether a file path matches any exclusion glob.
    pub fn is_excluded_file(&self, path: &str) -> bool {
        self.exclude
            .files_glob
            .iter()
            .any(|pattern| matches_glob(path, pattern))
    }

    /// The layer name for a package path, or None when no pattern matches.
    /// First matching layer wins.
    pub fn layer_for_package(&self, pkg_path: &str) -> Option<&str> {
        for (layer, patterns) in &self.layers {
            for pattern in patterns {
                if match_layer_pattern(pattern, pkg_path) {
                    return Some(layer);
                }
            }
        }
        None
    }

    /// The I/O category (db, net, fs, bus) for an imported package path.
    pub fn io_category(&self, pkg_path: &str) -> Option<&str> {
        for (category, packages) in &self.io_packages {
            for pkg in packages {
                if pkg == pkg_path {
                    return Some(category);
                }
                if let Some(prefix) = pkg.strip_suffix('*') {
                    if pkg_path.starts_with(prefix) {
                        return Some(category);
                    }
                }
            }
        }
        None
    }

    pub fn is_noise_package(&self, pkg_path: &str) -> bool {
        self.noise_packages.iter().any(|noise| {
            if noise == pkg_path {
                return true;
            }
            if let Some(prefix) = noise.strip_suffix('*') {
                return pkg_path.starts_with(prefix);
            }
            false
        })
    }
}

/// Simplified glob match for file exclusion patterns.
/// `**/` prefix means "anywhere in the path"; a `*.ext` suffix pattern
/// matches by extension.
pub fn matches_glob(path: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("**/") {
        return matches_suffix(path, suffix);
    }
    matches_suffix(path.rsplit('/').next().unwrap_or(path), pattern)
}

fn matches_suffix(path: &str, suffix: &str) -> bool {
    if let Some(ext) = suffix.strip_prefix('*') {
        return path.ends_with(ext);
    }
    path.ends_with(suffix)
}

/// Layer pattern matching. `**/X/**` matches when the package path contains
/// `/X/` or starts with `X/`.
fn match_layer_pattern(pattern: &str, pkg_path: &str) -> bool {
    if pattern.len() >= 4 && pattern.starts_with("**") && pattern.ends_with("**") {
        let middle = &pattern[2..pattern.len() - 2];
        if pkg_path.contains(middle) {
            return true;
        }
        if let Some(trimmed) = middle.strip_prefix('/') {
            return pkg_path.starts_with(trimmed);
        }
        return false;
    }
    pattern == pkg_path
}
