use facetag_core::memory::{DEFAULT_MAX_ENTRIES, DEFAULT_RETAIN_ENTRIES};
use facetag_core::matcher::DEFAULT_MATCH_THRESHOLD;
use facetag_core::resolver::DEFAULT_BUCKET_SIZE;
use facetag_core::{MemoryConfig, ModelPaths, ResolverSettings, Sentinels};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (default: 0.0.0.0).
    pub bind: IpAddr,
    /// Listen port, from `PORT` (default: 10000).
    pub port: u16,
    /// ONNX descriptor model.
    pub model_path: PathBuf,
    /// JSON reference database.
    pub reference_db: PathBuf,
    /// Extra name-only identities.
    pub known_names: Vec<String>,
    /// Euclidean distance below which a descriptor matches.
    pub match_threshold: f32,
    /// Identity memory bound.
    pub memory_max: usize,
    /// Entries kept when the bound is exceeded.
    pub memory_retain: usize,
    /// Position bucket size in pixels of the working frame.
    pub bucket_size: u32,
    /// Working frame resolution every upload is resized to.
    pub frame_width: u32,
    pub frame_height: u32,
    pub sentinels: Sentinels,
    /// Browser client served at `/` when set.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACETAG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facetag");

        let model_path = std::env::var("FACETAG_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facenet.onnx"));

        let reference_db = std::env::var("FACETAG_REFERENCE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("face_database.json"));

        let defaults = Sentinels::default();

        Self {
            bind: std::env::var("FACETAG_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: env_parse("PORT", 10000),
            model_path,
            reference_db,
            known_names: std::env::var("FACETAG_KNOWN_NAMES")
                .map(|v| parse_names(&v))
                .unwrap_or_default(),
            match_threshold: env_parse("FACETAG_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            memory_max: env_parse("FACETAG_MEMORY_MAX", DEFAULT_MAX_ENTRIES),
            memory_retain: env_parse("FACETAG_MEMORY_RETAIN", DEFAULT_RETAIN_ENTRIES),
            bucket_size: env_parse("FACETAG_BUCKET_SIZE", DEFAULT_BUCKET_SIZE),
            frame_width: env_parse("FACETAG_FRAME_WIDTH", 160),
            frame_height: env_parse("FACETAG_FRAME_HEIGHT", 120),
            sentinels: Sentinels {
                unknown: env_string("FACETAG_UNKNOWN_LABEL", defaults.unknown),
                error: env_string("FACETAG_ERROR_LABEL", defaults.error),
                no_face: env_string("FACETAG_NO_FACE_LABEL", defaults.no_face),
            },
            static_dir: std::env::var("FACETAG_STATIC_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            descriptor_model: Some(self.model_path.clone()),
            reference_db: Some(self.reference_db.clone()),
            known_names: self.known_names.clone(),
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig::new(self.memory_max, self.memory_retain)
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            bucket_size: self.bucket_size,
            match_threshold: self.match_threshold,
            sentinels: self.sentinels.clone(),
        }
    }
}

/// Split a comma-separated name list, dropping blanks.
pub fn parse_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}
