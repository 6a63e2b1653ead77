use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_DATA_DIR: &str = "data/processed";
pub const DEFAULT_MODEL_PATH: &str = "models/svd_model.bin";

/// Which trained artifact the server answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Svd,
    Knn,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Svd => write!(f, "svd"),
            ModelKind::Knn => write!(f, "knn"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svd" => Ok(ModelKind::Svd),
            "knn" => Ok(ModelKind::Knn),
            other => Err(format!("unknown model kind '{other}', expected svd or knn")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory holding the processed rating and movie tables
    pub data_dir: PathBuf,
    pub model_path: PathBuf,
    pub model_kind: ModelKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_kind: ModelKind::Svd,
        }
    }
}

impl ServerConfig {
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = model_path.into();
        self
    }

    pub fn with_model_kind(mut self, model_kind: ModelKind) -> Self {
        self.model_kind = model_kind;
        self
    }
}
