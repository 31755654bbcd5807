use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::ApiError;

/// Environment variables that override individual config keys, as
/// `(variable, dotted config path)` pairs. Applied after the YAML merge so
/// deployment credentials never have to live on disk.
const ENV_OVERRIDES: [(&str, &str); 5] = [
    ("DEEPSEEK_API_KEY", "llm.deepseek.api_key"),
    ("DOUBAO_API_KEY", "llm.doubao.api_key"),
    ("PUBMED_API_KEY", "pubmed.api_key"),
    ("PUBMED_EMAIL", "pubmed.email"),
    ("JWT_SECRET", "jwt.secret"),
];

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("medassist.db");
        let secrets_path = data_dir.join("secrets.yaml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            data_dir,
            log_dir,
            db_path,
            secrets_path,
        }
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("MEDASSIST_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("MEDASSIST_DATA_DIR") {
        return PathBuf::from(dir);
    }
    project_root.join("data")
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    /// Resolves the public config file. `MEDASSIST_CONFIG_PATH` wins, then
    /// `config.{MEDASSIST_ENV}.yml`, then plain `config.yml`.
    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("MEDASSIST_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        if let Ok(env_name) = env::var("MEDASSIST_ENV") {
            let candidate = self
                .paths
                .project_root
                .join(format!("config.{}.yml", env_name.trim()));
            if candidate.exists() {
                return candidate;
            }
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.paths.secrets_path);
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged);
        Ok(merged)
    }

    /// Deserializes one top-level section of the merged config, falling back
    /// to the section's `Default` when the key is absent entirely.
    pub fn section<T>(&self, key: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        let config = self.load_config()?;
        match config.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                ApiError::BadRequest(format!("Invalid config section '{}': {}", key, err))
            }),
            None => Ok(T::default()),
        }
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => match value {
                Value::Object(_) => value,
                _ => Value::Object(Map::new()),
            },
            Err(_) => Value::Object(Map::new()),
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn apply_env_overrides(config: &mut Value) {
    for (var, path) in ENV_OVERRIDES {
        if let Ok(value) = env::var(var) {
            if !value.trim().is_empty() {
                set_dotted(config, path, Value::String(value));
            }
        }
    }
}

fn set_dotted(config: &mut Value, path: &str, value: Value) {
    let mut current = config;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7001,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    /// Access token lifetime in seconds.
    pub access_exp: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_exp: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_exp: 7_200,
            refresh_exp: 604_800,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub product_id: String,
    /// When false, codes are only logged, never sent. Useful in dev.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PubMedConfig {
    pub email: String,
    pub api_key: String,
    pub retmax: usize,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            api_key: String::new(),
            retmax: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            model: "bge-m3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub deepseek: ProviderConfig,
    pub doubao: ProviderConfig,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            deepseek: ProviderConfig {
                base_url: "https://api.deepseek.com".to_string(),
                model: "deepseek-chat".to_string(),
                api_key: String::new(),
            },
            doubao: ProviderConfig {
                base_url: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
                model: "doubao-pro-32k".to_string(),
                api_key: String::new(),
            },
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub top_k: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}
