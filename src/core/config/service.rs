use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_config;
use crate::core::errors::ApiError;

/// Shown instead of a secret by `GET /api/config`. Writing it back keeps the
/// stored value.
const MASK: &str = "****";

/// Leaf keys that hold credentials (`llm.api_key`, `embeddings.api_key`).
/// A key matches when it equals an entry or ends with `_<entry>`.
const SECRET_KEYS: [&str; 3] = ["api_key", "secret", "password"];

/// Environment variables that fill config keys left unset by the YAML files.
/// The third field restricts an entry to sections using that provider
/// (`dial` when the section names none). Earlier entries win.
const ENV_OVERRIDES: [(&str, &[&str], Option<&str>); 10] = [
    ("EMBEDDING_KEY", &["embeddings", "api_key"], None),
    ("DIAL_LAB_KEY", &["embeddings", "api_key"], Some("dial")),
    ("GENAI_KEY", &["embeddings", "api_key"], Some("gemini")),
    ("DIAL_LAB_KEY", &["llm", "api_key"], Some("dial")),
    ("GENAI_KEY", &["llm", "api_key"], Some("openai")),
    ("DIAL_LAB_BASE_URL", &["llm", "base_url"], Some("dial")),
    ("DIAL_LAB_BASE_URL", &["embeddings", "base_url"], Some("dial")),
    ("DIAL_LAB_MODEL", &["llm", "model"], Some("dial")),
    ("OMNIPARSER_API", &["omniparser", "url"], None),
    ("GEMINI_API", &["llm", "relay_url"], None),
];

/// Reads and writes `config.yml` + `secrets.yaml`.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// `RAGBOT_CONFIG_PATH`, else `config.yml` in the user data dir when it
    /// exists, else the one in the project root.
    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAGBOT_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn config_write_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAGBOT_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        self.paths.user_data_dir.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Config files merged with environment fallbacks.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let mut merged = self.load_file_config()?;
        apply_env_overrides(&mut merged, |name| env::var(name).ok());
        Ok(merged)
    }

    /// Only what is stored in `config.yml` + `secrets.yaml`. Missing files are
    /// empty; unreadable or malformed ones are an error.
    pub fn load_file_config(&self) -> Result<Value, ApiError> {
        let public = read_yaml(&self.config_path())?;
        let secrets = read_yaml(&self.secrets_path())?;
        Ok(deep_merge(&public, &secrets))
    }

    pub fn load_settings(&self) -> Result<Settings, ApiError> {
        let config = self.load_config()?;
        validate_config(&config)?;
        Ok(Settings::from_config(&config))
    }

    /// Replaces (`merge == false`) or deep-merges the stored config. Masked
    /// secrets keep their stored value.
    pub fn update_config(&self, config_data: Value, merge: bool) -> Result<(), ApiError> {
        let current = self.load_file_config()?;
        let edited = unmask_secrets(&config_data, &current);
        let next = if merge {
            deep_merge(&current, &edited)
        } else {
            edited
        };
        validate_config(&next)?;

        let (public, secrets) = split_secrets(&next);
        write_yaml(&self.config_write_path(), &public)?;
        write_yaml(&self.secrets_path(), &secrets)?;
        tracing::info!("Config saved to {}", self.config_write_path().display());
        Ok(())
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        mask_secrets(value)
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (name, path, provider) in ENV_OVERRIDES {
        let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        if let Some(required) = provider {
            let current = config
                .get(path[0])
                .and_then(|section| section.get("provider"))
                .and_then(Value::as_str)
                .unwrap_or("dial");
            if current != required {
                continue;
            }
        }
        set_if_missing(config, path, Value::String(value));
    }
}

fn set_if_missing(config: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = config;
    for key in parents {
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = cursor {
        let missing = match map.get(*last) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            map.insert(last.to_string(), value);
        }
    }
}

fn read_yaml(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| ApiError::Internal(format!("Cannot read {}: {}", path.display(), e)))?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_yaml::from_str::<Value>(&contents) {
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ApiError::Internal(format!(
            "Invalid config {}: top level must be a mapping",
            path.display()
        ))),
        Err(e) => Err(ApiError::Internal(format!(
            "Invalid YAML in {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_yaml(path: &Path, value: &Value) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }
    let yaml = serde_yaml::to_string(value).map_err(ApiError::internal)?;
    fs::write(path, yaml).map_err(ApiError::internal)
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS
        .iter()
        .any(|secret| key == *secret || key.ends_with(&format!("_{}", secret)))
}

/// Public tree and secret leaves of a config, each keeping the section
/// nesting. Sections left empty are omitted.
fn split_secrets(config: &Value) -> (Value, Value) {
    let Value::Object(map) = config else {
        return (config.clone(), Value::Object(Map::new()));
    };

    let mut public = Map::new();
    let mut secrets = Map::new();
    for (key, value) in map {
        if value.is_object() {
            let (section_public, section_secrets) = split_secrets(value);
            for (target, part) in [(&mut public, section_public), (&mut secrets, section_secrets)] {
                if part.as_object().is_some_and(|m| !m.is_empty()) {
                    target.insert(key.clone(), part);
                }
            }
        } else if is_secret_key(key) && !value.is_null() {
            secrets.insert(key.clone(), value.clone());
        } else {
            public.insert(key.clone(), value.clone());
        }
    }
    (Value::Object(public), Value::Object(secrets))
}

fn mask_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let masked = if is_secret_key(key) && !val.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        mask_secrets(val)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Puts the stored value back wherever an edited config still carries the
/// mask. A masked key with nothing stored is dropped.
fn unmask_secrets(edited: &Value, stored: &Value) -> Value {
    let Value::Object(map) = edited else {
        return edited.clone();
    };

    let mut out = Map::new();
    for (key, value) in map {
        let previous = stored.get(key);
        if value.as_str() == Some(MASK) {
            if let Some(previous) = previous {
                out.insert(key.clone(), previous.clone());
            }
            continue;
        }
        out.insert(
            key.clone(),
            unmask_secrets(value, previous.unwrap_or(&Value::Null)),
        );
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_overrides_fill_only_missing_keys() {
        let mut config = json!({
            "llm": { "api_key": "from-file" },
            "embeddings": {}
        });
        let lookup = |name: &str| match name {
            "DIAL_LAB_KEY" => Some("dial-key".to_string()),
            "DIAL_LAB_BASE_URL" => Some("https://dial.example".to_string()),
            "EMBEDDING_KEY" => Some("embed-key".to_string()),
            "OMNIPARSER_API" => Some("http://parser/process/".to_string()),
            _ => None,
        };

        apply_env_overrides(&mut config, lookup);

        assert_eq!(config["llm"]["api_key"], "from-file");
        assert_eq!(config["llm"]["base_url"], "https://dial.example");
        assert_eq!(config["embeddings"]["api_key"], "embed-key");
        assert_eq!(config["omniparser"]["url"], "http://parser/process/");
        assert!(config["llm"].get("relay_url").is_none());
    }

    #[test]
    fn env_overrides_respect_section_provider() {
        let mut config = json!({
            "llm": { "provider": "gemini_relay" },
            "embeddings": { "provider": "gemini" }
        });
        let lookup = |name: &str| match name {
            "DIAL_LAB_KEY" => Some("dial-key".to_string()),
            "DIAL_LAB_BASE_URL" => Some("https://dial.example".to_string()),
            "GENAI_KEY" => Some("genai-key".to_string()),
            _ => None,
        };

        apply_env_overrides(&mut config, lookup);

        assert_eq!(config["embeddings"]["api_key"], "genai-key");
        assert!(config["embeddings"].get("base_url").is_none());
        assert!(config["llm"].get("api_key").is_none());
    }

    #[test]
    fn load_settings_reads_yaml_and_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::for_data_dir(dir.path());
        std::fs::write(
            dir.path().join("config.yml"),
            "rag:\n  chunk_size: 800\n  chunk_overlap: 80\nllm:\n  model: test-model\n",
        )
        .unwrap();
        std::fs::write(&paths.secrets_path, "llm:\n  api_key: secret-key\n").unwrap();

        let service = ConfigService::new(Arc::new(paths));
        let file_config = service.load_file_config().unwrap();
        assert_eq!(file_config["llm"]["api_key"], "secret-key");
        assert_eq!(file_config["llm"]["model"], "test-model");

        let settings = Settings::from_config(&file_config);
        assert_eq!(settings.rag.chunk_size, 800);
        assert_eq!(settings.rag.chunk_overlap, 80);
        assert_eq!(settings.llm.api_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn malformed_yaml_fails_instead_of_using_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::for_data_dir(dir.path());
        std::fs::write(dir.path().join("config.yml"), "llm:\n  model: [unclosed\n").unwrap();
        let service = ConfigService::new(Arc::new(paths));

        let err = service.load_settings().unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));
        assert!(service.update_config(json!({}), true).is_err());

        std::fs::write(dir.path().join("config.yml"), "- just\n- a list\n").unwrap();
        assert!(service.load_settings().is_err());

        std::fs::write(dir.path().join("config.yml"), "").unwrap();
        assert!(service.load_settings().is_ok());
    }

    #[test]
    fn update_config_splits_secrets_and_keeps_masked_values() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::for_data_dir(dir.path());
        let service = ConfigService::new(Arc::new(paths));

        service
            .update_config(
                json!({
                    "llm": { "api_key": "k1", "model": "m1", "max_tokens": 500 },
                    "rag": { "history_max_tokens": 80, "token_counter": "words" }
                }),
                false,
            )
            .unwrap();
        let secrets = std::fs::read_to_string(service.secrets_path()).unwrap();
        assert!(secrets.contains("k1"));
        assert!(!secrets.contains("history_max_tokens"));
        let public = std::fs::read_to_string(service.config_write_path()).unwrap();
        assert!(!public.contains("k1"));
        assert!(public.contains("token_counter"));

        service
            .update_config(json!({ "llm": { "api_key": "****", "model": "m2" } }), true)
            .unwrap();
        let config = service.load_file_config().unwrap();
        assert_eq!(config["llm"]["api_key"], "k1");
        assert_eq!(config["llm"]["model"], "m2");
        assert_eq!(config["llm"]["max_tokens"], 500);
    }

    #[test]
    fn deep_merge_merges_sections_and_replaces_leaves() {
        let base = json!({
            "llm": { "model": "a", "top_p": 1.0 },
            "server": { "cors_allowed_origins": ["http://localhost"] }
        });
        let overlay = json!({
            "llm": { "model": "b" },
            "server": { "cors_allowed_origins": ["*"] },
            "crawler": { "max_links": 3 }
        });

        assert_eq!(
            deep_merge(&base, &overlay),
            json!({
                "llm": { "model": "b", "top_p": 1.0 },
                "server": { "cors_allowed_origins": ["*"] },
                "crawler": { "max_links": 3 }
            })
        );
    }

    #[test]
    fn secret_keys_are_split_and_masked() {
        let config = json!({
            "llm": { "api_key": "sk-1", "max_tokens": 100 },
            "embeddings": { "api_key": null, "model": "m" },
            "rag": { "history_max_tokens": 100, "token_counter": "words" }
        });

        let (public, secrets) = split_secrets(&config);
        assert_eq!(
            public,
            json!({
                "llm": { "max_tokens": 100 },
                "embeddings": { "api_key": null, "model": "m" },
                "rag": { "history_max_tokens": 100, "token_counter": "words" }
            })
        );
        assert_eq!(secrets, json!({ "llm": { "api_key": "sk-1" } }));

        let masked = mask_secrets(&config);
        assert_eq!(masked["llm"]["api_key"], MASK);
        assert_eq!(masked["llm"]["max_tokens"], 100);
        assert_eq!(masked["embeddings"]["api_key"], Value::Null);

        assert!(is_secret_key("client_secret"));
        assert!(!is_secret_key("tokenizer_path"));
    }
}
