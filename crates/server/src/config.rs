//! Owns the single JSON config document: section-scoped validation,
//! atomic read-modify-write, and a hot-reload callback hook.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use claude_history_types::{ConfigDocument, ConfigError, EDITABLE_SECTIONS};
use serde_json::Value;

type ChangeCallback = Box<dyn Fn(&str) + Send + Sync>;

pub struct ConfigService {
    path: PathBuf,
    document: RwLock<ConfigDocument>,
    on_changed: RwLock<Option<ChangeCallback>>,
}

impl ConfigService {
    /// Load the document from `path`, creating a default one if absent, then
    /// apply `HEARTBEAT_*` environment overrides (§6) on top of whatever was
    /// on disk. Overrides are not persisted back to the file.
    pub async fn load(path: PathBuf) -> Result<Self, std::io::Error> {
        let mut document: ConfigDocument = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigDocument::default(),
            Err(e) => return Err(e),
        };
        apply_env_overrides(&mut document);
        Ok(Self {
            path,
            document: RwLock::new(document),
            on_changed: RwLock::new(None),
        })
    }

    pub fn set_on_changed(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_changed.write().expect("config lock poisoned") = Some(Box::new(callback));
    }

    pub fn document(&self) -> ConfigDocument {
        self.document.read().expect("config lock poisoned").clone()
    }

    pub fn get_editable_section_names() -> &'static [&'static str] {
        EDITABLE_SECTIONS
    }

    /// Every editable section, never including `apiKeyHash`.
    pub fn get_all_editable_sections(&self) -> Value {
        let doc = self.document();
        serde_json::json!({
            "heartbeat": doc.heartbeat,
            "security": doc.security,
            "logging": doc.logging,
        })
    }

    pub fn get_section(&self, name: &str) -> Option<Value> {
        let doc = self.document();
        match name {
            "heartbeat" => Some(serde_json::to_value(doc.heartbeat).unwrap()),
            "security" => Some(serde_json::to_value(doc.security).unwrap()),
            "logging" => Some(serde_json::to_value(doc.logging).unwrap()),
            _ => None,
        }
    }

    /// Validate `patch` against `name`'s schema, apply it atomically, persist
    /// to disk, and invoke the change callback on success.
    pub async fn update_section(&self, name: &str, patch: Value) -> Result<Value, ConfigError> {
        if !EDITABLE_SECTIONS.contains(&name) {
            return Err(ConfigError::UnknownSection(name.to_string()));
        }

        let updated = {
            let mut doc = self.document.write().expect("config lock poisoned");
            match name {
                "heartbeat" => {
                    let next = merge_heartbeat(&doc.heartbeat, &patch)?;
                    doc.heartbeat = next;
                    serde_json::to_value(&doc.heartbeat).unwrap()
                }
                "security" => {
                    let next = merge_security(&doc.security, &patch)?;
                    doc.security = next;
                    serde_json::to_value(&doc.security).unwrap()
                }
                "logging" => {
                    let next = merge_logging(&doc.logging, &patch)?;
                    doc.logging = next;
                    serde_json::to_value(&doc.logging).unwrap()
                }
                _ => unreachable!("checked above"),
            }
        };

        self.persist().await.map_err(|e| ConfigError::InvalidValue {
            section: name.to_string(),
            field: String::new(),
            reason: e.to_string(),
        })?;

        if let Some(cb) = self.on_changed.read().expect("config lock poisoned").as_ref() {
            cb(name);
        }

        Ok(updated)
    }

    async fn persist(&self) -> Result<(), std::io::Error> {
        let doc = self.document();
        let raw = serde_json::to_string_pretty(&doc).expect("config document always serializes");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, raw).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a freshly generated key's SHA-256 hash. Used only by the
    /// `keygen` tool, not reachable through `updateSection`.
    pub async fn set_api_key_hash(&self, hash: String) -> Result<(), std::io::Error> {
        {
            let mut doc = self.document.write().expect("config lock poisoned");
            doc.api_key_hash = Some(hash);
            doc.api_key_created_at = Some(chrono::Utc::now());
        }
        self.persist().await
    }
}

/// `PORT` is read directly by `main.rs`; `CLAUDE_HISTORY_CONFIG_DIR` is read
/// directly by `paths::default_config_path`. These three are the only
/// overrides that reach into the config document itself.
fn apply_env_overrides(document: &mut ConfigDocument) {
    if let Ok(v) = std::env::var("HEARTBEAT_ENABLED") {
        if let Ok(enabled) = v.parse::<bool>() {
            document.heartbeat.enabled = enabled;
        }
    }
    if let Ok(v) = std::env::var("HEARTBEAT_INTERVAL_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            document.heartbeat.interval_ms = ms;
        }
    }
    if let Ok(v) = std::env::var("HEARTBEAT_WORKING_DIR") {
        if !v.is_empty() {
            document.heartbeat.working_directory = v;
        }
    }
}

fn known_fields(section: &str, patch: &Value) -> Result<(), ConfigError> {
    let Some(obj) = patch.as_object() else {
        return Err(ConfigError::InvalidValue {
            section: section.to_string(),
            field: String::new(),
            reason: "patch must be a JSON object".into(),
        });
    };
    let allowed: &[&str] = match section {
        "heartbeat" => &["enabled", "intervalMs", "workingDirectory", "maxItems"],
        "security" => &["allowedWorkingDirs"],
        "logging" => &["requestLogLevel"],
        _ => &[],
    };
    for field in obj.keys() {
        if !allowed.contains(&field.as_str()) {
            return Err(ConfigError::UnknownField {
                section: section.to_string(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn merge_heartbeat(
    current: &claude_history_types::HeartbeatConfig,
    patch: &Value,
) -> Result<claude_history_types::HeartbeatConfig, ConfigError> {
    known_fields("heartbeat", patch)?;
    let mut next = current.clone();
    let obj = patch.as_object().unwrap();
    if let Some(v) = obj.get("enabled") {
        next.enabled = v.as_bool().ok_or_else(|| invalid("heartbeat", "enabled", "must be a boolean"))?;
    }
    if let Some(v) = obj.get("intervalMs") {
        let ms = v
            .as_u64()
            .ok_or_else(|| invalid("heartbeat", "intervalMs", "must be an integer"))?;
        if ms < 60_000 {
            return Err(invalid("heartbeat", "intervalMs", "must be >= 60000"));
        }
        next.interval_ms = ms;
    }
    if let Some(v) = obj.get("workingDirectory") {
        next.working_directory = v
            .as_str()
            .ok_or_else(|| invalid("heartbeat", "workingDirectory", "must be a string"))?
            .to_string();
    }
    if let Some(v) = obj.get("maxItems") {
        next.max_items = v
            .as_u64()
            .ok_or_else(|| invalid("heartbeat", "maxItems", "must be an integer"))?;
    }
    Ok(next)
}

fn merge_security(
    current: &claude_history_types::SecurityConfig,
    patch: &Value,
) -> Result<claude_history_types::SecurityConfig, ConfigError> {
    known_fields("security", patch)?;
    let mut next = current.clone();
    let obj = patch.as_object().unwrap();
    if let Some(v) = obj.get("allowedWorkingDirs") {
        let array = v
            .as_array()
            .ok_or_else(|| invalid("security", "allowedWorkingDirs", "must be an array"))?;
        let mut dirs = Vec::with_capacity(array.len());
        for entry in array {
            let s = entry
                .as_str()
                .ok_or_else(|| invalid("security", "allowedWorkingDirs", "entries must be strings"))?;
            if s.is_empty() {
                return Err(invalid("security", "allowedWorkingDirs", "entries must be non-empty"));
            }
            dirs.push(s.to_string());
        }
        next.allowed_working_dirs = dirs;
    }
    Ok(next)
}

fn merge_logging(
    current: &claude_history_types::LoggingConfig,
    patch: &Value,
) -> Result<claude_history_types::LoggingConfig, ConfigError> {
    known_fields("logging", patch)?;
    let mut next = current.clone();
    let obj = patch.as_object().unwrap();
    if let Some(v) = obj.get("requestLogLevel") {
        let s = v
            .as_str()
            .ok_or_else(|| invalid("logging", "requestLogLevel", "must be a string"))?;
        next.request_log_level = match s {
            "all" => claude_history_types::RequestLogLevel::All,
            "errors-only" => claude_history_types::RequestLogLevel::ErrorsOnly,
            "off" => claude_history_types::RequestLogLevel::Off,
            _ => return Err(invalid("logging", "requestLogLevel", "must be one of all, errors-only, off")),
        };
    }
    Ok(next)
}

fn invalid(section: &str, field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (tempfile::TempDir, ConfigService) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let svc = ConfigService::load(path).await.unwrap();
        (dir, svc)
    }

    #[tokio::test]
    async fn defaults_are_loaded_when_file_absent() {
        let (_dir, svc) = service().await;
        let heartbeat = svc.get_section("heartbeat").unwrap();
        assert_eq!(heartbeat["enabled"], false);
    }

    #[tokio::test]
    async fn update_section_rejects_unknown_field() {
        let (_dir, svc) = service().await;
        let err = svc
            .update_section("heartbeat", serde_json::json!({"bogus": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn update_section_rejects_unknown_section() {
        let (_dir, svc) = service().await;
        let err = svc
            .update_section("nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSection(_)));
    }

    #[tokio::test]
    async fn update_section_rejects_interval_below_minimum() {
        let (_dir, svc) = service().await;
        let err = svc
            .update_section("heartbeat", serde_json::json!({"intervalMs": 1000}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn update_section_persists_and_preserves_untouched_keys() {
        let (_dir, svc) = service().await;
        svc.update_section("heartbeat", serde_json::json!({"enabled": true}))
            .await
            .unwrap();
        svc.update_section("security", serde_json::json!({"allowedWorkingDirs": ["/tmp"]}))
            .await
            .unwrap();

        let doc = svc.document();
        assert!(doc.heartbeat.enabled);
        assert_eq!(doc.security.allowed_working_dirs, vec!["/tmp".to_string()]);
    }

    #[tokio::test]
    async fn on_changed_callback_fires_with_section_name() {
        let (_dir, svc) = service().await;
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        svc.set_on_changed(move |section| seen2.lock().unwrap().push(section.to_string()));

        svc.update_section("logging", serde_json::json!({"requestLogLevel": "all"}))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["logging".to_string()]);
    }

    #[tokio::test]
    async fn get_all_editable_sections_never_exposes_api_key_hash() {
        let (_dir, svc) = service().await;
        let sections = svc.get_all_editable_sections();
        assert!(sections.get("apiKeyHash").is_none());
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        // SAFETY: test-only, single-threaded within this test's scope via serial env access.
        unsafe {
            std::env::set_var("HEARTBEAT_ENABLED", "true");
            std::env::set_var("HEARTBEAT_INTERVAL_MS", "120000");
            std::env::set_var("HEARTBEAT_WORKING_DIR", "/tmp/work");
        }
        let mut doc = claude_history_types::ConfigDocument::default();
        apply_env_overrides(&mut doc);
        unsafe {
            std::env::remove_var("HEARTBEAT_ENABLED");
            std::env::remove_var("HEARTBEAT_INTERVAL_MS");
            std::env::remove_var("HEARTBEAT_WORKING_DIR");
        }
        assert!(doc.heartbeat.enabled);
        assert_eq!(doc.heartbeat.interval_ms, 120_000);
        assert_eq!(doc.heartbeat.working_directory, "/tmp/work");
    }
}
