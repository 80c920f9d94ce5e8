//! Default filesystem locations, overridable by environment variables per
//! the external-interfaces contract.

use std::path::PathBuf;

use crate::error::DiscoveryError;

pub const DB_PATH_ENV: &str = "CLAUDE_HISTORY_DB_PATH";
pub const CONFIG_DIR_ENV: &str = "CLAUDE_HISTORY_CONFIG_DIR";
pub const TRANSCRIPT_ROOT_ENV: &str = "CLAUDE_HISTORY_TRANSCRIPT_ROOT";

/// `<user-home>/.claude/projects`, overridable via `CLAUDE_HISTORY_TRANSCRIPT_ROOT`.
pub fn default_transcript_root() -> Result<PathBuf, DiscoveryError> {
    if let Ok(root) = std::env::var(TRANSCRIPT_ROOT_ENV) {
        return Ok(PathBuf::from(root));
    }
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude").join("projects"))
}

/// `<user-home>/.claude-history-server/search.db`, overridable via
/// `CLAUDE_HISTORY_DB_PATH`.
pub fn default_db_path() -> Result<PathBuf, DiscoveryError> {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude-history-server").join("search.db"))
}

/// Directory holding `config.json`, overridable via `CLAUDE_HISTORY_CONFIG_DIR`.
pub fn default_config_dir() -> Result<PathBuf, DiscoveryError> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude-history-server"))
}

pub fn default_config_path() -> Result<PathBuf, DiscoveryError> {
    Ok(default_config_dir()?.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn db_path_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(DB_PATH_ENV, "/tmp/custom.db");
        let path = default_db_path().unwrap();
        std::env::remove_var(DB_PATH_ENV);
        assert_eq!(path, PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn transcript_root_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(TRANSCRIPT_ROOT_ENV, "/tmp/projects");
        let path = default_transcript_root().unwrap();
        std::env::remove_var(TRANSCRIPT_ROOT_ENV);
        assert_eq!(path, PathBuf::from("/tmp/projects"));
    }
}
