use backup_engine::EngineConfig;
use std::path::{Path, PathBuf};

/// Build the engine configuration.
///
/// Precedence: environment > config file > defaults. `.env` is loaded
/// first so its values count as environment.
pub fn load(config_path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let _ = dotenvy::dotenv();

    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn apply_env(config: &mut EngineConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(root) = var("BACKUP_PROJECT_ROOT") {
        config.project_root = PathBuf::from(root);
    }
    if let Some(dir) = var("BACKUP_DIR") {
        config.backup_dir = Some(PathBuf::from(dir));
    }
    if let Some(max) = var("BACKUP_MAX_COUNT").and_then(|v| v.parse().ok()) {
        config.max_backups = max;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.log.level = level;
    }
}
