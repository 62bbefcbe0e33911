use std::fs;
use std::path::{Path, PathBuf};
use crate::common::error::{FaceAuthError, Result};

pub const SYSTEM_CONFIG_FILE: &str = "/etc/facegate/facegate.toml";
pub const DEV_DATA_DIR: &str = "./dev_data";

#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    Development(PathBuf),
    System,
    /// Config may come from `~/.config/facegate`; state stays at the configured
    /// (system) locations so the CLI and the daemon share one store.
    User,
}

#[derive(Debug, Clone)]
pub struct Paths {
    mode: RunMode,
}

impl Paths {
    pub fn new(dev: bool, system: bool) -> Result<Self> {
        match (dev, system) {
            (true, true) => Err(FaceAuthError::Config(
                "Cannot use both --dev and --system flags".to_string(),
            )),
            (true, false) => Self::development(PathBuf::from(DEV_DATA_DIR)),
            (false, true) => Ok(Self { mode: RunMode::System }),
            (false, false) => Ok(Self { mode: RunMode::User }),
        }
    }

    pub fn development(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(base_dir.join("templates"))?;
        fs::create_dir_all(base_dir.join("logs"))?;
        tracing::info!("Development mode - using local directory: {}", base_dir.display());
        Ok(Self { mode: RunMode::Development(base_dir) })
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn config_file(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("facegate.toml"),
            RunMode::System => PathBuf::from(SYSTEM_CONFIG_FILE),
            RunMode::User => {
                if let Some(config_dir) = dirs::config_dir() {
                    let user_config = config_dir.join("facegate/facegate.toml");
                    if user_config.exists() {
                        return user_config;
                    }
                }
                PathBuf::from(SYSTEM_CONFIG_FILE)
            }
        }
    }

    /// Base directory that storage paths are rebased under. Only development
    /// mode owns one.
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.mode {
            RunMode::Development(base) => Some(base),
            RunMode::System | RunMode::User => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.mode, RunMode::Development(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dev_and_system_are_exclusive() {
        assert!(Paths::new(true, true).is_err());
    }

    #[test]
    fn development_mode_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("dev");
        let paths = Paths::development(base.clone()).unwrap();
        assert!(paths.is_development());
        assert!(base.join("templates").is_dir());
        assert_eq!(paths.config_file(), base.join("facegate.toml"));
        assert_eq!(paths.data_dir(), Some(base.as_path()));
    }

    #[test]
    fn system_mode_has_no_rebase_dir() {
        let paths = Paths::new(false, true).unwrap();
        assert_eq!(paths.config_file(), PathBuf::from(SYSTEM_CONFIG_FILE));
        assert!(paths.data_dir().is_none());
    }

    #[test]
    fn user_mode_keeps_configured_state_locations() {
        let paths = Paths::new(false, false).unwrap();
        assert_eq!(paths.mode(), &RunMode::User);
        assert!(paths.data_dir().is_none());
        assert!(!paths.is_development());
    }
}
