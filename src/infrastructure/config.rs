use crate::domain::config::{CustomCommand, DeviceConfig, GlobalConfig, LinePortConfig, SerialSettings, TransferConfig};
use crate::domain::error::{LinePortError, LinePortResult};
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".lineport";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> LinePortResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_config_path(&dir));

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager over explicit paths
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration from files.
    ///
    /// Global settings come from the global file; devices from the project
    /// file are appended to any the global file declares.
    pub fn load_config(&self) -> LinePortResult<LinePortConfig> {
        let mut config = LinePortConfig::default();

        if self.global_config_path.exists() {
            config = self.load_config_from_path(&self.global_config_path)?;
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                let project_config = self.load_config_from_path(project_path)?;
                config.devices.extend(project_config.devices);
            }
        }

        Ok(config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> LinePortResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| LinePortError::Config {
                message: "Could not determine configuration directory".to_string(),
            })?;

        Ok(config_dir.join("lineport").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up from `start`
    pub fn find_project_config_path(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
            .find(|path| path.exists())
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> LinePortResult<LinePortConfig> {
        let content = fs::read_to_string(path).map_err(|e| LinePortError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| LinePortError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path, creating parent directories
    pub fn save_config_to_path(&self, path: &Path, config: &LinePortConfig) -> LinePortResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LinePortError::Config {
                message: format!("Failed to create config directory {}: {}", parent.display(), e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| LinePortError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| LinePortError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create a project configuration with an example device under `path`
    pub fn init_project_config(&self, path: &Path) -> LinePortResult<PathBuf> {
        let config_file = path.join(PROJECT_DIR).join(CONFIG_FILE);

        if config_file.exists() {
            return Err(LinePortError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        let default_config = LinePortConfig {
            global: GlobalConfig::default(),
            transfer: TransferConfig::default(),
            devices: vec![DeviceConfig {
                name: "example_modem".to_string(),
                description: "Example AT-command modem".to_string(),
                serial: SerialSettings::new("/dev/ttyUSB0", 115200),
                commands: vec![
                    CustomCommand {
                        name: "ping".to_string(),
                        description: "Check the modem responds".to_string(),
                        template: "AT".to_string(),
                        response_pattern: Some("OK.*".to_string()),
                        timeout_ms: 1000,
                    },
                    CustomCommand {
                        name: "signal".to_string(),
                        description: "Query signal quality".to_string(),
                        template: "AT+CSQ".to_string(),
                        response_pattern: Some(r"\+CSQ: \d+,\d+".to_string()),
                        timeout_ms: 2000,
                    },
                ],
            }],
        };

        self.save_config_to_path(&config_file, &default_config)?;

        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}
