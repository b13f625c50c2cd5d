use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Backend connection settings
    pub backend: BackendConfig,

    /// Streaming and live-sync settings
    pub stream: StreamConfig,

    /// TUI settings
    pub tui: TuiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the VibeAI Builder backend
    pub base_url: String,

    /// WebSocket URL for smart-agent events
    pub ws_url: String,

    /// Project to open on startup
    pub project_id: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Delay before the single project-load retry, in milliseconds
    pub load_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Minimum interval between visible editor refreshes, in milliseconds
    pub editor_throttle_ms: u64,

    /// Delay between WebSocket reconnect attempts, in milliseconds
    pub ws_reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuiConfig {
    /// Auto-scroll chat to the newest message
    pub auto_scroll: bool,

    /// Show the file tree sidebar by default
    pub show_sidebar: bool,

    /// Show the terminal panel by default
    pub show_terminal: bool,
}

impl WorkspaceConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.load_env_vars();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".vibe-workspace").join("config.toml"))
    }

    /// Environment variables override file values when set
    fn load_env_vars(&mut self) {
        if let Ok(url) = std::env::var("VIBE_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(url) = std::env::var("VIBE_WS_URL") {
            self.backend.ws_url = url;
        }
        if let Ok(project) = std::env::var("VIBE_PROJECT_ID") {
            self.backend.project_id = Some(project);
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://localhost:8000".to_string(),
                ws_url: "ws://localhost:8000/api/smart-agent/ws".to_string(),
                project_id: None,
                timeout_seconds: 120,
                load_retry_delay_ms: 1500,
            },
            stream: StreamConfig {
                editor_throttle_ms: 200,
                ws_reconnect_delay_ms: 3000,
            },
            tui: TuiConfig {
                auto_scroll: true,
                show_sidebar: true,
                show_terminal: true,
            },
        }
    }
}

/// Load or create configuration
pub fn load_or_create_config(path: Option<&Path>) -> Result<WorkspaceConfig> {
    let config_path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        WorkspaceConfig::default_path()?
    };

    if config_path.exists() {
        WorkspaceConfig::load(&config_path)
    } else {
        let config = WorkspaceConfig::default();
        config.save(&config_path)?;
        Ok(config)
    }
}
