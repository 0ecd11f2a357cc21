use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tutor_chat::{DEFAULT_STORAGE_KEY, ReplyBinding};

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [server]
//                    url = "ws://tutor.example:8081"
//
//   env var:         TUTOR_SERVER__URL=ws://tutor.example:8081
//                    (double underscore = nesting)
//
//   (single underscore stays within field names: TUTOR_CHAT__REPLY_BINDING)

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8081";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Where the tutor lives (`[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

/// Chat behavior (`[chat]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    /// Which conversation a reply lands in.
    #[serde(default)]
    pub reply_binding: ReplyBinding,
    /// Storage key the conversation blob is saved under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            reply_binding: ReplyBinding::default(),
            storage_key: default_storage_key(),
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// Build the layered figment: defaults, then `config.toml`, then `TUTOR_*`
/// environment variables.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("TUTOR_").split("__"))
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct TutorConfig {
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl TutorConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".tutor-chat"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let state_dir = data_dir.join("state");
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create state directory: {:?}", state_dir))?;

        Ok(Self {
            data_dir,
            state_dir,
        })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Read the layered tunables for this data directory.
    pub fn file_config(&self) -> Result<FileConfig> {
        load_config(&self.data_dir)
            .extract()
            .with_context(|| format!("Invalid configuration in {:?}", self.config_toml_path()))
    }
}
