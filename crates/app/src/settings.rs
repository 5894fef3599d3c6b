use std::path::{Path, PathBuf};

use applyx_chat::{AttachmentPolicy, DEFAULT_MAX_ATTACHMENT_BYTES};
use applyx_llm::{
    DEFAULT_ECHO_DELAY, DEFAULT_HTTP_ENDPOINT, DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL,
    ResponderConfig, ResponderKind,
};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "applyx";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "APPLYX_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    pub kind: ResponderKind,
    /// Blank means the default endpoint for `kind`.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub preamble: Option<String>,
    pub echo_delay_ms: u64,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            kind: ResponderKind::Echo,
            endpoint: String::new(),
            api_key: String::new(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            preamble: None,
            echo_delay_ms: DEFAULT_ECHO_DELAY.as_millis() as u64,
        }
    }
}

impl ResponderSettings {
    fn normalized(mut self) -> Self {
        self.endpoint = self.endpoint.trim().to_string();
        self.api_key = self.api_key.trim().to_string();
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            self.model = DEFAULT_OPENAI_MODEL.to_string();
        }
        self.preamble = self
            .preamble
            .map(|preamble| preamble.trim().to_string())
            .filter(|preamble| !preamble.is_empty());
        self
    }

    pub fn effective_endpoint(&self) -> &str {
        if !self.endpoint.is_empty() {
            return &self.endpoint;
        }

        match self.kind {
            ResponderKind::Echo => "",
            ResponderKind::Http => DEFAULT_HTTP_ENDPOINT,
            ResponderKind::Openai => DEFAULT_OPENAI_ENDPOINT,
        }
    }

    pub fn to_responder_config(&self) -> ResponderConfig {
        let mut config = ResponderConfig::new(self.kind, self.effective_endpoint())
            .with_api_key(self.api_key.as_str())
            .with_model(self.model.as_str())
            .with_echo_delay_ms(self.echo_delay_ms);
        if let Some(preamble) = &self.preamble {
            config = config.with_preamble(preamble.as_str());
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentSettings {
    pub max_size_bytes: u64,
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub responder: ResponderSettings,
    pub attachments: AttachmentSettings,
}

impl Settings {
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".applyx"))
            .join(SETTINGS_DIRECTORY_NAME)
            .join(SETTINGS_FILE_NAME)
    }

    /// Layers defaults, the JSON file at `path` and `APPLYX_*` variables.
    ///
    /// Nested keys use a double underscore, e.g. `APPLYX_RESPONDER__KIND=http`.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: &Path) -> Self {
        Self::extract(Self::figment(path))
    }

    /// Falls back to defaults when the layered sources do not parse.
    pub fn extract(figment: Figment) -> Self {
        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(error = %error, "failed to parse settings, using defaults");
                Settings::default()
            }
        }
    }

    pub fn normalized(self) -> Self {
        let max_size_bytes = match self.attachments.max_size_bytes {
            0 => DEFAULT_MAX_ATTACHMENT_BYTES,
            limit => limit,
        };

        Self {
            responder: self.responder.normalized(),
            attachments: AttachmentSettings { max_size_bytes },
        }
    }

    pub fn attachment_policy(&self) -> AttachmentPolicy {
        AttachmentPolicy::new(self.attachments.max_size_bytes)
    }

    /// Writes the settings as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(self).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: path.to_path_buf(),
        })?;

        tracing::info!(path = ?path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}
