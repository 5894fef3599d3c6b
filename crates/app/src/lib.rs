//! Terminal front-end for the ApplyX chat core.

pub mod error;
pub mod settings;
pub mod terminal;

pub use error::{AppError, AppResult, ResponderSnafu, SettingsSnafu};
pub use settings::{AttachmentSettings, ResponderSettings, Settings, SettingsError};
pub use terminal::{Command, Terminal, parse_command};
