use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub editor: EditorConfig,
    pub search: SearchConfig,
    pub slash: SlashConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub vault_path: String,
    pub scratch_file: String,
    pub auto_save_debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    pub tab_width: u16,
    pub scroll_off: u16,
    pub undo_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlashConfig {
    pub enabled: bool,
    pub trigger: String,
    pub max_visible_rows: u16,
}

impl SlashConfig {
    /// The trigger as a single character. Anything that is not exactly one
    /// non-whitespace character falls back to `/`.
    pub fn trigger_char(&self) -> char {
        let mut chars = self.trigger.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if !ch.is_whitespace() => ch,
            _ => {
                tracing::warn!(trigger = %self.trigger, "invalid slash trigger, using '/'");
                '/'
            }
        }
    }
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let user = directories::ProjectDirs::from("", "", "inkpad")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
            .map(fs::read_to_string)
            .transpose()?;

        let mut config = Self::from_layers(user.as_deref())?;

        // Expand ~ in vault_path
        if config.general.vault_path.starts_with('~') {
            let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
            config.general.vault_path =
                config
                    .general
                    .vault_path
                    .replacen('~', &home.to_string_lossy(), 1);
        }

        Ok(config)
    }

    /// Parse the embedded defaults, deep-merging an optional user layer on top.
    pub fn from_layers(user: Option<&str>) -> Result<Self> {
        let mut merged: toml::Value = toml::from_str(DEFAULT_CONFIG)?;
        if let Some(user) = user {
            let overlay: toml::Value = toml::from_str(user)?;
            merge_toml(&mut merged, overlay);
        }
        let config: Self = merged.try_into()?;
        Ok(config)
    }

    pub fn vault_path(&self) -> PathBuf {
        PathBuf::from(&self.general.vault_path)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.vault_path().join(&self.general.scratch_file)
    }
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = AppConfig::from_layers(None).unwrap();
        assert_eq!(config.slash.trigger_char(), '/');
        assert!(config.slash.enabled);
        assert_eq!(config.general.scratch_file, "scratch.md");
    }

    #[test]
    fn user_layer_overrides_single_keys() {
        let user = "[slash]\ntrigger = \";\"\n\n[editor]\nscroll_off = 2\n";
        let config = AppConfig::from_layers(Some(user)).unwrap();
        assert_eq!(config.slash.trigger_char(), ';');
        assert_eq!(config.slash.max_visible_rows, 8);
        assert_eq!(config.editor.scroll_off, 2);
        assert_eq!(config.editor.undo_limit, 200);
    }

    #[test]
    fn bad_trigger_falls_back_to_slash() {
        let user = "[slash]\ntrigger = \"ab\"\n";
        let config = AppConfig::from_layers(Some(user)).unwrap();
        assert_eq!(config.slash.trigger_char(), '/');

        let user = "[slash]\ntrigger = \" \"\n";
        let config = AppConfig::from_layers(Some(user)).unwrap();
        assert_eq!(config.slash.trigger_char(), '/');
    }
}
