//! INI file configuration adapter and command-line override layer.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::collections::HashMap;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }
}

/// Command-line overrides on top of an optional config file.
///
/// Section and key lookups are case-insensitive, like the INI layer.
#[derive(Default)]
pub struct LayeredConfig {
    overrides: HashMap<(String, String), String>,
    base: Option<FileConfigAdapter>,
}

impl LayeredConfig {
    pub fn new(base: Option<FileConfigAdapter>) -> Self {
        Self {
            overrides: HashMap::new(),
            base,
        }
    }

    fn key(section: &str, key: &str) -> (String, String) {
        (section.to_lowercase(), key.to_lowercase())
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) -> &mut Self {
        self.overrides
            .insert(Self::key(section, key), value.to_string());
        self
    }

    /// `set` only when `value` is present.
    pub fn set_opt<T: ToString>(&mut self, section: &str, key: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set(section, key, v);
        }
        self
    }

    /// `set` only for a raised flag, so an absent flag defers to the file.
    pub fn set_flag(&mut self, section: &str, key: &str, raised: bool) -> &mut Self {
        if raised {
            self.set(section, key, true);
        }
        self
    }

    fn overridden(&self, section: &str, key: &str) -> Option<&str> {
        self.overrides
            .get(&Self::key(section, key))
            .map(String::as_str)
    }
}

impl ConfigPort for LayeredConfig {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.overridden(section, key) {
            Some(v) => Some(v.to_string()),
            None => self.base.as_ref().and_then(|b| b.get_string(section, key)),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.overridden(section, key) {
            Some(v) => v.trim().parse().unwrap_or(default),
            None => self
                .base
                .as_ref()
                .map_or(default, |b| b.get_int(section, key, default)),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.overridden(section, key) {
            Some(v) => v.trim().parse().unwrap_or(default),
            None => self
                .base
                .as_ref()
                .map_or(default, |b| b.get_double(section, key, default)),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.overridden(section, key) {
            Some(v) => parse_bool(v).unwrap_or(default),
            None => self
                .base
                .as_ref()
                .map_or(default, |b| b.get_bool(section, key, default)),
        }
    }
}
