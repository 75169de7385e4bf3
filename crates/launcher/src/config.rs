use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::LauncherError;

/// One menu entry: a label and the command it runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchEntry {
    /// Text shown in the menu
    pub label: String,
    /// Program to run, looked up on `PATH` when not a path
    pub program: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchEntry {
    pub fn new(label: &str, program: &str, args: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The command as it would be typed in a shell, for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Configuration for the launcher menu
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Heading printed above the menu
    pub title: String,
    /// Menu entries in display order
    #[serde(rename = "entry")]
    pub entries: Vec<LaunchEntry>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            title: "DAQ HAT Launcher".to_string(),
            entries: vec![
                LaunchEntry::new("Finite Scan", "mcc118_scan", &["finite"]),
                LaunchEntry::new("Continuous Scan", "mcc118_scan", &["continuous"]),
                LaunchEntry::new("Finite Scan w/Trigger", "mcc118_scan", &["triggered"]),
                LaunchEntry::new("Single Value Read", "mcc118_scan", &["single"]),
                LaunchEntry::new(
                    "Thermocouple Data",
                    "python",
                    &["/home/pi/DataBox/thermo/simpletest.py"],
                ),
            ],
        }
    }
}

impl LauncherConfig {
    /// Load the menu from a TOML file. A missing file gives the built-in menu.
    pub fn load(path: &Path) -> Result<Self, LauncherError> {
        if !path.exists() {
            info!("No config at {}, using the built-in menu", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| LauncherError::Config(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded {} launcher entries from {}",
            config.entries.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, LauncherError> {
        let config: LauncherConfig =
            toml::from_str(contents).map_err(|e| LauncherError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, LauncherError> {
        toml::to_string_pretty(self).map_err(|e| LauncherError::Config(e.to_string()))
    }

    /// Labels must be non-empty and unique (ignoring case), programs non-empty.
    pub fn validate(&self) -> Result<(), LauncherError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.label.trim().is_empty() {
                return Err(LauncherError::Config("entry with an empty label".to_string()));
            }
            if entry.program.trim().is_empty() {
                return Err(LauncherError::Config(format!(
                    "entry '{}' has no program",
                    entry.label
                )));
            }
            if !seen.insert(entry.label.to_lowercase()) {
                return Err(LauncherError::Config(format!(
                    "duplicate entry label '{}'",
                    entry.label
                )));
            }
        }
        Ok(())
    }
}
