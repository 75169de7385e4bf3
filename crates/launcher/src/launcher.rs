use std::fmt;
use std::process::{Command, ExitStatus};

use log::{info, warn};

use crate::config::{LaunchEntry, LauncherConfig};
use crate::error::LauncherError;

/// Result of running one entry to completion
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub label: String,
    pub status: ExitStatus,
}

impl LaunchReport {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' finished: {}", self.label, self.status)
    }
}

/// Runs menu entries as child processes, one at a time.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn entries(&self) -> &[LaunchEntry] {
        &self.config.entries
    }

    /// Look an entry up by its 1-based menu number or its label (case-insensitive).
    pub fn find(&self, selector: &str) -> Result<&LaunchEntry, LauncherError> {
        let selector = selector.trim();
        let by_index = selector
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.config.entries.get(i));

        by_index
            .or_else(|| {
                self.config
                    .entries
                    .iter()
                    .find(|e| e.label.eq_ignore_ascii_case(selector))
            })
            .ok_or_else(|| LauncherError::UnknownEntry(selector.to_string()))
    }

    /// Run `entry` with the launcher's stdin, stdout and stderr and wait for it to exit.
    pub fn launch(&self, entry: &LaunchEntry) -> Result<LaunchReport, LauncherError> {
        info!("Launching '{}': {}", entry.label, entry.command_line());

        let status = Command::new(&entry.program)
            .args(&entry.args)
            .status()
            .map_err(|source| LauncherError::Spawn {
                program: entry.program.clone(),
                source,
            })?;

        if status.success() {
            info!("'{}' exited cleanly", entry.label);
        } else {
            warn!("'{}' exited with {}", entry.label, status);
        }

        Ok(LaunchReport {
            label: entry.label.clone(),
            status,
        })
    }

    pub fn launch_selected(&self, selector: &str) -> Result<LaunchReport, LauncherError> {
        let entry = self.find(selector)?;
        self.launch(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_number_and_label() {
        let launcher = Launcher::new(LauncherConfig::default());

        assert_eq!(launcher.find("1").unwrap().label, "Finite Scan");
        assert_eq!(launcher.find(" 5 ").unwrap().label, "Thermocouple Data");
        assert_eq!(
            launcher.find("single value read").unwrap().args,
            vec!["single".to_string()]
        );
    }

    #[test]
    fn test_unknown_selectors() {
        let launcher = Launcher::new(LauncherConfig::default());
        for selector in ["0", "6", "Oscilloscope", ""] {
            assert!(matches!(
                launcher.find(selector),
                Err(LauncherError::UnknownEntry(_))
            ));
        }
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let launcher = Launcher::new(LauncherConfig {
            title: "t".to_string(),
            entries: vec![LaunchEntry::new("Ghost", "/nonexistent/daq-tool", &[])],
        });
        match launcher.launch_selected("Ghost") {
            Err(LauncherError::Spawn { program, .. }) => assert_eq!(program, "/nonexistent/daq-tool"),
            other => panic!("expected a spawn error, got {:?}", other),
        }
    }
}
