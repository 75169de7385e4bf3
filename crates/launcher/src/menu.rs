//! Numbered terminal menu over the launcher entries.

use std::io::{BufRead, Write};

use log::debug;

use crate::error::LauncherError;
use crate::launcher::{LaunchReport, Launcher};

fn print_menu<W: Write>(launcher: &Launcher, output: &mut W) -> Result<(), LauncherError> {
    writeln!(output, "\n{}\n", launcher.title())?;
    for (i, entry) in launcher.entries().iter().enumerate() {
        writeln!(output, "  {}) {}", i + 1, entry.label)?;
    }
    writeln!(output, "  q) Quit")?;
    write!(output, "\n> ")?;
    output.flush()?;
    Ok(())
}

/// Show the menu until the user quits or `input` ends.
///
/// Each choice runs to completion before the menu comes back. Unknown
/// choices and programs that fail to start are reported and the menu
/// carries on. Returns the report of every entry that ran.
pub fn run_menu<R: BufRead, W: Write>(
    launcher: &Launcher,
    input: &mut R,
    output: &mut W,
) -> Result<Vec<LaunchReport>, LauncherError> {
    let mut reports = Vec::new();

    loop {
        print_menu(launcher, output)?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let choice = line.trim();
        debug!("menu choice: {:?}", choice);

        if choice.is_empty() {
            continue;
        }
        if choice.eq_ignore_ascii_case("q") || choice.eq_ignore_ascii_case("quit") {
            break;
        }

        let entry = match launcher.find(choice) {
            Ok(entry) => entry,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };

        match launcher.launch(entry) {
            Ok(report) => {
                writeln!(output, "\n{}", report)?;
                reports.push(report);
            }
            Err(e @ LauncherError::Spawn { .. }) => writeln!(output, "{}", e)?,
            Err(e) => return Err(e),
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherConfig;
    use std::io::Cursor;

    #[test]
    fn test_menu_lists_entries_and_quits() {
        let launcher = Launcher::new(LauncherConfig::default());
        let mut input = Cursor::new(b"\nq\n".to_vec());
        let mut output = Vec::new();

        let reports = run_menu(&launcher, &mut input, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(reports.is_empty());
        assert!(text.contains("DAQ HAT Launcher"));
        assert!(text.contains("  3) Finite Scan w/Trigger\n"));
        assert!(text.contains("  q) Quit\n"));
        // the blank line redraws the menu once
        assert_eq!(text.matches("  q) Quit").count(), 2);
    }

    #[test]
    fn test_unknown_choice_keeps_menu_open() {
        let launcher = Launcher::new(LauncherConfig::default());
        let mut input = Cursor::new(b"9\n".to_vec());
        let mut output = Vec::new();

        let reports = run_menu(&launcher, &mut input, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(reports.is_empty());
        assert!(text.contains("No launcher entry matches '9'"));
    }
}
