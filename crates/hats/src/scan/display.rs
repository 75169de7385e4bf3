//! Terminal rendering of scan progress.
//!
//! The table is redrawn in place with `\r`, one line per read.

use std::io::{self, Write};

use crate::types::ScanConfig;

pub const CURSOR_BACK_2: &str = "\x1b[2D";
pub const ERASE_TO_END_OF_LINE: &str = "\x1b[0K";

/// Writes the scan table to a terminal, or to any `Write` in tests.
pub struct ScanDisplay<W: Write> {
    out: W,
}

impl<W: Write> ScanDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Configuration summary printed before the scan starts.
    pub fn banner(
        &mut self,
        title: &str,
        address: u8,
        config: &ScanConfig,
        actual_rate: f64,
    ) -> io::Result<()> {
        let channels: Vec<String> = config.channels.iter().map(|ch| ch.to_string()).collect();
        writeln!(self.out, "\nSelected MCC 118 HAT device at address {}", address)?;
        writeln!(self.out, "\n{}", title)?;
        writeln!(self.out, "    Channels: {}", channels.join(", "))?;
        // rates keep their decimal point: 1000.0, not 1000
        writeln!(self.out, "    Requested scan rate:  {:?}", config.sample_rate)?;
        writeln!(self.out, "    Actual scan rate:  {:?}", actual_rate)?;
        if !config.is_continuous() {
            writeln!(self.out, "    Samples per channel {}", config.samples_per_channel)?;
        }
        writeln!(self.out, "    Options:  {}", config.options)?;
        if config.options.contains(crate::types::ScanOptions::EXTTRIGGER) {
            writeln!(self.out, "    Trigger Mode:  {}", config.trigger_mode.name())?;
        }
        Ok(())
    }

    pub fn message(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }

    /// Column header row for the data table.
    pub fn header(&mut self, channels: &[u8]) -> io::Result<()> {
        write!(self.out, "Samples Read    Scan Count")?;
        for chan in channels {
            write!(self.out, "    Channel {}", chan)?;
        }
        writeln!(self.out)
    }

    /// Start a table line with the per-read and running sample counts.
    pub fn counts(&mut self, samples_read: usize, total: u64) -> io::Result<()> {
        write!(self.out, "\r{:12}  {:12} ", samples_read, total)
    }

    /// Finish a table line with the newest voltage per channel.
    pub fn latest(&mut self, values: &[f64]) -> io::Result<()> {
        for value in values {
            write!(self.out, "{:10.5} V ", value)?;
        }
        self.out.flush()
    }

    pub fn hardware_overrun(&mut self) -> io::Result<()> {
        write!(self.out, "\n\nHardware overrun\n\n")?;
        self.out.flush()
    }

    pub fn buffer_overrun(&mut self) -> io::Result<()> {
        write!(self.out, "\n\nBuffer overrun\n\n")?;
        self.out.flush()
    }

    /// Close the table after the read loop.
    pub fn finish(&mut self) -> io::Result<()> {
        write!(self.out, "\n\n")?;
        self.out.flush()
    }

    /// Erase the `^C` the terminal echoed on interrupt.
    pub fn clear_interrupt(&mut self) -> io::Result<()> {
        write!(self.out, "{}{}\n\n", CURSOR_BACK_2, ERASE_TO_END_OF_LINE)?;
        self.out.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScanOptions, TriggerMode};

    fn rendered<F: FnOnce(&mut ScanDisplay<Vec<u8>>) -> io::Result<()>>(f: F) -> String {
        let mut display = ScanDisplay::new(Vec::new());
        f(&mut display).unwrap();
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn test_header_row() {
        let text = rendered(|d| d.header(&[0, 1, 2, 3]));
        assert_eq!(
            text,
            "Samples Read    Scan Count    Channel 0    Channel 1    Channel 2    Channel 3\n"
        );
    }

    #[test]
    fn test_table_line_widths() {
        let text = rendered(|d| {
            d.counts(500, 1000)?;
            d.latest(&[1.5, -0.25])
        });
        assert_eq!(text, "\r         500          1000    1.50000 V   -0.25000 V ");
    }

    #[test]
    fn test_banner_lists_trigger_settings() {
        let config = ScanConfig {
            options: ScanOptions::EXTTRIGGER,
            trigger_mode: TriggerMode::FallingEdge,
            ..ScanConfig::default()
        };
        let text = rendered(|d| d.banner("MCC 118 triggered scan", 2, &config, 1000.0));
        assert!(text.contains("Selected MCC 118 HAT device at address 2"));
        assert!(text.contains("    Channels: 0, 1, 2, 3\n"));
        assert!(text.contains("    Samples per channel 10000\n"));
        assert!(text.contains("    Options:  EXTTRIGGER\n"));
        assert!(text.contains("    Trigger Mode:  FALLING_EDGE\n"));
    }

    #[test]
    fn test_banner_rates_keep_decimal_point() {
        let config = ScanConfig::default();
        let text = rendered(|d| d.banner("MCC 118 finite scan", 0, &config, 1000.0));
        assert!(text.contains("    Requested scan rate:  1000.0\n"));
        assert!(text.contains("    Actual scan rate:  1000.0\n"));

        let text = rendered(|d| d.banner("MCC 118 finite scan", 0, &config, 999.9375));
        assert!(text.contains("    Actual scan rate:  999.9375\n"));
    }

    #[test]
    fn test_interrupt_cleanup_sequence() {
        let text = rendered(|d| d.clear_interrupt());
        assert_eq!(text, "\x1b[2D\x1b[0K\n\n");
    }
}
