//! Report rendering

use crate::network::Verdict;
use crate::scanner::{PortReport, ScanReport};
use colored::*;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

/// `<address> <port> <protocol> <verdict>`
pub fn format_line(result: &PortReport) -> String {
    format!(
        "{} {} {} {}",
        result.address, result.port, result.protocol, result.verdict
    )
}

fn colored_line(result: &PortReport) -> String {
    let verdict = match result.verdict {
        Verdict::Open => result.verdict.to_string().green().bold(),
        Verdict::Closed => result.verdict.to_string().red(),
        Verdict::Filtered => result.verdict.to_string().yellow(),
        Verdict::Pending => result.verdict.to_string().dimmed(),
    };
    format!("{} {} {} {}", result.address, result.port, result.protocol, verdict)
}

/// Writes scan reports in one [`OutputFormat`]
#[derive(Debug, Clone, Copy)]
pub struct ReportWriter {
    format: OutputFormat,
    color: bool,
}

impl ReportWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format, color: false }
    }

    /// Colour verdicts in text output
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Write one line per probe of `report`, in report order.
    pub fn write<W: Write>(&self, out: &mut W, report: &ScanReport) -> io::Result<()> {
        for result in &report.results {
            match self.format {
                OutputFormat::Text if self.color => writeln!(out, "{}", colored_line(result))?,
                OutputFormat::Text => writeln!(out, "{}", format_line(result))?,
                OutputFormat::Json => {
                    serde_json::to_writer(&mut *out, result)?;
                    writeln!(out)?;
                }
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PortProbe;
    use crate::scanner::ProbeContext;
    use std::time::Duration;

    fn report() -> ScanReport {
        let context = ProbeContext::new(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            40000,
        );
        ScanReport::new(
            &context,
            vec![
                (PortProbe::tcp(22), Verdict::Open),
                (PortProbe::tcp(9999), Verdict::Filtered),
                (PortProbe::udp(53), Verdict::Closed),
            ],
            Duration::from_millis(400),
        )
    }

    #[test]
    fn test_text_lines() {
        let mut out = Vec::new();
        ReportWriter::new(OutputFormat::Text).write(&mut out, &report()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "10.0.0.2 22 tcp open\n10.0.0.2 9999 tcp filtered\n10.0.0.2 53 udp closed\n"
        );
    }

    #[test]
    fn test_json_lines() {
        let mut out = Vec::new();
        ReportWriter::new(OutputFormat::Json).write(&mut out, &report()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["address"], "10.0.0.2");
        assert_eq!(first["port"], 22);
        assert_eq!(first["protocol"], "tcp");
        assert_eq!(first["verdict"], "open");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
