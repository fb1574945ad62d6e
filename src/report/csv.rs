//! CSV report output: one row per detected signal

use super::SignalReport;
use std::io::{self, Write};

const HEADER: &str = "timestamp,session_id,frequency_mhz,power_dbm,signal_type,confidence,bandwidth_mhz,modulation_type";

pub fn write<W: Write>(writer: &mut W, report: &SignalReport) -> io::Result<()> {
    writeln!(writer, "{}", HEADER)?;

    for s in &report.signals {
        writeln!(
            writer,
            "{},{},{:.6},{:.2},{},{:.3},{:.6},{}",
            s.timestamp,
            s.session_id,
            s.frequency_mhz,
            s.power_dbm,
            escape(&s.signal_type),
            s.confidence,
            s.bandwidth_mhz,
            escape(s.modulation_type.as_deref().unwrap_or("")),
        )?;
    }

    Ok(())
}

/// Quote a field if it contains a separator, quote or newline
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_escape() {
        assert_eq!(escape("WIFI"), "WIFI");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_one_row_per_signal() {
        let (_dir, report) = sample_report();
        let mut out = Vec::new();
        write(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains(",2400.000000,-35.00,WIFI,"));
        assert!(lines[1].ends_with(",CW"));
    }
}
