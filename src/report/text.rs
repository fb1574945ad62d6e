//! Plain-text summary, for mail bodies and terminals

use super::SignalReport;
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, report: &SignalReport) -> io::Result<()> {
    let summary = &report.summary;

    writeln!(writer, "RF MONITORING REPORT")?;
    writeln!(writer, "====================")?;
    writeln!(writer)?;
    writeln!(writer, "Period:    last {} hours (since {})", report.period_hours, report.period_start)?;
    writeln!(writer, "Generated: {}", report.generated_at)?;
    writeln!(writer)?;
    writeln!(writer, "SUMMARY")?;
    writeln!(writer, "-------")?;
    writeln!(writer, "  Total signals: {}", summary.total_signals)?;
    match summary.avg_power_dbm {
        Some(avg) => writeln!(writer, "  Average power: {:.1} dBm", avg)?,
        None => writeln!(writer, "  Average power: n/a")?,
    }
    writeln!(writer, "  Power range:   {}", report.power_range())?;
    writeln!(writer, "  Signal types:  {}", summary.unique_signal_types)?;

    writeln!(writer)?;
    writeln!(writer, "SIGNAL BREAKDOWN")?;
    writeln!(writer, "----------------")?;
    for row in &report.signal_breakdown {
        writeln!(
            writer,
            "  {:<10} {:>5} signals, avg {:.1} dBm",
            row.signal_type,
            row.count,
            row.avg_power_dbm.unwrap_or(f64::NAN)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "HOURLY ACTIVITY (UTC)")?;
    writeln!(writer, "---------------------")?;
    for hour in &report.hourly_activity {
        writeln!(writer, "  {}: {} signals", hour.hour, hour.signal_count)?;
    }

    if !report.alerts.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "ALERTS")?;
        writeln!(writer, "------")?;
        for alert in &report.alerts {
            writeln!(writer, "  [{}] {} ({})", alert.severity, alert.message, alert.timestamp)?;
        }
    }

    writeln!(writer)?;
    writeln!(writer, "--- End of Report ---")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_text_sections() {
        let (_dir, report) = sample_report();
        let mut out = Vec::new();
        write(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Total signals: 3"));
        assert!(text.contains("Power range:   -70.0 to -35.0 dBm"));
        assert!(text.contains("[HIGH] HIGH POWER SIGNAL DETECTED"));
        assert!(text.trim_end().ends_with("--- End of Report ---"));
    }
}
