//! JSON report output

use super::SignalReport;
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, report: &SignalReport) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)
}
