//! Export stored records to CSV.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::io::Write;
use std::path::Path;

use crate::model::record::MailRecord;

const HEADER: &str = "Date,From,To,Delivered_To,Subject,Seen,Replied,Flagged,Path";

/// Export records to a CSV file at `output_path`.
///
/// Columns: Date, From, To, Delivered_To, Subject, Seen, Replied, Flagged, Path
pub fn export_csv(records: &[MailRecord], output_path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(output_path)?;
    let mut out = std::io::BufWriter::new(file);
    write_csv(records, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Write the BOM, header row and one row per record to `out`.
pub fn write_csv<W: Write>(records: &[MailRecord], out: &mut W) -> std::io::Result<()> {
    // UTF-8 BOM for Excel
    out.write_all(&[0xEF, 0xBB, 0xBF])?;
    writeln!(out, "{HEADER}")?;

    for record in records {
        let date = record.date.format("%Y-%m-%d %H:%M:%S").to_string();
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            csv_escape(&date),
            csv_escape(&record.from),
            csv_escape(&record.to),
            csv_escape(&record.delivered_to),
            csv_escape(&record.subject),
            record.is_seen,
            record.is_replied,
            record.is_flagged,
            csv_escape(&record.path),
        )?;
    }

    Ok(())
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
