//! JSON-lines record input and output.

use crate::error::DedupError;
use crate::model::Record;
use std::io::{BufRead, Write};

/// Read one JSON object per line. Blank lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<Record>, DedupError> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str::<Record>(line)?);
    }
    Ok(records)
}

/// Write each record as one compact JSON line.
pub fn write_jsonl<W: Write>(mut writer: W, records: &[Record]) -> Result<(), DedupError> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
