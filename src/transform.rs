use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{Read, Write};

use camino::Utf8Path;

use crate::error::SyncError;
use crate::metadata::parent_dir;
use crate::normalize::to_snake_case;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub headers: Vec<String>,
    pub rows: u64,
}

/// Normalizes each header independently, keeping order.
///
/// The first occurrence of a name keeps it; later collisions get the
/// smallest free `_2`, `_3`, ... suffix. A header with nothing
/// alphanumeric normalizes to the empty name like any other header.
pub fn normalize_headers<'a, I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut taken = HashSet::new();
    let mut normalized = Vec::new();
    for header in headers {
        let base = to_snake_case(header);
        let mut name = base.clone();
        let mut suffix = 2usize;
        while taken.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.insert(name.clone());
        normalized.push(name);
    }
    normalized
}

/// Returns a field as UTF-8. Bytes that are not valid UTF-8 are read as
/// ISO-8859-1, one character per byte.
fn decode_field(field: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(field) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(field.iter().map(|&byte| char::from(byte)).collect()),
    }
}

/// Streams CSV from `input` to `output`, rewriting only the header row.
///
/// Output is always UTF-8. Short rows are padded with empty fields; a row
/// with more fields than the header is an error.
pub fn transform_csv<R: Read, W: Write>(
    input: R,
    output: W,
) -> Result<TransformReport, SyncError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let original = reader.byte_headers()?.clone();
    if original.is_empty() {
        return Err(SyncError::Csv("missing header row".to_string()));
    }
    let width = original.len();
    let decoded: Vec<Cow<'_, str>> = original.iter().map(decode_field).collect();
    let headers = normalize_headers(decoded.iter().map(|header| &**header));

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(&headers)?;

    let mut rows = 0u64;
    let mut record = csv::ByteRecord::new();
    let mut row = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        if record.len() > width {
            let line = record.position().map_or(0, |pos| pos.line());
            return Err(SyncError::Csv(format!(
                "line {line}: {} fields, header has {width}",
                record.len()
            )));
        }
        row.clear();
        for field in &record {
            row.push_field(decode_field(field).as_bytes());
        }
        for _ in record.len()..width {
            row.push_field(b"");
        }
        writer.write_byte_record(&row)?;
        rows += 1;
    }
    writer
        .flush()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;

    Ok(TransformReport { headers, rows })
}

/// Transforms `input` into `destination` through a temporary sibling file,
/// so the destination is either the old file or the complete new one.
pub fn write_normalized_csv<R: Read>(
    input: R,
    destination: &Utf8Path,
) -> Result<TransformReport, SyncError> {
    let parent = parent_dir(destination);
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".cms-sync-csv")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;

    let report = transform_csv(input, &mut temp)?;

    temp.as_file()
        .sync_all()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("persist {destination}: {err}")))?;
    Ok(report)
}
