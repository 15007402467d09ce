//! Writers for the two plain text artifacts the server produces: the throughput log
//! (`timestamp,count` lines) and the memory dump (the full key/value mapping as JSON).
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::monitor::Sample;
use crate::{KvsError, Result};

/// opens `path` for writing, creating it if needed and truncating whatever it held before
pub fn open_sink(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| KvsError::sink(path, e))?;
    debug!("opened sink {:?}", path);
    Ok(BufWriter::new(file))
}

/// writes one `timestamp,count` line per sample, in the order given, then flushes `sink`.
///
/// Each line goes out in a single `write_all`, so lines written before a failure stay written
/// whole.
pub fn write_samples<W: Write>(sink: &mut W, samples: &[Sample]) -> std::io::Result<()> {
    for sample in samples {
        let line = format!("{},{}\n", sample.timestamp, sample.count);
        sink.write_all(line.as_bytes())?;
    }
    sink.flush()
}

/// serializes `entries` as a single JSON object (`{"1":"abc","2":"xyz"}`) and flushes `sink`
pub fn write_dump<W: Write>(sink: &mut W, entries: &BTreeMap<i64, String>) -> Result<()> {
    serde_json::to_writer(&mut *sink, entries)?;
    sink.flush()?;
    Ok(())
}

/// creates (or truncates) the file at `path` and writes the memory dump into it
pub fn dump_to_path(path: &Path, entries: &BTreeMap<i64, String>) -> Result<()> {
    let mut sink = open_sink(path)?;
    write_dump(&mut sink, entries).map_err(|e| match e {
        KvsError::Io(source) => KvsError::sink(path, source),
        other => other,
    })
}
