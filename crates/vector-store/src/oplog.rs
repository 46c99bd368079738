use crate::error::{Result, StoreError};
use crate::types::VectorRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Durable append-only op-log backing a [`crate::VectorStore`].
///
/// One JSON entry per line; replayed on open and compacted down to the
/// surviving records so deletes do not accumulate forever.
pub(crate) struct StoreLog {
    writer: BufWriter<File>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Upsert { record: VectorRecord },
    Delete { id: String },
}

impl StoreLog {
    /// Open (or create) the log, replaying its contents.
    ///
    /// An unreadable line is [`StoreError::Corrupt`]; a partial trailing
    /// line (torn final write) is dropped with a warning instead, since
    /// the entry was never acknowledged.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<VectorRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records: BTreeMap<String, VectorRecord> = BTreeMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut lines = reader.lines().enumerate().peekable();
            while let Some((line_no, line)) = lines.next() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(LogEntry::Upsert { record }) => {
                        records.insert(record.id.clone(), record);
                    }
                    Ok(LogEntry::Delete { id }) => {
                        records.remove(&id);
                    }
                    Err(e) if lines.peek().is_none() => {
                        log::warn!(
                            "dropping torn trailing entry at {}:{}: {e}",
                            path.display(),
                            line_no + 1
                        );
                    }
                    Err(e) => {
                        return Err(StoreError::Corrupt(format!(
                            "unreadable entry at {}:{}: {e}",
                            path.display(),
                            line_no + 1
                        )));
                    }
                }
            }
        }

        let records: Vec<VectorRecord> = records.into_values().collect();
        let log = Self::compact(&path, &records)?;
        Ok((log, records))
    }

    /// Rewrite the log to exactly the surviving records, atomically.
    fn compact(path: &Path, records: &[VectorRecord]) -> Result<StoreLog> {
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                let entry = LogEntry::Upsert {
                    record: record.clone(),
                };
                serde_json::to_writer(&mut writer, &entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(StoreLog {
            writer: BufWriter::new(file),
        })
    }

    pub fn append_upsert(&mut self, record: &VectorRecord) -> Result<()> {
        self.append(&LogEntry::Upsert {
            record: record.clone(),
        })
    }

    pub fn append_delete(&mut self, id: &str) -> Result<()> {
        self.append(&LogEntry::Delete { id: id.to_string() })
    }

    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
