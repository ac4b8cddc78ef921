//! JSON-lines record files and their upload under an override policy.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::common::error::{PipelineError, PipelineResult};
use crate::store::{ObjectStore, StorePath};

use super::domain::TimeSeriesRecord;

/// One JSON object per line, newline terminated.
pub fn encode_json_lines(records: &[TimeSeriesRecord]) -> PipelineResult<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)
            .map_err(|err| PipelineError::data_format(err.to_string()))?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Inverse of [`encode_json_lines`]; blank lines are ignored.
pub fn decode_json_lines(bytes: &[u8]) -> PipelineResult<Vec<TimeSeriesRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| PipelineError::data_format(format!("records are not UTF-8: {err}")))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|err| PipelineError::data_format(format!("line {}: {err}", n + 1)))
        })
        .collect()
}

/// Write records to a local file, creating parent directories.
pub fn write_local_file(path: &Path, records: &[TimeSeriesRecord]) -> PipelineResult<()> {
    let io_err = |err: std::io::Error| PipelineError::store(path.display(), err);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = BufWriter::new(File::create(path).map_err(io_err)?);
    file.write_all(&encode_json_lines(records)?)
        .map_err(io_err)?;
    file.flush().map_err(io_err)?;
    tracing::debug!(path = %path.display(), records = records.len(), "local record file written");
    Ok(())
}

/// What [`ArtifactWriter::upload`] did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UploadOutcome {
    Uploaded { overwritten: bool },
    /// Target existed and overriding was disabled.
    Skipped,
}

/// Uploads record files, honouring the override flag.
pub struct ArtifactWriter<'a> {
    store: &'a dyn ObjectStore,
    override_existing: bool,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(store: &'a dyn ObjectStore, override_existing: bool) -> Self {
        Self {
            store,
            override_existing,
        }
    }

    pub fn upload(
        &self,
        path: &StorePath,
        records: &[TimeSeriesRecord],
    ) -> PipelineResult<UploadOutcome> {
        let exists = self.store.exists(path)?;
        if exists && !self.override_existing {
            tracing::info!(%path, "file already exists, skipping upload");
            return Ok(UploadOutcome::Skipped);
        }
        if exists {
            tracing::info!(%path, "file already exists, overriding");
        }
        let body = encode_json_lines(records)?;
        self.store.put(path, &body)?;
        tracing::info!(%path, records = records.len(), bytes = body.len(), "uploaded");
        Ok(UploadOutcome::Uploaded { overwritten: exists })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::common::time::parse_timestamp;
    use crate::store::domain::MockObjectStore;
    use crate::store::InMemoryObjectStore;

    fn records() -> Vec<TimeSeriesRecord> {
        let start = parse_timestamp("2014-01-01 00:00:00").unwrap();
        vec![
            TimeSeriesRecord::new(start, vec![1.0, 2.5]),
            TimeSeriesRecord::new(start, vec![]).with_cat(1),
        ]
    }

    #[test]
    fn json_lines_layout() {
        let text = String::from_utf8(encode_json_lines(&records()).unwrap()).unwrap();
        assert_eq!(
            text,
            "{\"start\":\"2014-01-01 00:00:00\",\"target\":[1.0,2.5]}\n\
             {\"start\":\"2014-01-01 00:00:00\",\"target\":[],\"cat\":1}\n"
        );
    }

    fn finite_record() -> impl Strategy<Value = TimeSeriesRecord> {
        let start = (0i64..4_000_000_000, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
            chrono::DateTime::from_timestamp(secs, nanos).unwrap().naive_utc()
        });
        let value = any::<f64>().prop_filter("finite", |v| v.is_finite());
        let target = prop::collection::vec(value, 0..24);
        (start, target, prop::option::of(any::<i64>())).prop_map(|(start, target, cat)| {
            TimeSeriesRecord {
                cat,
                ..TimeSeriesRecord::new(start, target)
            }
        })
    }

    proptest! {
        #[test]
        fn records_read_back_bit_for_bit(records in prop::collection::vec(finite_record(), 1..8)) {
            let decoded = decode_json_lines(&encode_json_lines(&records).unwrap()).unwrap();
            prop_assert_eq!(decoded.len(), records.len());
            for (back, orig) in decoded.iter().zip(&records) {
                prop_assert_eq!(back.start, orig.start);
                prop_assert_eq!(back.cat, orig.cat);
                let bits = |r: &TimeSeriesRecord| {
                    r.target.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
                };
                prop_assert_eq!(bits(back), bits(orig));
            }
        }
    }

    #[test]
    fn garbage_line_is_reported_with_its_number() {
        let err = decode_json_lines(b"\n{not json}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn local_file_lands_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/train.json");
        write_local_file(&path, &records()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(decode_json_lines(&bytes).unwrap().len(), 2);
    }

    #[test]
    fn existing_object_is_overwritten_when_allowed() {
        let store = InMemoryObjectStore::new();
        let path = StorePath::new("demo", "data/train/train.json");
        store.put(&path, b"old\n").unwrap();

        let outcome = ArtifactWriter::new(&store, true)
            .upload(&path, &records())
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded { overwritten: true });
        assert_eq!(decode_json_lines(&store.get(&path).unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn existing_object_is_left_alone_without_override() {
        let mut store = MockObjectStore::new();
        store.expect_exists().returning(|_| Ok(true));
        store.expect_put().never();

        let outcome = ArtifactWriter::new(&store, false)
            .upload(&StorePath::new("demo", "data/test/test.json"), &records())
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Skipped);
    }

    #[test]
    fn fresh_object_is_uploaded() {
        let store = InMemoryObjectStore::new();
        let path = StorePath::new("demo", "data/test/test.json");
        let outcome = ArtifactWriter::new(&store, false)
            .upload(&path, &records())
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded { overwritten: false });
    }
}
