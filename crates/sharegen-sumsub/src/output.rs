//! Result sink: incremental CSV output, one durable row per record

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use sharegen_core::trim_torn_tail;

use crate::record::InputRecord;
use crate::state::ProcessingOutcome;

/// Output columns, in order
pub const OUTPUT_COLUMNS: [&str; 6] = [
    "applicantId",
    "externalId",
    "applicantLevel",
    "shareToken",
    "forClientId",
    "error",
];

/// One output row: either the token pair or `error` is populated, never both
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRow {
    pub applicant_id: String,
    pub external_id: String,
    pub applicant_level: String,
    pub share_token: String,
    pub for_client_id: String,
    pub error: String,
}

impl OutputRow {
    /// Row for a terminal outcome; `None` for an aborted record
    pub fn new(record: &InputRecord, outcome: &ProcessingOutcome) -> Option<Self> {
        let (share_token, for_client_id, error) = match outcome {
            ProcessingOutcome::Success { token, issuer_id } => {
                (token.clone(), issuer_id.clone(), String::new())
            }
            ProcessingOutcome::PermanentFailure { reason } => {
                (String::new(), String::new(), reason.clone())
            }
            ProcessingOutcome::Aborted { .. } => return None,
        };
        Some(Self {
            applicant_id: record.applicant_id.clone(),
            external_id: record.external_id.clone(),
            applicant_level: record.level.clone(),
            share_token,
            for_client_id,
            error,
        })
    }

    fn fields(&self) -> [&str; 6] {
        [
            &self.applicant_id,
            &self.external_id,
            &self.applicant_level,
            &self.share_token,
            &self.for_client_id,
            &self.error,
        ]
    }
}

/// Append-only CSV writer that syncs every row before returning.
pub struct ResultSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    existing: FxHashSet<String>,
    rows_written: usize,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("path", &self.path)
            .field("existing", &self.existing.len())
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

impl ResultSink {
    /// Open the output file.
    ///
    /// `resume = true` keeps existing rows (the header must match) and
    /// appends after cutting any partial trailing row; otherwise the file
    /// is recreated with a fresh header.
    pub fn open(path: &Path, resume: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = if resume {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            let torn = trim_torn_tail(&mut file)?;
            if torn > 0 {
                log::warn!(
                    "{}: dropped {torn} bytes of a partial trailing row",
                    path.display()
                );
            }
            file
        } else {
            File::create(path)?
        };

        let has_content = file.metadata()?.len() > 0;
        let existing = if has_content {
            read_existing_keys(path)?
        } else {
            FxHashSet::default()
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !has_content {
            writer.write_record(OUTPUT_COLUMNS).map_err(io::Error::other)?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            existing,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// externalIds that already had a row when the sink was opened
    pub fn existing_keys(&self) -> &FxHashSet<String> {
        &self.existing
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append a row; it is flushed and synced before this returns.
    pub fn append(&mut self, row: &OutputRow) -> io::Result<()> {
        self.writer
            .write_record(row.fields())
            .map_err(io::Error::other)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.rows_written += 1;
        Ok(())
    }
}

/// externalIds with a complete row in an existing output file.
///
/// A missing or empty file has none. Fails if the header is not ours.
pub fn output_keys(path: &Path) -> io::Result<FxHashSet<String>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => read_existing_keys(path),
        Ok(_) => Ok(FxHashSet::default()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FxHashSet::default()),
        Err(e) => Err(e),
    }
}

/// Verify the header of an existing output file and collect its keys
fn read_existing_keys(path: &Path) -> io::Result<FxHashSet<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(io::Error::other)?;
    let headers = reader.headers().map_err(io::Error::other)?;
    if headers.iter().ne(OUTPUT_COLUMNS.iter().copied()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{}: unexpected header {:?}, expected {:?}",
                path.display(),
                headers.iter().collect::<Vec<_>>(),
                OUTPUT_COLUMNS
            ),
        ));
    }

    let mut keys = FxHashSet::default();
    for row in reader.records() {
        match row {
            Ok(row) if row.len() == OUTPUT_COLUMNS.len() => {
                if let Some(key) = row.get(1).filter(|k| !k.is_empty()) {
                    keys.insert(key.to_string());
                }
            }
            Ok(row) => log::warn!(
                "{}: skipping row with {} fields",
                path.display(),
                row.len()
            ),
            Err(e) => log::warn!("{}: skipping unreadable row: {e}", path.display()),
        }
    }
    Ok(keys)
}
