//! Input records and the CSV reader that validates them

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;

/// Columns every input file must carry (any order, extra columns ignored)
pub const REQUIRED_COLUMNS: [&str; 3] = ["applicantId", "externalId", "applicantLevel"];

/// One subject to issue a share token for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRecord {
    /// Provider applicant ID
    pub applicant_id: String,
    /// Caller's unique key; checkpoint and resume key
    pub external_id: String,
    /// Verification level name
    pub level: String,
}

impl InputRecord {
    pub fn new(
        applicant_id: impl Into<String>,
        external_id: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        Self {
            applicant_id: applicant_id.into(),
            external_id: external_id.into(),
            level: level.into(),
        }
    }
}

/// Input that cannot be processed; fatal before any network call
#[derive(Debug)]
pub enum InputError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingColumns(Vec<String>),
    EmptyValue { line: u64, column: &'static str },
    DuplicateExternalId { line: u64, first_line: u64, external_id: String },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Csv(e) => write!(f, "CSV: {e}"),
            Self::MissingColumns(cols) => {
                write!(f, "missing required columns: {}", cols.join(", "))
            }
            Self::EmptyValue { line, column } => {
                write!(f, "line {line}: missing '{column}' value")
            }
            Self::DuplicateExternalId {
                line,
                first_line,
                external_id,
            } => write!(
                f,
                "line {line}: duplicate externalId '{external_id}' (first seen on line {first_line})"
            ),
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for InputError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Read and validate every record of an input CSV file.
pub fn read_records(path: &Path) -> Result<Vec<InputRecord>, InputError> {
    let file = File::open(path)?;
    let records = parse_records(file)?;
    log::info!("{}: {} records", path.display(), records.len());
    Ok(records)
}

/// Parse records from any CSV source with a header row.
///
/// Values are trimmed. Every required value must be non-empty and
/// `externalId` must be unique.
pub fn parse_records(source: impl Read) -> Result<Vec<InputRecord>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    log::debug!("Detected columns: {:?}", headers.iter().collect::<Vec<_>>());
    let position = |name: &str| headers.iter().position(|h| h == name);
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|&c| position(c).is_none())
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(InputError::MissingColumns(missing));
    }
    let idx: Vec<usize> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter_map(|c| position(c))
        .collect();

    let mut records = Vec::new();
    let mut seen: FxHashMap<String, u64> = FxHashMap::default();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map_or(0, |p| p.line());
        let mut values = [""; 3];
        for (slot, (&col, &name)) in idx.iter().zip(REQUIRED_COLUMNS.iter()).enumerate() {
            let value = row.get(col).unwrap_or("");
            if value.is_empty() {
                return Err(InputError::EmptyValue { line, column: name });
            }
            values[slot] = value;
        }
        let [applicant_id, external_id, level] = values;
        if let Some(&first_line) = seen.get(external_id) {
            return Err(InputError::DuplicateExternalId {
                line,
                first_line,
                external_id: external_id.to_string(),
            });
        }
        seen.insert(external_id.to_string(), line);
        records.push(InputRecord::new(applicant_id, external_id, level));
    }
    Ok(records)
}
