//! Durable record of keys that reached a terminal outcome.
//!
//! Stored as an append-only JSON-lines log next to the output file.
//! Replay on load is idempotent: the first entry for a key wins and a
//! torn trailing line (crash mid-append) is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Outcome that resume logic never revisits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalOutcome {
    Success,
    PermanentFailure { reason: String },
}

/// Keys already terminal, with their outcome
pub type TerminalSet = FxHashMap<String, TerminalOutcome>;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEntry {
    #[serde(rename = "externalId")]
    external_id: String,
    outcome: TerminalOutcome,
}

/// Checkpoint log path for an output file: `<output>.checkpoint.jsonl`
pub fn checkpoint_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".checkpoint.jsonl");
    PathBuf::from(name)
}

/// Append-only checkpoint log.
pub struct CheckpointStore {
    path: PathBuf,
    file: File,
    terminal: TerminalSet,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .field("entries", &self.terminal.len())
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Read the terminal set without opening the log for writing.
    ///
    /// A missing file is an empty set.
    pub fn load(path: &Path) -> io::Result<TerminalSet> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TerminalSet::default()),
            Err(e) => return Err(e),
        };

        let mut terminal = TerminalSet::default();
        let mut duplicates = 0usize;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointEntry>(&line) {
                Ok(entry) => {
                    if terminal.contains_key(&entry.external_id) {
                        duplicates += 1;
                    } else {
                        terminal.insert(entry.external_id, entry.outcome);
                    }
                }
                Err(e) => log::warn!(
                    "{}:{}: ignoring unreadable checkpoint entry: {e}",
                    path.display(),
                    idx + 1
                ),
            }
        }
        if duplicates > 0 {
            log::warn!(
                "{}: {duplicates} duplicate checkpoint entries ignored",
                path.display()
            );
        }
        Ok(terminal)
    }

    /// Open the log for a run.
    ///
    /// `resume = true` replays the existing log and appends to it;
    /// otherwise the log is truncated so no record is silently skipped.
    pub fn open(path: &Path, resume: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let (terminal, file) = if resume {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            let torn = trim_torn_tail(&mut file)?;
            if torn > 0 {
                log::warn!(
                    "{}: dropped {torn} bytes of a partial trailing entry",
                    path.display()
                );
            }
            (Self::load(path)?, file)
        } else {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            (TerminalSet::default(), file)
        };

        log::debug!(
            "Checkpoint {} opened with {} terminal keys",
            path.display(),
            terminal.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            terminal,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.terminal.contains_key(key)
    }

    pub fn terminal(&self) -> &TerminalSet {
        &self.terminal
    }

    pub fn len(&self) -> usize {
        self.terminal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty()
    }

    /// Persist a terminal outcome. Returns once the entry is on disk.
    ///
    /// Committing a key twice keeps the first outcome.
    pub fn commit(&mut self, key: &str, outcome: &TerminalOutcome) -> io::Result<()> {
        if self.terminal.contains_key(key) {
            log::warn!("{key}: already checkpointed, keeping first outcome");
            return Ok(());
        }
        let line = encode(key, outcome)?;
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.terminal.insert(key.to_string(), outcome.clone());
        Ok(())
    }

    /// Keep only entries whose key passes `keep`; returns how many were dropped.
    ///
    /// The log is rewritten to `<path>.tmp`, synced and renamed over the
    /// original, so a crash leaves either the old or the new log.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> io::Result<usize> {
        let before = self.terminal.len();
        self.terminal.retain(|key, _| keep(key));
        let dropped = before - self.terminal.len();
        if dropped == 0 {
            return Ok(0);
        }

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for (key, outcome) in &self.terminal {
            writer.write_all(&encode(key, outcome)?)?;
        }
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        log::debug!(
            "Checkpoint {}: rewrote without {dropped} entries",
            self.path.display()
        );
        Ok(dropped)
    }
}

fn encode(key: &str, outcome: &TerminalOutcome) -> io::Result<Vec<u8>> {
    let entry = CheckpointEntry {
        external_id: key.to_string(),
        outcome: outcome.clone(),
    };
    let mut line = serde_json::to_vec(&entry).map_err(io::Error::other)?;
    line.push(b'\n');
    Ok(line)
}

/// Cut a partial trailing line left by a crash mid-append.
///
/// The file ends at a line boundary afterwards; one without any newline
/// is emptied. Returns the number of bytes removed.
pub fn trim_torn_tail(file: &mut File) -> io::Result<u64> {
    let len = file.metadata()?.len();
    let mut buf = [0u8; 4096];
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }
    if keep < len {
        file.set_len(keep)?;
        file.sync_data()?;
    }
    Ok(len - keep)
}
