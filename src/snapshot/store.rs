use crate::commitlog::Index;
use crate::metadata;
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const DATA_EXTENSION: &str = "snapshot";
const CHECKSUM_EXTENSION: &str = "sha3";
const STAGING_SUFFIX: &str = ".tmp";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed")]
    Io(#[from] io::Error),
    #[error("snapshot {name} at {requested:?} is not newer than the latest one at {latest:?}")]
    Stale { name: String, requested: Index, latest: Index },
    #[error("snapshot position {requested:?} is beyond the commit position {commit:?}")]
    Uncommitted { requested: Index, commit: Index },
    #[error("invalid snapshot name {0:?}")]
    InvalidName(String),
    #[error("snapshot validation failed: {0}")]
    Validation(String),
}

/// SnapshotMetadata describes one published snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub name: String,
    pub position: Index,
    /// Hex encoded SHA3-256 digest of the data file.
    pub checksum: String,
    pub path: PathBuf,
}

/// SnapshotStore publishes snapshots into a directory.
///
/// Each snapshot is a data file `{name}-{position}.snapshot` and a checksum file
/// `{name}-{position}.snapshot.sha3` containing `"{hex digest}  {data file name}\n"`. Both are
/// written under a `.tmp` suffix first. Renaming the checksum file into place publishes the
/// snapshot; a data file without its checksum file is invisible.
pub struct SnapshotStore {
    logger: slog::Logger,
    directory: PathBuf,
}

impl SnapshotStore {
    /// Opens (creating if needed) the directory and removes staging files left by a crash.
    pub fn open<P: AsRef<Path>>(logger: slog::Logger, directory: P) -> Result<Self, SnapshotError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            if path.to_string_lossy().ends_with(STAGING_SUFFIX) {
                slog::info!(logger, "Removing abandoned snapshot staging file {:?}", path);
                fs::remove_file(&path)?;
            }
        }

        Ok(SnapshotStore { logger, directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Highest-position published snapshot per name. A snapshot whose checksum file can't be
    /// parsed is skipped in favour of an older one of the same name.
    pub fn list(&self) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
        let mut positions: BTreeMap<String, Vec<Index>> = BTreeMap::new();

        for entry in fs::read_dir(&self.directory)? {
            let file_name = entry?.file_name().to_string_lossy().into_owned();
            if let Some((name, position)) = parse_checksum_file_name(&file_name) {
                positions.entry(name).or_default().push(position);
            }
        }

        let mut snapshots = Vec::with_capacity(positions.len());
        for (name, mut positions) in positions {
            positions.sort_unstable_by(|a, b| b.cmp(a));
            for position in positions {
                match self.read_checksum_file(&name, position) {
                    Ok(checksum) => {
                        snapshots.push(SnapshotMetadata {
                            path: self.data_path(&name, position),
                            name,
                            position,
                            checksum,
                        });
                        break;
                    }
                    Err(e) => {
                        slog::warn!(self.logger, "Skipping unreadable snapshot {}@{:?}: {}", name, position, e);
                    }
                }
            }
        }
        Ok(snapshots)
    }

    pub fn latest(&self, name: &str) -> Result<Option<SnapshotMetadata>, SnapshotError> {
        Ok(self.list()?.into_iter().find(|snapshot| snapshot.name == name))
    }

    /// Starts writing a snapshot of `name` at `position`.
    ///
    /// Refused unless `position <= commit_position` and `position` is above the latest snapshot
    /// of that name.
    pub fn begin(&self, name: &str, position: Index, commit_position: Index) -> Result<SnapshotWriter, SnapshotError> {
        validate_name(name)?;
        if position > commit_position {
            return Err(SnapshotError::Uncommitted {
                requested: position,
                commit: commit_position,
            });
        }
        self.check_newer(name, position)?;

        let data_path = self.data_path(name, position);
        let staging_path = staging(&data_path);
        let file = File::create(&staging_path)?;

        Ok(SnapshotWriter {
            logger: self.logger.new(slog::o!("snapshot" => format!("{}@{:?}", name, position))),
            directory: self.directory.clone(),
            name: name.to_string(),
            position,
            data_path,
            staging_path,
            file: Some(BufWriter::new(file)),
            hasher: Sha3_256::new(),
            committed: false,
        })
    }

    /// Convenience for callers holding the whole snapshot in memory.
    pub fn write(
        &self,
        name: &str,
        position: Index,
        commit_position: Index,
        data: &[u8],
    ) -> Result<SnapshotMetadata, SnapshotError> {
        let mut writer = self.begin(name, position, commit_position)?;
        writer.write_all(data)?;
        writer.commit(self)
    }

    /// Reads a snapshot's data, validating it against its checksum file first.
    pub fn read(&self, snapshot: &SnapshotMetadata) -> Result<Vec<u8>, SnapshotError> {
        let expected = self.read_checksum_file(&snapshot.name, snapshot.position)?;
        let data = fs::read(self.data_path(&snapshot.name, snapshot.position))?;
        let actual = hex::encode(Sha3_256::digest(&data));
        if actual != expected {
            return Err(SnapshotError::Validation(format!(
                "checksum mismatch for {}@{:?}: expected {}, computed {}",
                snapshot.name, snapshot.position, expected, actual
            )));
        }
        Ok(data)
    }

    fn check_newer(&self, name: &str, position: Index) -> Result<(), SnapshotError> {
        if let Some(latest) = self.latest(name)? {
            if position <= latest.position {
                return Err(SnapshotError::Stale {
                    name: name.to_string(),
                    requested: position,
                    latest: latest.position,
                });
            }
        }
        Ok(())
    }

    fn data_path(&self, name: &str, position: Index) -> PathBuf {
        self.directory.join(data_file_name(name, position))
    }

    fn checksum_path(&self, name: &str, position: Index) -> PathBuf {
        self.directory.join(checksum_file_name(name, position))
    }

    /// Parses the checksum file and checks that it names the data file it sits next to.
    fn read_checksum_file(&self, name: &str, position: Index) -> Result<String, SnapshotError> {
        let content = fs::read_to_string(self.checksum_path(name, position))?;
        let (digest, file_name) = parse_checksum_line(&content)
            .ok_or_else(|| SnapshotError::Validation(format!("malformed checksum file for {}@{:?}", name, position)))?;

        let expected_file_name = data_file_name(name, position);
        if file_name != expected_file_name {
            return Err(SnapshotError::Validation(format!(
                "checksum file for {} names {}",
                expected_file_name, file_name
            )));
        }
        Ok(digest.to_string())
    }

    fn delete(&self, name: &str, position: Index) -> Result<(), io::Error> {
        // Checksum first, so a crash in between leaves an invisible data file rather than a
        // visible snapshot without data.
        remove_if_exists(&self.checksum_path(name, position))?;
        remove_if_exists(&self.data_path(name, position))
    }
}

/// SnapshotWriter streams a snapshot's data to its staging file. Dropping it without `commit`
/// discards the staged data.
pub struct SnapshotWriter {
    logger: slog::Logger,
    directory: PathBuf,
    name: String,
    position: Index,
    data_path: PathBuf,
    staging_path: PathBuf,
    file: Option<BufWriter<File>>,
    hasher: Sha3_256,
    committed: bool,
}

impl Write for SnapshotWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::new(io::ErrorKind::Other, "snapshot writer is closed")),
        };
        let written = file.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl SnapshotWriter {
    pub fn position(&self) -> Index {
        self.position
    }

    /// Publishes the snapshot, then deletes the previous snapshot of the same name.
    pub fn commit(mut self, store: &SnapshotStore) -> Result<SnapshotMetadata, SnapshotError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => return Err(SnapshotError::Validation("snapshot writer is closed".to_string())),
        };
        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let checksum = hex::encode(self.hasher.clone().finalize());
        let data_file_name = data_file_name(&self.name, self.position);
        let checksum_path = self.directory.join(checksum_file_name(&self.name, self.position));
        let checksum_staging_path = staging(&checksum_path);
        {
            let mut checksum_file = File::create(&checksum_staging_path)?;
            checksum_file.write_all(format!("{}  {}\n", checksum, data_file_name).as_bytes())?;
            checksum_file.sync_all()?;
        }

        if !self.staging_path.exists() || !checksum_staging_path.exists() {
            return Err(SnapshotError::Validation(format!(
                "staged files for {} disappeared before commit",
                data_file_name
            )));
        }

        // Someone may have published a newer snapshot while we were writing.
        let previous = store.latest(&self.name)?;
        if let Some(previous) = &previous {
            if previous.position >= self.position {
                let _ = fs::remove_file(&checksum_staging_path);
                return Err(SnapshotError::Stale {
                    name: self.name.clone(),
                    requested: self.position,
                    latest: previous.position,
                });
            }
        }

        fs::rename(&self.staging_path, &self.data_path)?;
        fs::rename(&checksum_staging_path, &checksum_path)?;
        metadata::sync_directory(&self.logger, &self.directory)?;
        self.committed = true;
        slog::info!(self.logger, "Published snapshot {} ({})", data_file_name, checksum);

        if let Some(previous) = previous {
            if let Err(e) = store.delete(&previous.name, previous.position) {
                slog::warn!(
                    self.logger,
                    "Failed to delete previous snapshot {}@{:?}: {:?}",
                    previous.name,
                    previous.position,
                    e
                );
            }
        }

        Ok(SnapshotMetadata {
            name: self.name.clone(),
            position: self.position,
            checksum,
            path: self.data_path.clone(),
        })
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.staging_path);
        }
    }
}

fn validate_name(name: &str) -> Result<(), SnapshotError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SnapshotError::InvalidName(name.to_string()))
    }
}

fn data_file_name(name: &str, position: Index) -> String {
    format!("{}-{}.{}", name, position.as_u64(), DATA_EXTENSION)
}

fn checksum_file_name(name: &str, position: Index) -> String {
    format!("{}.{}", data_file_name(name, position), CHECKSUM_EXTENSION)
}

fn staging(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

fn parse_checksum_file_name(file_name: &str) -> Option<(String, Index)> {
    let stem = file_name
        .strip_suffix(CHECKSUM_EXTENSION)?
        .strip_suffix('.')?
        .strip_suffix(DATA_EXTENSION)?
        .strip_suffix('.')?;
    let (name, position) = stem.rsplit_once('-')?;
    let position = position.parse::<u64>().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), Index::new(position)))
}

fn parse_checksum_line(content: &str) -> Option<(&str, &str)> {
    let line = content.strip_suffix('\n')?;
    let (digest, file_name) = line.split_once("  ")?;
    let is_hex = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
    if !is_hex || file_name.is_empty() {
        return None;
    }
    Some((digest, file_name))
}

fn remove_if_exists(path: &Path) -> Result<(), io::Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
