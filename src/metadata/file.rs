use crate::metadata::record::MetadataRecord;
use crate::metadata::{MetadataError, MetadataStore};
use crate::raft::{Configuration, MemberId, Term};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// FileMetadataStore keeps a partition's metadata in a single file, `{log_name}-{id}.meta`.
///
/// Every mutation rewrites the whole record: it is written to a temporary file, synced, and
/// renamed over the canonical file, so a crash leaves either the old or the new record.
pub struct FileMetadataStore {
    logger: slog::Logger,
    directory: PathBuf,
    path: PathBuf,
    id: u32,
    log_name: String,
    // Loaded on first access.
    cached: Option<MetadataRecord>,
}

impl FileMetadataStore {
    pub fn open<P: AsRef<Path>>(
        logger: slog::Logger,
        directory: P,
        id: u32,
        log_name: &str,
    ) -> Result<Self, MetadataError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        let path = directory.join(format!("{}-{}.meta", log_name, id));

        Ok(FileMetadataStore {
            logger: logger.new(slog::o!("metadata" => path.display().to_string())),
            directory,
            path,
            id,
            log_name: log_name.to_string(),
            cached: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&mut self) -> Result<&MetadataRecord, MetadataError> {
        let record = match self.cached.take() {
            Some(record) => record,
            None => self.load()?,
        };
        Ok(self.cached.insert(record))
    }

    fn load(&self) -> Result<MetadataRecord, MetadataError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let record = MetadataRecord::decode(&bytes)?;
                slog::debug!(self.logger, "Loaded metadata: {:?}", record);
                Ok(record)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MetadataRecord::new(
                self.id,
                self.log_name.clone(),
                self.directory.display().to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write of the whole record. The cache only changes once the new record is
    /// durable.
    fn update<F>(&mut self, mutate: F) -> Result<(), MetadataError>
    where
        F: FnOnce(&mut MetadataRecord),
    {
        let mut record = self.record()?.clone();
        mutate(&mut record);
        self.persist(&record)?;
        self.cached = Some(record);
        Ok(())
    }

    fn persist(&self, record: &MetadataRecord) -> Result<(), MetadataError> {
        let bytes = record.encode()?;
        let tmp = self.path.with_extension("meta.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        sync_directory(&self.logger, &self.directory)?;
        Ok(())
    }
}

/// Makes renames inside `directory` durable. Platforms that can't fsync a directory handle only
/// get a warning.
pub(crate) fn sync_directory(logger: &slog::Logger, directory: &Path) -> Result<(), io::Error> {
    let dir = OpenOptions::new().read(true).open(directory)?;
    if let Err(e) = dir.sync_all() {
        slog::warn!(logger, "Failed to sync directory {}: {}", directory.display(), e);
    }
    Ok(())
}

impl MetadataStore for FileMetadataStore {
    fn load_term(&mut self) -> Result<Term, MetadataError> {
        Ok(self.record()?.term())
    }

    fn load_vote(&mut self) -> Result<Option<MemberId>, MetadataError> {
        self.record()?.vote()
    }

    fn load_configuration(&mut self) -> Result<Option<Configuration>, MetadataError> {
        self.record()?.configuration()
    }

    fn store_term(&mut self, term: Term) -> Result<(), MetadataError> {
        self.update(|record| record.set_term(term))
    }

    fn store_vote(&mut self, vote: Option<&MemberId>) -> Result<(), MetadataError> {
        self.update(|record| record.set_vote(vote))
    }

    fn store_term_and_vote(&mut self, term: Term, vote: Option<&MemberId>) -> Result<(), MetadataError> {
        self.update(|record| {
            record.set_term(term);
            record.set_vote(vote);
        })
    }

    fn store_configuration(&mut self, configuration: &Configuration) -> Result<(), MetadataError> {
        self.update(|record| record.set_configuration(configuration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::Index;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn open(dir: &Path) -> FileMetadataStore {
        FileMetadataStore::open(logger(), dir, 1, "partition").unwrap()
    }

    #[test]
    fn sync_directory_requires_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        sync_directory(&logger(), dir.path()).unwrap();

        let missing = sync_directory(&logger(), &dir.path().join("missing"));
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());

        assert_eq!(store.load_term().unwrap(), Term::ZERO);
        assert_eq!(store.load_vote().unwrap(), None);
        assert_eq!(store.load_configuration().unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn term_and_vote_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let voted_for = MemberId::new("10.0.0.7", 26502);
        {
            let mut store = open(dir.path());
            store.store_term_and_vote(Term::new(5), Some(&voted_for)).unwrap();
        }

        let mut reopened = open(dir.path());
        assert_eq!(reopened.load_term().unwrap(), Term::new(5));
        assert_eq!(reopened.load_vote().unwrap(), Some(voted_for));

        reopened.store_vote(None).unwrap();
        let mut reopened = open(dir.path());
        assert_eq!(reopened.load_vote().unwrap(), None);
        assert_eq!(reopened.load_term().unwrap(), Term::new(5));
    }

    #[test]
    fn configuration_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let configuration = Configuration::new(
            Index::new(12),
            Term::new(3),
            vec![MemberId::new("a", 1), MemberId::new("b", 2)],
        )
        .unwrap();
        open(dir.path()).store_configuration(&configuration).unwrap();

        let mut reopened = open(dir.path());
        assert_eq!(reopened.load_configuration().unwrap(), Some(configuration));
    }

    #[test]
    fn record_is_byte_identical_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());
        store.store_term_and_vote(Term::new(9), Some(&MemberId::new("h", 7))).unwrap();
        let written = fs::read(store.path()).unwrap();

        let record = MetadataRecord::decode(&written).unwrap();
        assert_eq!(record.encode().unwrap(), written);
        assert_eq!(record.id, 1);
        assert_eq!(record.log_name, "partition");
    }

    #[test]
    fn absent_vote_is_encoded_as_empty_host_and_negative_port() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());
        store.store_term(Term::new(2)).unwrap();

        let record = MetadataRecord::decode(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(record.vote_host, "");
        assert_eq!(record.vote_port, -1);
    }

    #[test]
    fn no_temporary_file_is_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());
        store.store_term(Term::new(1)).unwrap();
        store.store_term(Term::new(2)).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["partition-1.meta".to_string()]);
    }

    #[test]
    fn garbage_file_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("partition-1.meta"), b"\x01").unwrap();

        let mut store = open(dir.path());
        assert!(matches!(store.load_term(), Err(MetadataError::Corrupt(_))));
    }
}
