//! Persistence boundary for medications and dose logs.
//!
//! [`Repository`] is the seam between the tracker and storage:
//! - [`MemoryRepository`] keeps everything for the lifetime of the process
//! - [`FileRepository`] keeps medications in an atomically-replaced JSON
//!   file and dose logs in an append-only JSONL file, with file locking so
//!   concurrent processes never interleave writes
//!
//! Medication updates are read-modify-write, so they hold an exclusive lock
//! on a separate `medications.lock` file for the whole sequence. An
//! unreadable medications file is moved aside before it is replaced.

use crate::{DoseLog, Error, Medication, Result};
use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Storage for medications and dose logs
pub trait Repository {
    fn load_medications(&self) -> Result<Vec<Medication>>;

    /// Insert a medication, replacing any stored record with the same id
    fn save_medication(&mut self, medication: &Medication) -> Result<()>;

    /// Delete a stored medication
    ///
    /// Returns [`Error::NotFound`] when no medication has this id.
    fn remove_medication(&mut self, id: Uuid) -> Result<()>;

    /// All dose logs in the order they were appended
    fn load_logs(&self) -> Result<Vec<DoseLog>>;

    fn append_log(&mut self, log: &DoseLog) -> Result<()>;
}

/// Ephemeral in-process storage
#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
    medications: Vec<Medication>,
    logs: Vec<DoseLog>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn load_medications(&self) -> Result<Vec<Medication>> {
        Ok(self.medications.clone())
    }

    fn save_medication(&mut self, medication: &Medication) -> Result<()> {
        upsert(&mut self.medications, medication);
        Ok(())
    }

    fn remove_medication(&mut self, id: Uuid) -> Result<()> {
        remove_by_id(&mut self.medications, id)
    }

    fn load_logs(&self) -> Result<Vec<DoseLog>> {
        Ok(self.logs.clone())
    }

    fn append_log(&mut self, log: &DoseLog) -> Result<()> {
        self.logs.push(log.clone());
        Ok(())
    }
}

fn upsert(medications: &mut Vec<Medication>, medication: &Medication) {
    match medications.iter_mut().find(|m| m.id == medication.id) {
        Some(existing) => *existing = medication.clone(),
        None => medications.push(medication.clone()),
    }
}

fn remove_by_id(medications: &mut Vec<Medication>, id: Uuid) -> Result<()> {
    let before = medications.len();
    medications.retain(|m| m.id != id);
    if medications.len() == before {
        return Err(Error::NotFound(format!("medication {}", id)));
    }
    Ok(())
}

/// Contents of the medications file as found on disk
enum StoredMedications {
    Missing,
    Valid(Vec<Medication>),
    Corrupt(serde_json::Error),
}

/// File-backed storage rooted at a data directory
pub struct FileRepository {
    medications_path: PathBuf,
    lock_path: PathBuf,
    log_path: PathBuf,
}

impl FileRepository {
    pub const MEDICATIONS_FILE: &'static str = "medications.json";
    pub const DOSE_LOG_FILE: &'static str = "dose_log.jsonl";
    pub const LOCK_FILE: &'static str = "medications.lock";

    /// Create a repository under `data_dir`; files are created lazily
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            medications_path: data_dir.join(Self::MEDICATIONS_FILE),
            lock_path: data_dir.join(Self::LOCK_FILE),
            log_path: data_dir.join(Self::DOSE_LOG_FILE),
        }
    }

    pub fn medications_path(&self) -> &Path {
        &self.medications_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Run a read-modify-write of the medications file under the update lock
    fn update_medications<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Medication>) -> Result<()>,
    {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        lock.lock_exclusive()?;

        let result = self.read_for_update().and_then(|mut medications| {
            update(&mut medications)?;
            self.write_medications(&medications)
        });

        lock.unlock()?;
        result
    }

    /// Current medications for an update, moving an unreadable file aside
    fn read_for_update(&self) -> Result<Vec<Medication>> {
        match self.read_medications()? {
            StoredMedications::Missing => Ok(Vec::new()),
            StoredMedications::Valid(medications) => Ok(medications),
            StoredMedications::Corrupt(e) => {
                let backup = self.medications_path.with_file_name(format!(
                    "{}.corrupt-{}",
                    Self::MEDICATIONS_FILE,
                    Utc::now().format("%Y%m%dT%H%M%S%.3f")
                ));
                std::fs::rename(&self.medications_path, &backup)?;
                tracing::warn!(
                    "Medications file {:?} is unreadable ({}); moved it to {:?}",
                    self.medications_path,
                    e,
                    backup
                );
                Ok(Vec::new())
            }
        }
    }

    fn read_medications(&self) -> Result<StoredMedications> {
        let path = &self.medications_path;
        if !path.exists() {
            tracing::debug!("No medications file at {:?}", path);
            return Ok(StoredMedications::Missing);
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = Vec::new();
        let read = BufReader::new(&file).read_to_end(&mut contents);
        file.unlock()?;
        read?;

        Ok(match serde_json::from_slice::<Vec<Medication>>(&contents) {
            Ok(medications) => StoredMedications::Valid(medications),
            Err(e) => StoredMedications::Corrupt(e),
        })
    }

    /// Atomically replace the medications file
    ///
    /// Writes to a temp file in the same directory, syncs it to disk,
    /// then renames it over the original.
    fn write_medications(&self, medications: &[Medication]) -> Result<()> {
        let parent = self.medications_path.parent().ok_or_else(|| {
            Error::Other(format!("{:?} has no parent directory", self.medications_path))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, medications)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.medications_path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Saved {} medications to {:?}",
            medications.len(),
            self.medications_path
        );
        Ok(())
    }
}

impl Repository for FileRepository {
    /// Returns an empty list if the file is missing or corrupted
    ///
    /// A corrupted file is left in place; the next update moves it aside.
    fn load_medications(&self) -> Result<Vec<Medication>> {
        match self.read_medications()? {
            StoredMedications::Missing => Ok(Vec::new()),
            StoredMedications::Valid(medications) => {
                tracing::debug!(
                    "Loaded {} medications from {:?}",
                    medications.len(),
                    self.medications_path
                );
                Ok(medications)
            }
            StoredMedications::Corrupt(e) => {
                tracing::warn!(
                    "Failed to parse medications file {:?}: {}. Starting empty.",
                    self.medications_path,
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    fn save_medication(&mut self, medication: &Medication) -> Result<()> {
        self.update_medications(|medications| {
            upsert(medications, medication);
            Ok(())
        })?;
        tracing::info!("Stored medication {} ({})", medication.name, medication.id);
        Ok(())
    }

    fn remove_medication(&mut self, id: Uuid) -> Result<()> {
        self.update_medications(|medications| remove_by_id(medications, id))
    }

    /// Skips lines that are not UTF-8 or fail to parse instead of failing
    /// the whole read
    fn load_logs(&self) -> Result<Vec<DoseLog>> {
        let path = &self.log_path;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut logs = Vec::new();

        for (line_num, bytes_result) in reader.split(b'\n').enumerate() {
            let bytes = match bytes_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    file.unlock()?;
                    return Err(e.into());
                }
            };

            let line = match std::str::from_utf8(&bytes) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Dose log line {} is not UTF-8: {}", line_num + 1, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<DoseLog>(line) {
                Ok(log) => logs.push(log),
                Err(e) => {
                    tracing::warn!("Failed to parse dose log at line {}: {}", line_num + 1, e);
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} dose logs from {:?}", logs.len(), path);
        Ok(logs)
    }

    fn append_log(&mut self, log: &DoseLog) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(log)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!("Appended dose log {} to {:?}", log.id, self.log_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DoseStatus, MedicationForm, ScheduleRule};
    use chrono::Utc;

    fn create_test_medication(name: &str) -> Medication {
        Medication {
            id: Uuid::new_v4(),
            name: name.into(),
            dosage: "10mg".into(),
            form: MedicationForm::Pill,
            schedule: ScheduleRule::daily(vec!["08:00".parse().unwrap()]),
            instructions: Some("Take with water.".into()),
        }
    }

    fn create_test_log(medication_id: Uuid, status: DoseStatus) -> DoseLog {
        let now = Utc::now();
        DoseLog {
            id: Uuid::new_v4(),
            medication_id,
            scheduled_time: now,
            action_time: now,
            status,
        }
    }

    #[test]
    fn test_memory_repository_upserts() {
        let mut repo = MemoryRepository::new();
        let mut med = create_test_medication("Lisinopril");
        repo.save_medication(&med).unwrap();

        med.dosage = "20mg".into();
        repo.save_medication(&med).unwrap();

        let stored = repo.load_medications().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].dosage, "20mg");
    }

    #[test]
    fn test_medications_roundtrip_through_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path());

        let a = create_test_medication("Lisinopril");
        let b = create_test_medication("Metformin");
        repo.save_medication(&a).unwrap();
        repo.save_medication(&b).unwrap();

        let reopened = FileRepository::new(temp_dir.path());
        let loaded = reopened.load_medications().unwrap();
        assert_eq!(loaded, vec![a.clone(), b]);

        let mut repo = reopened;
        repo.remove_medication(a.id).unwrap();
        assert_eq!(repo.load_medications().unwrap().len(), 1);
        assert!(matches!(repo.remove_medication(a.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_append_and_read_logs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path().join("nested"));
        let med = Uuid::new_v4();

        for status in [DoseStatus::Taken, DoseStatus::Skipped, DoseStatus::Taken] {
            repo.append_log(&create_test_log(med, status)).unwrap();
        }

        let logs = repo.load_logs().unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[1].status, DoseStatus::Skipped);
    }

    #[test]
    fn test_missing_files_are_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());
        assert!(repo.load_medications().unwrap().is_empty());
        assert!(repo.load_logs().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_log_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path());
        let med = Uuid::new_v4();

        repo.append_log(&create_test_log(med, DoseStatus::Taken)).unwrap();
        let mut file = OpenOptions::new().append(true).open(repo.log_path()).unwrap();
        writeln!(file, "{{ not a dose log").unwrap();
        drop(file);
        repo.append_log(&create_test_log(med, DoseStatus::Skipped)).unwrap();

        assert_eq!(repo.load_logs().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_utf8_log_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path());
        let med = Uuid::new_v4();

        repo.append_log(&create_test_log(med, DoseStatus::Taken)).unwrap();
        let mut file = OpenOptions::new().append(true).open(repo.log_path()).unwrap();
        file.write_all(&[0xFF, 0xFE, b'\n']).unwrap();
        drop(file);
        repo.append_log(&create_test_log(med, DoseStatus::Skipped)).unwrap();

        let logs = repo.load_logs().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].status, DoseStatus::Skipped);
    }

    #[test]
    fn test_memory_and_file_remove_agree_on_unknown_id() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut file_repo = FileRepository::new(temp_dir.path());
        let mut memory_repo = MemoryRepository::new();
        let med = create_test_medication("Lisinopril");
        file_repo.save_medication(&med).unwrap();
        memory_repo.save_medication(&med).unwrap();

        let unknown = Uuid::new_v4();
        assert!(matches!(file_repo.remove_medication(unknown), Err(Error::NotFound(_))));
        assert!(matches!(memory_repo.remove_medication(unknown), Err(Error::NotFound(_))));

        memory_repo.remove_medication(med.id).unwrap();
        assert!(memory_repo.load_medications().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_saves_keep_every_medication() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().to_path_buf();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let mut repo = FileRepository::new(&dir);
                    repo.save_medication(&create_test_medication(&format!("Medication {}", i)))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = FileRepository::new(&dir).load_medications().unwrap();
        assert_eq!(stored.len(), 16);
    }

    #[test]
    fn test_corrupt_medications_file_is_kept_aside_on_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path());
        repo.save_medication(&create_test_medication("Lisinopril")).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(repo.medications_path())
            .unwrap();
        file.write_all(b"x").unwrap();
        drop(file);
        let corrupt = std::fs::read(repo.medications_path()).unwrap();

        repo.save_medication(&create_test_medication("Metformin")).unwrap();

        let stored = repo.load_medications().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Metformin");

        let backups: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read(backups[0].path()).unwrap(), corrupt);
    }

    #[test]
    fn test_corrupt_medications_file_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());
        std::fs::write(repo.medications_path(), "{ invalid json }").unwrap();

        assert!(repo.load_medications().unwrap().is_empty());
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut repo = FileRepository::new(temp_dir.path());
        repo.save_medication(&create_test_medication("Lisinopril")).unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name() != FileRepository::MEDICATIONS_FILE
                    && e.file_name() != FileRepository::LOCK_FILE
            })
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only {}, found extras: {:?}",
            FileRepository::MEDICATIONS_FILE,
            extras
        );
    }
}
