// storage protocol, one collection per quiz slug:
// [slug]/count -> number of submissions, big endian u64
// [slug]/[id]  -> submission as json, keys in submission order
//
// ids are handed out sequentially from 0 and never reused. writes should be
// mutually exclusive, but one write and some reads are allowed to be concurrent

use super::record::AnswerRecord;
use anyhow::Result;
use byteorder::{BigEndian, ByteOrder};
use chrono::Local;
use opendal::services::Sled;
use opendal::{ErrorKind, Operator};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const TIME_FORMAT: &str = "%b %d, %Y (%I:%M %p)";

/// Keyed collections of answer records, one collection per quiz.
pub trait RecordStore: Send + Sync {
    fn fetch(
        &self,
        quiz: &str,
        id: u64,
    ) -> impl Future<Output = Result<Option<AnswerRecord>>> + Send;

    /// `None` when nothing was ever submitted to this quiz.
    fn count(&self, quiz: &str) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Stamps the submission time, persists it and returns the new id.
    fn insert(
        &self,
        quiz: &str,
        record: AnswerRecord,
    ) -> impl Future<Output = Result<u64>> + Send;
}

#[derive(Clone)]
pub struct Storage {
    operator: Operator,
    semaphore: Arc<Semaphore>,
}

impl Storage {
    pub fn new(datadir: &str) -> Result<Self> {
        let mut builder = Sled::default();
        builder.datadir(datadir);

        Ok(Storage {
            operator: Operator::new(builder)?.finish(),
            semaphore: Arc::new(Semaphore::new(1)),
        })
    }

    async fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.operator.read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl RecordStore for Storage {
    async fn fetch(&self, quiz: &str, id: u64) -> Result<Option<AnswerRecord>> {
        let Some(bytes) = self.read_optional(&record_path(quiz, id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }

    async fn count(&self, quiz: &str) -> Result<Option<u64>> {
        match self.read_optional(&count_path(quiz)).await? {
            Some(bytes) => Ok(Some(u64_decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, quiz: &str, record: AnswerRecord) -> Result<u64> {
        let _permit = self.semaphore.acquire().await?;

        let id = self.count(quiz).await?.unwrap_or(0);
        let record = record.stamped(Local::now().format(TIME_FORMAT).to_string());
        self.operator
            .write(&record_path(quiz, id), serde_json::to_vec(&record)?)
            .await?;
        let written = self
            .operator
            .write(&count_path(quiz), u64_encode(id + 1))
            .await;
        count_written(written, quiz, id)?;
        debug!("store record: quiz: {}, id: {}", quiz, id);

        Ok(id)
    }
}

/// The record is already on disk when the count is written, so a failure here
/// leaves it orphaned until the next insert reuses the id.
fn count_written(written: opendal::Result<()>, quiz: &str, id: u64) -> Result<()> {
    if let Err(e) = written {
        warn!(
            "store count failed, record {}/{} will be overwritten by the next insert: {}",
            quiz, id, e
        );
        return Err(e.into());
    }
    Ok(())
}

fn count_path(quiz: &str) -> String {
    quiz.to_string() + "/count"
}

fn record_path(quiz: &str, id: u64) -> String {
    quiz.to_string() + "/" + &id.to_string()
}

fn u64_encode(value: u64) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    buf
}

fn u64_decode(data: &[u8]) -> Result<u64> {
    if data.len() != 8 {
        return Err(anyhow::anyhow!("corrupt count: {} bytes", data.len()));
    }
    Ok(BigEndian::read_u64(data))
}

#[cfg(test)]
pub(crate) mod memory {
    use super::{RecordStore, TIME_FORMAT};
    use crate::results::record::AnswerRecord;
    use anyhow::Result;
    use chrono::Local;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Record store kept in a map, for exercising the engine without sled.
    #[derive(Default)]
    pub struct MemoryStore {
        collections: RwLock<HashMap<String, Vec<AnswerRecord>>>,
    }

    impl MemoryStore {
        /// Stores the record exactly as given, without a timestamp.
        pub fn push_raw(&self, quiz: &str, record: AnswerRecord) -> u64 {
            let mut collections = self.collections.write().unwrap();
            let records = collections.entry(quiz.to_string()).or_default();
            records.push(record);
            records.len() as u64 - 1
        }
    }

    impl RecordStore for MemoryStore {
        async fn fetch(&self, quiz: &str, id: u64) -> Result<Option<AnswerRecord>> {
            let collections = self.collections.read().unwrap();
            Ok(collections
                .get(quiz)
                .and_then(|records| records.get(id as usize))
                .cloned())
        }

        async fn count(&self, quiz: &str) -> Result<Option<u64>> {
            let collections = self.collections.read().unwrap();
            Ok(collections.get(quiz).map(|records| records.len() as u64))
        }

        async fn insert(&self, quiz: &str, record: AnswerRecord) -> Result<u64> {
            let record = record.stamped(Local::now().format(TIME_FORMAT).to_string());
            Ok(self.push_raw(quiz, record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Storage {
        Storage::new(dir.path().to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn unknown_collection_has_no_count() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);

        assert_eq!(storage.count("nobody").await.unwrap(), None);
        assert_eq!(storage.fetch("nobody", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids_per_quiz() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        let record = AnswerRecord::new().with("q1", 3).with("name", "Alice");

        assert_eq!(storage.insert("colors", record.clone()).await.unwrap(), 0);
        assert_eq!(storage.insert("colors", record.clone()).await.unwrap(), 1);
        assert_eq!(storage.insert("pets", record).await.unwrap(), 0);

        assert_eq!(storage.count("colors").await.unwrap(), Some(2));
        assert_eq!(storage.count("pets").await.unwrap(), Some(1));
        assert_eq!(storage.fetch("colors", 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_returns_stamped_record() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        let record = AnswerRecord::new()
            .with("q2", 1)
            .with("q1", 4.5)
            .with("name", "Bob");

        let id = storage.insert("colors", record).await.unwrap();
        let stored = storage.fetch("colors", id).await.unwrap().unwrap();

        assert_eq!(stored.name(), Some("Bob"));
        assert!(stored.time().is_some());
        let numeric: Vec<_> = stored.numeric_answers().collect();
        assert_eq!(numeric, vec![("q2", 1.0), ("q1", 4.5)]);
    }

    #[tokio::test]
    async fn concurrent_inserts_do_not_share_ids() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);

        let mut handles = vec![];
        for i in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let record = AnswerRecord::new().with("q1", i);
                storage.insert("colors", record).await.unwrap()
            }));
        }
        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();

        assert_eq!(ids, (0..8).collect::<Vec<u64>>());
        assert_eq!(storage.count("colors").await.unwrap(), Some(8));
    }

    #[test]
    fn failed_count_write_is_reported() {
        let failed = Err(opendal::Error::new(ErrorKind::Unexpected, "disk full"));

        let err = count_written(failed, "colors", 3).unwrap_err();

        assert!(err.to_string().contains("disk full"));
        assert!(count_written(Ok(()), "colors", 3).is_ok());
    }

    #[test]
    fn count_codec_rejects_truncated_bytes() {
        assert_eq!(u64_decode(&u64_encode(42)).unwrap(), 42);
        assert!(u64_decode(&[0, 1]).is_err());
    }
}
