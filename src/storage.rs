use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::entities::{Discussion, DiscussionId, Tag};
use crate::error::ConfabError;

/// One durable mutation. A discussion mutation is always a single record
/// carrying the full row state, so replay never sees a half-applied update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DbOperation {
    CreateTag { tag: Tag },
    CreateDiscussion { discussion: Discussion },
    UpdateDiscussion { discussion: Discussion },
    DeleteDiscussion { discussion_id: DiscussionId },
}

pub trait Storage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, ConfabError>;
    async fn write(&mut self, operation: DbOperation) -> Result<(), ConfabError>;
}

pub struct FileStorage {
    db_path: PathBuf,
}

impl FileStorage {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

impl Storage for FileStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, ConfabError> {
        let file_str = tokio::fs::read_to_string(&self.db_path).await
            .map_err(ConfabError::DbIOError)?;
        let operations = file_str.split('\n')
            .filter(|x| !x.is_empty())
            .map(|x| serde_json::from_str(x).map_err(ConfabError::DbSerializationError))
            .collect::<Result<Vec<DbOperation>, ConfabError>>()?;
        Ok(operations)
    }

    async fn write(&mut self, operation: DbOperation) -> Result<(), ConfabError> {
        let serialized_operation = serde_json::to_string(&operation)
            .map_err(ConfabError::DbSerializationError)?;
        let line = format!("{}\n", serialized_operation);
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&self.db_path).await
            .map_err(ConfabError::DbIOError)?;
        tokio::io::AsyncWriteExt::write_all(&mut file, line.as_bytes()).await
            .map_err(ConfabError::DbIOError)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    operations: Vec<DbOperation>,
}

impl Storage for InMemoryStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, ConfabError> {
        Ok(self.operations.clone())
    }

    async fn write(&mut self, operation: DbOperation) -> Result<(), ConfabError> {
        self.operations.push(operation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn file_storage_appends_one_line_per_operation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("confab.db.json");
        std::fs::write(&db_path, "").unwrap();

        let mut storage = FileStorage::new(db_path.clone());
        storage.write(DbOperation::CreateTag { tag: Tag { id: 1, name: "rust".to_string() } }).await.unwrap();
        let created_on = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap().and_hms_opt(9, 30, 0).unwrap();
        let discussion = Discussion::new(1, "first".to_string(), created_on, vec![1]);
        storage.write(DbOperation::CreateDiscussion { discussion }).await.unwrap();
        storage.write(DbOperation::DeleteDiscussion { discussion_id: 1 }).await.unwrap();

        let contents = std::fs::read_to_string(&db_path).unwrap();
        assert_eq!(contents.lines().count(), 3);

        let operations = storage.read_all().await.unwrap();
        assert_eq!(operations.len(), 3);
        assert!(matches!(&operations[0], DbOperation::CreateTag { tag } if tag.name == "rust"));
        assert!(matches!(&operations[2], DbOperation::DeleteDiscussion { discussion_id: 1 }));
    }

    #[tokio::test]
    async fn file_storage_reads_an_empty_seeded_file_as_no_operations() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("confab.db.json");
        std::fs::write(&db_path, "").unwrap();

        let storage = FileStorage::new(db_path);
        let operations = storage.read_all().await.unwrap();
        assert!(operations.is_empty());
    }
}
