//! Attachment repository: rows of one attachment table.

use affix_core::{
    AttachmentError, AttachmentRecord, AttachmentRepository, AttachmentResult, StoreSet,
    TaskProgress,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::{PgPool, Postgres};
use std::sync::LazyLock;

static TABLE_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$"));

const COLUMNS: &str = "id, filename, content_type, size, width, height, parent_id, thumbnail, \
                       stores, task_progress, processed_at, db_file_id";

/// Row type for attachment tables (for FromRow).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AttachmentRow {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub parent_id: Option<i64>,
    pub thumbnail: Option<String>,
    pub stores: String,
    pub task_progress: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub db_file_id: Option<i64>,
}

impl TryFrom<AttachmentRow> for AttachmentRecord {
    type Error = AttachmentError;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        let task_progress = match row.task_progress.as_deref() {
            None | Some("") => TaskProgress::new(),
            Some(json) => TaskProgress::from_json(json).map_err(|e| {
                AttachmentError::Repository(format!(
                    "attachment {} has unreadable task progress: {}",
                    row.id, e
                ))
            })?,
        };

        Ok(AttachmentRecord {
            id: Some(row.id),
            filename: Some(row.filename),
            content_type: Some(row.content_type),
            size: Some(row.size),
            width: row.width.and_then(|w| u32::try_from(w).ok()),
            height: row.height.and_then(|h| u32::try_from(h).ok()),
            parent_id: row.parent_id,
            thumbnail: row.thumbnail,
            stores: StoreSet::parse(&row.stores),
            task_progress,
            processed_at: row.processed_at,
            db_file_id: row.db_file_id,
        })
    }
}

/// Column values bound for inserts and updates.
struct Columns {
    filename: String,
    content_type: String,
    size: i64,
    width: Option<i32>,
    height: Option<i32>,
    stores: String,
    task_progress: Option<String>,
}

impl Columns {
    fn from_record(record: &AttachmentRecord) -> AttachmentResult<Self> {
        let required = |value: &Option<String>, column: &str| {
            value.clone().ok_or_else(|| {
                AttachmentError::Repository(format!("attachment {} is missing", column))
            })
        };

        let task_progress = if record.task_progress.is_empty() {
            None
        } else {
            Some(record.task_progress.to_json().map_err(|e| {
                AttachmentError::Repository(format!("task progress is not serializable: {}", e))
            })?)
        };

        Ok(Self {
            filename: required(&record.filename, "filename")?,
            content_type: required(&record.content_type, "content_type")?,
            size: record
                .size
                .ok_or_else(|| AttachmentError::Repository("attachment is missing size".into()))?,
            width: dimension(record.width)?,
            height: dimension(record.height)?,
            stores: record.stores.to_string(),
            task_progress,
        })
    }
}

fn dimension(value: Option<u32>) -> AttachmentResult<Option<i32>> {
    value
        .map(|v| {
            i32::try_from(v).map_err(|_| {
                AttachmentError::Repository(format!("dimension {} does not fit the column", v))
            })
        })
        .transpose()
}

fn db_error(error: sqlx::Error) -> AttachmentError {
    AttachmentError::Repository(error.to_string())
}

/// Repository for one attachment table.
#[derive(Clone)]
pub struct PgAttachmentRepository {
    pool: PgPool,
    table: String,
}

impl PgAttachmentRepository {
    /// Repository over the default `attachments` table.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: "attachments".to_string(),
        }
    }

    /// Repository over `table`, which must have the columns of the `attachments` table.
    pub fn with_table(pool: PgPool, table: &str) -> AttachmentResult<Self> {
        let valid = match &*TABLE_NAME {
            Ok(pattern) => pattern.is_match(table),
            Err(e) => {
                return Err(AttachmentError::Configuration(format!(
                    "table name pattern failed to compile: {}",
                    e
                )))
            }
        };
        if !valid {
            return Err(AttachmentError::Configuration(format!(
                "`{}` is not a valid table name",
                table
            )));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn rows(rows: Vec<AttachmentRow>) -> AttachmentResult<Vec<AttachmentRecord>> {
        rows.into_iter().map(AttachmentRecord::try_from).collect()
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    #[tracing::instrument(skip(self, record), fields(db.table = %self.table))]
    async fn insert(&self, record: &AttachmentRecord) -> AttachmentResult<i64> {
        let columns = Columns::from_record(record)?;
        let sql = format!(
            r#"
            INSERT INTO {} (filename, content_type, size, width, height, parent_id, thumbnail,
                            stores, task_progress, processed_at, db_file_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
            self.table
        );

        let (id,): (i64,) = sqlx::query_as::<Postgres, (i64,)>(&sql)
            .bind(&columns.filename)
            .bind(&columns.content_type)
            .bind(columns.size)
            .bind(columns.width)
            .bind(columns.height)
            .bind(record.parent_id)
            .bind(&record.thumbnail)
            .bind(&columns.stores)
            .bind(&columns.task_progress)
            .bind(record.processed_at)
            .bind(record.db_file_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(id)
    }

    #[tracing::instrument(skip(self, record), fields(db.table = %self.table, db.record_id = ?record.id))]
    async fn update(&self, record: &AttachmentRecord) -> AttachmentResult<()> {
        let id = record
            .id
            .ok_or_else(|| AttachmentError::Repository("cannot update a new record".to_string()))?;
        let columns = Columns::from_record(record)?;
        let sql = format!(
            r#"
            UPDATE {}
            SET filename = $2, content_type = $3, size = $4, width = $5, height = $6,
                parent_id = $7, thumbnail = $8, stores = $9, task_progress = $10,
                processed_at = $11, db_file_id = $12
            WHERE id = $1
            "#,
            self.table
        );

        let result = sqlx::query::<Postgres>(&sql)
            .bind(id)
            .bind(&columns.filename)
            .bind(&columns.content_type)
            .bind(columns.size)
            .bind(columns.width)
            .bind(columns.height)
            .bind(record.parent_id)
            .bind(&record.thumbnail)
            .bind(&columns.stores)
            .bind(&columns.task_progress)
            .bind(record.processed_at)
            .bind(record.db_file_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(AttachmentError::Repository(format!(
                "attachment {} not found",
                id
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.record_id = %id))]
    async fn update_stores(&self, id: i64, stores: &StoreSet) -> AttachmentResult<()> {
        let sql = format!("UPDATE {} SET stores = $2 WHERE id = $1", self.table);
        sqlx::query::<Postgres>(&sql)
            .bind(id)
            .bind(stores.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.record_id = %id))]
    async fn update_blob_ref(&self, id: i64, db_file_id: Option<i64>) -> AttachmentResult<()> {
        let sql = format!("UPDATE {} SET db_file_id = $2 WHERE id = $1", self.table);
        sqlx::query::<Postgres>(&sql)
            .bind(id)
            .bind(db_file_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.record_id = %id))]
    async fn delete(&self, id: i64) -> AttachmentResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        sqlx::query::<Postgres>(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, db.record_id = %id))]
    async fn find(&self, id: i64) -> AttachmentResult<Option<AttachmentRecord>> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table);
        let row: Option<AttachmentRow> = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(AttachmentRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, parent_id = %parent_id))]
    async fn find_thumbnails(&self, parent_id: i64) -> AttachmentResult<Vec<AttachmentRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE parent_id = $1 ORDER BY id",
            COLUMNS, self.table
        );
        let rows: Vec<AttachmentRow> = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Self::rows(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, parent_id = %parent_id))]
    async fn find_thumbnail(
        &self,
        parent_id: i64,
        label: &str,
    ) -> AttachmentResult<Option<AttachmentRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE parent_id = $1 AND thumbnail = $2",
            COLUMNS, self.table
        );
        let row: Option<AttachmentRow> = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(parent_id)
            .bind(label)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(AttachmentRecord::try_from).transpose()
    }
}
