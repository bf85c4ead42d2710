//! Blob rows in the `db_files` table, backing the `db_file` store.

use affix_storage::{BlobRepository, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{PgPool, Postgres};

#[derive(Clone)]
pub struct PgBlobRepository {
    pool: PgPool,
}

impl PgBlobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend_error(error: sqlx::Error) -> StorageError {
    StorageError::BackendError(error.to_string())
}

#[async_trait]
impl BlobRepository for PgBlobRepository {
    #[tracing::instrument(skip(self, data), fields(db.table = "db_files", size_bytes = data.len()))]
    async fn save(&self, id: Option<i64>, data: Bytes) -> StorageResult<i64> {
        let (id,): (i64,) = match id {
            Some(id) => {
                sqlx::query_as::<Postgres, (i64,)>(
                    r#"
                    INSERT INTO db_files (id, data) VALUES ($1, $2)
                    ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data
                    RETURNING id
                    "#,
                )
                .bind(id)
                .bind(data.as_ref())
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<Postgres, (i64,)>(
                    "INSERT INTO db_files (data) VALUES ($1) RETURNING id",
                )
                .bind(data.as_ref())
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(backend_error)?;

        Ok(id)
    }

    #[tracing::instrument(skip(self), fields(db.table = "db_files"))]
    async fn load(&self, id: i64) -> StorageResult<Bytes> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as::<Postgres, (Vec<u8>,)>("SELECT data FROM db_files WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend_error)?;

        row.map(|(data,)| Bytes::from(data))
            .ok_or_else(|| StorageError::NotFound(format!("db_files/{}", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "db_files"))]
    async fn delete(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query::<Postgres>("DELETE FROM db_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("db_files/{}", id)));
        }
        Ok(())
    }
}
