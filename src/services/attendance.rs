//! Attendance store — durable, append-only attendance records.
//!
//! DESIGN
//! ======
//! Records are written only when a session closes, as one batch inside one
//! transaction: either every row of the close lands or none does. Rows are
//! never updated; a later close for the same class appends new rows and
//! `latest_status` reads the newest.

use serde::Serialize;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::db::StoreError;
use crate::services::session::AttendanceStatus;

/// Rows per INSERT statement. Keeps bind parameters well under the
/// Postgres limit of 65535.
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub class_id: Uuid,
    pub student_id: Uuid,
    pub status: AttendanceStatus,
}

#[async_trait::async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Persist a finalized batch. All-or-nothing.
    async fn insert_batch(&self, records: &[AttendanceRecord]) -> Result<(), StoreError>;

    /// Most recent durable status for one student in one class.
    async fn latest_status(&self, class_id: Uuid, student_id: Uuid) -> Result<Option<AttendanceStatus>, StoreError>;
}

pub struct PgAttendanceStore {
    pool: PgPool,
}

impl PgAttendanceStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttendanceStore for PgAttendanceStore {
    async fn insert_batch(&self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::new("INSERT INTO attendance (class_id, student_id, status) ");
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.class_id)
                    .push_bind(record.student_id)
                    .push_bind(record.status.as_str());
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn latest_status(&self, class_id: Uuid, student_id: Uuid) -> Result<Option<AttendanceStatus>, StoreError> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT status FROM attendance
             WHERE class_id = $1 AND student_id = $2
             ORDER BY recorded_at DESC, id DESC
             LIMIT 1",
        )
        .bind(class_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|raw| AttendanceStatus::parse(&raw).ok_or_else(|| StoreError::Rejected(format!("unknown status '{raw}'"))))
            .transpose()
    }
}
