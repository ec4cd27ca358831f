//! Class repository — class → teacher + enrolled students.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub student_ids: Vec<Uuid>,
}

impl ClassRecord {
    #[must_use]
    pub fn is_enrolled(&self, student_id: Uuid) -> bool {
        self.student_ids.contains(&student_id)
    }
}

/// Read-only view of classes. Implemented over Postgres in production and
/// by an in-memory map in tests.
#[async_trait::async_trait]
pub trait ClassRepository: Send + Sync {
    /// Look up a class with its current enrollment. `Ok(None)` if it does not exist.
    async fn find_by_id(&self, class_id: Uuid) -> Result<Option<ClassRecord>, StoreError>;
}

pub struct PgClassRepository {
    pool: PgPool,
}

impl PgClassRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClassRepository for PgClassRepository {
    async fn find_by_id(&self, class_id: Uuid) -> Result<Option<ClassRecord>, StoreError> {
        let Some(teacher_id) = sqlx::query_scalar::<_, Uuid>("SELECT teacher_id FROM classes WHERE id = $1")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let student_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT student_id FROM class_students WHERE class_id = $1 ORDER BY student_id",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ClassRecord { id: class_id, teacher_id, student_ids }))
    }
}
