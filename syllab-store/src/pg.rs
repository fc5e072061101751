//! PostgreSQL store implementation
//!
//! Connection pooling via deadpool-postgres, queries via tokio-postgres
//! with parameterized SQL. The two races that matter for correctness are
//! resolved inside the database:
//!
//! - the lease claim and the retry reset are single conditional UPDATE
//!   statements, so two racing workers get exactly one winner;
//! - event appends bump `last_event_index` and insert the event row in one
//!   transaction, which serializes appends per job and keeps the index
//!   gapless.

use crate::{
    AssessmentKind, BuildStore, BuildView, ClaimOutcome, LessonArtifacts, LessonRow, ModuleNode,
    ModuleRow, ProgramRow, RetryReset, ScheduleItemInput, StoreResult,
};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use syllab_core::{
    new_entity_id, BuildEvent, BuildEventInput, BuildJob, BuildStatus, Checkpoint,
    CheckpointPatch, EntityId, JobPatch, JobStatus, LessonPlan, ProgramBlueprint, ProgramStatus,
    StoreError, StudentProfile, Timestamp,
};
use syllab_gen::Assessment;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "syllab".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
        }
    }
}

impl PgConfig {
    /// Read connection settings from `SYLLAB_DB_*` environment variables,
    /// falling back to local defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SYLLAB_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("SYLLAB_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("SYLLAB_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("SYLLAB_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("SYLLAB_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: std::env::var("SYLLAB_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.pool = Some(PoolConfig::new(self.max_size));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::ConnectionFailed {
                reason: format!("failed to create pool: {e}"),
            })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS programs (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    topic TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'DRAFT',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS build_jobs (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    program_id UUID NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'QUEUED',
    current_phase TEXT NOT NULL DEFAULT 'queued',
    current_item TEXT,
    total_modules INT NOT NULL DEFAULT 0,
    completed_modules INT NOT NULL DEFAULT 0,
    total_lessons INT NOT NULL DEFAULT 0,
    completed_lessons INT NOT NULL DEFAULT 0,
    retry_count INT NOT NULL DEFAULT 0,
    max_retries INT NOT NULL DEFAULT 2,
    last_completed_module_index INT,
    last_completed_lesson_index INT,
    last_completed_step_key TEXT,
    checkpoint_data JSONB,
    started_at TIMESTAMPTZ,
    last_heartbeat_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    plan JSONB,
    input_profile JSONB NOT NULL,
    last_event_index BIGINT NOT NULL DEFAULT 0,
    error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_build_jobs_program ON build_jobs(program_id);

CREATE TABLE IF NOT EXISTS build_events (
    job_id UUID NOT NULL REFERENCES build_jobs(id) ON DELETE CASCADE,
    event_index BIGINT NOT NULL,
    event_type TEXT NOT NULL,
    step TEXT NOT NULL,
    status TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT 'INFO',
    message TEXT,
    payload JSONB NOT NULL DEFAULT 'null'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (job_id, event_index)
);

CREATE TABLE IF NOT EXISTS modules (
    id UUID PRIMARY KEY,
    program_id UUID NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
    module_index INT NOT NULL,
    title TEXT NOT NULL,
    outcomes TEXT[] NOT NULL DEFAULT '{}',
    build_status TEXT NOT NULL DEFAULT 'PENDING',
    build_error TEXT,
    UNIQUE (program_id, module_index)
);

CREATE TABLE IF NOT EXISTS lessons (
    id UUID PRIMARY KEY,
    module_id UUID NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    lesson_index INT NOT NULL,
    title TEXT NOT NULL,
    objectives TEXT[] NOT NULL DEFAULT '{}',
    estimated_minutes INT NOT NULL DEFAULT 45,
    build_status TEXT NOT NULL DEFAULT 'PENDING',
    build_error TEXT,
    UNIQUE (module_id, lesson_index)
);

CREATE TABLE IF NOT EXISTS lesson_resources (
    id UUID PRIMARY KEY,
    lesson_id UUID NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
    position INT NOT NULL,
    payload JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lesson_resources_lesson ON lesson_resources(lesson_id);

CREATE TABLE IF NOT EXISTS lesson_notes (
    lesson_id UUID PRIMARY KEY REFERENCES lessons(id) ON DELETE CASCADE,
    payload JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS exercise_sets (
    lesson_id UUID PRIMARY KEY REFERENCES lessons(id) ON DELETE CASCADE,
    payload JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS assessments (
    id UUID PRIMARY KEY,
    program_id UUID NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
    module_id UUID REFERENCES modules(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    payload JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assessments_program ON assessments(program_id);

CREATE TABLE IF NOT EXISTS schedules (
    program_id UUID PRIMARY KEY REFERENCES programs(id) ON DELETE CASCADE,
    start_date TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS schedule_items (
    program_id UUID NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
    position INT NOT NULL,
    day_offset INT NOT NULL,
    item_type TEXT NOT NULL,
    ref_id UUID,
    estimated_minutes INT NOT NULL,
    PRIMARY KEY (program_id, position)
);
"#;

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_err(e: deadpool_postgres::PoolError) -> StoreError {
    StoreError::ConnectionFailed {
        reason: e.to_string(),
    }
}

fn query_err(e: tokio_postgres::Error) -> StoreError {
    StoreError::ConnectionFailed {
        reason: e.to_string(),
    }
}

fn tx_err(e: tokio_postgres::Error) -> StoreError {
    StoreError::TransactionFailed {
        reason: e.to_string(),
    }
}

fn invalid_row(entity: &'static str, e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidRow {
        entity,
        reason: e.to_string(),
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

fn job_from_row(row: &Row) -> StoreResult<BuildJob> {
    let status: &str = row.try_get("status").map_err(|e| invalid_row("build_job", e))?;
    Ok(BuildJob {
        id: row.try_get("id").map_err(|e| invalid_row("build_job", e))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| invalid_row("build_job", e))?,
        program_id: row
            .try_get("program_id")
            .map_err(|e| invalid_row("build_job", e))?,
        status: status.parse().map_err(|e| invalid_row("build_job", e))?,
        current_phase: row
            .try_get("current_phase")
            .map_err(|e| invalid_row("build_job", e))?,
        current_item: row
            .try_get("current_item")
            .map_err(|e| invalid_row("build_job", e))?,
        total_modules: row
            .try_get("total_modules")
            .map_err(|e| invalid_row("build_job", e))?,
        completed_modules: row
            .try_get("completed_modules")
            .map_err(|e| invalid_row("build_job", e))?,
        total_lessons: row
            .try_get("total_lessons")
            .map_err(|e| invalid_row("build_job", e))?,
        completed_lessons: row
            .try_get("completed_lessons")
            .map_err(|e| invalid_row("build_job", e))?,
        retry_count: row
            .try_get("retry_count")
            .map_err(|e| invalid_row("build_job", e))?,
        max_retries: row
            .try_get("max_retries")
            .map_err(|e| invalid_row("build_job", e))?,
        last_completed_module_index: row
            .try_get("last_completed_module_index")
            .map_err(|e| invalid_row("build_job", e))?,
        last_completed_lesson_index: row
            .try_get("last_completed_lesson_index")
            .map_err(|e| invalid_row("build_job", e))?,
        last_completed_step_key: row
            .try_get("last_completed_step_key")
            .map_err(|e| invalid_row("build_job", e))?,
        checkpoint_data: row
            .try_get("checkpoint_data")
            .map_err(|e| invalid_row("build_job", e))?,
        started_at: row
            .try_get("started_at")
            .map_err(|e| invalid_row("build_job", e))?,
        last_heartbeat_at: row
            .try_get("last_heartbeat_at")
            .map_err(|e| invalid_row("build_job", e))?,
        finished_at: row
            .try_get("finished_at")
            .map_err(|e| invalid_row("build_job", e))?,
        plan: row.try_get("plan").map_err(|e| invalid_row("build_job", e))?,
        input_profile: row
            .try_get("input_profile")
            .map_err(|e| invalid_row("build_job", e))?,
        last_event_index: row
            .try_get("last_event_index")
            .map_err(|e| invalid_row("build_job", e))?,
        error: row
            .try_get("error")
            .map_err(|e| invalid_row("build_job", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| invalid_row("build_job", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| invalid_row("build_job", e))?,
    })
}

fn program_from_row(row: &Row) -> StoreResult<ProgramRow> {
    let status: &str = row.try_get("status").map_err(|e| invalid_row("program", e))?;
    Ok(ProgramRow {
        id: row.try_get("id").map_err(|e| invalid_row("program", e))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| invalid_row("program", e))?,
        topic: row.try_get("topic").map_err(|e| invalid_row("program", e))?,
        status: status.parse().map_err(|e| invalid_row("program", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| invalid_row("program", e))?,
    })
}

fn module_from_row(row: &Row) -> StoreResult<ModuleRow> {
    let status: &str = row
        .try_get("build_status")
        .map_err(|e| invalid_row("module", e))?;
    Ok(ModuleRow {
        id: row.try_get("id").map_err(|e| invalid_row("module", e))?,
        program_id: row
            .try_get("program_id")
            .map_err(|e| invalid_row("module", e))?,
        index: row
            .try_get("module_index")
            .map_err(|e| invalid_row("module", e))?,
        title: row.try_get("title").map_err(|e| invalid_row("module", e))?,
        outcomes: row
            .try_get("outcomes")
            .map_err(|e| invalid_row("module", e))?,
        build_status: status.parse().map_err(|e| invalid_row("module", e))?,
        build_error: row
            .try_get("build_error")
            .map_err(|e| invalid_row("module", e))?,
    })
}

fn lesson_from_row(row: &Row) -> StoreResult<LessonRow> {
    let status: &str = row
        .try_get("build_status")
        .map_err(|e| invalid_row("lesson", e))?;
    Ok(LessonRow {
        id: row.try_get("id").map_err(|e| invalid_row("lesson", e))?,
        module_id: row
            .try_get("module_id")
            .map_err(|e| invalid_row("lesson", e))?,
        index: row
            .try_get("lesson_index")
            .map_err(|e| invalid_row("lesson", e))?,
        title: row.try_get("title").map_err(|e| invalid_row("lesson", e))?,
        objectives: row
            .try_get("objectives")
            .map_err(|e| invalid_row("lesson", e))?,
        estimated_minutes: row
            .try_get("estimated_minutes")
            .map_err(|e| invalid_row("lesson", e))?,
        build_status: status.parse().map_err(|e| invalid_row("lesson", e))?,
        build_error: row
            .try_get("build_error")
            .map_err(|e| invalid_row("lesson", e))?,
    })
}

fn event_from_row(row: &Row) -> StoreResult<BuildEvent> {
    let status: &str = row
        .try_get("status")
        .map_err(|e| invalid_row("build_event", e))?;
    let level: &str = row
        .try_get("level")
        .map_err(|e| invalid_row("build_event", e))?;
    Ok(BuildEvent {
        job_id: row
            .try_get("job_id")
            .map_err(|e| invalid_row("build_event", e))?,
        index: row
            .try_get("event_index")
            .map_err(|e| invalid_row("build_event", e))?,
        event_type: row
            .try_get("event_type")
            .map_err(|e| invalid_row("build_event", e))?,
        step: row
            .try_get("step")
            .map_err(|e| invalid_row("build_event", e))?,
        status: status.parse().map_err(|e| invalid_row("build_event", e))?,
        level: level.parse().map_err(|e| invalid_row("build_event", e))?,
        message: row
            .try_get("message")
            .map_err(|e| invalid_row("build_event", e))?,
        payload: row
            .try_get("payload")
            .map_err(|e| invalid_row("build_event", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| invalid_row("build_event", e))?,
    })
}

// ============================================================================
// STORE
// ============================================================================

/// PostgreSQL-backed [`BuildStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PgConfig) -> StoreResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA).await.map_err(query_err)
    }

    async fn conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    async fn job_row(
        &self,
        conn: &deadpool_postgres::Object,
        job_id: EntityId,
    ) -> StoreResult<Row> {
        conn.query_opt("SELECT * FROM build_jobs WHERE id = $1", &[&job_id])
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound {
                entity: "build_job",
                id: job_id,
            })
    }
}

#[async_trait]
impl BuildStore for PgStore {
    async fn create_build(
        &self,
        user_id: EntityId,
        profile: &StudentProfile,
        max_retries: i32,
    ) -> StoreResult<(EntityId, EntityId)> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        let program_id = new_entity_id();
        tx.execute(
            "INSERT INTO programs (id, user_id, topic) VALUES ($1, $2, $3)",
            &[&program_id, &user_id, &profile.topic],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "program",
            reason: e.to_string(),
        })?;

        let job_id = new_entity_id();
        let profile_json = serde_json::to_value(profile).map_err(|e| StoreError::InsertFailed {
            entity: "build_job",
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO build_jobs (id, user_id, program_id, max_retries, input_profile) \
             VALUES ($1, $2, $3, $4, $5)",
            &[&job_id, &user_id, &program_id, &max_retries, &profile_json],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "build_job",
            reason: e.to_string(),
        })?;

        tx.commit().await.map_err(tx_err)?;
        Ok((job_id, program_id))
    }

    async fn job_get(&self, job_id: EntityId) -> StoreResult<BuildJob> {
        let conn = self.conn().await?;
        let row = self.job_row(&conn, job_id).await?;
        job_from_row(&row)
    }

    async fn job_update(&self, job_id: EntityId, patch: &JobPatch) -> StoreResult<()> {
        let conn = self.conn().await?;

        let status = patch.status.map(|s| s.as_db_str());
        let phase = patch.current_phase.map(|p| p.as_str());

        let mut sets = vec![
            "last_heartbeat_at = NOW()".to_string(),
            "updated_at = NOW()".to_string(),
        ];
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&job_id];

        if let Some(ref s) = status {
            params.push(s);
            sets.push(format!("status = ${}", params.len()));
        }
        if let Some(ref p) = phase {
            params.push(p);
            sets.push(format!("current_phase = ${}", params.len()));
        }
        if let Some(ref item) = patch.current_item {
            params.push(item);
            sets.push(format!("current_item = ${}", params.len()));
        }
        if let Some(ref v) = patch.total_modules {
            params.push(v);
            sets.push(format!("total_modules = ${}", params.len()));
        }
        if let Some(ref v) = patch.completed_modules {
            params.push(v);
            sets.push(format!("completed_modules = ${}", params.len()));
        }
        if let Some(ref v) = patch.total_lessons {
            params.push(v);
            sets.push(format!("total_lessons = ${}", params.len()));
        }
        if let Some(ref v) = patch.completed_lessons {
            params.push(v);
            sets.push(format!("completed_lessons = ${}", params.len()));
        }
        if let Some(ref plan) = patch.plan {
            params.push(plan);
            sets.push(format!("plan = ${}", params.len()));
        }
        if let Some(ref error) = patch.error {
            params.push(error);
            sets.push(format!("error = ${}", params.len()));
        }
        if let Some(ref started_at) = patch.started_at {
            params.push(started_at);
            sets.push(format!("started_at = ${}", params.len()));
        }
        if let Some(ref finished_at) = patch.finished_at {
            params.push(finished_at);
            sets.push(format!("finished_at = ${}", params.len()));
        }

        let sql = format!("UPDATE build_jobs SET {} WHERE id = $1", sets.join(", "));
        let updated = conn
            .execute(sql.as_str(), &params)
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "build_job",
                id: job_id,
            });
        }
        Ok(())
    }

    async fn try_claim(
        &self,
        job_id: EntityId,
        steal_older_than: Option<Timestamp>,
    ) -> StoreResult<ClaimOutcome> {
        let conn = self.conn().await?;

        let claimed = conn
            .execute(
                "UPDATE build_jobs SET \
                     status = 'RUNNING', \
                     started_at = COALESCE(started_at, NOW()), \
                     last_heartbeat_at = NOW(), \
                     error = NULL, \
                     updated_at = NOW() \
                 WHERE id = $1 AND ( \
                     status IN ('QUEUED', 'FAILED') \
                     OR (status = 'RUNNING' \
                         AND $2::timestamptz IS NOT NULL \
                         AND COALESCE(last_heartbeat_at, updated_at) < $2))",
                &[&job_id, &steal_older_than],
            )
            .await
            .map_err(query_err)?;
        if claimed > 0 {
            return Ok(ClaimOutcome::Claimed);
        }

        let row = self.job_row(&conn, job_id).await?;
        let status: &str = row.try_get("status").map_err(|e| invalid_row("build_job", e))?;
        let status: JobStatus = status.parse().map_err(|e| invalid_row("build_job", e))?;
        if status.is_terminal() {
            Ok(ClaimOutcome::AlreadyFinished)
        } else {
            Ok(ClaimOutcome::AlreadyRunning)
        }
    }

    async fn fail_if_heartbeat_older(
        &self,
        job_id: EntityId,
        cutoff: Timestamp,
        error: &str,
    ) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE build_jobs SET \
                     status = 'FAILED', \
                     current_phase = 'failed', \
                     error = $2, \
                     finished_at = NOW(), \
                     last_heartbeat_at = NOW(), \
                     updated_at = NOW() \
                 WHERE id = $1 AND status = 'RUNNING' \
                   AND COALESCE(last_heartbeat_at, updated_at) < $3",
                &[&job_id, &error, &cutoff],
            )
            .await
            .map_err(query_err)?;
        Ok(updated > 0)
    }

    async fn reset_for_retry(&self, job_id: EntityId) -> StoreResult<RetryReset> {
        let conn = self.conn().await?;

        // Checkpoint columns are deliberately untouched so the retry
        // resumes forward.
        let row = conn
            .query_opt(
                "UPDATE build_jobs SET \
                     status = 'QUEUED', \
                     current_phase = 'queued', \
                     current_item = NULL, \
                     error = NULL, \
                     started_at = NULL, \
                     finished_at = NULL, \
                     last_heartbeat_at = NULL, \
                     retry_count = retry_count + 1, \
                     updated_at = NOW() \
                 WHERE id = $1 AND status = 'FAILED' AND retry_count < max_retries \
                 RETURNING retry_count",
                &[&job_id],
            )
            .await
            .map_err(query_err)?;

        if let Some(row) = row {
            let retry_count: i32 = row
                .try_get("retry_count")
                .map_err(|e| invalid_row("build_job", e))?;
            return Ok(RetryReset::Ok { retry_count });
        }

        let row = self.job_row(&conn, job_id).await?;
        let status: &str = row.try_get("status").map_err(|e| invalid_row("build_job", e))?;
        if status != "FAILED" {
            Ok(RetryReset::InvalidStatus)
        } else {
            Ok(RetryReset::MaxRetriesReached)
        }
    }

    async fn cancel_job(&self, job_id: EntityId) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE build_jobs SET \
                     status = 'CANCELED', \
                     finished_at = NOW(), \
                     updated_at = NOW() \
                 WHERE id = $1 AND status IN ('QUEUED', 'RUNNING')",
                &[&job_id],
            )
            .await
            .map_err(query_err)?;
        if updated > 0 {
            return Ok(true);
        }
        // Distinguish "already terminal" from "no such job".
        self.job_row(&conn, job_id).await?;
        Ok(false)
    }

    async fn get_checkpoint(&self, job_id: EntityId) -> StoreResult<Checkpoint> {
        let conn = self.conn().await?;
        let row = self.job_row(&conn, job_id).await?;
        Ok(job_from_row(&row)?.checkpoint())
    }

    async fn update_checkpoint(
        &self,
        job_id: EntityId,
        patch: &CheckpointPatch,
    ) -> StoreResult<()> {
        let conn = self.conn().await?;

        let mut sets = vec![
            "last_heartbeat_at = NOW()".to_string(),
            "updated_at = NOW()".to_string(),
        ];
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&job_id];

        if let Some(ref module_index) = patch.module_index {
            params.push(module_index);
            sets.push(format!("last_completed_module_index = ${}", params.len()));
        }
        if let Some(ref lesson_index) = patch.lesson_index {
            params.push(lesson_index);
            sets.push(format!("last_completed_lesson_index = ${}", params.len()));
        }
        if let Some(ref step_key) = patch.step_key {
            params.push(step_key);
            sets.push(format!("last_completed_step_key = ${}", params.len()));
        }
        if let Some(ref data) = patch.data {
            params.push(data);
            sets.push(format!("checkpoint_data = ${}", params.len()));
        }

        let sql = format!("UPDATE build_jobs SET {} WHERE id = $1", sets.join(", "));
        let updated = conn
            .execute(sql.as_str(), &params)
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "build_job",
                id: job_id,
            });
        }
        Ok(())
    }

    async fn append_event(&self, job_id: EntityId, input: BuildEventInput) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        // The cursor bump locks the job row, serializing concurrent appends
        // so indexes stay gapless.
        let row = tx
            .query_opt(
                "UPDATE build_jobs SET \
                     last_event_index = last_event_index + 1, \
                     last_heartbeat_at = NOW(), \
                     updated_at = NOW() \
                 WHERE id = $1 \
                 RETURNING last_event_index",
                &[&job_id],
            )
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound {
                entity: "build_job",
                id: job_id,
            })?;
        let index: i64 = row
            .try_get("last_event_index")
            .map_err(|e| invalid_row("build_job", e))?;

        tx.execute(
            "INSERT INTO build_events \
                 (job_id, event_index, event_type, step, status, level, message, payload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &job_id,
                &index,
                &input.event_type,
                &input.step,
                &input.status.as_db_str(),
                &input.level.as_db_str(),
                &input.message,
                &input.payload,
            ],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "build_event",
            reason: e.to_string(),
        })?;

        tx.commit().await.map_err(tx_err)?;
        Ok(index)
    }

    async fn events_since(
        &self,
        job_id: EntityId,
        after_index: i64,
    ) -> StoreResult<Vec<BuildEvent>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM build_events \
                 WHERE job_id = $1 AND event_index > $2 \
                 ORDER BY event_index",
                &[&job_id, &after_index],
            )
            .await
            .map_err(query_err)?;
        if rows.is_empty() {
            // Surface unknown ids as NotFound rather than an empty feed.
            self.job_row(&conn, job_id).await?;
        }
        rows.iter().map(event_from_row).collect()
    }

    async fn program_set_status(
        &self,
        program_id: EntityId,
        status: ProgramStatus,
    ) -> StoreResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE programs SET status = $2, updated_at = NOW() WHERE id = $1",
                &[&program_id, &status.as_db_str()],
            )
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "program",
                id: program_id,
            });
        }
        Ok(())
    }

    async fn persist_blueprint(
        &self,
        job_id: EntityId,
        blueprint: &ProgramBlueprint,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        let row = tx
            .query_opt("SELECT program_id FROM build_jobs WHERE id = $1", &[&job_id])
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound {
                entity: "build_job",
                id: job_id,
            })?;
        let program_id: EntityId = row
            .try_get("program_id")
            .map_err(|e| invalid_row("build_job", e))?;

        tx.execute("DELETE FROM modules WHERE program_id = $1", &[&program_id])
            .await
            .map_err(query_err)?;

        for module in &blueprint.modules {
            let id = new_entity_id();
            tx.execute(
                "INSERT INTO modules (id, program_id, module_index, title, outcomes) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[&id, &program_id, &module.index, &module.title, &module.outcomes],
            )
            .await
            .map_err(|e| StoreError::InsertFailed {
                entity: "module",
                reason: e.to_string(),
            })?;
        }

        let plan_json = serde_json::to_value(blueprint).map_err(|e| StoreError::UpdateFailed {
            entity: "build_job",
            id: job_id,
            reason: e.to_string(),
        })?;
        let total_modules = blueprint.modules.len() as i32;
        let total_lessons: i32 = blueprint.modules.iter().map(|m| m.lessons_count).sum();
        tx.execute(
            "UPDATE build_jobs SET \
                 plan = $2, \
                 total_modules = $3, \
                 completed_modules = 0, \
                 total_lessons = $4, \
                 completed_lessons = 0, \
                 last_heartbeat_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1",
            &[&job_id, &plan_json, &total_modules, &total_lessons],
        )
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(tx_err)
    }

    async fn module_by_index(
        &self,
        program_id: EntityId,
        index: i32,
    ) -> StoreResult<Option<ModuleRow>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM modules WHERE program_id = $1 AND module_index = $2",
                &[&program_id, &index],
            )
            .await
            .map_err(query_err)?;
        row.as_ref().map(module_from_row).transpose()
    }

    async fn module_set_status(
        &self,
        module_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE modules SET build_status = $2, build_error = $3 WHERE id = $1",
                &[&module_id, &status.as_db_str(), &error],
            )
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "module",
                id: module_id,
            });
        }
        Ok(())
    }

    async fn lessons_for_module(&self, module_id: EntityId) -> StoreResult<Vec<LessonRow>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM lessons WHERE module_id = $1 ORDER BY lesson_index",
                &[&module_id],
            )
            .await
            .map_err(query_err)?;
        rows.iter().map(lesson_from_row).collect()
    }

    async fn upsert_lesson(
        &self,
        module_id: EntityId,
        index: i32,
        plan: &LessonPlan,
    ) -> StoreResult<LessonRow> {
        let conn = self.conn().await?;
        let id = new_entity_id();
        // Conflicts keep the existing build_status so committed lessons
        // stay committed across retries.
        let row = conn
            .query_one(
                "INSERT INTO lessons \
                     (id, module_id, lesson_index, title, objectives, estimated_minutes) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (module_id, lesson_index) DO UPDATE SET \
                     title = EXCLUDED.title, \
                     objectives = EXCLUDED.objectives, \
                     estimated_minutes = EXCLUDED.estimated_minutes \
                 RETURNING *",
                &[
                    &id,
                    &module_id,
                    &index,
                    &plan.title,
                    &plan.objectives,
                    &plan.estimated_minutes,
                ],
            )
            .await
            .map_err(|e| StoreError::InsertFailed {
                entity: "lesson",
                reason: e.to_string(),
            })?;
        lesson_from_row(&row)
    }

    async fn lesson_set_status(
        &self,
        lesson_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE lessons SET build_status = $2, build_error = $3 WHERE id = $1",
                &[&lesson_id, &status.as_db_str(), &error],
            )
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "lesson",
                id: lesson_id,
            });
        }
        Ok(())
    }

    async fn commit_lesson_artifacts(
        &self,
        lesson_id: EntityId,
        artifacts: &LessonArtifacts,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        tx.execute(
            "DELETE FROM lesson_resources WHERE lesson_id = $1",
            &[&lesson_id],
        )
        .await
        .map_err(query_err)?;
        for (position, resource) in artifacts.resources.iter().enumerate() {
            let id = new_entity_id();
            let payload =
                serde_json::to_value(resource).map_err(|e| StoreError::InsertFailed {
                    entity: "lesson_resource",
                    reason: e.to_string(),
                })?;
            tx.execute(
                "INSERT INTO lesson_resources (id, lesson_id, position, payload) \
                 VALUES ($1, $2, $3, $4)",
                &[&id, &lesson_id, &(position as i32), &payload],
            )
            .await
            .map_err(|e| StoreError::InsertFailed {
                entity: "lesson_resource",
                reason: e.to_string(),
            })?;
        }

        let notes = serde_json::to_value(&artifacts.notes).map_err(|e| StoreError::InsertFailed {
            entity: "lesson_notes",
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO lesson_notes (lesson_id, payload) VALUES ($1, $2) \
             ON CONFLICT (lesson_id) DO UPDATE SET payload = EXCLUDED.payload",
            &[&lesson_id, &notes],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "lesson_notes",
            reason: e.to_string(),
        })?;

        let exercises =
            serde_json::to_value(&artifacts.exercises).map_err(|e| StoreError::InsertFailed {
                entity: "exercise_set",
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO exercise_sets (lesson_id, payload) VALUES ($1, $2) \
             ON CONFLICT (lesson_id) DO UPDATE SET payload = EXCLUDED.payload",
            &[&lesson_id, &exercises],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "exercise_set",
            reason: e.to_string(),
        })?;

        let updated = tx
            .execute(
                "UPDATE lessons SET build_status = 'COMPLETED', build_error = NULL \
                 WHERE id = $1",
                &[&lesson_id],
            )
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "lesson",
                id: lesson_id,
            });
        }

        tx.commit().await.map_err(tx_err)
    }

    async fn assessment_exists(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
    ) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT EXISTS( \
                     SELECT 1 FROM assessments \
                     WHERE program_id = $1 \
                       AND module_id IS NOT DISTINCT FROM $2 \
                       AND kind = $3) AS present",
                &[&program_id, &module_id, &kind.as_db_str()],
            )
            .await
            .map_err(query_err)?;
        row.try_get("present").map_err(|e| invalid_row("assessment", e))
    }

    async fn create_assessment(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
        assessment: &Assessment,
    ) -> StoreResult<EntityId> {
        let conn = self.conn().await?;
        let id = new_entity_id();
        let payload = serde_json::to_value(assessment).map_err(|e| StoreError::InsertFailed {
            entity: "assessment",
            reason: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO assessments (id, program_id, module_id, kind, payload) \
             VALUES ($1, $2, $3, $4, $5)",
            &[&id, &program_id, &module_id, &kind.as_db_str(), &payload],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "assessment",
            reason: e.to_string(),
        })?;
        Ok(id)
    }

    async fn assessments_for_schedule(
        &self,
        program_id: EntityId,
    ) -> StoreResult<(Vec<EntityId>, Option<EntityId>)> {
        let conn = self.conn().await?;

        let quiz_rows = conn
            .query(
                "SELECT a.id FROM assessments a \
                 JOIN modules m ON m.id = a.module_id \
                 WHERE a.program_id = $1 AND a.kind = 'QUIZ' \
                 ORDER BY m.module_index",
                &[&program_id],
            )
            .await
            .map_err(query_err)?;
        let quizzes = quiz_rows
            .iter()
            .map(|row| row.try_get("id").map_err(|e| invalid_row("assessment", e)))
            .collect::<StoreResult<Vec<EntityId>>>()?;

        let exam_row = conn
            .query_opt(
                "SELECT id FROM assessments \
                 WHERE program_id = $1 AND module_id IS NULL AND kind = 'EXAM'",
                &[&program_id],
            )
            .await
            .map_err(query_err)?;
        let exam = exam_row
            .map(|row| row.try_get("id").map_err(|e| invalid_row("assessment", e)))
            .transpose()?;

        Ok((quizzes, exam))
    }

    async fn replace_schedule(
        &self,
        program_id: EntityId,
        start_date: Timestamp,
        items: &[ScheduleItemInput],
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        tx.execute(
            "INSERT INTO schedules (program_id, start_date) VALUES ($1, $2) \
             ON CONFLICT (program_id) DO UPDATE SET start_date = EXCLUDED.start_date",
            &[&program_id, &start_date],
        )
        .await
        .map_err(|e| StoreError::InsertFailed {
            entity: "schedule",
            reason: e.to_string(),
        })?;

        tx.execute(
            "DELETE FROM schedule_items WHERE program_id = $1",
            &[&program_id],
        )
        .await
        .map_err(query_err)?;

        for (position, item) in items.iter().enumerate() {
            tx.execute(
                "INSERT INTO schedule_items \
                     (program_id, position, day_offset, item_type, ref_id, estimated_minutes) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &program_id,
                    &(position as i32),
                    &item.day_offset,
                    &item.item_type.as_db_str(),
                    &item.ref_id,
                    &item.estimated_minutes,
                ],
            )
            .await
            .map_err(|e| StoreError::InsertFailed {
                entity: "schedule_item",
                reason: e.to_string(),
            })?;
        }

        tx.commit().await.map_err(tx_err)
    }

    async fn count_modules(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS n FROM modules \
                 WHERE program_id = $1 AND build_status = $2",
                &[&program_id, &status.as_db_str()],
            )
            .await
            .map_err(query_err)?;
        row.try_get("n").map_err(|e| invalid_row("module", e))
    }

    async fn count_lessons(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS n FROM lessons l \
                 JOIN modules m ON m.id = l.module_id \
                 WHERE m.program_id = $1 AND l.build_status = $2",
                &[&program_id, &status.as_db_str()],
            )
            .await
            .map_err(query_err)?;
        row.try_get("n").map_err(|e| invalid_row("lesson", e))
    }

    async fn lessons_for_program(
        &self,
        program_id: EntityId,
    ) -> StoreResult<Vec<(i32, LessonRow)>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT l.*, m.module_index AS program_module_index FROM lessons l \
                 JOIN modules m ON m.id = l.module_id \
                 WHERE m.program_id = $1 \
                 ORDER BY m.module_index, l.lesson_index",
                &[&program_id],
            )
            .await
            .map_err(query_err)?;
        rows.iter()
            .map(|row| {
                let module_index: i32 = row
                    .try_get("program_module_index")
                    .map_err(|e| invalid_row("lesson", e))?;
                Ok((module_index, lesson_from_row(row)?))
            })
            .collect()
    }

    async fn build_view(&self, job_id: EntityId) -> StoreResult<BuildView> {
        let conn = self.conn().await?;
        let job = job_from_row(&self.job_row(&conn, job_id).await?)?;

        let program_row = conn
            .query_opt("SELECT * FROM programs WHERE id = $1", &[&job.program_id])
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound {
                entity: "program",
                id: job.program_id,
            })?;
        let program = program_from_row(&program_row)?;

        let module_rows = conn
            .query(
                "SELECT * FROM modules WHERE program_id = $1 ORDER BY module_index",
                &[&program.id],
            )
            .await
            .map_err(query_err)?;
        let lesson_rows = conn
            .query(
                "SELECT l.* FROM lessons l \
                 JOIN modules m ON m.id = l.module_id \
                 WHERE m.program_id = $1 \
                 ORDER BY m.module_index, l.lesson_index",
                &[&program.id],
            )
            .await
            .map_err(query_err)?;

        let lessons = lesson_rows
            .iter()
            .map(lesson_from_row)
            .collect::<StoreResult<Vec<LessonRow>>>()?;

        let modules = module_rows
            .iter()
            .map(|row| {
                let module = module_from_row(row)?;
                let lessons = lessons
                    .iter()
                    .filter(|l| l.module_id == module.id)
                    .cloned()
                    .collect();
                Ok(ModuleNode { module, lessons })
            })
            .collect::<StoreResult<Vec<ModuleNode>>>()?;

        Ok(BuildView {
            job,
            program,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PgConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "syllab");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_schema_covers_all_tables() {
        for table in [
            "programs",
            "build_jobs",
            "build_events",
            "modules",
            "lessons",
            "lesson_resources",
            "lesson_notes",
            "exercise_sets",
            "assessments",
            "schedules",
            "schedule_items",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
