use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
    pub brand_json: Option<String>,
    pub audio_ref: Option<String>,
    pub plan_json: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompositionRecord {
    pub id: i64,
    pub job_id: i64,
    pub output_ref: Option<String>,
    pub timeline_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EditRecord {
    pub id: i64,
    pub composition_id: i64,
    pub instruction: String,
    pub plan_json: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_ts(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(column, "TEXT".to_string(), rusqlite::types::Type::Text)
        })
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                prompt TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                aspect_ratio TEXT NOT NULL,
                brand_json TEXT,
                audio_ref TEXT,
                plan_json TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS compositions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL,
                output_ref TEXT,
                timeline_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (job_id) REFERENCES jobs(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS edits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                composition_id INTEGER NOT NULL,
                instruction TEXT NOT NULL,
                plan_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (composition_id) REFERENCES compositions(id)
            )",
            [],
        )?;

        Ok(())
    }

    pub fn create_job(
        &self,
        kind: &str,
        prompt: &str,
        duration_secs: u32,
        aspect_ratio: &str,
        brand_json: Option<&str>,
        audio_ref: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (kind, status, prompt, duration_secs, aspect_ratio, brand_json, audio_ref, created_at, updated_at)
             VALUES (?1, 'created', ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![kind, prompt, duration_secs, aspect_ratio, brand_json, audio_ref, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn job_from_row(row: &Row) -> rusqlite::Result<JobRecord> {
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;
        Ok(JobRecord {
            id: row.get(0)?,
            kind: row.get(1)?,
            status: row.get(2)?,
            prompt: row.get(3)?,
            duration_secs: row.get(4)?,
            aspect_ratio: row.get(5)?,
            brand_json: row.get(6)?,
            audio_ref: row.get(7)?,
            plan_json: row.get(8)?,
            error: row.get(9)?,
            created_at: parse_ts(&created_at, 10)?,
            updated_at: parse_ts(&updated_at, 11)?,
        })
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, status, prompt, duration_secs, aspect_ratio, brand_json, audio_ref, plan_json, error, created_at, updated_at
             FROM jobs WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::job_from_row)?;
        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn set_job_status(&self, id: i64, status: &str, error: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = ?1, error = COALESCE(?2, error), updated_at = ?3 WHERE id = ?4",
            params![status, error, now, id],
        )?;
        Ok(())
    }

    pub fn set_job_plan(&self, id: i64, plan_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET plan_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![plan_json, now, id],
        )?;
        Ok(())
    }

    pub fn create_composition(
        &self,
        job_id: i64,
        output_ref: Option<&str>,
        timeline_json: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO compositions (job_id, output_ref, timeline_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![job_id, output_ref, timeline_json, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn composition_from_row(row: &Row) -> rusqlite::Result<CompositionRecord> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;
        Ok(CompositionRecord {
            id: row.get(0)?,
            job_id: row.get(1)?,
            output_ref: row.get(2)?,
            timeline_json: row.get(3)?,
            created_at: parse_ts(&created_at, 4)?,
            updated_at: parse_ts(&updated_at, 5)?,
        })
    }

    pub fn get_composition(&self, id: i64) -> Result<Option<CompositionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, output_ref, timeline_json, created_at, updated_at
             FROM compositions WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::composition_from_row)?;
        match rows.next() {
            Some(Ok(composition)) => Ok(Some(composition)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn update_composition(
        &self,
        id: i64,
        output_ref: Option<&str>,
        timeline_json: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE compositions SET output_ref = COALESCE(?1, output_ref), timeline_json = ?2, updated_at = ?3 WHERE id = ?4",
            params![output_ref, timeline_json, now, id],
        )?;
        Ok(())
    }

    pub fn set_composition_output(&self, id: i64, output_ref: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE compositions SET output_ref = ?1, updated_at = ?2 WHERE id = ?3",
            params![output_ref, now, id],
        )?;
        Ok(())
    }

    pub fn create_edit(
        &self,
        composition_id: i64,
        instruction: &str,
        plan_json: &str,
        status: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO edits (composition_id, instruction, plan_json, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![composition_id, instruction, plan_json, status, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn edit_from_row(row: &Row) -> rusqlite::Result<EditRecord> {
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;
        Ok(EditRecord {
            id: row.get(0)?,
            composition_id: row.get(1)?,
            instruction: row.get(2)?,
            plan_json: row.get(3)?,
            status: row.get(4)?,
            created_at: parse_ts(&created_at, 5)?,
            updated_at: parse_ts(&updated_at, 6)?,
        })
    }

    pub fn get_edit(&self, id: i64) -> Result<Option<EditRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, composition_id, instruction, plan_json, status, created_at, updated_at
             FROM edits WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::edit_from_row)?;
        match rows.next() {
            Some(Ok(edit)) => Ok(Some(edit)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn set_edit_status(&self, id: i64, status: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE edits SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now, id],
        )?;
        Ok(())
    }
}
