use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection, Transaction};
use tracing::{info, instrument};

use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{
    DayPlan, DbClass, DbSchedule, DbScheduleDay, DbSchedulePeriod, DbSection, DbSubject, DbTeacher,
    Period, RecordId, ScheduleKey, SchoolClass, Section, Subject, SubjectSummary, Teacher,
    TeacherSummary, WeeklySchedule,
};

const SCHEDULE_COLUMNS: &str = "s.id, s.class_id, s.section_id, s.school_id, s.created_at, s.updated_at";

#[instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn connect_pool(config: &AppConfig) -> Result<Pool<Sqlite>, AppError> {
    info!("Connecting to SQLite database");
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    Ok(pool)
}

/// Storage port for weekly schedules.
///
/// Lookups that can match several documents return them in insertion order, so
/// "first match" is always the oldest stored schedule.
#[rocket::async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn find_schedule_by_id(&self, id: &RecordId) -> Result<Option<WeeklySchedule>, AppError>;

    async fn find_schedule_by_key(
        &self,
        key: &ScheduleKey,
    ) -> Result<Option<WeeklySchedule>, AppError>;

    /// `school` narrows the lookup to one tenant when given.
    async fn find_schedule_by_class(
        &self,
        sclass: &RecordId,
        section: &RecordId,
        school: Option<&RecordId>,
    ) -> Result<Option<WeeklySchedule>, AppError>;

    async fn find_schedules_by_teacher(
        &self,
        teacher: &RecordId,
        school: Option<&RecordId>,
    ) -> Result<Vec<WeeklySchedule>, AppError>;

    async fn find_schedules_by_school(
        &self,
        school: &RecordId,
    ) -> Result<Vec<WeeklySchedule>, AppError>;

    async fn insert_schedule(
        &self,
        key: &ScheduleKey,
        days: &[DayPlan],
    ) -> Result<WeeklySchedule, AppError>;

    async fn replace_schedule_days(
        &self,
        id: &RecordId,
        days: &[DayPlan],
    ) -> Result<WeeklySchedule, AppError>;

    async fn delete_schedule(&self, id: &RecordId) -> Result<Option<WeeklySchedule>, AppError>;
}

/// Read-only access to the reference data a schedule points at.
#[rocket::async_trait]
pub trait ReferenceDirectory: Send + Sync {
    async fn subject_summaries(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SubjectSummary>, AppError>;

    async fn teacher_summaries(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, TeacherSummary>, AppError>;

    async fn class_names(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, String>, AppError>;
}

#[rocket::async_trait]
impl ScheduleStore for Pool<Sqlite> {
    #[instrument(skip(self))]
    async fn find_schedule_by_id(&self, id: &RecordId) -> Result<Option<WeeklySchedule>, AppError> {
        info!("Fetching schedule by ID");
        let mut conn = self.acquire().await?;
        fetch_schedule_by_id(&mut conn, id).await
    }

    #[instrument(skip(self))]
    async fn find_schedule_by_key(
        &self,
        key: &ScheduleKey,
    ) -> Result<Option<WeeklySchedule>, AppError> {
        info!("Fetching schedule by key");
        let mut conn = self.acquire().await?;
        let row = sqlx::query_as::<_, DbSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s
             WHERE s.class_id = ? AND s.section_id = ? AND s.school_id = ?
             ORDER BY s.rowid
             LIMIT 1"
        ))
        .bind(&key.sclass)
        .bind(&key.section)
        .bind(&key.school)
        .fetch_optional(&mut *conn)
        .await?;

        first_hydrated(&mut conn, row).await
    }

    #[instrument(skip(self))]
    async fn find_schedule_by_class(
        &self,
        sclass: &RecordId,
        section: &RecordId,
        school: Option<&RecordId>,
    ) -> Result<Option<WeeklySchedule>, AppError> {
        info!("Fetching schedule by class and section");
        let mut conn = self.acquire().await?;
        let row = sqlx::query_as::<_, DbSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s
             WHERE s.class_id = ? AND s.section_id = ? AND (? IS NULL OR s.school_id = ?)
             ORDER BY s.rowid
             LIMIT 1"
        ))
        .bind(sclass)
        .bind(section)
        .bind(school)
        .bind(school)
        .fetch_optional(&mut *conn)
        .await?;

        first_hydrated(&mut conn, row).await
    }

    #[instrument(skip(self))]
    async fn find_schedules_by_teacher(
        &self,
        teacher: &RecordId,
        school: Option<&RecordId>,
    ) -> Result<Vec<WeeklySchedule>, AppError> {
        info!("Fetching schedules containing teacher");
        let mut conn = self.acquire().await?;
        let rows = sqlx::query_as::<_, DbSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s
             WHERE EXISTS (
                 SELECT 1 FROM schedule_days d
                 JOIN schedule_periods p ON p.day_id = d.id
                 WHERE d.schedule_id = s.id AND p.teacher_id = ?
             )
             AND (? IS NULL OR s.school_id = ?)
             ORDER BY s.rowid"
        ))
        .bind(teacher)
        .bind(school)
        .bind(school)
        .fetch_all(&mut *conn)
        .await?;

        hydrate_schedules(&mut conn, rows).await
    }

    #[instrument(skip(self))]
    async fn find_schedules_by_school(
        &self,
        school: &RecordId,
    ) -> Result<Vec<WeeklySchedule>, AppError> {
        info!("Fetching schedules for school");
        let mut conn = self.acquire().await?;
        let rows = sqlx::query_as::<_, DbSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s
             WHERE s.school_id = ?
             ORDER BY s.rowid"
        ))
        .bind(school)
        .fetch_all(&mut *conn)
        .await?;

        hydrate_schedules(&mut conn, rows).await
    }

    #[instrument(skip(self, days), fields(day_count = days.len()))]
    async fn insert_schedule(
        &self,
        key: &ScheduleKey,
        days: &[DayPlan],
    ) -> Result<WeeklySchedule, AppError> {
        info!("Creating schedule");
        let id = RecordId::generate();
        let now = Utc::now();

        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO class_schedules (id, class_id, section_id, school_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&key.sclass)
        .bind(&key.section)
        .bind(&key.school)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        write_days(&mut tx, &id, days).await?;

        tx.commit().await?;

        Ok(WeeklySchedule {
            id,
            sclass: key.sclass.clone(),
            section: key.section.clone(),
            school: key.school.clone(),
            days: days.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self, days), fields(day_count = days.len()))]
    async fn replace_schedule_days(
        &self,
        id: &RecordId,
        days: &[DayPlan],
    ) -> Result<WeeklySchedule, AppError> {
        info!("Replacing schedule days");
        let mut tx = self.begin().await?;

        let updated = sqlx::query("UPDATE class_schedules SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Schedule {} not found", id)));
        }

        clear_days(&mut tx, id).await?;
        write_days(&mut tx, id, days).await?;

        let replaced = fetch_schedule_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))?;

        tx.commit().await?;

        Ok(replaced)
    }

    #[instrument(skip(self))]
    async fn delete_schedule(&self, id: &RecordId) -> Result<Option<WeeklySchedule>, AppError> {
        info!("Deleting schedule");
        let mut tx = self.begin().await?;

        let Some(existing) = fetch_schedule_by_id(&mut tx, id).await? else {
            return Ok(None);
        };

        clear_days(&mut tx, id).await?;
        let deleted = sqlx::query("DELETE FROM class_schedules WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Another delete got there first.
        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;

        Ok(Some(existing))
    }
}

async fn clear_days(
    tx: &mut Transaction<'_, Sqlite>,
    schedule_id: &RecordId,
) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM schedule_periods
         WHERE day_id IN (SELECT id FROM schedule_days WHERE schedule_id = ?)",
    )
    .bind(schedule_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM schedule_days WHERE schedule_id = ?")
        .bind(schedule_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn write_days(
    tx: &mut Transaction<'_, Sqlite>,
    schedule_id: &RecordId,
    days: &[DayPlan],
) -> Result<(), AppError> {
    for (day_position, plan) in days.iter().enumerate() {
        let day_id = sqlx::query(
            "INSERT INTO schedule_days (schedule_id, position, day) VALUES (?, ?, ?)",
        )
        .bind(schedule_id)
        .bind(day_position as i64)
        .bind(&plan.day)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (period_position, period) in plan.periods.iter().enumerate() {
            sqlx::query(
                "INSERT INTO schedule_periods
                 (day_id, position, subject_id, teacher_id, start_time, end_time)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(day_id)
            .bind(period_position as i64)
            .bind(&period.subject)
            .bind(&period.teacher)
            .bind(&period.start_time)
            .bind(&period.end_time)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

async fn fetch_schedule_by_id(
    conn: &mut SqliteConnection,
    id: &RecordId,
) -> Result<Option<WeeklySchedule>, AppError> {
    let row = sqlx::query_as::<_, DbSchedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s WHERE s.id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    first_hydrated(conn, row).await
}

async fn first_hydrated(
    conn: &mut SqliteConnection,
    row: Option<DbSchedule>,
) -> Result<Option<WeeklySchedule>, AppError> {
    match row {
        Some(row) => Ok(hydrate_schedules(conn, vec![row]).await?.into_iter().next()),
        None => Ok(None),
    }
}

/// Loads the day plans and periods of `rows`, keeping stored order. Runs on
/// one connection so callers inside a transaction see their own writes.
async fn hydrate_schedules(
    conn: &mut SqliteConnection,
    rows: Vec<DbSchedule>,
) -> Result<Vec<WeeklySchedule>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().filter_map(|row| row.id.clone()).collect();

    let mut days_query =
        QueryBuilder::<Sqlite>::new("SELECT id, schedule_id, day FROM schedule_days WHERE schedule_id IN (");
    let mut separated = days_query.separated(", ");
    for id in &ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY schedule_id, position");
    let day_rows: Vec<DbScheduleDay> = days_query
        .build_query_as()
        .fetch_all(&mut *conn)
        .await?;

    let mut periods_query = QueryBuilder::<Sqlite>::new(
        "SELECT p.day_id, p.subject_id, p.teacher_id, p.start_time, p.end_time
         FROM schedule_periods p
         JOIN schedule_days d ON d.id = p.day_id
         WHERE d.schedule_id IN (",
    );
    let mut separated = periods_query.separated(", ");
    for id in &ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY p.day_id, p.position");
    let period_rows: Vec<DbSchedulePeriod> = periods_query
        .build_query_as()
        .fetch_all(&mut *conn)
        .await?;

    let mut periods_by_day: HashMap<i64, Vec<Period>> = HashMap::new();
    for row in period_rows {
        periods_by_day
            .entry(row.day_id)
            .or_default()
            .push(Period::from(row));
    }

    let mut days_by_schedule: HashMap<String, Vec<DayPlan>> = HashMap::new();
    for row in day_rows {
        days_by_schedule
            .entry(row.schedule_id)
            .or_default()
            .push(DayPlan {
                day: row.day,
                periods: periods_by_day.remove(&row.id).unwrap_or_default(),
            });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let days = row
                .id
                .as_ref()
                .and_then(|id| days_by_schedule.remove(id))
                .unwrap_or_default();
            row.into_schedule(days)
        })
        .collect())
}

fn distinct_ids(ids: &[RecordId]) -> BTreeSet<&RecordId> {
    ids.iter().filter(|id| !id.is_blank()).collect()
}

#[rocket::async_trait]
impl ReferenceDirectory for Pool<Sqlite> {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn subject_summaries(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SubjectSummary>, AppError> {
        let ids = distinct_ids(ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT id, school_id, name, code FROM subjects WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<DbSubject> = query.build_query_as().fetch_all(self).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let subject = SubjectSummary::from(Subject::from(row));
                (subject.id.clone(), subject)
            })
            .collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn teacher_summaries(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, TeacherSummary>, AppError> {
        let ids = distinct_ids(ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, school_id, name, email FROM teachers WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<DbTeacher> = query.build_query_as().fetch_all(self).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let teacher = TeacherSummary::from(Teacher::from(row));
                (teacher.id.clone(), teacher)
            })
            .collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn class_names(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, String>, AppError> {
        let ids = distinct_ids(ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT id, school_id, name FROM classes WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<DbClass> = query.build_query_as().fetch_all(self).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let class = SchoolClass::from(row);
                (class.id, class.name)
            })
            .collect())
    }
}

#[instrument]
pub async fn create_class(
    pool: &Pool<Sqlite>,
    school: &RecordId,
    name: &str,
) -> Result<SchoolClass, AppError> {
    info!("Creating class");
    let id = RecordId::generate();

    sqlx::query("INSERT INTO classes (id, school_id, name) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(school)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(SchoolClass {
        id,
        school: school.clone(),
        name: name.to_string(),
    })
}

#[instrument]
pub async fn get_classes_for_school(
    pool: &Pool<Sqlite>,
    school: &RecordId,
) -> Result<Vec<SchoolClass>, AppError> {
    info!("Getting classes for school");
    let rows = sqlx::query_as::<_, DbClass>(
        "SELECT id, school_id, name FROM classes WHERE school_id = ? ORDER BY name",
    )
    .bind(school)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SchoolClass::from).collect())
}

#[instrument]
pub async fn create_section(
    pool: &Pool<Sqlite>,
    sclass: &RecordId,
    name: &str,
) -> Result<Section, AppError> {
    info!("Creating section");
    let id = RecordId::generate();

    sqlx::query("INSERT INTO sections (id, class_id, name) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(sclass)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(Section {
        id,
        sclass: sclass.clone(),
        name: name.to_string(),
    })
}

#[instrument]
pub async fn get_sections_for_class(
    pool: &Pool<Sqlite>,
    sclass: &RecordId,
) -> Result<Vec<Section>, AppError> {
    info!("Getting sections for class");
    let rows = sqlx::query_as::<_, DbSection>(
        "SELECT id, class_id, name FROM sections WHERE class_id = ? ORDER BY name",
    )
    .bind(sclass)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Section::from).collect())
}

#[instrument]
pub async fn create_subject(
    pool: &Pool<Sqlite>,
    school: &RecordId,
    name: &str,
    code: &str,
) -> Result<Subject, AppError> {
    info!("Creating subject");
    let id = RecordId::generate();

    sqlx::query("INSERT INTO subjects (id, school_id, name, code) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(school)
        .bind(name)
        .bind(code)
        .execute(pool)
        .await?;

    Ok(Subject {
        id,
        school: school.clone(),
        name: name.to_string(),
        code: code.to_string(),
    })
}

#[instrument]
pub async fn get_subjects_for_school(
    pool: &Pool<Sqlite>,
    school: &RecordId,
) -> Result<Vec<Subject>, AppError> {
    info!("Getting subjects for school");
    let rows = sqlx::query_as::<_, DbSubject>(
        "SELECT id, school_id, name, code FROM subjects WHERE school_id = ? ORDER BY name",
    )
    .bind(school)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Subject::from).collect())
}

#[instrument(skip(pool, email))]
pub async fn create_teacher(
    pool: &Pool<Sqlite>,
    school: &RecordId,
    name: &str,
    email: Option<&str>,
) -> Result<Teacher, AppError> {
    info!("Creating teacher");
    let id = RecordId::generate();

    sqlx::query("INSERT INTO teachers (id, school_id, name, email) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(school)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;

    Ok(Teacher {
        id,
        school: school.clone(),
        name: name.to_string(),
        email: email.map(String::from),
    })
}

#[instrument]
pub async fn get_teachers_for_school(
    pool: &Pool<Sqlite>,
    school: &RecordId,
) -> Result<Vec<Teacher>, AppError> {
    info!("Getting teachers for school");
    let rows = sqlx::query_as::<_, DbTeacher>(
        "SELECT id, school_id, name, email FROM teachers WHERE school_id = ? ORDER BY name",
    )
    .bind(school)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Teacher::from).collect())
}
