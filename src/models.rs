use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a stored record. Any string the caller hands us is accepted.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(default)]
    pub subject: Option<RecordId>,
    #[serde(default)]
    pub teacher: Option<RecordId>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: String,
    #[serde(default)]
    pub periods: Vec<Period>,
}

/// Natural key of a weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleKey {
    pub sclass: RecordId,
    pub section: RecordId,
    pub school: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySchedule {
    pub id: RecordId,
    pub sclass: RecordId,
    pub section: RecordId,
    pub school: RecordId,
    pub days: Vec<DayPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklySchedule {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            sclass: self.sclass.clone(),
            section: self.section.clone(),
            school: self.school.clone(),
        }
    }

    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.days.iter().flat_map(|day| day.periods.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub id: RecordId,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherSummary {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPeriod {
    pub subject: Option<SubjectSummary>,
    pub teacher: Option<TeacherSummary>,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDayPlan {
    pub day: String,
    pub periods: Vec<ResolvedPeriod>,
}

/// A weekly schedule with subject and teacher references expanded for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSchedule {
    pub id: RecordId,
    pub sclass: RecordId,
    pub section: RecordId,
    pub school: RecordId,
    pub days: Vec<ResolvedDayPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPeriod {
    pub start_time: String,
    pub end_time: String,
    pub subject: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherDay {
    pub day: String,
    pub periods: Vec<TeacherPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: RecordId,
    pub school: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: RecordId,
    pub sclass: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: RecordId,
    pub school: RecordId,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: RecordId,
    pub school: RecordId,
    pub name: String,
    pub email: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSchedule {
    pub id: Option<String>,
    pub class_id: Option<String>,
    pub section_id: Option<String>,
    pub school_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DbSchedule {
    pub fn into_schedule(self, days: Vec<DayPlan>) -> WeeklySchedule {
        WeeklySchedule {
            id: self.id.unwrap_or_default().into(),
            sclass: self.class_id.unwrap_or_default().into(),
            section: self.section_id.unwrap_or_default().into(),
            school: self.school_id.unwrap_or_default().into(),
            days,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbScheduleDay {
    pub id: i64,
    pub schedule_id: String,
    pub day: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSchedulePeriod {
    pub day_id: i64,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl From<DbSchedulePeriod> for Period {
    fn from(row: DbSchedulePeriod) -> Self {
        Self {
            subject: row.subject_id.map(RecordId::from),
            teacher: row.teacher_id.map(RecordId::from),
            start_time: row.start_time.unwrap_or_default(),
            end_time: row.end_time.unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbClass {
    pub id: Option<String>,
    pub school_id: Option<String>,
    pub name: Option<String>,
}

impl From<DbClass> for SchoolClass {
    fn from(row: DbClass) -> Self {
        Self {
            id: row.id.unwrap_or_default().into(),
            school: row.school_id.unwrap_or_default().into(),
            name: row.name.unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSection {
    pub id: Option<String>,
    pub class_id: Option<String>,
    pub name: Option<String>,
}

impl From<DbSection> for Section {
    fn from(row: DbSection) -> Self {
        Self {
            id: row.id.unwrap_or_default().into(),
            sclass: row.class_id.unwrap_or_default().into(),
            name: row.name.unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubject {
    pub id: Option<String>,
    pub school_id: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
}

impl From<DbSubject> for Subject {
    fn from(row: DbSubject) -> Self {
        Self {
            id: row.id.unwrap_or_default().into(),
            school: row.school_id.unwrap_or_default().into(),
            name: row.name.unwrap_or_default(),
            code: row.code.unwrap_or_default(),
        }
    }
}

impl From<Subject> for SubjectSummary {
    fn from(subject: Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name,
            code: subject.code,
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTeacher {
    pub id: Option<String>,
    pub school_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<DbTeacher> for Teacher {
    fn from(row: DbTeacher) -> Self {
        Self {
            id: row.id.unwrap_or_default().into(),
            school: row.school_id.unwrap_or_default().into(),
            name: row.name.unwrap_or_default(),
            email: row.email,
        }
    }
}

impl From<Teacher> for TeacherSummary {
    fn from(teacher: Teacher) -> Self {
        Self {
            id: teacher.id,
            name: teacher.name,
        }
    }
}
