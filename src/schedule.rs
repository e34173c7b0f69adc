//! Weekly class timetables and the per-teacher view derived from them.
//!
//! Services take their storage as a parameter (`ScheduleStore`,
//! `ReferenceDirectory`); the Rocket handlers pass the managed SQLite pool.

use std::collections::HashMap;

use tracing::{info, instrument};

use crate::db::{ReferenceDirectory, ScheduleStore};
use crate::error::AppError;
use crate::models::{
    DayPlan, RecordId, ResolvedDayPlan, ResolvedPeriod, ResolvedSchedule, ScheduleKey,
    SubjectSummary, TeacherDay, TeacherPeriod, TeacherSummary, WeeklySchedule,
};

/// Days of the teacher view, in output order. Sunday never appears.
pub const TEACHER_WEEK: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

impl ScheduleKey {
    pub fn validate(&self) -> Result<(), AppError> {
        let missing: Vec<&str> = [
            ("sclass", &self.sclass),
            ("section", &self.section),
            ("school", &self.school),
        ]
        .into_iter()
        .filter(|(_, id)| id.is_blank())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Missing required identifiers: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Saves the week for one class/section/school.
///
/// An existing schedule for the key has its `days` replaced wholesale; nothing
/// is merged. The lookup and the write are separate statements, so two
/// concurrent first saves of one key can both insert.
#[instrument(
    skip(store, days),
    fields(sclass = %key.sclass, section = %key.section, school = %key.school)
)]
pub async fn upsert_schedule<S>(
    store: &S,
    key: &ScheduleKey,
    days: Vec<DayPlan>,
) -> Result<WeeklySchedule, AppError>
where
    S: ScheduleStore + ?Sized,
{
    key.validate()?;

    match store.find_schedule_by_key(key).await? {
        Some(existing) => {
            info!(schedule_id = %existing.id, "Replacing days of existing schedule");
            store.replace_schedule_days(&existing.id, &days).await
        }
        None => {
            info!("No schedule for key yet, creating one");
            store.insert_schedule(key, &days).await
        }
    }
}

#[instrument(skip(db))]
pub async fn get_schedule<S>(
    db: &S,
    sclass: &RecordId,
    section: &RecordId,
    school: Option<&RecordId>,
) -> Result<ResolvedSchedule, AppError>
where
    S: ScheduleStore + ReferenceDirectory + ?Sized,
{
    let schedule = db
        .find_schedule_by_class(sclass, section, school)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No schedule found for class {} section {}",
                sclass, section
            ))
        })?;

    let subject_ids: Vec<RecordId> = schedule
        .periods()
        .filter_map(|period| period.subject.clone())
        .collect();
    let teacher_ids: Vec<RecordId> = schedule
        .periods()
        .filter_map(|period| period.teacher.clone())
        .collect();

    let subjects = db.subject_summaries(&subject_ids).await?;
    let teachers = db.teacher_summaries(&teacher_ids).await?;

    Ok(resolve_schedule(schedule, &subjects, &teachers))
}

/// Expands subject and teacher references. Dangling references become `None`.
pub fn resolve_schedule(
    schedule: WeeklySchedule,
    subjects: &HashMap<RecordId, SubjectSummary>,
    teachers: &HashMap<RecordId, TeacherSummary>,
) -> ResolvedSchedule {
    let days = schedule
        .days
        .into_iter()
        .map(|plan| ResolvedDayPlan {
            day: plan.day,
            periods: plan
                .periods
                .into_iter()
                .map(|period| ResolvedPeriod {
                    subject: period.subject.and_then(|id| subjects.get(&id).cloned()),
                    teacher: period.teacher.and_then(|id| teachers.get(&id).cloned()),
                    start_time: period.start_time,
                    end_time: period.end_time,
                })
                .collect(),
        })
        .collect();

    ResolvedSchedule {
        id: schedule.id,
        sclass: schedule.sclass,
        section: schedule.section,
        school: schedule.school,
        days,
        created_at: schedule.created_at,
        updated_at: schedule.updated_at,
    }
}

/// The Monday..Saturday view of everything `teacher` teaches.
///
/// Never reports "not found": a teacher with no periods (or an unknown id)
/// gets six empty days.
#[instrument(skip(db))]
pub async fn get_teacher_week<S>(
    db: &S,
    teacher: &RecordId,
    school: Option<&RecordId>,
) -> Result<Vec<TeacherDay>, AppError>
where
    S: ScheduleStore + ReferenceDirectory + ?Sized,
{
    let schedules = db.find_schedules_by_teacher(teacher, school).await?;
    info!(schedule_count = schedules.len(), "Projecting teacher week");

    let class_ids: Vec<RecordId> = schedules.iter().map(|s| s.sclass.clone()).collect();
    let subject_ids: Vec<RecordId> = schedules
        .iter()
        .flat_map(|s| s.periods())
        .filter(|period| period.teacher.as_ref() == Some(teacher))
        .filter_map(|period| period.subject.clone())
        .collect();

    let class_names = db.class_names(&class_ids).await?;
    let subject_names: HashMap<RecordId, String> = db
        .subject_summaries(&subject_ids)
        .await?
        .into_iter()
        .map(|(id, subject)| (id, subject.name))
        .collect();

    Ok(project_teacher_week(
        teacher,
        &schedules,
        &subject_names,
        &class_names,
    ))
}

/// Re-projects class schedules into one teacher's week.
///
/// Day names match exactly (so "monday" is dropped, as is "Sunday"). Within a
/// day, periods are ordered by a stable lexical sort on `start_time`: equal
/// start times keep scan order, and "9:05" sorts after "10:00".
pub fn project_teacher_week(
    teacher: &RecordId,
    schedules: &[WeeklySchedule],
    subject_names: &HashMap<RecordId, String>,
    class_names: &HashMap<RecordId, String>,
) -> Vec<TeacherDay> {
    let mut week: Vec<TeacherDay> = TEACHER_WEEK
        .iter()
        .map(|day| TeacherDay {
            day: day.to_string(),
            periods: Vec::new(),
        })
        .collect();

    for schedule in schedules {
        let class_name = class_names.get(&schedule.sclass).cloned();

        for plan in &schedule.days {
            let Some(slot) = week.iter_mut().find(|entry| entry.day == plan.day) else {
                continue;
            };

            slot.periods.extend(
                plan.periods
                    .iter()
                    .filter(|period| period.teacher.as_ref() == Some(teacher))
                    .map(|period| TeacherPeriod {
                        start_time: period.start_time.clone(),
                        end_time: period.end_time.clone(),
                        subject: period
                            .subject
                            .as_ref()
                            .and_then(|id| subject_names.get(id).cloned()),
                        class_name: class_name.clone(),
                    }),
            );
        }
    }

    for day in &mut week {
        day.periods.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    }

    week
}

#[instrument(skip(store))]
pub async fn delete_schedule<S>(store: &S, id: &RecordId) -> Result<WeeklySchedule, AppError>
where
    S: ScheduleStore + ?Sized,
{
    store
        .delete_schedule(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))
}

#[instrument(skip(store))]
pub async fn list_school_schedules<S>(
    store: &S,
    school: &RecordId,
) -> Result<Vec<WeeklySchedule>, AppError>
where
    S: ScheduleStore + ?Sized,
{
    store.find_schedules_by_school(school).await
}
