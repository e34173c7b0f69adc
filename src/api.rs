use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::db::{
    create_class, create_section, create_subject, create_teacher, get_classes_for_school,
    get_sections_for_class, get_subjects_for_school, get_teachers_for_school,
};
use crate::error::AppError;
use crate::models::{
    DayPlan, RecordId, ResolvedSchedule, ScheduleKey, SchoolClass, Section, Subject, Teacher,
    TeacherDay, WeeklySchedule,
};
use crate::schedule::{
    delete_schedule, get_schedule, get_teacher_week, list_school_schedules, upsert_schedule,
};
use crate::validation::{AppErrorExt, ErrorResponse, JsonValidateExt, ToValidationResponse};

type ApiResult<T> = Result<T, ErrorResponse>;

#[derive(Deserialize, Validate)]
pub struct ScheduleRequest {
    #[validate(
        required(message = "Class is required"),
        length(min = 1, message = "Class is required")
    )]
    sclass: Option<String>,
    #[validate(
        required(message = "Section is required"),
        length(min = 1, message = "Section is required")
    )]
    section: Option<String>,
    #[validate(
        required(message = "School is required"),
        length(min = 1, message = "School is required")
    )]
    school: Option<String>,
    #[serde(default)]
    days: Vec<DayPlan>,
}

impl ScheduleRequest {
    fn into_parts(self) -> (ScheduleKey, Vec<DayPlan>) {
        let key = ScheduleKey {
            sclass: self.sclass.unwrap_or_default().into(),
            section: self.section.unwrap_or_default().into(),
            school: self.school.unwrap_or_default().into(),
        };
        (key, self.days)
    }
}

#[post("/ClassSchedule", data = "<schedule>")]
pub async fn api_upsert_schedule(
    schedule: Json<ScheduleRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<WeeklySchedule>> {
    let (key, days) = schedule.validate_custom()?.into_parts();

    let saved = upsert_schedule(db.inner(), &key, days)
        .await
        .validate_custom()?;

    Ok(Json(saved))
}

#[get("/ClassSchedule/<class_id>/<section_id>?<school>")]
pub async fn api_get_schedule(
    class_id: &str,
    section_id: &str,
    school: Option<&str>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<ResolvedSchedule>> {
    let school = school.map(RecordId::from);

    let schedule = get_schedule(
        db.inner(),
        &class_id.into(),
        &section_id.into(),
        school.as_ref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(schedule))
}

#[get("/TeacherSchedule/<teacher_id>?<school>")]
pub async fn api_get_teacher_schedule(
    teacher_id: &str,
    school: Option<&str>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<TeacherDay>>> {
    let school = school.map(RecordId::from);

    let week = get_teacher_week(db.inner(), &teacher_id.into(), school.as_ref())
        .await
        .validate_custom()?;

    Ok(Json(week))
}

#[delete("/ClassSchedule/<id>")]
pub async fn api_delete_schedule(
    id: &str,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<WeeklySchedule>> {
    let deleted = delete_schedule(db.inner(), &id.into())
        .await
        .validate_custom()?;

    Ok(Json(deleted))
}

#[get("/ClassSchedules/<school_id>")]
pub async fn api_list_school_schedules(
    school_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<WeeklySchedule>>, AppError> {
    let schedules = list_school_schedules(db.inner(), &school_id.into()).await?;
    Ok(Json(schedules))
}

#[derive(Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, message = "School is required"))]
    school: String,
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
}

#[post("/Class", data = "<request>")]
pub async fn api_create_class(
    request: Json<CreateClassRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<SchoolClass>>> {
    let validated = request.validate_custom()?;

    let class = create_class(db, &validated.school.into(), &validated.name)
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(class)))
}

#[get("/Classes/<school_id>")]
pub async fn api_get_classes(
    school_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SchoolClass>>, Status> {
    let classes = get_classes_for_school(db, &school_id.into()).await?;
    Ok(Json(classes))
}

#[derive(Deserialize, Validate)]
pub struct CreateSectionRequest {
    #[validate(length(min = 1, message = "Class is required"))]
    sclass: String,
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
}

#[post("/Section", data = "<request>")]
pub async fn api_create_section(
    request: Json<CreateSectionRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Section>>> {
    let validated = request.validate_custom()?;

    let section = create_section(db, &validated.sclass.into(), &validated.name)
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(section)))
}

#[get("/Sections/<class_id>")]
pub async fn api_get_sections(
    class_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Section>>, Status> {
    let sections = get_sections_for_class(db, &class_id.into()).await?;
    Ok(Json(sections))
}

#[derive(Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, message = "School is required"))]
    school: String,
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[serde(default)]
    code: String,
}

#[post("/Subject", data = "<request>")]
pub async fn api_create_subject(
    request: Json<CreateSubjectRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Subject>>> {
    let validated = request.validate_custom()?;

    let subject = create_subject(
        db,
        &validated.school.into(),
        &validated.name,
        &validated.code,
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(subject)))
}

#[get("/Subjects/<school_id>")]
pub async fn api_get_subjects(
    school_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Subject>>, Status> {
    let subjects = get_subjects_for_school(db, &school_id.into()).await?;
    Ok(Json(subjects))
}

#[derive(Deserialize, Validate)]
pub struct CreateTeacherRequest {
    #[validate(length(min = 1, message = "School is required"))]
    school: String,
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(email(message = "Email is invalid"))]
    email: Option<String>,
}

#[post("/Teacher", data = "<request>")]
pub async fn api_create_teacher(
    request: Json<CreateTeacherRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Teacher>>> {
    let validated = request.validate_custom()?;

    let teacher = create_teacher(
        db,
        &validated.school.into(),
        &validated.name,
        validated.email.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(teacher)))
}

#[get("/Teachers/<school_id>")]
pub async fn api_get_teachers(
    school_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Teacher>>, Status> {
    let teachers = get_teachers_for_school(db, &school_id.into()).await?;
    Ok(Json(teachers))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[catch(default)]
pub fn json_catcher(status: Status, _req: &rocket::Request) -> ErrorResponse {
    status.to_validation_response()
}
