#[cfg(test)]
pub mod test_utils {
    use crate::db::{create_class, create_section, create_subject, create_teacher};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{DayPlan, Period, RecordId};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::Value;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub const SCHOOL: &str = "S1";

    #[derive(Default)]
    pub struct TestDbBuilder {
        classes: Vec<(String, String)>,
        sections: Vec<(String, String)>,
        subjects: Vec<(String, String, String)>,
        teachers: Vec<(String, String)>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn class(mut self, school: &str, name: &str) -> Self {
            self.classes.push((school.to_string(), name.to_string()));
            self
        }

        /// Adds a section to a class previously added by name.
        pub fn section(mut self, class_name: &str, name: &str) -> Self {
            self.sections
                .push((class_name.to_string(), name.to_string()));
            self
        }

        pub fn subject(mut self, school: &str, name: &str, code: &str) -> Self {
            self.subjects
                .push((school.to_string(), name.to_string(), code.to_string()));
            self
        }

        pub fn teacher(mut self, school: &str, name: &str) -> Self {
            self.teachers.push((school.to_string(), name.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut class_ids = HashMap::new();
            let mut section_ids = HashMap::new();
            let mut subject_ids = HashMap::new();
            let mut teacher_ids = HashMap::new();

            for (school, name) in &self.classes {
                let class = create_class(&pool, &school.as_str().into(), name).await?;
                class_ids.insert(name.clone(), class.id);
            }

            for (class_name, name) in &self.sections {
                let Some(class_id) = class_ids.get(class_name) else {
                    return Err(AppError::Internal(format!(
                        "Section {} refers to unknown class {}",
                        name, class_name
                    )));
                };
                let section = create_section(&pool, class_id, name).await?;
                section_ids.insert(format!("{}/{}", class_name, name), section.id);
            }

            for (school, name, code) in &self.subjects {
                let subject = create_subject(&pool, &school.as_str().into(), name, code).await?;
                subject_ids.insert(name.clone(), subject.id);
            }

            for (school, name) in &self.teachers {
                let teacher = create_teacher(&pool, &school.as_str().into(), name, None).await?;
                teacher_ids.insert(name.clone(), teacher.id);
            }

            Ok(TestDb {
                pool,
                class_ids,
                section_ids,
                subject_ids,
                teacher_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub class_ids: HashMap<String, RecordId>,
        pub section_ids: HashMap<String, RecordId>,
        pub subject_ids: HashMap<String, RecordId>,
        pub teacher_ids: HashMap<String, RecordId>,
    }

    impl TestDb {
        pub fn class_id(&self, name: &str) -> RecordId {
            self.class_ids
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("Class {} not seeded", name))
        }

        pub fn section_id(&self, class_name: &str, name: &str) -> RecordId {
            self.section_ids
                .get(&format!("{}/{}", class_name, name))
                .cloned()
                .unwrap_or_else(|| panic!("Section {}/{} not seeded", class_name, name))
        }

        pub fn subject_id(&self, name: &str) -> RecordId {
            self.subject_ids
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("Subject {} not seeded", name))
        }

        pub fn teacher_id(&self, name: &str) -> RecordId {
            self.teacher_ids
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("Teacher {} not seeded", name))
        }

        pub fn period(&self, subject: &str, teacher: &str, start: &str, end: &str) -> Period {
            Period {
                subject: Some(self.subject_id(subject)),
                teacher: Some(self.teacher_id(teacher)),
                start_time: start.to_string(),
                end_time: end.to_string(),
            }
        }
    }

    pub fn day(name: &str, periods: Vec<Period>) -> DayPlan {
        DayPlan {
            day: name.to_string(),
            periods,
        }
    }

    /// School S1 with classes "10" (section A) and "9" (section B), subjects
    /// Math and Science, teachers Alice and Bob.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .class(SCHOOL, "10")
            .section("10", "A")
            .class(SCHOOL, "9")
            .section("9", "B")
            .subject(SCHOOL, "Math", "MTH")
            .subject(SCHOOL, "Science", "SCI")
            .teacher(SCHOOL, "Alice")
            .teacher(SCHOOL, "Bob")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone()).await;
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }

    pub async fn post_json(client: &Client, uri: &str, body: Value) -> (Status, Value) {
        let response = client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;

        let status = response.status();
        let body = response.into_string().await.unwrap_or_default();
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    pub async fn get_json(client: &Client, uri: &str) -> (Status, Value) {
        let response = client.get(uri.to_string()).dispatch().await;

        let status = response.status();
        let body = response.into_string().await.unwrap_or_default();
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}
