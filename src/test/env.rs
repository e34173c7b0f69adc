#[cfg(test)]
mod tests {
    use crate::env::{
        AppConfig, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS, env_files_for, load_environment,
    };
    use serial_test::serial;

    const UNSET: [(&str, Option<&str>); 3] = [
        ("DATABASE_URL", None),
        ("TIMETABLE_DATABASE_URL", None),
        ("TIMETABLE_MAX_CONNECTIONS", None),
    ];

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        temp_env::with_vars(UNSET, || {
            let config = AppConfig::load().expect("Failed to load config");

            assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
            assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        });
    }

    #[test]
    #[serial]
    fn test_prefixed_variables_override_defaults() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", None),
                ("TIMETABLE_DATABASE_URL", Some("sqlite::memory:")),
                ("TIMETABLE_MAX_CONNECTIONS", Some("12")),
            ],
            || {
                let config = AppConfig::load().expect("Failed to load config");

                assert_eq!(config.database_url, "sqlite::memory:");
                assert_eq!(config.max_connections, 12);
            },
        );
    }

    #[test]
    #[serial]
    fn test_bare_database_url_is_honoured() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite://bare.db")),
                ("TIMETABLE_DATABASE_URL", None),
                ("TIMETABLE_MAX_CONNECTIONS", None),
            ],
            || {
                let config = AppConfig::load().expect("Failed to load config");

                assert_eq!(config.database_url, "sqlite://bare.db");
            },
        );
    }

    #[test]
    #[serial]
    fn test_prefixed_url_wins_over_bare() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite://bare.db")),
                ("TIMETABLE_DATABASE_URL", Some("sqlite://prefixed.db")),
                ("TIMETABLE_MAX_CONNECTIONS", None),
            ],
            || {
                let config = AppConfig::load().expect("Failed to load config");

                assert_eq!(config.database_url, "sqlite://prefixed.db");
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_pool_size_is_an_error() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", None),
                ("TIMETABLE_DATABASE_URL", None),
                ("TIMETABLE_MAX_CONNECTIONS", Some("many")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }

    #[test]
    fn test_env_files_follow_profile() {
        assert_eq!(
            env_files_for("development"),
            ["config/common.env", "config/dev.env", ".secrets.env"]
        );
        assert_eq!(env_files_for("release")[1], "config/prod.env");
        assert_eq!(env_files_for("production")[1], "config/prod.env");
        assert_eq!(env_files_for("anything-else")[1], "config/dev.env");
    }

    #[test]
    #[serial]
    fn test_dev_env_files_feed_config() {
        temp_env::with_vars(
            [
                ("ROCKET_PROFILE", None::<&str>),
                ("RUST_LOG", None),
                ("DATABASE_URL", None),
                ("TIMETABLE_DATABASE_URL", None),
                ("TIMETABLE_MAX_CONNECTIONS", None),
            ],
            || {
                let loaded = load_environment().expect("Failed to load env files");
                assert_eq!(loaded.profile, "development");
                assert_eq!(loaded.loaded[..2], ["config/common.env", "config/dev.env"]);
                assert!(!loaded.skipped.contains(&"config/dev.env"));

                let config = AppConfig::load().expect("Failed to load config");

                assert_eq!(config.database_url, "sqlite://timetable-dev.db?mode=rwc");
                assert_eq!(config.max_connections, 5);
            },
        );
    }
}
