#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, DatabaseBackend, Overrides, StorageBackend};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.storage, "memory");
        assert_eq!(config.database, "memory");
        assert_eq!(config.lock.ttl_ms, 10_000);
        assert_eq!(config.lock.max_attempts, 2);
        assert_eq!(config.lock.retry_delay_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 8080
storage: redis://127.0.0.1:6379/0
lock:
  ttl_ms: 5000
  deadline_ms: 2000
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage, "redis://127.0.0.1:6379/0");
        assert_eq!(config.database, "memory");
        assert_eq!(config.lock.ttl_ms, 5000);
        assert_eq!(config.lock.max_attempts, 2);
        assert_eq!(config.lock.deadline_ms, Some(2000));
    }

    #[test]
    fn test_unknown_backends_are_rejected() {
        assert!(AppConfig::from_yaml("storage: etcd://localhost:2379").is_err());
        assert!(AppConfig::from_yaml("database: postgres://localhost/db").is_err());
        assert!(AppConfig::from_yaml("lock:\n  ttl_ms: 0").is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(
            "rediss://cache:6380".parse::<StorageBackend>().unwrap(),
            StorageBackend::Redis("rediss://cache:6380".to_string())
        );
        assert!("sqlite:locks.db".parse::<StorageBackend>().is_err());

        assert_eq!(
            "sqlite:data/users.db".parse::<DatabaseBackend>().unwrap(),
            DatabaseBackend::Sqlite("data/users.db".to_string())
        );
        assert!("sqlite:".parse::<DatabaseBackend>().is_err());
    }

    #[test]
    fn test_overrides_beat_file_values() {
        let mut config = AppConfig::from_yaml("server:\n  port: 8080\nstorage: memory").unwrap();

        Overrides {
            port: Some(9090),
            storage: Some("redis://10.0.0.5:6379".to_string()),
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage, "redis://10.0.0.5:6379");
        assert_eq!(config.database, "memory");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Some(std::path::Path::new("/nonexistent/kvlock.yaml")))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read config file"));
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}
