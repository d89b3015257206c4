#[cfg(test)]
mod tests {
    use crate::client::LockClient;
    use crate::config::LockConfig;
    use crate::error::{RepositoryError, ServiceError};
    use crate::repository::{UserRepository, UserTransaction};
    use crate::repository_sqlite::SqliteUserRepository;
    use crate::service::UserService;
    use crate::types::{NewUser, RegisterRequest, UpdateUserRequest};
    use std::sync::Arc;

    // bcrypt's minimum cost keeps hashing fast in tests.
    const TEST_HASH_COST: u32 = 4;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "$2b$04$hash".to_string(),
            nickname: "nick".to_string(),
            created_at: 1000,
        }
    }

    #[test]
    fn test_sqlite_insert_and_find() {
        let repo = SqliteUserRepository::open_in_memory().unwrap();

        let user = repo
            .transaction(|tx| tx.insert(new_user("alice")))
            .unwrap();
        assert!(user.id > 0);

        let found = repo.get_live(user.id).unwrap().unwrap();
        assert_eq!(found, user);

        let count: u64 = repo
            .transaction(|tx| tx.count_live_by_username("alice"))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sqlite_error_rolls_back() {
        let repo = SqliteUserRepository::open_in_memory().unwrap();

        let result: Result<(), RepositoryError> = repo.transaction(|tx| {
            tx.insert(new_user("bob"))?;
            Err(RepositoryError::Backend("abort".to_string()))
        });
        assert!(result.is_err());

        let count = repo
            .transaction(|tx: &mut dyn UserTransaction| tx.count_live_by_username("bob"))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_sqlite_soft_delete_hides_row() {
        let repo = SqliteUserRepository::open_in_memory().unwrap();
        let user = repo.transaction(|tx| tx.insert(new_user("carol"))).unwrap();

        assert!(repo.soft_delete(user.id).unwrap());
        assert!(!repo.soft_delete(user.id).unwrap());
        assert!(repo.get_live(user.id).unwrap().is_none());
        assert_eq!(
            repo.transaction(|tx| tx.count_live_by_username("carol"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_sqlite_update_missing_row() {
        let repo = SqliteUserRepository::open_in_memory().unwrap();
        let mut ghost = repo.transaction(|tx| tx.insert(new_user("dave"))).unwrap();
        ghost.id = 999;

        let result = repo.transaction(|tx| tx.update(&ghost));
        assert!(matches!(result, Err(RepositoryError::RowMissing { id: 999 })));
    }

    #[tokio::test]
    async fn test_service_over_sqlite() {
        let svc = UserService::new(
            LockClient::in_memory(),
            Arc::new(SqliteUserRepository::open_in_memory().unwrap()),
            LockConfig::default(),
        )
        .with_hash_cost(TEST_HASH_COST);

        let created = svc
            .register(RegisterRequest {
                username: "erin".to_string(),
                password: "password1".to_string(),
                nickname: String::new(),
            })
            .await
            .unwrap();

        let dup = svc
            .register(RegisterRequest {
                username: "erin".to_string(),
                password: "password2".to_string(),
                nickname: String::new(),
            })
            .await;
        assert!(matches!(dup, Err(ServiceError::UsernameTaken)));

        let updated = svc
            .update_user(
                created.id,
                UpdateUserRequest {
                    nickname: Some("Erin".to_string()),
                    password: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.nickname, "Erin");
        assert_eq!(svc.get_user(created.id).unwrap().nickname, "Erin");
    }
}
