use super::*;
use crate::bus::{HandlerError, Message, MessageHandler};
use crate::storage::InMemoryPersonRepository;
use chrono::TimeZone;

fn message(value: &str) -> Message {
    Message {
        topic: "pessoa.saved".to_string(),
        partition: 0,
        offset: 0,
        key: b"42".to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

// ============================================================================
// Use case
// ============================================================================

#[tokio::test]
async fn test_first_message_creates() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    let outcome = use_case
        .execute_create_or_update(PersonDto::new("42", "Ana"))
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Created);
    assert_eq!(repo.len().await, 1);
}

#[tokio::test]
async fn test_same_dto_twice_is_unchanged() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    use_case
        .execute_create_or_update(PersonDto::new("42", "Ana"))
        .await
        .unwrap();
    let outcome = use_case
        .execute_create_or_update(PersonDto::new("42", "Ana"))
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Unchanged);
    assert_eq!(repo.len().await, 1);
    let stored = repo.find_by_identifier("42").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana");
}

#[tokio::test]
async fn test_later_message_updates() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    use_case
        .execute_create_or_update(PersonDto::new("42", "Ana"))
        .await
        .unwrap();
    let outcome = use_case
        .execute_create_or_update(PersonDto::new("42", "Ana Maria"))
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Updated);
    let stored = repo.find_by_identifier("42").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana Maria");
}

#[tokio::test]
async fn test_stale_version_is_skipped() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    use_case
        .execute_create_or_update(PersonDto::new("42", "Ana Maria").with_updated_at(at(12)))
        .await
        .unwrap();
    let outcome = use_case
        .execute_create_or_update(PersonDto::new("42", "Ana").with_updated_at(at(9)))
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Stale);
    let stored = repo.find_by_identifier("42").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana Maria");
}

#[tokio::test]
async fn test_unversioned_message_wins_over_versioned() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    use_case
        .execute_create_or_update(PersonDto::new("42", "Ana").with_updated_at(at(12)))
        .await
        .unwrap();
    let outcome = use_case
        .execute_create_or_update(PersonDto::new("42", "Ana Maria"))
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Updated);
}

#[tokio::test]
async fn test_empty_identifier_rejected() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let use_case = SaveReplicaUseCase::new(repo.clone());

    let result = use_case
        .execute_create_or_update(PersonDto::new(" ", "Ana"))
        .await;

    assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    assert!(repo.is_empty().await);
}

// ============================================================================
// Handler
// ============================================================================

#[tokio::test]
async fn test_handler_upserts_decoded_dto() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let handler = ReplicationHandler::<PersonDto, _>::new(repo.clone());

    handler
        .handle(&message(r#"{"id":"42","nome":"Ana"}"#))
        .await
        .unwrap();

    let stored = repo.find_by_identifier("42").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana");
}

#[tokio::test]
async fn test_handler_malformed_json_leaves_repository_untouched() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let handler = ReplicationHandler::<PersonDto, _>::new(repo.clone());

    let result = handler.handle(&message(r#"{"id":"42","nome":"#)).await;

    assert!(matches!(result, Err(HandlerError::Decode(_))));
    assert!(repo.is_empty().await);
}

#[tokio::test]
async fn test_handler_missing_field_is_decode_error() {
    let repo = Arc::new(InMemoryPersonRepository::new());
    let handler = ReplicationHandler::<PersonDto, _>::new(repo.clone());

    let result = handler.handle(&message(r#"{"nome":"Ana"}"#)).await;

    assert!(matches!(result, Err(HandlerError::Decode(_))));
    assert!(repo.is_empty().await);
}

#[tokio::test]
async fn test_handler_propagates_repository_error() {
    struct Unavailable;

    #[async_trait]
    impl ReplicaRepository<PersonDto> for Unavailable {
        type Record = PersonRecord;

        async fn create_or_update(&self, _dto: &PersonDto) -> Result<Option<PersonRecord>> {
            Err(StorageError::Unavailable("database is down".to_string()))
        }

        async fn find_by_identifier(&self, _id: &str) -> Result<Option<PersonRecord>> {
            Err(StorageError::Unavailable("database is down".to_string()))
        }
    }

    let handler = ReplicationHandler::<PersonDto, _>::new(Arc::new(Unavailable));
    let result = handler.handle(&message(r#"{"id":"42","nome":"Ana"}"#)).await;

    match result {
        Err(HandlerError::Repository(e)) => assert!(e.is_retryable()),
        other => panic!("expected repository error, got {:?}", other),
    }
}

/// Delays writes of one DTO name so a concurrent upsert overtakes it.
struct SlowWrites {
    inner: InMemoryPersonRepository,
    slow: &'static str,
}

#[async_trait]
impl ReplicaRepository<PersonDto> for SlowWrites {
    type Record = PersonRecord;

    async fn create_or_update(&self, dto: &PersonDto) -> Result<Option<PersonRecord>> {
        if dto.name == self.slow {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        self.inner.create_or_update(dto).await
    }

    async fn find_by_identifier(&self, id: &str) -> Result<Option<PersonRecord>> {
        self.inner.find_by_identifier(id).await
    }
}

#[tokio::test]
async fn test_concurrent_upserts_keep_newest_version() {
    let repo = Arc::new(SlowWrites {
        inner: InMemoryPersonRepository::new(),
        slow: "v1",
    });
    let use_case = SaveReplicaUseCase::new(repo.clone());
    use_case
        .execute_create_or_update(PersonDto::new("42", "v0").with_updated_at(at(8)))
        .await
        .unwrap();

    // Both see v0 before either writes; v2 lands first.
    let (v1, v2) = tokio::join!(
        use_case.execute_create_or_update(PersonDto::new("42", "v1").with_updated_at(at(9))),
        use_case.execute_create_or_update(PersonDto::new("42", "v2").with_updated_at(at(10))),
    );

    assert_eq!(v1.unwrap(), UpsertOutcome::Stale);
    assert_eq!(v2.unwrap(), UpsertOutcome::Updated);
    let stored = repo.find_by_identifier("42").await.unwrap().unwrap();
    assert_eq!(stored.name, "v2");
    assert_eq!(stored.updated_at, Some(at(10)));
}

#[test]
fn test_is_stale_needs_both_versions() {
    assert!(is_stale(Some(at(10)), Some(at(9))));
    assert!(!is_stale(Some(at(10)), Some(at(10))));
    assert!(!is_stale(Some(at(10)), None));
    assert!(!is_stale(None, Some(at(9))));
}
