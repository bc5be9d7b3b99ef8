//! End-to-end replication over the in-memory broker.
//!
//! dispatch -> publishing handler -> producer -> broker -> consumer pool ->
//! replication handler -> replica repository.

use std::sync::Arc;
use std::time::Duration;

use replica_bridge::bus::provisioner::{CURSO_TOPICS, PESSOA_TOPICS};
use replica_bridge::bus::{
    ensure_topics, ConsumerError, ConsumerPool, ConsumerSettings, ConsumerSpec, FailurePolicy,
    MemoryBroker, Message, MessageWriter, PoolHandle, Producer,
};
use replica_bridge::dlq::{BrokerDeadLetterPublisher, DeadLetter};
use replica_bridge::event::{
    DomainEvent, EventDispatcher, LogOnlyHandler, PublishingHandler, PESSOA_SAVED,
};
use replica_bridge::replication::{PersonDto, ReplicaRepository, ReplicationHandler};
use replica_bridge::storage::InMemoryPersonRepository;

const BROKER: &str = "memory:9092";

struct Harness {
    broker: MemoryBroker,
    dispatcher: EventDispatcher,
    repo: Arc<InMemoryPersonRepository>,
}

impl Harness {
    async fn new() -> Self {
        let broker = MemoryBroker::new();
        ensure_topics(&broker, &[BROKER], PESSOA_TOPICS).await.unwrap();
        ensure_topics(&broker, &[BROKER], CURSO_TOPICS).await.unwrap();

        let producer =
            Arc::new(Producer::new(Box::new(broker.writer()), PESSOA_SAVED).unwrap());
        let mut builder = EventDispatcher::builder();
        builder
            .register(PESSOA_SAVED, Arc::new(LogOnlyHandler::new("pessoa changed")))
            .unwrap()
            .register(PESSOA_SAVED, Arc::new(PublishingHandler::new(producer)))
            .unwrap();

        Self {
            broker,
            dispatcher: builder.build(),
            repo: Arc::new(InMemoryPersonRepository::new()),
        }
    }

    fn start_pool(&self, settings: ConsumerSettings) -> PoolHandle {
        let pool = ConsumerPool::new(Arc::new(self.broker.clone()), settings);
        self.start_with(pool)
    }

    fn start_with(&self, pool: ConsumerPool) -> PoolHandle {
        pool.start(vec![ConsumerSpec::new(
            PESSOA_SAVED,
            vec![BROKER.to_string()],
            Arc::new(ReplicationHandler::<PersonDto, _>::new(self.repo.clone())),
        )])
        .unwrap()
    }

    async fn save(&self, person: PersonDto) {
        let event = DomainEvent::new(PESSOA_SAVED, &person).unwrap();
        self.dispatcher.dispatch(&event).await.unwrap();
    }

    async fn wait_for_name(&self, id: &str, name: &str) -> bool {
        for _ in 0..200 {
            if let Ok(Some(record)) = self.repo.find_by_identifier(id).await {
                if record.name == name {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

fn settings() -> ConsumerSettings {
    ConsumerSettings::default()
        .with_read_timeout(Duration::from_millis(50))
        .with_max_read_backoff(Duration::from_millis(20))
}

#[tokio::test]
async fn test_saved_person_reaches_replica() {
    let harness = Harness::new().await;
    let handle = harness.start_pool(settings());

    harness.save(PersonDto::new("42", "Ana")).await;

    let written = harness.broker.messages(PESSOA_SAVED).await;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].value, br#"{"id":"42","nome":"Ana"}"#);

    assert!(harness.wait_for_name("42", "Ana").await);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_later_save_overwrites_replica() {
    let harness = Harness::new().await;
    let handle = harness.start_pool(settings());

    harness.save(PersonDto::new("42", "Ana")).await;
    harness.save(PersonDto::new("42", "Ana Maria")).await;

    assert!(harness.wait_for_name("42", "Ana Maria").await);
    assert_eq!(harness.repo.len().await, 1);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_backlog_is_replayed_from_earliest() {
    let harness = Harness::new().await;
    harness.save(PersonDto::new("1", "Ana")).await;
    harness.save(PersonDto::new("2", "Bruno")).await;

    let handle = harness.start_pool(settings());

    assert!(harness.wait_for_name("1", "Ana").await);
    assert!(harness.wait_for_name("2", "Bruno").await);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_halts_by_default() {
    let harness = Harness::new().await;
    harness
        .broker
        .writer()
        .write(Message::outbound(PESSOA_SAVED, "42", r#"{"id":"42","nome":"#))
        .await
        .unwrap();

    let handle = harness.start_pool(settings());
    let result = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .unwrap();

    assert!(matches!(result, Err(ConsumerError::Handler { offset: 0, .. })));
    assert!(harness.repo.is_empty().await);
}

#[tokio::test]
async fn test_malformed_message_ignored_under_legacy_policy() {
    let harness = Harness::new().await;
    harness
        .broker
        .writer()
        .write(Message::outbound(PESSOA_SAVED, "42", "not json"))
        .await
        .unwrap();
    harness.save(PersonDto::new("42", "Ana")).await;

    let handle = harness.start_pool(settings().with_failure_policy(FailurePolicy::Ignore));

    assert!(harness.wait_for_name("42", "Ana").await);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_dead_lettered() {
    let harness = Harness::new().await;
    harness
        .broker
        .writer()
        .write(Message::outbound(PESSOA_SAVED, "42", "not json"))
        .await
        .unwrap();
    harness.save(PersonDto::new("42", "Ana")).await;

    let pool = ConsumerPool::new(
        Arc::new(harness.broker.clone()),
        settings().with_failure_policy(FailurePolicy::DeadLetter),
    )
    .with_dead_letters(Arc::new(BrokerDeadLetterPublisher::new(Arc::new(
        harness.broker.writer(),
    ))));
    let handle = harness.start_with(pool);

    assert!(harness.wait_for_name("42", "Ana").await);

    let dead = harness.broker.messages("pessoa.saved.dlq").await;
    assert_eq!(dead.len(), 1);
    let envelope: DeadLetter = serde_json::from_slice(&dead[0].value).unwrap();
    assert_eq!(envelope.source_topic, PESSOA_SAVED);
    assert_eq!(envelope.offset, 0);
    assert_eq!(envelope.value, "not json");

    handle.shutdown();
    handle.join().await.unwrap();
}
