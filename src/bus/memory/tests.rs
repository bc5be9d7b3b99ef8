use super::*;
use std::time::Duration;

fn reader_options(topic: &str, start_offset: StartOffset) -> ReaderOptions {
    ReaderOptions {
        broker: DEFAULT_MEMORY_BROKER.to_string(),
        topic: topic.to_string(),
        partition: 0,
        min_bytes: 1,
        max_bytes: 1024,
        start_offset,
    }
}

#[tokio::test]
async fn test_dial_unknown_broker_fails() {
    let broker = MemoryBroker::new();
    let result = broker.dial("nowhere:9092").await;
    assert!(matches!(result, Err(BusError::Connection(_))));
    assert_eq!(broker.dial_count(), 1);
}

#[tokio::test]
async fn test_create_topic_twice_reports_existing() {
    let broker = MemoryBroker::new();
    let admin = broker.dial(DEFAULT_MEMORY_BROKER).await.unwrap();

    admin.create_topic(&TopicSpec::new("pessoa.saved")).await.unwrap();
    let second = admin.create_topic(&TopicSpec::new("pessoa.saved")).await;

    assert!(matches!(second, Err(BusError::TopicAlreadyExists(ref t)) if t == "pessoa.saved"));
    assert!(broker.topic_exists("pessoa.saved").await);
}

#[tokio::test]
async fn test_controller_is_first_broker() {
    let broker = MemoryBroker::with_brokers(["b1:9092", "b2:9092"]);
    let admin = broker.dial("b2:9092").await.unwrap();
    assert_eq!(admin.controller().await.unwrap(), "b1:9092");
}

#[tokio::test]
async fn test_write_assigns_offsets() {
    let broker = MemoryBroker::new();
    let writer = broker.writer();

    writer.write(Message::outbound("curso.saved", "1", "a")).await.unwrap();
    writer.write(Message::outbound("curso.saved", "2", "b")).await.unwrap();

    let messages = broker.messages("curso.saved").await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].offset, 0);
    assert_eq!(messages[1].offset, 1);
    assert_eq!(broker.write_count(), 2);
}

#[tokio::test]
async fn test_closed_writer_rejects_writes() {
    let broker = MemoryBroker::new();
    let writer = broker.writer();
    writer.close().await.unwrap();

    let result = writer.write(Message::outbound("curso.saved", "1", "a")).await;
    assert!(matches!(result, Err(BusError::Closed)));
}

#[tokio::test]
async fn test_reader_waits_for_new_messages() {
    let broker = MemoryBroker::new();
    let mut reader = broker
        .open(&reader_options("pessoa.saved", StartOffset::Earliest))
        .unwrap();

    let writer = broker.writer();
    let publish = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer
            .write(Message::outbound("pessoa.saved", "42", "payload"))
            .await
            .unwrap();
    };

    let (message, _) = tokio::join!(reader.read(), publish);
    let message = message.unwrap();
    assert_eq!(message.value, b"payload".to_vec());
    assert_eq!(message.offset, 0);
}

#[tokio::test]
async fn test_reader_latest_skips_backlog() {
    let broker = MemoryBroker::new();
    let writer = broker.writer();
    writer.write(Message::outbound("pessoa.saved", "old", "old")).await.unwrap();

    let mut reader = broker
        .open(&reader_options("pessoa.saved", StartOffset::Latest))
        .unwrap();

    // Nothing new yet: the read must still be pending.
    let pending = tokio::time::timeout(Duration::from_millis(20), reader.read()).await;
    assert!(pending.is_err());

    writer.write(Message::outbound("pessoa.saved", "new", "new")).await.unwrap();
    let message = tokio::time::timeout(Duration::from_secs(1), reader.read())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.key, b"new".to_vec());
}

#[tokio::test]
async fn test_reader_on_offline_broker_errors() {
    let broker = MemoryBroker::new();
    broker.set_broker_online(DEFAULT_MEMORY_BROKER, false).await;

    let mut reader = broker
        .open(&reader_options("pessoa.saved", StartOffset::Earliest))
        .unwrap();
    let result = reader.read().await;

    assert!(matches!(result, Err(ref e) if e.is_transient()));
}
