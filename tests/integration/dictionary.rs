use std::sync::Arc;
use std::time::Duration;
use syncstore::channel::{Channel, Filter, MemoryChannel};
use syncstore::sync::SynchronizedDictionary;
use syncstore::types::{NewRecord, Record};

use crate::support::{backends, FlakyChannel};

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn buckets_track_channel_mutations() {
    for (backend, channel) in backends("groups") {
        channel
            .create_many(vec![
                NewRecord::with_id("1").with("owner", "ann"),
                NewRecord::with_id("2").with("owner", "ann"),
                NewRecord::with_id("3").with("owner", "bob"),
            ])
            .await
            .unwrap();
        let dict = SynchronizedDictionary::new(Arc::clone(&channel), "owner")
            .with_cache_update_interval(Duration::ZERO);
        assert_eq!(ids(&dict.get("ann").await.unwrap()), vec!["1", "2"], "{backend}");

        channel
            .update(Record::new("2").with("owner", "bob"))
            .await
            .unwrap();
        channel.remove("1").await.unwrap();
        channel
            .create(NewRecord::with_id("4").with("owner", "cat"))
            .await
            .unwrap();

        assert!(dict.get("ann").await.unwrap().is_empty(), "{backend}");
        assert_eq!(ids(&dict.get("bob").await.unwrap()), vec!["3", "2"], "{backend}");
        assert_eq!(ids(&dict.get("cat").await.unwrap()), vec!["4"], "{backend}");
        assert_eq!(
            dict.version().await,
            Some(channel.get_version().await.unwrap()),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn open_window_serves_cached_contents() {
    let channel = Arc::new(MemoryChannel::new("groups"));
    channel
        .create(NewRecord::with_id("1").with("owner", "ann"))
        .await
        .unwrap();
    let dict = SynchronizedDictionary::new(channel.clone(), "owner")
        .with_cache_update_interval(Duration::from_secs(3600));
    assert_eq!(dict.get("ann").await.unwrap().len(), 1);

    channel
        .create(NewRecord::with_id("2").with("owner", "ann"))
        .await
        .unwrap();
    assert_eq!(dict.get("ann").await.unwrap().len(), 1);

    dict.refresh().await.unwrap();
    assert_eq!(dict.get("ann").await.unwrap().len(), 2);

    dict.set_cache_update_interval(Duration::ZERO).await;
    channel.remove("1").await.unwrap();
    assert_eq!(ids(&dict.get("ann").await.unwrap()), vec!["2"]);
}

#[tokio::test]
async fn failed_refresh_keeps_checkpoint() {
    let inner: Arc<dyn Channel> = Arc::new(MemoryChannel::new("groups"));
    let flaky = Arc::new(FlakyChannel::new(Arc::clone(&inner)));
    inner
        .create(NewRecord::with_id("1").with("owner", "ann"))
        .await
        .unwrap();
    let dict = SynchronizedDictionary::new(flaky.clone(), "owner")
        .with_cache_update_interval(Duration::ZERO);
    assert_eq!(dict.get("ann").await.unwrap().len(), 1);
    let checkpoint = dict.version().await;

    inner
        .create(NewRecord::with_id("2").with("owner", "ann"))
        .await
        .unwrap();
    flaky.set_failing(true);
    assert!(dict.get("ann").await.is_err());
    assert_eq!(dict.version().await, checkpoint);

    flaky.set_failing(false);
    assert_eq!(ids(&dict.get("ann").await.unwrap()), vec!["1", "2"]);
}

#[tokio::test]
async fn filtered_dictionary_drops_deleted_records() {
    for (backend, channel) in backends("groups") {
        channel
            .create_many(vec![
                NewRecord::with_id("1").with("owner", "ann").with("kind", "a"),
                NewRecord::with_id("2").with("owner", "ann").with("kind", "b"),
            ])
            .await
            .unwrap();
        let dict = SynchronizedDictionary::new(Arc::clone(&channel), "owner")
            .with_filter(Filter::new().field("kind", "^a$"))
            .with_cache_update_interval(Duration::ZERO);
        assert_eq!(ids(&dict.get("ann").await.unwrap()), vec!["1"], "{backend}");

        channel
            .create(NewRecord::with_id("3").with("owner", "ann").with("kind", "a"))
            .await
            .unwrap();
        channel.remove("1").await.unwrap();
        assert_eq!(ids(&dict.get("ann").await.unwrap()), vec!["3"], "{backend}");
    }
}
