use proptest::prelude::*;
use syncstore::channel::{Channel, Filter, MemoryChannel, QueryOptions, SortDirection};
use syncstore::error::StorageError;
use syncstore::types::{NewRecord, Record, UpdateKind, Version};

use crate::support::backends;

#[tokio::test]
async fn create_assigns_id_and_read_returns_equal_record() {
    for (backend, channel) in backends("contract") {
        let created = channel
            .create(NewRecord::new().with("field", "abc").with("n", 3))
            .await
            .unwrap();
        assert!(!created.id.is_empty(), "{backend}: id should be generated");
        let read = channel.read(&created.id).await.unwrap();
        assert_eq!(read, created, "{backend}");
    }
}

#[tokio::test]
async fn duplicate_create_leaves_channel_unchanged() {
    for (backend, channel) in backends("contract") {
        channel
            .create(NewRecord::with_id("a").with("v", 1))
            .await
            .unwrap();
        let err = channel
            .create(NewRecord::with_id("a").with("v", 2))
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "{backend}: {err}");
        assert_eq!(channel.get_version().await.unwrap(), Version(1), "{backend}");
        let stored = channel.read("a").await.unwrap();
        assert_eq!(stored.get("v"), Some(&1.into()), "{backend}");
    }
}

#[tokio::test]
async fn missing_ids_fail_without_touching_the_log() {
    for (backend, channel) in backends("contract") {
        assert!(channel.read("x").await.unwrap_err().is_not_found(), "{backend}");
        assert!(channel
            .update(Record::new("x").with("v", 1))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(channel.remove("x").await.unwrap_err().is_not_found());
        assert_eq!(channel.get_version().await.unwrap(), Version(0), "{backend}");
    }
}

#[tokio::test]
async fn update_merges_fields() {
    for (backend, channel) in backends("contract") {
        channel
            .create(NewRecord::with_id("a").with("keep", "x").with("n", 1))
            .await
            .unwrap();
        let merged = channel
            .update(Record::new("a").with("n", 2))
            .await
            .unwrap();
        assert_eq!(merged.get_str("keep"), Some("x"), "{backend}");
        assert_eq!(channel.read("a").await.unwrap(), merged, "{backend}");
    }
}

#[tokio::test]
async fn change_feed_replays_mutations_in_order() {
    for (backend, channel) in backends("contract") {
        let v0 = channel.get_version().await.unwrap();
        channel.create(NewRecord::with_id("a")).await.unwrap();
        channel.create(NewRecord::with_id("b")).await.unwrap();
        channel
            .update(Record::new("a").with("v", 1))
            .await
            .unwrap();
        channel.remove("b").await.unwrap();

        let updates = channel.get_updates(Some(v0), None, None).await.unwrap();
        let seen: Vec<(UpdateKind, &str)> =
            updates.iter().map(|u| (u.kind, u.id.as_str())).collect();
        assert_eq!(
            seen,
            vec![
                (UpdateKind::Created, "a"),
                (UpdateKind::Created, "b"),
                (UpdateKind::Changed, "a"),
                (UpdateKind::Deleted, "b"),
            ],
            "{backend}"
        );
        assert!(updates.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(
            updates.last().map(|u| u.version),
            Some(channel.get_version().await.unwrap())
        );

        let all = channel.get_updates(None, None, None).await.unwrap();
        assert_eq!(all, updates, "{backend}");
    }
}

#[tokio::test]
async fn regex_and_numeric_filters() {
    for (backend, channel) in backends("contract") {
        channel
            .create_many(vec![
                NewRecord::with_id("1").with("field", "abc"),
                NewRecord::with_id("2").with("field", "def"),
                NewRecord::with_id("3").with("field", 20),
                NewRecord::with_id("4").with("field", "20"),
            ])
            .await
            .unwrap();

        let regex = Filter::new().field("field", "a.c");
        assert_eq!(channel.get_ids(Some(&regex), None).await.unwrap(), vec!["1"], "{backend}");

        let numeric = Filter::new().field("field", 20);
        assert_eq!(channel.get_ids(Some(&numeric), None).await.unwrap(), vec!["3"], "{backend}");

        let invalid = Filter::new().field("field", "[");
        assert!(matches!(
            channel.get_ids(Some(&invalid), None).await,
            Err(StorageError::InvalidFilter { .. })
        ));
    }
}

#[tokio::test]
async fn pagination_follows_order_direction() {
    for (backend, channel) in backends("contract") {
        channel
            .create(NewRecord::with_id("x").with("field", "b"))
            .await
            .unwrap();
        channel
            .create(NewRecord::with_id("y").with("field", "a"))
            .await
            .unwrap();

        let first = QueryOptions::new()
            .order_by("field", SortDirection::from_sign(1))
            .from(0)
            .count(1);
        assert_eq!(channel.get_ids(None, Some(&first)).await.unwrap(), vec!["y"], "{backend}");

        let reversed = QueryOptions::new()
            .order_by("field", SortDirection::from_sign(-1))
            .from(0)
            .count(1);
        assert_eq!(channel.get_ids(None, Some(&reversed)).await.unwrap(), vec!["x"], "{backend}");
    }
}

#[tokio::test]
async fn filtered_feed_keeps_deletions() {
    for (backend, channel) in backends("contract") {
        let tracked = Filter::new().field("kind", "^a$");
        channel
            .create(NewRecord::with_id("1").with("kind", "a"))
            .await
            .unwrap();
        channel
            .create(NewRecord::with_id("2").with("kind", "b"))
            .await
            .unwrap();
        let checkpoint = channel.get_version().await.unwrap();

        channel
            .update(Record::new("1").with("n", 1))
            .await
            .unwrap();
        channel
            .update(Record::new("2").with("n", 1))
            .await
            .unwrap();
        channel.remove("1").await.unwrap();

        let updates = channel
            .get_updates(Some(checkpoint), Some(&tracked), None)
            .await
            .unwrap();
        // the change to "1" is gone with the record; its deletion is not
        let seen: Vec<(UpdateKind, &str)> =
            updates.iter().map(|u| (u.kind, u.id.as_str())).collect();
        assert_eq!(seen, vec![(UpdateKind::Deleted, "1")], "{backend}");
    }
}

#[tokio::test]
async fn create_many_stops_at_first_collision() {
    for (backend, channel) in backends("contract") {
        let err = channel
            .create_many(vec![
                NewRecord::with_id("a"),
                NewRecord::with_id("a"),
                NewRecord::with_id("b"),
            ])
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "{backend}");
        assert_eq!(channel.get_ids(None, None).await.unwrap(), vec!["a"], "{backend}");
    }
}

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Update(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6).prop_map(Op::Create),
        (0u8..6).prop_map(Op::Update),
        (0u8..6).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn version_counts_successful_mutations(ops in proptest::collection::vec(op(), 0..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let channel = MemoryChannel::new("prop");
            let mut applied = Vec::new();
            let mut last = channel.get_version().await.unwrap();
            for op in &ops {
                let outcome = match op {
                    Op::Create(id) => channel.create(NewRecord::with_id(id.to_string())).await.map(|_| ()),
                    Op::Update(id) => channel.update(Record::new(id.to_string()).with("v", 1)).await.map(|_| ()),
                    Op::Remove(id) => channel.remove(&id.to_string()).await,
                };
                let version = channel.get_version().await.unwrap();
                match outcome {
                    Ok(()) => {
                        prop_assert!(version > last);
                        applied.push(op.clone());
                    }
                    Err(_) => prop_assert_eq!(version, last),
                }
                last = version;
            }
            let updates = channel.get_updates(None, None, None).await.unwrap();
            prop_assert_eq!(updates.len(), applied.len());
            for (update, op) in updates.iter().zip(&applied) {
                let (kind, id) = match op {
                    Op::Create(id) => (UpdateKind::Created, id),
                    Op::Update(id) => (UpdateKind::Changed, id),
                    Op::Remove(id) => (UpdateKind::Deleted, id),
                };
                prop_assert_eq!(update.kind, kind);
                prop_assert_eq!(&update.id, &id.to_string());
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn unordered_enumeration_follows_creation_order() {
    for (backend, channel) in backends("contract") {
        let mut created = Vec::new();
        for i in 0..100 {
            let mut record = NewRecord::new().with("parity", i % 2);
            if i % 10 == 0 {
                // explicit ids sorting before and after generated ones
                let prefix = if i % 20 == 0 { "0" } else { "~" };
                record.id = Some(format!("{}-{}", prefix, i));
            }
            created.push(channel.create(record).await.unwrap().id);
        }
        let dropped = created.remove(42);
        channel.remove(&dropped).await.unwrap();

        assert_eq!(channel.get_ids(None, None).await.unwrap(), created, "{backend}");
        let read: Vec<_> = channel
            .read_many(None)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(read, created, "{backend}");

        let evens: Vec<_> = created
            .iter()
            .enumerate()
            .filter(|(position, _)| (if *position < 42 { *position } else { position + 1 }) % 2 == 0)
            .map(|(_, id)| id.clone())
            .collect();
        let filtered = channel
            .get_ids(Some(&Filter::new().field("parity", 0)), None)
            .await
            .unwrap();
        assert_eq!(filtered, evens, "{backend}");
    }
}
