use std::sync::Arc;
use std::time::Duration;
use syncstore::access::{NodeAccess, NodeAccessValidator, UserGroupMembership};
use syncstore::channel::Channel;
use syncstore::sync::tree::PARENT_FIELD;
use syncstore::sync::{SynchronizedDictionary, SynchronizedTree};
use syncstore::types::NewRecord;

use crate::support::{backends, FlakyChannel};

struct Fixture {
    nodes: Arc<dyn Channel>,
    acl: Arc<dyn Channel>,
    memberships: Arc<dyn Channel>,
    validator: NodeAccessValidator,
}

fn validator_over(
    nodes: &Arc<dyn Channel>,
    acl: &Arc<dyn Channel>,
    memberships: &Arc<dyn Channel>,
) -> NodeAccessValidator {
    let tree = SynchronizedTree::new(Arc::clone(nodes)).with_cache_update_interval(Duration::ZERO);
    let node_access = SynchronizedDictionary::new(Arc::clone(acl), "nodeId")
        .with_cache_update_interval(Duration::ZERO);
    let user_groups = SynchronizedDictionary::new(Arc::clone(memberships), "userId")
        .with_cache_update_interval(Duration::ZERO);
    NodeAccessValidator::new(Arc::new(tree), Arc::new(node_access), Arc::new(user_groups))
}

fn fixtures() -> Vec<(&'static str, Fixture)> {
    let nodes = backends("_nodes");
    let acl = backends("_node_access");
    let memberships = backends("_user_groups");
    nodes
        .into_iter()
        .zip(acl)
        .zip(memberships)
        .map(|(((backend, nodes), (_, acl)), (_, memberships))| {
            let validator = validator_over(&nodes, &acl, &memberships);
            (
                backend,
                Fixture {
                    nodes,
                    acl,
                    memberships,
                    validator,
                },
            )
        })
        .collect()
}

async fn seed(fixture: &Fixture) {
    fixture
        .nodes
        .create_many(vec![
            NewRecord::with_id("root").with(PARENT_FIELD, None::<&str>),
            NewRecord::with_id("node1").with(PARENT_FIELD, "root"),
            NewRecord::with_id("node2").with(PARENT_FIELD, "node1"),
        ])
        .await
        .unwrap();
    fixture
        .acl
        .create_many(vec![
            NodeAccess::everyone("root", "right1", true).to_new_record(),
            NodeAccess::for_group("node1", "group1", "right2", true).to_new_record(),
            NodeAccess::for_user("node2", "user2", "right1", false).to_new_record(),
        ])
        .await
        .unwrap();
    fixture
        .memberships
        .create_many(vec![
            UserGroupMembership::new("user1", "group1").to_new_record(),
            UserGroupMembership::new("user2", "group1").to_new_record(),
        ])
        .await
        .unwrap();
}

#[tokio::test]
async fn rights_overlay_along_the_path() {
    for (backend, fixture) in fixtures() {
        seed(&fixture).await;
        let validator = &fixture.validator;

        assert_eq!(
            validator.effective_rights(None, Some("node2")).await.unwrap(),
            vec!["right1"],
            "{backend}: anonymous"
        );
        assert_eq!(
            validator
                .effective_rights(Some("user1"), Some("node2"))
                .await
                .unwrap(),
            vec!["right1", "right2"],
            "{backend}: group member"
        );
        assert_eq!(
            validator
                .effective_rights(Some("user2"), Some("node2"))
                .await
                .unwrap(),
            vec!["right2"],
            "{backend}: denied at node2"
        );
        assert_eq!(
            validator
                .effective_rights(Some("user2"), Some("node1"))
                .await
                .unwrap(),
            vec!["right1", "right2"],
            "{backend}: denial does not reach ancestors"
        );
        assert_eq!(
            validator.effective_rights(Some("user2"), None).await.unwrap(),
            vec!["right1"],
            "{backend}: root"
        );
    }
}

#[tokio::test]
async fn unknown_node_grants_nothing() {
    for (backend, fixture) in fixtures() {
        seed(&fixture).await;
        let rights = fixture
            .validator
            .effective_rights(Some("user1"), Some("nowhere"))
            .await
            .unwrap();
        assert!(rights.is_empty(), "{backend}");
    }
}

#[tokio::test]
async fn new_acl_entries_take_effect_on_refresh() {
    for (backend, fixture) in fixtures() {
        seed(&fixture).await;
        fixture
            .acl
            .create(NodeAccess::for_user("node2", "user3", "right3", true).to_new_record())
            .await
            .unwrap();
        let resolved = fixture
            .validator
            .resolve(Some("user3"), Some("node2"))
            .await
            .unwrap();
        assert_eq!(resolved.get("right3"), Some(&true), "{backend}");
        assert_eq!(resolved.get("right1"), Some(&true), "{backend}");
        assert!(resolved.get("right2").is_none(), "{backend}");
    }
}

#[tokio::test]
async fn fresh_validator_agrees_with_live_one() {
    for (backend, fixture) in fixtures() {
        seed(&fixture).await;
        let live = &fixture.validator;
        live.effective_rights(Some("user1"), Some("node2")).await.unwrap();

        // conflicting entries at one node with generated ids; the later one wins
        for round in 0..20 {
            let allow = round % 2 == 1;
            fixture
                .acl
                .create(NodeAccess::everyone("node1", "right9", allow).to_new_record())
                .await
                .unwrap();
            fixture
                .acl
                .create(NodeAccess::for_group("node1", "group1", "right8", !allow).to_new_record())
                .await
                .unwrap();

            let fresh = validator_over(&fixture.nodes, &fixture.acl, &fixture.memberships);
            for user in [None, Some("user1"), Some("user2")] {
                let live_rights = live.resolve(user, Some("node2")).await.unwrap();
                let fresh_rights = fresh.resolve(user, Some("node2")).await.unwrap();
                assert_eq!(live_rights, fresh_rights, "{backend}: round {round}, {user:?}");
                assert_eq!(live_rights.get("right9"), Some(&allow), "{backend}: round {round}");
            }
        }
    }
}

#[tokio::test]
async fn one_acl_refresh_per_resolution() {
    for (backend, fixture) in fixtures() {
        seed(&fixture).await;
        let acl = Arc::new(FlakyChannel::new(Arc::clone(&fixture.acl)));
        let acl_channel: Arc<dyn Channel> = acl.clone();
        let validator = validator_over(&fixture.nodes, &acl_channel, &fixture.memberships);
        validator.resolve(Some("user1"), Some("node2")).await.unwrap();

        fixture
            .acl
            .create(NodeAccess::everyone("node2", "right4", true).to_new_record())
            .await
            .unwrap();
        let before = acl.feed_reads();
        let resolved = validator.resolve(Some("user1"), Some("node2")).await.unwrap();
        assert_eq!(acl.feed_reads() - before, 1, "{backend}");
        assert_eq!(resolved.get("right4"), Some(&true), "{backend}");
    }
}
