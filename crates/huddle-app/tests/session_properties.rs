//! Property-based tests for subscriptions, presence and command parsing.
//!
//! Properties checked under arbitrary inputs:
//! - Repeated joins leave the user present exactly once
//! - Leaving removes the user whatever came before
//! - Online and offline friends partition the friend set exactly
//! - Lines without exactly one delimiter are always chat

use std::{collections::BTreeSet, sync::Arc};

use futures::executor::block_on;
use huddle_app::{
    ChannelIndex, ChannelRegistry, Command, PresenceQuery, PresenceStore, SessionContext,
    SubscriptionManager,
    memory::{MemoryBroker, MemoryStore, MemoryTransport},
    parse,
};
use proptest::prelude::*;

fn manager(store: &MemoryStore) -> SubscriptionManager<MemoryStore, MemoryTransport> {
    let (transport, _inbox) = MemoryBroker::new().connect();
    SubscriptionManager::new(Arc::new(store.clone()), Arc::new(transport))
}

fn channel(registry: &ChannelRegistry, slot: usize) -> ChannelIndex {
    registry.iter().nth(slot % registry.len()).map(|(index, _)| index).expect("non-empty registry")
}

fn user_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

proptest! {
    #[test]
    fn prop_repeated_join_is_present_once(slot in 0usize..5, joins in 1usize..6) {
        let store = MemoryStore::new();
        let manager = manager(&store);
        let registry = Arc::new(ChannelRegistry::default());
        let index = channel(&registry, slot);
        let mut ctx = SessionContext::new("alice", Arc::clone(&registry));
        let query = PresenceQuery::new(Arc::new(store));

        let users = block_on(async {
            for _ in 0..joins {
                manager.join(&mut ctx, index).await.expect("join");
            }
            query.users_on(&ctx, index).await.expect("users")
        });

        prop_assert_eq!(users.iter().filter(|u| *u == "alice").count(), 1);
        prop_assert!(ctx.is_subscribed(index));
    }

    #[test]
    fn prop_leave_removes_user(
        ops in prop::collection::vec((any::<bool>(), 0usize..5), 0..20),
        slot in 0usize..5,
    ) {
        let store = MemoryStore::new();
        let manager = manager(&store);
        let registry = Arc::new(ChannelRegistry::default());
        let index = channel(&registry, slot);
        let mut ctx = SessionContext::new("alice", Arc::clone(&registry));
        let query = PresenceQuery::new(Arc::new(store));

        let users = block_on(async {
            for (join, s) in ops {
                let i = channel(&registry, s);
                if join {
                    manager.join(&mut ctx, i).await.expect("join");
                } else {
                    manager.leave(&mut ctx, i).await.expect("leave");
                }
            }
            manager.leave(&mut ctx, index).await.expect("leave");
            query.users_on(&ctx, index).await.expect("users")
        });

        prop_assert!(!users.contains(&"alice".to_string()));
        prop_assert!(!ctx.is_subscribed(index));
    }

    #[test]
    fn prop_online_offline_partitions_friends(
        friends in prop::collection::btree_set(user_strategy(), 0..8),
        present in prop::collection::vec((user_strategy(), 0usize..5), 0..12),
    ) {
        let store = MemoryStore::new();
        let registry = Arc::new(ChannelRegistry::default());
        let ctx = SessionContext::new("alice", Arc::clone(&registry));
        let query = PresenceQuery::new(Arc::new(store.clone()));

        let partition = block_on(async {
            for friend in &friends {
                query.add_friend(&ctx, friend).await.expect("add friend");
            }
            for (user, slot) in &present {
                let name = registry.name(channel(&registry, *slot));
                store.add_member(&format!("presence:{name}"), user).await.expect("add");
            }
            query.online_offline(&ctx).await.expect("query")
        });

        let online: BTreeSet<String> = partition.online.iter().cloned().collect();
        let offline: BTreeSet<String> = partition.offline.iter().cloned().collect();
        let anywhere: BTreeSet<String> = present
            .iter()
            .map(|(user, _)| user.clone())
            .filter(|user| user != "alice")
            .collect();

        prop_assert!(online.is_disjoint(&offline));
        prop_assert_eq!(online.union(&offline).cloned().collect::<BTreeSet<_>>(), friends.clone());
        prop_assert_eq!(online, friends.intersection(&anywhere).cloned().collect::<BTreeSet<_>>());
        prop_assert!(store.keys().iter().all(|k| !k.starts_with("scratch:")));
    }

    #[test]
    fn prop_non_command_lines_are_chat(line in "[a-z ]{0,12}(:[a-z ]{0,6}){2,4}|[a-z ]{0,20}") {
        prop_assert_eq!(parse(&line), Command::Chat { text: &line });
    }
}
