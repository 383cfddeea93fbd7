//! Scenario tests for ListSynchronizer.
//!
//! Each test records every snapshot a feed publishes (copied out, so later
//! publications cannot alter what was recorded) and checks the progression.

use std::sync::{Arc, Mutex};

use livelist_engine::{
    ChangeKind, Entity, EventRepository, Feed, IncludeFn, ListChange, ListSynchronizer,
    Repository, SnapshotChannel, Subscription, Values,
};

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: u32,
    label: &'static str,
}

impl Entity for Item {
    type Id = u32;

    fn id(&self) -> Option<&u32> {
        Some(&self.id)
    }
}

fn item(id: u32) -> Arc<Item> {
    Arc::new(Item { id, label: "" })
}

type Repo = EventRepository<Item>;
type List = ListSynchronizer<Item, Repo>;

fn setup() -> (Arc<Repo>, List) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let repository = EventRepository::new_shared();
    let list = ListSynchronizer::new(Arc::clone(&repository));
    (repository, list)
}

type Log = Arc<Mutex<Vec<Vec<Arc<Item>>>>>;

fn record(feed: &Feed<Item>) -> (Log, Subscription) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let sub = feed.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.to_vec()));
    (log, sub)
}

fn ids(log: &Log) -> Vec<Vec<u32>> {
    log.lock()
        .unwrap()
        .iter()
        .map(|s| s.iter().map(|e| e.id).collect())
        .collect()
}

// ============================================================================
// init
// ============================================================================

#[test]
fn init_returns_a_new_feed_each_time() {
    let (_repo, list) = setup();

    let first = list.init(&Values::<Item>::empty(), None);
    let second = list.init(&Values::empty(), None);

    assert!(!first.ptr_eq(&second));
    assert!(list.feed().unwrap().ptr_eq(&second));
}

#[test]
fn init_with_multi_shot_source_keeps_last_value() {
    let (_repo, list) = setup();

    let feed = list.init(
        &Values::new(vec![vec![item(1)], vec![item(2), item(3)]]),
        None,
    );
    let (log, _sub) = record(&feed);

    assert_eq!(ids(&log), vec![vec![2, 3]]);
}

// ============================================================================
// Insert
// ============================================================================

#[test]
fn insert_appends_and_publishes() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    let first = item(1);
    let second = item(2);
    repo.insert(Arc::clone(&first));
    repo.insert(Arc::clone(&second));

    assert_eq!(ids(&log), vec![vec![], vec![1], vec![1, 2]]);
    let last = log.lock().unwrap().last().cloned().unwrap();
    assert!(Arc::ptr_eq(&last[0], &first));
    assert!(Arc::ptr_eq(&last[1], &second));
}

#[test]
fn insert_rejected_by_predicate_is_not_published() {
    let (repo, list) = setup();
    let include: IncludeFn<Item> = Arc::new(|candidate: &Item| candidate.id == 2);
    let feed = list.init(&Values::once(vec![]), Some(include));
    let (log, _sub) = record(&feed);

    repo.insert(item(1));
    repo.insert(item(2));

    assert_eq!(ids(&log), vec![vec![], vec![2]]);
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn update_without_match_is_not_published() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    repo.update(item(1));

    assert_eq!(ids(&log), vec![Vec::<u32>::new()]);
}

#[test]
fn update_swaps_in_new_instance_by_identity() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    let original = item(1);
    repo.insert(Arc::clone(&original));
    let fresh = Arc::new(Item {
        id: 1,
        label: "edited",
    });
    repo.update(Arc::clone(&fresh));

    assert_eq!(ids(&log), vec![vec![], vec![1], vec![1]]);
    let last = log.lock().unwrap()[2].clone();
    assert!(!Arc::ptr_eq(&last[0], &original));
    assert!(Arc::ptr_eq(&last[0], &fresh));
    assert_eq!(last[0].label, "edited");
}

#[test]
fn update_hits_earliest_duplicate_only() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(7), item(8), item(7)]), None);

    let fresh = Arc::new(Item {
        id: 7,
        label: "first",
    });
    repo.update(Arc::clone(&fresh));

    let latest = feed.latest();
    assert!(Arc::ptr_eq(&latest[0], &fresh));
    assert_eq!(latest[2].label, "");
}

// ============================================================================
// Remove
// ============================================================================

#[test]
fn remove_of_unknown_instance_is_not_published() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1)]), None);
    let (log, _sub) = record(&feed);

    // Same id, different instance.
    repo.remove(item(1));

    assert_eq!(ids(&log), vec![vec![1]]);
}

#[test]
fn remove_deletes_instance_and_publishes() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    let entity = item(1);
    repo.insert(Arc::clone(&entity));
    repo.remove(entity);

    assert_eq!(ids(&log), vec![vec![], vec![1], vec![]]);
}

#[test]
fn remove_shifts_later_elements_left() {
    let (repo, list) = setup();
    let middle = item(2);
    let feed = list.init(
        &Values::once(vec![item(1), Arc::clone(&middle), item(3), item(4)]),
        None,
    );

    repo.remove(middle);

    assert_eq!(
        feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 3, 4]
    );
}

// ============================================================================
// Replace
// ============================================================================

#[test]
fn replace_of_unknown_instance_is_not_published() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    repo.replace(item(1), item(1));

    assert_eq!(ids(&log), vec![Vec::<u32>::new()]);
}

#[test]
fn replace_overwrites_in_place() {
    let (repo, list) = setup();
    let e1 = item(1);
    let e2 = item(2);
    let e3 = item(3);
    let e22 = item(22);

    let feed = list.init(
        &Values::once(vec![Arc::clone(&e1), Arc::clone(&e2), Arc::clone(&e3)]),
        None,
    );
    let (log, _sub) = record(&feed);

    repo.replace(e2, Arc::clone(&e22));

    assert_eq!(ids(&log), vec![vec![1, 2, 3], vec![1, 22, 3]]);
    assert!(Arc::ptr_eq(&log.lock().unwrap()[1][1], &e22));
}

// ============================================================================
// disconnect
// ============================================================================

#[test]
fn disconnect_detaches_from_repository() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    list.disconnect();

    let entity = item(1);
    repo.insert(Arc::clone(&entity));
    repo.update(Arc::clone(&entity));
    repo.remove(Arc::clone(&entity));
    repo.replace(entity, item(2));

    assert_eq!(ids(&log), vec![Vec::<u32>::new()]);
    assert_eq!(repo.listener_count(), 0);
    assert!(!list.is_connected());
}

#[test]
fn disconnect_keeps_feed_at_last_value() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1), item(2)]), None);

    list.disconnect();
    repo.insert(item(3));

    assert_eq!(list.len(), 0);
    assert_eq!(feed.latest().len(), 2);
}

#[test]
fn disconnect_stops_ongoing_snapshot_source() {
    let (_repo, list) = setup();
    let channel = SnapshotChannel::new();
    let feed = list.init(&channel, None);

    channel.send(vec![item(1)]);
    list.disconnect();
    channel.send(vec![item(2)]);

    assert_eq!(channel.subscriber_count(), 0);
    assert_eq!(feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn disconnect_from_feed_callback() {
    let (repo, list) = setup();
    let list = Arc::new(list);
    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    let _stopper = {
        let list = Arc::clone(&list);
        feed.subscribe(move |snapshot| {
            if snapshot.len() == 2 {
                list.disconnect();
                // Re-entrant teardown must tolerate a second call too.
                list.disconnect();
            }
        })
    };

    repo.insert(item(1));
    repo.insert(item(2));
    repo.insert(item(3));

    assert_eq!(ids(&log), vec![vec![], vec![1], vec![1, 2]]);
    assert!(!list.is_connected());
    assert_eq!(repo.listener_count(), 0);
}

#[test]
fn disconnect_during_in_flight_emission_drops_the_event() {
    let (repo, list) = setup();
    let list = Arc::new(list);

    // Registered before the list, so it runs first in the same emission.
    {
        let list = Arc::clone(&list);
        repo.on_inserted().on(move |_| list.disconnect());
    }

    let feed = list.init(&Values::once(vec![]), None);
    let (log, _sub) = record(&feed);

    repo.insert(item(1));

    assert_eq!(ids(&log), vec![Vec::<u32>::new()]);
}

// ============================================================================
// reload
// ============================================================================

#[test]
fn reload_replaces_everything() {
    let (_repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1), item(2)]), None);
    let (log, _sub) = record(&feed);

    assert_eq!(ids(&log), vec![vec![1, 2]]);

    list.reload(&Values::once(vec![item(3), item(4)]));

    assert_eq!(ids(&log), vec![vec![1, 2], vec![3, 4]]);
}

#[test]
fn reload_publishes_once_per_delivered_value() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1)]), None);
    repo.insert(item(2));
    let (log, _sub) = record(&feed);

    list.reload(&Values::new(vec![vec![item(5)], vec![item(6), item(7)]]));

    assert_eq!(ids(&log), vec![vec![1, 2], vec![5], vec![6, 7]]);
}

#[test]
fn events_after_reload_apply_to_new_list() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1)]), None);

    let e9 = item(9);
    list.reload(&Values::once(vec![Arc::clone(&e9)]));
    repo.insert(item(10));
    repo.remove(e9);

    assert_eq!(
        feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![10]
    );
}

#[test]
fn reload_unsubscribes_previous_source() {
    let (_repo, list) = setup();
    let old = SnapshotChannel::new();
    let new = SnapshotChannel::new();
    let feed = list.init(&old, None);

    list.reload(&new);
    old.send(vec![item(1)]);
    new.send(vec![item(2)]);

    assert_eq!(old.subscriber_count(), 0);
    assert_eq!(new.subscriber_count(), 1);
    assert_eq!(feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(), vec![2]);
}

// ============================================================================
// modify
// ============================================================================

#[test]
fn modify_maps_items() {
    let (_repo, list) = setup();
    let items = [item(1), item(2), item(3), item(4)];
    let feed = list.init(
        &Values::once(vec![Arc::clone(&items[0]), Arc::clone(&items[1])]),
        None,
    );
    let (log, _sub) = record(&feed);

    assert_eq!(ids(&log), vec![vec![1, 2]]);

    let lookup = items.clone();
    list.modify(move |current| current.map(move |e| Arc::clone(&lookup[e.id as usize + 1])));

    assert_eq!(ids(&log), vec![vec![1, 2], vec![3, 4]]);
    let last = log.lock().unwrap()[1].clone();
    assert!(Arc::ptr_eq(&last[0], &items[2]));
    assert!(Arc::ptr_eq(&last[1], &items[3]));
}

#[test]
fn modify_maps_each_id_to_its_successor() {
    let (_repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1), item(2)]), None);
    let (log, _sub) = record(&feed);

    list.modify(|current| current.map(|e| item(e.id + 1)));

    assert_eq!(ids(&log), vec![vec![1, 2], vec![2, 3]]);
}

#[test]
fn event_during_modify_is_applied_after_the_rewrite() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1), item(2)]), None);
    let (log, _sub) = record(&feed);
    let changes: Arc<Mutex<Vec<(ChangeKind, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = Arc::clone(&changes);
        list.on_change(move |change| changes.lock().unwrap().push((change.kind(), change.index())));
    }

    list.modify(|current| {
        repo.insert(item(99));
        current.collect::<Vec<_>>()
    });

    assert_eq!(ids(&log), vec![vec![1, 2], vec![1, 2], vec![1, 2, 99]]);
    assert_eq!(list.len(), 3);
    assert_eq!(*changes.lock().unwrap(), vec![(ChangeKind::Inserted, 2)]);
}

#[test]
fn snapshot_during_modify_wins_over_the_rewrite() {
    let (_repo, list) = setup();
    let channel = SnapshotChannel::new();
    let feed = list.init(&channel, None);
    channel.send(vec![item(1)]);

    list.modify(|current| {
        channel.send(vec![item(7), item(8)]);
        current.rev()
    });

    assert_eq!(feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(), vec![7, 8]);
}

#[test]
fn modify_can_filter_and_reorder() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1), item(2), item(3)]), None);

    list.modify(|current| current.filter(|e| e.id != 2).rev());
    repo.insert(item(4));

    assert_eq!(
        feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![3, 1, 4]
    );
}

// ============================================================================
// Snapshot sources
// ============================================================================

#[test]
fn ongoing_source_replaces_list_on_every_value() {
    let (repo, list) = setup();
    let channel = SnapshotChannel::new();
    let feed = list.init(&channel, None);
    let (log, _sub) = record(&feed);

    channel.send(vec![item(1)]);
    repo.insert(item(2));
    channel.send(vec![item(3)]);

    assert_eq!(ids(&log), vec![vec![], vec![1], vec![1, 2], vec![3]]);
}

#[test]
fn list_can_mirror_another_lists_feed() {
    let (upstream_repo, upstream) = setup();
    let (_repo, mirror) = setup();

    let upstream_feed = upstream.init(&Values::once(vec![item(1)]), None);
    let mirror_feed = mirror.init(&upstream_feed, None);

    upstream_repo.insert(item(2));

    assert_eq!(
        mirror_feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2]
    );

    mirror.disconnect();
    assert_eq!(upstream_feed.subscriber_count(), 0);
}

// ============================================================================
// Change notifications
// ============================================================================

#[test]
fn change_listeners_see_each_accepted_event() {
    let (repo, list) = setup();
    let changes: Arc<Mutex<Vec<(ChangeKind, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = Arc::clone(&changes);
        list.on_change(move |change: &ListChange<Item>| {
            changes.lock().unwrap().push((change.kind(), change.index()));
        });
    }

    let a = item(1);
    let b = item(2);
    list.init(&Values::once(vec![Arc::clone(&a), Arc::clone(&b)]), None);

    repo.insert(item(3));
    repo.update(item(2));
    repo.remove(a);
    repo.replace(b, item(4));
    repo.update(item(99));

    assert_eq!(
        *changes.lock().unwrap(),
        vec![
            (ChangeKind::Inserted, 2),
            (ChangeKind::Updated, 1),
            (ChangeKind::Removed, 0),
        ]
    );
}

#[test]
fn changes_arrive_in_commit_order_under_nested_publish() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![]), None);
    let changes: Arc<Mutex<Vec<(usize, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = Arc::clone(&changes);
        list.on_change(move |change| {
            let id = change.current().map_or(0, |e| e.id);
            changes.lock().unwrap().push((change.index(), id));
        });
    }

    let _chain = {
        let repo = Arc::clone(&repo);
        feed.subscribe(move |snapshot| {
            if snapshot.len() == 1 {
                repo.insert(item(2));
            }
        })
    };

    repo.insert(item(1));

    assert_eq!(*changes.lock().unwrap(), vec![(0, 1), (1, 2)]);
    assert_eq!(feed.latest().iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn change_for_update_carries_previous_instance() {
    let (repo, list) = setup();
    let seen: Arc<Mutex<Option<ListChange<Item>>>> = Arc::new(Mutex::new(None));
    {
        let seen = Arc::clone(&seen);
        list.on_change(move |change| *seen.lock().unwrap() = Some(change.clone()));
    }

    let original = item(5);
    list.init(&Values::once(vec![Arc::clone(&original)]), None);
    let fresh = item(5);
    repo.update(Arc::clone(&fresh));

    match seen.lock().unwrap().take() {
        Some(ListChange::Updated {
            index,
            previous,
            entity,
        }) => {
            assert_eq!(index, 0);
            assert!(Arc::ptr_eq(&previous, &original));
            assert!(Arc::ptr_eq(&entity, &fresh));
        }
        other => panic!("expected update, got {other:?}"),
    };
}

// ============================================================================
// Entities without identity
// ============================================================================

#[derive(Debug)]
struct Draft {
    id: Option<u32>,
    text: &'static str,
}

impl Entity for Draft {
    type Id = u32;

    fn id(&self) -> Option<&u32> {
        self.id.as_ref()
    }
}

#[test]
fn update_without_identity_targets_first_element_without_identity() {
    let repo = EventRepository::<Draft>::new_shared();
    let list = ListSynchronizer::new(Arc::clone(&repo));
    let feed = list.init(
        &Values::once(vec![
            Arc::new(Draft {
                id: Some(1),
                text: "saved",
            }),
            Arc::new(Draft {
                id: None,
                text: "a",
            }),
            Arc::new(Draft {
                id: None,
                text: "b",
            }),
        ]),
        None,
    );

    repo.update(Arc::new(Draft {
        id: None,
        text: "a2",
    }));

    let texts: Vec<_> = feed.latest().iter().map(|d| d.text).collect();
    assert_eq!(texts, vec!["saved", "a2", "b"]);
}

// ============================================================================
// Async consumers
// ============================================================================

#[tokio::test]
async fn watch_receiver_wakes_on_change() {
    let (repo, list) = setup();
    let feed = list.init(&Values::once(vec![item(1)]), None);
    let mut rx = feed.watch();

    assert_eq!(rx.borrow().len(), 1);

    repo.insert(item(2));
    rx.changed().await.unwrap();

    assert_eq!(
        rx.borrow_and_update().iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2]
    );
}
