use propfold_core::db::open_db;
use propfold_core::{
    tenant_db_path, AggregationService, EngineConfig, EntityId, EntityRepository, FactRepository,
    FactValue, InMemoryTriggerQueue, IntakeMessage, MessageOutcome, NewFact,
    SqliteEntityRepository, SqliteFactRepository, TriggerMessage,
};
use rusqlite::Connection;
use tempfile::TempDir;
use uuid::Uuid;

const ACCOUNT: &str = "acme";

fn service(dir: &TempDir) -> AggregationService<InMemoryTriggerQueue> {
    AggregationService::new(EngineConfig::new(dir.path()), InMemoryTriggerQueue::new())
}

fn tenant(dir: &TempDir) -> Connection {
    open_db(tenant_db_path(dir.path(), ACCOUNT)).unwrap()
}

fn add_fact(conn: &Connection, fact: NewFact) -> i64 {
    SqliteFactRepository::new(conn).create_fact(&fact).unwrap()
}

fn aggregate(
    service: &mut AggregationService<InMemoryTriggerQueue>,
    entity: EntityId,
) -> MessageOutcome {
    service.process_message(&IntakeMessage::Aggregate(TriggerMessage::new(
        ACCOUNT, entity,
    )))
}

/// Feeds enqueued triggers back into the engine until the queue drains.
fn run_to_quiescence(service: &mut AggregationService<InMemoryTriggerQueue>) -> usize {
    let mut hops = 0;
    loop {
        let pending = service.queue_mut().drain();
        if pending.is_empty() {
            return hops;
        }
        hops += 1;
        assert!(hops < 16, "propagation should converge");
        for trigger in pending {
            service.process_message(&IntakeMessage::Aggregate(trigger));
        }
    }
}

#[test]
fn name_change_enqueues_one_trigger_per_referrer() {
    let dir = TempDir::new().unwrap();
    let conn = tenant(&dir);
    let mut service = service(&dir);

    let target = Uuid::new_v4();
    let referrer_a = Uuid::new_v4();
    let referrer_b = Uuid::new_v4();
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("old".into())));
    add_fact(&conn, NewFact::new(referrer_a, "friend", FactValue::Reference(target)));
    add_fact(&conn, NewFact::new(referrer_b, "friend", FactValue::Reference(target)));

    let outcome = aggregate(&mut service, target);
    assert_eq!(outcome, MessageOutcome::Applied { triggers_enqueued: 2 });

    let pending = service.queue_mut().drain();
    let mut entities: Vec<EntityId> = pending.iter().map(|t| t.entity).collect();
    entities.sort();
    let mut expected = vec![referrer_a, referrer_b];
    expected.sort();
    assert_eq!(entities, expected);
    for trigger in &pending {
        assert_eq!(trigger.account, ACCOUNT);
        assert!(trigger.dt.is_some());
    }
}

#[test]
fn unchanged_name_enqueues_nothing() {
    let dir = TempDir::new().unwrap();
    let conn = tenant(&dir);
    let mut service = service(&dir);

    let target = Uuid::new_v4();
    let referrer = Uuid::new_v4();
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("same".into())));
    add_fact(&conn, NewFact::new(referrer, "friend", FactValue::Reference(target)));

    aggregate(&mut service, target);
    service.queue_mut().drain();

    // Names unchanged; a non-name fact change folds but stays silent.
    add_fact(&conn, NewFact::new(target, "note", FactValue::String("extra".into())));
    assert_eq!(
        aggregate(&mut service, target),
        MessageOutcome::Applied { triggers_enqueued: 0 }
    );
    assert!(service.queue_mut().pending().is_empty());
}

#[test]
fn reordered_duplicate_names_do_not_propagate() {
    let dir = TempDir::new().unwrap();
    let conn = tenant(&dir);
    let mut service = service(&dir);

    let target = Uuid::new_v4();
    let referrer = Uuid::new_v4();
    let a = add_fact(&conn, NewFact::new(target, "name", FactValue::String("a".into())));
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("b".into())));
    add_fact(&conn, NewFact::new(referrer, "friend", FactValue::Reference(target)));

    aggregate(&mut service, target);
    service.queue_mut().drain();

    // Re-append "a" after "b": same multiset, different order.
    SqliteFactRepository::new(&conn).soft_delete_fact(a).unwrap();
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("a".into())));

    assert_eq!(
        aggregate(&mut service, target),
        MessageOutcome::Applied { triggers_enqueued: 0 }
    );
}

#[test]
fn duplicate_reference_facts_yield_a_single_trigger() {
    let dir = TempDir::new().unwrap();
    let conn = tenant(&dir);
    let mut service = service(&dir);

    let target = Uuid::new_v4();
    let referrer = Uuid::new_v4();
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("x".into())));
    add_fact(&conn, NewFact::new(referrer, "friend", FactValue::Reference(target)));
    add_fact(&conn, NewFact::new(referrer, "colleague", FactValue::Reference(target)));

    assert_eq!(
        aggregate(&mut service, target),
        MessageOutcome::Applied { triggers_enqueued: 1 }
    );
}

#[test]
fn propagation_refreshes_denormalized_names_across_hops() {
    let dir = TempDir::new().unwrap();
    let conn = tenant(&dir);
    let mut service = service(&dir);

    // middle's name is a reference to target; leaf refers to middle.
    let target = Uuid::new_v4();
    let middle = Uuid::new_v4();
    let leaf = Uuid::new_v4();
    let first = add_fact(&conn, NewFact::new(target, "name", FactValue::String("v1".into())));
    add_fact(&conn, NewFact::new(middle, "name", FactValue::Reference(target)));
    add_fact(&conn, NewFact::new(leaf, "friend", FactValue::Reference(middle)));

    aggregate(&mut service, target);
    run_to_quiescence(&mut service);

    let entities = SqliteEntityRepository::new(&conn);
    let middle_snapshot = entities.load_snapshot(middle).unwrap().unwrap();
    assert_eq!(
        middle_snapshot.private["name"][0].string.as_deref(),
        Some("v1")
    );

    // Rename the target; the new name must reach middle and leaf.
    SqliteFactRepository::new(&conn).soft_delete_fact(first).unwrap();
    add_fact(&conn, NewFact::new(target, "name", FactValue::String("v2".into())));

    assert_eq!(
        aggregate(&mut service, target),
        MessageOutcome::Applied { triggers_enqueued: 1 }
    );
    let hops = run_to_quiescence(&mut service);
    assert!(hops >= 2, "rename should cascade through middle to leaf");

    let middle_snapshot = entities.load_snapshot(middle).unwrap().unwrap();
    assert_eq!(
        middle_snapshot.private["name"][0].string.as_deref(),
        Some("v2")
    );
    let leaf_snapshot = entities.load_snapshot(leaf).unwrap().unwrap();
    assert_eq!(
        leaf_snapshot.private["friend"][0].string.as_deref(),
        Some("v2")
    );
}
