//! End-to-end tests for identity reconciliation: local SID remapping and
//! SID collision findings.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use secgraph::{
    remap_sid, AttributeValue, CollectedBatch, CollectedObject, Direction, EdgeBitmap, Engine,
    EngineConfig, PathRequest, Selector, Sid,
};

fn sid(s: &str) -> Sid {
    s.parse().unwrap()
}

/// A local collection run on one machine: the machine itself, its local
/// Administrator, and an AdminRights edge from that account to the
/// machine.
fn local_batch(host: &str, global: &str, local: &str) -> CollectedBatch {
    let admin = format!("{local}-500");
    CollectedBatch::new(format!("localmachine:{host}"))
        .with_object(
            CollectedObject::new()
                .with_sid(sid(global))
                .with("name", host)
                .with("localMachineSID", sid(local)),
        )
        .with_object(
            CollectedObject::new()
                .with_sid(sid(&admin))
                .with("name", format!("{host}\\Administrator"))
                .edge("AdminRights", global),
        )
}

// ============================================================================
// 1. Remap
// ============================================================================

#[test]
fn test_remap_examples() {
    let p = sid("S-1-5-21-100");
    let q = sid("S-1-5-21-200");
    assert_eq!(remap_sid(&p, &q, &sid("S-1-5-21-100-1001")), sid("S-1-5-21-200-1001"));
    assert_eq!(remap_sid(&p, &q, &sid("S-1-5-21-300-1001")), sid("S-1-5-21-300-1001"));
    assert_eq!(remap_sid(&p, &q, &sid("S-1-5-21-100-1001-7")), sid("S-1-5-21-100-1001-7"));
}

proptest! {
    #[test]
    fn prop_remap_translates_exactly_one_level(
        prefix in prop::collection::vec(any::<u32>(), 1..6),
        other in prop::collection::vec(any::<u32>(), 1..6),
        new in prop::collection::vec(any::<u32>(), 1..6),
        rid in any::<u32>(),
    ) {
        let p = Sid::new(1, 5, &prefix);
        let q = Sid::new(1, 5, &new);

        let local = p.add_component(rid);
        prop_assert_eq!(remap_sid(&p, &q, &local), q.add_component(rid));

        let foreign = Sid::new(1, 5, &other).add_component(rid);
        if other != prefix {
            prop_assert_eq!(remap_sid(&p, &q, &foreign), foreign.clone());
        }
        prop_assert_eq!(remap_sid(&p, &q, &p), p.clone());
        prop_assert_eq!(remap_sid(&p, &q, &local.add_component(rid)), local.add_component(rid));
    }
}

// ============================================================================
// 2. Local batches land in the global namespace
// ============================================================================

#[test]
fn test_local_accounts_are_remapped_under_machine_sid() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let report = engine
        .import_batch(local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"))
        .unwrap();
    assert_eq!(report.remapped, 1);

    let objects = engine.snapshot();
    let admin = objects.find_sid(&sid("S-1-5-21-9-9-9-1105-500")).unwrap();
    let machine = objects.find_sid(&sid("S-1-5-21-9-9-9-1105")).unwrap();
    assert!(objects.find_sid(&sid("S-1-5-21-5-5-5-500")).is_none());
    assert!(!objects.get(admin).unwrap().edge_to(machine).is_empty());

    let original = objects.registry().attributes.lookup("localMachineSIDOriginal").unwrap();
    assert_eq!(
        objects.get(machine).unwrap().first(original),
        Some(&AttributeValue::Sid(sid("S-1-5-21-5-5-5")))
    );
}

#[test]
fn test_directory_and_local_views_merge() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine
        .import_batch(
            CollectedBatch::new("directory").with_object(
                CollectedObject::new()
                    .with_sid(sid("S-1-5-21-9-9-9-1105"))
                    .with("distinguishedName", "CN=WS01,OU=Workstations,DC=corp"),
            ),
        )
        .unwrap();
    engine
        .import_batch(local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"))
        .unwrap();

    let objects = engine.snapshot();
    assert_eq!(objects.len(), 2);
    let outcome = engine
        .find_paths(&PathRequest::new(
            Selector::sid(sid("S-1-5-21-9-9-9-1105-500")),
            Selector::identifier("CN=WS01,OU=Workstations,DC=corp"),
        ))
        .unwrap();
    assert_eq!(outcome.paths.len(), 1);
}

#[test]
fn test_remap_is_idempotent() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let batch = local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5");
    engine.import_batch(batch.clone()).unwrap();
    let first = engine.snapshot();
    let report = engine.import_batch(batch).unwrap();
    let second = engine.snapshot();
    assert_eq!(report.remapped, 1);
    assert_eq!(first.len(), second.len());
    assert_eq!(first.edge_count(), second.edge_count());
}

#[test]
fn test_machine_without_global_sid_keeps_local_identifiers() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let batch = CollectedBatch::new("localmachine:standalone")
        .with_object(CollectedObject::new().with("name", "STANDALONE").with("localMachineSID", sid("S-1-5-21-5-5-5")))
        .with_object(CollectedObject::new().with_sid(sid("S-1-5-21-5-5-5-500")));
    let report = engine.import_batch(batch).unwrap();
    assert_eq!(report.remapped, 0);
    assert!(engine.snapshot().find_sid(&sid("S-1-5-21-5-5-5-500")).is_some());
}

// ============================================================================
// 3. Collisions
// ============================================================================

#[test]
fn test_cloned_machines_get_collision_edges() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let report = engine
        .import_batches([
            local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"),
            local_batch("WS02", "S-1-5-21-9-9-9-1106", "S-1-5-21-5-5-5"),
            local_batch("WS03", "S-1-5-21-9-9-9-1107", "S-1-5-21-7-7-7"),
        ])
        .unwrap();
    assert_eq!(report.collisions.len(), 1);

    let objects = engine.snapshot();
    let ws01 = objects.find_sid(&sid("S-1-5-21-9-9-9-1105")).unwrap();
    let ws02 = objects.find_sid(&sid("S-1-5-21-9-9-9-1106")).unwrap();
    let ws03 = objects.find_sid(&sid("S-1-5-21-9-9-9-1107")).unwrap();
    let collision = objects.registry().edges.lookup("SIDCollision").unwrap();

    assert!(objects.get(ws01).unwrap().edge_to(ws02).contains(collision));
    assert!(objects.get(ws02).unwrap().edge_to(ws01).contains(collision));
    assert!(objects.get(ws01).unwrap().edge_to(ws03).is_empty());

    // The local administrators stay distinct objects.
    assert_ne!(
        objects.find_sid(&sid("S-1-5-21-9-9-9-1105-500")),
        objects.find_sid(&sid("S-1-5-21-9-9-9-1106-500"))
    );

    let info = engine.edge_catalog().into_iter().find(|k| k.name == "SIDCollision").unwrap();
    assert_eq!(info.fixed_probability.map(|p| p.value()), Some(0));
}

#[test]
fn test_collision_edges_do_not_form_paths() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine
        .import_batches([
            local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"),
            local_batch("WS02", "S-1-5-21-9-9-9-1106", "S-1-5-21-5-5-5"),
        ])
        .unwrap();

    let request = PathRequest::new(
        Selector::sid(sid("S-1-5-21-9-9-9-1105")),
        Selector::sid(sid("S-1-5-21-9-9-9-1106")),
    );
    let outcome = engine.find_paths(&request).unwrap();
    assert!(outcome.paths.is_empty());
    assert_eq!(outcome.empty_reason, None);

    // WS02 is off the path, so its collision is not reported.
    let request = PathRequest::new(
        Selector::sid(sid("S-1-5-21-9-9-9-1105-500")),
        Selector::sid(sid("S-1-5-21-9-9-9-1105")),
    )
    .with_informative();
    let outcome = engine.find_paths(&request).unwrap();
    assert_eq!(outcome.paths.len(), 1);
    assert!(outcome.informative_edges.is_empty());
}

#[test]
fn test_collision_detection_is_idempotent() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let batches = [
        local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"),
        local_batch("WS02", "S-1-5-21-9-9-9-1106", "S-1-5-21-5-5-5"),
    ];
    engine.import_batches(batches.clone()).unwrap();
    let edges = engine.snapshot().edge_count();
    let report = engine.import_batches(batches).unwrap();
    assert_eq!(report.collisions.len(), 1);
    assert_eq!(engine.snapshot().edge_count(), edges);
}

#[test]
fn test_same_machine_collected_twice_is_no_collision() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let report = engine
        .import_batches([
            local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"),
            local_batch("WS01", "S-1-5-21-9-9-9-1105", "S-1-5-21-5-5-5"),
        ])
        .unwrap();
    assert!(report.collisions.is_empty());

    let objects = engine.snapshot();
    let collision = objects.registry().edges.lookup("SIDCollision").unwrap();
    let with_collisions = objects
        .iter()
        .filter(|o| o.edges(Direction::Outgoing, EdgeBitmap::single(collision)).next().is_some())
        .count();
    assert_eq!(with_collisions, 0);
}
