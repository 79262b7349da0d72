// CMCVAR - Integration Tests
//
// Properties of the build → join → bind → flatten pipeline:
// 1. Build
// 2. Joins
// 3. Binding and flattening
// 4. Full cycle

use approx::assert_relative_eq;
use cmcvar::{
    assemble, bind, flatten, join_units, join_values, AssembleOptions, Attribute, Binding,
    CycleInput, Error, JoinPolicy, Node, SeriesRecord, Tree, UnitSample, ValueSample,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

fn pdu_series() -> Vec<SeriesRecord> {
    let mut series = Vec::new();
    let mut index = 0;
    for socket in 1..=8 {
        for leaf in ["Temperature", "Power.Active", "Power.Apparent", "Current", "Status"] {
            index += 1;
            series.push(SeriesRecord::new(
                format!("Unit.PDU.Sockets.{:02}.{}", socket, leaf),
                format!("idx{}", index),
            ));
        }
    }
    series.push(SeriesRecord::new("Unit.PDU.Device.Name", "dev1"));
    series.push(SeriesRecord::new("Unit.PDU.Device.Uptime", "dev2"));
    series
}

/// Every node as a dotted path, plus every leaf's (long key, index)
fn shape(tree: &Tree) -> (BTreeSet<String>, BTreeSet<(String, String)>) {
    fn walk(node: &Node, prefix: &str, paths: &mut BTreeSet<String>, leaves: &mut BTreeSet<(String, String)>) {
        for child in node.children() {
            let path = format!("{}/{}", prefix, child.key());
            if let (Some(long_key), Some(index)) = (child.long_key(), child.index()) {
                leaves.insert((long_key.to_string(), index.to_string()));
            }
            walk(child, &path, paths, leaves);
            paths.insert(path);
        }
    }
    let mut paths = BTreeSet::new();
    let mut leaves = BTreeSet::new();
    walk(tree.root(), "", &mut paths, &mut leaves);
    (paths, leaves)
}

// ============================================================================
// Build
// ============================================================================

#[test]
fn test_build_is_permutation_independent() {
    let series = pdu_series();
    let reference = shape(&Tree::build(&series).unwrap());

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut shuffled = series.clone();
        shuffled.shuffle(&mut rng);
        let tree = Tree::build(&shuffled).unwrap();
        assert_eq!(shape(&tree), reference);
        assert_eq!(tree.len(), series.len());
    }
}

#[test]
fn test_build_twice_identical() {
    let series = pdu_series();
    assert_eq!(Tree::build(&series).unwrap(), Tree::build(&series).unwrap());
}

#[test]
fn test_every_leaf_reachable_by_index() {
    let series = pdu_series();
    let tree = Tree::build(&series).unwrap();
    for record in &series {
        let node = tree.find_by_index(&record.index).unwrap();
        assert_eq!(node.long_key(), Some(record.name.as_str()));
        assert!(node.is_leaf());
    }
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_join_completeness_any_order() {
    let series = pdu_series();
    let values: Vec<ValueSample> = series
        .iter()
        .enumerate()
        .map(|(i, r)| ValueSample::new(r.index.clone(), format!("{}.5", i)))
        .collect();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..5 {
        let mut shuffled = values.clone();
        shuffled.shuffle(&mut rng);

        let mut tree = Tree::build(&series).unwrap();
        let report = join_values(&mut tree, &shuffled, JoinPolicy::FailFast).unwrap();
        assert_eq!(report.applied, values.len());

        for sample in &values {
            let node = tree.find_by_index(sample.index()).unwrap();
            assert_relative_eq!(node.value.unwrap(), sample.parse().unwrap());
        }
    }
}

#[test]
fn test_unknown_index_detected_and_skipped() {
    let mut tree = Tree::build(&pdu_series()).unwrap();
    let values = vec![
        ValueSample::new("idx1", "1"),
        ValueSample::new("removed-variable", "2"),
        ValueSample::new("idx2", "3"),
    ];

    let err = join_values(&mut tree.clone(), &values, JoinPolicy::FailFast).unwrap_err();
    assert_eq!(
        err,
        Error::JoinNotFound {
            attribute: Attribute::Value,
            index: "removed-variable".to_string()
        }
    );

    let report = join_values(&mut tree, &values, JoinPolicy::SkipMissing).unwrap();
    assert_eq!(report.missing, vec!["removed-variable".to_string()]);
    assert_eq!(tree.find_by_index("idx2").unwrap().value, Some(3.0));
}

#[test]
fn test_units_join_sparse() {
    let mut tree = Tree::build(&pdu_series()).unwrap();
    let units = vec![
        UnitSample::new("idx1", Some("°C")),
        UnitSample::new("idx5", None),
    ];
    let report = join_units(&mut tree, &units, JoinPolicy::FailFast).unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(tree.find_by_index("idx1").unwrap().unit.as_deref(), Some("°C"));
    assert_eq!(tree.find_by_index("idx5").unwrap().unit, None);
}

// ============================================================================
// Binding and flattening
// ============================================================================

#[test]
fn test_binding_matches_only_padded_socket() {
    let mut tree = Tree::build([("Sockets.01.P", "1"), ("Sockets.02.P", "2")]).unwrap();
    let section = tree.find_by_key_mut("Sockets").unwrap();
    let outcome = bind(section, &[Binding::new(1, "rack-a")]);

    assert_eq!(outcome.slots.len(), 1);
    assert_eq!(outcome.slots[0].key(), "01");
    assert_eq!(outcome.slots[0].entity.as_deref(), Some("rack-a"));
}

#[test]
fn test_flatten_covers_exactly_the_leaves() {
    let tree = Tree::build(&pdu_series()).unwrap();
    let slot = tree.find_by_key("03").unwrap();
    let leaves = flatten(slot);

    let indices: BTreeSet<_> = leaves.iter().filter_map(|l| l.index.clone()).collect();
    let expected: BTreeSet<_> = (11..=15).map(|i| format!("idx{}", i)).collect();
    assert_eq!(leaves.len(), 5);
    assert_eq!(indices, expected);
    assert_eq!(leaves.len(), slot.leaf_count());
}

#[test]
fn test_flatten_labels_every_depth_with_slot_entity() {
    let mut tree = Tree::build(&pdu_series()).unwrap();
    let section = tree.find_by_key_mut("Sockets").unwrap();
    let outcome = bind(section, &[Binding::new(4, "db-1")]);

    let leaves = flatten(outcome.slots[0]);
    assert!(leaves.iter().any(|l| l.key == "Apparent"));
    assert!(leaves.iter().all(|l| l.entity.as_deref() == Some("db-1")));
}

// ============================================================================
// Full cycle
// ============================================================================

#[test]
fn test_end_to_end_scenario() {
    let input = CycleInput {
        series: vec![
            SeriesRecord::new("A.B.Sockets.01.Temperature", "idx1"),
            SeriesRecord::new("A.B.Sockets.01.Power", "idx2"),
        ],
        values: vec![ValueSample::new("idx1", "42"), ValueSample::new("idx2", "7")],
        units: vec![UnitSample::new("idx2", Some("W"))],
        bindings: vec![Binding::new(1, "n1")],
    };

    let assembly = assemble(&input, &AssembleOptions::default()).unwrap();
    assert_eq!(assembly.slots, vec!["01".to_string()]);
    assert_eq!(assembly.leaves.len(), 2);

    let temperature = &assembly.leaves[0];
    assert_eq!(temperature.key, "Temperature");
    assert_eq!(temperature.value, Some(42.0));
    assert_eq!(temperature.unit, None);
    assert_eq!(temperature.entity.as_deref(), Some("n1"));

    let power = &assembly.leaves[1];
    assert_eq!(power.key, "Power");
    assert_eq!(power.index.as_deref(), Some("idx2"));
    assert_eq!(power.value, Some(7.0));
    assert_eq!(power.unit.as_deref(), Some("W"));
    assert_eq!(power.entity.as_deref(), Some("n1"));
}

#[test]
fn test_cycle_with_unbound_and_unknown_data() {
    let series = pdu_series();
    let mut values: Vec<_> = series
        .iter()
        .map(|r| ValueSample::new(r.index.clone(), "1"))
        .collect();
    values.push(ValueSample::new("stale", "0"));

    let input = CycleInput {
        series,
        values,
        units: Vec::new(),
        bindings: vec![Binding::new(2, "web-1"), Binding::new(8, "web-2")],
    };

    let assembly = assemble(&input, &AssembleOptions::default()).unwrap();
    assert_eq!(assembly.slots, vec!["02".to_string(), "08".to_string()]);
    assert_eq!(assembly.leaves.len(), 10);
    assert_eq!(assembly.values.missing, vec!["stale".to_string()]);
    assert!(assembly.leaves.iter().all(|l| l.value == Some(1.0)));

    let strict = AssembleOptions {
        join_policy: JoinPolicy::FailFast,
        ..Default::default()
    };
    assert!(matches!(
        assemble(&input, &strict),
        Err(Error::JoinNotFound { .. })
    ));
}

#[test]
fn test_conflicting_series_do_not_drop_good_sockets() {
    let mut series = pdu_series();
    series.push(SeriesRecord::new("Unit.PDU.Device.OldVar", "idx3"));
    series.push(SeriesRecord::new("Unit.PDU.Sockets.05.Current.Status", "idx999"));
    let values = series
        .iter()
        .map(|r| ValueSample::new(r.index.clone(), "2"))
        .collect();

    let input = CycleInput {
        series,
        values,
        units: Vec::new(),
        bindings: (1..=8).map(|s| Binding::new(s, format!("host-{}", s))).collect(),
    };

    let assembly = assemble(&input, &AssembleOptions::default()).unwrap();
    assert_eq!(assembly.slots.len(), 8);
    assert_eq!(assembly.leaves.len(), 40);
    assert_eq!(assembly.build.inserted, 40);
    let rejected: Vec<_> = assembly.build.rejected.iter().map(|r| r.index.as_str()).collect();
    assert_eq!(rejected, vec!["idx3", "idx999"]);
    assert_eq!(assembly.values.missing, vec!["idx999".to_string()]);

    let strict = AssembleOptions {
        join_policy: JoinPolicy::FailFast,
        ..Default::default()
    };
    assert!(matches!(
        assemble(&input, &strict),
        Err(Error::DuplicateIndex { .. })
    ));
}
