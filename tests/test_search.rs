mod common;
use common::{collinear_store, store_from_fn};
use exsearch::{
    CancelToken, CurrentRatio, Objective, Pools, RoiDefinition, Search, SearchConfig,
    SearchStatus,
};

fn base_config(pools: Pools) -> SearchConfig {
    SearchConfig {
        pools,
        total_current: 2.0,
        channel_limit: 1.6,
        current_step: 0.1,
        parallel: false,
        ..SearchConfig::default()
    }
}

/// Pools 2/1/1/1 with two explicit ratios → exactly four combinations
/// processed.
#[test]
fn two_by_one_pools_with_two_ratios_process_four_combinations() {
    let store = collinear_store(&["A", "B", "C", "D", "E"], 8);
    let roi = RoiDefinition::from_members(8, &[0, 1, 2]);
    let pools = Pools::new(&["A", "B"], &["C"], &["D"], &["E"]);
    let ratios = vec![
        CurrentRatio { i1: 1.6, i2: 0.4 },
        CurrentRatio { i1: 1.0, i2: 1.0 },
    ];

    let search =
        Search::with_ratio_set(&store, roi, base_config(pools), ratios).unwrap();
    assert_eq!(search.total(), 2 * 1 * 1 * 1 * 2);

    let report = search.run().unwrap();
    assert_eq!(report.status, SearchStatus::Completed);
    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded(), 4);
    assert!(report.failures.is_empty());
}

/// One poisoned combination out of ten must not stop the batch: the report
/// carries nine records plus one failure naming the montage.
#[test]
fn single_failing_combination_does_not_abort_the_batch() {
    let names: Vec<&str> = vec![
        "P0", "P1", "P2", "P3", "BAD", "P5", "P6", "P7", "P8", "P9", "M", "X", "Y",
    ];
    let store = store_from_fn(&names, 10, |e, n, d| {
        if names[e] == "BAD" {
            f32::NAN
        } else {
            0.01 * (e + 1) as f32 + 0.001 * (n + d) as f32
        }
    });
    let roi = RoiDefinition::from_members(10, &[2, 3, 4]);
    let pools = Pools::new(
        &["P0", "P1", "P2", "P3", "BAD", "P5", "P6", "P7", "P8", "P9"],
        &["M"],
        &["X"],
        &["Y"],
    );
    let ratios = vec![CurrentRatio { i1: 1.0, i2: 1.0 }];

    let search =
        Search::with_ratio_set(&store, roi, base_config(pools), ratios).unwrap();
    assert_eq!(search.total(), 10);

    let report = search.run().unwrap();
    assert_eq!(report.status, SearchStatus::Completed);
    assert_eq!(report.attempted, 10);
    assert_eq!(report.succeeded(), 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].montage.e1_plus, "BAD");
    assert!(report.failures[0].reason.contains("non-finite"));
}

/// Cancellation after three of ten combinations keeps exactly the three
/// completed records and reports `Aborted`.
#[test]
fn cancellation_mid_run_keeps_completed_records() {
    let store = collinear_store(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L"], 6);
    let roi = RoiDefinition::from_members(6, &[0, 1]);
    // all channel fields point along −x: E1 = L_e − L_K < 0, E2 = L_A − L_L < 0
    let pools = Pools::new(
        &["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"],
        &["K"],
        &["A"],
        &["L"],
    );
    let ratios = vec![CurrentRatio { i1: 1.0, i2: 1.0 }];

    let search =
        Search::with_ratio_set(&store, roi, base_config(pools), ratios).unwrap();
    assert_eq!(search.total(), 10);

    let report = search.run_with_cancel(&CancelToken::after_polls(3)).unwrap();
    assert_eq!(report.status, SearchStatus::Aborted);
    assert_eq!(report.succeeded(), 3);
    assert!(report.failures.is_empty());
    // the three retained records are the first three enumerated
    let mut indices: Vec<u64> = report.records.iter().map(|r| r.montage.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
}

/// Ranking is monotone in the objective with enumeration order as the tie
/// breaker.
#[test]
fn ranking_is_monotone_with_deterministic_ties() {
    let store = collinear_store(&["A", "B", "C", "D", "E"], 8);
    let roi = RoiDefinition::from_members(8, &[0, 1, 2]);
    let pools = Pools::new(&["A", "B"], &["C"], &["D"], &["E"]);
    let cfg = SearchConfig { objective: Objective::RoiMean, ..base_config(pools) };

    let report = Search::new(&store, roi, cfg).unwrap().run().unwrap();
    assert!(report.records.len() > 1);
    for pair in report.records.windows(2) {
        let va = pair[0].objective_value(Objective::RoiMean);
        let vb = pair[1].objective_value(Objective::RoiMean);
        assert!(
            va > vb || (va == vb && pair[0].montage.index < pair[1].montage.index),
            "ranking violated: {va} (#{}) before {vb} (#{})",
            pair[0].montage.index,
            pair[1].montage.index
        );
    }
}

/// CSV and JSON exports agree with the in-memory report.
#[test]
fn report_exports_round_trip() {
    let store = collinear_store(&["A", "B", "C", "D", "E"], 8);
    let roi = RoiDefinition::from_members(8, &[0, 1, 2]);
    let pools = Pools::new(&["A", "B"], &["C"], &["D"], &["E"]);

    let report = Search::new(&store, roi, base_config(pools)).unwrap().run().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("results.csv");
    report.write_csv(&csv_path).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), report.records.len() + 1); // header + rows
    assert!(csv.lines().next().unwrap().starts_with("rank,index,e1_plus"));

    let json_path = dir.path().join("report.json");
    report.write_json(&json_path).unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(doc["status"], "Completed");
    assert_eq!(doc["records"].as_array().unwrap().len(), report.records.len());
    assert_eq!(doc["succeeded"].as_u64().unwrap(), report.succeeded());
    assert!(doc["failures"].as_array().unwrap().is_empty());
}

/// Parallel scoring returns byte-identical ranking to sequential scoring.
#[test]
fn parallel_matches_sequential() {
    let store = collinear_store(&["A", "B", "C", "D", "E", "F"], 16);
    let roi = RoiDefinition::from_members(16, &[3, 4, 5, 6]);
    let pools = Pools::new(&["A", "B", "F"], &["C"], &["D"], &["E"]);

    let seq = Search::new(
        &store,
        roi.clone(),
        SearchConfig { parallel: false, ..base_config(pools.clone()) },
    )
    .unwrap()
    .run()
    .unwrap();
    let par = Search::new(
        &store,
        roi,
        SearchConfig { parallel: true, ..base_config(pools) },
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(seq.records.len(), par.records.len());
    for (a, b) in seq.records.iter().zip(par.records.iter()) {
        assert_eq!(a.montage.index, b.montage.index);
        assert_eq!(a.stats.roi_mean.to_bits(), b.stats.roi_mean.to_bits());
        assert_eq!(a.stats.focality.to_bits(), b.stats.focality.to_bits());
    }
}
