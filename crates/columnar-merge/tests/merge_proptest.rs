#![cfg(not(target_arch = "wasm32"))]

use columnar_merge::{
    is_sorted, merge_pair, merge_with_options, Column, MemoryPool, MergeOptions, ParallelConfig,
    SortKeys, Table, UnboundedMemoryPool, Value,
};
use ordered_float::OrderedFloat;
use proptest::prelude::*;
use std::sync::Arc;

type Row = (Option<i64>, Option<i32>);

fn sorted_rows(max_len: usize) -> impl Strategy<Value = Vec<Row>> {
    proptest::collection::vec(
        (
            proptest::option::weighted(0.9, -20i64..20),
            proptest::option::weighted(0.7, any::<i32>()),
        ),
        0..=max_len,
    )
    .prop_map(|mut rows| {
        rows.sort_by_key(|row| row.0);
        rows
    })
}

fn float_keys() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(prop_oneof![Just(f64::NAN), -5.0f64..5.0], 0..50).prop_map(
        |mut keys| {
            keys.sort_by_key(|v| OrderedFloat(*v));
            keys
        },
    )
}

/// Key, a unique `table:row` tag, and a nullable payload.
fn build(table: usize, rows: &[Row]) -> Table {
    Table::try_new(vec![
        Column::from_options(rows.iter().map(|r| r.0).collect()),
        Column::from_strs((0..rows.len()).map(|r| format!("{table}:{r}"))),
        Column::from_options(rows.iter().map(|r| r.1).collect()),
    ])
    .unwrap()
}

/// Rows of the stable sort of all inputs concatenated in order.
fn reference(inputs: &[Vec<Row>]) -> Vec<Vec<Value>> {
    let mut all: Vec<(Option<i64>, String, Option<i32>)> = inputs
        .iter()
        .enumerate()
        .flat_map(|(t, rows)| {
            rows.iter()
                .enumerate()
                .map(move |(r, row)| (row.0, format!("{t}:{r}"), row.1))
        })
        .collect();
    all.sort_by_key(|row| row.0);
    all.into_iter()
        .map(|(key, tag, payload)| {
            vec![
                key.map_or(Value::Null, Value::Int),
                Value::from(tag.as_str()),
                payload.map_or(Value::Null, |p| Value::Int(p.into())),
            ]
        })
        .collect()
}

fn pool() -> Arc<dyn MemoryPool> {
    Arc::new(UnboundedMemoryPool::new("proptest"))
}

fn eager_parallel() -> MergeOptions {
    MergeOptions {
        parallel: ParallelConfig {
            enabled: true,
            min_rows_for_parallel: 0,
            chunk_rows: 7,
        },
        ..MergeOptions::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        // Deterministic so failures reproduce in CI.
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn pairwise_merge_matches_stable_sort(left in sorted_rows(200), right in sorted_rows(200)) {
        let keys = SortKeys::ascending(vec![0]);
        let (l, r) = (build(0, &left), build(1, &right));
        let out = merge_pair(&l, &r, &keys, &pool(), &MergeOptions::default()).unwrap();
        prop_assert_eq!(out.rows(), reference(&[left, right]));
    }

    #[test]
    fn parallel_slices_match_sequential(left in sorted_rows(300), right in sorted_rows(300)) {
        let keys = SortKeys::ascending(vec![0]);
        let (l, r) = (build(0, &left), build(1, &right));
        let sequential = MergeOptions {
            parallel: ParallelConfig::disabled(),
            ..MergeOptions::default()
        };
        let a = merge_pair(&l, &r, &keys, &pool(), &eager_parallel()).unwrap();
        let b = merge_pair(&l, &r, &keys, &pool(), &sequential).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn n_way_merge_is_sorted_and_conserves_rows(
        inputs in proptest::collection::vec(sorted_rows(60), 1..=6)
    ) {
        let keys = SortKeys::ascending(vec![0]);
        let tables: Vec<Table> = inputs.iter().enumerate().map(|(t, rows)| build(t, rows)).collect();
        let out = merge_with_options(&tables, &keys, &pool(), &eager_parallel()).unwrap();

        prop_assert!(is_sorted(&out, &keys).unwrap());
        let rows: usize = tables.iter().map(Table::num_rows).sum();
        prop_assert_eq!(out.num_rows(), rows);
        for col in [0, 2] {
            let nulls: usize = tables.iter().map(|t| t.column(col).unwrap().null_count()).sum();
            prop_assert_eq!(out.column(col).unwrap().null_count(), nulls);
        }

        // Every input row appears once, with its payload intact.
        let mut got = out.rows();
        let mut want = reference(&inputs);
        let by_tag = |row: &Vec<Value>| row[1].to_string();
        got.sort_by_key(by_tag);
        want.sort_by_key(by_tag);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn float_keys_order_nan_last(
        left in float_keys(),
        right in float_keys(),
    ) {
        let l = Table::try_new(vec![Column::from_values(left.clone())]).unwrap();
        let r = Table::try_new(vec![Column::from_values(right.clone())]).unwrap();
        let out = merge_pair(&l, &r, &SortKeys::ascending(vec![0]), &pool(), &MergeOptions::default())
            .unwrap();

        let mut want: Vec<OrderedFloat<f64>> = left.into_iter().chain(right).map(OrderedFloat).collect();
        want.sort();
        let got: Vec<OrderedFloat<f64>> = out
            .column(0)
            .unwrap()
            .values()
            .into_iter()
            .map(|v| match v {
                Value::Float(f) => OrderedFloat(f),
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        prop_assert_eq!(got, want);
    }
}
