use columnar_merge::{
    merge, merge_pair, merge_tagged_indices, merge_with_options, Bitmap, Column, ColumnData,
    ColumnOrder, DataType, GreedyMemoryPool, MemoryPool, MergeError, MergeOptions, NullOrder,
    ParallelConfig, SortKeys, Table, TaggedIndex, UnboundedMemoryPool, Value,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn pool() -> Arc<dyn MemoryPool> {
    Arc::new(UnboundedMemoryPool::new("output"))
}

fn table(columns: Vec<Column>) -> Table {
    Table::try_new(columns).unwrap()
}

fn keyed(keys: &[i64], payload: &[&str]) -> Table {
    table(vec![
        Column::from_values(keys.to_vec()),
        Column::from_strs(payload.iter().copied()),
    ])
}

fn row(key: i64, payload: &str) -> Vec<Value> {
    vec![Value::Int(key), Value::from(payload)]
}

const ASC: [ColumnOrder; 1] = [ColumnOrder::Ascending];

#[test]
fn equal_keys_keep_left_before_right() {
    let out = merge(
        &[keyed(&[1], &["a"]), keyed(&[1], &["b"])],
        &[0],
        &ASC,
        &[],
        &pool(),
    )
    .unwrap();
    assert_eq!(out.rows(), vec![row(1, "a"), row(1, "b")]);
}

#[test]
fn interleaves_two_sorted_tables() {
    let left = keyed(&[1, 3, 5, 7], &["l1", "l3", "l5", "l7"]);
    let right = keyed(&[2, 3, 8], &["r2", "r3", "r8"]);
    let out = merge(&[left, right], &[0], &ASC, &[NullOrder::NullsFirst], &pool()).unwrap();
    assert_eq!(
        out.rows(),
        vec![
            row(1, "l1"),
            row(2, "r2"),
            row(3, "l3"),
            row(3, "r3"),
            row(5, "l5"),
            row(7, "l7"),
            row(8, "r8"),
        ]
    );
}

#[test]
fn tagged_indices_expose_the_merge_order() {
    let left = keyed(&[1, 3], &["a", "b"]);
    let right = keyed(&[2, 3], &["c", "d"]);
    let order = merge_tagged_indices(
        &left,
        &right,
        &SortKeys::ascending(vec![0]),
        &MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(
        order,
        vec![
            TaggedIndex::left(0),
            TaggedIndex::right(0),
            TaggedIndex::left(1),
            TaggedIndex::right(1),
        ]
    );
}

#[test]
fn validity_bits_follow_the_merged_order() {
    let left = table(vec![
        Column::from_values(vec![1i64, 3, 5]),
        Column::from_options(vec![Some(10i32), None, Some(50)]),
    ]);
    let right = table(vec![
        Column::from_values(vec![2i64, 4]),
        Column::from_options(vec![None, Some(40i32)]),
    ]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();

    let payload = out.column(1).unwrap();
    let bits: Vec<bool> = payload.validity().unwrap().iter().collect();
    assert_eq!(bits, vec![true, false, false, true, true]);
    assert_eq!(payload.null_count(), 2);
    assert_eq!(
        payload.values(),
        vec![
            Value::Int(10),
            Value::Null,
            Value::Null,
            Value::Int(40),
            Value::Int(50),
        ]
    );
}

#[test]
fn validity_merge_matches_in_parallel_mode() {
    let n = 1_000usize;
    let left = table(vec![
        Column::from_values((0..n as i64).map(|v| v * 2).collect()),
        Column::from_options((0..n).map(|v| (v % 3 != 0).then_some(v as i64)).collect()),
    ]);
    let right = table(vec![
        Column::from_values((0..n as i64).map(|v| v * 2 + 1).collect()),
        Column::from_values((0..n as i64).collect()),
    ]);
    let keys = SortKeys::ascending(vec![0]);
    let parallel = MergeOptions {
        parallel: ParallelConfig {
            enabled: true,
            min_rows_for_parallel: 0,
            chunk_rows: 100,
        },
        ..MergeOptions::default()
    };
    let sequential = MergeOptions {
        parallel: ParallelConfig::disabled(),
        ..MergeOptions::default()
    };
    let a = merge_pair(&left, &right, &keys, &pool(), &parallel).unwrap();
    let b = merge_pair(&left, &right, &keys, &pool(), &sequential).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.column(1).unwrap().null_count(), left.column(1).unwrap().null_count());
    assert_eq!(a.get_cell(0, 1), Value::Null);
    assert_eq!(a.get_cell(1, 1), Value::Int(0));
    assert_eq!(a.get_cell(2, 1), Value::Int(1));
}

#[test]
fn descending_keys_with_nulls_last() {
    let left = table(vec![
        Column::from_options(vec![Some(5i64), Some(2), None]),
        Column::from_strs(["l5", "l2", "lnull"]),
    ]);
    let right = table(vec![
        Column::from_options(vec![Some(4i64), None]),
        Column::from_strs(["r4", "rnull"]),
    ]);
    let out = merge(
        &[left, right],
        &[0],
        &[ColumnOrder::Descending],
        &[NullOrder::NullsLast],
        &pool(),
    )
    .unwrap();
    assert_eq!(
        out.column(1).unwrap().values(),
        ["l5", "r4", "l2", "lnull", "rnull"].map(Value::from).to_vec()
    );
}

#[test]
fn multi_key_merge_uses_secondary_key() {
    let left = table(vec![
        Column::from_values(vec![1i64, 1, 2]),
        Column::from_strs(["a", "c", "a"]),
    ]);
    let right = table(vec![
        Column::from_values(vec![1i64, 2]),
        Column::from_strs(["b", "0"]),
    ]);
    let out = merge(
        &[left, right],
        &[0, 1],
        &[ColumnOrder::Ascending, ColumnOrder::Ascending],
        &[],
        &pool(),
    )
    .unwrap();
    assert_eq!(out.rows(), vec![row(1, "a"), row(1, "b"), row(1, "c"), row(2, "0"), row(2, "a")]);
}

#[test]
fn struct_children_share_the_merged_order() {
    let make = |keys: Vec<i64>, a: Vec<i32>, b: Vec<&str>, valid: &[bool]| {
        let s = Column::new_struct(
            vec![
                ("a".to_owned(), Column::from_values(a)),
                ("b".to_owned(), Column::from_strs(b)),
            ],
            Some(Bitmap::from_bools(valid)),
        )
        .unwrap();
        table(vec![Column::from_values(keys), s])
    };
    let left = make(vec![1, 4], vec![10, 40], vec!["x", "y"], &[true, false]);
    let right = make(vec![2, 3], vec![20, 30], vec!["z", "w"], &[true, true]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();

    let s = out.column(1).unwrap();
    let ColumnData::Struct { children } = s.data() else {
        panic!("expected struct column");
    };
    assert_eq!(children[0].values(), [10, 20, 30, 40].map(Value::Int).to_vec());
    assert_eq!(children[1].values(), ["x", "z", "w", "y"].map(Value::from).to_vec());
    assert_eq!(s.validity().unwrap().iter().collect::<Vec<_>>(), vec![true, true, true, false]);
}

#[test]
fn struct_keys_merge_with_nested_comparator() {
    let make = |a: Vec<i32>, b: Vec<&str>| {
        let s = Column::new_struct(
            vec![
                ("a".to_owned(), Column::from_values(a)),
                ("b".to_owned(), Column::from_strs(b)),
            ],
            None,
        )
        .unwrap();
        table(vec![s])
    };
    let left = make(vec![1, 1, 3], vec!["a", "c", "a"]);
    let right = make(vec![1, 2], vec!["b", "a"]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();
    let expected: Vec<Vec<Value>> = [(1, "a"), (1, "b"), (1, "c"), (2, "a"), (3, "a")]
        .into_iter()
        .map(|(a, b)| vec![Value::Struct(vec![Value::Int(a), Value::from(b)])])
        .collect();
    assert_eq!(out.rows(), expected);
}

#[test]
fn dictionary_columns_with_different_keys() {
    let left = table(vec![
        Column::from_values(vec![1i64, 3]),
        Column::dictionary_from_strs([Some("red"), None]),
    ]);
    let right = table(vec![
        Column::from_values(vec![2i64, 4]),
        Column::dictionary_from_strs([Some("blue"), Some("red")]),
    ]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();
    let dict = out.column(1).unwrap();
    assert_eq!(
        dict.values(),
        vec![
            Value::from("red"),
            Value::from("blue"),
            Value::Null,
            Value::from("red"),
        ]
    );
    assert_eq!(dict.data_type(), &DataType::Dictionary(Box::new(DataType::Utf8)));
    let ColumnData::Dictionary { keys, .. } = dict.data() else {
        panic!("expected dictionary column");
    };
    assert_eq!(keys.values(), vec![Value::from("blue"), Value::from("red")]);
}

#[test]
fn dictionary_key_column_orders_by_value() {
    let left = table(vec![Column::dictionary_from_strs([Some("b"), Some("d")])]);
    let right = table(vec![Column::dictionary_from_strs([Some("a"), Some("c")])]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();
    assert_eq!(out.column(0).unwrap().values(), ["a", "b", "c", "d"].map(Value::from).to_vec());
}

#[test]
fn null_dictionary_key_sorts_last() {
    let shared = Arc::new(Column::from_opt_strs([None, Some("a")]));
    let left = table(vec![Column::new_dictionary(vec![1], shared.clone(), None).unwrap()]);
    let right = table(vec![Column::new_dictionary(vec![0], shared, None).unwrap()]);
    let out = merge(&[left, right], &[0], &ASC, &[NullOrder::NullsLast], &pool()).unwrap();
    assert_eq!(out.column(0).unwrap().values(), vec![Value::from("a"), Value::Null]);
}

#[test]
fn unmasked_left_merges_with_nullable_right() {
    let left = table(vec![Column::from_values(vec![1i64, 3])]);
    let right = table(vec![Column::from_options(vec![None, Some(2i64)])]);
    let out = merge(&[left, right], &[0], &ASC, &[], &pool()).unwrap();
    let column = out.column(0).unwrap();
    assert_eq!(column.values(), vec![Value::Null, Value::Int(1), Value::Int(2), Value::Int(3)]);
    let bits: Vec<bool> = column.validity().unwrap().iter().collect();
    assert_eq!(bits, vec![false, true, true, true]);
}

#[test]
fn unified_dictionary_keys_are_billed() {
    let left = table(vec![
        Column::from_values(vec![1i64, 3]),
        Column::dictionary_from_strs([Some("walnut"), Some("almond")]),
    ]);
    let right = table(vec![
        Column::from_values(vec![2i64]),
        Column::dictionary_from_strs([Some("cashew")]),
    ]);
    let output = Arc::new(GreedyMemoryPool::new("output", 1 << 20));
    let output_dyn: Arc<dyn MemoryPool> = output.clone();
    let out = merge(&[left, right], &[0], &ASC, &[], &output_dyn).unwrap();

    let dict = out.column(1).unwrap();
    let ColumnData::Dictionary { keys, .. } = dict.data() else {
        panic!("expected dictionary column");
    };
    let columns: usize = out.columns().iter().map(Column::size_bytes).sum();
    assert_eq!(out.size_bytes(), columns + keys.size_bytes());
    assert_eq!(output.reserved(), out.size_bytes());
}

#[test]
fn single_input_is_copied_into_the_output_pool() {
    let input = keyed(&[1, 2, 3], &["a", "b", "c"]);
    let output = pool();
    let out = merge(&[input.clone()], &[0], &ASC, &[], &output).unwrap();
    assert_eq!(out, input);
    assert_eq!(out.reserved_bytes(), input.size_bytes());
    assert_eq!(output.reserved(), input.size_bytes());
    drop(out);
    assert_eq!(output.reserved(), 0);
}

#[test]
fn empty_inputs() {
    let out = merge(&[], &[0], &ASC, &[], &pool()).unwrap();
    assert_eq!(out.num_columns(), 0);
    assert_eq!(out.num_rows(), 0);

    let empty = keyed(&[], &[]);
    let out = merge(&[empty.clone(), empty.clone()], &[0], &ASC, &[], &pool()).unwrap();
    assert_eq!(out.num_rows(), 0);
    assert_eq!(out.schema(), vec![DataType::Int64, DataType::Utf8]);

    let only = keyed(&[4, 5], &["d", "e"]);
    let out = merge(
        &[empty.clone(), only.clone(), empty],
        &[0],
        &ASC,
        &[],
        &pool(),
    )
    .unwrap();
    assert_eq!(out.rows(), only.rows());
}

#[test]
fn five_way_merge_equals_smallest_first_pairwise_merges() {
    let t0 = keyed(&[1, 4, 9, 12], &["t0a", "t0b", "t0c", "t0d"]);
    let t1 = keyed(&[2, 4], &["t1a", "t1b"]);
    let t2 = keyed(&[0, 4, 11], &["t2a", "t2b", "t2c"]);
    let t3 = keyed(&[4], &["t3a"]);
    let t4 = keyed(&[3, 5, 6, 7, 8], &["t4a", "t4b", "t4c", "t4d", "t4e"]);
    let keys = SortKeys::ascending(vec![0]);
    let opts = MergeOptions::default();
    let p = pool();

    let all = merge_with_options(
        &[t0.clone(), t1.clone(), t2.clone(), t3.clone(), t4.clone()],
        &keys,
        &p,
        &opts,
    )
    .unwrap();

    // Pops: {t3, t1} -> a, {t2, a} -> b, {t0, t4} -> c, {b, c}. The earlier-queued table is left.
    let a = merge_pair(&t1, &t3, &keys, &p, &opts).unwrap();
    let b = merge_pair(&t2, &a, &keys, &p, &opts).unwrap();
    let c = merge_pair(&t0, &t4, &keys, &p, &opts).unwrap();
    let expected = merge_pair(&b, &c, &keys, &p, &opts).unwrap();

    assert_eq!(all.rows(), expected.rows());
    assert_eq!(all.num_rows(), 15);
    let keys_out: Vec<Value> = all.column(0).unwrap().values();
    let mut sorted = keys_out.clone();
    sorted.sort_by_key(|v| match v {
        Value::Int(v) => *v,
        _ => i64::MIN,
    });
    assert_eq!(keys_out, sorted);
}

#[test]
fn only_the_final_merge_is_billed_to_the_output_pool() {
    let inputs: Vec<Table> = (0..4)
        .map(|t| keyed(&[t, t + 4, t + 8], &["x", "yy", "zzz"]))
        .collect();
    let output = Arc::new(GreedyMemoryPool::new("output", 1 << 20));
    let scratch = Arc::new(UnboundedMemoryPool::new("scratch"));
    let output_dyn: Arc<dyn MemoryPool> = output.clone();
    let scratch_dyn: Arc<dyn MemoryPool> = scratch.clone();
    let options = MergeOptions {
        scratch_pool: Some(scratch_dyn),
        ..MergeOptions::default()
    };

    let out = merge_with_options(&inputs, &SortKeys::ascending(vec![0]), &output_dyn, &options)
        .unwrap();
    assert_eq!(out.num_rows(), 12);
    assert_eq!(output.reserved(), out.size_bytes());
    assert_eq!(out.reserved_bytes(), out.size_bytes());
    assert!(scratch.peak() > 0);
    assert_eq!(scratch.reserved(), 0, "intermediates are released once consumed");
}

#[test]
fn output_pool_limit_is_enforced() {
    let output: Arc<dyn MemoryPool> = Arc::new(GreedyMemoryPool::new("tiny", 8));
    let err = merge(
        &[keyed(&[1], &["a"]), keyed(&[2], &["b"])],
        &[0],
        &ASC,
        &[],
        &output,
    )
    .unwrap_err();
    assert!(
        matches!(err, MergeError::MemoryLimitExceeded { ref pool, .. } if pool == "tiny"),
        "unexpected error: {err:?}"
    );
    assert_eq!(output.reserved(), 0);
}

#[test]
fn configuration_errors_fail_before_merging() {
    let a = keyed(&[1], &["a"]);
    let narrow = table(vec![Column::from_values(vec![1i64])]);
    let wrong_type = table(vec![
        Column::from_values(vec![1i32]),
        Column::from_strs(["a"]),
    ]);

    assert_eq!(
        merge(&[a.clone(), narrow], &[0], &ASC, &[], &pool()).unwrap_err(),
        MergeError::ColumnCountMismatch {
            table: 1,
            expected: 2,
            actual: 1
        }
    );
    assert_eq!(
        merge(&[a.clone(), wrong_type], &[0], &ASC, &[], &pool()).unwrap_err(),
        MergeError::ColumnTypeMismatch {
            table: 1,
            column: 0,
            expected: DataType::Int64,
            actual: DataType::Int32,
        }
    );
    assert_eq!(
        merge(&[a.clone(), a.clone()], &[], &[], &[], &pool()).unwrap_err(),
        MergeError::EmptyKeyColumns
    );
    assert_eq!(
        merge(
            &[a.clone(), a.clone()],
            &[0, 1, 0],
            &[ColumnOrder::Ascending; 3],
            &[],
            &pool()
        )
        .unwrap_err(),
        MergeError::TooManyKeyColumns {
            keys: 3,
            columns: 2
        }
    );
    assert_eq!(
        merge(&[a.clone(), a.clone()], &[0, 1], &ASC, &[], &pool()).unwrap_err(),
        MergeError::ColumnOrderLengthMismatch { keys: 2, orders: 1 }
    );
    assert_eq!(
        merge(&[a.clone(), a], &[2], &ASC, &[], &pool()).unwrap_err(),
        MergeError::KeyColumnOutOfRange { key: 2, columns: 2 }
    );
}

#[test]
fn list_columns_are_a_configuration_error() {
    let list = || {
        Column::new_list(vec![0, 1, 3], Column::from_values(vec![1i64, 2, 3]), None).unwrap()
    };
    let t = table(vec![Column::from_values(vec![1i64, 2]), list()]);
    let err = merge(&[t.clone(), t], &[0], &ASC, &[], &pool()).unwrap_err();
    assert!(matches!(
        err,
        MergeError::UnsupportedColumnType {
            column: 1,
            data_type: DataType::List(_)
        }
    ));
}

#[test]
fn unsorted_inputs_are_rejected_when_verification_is_on() {
    let sorted = keyed(&[1, 2], &["a", "b"]);
    let unsorted = keyed(&[2, 1], &["a", "b"]);
    let options = MergeOptions {
        verify_sorted_inputs: true,
        ..MergeOptions::default()
    };
    let err = merge_with_options(
        &[sorted, unsorted],
        &SortKeys::ascending(vec![0]),
        &pool(),
        &options,
    )
    .unwrap_err();
    assert_eq!(err, MergeError::UnsortedInput { table: 1 });
}
