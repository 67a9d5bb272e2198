//! Pairwise and N-way merge of pre-sorted tables.
//!
//! A pairwise merge computes the merged tagged-index order (cross-table comparator + merge
//! path) and then materialises every column in that order. The N-way merge keeps a
//! min-row-count queue of tables and repeatedly merges the two smallest until one remains.
//! Intermediate results are billed to a scratch pool and released as soon as they are
//! consumed; only the final merge is billed to the caller's pool.

use crate::comparator::{CrossTableComparator, TaggedIndex};
use crate::dictionary::unify_dictionaries;
use crate::error::{MergeError, MergeResult};
use crate::materialize::merge_column;
use crate::memory::{MemoryPool, MemoryReservation, UnboundedMemoryPool};
use crate::merge_path::merge_path;
use crate::parallel::ParallelConfig;
use crate::row_compare::{
    is_sorted, ColumnOrder, FlatRowComparator, NestedRowComparator, NullOrder, RowComparator,
    SortKeys,
};
use crate::table::Table;
use crate::types::DataType;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    pub parallel: ParallelConfig,
    /// Pool billed for intermediate tables of an N-way merge. Defaults to a fresh unbounded
    /// pool per call.
    pub scratch_pool: Option<Arc<dyn MemoryPool>>,
    /// Check every input with [`is_sorted`] before merging.
    pub verify_sorted_inputs: bool,
}

fn check_supported(column: usize, data_type: &DataType) -> MergeResult<()> {
    let supported = match data_type {
        DataType::List(_) => false,
        DataType::Dictionary(value) => value.is_fixed_width() || **value == DataType::Utf8,
        DataType::Struct(fields) => {
            for field in fields {
                check_supported(column, &field.data_type).map_err(|_| {
                    MergeError::UnsupportedColumnType {
                        column,
                        data_type: data_type.clone(),
                    }
                })?;
            }
            true
        }
        _ => true,
    };
    if supported {
        Ok(())
    } else {
        Err(MergeError::UnsupportedColumnType {
            column,
            data_type: data_type.clone(),
        })
    }
}

/// Configuration checks shared by every entry point; nothing is merged if any fails.
fn validate_inputs(tables: &[&Table], keys: &SortKeys) -> MergeResult<()> {
    let Some(first) = tables.first() else {
        return Ok(());
    };
    let schema = first.schema();
    for (idx, table) in tables.iter().enumerate().skip(1) {
        if table.num_columns() != schema.len() {
            return Err(MergeError::ColumnCountMismatch {
                table: idx,
                expected: schema.len(),
                actual: table.num_columns(),
            });
        }
        for (column, (expected, actual)) in schema.iter().zip(table.schema()).enumerate() {
            if *expected != actual {
                return Err(MergeError::ColumnTypeMismatch {
                    table: idx,
                    column,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
    }
    keys.validate(schema.len())?;
    for (column, data_type) in schema.iter().enumerate() {
        check_supported(column, data_type)?;
    }
    Ok(())
}

fn tagged_order<'a, C: RowComparator<'a>>(
    left: &'a Table,
    right: &'a Table,
    keys: &'a SortKeys,
    config: &ParallelConfig,
) -> MergeResult<Vec<TaggedIndex>> {
    let cmp = CrossTableComparator::<C>::try_new(left, right, keys)?;
    merge_path(
        left.num_rows(),
        right.num_rows(),
        &|a, b| cmp.less(a, b),
        config,
    )
}

/// Merged row order of two sorted tables, without materialising any column.
///
/// Equal keys keep every left row ahead of every right row.
pub fn merge_tagged_indices(
    left: &Table,
    right: &Table,
    keys: &SortKeys,
    options: &MergeOptions,
) -> MergeResult<Vec<TaggedIndex>> {
    keys.validate(left.num_columns().min(right.num_columns()))?;
    if keys.has_nested_keys(left) {
        log::trace!("merge order: nested key comparator");
        tagged_order::<NestedRowComparator<'_>>(left, right, keys, &options.parallel)
    } else {
        tagged_order::<FlatRowComparator<'_>>(left, right, keys, &options.parallel)
    }
}

fn merge_pair_unchecked(
    left: &Table,
    right: &Table,
    keys: &SortKeys,
    pool: &Arc<dyn MemoryPool>,
    options: &MergeOptions,
) -> MergeResult<Table> {
    let mut reservation = MemoryReservation::new(pool);
    reservation.try_grow(left.size_bytes() + right.size_bytes())?;

    let merged = merge_tagged_indices(left, right, keys, options)?;
    let columns = left
        .columns()
        .iter()
        .zip(right.columns())
        .enumerate()
        .map(|(column, (l, r))| merge_column(column, l, r, &merged, &options.parallel))
        .collect::<MergeResult<Vec<_>>>()?;

    let table = Table::from_columns_unchecked(columns, merged.len());
    reservation.try_resize(table.size_bytes())?;
    Ok(table.with_reservation(reservation))
}

/// Merge two tables sorted by `keys` into one table billed to `pool`.
pub fn merge_pair(
    left: &Table,
    right: &Table,
    keys: &SortKeys,
    pool: &Arc<dyn MemoryPool>,
    options: &MergeOptions,
) -> MergeResult<Table> {
    validate_inputs(&[left, right], keys)?;
    let unified = unify_dictionaries(&[left, right])?;
    merge_pair_unchecked(&unified[0], &unified[1], keys, pool, options)
}

enum QueuedTable<'a> {
    /// One of the caller's inputs.
    Borrowed(&'a Table),
    /// An intermediate result, dropped once it has been merged again.
    Owned(Table),
}

impl QueuedTable<'_> {
    fn table(&self) -> &Table {
        match self {
            QueuedTable::Borrowed(table) => table,
            QueuedTable::Owned(table) => table,
        }
    }
}

struct QueueEntry<'a> {
    rows: usize,
    seq: usize,
    table: QueuedTable<'a>,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry<'_> {}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry<'_> {
    // `BinaryHeap` pops the greatest entry: fewest rows first, then earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rows
            .cmp(&self.rows)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-row-count queue of tables waiting to be merged.
struct MergeQueue<'a> {
    heap: BinaryHeap<QueueEntry<'a>>,
    next_seq: usize,
}

impl<'a> MergeQueue<'a> {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn push(&mut self, table: QueuedTable<'a>) {
        let rows = table.table().num_rows();
        self.heap.push(QueueEntry {
            rows,
            seq: self.next_seq,
            table,
        });
        self.next_seq += 1;
    }

    /// Remove the smallest entry, transferring ownership of its table to the caller.
    fn pop(&mut self) -> Option<QueueEntry<'a>> {
        self.heap.pop()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Merge `tables`, each sorted by `key_columns`, into one sorted table billed to
/// `output_pool`.
///
/// `column_order` has one entry per key; `null_order` has one entry per key or is empty
/// (nulls first).
pub fn merge(
    tables: &[Table],
    key_columns: &[usize],
    column_order: &[ColumnOrder],
    null_order: &[NullOrder],
    output_pool: &Arc<dyn MemoryPool>,
) -> MergeResult<Table> {
    let keys = SortKeys::new(
        key_columns.to_vec(),
        column_order.to_vec(),
        null_order.to_vec(),
    );
    merge_with_options(tables, &keys, output_pool, &MergeOptions::default())
}

pub fn merge_with_options(
    tables: &[Table],
    keys: &SortKeys,
    output_pool: &Arc<dyn MemoryPool>,
    options: &MergeOptions,
) -> MergeResult<Table> {
    let Some(first) = tables.first() else {
        return Ok(Table::empty());
    };
    let inputs: Vec<&Table> = tables.iter().collect();
    validate_inputs(&inputs, keys)?;

    if options.verify_sorted_inputs {
        for (idx, table) in tables.iter().enumerate() {
            if !is_sorted(table, keys)? {
                return Err(MergeError::UnsortedInput { table: idx });
            }
        }
    }

    let non_empty: Vec<&Table> = inputs.into_iter().filter(|t| !t.is_empty()).collect();
    if non_empty.len() < tables.len() {
        log::debug!(
            "dropping {} zero-row inputs before merge",
            tables.len() - non_empty.len()
        );
    }
    match non_empty.as_slice() {
        [] => return Ok(Table::empty_like(first)),
        [only] => return only.copy_billed_to(output_pool),
        _ => {}
    }

    let unified = unify_dictionaries(&non_empty)?;
    let scratch: Arc<dyn MemoryPool> = match &options.scratch_pool {
        Some(pool) => Arc::clone(pool),
        None => Arc::new(UnboundedMemoryPool::new("merge-scratch")),
    };

    let mut queue = MergeQueue::new();
    for table in &unified {
        queue.push(QueuedTable::Borrowed(&**table));
    }

    while queue.len() > 1 {
        let (Some(a), Some(b)) = (queue.pop(), queue.pop()) else {
            break;
        };
        // The entry queued first is the left side, so ties keep queue order.
        let (left, right) = if a.seq < b.seq { (a, b) } else { (b, a) };
        let (pool, billed) = if queue.is_empty() {
            (output_pool, "output")
        } else {
            (&scratch, "scratch")
        };
        log::debug!(
            "merging {} + {} rows ({} tables left, {billed} pool)",
            left.rows,
            right.rows,
            queue.len(),
        );
        let merged = merge_pair_unchecked(
            left.table.table(),
            right.table.table(),
            keys,
            pool,
            options,
        )?;
        queue.push(QueuedTable::Owned(merged));
    }

    match queue.pop().map(|entry| entry.table) {
        Some(QueuedTable::Owned(table)) => Ok(table),
        Some(QueuedTable::Borrowed(table)) => table.copy_billed_to(output_pool),
        None => Ok(Table::empty_like(first)),
    }
}
