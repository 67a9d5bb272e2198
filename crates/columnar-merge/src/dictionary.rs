//! Dictionary key unification.
//!
//! Merging copies dictionary indices verbatim, which is only correct when both inputs index
//! the same key column. This pass rewrites every dictionary column position so all tables
//! share one sorted, de-duplicated key column.

use crate::column::{Column, ColumnData};
use crate::error::MergeResult;
use crate::row_compare::{FlatRowComparator, NestedRowComparator, RowComparator, SortKeys};
use crate::table::Table;
use crate::types::DataType;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

/// Sorted unique keys plus, for every position in `all_keys`, its index in that unique set.
fn sorted_unique(all_keys: Column) -> MergeResult<(Column, Vec<u32>)> {
    let table = Table::try_new(vec![all_keys])?;
    let keys = SortKeys::ascending(vec![0]);
    let mut order: Vec<usize> = (0..table.num_rows()).collect();

    let mut sort_and_rank = |cmp: &dyn Fn(usize, usize) -> Ordering| {
        order.sort_by(|&a, &b| cmp(a, b));
        let mut unique: Vec<usize> = Vec::new();
        let mut rank = vec![0u32; order.len()];
        for &pos in &order {
            let is_new = unique
                .last()
                .map_or(true, |&prev| cmp(prev, pos) != Ordering::Equal);
            if is_new {
                unique.push(pos);
            }
            rank[pos] = (unique.len() - 1) as u32;
        }
        (unique, rank)
    };

    let (unique, rank) = if keys.has_nested_keys(&table) {
        let cmp = NestedRowComparator::try_new(&table, &table, &keys)?;
        sort_and_rank(&|a, b| cmp.compare(a, b))
    } else {
        let cmp = FlatRowComparator::try_new(&table, &table, &keys)?;
        sort_and_rank(&|a, b| cmp.compare(a, b))
    };

    let all_keys = &table.columns()[0];
    Ok((all_keys.gather(&unique)?, rank))
}

/// Unify one column position across tables. `None` when nothing needs rewriting.
fn unify_columns(columns: &[&Column]) -> MergeResult<Option<Vec<Column>>> {
    let Some(first) = columns.first() else {
        return Ok(None);
    };

    match first.data_type() {
        DataType::Dictionary(value_type) => {
            let key_columns: Vec<&Arc<Column>> = columns
                .iter()
                .filter_map(|c| match c.data() {
                    ColumnData::Dictionary { keys, .. } => Some(keys),
                    _ => None,
                })
                .collect();
            if key_columns.iter().all(|k| Arc::ptr_eq(k, key_columns[0])) {
                return Ok(None);
            }

            let parts: Vec<&Column> = key_columns.iter().map(|&k| &**k).collect();
            let (unique, rank) = sorted_unique(Column::concat(value_type, &parts)?)?;
            let shared = Arc::new(unique);
            log::debug!(
                "unified {} dictionaries into {} keys",
                columns.len(),
                shared.len()
            );

            let mut base = 0usize;
            let mut out = Vec::with_capacity(columns.len());
            for column in columns {
                let ColumnData::Dictionary { indices, keys } = column.data() else {
                    continue;
                };
                let remapped = indices
                    .iter()
                    .enumerate()
                    .map(|(row, &idx)| {
                        if column.is_valid(row) {
                            rank[base + idx as usize]
                        } else {
                            0
                        }
                    })
                    .collect();
                base += keys.len();
                out.push(Column::from_parts(
                    column.data_type().clone(),
                    column.len(),
                    ColumnData::Dictionary {
                        indices: remapped,
                        keys: Arc::clone(&shared),
                    },
                    column.validity().cloned(),
                ));
            }
            Ok(Some(out))
        }
        DataType::Struct(_) => {
            let width = first.children().len();
            let mut rewritten: Vec<Option<Vec<Column>>> = Vec::with_capacity(width);
            for child in 0..width {
                let children: Vec<&Column> =
                    columns.iter().map(|c| &c.children()[child]).collect();
                rewritten.push(unify_columns(&children)?);
            }
            if rewritten.iter().all(Option::is_none) {
                return Ok(None);
            }

            let out = columns
                .iter()
                .enumerate()
                .map(|(t, column)| {
                    let children = column
                        .children()
                        .iter()
                        .zip(&rewritten)
                        .map(|(child, new)| match new {
                            Some(new) => new[t].clone(),
                            None => child.clone(),
                        })
                        .collect();
                    Column::from_parts(
                        column.data_type().clone(),
                        column.len(),
                        ColumnData::Struct { children },
                        column.validity().cloned(),
                    )
                })
                .collect();
            Ok(Some(out))
        }
        _ => Ok(None),
    }
}

/// Give every dictionary column position one shared key column across `tables`.
///
/// Tables without dictionary columns (or whose dictionaries already share keys) are returned
/// borrowed. All tables must have the same schema.
pub fn unify_dictionaries<'a>(tables: &[&'a Table]) -> MergeResult<Vec<Cow<'a, Table>>> {
    let mut out: Vec<Cow<'a, Table>> = tables.iter().map(|&t| Cow::Borrowed(t)).collect();
    let Some(first) = tables.first() else {
        return Ok(out);
    };

    for col in 0..first.num_columns() {
        let columns: Vec<&Column> = tables.iter().filter_map(|t| t.column(col)).collect();
        let Some(rewritten) = unify_columns(&columns)? else {
            continue;
        };
        for (table, column) in out.iter_mut().zip(rewritten) {
            let mut columns = table.columns().to_vec();
            columns[col] = column;
            let num_rows = table.num_rows();
            *table = Cow::Owned(Table::from_columns_unchecked(columns, num_rows));
        }
    }
    Ok(out)
}
