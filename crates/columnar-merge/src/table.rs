use crate::column::{Column, ColumnData};
use crate::error::{MergeError, MergeResult};
use crate::memory::{MemoryPool, MemoryReservation};
use crate::types::{DataType, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// An ordered set of equally long columns.
///
/// Tables produced by a merge hold a reservation against the pool that paid for them; the
/// bytes are released when the last clone of the table is dropped.
#[derive(Clone)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
    reservation: Option<Arc<MemoryReservation>>,
}

impl Table {
    pub fn try_new(columns: Vec<Column>) -> MergeResult<Self> {
        let num_rows = columns.first().map_or(0, Column::len);
        for column in &columns {
            if column.len() != num_rows {
                return Err(MergeError::LengthMismatch {
                    expected: num_rows,
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            columns,
            num_rows,
            reservation: None,
        })
    }

    /// Table with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            num_rows: 0,
            reservation: None,
        }
    }

    /// Zero-row table with the same column types as `other`.
    pub fn empty_like(other: &Table) -> Self {
        Self {
            columns: other
                .columns
                .iter()
                .map(|c| Column::new_empty(c.data_type()))
                .collect(),
            num_rows: 0,
            reservation: None,
        }
    }

    pub(crate) fn from_columns_unchecked(columns: Vec<Column>, num_rows: usize) -> Self {
        debug_assert!(columns.iter().all(|c| c.len() == num_rows));
        Self {
            columns,
            num_rows,
            reservation: None,
        }
    }

    /// Hand the bytes of `reservation` to this table; they are released with its last clone.
    pub(crate) fn with_reservation(mut self, reservation: MemoryReservation) -> Self {
        self.reservation = Some(Arc::new(reservation));
        self
    }

    /// Deep copy billed to `pool`.
    pub(crate) fn copy_billed_to(&self, pool: &Arc<dyn MemoryPool>) -> MergeResult<Self> {
        let mut reservation = MemoryReservation::new(pool);
        reservation.try_grow(self.size_bytes())?;
        let copy = Self::from_columns_unchecked(self.columns.clone(), self.num_rows);
        Ok(copy.with_reservation(reservation))
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn schema(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type().clone()).collect()
    }

    pub fn get_cell(&self, row: usize, col: usize) -> Value {
        match self.columns.get(col) {
            Some(column) => column.value(row),
            None => Value::Null,
        }
    }

    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    /// Row-major copy of every cell.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.num_rows).map(|r| self.row(r)).collect()
    }

    /// Bytes held by the columns, counting each shared dictionary key column once.
    pub fn size_bytes(&self) -> usize {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .map(|c| c.size_bytes() + shared_key_bytes(c, &mut seen))
            .sum()
    }

    /// Bytes currently billed to a pool on behalf of this table.
    pub fn reserved_bytes(&self) -> usize {
        self.reservation.as_ref().map_or(0, |r| r.size())
    }
}

fn shared_key_bytes(column: &Column, seen: &mut HashSet<*const Column>) -> usize {
    match column.data() {
        ColumnData::Dictionary { keys, .. } => {
            if seen.insert(Arc::as_ptr(keys)) {
                keys.size_bytes() + shared_key_bytes(keys, seen)
            } else {
                0
            }
        }
        ColumnData::Struct { children } => {
            children.iter().map(|c| shared_key_bytes(c, seen)).sum()
        }
        ColumnData::List { child, .. } => shared_key_bytes(child, seen),
        _ => 0,
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.num_rows == other.num_rows && self.columns == other.columns
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("num_rows", &self.num_rows)
            .field("columns", &self.columns)
            .field("reserved_bytes", &self.reserved_bytes())
            .finish()
    }
}
