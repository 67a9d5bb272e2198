//! Tagged row indices and the cross-table "less than" used by the two-way merge.

use crate::error::MergeResult;
use crate::row_compare::{RowComparator, SortKeys};
use crate::table::Table;
use std::cmp::Ordering;

/// Which of the two tables in a pairwise merge a row comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

/// A row of one of the two tables being merged.
///
/// Only meaningful within the pairwise merge that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaggedIndex {
    pub side: Side,
    pub row: usize,
}

impl TaggedIndex {
    pub fn left(row: usize) -> Self {
        Self {
            side: Side::Left,
            row,
        }
    }

    pub fn right(row: usize) -> Self {
        Self {
            side: Side::Right,
            row,
        }
    }
}

/// Strict-weak "less than" over tagged rows of two tables.
///
/// The merge kernel calls [`CrossTableComparator::less`] with operands from either side in
/// either slot, so table identity is resolved from the tags on every call.
pub struct CrossTableComparator<C> {
    left_left: C,
    left_right: C,
    right_right: C,
}

impl<'a, C: RowComparator<'a>> CrossTableComparator<C> {
    pub fn try_new(left: &'a Table, right: &'a Table, keys: &'a SortKeys) -> MergeResult<Self> {
        Ok(Self {
            left_left: C::try_new(left, left, keys)?,
            left_right: C::try_new(left, right, keys)?,
            right_right: C::try_new(right, right, keys)?,
        })
    }

    /// Whether row `a` sorts strictly before row `b`.
    pub fn less(&self, a: TaggedIndex, b: TaggedIndex) -> bool {
        match (a.side, b.side) {
            (Side::Left, Side::Right) => {
                self.left_right.compare(a.row, b.row) == Ordering::Less
            }
            // Same lhs=left / rhs=right comparator with the operands swapped: a (right) is
            // before b (left) exactly when b orders after a.
            (Side::Right, Side::Left) => {
                self.left_right.compare(b.row, a.row) == Ordering::Greater
            }
            (Side::Left, Side::Left) => self.left_left.compare(a.row, b.row) == Ordering::Less,
            (Side::Right, Side::Right) => {
                self.right_right.compare(a.row, b.row) == Ordering::Less
            }
        }
    }
}
