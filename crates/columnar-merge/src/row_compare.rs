//! Lexicographic row comparison over a set of key columns.
//!
//! A comparator is built for a pair of tables `(lhs, rhs)` and answers how row `i` of `lhs`
//! orders against row `j` of `rhs`. Building one with the same table on both sides gives the
//! single-table comparator.
//!
//! Two specialisations exist. [`FlatRowComparator`] resolves every key column to a typed leaf
//! comparison once, up front, and only supports non-nested keys. [`NestedRowComparator`] walks
//! the column tree on every call so struct (and list) keys compare field by field. They order
//! rows identically wherever both apply.

use crate::bitmap::Bitmap;
use crate::column::{with_primitive_pair, Column, ColumnData};
use crate::error::{MergeError, MergeResult};
use crate::table::Table;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColumnOrder {
    #[default]
    Ascending,
    Descending,
}

/// Where nulls land relative to non-null values, independent of [`ColumnOrder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NullOrder {
    #[default]
    NullsFirst,
    NullsLast,
}

/// Key columns plus per-key direction and null placement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortKeys {
    pub columns: Vec<usize>,
    pub column_order: Vec<ColumnOrder>,
    /// Empty means [`NullOrder::NullsFirst`] for every key.
    pub null_order: Vec<NullOrder>,
}

impl SortKeys {
    pub fn new(
        columns: Vec<usize>,
        column_order: Vec<ColumnOrder>,
        null_order: Vec<NullOrder>,
    ) -> Self {
        Self {
            columns,
            column_order,
            null_order,
        }
    }

    /// Every key ascending with nulls first.
    pub fn ascending(columns: Vec<usize>) -> Self {
        let column_order = vec![ColumnOrder::Ascending; columns.len()];
        Self {
            columns,
            column_order,
            null_order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn order(&self, key: usize) -> ColumnOrder {
        self.column_order.get(key).copied().unwrap_or_default()
    }

    pub(crate) fn nulls(&self, key: usize) -> NullOrder {
        self.null_order.get(key).copied().unwrap_or_default()
    }

    /// Check the key configuration against a table width.
    pub fn validate(&self, num_columns: usize) -> MergeResult<()> {
        if self.columns.is_empty() {
            return Err(MergeError::EmptyKeyColumns);
        }
        if self.columns.len() > num_columns {
            return Err(MergeError::TooManyKeyColumns {
                keys: self.columns.len(),
                columns: num_columns,
            });
        }
        if let Some(&key) = self.columns.iter().find(|&&key| key >= num_columns) {
            return Err(MergeError::KeyColumnOutOfRange {
                key,
                columns: num_columns,
            });
        }
        if self.column_order.len() != self.columns.len() {
            return Err(MergeError::ColumnOrderLengthMismatch {
                keys: self.columns.len(),
                orders: self.column_order.len(),
            });
        }
        if !self.null_order.is_empty() && self.null_order.len() != self.columns.len() {
            return Err(MergeError::NullOrderLengthMismatch {
                keys: self.columns.len(),
                orders: self.null_order.len(),
            });
        }
        Ok(())
    }

    /// Whether any key column of `table` needs the nested comparator.
    pub fn has_nested_keys(&self, table: &Table) -> bool {
        self.columns
            .iter()
            .filter_map(|&idx| table.column(idx))
            .any(|c| c.data_type().is_nested())
    }
}

/// Lexicographic comparator over the key columns of two tables.
pub trait RowComparator<'a>: Sized + Sync {
    fn try_new(lhs: &'a Table, rhs: &'a Table, keys: &'a SortKeys) -> MergeResult<Self>;

    /// How row `lhs_row` of the lhs table orders against row `rhs_row` of the rhs table.
    fn compare(&self, lhs_row: usize, rhs_row: usize) -> Ordering;
}

/// Value ordering used for keys: integers by value, floats with NaN greater than every other
/// value and equal to itself.
trait KeyOrd {
    fn key_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! key_ord_via_ord {
    ($($t:ty),*) => {
        $(impl KeyOrd for $t {
            fn key_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }
        })*
    };
}

key_ord_via_ord!(bool, i8, i16, i32, i64, u8, u16, u32, u64);

impl KeyOrd for f32 {
    fn key_cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(*self).cmp(&OrderedFloat(*other))
    }
}

impl KeyOrd for f64 {
    fn key_cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(*self).cmp(&OrderedFloat(*other))
    }
}

fn null_ordering(lhs_valid: bool, rhs_valid: bool, nulls: NullOrder) -> Option<Ordering> {
    match (lhs_valid, rhs_valid) {
        (true, true) => None,
        (false, false) => Some(Ordering::Equal),
        (false, true) => Some(match nulls {
            NullOrder::NullsFirst => Ordering::Less,
            NullOrder::NullsLast => Ordering::Greater,
        }),
        (true, false) => Some(match nulls {
            NullOrder::NullsFirst => Ordering::Greater,
            NullOrder::NullsLast => Ordering::Less,
        }),
    }
}

fn directed(ord: Ordering, order: ColumnOrder) -> Ordering {
    match order {
        ColumnOrder::Ascending => ord,
        ColumnOrder::Descending => ord.reverse(),
    }
}

fn is_valid(validity: Option<&Bitmap>, row: usize) -> bool {
    validity.map_or(true, |v| v.get(row))
}

fn key_pair<'a>(
    lhs: &'a Table,
    rhs: &'a Table,
    column: usize,
) -> MergeResult<(&'a Column, &'a Column)> {
    let out_of_range = |t: &Table| MergeError::KeyColumnOutOfRange {
        key: column,
        columns: t.num_columns(),
    };
    let l = lhs.column(column).ok_or_else(|| out_of_range(lhs))?;
    let r = rhs.column(column).ok_or_else(|| out_of_range(rhs))?;
    if l.data_type() != r.data_type() {
        return Err(MergeError::ColumnTypeMismatch {
            table: 1,
            column,
            expected: l.data_type().clone(),
            actual: r.data_type().clone(),
        });
    }
    Ok((l, r))
}

type LeafCmp<'a> = Box<dyn Fn(usize, usize) -> Ordering + Send + Sync + 'a>;

fn leaf<'a>(f: impl Fn(usize, usize) -> Ordering + Send + Sync + 'a) -> LeafCmp<'a> {
    Box::new(f)
}

struct FlatKey<'a> {
    leaf: LeafCmp<'a>,
    lhs_validity: Option<&'a Bitmap>,
    rhs_validity: Option<&'a Bitmap>,
    nulls: NullOrder,
}

/// Comparator for keys without nested columns; each key's leaf comparison is resolved once.
pub struct FlatRowComparator<'a> {
    keys: Vec<FlatKey<'a>>,
}

/// Directed comparison of two valid rows of `lhs` and `rhs`.
///
/// Dictionary keys can themselves be null; those resolve through `nulls` before the key values
/// are compared.
fn flat_leaf<'a>(
    column: usize,
    lhs: &'a Column,
    rhs: &'a Column,
    order: ColumnOrder,
    nulls: NullOrder,
) -> MergeResult<LeafCmp<'a>> {
    let unsupported = || MergeError::UnsupportedColumnType {
        column,
        data_type: lhs.data_type().clone(),
    };
    Ok(match (lhs.data(), rhs.data()) {
        (ColumnData::Primitive(l), ColumnData::Primitive(r)) => with_primitive_pair!(
            l, r,
            (l, r) => leaf(move |i, j| directed(l[i].key_cmp(&r[j]), order)),
            _ => return Err(unsupported())
        ),
        (
            ColumnData::Utf8 {
                offsets: lo,
                bytes: lb,
            },
            ColumnData::Utf8 {
                offsets: ro,
                bytes: rb,
            },
        ) => leaf(move |i, j| {
            directed(
                Column::utf8_bytes(lo, lb, i).cmp(Column::utf8_bytes(ro, rb, j)),
                order,
            )
        }),
        (
            ColumnData::Dictionary {
                indices: li,
                keys: lk,
            },
            ColumnData::Dictionary {
                indices: ri,
                keys: rk,
            },
        ) => {
            let keys = flat_leaf(column, lk, rk, order, nulls)?;
            let (lkv, rkv) = (lk.validity(), rk.validity());
            leaf(move |i, j| {
                let (a, b) = (li[i] as usize, ri[j] as usize);
                null_ordering(is_valid(lkv, a), is_valid(rkv, b), nulls)
                    .unwrap_or_else(|| keys(a, b))
            })
        }
        _ => return Err(unsupported()),
    })
}

impl<'a> RowComparator<'a> for FlatRowComparator<'a> {
    fn try_new(lhs: &'a Table, rhs: &'a Table, keys: &'a SortKeys) -> MergeResult<Self> {
        let keys = keys
            .columns
            .iter()
            .enumerate()
            .map(|(k, &column)| {
                let (l, r) = key_pair(lhs, rhs, column)?;
                let nulls = keys.nulls(k);
                Ok(FlatKey {
                    leaf: flat_leaf(column, l, r, keys.order(k), nulls)?,
                    lhs_validity: l.validity(),
                    rhs_validity: r.validity(),
                    nulls,
                })
            })
            .collect::<MergeResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    fn compare(&self, lhs_row: usize, rhs_row: usize) -> Ordering {
        for key in &self.keys {
            let lv = is_valid(key.lhs_validity, lhs_row);
            let rv = is_valid(key.rhs_validity, rhs_row);
            let ord = match null_ordering(lv, rv, key.nulls) {
                Some(ord) => ord,
                None => (key.leaf)(lhs_row, rhs_row),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

struct NestedKey<'a> {
    lhs: &'a Column,
    rhs: &'a Column,
    order: ColumnOrder,
    nulls: NullOrder,
}

/// Comparator that recurses into struct fields and list elements.
///
/// Child fields inherit the direction and null placement of the key they belong to.
pub struct NestedRowComparator<'a> {
    keys: Vec<NestedKey<'a>>,
}

fn compare_nested(
    lhs: &Column,
    i: usize,
    rhs: &Column,
    j: usize,
    order: ColumnOrder,
    nulls: NullOrder,
) -> Ordering {
    if let Some(ord) = null_ordering(lhs.is_valid(i), rhs.is_valid(j), nulls) {
        return ord;
    }
    match (lhs.data(), rhs.data()) {
        (ColumnData::Primitive(l), ColumnData::Primitive(r)) => with_primitive_pair!(
            l, r,
            (l, r) => directed(l[i].key_cmp(&r[j]), order),
            _ => Ordering::Equal
        ),
        (
            ColumnData::Utf8 {
                offsets: lo,
                bytes: lb,
            },
            ColumnData::Utf8 {
                offsets: ro,
                bytes: rb,
            },
        ) => directed(
            Column::utf8_bytes(lo, lb, i).cmp(Column::utf8_bytes(ro, rb, j)),
            order,
        ),
        (
            ColumnData::Dictionary {
                indices: li,
                keys: lk,
            },
            ColumnData::Dictionary {
                indices: ri,
                keys: rk,
            },
        ) => compare_nested(lk, li[i] as usize, rk, ri[j] as usize, order, nulls),
        (ColumnData::Struct { children: lc }, ColumnData::Struct { children: rc }) => lc
            .iter()
            .zip(rc)
            .map(|(l, r)| compare_nested(l, i, r, j, order, nulls))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal),
        (
            ColumnData::List {
                offsets: lo,
                child: lc,
            },
            ColumnData::List {
                offsets: ro,
                child: rc,
            },
        ) => {
            let (ls, le) = (lo[i], lo[i + 1]);
            let (rs, re) = (ro[j], ro[j + 1]);
            (ls..le)
                .zip(rs..re)
                .map(|(a, b)| compare_nested(lc, a, rc, b, order, nulls))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or_else(|| directed((le - ls).cmp(&(re - rs)), order))
        }
        // Key types were checked to match when the comparator was built.
        _ => Ordering::Equal,
    }
}

impl<'a> RowComparator<'a> for NestedRowComparator<'a> {
    fn try_new(lhs: &'a Table, rhs: &'a Table, keys: &'a SortKeys) -> MergeResult<Self> {
        let keys = keys
            .columns
            .iter()
            .enumerate()
            .map(|(k, &column)| {
                let (l, r) = key_pair(lhs, rhs, column)?;
                Ok(NestedKey {
                    lhs: l,
                    rhs: r,
                    order: keys.order(k),
                    nulls: keys.nulls(k),
                })
            })
            .collect::<MergeResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    fn compare(&self, lhs_row: usize, rhs_row: usize) -> Ordering {
        for key in &self.keys {
            let ord = compare_nested(key.lhs, lhs_row, key.rhs, rhs_row, key.order, key.nulls);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn is_sorted_with<'a, C: RowComparator<'a>>(
    table: &'a Table,
    keys: &'a SortKeys,
) -> MergeResult<bool> {
    let cmp = C::try_new(table, table, keys)?;
    Ok((1..table.num_rows()).all(|row| cmp.compare(row - 1, row) != Ordering::Greater))
}

/// Whether `table` is ordered by `keys` (ties allowed).
pub fn is_sorted(table: &Table, keys: &SortKeys) -> MergeResult<bool> {
    keys.validate(table.num_columns())?;
    if keys.has_nested_keys(table) {
        is_sorted_with::<NestedRowComparator<'_>>(table, keys)
    } else {
        is_sorted_with::<FlatRowComparator<'_>>(table, keys)
    }
}
