//! Order-preserving merge of pre-sorted columnar tables.
//!
//! This crate focuses on:
//! - Merging N tables that are each sorted by the same key columns into one sorted table.
//! - Heterogeneous encodings: fixed-width, UTF-8 strings, dictionary-encoded and struct columns.
//! - Exact null propagation (validity bitmaps are merged word by word).
//! - Data-parallel kernels (merge-path partitioning, grouped bitmask assembly, gathers) on a
//!   crate-local Rayon pool, with sequential fallbacks.
//! - Bounded intermediate memory: the N-way merge bills intermediates to a scratch pool and
//!   only the final table to the caller's pool.

#![forbid(unsafe_code)]

mod bitmap;
mod column;
mod comparator;
mod dictionary;
mod error;
mod gather;
mod materialize;
mod memory;
mod merge;
mod merge_path;
mod parallel;
mod row_compare;
mod table;
mod types;
mod validity;

pub use crate::bitmap::Bitmap;
pub use crate::column::{Column, ColumnData, PrimitiveType, PrimitiveValues};
pub use crate::comparator::{CrossTableComparator, Side, TaggedIndex};
pub use crate::dictionary::unify_dictionaries;
pub use crate::error::{MergeError, MergeResult};
pub use crate::materialize::merge_column;
pub use crate::memory::{GreedyMemoryPool, MemoryPool, MemoryReservation, UnboundedMemoryPool};
pub use crate::merge::{
    merge, merge_pair, merge_tagged_indices, merge_with_options, MergeOptions,
};
pub use crate::merge_path::merge_path;
pub use crate::parallel::{ParallelConfig, DEFAULT_CHUNK_ROWS, DEFAULT_MIN_ROWS_FOR_PARALLEL};
pub use crate::row_compare::{
    is_sorted, ColumnOrder, FlatRowComparator, NestedRowComparator, NullOrder, RowComparator,
    SortKeys,
};
pub use crate::table::Table;
pub use crate::types::{DataType, Field, Value};
pub use crate::validity::merge_validity_into;
