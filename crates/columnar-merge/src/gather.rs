//! Gather and concatenation per column encoding.

use crate::bitmap::Bitmap;
use crate::column::{
    with_primitive, with_primitive_pair, Column, ColumnData, PrimitiveType, PrimitiveValues,
};
use crate::error::{MergeError, MergeResult};
use crate::types::DataType;
use std::sync::Arc;

fn take<T: PrimitiveType>(values: &[T], rows: &[usize]) -> PrimitiveValues {
    T::into_values(rows.iter().map(|&row| values[row]).collect())
}

fn append_values(dest: &mut PrimitiveValues, src: &PrimitiveValues) -> MergeResult<()> {
    let (expected, actual) = (dest.data_type(), src.data_type());
    with_primitive_pair!(
        dest, src,
        (d, s) => {
            d.extend_from_slice(s);
            Ok(())
        },
        _ => Err(MergeError::DataTypeMismatch { expected, actual })
    )
}

fn gather_offsets(offsets: &[usize], rows: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut out = Vec::with_capacity(rows.len() + 1);
    let mut values = Vec::new();
    out.push(0);
    for &row in rows {
        values.extend(offsets[row]..offsets[row + 1]);
        out.push(values.len());
    }
    (out, values)
}

impl Column {
    /// New column holding rows `rows` of `self`, in that order. Rows may repeat.
    pub fn gather(&self, rows: &[usize]) -> MergeResult<Column> {
        if let Some(&row) = rows.iter().find(|&&row| row >= self.len()) {
            return Err(MergeError::RowOutOfRange {
                row,
                len: self.len(),
            });
        }

        let data = match self.data() {
            ColumnData::Primitive(values) => {
                ColumnData::Primitive(with_primitive!(values, v => take(v, rows)))
            }
            ColumnData::Utf8 { offsets, bytes } => {
                let (offsets, positions) = gather_offsets(offsets, rows);
                ColumnData::Utf8 {
                    offsets,
                    bytes: positions.into_iter().map(|p| bytes[p]).collect(),
                }
            }
            ColumnData::Dictionary { indices, keys } => ColumnData::Dictionary {
                indices: rows.iter().map(|&row| indices[row]).collect(),
                keys: Arc::clone(keys),
            },
            ColumnData::Struct { children } => ColumnData::Struct {
                children: children
                    .iter()
                    .map(|c| c.gather(rows))
                    .collect::<MergeResult<Vec<_>>>()?,
            },
            ColumnData::List { offsets, child } => {
                let (offsets, child_rows) = gather_offsets(offsets, rows);
                ColumnData::List {
                    offsets,
                    child: Box::new(child.gather(&child_rows)?),
                }
            }
        };

        let validity = self
            .validity()
            .map(|v| Bitmap::from_bools(&rows.iter().map(|&row| v.get(row)).collect::<Vec<_>>()));
        Ok(Column::from_parts(
            self.data_type().clone(),
            rows.len(),
            data,
            validity,
        ))
    }

    /// Concatenate columns of type `data_type` end to end.
    ///
    /// Dictionary columns must share one key column.
    pub fn concat(data_type: &DataType, columns: &[&Column]) -> MergeResult<Column> {
        if let Some(col) = columns.iter().find(|c| c.data_type() != data_type) {
            return Err(MergeError::DataTypeMismatch {
                expected: data_type.clone(),
                actual: col.data_type().clone(),
            });
        }
        let Some(first) = columns.first() else {
            return Ok(Column::new_empty(data_type));
        };
        let len: usize = columns.iter().map(|c| c.len()).sum();

        let data = match first.data() {
            ColumnData::Primitive(values) => {
                let mut out = PrimitiveValues::empty(data_type).ok_or_else(|| {
                    MergeError::EncodingMismatch {
                        data_type: data_type.clone(),
                    }
                })?;
                for col in columns {
                    match col.data() {
                        ColumnData::Primitive(src) => append_values(&mut out, src)?,
                        _ => {
                            return Err(MergeError::EncodingMismatch {
                                data_type: values.data_type(),
                            })
                        }
                    }
                }
                ColumnData::Primitive(out)
            }
            ColumnData::Utf8 { .. } => {
                let mut offsets = vec![0usize];
                let mut bytes = Vec::new();
                for col in columns {
                    if let ColumnData::Utf8 {
                        offsets: src_offsets,
                        bytes: src_bytes,
                    } = col.data()
                    {
                        let start = src_offsets[0];
                        let end = src_offsets[src_offsets.len() - 1];
                        let base = bytes.len();
                        bytes.extend_from_slice(&src_bytes[start..end]);
                        offsets.extend(src_offsets[1..].iter().map(|&o| o - start + base));
                    }
                }
                ColumnData::Utf8 { offsets, bytes }
            }
            ColumnData::Dictionary { keys, .. } => {
                let mut indices = Vec::with_capacity(len);
                for col in columns {
                    if let ColumnData::Dictionary {
                        indices: src,
                        keys: src_keys,
                    } = col.data()
                    {
                        if !Arc::ptr_eq(keys, src_keys) && keys != src_keys {
                            return Err(MergeError::DictionaryKeysMismatch { column: 0 });
                        }
                        indices.extend_from_slice(src);
                    }
                }
                ColumnData::Dictionary {
                    indices,
                    keys: Arc::clone(keys),
                }
            }
            ColumnData::Struct { children } => {
                let DataType::Struct(fields) = data_type else {
                    return Err(MergeError::EncodingMismatch {
                        data_type: data_type.clone(),
                    });
                };
                let children = (0..children.len())
                    .zip(fields)
                    .map(|(idx, field)| {
                        let parts: Vec<&Column> =
                            columns.iter().map(|c| &c.children()[idx]).collect();
                        Column::concat(&field.data_type, &parts)
                    })
                    .collect::<MergeResult<Vec<_>>>()?;
                ColumnData::Struct { children }
            }
            ColumnData::List { child, .. } => {
                let mut offsets = vec![0usize];
                let mut child_rows = Vec::new();
                for col in columns {
                    if let ColumnData::List {
                        offsets: src_offsets,
                        child: src_child,
                    } = col.data()
                    {
                        let start = src_offsets[0];
                        let end = src_offsets[src_offsets.len() - 1];
                        let base = offsets[offsets.len() - 1];
                        offsets.extend(src_offsets[1..].iter().map(|&o| o - start + base));
                        child_rows.push((&**src_child, start..end));
                    }
                }
                let parts = child_rows
                    .iter()
                    .map(|(c, range)| c.gather(&range.clone().collect::<Vec<_>>()))
                    .collect::<MergeResult<Vec<_>>>()?;
                let parts: Vec<&Column> = parts.iter().collect();
                ColumnData::List {
                    offsets,
                    child: Box::new(Column::concat(child.data_type(), &parts)?),
                }
            }
        };

        let validity = if columns.iter().any(|c| c.is_nullable()) {
            let mut bits = Bitmap::with_capacity_bits(len);
            for col in columns {
                match col.validity() {
                    Some(v) => bits.extend_from_bitmap(v),
                    None => bits.extend_constant(col.len(), true),
                }
            }
            Some(bits)
        } else {
            None
        };

        Ok(Column::from_parts(data_type.clone(), len, data, validity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn gather_repeats_and_reorders_rows() {
        let col = Column::from_opt_strs([Some("a"), None, Some("ccc")]);
        let out = col.gather(&[2, 0, 2, 1]).unwrap();
        assert_eq!(
            out.values(),
            vec![
                Value::from("ccc"),
                Value::from("a"),
                Value::from("ccc"),
                Value::Null,
            ]
        );
        assert_eq!(col.gather(&[3]).unwrap_err(), MergeError::RowOutOfRange { row: 3, len: 3 });
    }

    #[test]
    fn concat_mixes_masked_and_unmasked_inputs() {
        let a = Column::from_values(vec![1i16, 2]);
        let b = Column::from_options(vec![None, Some(4i16)]);
        let out = Column::concat(&DataType::Int16, &[&a, &b]).unwrap();
        assert_eq!(out.values(), vec![Value::Int(1), Value::Int(2), Value::Null, Value::Int(4)]);
        assert_eq!(out.null_count(), 1);
    }

    #[test]
    fn concat_lists_rebases_offsets() {
        let a = Column::new_list(vec![0, 2], Column::from_values(vec![1i64, 2]), None).unwrap();
        let b = Column::new_list(vec![0, 0, 1], Column::from_values(vec![3i64]), None).unwrap();
        let out = Column::concat(a.data_type(), &[&a, &b]).unwrap();
        assert_eq!(
            out.values(),
            vec![
                Value::List(vec![Value::Int(1), Value::Int(2)]),
                Value::List(vec![]),
                Value::List(vec![Value::Int(3)]),
            ]
        );
    }
}
