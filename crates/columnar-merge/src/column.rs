use crate::bitmap::Bitmap;
use crate::error::{MergeError, MergeResult};
use crate::types::{DataType, Field, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Values of a fixed-width column, one contiguous buffer per physical type.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveValues {
    Boolean(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Expands `$body` once per `PrimitiveValues` variant with `$v` bound to the inner `Vec`.
macro_rules! with_primitive {
    ($values:expr, $v:ident => $body:expr) => {{
        use $crate::column::PrimitiveValues as P;
        match $values {
            P::Boolean($v) => $body,
            P::Int8($v) => $body,
            P::Int16($v) => $body,
            P::Int32($v) => $body,
            P::Int64($v) => $body,
            P::UInt8($v) => $body,
            P::UInt16($v) => $body,
            P::UInt32($v) => $body,
            P::UInt64($v) => $body,
            P::Float32($v) => $body,
            P::Float64($v) => $body,
        }
    }};
}

/// Expands `$body` for a pair of `PrimitiveValues` of the same variant; `$mismatch` otherwise.
macro_rules! with_primitive_pair {
    ($lhs:expr, $rhs:expr, ($l:ident, $r:ident) => $body:expr, _ => $mismatch:expr) => {{
        use $crate::column::PrimitiveValues as P;
        match ($lhs, $rhs) {
            (P::Boolean($l), P::Boolean($r)) => $body,
            (P::Int8($l), P::Int8($r)) => $body,
            (P::Int16($l), P::Int16($r)) => $body,
            (P::Int32($l), P::Int32($r)) => $body,
            (P::Int64($l), P::Int64($r)) => $body,
            (P::UInt8($l), P::UInt8($r)) => $body,
            (P::UInt16($l), P::UInt16($r)) => $body,
            (P::UInt32($l), P::UInt32($r)) => $body,
            (P::UInt64($l), P::UInt64($r)) => $body,
            (P::Float32($l), P::Float32($r)) => $body,
            (P::Float64($l), P::Float64($r)) => $body,
            _ => $mismatch,
        }
    }};
}

pub(crate) use with_primitive;
pub(crate) use with_primitive_pair;

impl PrimitiveValues {
    pub fn len(&self) -> usize {
        with_primitive!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PrimitiveValues::Boolean(_) => DataType::Boolean,
            PrimitiveValues::Int8(_) => DataType::Int8,
            PrimitiveValues::Int16(_) => DataType::Int16,
            PrimitiveValues::Int32(_) => DataType::Int32,
            PrimitiveValues::Int64(_) => DataType::Int64,
            PrimitiveValues::UInt8(_) => DataType::UInt8,
            PrimitiveValues::UInt16(_) => DataType::UInt16,
            PrimitiveValues::UInt32(_) => DataType::UInt32,
            PrimitiveValues::UInt64(_) => DataType::UInt64,
            PrimitiveValues::Float32(_) => DataType::Float32,
            PrimitiveValues::Float64(_) => DataType::Float64,
        }
    }

    /// Empty buffer for a fixed-width type, `None` for variable-width and nested types.
    pub fn empty(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => PrimitiveValues::Boolean(Vec::new()),
            DataType::Int8 => PrimitiveValues::Int8(Vec::new()),
            DataType::Int16 => PrimitiveValues::Int16(Vec::new()),
            DataType::Int32 => PrimitiveValues::Int32(Vec::new()),
            DataType::Int64 => PrimitiveValues::Int64(Vec::new()),
            DataType::UInt8 => PrimitiveValues::UInt8(Vec::new()),
            DataType::UInt16 => PrimitiveValues::UInt16(Vec::new()),
            DataType::UInt32 => PrimitiveValues::UInt32(Vec::new()),
            DataType::UInt64 => PrimitiveValues::UInt64(Vec::new()),
            DataType::Float32 => PrimitiveValues::Float32(Vec::new()),
            DataType::Float64 => PrimitiveValues::Float64(Vec::new()),
            DataType::Utf8 | DataType::Dictionary(_) | DataType::Struct(_) | DataType::List(_) => {
                return None
            }
        })
    }

    fn value(&self, row: usize) -> Value {
        match self {
            PrimitiveValues::Boolean(v) => Value::Boolean(v[row]),
            PrimitiveValues::Int8(v) => Value::Int(v[row].into()),
            PrimitiveValues::Int16(v) => Value::Int(v[row].into()),
            PrimitiveValues::Int32(v) => Value::Int(v[row].into()),
            PrimitiveValues::Int64(v) => Value::Int(v[row]),
            PrimitiveValues::UInt8(v) => Value::UInt(v[row].into()),
            PrimitiveValues::UInt16(v) => Value::UInt(v[row].into()),
            PrimitiveValues::UInt32(v) => Value::UInt(v[row].into()),
            PrimitiveValues::UInt64(v) => Value::UInt(v[row]),
            PrimitiveValues::Float32(v) => Value::Float(v[row].into()),
            PrimitiveValues::Float64(v) => Value::Float(v[row]),
        }
    }

    fn size_bytes(&self) -> usize {
        with_primitive!(self, v => std::mem::size_of_val(v.as_slice()))
    }
}

/// Native Rust types that back a [`PrimitiveValues`] variant.
pub trait PrimitiveType: Copy + Default + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn into_values(values: Vec<Self>) -> PrimitiveValues;
}

macro_rules! primitive_type {
    ($native:ty, $variant:ident) => {
        impl PrimitiveType for $native {
            const DATA_TYPE: DataType = DataType::$variant;

            fn into_values(values: Vec<Self>) -> PrimitiveValues {
                PrimitiveValues::$variant(values)
            }
        }
    };
}

primitive_type!(bool, Boolean);
primitive_type!(i8, Int8);
primitive_type!(i16, Int16);
primitive_type!(i32, Int32);
primitive_type!(i64, Int64);
primitive_type!(u8, UInt8);
primitive_type!(u16, UInt16);
primitive_type!(u32, UInt32);
primitive_type!(u64, UInt64);
primitive_type!(f32, Float32);
primitive_type!(f64, Float64);

/// Physical storage of a column, one variant per encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Primitive(PrimitiveValues),
    /// `offsets` has `len + 1` entries; row `i` is `bytes[offsets[i]..offsets[i + 1]]`.
    Utf8 { offsets: Vec<usize>, bytes: Vec<u8> },
    /// Indices into `keys`; the key column is shared between every column that uses it.
    Dictionary { indices: Vec<u32>, keys: Arc<Column> },
    Struct { children: Vec<Column> },
    List { offsets: Vec<usize>, child: Box<Column> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    data_type: DataType,
    len: usize,
    data: ColumnData,
    validity: Option<Bitmap>,
}

impl Column {
    /// Assemble a column from parts, checking that buffers agree on length.
    pub fn try_new(
        data_type: DataType,
        data: ColumnData,
        validity: Option<Bitmap>,
    ) -> MergeResult<Self> {
        let len = match (&data_type, &data) {
            (_, ColumnData::Primitive(values)) => {
                if values.data_type() != data_type {
                    return Err(MergeError::DataTypeMismatch {
                        expected: data_type.clone(),
                        actual: values.data_type(),
                    });
                }
                values.len()
            }
            (DataType::Utf8, ColumnData::Utf8 { offsets, bytes }) => {
                check_offsets(offsets, bytes.len())?;
                offsets.len() - 1
            }
            (DataType::Dictionary(value_type), ColumnData::Dictionary { indices, keys }) => {
                if keys.data_type() != value_type.as_ref() {
                    return Err(MergeError::DataTypeMismatch {
                        expected: value_type.as_ref().clone(),
                        actual: keys.data_type().clone(),
                    });
                }
                for (row, &index) in indices.iter().enumerate() {
                    let valid = validity.as_ref().map_or(true, |v| row >= v.len() || v.get(row));
                    if valid && index as usize >= keys.len() {
                        return Err(MergeError::DictionaryIndexOutOfRange {
                            row,
                            index,
                            keys: keys.len(),
                        });
                    }
                }
                indices.len()
            }
            (DataType::Struct(fields), ColumnData::Struct { children }) => {
                if fields.len() != children.len() {
                    return Err(MergeError::LengthMismatch {
                        expected: fields.len(),
                        actual: children.len(),
                    });
                }
                let len = children.first().map_or(0, Column::len);
                for child in children {
                    if child.len() != len {
                        return Err(MergeError::LengthMismatch {
                            expected: len,
                            actual: child.len(),
                        });
                    }
                }
                len
            }
            (DataType::List(_), ColumnData::List { offsets, child }) => {
                check_offsets(offsets, child.len())?;
                offsets.len() - 1
            }
            _ => {
                return Err(MergeError::EncodingMismatch {
                    data_type: data_type.clone(),
                })
            }
        };

        if let Some(validity) = &validity {
            if validity.len() != len {
                return Err(MergeError::LengthMismatch {
                    expected: len,
                    actual: validity.len(),
                });
            }
        }

        Ok(Self {
            data_type,
            len,
            data,
            validity,
        })
    }

    /// Build a column whose parts are known to be consistent (merge and gather outputs).
    pub(crate) fn from_parts(
        data_type: DataType,
        len: usize,
        data: ColumnData,
        validity: Option<Bitmap>,
    ) -> Self {
        debug_assert!(validity.as_ref().map_or(true, |v| v.len() == len));
        Self {
            data_type,
            len,
            data,
            validity,
        }
    }

    pub fn from_values<T: PrimitiveType>(values: Vec<T>) -> Self {
        let len = values.len();
        Self::from_parts(
            T::DATA_TYPE,
            len,
            ColumnData::Primitive(T::into_values(values)),
            None,
        )
    }

    /// Nullable fixed-width column; `None` entries become null rows holding `T::default()`.
    pub fn from_options<T: PrimitiveType>(values: Vec<Option<T>>) -> Self {
        let validity = Bitmap::from_bools(&values.iter().map(Option::is_some).collect::<Vec<_>>());
        let values: Vec<T> = values.into_iter().map(Option::unwrap_or_default).collect();
        let len = values.len();
        Self::from_parts(
            T::DATA_TYPE,
            len,
            ColumnData::Primitive(T::into_values(values)),
            Some(validity),
        )
    }

    pub fn from_strs<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::from_opt_strs(values.into_iter().map(Some)).without_validity()
    }

    pub fn from_opt_strs<S: AsRef<str>>(values: impl IntoIterator<Item = Option<S>>) -> Self {
        let mut offsets = vec![0usize];
        let mut bytes = Vec::new();
        let mut validity = Bitmap::new();
        for value in values {
            validity.push(value.is_some());
            if let Some(s) = value {
                bytes.extend_from_slice(s.as_ref().as_bytes());
            }
            offsets.push(bytes.len());
        }
        let len = validity.len();
        Self::from_parts(
            DataType::Utf8,
            len,
            ColumnData::Utf8 { offsets, bytes },
            Some(validity),
        )
    }

    /// Dictionary-encode strings; keys are assigned in first-seen order.
    pub fn dictionary_from_strs<S: AsRef<str>>(
        values: impl IntoIterator<Item = Option<S>>,
    ) -> Self {
        let mut keys: Vec<String> = Vec::new();
        let mut key_map: HashMap<String, u32> = HashMap::new();
        let mut indices = Vec::new();
        let mut validity = Bitmap::new();
        for value in values {
            validity.push(value.is_some());
            let idx = match value {
                Some(s) => {
                    let s = s.as_ref();
                    match key_map.get(s) {
                        Some(&idx) => idx,
                        None => {
                            let idx = keys.len() as u32;
                            keys.push(s.to_owned());
                            key_map.insert(s.to_owned(), idx);
                            idx
                        }
                    }
                }
                None => 0,
            };
            indices.push(idx);
        }
        let keys = Arc::new(Self::from_strs(keys));
        let len = indices.len();
        Self::from_parts(
            DataType::Dictionary(Box::new(DataType::Utf8)),
            len,
            ColumnData::Dictionary { indices, keys },
            Some(validity),
        )
    }

    pub fn new_dictionary(
        indices: Vec<u32>,
        keys: Arc<Column>,
        validity: Option<Bitmap>,
    ) -> MergeResult<Self> {
        let data_type = DataType::Dictionary(Box::new(keys.data_type().clone()));
        Self::try_new(data_type, ColumnData::Dictionary { indices, keys }, validity)
    }

    pub fn new_struct(
        children: Vec<(String, Column)>,
        validity: Option<Bitmap>,
    ) -> MergeResult<Self> {
        let fields = children
            .iter()
            .map(|(name, col)| Field::new(name.clone(), col.data_type().clone()))
            .collect();
        let children = children.into_iter().map(|(_, col)| col).collect();
        Self::try_new(
            DataType::Struct(fields),
            ColumnData::Struct { children },
            validity,
        )
    }

    pub fn new_list(
        offsets: Vec<usize>,
        child: Column,
        validity: Option<Bitmap>,
    ) -> MergeResult<Self> {
        let data_type = DataType::List(Box::new(child.data_type().clone()));
        Self::try_new(
            data_type,
            ColumnData::List {
                offsets,
                child: Box::new(child),
            },
            validity,
        )
    }

    /// Zero-row column of the given type (nested types get zero-row children).
    pub fn new_empty(data_type: &DataType) -> Self {
        let data = match data_type {
            DataType::Utf8 => ColumnData::Utf8 {
                offsets: vec![0],
                bytes: Vec::new(),
            },
            DataType::Dictionary(value_type) => ColumnData::Dictionary {
                indices: Vec::new(),
                keys: Arc::new(Self::new_empty(value_type)),
            },
            DataType::Struct(fields) => ColumnData::Struct {
                children: fields
                    .iter()
                    .map(|f| Self::new_empty(&f.data_type))
                    .collect(),
            },
            DataType::List(child) => ColumnData::List {
                offsets: vec![0],
                child: Box::new(Self::new_empty(child)),
            },
            fixed => match PrimitiveValues::empty(fixed) {
                Some(values) => ColumnData::Primitive(values),
                None => unreachable!("variable-width types handled above"),
            },
        };
        Self::from_parts(data_type.clone(), 0, data, None)
    }

    /// Attach (or replace) the validity mask.
    pub fn with_validity(mut self, validity: Option<Bitmap>) -> MergeResult<Self> {
        if let Some(v) = &validity {
            if v.len() != self.len {
                return Err(MergeError::LengthMismatch {
                    expected: self.len,
                    actual: v.len(),
                });
            }
        }
        self.validity = validity;
        Ok(self)
    }

    fn without_validity(mut self) -> Self {
        self.validity = None;
        self
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> Option<&Bitmap> {
        self.validity.as_ref()
    }

    /// Whether the column carries a validity mask (it may still have zero nulls).
    pub fn is_nullable(&self) -> bool {
        self.validity.is_some()
    }

    pub fn null_count(&self) -> usize {
        self.validity.as_ref().map_or(0, Bitmap::count_zeros)
    }

    pub fn has_nulls(&self) -> bool {
        self.null_count() > 0
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.as_ref().map_or(true, |v| v.get(row))
    }

    pub fn children(&self) -> &[Column] {
        match &self.data {
            ColumnData::Struct { children } => children,
            ColumnData::List { child, .. } => std::slice::from_ref(child.as_ref()),
            _ => &[],
        }
    }

    /// Raw bytes of row `row` of a string column.
    pub(crate) fn utf8_bytes<'b>(offsets: &[usize], bytes: &'b [u8], row: usize) -> &'b [u8] {
        &bytes[offsets[row]..offsets[row + 1]]
    }

    pub fn value(&self, row: usize) -> Value {
        if row >= self.len || !self.is_valid(row) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Primitive(values) => values.value(row),
            ColumnData::Utf8 { offsets, bytes } => Value::String(Arc::from(
                String::from_utf8_lossy(Self::utf8_bytes(offsets, bytes, row)).as_ref(),
            )),
            ColumnData::Dictionary { indices, keys } => keys.value(indices[row] as usize),
            ColumnData::Struct { children } => {
                Value::Struct(children.iter().map(|c| c.value(row)).collect())
            }
            ColumnData::List { offsets, child } => {
                Value::List((offsets[row]..offsets[row + 1]).map(|i| child.value(i)).collect())
            }
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len).map(|row| self.value(row)).collect()
    }

    /// Bytes owned by this column's buffers. Shared dictionary keys are not counted.
    pub fn size_bytes(&self) -> usize {
        let validity = self.validity.as_ref().map_or(0, Bitmap::size_bytes);
        let data = match &self.data {
            ColumnData::Primitive(values) => values.size_bytes(),
            ColumnData::Utf8 { offsets, bytes } => {
                std::mem::size_of_val(offsets.as_slice()) + bytes.len()
            }
            ColumnData::Dictionary { indices, .. } => std::mem::size_of_val(indices.as_slice()),
            ColumnData::Struct { children } => children.iter().map(Column::size_bytes).sum(),
            ColumnData::List { offsets, child } => {
                std::mem::size_of_val(offsets.as_slice()) + child.size_bytes()
            }
        };
        validity + data
    }
}

fn check_offsets(offsets: &[usize], values_len: usize) -> MergeResult<()> {
    if offsets.is_empty()
        || offsets.windows(2).any(|w| w[0] > w[1])
        || offsets.last().is_some_and(|&last| last > values_len)
    {
        return Err(MergeError::InvalidOffsets);
    }
    Ok(())
}
