//! Dense tensor payloads built from nested JSON arrays.
//!
//! A payload is encoded by walking the nested arrays depth-first. The first array seen at a
//! given depth fixes the size of that axis, and every later array at the same depth must agree
//! with it. A tensor holds 32-bit integers while every scalar is integral, and switches to floats
//! (widening the values already stored) at the first fractional scalar. Scalars are appended in
//! traversal order, which for a rectangular input is row-major order.
use crate::EncodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "DT_FLOAT")]
    Float,
    #[serde(rename = "DT_INT32")]
    Int32,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float => write!(f, "DT_FLOAT"),
            DataType::Int32 => write!(f, "DT_INT32"),
        }
    }
}

/// Flat, row-major element buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TensorValues {
    Float(Vec<f32>),
    Int32(Vec<i32>),
}

impl TensorValues {
    /// Pick the buffer kind from the first scalar of the tensor.
    fn infer(first: &Value) -> Result<Self, EncodeError> {
        match first {
            Value::Number(n) if n.is_f64() => Ok(Self::Float(vec![])),
            Value::Number(_) => Ok(Self::Int32(vec![])),
            other => Err(EncodeError::UnsupportedElementType(format!(
                "expected a number, found {}",
                kind(other)
            ))),
        }
    }

    fn push(&mut self, value: &Value) -> Result<(), EncodeError> {
        let number = match value {
            Value::Number(n) => n,
            Value::Array(_) => {
                return Err(EncodeError::InvalidPayloadShape(
                    "found an array among scalar values".to_string(),
                ))
            }
            other => {
                return Err(EncodeError::UnsupportedElementType(format!(
                    "expected a number, found {}",
                    kind(other)
                )))
            }
        };

        match self {
            Self::Float(values) => {
                // Integral numbers always have an f64 representation.
                let v = number.as_f64().ok_or_else(|| {
                    EncodeError::UnsupportedElementType(format!("{number} is not a float"))
                })?;
                values.push(v as f32);
            }
            Self::Int32(values) if number.is_f64() => {
                let mut widened: Vec<f32> = values.iter().map(|v| *v as f32).collect();
                widened.push(number.as_f64().unwrap_or_default() as f32);
                *self = Self::Float(widened);
            }
            Self::Int32(values) => {
                let v = number
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| {
                        EncodeError::UnsupportedElementType(format!(
                            "{number} does not fit in a 32-bit integer"
                        ))
                    })?;
                values.push(v);
            }
        }

        Ok(())
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Int32(_) => DataType::Int32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(values) => values.len(),
            Self::Int32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, idx: usize) -> Value {
        match self {
            Self::Float(values) => Value::from(values[idx]),
            Self::Int32(values) => Value::from(values[idx]),
        }
    }
}

/// A typed, shape-annotated tensor.
///
/// Invariant: `values.len()` equals the product of `shape`, no dimension is zero, and `dtype`
/// matches the buffer. Deserialization checks all three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct TensorPayload {
    dtype: DataType,
    shape: Vec<usize>,
    values: TensorValues,
}

#[derive(Deserialize)]
struct RawTensor {
    dtype: DataType,
    shape: Vec<usize>,
    // Untagged buffers cannot tell `[1, 2]` floats from integers, so `dtype` decides.
    values: Vec<f64>,
}

impl TryFrom<RawTensor> for TensorPayload {
    type Error = EncodeError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        if raw.shape.is_empty() || raw.shape.contains(&0) {
            return Err(EncodeError::InvalidPayloadShape(format!(
                "shape {:?} has no elements",
                raw.shape
            )));
        }

        let expected: usize = raw.shape.iter().product();
        if expected != raw.values.len() {
            return Err(EncodeError::InvalidPayloadShape(format!(
                "shape {:?} needs {expected} values, found {}",
                raw.shape,
                raw.values.len()
            )));
        }

        let values = match raw.dtype {
            DataType::Float => TensorValues::Float(raw.values.iter().map(|v| *v as f32).collect()),
            DataType::Int32 => TensorValues::Int32(
                raw.values
                    .iter()
                    .map(|v| {
                        if v.fract() == 0. && *v >= i32::MIN as f64 && *v <= i32::MAX as f64 {
                            Ok(*v as i32)
                        } else {
                            Err(EncodeError::UnsupportedElementType(format!(
                                "{v} is not a 32-bit integer"
                            )))
                        }
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(Self {
            dtype: raw.dtype,
            shape: raw.shape,
            values,
        })
    }
}

impl TensorPayload {
    /// Encode a nested JSON array.
    ///
    /// # Errors
    ///
    /// [`EncodeError::InvalidPayloadShape`] if the value is not an array, if any array is empty,
    /// or if the nesting is not rectangular. [`EncodeError::UnsupportedElementType`] if a scalar
    /// is not a number, or if an all-integer tensor holds a value outside the `i32` range.
    pub fn from_json(value: &Value) -> Result<Self, EncodeError> {
        let mut encoder = Encoder::default();
        encoder.visit(value, 0)?;
        encoder.finish()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &TensorValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rebuild the nested JSON array form of the tensor.
    pub fn to_nested_json(&self) -> Value {
        let mut offset = 0;
        nest(&self.values, &self.shape, &mut offset)
    }
}

fn nest(values: &TensorValues, shape: &[usize], offset: &mut usize) -> Value {
    match shape.split_first() {
        Some((&size, [])) => {
            let row = (*offset..*offset + size).map(|idx| values.get(idx)).collect();
            *offset += size;
            Value::Array(row)
        }
        Some((&size, rest)) => Value::Array((0..size).map(|_| nest(values, rest, offset)).collect()),
        None => Value::Array(vec![]),
    }
}

#[derive(Default)]
struct Encoder {
    shape: Vec<usize>,
    // Depth + 1 of the first scalar level reached.
    rank: Option<usize>,
    values: Option<TensorValues>,
}

impl Encoder {
    fn visit(&mut self, value: &Value, depth: usize) -> Result<(), EncodeError> {
        let Value::Array(items) = value else {
            return Err(EncodeError::InvalidPayloadShape(format!(
                "expected an array at depth {depth}, found {}",
                kind(value)
            )));
        };

        let Some(first) = items.first() else {
            return Err(EncodeError::InvalidPayloadShape(format!(
                "empty array at depth {depth}"
            )));
        };

        match self.shape.get(depth) {
            Some(&size) if size != items.len() => {
                return Err(EncodeError::InvalidPayloadShape(format!(
                    "array of length {} at depth {depth}, expected {size}",
                    items.len()
                )))
            }
            Some(_) => {}
            None => self.shape.push(items.len()),
        }

        let nested = first.is_array();
        if let Some(rank) = self.rank {
            if nested != (depth + 1 < rank) {
                return Err(EncodeError::InvalidPayloadShape(format!(
                    "inconsistent nesting at depth {depth}, expected rank {rank}"
                )));
            }
        }

        if nested {
            for item in items {
                self.visit(item, depth + 1)?;
            }
            return Ok(());
        }

        self.rank = Some(depth + 1);
        let mut values = match self.values.take() {
            Some(values) => values,
            None => TensorValues::infer(first)?,
        };
        for item in items {
            values.push(item)?;
        }
        self.values = Some(values);

        Ok(())
    }

    fn finish(self) -> Result<TensorPayload, EncodeError> {
        let values = self.values.ok_or_else(|| {
            EncodeError::InvalidPayloadShape("no values found".to_string())
        })?;

        debug_assert_eq!(values.len(), self.shape.iter().product::<usize>());

        Ok(TensorPayload {
            dtype: values.dtype(),
            shape: self.shape,
            values,
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
