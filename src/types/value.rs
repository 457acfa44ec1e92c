// Tagged-variant port values
// Every value carries a DataType tag that binding checks against the port schema

use serde::{Deserialize, Serialize};

/// Declared type of a port or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Real,
    Integer,
    Bool,
    String,
    /// Sample buffers, frames and spectra
    RealVector,
    RealMatrix,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Real => "real",
            DataType::Integer => "integer",
            DataType::Bool => "bool",
            DataType::String => "string",
            DataType::RealVector => "vector_real",
            DataType::RealMatrix => "matrix_real",
        }
    }

    /// Whether this type is a scalar (single number, flag or string)
    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::RealVector | DataType::RealMatrix)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single value flowing through a port or configuring a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Real(f32),
    Integer(i64),
    Bool(bool),
    String(String),
    RealVector(Vec<f32>),
    RealMatrix(Vec<Vec<f32>>),
}

impl Value {
    /// Runtime type tag of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Real(_) => DataType::Real,
            Value::Integer(_) => DataType::Integer,
            Value::Bool(_) => DataType::Bool,
            Value::String(_) => DataType::String,
            Value::RealVector(_) => DataType::RealVector,
            Value::RealMatrix(_) => DataType::RealMatrix,
        }
    }

    /// Empty/zero value of the given type, used for unwritten output storage
    pub fn default_for(data_type: DataType) -> Self {
        match data_type {
            DataType::Real => Value::Real(0.0),
            DataType::Integer => Value::Integer(0),
            DataType::Bool => Value::Bool(false),
            DataType::String => Value::String(String::new()),
            DataType::RealVector => Value::RealVector(Vec::new()),
            DataType::RealMatrix => Value::RealMatrix(Vec::new()),
        }
    }

    pub fn as_real(&self) -> Option<f32> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_real_vector(&self) -> Option<&[f32]> {
        match self {
            Value::RealVector(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_real_matrix(&self) -> Option<&[Vec<f32>]> {
        match self {
            Value::RealMatrix(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Numeric view used by range checks; integers widen, everything else is None
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v as f64),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Coerce this value to `target` where the conversion is lossless enough
    /// to be accepted for parameters (integer literals for real parameters).
    pub fn coerce(self, target: DataType) -> Result<Value, Value> {
        match (self, target) {
            (v, t) if v.data_type() == t => Ok(v),
            (Value::Integer(i), DataType::Real) => Ok(Value::Real(i as f32)),
            (Value::Real(r), DataType::Integer) if r.fract() == 0.0 && r.is_finite() => {
                Ok(Value::Integer(r as i64))
            }
            (v, _) => Err(v),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v as f32)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::RealVector(v)
    }
}

impl From<Vec<Vec<f32>>> for Value {
    fn from(v: Vec<Vec<f32>>) -> Self {
        Value::RealMatrix(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        assert_eq!(Value::from(1.5f32).data_type(), DataType::Real);
        assert_eq!(Value::from(3).data_type(), DataType::Integer);
        assert_eq!(Value::from("hann").data_type(), DataType::String);
        assert_eq!(Value::from(vec![0.0f32; 4]).data_type(), DataType::RealVector);
        assert!(DataType::Real.is_scalar());
        assert!(!DataType::RealVector.is_scalar());
    }

    #[test]
    fn test_coerce_integer_to_real() {
        let coerced = Value::Integer(48000).coerce(DataType::Real).unwrap();
        assert_eq!(coerced, Value::Real(48000.0));

        let coerced = Value::Real(1024.0).coerce(DataType::Integer).unwrap();
        assert_eq!(coerced, Value::Integer(1024));

        assert!(Value::Real(0.5).coerce(DataType::Integer).is_err());
        assert!(Value::from("x").coerce(DataType::Real).is_err());
    }

    #[test]
    fn test_default_for_matches_type() {
        for ty in [
            DataType::Real,
            DataType::Integer,
            DataType::Bool,
            DataType::String,
            DataType::RealVector,
            DataType::RealMatrix,
        ] {
            assert_eq!(Value::default_for(ty).data_type(), ty);
        }
    }
}
