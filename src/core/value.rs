//! Typed values stored in scene containers.
//!
//! [`Value`] covers everything a scene location can hold: attribute data,
//! bounds, transforms, objects and the tag lists themselves. Each variant has
//! a fixed interpolation policy: continuous numeric data blends linearly
//! between bracketing samples, everything else holds the earlier sample.

use std::collections::BTreeMap;

use murmur3::MurmurHash;

use super::path_matcher::PathMatcher;
use crate::util::{lerp_matrix, BBox3d, DMat4, DVec3, Error, Name, Result};

/// Typed scene value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Names(Vec<Name>),
    Doubles(Vec<f64>),
    Vector(DVec3),
    Box(BBox3d),
    Matrix(DMat4),
    Compound(BTreeMap<Name, Value>),
    PathSet(PathMatcher),
}

/// Stable type tag, also used by the binary codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Bool = 1,
    Int = 2,
    Double = 3,
    String = 4,
    Names = 5,
    Doubles = 6,
    Vector = 7,
    Box = 8,
    Matrix = 9,
    Compound = 10,
    PathSet = 11,
}

impl ValueType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Double,
            4 => Self::String,
            5 => Self::Names,
            6 => Self::Doubles,
            7 => Self::Vector,
            8 => Self::Box,
            9 => Self::Matrix,
            10 => Self::Compound,
            11 => Self::PathSet,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Names => "names",
            Self::Doubles => "doubles",
            Self::Vector => "vector",
            Self::Box => "box",
            Self::Matrix => "matrix",
            Self::Compound => "compound",
            Self::PathSet => "pathSet",
        }
    }

    /// Whether values of this type blend between samples.
    pub fn is_interpolable(&self) -> bool {
        matches!(
            self,
            Self::Double | Self::Doubles | Self::Vector | Self::Box | Self::Matrix
        )
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Names(_) => ValueType::Names,
            Self::Doubles(_) => ValueType::Doubles,
            Self::Vector(_) => ValueType::Vector,
            Self::Box(_) => ValueType::Box,
            Self::Matrix(_) => ValueType::Matrix,
            Self::Compound(_) => ValueType::Compound,
            Self::PathSet(_) => ValueType::PathSet,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.value_type().as_str()
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::type_mismatch(expected, self.type_name())
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(v) => Ok(*v),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(self.mismatch("int")),
        }
    }

    /// Numeric value as a double. Ints are widened.
    pub fn as_double(&self) -> Result<f64> {
        match self {
            Self::Double(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            _ => Err(self.mismatch("double")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_names(&self) -> Result<&[Name]> {
        match self {
            Self::Names(v) => Ok(v),
            _ => Err(self.mismatch("names")),
        }
    }

    pub fn as_doubles(&self) -> Result<&[f64]> {
        match self {
            Self::Doubles(v) => Ok(v),
            _ => Err(self.mismatch("doubles")),
        }
    }

    pub fn as_box(&self) -> Result<BBox3d> {
        match self {
            Self::Box(v) => Ok(*v),
            _ => Err(self.mismatch("box")),
        }
    }

    pub fn as_matrix(&self) -> Result<DMat4> {
        match self {
            Self::Matrix(v) => Ok(*v),
            _ => Err(self.mismatch("matrix")),
        }
    }

    pub fn as_compound(&self) -> Result<&BTreeMap<Name, Value>> {
        match self {
            Self::Compound(v) => Ok(v),
            _ => Err(self.mismatch("compound")),
        }
    }

    pub fn as_path_set(&self) -> Result<&PathMatcher> {
        match self {
            Self::PathSet(v) => Ok(v),
            _ => Err(self.mismatch("pathSet")),
        }
    }

    /// Blend two samples. Non-interpolable types, mismatched types and
    /// arrays of different length hold `a`.
    pub fn interpolate(a: &Value, b: &Value, alpha: f64) -> Value {
        if alpha <= 0.0 {
            return a.clone();
        }
        if alpha >= 1.0 && a.value_type() == b.value_type() {
            return b.clone();
        }
        match (a, b) {
            (Self::Double(x), Self::Double(y)) => Self::Double(x + (y - x) * alpha),
            (Self::Doubles(x), Self::Doubles(y)) if x.len() == y.len() => Self::Doubles(
                x.iter().zip(y).map(|(x, y)| x + (y - x) * alpha).collect(),
            ),
            (Self::Vector(x), Self::Vector(y)) => Self::Vector(x.lerp(*y, alpha)),
            (Self::Box(x), Self::Box(y)) => Self::Box(x.lerp(y, alpha)),
            (Self::Matrix(x), Self::Matrix(y)) => Self::Matrix(lerp_matrix(x, y, alpha)),
            _ => a.clone(),
        }
    }

    /// Feed the value's type and content into `h`.
    pub fn hash_into(&self, h: &mut MurmurHash) {
        h.append_u64(self.value_type() as u64);
        match self {
            Self::Bool(v) => {
                h.append_u64(*v as u64);
            }
            Self::Int(v) => {
                h.append_i64(*v);
            }
            Self::Double(v) => {
                h.append_f64(*v);
            }
            Self::String(v) => {
                h.append_str(v);
            }
            Self::Names(v) => {
                h.append_u64(v.len() as u64);
                for n in v {
                    h.append_str(n);
                }
            }
            Self::Doubles(v) => {
                h.append_u64(v.len() as u64);
                h.append_bytes(bytemuck::cast_slice(v.as_slice()));
            }
            Self::Vector(v) => {
                h.append_bytes(bytemuck::bytes_of(v));
            }
            Self::Box(v) => {
                h.append_bytes(v.as_bytes());
            }
            Self::Matrix(v) => {
                h.append_bytes(bytemuck::bytes_of(v));
            }
            Self::Compound(v) => {
                h.append_u64(v.len() as u64);
                for (k, item) in v {
                    h.append_str(k);
                    item.hash_into(h);
                }
            }
            Self::PathSet(v) => {
                let paths = v.path_strings();
                h.append_u64(paths.len() as u64);
                for p in &paths {
                    h.append_str(p);
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Name>> for Value {
    fn from(v: Vec<Name>) -> Self {
        Self::Names(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Doubles(v)
    }
}

impl From<DVec3> for Value {
    fn from(v: DVec3) -> Self {
        Self::Vector(v)
    }
}

impl From<BBox3d> for Value {
    fn from(v: BBox3d) -> Self {
        Self::Box(v)
    }
}

impl From<DMat4> for Value {
    fn from(v: DMat4) -> Self {
        Self::Matrix(v)
    }
}

impl From<PathMatcher> for Value {
    fn from(v: PathMatcher) -> Self {
        Self::PathSet(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        for t in 1..=11u8 {
            let vt = ValueType::from_u8(t).expect("known tag");
            assert_eq!(vt as u8, t);
        }
        assert!(ValueType::from_u8(0).is_none());
        assert_eq!(Value::from(1.5).type_name(), "double");
    }

    #[test]
    fn test_interpolate_double() {
        let v = Value::interpolate(&Value::Double(0.0), &Value::Double(10.0), 0.25);
        assert_eq!(v, Value::Double(2.5));
    }

    #[test]
    fn test_hold_for_discrete_types() {
        let a = Value::Int(1);
        let b = Value::Int(5);
        assert_eq!(Value::interpolate(&a, &b, 0.5), a);
        assert_eq!(Value::interpolate(&a, &b, 1.0), b);

        let s = Value::from("x");
        assert_eq!(Value::interpolate(&s, &Value::from("y"), 0.9), s);
    }

    #[test]
    fn test_interpolate_mismatched_lengths_holds() {
        let a = Value::Doubles(vec![0.0, 1.0]);
        let b = Value::Doubles(vec![1.0]);
        assert_eq!(Value::interpolate(&a, &b, 0.5), a);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_double().expect("widen"), 3.0);
        let err = Value::Bool(true).as_str().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let mut a = MurmurHash::new();
        Value::Int(1).hash_into(&mut a);
        let mut b = MurmurHash::new();
        Value::Double(1.0).hash_into(&mut b);
        assert_ne!(a, b);

        let mut c = MurmurHash::new();
        Value::Int(1).hash_into(&mut c);
        assert_eq!(a, c);
    }
}
