//! Structured values carried by the pickle codec

use crate::tensor::Tensor;
use std::fmt;

/// A value that can cross the serialization boundary
#[derive(Clone)]
pub enum Value {
    /// Python `None`
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Double-precision float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Mutable sequence
    List(Vec<Value>),
    /// Immutable sequence
    Tuple(Vec<Value>),
    /// Mapping with insertion order preserved
    Dict(Vec<(Value, Value)>),
    /// Tensor, inline or referenced through a tensor table
    Tensor(Tensor),
    /// Instance of a named class with its pickled state, or its constructor
    /// arguments when no state was set
    Object {
        /// Fully qualified class name, `module.Name`
        class: String,
        /// State passed to `BUILD`, otherwise the `REDUCE` or `NEWOBJ` arguments
        state: Box<Value>,
    },
}

impl Value {
    /// Short type label used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "float",
            Self::String(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Tensor(_) => "tensor",
            Self::Object { .. } => "object",
        }
    }

    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Tensor payload, if any
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

/// Tensors compare equal when they are the same view of the same buffer.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Tensor(a), Self::Tensor(b)) => {
                a.dtype() == b.dtype()
                    && a.layout() == b.layout()
                    && a.storage().same_buffer(b.storage())
            }
            (
                Self::Object { class: ca, state: sa },
                Self::Object { class: cb, state: sb },
            ) => ca == cb && sa == sb,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b{:?}", b),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items {
                    t.field(item);
                }
                t.finish()
            }
            Self::Dict(pairs) => f
                .debug_map()
                .entries(pairs.iter().map(|(k, v)| (k, v)))
                .finish(),
            Self::Tensor(t) => write!(f, "{t:?}"),
            Self::Object { class, state } => write!(f, "{class}({state:?})"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Tensor => Tensor,
}
