//! Pickle codec for structured values
//!
//! Values (numbers, strings, containers, tensors, named objects) are written
//! as protocol 2 pickles that Python's `pickle` module can read. The reader
//! also accepts the protocol 4 additions CPython emits by default (frames,
//! `MEMOIZE`, short strings, `STACK_GLOBAL`).
//!
//! Tensors are serialized one of two ways:
//!
//! - with a tensor table, only the table index is stored and the caller ships
//!   the tensors out of band
//! - without one, the dtype name, shape and packed bytes are stored inline
//!
//! ```
//! use tensorloop::pickle::{Value, pickle, unpickle};
//! use tensorloop::tensor::Tensor;
//!
//! # fn main() -> tensorloop::error::Result<()> {
//! let weights = Tensor::from_slice_host(&[0.5f32, -1.0, 2.0], &[3])?;
//! let bytes = pickle(&Value::Tensor(weights), None)?;
//!
//! let values = unpickle(&bytes, None, None)?;
//! let restored = values[0].as_tensor().expect("tensor");
//! assert_eq!(restored.to_vec::<f32>()?, vec![0.5, -1.0, 2.0]);
//! # Ok(())
//! # }
//! ```

mod opcode;
mod pickler;
mod unpickler;
mod value;

pub use pickler::{pickle, pickle_stream};
pub use unpickler::{ClassResolver, unpickle, unpickle_stream};
pub use value::Value;
