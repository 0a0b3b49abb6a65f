//! Value to pickle byte stream

use super::opcode::*;
use super::value::Value;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Write `value` as a protocol 2 pickle through `writer`.
///
/// With a tensor table, each tensor is appended to the table and the stream
/// records only its index. Without one, tensors are written inline as their
/// dtype name, shape and packed row-major bytes; device tensors are
/// synchronized first.
pub fn pickle_stream<W>(writer: W, value: &Value, tensor_table: Option<&mut Vec<Tensor>>) -> Result<()>
where
    W: FnMut(&[u8]),
{
    let mut pickler = Pickler {
        writer,
        tensor_table,
        memo_id: 0,
    };
    pickler.write(&[PROTO, PROTOCOL]);
    pickler.push_value(value)?;
    pickler.write(&[STOP]);
    Ok(())
}

/// Pickle `value` into a byte vector. See [`pickle_stream`].
///
/// ```
/// use tensorloop::pickle::{Value, pickle, unpickle};
///
/// # fn main() -> tensorloop::error::Result<()> {
/// let value = Value::Tuple(vec![Value::Int(7), Value::from("seven")]);
/// let bytes = pickle(&value, None)?;
/// assert_eq!(&bytes[..2], &[0x80, 0x02]);
/// assert_eq!(unpickle(&bytes, None, None)?, vec![Value::Int(7), Value::from("seven")]);
/// # Ok(())
/// # }
/// ```
pub fn pickle(value: &Value, tensor_table: Option<&mut Vec<Tensor>>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    pickle_stream(|bytes| out.extend_from_slice(bytes), value, tensor_table)?;
    Ok(out)
}

struct Pickler<'t, W> {
    writer: W,
    tensor_table: Option<&'t mut Vec<Tensor>>,
    memo_id: u32,
}

impl<W: FnMut(&[u8])> Pickler<'_, W> {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        (self.writer)(bytes)
    }

    fn push_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::None => self.write(&[NONE]),
            Value::Bool(true) => self.write(&[NEWTRUE]),
            Value::Bool(false) => self.write(&[NEWFALSE]),
            Value::Int(v) => self.push_int(*v),
            Value::Double(v) => {
                self.write(&[BINFLOAT]);
                self.write(&v.to_be_bytes());
            }
            Value::String(s) => self.push_str(s)?,
            Value::Bytes(b) => self.push_bytes(b)?,
            Value::List(items) => {
                self.write(&[EMPTY_LIST]);
                self.push_memo();
                if !items.is_empty() {
                    self.write(&[MARK]);
                    for item in items {
                        self.push_value(item)?;
                    }
                    self.write(&[APPENDS]);
                }
            }
            Value::Tuple(items) => self.push_tuple(items)?,
            Value::Dict(pairs) => {
                self.write(&[EMPTY_DICT]);
                self.push_memo();
                if !pairs.is_empty() {
                    self.write(&[MARK]);
                    for (k, v) in pairs {
                        self.push_value(k)?;
                        self.push_value(v)?;
                    }
                    self.write(&[SETITEMS]);
                }
            }
            Value::Tensor(t) => self.push_tensor(t)?,
            Value::Object { class, state } => {
                let (module, name) = class
                    .rsplit_once('.')
                    .ok_or_else(|| Error::pickle(format!("class name '{class}' has no module")))?;
                self.push_global(module, name);
                self.write(&[EMPTY_TUPLE, NEWOBJ]);
                self.push_value(state)?;
                self.write(&[BUILD]);
            }
        }
        Ok(())
    }

    fn push_int(&mut self, v: i64) {
        if (0..=0xff).contains(&v) {
            self.write(&[BININT1, v as u8]);
        } else if (0..=0xffff).contains(&v) {
            self.write(&[BININT2]);
            self.write(&(v as u16).to_le_bytes());
        } else if i32::try_from(v).is_ok() {
            self.write(&[BININT]);
            self.write(&(v as i32).to_le_bytes());
        } else {
            self.write(&[LONG1, 8]);
            self.write(&v.to_le_bytes());
        }
    }

    fn push_str(&mut self, s: &str) -> Result<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| Error::pickle(format!("string of {} bytes is too long", s.len())))?;
        self.write(&[BINUNICODE]);
        self.write(&len.to_le_bytes());
        self.write(s.as_bytes());
        self.push_memo();
        Ok(())
    }

    fn push_bytes(&mut self, b: &[u8]) -> Result<()> {
        match u8::try_from(b.len()) {
            Ok(len) => self.write(&[SHORT_BINBYTES, len]),
            Err(_) => {
                let len = u32::try_from(b.len())
                    .map_err(|_| Error::pickle(format!("bytes of length {} are too long", b.len())))?;
                self.write(&[BINBYTES]);
                self.write(&len.to_le_bytes());
            }
        }
        self.write(b);
        Ok(())
    }

    fn push_tuple(&mut self, items: &[Value]) -> Result<()> {
        match items.len() {
            0 => self.write(&[EMPTY_TUPLE]),
            n @ 1..=3 => {
                for item in items {
                    self.push_value(item)?;
                }
                self.write(&[TUPLE1 + (n as u8 - 1)]);
            }
            _ => {
                self.write(&[MARK]);
                for item in items {
                    self.push_value(item)?;
                }
                self.write(&[TUPLE]);
            }
        }
        Ok(())
    }

    fn push_tensor(&mut self, tensor: &Tensor) -> Result<()> {
        if let Some(table) = self.tensor_table.as_deref_mut() {
            let index = table.len() as i64;
            table.push(tensor.clone());
            self.push_global(TENSOR_MODULE, TENSOR_FROM_ID);
            self.push_int(index);
            self.write(&[TUPLE1, REDUCE]);
            return Ok(());
        }

        let bytes = tensor.contiguous_bytes()?;
        self.push_global(TENSOR_MODULE, TENSOR_INLINE);
        self.push_str(tensor.dtype().short_name())?;
        let shape: Vec<Value> = tensor.shape().iter().map(|&d| Value::Int(d as i64)).collect();
        self.push_tuple(&shape)?;
        self.push_bytes(&bytes)?;
        self.write(&[TUPLE3, REDUCE]);
        Ok(())
    }

    fn push_global(&mut self, module: &str, name: &str) {
        self.write(&[GLOBAL]);
        self.write(module.as_bytes());
        self.write(b"\n");
        self.write(name.as_bytes());
        self.write(b"\n");
    }

    fn push_memo(&mut self) {
        let id = self.memo_id;
        self.memo_id += 1;
        match u8::try_from(id) {
            Ok(id) => self.write(&[BINPUT, id]),
            Err(_) => {
                self.write(&[LONG_BINPUT]);
                self.write(&id.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_matches_python_protocol_2() {
        // pickle.dumps([1, 2.5, "a"], protocol=2)
        let value = Value::List(vec![Value::Int(1), Value::Double(2.5), Value::from("a")]);
        let bytes = pickle(&value, None).unwrap();
        assert_eq!(
            bytes,
            b"\x80\x02]q\x00(K\x01G@\x04\x00\x00\x00\x00\x00\x00X\x01\x00\x00\x00aq\x01e.".to_vec()
        );
    }

    #[test]
    fn test_int_widths() {
        let encode = |v: i64| pickle(&Value::Int(v), None).unwrap()[2..].to_vec();
        assert_eq!(encode(7), vec![BININT1, 7, STOP]);
        assert_eq!(encode(300), vec![BININT2, 0x2c, 0x01, STOP]);
        assert_eq!(encode(-1), vec![BININT, 0xff, 0xff, 0xff, 0xff, STOP]);
        assert_eq!(encode(1 << 40)[..2], [LONG1, 8]);
    }

    #[test]
    fn test_tensor_table_records_tensors_in_order() {
        let a = Tensor::from_slice_host(&[1i32, 2], &[2]).unwrap();
        let b = Tensor::scalar_host(3.0f64).unwrap();
        let mut table = Vec::new();
        let value = Value::Tuple(vec![Value::Tensor(a.clone()), Value::Tensor(b.clone())]);
        let bytes = pickle(&value, Some(&mut table)).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table[0].storage().same_buffer(a.storage()));
        assert!(table[1].storage().same_buffer(b.storage()));
        // no payload bytes in the stream
        assert!(bytes.len() < 80);
    }

    #[test]
    fn test_object_requires_module() {
        let value = Value::Object {
            class: "Bare".into(),
            state: Box::new(Value::None),
        };
        assert!(matches!(pickle(&value, None), Err(Error::Pickle(_))));
    }
}
