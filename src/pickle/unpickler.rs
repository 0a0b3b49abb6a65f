//! Pickle byte stream to values

use super::opcode::*;
use super::value::Value;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::{Layout, Residency, Storage, Tensor, checked_elem_count};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Largest single allocation made ahead of the bytes that fill it
const READ_CHUNK: usize = 64 * 1024;

/// Maps a fully qualified global name (`module.Name`) to the class name
/// recorded on the resulting [`Value::Object`]. Returning `None` rejects the
/// global.
pub type ClassResolver<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Parse a pickle stream.
///
/// `reader` fills the buffer it is given and returns the number of bytes
/// written; returning 0 means the stream is exhausted. `bounds_checker`
/// reports whether more input is available and is consulted before every
/// opcode. Tensor references are looked up in `tensor_table`; inline tensors
/// are rebuilt in host memory.
///
/// If the top-level value is a list or tuple its elements are returned,
/// otherwise the value itself.
pub fn unpickle_stream<R, B>(
    reader: R,
    bounds_checker: B,
    tensor_table: Option<&[Tensor]>,
    class_resolver: Option<ClassResolver<'_>>,
) -> Result<Vec<Value>>
where
    R: FnMut(&mut [u8]) -> usize,
    B: FnMut() -> bool,
{
    let mut unpickler = Unpickler {
        reader,
        bounds_checker,
        tensor_table,
        class_resolver,
        stack: Vec::new(),
        marks: Vec::new(),
        memo: HashMap::new(),
    };
    let value = unpickler.run()?;
    Ok(match value {
        Value::List(items) | Value::Tuple(items) => items,
        other => vec![other],
    })
}

/// Parse a complete in-memory pickle. See [`unpickle_stream`].
pub fn unpickle(
    data: &[u8],
    tensor_table: Option<&[Tensor]>,
    class_resolver: Option<ClassResolver<'_>>,
) -> Result<Vec<Value>> {
    let pos = Cell::new(0usize);
    let reader = |buf: &mut [u8]| {
        let start = pos.get();
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        pos.set(start + n);
        n
    };
    unpickle_stream(reader, || pos.get() < data.len(), tensor_table, class_resolver)
}

/// Callable reached through `GLOBAL` or `STACK_GLOBAL`
#[derive(Clone, Debug)]
enum Global {
    TensorFromId,
    TensorInline,
    Class(String),
}

#[derive(Clone, Debug)]
enum Item {
    Value(Value),
    /// A memoized value; the stack and the memo see the same slot
    Shared(Rc<RefCell<Value>>),
    Global(Global),
}

impl Item {
    // A shared slot is read when its consumer pops it, after the pickler
    // has finished filling it. Only a reference cycle observes a partial value.
    fn into_value(self) -> Result<Value> {
        match self {
            Item::Value(v) => Ok(v),
            Item::Shared(slot) => Ok(slot.borrow().clone()),
            Item::Global(g) => Err(Error::pickle(format!("expected a value, found global {g:?}"))),
        }
    }
}

struct Unpickler<'a, R, B> {
    reader: R,
    bounds_checker: B,
    tensor_table: Option<&'a [Tensor]>,
    class_resolver: Option<ClassResolver<'a>>,
    stack: Vec<Item>,
    marks: Vec<usize>,
    memo: HashMap<u32, Item>,
}

impl<R, B> Unpickler<'_, R, B>
where
    R: FnMut(&mut [u8]) -> usize,
    B: FnMut() -> bool,
{
    fn run(&mut self) -> Result<Value> {
        loop {
            if !(self.bounds_checker)() {
                return Err(Error::pickle("stream ended before STOP"));
            }
            let opcode = self.read_u8()?;
            if opcode == STOP {
                break;
            }
            self.step(opcode)?;
        }

        if self.stack.len() != 1 {
            return Err(Error::pickle(format!(
                "expected one value at STOP, found {}",
                self.stack.len()
            )));
        }
        self.pop_value()
    }

    fn step(&mut self, opcode: u8) -> Result<()> {
        match opcode {
            PROTO => {
                let version = self.read_u8()?;
                if version > 5 {
                    return Err(Error::pickle(format!("unsupported protocol {version}")));
                }
            }
            FRAME => {
                // frame boundaries carry no values
                self.read_array::<8>()?;
            }
            MARK => self.marks.push(self.stack.len()),
            NONE => self.push(Value::None),
            NEWTRUE => self.push(Value::Bool(true)),
            NEWFALSE => self.push(Value::Bool(false)),

            BININT => {
                let v = i32::from_le_bytes(self.read_array()?);
                self.push(Value::Int(v as i64));
            }
            BININT1 => {
                let v = self.read_u8()?;
                self.push(Value::Int(v as i64));
            }
            BININT2 => {
                let v = u16::from_le_bytes(self.read_array()?);
                self.push(Value::Int(v as i64));
            }
            LONG1 => {
                let n = self.read_u8()? as usize;
                let bytes = self.read_vec(n)?;
                self.push(Value::Int(decode_long(&bytes)?));
            }
            BINFLOAT => {
                let v = f64::from_be_bytes(self.read_array()?);
                self.push(Value::Double(v));
            }

            BINUNICODE => {
                let n = u32::from_le_bytes(self.read_array()?) as usize;
                let s = self.read_string(n)?;
                self.push(Value::String(s));
            }
            SHORT_BINUNICODE => {
                let n = self.read_u8()? as usize;
                let s = self.read_string(n)?;
                self.push(Value::String(s));
            }
            BINBYTES => {
                let n = u32::from_le_bytes(self.read_array()?) as usize;
                let b = self.read_vec(n)?;
                self.push(Value::Bytes(b));
            }
            SHORT_BINBYTES => {
                let n = self.read_u8()? as usize;
                let b = self.read_vec(n)?;
                self.push(Value::Bytes(b));
            }

            EMPTY_LIST => self.push(Value::List(Vec::new())),
            APPEND => {
                let item = self.pop_value()?;
                self.with_list_top(|items| items.push(item))?;
            }
            APPENDS => {
                let items = self.pop_to_mark()?;
                self.with_list_top(|list| list.extend(items))?;
            }
            EMPTY_TUPLE => self.push(Value::Tuple(Vec::new())),
            TUPLE => {
                let items = self.pop_to_mark()?;
                self.push(Value::Tuple(items));
            }
            TUPLE1 | TUPLE2 | TUPLE3 => {
                let n = (opcode - TUPLE1 + 1) as usize;
                let items = self.pop_n(n)?;
                self.push(Value::Tuple(items));
            }
            EMPTY_DICT => self.push(Value::Dict(Vec::new())),
            SETITEM => {
                let v = self.pop_value()?;
                let k = self.pop_value()?;
                self.with_dict_top(|pairs| set_item(pairs, k, v))?;
            }
            SETITEMS => {
                let items = self.pop_to_mark()?;
                if items.len() % 2 != 0 {
                    return Err(Error::pickle("SETITEMS with an odd number of items"));
                }
                self.with_dict_top(|pairs| {
                    let mut items = items.into_iter();
                    while let (Some(k), Some(v)) = (items.next(), items.next()) {
                        set_item(pairs, k, v);
                    }
                })?;
            }

            BINPUT => {
                let id = self.read_u8()? as u32;
                self.memo_put(id)?;
            }
            LONG_BINPUT => {
                let id = u32::from_le_bytes(self.read_array()?);
                self.memo_put(id)?;
            }
            MEMOIZE => {
                let id = self.memo.len() as u32;
                self.memo_put(id)?;
            }
            BINGET => {
                let id = self.read_u8()? as u32;
                self.memo_get(id)?;
            }
            LONG_BINGET => {
                let id = u32::from_le_bytes(self.read_array()?);
                self.memo_get(id)?;
            }

            GLOBAL => {
                let module = self.read_line()?;
                let name = self.read_line()?;
                let global = self.resolve_global(&module, &name)?;
                self.stack.push(Item::Global(global));
            }
            STACK_GLOBAL => {
                let name = self.pop_value()?;
                let module = self.pop_value()?;
                let (Value::String(module), Value::String(name)) = (module, name) else {
                    return Err(Error::pickle("STACK_GLOBAL expects two strings"));
                };
                let global = self.resolve_global(&module, &name)?;
                self.stack.push(Item::Global(global));
            }
            REDUCE => {
                let args = match self.pop_value()? {
                    Value::Tuple(args) => args,
                    other => {
                        return Err(Error::pickle(format!(
                            "REDUCE expects a tuple of arguments, got {}",
                            other.kind()
                        )));
                    }
                };
                let global = self.pop_global()?;
                let value = self.call(global, args)?;
                self.push(value);
            }
            NEWOBJ => {
                let args = match self.pop_value()? {
                    args @ Value::Tuple(_) => args,
                    other => {
                        return Err(Error::pickle(format!(
                            "NEWOBJ expects a tuple of arguments, got {}",
                            other.kind()
                        )));
                    }
                };
                match self.pop_global()? {
                    Global::Class(class) => self.push(Value::Object {
                        class,
                        state: Box::new(args),
                    }),
                    other => {
                        return Err(Error::pickle(format!("NEWOBJ on non-class global {other:?}")));
                    }
                }
            }
            BUILD => {
                let new_state = self.pop_value()?;
                self.with_top(|top| match top {
                    Value::Object { state, .. } => {
                        **state = new_state;
                        Ok(())
                    }
                    _ => Err(Error::pickle("BUILD target is not an object")),
                })?;
            }

            other => {
                return Err(Error::pickle(format!("unsupported opcode 0x{other:02x}")));
            }
        }
        Ok(())
    }

    fn resolve_global(&self, module: &str, name: &str) -> Result<Global> {
        if module == TENSOR_MODULE {
            match name {
                TENSOR_FROM_ID => return Ok(Global::TensorFromId),
                TENSOR_INLINE => return Ok(Global::TensorInline),
                _ => {}
            }
        }

        let qualified = format!("{module}.{name}");
        match self.class_resolver {
            None => Ok(Global::Class(qualified)),
            Some(resolve) => resolve(&qualified)
                .map(Global::Class)
                .ok_or_else(|| Error::pickle(format!("unknown global '{qualified}'"))),
        }
    }

    fn call(&self, global: Global, args: Vec<Value>) -> Result<Value> {
        match global {
            Global::TensorFromId => {
                let table = self
                    .tensor_table
                    .ok_or_else(|| Error::pickle("tensor reference without a tensor table"))?;
                let index = match args.as_slice() {
                    [Value::Int(i)] => *i,
                    _ => return Err(Error::pickle("tensor reference expects one int")),
                };
                usize::try_from(index)
                    .ok()
                    .and_then(|i| table.get(i))
                    .cloned()
                    .map(Value::Tensor)
                    .ok_or_else(|| {
                        Error::pickle(format!(
                            "tensor index {index} out of range for table of {}",
                            table.len()
                        ))
                    })
            }
            Global::TensorInline => inline_tensor(args).map(Value::Tensor),
            Global::Class(class) => Ok(Value::Object {
                class,
                state: Box::new(Value::Tuple(args)),
            }),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Item::Value(value));
    }

    fn pop_item(&mut self) -> Result<Item> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() <= floor {
            return Err(Error::pickle("stack underflow"));
        }
        self.stack.pop().ok_or_else(|| Error::pickle("stack underflow"))
    }

    fn pop_value(&mut self) -> Result<Value> {
        self.pop_item()?.into_value()
    }

    fn pop_global(&mut self) -> Result<Global> {
        match self.pop_item()? {
            Item::Global(g) => Ok(g),
            other => Err(Error::pickle(format!(
                "expected a global, found {}",
                other.into_value()?.kind()
            ))),
        }
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.pop_value()?);
        }
        items.reverse();
        Ok(items)
    }

    fn pop_to_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| Error::pickle("no MARK on the stack"))?;
        self.stack
            .drain(mark..)
            .map(Item::into_value)
            .collect()
    }

    /// Apply `f` to the value on top of the stack, in place
    fn with_top<T>(&mut self, f: impl FnOnce(&mut Value) -> Result<T>) -> Result<T> {
        match self.stack.last_mut() {
            Some(Item::Value(value)) => f(value),
            Some(Item::Shared(slot)) => f(&mut slot.borrow_mut()),
            Some(Item::Global(g)) => Err(Error::pickle(format!("cannot modify global {g:?}"))),
            None => Err(Error::pickle("stack underflow")),
        }
    }

    fn with_list_top(&mut self, f: impl FnOnce(&mut Vec<Value>)) -> Result<()> {
        self.with_top(|top| match top {
            Value::List(items) => {
                f(items);
                Ok(())
            }
            _ => Err(Error::pickle("append target is not a list")),
        })
    }

    fn with_dict_top(&mut self, f: impl FnOnce(&mut Vec<(Value, Value)>)) -> Result<()> {
        self.with_top(|top| match top {
            Value::Dict(pairs) => {
                f(pairs);
                Ok(())
            }
            _ => Err(Error::pickle("setitem target is not a dict")),
        })
    }

    /// Bind the top of the stack to `id`, turning it into a shared slot
    fn memo_put(&mut self, id: u32) -> Result<()> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| Error::pickle("memo put on an empty stack"))?;
        if let Item::Value(value) = &mut *top {
            let slot = Rc::new(RefCell::new(std::mem::replace(value, Value::None)));
            *top = Item::Shared(slot);
        }
        self.memo.insert(id, top.clone());
        Ok(())
    }

    fn memo_get(&mut self, id: u32) -> Result<()> {
        let item = self
            .memo
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::pickle(format!("memo key {id} not found")))?;
        self.stack.push(item);
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read `n` bytes, growing the buffer as they arrive so a forged length
    /// cannot allocate more than the stream actually holds
    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n.min(READ_CHUNK));
        while buf.len() < n {
            let start = buf.len();
            buf.resize(start + (n - start).min(READ_CHUNK), 0);
            self.fill(&mut buf[start..])?;
        }
        Ok(buf)
    }

    fn read_string(&mut self, n: usize) -> Result<String> {
        String::from_utf8(self.read_vec(n)?).map_err(|e| Error::pickle(format!("invalid UTF-8: {e}")))
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => break,
                b => line.push(b),
            }
        }
        String::from_utf8(line).map_err(|e| Error::pickle(format!("invalid UTF-8 in global: {e}")))
    }

    fn fill(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = (self.reader)(buf);
            if n == 0 {
                return Err(Error::pickle("unexpected end of stream"));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }
}

fn set_item(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
}

/// Little-endian two's complement of up to eight bytes
fn decode_long(bytes: &[u8]) -> Result<i64> {
    if bytes.len() > 8 {
        return Err(Error::pickle(format!("LONG1 of {} bytes overflows i64", bytes.len())));
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    let fill = if last & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

fn inline_tensor(args: Vec<Value>) -> Result<Tensor> {
    let [Value::String(dtype), Value::Tuple(shape), Value::Bytes(data)] = <[Value; 3]>::try_from(args)
        .map_err(|_| Error::pickle("inline tensor expects (dtype, shape, data)"))?
    else {
        return Err(Error::pickle("inline tensor expects (str, tuple, bytes)"));
    };

    let dtype = DType::from_short_name(&dtype)
        .ok_or_else(|| Error::pickle(format!("unknown dtype '{dtype}'")))?;
    let shape = shape
        .iter()
        .map(|d| {
            d.as_int()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| Error::pickle("tensor shape must be non-negative ints"))
        })
        .collect::<Result<Vec<usize>>>()?;

    let expected = checked_elem_count(&shape)
        .and_then(|n| n.checked_mul(dtype.size_in_bytes()))
        .ok_or_else(|| Error::pickle(format!("inline tensor shape {shape:?} overflows")))?;
    if data.len() != expected {
        return Err(Error::pickle(format!(
            "inline tensor of shape {shape:?} and dtype {dtype} needs {expected} bytes, got {}",
            data.len()
        )));
    }

    let storage = Storage::from_bytes(&data, Residency::Host)?;
    Tensor::from_parts(storage, Layout::contiguous(&shape), dtype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::pickle;

    #[test]
    fn test_python_list() {
        let bytes = b"\x80\x02]q\x00(K\x01G@\x04\x00\x00\x00\x00\x00\x00X\x01\x00\x00\x00aq\x01e.";
        let values = unpickle(bytes, None, None).unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::Double(2.5), Value::from("a")]);
    }

    #[test]
    fn test_protocol_4_dict_with_frame_and_memoize() {
        // pickle.dumps({"a": 1, "b": -2}, protocol=4)
        let bytes = b"\x80\x04\x95\x14\x00\x00\x00\x00\x00\x00\x00}\x94(\x8c\x01a\x94K\x01\x8c\x01b\x94J\xfe\xff\xff\xffu.";
        let values = unpickle(bytes, None, None).unwrap();
        assert_eq!(
            values,
            vec![Value::Dict(vec![
                (Value::from("a"), Value::Int(1)),
                (Value::from("b"), Value::Int(-2)),
            ])]
        );
    }

    #[test]
    fn test_memo_get_repeats_value() {
        // ("x", "x") with the second element fetched from the memo
        let bytes = b"\x80\x02X\x01\x00\x00\x00xq\x00h\x00\x86q\x01.";
        let values = unpickle(bytes, None, None).unwrap();
        assert_eq!(values, vec![Value::from("x"), Value::from("x")]);
    }

    #[test]
    fn test_memo_get_sees_filled_list() {
        // a = [1]; pickle.dumps([a, a], protocol=2)
        let bytes = b"\x80\x02]q\x00(]q\x01K\x01ah\x01e.";
        let values = unpickle(bytes, None, None).unwrap();
        let inner = Value::List(vec![Value::Int(1)]);
        assert_eq!(values, vec![inner.clone(), inner]);
    }

    #[test]
    fn test_memo_get_sees_built_object() {
        // p = geometry.Point(); p.x = 3; pickle.dumps([p, p], protocol=2)
        let bytes = b"\x80\x02]q\x00(cgeometry\nPoint\nq\x01)\x81q\x02}q\x03X\x01\x00\x00\x00xq\x04K\x03sbh\x02e.";
        let values = unpickle(bytes, None, None).unwrap();
        let point = Value::Object {
            class: "geometry.Point".into(),
            state: Box::new(Value::Dict(vec![("x".into(), Value::Int(3))])),
        };
        assert_eq!(values, vec![point.clone(), point]);
    }

    #[test]
    fn test_self_referencing_list_does_not_loop() {
        // a = []; a.append(a); pickle.dumps(a, protocol=2)
        let bytes = b"\x80\x02]q\x00h\x00a.";
        let values = unpickle(bytes, None, None).unwrap();
        assert_eq!(values, vec![Value::List(Vec::new())]);
    }

    #[test]
    fn test_newobj_keeps_arguments_without_build() {
        // GLOBAL geometry.Point, (3, 4), NEWOBJ
        let bytes = b"\x80\x02cgeometry\nPoint\nK\x03K\x04\x86\x81.";
        let values = unpickle(bytes, None, None).unwrap();
        assert_eq!(
            values,
            vec![Value::Object {
                class: "geometry.Point".into(),
                state: Box::new(Value::Tuple(vec![Value::Int(3), Value::Int(4)])),
            }]
        );
    }

    #[test]
    fn test_inline_tensor_with_overflowing_shape() {
        let bytes = pickle(
            &Value::Tuple(vec![
                Value::from("f32"),
                Value::Tuple(vec![Value::Int(1 << 40), Value::Int(1 << 40)]),
                Value::Bytes(Vec::new()),
            ]),
            None,
        )
        .unwrap();
        // reuse the encoded arguments as a call to the inline constructor
        let mut call = b"\x80\x02ctensorloop\nbuild_tensor_inline\n".to_vec();
        call.extend_from_slice(&bytes[2..bytes.len() - 1]);
        call.extend_from_slice(b"R.");
        match unpickle(&call, None, None) {
            Err(Error::Pickle(reason)) => assert!(reason.contains("overflows"), "{reason}"),
            other => panic!("expected a pickle error, got {other:?}"),
        }
    }

    #[test]
    fn test_forged_length_fails_on_missing_bytes() {
        // BINBYTES claiming 2 GiB, followed by two bytes
        let bytes = b"\x80\x02B\xff\xff\xff\x7fab.";
        assert!(matches!(unpickle(bytes, None, None), Err(Error::Pickle(_))));
    }

    #[test]
    fn test_long1_negative() {
        assert_eq!(decode_long(&[0xff]).unwrap(), -1);
        assert_eq!(decode_long(&[0x00, 0x01]).unwrap(), 256);
        assert_eq!(decode_long(&[]).unwrap(), 0);
        assert!(decode_long(&[0; 9]).is_err());
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let bytes = pickle(&Value::List(vec![Value::Int(1)]), None).unwrap();
        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(unpickle(truncated, None, None), Err(Error::Pickle(_))));
        assert!(matches!(unpickle(&[], None, None), Err(Error::Pickle(_))));
    }

    #[test]
    fn test_tensor_reference_needs_table() {
        let t = Tensor::from_slice_host(&[1u8, 2, 3], &[3]).unwrap();
        let mut table = Vec::new();
        let bytes = pickle(&Value::Tensor(t.clone()), Some(&mut table)).unwrap();

        let values = unpickle(&bytes, Some(table.as_slice()), None).unwrap();
        assert_eq!(values, vec![Value::Tensor(t)]);
        assert!(matches!(unpickle(&bytes, None, None), Err(Error::Pickle(_))));
        assert!(matches!(unpickle(&bytes, Some(&[][..]), None), Err(Error::Pickle(_))));
    }

    #[test]
    fn test_class_resolver() {
        let value = Value::Object {
            class: "geometry.Point".into(),
            state: Box::new(Value::Dict(vec![("x".into(), Value::Int(3))])),
        };
        let bytes = pickle(&value, None).unwrap();

        let unresolved = unpickle(&bytes, None, None).unwrap();
        assert_eq!(unresolved, vec![value.clone()]);

        let rename: ClassResolver = &|q: &str| (q == "geometry.Point").then(|| "Point2D".to_string());
        let renamed = unpickle(&bytes, None, Some(rename)).unwrap();
        match &renamed[0] {
            Value::Object { class, .. } => assert_eq!(class, "Point2D"),
            other => panic!("expected object, got {other:?}"),
        }

        let reject: ClassResolver = &|_: &str| None;
        assert!(matches!(unpickle(&bytes, None, Some(reject)), Err(Error::Pickle(_))));
    }

    #[test]
    fn test_stream_reader_with_small_chunks() {
        let bytes = pickle(&Value::from("chunked reader"), None).unwrap();
        let mut pos = 0;
        let values = unpickle_stream(
            |buf: &mut [u8]| {
                // hand out one byte at a time
                if pos == bytes.len() || buf.is_empty() {
                    return 0;
                }
                buf[0] = bytes[pos];
                pos += 1;
                1
            },
            || true,
            None,
            None,
        )
        .unwrap();
        assert_eq!(values, vec![Value::from("chunked reader")]);
    }
}
