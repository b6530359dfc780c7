//! Hand-written encoders for the AMQP type system.
//!
//! Every protocol type implements [`Encode`] directly; composite types are
//! assembled with [`ListEncoder`], which elides trailing null fields the way
//! the specification permits.

use bytes::{BufMut, BytesMut};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::format_code::FormatCode;
use crate::primitives::{Binary, Dec128, Dec32, Dec64, Symbol, Timestamp, Uuid};
use crate::value::{Described, Descriptor, Value};

/// Serializes a value into its AMQP wire form.
pub trait Encode {
    fn encode(&self, buf: &mut BytesMut);
}

/// Encodes a value into a fresh byte vector.
pub fn to_vec<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = BytesMut::new();
    value.encode(&mut buf);
    buf.to_vec()
}

impl Encode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            true => buf.put_u8(FormatCode::BooleanTrue as u8),
            false => buf.put_u8(FormatCode::BooleanFalse as u8),
        }
    }
}

impl Encode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::UByte as u8);
        buf.put_u8(*self);
    }
}

impl Encode for u16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::UShort as u8);
        buf.put_u16(*self);
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut BytesMut) {
        match *self {
            0 => buf.put_u8(FormatCode::UInt0 as u8),
            v if v <= u8::MAX as u32 => {
                buf.put_u8(FormatCode::SmallUInt as u8);
                buf.put_u8(v as u8);
            }
            v => {
                buf.put_u8(FormatCode::UInt as u8);
                buf.put_u32(v);
            }
        }
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut BytesMut) {
        match *self {
            0 => buf.put_u8(FormatCode::ULong0 as u8),
            v if v <= u8::MAX as u64 => {
                buf.put_u8(FormatCode::SmallULong as u8);
                buf.put_u8(v as u8);
            }
            v => {
                buf.put_u8(FormatCode::ULong as u8);
                buf.put_u64(v);
            }
        }
    }
}

impl Encode for i8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Byte as u8);
        buf.put_i8(*self);
    }
}

impl Encode for i16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Short as u8);
        buf.put_i16(*self);
    }
}

impl Encode for i32 {
    fn encode(&self, buf: &mut BytesMut) {
        if (i8::MIN as i32..=i8::MAX as i32).contains(self) {
            buf.put_u8(FormatCode::SmallInt as u8);
            buf.put_i8(*self as i8);
        } else {
            buf.put_u8(FormatCode::Int as u8);
            buf.put_i32(*self);
        }
    }
}

impl Encode for i64 {
    fn encode(&self, buf: &mut BytesMut) {
        if (i8::MIN as i64..=i8::MAX as i64).contains(self) {
            buf.put_u8(FormatCode::SmallLong as u8);
            buf.put_i8(*self as i8);
        } else {
            buf.put_u8(FormatCode::Long as u8);
            buf.put_i64(*self);
        }
    }
}

impl Encode for f32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Float as u8);
        buf.put_f32(*self);
    }
}

impl Encode for f64 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Double as u8);
        buf.put_f64(*self);
    }
}

impl Encode for char {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Char as u8);
        buf.put_u32(*self as u32);
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.as_bytes();
        if bytes.len() <= u8::MAX as usize {
            buf.put_u8(FormatCode::Str8 as u8);
            buf.put_u8(bytes.len() as u8);
        } else {
            buf.put_u8(FormatCode::Str32 as u8);
            buf.put_u32(bytes.len() as u32);
        }
        buf.put_slice(bytes);
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf)
    }
}

impl Encode for Symbol {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.0.as_bytes();
        if bytes.len() <= u8::MAX as usize {
            buf.put_u8(FormatCode::Sym8 as u8);
            buf.put_u8(bytes.len() as u8);
        } else {
            buf.put_u8(FormatCode::Sym32 as u8);
            buf.put_u32(bytes.len() as u32);
        }
        buf.put_slice(bytes);
    }
}

impl Encode for Binary {
    fn encode(&self, buf: &mut BytesMut) {
        if self.0.len() <= u8::MAX as usize {
            buf.put_u8(FormatCode::VBin8 as u8);
            buf.put_u8(self.0.len() as u8);
        } else {
            buf.put_u8(FormatCode::VBin32 as u8);
            buf.put_u32(self.0.len() as u32);
        }
        buf.put_slice(&self.0);
    }
}

impl Encode for Timestamp {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Timestamp as u8);
        buf.put_i64(self.0);
    }
}

impl Encode for Uuid {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Uuid as u8);
        buf.put_slice(&self.0);
    }
}

impl Encode for Dec32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Decimal32 as u8);
        buf.put_slice(&self.0);
    }
}

impl Encode for Dec64 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Decimal64 as u8);
        buf.put_slice(&self.0);
    }
}

impl Encode for Dec128 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Decimal128 as u8);
        buf.put_slice(&self.0);
    }
}

impl<T: Encode> Encode for &T {
    fn encode(&self, buf: &mut BytesMut) {
        (*self).encode(buf)
    }
}

/// `None` encodes as null.
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(value) => value.encode(buf),
            None => buf.put_u8(FormatCode::Null as u8),
        }
    }
}

/// Lists of untyped values encode as list8/list32.
impl Encode for Vec<Value> {
    fn encode(&self, buf: &mut BytesMut) {
        let mut scratch = BytesMut::new();
        for item in self {
            item.encode(&mut scratch);
        }
        put_list(self.len() as u32, &scratch, buf);
    }
}

/// "Multiple" symbol fields encode as an array even for a single element;
/// decoders must accept both forms.
impl Encode for Vec<Symbol> {
    fn encode(&self, buf: &mut BytesMut) {
        encode_symbol_array(self, buf);
    }
}

impl<K: Encode, V: Encode, S> Encode for IndexMap<K, V, S> {
    fn encode(&self, buf: &mut BytesMut) {
        let mut scratch = BytesMut::new();
        for (k, v) in self {
            k.encode(&mut scratch);
            v.encode(&mut scratch);
        }
        put_map(self.len() as u32 * 2, &scratch, buf);
    }
}

impl Encode for Described {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FormatCode::Described as u8);
        match &self.descriptor {
            Descriptor::Symbol(name) => name.encode(buf),
            Descriptor::Code(code) => code.encode(buf),
        }
        self.value.encode(buf);
    }
}

impl Encode for Value {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Value::Described(described) => described.encode(buf),
            Value::Null => buf.put_u8(FormatCode::Null as u8),
            Value::Bool(v) => v.encode(buf),
            Value::UByte(v) => v.encode(buf),
            Value::UShort(v) => v.encode(buf),
            Value::UInt(v) => v.encode(buf),
            Value::ULong(v) => v.encode(buf),
            Value::Byte(v) => v.encode(buf),
            Value::Short(v) => v.encode(buf),
            Value::Int(v) => v.encode(buf),
            Value::Long(v) => v.encode(buf),
            Value::Float(OrderedFloat(v)) => v.encode(buf),
            Value::Double(OrderedFloat(v)) => v.encode(buf),
            Value::Dec32(v) => v.encode(buf),
            Value::Dec64(v) => v.encode(buf),
            Value::Dec128(v) => v.encode(buf),
            Value::Char(v) => v.encode(buf),
            Value::Timestamp(v) => v.encode(buf),
            Value::Uuid(v) => v.encode(buf),
            Value::Binary(v) => v.encode(buf),
            Value::String(v) => v.encode(buf),
            Value::Symbol(v) => v.encode(buf),
            Value::List(items) => items.encode(buf),
            Value::Map(pairs) => {
                let mut scratch = BytesMut::new();
                for (k, v) in pairs {
                    k.encode(&mut scratch);
                    v.encode(&mut scratch);
                }
                put_map(pairs.len() as u32 * 2, &scratch, buf);
            }
            Value::Array(items) => encode_value_array(items, buf),
        }
    }
}

/// Writes the described-type prefix: the 0x00 constructor followed by the
/// numeric descriptor.
pub fn put_described_prefix(descriptor_code: u64, buf: &mut BytesMut) {
    buf.put_u8(FormatCode::Described as u8);
    descriptor_code.encode(buf);
}

fn put_list(count: u32, payload: &[u8], buf: &mut BytesMut) {
    if count == 0 {
        buf.put_u8(FormatCode::List0 as u8);
    } else if payload.len() + 1 <= u8::MAX as usize && count <= u8::MAX as u32 {
        buf.put_u8(FormatCode::List8 as u8);
        buf.put_u8(payload.len() as u8 + 1);
        buf.put_u8(count as u8);
        buf.put_slice(payload);
    } else {
        buf.put_u8(FormatCode::List32 as u8);
        buf.put_u32(payload.len() as u32 + 4);
        buf.put_u32(count);
        buf.put_slice(payload);
    }
}

fn put_map(count: u32, payload: &[u8], buf: &mut BytesMut) {
    if payload.len() + 1 <= u8::MAX as usize && count <= u8::MAX as u32 {
        buf.put_u8(FormatCode::Map8 as u8);
        buf.put_u8(payload.len() as u8 + 1);
        buf.put_u8(count as u8);
    } else {
        buf.put_u8(FormatCode::Map32 as u8);
        buf.put_u32(payload.len() as u32 + 4);
        buf.put_u32(count);
    }
    buf.put_slice(payload);
}

fn put_array(count: u32, constructor: &[u8], payload: &[u8], buf: &mut BytesMut) {
    let body_len = constructor.len() + payload.len();
    if body_len + 1 <= u8::MAX as usize && count <= u8::MAX as u32 {
        buf.put_u8(FormatCode::Array8 as u8);
        buf.put_u8(body_len as u8 + 1);
        buf.put_u8(count as u8);
    } else {
        buf.put_u8(FormatCode::Array32 as u8);
        buf.put_u32(body_len as u32 + 4);
        buf.put_u32(count);
    }
    buf.put_slice(constructor);
    buf.put_slice(payload);
}

fn encode_symbol_array(symbols: &[Symbol], buf: &mut BytesMut) {
    let wide = symbols.iter().any(|s| s.0.len() > u8::MAX as usize);
    let constructor = if wide {
        FormatCode::Sym32 as u8
    } else {
        FormatCode::Sym8 as u8
    };
    let mut payload = BytesMut::new();
    for symbol in symbols {
        let bytes = symbol.0.as_bytes();
        if wide {
            payload.put_u32(bytes.len() as u32);
        } else {
            payload.put_u8(bytes.len() as u8);
        }
        payload.put_slice(bytes);
    }
    put_array(symbols.len() as u32, &[constructor], &payload, buf);
}

/// Encodes an array of untyped values.
///
/// Only arrays of primitive values can be expressed on the wire with a
/// single element constructor. Hand-built arrays holding compound, described
/// or mixed-variant elements cannot, and fall back to the list encoding;
/// decoded arrays are homogeneous and never hit the fallback.
fn encode_value_array(items: &[Value], buf: &mut BytesMut) {
    let Some(first) = items.first() else {
        put_array(0, &[FormatCode::Null as u8], &[], buf);
        return;
    };

    let homogeneous = items
        .iter()
        .all(|item| std::mem::discriminant(item) == std::mem::discriminant(first));
    let constructor = homogeneous.then(|| array_constructor(first)).flatten();

    let Some(constructor) = constructor else {
        let mut scratch = BytesMut::new();
        for item in items {
            item.encode(&mut scratch);
        }
        put_list(items.len() as u32, &scratch, buf);
        return;
    };

    let mut payload = BytesMut::new();
    for item in items {
        put_array_element(item, &mut payload);
    }
    put_array(items.len() as u32, &[constructor as u8], &payload, buf);
}

/// The widest constructor for each primitive variant, so that all elements
/// share one encoding regardless of magnitude.
fn array_constructor(value: &Value) -> Option<FormatCode> {
    let code = match value {
        Value::Null => FormatCode::Null,
        Value::Bool(_) => FormatCode::Boolean,
        Value::UByte(_) => FormatCode::UByte,
        Value::UShort(_) => FormatCode::UShort,
        Value::UInt(_) => FormatCode::UInt,
        Value::ULong(_) => FormatCode::ULong,
        Value::Byte(_) => FormatCode::Byte,
        Value::Short(_) => FormatCode::Short,
        Value::Int(_) => FormatCode::Int,
        Value::Long(_) => FormatCode::Long,
        Value::Float(_) => FormatCode::Float,
        Value::Double(_) => FormatCode::Double,
        Value::Dec32(_) => FormatCode::Decimal32,
        Value::Dec64(_) => FormatCode::Decimal64,
        Value::Dec128(_) => FormatCode::Decimal128,
        Value::Char(_) => FormatCode::Char,
        Value::Timestamp(_) => FormatCode::Timestamp,
        Value::Uuid(_) => FormatCode::Uuid,
        Value::Binary(_) => FormatCode::VBin32,
        Value::String(_) => FormatCode::Str32,
        Value::Symbol(_) => FormatCode::Sym32,
        Value::List(_) | Value::Map(_) | Value::Array(_) | Value::Described(_) => return None,
    };
    Some(code)
}

fn put_array_element(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Null => {}
        Value::Bool(v) => buf.put_u8(*v as u8),
        Value::UByte(v) => buf.put_u8(*v),
        Value::UShort(v) => buf.put_u16(*v),
        Value::UInt(v) => buf.put_u32(*v),
        Value::ULong(v) => buf.put_u64(*v),
        Value::Byte(v) => buf.put_i8(*v),
        Value::Short(v) => buf.put_i16(*v),
        Value::Int(v) => buf.put_i32(*v),
        Value::Long(v) => buf.put_i64(*v),
        Value::Float(OrderedFloat(v)) => buf.put_f32(*v),
        Value::Double(OrderedFloat(v)) => buf.put_f64(*v),
        Value::Dec32(v) => buf.put_slice(&v.0),
        Value::Dec64(v) => buf.put_slice(&v.0),
        Value::Dec128(v) => buf.put_slice(&v.0),
        Value::Char(v) => buf.put_u32(*v as u32),
        Value::Timestamp(v) => buf.put_i64(v.0),
        Value::Uuid(v) => buf.put_slice(&v.0),
        Value::Binary(v) => {
            buf.put_u32(v.0.len() as u32);
            buf.put_slice(&v.0);
        }
        Value::String(v) => {
            buf.put_u32(v.len() as u32);
            buf.put_slice(v.as_bytes());
        }
        Value::Symbol(v) => {
            buf.put_u32(v.0.len() as u32);
            buf.put_slice(v.0.as_bytes());
        }
        // unreachable through encode_value_array; kept total for safety
        Value::List(_) | Value::Map(_) | Value::Array(_) | Value::Described(_) => {}
    }
}

/// Incrementally encodes the fields of a composite (described list) type,
/// eliding the trailing run of null fields.
pub struct ListEncoder {
    buf: BytesMut,
    count: u32,
    filled: u32,
    mark: usize,
}

impl ListEncoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            count: 0,
            filled: 0,
            mark: 0,
        }
    }

    /// Appends a field that is always present.
    pub fn field<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(&mut self.buf);
        self.count += 1;
        self.filled = self.count;
        self.mark = self.buf.len();
        self
    }

    /// Appends an optional field; `None` becomes null and is elided if no
    /// later field is present.
    pub fn optional<T: Encode>(&mut self, value: &Option<T>) -> &mut Self {
        match value {
            Some(v) => self.field(v),
            None => {
                self.buf.put_u8(FormatCode::Null as u8);
                self.count += 1;
                self
            }
        }
    }

    /// Writes the completed composite as a described list.
    pub fn encode_into(self, descriptor_code: u64, buf: &mut BytesMut) {
        put_described_prefix(descriptor_code, buf);
        put_list(self.filled, &self.buf[..self.mark], buf);
    }
}

impl Default for ListEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Encode, ListEncoder};
    use crate::primitives::Symbol;
    use crate::value::Value;

    #[test]
    fn unsigned_widths() {
        assert_eq!(super::to_vec(&0u32), vec![0x43]);
        assert_eq!(super::to_vec(&5u32), vec![0x52, 0x05]);
        assert_eq!(super::to_vec(&1000u32), vec![0x70, 0x00, 0x00, 0x03, 0xe8]);
        assert_eq!(super::to_vec(&0u64), vec![0x44]);
        assert_eq!(super::to_vec(&0x10u64), vec![0x53, 0x10]);
    }

    #[test]
    fn trailing_nulls_are_elided() {
        let mut list = ListEncoder::new();
        list.field("abc");
        list.optional(&None::<u32>);
        list.optional(&Some(7u32));
        list.optional(&None::<u32>);
        list.optional(&None::<u32>);

        let mut buf = BytesMut::new();
        list.encode_into(0x99, &mut buf);
        assert_eq!(
            buf.to_vec(),
            vec![
                0x00, 0x53, 0x99, // descriptor
                0xc0, 0x09, 0x03, // list8, size, three fields survive
                0xa1, 0x03, b'a', b'b', b'c', // str8
                0x40, // null placeholder
                0x52, 0x07, // smalluint
            ]
        );
    }

    #[test]
    fn all_null_fields_collapse_to_list0() {
        let mut list = ListEncoder::new();
        list.optional(&None::<u32>);
        list.optional(&None::<u32>);

        let mut buf = BytesMut::new();
        list.encode_into(0x17, &mut buf);
        assert_eq!(buf.to_vec(), vec![0x00, 0x53, 0x17, 0x45]);
    }

    #[test]
    fn symbol_vec_encodes_as_array() {
        let symbols = vec![Symbol::from("PLAIN"), Symbol::from("ANONYMOUS")];
        let mut buf = BytesMut::new();
        symbols.encode(&mut buf);
        let bytes = buf.to_vec();
        assert_eq!(bytes[0], 0xe0);
        assert_eq!(bytes[2], 2); // element count
        assert_eq!(bytes[3], 0xa3); // sym8 constructor
    }

    #[test]
    fn value_map_preserves_order() {
        let value = Value::Map(vec![
            (Value::from("b"), Value::from(2u32)),
            (Value::from("a"), Value::from(1u32)),
        ]);
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        let bytes = buf.to_vec();
        assert_eq!(bytes[0], 0xc1);
        assert_eq!(bytes[2], 4); // two pairs
        assert_eq!(&bytes[3..6], &[0xa1, 0x01, b'b']);
    }
}
