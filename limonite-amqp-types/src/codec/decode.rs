//! Bounds-checked decoders for the AMQP type system.
//!
//! [`Decoder`] is a cursor over a borrowed byte slice. Every read is checked
//! against the remaining length before any allocation happens, container
//! nesting is capped, and failures leave the connection free to drop the
//! frame and report a decode error.

use std::convert::TryFrom;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::error::Error;
use crate::format_code::FormatCode;
use crate::primitives::{Binary, Dec128, Dec32, Dec64, Symbol, Timestamp, Uuid};
use crate::value::{Described, Descriptor, Value};

/// Containers nested deeper than this are rejected.
pub const MAX_NESTING_DEPTH: u32 = 32;

/// Deserializes a value from its AMQP wire form.
pub trait Decode: Sized {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error>;
}

/// Decodes a single typed value from the front of `buf`, returning the value
/// and the number of bytes consumed.
pub fn from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), Error> {
    let mut de = Decoder::new(buf);
    let value = T::decode(&mut de)?;
    Ok((value, de.position()))
}

/// Reads any one value from the front of `buf` (the untyped entry point).
pub fn read_value(buf: &[u8]) -> Result<(Value, usize), Error> {
    from_slice::<Value>(buf)
}

#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    fn at_depth(buf: &'a [u8], depth: u32) -> Result<Self, Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::NestingLimit);
        }
        Ok(Self { buf, pos: 0, depth })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Result<u8, Error> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(Error::InsufficientBytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::InsufficientBytes);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let slice = self.read_exact(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// A length prefix is only trusted after it has been checked against
    /// the remaining buffer.
    fn read_len(&mut self, code: FormatCode) -> Result<usize, Error> {
        let len = match code {
            FormatCode::VBin8 | FormatCode::Str8 | FormatCode::Sym8 => self.read_u8()? as usize,
            _ => self.read_u32()? as usize,
        };
        if len > self.remaining() {
            return Err(Error::InvalidLength);
        }
        Ok(len)
    }

    pub fn read_format_code(&mut self) -> Result<FormatCode, Error> {
        FormatCode::try_from(self.read_u8()?)
    }

    /// Reads the descriptor of a described value, consuming the leading
    /// 0x00 constructor.
    pub fn read_descriptor(&mut self) -> Result<Descriptor, Error> {
        if self.read_u8()? != FormatCode::Described as u8 {
            return Err(Error::UnexpectedDescriptor);
        }
        self.read_descriptor_value()
    }

    fn read_descriptor_value(&mut self) -> Result<Descriptor, Error> {
        match self.read_format_code()? {
            FormatCode::ULong0 => Ok(Descriptor::Code(0)),
            FormatCode::SmallULong => Ok(Descriptor::Code(self.read_u8()? as u64)),
            FormatCode::ULong => Ok(Descriptor::Code(self.read_u64()?)),
            code @ (FormatCode::Sym8 | FormatCode::Sym32) => {
                let len = self.read_len(code)?;
                let bytes = self.read_exact(len)?;
                Ok(Descriptor::Symbol(Symbol::new(std::str::from_utf8(bytes)?)))
            }
            _ => Err(Error::UnexpectedDescriptor),
        }
    }

    /// Consumes a composite header, checking the descriptor against the
    /// expected code or name, and returns a reader over its fields.
    pub fn read_composite(&mut self, code: u64, name: &str) -> Result<ListReader<'a>, Error> {
        let descriptor = self.read_descriptor()?;
        if !descriptor_matches(&descriptor, code, name) {
            return Err(Error::UnexpectedDescriptor);
        }
        self.list_reader()
    }

    /// Reads a list header and returns a reader over its elements.
    pub fn list_reader(&mut self) -> Result<ListReader<'a>, Error> {
        let (payload, count) = match self.read_format_code()? {
            FormatCode::List0 => (&[][..], 0),
            FormatCode::List8 => {
                let size = self.read_u8()? as usize;
                if size < 1 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u8()? as u32;
                (self.read_exact(size - 1)?, count)
            }
            FormatCode::List32 => {
                let size = self.read_u32()? as usize;
                if size < 4 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u32()?;
                (self.read_exact(size - 4)?, count)
            }
            _ => return Err(Error::InvalidValue),
        };
        Ok(ListReader {
            de: Decoder::at_depth(payload, self.depth + 1)?,
            count,
            index: 0,
        })
    }

    /// Reads a map header and returns a reader over its entries.
    pub fn map_reader(&mut self) -> Result<MapReader<'a>, Error> {
        let (payload, count) = match self.read_format_code()? {
            FormatCode::Map8 => {
                let size = self.read_u8()? as usize;
                if size < 1 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u8()? as u32;
                (self.read_exact(size - 1)?, count)
            }
            FormatCode::Map32 => {
                let size = self.read_u32()? as usize;
                if size < 4 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u32()?;
                (self.read_exact(size - 4)?, count)
            }
            _ => return Err(Error::InvalidValue),
        };
        if count % 2 != 0 {
            return Err(Error::InvalidValue);
        }
        Ok(MapReader {
            de: Decoder::at_depth(payload, self.depth + 1)?,
            pairs: count / 2,
            read: 0,
        })
    }

    /// Reads and discards one value.
    pub fn skip_value(&mut self) -> Result<(), Error> {
        let _ = Value::decode(self)?;
        Ok(())
    }

    fn read_value_body(&mut self, code: FormatCode) -> Result<Value, Error> {
        let value = match code {
            FormatCode::Described => {
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(Error::NestingLimit);
                }
                self.depth += 1;
                let descriptor = self.read_descriptor_value()?;
                let value = Value::decode(self)?;
                self.depth -= 1;
                Value::Described(Box::new(Described { descriptor, value }))
            }
            FormatCode::Null => Value::Null,
            FormatCode::Boolean => match self.read_u8()? {
                0x00 => Value::Bool(false),
                0x01 => Value::Bool(true),
                _ => return Err(Error::InvalidValue),
            },
            FormatCode::BooleanTrue => Value::Bool(true),
            FormatCode::BooleanFalse => Value::Bool(false),
            FormatCode::UByte => Value::UByte(self.read_u8()?),
            FormatCode::UShort => Value::UShort(self.read_u16()?),
            FormatCode::UInt => Value::UInt(self.read_u32()?),
            FormatCode::SmallUInt => Value::UInt(self.read_u8()? as u32),
            FormatCode::UInt0 => Value::UInt(0),
            FormatCode::ULong => Value::ULong(self.read_u64()?),
            FormatCode::SmallULong => Value::ULong(self.read_u8()? as u64),
            FormatCode::ULong0 => Value::ULong(0),
            FormatCode::Byte => Value::Byte(self.read_i8()?),
            FormatCode::Short => Value::Short(self.read_i16()?),
            FormatCode::Int => Value::Int(self.read_i32()?),
            FormatCode::SmallInt => Value::Int(self.read_i8()? as i32),
            FormatCode::Long => Value::Long(self.read_i64()?),
            FormatCode::SmallLong => Value::Long(self.read_i8()? as i64),
            FormatCode::Float => Value::Float(OrderedFloat(f32::from_be_bytes(self.read_array()?))),
            FormatCode::Double => {
                Value::Double(OrderedFloat(f64::from_be_bytes(self.read_array()?)))
            }
            FormatCode::Decimal32 => Value::Dec32(Dec32(self.read_array()?)),
            FormatCode::Decimal64 => Value::Dec64(Dec64(self.read_array()?)),
            FormatCode::Decimal128 => Value::Dec128(Dec128(self.read_array()?)),
            FormatCode::Char => {
                let raw = self.read_u32()?;
                Value::Char(char::from_u32(raw).ok_or(Error::InvalidValue)?)
            }
            FormatCode::Timestamp => Value::Timestamp(Timestamp(self.read_i64()?)),
            FormatCode::Uuid => Value::Uuid(Uuid(self.read_array()?)),
            code @ (FormatCode::VBin8 | FormatCode::VBin32) => {
                let len = self.read_len(code)?;
                Value::Binary(Binary(self.read_exact(len)?.to_vec()))
            }
            code @ (FormatCode::Str8 | FormatCode::Str32) => {
                let len = self.read_len(code)?;
                Value::String(std::str::from_utf8(self.read_exact(len)?)?.to_string())
            }
            code @ (FormatCode::Sym8 | FormatCode::Sym32) => {
                let len = self.read_len(code)?;
                Value::Symbol(Symbol::new(std::str::from_utf8(self.read_exact(len)?)?))
            }
            FormatCode::List0 | FormatCode::List8 | FormatCode::List32 => {
                // Re-wind over the constructor; list_reader consumes it.
                self.pos -= 1;
                let mut reader = self.list_reader()?;
                let mut items =
                    Vec::with_capacity((reader.count as usize).min(reader.de.remaining() + 1));
                for _ in 0..reader.count {
                    items.push(Value::decode(&mut reader.de)?);
                }
                if !reader.de.is_empty() {
                    return Err(Error::InvalidLength);
                }
                Value::List(items)
            }
            FormatCode::Map8 | FormatCode::Map32 => {
                self.pos -= 1;
                let mut reader = self.map_reader()?;
                let mut pairs =
                    Vec::with_capacity((reader.pairs as usize).min(reader.de.remaining() + 1));
                while let Some((k, v)) = reader.entry::<Value, Value>()? {
                    // Untyped maps preserve duplicates; typed destinations
                    // reject them.
                    pairs.push((k, v));
                }
                Value::Map(pairs)
            }
            FormatCode::Array8 | FormatCode::Array32 => {
                self.pos -= 1;
                self.read_value_array()?
            }
        };
        Ok(value)
    }

    fn read_value_array(&mut self) -> Result<Value, Error> {
        let (payload, count) = match self.read_format_code()? {
            FormatCode::Array8 => {
                let size = self.read_u8()? as usize;
                if size < 1 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u8()? as u32;
                (self.read_exact(size - 1)?, count)
            }
            FormatCode::Array32 => {
                let size = self.read_u32()? as usize;
                if size < 4 || size > self.remaining() {
                    return Err(Error::InvalidLength);
                }
                let count = self.read_u32()?;
                (self.read_exact(size - 4)?, count)
            }
            _ => return Err(Error::InvalidValue),
        };

        let mut de = Decoder::at_depth(payload, self.depth + 1)?;
        let constructor = de.read_format_code()?;
        let descriptor = match constructor {
            FormatCode::Described => Some(de.read_descriptor_value()?),
            _ => None,
        };
        let element_code = match descriptor {
            Some(_) => de.read_format_code()?,
            None => constructor,
        };

        let mut items = Vec::with_capacity((count as usize).min(de.remaining() + 1).min(4096));
        for _ in 0..count {
            let element = de
                .read_value_body(element_code)
                .map_err(|err| match err {
                    Error::InvalidFormatCode => Error::ArrayElementMismatch,
                    other => other,
                })?;
            let element = match &descriptor {
                Some(descriptor) => Value::Described(Box::new(Described {
                    descriptor: descriptor.clone(),
                    value: element,
                })),
                None => element,
            };
            items.push(element);
        }
        if !de.is_empty() {
            return Err(Error::ArrayElementMismatch);
        }
        Ok(Value::Array(items))
    }
}

pub(crate) fn descriptor_matches(descriptor: &Descriptor, code: u64, name: &str) -> bool {
    match descriptor {
        Descriptor::Code(c) => *c == code,
        Descriptor::Symbol(s) => s.as_str() == name,
    }
}

/// Reads the fields of a list-encoded composite in order.
///
/// Fields past the encoded count read as `None`; unknown trailing fields
/// are skipped by [`ListReader::finish`].
#[derive(Debug)]
pub struct ListReader<'a> {
    de: Decoder<'a>,
    count: u32,
    index: u32,
}

impl<'a> ListReader<'a> {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn field<T: Decode>(&mut self) -> Result<Option<T>, Error> {
        if self.index >= self.count {
            return Ok(None);
        }
        self.index += 1;
        if self.de.peek_u8()? == FormatCode::Null as u8 {
            self.de.pos += 1;
            return Ok(None);
        }
        T::decode(&mut self.de).map(Some)
    }

    pub fn required<T: Decode>(&mut self, name: &'static str) -> Result<T, Error> {
        self.field()?
            .ok_or_else(|| Error::Message(format!("mandatory field {} is null", name)))
    }

    pub fn field_or<T: Decode>(&mut self, default: T) -> Result<T, Error> {
        Ok(self.field()?.unwrap_or(default))
    }

    /// Skips any fields this decoder does not know about.
    pub fn finish(mut self) -> Result<(), Error> {
        while self.index < self.count {
            self.index += 1;
            self.de.skip_value()?;
        }
        if !self.de.is_empty() {
            return Err(Error::InvalidLength);
        }
        Ok(())
    }
}

/// Reads the entries of an encoded map in order.
#[derive(Debug)]
pub struct MapReader<'a> {
    de: Decoder<'a>,
    pairs: u32,
    read: u32,
}

impl<'a> MapReader<'a> {
    pub fn entry<K: Decode, V: Decode>(&mut self) -> Result<Option<(K, V)>, Error> {
        if self.read >= self.pairs {
            if !self.de.is_empty() {
                return Err(Error::InvalidLength);
            }
            return Ok(None);
        }
        self.read += 1;
        let key = K::decode(&mut self.de)?;
        let value = V::decode(&mut self.de)?;
        Ok(Some((key, value)))
    }
}

impl Decode for Value {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        let code = de.read_format_code()?;
        de.read_value_body(code)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        if de.peek_u8()? == FormatCode::Null as u8 {
            de.pos += 1;
            return Ok(None);
        }
        T::decode(de).map(Some)
    }
}

impl Decode for bool {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::BooleanTrue => Ok(true),
            FormatCode::BooleanFalse => Ok(false),
            FormatCode::Boolean => match de.read_u8()? {
                0x00 => Ok(false),
                0x01 => Ok(true),
                _ => Err(Error::InvalidValue),
            },
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for u8 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::UByte => de.read_u8(),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for u16 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::UShort => de.read_u16(),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for u32 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::UInt => de.read_u32(),
            FormatCode::SmallUInt => Ok(de.read_u8()? as u32),
            FormatCode::UInt0 => Ok(0),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for u64 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::ULong => de.read_u64(),
            FormatCode::SmallULong => Ok(de.read_u8()? as u64),
            FormatCode::ULong0 => Ok(0),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for i8 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Byte => de.read_i8(),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for i16 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Short => de.read_i16(),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for i32 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Int => de.read_i32(),
            FormatCode::SmallInt => Ok(de.read_i8()? as i32),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for i64 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Long => de.read_i64(),
            FormatCode::SmallLong => Ok(de.read_i8()? as i64),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for f32 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Float => Ok(f32::from_be_bytes(de.read_array()?)),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for f64 {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Double => Ok(f64::from_be_bytes(de.read_array()?)),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for char {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Char => char::from_u32(de.read_u32()?).ok_or(Error::InvalidValue),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for String {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            code @ (FormatCode::Str8 | FormatCode::Str32) => {
                let len = de.read_len(code)?;
                Ok(std::str::from_utf8(de.read_exact(len)?)?.to_string())
            }
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for Symbol {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            code @ (FormatCode::Sym8 | FormatCode::Sym32) => {
                let len = de.read_len(code)?;
                Ok(Symbol::new(std::str::from_utf8(de.read_exact(len)?)?))
            }
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for Binary {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            code @ (FormatCode::VBin8 | FormatCode::VBin32) => {
                let len = de.read_len(code)?;
                Ok(Binary(de.read_exact(len)?.to_vec()))
            }
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for Timestamp {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Timestamp => Ok(Timestamp(de.read_i64()?)),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Decode for Uuid {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match de.read_format_code()? {
            FormatCode::Uuid => Ok(Uuid(de.read_array()?)),
            _ => Err(Error::InvalidValue),
        }
    }
}

/// Lists of untyped values.
impl Decode for Vec<Value> {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        let mut reader = de.list_reader()?;
        let mut items = Vec::with_capacity((reader.count as usize).min(reader.de.remaining() + 1));
        for _ in 0..reader.count {
            items.push(Value::decode(&mut reader.de)?);
        }
        if !reader.de.is_empty() {
            return Err(Error::InvalidLength);
        }
        Ok(items)
    }
}

/// "Multiple" symbol fields: a lone symbol or an array of symbols.
impl Decode for Vec<Symbol> {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        match FormatCode::try_from(de.peek_u8()?)? {
            FormatCode::Sym8 | FormatCode::Sym32 => Ok(vec![Symbol::decode(de)?]),
            FormatCode::Array8 | FormatCode::Array32 => match de.read_value_array()? {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Symbol(s) => Ok(s),
                        _ => Err(Error::ArrayElementMismatch),
                    })
                    .collect(),
                _ => Err(Error::InvalidValue),
            },
            _ => Err(Error::InvalidValue),
        }
    }
}

/// Typed maps reject duplicate keys.
impl<K, V> Decode for IndexMap<K, V>
where
    K: Decode + std::hash::Hash + Eq,
    V: Decode,
{
    fn decode(de: &mut Decoder<'_>) -> Result<Self, Error> {
        let mut reader = de.map_reader()?;
        let mut map = IndexMap::with_capacity((reader.pairs as usize).min(4096));
        while let Some((key, value)) = reader.entry::<K, V>()? {
            if map.insert(key, value).is_some() {
                return Err(Error::InvalidValue);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::{from_slice, read_value, Decode, Decoder};
    use crate::codec::encode::to_vec;
    use crate::error::Error;
    use crate::primitives::{Symbol, Timestamp};
    use crate::value::Value;

    fn round_trip(value: Value) {
        let bytes = to_vec(&value);
        let (decoded, consumed) = read_value(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn primitive_round_trips() {
        round_trip(Value::Null);
        round_trip(Value::Bool(true));
        round_trip(Value::UByte(0xab));
        round_trip(Value::UShort(0xabcd));
        round_trip(Value::UInt(0));
        round_trip(Value::UInt(200));
        round_trip(Value::UInt(70_000));
        round_trip(Value::ULong(u64::MAX));
        round_trip(Value::Byte(-3));
        round_trip(Value::Short(-300));
        round_trip(Value::Int(-5));
        round_trip(Value::Int(1 << 20));
        round_trip(Value::Long(i64::MIN));
        round_trip(Value::from(1.5f32));
        round_trip(Value::from(-2.25f64));
        round_trip(Value::Char('\u{1F980}'));
        round_trip(Value::Timestamp(Timestamp(-1)));
        round_trip(Value::from("hello"));
        round_trip(Value::from(Symbol::from("amqp:open:list")));
        round_trip(Value::Binary(vec![0u8; 300].into()));
        round_trip(Value::from("x".repeat(300)));
    }

    #[test]
    fn container_round_trips() {
        round_trip(Value::List(vec![
            Value::from(1u32),
            Value::from("two"),
            Value::Null,
        ]));
        round_trip(Value::Map(vec![
            (Value::from(Symbol::from("k1")), Value::from(1u32)),
            (Value::from(Symbol::from("k2")), Value::List(vec![])),
        ]));
        round_trip(Value::Array(vec![
            Value::UInt(1),
            Value::UInt(2),
            Value::UInt(3),
        ]));
    }

    #[test]
    fn negative_timestamp_is_preserved() {
        let (value, _) = read_value(&to_vec(&Timestamp(-62_135_596_800_000))).unwrap();
        assert_eq!(value, Value::Timestamp(Timestamp(-62_135_596_800_000)));
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let bytes = to_vec(&Value::from("hello world"));
        for cut in 0..bytes.len() {
            let result = read_value(&bytes[..cut]);
            assert!(result.is_err(), "cut at {} should fail", cut);
        }
    }

    #[test]
    fn length_prefix_beyond_buffer_is_rejected() {
        // str8 claiming 0x30 bytes with only 2 available
        assert_eq!(
            read_value(&[0xa1, 0x30, 0x41, 0x42]),
            Err(Error::InvalidLength)
        );
        // map8 claiming a size larger than the remaining buffer
        let truncated_map = [0xc1, 0x00, 0x30, 0xa0, 0x00, 0x53, 0x30];
        assert!(read_value(&truncated_map).is_err());
    }

    #[test]
    fn unknown_format_code_is_rejected() {
        assert_eq!(read_value(&[0x3f]), Err(Error::InvalidFormatCode));
    }

    #[test]
    fn deep_nesting_is_capped() {
        // 80 well-formed nested list8s around a null
        let mut bytes = vec![0x40];
        for _ in 0..80 {
            let mut outer = vec![0xc0, bytes.len() as u8 + 1, 0x01];
            outer.extend_from_slice(&bytes);
            bytes = outer;
        }
        assert_eq!(read_value(&bytes), Err(Error::NestingLimit));
    }

    #[test]
    fn array_element_mismatch_is_rejected() {
        // array8 of uint constructor but truncated element payload
        let bytes = [0xe0, 0x04, 0x02, 0x70, 0x00, 0x00];
        assert!(read_value(&bytes).is_err());
    }

    #[test]
    fn typed_map_rejects_duplicate_keys() {
        // map8 with two identical symbol keys
        let bytes = [
            0xc1, 0x0b, 0x04, // map8, size, 4 elements
            0xa3, 0x01, b'a', 0x52, 0x01, // a: 1
            0xa3, 0x01, b'a', 0x52, 0x02, // a: 2
        ];
        let result = from_slice::<indexmap::IndexMap<Symbol, Value>>(&bytes);
        assert_eq!(result, Err(Error::InvalidValue));
    }

    #[test]
    fn multiple_field_accepts_single_symbol() {
        let bytes = to_vec(&Symbol::from("PLAIN"));
        let (symbols, _) = from_slice::<Vec<Symbol>>(&bytes).unwrap();
        assert_eq!(symbols, vec![Symbol::from("PLAIN")]);

        let bytes = to_vec(&vec![Symbol::from("PLAIN"), Symbol::from("ANONYMOUS")]);
        let (symbols, _) = from_slice::<Vec<Symbol>>(&bytes).unwrap();
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn list_reader_defaults_missing_trailing_fields() {
        // list8 with one field; later fields read as None
        let bytes = [0xc0, 0x03, 0x01, 0x52, 0x2a];
        let mut de = Decoder::new(&bytes);
        let mut reader = de.list_reader().unwrap();
        assert_eq!(reader.field::<u32>().unwrap(), Some(42));
        assert_eq!(reader.field::<u32>().unwrap(), None);
        assert_eq!(reader.field_or::<u32>(7).unwrap(), 7);
        reader.finish().unwrap();
    }
}
