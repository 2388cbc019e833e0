//! Canonical datum model and its binary encoding.
//!
//! Every record the engine consumes or produces is lowered to a [`Datum`]
//! before it is encoded or hashed, so two independent validators always
//! agree on the bytes (and therefore on identities).
//!
//! Lowering rules:
//! - records with more than one field become a [`Datum::List`] of fields
//! - single-field records are transparent (the field itself)
//! - tagged unions become `Constr(variant_index, fields)`
//! - `Option<T>` is `Constr(0, [value])` when present, `Constr(1, [])` when absent
//! - `bool` is `Constr(0, [])` for false and `Constr(1, [])` for true
//!
//! Wire format, one tag byte followed by the payload:
//!
//! | Tag    | Variant  | Payload                                                    |
//! |--------|----------|------------------------------------------------------------|
//! | `0x00` | `Int`    | LEB128 length + minimal big-endian two's complement        |
//! | `0x01` | `Bytes`  | LEB128 length + raw bytes                                  |
//! | `0x02` | `List`   | LEB128 count + items                                       |
//! | `0x03` | `Constr` | LEB128 variant index + LEB128 count + fields               |
//! | `0x04` | `Map`    | LEB128 count + key/value pairs                             |

use std::collections::BTreeMap;

use crate::constants::{MAX_DATUM_DEPTH, MAX_INT_BYTES};
use crate::error::StructuralError;
use crate::types::Hash256;

const TAG_INT: u8 = 0x00;
const TAG_BYTES: u8 = 0x01;
const TAG_LIST: u8 = 0x02;
const TAG_CONSTR: u8 = 0x03;
const TAG_MAP: u8 = 0x04;

/// Structured value every record is lowered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Int(i128),
    Bytes(Vec<u8>),
    List(Vec<Datum>),
    Constr(u64, Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
}

impl Datum {
    /// Lower an ordered field list, unwrapping single-field records.
    pub fn record(mut fields: Vec<Datum>) -> Self {
        if fields.len() == 1 {
            fields.remove(0)
        } else {
            Datum::List(fields)
        }
    }

    /// Lower a tagged-union variant.
    pub fn variant(index: u64, fields: Vec<Datum>) -> Self {
        Datum::Constr(index, fields)
    }

    pub fn as_int(&self) -> Result<i128, StructuralError> {
        match self {
            Datum::Int(v) => Ok(*v),
            _ => Err(StructuralError::UnexpectedShape { expected: "integer" }),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], StructuralError> {
        match self {
            Datum::Bytes(b) => Ok(b),
            _ => Err(StructuralError::UnexpectedShape { expected: "byte string" }),
        }
    }

    pub fn as_list(&self) -> Result<&[Datum], StructuralError> {
        match self {
            Datum::List(items) => Ok(items),
            _ => Err(StructuralError::UnexpectedShape { expected: "list" }),
        }
    }

    pub fn as_constr(&self) -> Result<(u64, &[Datum]), StructuralError> {
        match self {
            Datum::Constr(index, fields) => Ok((*index, fields)),
            _ => Err(StructuralError::UnexpectedShape { expected: "constructor" }),
        }
    }

    pub fn as_map(&self) -> Result<&[(Datum, Datum)], StructuralError> {
        match self {
            Datum::Map(entries) => Ok(entries),
            _ => Err(StructuralError::UnexpectedShape { expected: "map" }),
        }
    }

    /// Fields of a multi-field record, checking the arity.
    pub fn fields(&self, expected: usize) -> Result<&[Datum], StructuralError> {
        let items = self.as_list()?;
        if items.len() != expected {
            return Err(StructuralError::WrongFieldCount {
                expected,
                got: items.len(),
            });
        }
        Ok(items)
    }
}

/// Lowering into the canonical datum model.
pub trait ToDatum {
    fn to_datum(&self) -> Datum;
}

/// Lifting out of the canonical datum model.
pub trait FromDatum: Sized {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError>;
}

/// Encode a value to its canonical bytes.
pub fn to_bytes<T: ToDatum + ?Sized>(value: &T) -> Vec<u8> {
    encode_datum(&value.to_datum())
}

/// Decode a value from canonical bytes, rejecting trailing input.
pub fn from_bytes<T: FromDatum>(bytes: &[u8]) -> Result<T, StructuralError> {
    T::from_datum(&decode_datum(bytes)?)
}

/// Content identity: BLAKE3 over the canonical encoding.
///
/// The single hashing path for plant certificates, treasury continuation
/// tags and anything else that is identified by content.
pub fn identity<T: ToDatum + ?Sized>(value: &T) -> Hash256 {
    Hash256(blake3::hash(&to_bytes(value)).into())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_datum(datum: &Datum) -> Vec<u8> {
    let mut out = Vec::new();
    write_datum(&mut out, datum);
    out
}

fn write_datum(out: &mut Vec<u8>, datum: &Datum) {
    match datum {
        Datum::Int(v) => {
            out.push(TAG_INT);
            let bytes = int_to_minimal_bytes(*v);
            write_uleb(out, bytes.len() as u64);
            out.extend_from_slice(&bytes);
        }
        Datum::Bytes(b) => {
            out.push(TAG_BYTES);
            write_uleb(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Datum::List(items) => {
            out.push(TAG_LIST);
            write_uleb(out, items.len() as u64);
            for item in items {
                write_datum(out, item);
            }
        }
        Datum::Constr(index, fields) => {
            out.push(TAG_CONSTR);
            write_uleb(out, *index);
            write_uleb(out, fields.len() as u64);
            for field in fields {
                write_datum(out, field);
            }
        }
        Datum::Map(entries) => {
            out.push(TAG_MAP);
            write_uleb(out, entries.len() as u64);
            for (k, v) in entries {
                write_datum(out, k);
                write_datum(out, v);
            }
        }
    }
}

fn write_uleb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Shortest big-endian two's complement form. Zero is the empty string.
fn int_to_minimal_bytes(value: i128) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let full = value.to_be_bytes();
    let mut start = 0;
    while start < full.len() - 1 && is_redundant_lead(full[start], full[start + 1]) {
        start += 1;
    }
    full[start..].to_vec()
}

fn is_redundant_lead(lead: u8, next: u8) -> bool {
    (lead == 0x00 && next & 0x80 == 0) || (lead == 0xff && next & 0x80 != 0)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

pub fn decode_datum(bytes: &[u8]) -> Result<Datum, StructuralError> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let datum = reader.read_datum(0)?;
    let rest = reader.buf.len() - reader.pos;
    if rest != 0 {
        return Err(StructuralError::TrailingBytes(rest));
    }
    Ok(datum)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, StructuralError> {
        let byte = *self.buf.get(self.pos).ok_or(StructuralError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], StructuralError> {
        if len > self.remaining() {
            return Err(StructuralError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_uleb(&mut self) -> Result<u64, StructuralError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(StructuralError::LengthOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                if byte == 0 && shift > 0 {
                    return Err(StructuralError::NonMinimalInteger);
                }
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(StructuralError::LengthOverflow);
            }
        }
    }

    /// A count of items that each take at least one byte.
    fn read_count(&mut self) -> Result<usize, StructuralError> {
        let count = usize::try_from(self.read_uleb()?).map_err(|_| StructuralError::LengthOverflow)?;
        if count > self.remaining() {
            return Err(StructuralError::UnexpectedEof);
        }
        Ok(count)
    }

    fn read_datum(&mut self, depth: usize) -> Result<Datum, StructuralError> {
        if depth > MAX_DATUM_DEPTH {
            return Err(StructuralError::NestingTooDeep(MAX_DATUM_DEPTH));
        }
        match self.read_u8()? {
            TAG_INT => {
                let len = self.read_count()?;
                let raw = self.read_slice(len)?;
                Ok(Datum::Int(int_from_minimal_bytes(raw)?))
            }
            TAG_BYTES => {
                let len = self.read_count()?;
                Ok(Datum::Bytes(self.read_slice(len)?.to_vec()))
            }
            TAG_LIST => {
                let count = self.read_count()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_datum(depth + 1)?);
                }
                Ok(Datum::List(items))
            }
            TAG_CONSTR => {
                let index = self.read_uleb()?;
                let count = self.read_count()?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(self.read_datum(depth + 1)?);
                }
                Ok(Datum::Constr(index, fields))
            }
            TAG_MAP => {
                let count = self.read_count()?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = self.read_datum(depth + 1)?;
                    let v = self.read_datum(depth + 1)?;
                    entries.push((k, v));
                }
                Ok(Datum::Map(entries))
            }
            other => Err(StructuralError::UnknownTag(other)),
        }
    }
}

fn int_from_minimal_bytes(raw: &[u8]) -> Result<i128, StructuralError> {
    if raw.is_empty() {
        return Ok(0);
    }
    if raw.len() > MAX_INT_BYTES {
        return Err(StructuralError::IntegerTooWide(raw.len()));
    }
    if (raw.len() == 1 && raw[0] == 0) || (raw.len() > 1 && is_redundant_lead(raw[0], raw[1])) {
        return Err(StructuralError::NonMinimalInteger);
    }
    let fill = if raw[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut full = [fill; 16];
    full[16 - raw.len()..].copy_from_slice(raw);
    Ok(i128::from_be_bytes(full))
}

// ---------------------------------------------------------------------------
// Primitive lowering
// ---------------------------------------------------------------------------

impl ToDatum for u64 {
    fn to_datum(&self) -> Datum {
        Datum::Int(i128::from(*self))
    }
}

impl FromDatum for u64 {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        u64::try_from(datum.as_int()?).map_err(|_| StructuralError::IntegerOutOfRange("u64"))
    }
}

impl ToDatum for u16 {
    fn to_datum(&self) -> Datum {
        Datum::Int(i128::from(*self))
    }
}

impl FromDatum for u16 {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        u16::try_from(datum.as_int()?).map_err(|_| StructuralError::IntegerOutOfRange("u16"))
    }
}

impl ToDatum for i64 {
    fn to_datum(&self) -> Datum {
        Datum::Int(i128::from(*self))
    }
}

impl FromDatum for i64 {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        i64::try_from(datum.as_int()?).map_err(|_| StructuralError::IntegerOutOfRange("i64"))
    }
}

impl ToDatum for bool {
    fn to_datum(&self) -> Datum {
        Datum::variant(u64::from(*self), Vec::new())
    }
}

impl FromDatum for bool {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        match datum.as_constr()? {
            (0, []) => Ok(false),
            (1, []) => Ok(true),
            (index, _) => Err(StructuralError::UnknownVariant { type_name: "Bool", index }),
        }
    }
}

impl<T: ToDatum> ToDatum for Option<T> {
    fn to_datum(&self) -> Datum {
        match self {
            Some(v) => Datum::variant(0, vec![v.to_datum()]),
            None => Datum::variant(1, Vec::new()),
        }
    }
}

impl<T: FromDatum> FromDatum for Option<T> {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        match datum.as_constr()? {
            (0, [value]) => Ok(Some(T::from_datum(value)?)),
            (1, []) => Ok(None),
            (index, _) => Err(StructuralError::UnknownVariant { type_name: "Option", index }),
        }
    }
}

impl<T: ToDatum> ToDatum for Vec<T> {
    fn to_datum(&self) -> Datum {
        Datum::List(self.iter().map(ToDatum::to_datum).collect())
    }
}

impl<T: FromDatum> FromDatum for Vec<T> {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        datum.as_list()?.iter().map(T::from_datum).collect()
    }
}

impl<K: ToDatum, V: ToDatum> ToDatum for BTreeMap<K, V> {
    fn to_datum(&self) -> Datum {
        Datum::Map(
            self.iter()
                .map(|(k, v)| (k.to_datum(), v.to_datum()))
                .collect(),
        )
    }
}

impl<K: FromDatum + Ord, V: FromDatum> FromDatum for BTreeMap<K, V> {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let mut map = BTreeMap::new();
        for (k, v) in datum.as_map()? {
            if map.insert(K::from_datum(k)?, V::from_datum(v)?).is_some() {
                return Err(StructuralError::UnexpectedShape { expected: "map with unique keys" });
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_encodes_as_empty_integer() {
        assert_eq!(encode_datum(&Datum::Int(0)), vec![TAG_INT, 0]);
    }

    #[test]
    fn integer_encoding_is_minimal() {
        assert_eq!(encode_datum(&Datum::Int(127)), vec![TAG_INT, 1, 0x7f]);
        assert_eq!(encode_datum(&Datum::Int(128)), vec![TAG_INT, 2, 0x00, 0x80]);
        assert_eq!(encode_datum(&Datum::Int(-1)), vec![TAG_INT, 1, 0xff]);
        assert_eq!(encode_datum(&Datum::Int(-129)), vec![TAG_INT, 2, 0xff, 0x7f]);
    }

    #[test]
    fn non_minimal_integer_rejected() {
        assert_eq!(
            decode_datum(&[TAG_INT, 2, 0x00, 0x01]),
            Err(StructuralError::NonMinimalInteger)
        );
        assert_eq!(
            decode_datum(&[TAG_INT, 1, 0x00]),
            Err(StructuralError::NonMinimalInteger)
        );
    }

    #[test]
    fn wide_integer_rejected() {
        let mut bytes = vec![TAG_INT, 17, 0x01];
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(decode_datum(&bytes), Err(StructuralError::IntegerTooWide(17)));
    }

    #[test]
    fn extreme_integers() {
        for v in [i128::MIN, i128::MAX, u64::MAX as i128] {
            let bytes = encode_datum(&Datum::Int(v));
            assert_eq!(decode_datum(&bytes).unwrap(), Datum::Int(v));
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(
            decode_datum(&[TAG_BYTES, 0, 0xaa]),
            Err(StructuralError::TrailingBytes(1))
        );
    }

    #[test]
    fn truncated_input_rejected() {
        assert_eq!(decode_datum(&[]), Err(StructuralError::UnexpectedEof));
        assert_eq!(
            decode_datum(&[TAG_BYTES, 4, 1, 2]),
            Err(StructuralError::UnexpectedEof)
        );
        assert_eq!(
            decode_datum(&[TAG_LIST, 3, TAG_INT, 0]),
            Err(StructuralError::UnexpectedEof)
        );
    }

    #[test]
    fn unknown_tag_rejected() {
        assert_eq!(decode_datum(&[0x09]), Err(StructuralError::UnknownTag(0x09)));
    }

    #[test]
    fn deep_nesting_rejected() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DATUM_DEPTH + 1 {
            bytes.extend_from_slice(&[TAG_LIST, 1]);
        }
        bytes.extend_from_slice(&[TAG_INT, 0]);
        assert_eq!(
            decode_datum(&bytes),
            Err(StructuralError::NestingTooDeep(MAX_DATUM_DEPTH))
        );
    }

    #[test]
    fn single_field_record_is_transparent() {
        assert_eq!(Datum::record(vec![Datum::Int(7)]), Datum::Int(7));
        assert_eq!(
            Datum::record(vec![Datum::Int(7), Datum::Int(8)]),
            Datum::List(vec![Datum::Int(7), Datum::Int(8)])
        );
    }

    #[test]
    fn option_and_bool_layout() {
        assert_eq!(Some(5u64).to_datum(), Datum::Constr(0, vec![Datum::Int(5)]));
        assert_eq!(None::<u64>.to_datum(), Datum::Constr(1, vec![]));
        assert_eq!(true.to_datum(), Datum::Constr(1, vec![]));
        assert_eq!(false.to_datum(), Datum::Constr(0, vec![]));
    }

    #[test]
    fn negative_into_u64_rejected() {
        assert_eq!(
            u64::from_datum(&Datum::Int(-1)),
            Err(StructuralError::IntegerOutOfRange("u64"))
        );
    }

    #[test]
    fn duplicate_map_keys_rejected() {
        let d = Datum::Map(vec![
            (Datum::Int(1), Datum::Int(2)),
            (Datum::Int(1), Datum::Int(3)),
        ]);
        assert!(BTreeMap::<u64, u64>::from_datum(&d).is_err());
    }

    fn arb_datum() -> impl Strategy<Value = Datum> {
        let leaf = prop_oneof![
            any::<i128>().prop_map(Datum::Int),
            proptest::collection::vec(any::<u8>(), 0..40).prop_map(Datum::Bytes),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Datum::List),
                (any::<u64>(), proptest::collection::vec(inner.clone(), 0..6))
                    .prop_map(|(i, f)| Datum::Constr(i, f)),
                proptest::collection::vec((inner.clone(), inner), 0..4).prop_map(Datum::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn datum_roundtrip(d in arb_datum()) {
            let bytes = encode_datum(&d);
            prop_assert_eq!(decode_datum(&bytes).unwrap(), d);
        }

        #[test]
        fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode_datum(&bytes);
        }
    }
}
