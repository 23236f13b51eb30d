use crate::arena::Arena;
use crate::label::{self, Label};
use crate::leb128;

/// Longest principal payload accepted on the wire.
pub const PRINCIPAL_MAX_LEN: usize = 29;

/// A Candid value.
///
/// The shape mirrors [`Type`](crate::Type) with two special forms:
/// [`Value::Blob`] is the canonical decoded form of `vec nat8`, and the
/// arbitrary-precision [`Value::Nat`]/[`Value::Int`] hold their raw
/// LEB128/SLEB128 byte images, which travel verbatim through a round
/// trip and are only interpreted on demand.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Null,
    Reserved,
    Bool(bool),
    /// Arbitrary-precision nat as its unsigned LEB128 image.
    Nat(&'a [u8]),
    /// Arbitrary-precision int as its signed LEB128 image.
    Int(&'a [u8]),
    Nat8(u8),
    Nat16(u16),
    Nat32(u32),
    Nat64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(&'a str),
    Blob(&'a [u8]),
    Principal(&'a [u8]),
    /// `None` is the absent option.
    Opt(Option<&'a Value<'a>>),
    Vec(&'a [&'a Value<'a>]),
    /// Fields sorted by label id, matching the record type's order.
    Record(&'a [FieldValue<'a>]),
    Variant(Variant<'a>),
}

/// One labelled field of a record value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldValue<'a> {
    pub label: Label<'a>,
    pub value: &'a Value<'a>,
}

/// The active case of a variant value. `index` is the case's ordinal in
/// the variant type and is always below the case count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variant<'a> {
    pub index: u64,
    pub label: Label<'a>,
    pub value: &'a Value<'a>,
}

impl<'a> Value<'a> {
    /// Builds an arbitrary-precision nat from a machine word.
    pub fn nat(arena: &'a Arena, value: u64) -> &'a Value<'a> {
        let mut raw = Vec::new();
        leb128::uleb128_encode(value, &mut raw);
        arena.alloc(Value::Nat(arena.alloc_bytes(&raw)))
    }

    /// Builds an arbitrary-precision int from a machine word.
    pub fn int(arena: &'a Arena, value: i64) -> &'a Value<'a> {
        let mut raw = Vec::new();
        leb128::sleb128_encode(value, &mut raw);
        arena.alloc(Value::Int(arena.alloc_bytes(&raw)))
    }

    pub fn text(arena: &'a Arena, value: &str) -> &'a Value<'a> {
        arena.alloc(Value::Text(arena.alloc_str(value)))
    }

    pub fn blob(arena: &'a Arena, bytes: &[u8]) -> &'a Value<'a> {
        arena.alloc(Value::Blob(arena.alloc_bytes(bytes)))
    }

    pub fn principal(arena: &'a Arena, bytes: &[u8]) -> &'a Value<'a> {
        arena.alloc(Value::Principal(arena.alloc_bytes(bytes)))
    }

    pub fn some(arena: &'a Arena, inner: &'a Value<'a>) -> &'a Value<'a> {
        arena.alloc(Value::Opt(Some(inner)))
    }

    pub fn vec(arena: &'a Arena, elements: &[&'a Value<'a>]) -> &'a Value<'a> {
        arena.alloc(Value::Vec(arena.alloc_slice_copy(elements)))
    }

    /// Builds a record value; fields are sorted (stably) by label id to
    /// match the schema order of the corresponding record type.
    pub fn record(arena: &'a Arena, fields: &[(Label<'a>, &'a Value<'a>)]) -> &'a Value<'a> {
        let mut sorted: Vec<FieldValue<'a>> = fields
            .iter()
            .map(|&(label, value)| FieldValue { label, value })
            .collect();
        label::sort_by_id(&mut sorted, |f| f.label.id());
        arena.alloc(Value::Record(arena.alloc_slice_copy(&sorted)))
    }

    pub fn variant(
        arena: &'a Arena,
        index: u64,
        label: Label<'a>,
        value: &'a Value<'a>,
    ) -> &'a Value<'a> {
        arena.alloc(Value::Variant(Variant {
            index,
            label,
            value,
        }))
    }

    /// Reads an arbitrary-precision nat back as a machine word.
    /// Fails on other variants and on values above `u64::MAX`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Nat(raw) => leb128::uleb128_decode(raw).ok().map(|(v, _)| v),
            _ => None,
        }
    }

    /// Reads an arbitrary-precision int back as a machine word,
    /// interpreting the raw bytes as SLEB128.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(raw) => leb128::sleb128_decode(raw).ok().map(|(v, _)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&'a [u8]> {
        match *self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

fn blob_eq_vec(bytes: &[u8], elements: &[&Value<'_>]) -> bool {
    bytes.len() == elements.len()
        && bytes
            .iter()
            .zip(elements.iter())
            .all(|(&b, e)| matches!(**e, Value::Nat8(v) if v == b))
}

/// Value equivalence: same kind with equal payloads, compared
/// structurally through opt/vec/record/variant. A [`Value::Blob`] equals
/// a `vec` of `nat8` values iff their byte images match.
impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Reserved, Value::Reserved) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nat(a), Value::Nat(b)) | (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Nat8(a), Value::Nat8(b)) => a == b,
            (Value::Nat16(a), Value::Nat16(b)) => a == b,
            (Value::Nat32(a), Value::Nat32(b)) => a == b,
            (Value::Nat64(a), Value::Nat64(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Principal(a), Value::Principal(b)) => a == b,
            (Value::Blob(bytes), Value::Vec(elements))
            | (Value::Vec(elements), Value::Blob(bytes)) => blob_eq_vec(bytes, elements),
            (Value::Opt(a), Value::Opt(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Value::Vec(a), Value::Vec(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            _ => false,
        }
    }
}
