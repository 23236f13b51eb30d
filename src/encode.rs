use crate::arena::Arena;
use crate::bytes::Output;
use crate::error::{Error, Result};
use crate::header::MAGIC;
use crate::leb128;
use crate::table::TypeTable;
use crate::types::{Type, TypeEnv};
use crate::value::{Value, PRINCIPAL_MAX_LEN};

/// Appends the wire encoding of `value`.
///
/// Serialization walks the value graph alone; the caller is responsible
/// for pairing each value with the type it registers for it, and for
/// record/variant values being in schema (label-sorted) order. The
/// constructors on [`Value`] maintain that order.
pub fn write_value<O: Output + ?Sized>(value: &Value<'_>, out: &mut O) -> Result<()> {
    match *value {
        Value::Null | Value::Reserved => {}
        Value::Bool(b) => out.push_byte(u8::from(b)),
        // Arbitrary-precision payloads are already LEB images.
        Value::Nat(raw) | Value::Int(raw) => out.write(raw),
        Value::Nat8(v) => out.push_byte(v),
        Value::Nat16(v) => out.write(&v.to_le_bytes()),
        Value::Nat32(v) => out.write(&v.to_le_bytes()),
        Value::Nat64(v) => out.write(&v.to_le_bytes()),
        Value::Int8(v) => out.write(&v.to_le_bytes()),
        Value::Int16(v) => out.write(&v.to_le_bytes()),
        Value::Int32(v) => out.write(&v.to_le_bytes()),
        Value::Int64(v) => out.write(&v.to_le_bytes()),
        Value::Float32(v) => out.write(&v.to_le_bytes()),
        Value::Float64(v) => out.write(&v.to_le_bytes()),
        Value::Text(s) => {
            leb128::uleb128_encode(s.len() as u64, out);
            out.write(s.as_bytes());
        }
        Value::Blob(bytes) => {
            leb128::uleb128_encode(bytes.len() as u64, out);
            out.write(bytes);
        }
        Value::Principal(bytes) => {
            if bytes.len() > PRINCIPAL_MAX_LEN {
                return Err(Error::invalid(format!(
                    "principal is {} bytes, limit is {PRINCIPAL_MAX_LEN}",
                    bytes.len()
                )));
            }
            out.push_byte(0x01);
            leb128::uleb128_encode(bytes.len() as u64, out);
            out.write(bytes);
        }
        Value::Opt(None) => out.push_byte(0x00),
        Value::Opt(Some(inner)) => {
            out.push_byte(0x01);
            write_value(inner, out)?;
        }
        Value::Vec(elements) => {
            leb128::uleb128_encode(elements.len() as u64, out);
            for element in elements {
                write_value(element, out)?;
            }
        }
        Value::Record(fields) => {
            for field in fields {
                write_value(field.value, out)?;
            }
        }
        Value::Variant(ref active) => {
            leb128::uleb128_encode(active.index, out);
            write_value(active.value, out)?;
        }
    }
    Ok(())
}

/// Accumulates `(type, value)` argument pairs and serializes the whole
/// message: magic, type table, argument references, argument values.
pub struct Builder<'a> {
    arena: &'a Arena,
    env: TypeEnv<'a>,
    table: TypeTable<'a>,
    args: Vec<i64>,
    values: Vec<u8>,
}

impl<'a> Builder<'a> {
    #[must_use]
    pub fn new(arena: &'a Arena) -> Self {
        Self::with_env(arena, TypeEnv::new())
    }

    /// Starts a builder with user `Var` bindings already in scope.
    #[must_use]
    pub fn with_env(arena: &'a Arena, env: TypeEnv<'a>) -> Self {
        Self {
            arena,
            env,
            table: TypeTable::new(),
            args: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn env_mut(&mut self) -> &mut TypeEnv<'a> {
        &mut self.env
    }

    /// Adds one argument: registers `ty` in the type table and appends
    /// the encoding of `value`. Arguments appear in call order.
    pub fn arg(&mut self, ty: &'a Type<'a>, value: &'a Value<'a>) -> Result<&mut Self> {
        let reference = self.table.register(&self.env, ty)?;
        self.args.push(reference);
        write_value(value, &mut self.values)?;
        Ok(self)
    }

    /// Finishes the message. The returned bytes live in the arena and
    /// are invalidated with it.
    pub fn serialize(self) -> Result<&'a [u8]> {
        let mut out = self
            .arena
            .new_vec_with_capacity(MAGIC.len() + self.values.len() + 16);
        out.extend_from_slice(&MAGIC);
        self.table.serialize(&self.args, &mut out)?;
        out.extend_from_slice(&self.values);
        Ok(out.into_bump_slice())
    }
}

/// One-shot encoding of an argument sequence.
pub fn encode_args<'a>(
    arena: &'a Arena,
    args: &[(&'a Type<'a>, &'a Value<'a>)],
) -> Result<&'a [u8]> {
    let mut builder = Builder::new(arena);
    for &(ty, value) in args {
        builder.arg(ty, value)?;
    }
    builder.serialize()
}
