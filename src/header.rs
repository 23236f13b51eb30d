use crate::arena::Arena;
use crate::bytes::Cursor;
use crate::error::{Error, Result};
use crate::opcode::{FuncMode, TypeOpcode};
use crate::types::{Field, FuncType, Method, Type, TypeEnv};
use crate::label::Label;

/// Every message starts with these four bytes.
pub const MAGIC: [u8; 4] = *b"DIDL";

/// A parsed message header: the type table materialized as a type
/// environment (entry `i` bound as `table<i>`) plus the argument types.
pub struct Header<'a> {
    pub env: TypeEnv<'a>,
    pub args: Vec<&'a Type<'a>>,
    /// Bytes the header occupied, for quota accounting.
    pub len: usize,
}

impl<'a> Header<'a> {
    /// Parses magic, type table and argument types, leaving the cursor
    /// at the first value byte.
    pub fn parse(arena: &'a Arena, cursor: &mut Cursor<'a>) -> Result<Header<'a>> {
        let start = cursor.position();
        if cursor.read_bytes(MAGIC.len())? != MAGIC {
            return Err(Error::invalid("bad magic, expected `DIDL`"));
        }

        let count = read_count(cursor)?;
        let mut types: Vec<&'a Type<'a>> = Vec::with_capacity(count);
        for _ in 0..count {
            types.push(parse_entry(arena, cursor, count)?);
        }

        let mut env = TypeEnv::new();
        for (i, &ty) in types.iter().enumerate() {
            env.insert(arena.alloc_str(&format!("table{i}")), ty)?;
        }

        let arg_count = read_count(cursor)?;
        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(type_ref(arena, cursor, count)?);
        }

        // Method types may forward-reference later entries, so the
        // func-ness of service methods is only checkable now.
        for &ty in &types {
            if let Type::Service(methods) = *ty {
                for method in methods {
                    if !matches!(env.trace(method.ty)?, Type::Func(_)) {
                        return Err(Error::invalid(format!(
                            "service method `{}` is not a func",
                            method.name
                        )));
                    }
                }
            }
        }

        let len = cursor.position() - start;
        tracing::trace!(types = count, args = arg_count, bytes = len, "parsed header");
        Ok(Header { env, args, len })
    }
}

/// Reads a ULEB count and sanity-checks it against the remaining input,
/// so a hostile count cannot drive a huge reservation. Every counted
/// item occupies at least one byte.
fn read_count(cursor: &mut Cursor<'_>) -> Result<usize> {
    let count = cursor.read_uleb128()?;
    let count = usize::try_from(count).map_err(|_| Error::Overflow)?;
    if count > cursor.remaining() {
        return Err(Error::Truncated);
    }
    Ok(count)
}

fn parse_entry<'a>(
    arena: &'a Arena,
    cursor: &mut Cursor<'a>,
    count: usize,
) -> Result<&'a Type<'a>> {
    let opcode = cursor.read_sleb128()?;
    if opcode < TypeOpcode::FUTURE_THRESHOLD {
        // Forward compatibility: an unknown constructor carries an
        // opaque blob; skip it and keep the slot as `reserved`.
        let len = read_count(cursor)?;
        cursor.skip(len)?;
        return Ok(&Type::Reserved);
    }
    let opcode = i8::try_from(opcode)
        .ok()
        .and_then(|op| TypeOpcode::try_from(op).ok())
        .ok_or_else(|| Error::invalid(format!("unknown type opcode {opcode}")))?;
    match opcode {
        TypeOpcode::Opt => {
            let inner = type_ref(arena, cursor, count)?;
            Ok(arena.alloc(Type::Opt(inner)))
        }
        TypeOpcode::Vec => {
            let inner = type_ref(arena, cursor, count)?;
            Ok(arena.alloc(Type::Vec(inner)))
        }
        TypeOpcode::Record | TypeOpcode::Variant => {
            let fields = parse_fields(arena, cursor, count)?;
            Ok(arena.alloc(if opcode == TypeOpcode::Record {
                Type::Record(fields)
            } else {
                Type::Variant(fields)
            }))
        }
        TypeOpcode::Func => parse_func(arena, cursor, count),
        TypeOpcode::Service => parse_service(arena, cursor, count),
        _ => Err(Error::invalid(format!(
            "opcode {} is not a type constructor",
            i8::from(opcode)
        ))),
    }
}

fn parse_fields<'a>(
    arena: &'a Arena,
    cursor: &mut Cursor<'a>,
    count: usize,
) -> Result<&'a [Field<'a>]> {
    let field_count = read_count(cursor)?;
    let mut fields: Vec<Field<'a>> = Vec::with_capacity(field_count);
    let mut prev: Option<u32> = None;
    for _ in 0..field_count {
        let id = cursor.read_uleb128()?;
        let id = u32::try_from(id)
            .map_err(|_| Error::invalid(format!("field id {id} exceeds 32 bits")))?;
        if prev.is_some_and(|p| p >= id) {
            return Err(Error::invalid(format!(
                "field id {id} duplicates or reorders its predecessor"
            )));
        }
        prev = Some(id);
        let ty = type_ref(arena, cursor, count)?;
        fields.push(Field {
            label: Label::Id(id),
            ty,
        });
    }
    Ok(arena.alloc_slice_copy(&fields))
}

fn parse_func<'a>(
    arena: &'a Arena,
    cursor: &mut Cursor<'a>,
    count: usize,
) -> Result<&'a Type<'a>> {
    let args = parse_ref_seq(arena, cursor, count)?;
    let rets = parse_ref_seq(arena, cursor, count)?;
    let mode_count = cursor.read_uleb128()?;
    let mode = match mode_count {
        0 => None,
        1 => {
            let byte = cursor.read_byte()?;
            Some(
                FuncMode::try_from(byte)
                    .map_err(|_| Error::invalid(format!("unknown func mode {byte}")))?,
            )
        }
        n => return Err(Error::invalid(format!("func has {n} modes, at most 1 allowed"))),
    };
    Ok(arena.alloc(Type::Func(arena.alloc(FuncType { args, rets, mode }))))
}

fn parse_ref_seq<'a>(
    arena: &'a Arena,
    cursor: &mut Cursor<'a>,
    count: usize,
) -> Result<&'a [&'a Type<'a>]> {
    let n = read_count(cursor)?;
    let mut refs: Vec<&'a Type<'a>> = Vec::with_capacity(n);
    for _ in 0..n {
        refs.push(type_ref(arena, cursor, count)?);
    }
    Ok(arena.alloc_slice_copy(&refs))
}

fn parse_service<'a>(
    arena: &'a Arena,
    cursor: &mut Cursor<'a>,
    count: usize,
) -> Result<&'a Type<'a>> {
    let method_count = read_count(cursor)?;
    let mut methods: Vec<Method<'a>> = Vec::with_capacity(method_count);
    let mut prev: Option<&str> = None;
    for _ in 0..method_count {
        let name_len = read_count(cursor)?;
        let raw = cursor.read_bytes(name_len)?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| Error::invalid("method name is not valid UTF-8"))?;
        if prev.is_some_and(|p| p >= name) {
            return Err(Error::invalid(format!(
                "method name `{name}` duplicates or reorders its predecessor"
            )));
        }
        prev = Some(name);
        let ty = type_ref(arena, cursor, count)?;
        methods.push(Method { name, ty });
    }
    Ok(arena.alloc(Type::Service(arena.alloc_slice_copy(&methods))))
}

/// Decodes one SLEB type reference: a non-negative table index below
/// `count` becomes `Var("table<i>")`; a primitive opcode becomes the
/// primitive; everything else is invalid.
fn type_ref<'a>(arena: &'a Arena, cursor: &mut Cursor<'a>, count: usize) -> Result<&'a Type<'a>> {
    let reference = cursor.read_sleb128()?;
    if reference >= 0 {
        let index = usize::try_from(reference).map_err(|_| Error::Overflow)?;
        if index >= count {
            return Err(Error::invalid(format!(
                "type reference {index} is outside the {count}-entry table"
            )));
        }
        return Ok(arena.alloc(Type::Var(arena.alloc_str(&format!("table{index}")))));
    }
    i8::try_from(reference)
        .ok()
        .and_then(|op| TypeOpcode::try_from(op).ok())
        .filter(|op| op.is_primitive())
        .and_then(Type::primitive)
        .ok_or_else(|| Error::invalid(format!("invalid type reference {reference}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Result<(usize, usize)> {
        let arena = Arena::new();
        let mut cursor = Cursor::new(arena.alloc_bytes(bytes));
        let header = Header::parse(&arena, &mut cursor)?;
        Ok((header.env.len(), header.args.len()))
    }

    #[test]
    fn empty_table_with_primitive_args() {
        // S1's header: no table entries, args (text, int).
        let (types, args) = parse(&[0x44, 0x49, 0x44, 0x4c, 0x00, 0x02, 0x71, 0x7c]).unwrap();
        assert_eq!((types, args), (0, 2));
    }

    #[test]
    fn table_entries_bind_as_vars() {
        let arena = Arena::new();
        let bytes = arena.alloc_bytes(&[0x44, 0x49, 0x44, 0x4c, 0x01, 0x6d, 0x78, 0x01, 0x00]);
        let mut cursor = Cursor::new(bytes);
        let header = Header::parse(&arena, &mut cursor).unwrap();
        assert_eq!(header.len, bytes.len());
        let arg = header.args[0];
        assert!(matches!(arg, Type::Var("table0")));
        let resolved = header.env.trace(arg).unwrap();
        assert_eq!(resolved, Type::vec(&arena, &Type::Nat64));
    }

    #[test]
    fn bad_magic_is_invalid() {
        assert!(matches!(
            parse(&[0x44, 0x49, 0x44, 0x4d, 0x00, 0x00]),
            Err(Error::Invalid(_))
        ));
        assert_eq!(parse(&[0x44, 0x49]), Err(Error::Truncated));
    }

    #[test]
    fn future_opcodes_parse_as_reserved() {
        // Entry opcode -25 with a 3-byte opaque blob, then one arg of
        // that entry's type.
        let arena = Arena::new();
        let bytes = arena.alloc_bytes(&[
            0x44, 0x49, 0x44, 0x4c, 0x01, 0x67, 0x03, 0xaa, 0xbb, 0xcc, 0x01, 0x00,
        ]);
        let mut cursor = Cursor::new(bytes);
        let header = Header::parse(&arena, &mut cursor).unwrap();
        assert!(matches!(
            header.env.trace(header.args[0]).unwrap(),
            Type::Reserved
        ));
    }

    #[test]
    fn out_of_range_references_are_invalid() {
        // Arg references entry 1 of a 1-entry table.
        assert!(matches!(
            parse(&[0x44, 0x49, 0x44, 0x4c, 0x01, 0x6d, 0x7b, 0x01, 0x01]),
            Err(Error::Invalid(_))
        ));
        // Composite opcode used as an inline reference.
        assert!(matches!(
            parse(&[0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x6e]),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn misordered_record_fields_are_invalid() {
        // record { 1 : nat8; 0 : nat8 }
        let bytes = [
            0x44, 0x49, 0x44, 0x4c, 0x01, 0x6c, 0x02, 0x01, 0x7b, 0x00, 0x7b, 0x01, 0x00,
        ];
        assert!(matches!(parse(&bytes), Err(Error::Invalid(_))));
    }

    #[test]
    fn func_mode_must_be_known() {
        // func () -> () with mode byte 9.
        let bytes = [
            0x44, 0x49, 0x44, 0x4c, 0x01, 0x6a, 0x00, 0x00, 0x01, 0x09, 0x01, 0x00,
        ];
        assert!(matches!(parse(&bytes), Err(Error::Invalid(_))));
    }
}
