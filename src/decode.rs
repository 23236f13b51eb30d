use crate::arena::Arena;
use crate::bytes::Cursor;
use crate::coerce;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::leb128;
use crate::subtype::{Checker, OptReport};
use crate::types::{Type, TypeEnv};
use crate::value::{FieldValue, Value, Variant, PRINCIPAL_MAX_LEN};

/// Values cannot nest deeper than this, independent of the quotas.
/// Recursive wire types can demand one more level per input byte, so
/// the bound keeps degenerate inputs off the call stack.
const MAX_NESTING: usize = 128;

/// Hard ceiling on a single wire-supplied element count, so a hostile
/// length prefix cannot drive allocation or iteration on its own.
const VEC_DECODE_LIMIT: u64 = 100 * (1 << 20);

/// Knobs for one [`Decoder`]. Quotas are counts of abstract work units;
/// zero disables the corresponding limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderConfig {
    /// Budget for header parsing and value reads.
    pub decoding_quota: u64,
    /// Budget for skipping wire-only fields during coercing reads.
    pub skipping_quota: u64,
    /// Spend extra effort on diagnostic detail in error messages.
    pub full_error_message: bool,
    /// How failed opt coercions are reported.
    pub opt_report: OptReport,
}

#[derive(Debug, Clone, Copy)]
struct Quota {
    used: u64,
    limit: u64,
}

impl Quota {
    fn new(limit: u64) -> Self {
        Self { used: 0, limit }
    }

    fn charge(&mut self, cost: u64) -> Result<()> {
        self.used = self.used.checked_add(cost).ok_or(Error::Overflow)?;
        if self.limit > 0 && self.used > self.limit {
            return Err(Error::Overflow);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Charge {
    Decoding,
    Skipping,
}

/// Type-directed reader of argument values.
///
/// Construction parses the header; each [`value`](Decoder::value) or
/// [`value_as`](Decoder::value_as) call consumes exactly one argument
/// and advances the cursor by exactly the bytes that argument occupied.
pub struct Decoder<'a> {
    arena: &'a Arena,
    cursor: Cursor<'a>,
    env: TypeEnv<'a>,
    args: Vec<&'a Type<'a>>,
    next_arg: usize,
    decoding: Quota,
    skipping: Quota,
    checker: Checker,
    full_error_message: bool,
    opt_report: OptReport,
}

impl<'a> Decoder<'a> {
    /// Parses the header of `data` and charges `4 × header_bytes`
    /// against the decoding quota.
    pub fn new(arena: &'a Arena, data: &'a [u8], config: DecoderConfig) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = Header::parse(arena, &mut cursor)?;
        let mut decoding = Quota::new(config.decoding_quota);
        decoding.charge(4 * header.len as u64)?;
        Ok(Self {
            arena,
            cursor,
            env: header.env,
            args: header.args,
            next_arg: 0,
            decoding,
            skipping: Quota::new(config.skipping_quota),
            checker: Checker::new(),
            full_error_message: config.full_error_message,
            opt_report: config.opt_report,
        })
    }

    /// The argument types announced by the header.
    #[must_use]
    pub fn arg_types(&self) -> &[&'a Type<'a>] {
        &self.args
    }

    /// The header's type environment (`table<i>` bindings). Expected
    /// types may use their own `Var` names after binding them here.
    #[must_use]
    pub fn env(&self) -> &TypeEnv<'a> {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut TypeEnv<'a> {
        &mut self.env
    }

    /// Reads the next argument at its wire type.
    pub fn value(&mut self) -> Result<&'a Value<'a>> {
        let ty = self.peek_type()?;
        let value = self.read_value(ty, 0)?;
        self.next_arg += 1;
        Ok(value)
    }

    /// Reads the next argument coerced to `expected`. Wire-only record
    /// fields are skipped on-cursor and charged to the skipping quota.
    pub fn value_as(&mut self, expected: &'a Type<'a>) -> Result<&'a Value<'a>> {
        let ty = self.peek_type()?;
        let report = self.opt_report;
        self.checker.check(&self.env, ty, expected, report)?;
        let value = self.read_value_as(ty, expected, 0)?;
        self.next_arg += 1;
        Ok(value)
    }

    /// Skips the next argument without materializing it. The cursor
    /// advances by exactly the bytes the value occupies; the work is
    /// charged to the skipping quota.
    pub fn skip_arg(&mut self) -> Result<()> {
        let ty = self.peek_type()?;
        self.skip(ty, 0)?;
        self.next_arg += 1;
        Ok(())
    }

    /// Succeeds iff every argument was consumed and no bytes trail.
    pub fn done(&self) -> Result<()> {
        if self.next_arg < self.args.len() {
            return Err(self.invalid(
                "arguments remain unconsumed",
                || format!("{} of {} arguments consumed", self.next_arg, self.args.len()),
            ));
        }
        if !self.cursor.is_at_end() {
            return Err(self.invalid("trailing bytes after the last argument", || {
                format!("{} trailing bytes after the last argument", self.cursor.remaining())
            }));
        }
        Ok(())
    }

    fn peek_type(&self) -> Result<&'a Type<'a>> {
        self.args
            .get(self.next_arg)
            .copied()
            .ok_or_else(|| Error::invalid("every argument has already been consumed"))
    }

    fn invalid(&self, brief: &'static str, detail: impl FnOnce() -> String) -> Error {
        if self.full_error_message {
            Error::invalid(detail())
        } else {
            Error::invalid(brief)
        }
    }

    fn charge(&mut self, which: Charge, cost: u64) -> Result<()> {
        match which {
            Charge::Decoding => self.decoding.charge(cost),
            Charge::Skipping => self.skipping.charge(cost),
        }
    }

    fn take_bytes(&mut self, len: usize, which: Charge) -> Result<&'a [u8]> {
        self.charge(which, len as u64)?;
        self.cursor.read_bytes(len)
    }

    fn take_byte(&mut self, which: Charge) -> Result<u8> {
        self.charge(which, 1)?;
        self.cursor.read_byte()
    }

    fn take_uleb(&mut self, which: Charge) -> Result<u64> {
        let before = self.cursor.position();
        let value = self.cursor.read_uleb128()?;
        self.charge(which, (self.cursor.position() - before) as u64)?;
        Ok(value)
    }

    fn take_len(&mut self, which: Charge) -> Result<usize> {
        let len = self.take_uleb(which)?;
        usize::try_from(len).map_err(|_| Error::Overflow)
    }

    /// Reads the raw byte image of one LEB-encoded bignum, validating
    /// termination and overflow without interpreting the value.
    fn take_leb_image(&mut self, signed: bool, which: Charge) -> Result<&'a [u8]> {
        let rest = self.cursor.rest();
        let len = if signed {
            leb128::sleb128_decode(rest)?.1
        } else {
            leb128::uleb128_decode(rest)?.1
        };
        self.take_bytes(len, which)
    }

    fn read_value(&mut self, ty: &'a Type<'a>, depth: usize) -> Result<&'a Value<'a>> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("value nesting exceeds the depth limit"));
        }
        self.charge(Charge::Decoding, 1)?;
        let ty = self.env.trace(ty)?;
        match *ty {
            Type::Null => Ok(&Value::Null),
            Type::Reserved => Ok(&Value::Reserved),
            Type::Empty => Err(Error::invalid("type empty has no values")),
            Type::Bool => match self.take_byte(Charge::Decoding)? {
                0 => Ok(&Value::Bool(false)),
                1 => Ok(&Value::Bool(true)),
                byte => Err(self.invalid("invalid bool byte", || {
                    format!("invalid bool byte {byte:#04x}")
                })),
            },
            Type::Nat => {
                let raw = self.take_leb_image(false, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Nat(raw)))
            }
            Type::Int => {
                let raw = self.take_leb_image(true, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int(raw)))
            }
            Type::Nat8 => {
                let byte = self.take_byte(Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Nat8(byte)))
            }
            Type::Nat16 => {
                let raw = self.take_bytes(2, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Nat16(u16::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Nat32 => {
                let raw = self.take_bytes(4, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Nat32(u32::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Nat64 => {
                let raw = self.take_bytes(8, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Nat64(u64::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Int8 => {
                let byte = self.take_byte(Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int8(byte as i8)))
            }
            Type::Int16 => {
                let raw = self.take_bytes(2, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int16(i16::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Int32 => {
                let raw = self.take_bytes(4, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int32(i32::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Int64 => {
                let raw = self.take_bytes(8, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int64(i64::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Float32 => {
                let raw = self.take_bytes(4, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Float32(f32::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Float64 => {
                let raw = self.take_bytes(8, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Float64(f64::from_le_bytes(
                    raw.try_into().expect("length checked"),
                ))))
            }
            Type::Text => {
                let len = self.take_len(Charge::Decoding)?;
                let raw = self.take_bytes(len, Charge::Decoding)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| Error::invalid("text is not valid UTF-8"))?;
                Ok(self.arena.alloc(Value::Text(text)))
            }
            Type::Principal => {
                let flag = self.take_byte(Charge::Decoding)?;
                if flag != 0x01 {
                    return Err(self.invalid("invalid principal flag byte", || {
                        format!("invalid principal flag byte {flag:#04x}")
                    }));
                }
                let len = self.take_len(Charge::Decoding)?;
                if len > PRINCIPAL_MAX_LEN {
                    return Err(self.invalid("principal is too long", || {
                        format!("principal is {len} bytes, limit is {PRINCIPAL_MAX_LEN}")
                    }));
                }
                let raw = self.take_bytes(len, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Principal(raw)))
            }
            Type::Opt(inner) => match self.take_byte(Charge::Decoding)? {
                0 => Ok(&Value::Opt(None)),
                1 => {
                    let value = self.read_value(inner, depth + 1)?;
                    Ok(self.arena.alloc(Value::Opt(Some(value))))
                }
                byte => Err(self.invalid("invalid opt tag byte", || {
                    format!("invalid opt tag byte {byte:#04x}")
                })),
            },
            Type::Vec(inner) => {
                if matches!(self.env.trace(inner)?, Type::Nat8) {
                    // vec nat8 is a contiguous byte run: materialize as
                    // the canonical blob.
                    let len = self.take_len(Charge::Decoding)?;
                    let raw = self.take_bytes(len, Charge::Decoding)?;
                    return Ok(self.arena.alloc(Value::Blob(raw)));
                }
                let len = self.read_vec_len(Charge::Decoding)?;
                let mut elements: Vec<&'a Value<'a>> =
                    Vec::with_capacity(len.min(self.cursor.remaining()));
                for _ in 0..len {
                    elements.push(self.read_value(inner, depth + 1)?);
                }
                Ok(self
                    .arena
                    .alloc(Value::Vec(self.arena.alloc_slice_copy(&elements))))
            }
            Type::Record(fields) => {
                let mut values: Vec<FieldValue<'a>> = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = self.read_value(field.ty, depth + 1)?;
                    values.push(FieldValue {
                        label: field.label,
                        value,
                    });
                }
                Ok(self
                    .arena
                    .alloc(Value::Record(self.arena.alloc_slice_copy(&values))))
            }
            Type::Variant(cases) => {
                let index = self.take_uleb(Charge::Decoding)?;
                let case = usize::try_from(index)
                    .ok()
                    .and_then(|i| cases.get(i))
                    .ok_or_else(|| {
                        self.invalid("variant index is out of range", || {
                            format!("variant index {index} is not below {}", cases.len())
                        })
                    })?;
                let value = self.read_value(case.ty, depth + 1)?;
                Ok(self.arena.alloc(Value::Variant(Variant {
                    index,
                    label: case.label,
                    value,
                })))
            }
            Type::Func(_) | Type::Service(_) => {
                Err(Error::Unsupported("func and service values do not decode"))
            }
            Type::Var(_) => unreachable!("trace resolves vars"),
        }
    }

    fn read_vec_len(&mut self, which: Charge) -> Result<usize> {
        let len = self.take_uleb(which)?;
        if len > VEC_DECODE_LIMIT {
            return Err(Error::Alloc);
        }
        usize::try_from(len).map_err(|_| Error::Overflow)
    }

    fn skip_n(&mut self, len: usize, which: Charge) -> Result<()> {
        self.charge(which, len as u64)?;
        self.cursor.skip(len)
    }

    fn skip(&mut self, ty: &'a Type<'a>, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("value nesting exceeds the depth limit"));
        }
        self.charge(Charge::Skipping, 1)?;
        let ty = self.env.trace(ty)?;
        match *ty {
            Type::Null | Type::Reserved => Ok(()),
            Type::Empty => Err(Error::invalid("type empty has no values")),
            Type::Bool | Type::Nat8 | Type::Int8 => self.skip_n(1, Charge::Skipping),
            Type::Nat16 | Type::Int16 => self.skip_n(2, Charge::Skipping),
            Type::Nat32 | Type::Int32 | Type::Float32 => self.skip_n(4, Charge::Skipping),
            Type::Nat64 | Type::Int64 | Type::Float64 => self.skip_n(8, Charge::Skipping),
            Type::Nat => {
                self.take_leb_image(false, Charge::Skipping)?;
                Ok(())
            }
            Type::Int => {
                self.take_leb_image(true, Charge::Skipping)?;
                Ok(())
            }
            Type::Text => {
                let len = self.take_len(Charge::Skipping)?;
                self.skip_n(len, Charge::Skipping)
            }
            Type::Principal => {
                let flag = self.take_byte(Charge::Skipping)?;
                if flag != 0x01 {
                    return Err(Error::invalid("invalid principal flag byte"));
                }
                let len = self.take_len(Charge::Skipping)?;
                self.skip_n(len, Charge::Skipping)
            }
            Type::Opt(inner) => match self.take_byte(Charge::Skipping)? {
                0 => Ok(()),
                1 => self.skip(inner, depth + 1),
                _ => Err(Error::invalid("invalid opt tag byte")),
            },
            Type::Vec(inner) => {
                if matches!(self.env.trace(inner)?, Type::Nat8) {
                    let len = self.take_len(Charge::Skipping)?;
                    return self.skip_n(len, Charge::Skipping);
                }
                let len = self.read_vec_len(Charge::Skipping)?;
                for _ in 0..len {
                    self.skip(inner, depth + 1)?;
                }
                Ok(())
            }
            Type::Record(fields) => {
                for field in fields {
                    self.skip(field.ty, depth + 1)?;
                }
                Ok(())
            }
            Type::Variant(cases) => {
                let index = self.take_uleb(Charge::Skipping)?;
                let case = usize::try_from(index)
                    .ok()
                    .and_then(|i| cases.get(i))
                    .ok_or_else(|| Error::invalid("variant index is out of range"))?;
                self.skip(case.ty, depth + 1)
            }
            Type::Func(_) | Type::Service(_) => {
                Err(Error::Unsupported("func and service values do not decode"))
            }
            Type::Var(_) => unreachable!("trace resolves vars"),
        }
    }

    fn read_value_as(
        &mut self,
        wire: &'a Type<'a>,
        expected: &'a Type<'a>,
        depth: usize,
    ) -> Result<&'a Value<'a>> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("value nesting exceeds the depth limit"));
        }
        let wire = self.env.trace(wire)?;
        let expected = self.env.trace(expected)?;
        if std::ptr::eq(wire, expected) {
            return self.read_value(wire, depth);
        }
        match (*wire, *expected) {
            (_, Type::Reserved) => {
                let _ = self.read_value(wire, depth)?;
                Ok(&Value::Reserved)
            }
            (Type::Nat, Type::Int) => {
                self.charge(Charge::Decoding, 1)?;
                let raw = self.take_leb_image(false, Charge::Decoding)?;
                Ok(self.arena.alloc(Value::Int(raw)))
            }
            (_, Type::Opt(_)) => {
                // Decode at the wire type, then coerce off-cursor: a
                // failing inner coercion must still consume exactly the
                // wire value's bytes.
                let value = self.read_value(wire, depth)?;
                coerce::coerce(self.arena, &self.env, wire, expected, value, self.opt_report)
            }
            (Type::Vec(wire_inner), Type::Vec(expected_inner)) => {
                if matches!(self.env.trace(wire_inner)?, Type::Nat8) {
                    let value = self.read_value(wire, depth)?;
                    return coerce::coerce(
                        self.arena,
                        &self.env,
                        wire,
                        expected,
                        value,
                        self.opt_report,
                    );
                }
                self.charge(Charge::Decoding, 1)?;
                let len = self.read_vec_len(Charge::Decoding)?;
                let mut elements: Vec<&'a Value<'a>> =
                    Vec::with_capacity(len.min(self.cursor.remaining()));
                for _ in 0..len {
                    elements.push(self.read_value_as(wire_inner, expected_inner, depth + 1)?);
                }
                Ok(self
                    .arena
                    .alloc(Value::Vec(self.arena.alloc_slice_copy(&elements))))
            }
            (Type::Record(wire_fields), Type::Record(expected_fields)) => {
                self.charge(Charge::Decoding, 1)?;
                let mut values: Vec<FieldValue<'a>> = Vec::with_capacity(expected_fields.len());
                let mut wire_index = 0;
                for expected_field in expected_fields {
                    let id = expected_field.label.id();
                    while wire_fields
                        .get(wire_index)
                        .is_some_and(|f| f.label.id() < id)
                    {
                        self.skip(wire_fields[wire_index].ty, depth + 1)?;
                        wire_index += 1;
                    }
                    let value = match wire_fields.get(wire_index) {
                        Some(wire_field) if wire_field.label.id() == id => {
                            wire_index += 1;
                            self.read_value_as(wire_field.ty, expected_field.ty, depth + 1)?
                        }
                        _ => default_field(self.env.trace(expected_field.ty)?).ok_or_else(
                            || {
                                self.invalid("record is missing a required field", || {
                                    format!(
                                        "record is missing required field {}",
                                        expected_field.label
                                    )
                                })
                            },
                        )?,
                    };
                    values.push(FieldValue {
                        label: expected_field.label,
                        value,
                    });
                }
                while wire_index < wire_fields.len() {
                    self.skip(wire_fields[wire_index].ty, depth + 1)?;
                    wire_index += 1;
                }
                Ok(self
                    .arena
                    .alloc(Value::Record(self.arena.alloc_slice_copy(&values))))
            }
            (Type::Variant(wire_cases), Type::Variant(expected_cases)) => {
                self.charge(Charge::Decoding, 1)?;
                let index = self.take_uleb(Charge::Decoding)?;
                let wire_case = usize::try_from(index)
                    .ok()
                    .and_then(|i| wire_cases.get(i))
                    .ok_or_else(|| Error::invalid("variant index is out of range"))?;
                let expected_index = expected_cases
                    .binary_search_by_key(&wire_case.label.id(), |c| c.label.id())
                    .map_err(|_| {
                        self.invalid("variant case is not expected", || {
                            format!("variant case {} is not expected", wire_case.label)
                        })
                    })?;
                let case = &expected_cases[expected_index];
                let value = self.read_value_as(wire_case.ty, case.ty, depth + 1)?;
                Ok(self.arena.alloc(Value::Variant(Variant {
                    index: expected_index as u64,
                    label: case.label,
                    value,
                })))
            }
            (w, e) => match (w.opcode(), e.opcode()) {
                (Some(a), Some(b)) if a == b => self.read_value(wire, depth),
                _ => Err(self.invalid("wire type does not decode as the expected type", || {
                    format!("wire type `{w}` does not decode as expected type `{e}`")
                })),
            },
        }
    }
}

/// One-shot decoding of every argument at its wire type.
pub fn decode_args<'a>(arena: &'a Arena, data: &'a [u8]) -> Result<Vec<&'a Value<'a>>> {
    let mut decoder = Decoder::new(arena, data, DecoderConfig::default())?;
    let mut values = Vec::with_capacity(decoder.arg_types().len());
    for _ in 0..decoder.arg_types().len() {
        values.push(decoder.value()?);
    }
    decoder.done()?;
    Ok(values)
}

fn default_field<'a>(expected: &'a Type<'a>) -> Option<&'a Value<'a>> {
    match expected {
        Type::Opt(_) => Some(&Value::Opt(None)),
        Type::Null => Some(&Value::Null),
        Type::Reserved => Some(&Value::Reserved),
        _ => None,
    }
}
