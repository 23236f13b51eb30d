use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::subtype::OptReport;
use crate::types::{Field, Type, TypeEnv};
use crate::value::{FieldValue, Value, Variant};

/// Produces a value of `expected` from a `value` of wire type `wire`.
///
/// Everything the subtype relation admits is coerced structurally; a
/// failed opt coercion collapses to the absent option unless the
/// `Error` reporting policy is active. New nodes are arena-allocated;
/// untouched subtrees are shared with the input.
pub fn coerce<'a>(
    arena: &'a Arena,
    env: &TypeEnv<'a>,
    wire: &'a Type<'a>,
    expected: &'a Type<'a>,
    value: &'a Value<'a>,
    report: OptReport,
) -> Result<&'a Value<'a>> {
    if std::ptr::eq(wire, expected) {
        return Ok(value);
    }
    let wire = env.trace(wire)?;
    let expected = env.trace(expected)?;
    if std::ptr::eq(wire, expected) {
        return Ok(value);
    }
    match (*wire, *expected) {
        (_, Type::Reserved) => Ok(&Value::Reserved),
        (Type::Nat, Type::Int) => match *value {
            // The raw bytes travel unchanged; they are re-read as SLEB
            // on demand.
            Value::Nat(raw) => Ok(arena.alloc(Value::Int(raw))),
            _ => Err(Error::invalid("nat type paired with a non-nat value")),
        },
        (_, Type::Opt(inner)) => coerce_into_opt(arena, env, wire, inner, value, report),
        (Type::Vec(wire_inner), Type::Vec(expected_inner)) => {
            coerce_vec(arena, env, wire_inner, expected_inner, value, report)
        }
        (Type::Record(wire_fields), Type::Record(expected_fields)) => {
            let Value::Record(field_values) = *value else {
                return Err(Error::invalid("record type paired with a non-record value"));
            };
            let mut out: Vec<FieldValue<'a>> = Vec::with_capacity(expected_fields.len());
            for expected_field in expected_fields {
                let id = expected_field.label.id();
                let wire_field = find_field(wire_fields, id);
                let field_value = field_values.iter().find(|f| f.label.id() == id);
                let coerced = match (wire_field, field_value) {
                    (Some(wf), Some(fv)) => {
                        coerce(arena, env, wf.ty, expected_field.ty, fv.value, report)?
                    }
                    _ => default_for(env.trace(expected_field.ty)?).ok_or_else(|| {
                        Error::invalid(format!(
                            "record is missing required field {}",
                            expected_field.label
                        ))
                    })?,
                };
                out.push(FieldValue {
                    label: expected_field.label,
                    value: coerced,
                });
            }
            Ok(arena.alloc(Value::Record(arena.alloc_slice_copy(&out))))
        }
        (Type::Variant(wire_cases), Type::Variant(expected_cases)) => {
            let Value::Variant(active) = *value else {
                return Err(Error::invalid("variant type paired with a non-variant value"));
            };
            let wire_case = find_field(wire_cases, active.label.id()).ok_or_else(|| {
                Error::invalid("variant value carries a case its wire type lacks")
            })?;
            let index = expected_cases
                .binary_search_by_key(&active.label.id(), |c| c.label.id())
                .map_err(|_| {
                    Error::invalid(format!(
                        "variant case {} is not expected",
                        active.label
                    ))
                })?;
            let case = &expected_cases[index];
            let payload = coerce(arena, env, wire_case.ty, case.ty, active.value, report)?;
            Ok(arena.alloc(Value::Variant(Variant {
                index: index as u64,
                label: case.label,
                value: payload,
            })))
        }
        (w, e) => {
            // Identical constructors pass through unchanged.
            match (w.opcode(), e.opcode()) {
                (Some(a), Some(b)) if a == b => Ok(value),
                _ => Err(Error::invalid("types are not coercible")),
            }
        }
    }
}

fn coerce_into_opt<'a>(
    arena: &'a Arena,
    env: &TypeEnv<'a>,
    wire: &'a Type<'a>,
    expected_inner: &'a Type<'a>,
    value: &'a Value<'a>,
    report: OptReport,
) -> Result<&'a Value<'a>> {
    const ABSENT: &Value<'static> = &Value::Opt(None);
    match *wire {
        Type::Null => Ok(ABSENT),
        Type::Opt(wire_inner) => match *value {
            Value::Opt(None) => Ok(ABSENT),
            Value::Opt(Some(inner)) => {
                match coerce(arena, env, wire_inner, expected_inner, inner, report) {
                    Ok(coerced) => Ok(arena.alloc(Value::Opt(Some(coerced)))),
                    Err(err) => soft_absent(report, err),
                }
            }
            _ => Err(Error::invalid("opt type paired with a non-opt value")),
        },
        _ => {
            if !env.trace(expected_inner)?.is_optional_like() {
                match coerce(arena, env, wire, expected_inner, value, report) {
                    Ok(coerced) => return Ok(arena.alloc(Value::Opt(Some(coerced)))),
                    Err(err) => return soft_absent(report, err),
                }
            }
            soft_absent(report, Error::invalid("wire type is optional-like"))
        }
    }
}

/// The special opt collapse: absent unless the hard policy is active.
fn soft_absent<'a>(report: OptReport, err: Error) -> Result<&'a Value<'a>> {
    match report {
        OptReport::Error => Err(err),
        OptReport::Warning => {
            tracing::warn!(%err, "opt coercion produced an absent value (special opt rule)");
            Ok(&Value::Opt(None))
        }
        OptReport::Silence => Ok(&Value::Opt(None)),
    }
}

fn coerce_vec<'a>(
    arena: &'a Arena,
    env: &TypeEnv<'a>,
    wire_inner: &'a Type<'a>,
    expected_inner: &'a Type<'a>,
    value: &'a Value<'a>,
    report: OptReport,
) -> Result<&'a Value<'a>> {
    let expected_is_bytes = matches!(env.trace(expected_inner)?, Type::Nat8);
    match *value {
        Value::Blob(bytes) => {
            if expected_is_bytes {
                return Ok(value);
            }
            // Blob to general vec: each byte coerces as a nat8 element.
            let mut out: Vec<&'a Value<'a>> = Vec::with_capacity(bytes.len());
            for &byte in bytes {
                let element: &'a Value<'a> = arena.alloc(Value::Nat8(byte));
                out.push(coerce(arena, env, &Type::Nat8, expected_inner, element, report)?);
            }
            Ok(arena.alloc(Value::Vec(arena.alloc_slice_copy(&out))))
        }
        Value::Vec(elements) => {
            let wire_is_bytes = matches!(env.trace(wire_inner)?, Type::Nat8);
            if expected_is_bytes && wire_is_bytes {
                // Both sides byte-shaped: canonicalize to a blob.
                let mut bytes: Vec<u8> = Vec::with_capacity(elements.len());
                for &element in elements {
                    match *element {
                        Value::Nat8(b) => bytes.push(b),
                        _ => return Err(Error::invalid("vec nat8 holds a non-nat8 element")),
                    }
                }
                return Ok(arena.alloc(Value::Blob(arena.alloc_bytes(&bytes))));
            }
            let mut out: Vec<&'a Value<'a>> = Vec::with_capacity(elements.len());
            for &element in elements {
                out.push(coerce(arena, env, wire_inner, expected_inner, element, report)?);
            }
            Ok(arena.alloc(Value::Vec(arena.alloc_slice_copy(&out))))
        }
        _ => Err(Error::invalid("vec type paired with a non-vec value")),
    }
}

fn default_for<'a>(expected: &'a Type<'a>) -> Option<&'a Value<'a>> {
    match expected {
        Type::Opt(_) => Some(&Value::Opt(None)),
        Type::Null => Some(&Value::Null),
        Type::Reserved => Some(&Value::Reserved),
        _ => None,
    }
}

fn find_field<'f, 'a>(fields: &'f [Field<'a>], id: u32) -> Option<&'f Field<'a>> {
    fields
        .binary_search_by_key(&id, |f| f.label.id())
        .ok()
        .map(|i| &fields[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;

    fn silent<'a>(
        arena: &'a Arena,
        wire: &'a Type<'a>,
        expected: &'a Type<'a>,
        value: &'a Value<'a>,
    ) -> Result<&'a Value<'a>> {
        coerce(arena, &TypeEnv::new(), wire, expected, value, OptReport::Silence)
    }

    #[test]
    fn identity_and_reserved() {
        let arena = Arena::new();
        let v = Value::text(&arena, "x");
        assert_eq!(silent(&arena, &Type::Text, &Type::Text, v).unwrap(), v);
        assert_eq!(
            silent(&arena, &Type::Text, &Type::Reserved, v).unwrap(),
            &Value::Reserved
        );
    }

    #[test]
    fn nat_retags_to_int() {
        let arena = Arena::new();
        let v = Value::nat(&arena, 42);
        let coerced = silent(&arena, &Type::Nat, &Type::Int, v).unwrap();
        assert!(matches!(*coerced, Value::Int([0x2a])));
    }

    #[test]
    fn opt_ladder() {
        let arena = Arena::new();
        let opt_nat = Type::opt(&arena, &Type::Nat);
        // null -> opt T
        assert_eq!(
            silent(&arena, &Type::Null, opt_nat, &Value::Null).unwrap(),
            &Value::Opt(None)
        );
        // wrap-in-some
        let n = Value::nat(&arena, 5);
        assert_eq!(
            silent(&arena, &Type::Nat, opt_nat, n).unwrap(),
            Value::some(&arena, n)
        );
        // incompatible inner collapses to absent under silence
        let t = Value::text(&arena, "nope");
        assert_eq!(
            silent(&arena, &Type::Text, opt_nat, t).unwrap(),
            &Value::Opt(None)
        );
        // and fails under the hard policy
        assert!(coerce(
            &arena,
            &TypeEnv::new(),
            &Type::Text,
            opt_nat,
            t,
            OptReport::Error
        )
        .is_err());
        // opt -> opt preserves absence and coerces presence
        let opt_int = Type::opt(&arena, &Type::Int);
        assert_eq!(
            silent(&arena, opt_nat, opt_int, &Value::Opt(None)).unwrap(),
            &Value::Opt(None)
        );
        let some_nat = Value::some(&arena, Value::nat(&arena, 7));
        let out = silent(&arena, opt_nat, opt_int, some_nat).unwrap();
        let Value::Opt(Some(inner)) = *out else {
            panic!("expected a present option")
        };
        assert!(matches!(*inner, Value::Int(_)));
    }

    #[test]
    fn record_projection_and_defaults() {
        let arena = Arena::new();
        let wire = Type::record(
            &arena,
            &[
                (Label::named("a"), &Type::Nat64),
                (Label::named("b"), &Type::Text),
            ],
        );
        let value = Value::record(
            &arena,
            &[
                (Label::named("a"), &Value::Nat64(42)),
                (Label::named("b"), Value::text(&arena, "hello")),
            ],
        );
        let narrow = Type::record(&arena, &[(Label::named("a"), &Type::Nat64)]);
        let projected = silent(&arena, wire, narrow, value).unwrap();
        assert_eq!(
            projected,
            Value::record(&arena, &[(Label::named("a"), &Value::Nat64(42))])
        );

        let widened = Type::record(
            &arena,
            &[
                (Label::named("a"), &Type::Nat64),
                (Label::named("c"), Type::opt(&arena, &Type::Text)),
            ],
        );
        let defaulted = silent(&arena, wire, widened, value).unwrap();
        assert_eq!(
            defaulted,
            Value::record(
                &arena,
                &[
                    (Label::named("a"), &Value::Nat64(42)),
                    (Label::named("c"), &Value::Opt(None)),
                ]
            )
        );

        let demanding = Type::record(
            &arena,
            &[
                (Label::named("a"), &Type::Nat64),
                (Label::named("c"), &Type::Text),
            ],
        );
        assert!(silent(&arena, wire, demanding, value).is_err());
    }

    #[test]
    fn variant_reindexes_cases() {
        let arena = Arena::new();
        let wire = Type::variant(&arena, &[(Label::named("b"), &Type::Nat)]);
        let expected = Type::variant(
            &arena,
            &[
                (Label::named("a"), &Type::Text),
                (Label::named("b"), &Type::Nat),
            ],
        );
        let value = Value::variant(&arena, 0, Label::named("b"), Value::nat(&arena, 1));
        let coerced = silent(&arena, wire, expected, value).unwrap();
        let Value::Variant(active) = *coerced else {
            panic!("expected a variant")
        };
        // "a" hashes below "b", so "b" is case 1 in the expected type.
        assert_eq!(active.index, 1);
        assert_eq!(active.label, Label::named("b"));
    }

    #[test]
    fn blob_and_vec_interchange() {
        let arena = Arena::new();
        let bytes = Type::vec(&arena, &Type::Nat8);
        let blob = Value::blob(&arena, &[1, 2, 3]);
        // Pass-through when the expected inner is nat8.
        assert_eq!(silent(&arena, bytes, bytes, blob).unwrap(), blob);
        // Blob to a general vec when it is not.
        let vec_nat = Type::vec(&arena, &Type::Nat16);
        assert!(silent(&arena, bytes, vec_nat, blob).is_err());
        let vec_opt = Type::vec(&arena, Type::opt(&arena, &Type::Nat8));
        let out = silent(&arena, bytes, vec_opt, blob).unwrap();
        let Value::Vec(elements) = *out else {
            panic!("expected a vec")
        };
        assert_eq!(elements.len(), 3);
        assert!(matches!(*elements[0], Value::Opt(Some(&Value::Nat8(1)))));
        // A nat8-shaped vec value canonicalizes back to a blob. The
        // expected type is a distinct node so the identity shortcut
        // does not apply.
        let bytes_again = Type::vec(&arena, &Type::Nat8);
        let vec_value = Value::vec(
            &arena,
            &[arena.alloc(Value::Nat8(9)), arena.alloc(Value::Nat8(8))],
        );
        let as_blob = silent(&arena, bytes, bytes_again, vec_value).unwrap();
        assert!(matches!(*as_blob, Value::Blob([9, 8])));
    }
}
