//! Malformed and hostile inputs: every failure must surface as an error
//! value, never a panic, and never as partial output from `done()`.

use candid_wire::{decode_args, encode_args, Arena, Decoder, DecoderConfig, Error, Label, Type, Value};

fn decode_fails(message: &[u8]) -> Error {
    let arena = Arena::new();
    let data = arena.alloc_bytes(message);
    match decode_args(&arena, data) {
        Ok(_) => panic!("decoding should have failed"),
        Err(err) => err,
    }
}

#[test]
fn every_truncation_of_a_valid_message_fails_cleanly() {
    let arena = Arena::new();
    let args = [
        (&Type::Text, Value::text(&arena, "hello")),
        (&Type::Nat, Value::nat(&arena, 624485)),
    ];
    let full = encode_args(&arena, &args).unwrap();
    for cut in 0..full.len() {
        let err = decode_fails(&full[..cut]);
        assert!(
            matches!(err, Error::Truncated | Error::Invalid(_)),
            "prefix of {cut} bytes produced {err:?}"
        );
    }
    // The untruncated message still decodes.
    assert_eq!(decode_args(&arena, full).unwrap().len(), 2);
}

#[test]
fn bad_magic_and_garbage() {
    assert!(matches!(decode_fails(b"DIDX\x00\x00"), Error::Invalid(_)));
    assert!(matches!(decode_fails(b""), Error::Truncated));
    assert!(matches!(decode_fails(&[0xff; 16]), Error::Invalid(_)));
}

#[test]
fn invalid_value_bytes() {
    // opt bool argument with tag byte 2
    let err = decode_fails(&[0x44, 0x49, 0x44, 0x4c, 0x01, 0x6e, 0x7e, 0x01, 0x00, 0x02]);
    assert!(matches!(err, Error::Invalid(_)));
    // principal with flag byte 0
    let err = decode_fails(&[0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x68, 0x00]);
    assert!(matches!(err, Error::Invalid(_)));
    // principal longer than 29 bytes
    let mut long = vec![0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x68, 0x01, 30];
    long.extend([0u8; 30]);
    assert!(matches!(decode_fails(&long), Error::Invalid(_)));
    // text that is not UTF-8
    let err = decode_fails(&[0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x71, 0x02, 0xff, 0xfe]);
    assert!(matches!(err, Error::Invalid(_)));
    // variant index beyond the case count
    let err = decode_fails(&[
        0x44, 0x49, 0x44, 0x4c, 0x01, 0x6b, 0x01, 0x00, 0x7f, 0x01, 0x00, 0x01,
    ]);
    assert!(matches!(err, Error::Invalid(_)));
}

#[test]
fn invalid_type_table_bytes() {
    // Record with duplicate field ids.
    let err = decode_fails(&[
        0x44, 0x49, 0x44, 0x4c, 0x01, 0x6c, 0x02, 0x00, 0x7f, 0x00, 0x7f, 0x01, 0x00,
    ]);
    assert!(matches!(err, Error::Invalid(_)));
    // Service with misordered method names ("b" before "a").
    let err = decode_fails(&[
        0x44, 0x49, 0x44, 0x4c, 0x02, 0x6a, 0x00, 0x00, 0x00, 0x69, 0x02, 0x01, 0x62, 0x00,
        0x01, 0x61, 0x00, 0x00,
    ]);
    assert!(matches!(err, Error::Invalid(_)));
    // Service whose method type is not a func.
    let err = decode_fails(&[
        0x44, 0x49, 0x44, 0x4c, 0x02, 0x6d, 0x7b, 0x69, 0x01, 0x01, 0x6d, 0x00, 0x00,
    ]);
    assert!(matches!(err, Error::Invalid(_)));
    // Func with two modes.
    let err = decode_fails(&[
        0x44, 0x49, 0x44, 0x4c, 0x01, 0x6a, 0x00, 0x00, 0x02, 0x01, 0x02, 0x01, 0x00,
    ]);
    assert!(matches!(err, Error::Invalid(_)));
    // Argument reference past the table.
    let err = decode_fails(&[0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x05]);
    assert!(matches!(err, Error::Invalid(_)));
}

#[test]
fn unknown_future_entries_only_parse_when_complete() {
    // Opcode -25 with a two-byte opaque blob parses as reserved.
    let arena = Arena::new();
    let ok = [
        0x44, 0x49, 0x44, 0x4c, 0x01, 0x67, 0x02, 0xaa, 0xbb, 0x01, 0x00,
    ];
    let data = arena.alloc_bytes(&ok);
    let values = decode_args(&arena, data).unwrap();
    assert_eq!(values, [&Value::Reserved]);
    // The same entry with its blob cut short is truncated.
    let err = decode_fails(&[0x44, 0x49, 0x44, 0x4c, 0x01, 0x67, 0x02, 0xaa]);
    assert!(matches!(err, Error::Truncated));
}

#[test]
fn hard_opt_policy_rejects_special_coercions() {
    let arena = Arena::new();
    let message = encode_args(&arena, &[(&Type::Text, Value::text(&arena, "x"))]).unwrap();
    let config = DecoderConfig {
        opt_report: candid_wire::OptReport::Error,
        ..DecoderConfig::default()
    };
    let mut decoder = Decoder::new(&arena, message, config).unwrap();
    assert!(decoder.value_as(Type::opt(&arena, &Type::Nat)).is_err());
}

#[test]
fn required_fields_cannot_be_conjured() {
    let arena = Arena::new();
    let wire = Type::record(&arena, &[(Label::named("a"), &Type::Nat64)]);
    let value = Value::record(&arena, &[(Label::named("a"), &Value::Nat64(1))]);
    let message = encode_args(&arena, &[(wire, value)]).unwrap();
    let wide = Type::record(
        &arena,
        &[
            (Label::named("a"), &Type::Nat64),
            (Label::named("b"), &Type::Text),
        ],
    );
    let mut decoder = Decoder::new(&arena, message, DecoderConfig::default()).unwrap();
    assert!(matches!(decoder.value_as(wide), Err(Error::Invalid(_))));
}

#[test]
fn overflowing_bignum_payloads_are_rejected() {
    // nat argument whose ULEB image never terminates within 64 bits.
    let mut message = vec![0x44, 0x49, 0x44, 0x4c, 0x00, 0x01, 0x7d];
    message.extend([0x80u8; 10]);
    message.push(0x01);
    assert!(matches!(decode_fails(&message), Error::Overflow));
}
