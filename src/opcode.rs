use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Signed wire opcodes for Candid types.
///
/// Primitive opcodes double as inline type references; composite opcodes
/// only ever open a type-table entry. Anything below
/// [`TypeOpcode::FUTURE_THRESHOLD`] is a forward-compatibility blob entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i8)]
pub enum TypeOpcode {
    Null = -1,
    Bool = -2,
    Nat = -3,
    Int = -4,
    Nat8 = -5,
    Nat16 = -6,
    Nat32 = -7,
    Nat64 = -8,
    Int8 = -9,
    Int16 = -10,
    Int32 = -11,
    Int64 = -12,
    Float32 = -13,
    Float64 = -14,
    Text = -15,
    Reserved = -16,
    Empty = -17,
    Opt = -18,
    Vec = -19,
    Record = -20,
    Variant = -21,
    Func = -22,
    Service = -23,
    Principal = -24,
}

impl TypeOpcode {
    /// Opcodes strictly below this are skipped as opaque blobs.
    pub const FUTURE_THRESHOLD: i64 = -24;

    /// Whether this opcode stands for a primitive type (usable as an
    /// inline type reference).
    #[must_use]
    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            Self::Opt | Self::Vec | Self::Record | Self::Variant | Self::Func | Self::Service
        )
    }
}

/// Numeric codes for function-mode annotations. A func carries at most
/// one of these on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FuncMode {
    Query = 1,
    Oneway = 2,
    CompositeQuery = 3,
}
