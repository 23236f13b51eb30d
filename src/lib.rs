//! Candid wire-format encoder and decoder
//!
//! This crate implements the runtime side of the Candid interface
//! description language: building typed values, serializing them into
//! self-describing `DIDL` messages, parsing such messages back, and
//! coercing decoded values into an expected type under Candid's subtype
//! relation. Every structural allocation of a session lives in one bump
//! [`Arena`] and is released with it.

/// Bump arena owning all structural allocations
pub mod arena;
mod bytes;
/// Value coercion under subtyping
pub mod coerce;
/// Type-directed deserializer with work quotas
pub mod decode;
/// Value serializer and argument builder
pub mod encode;
mod error;
/// Message header: magic, type table, argument types
pub mod header;
/// Field labels and the canonical name hash
pub mod label;
/// LEB128 / SLEB128 integer codec
pub mod leb128;
mod opcode;
/// Coinductive subtype checker
pub mod subtype;
/// Type-table builder with structural deduplication
pub mod table;
/// The Candid type model and type environments
pub mod types;
/// The Candid value model
pub mod value;

pub use self::arena::Arena;
pub use self::bytes::{Cursor, Output};
pub use self::decode::{decode_args, Decoder, DecoderConfig};
pub use self::encode::{encode_args, Builder};
pub use self::error::{Error, Result};
pub use self::label::{hash_name, Label};
pub use self::opcode::{FuncMode, TypeOpcode};
pub use self::subtype::{subtype, Checker, OptReport, SubtypeResult};
pub use self::types::{Field, FuncType, Method, Type, TypeEnv};
pub use self::value::{FieldValue, Value, Variant};
