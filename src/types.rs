use std::collections::HashMap;
use std::fmt;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::label::{self, Label};
use crate::opcode::{FuncMode, TypeOpcode};

/// Structural comparisons give up below this depth and report the types
/// as distinct rather than recurse further.
const MAX_EQ_DEPTH: usize = 256;

/// A Candid type.
///
/// Composite variants reference arena-allocated children; the whole graph
/// is owned by one [`Arena`] and freed with it. Self-reference is never a
/// raw pointer cycle: every cycle goes through [`Type::Var`] plus a
/// [`TypeEnv`] binding.
#[derive(Debug, Clone, Copy)]
pub enum Type<'a> {
    Null,
    Bool,
    Nat,
    Int,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Reserved,
    Empty,
    Principal,
    Opt(&'a Type<'a>),
    Vec(&'a Type<'a>),
    /// Fields sorted strictly ascending by label id.
    Record(&'a [Field<'a>]),
    /// Cases sorted strictly ascending by label id.
    Variant(&'a [Field<'a>]),
    Func(&'a FuncType<'a>),
    /// Methods sorted strictly ascending by name.
    Service(&'a [Method<'a>]),
    /// Named indirection: a table reference (`table<i>`) or a
    /// user-supplied binding resolved through a [`TypeEnv`].
    Var(&'a str),
}

/// One record or variant field.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub label: Label<'a>,
    pub ty: &'a Type<'a>,
}

/// Signature of a func type: argument and return sequences plus at most
/// one mode annotation.
#[derive(Debug, Clone, Copy)]
pub struct FuncType<'a> {
    pub args: &'a [&'a Type<'a>],
    pub rets: &'a [&'a Type<'a>],
    pub mode: Option<FuncMode>,
}

/// One service method; `ty` must resolve to a func type.
#[derive(Debug, Clone, Copy)]
pub struct Method<'a> {
    pub name: &'a str,
    pub ty: &'a Type<'a>,
}

impl<'a> Type<'a> {
    pub fn opt(arena: &'a Arena, inner: &'a Type<'a>) -> &'a Type<'a> {
        arena.alloc(Type::Opt(inner))
    }

    pub fn vec(arena: &'a Arena, inner: &'a Type<'a>) -> &'a Type<'a> {
        arena.alloc(Type::Vec(inner))
    }

    /// Builds a record type; fields are sorted (stably) by label id.
    pub fn record(arena: &'a Arena, fields: &[(Label<'a>, &'a Type<'a>)]) -> &'a Type<'a> {
        arena.alloc(Type::Record(Self::sorted_fields(arena, fields)))
    }

    /// Builds a variant type; cases are sorted (stably) by label id.
    pub fn variant(arena: &'a Arena, cases: &[(Label<'a>, &'a Type<'a>)]) -> &'a Type<'a> {
        arena.alloc(Type::Variant(Self::sorted_fields(arena, cases)))
    }

    pub fn func(
        arena: &'a Arena,
        args: &[&'a Type<'a>],
        rets: &[&'a Type<'a>],
        mode: Option<FuncMode>,
    ) -> &'a Type<'a> {
        arena.alloc(Type::Func(arena.alloc(FuncType {
            args: arena.alloc_slice_copy(args),
            rets: arena.alloc_slice_copy(rets),
            mode,
        })))
    }

    /// Builds a service type; methods are sorted by name.
    pub fn service(arena: &'a Arena, methods: &[(&'a str, &'a Type<'a>)]) -> &'a Type<'a> {
        let mut sorted: Vec<Method<'a>> = methods
            .iter()
            .map(|&(name, ty)| Method { name, ty })
            .collect();
        sorted.sort_by_key(|m| m.name);
        arena.alloc(Type::Service(arena.alloc_slice_copy(&sorted)))
    }

    /// Builds a named indirection, copying the name into the arena.
    pub fn var(arena: &'a Arena, name: &str) -> &'a Type<'a> {
        arena.alloc(Type::Var(arena.alloc_str(name)))
    }

    fn sorted_fields(
        arena: &'a Arena,
        fields: &[(Label<'a>, &'a Type<'a>)],
    ) -> &'a [Field<'a>] {
        let mut sorted: Vec<Field<'a>> = fields
            .iter()
            .map(|&(label, ty)| Field { label, ty })
            .collect();
        label::sort_by_id(&mut sorted, |f| f.label.id());
        arena.alloc_slice_copy(&sorted)
    }

    /// The wire opcode of this constructor; `None` for [`Type::Var`].
    #[must_use]
    pub fn opcode(&self) -> Option<TypeOpcode> {
        Some(match self {
            Type::Null => TypeOpcode::Null,
            Type::Bool => TypeOpcode::Bool,
            Type::Nat => TypeOpcode::Nat,
            Type::Int => TypeOpcode::Int,
            Type::Nat8 => TypeOpcode::Nat8,
            Type::Nat16 => TypeOpcode::Nat16,
            Type::Nat32 => TypeOpcode::Nat32,
            Type::Nat64 => TypeOpcode::Nat64,
            Type::Int8 => TypeOpcode::Int8,
            Type::Int16 => TypeOpcode::Int16,
            Type::Int32 => TypeOpcode::Int32,
            Type::Int64 => TypeOpcode::Int64,
            Type::Float32 => TypeOpcode::Float32,
            Type::Float64 => TypeOpcode::Float64,
            Type::Text => TypeOpcode::Text,
            Type::Reserved => TypeOpcode::Reserved,
            Type::Empty => TypeOpcode::Empty,
            Type::Principal => TypeOpcode::Principal,
            Type::Opt(_) => TypeOpcode::Opt,
            Type::Vec(_) => TypeOpcode::Vec,
            Type::Record(_) => TypeOpcode::Record,
            Type::Variant(_) => TypeOpcode::Variant,
            Type::Func(_) => TypeOpcode::Func,
            Type::Service(_) => TypeOpcode::Service,
            Type::Var(_) => return None,
        })
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.opcode().is_some_and(TypeOpcode::is_primitive)
    }

    /// Whether the type has a defined "absent" inhabitant: `null`,
    /// `reserved`, or `opt T`. Callers resolve `Var` first.
    #[must_use]
    pub fn is_optional_like(&self) -> bool {
        matches!(self, Type::Null | Type::Reserved | Type::Opt(_))
    }

    /// The static singleton for a primitive opcode.
    pub(crate) fn primitive(op: TypeOpcode) -> Option<&'static Type<'static>> {
        Some(match op {
            TypeOpcode::Null => &Type::Null,
            TypeOpcode::Bool => &Type::Bool,
            TypeOpcode::Nat => &Type::Nat,
            TypeOpcode::Int => &Type::Int,
            TypeOpcode::Nat8 => &Type::Nat8,
            TypeOpcode::Nat16 => &Type::Nat16,
            TypeOpcode::Nat32 => &Type::Nat32,
            TypeOpcode::Nat64 => &Type::Nat64,
            TypeOpcode::Int8 => &Type::Int8,
            TypeOpcode::Int16 => &Type::Int16,
            TypeOpcode::Int32 => &Type::Int32,
            TypeOpcode::Int64 => &Type::Int64,
            TypeOpcode::Float32 => &Type::Float32,
            TypeOpcode::Float64 => &Type::Float64,
            TypeOpcode::Text => &Type::Text,
            TypeOpcode::Reserved => &Type::Reserved,
            TypeOpcode::Empty => &Type::Empty,
            TypeOpcode::Principal => &Type::Principal,
            _ => return None,
        })
    }
}

/// Structural equality: identical kind, equal labels and recursively
/// equal children. `Var` compares by name, which is what keeps the
/// recursion finite on self-referential types.
#[must_use]
pub fn struct_eq(a: &Type<'_>, b: &Type<'_>) -> bool {
    let mut stack = Vec::new();
    eq_guarded(a, b, &mut stack, 0)
}

fn eq_guarded(a: &Type<'_>, b: &Type<'_>, stack: &mut Vec<(usize, usize)>, depth: usize) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    if depth > MAX_EQ_DEPTH {
        return false;
    }
    let pair = (a as *const Type<'_> as usize, b as *const Type<'_> as usize);
    if stack.contains(&pair) {
        return true;
    }
    stack.push(pair);
    let eq = eq_children(a, b, stack, depth + 1);
    stack.pop();
    eq
}

fn eq_children(a: &Type<'_>, b: &Type<'_>, stack: &mut Vec<(usize, usize)>, depth: usize) -> bool {
    match (*a, *b) {
        (Type::Var(x), Type::Var(y)) => x == y,
        (Type::Opt(x), Type::Opt(y)) | (Type::Vec(x), Type::Vec(y)) => {
            eq_guarded(x, y, stack, depth)
        }
        (Type::Record(xs), Type::Record(ys)) | (Type::Variant(xs), Type::Variant(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(x, y)| {
                    x.label == y.label && eq_guarded(x.ty, y.ty, stack, depth)
                })
        }
        (Type::Func(x), Type::Func(y)) => {
            x.mode == y.mode
                && x.args.len() == y.args.len()
                && x.rets.len() == y.rets.len()
                && x.args
                    .iter()
                    .zip(y.args.iter())
                    .all(|(xa, ya)| eq_guarded(xa, ya, stack, depth))
                && x.rets
                    .iter()
                    .zip(y.rets.iter())
                    .all(|(xr, yr)| eq_guarded(xr, yr, stack, depth))
        }
        (Type::Service(xs), Type::Service(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(x, y)| {
                    x.name == y.name && eq_guarded(x.ty, y.ty, stack, depth)
                })
        }
        _ => {
            // Remaining pairs are primitives (or mismatched kinds):
            // compare by constructor.
            matches!((a.opcode(), b.opcode()), (Some(x), Some(y)) if x == y)
                && a.opcode().is_some_and(TypeOpcode::is_primitive)
        }
    }
}

impl PartialEq for Type<'_> {
    fn eq(&self, other: &Self) -> bool {
        struct_eq(self, other)
    }
}

impl Eq for Type<'_> {}

impl fmt::Display for Type<'_> {
    /// Compact type notation for diagnostics: `opt nat8`,
    /// `record { 0 : int; 1 : text }`, `var list`. Nested composites
    /// deeper than a few levels render as `...` so self-referential
    /// graphs stay printable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_type(self, f, 0)
    }
}

fn fmt_type(ty: &Type<'_>, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    const MAX_DISPLAY_DEPTH: usize = 4;
    if depth > MAX_DISPLAY_DEPTH {
        return f.write_str("...");
    }
    match *ty {
        Type::Null => f.write_str("null"),
        Type::Bool => f.write_str("bool"),
        Type::Nat => f.write_str("nat"),
        Type::Int => f.write_str("int"),
        Type::Nat8 => f.write_str("nat8"),
        Type::Nat16 => f.write_str("nat16"),
        Type::Nat32 => f.write_str("nat32"),
        Type::Nat64 => f.write_str("nat64"),
        Type::Int8 => f.write_str("int8"),
        Type::Int16 => f.write_str("int16"),
        Type::Int32 => f.write_str("int32"),
        Type::Int64 => f.write_str("int64"),
        Type::Float32 => f.write_str("float32"),
        Type::Float64 => f.write_str("float64"),
        Type::Text => f.write_str("text"),
        Type::Reserved => f.write_str("reserved"),
        Type::Empty => f.write_str("empty"),
        Type::Principal => f.write_str("principal"),
        Type::Opt(inner) => {
            f.write_str("opt ")?;
            fmt_type(inner, f, depth + 1)
        }
        Type::Vec(inner) => {
            f.write_str("vec ")?;
            fmt_type(inner, f, depth + 1)
        }
        Type::Record(fields) => fmt_fields("record", fields, f, depth),
        Type::Variant(cases) => fmt_fields("variant", cases, f, depth),
        Type::Func(func) => {
            f.write_str("func (")?;
            for (i, &arg) in func.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_type(arg, f, depth + 1)?;
            }
            f.write_str(") -> (")?;
            for (i, &ret) in func.rets.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_type(ret, f, depth + 1)?;
            }
            f.write_str(")")?;
            match func.mode {
                Some(FuncMode::Query) => f.write_str(" query"),
                Some(FuncMode::Oneway) => f.write_str(" oneway"),
                Some(FuncMode::CompositeQuery) => f.write_str(" composite_query"),
                None => Ok(()),
            }
        }
        Type::Service(methods) => {
            f.write_str("service {")?;
            for (i, method) in methods.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                write!(f, " {} : ", method.name)?;
                fmt_type(method.ty, f, depth + 1)?;
            }
            f.write_str(" }")
        }
        Type::Var(name) => write!(f, "var {name}"),
    }
}

fn fmt_fields(
    keyword: &str,
    fields: &[Field<'_>],
    f: &mut fmt::Formatter<'_>,
    depth: usize,
) -> fmt::Result {
    write!(f, "{keyword} {{")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(";")?;
        }
        write!(f, " {} : ", field.label)?;
        fmt_type(field.ty, f, depth + 1)?;
    }
    f.write_str(" }")
}

/// Name → type bindings with transitive resolution through [`Type::Var`].
#[derive(Debug, Clone, Default)]
pub struct TypeEnv<'a> {
    map: HashMap<&'a str, &'a Type<'a>>,
}

impl<'a> TypeEnv<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`. Re-binding with a structurally equal type is a
    /// no-op; re-binding with a different type fails.
    pub fn insert(&mut self, name: &'a str, ty: &'a Type<'a>) -> Result<()> {
        match self.map.get(name) {
            Some(existing) if struct_eq(existing, ty) => Ok(()),
            Some(_) => Err(Error::invalid(format!(
                "name `{name}` already bound to a different type"
            ))),
            None => {
                self.map.insert(name, ty);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Type<'a>> {
        self.map.get(name).copied()
    }

    /// Follows `Var` indirections until a concrete type is reached.
    /// Unbound names and `Var` cycles are invalid.
    pub fn trace(&self, ty: &'a Type<'a>) -> Result<&'a Type<'a>> {
        let mut current = ty;
        // A well-formed chain visits each binding at most once.
        for _ in 0..=self.map.len() {
            match current {
                Type::Var(name) => {
                    current = self.get(name).ok_or_else(|| {
                        Error::invalid(format!("unbound type name `{name}`"))
                    })?;
                }
                _ => return Ok(current),
            }
        }
        Err(Error::invalid("type name cycle"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
