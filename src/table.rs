use std::collections::HashMap;

use crate::bytes::Output;
use crate::error::{Error, Result};
use crate::leb128;
use crate::types::{struct_eq, Type, TypeEnv};

/// Accumulates every composite type referenced by a message's arguments,
/// assigns table indices, and serializes the wire form of the type table.
///
/// Registration is depth-first: constituents first, then the entry's own
/// slot. The slot is reserved before the body is emitted so that cyclic
/// references through `Var` resolve to the index already being built.
/// Structurally equal composites share one entry.
#[derive(Default)]
pub struct TypeTable<'a> {
    entries: Vec<Entry<'a>>,
    /// Node address → slot, so repeated registration is O(1).
    index_of: HashMap<usize, i64>,
}

struct Entry<'a> {
    ty: &'a Type<'a>,
    body: Vec<u8>,
}

impl<'a> TypeTable<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers `ty` and every composite it references, returning its
    /// type reference: the (negative) opcode for primitives, the table
    /// index for composites and resolved `Var`s.
    pub fn register(&mut self, env: &TypeEnv<'a>, ty: &'a Type<'a>) -> Result<i64> {
        match *ty {
            Type::Var(name) => {
                let target = env
                    .get(name)
                    .ok_or_else(|| Error::invalid(format!("unregistered type name `{name}`")))?;
                self.register(env, target)
            }
            _ => match ty.opcode() {
                Some(op) if op.is_primitive() => Ok(i64::from(i8::from(op))),
                _ => self.register_composite(env, ty),
            },
        }
    }

    fn register_composite(&mut self, env: &TypeEnv<'a>, ty: &'a Type<'a>) -> Result<i64> {
        let key = ty as *const Type<'a> as usize;
        if let Some(&index) = self.index_of.get(&key) {
            return Ok(index);
        }
        // Merge with a structurally equal entry, including one whose
        // body is still being emitted further up the stack.
        for (i, entry) in self.entries.iter().enumerate() {
            if struct_eq(entry.ty, ty) {
                let index = i as i64;
                self.index_of.insert(key, index);
                return Ok(index);
            }
        }
        let index = self.entries.len() as i64;
        self.entries.push(Entry {
            ty,
            body: Vec::new(),
        });
        self.index_of.insert(key, index);
        let body = self.build_body(env, ty)?;
        self.entries[index as usize].body = body;
        Ok(index)
    }

    fn build_body(&mut self, env: &TypeEnv<'a>, ty: &'a Type<'a>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let opcode = ty.opcode().expect("composite entries have an opcode");
        leb128::sleb128_encode(i64::from(i8::from(opcode)), &mut out);
        match *ty {
            Type::Opt(inner) | Type::Vec(inner) => {
                let reference = self.register(env, inner)?;
                leb128::sleb128_encode(reference, &mut out);
            }
            Type::Record(fields) | Type::Variant(fields) => {
                ensure_ascending_ids(fields.iter().map(|f| f.label.id()))?;
                leb128::uleb128_encode(fields.len() as u64, &mut out);
                for field in fields {
                    let reference = self.register(env, field.ty)?;
                    leb128::uleb128_encode(u64::from(field.label.id()), &mut out);
                    leb128::sleb128_encode(reference, &mut out);
                }
            }
            Type::Func(func) => {
                let arg_refs: Vec<i64> = func
                    .args
                    .iter()
                    .map(|&arg| self.register(env, arg))
                    .collect::<Result<_>>()?;
                let ret_refs: Vec<i64> = func
                    .rets
                    .iter()
                    .map(|&ret| self.register(env, ret))
                    .collect::<Result<_>>()?;
                leb128::uleb128_encode(arg_refs.len() as u64, &mut out);
                for reference in arg_refs {
                    leb128::sleb128_encode(reference, &mut out);
                }
                leb128::uleb128_encode(ret_refs.len() as u64, &mut out);
                for reference in ret_refs {
                    leb128::sleb128_encode(reference, &mut out);
                }
                match func.mode {
                    None => {
                        leb128::uleb128_encode(0, &mut out);
                    }
                    Some(mode) => {
                        leb128::uleb128_encode(1, &mut out);
                        out.push(u8::from(mode));
                    }
                }
            }
            Type::Service(methods) => {
                ensure_ascending_names(methods.iter().map(|m| m.name))?;
                leb128::uleb128_encode(methods.len() as u64, &mut out);
                for method in methods {
                    if !matches!(env.trace(method.ty)?, Type::Func(_)) {
                        return Err(Error::invalid(format!(
                            "service method `{}` is not a func",
                            method.name
                        )));
                    }
                    let reference = self.register(env, method.ty)?;
                    leb128::uleb128_encode(method.name.len() as u64, &mut out);
                    out.write(method.name.as_bytes());
                    leb128::sleb128_encode(reference, &mut out);
                }
            }
            _ => unreachable!("primitives and vars are not table entries"),
        }
        Ok(out)
    }

    /// Emits the type table followed by the argument reference sequence.
    pub fn serialize<O: Output + ?Sized>(&self, args: &[i64], out: &mut O) -> Result<()> {
        leb128::uleb128_encode(self.entries.len() as u64, out);
        for entry in &self.entries {
            if entry.body.is_empty() {
                return Err(Error::invalid("type table entry was never completed"));
            }
            out.write(&entry.body);
        }
        leb128::uleb128_encode(args.len() as u64, out);
        for &reference in args {
            leb128::sleb128_encode(reference, out);
        }
        Ok(())
    }
}

fn ensure_ascending_ids(ids: impl Iterator<Item = u32>) -> Result<()> {
    let mut prev: Option<u32> = None;
    for id in ids {
        if prev.is_some_and(|p| p >= id) {
            return Err(Error::invalid(format!(
                "field id {id} duplicates or reorders its predecessor"
            )));
        }
        prev = Some(id);
    }
    Ok(())
}

fn ensure_ascending_names<'n>(names: impl Iterator<Item = &'n str>) -> Result<()> {
    let mut prev: Option<&str> = None;
    for name in names {
        if prev.is_some_and(|p| p >= name) {
            return Err(Error::invalid(format!(
                "method name `{name}` duplicates or reorders its predecessor"
            )));
        }
        prev = Some(name);
    }
    Ok(())
}
