use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{Type, TypeEnv};

/// How a failed opt coercion surfaces.
///
/// Under `Silence` and `Warning` the failure is soft: the subtype
/// judgment reports [`SubtypeResult::OptSpecial`] and coercion produces
/// an absent option. Under `Error` it is a hard invalid-argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptReport {
    #[default]
    Silence,
    Warning,
    Error,
}

/// Outcome of a successful subtype check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtypeResult {
    Ok,
    /// The judgment only holds by the special opt rule; callers that
    /// audit coercions can tell this apart from a plain success.
    OptSpecial,
}

impl SubtypeResult {
    fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Ok, Self::Ok) => Self::Ok,
            _ => Self::OptSpecial,
        }
    }
}

/// Coinductive subtype checker.
///
/// The pair cache Γ persists across checks so repeated judgments over
/// the same recursive types short-circuit. Pairs are inserted when a
/// `Var` is unfolded; finding the pair already present is the
/// coinductive hypothesis. A failed unfolding removes its pair so later
/// independent checks are not contaminated.
#[derive(Debug, Default)]
pub struct Checker {
    cache: HashSet<(usize, usize)>,
}

impl Checker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Judges `t1 <: t2` under `env`.
    pub fn check<'a>(
        &mut self,
        env: &TypeEnv<'a>,
        t1: &'a Type<'a>,
        t2: &'a Type<'a>,
        report: OptReport,
    ) -> Result<SubtypeResult> {
        self.go(env, t1, t2, report)
    }

    fn go<'a>(
        &mut self,
        env: &TypeEnv<'a>,
        t1: &'a Type<'a>,
        t2: &'a Type<'a>,
        report: OptReport,
    ) -> Result<SubtypeResult> {
        if std::ptr::eq(t1, t2) {
            return Ok(SubtypeResult::Ok);
        }
        if let (Type::Var(a), Type::Var(b)) = (*t1, *t2) {
            if a == b {
                return Ok(SubtypeResult::Ok);
            }
        }
        if matches!(t1, Type::Var(_)) || matches!(t2, Type::Var(_)) {
            let pair = (
                t1 as *const Type<'a> as usize,
                t2 as *const Type<'a> as usize,
            );
            if !self.cache.insert(pair) {
                return Ok(SubtypeResult::Ok);
            }
            let result = match (env.trace(t1), env.trace(t2)) {
                (Ok(r1), Ok(r2)) => self.go(env, r1, r2, report),
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            if result.is_err() {
                self.cache.remove(&pair);
            }
            return result;
        }
        self.concrete(env, t1, t2, report)
    }

    fn concrete<'a>(
        &mut self,
        env: &TypeEnv<'a>,
        t1: &'a Type<'a>,
        t2: &'a Type<'a>,
        report: OptReport,
    ) -> Result<SubtypeResult> {
        use SubtypeResult::Ok as Yes;
        match (*t1, *t2) {
            (_, Type::Reserved) => Ok(Yes),
            (Type::Empty, _) => Ok(Yes),
            (a, b) if a.is_primitive() && a.opcode() == b.opcode() => Ok(Yes),
            (Type::Nat, Type::Int) => Ok(Yes),
            (Type::Vec(a), Type::Vec(b)) => self.go(env, a, b, report),
            (_, Type::Opt(inner2)) => self.against_opt(env, t1, inner2, report),
            (Type::Record(fields1), Type::Record(fields2)) => {
                let mut result = Yes;
                for expected in fields2 {
                    match find_field(fields1, expected.label.id()) {
                        Some(actual) => {
                            result = result.join(self.go(env, actual.ty, expected.ty, report)?);
                        }
                        None if env.trace(expected.ty)?.is_optional_like() => {}
                        None => {
                            return Err(Error::invalid(format!(
                                "record is missing required field {}",
                                expected.label
                            )));
                        }
                    }
                }
                Ok(result)
            }
            (Type::Variant(cases1), Type::Variant(cases2)) => {
                let mut result = Yes;
                for case in cases1 {
                    let expected = find_field(cases2, case.label.id()).ok_or_else(|| {
                        Error::invalid(format!("variant case {} is not expected", case.label))
                    })?;
                    result = result.join(self.go(env, case.ty, expected.ty, report)?);
                }
                Ok(result)
            }
            (Type::Func(f1), Type::Func(f2)) => {
                if f1.args.len() != f2.args.len()
                    || f1.rets.len() != f2.rets.len()
                    || f1.mode != f2.mode
                {
                    return Err(Error::invalid("func signatures do not line up"));
                }
                let mut result = Yes;
                for (&a1, &a2) in f1.args.iter().zip(f2.args.iter()) {
                    result = result.join(self.go(env, a2, a1, report)?);
                }
                for (&r1, &r2) in f1.rets.iter().zip(f2.rets.iter()) {
                    result = result.join(self.go(env, r1, r2, report)?);
                }
                Ok(result)
            }
            (Type::Service(methods1), Type::Service(methods2)) => {
                let mut result = Yes;
                for expected in methods2 {
                    let actual = methods1
                        .binary_search_by(|m| m.name.cmp(expected.name))
                        .map(|i| &methods1[i])
                        .map_err(|_| {
                            Error::invalid(format!(
                                "service is missing method `{}`",
                                expected.name
                            ))
                        })?;
                    result = result.join(self.go(env, actual.ty, expected.ty, report)?);
                }
                Ok(result)
            }
            _ => Err(Error::invalid("types are not in the subtype relation")),
        }
    }

    /// The opt ladder for `t1 <: opt inner2`, ending in the special opt
    /// rule when nothing structural applies.
    fn against_opt<'a>(
        &mut self,
        env: &TypeEnv<'a>,
        t1: &'a Type<'a>,
        inner2: &'a Type<'a>,
        report: OptReport,
    ) -> Result<SubtypeResult> {
        match *t1 {
            Type::Null => Ok(SubtypeResult::Ok),
            Type::Opt(inner1) => match self.go(env, inner1, inner2, report) {
                Ok(result) => Ok(result),
                Err(_) => special_opt(report),
            },
            _ => {
                if !env.trace(inner2)?.is_optional_like() {
                    if let Ok(result) = self.go(env, t1, inner2, report) {
                        return Ok(result);
                    }
                }
                special_opt(report)
            }
        }
    }
}

fn find_field<'f, 'a>(
    fields: &'f [crate::types::Field<'a>],
    id: u32,
) -> Option<&'f crate::types::Field<'a>> {
    fields
        .binary_search_by_key(&id, |f| f.label.id())
        .ok()
        .map(|i| &fields[i])
}

fn special_opt(report: OptReport) -> Result<SubtypeResult> {
    match report {
        OptReport::Error => Err(Error::invalid(
            "types only relate through the special opt rule",
        )),
        OptReport::Warning => {
            tracing::warn!("opt coercion will produce an absent value (special opt rule)");
            Ok(SubtypeResult::OptSpecial)
        }
        OptReport::Silence => Ok(SubtypeResult::OptSpecial),
    }
}

/// One-shot judgment with a fresh cache.
pub fn subtype<'a>(
    env: &TypeEnv<'a>,
    t1: &'a Type<'a>,
    t2: &'a Type<'a>,
    report: OptReport,
) -> Result<SubtypeResult> {
    Checker::new().check(env, t1, t2, report)
}
