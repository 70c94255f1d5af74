//! Build-time evaluation of operator chips over literal operands.
//!
//! Folding keeps literal expressions literal, which is what lets a
//! `case 1 + 1:` key stay a valid switch key. Anything that would fail or
//! overflow at runtime is left to the chip.

use chipflow_core::{Literal, Value};

enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(literal: &Literal) -> Option<Number> {
        match literal {
            Literal::Int(v) => Some(Number::Int(*v)),
            Literal::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Number::Int(v) => *v as f64,
            Number::Float(v) => *v,
        }
    }

    fn into_literal(self) -> Literal {
        match self {
            Number::Int(v) => Literal::Int(v),
            Number::Float(v) => Literal::Float(v),
        }
    }
}

/// Evaluates chip `kind` when every argument is a literal. Returns `None`
/// when the chip must be spawned.
pub(super) fn fold(kind: &str, args: &[Value]) -> Option<Value> {
    if args.is_empty() {
        return None;
    }
    let literals = args
        .iter()
        .map(Value::literal)
        .collect::<Option<Vec<Literal>>>()?;
    fold_literals(kind, &literals).map(Value::from_literal)
}

fn fold_literals(kind: &str, args: &[Literal]) -> Option<Literal> {
    match (kind, args) {
        ("Not", [Literal::Bool(v)]) => Some(Literal::Bool(!v)),
        ("Negate", [Literal::Int(v)]) => v.checked_neg().map(Literal::Int),
        ("Negate", [Literal::Float(v)]) => Some(Literal::Float(-v)),
        ("And", _) => bools(args).map(|b| Literal::Bool(b.iter().all(|v| *v))),
        ("Or", _) => bools(args).map(|b| Literal::Bool(b.iter().any(|v| *v))),
        ("Equals", [first, rest @ ..]) if !rest.is_empty() => {
            let mut equal = true;
            for other in rest {
                equal &= literals_equal(first, other)?;
            }
            Some(Literal::Bool(equal))
        }
        ("GreaterThan", [a, b]) => compare(a, b).map(|o| Literal::Bool(o.is_gt())),
        ("LessThan", [a, b]) => compare(a, b).map(|o| Literal::Bool(o.is_lt())),
        ("GreaterOrEqual", [a, b]) => compare(a, b).map(|o| Literal::Bool(o.is_ge())),
        ("LessOrEqual", [a, b]) => compare(a, b).map(|o| Literal::Bool(o.is_le())),
        ("Add" | "Subtract" | "Multiply" | "Divide" | "Modulo" | "Min" | "Max", [first, rest @ ..]) => {
            let mut acc = Number::of(first)?;
            for next in rest {
                acc = arithmetic(kind, acc, Number::of(next)?)?;
            }
            Some(acc.into_literal())
        }
        ("StringConcat", _) => Some(Literal::String(
            args.iter().map(|l| l.to_string()).collect(),
        )),
        ("BitShiftLeft", [Literal::Int(v), Literal::Int(by)]) => {
            Some(Literal::Int(v.wrapping_shl((*by & 63) as u32)))
        }
        ("BitShiftRight", [Literal::Int(v), Literal::Int(by)]) => {
            Some(Literal::Int(v.wrapping_shr((*by & 63) as u32)))
        }
        _ => None,
    }
}

fn bools(args: &[Literal]) -> Option<Vec<bool>> {
    args.iter()
        .map(|l| match l {
            Literal::Bool(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn literals_equal(a: &Literal, b: &Literal) -> Option<bool> {
    match (Number::of(a), Number::of(b)) {
        (Some(Number::Int(x)), Some(Number::Int(y))) => Some(x == y),
        (Some(x), Some(y)) => Some(x.as_f64() == y.as_f64()),
        (None, None) if a.kind() == b.kind() => Some(a == b),
        _ => None,
    }
}

fn compare(a: &Literal, b: &Literal) -> Option<std::cmp::Ordering> {
    match (Number::of(a)?, Number::of(b)?) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

fn arithmetic(kind: &str, a: Number, b: Number) -> Option<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let v = match kind {
                "Add" => x.checked_add(y)?,
                "Subtract" => x.checked_sub(y)?,
                "Multiply" => x.checked_mul(y)?,
                "Divide" => x.checked_div(y)?,
                "Modulo" => x.checked_rem(y)?,
                "Min" => x.min(y),
                "Max" => x.max(y),
                _ => return None,
            };
            Some(Number::Int(v))
        }
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let v = match kind {
                "Add" => x + y,
                "Subtract" => x - y,
                "Multiply" => x * y,
                "Divide" if y != 0.0 => x / y,
                "Modulo" if y != 0.0 => x % y,
                "Min" => x.min(y),
                "Max" => x.max(y),
                _ => return None,
            };
            Some(Number::Float(v))
        }
    }
}
