use crate::{
    ir::{BAD_VALUE, Builtin},
    value::{Value, canonical_cmp_optional},
};
use std::cmp::Ordering;
use thiserror::Error as ThisError;

/// Field holding the capacity of an N-accumulator state object.
pub(crate) const ACCUMULATOR_N_LIMIT: &str = "n";
/// Field holding the retained items of an N-accumulator state object.
pub(crate) const ACCUMULATOR_N_ITEMS: &str = "items";

///
/// EvalError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum EvalError {
    #[error("{message}")]
    Fail { code: u32, message: String },

    #[error("{func} cannot be applied to {detail}")]
    TypeMismatch { func: &'static str, detail: String },

    #[error("{func} expects {expected} arguments, found {found}")]
    Arity {
        func: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{func} operates on blocks and has no scalar evaluation")]
    BlockOperand { func: &'static str },
}

/// Evaluate a scalar builtin over already-evaluated arguments.
///
/// `None` arguments and results stand for the absent value.
pub fn eval_builtin(func: Builtin, args: &[Option<Value>]) -> Result<Option<Value>, EvalError> {
    match func {
        Builtin::FillEmpty => {
            let [value, default] = fixed::<2>(func, args)?;
            Ok(value.clone().or_else(|| default.clone()))
        }
        Builtin::IfNull => {
            let [value, default] = fixed::<2>(func, args)?;
            match value {
                Some(value) if !value.is_null() => Ok(Some(value.clone())),
                _ => Ok(default.clone()),
            }
        }
        Builtin::GetField => {
            let [object, name] = fixed::<2>(func, args)?;
            let Some(Value::Text(name)) = name else {
                return Err(mismatch(func, "a non-string field name"));
            };
            Ok(object.as_ref().and_then(|object| object.get_field(name)).cloned())
        }
        Builtin::NewObj | Builtin::NewBsonObj => new_object(func, args).map(Some),
        Builtin::NewArray => Ok(Some(Value::Array(
            args.iter()
                .map(|item| item.clone().unwrap_or(Value::Null))
                .collect(),
        ))),
        Builtin::IsObject => type_test(func, args, Value::is_object),
        Builtin::IsArray => type_test(func, args, Value::is_array),
        Builtin::IsNumber => type_test(func, args, Value::is_numeric),
        Builtin::Add | Builtin::Subtract | Builtin::Multiply | Builtin::Divide => {
            arithmetic(func, args)
        }
        Builtin::Eq | Builtin::Ne | Builtin::Gt | Builtin::Gte | Builtin::Lt | Builtin::Lte => {
            let [left, right] = fixed::<2>(func, args)?;
            let ord = canonical_cmp_optional(left.as_ref(), right.as_ref());
            let result = match func {
                Builtin::Eq => ord == Ordering::Equal,
                Builtin::Ne => ord != Ordering::Equal,
                Builtin::Gt => ord == Ordering::Greater,
                Builtin::Gte => ord != Ordering::Less,
                Builtin::Lt => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            };
            Ok(Some(Value::Bool(result)))
        }
        Builtin::And => Ok(Some(Value::Bool(args.iter().all(|arg| truthy(arg.as_ref()))))),
        Builtin::Or => Ok(Some(Value::Bool(args.iter().any(|arg| truthy(arg.as_ref()))))),
        Builtin::Not => {
            let [value] = fixed::<1>(func, args)?;
            Ok(Some(Value::Bool(!truthy(value.as_ref()))))
        }
        Builtin::Concat => concat(func, args),
        Builtin::AtMostOneArray => {
            let arrays = args
                .iter()
                .filter(|arg| arg.as_ref().is_some_and(Value::is_array))
                .count();
            Ok(Some(Value::Bool(arrays <= 1)))
        }
        Builtin::GenerateSortKey => {
            let [root, spec] = fixed::<2>(func, args)?;
            let Some(Value::Object(parts)) = spec else {
                return Err(mismatch(func, "a non-object sort specification"));
            };
            let keys = parts
                .iter()
                .map(|(path, _)| {
                    root.as_ref()
                        .and_then(|root| root.get_path(path))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect();
            Ok(Some(Value::Array(keys)))
        }
        Builtin::SortKeyComponentVectorToArray => {
            let [keys] = fixed::<1>(func, args)?;
            match keys {
                Some(Value::Array(items)) if items.len() == 1 => Ok(Some(items[0].clone())),
                other => Ok(other.clone()),
            }
        }
        Builtin::NewAccumulatorNState => {
            let [limit, _is_group_accum] = fixed::<2>(func, args)?;
            match limit {
                Some(Value::Int(limit)) if *limit > 0 => Ok(Some(Value::object([
                    (ACCUMULATOR_N_LIMIT, Value::Int(*limit)),
                    (ACCUMULATOR_N_ITEMS, Value::Array(Vec::new())),
                ]))),
                _ => Err(EvalError::Fail {
                    code: BAD_VALUE,
                    message: "'n' must be a positive integer".to_string(),
                }),
            }
        }
        Builtin::AccumulatorNFinalize => {
            let [state] = fixed::<1>(func, args)?;
            Ok(accumulator_n_items(state.as_ref()).map(|items| Value::Array(items.to_vec())))
        }
        Builtin::TopBottomNFinalize | Builtin::TopBottomFinalize => {
            let [state, _spec] = fixed::<2>(func, args)?;
            let values: Vec<Value> = accumulator_n_items(state.as_ref())
                .unwrap_or_default()
                .iter()
                .filter_map(|pair| pair.as_array().and_then(|pair| pair.get(1)).cloned())
                .collect();
            if func == Builtin::TopBottomFinalize {
                Ok(Some(values.into_iter().next().unwrap_or(Value::Null)))
            } else {
                Ok(Some(Value::Array(values)))
            }
        }
        _ => Err(EvalError::BlockOperand { func: func.name() }),
    }
}

/// Items retained by an N-accumulator state object.
pub(crate) fn accumulator_n_items(state: Option<&Value>) -> Option<&[Value]> {
    state?
        .get_field(ACCUMULATOR_N_ITEMS)
        .and_then(Value::as_array)
}

fn fixed<'a, const N: usize>(
    func: Builtin,
    args: &'a [Option<Value>],
) -> Result<&'a [Option<Value>; N], EvalError> {
    args.try_into().map_err(|_| EvalError::Arity {
        func: func.name(),
        expected: N,
        found: args.len(),
    })
}

fn mismatch(func: Builtin, detail: impl Into<String>) -> EvalError {
    EvalError::TypeMismatch {
        func: func.name(),
        detail: detail.into(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_truthy)
}

fn type_test(
    func: Builtin,
    args: &[Option<Value>],
    test: fn(&Value) -> bool,
) -> Result<Option<Value>, EvalError> {
    let [value] = fixed::<1>(func, args)?;
    Ok(Some(Value::Bool(value.as_ref().is_some_and(test))))
}

// Absent field values materialize as null inside constructed objects.
fn new_object(func: Builtin, args: &[Option<Value>]) -> Result<Value, EvalError> {
    if args.len() % 2 != 0 {
        return Err(mismatch(func, "an odd number of name/value operands"));
    }

    let mut fields = Vec::with_capacity(args.len() / 2);
    for pair in args.chunks_exact(2) {
        let Some(Value::Text(name)) = &pair[0] else {
            return Err(mismatch(func, "a non-string field name"));
        };
        fields.push((name.clone(), pair[1].clone().unwrap_or(Value::Null)));
    }

    Ok(Value::Object(fields))
}

fn arithmetic(func: Builtin, args: &[Option<Value>]) -> Result<Option<Value>, EvalError> {
    let [left, right] = fixed::<2>(func, args)?;
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(Some(Value::Null));
    };
    if left.is_null() || right.is_null() {
        return Ok(Some(Value::Null));
    }

    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let exact = match func {
            Builtin::Add => a.checked_add(*b),
            Builtin::Subtract => a.checked_sub(*b),
            Builtin::Multiply => a.checked_mul(*b),
            _ => None,
        };
        if let Some(exact) = exact {
            return Ok(Some(Value::Int(exact)));
        }
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(mismatch(func, format!("{left} and {right}")));
    };
    let result = match func {
        Builtin::Add => a + b,
        Builtin::Subtract => a - b,
        Builtin::Multiply => a * b,
        _ => {
            if b == 0.0 {
                return Err(EvalError::Fail {
                    code: BAD_VALUE,
                    message: "can't divide by zero".to_string(),
                });
            }
            a / b
        }
    };

    Ok(Some(Value::Double(result)))
}

fn concat(func: Builtin, args: &[Option<Value>]) -> Result<Option<Value>, EvalError> {
    let mut out = String::new();
    for arg in args {
        match arg {
            None | Some(Value::Null) => return Ok(Some(Value::Null)),
            Some(Value::Text(text)) => out.push_str(text),
            Some(other) => return Err(mismatch(func, format!("{other}"))),
        }
    }

    Ok(Some(Value::Text(out)))
}
