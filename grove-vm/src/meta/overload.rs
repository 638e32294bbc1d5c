use std::sync::Arc;

use super::metaclass::{MetaMethod, ParamType};
use crate::value::{TypeId, Value};

const COERCE_DISTANCE: u32 = 4;
const NULL_DISTANCE: u32 = 8;
const OBJECT_DISTANCE: u32 = 16;

/// Type an argument is matched on. Wrappers count as their declared type.
fn effective(arg: &Value) -> (TypeId, &Value) {
    match arg {
        Value::Wrapper(wrapper) => (wrapper.declared, &wrapper.value),
        other => (other.type_id(), other),
    }
}

fn coercible(target: TypeId, from: TypeId) -> bool {
    target == TypeId::FLOAT && from == TypeId::INT
}

/// Cost of passing `arg` to a parameter of type `param`, `None` when the
/// argument is not applicable at all.
pub fn param_distance(param: ParamType, arg: &Value) -> Option<u32> {
    let target = match param {
        ParamType::Any => return Some(OBJECT_DISTANCE),
        ParamType::Exact(TypeId::OBJECT) => return Some(OBJECT_DISTANCE),
        ParamType::Exact(target) => target,
    };
    let (ty, value) = effective(arg);
    if ty == target {
        return Some(0);
    }
    if ty == TypeId::NULL {
        return Some(NULL_DISTANCE);
    }
    if let Value::Object(instance) = value
        && let Some(depth) = instance.metaclass().depth_to(target)
    {
        return Some(depth);
    }
    if coercible(target, ty) {
        return Some(COERCE_DISTANCE);
    }
    None
}

/// True when `arg` can be handed to `param` untouched: same type, subtype,
/// null, or an untyped parameter.
pub fn directly_assignable(param: ParamType, arg: &Value) -> bool {
    let target = match param {
        ParamType::Any | ParamType::Exact(TypeId::OBJECT) => {
            return !matches!(arg, Value::Wrapper(_));
        }
        ParamType::Exact(target) => target,
    };
    match arg {
        Value::Wrapper(_) => false,
        Value::Null => true,
        Value::Object(instance) => instance.metaclass().is_subtype_of(target),
        other => other.type_id() == target,
    }
}

fn rank(method: &MetaMethod, args: &[Value]) -> Option<u32> {
    if method.arity() != args.len() {
        return None;
    }
    method
        .params()
        .iter()
        .zip(args)
        .try_fold(0u32, |total, (param, arg)| {
            param_distance(*param, arg).map(|distance| total + distance)
        })
}

/// Lowest total distance wins; ties keep the earliest candidate.
pub(crate) fn pick<'a>(
    candidates: impl Iterator<Item = &'a Arc<MetaMethod>>,
    args: &[Value],
) -> Option<Arc<MetaMethod>> {
    let mut best: Option<(u32, &Arc<MetaMethod>)> = None;
    for candidate in candidates {
        let Some(score) = rank(candidate, args) else {
            continue;
        };
        if best.is_none_or(|(best_score, _)| score < best_score) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, method)| method.clone())
}
