use std::borrow::Cow;

use smallvec::SmallVec;

use crate::meta::{MetaMethod, ParamType, directly_assignable};
use crate::value::{TypeId, Value};

/// Concrete type of one argument as seen by a cache check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ShapeKey {
    type_id: TypeId,
    wrapped: bool,
}

impl ShapeKey {
    fn of(arg: &Value) -> Self {
        match arg {
            Value::Wrapper(wrapper) => Self {
                type_id: wrapper.declared,
                wrapped: true,
            },
            other => Self {
                type_id: other.type_id(),
                wrapped: false,
            },
        }
    }
}

/// Argument types captured at specialization time. A cached target is
/// only valid for argument lists with exactly these types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ArgShape(SmallVec<[ShapeKey; 4]>);

impl ArgShape {
    pub(crate) fn capture(args: &[Value]) -> Self {
        Self(args.iter().map(ShapeKey::of).collect())
    }

    pub(crate) fn matches(&self, args: &[Value]) -> bool {
        self.0.len() == args.len()
            && self
                .0
                .iter()
                .zip(args)
                .all(|(key, arg)| *key == ShapeKey::of(arg))
    }
}

/// How much argument preparation a cached target may skip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvokeTier {
    NoUnwrapNoCoerce,
    NoUnwrap,
    Baseline,
}

pub(crate) fn no_wrappers(args: &[Value]) -> bool {
    !args.iter().any(|arg| matches!(arg, Value::Wrapper(_)))
}

pub(crate) fn no_coerce(params: &[ParamType], args: &[Value]) -> bool {
    params
        .iter()
        .zip(args)
        .all(|(param, arg)| directly_assignable(*param, arg))
}

pub(crate) fn select_tier(method: &MetaMethod, args: &[Value]) -> InvokeTier {
    if !no_wrappers(args) {
        return InvokeTier::Baseline;
    }
    if no_coerce(method.params(), args) {
        InvokeTier::NoUnwrapNoCoerce
    } else {
        InvokeTier::NoUnwrap
    }
}

pub(crate) fn unwrap_args(args: &[Value]) -> Cow<'_, [Value]> {
    if no_wrappers(args) {
        return Cow::Borrowed(args);
    }
    Cow::Owned(
        args.iter()
            .map(|arg| match arg {
                Value::Wrapper(wrapper) => wrapper.value.clone(),
                other => other.clone(),
            })
            .collect(),
    )
}

fn coerce(param: ParamType, arg: &Value) -> Option<Value> {
    match (param, arg) {
        (ParamType::Exact(TypeId::FLOAT), Value::Int(value)) => Some(Value::Float(*value as f64)),
        _ => None,
    }
}

pub(crate) fn coerce_args<'a>(params: &[ParamType], args: Cow<'a, [Value]>) -> Cow<'a, [Value]> {
    let needs = params
        .iter()
        .zip(args.iter())
        .any(|(param, arg)| coerce(*param, arg).is_some());
    if !needs {
        return args;
    }
    Cow::Owned(
        params
            .iter()
            .zip(args.iter())
            .map(|(param, arg)| coerce(*param, arg).unwrap_or_else(|| arg.clone()))
            .collect(),
    )
}

/// Shapes `args` for `method`, skipping the steps `tier` proves unneeded.
pub(crate) fn prepare<'a>(method: &MetaMethod, args: &'a [Value], tier: InvokeTier) -> Cow<'a, [Value]> {
    match tier {
        InvokeTier::NoUnwrapNoCoerce => Cow::Borrowed(args),
        InvokeTier::NoUnwrap => coerce_args(method.params(), Cow::Borrowed(args)),
        InvokeTier::Baseline => coerce_args(method.params(), unwrap_args(args)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(params: &[ParamType]) -> MetaMethod {
        MetaMethod::native("m", params, |_, _| Ok(Value::Null))
    }

    #[test]
    fn shape_distinguishes_wrapped_arguments() {
        let shape = ArgShape::capture(&[Value::Int(1)]);
        assert!(shape.matches(&[Value::Int(7)]));
        assert!(!shape.matches(&[Value::string("7")]));
        assert!(!shape.matches(&[Value::wrap(Value::Int(7), TypeId::INT)]));
        assert!(!shape.matches(&[]));
    }

    #[test]
    fn tiers_follow_argument_facts() {
        let float = method(&[ParamType::FLOAT]);
        assert_eq!(
            select_tier(&float, &[Value::Float(1.0)]),
            InvokeTier::NoUnwrapNoCoerce
        );
        assert_eq!(select_tier(&float, &[Value::Int(1)]), InvokeTier::NoUnwrap);
        assert_eq!(
            select_tier(&float, &[Value::wrap(Value::Float(1.0), TypeId::FLOAT)]),
            InvokeTier::Baseline
        );
    }

    #[test]
    fn baseline_unwraps_then_coerces() {
        let float = method(&[ParamType::FLOAT]);
        let args = [Value::wrap(Value::Int(2), TypeId::FLOAT)];
        let prepared = prepare(&float, &args, InvokeTier::Baseline);
        assert_eq!(prepared.as_ref(), &[Value::Float(2.0)]);
    }
}
