//! Uncached dispatch. Runs a full lookup on every call; target failures
//! leave here wrapped in `RuntimeError::Invocation`.

use std::sync::Arc;

use super::null_site;
use super::shape;
use super::table::CallSiteTable;
use crate::error::{RuntimeError, RuntimeResult};
use crate::meta::{Lookup, MetaClass, MetaMethod, MetaProperty, find_category_method};
use crate::value::{Instance, TypeId, Value};

fn arg_types(args: &[Value]) -> Vec<String> {
    args.iter().map(Value::type_name).collect()
}

fn invoke(method: &MetaMethod, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
    let prepared = shape::coerce_args(method.params(), shape::unwrap_args(args));
    method
        .invoke(receiver, &prepared)
        .map_err(RuntimeError::transport)
}

fn static_receiver(metaclass: &MetaClass, method: &MetaMethod, receiver: &Value) -> Value {
    if method.is_static() {
        Value::Class(metaclass.type_id())
    } else {
        receiver.clone()
    }
}

pub(crate) fn call(
    table: &CallSiteTable,
    name: &str,
    receiver: &Value,
    args: &[Value],
    current: bool,
) -> RuntimeResult<Value> {
    if let Value::Class(type_id) = receiver {
        return call_static(table, name, *type_id, args);
    }
    table.runtime().stats().record_slow_path();
    if receiver.is_null() {
        return null_site::invoke_on_null(table, name, args);
    }
    if let Some(method) = find_category_method(receiver, name, args) {
        return invoke(&method, receiver, args);
    }
    let metaclass = table.runtime().registry().metaclass_of(receiver)?;
    let unwrapped = shape::unwrap_args(args);
    if let Some(hook) = metaclass.invoke_hook() {
        return hook(receiver, name, &unwrapped).map_err(RuntimeError::transport);
    }
    let lookup = if current {
        Lookup::current(table.owner(), metaclass.type_id())
    } else {
        Lookup::instance(table.owner())
    };
    let method = metaclass.pick_method(name, args, lookup).or_else(|| {
        current
            .then(|| metaclass.pick_method(name, args, lookup.as_statics()))
            .flatten()
    });
    if let Some(method) = method {
        let target = static_receiver(&metaclass, &method, receiver);
        return invoke(&method, &target, args);
    }
    method_missing(table, &metaclass, receiver, name, &unwrapped)
}

fn method_missing(
    table: &CallSiteTable,
    metaclass: &Arc<MetaClass>,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> RuntimeResult<Value> {
    let missing_args = [Value::string(name), Value::list(args.to_vec())];
    if let Some(handler) = metaclass.pick_method(
        "methodMissing",
        &missing_args,
        Lookup::instance(table.owner()),
    ) {
        return invoke(&handler, receiver, &missing_args);
    }
    Err(RuntimeError::MissingMethod {
        receiver: metaclass.name().to_string(),
        name: name.to_string(),
        arg_types: arg_types(args),
    })
}

pub(crate) fn call_static(
    table: &CallSiteTable,
    name: &str,
    receiver: TypeId,
    args: &[Value],
) -> RuntimeResult<Value> {
    table.runtime().stats().record_slow_path();
    let metaclass = table
        .runtime()
        .registry()
        .get(receiver)
        .ok_or(RuntimeError::UnknownType(receiver.0))?;
    match metaclass.pick_method(name, args, Lookup::statics(table.owner())) {
        Some(method) => invoke(&method, &Value::Class(receiver), args),
        None => Err(RuntimeError::MissingMethod {
            receiver: metaclass.name().to_string(),
            name: name.to_string(),
            arg_types: arg_types(&shape::unwrap_args(args)),
        }),
    }
}

/// Splits `args` into positional constructor arguments and a trailing
/// property map when the arguments have the bean shape.
pub(crate) fn bean_split(args: &[Value]) -> Option<(&[Value], &Value)> {
    match args.split_last() {
        Some((map @ Value::Map(_), positional)) if positional.len() <= 1 => Some((positional, map)),
        _ => None,
    }
}

pub(crate) fn call_constructor(
    table: &CallSiteTable,
    receiver: TypeId,
    args: &[Value],
) -> RuntimeResult<Value> {
    table.runtime().stats().record_slow_path();
    let metaclass = table
        .runtime()
        .registry()
        .get(receiver)
        .ok_or(RuntimeError::UnknownType(receiver.0))?;
    if let Some(constructor) = metaclass.pick_constructor(args) {
        return construct(&metaclass, &constructor, args);
    }
    if let Some((positional, properties)) = bean_split(args)
        && let Some(constructor) = metaclass.pick_constructor(positional)
    {
        let instance = construct(&metaclass, &constructor, positional)?;
        apply_properties(table, &instance, properties)?;
        return Ok(instance);
    }
    Err(RuntimeError::MissingConstructor {
        receiver: metaclass.name().to_string(),
        arg_types: arg_types(&shape::unwrap_args(args)),
    })
}

fn construct(metaclass: &Arc<MetaClass>, constructor: &MetaMethod, args: &[Value]) -> RuntimeResult<Value> {
    let prepared = shape::coerce_args(constructor.params(), shape::unwrap_args(args));
    constructor
        .construct(metaclass, &prepared)
        .map_err(RuntimeError::transport)
}

/// Assigns every map entry as a property of `target`.
pub(crate) fn apply_properties(
    table: &CallSiteTable,
    target: &Value,
    properties: &Value,
) -> RuntimeResult<()> {
    let Value::Map(entries) = properties else {
        return Err(RuntimeError::Coercion {
            expected: "Map".to_string(),
            found: properties.type_name(),
        });
    };
    for (name, value) in entries.iter() {
        set_property(table, target, name, value.clone())?;
    }
    Ok(())
}

pub(crate) fn set_property(
    table: &CallSiteTable,
    target: &Value,
    name: &str,
    value: Value,
) -> RuntimeResult<()> {
    let metaclass = table.runtime().registry().metaclass_of(target)?;
    match metaclass.setter(name, &value) {
        Some(MetaProperty::Field(field)) => {
            if let Value::Object(instance) = target
                && instance.set_field(&field, value)
            {
                return Ok(());
            }
            Err(missing_property(&metaclass, name))
        }
        Some(MetaProperty::Accessor(method)) => {
            invoke(&method, target, std::slice::from_ref(&value))?;
            Ok(())
        }
        _ => Err(missing_property(&metaclass, name)),
    }
}

fn missing_property(metaclass: &MetaClass, name: &str) -> RuntimeError {
    RuntimeError::MissingProperty {
        receiver: metaclass.name().to_string(),
        name: name.to_string(),
    }
}

pub(crate) fn read_field(instance: &Instance, name: &str) -> Value {
    instance.get_field(name).unwrap_or(Value::Null)
}

pub(crate) fn get_property(table: &CallSiteTable, name: &str, receiver: &Value) -> RuntimeResult<Value> {
    table.runtime().stats().record_slow_path();
    match receiver {
        Value::Null => null_site::property_on_null(table, name),
        Value::Map(_) => Ok(receiver.map_get(name).cloned().unwrap_or(Value::Null)),
        Value::Class(type_id) => {
            let metaclass = table
                .runtime()
                .registry()
                .get(*type_id)
                .ok_or(RuntimeError::UnknownType(type_id.0))?;
            match metaclass.static_property(name) {
                Some(MetaProperty::StaticField(field)) => {
                    Ok(metaclass.static_field(&field).unwrap_or(Value::Null))
                }
                Some(MetaProperty::Accessor(method)) => invoke(&method, receiver, &[]),
                _ => Err(missing_property(&metaclass, name)),
            }
        }
        _ => {
            let metaclass = table.runtime().registry().metaclass_of(receiver)?;
            match metaclass.property(name) {
                Some(MetaProperty::Field(field)) => match receiver {
                    Value::Object(instance) => Ok(read_field(instance, &field)),
                    _ => Err(missing_property(&metaclass, name)),
                },
                Some(MetaProperty::Accessor(method)) => invoke(&method, receiver, &[]),
                _ => property_missing(table, &metaclass, receiver, name),
            }
        }
    }
}

fn property_missing(
    table: &CallSiteTable,
    metaclass: &Arc<MetaClass>,
    receiver: &Value,
    name: &str,
) -> RuntimeResult<Value> {
    let missing_args = [Value::string(name)];
    if let Some(handler) = metaclass.pick_method(
        "propertyMissing",
        &missing_args,
        Lookup::instance(table.owner()),
    ) {
        return invoke(&handler, receiver, &missing_args);
    }
    Err(missing_property(metaclass, name))
}
