use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::error::{RuntimeError, RuntimeResult};
use crate::meta::{ClassBuilder, MetaClass, MetaKind, ParamType};
use crate::value::{TypeId, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum BuiltinType {
    Object = 0,
    NullObject = 1,
    Bool = 2,
    Int = 3,
    Float = 4,
    String = 5,
    List = 6,
    Map = 7,
    Class = 8,
    Wrapper = 9,
}

impl BuiltinType {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BuiltinType::Object => "Object",
            BuiltinType::NullObject => "NullObject",
            BuiltinType::Bool => "Boolean",
            BuiltinType::Int => "Integer",
            BuiltinType::Float => "Double",
            BuiltinType::String => "String",
            BuiltinType::List => "List",
            BuiltinType::Map => "Map",
            BuiltinType::Class => "Class",
            BuiltinType::Wrapper => "Wrapper",
        }
    }

    pub(crate) fn type_id(self) -> TypeId {
        TypeId(self as u32)
    }

    pub(crate) fn from_type_id(type_id: TypeId) -> Option<Self> {
        match type_id.0 {
            0 => Some(BuiltinType::Object),
            1 => Some(BuiltinType::NullObject),
            2 => Some(BuiltinType::Bool),
            3 => Some(BuiltinType::Int),
            4 => Some(BuiltinType::Float),
            5 => Some(BuiltinType::String),
            6 => Some(BuiltinType::List),
            7 => Some(BuiltinType::Map),
            8 => Some(BuiltinType::Class),
            9 => Some(BuiltinType::Wrapper),
            _ => None,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "Object" => Some(BuiltinType::Object),
            "NullObject" => Some(BuiltinType::NullObject),
            "Boolean" => Some(BuiltinType::Bool),
            "Integer" => Some(BuiltinType::Int),
            "Double" => Some(BuiltinType::Float),
            "String" => Some(BuiltinType::String),
            "List" => Some(BuiltinType::List),
            "Map" => Some(BuiltinType::Map),
            "Class" => Some(BuiltinType::Class),
            "Wrapper" => Some(BuiltinType::Wrapper),
            _ => None,
        }
    }
}

pub(crate) fn builtin_by_name(name: &str) -> Option<TypeId> {
    BuiltinType::from_name(name).map(BuiltinType::type_id)
}

/// Builds the detached metaclass for a builtin type. The registry owns the
/// result once inserted.
pub(crate) fn build_metaclass(
    type_id: TypeId,
    parent: Option<Arc<MetaClass>>,
) -> Option<Arc<MetaClass>> {
    let builtin = BuiltinType::from_type_id(type_id)?;
    let kind = match builtin {
        BuiltinType::NullObject => MetaKind::NullObject,
        _ => MetaKind::Builtin,
    };
    let builder = ClassBuilder::new(None, type_id, builtin.name(), kind, parent);
    let builder = match builtin {
        BuiltinType::Object => object_methods(builder),
        BuiltinType::NullObject => null_methods(builder),
        BuiltinType::Bool => bool_methods(builder),
        BuiltinType::Int => int_methods(builder),
        BuiltinType::Float => float_methods(builder),
        BuiltinType::String => string_methods(builder),
        BuiltinType::List => list_methods(builder),
        BuiltinType::Map => map_methods(builder),
        BuiltinType::Class | BuiltinType::Wrapper => builder,
    };
    Some(builder.build())
}

pub(crate) fn object_metaclass() -> Arc<MetaClass> {
    object_methods(ClassBuilder::new(
        None,
        TypeId::OBJECT,
        BuiltinType::Object.name(),
        MetaKind::Builtin,
        None,
    ))
    .build()
}

pub(crate) fn null_metaclass() -> Arc<MetaClass> {
    null_methods(ClassBuilder::new(
        None,
        TypeId::NULL,
        BuiltinType::NullObject.name(),
        MetaKind::NullObject,
        None,
    ))
    .build()
}

pub(crate) fn arithmetic_error(message: &str) -> RuntimeError {
    RuntimeError::thrown("ArithmeticException", message)
}

fn mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::Coercion {
        expected: expected.to_string(),
        found: found.type_name(),
    }
}

fn int(value: &Value) -> RuntimeResult<i64> {
    value.as_int().ok_or_else(|| mismatch("Integer", value))
}

fn float(value: &Value) -> RuntimeResult<f64> {
    match value {
        Value::Float(value) => Ok(*value),
        Value::Int(value) => Ok(*value as f64),
        other => Err(mismatch("Double", other)),
    }
}

fn text(value: &Value) -> RuntimeResult<&str> {
    value.as_str().ok_or_else(|| mismatch("String", value))
}

fn list(value: &Value) -> RuntimeResult<&[Value]> {
    value.as_list().ok_or_else(|| mismatch("List", value))
}

fn entries(value: &Value) -> RuntimeResult<&[(Arc<str>, Value)]> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(mismatch("Map", other)),
    }
}

fn ordering(ordering: Option<std::cmp::Ordering>) -> Value {
    Value::Int(match ordering {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Greater) => 1,
        _ => 0,
    })
}

fn hash_of(value: &Value) -> i64 {
    let mut hasher = FxHasher::default();
    match value {
        Value::Object(instance) => (Arc::as_ptr(instance) as usize).hash(&mut hasher),
        Value::Null => return 0,
        other => other.to_string().hash(&mut hasher),
    }
    hasher.finish() as i64
}

fn object_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("toString", &[], |receiver, _| {
            Ok(Value::string(receiver.to_string()))
        })
        .method("equals", &[ParamType::Any], |receiver, args| {
            Ok(Value::Bool(*receiver == args[0]))
        })
        .method("hashCode", &[], |receiver, _| Ok(Value::Int(hash_of(receiver))))
        .method("is", &[ParamType::Any], |receiver, args| {
            Ok(Value::Bool(receiver.is_same(&args[0])))
        })
}

fn null_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("toString", &[], |_, _| Ok(Value::string("null")))
        .method("equals", &[ParamType::Any], |_, args| {
            Ok(Value::Bool(args[0].is_null()))
        })
        .method("is", &[ParamType::Any], |_, args| {
            Ok(Value::Bool(args[0].is_null()))
        })
        .method("hashCode", &[], |_, _| Ok(Value::Int(0)))
        .method("asBoolean", &[], |_, _| Ok(Value::Bool(false)))
        .method("plus", &[ParamType::STRING], |_, args| {
            Ok(Value::string(format!("null{}", text(&args[0])?)))
        })
}

fn bool_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("asBoolean", &[], |receiver, _| Ok(receiver.clone()))
        .method("compareTo", &[ParamType::BOOL], |receiver, args| {
            let left = receiver.as_bool().ok_or_else(|| mismatch("Boolean", receiver))?;
            let right = args[0].as_bool().ok_or_else(|| mismatch("Boolean", &args[0]))?;
            Ok(ordering(Some(left.cmp(&right))))
        })
}

fn int_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("plus", &[ParamType::INT], |receiver, args| {
            Ok(Value::Int(int(receiver)?.wrapping_add(int(&args[0])?)))
        })
        .method("plus", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(int(receiver)? as f64 + float(&args[0])?))
        })
        .method("minus", &[ParamType::INT], |receiver, args| {
            Ok(Value::Int(int(receiver)?.wrapping_sub(int(&args[0])?)))
        })
        .method("minus", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(int(receiver)? as f64 - float(&args[0])?))
        })
        .method("multiply", &[ParamType::INT], |receiver, args| {
            Ok(Value::Int(int(receiver)?.wrapping_mul(int(&args[0])?)))
        })
        .method("multiply", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(int(receiver)? as f64 * float(&args[0])?))
        })
        .method("div", &[ParamType::INT], |receiver, args| {
            let divisor = int(&args[0])?;
            if divisor == 0 {
                return Err(arithmetic_error("Division by zero"));
            }
            Ok(Value::Float(int(receiver)? as f64 / divisor as f64))
        })
        .method("div", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(int(receiver)? as f64 / float(&args[0])?))
        })
        .method("intdiv", &[ParamType::INT], |receiver, args| {
            let divisor = int(&args[0])?;
            if divisor == 0 {
                return Err(arithmetic_error("Division by zero"));
            }
            Ok(Value::Int(int(receiver)?.wrapping_div(divisor)))
        })
        .method("mod", &[ParamType::INT], |receiver, args| {
            let divisor = int(&args[0])?;
            if divisor == 0 {
                return Err(arithmetic_error("Division by zero"));
            }
            Ok(Value::Int(int(receiver)?.wrapping_rem(divisor)))
        })
        .method("compareTo", &[ParamType::INT], |receiver, args| {
            Ok(ordering(Some(int(receiver)?.cmp(&int(&args[0])?))))
        })
        .method("compareTo", &[ParamType::FLOAT], |receiver, args| {
            Ok(ordering((int(receiver)? as f64).partial_cmp(&float(&args[0])?)))
        })
        .method("negative", &[], |receiver, _| {
            Ok(Value::Int(int(receiver)?.wrapping_neg()))
        })
        .method("asBoolean", &[], |receiver, _| Ok(Value::Bool(int(receiver)? != 0)))
}

fn float_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("plus", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(float(receiver)? + float(&args[0])?))
        })
        .method("minus", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(float(receiver)? - float(&args[0])?))
        })
        .method("multiply", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(float(receiver)? * float(&args[0])?))
        })
        .method("div", &[ParamType::FLOAT], |receiver, args| {
            Ok(Value::Float(float(receiver)? / float(&args[0])?))
        })
        .method("compareTo", &[ParamType::FLOAT], |receiver, args| {
            Ok(ordering(float(receiver)?.partial_cmp(&float(&args[0])?)))
        })
        .method("negative", &[], |receiver, _| Ok(Value::Float(-float(receiver)?)))
        .method("asBoolean", &[], |receiver, _| {
            Ok(Value::Bool(float(receiver)? != 0.0))
        })
}

fn string_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("plus", &[ParamType::Any], |receiver, args| {
            Ok(Value::string(format!("{}{}", text(receiver)?, args[0])))
        })
        .method("multiply", &[ParamType::INT], |receiver, args| {
            let count = usize::try_from(int(&args[0])?).unwrap_or(0);
            Ok(Value::string(text(receiver)?.repeat(count)))
        })
        .method("size", &[], |receiver, _| {
            Ok(Value::Int(text(receiver)?.chars().count() as i64))
        })
        .method("isEmpty", &[], |receiver, _| {
            Ok(Value::Bool(text(receiver)?.is_empty()))
        })
        .method("getAt", &[ParamType::INT], |receiver, args| {
            let chars = text(receiver)?.chars().collect::<Vec<_>>();
            let index = int(&args[0])?;
            normalize_index(index, chars.len())
                .map(|position| Value::string(chars[position].to_string()))
                .ok_or_else(|| out_of_range("String", index, chars.len()))
        })
        .method("contains", &[ParamType::STRING], |receiver, args| {
            Ok(Value::Bool(text(receiver)?.contains(text(&args[0])?)))
        })
        .method("compareTo", &[ParamType::STRING], |receiver, args| {
            Ok(ordering(Some(text(receiver)?.cmp(text(&args[0])?))))
        })
        .method("toUpperCase", &[], |receiver, _| {
            Ok(Value::string(text(receiver)?.to_uppercase()))
        })
        .method("toLowerCase", &[], |receiver, _| {
            Ok(Value::string(text(receiver)?.to_lowercase()))
        })
        .method("asBoolean", &[], |receiver, _| {
            Ok(Value::Bool(!text(receiver)?.is_empty()))
        })
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn out_of_range(kind: &str, index: i64, len: usize) -> RuntimeError {
    RuntimeError::thrown(
        "IndexOutOfBoundsException",
        format!("{kind} index {index} out of range for length {len}"),
    )
}

fn list_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    builder
        .method("size", &[], |receiver, _| Ok(Value::Int(list(receiver)?.len() as i64)))
        .method("isEmpty", &[], |receiver, _| {
            Ok(Value::Bool(list(receiver)?.is_empty()))
        })
        .method("getAt", &[ParamType::INT], |receiver, args| {
            let values = list(receiver)?;
            Ok(normalize_index(int(&args[0])?, values.len())
                .map(|position| values[position].clone())
                .unwrap_or(Value::Null))
        })
        .method("get", &[ParamType::INT], |receiver, args| {
            let values = list(receiver)?;
            let index = int(&args[0])?;
            usize::try_from(index)
                .ok()
                .and_then(|position| values.get(position))
                .cloned()
                .ok_or_else(|| out_of_range("List", index, values.len()))
        })
        .method("contains", &[ParamType::Any], |receiver, args| {
            Ok(Value::Bool(list(receiver)?.contains(&args[0])))
        })
        .method("first", &[], |receiver, _| {
            list(receiver)?.first().cloned().ok_or_else(|| {
                RuntimeError::thrown(
                    "NoSuchElementException",
                    "Cannot access first() element from an empty List",
                )
            })
        })
        .method("last", &[], |receiver, _| {
            list(receiver)?.last().cloned().ok_or_else(|| {
                RuntimeError::thrown(
                    "NoSuchElementException",
                    "Cannot access last() element from an empty List",
                )
            })
        })
        .method("plus", &[ParamType::LIST], |receiver, args| {
            let mut values = list(receiver)?.to_vec();
            values.extend_from_slice(list(&args[0])?);
            Ok(Value::list(values))
        })
        .method("plus", &[ParamType::Any], |receiver, args| {
            let mut values = list(receiver)?.to_vec();
            values.push(args[0].clone());
            Ok(Value::list(values))
        })
        .method("asBoolean", &[], |receiver, _| {
            Ok(Value::Bool(!list(receiver)?.is_empty()))
        })
}

fn map_methods(builder: ClassBuilder<'_>) -> ClassBuilder<'_> {
    fn lookup(receiver: &Value, key: &Value) -> RuntimeResult<Value> {
        let key = text(key)?;
        Ok(entries(receiver)?
            .iter()
            .find(|(entry, _)| &**entry == key)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    builder
        .method("size", &[], |receiver, _| {
            Ok(Value::Int(entries(receiver)?.len() as i64))
        })
        .method("isEmpty", &[], |receiver, _| {
            Ok(Value::Bool(entries(receiver)?.is_empty()))
        })
        .method("get", &[ParamType::STRING], |receiver, args| lookup(receiver, &args[0]))
        .method("getAt", &[ParamType::STRING], |receiver, args| {
            lookup(receiver, &args[0])
        })
        .method("containsKey", &[ParamType::STRING], |receiver, args| {
            let key = text(&args[0])?;
            Ok(Value::Bool(
                entries(receiver)?.iter().any(|(entry, _)| &**entry == key),
            ))
        })
        .method("plus", &[ParamType::MAP], |receiver, args| {
            let mut merged = entries(receiver)?.to_vec();
            for (key, value) in entries(&args[0])? {
                match merged.iter_mut().find(|(entry, _)| entry == key) {
                    Some(existing) => existing.1 = value.clone(),
                    None => merged.push((key.clone(), value.clone())),
                }
            }
            Ok(Value::Map(Arc::new(merged)))
        })
        .method("asBoolean", &[], |receiver, _| {
            Ok(Value::Bool(!entries(receiver)?.is_empty()))
        })
}
