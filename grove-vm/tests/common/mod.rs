#![allow(dead_code, unused_imports)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use vm::{
    CallSiteConfig, CallSiteTable, InvokeTier, MetaClass, MetaClassRegistry, MetaMethod,
    ParamType, Runtime, RuntimeError, SiteTag, TypeId, Value,
};
use vm::Instance;

pub fn runtime_with(config: CallSiteConfig) -> Arc<Runtime> {
    Runtime::new(Arc::new(MetaClassRegistry::new()), config)
}

pub fn table(runtime: &Arc<Runtime>, names: &[&str]) -> CallSiteTable {
    CallSiteTable::from_names(runtime.clone(), TypeId::OBJECT, names.iter().copied())
}

pub fn owned_table(runtime: &Arc<Runtime>, owner: TypeId, names: &[&str]) -> CallSiteTable {
    CallSiteTable::from_names(runtime.clone(), owner, names.iter().copied())
}

pub fn new_object(metaclass: &Arc<MetaClass>) -> Value {
    Value::Object(Instance::new(metaclass.clone()))
}

/// Counts how often a method body actually ran.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// `Greeter` with a `greet()` method returning `greeting` and counting calls.
pub fn define_greeter(runtime: &Runtime, greeting: &'static str, counter: &Counter) -> Arc<MetaClass> {
    let counter = counter.clone();
    runtime
        .registry()
        .define_class("Greeter")
        .default_constructor()
        .method("greet", &[], move |_, _| {
            counter.hit();
            Ok(Value::string(greeting))
        })
        .build()
}

/// `Point(x, y)` with public fields and a two-argument constructor.
pub fn define_point(runtime: &Runtime) -> Arc<MetaClass> {
    runtime
        .registry()
        .define_class("Point")
        .field("x")
        .field("y")
        .constructor(&[ParamType::INT, ParamType::INT], |instance, args| {
            instance.set_field("x", args[0].clone());
            instance.set_field("y", args[1].clone());
            Ok(())
        })
        .method("sum", &[], |receiver, _| {
            let Value::Object(instance) = receiver else {
                return Ok(Value::Null);
            };
            let x = instance.get_field("x").and_then(|v| v.as_int()).unwrap_or(0);
            let y = instance.get_field("y").and_then(|v| v.as_int()).unwrap_or(0);
            Ok(Value::Int(x + y))
        })
        .build()
}
