mod common;

use std::sync::Arc;

use common::*;
use vm::{Category, use_category};

#[test]
fn first_call_specializes_and_later_calls_reuse_the_site() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);
    let receiver = Value::string("abc");

    assert_eq!(table.site_tag(0), Some(SiteTag::Generic));
    for _ in 0..5 {
        let size = table.call0(0, &receiver).expect("size should succeed");
        assert_eq!(size, Value::Int(3));
    }

    assert_eq!(table.site_tag(0), Some(SiteTag::HostMethod));
    assert_eq!(table.install_count(0), 1);
    assert_eq!(runtime.stats().resolutions(), 1);
    assert_eq!(runtime.stats().slow_path_calls(), 0);
}

#[test]
fn dynamic_receiver_installs_dynamic_method_site() {
    let runtime = Runtime::isolated();
    let counter = Counter::default();
    let greeter = define_greeter(&runtime, "hello", &counter);
    let table = table(&runtime, &["greet"]);
    let receiver = new_object(&greeter);

    assert_eq!(table.call0(0, &receiver).expect("greet"), Value::string("hello"));
    assert_eq!(table.call0(0, &receiver).expect("greet"), Value::string("hello"));

    assert_eq!(table.site_tag(0), Some(SiteTag::DynamicMethod));
    assert_eq!(counter.get(), 2);
    assert_eq!(table.install_count(0), 1);
}

#[test]
fn adding_a_method_invalidates_the_cached_site() {
    let runtime = Runtime::isolated();
    let counter = Counter::default();
    let greeter = define_greeter(&runtime, "hello", &counter);
    let table = table(&runtime, &["greet"]);
    let receiver = new_object(&greeter);

    assert_eq!(table.call0(0, &receiver).expect("greet"), Value::string("hello"));
    let before = greeter.version();
    greeter.add_method(MetaMethod::native("greet", &[], |_, _| Ok(Value::string("hi"))));
    assert_ne!(greeter.version(), before);

    assert_eq!(table.call0(0, &receiver).expect("greet"), Value::string("hi"));
    assert_eq!(table.install_count(0), 2);
    assert_eq!(counter.get(), 1);
}

#[test]
fn ancestor_change_invalidates_descendant_sites() {
    let runtime = Runtime::isolated();
    let base = runtime
        .registry()
        .define_class("Base")
        .method("name", &[], |_, _| Ok(Value::string("base")))
        .build();
    let derived = runtime.registry().define_class("Derived").extends(&base).build();
    let table = table(&runtime, &["name"]);
    let receiver = new_object(&derived);

    assert_eq!(table.call0(0, &receiver).expect("name"), Value::string("base"));
    base.add_method(MetaMethod::native("name", &[], |_, _| Ok(Value::string("changed"))));
    assert_eq!(table.call0(0, &receiver).expect("name"), Value::string("changed"));
}

#[test]
fn removing_a_method_makes_the_next_call_miss() {
    let runtime = Runtime::isolated();
    let counter = Counter::default();
    let greeter = define_greeter(&runtime, "hello", &counter);
    let table = table(&runtime, &["greet"]);
    let receiver = new_object(&greeter);

    table.call0(0, &receiver).expect("greet");
    assert!(greeter.remove_method("greet"));

    let err = table.call0(0, &receiver).expect_err("greet should be gone");
    assert!(matches!(err, RuntimeError::MissingMethod { ref name, .. } if name == "greet"));
}

#[test]
fn replacing_a_metaclass_retires_sites_cached_against_it() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);
    let receiver = Value::string("abc");
    table.call0(0, &receiver).expect("size");

    let string_class = runtime.registry().get(TypeId::STRING).expect("string metaclass");
    let before = string_class.version();
    let retired = runtime
        .registry()
        .replace(string_class.clone())
        .expect("string metaclass was registered");
    assert!(Arc::ptr_eq(&retired, &string_class));
    assert_ne!(string_class.version(), before);

    assert_eq!(table.call0(0, &receiver).expect("size"), Value::Int(3));
    assert_eq!(table.install_count(0), 2);
}

#[test]
fn argument_types_are_part_of_the_cache_key() {
    let runtime = Runtime::isolated();
    let describer = runtime
        .registry()
        .define_class("Describer")
        .method("describe", &[ParamType::INT], |_, _| Ok(Value::string("int")))
        .method("describe", &[ParamType::STRING], |_, _| Ok(Value::string("string")))
        .build();
    let table = table(&runtime, &["describe"]);
    let receiver = new_object(&describer);

    let first = table.call1(0, &receiver, Value::Int(1)).expect("describe");
    let second = table.call1(0, &receiver, Value::string("x")).expect("describe");
    let third = table.call1(0, &receiver, Value::Int(2)).expect("describe");

    assert_eq!(first, Value::string("int"));
    assert_eq!(second, Value::string("string"));
    assert_eq!(third, Value::string("int"));
    assert_eq!(table.install_count(0), 3);
}

#[test]
fn most_specific_overload_wins() {
    let runtime = Runtime::isolated();
    let animal = runtime.registry().define_class("Animal").build();
    let dog = runtime.registry().define_class("Dog").extends(&animal).build();
    let animal_type = animal.type_id();
    let dog_type = dog.type_id();
    let vet = runtime
        .registry()
        .define_class("Vet")
        .method("treat", &[ParamType::Any], |_, _| Ok(Value::string("object")))
        .method("treat", &[ParamType::of(animal_type)], |_, _| Ok(Value::string("animal")))
        .method("treat", &[ParamType::of(dog_type)], |_, _| Ok(Value::string("dog")))
        .build();
    let table = table(&runtime, &["treat", "treat", "treat"]);
    let receiver = new_object(&vet);

    let dog_result = table.call1(0, &receiver, new_object(&dog)).expect("treat dog");
    let animal_result = table.call1(1, &receiver, new_object(&animal)).expect("treat animal");
    let other_result = table.call1(2, &receiver, Value::Int(1)).expect("treat int");

    assert_eq!(dog_result, Value::string("dog"));
    assert_eq!(animal_result, Value::string("animal"));
    assert_eq!(other_result, Value::string("object"));
}

#[test]
fn target_exceptions_reach_the_caller_unchanged() {
    let thrown = RuntimeError::thrown("IllegalStateException", "boom");
    let expected = thrown.clone();
    for config in [CallSiteConfig::default(), CallSiteConfig::uncached()] {
        let runtime = runtime_with(config);
        let thrown = thrown.clone();
        let failing = runtime
            .registry()
            .define_class("Failing")
            .method("explode", &[], move |_, _| Err(thrown.clone()))
            .build();
        let table = table(&runtime, &["explode"]);
        let receiver = new_object(&failing);

        for _ in 0..2 {
            let err = table.call0(0, &receiver).expect_err("explode should fail");
            assert_eq!(err, expected);
            assert!(!err.is_transport());
        }
    }
}

#[test]
fn builtin_arithmetic_errors_are_not_wrapped() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["intdiv"]);

    let err = table
        .call1(0, &Value::Int(1), Value::Int(0))
        .expect_err("division by zero should fail");
    assert!(matches!(err, RuntimeError::Thrown { ref kind, .. } if kind == "ArithmeticException"));
    assert_eq!(err.to_string(), "ArithmeticException: Division by zero");
}

#[test]
fn invoke_tier_reflects_the_argument_shape() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["plus", "plus", "plus"]);
    let receiver = Value::Float(1.5);

    let exact = table.call1(0, &receiver, Value::Float(1.0)).expect("plus");
    let coerced = table.call1(1, &receiver, Value::Int(2)).expect("plus");
    let wrapped = table
        .call1(2, &receiver, Value::wrap(Value::Int(3), TypeId::FLOAT))
        .expect("plus");

    assert_eq!(exact, Value::Float(2.5));
    assert_eq!(coerced, Value::Float(3.5));
    assert_eq!(wrapped, Value::Float(4.5));
    assert_eq!(table.site_tier(0), Some(InvokeTier::NoUnwrapNoCoerce));
    assert_eq!(table.site_tier(1), Some(InvokeTier::NoUnwrap));
    assert_eq!(table.site_tier(2), Some(InvokeTier::Baseline));
}

#[test]
fn wrapped_and_plain_arguments_do_not_share_a_site() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["plus"]);
    let receiver = Value::Float(1.0);

    table
        .call1(0, &receiver, Value::wrap(Value::Float(1.0), TypeId::FLOAT))
        .expect("plus");
    assert_eq!(table.site_tier(0), Some(InvokeTier::Baseline));

    table.call1(0, &receiver, Value::Float(1.0)).expect("plus");
    assert_eq!(table.site_tier(0), Some(InvokeTier::NoUnwrapNoCoerce));
    assert_eq!(table.install_count(0), 2);
}

#[test]
fn slot_goes_megamorphic_after_threshold_installs() {
    let runtime = runtime_with(CallSiteConfig {
        cache_enabled: true,
        megamorphic_threshold: 2,
    });
    let table = table(&runtime, &["toString"]);
    let receivers = [
        Value::Int(1),
        Value::string("two"),
        Value::Bool(true),
        Value::Float(4.5),
        Value::Int(5),
    ];
    let expected = ["1", "two", "true", "4.5", "5"];

    for (receiver, expected) in receivers.iter().zip(expected) {
        let rendered = table.call0(0, receiver).expect("toString");
        assert_eq!(rendered, Value::string(expected));
    }

    assert_eq!(table.site_tag(0), Some(SiteTag::Megamorphic));
    assert_eq!(table.install_count(0), 2);
    assert_eq!(runtime.stats().megamorphic_transitions(), 1);
    assert_eq!(table.site_tier(0), None);
}

#[test]
fn disabled_cache_never_writes_a_slot() {
    let runtime = runtime_with(CallSiteConfig::uncached());
    let table = table(&runtime, &["size"]);
    let receiver = Value::list(vec![Value::Int(1), Value::Int(2)]);

    for _ in 0..3 {
        assert_eq!(table.call0(0, &receiver).expect("size"), Value::Int(2));
    }

    assert_eq!(table.site_tag(0), Some(SiteTag::Generic));
    assert_eq!(table.install_count(0), 0);
    assert_eq!(runtime.stats().resolutions(), 0);
    assert_eq!(runtime.stats().slow_path_calls(), 3);
}

#[test]
fn private_methods_are_visible_only_to_their_declaring_type() {
    let runtime = Runtime::isolated();
    let vault = runtime
        .registry()
        .define_class("Vault")
        .private_method("secret", &[], |_, _| Ok(Value::Int(42)))
        .build();
    let outsider = runtime.registry().define_class("Outsider").build();
    let receiver = new_object(&vault);

    let outside = owned_table(&runtime, outsider.type_id(), &["secret"]);
    let err = outside.call0(0, &receiver).expect_err("private method is hidden");
    assert!(matches!(err, RuntimeError::MissingMethod { ref receiver, .. } if receiver == "Vault"));
    assert_eq!(outside.install_count(0), 0);

    let inside = owned_table(&runtime, vault.type_id(), &["secret"]);
    assert_eq!(inside.call0(0, &receiver).expect("secret"), Value::Int(42));
    assert_eq!(inside.site_tag(0), Some(SiteTag::DynamicMethod));
}

#[test]
fn current_object_call_sees_private_and_static_methods_of_this() {
    let runtime = Runtime::isolated();
    let widget = runtime
        .registry()
        .define_class("Widget")
        .private_method("helper", &[], |_, _| Ok(Value::string("private")))
        .static_method("create", &[], |_, _| Ok(Value::string("static")))
        .build();
    let table = table(&runtime, &["helper", "create"]);
    let this = new_object(&widget);

    assert_eq!(table.call_current0(0, &this).expect("helper"), Value::string("private"));
    assert_eq!(table.call_current0(1, &this).expect("create"), Value::string("static"));
    assert_eq!(table.site_tag(0), Some(SiteTag::DynamicMethod));

    let err = table.call0(0, &this).expect_err("plain call does not see private helper");
    assert!(matches!(err, RuntimeError::MissingMethod { .. }));
}

#[test]
fn dynamic_objects_report_their_metaclass_type() {
    let runtime = Runtime::isolated();
    let counter = Counter::default();
    let greeter = define_greeter(&runtime, "hi", &counter);
    let Value::Object(instance) = new_object(&greeter) else {
        panic!("new_object builds a dynamic object");
    };

    assert_eq!(instance.type_id(), greeter.type_id());
    assert_eq!(Value::Object(instance).type_id(), greeter.type_id());
    assert_eq!(
        runtime.registry().get(greeter.type_id()).map(|class| class.type_id()),
        Some(greeter.type_id())
    );
}

#[test]
fn current_call_on_class_literal_specializes_once() {
    let runtime = runtime_with(CallSiteConfig {
        cache_enabled: true,
        megamorphic_threshold: u32::MAX,
    });
    let util = runtime
        .registry()
        .define_class("Util")
        .static_method("twice", &[ParamType::INT], |_, args| {
            Ok(Value::Int(args[0].as_int().unwrap_or_default() * 2))
        })
        .build();
    let table = table(&runtime, &["twice"]);
    let this = Value::Class(util.type_id());

    for n in 0..5 {
        let result = table.call_current1(0, &this, Value::Int(n)).expect("twice");
        assert_eq!(result, Value::Int(n * 2));
    }
    assert_eq!(table.site_tag(0), Some(SiteTag::StaticMethod));
    assert_eq!(table.install_count(0), 1);
    assert_eq!(runtime.stats().resolutions(), 1);
    assert_eq!(runtime.stats().megamorphic_transitions(), 0);
}

#[test]
fn current_call_on_host_value_specializes_once() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);
    let this = Value::string("abcd");

    for _ in 0..5 {
        assert_eq!(table.call_current0(0, &this).expect("size"), Value::Int(4));
    }
    assert_eq!(table.site_tag(0), Some(SiteTag::HostMethod));
    assert_eq!(table.install_count(0), 1);
    assert_eq!(runtime.stats().resolutions(), 1);
}

#[test]
fn method_missing_handles_unknown_calls_uncached() {
    let runtime = Runtime::isolated();
    let ghost = runtime
        .registry()
        .define_class("Ghost")
        .method(
            "methodMissing",
            &[ParamType::STRING, ParamType::LIST],
            |_, args| {
                let name = args[0].as_str().unwrap_or_default();
                let count = args[1].as_list().map_or(0, <[Value]>::len);
                Ok(Value::string(format!("{name}:{count}")))
            },
        )
        .build();
    let table = table(&runtime, &["anything"]);
    let receiver = new_object(&ghost);

    let result = table
        .call2(0, &receiver, Value::Int(1), Value::Int(2))
        .expect("methodMissing should answer");
    assert_eq!(result, Value::string("anything:2"));
    assert_eq!(table.install_count(0), 0);
}

#[test]
fn missing_method_reports_receiver_and_argument_types() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["frobnicate"]);

    let err = table
        .call1(0, &Value::string("abc"), Value::Int(1))
        .expect_err("no such method");
    assert_eq!(
        err.to_string(),
        "no signature of method String.frobnicate() is applicable for argument types: (Integer)"
    );
}

#[test]
fn category_methods_apply_without_touching_slots() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["shout", "size"]);
    let receiver = Value::string("hi");

    assert_eq!(table.call0(1, &receiver).expect("size"), Value::Int(2));
    assert_eq!(table.install_count(1), 1);

    let category = Arc::new(Category::new("Shouting").method(
        TypeId::STRING,
        "shout",
        &[],
        |receiver, _| Ok(Value::string(receiver.as_str().unwrap_or_default().to_uppercase())),
    ));
    let (shouted, size) = use_category(category, || {
        (table.call0(0, &receiver), table.call0(1, &receiver))
    });

    assert_eq!(shouted.expect("shout inside category"), Value::string("HI"));
    assert_eq!(size.expect("size inside category"), Value::Int(2));
    assert_eq!(table.install_count(0), 0);
    assert_eq!(table.install_count(1), 1);
    assert_eq!(table.site_tag(1), Some(SiteTag::HostMethod));

    let err = table.call0(0, &receiver).expect_err("category is no longer active");
    assert!(matches!(err, RuntimeError::MissingMethod { .. }));
}

#[test]
fn invoke_hook_receivers_are_never_specialized() {
    let runtime = Runtime::isolated();
    let proxy = runtime
        .registry()
        .define_class("Proxy")
        .invoke_hook(|_, name, args| Ok(Value::string(format!("{name}/{}", args.len()))))
        .build();
    let table = table(&runtime, &["whatever"]);
    let receiver = new_object(&proxy);

    for _ in 0..2 {
        let result = table.call1(0, &receiver, Value::Null).expect("hook answers");
        assert_eq!(result, Value::string("whatever/1"));
    }
    assert_eq!(table.install_count(0), 0);
    assert_eq!(table.site_tag(0), Some(SiteTag::Generic));
}

#[test]
fn host_type_methods_dispatch_through_registered_table() {
    #[derive(Debug)]
    struct Celsius {
        degrees: f64,
        host_type: TypeId,
    }

    impl vm::HostObject for Celsius {
        fn host_type(&self) -> TypeId {
            self.host_type
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    let runtime = Runtime::isolated();
    let builder = runtime.registry().define_host_type("Celsius");
    let host_type = builder.type_id();
    builder
        .method("fahrenheit", &[], |receiver, _| {
            let Value::Host(object) = receiver else {
                return Ok(Value::Null);
            };
            let degrees = object
                .as_any()
                .downcast_ref::<Celsius>()
                .map_or(0.0, |celsius| celsius.degrees);
            Ok(Value::Float(degrees * 9.0 / 5.0 + 32.0))
        })
        .build();
    let table = table(&runtime, &["fahrenheit"]);
    let receiver = Value::host(Celsius {
        degrees: 100.0,
        host_type,
    });

    assert_eq!(table.call0(0, &receiver).expect("fahrenheit"), Value::Float(212.0));
    assert_eq!(table.site_tag(0), Some(SiteTag::HostMethod));
}

#[test]
fn unknown_slot_is_rejected() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);

    let err = table.call0(3, &Value::Null).expect_err("slot 3 does not exist");
    assert_eq!(err, RuntimeError::InvalidSlot(3));
}

#[test]
fn stats_snapshot_serializes_to_json() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);
    table.call0(0, &Value::string("abc")).expect("size");

    let snapshot = runtime.stats().snapshot();
    assert_eq!(snapshot.installs, 1);
    let json = snapshot.to_json();
    assert!(json.contains("\"installs\":1"), "unexpected json: {json}");
}
