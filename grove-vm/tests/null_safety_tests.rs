mod common;

use common::*;

#[test]
fn safe_call_on_null_returns_null_without_dispatch() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);

    let result = table.call_safe0(0, &Value::Null).expect("safe call never fails on null");
    assert_eq!(result, Value::Null);
    let result = table
        .call_safe2(0, &Value::Null, Value::Int(1), Value::Int(2))
        .expect("safe call never fails on null");
    assert_eq!(result, Value::Null);

    assert_eq!(table.site_tag(0), Some(SiteTag::Generic));
    assert_eq!(runtime.stats().resolutions(), 0);
    assert_eq!(runtime.stats().slow_path_calls(), 0);
}

#[test]
fn safe_call_on_value_dispatches_normally() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size"]);

    let size = table.call_safe0(0, &Value::string("four")).expect("size");
    assert_eq!(size, Value::Int(4));
    assert_eq!(table.site_tag(0), Some(SiteTag::HostMethod));
}

#[test]
fn null_object_methods_answer_on_null() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["toString", "equals", "plus"]);

    assert_eq!(table.call0(0, &Value::Null).expect("toString"), Value::string("null"));
    assert_eq!(
        table.call1(1, &Value::Null, Value::Null).expect("equals"),
        Value::Bool(true)
    );
    assert_eq!(
        table.call1(2, &Value::Null, Value::string("!")).expect("plus"),
        Value::string("null!")
    );

    for index in 0..3 {
        assert_eq!(table.site_tag(index), Some(SiteTag::Generic));
        assert_eq!(table.install_count(index), 0);
    }
}

#[test]
fn unknown_method_on_null_is_a_null_receiver_error() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["foo"]);

    let err = table.call0(0, &Value::Null).expect_err("null has no foo");
    assert_eq!(
        err,
        RuntimeError::NullReceiver {
            name: "foo".to_string(),
            property: false,
        }
    );
    assert_eq!(err.to_string(), "Cannot invoke method foo() on null object");
}

#[test]
fn property_on_null_is_a_null_receiver_error_unless_safe() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["name"]);

    let err = table.get_property(0, &Value::Null).expect_err("null has no name");
    assert_eq!(err.to_string(), "Cannot get property 'name' on null object");
    assert_eq!(
        table.get_property_safe(0, &Value::Null).expect("safe navigation"),
        Value::Null
    );
}

#[test]
fn null_after_specialization_keeps_the_installed_site() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["size", "toString"]);

    table.call0(0, &Value::string("abc")).expect("size");
    table.call0(1, &Value::Int(7)).expect("toString");

    let err = table.call0(0, &Value::Null).expect_err("null has no size");
    assert!(matches!(err, RuntimeError::NullReceiver { .. }));
    assert_eq!(table.call0(1, &Value::Null).expect("toString"), Value::string("null"));

    assert_eq!(table.site_tag(0), Some(SiteTag::HostMethod));
    assert_eq!(table.site_tag(1), Some(SiteTag::HostMethod));
    assert_eq!(table.call0(0, &Value::string("abcd")).expect("size"), Value::Int(4));
    assert_eq!(table.install_count(0), 1);
}

#[test]
fn current_object_call_on_null_uses_the_null_object() {
    let runtime = Runtime::isolated();
    let table = table(&runtime, &["hashCode"]);

    assert_eq!(table.call_current0(0, &Value::Null).expect("hashCode"), Value::Int(0));
}
