use std::cell::RefCell;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::metaclass::{MetaMethod, ParamType};
use super::overload;
use crate::error::RuntimeResult;
use crate::value::{TypeId, Value};

/// A named bundle of methods injected into existing types for the
/// duration of a `use_category` block on one thread.
pub struct Category {
    name: Arc<str>,
    methods: FxHashMap<(TypeId, Arc<str>), SmallVec<[Arc<MetaMethod>; 2]>>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            methods: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method<F>(mut self, target: TypeId, name: &str, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.methods
            .entry((target, Arc::from(name)))
            .or_default()
            .push(Arc::new(MetaMethod::native(name, params, body)));
        self
    }

    fn find(&self, receiver: &Value, name: &str, args: &[Value]) -> Option<Arc<MetaMethod>> {
        let key = |type_id: TypeId| (type_id, Arc::<str>::from(name));
        let mut targets: SmallVec<[TypeId; 4]> = SmallVec::new();
        match receiver {
            Value::Object(instance) => {
                let mut class = Some(instance.metaclass());
                while let Some(current) = class {
                    targets.push(current.type_id());
                    class = current.parent();
                }
            }
            other => targets.push(other.type_id()),
        }
        if !targets.contains(&TypeId::OBJECT) {
            targets.push(TypeId::OBJECT);
        }
        targets.into_iter().find_map(|target| {
            self.methods
                .get(&key(target))
                .and_then(|overloads| overload::pick(overloads.iter(), args))
        })
    }
}

thread_local! {
    static ACTIVE: RefCell<Vec<Arc<Category>>> = const { RefCell::new(Vec::new()) };
}

struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// Runs `body` with `category` active on the current thread. Nested blocks
/// stack; the innermost category wins.
pub fn use_category<T>(category: Arc<Category>, body: impl FnOnce() -> T) -> T {
    ACTIVE.with(|active| active.borrow_mut().push(category));
    let _guard = ActiveGuard;
    body()
}

pub fn has_active_category() -> bool {
    ACTIVE.with(|active| !active.borrow().is_empty())
}

pub(crate) fn find_category_method(
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> Option<Arc<MetaMethod>> {
    let active = ACTIVE.with(|active| active.borrow().clone());
    active
        .iter()
        .rev()
        .find_map(|category| category.find(receiver, name, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &'static str) -> Arc<Category> {
        Arc::new(Category::new(tag).method(TypeId::INT, "tag", &[], move |_, _| {
            Ok(Value::string(tag))
        }))
    }

    fn call_tag(receiver: &Value) -> Option<Value> {
        find_category_method(receiver, "tag", &[])
            .map(|method| method.invoke(receiver, &[]).expect("tag"))
    }

    #[test]
    fn innermost_category_wins_and_scopes_unwind() {
        assert!(!has_active_category());
        let receiver = Value::Int(1);

        use_category(tagged("outer"), || {
            assert!(has_active_category());
            assert_eq!(call_tag(&receiver), Some(Value::string("outer")));
            use_category(tagged("inner"), || {
                assert_eq!(call_tag(&receiver), Some(Value::string("inner")));
            });
            assert_eq!(call_tag(&receiver), Some(Value::string("outer")));
        });

        assert!(!has_active_category());
        assert_eq!(call_tag(&receiver), None);
    }

    #[test]
    fn category_methods_only_apply_to_their_target_type() {
        use_category(tagged("ints"), || {
            assert!(call_tag(&Value::string("text")).is_none());
            assert!(call_tag(&Value::Int(7)).is_some());
        });
    }
}
