use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use crate::value::Value;

/// One lexical scope. Call-created scopes are flagged `is_function` so a
/// `return` can tell whether it has a call to return from.
#[derive(Clone, Default)]
pub struct Environment {
    values: FxHashMap<String, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
    is_function: bool,
}

impl Environment {
    pub fn boxed(parent: Option<Rc<RefCell<Environment>>>, is_function: bool) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(parent, is_function)))
    }

    pub fn new(parent: Option<Rc<RefCell<Environment>>>, is_function: bool) -> Self {
        Self {
            values: FxHashMap::default(),
            parent,
            is_function,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            None
        }
    }

    /// Binds `name` in this scope, replacing any binding it already holds here.
    /// Outer scopes are never touched.
    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn is_in_function(&self) -> bool {
        self.is_function
            || self
                .parent
                .as_ref()
                .map_or(false, |p| p.borrow().is_in_function())
    }

    pub fn parent(&self) -> Option<&Rc<RefCell<Environment>>> {
        self.parent.as_ref()
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(format!("Environment<{:?}>", std::ptr::from_ref(self)).as_str())
            .field(
                "values",
                &self
                    .values
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_string()))
                    .collect::<Vec<_>>(),
            )
            .field("parent", &self.parent.as_ref().map(|p| p.as_ptr()))
            .field("is_function", &self.is_function)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::boxed(None, false);
        root.borrow_mut().define("x".to_string(), Value::Number(1));
        let child = Environment::boxed(Some(root.clone()), true);
        child.borrow_mut().define("y".to_string(), Value::Number(2));

        assert_eq!(child.borrow().get("x"), Some(Value::Number(1)));
        assert_eq!(child.borrow().get("y"), Some(Value::Number(2)));
        assert_eq!(root.borrow().get("y"), None);
    }

    #[test]
    fn test_define_shadows_without_mutating_parent() {
        let root = Environment::boxed(None, false);
        root.borrow_mut().define("x".to_string(), Value::Number(1));
        let child = Environment::boxed(Some(root.clone()), true);
        child.borrow_mut().define("x".to_string(), Value::Number(2));

        assert_eq!(child.borrow().get("x"), Some(Value::Number(2)));
        assert_eq!(root.borrow().get("x"), Some(Value::Number(1)));
    }

    #[test]
    fn test_is_in_function() {
        let root = Environment::boxed(None, false);
        let call = Environment::boxed(Some(root.clone()), true);
        assert!(!root.borrow().is_in_function());
        assert!(call.borrow().is_in_function());
        assert!(call.borrow().parent().is_some());
    }
}
