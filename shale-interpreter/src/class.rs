use std::fmt;

use indexmap::IndexMap;

use crate::value::Value;
use crate::ShaleRef;

/// Represents a user-defined class.
#[derive(Clone)]
pub struct Class {
    /// The class' name.
    pub name: String,
    /// The base class, if any.
    pub base: Option<ShaleRef<Class>>,
    /// The class' methods, in declaration order.
    pub methods: IndexMap<String, Value>,
    /// The class-level attributes, in declaration order.
    pub attrs: IndexMap<String, Value>,
}

impl Class {
    /// Get the class' name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Search for a method within this class and its base chain.
    pub fn lookup_method(&self, name: &str) -> Option<Value> {
        self.methods.get(name).cloned().or_else(|| {
            self.base
                .as_ref()
                .and_then(|base| base.borrow().lookup_method(name))
        })
    }

    /// Search for a class attribute within this class and its base chain.
    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name).cloned().or_else(|| {
            self.base
                .as_ref()
                .and_then(|base| base.borrow().lookup_attr(name))
        })
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &self.methods.keys())
            .field("attrs", &self.attrs.keys())
            .finish()
    }
}
