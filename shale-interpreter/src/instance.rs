use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::class::Class;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::value::Value;
use crate::{ShaleRef, ShaleWeakRef};

/// Represents an instance of a user-defined class.
///
/// The class reference is weak: the scope that declared the class owns it,
/// and the cycle through captured method scopes must not keep both alive.
pub struct Instance {
    class: ShaleWeakRef<Class>,
    /// The class name, kept for printing even if the class itself is gone.
    class_name: String,
    /// The instance's attributes.
    pub attrs: IndexMap<String, Value>,
}

impl Instance {
    /// Construct an empty instance of the given class.
    pub fn from_class(class: &ShaleRef<Class>) -> Self {
        Self {
            class: Rc::downgrade(class),
            class_name: class.borrow().name().to_string(),
            attrs: IndexMap::new(),
        }
    }

    /// Get the name of the instance's class.
    pub fn class_name(&self) -> &str {
        self.class_name.as_str()
    }

    /// Get the instance's class, failing if its owning scope dropped it.
    pub fn class(&self) -> EvalResult<ShaleRef<Class>> {
        self.class.upgrade().ok_or_else(|| {
            RuntimeError::bare(
                ErrorKind::IncompatibleType,
                format!(
                    "class '{}' of this object has been collected",
                    self.class_name
                ),
            )
        })
    }

    /// Search for an attribute on the instance itself.
    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name).cloned()
    }

    /// Assign an attribute on the instance.
    pub fn set_attr(&mut self, name: &str, value: Value) {
        self.attrs.insert(name.to_string(), value);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class_name)
            .field("attrs", &self.attrs.keys())
            .finish()
    }
}
