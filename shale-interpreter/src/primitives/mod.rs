/// Methods for the **array** type.
pub mod array;
/// Methods for the **cmdobj** type.
pub mod cmd;
/// Methods for the **file** type.
pub mod file;
/// Methods for the **map** type.
pub mod map;
/// Methods for the **range** type.
pub mod range;
/// Methods for the **set** type.
pub mod set;
/// Methods for the **string** type.
pub mod string;
/// Methods for the **tuple** type.
pub mod tuple;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::value::{BuiltinFn, TypeTag, Value};

/// Macro for checking and destructuring arguments passed to builtins.
#[macro_export]
macro_rules! expect_args {
    ($signature:expr, $args:expr, [ $( $ptrn:pat $( => $name:ident )? ),* $(,)? ]) => {
        #[allow(unused_mut)]
        let ($($(mut $name,)?)*) = {
            #[allow(unused_variables, unused_mut)]
            let mut iter = $args.into_iter();
            $(#[allow(unreachable_patterns)]
            $(let $name =)? match iter.next() {
                Some($ptrn) => {$($name)?},
                Some(_) => return Err($crate::error::RuntimeError::bare(
                    $crate::error::ErrorKind::IncompatibleType,
                    format!("'{}': wrong type of arguments", $signature),
                )),
                None => return Err($crate::error::RuntimeError::bare(
                    $crate::error::ErrorKind::FuncParams,
                    format!("'{}': missing argument", $signature),
                )),
            };)*
            ($($($name,)?)*)
        };
    };
}

/// The method table for a builtin type.
pub fn get_instance_methods(tag: TypeTag) -> Option<&'static [(&'static str, BuiltinFn)]> {
    match tag {
        TypeTag::String => Some(self::string::INSTANCE_METHODS),
        TypeTag::Array => Some(self::array::INSTANCE_METHODS),
        TypeTag::Tuple => Some(self::tuple::INSTANCE_METHODS),
        TypeTag::Map => Some(self::map::INSTANCE_METHODS),
        TypeTag::Set => Some(self::set::INSTANCE_METHODS),
        TypeTag::Cmd => Some(self::cmd::INSTANCE_METHODS),
        TypeTag::File => Some(self::file::INSTANCE_METHODS),
        TypeTag::Range => Some(self::range::INSTANCE_METHODS),
        _ => None,
    }
}

static METHOD_TABLE: Lazy<HashMap<TypeTag, HashMap<&'static str, BuiltinFn>>> = Lazy::new(|| {
    let tags = [
        TypeTag::String,
        TypeTag::Array,
        TypeTag::Tuple,
        TypeTag::Map,
        TypeTag::Set,
        TypeTag::Cmd,
        TypeTag::File,
        TypeTag::Range,
    ];
    let mut table = HashMap::new();
    for tag in tags {
        if let Some(methods) = get_instance_methods(tag) {
            table.insert(tag, methods.iter().copied().collect());
        }
    }
    table
});

/// Resolve a method on a builtin type, for attribute access to bind.
pub fn lookup_method(tag: TypeTag, name: &str) -> Option<Value> {
    METHOD_TABLE
        .get(&tag)?
        .get_key_value(name)
        .map(|(name, func)| Value::Builtin(name, *func))
}
