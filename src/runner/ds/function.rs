//! Function objects and the arguments object.
//!
//! A user function pairs a compiled body (`FunctionProto`) with the scope it
//! closed over. Native functions carry a host callback with a fixed arity.

use crate::runner::codegen::bytecode::Chunk;
use crate::runner::ds::error::Signal;
use crate::runner::ds::object::{
    define_own_property, JsObjectRef, ObjectInstance, ObjectKind, PropertySlot,
};
use crate::runner::ds::scope::{ScopeRef, ScopeTemplate};
use crate::runner::ds::shape::{PropertyAttributes, ShapeArena, ShapeId};
use crate::runner::ds::value::JsValue;
use crate::runner::engine::ScriptEngine;
use std::rc::Rc;

pub type NativeCallback =
    Rc<dyn Fn(&mut ScriptEngine, JsValue, &[JsValue]) -> Result<JsValue, Signal>>;

/// Compiled body of a user function, shared by all its closures.
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<String>,
    pub strict: bool,
    pub uses_arguments: bool,
    pub chunk: Chunk,
    /// Layout of the function activation scope (params, vars, `arguments`).
    pub scope_template: Rc<ScopeTemplate>,
    /// Slot bound to the function object itself for named function
    /// expressions, when no parameter or var shadows the name.
    pub self_slot: Option<usize>,
}

pub enum FunctionData {
    User {
        proto: Rc<FunctionProto>,
        scope: ScopeRef,
    },
    Native {
        name: String,
        arity: usize,
        callback: NativeCallback,
    },
}

impl FunctionData {
    pub fn name(&self) -> &str {
        match self {
            FunctionData::User { proto, .. } => &proto.name,
            FunctionData::Native { name, .. } => name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            FunctionData::User { proto, .. } => proto.params.len(),
            FunctionData::Native { arity, .. } => *arity,
        }
    }
}

/// Builds a callable object with `name`, `length` and a fresh `prototype`.
pub fn create_function_object(
    arena: &mut ShapeArena,
    root_shape: ShapeId,
    data: FunctionData,
) -> JsObjectRef {
    let name = data.name().to_string();
    let arity = data.arity();
    let obj = ObjectInstance::new_ref(root_shape, None);
    obj.borrow_mut().kind = ObjectKind::Function(data);
    define_own_property(
        arena,
        &obj,
        "name",
        PropertySlot::Data(JsValue::String(name)),
        PropertyAttributes::hidden(),
    );
    define_own_property(
        arena,
        &obj,
        "length",
        PropertySlot::Data(JsValue::from_i64(arity as i64)),
        PropertyAttributes::hidden(),
    );
    let proto_obj = ObjectInstance::new_ref(root_shape, None);
    define_own_property(
        arena,
        &obj,
        "prototype",
        PropertySlot::Data(JsValue::Object(proto_obj)),
        PropertyAttributes::hidden(),
    );
    obj
}

/// Builds the arguments object for one activation.
///
/// Sloppy mode: each positional index backed by a named parameter aliases
/// the scope binding, except that with duplicated parameter names only the
/// last occurrence stays aliased; earlier occurrences are frozen to the
/// value passed at their position. Extra positional arguments are plain
/// data. Strict mode: plain snapshots, with `callee` and `caller` poisoned.
pub fn create_arguments_object(
    arena: &mut ShapeArena,
    root_shape: ShapeId,
    params: &[String],
    scope: &ScopeRef,
    args: &[JsValue],
    callee: JsValue,
    strict: bool,
) -> JsObjectRef {
    let obj = ObjectInstance::new_ref(root_shape, None);
    obj.borrow_mut().kind = ObjectKind::Arguments;

    for (i, arg) in args.iter().enumerate() {
        let slot = if strict {
            PropertySlot::Data(arg.clone())
        } else if i < params.len() {
            let name = &params[i];
            let duplicated_later = params[i + 1..].iter().any(|p| p == name);
            if duplicated_later {
                // A later duplicate owns the binding; this index keeps the
                // value it was called with.
                PropertySlot::Data(arg.clone())
            } else {
                PropertySlot::ArgumentAlias {
                    scope: scope.clone(),
                    name: name.clone(),
                }
            }
        } else {
            PropertySlot::Data(arg.clone())
        };
        define_own_property(
            arena,
            &obj,
            &i.to_string(),
            slot,
            PropertyAttributes::default_data(),
        );
    }

    define_own_property(
        arena,
        &obj,
        "length",
        PropertySlot::Data(JsValue::from_i64(args.len() as i64)),
        PropertyAttributes::hidden(),
    );
    if strict {
        define_own_property(
            arena,
            &obj,
            "callee",
            PropertySlot::ThrowTypeError,
            PropertyAttributes::sealed(),
        );
        define_own_property(
            arena,
            &obj,
            "caller",
            PropertySlot::ThrowTypeError,
            PropertyAttributes::sealed(),
        );
    } else {
        define_own_property(
            arena,
            &obj,
            "callee",
            PropertySlot::Data(callee),
            PropertyAttributes::hidden(),
        );
    }
    obj
}
