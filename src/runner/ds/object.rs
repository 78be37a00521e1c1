//! Shape-backed dynamic objects.
//!
//! An object is a shape id plus a dense slot vector; property layout lives
//! in the engine's [`ShapeArena`](crate::runner::ds::shape::ShapeArena).
//! Adding a property walks a transition edge, so monomorphic code keeps
//! hitting the same slot index. Objects that outgrow the fast layout spill
//! into an overflow map and stop transitioning.

use crate::runner::ds::error::{ErrorKind, Signal};
use crate::runner::ds::function::FunctionData;
use crate::runner::ds::scope::ScopeRef;
use crate::runner::ds::shape::{PropertyAttributes, ShapeArena, ShapeId};
use crate::runner::ds::value::JsValue;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type JsObjectRef = Rc<RefCell<ObjectInstance>>;

/// Own properties beyond this count stop using shape transitions.
pub const FAST_SLOT_LIMIT: usize = 128;

pub enum ObjectKind {
    Ordinary,
    Function(FunctionData),
    Arguments,
    Error,
    /// Unrecognized host reference carried through the engine opaquely.
    Opaque(Rc<dyn Any>),
}

/// One property slot. Aliased slots behave like a getter/setter pair bound
/// to a scope variable; they back the non-strict arguments object.
pub enum PropertySlot {
    Data(JsValue),
    ArgumentAlias { scope: ScopeRef, name: String },
    ThrowTypeError,
}

pub struct OverflowProperty {
    pub value: JsValue,
    pub attributes: PropertyAttributes,
}

pub struct ObjectInstance {
    pub shape: ShapeId,
    pub slots: Vec<PropertySlot>,
    pub overflow: HashMap<String, OverflowProperty>,
    pub prototype: Option<JsObjectRef>,
    pub extensible: bool,
    pub kind: ObjectKind,
}

impl ObjectInstance {
    pub fn new(root_shape: ShapeId, prototype: Option<JsObjectRef>) -> Self {
        ObjectInstance {
            shape: root_shape,
            slots: Vec::new(),
            overflow: HashMap::new(),
            prototype,
            extensible: true,
            kind: ObjectKind::Ordinary,
        }
    }

    pub fn new_ref(root_shape: ShapeId, prototype: Option<JsObjectRef>) -> JsObjectRef {
        Rc::new(RefCell::new(ObjectInstance::new(root_shape, prototype)))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn function_data(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Reads an own property. `Ok(None)` when the object has no such property.
pub fn get_own_property(
    arena: &ShapeArena,
    obj: &JsObjectRef,
    name: &str,
) -> Result<Option<JsValue>, Signal> {
    // Alias reads touch the scope only after the object borrow is released.
    let alias: (ScopeRef, String);
    {
        let inner = obj.borrow();
        if let Some(info) = arena.lookup(inner.shape, name) {
            match &inner.slots[info.index] {
                PropertySlot::Data(v) => return Ok(Some(v.clone())),
                PropertySlot::ArgumentAlias { scope, name } => {
                    alias = (scope.clone(), name.clone());
                }
                PropertySlot::ThrowTypeError => {
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        format!("'{}' is not accessible in strict mode", name),
                    ));
                }
            }
        } else if let Some(p) = inner.overflow.get(name) {
            return Ok(Some(p.value.clone()));
        } else {
            return Ok(None);
        }
    }
    let (scope, var) = alias;
    let value = scope.borrow().get_by_name(&var).unwrap_or(JsValue::Undefined);
    Ok(Some(value))
}

/// Reads a property, walking the prototype chain.
pub fn get_property(arena: &ShapeArena, obj: &JsObjectRef, name: &str) -> Result<JsValue, Signal> {
    let mut current = obj.clone();
    loop {
        if let Some(v) = get_own_property(arena, &current, name)? {
            return Ok(v);
        }
        let next = current.borrow().prototype.clone();
        match next {
            Some(p) => current = p,
            None => return Ok(JsValue::Undefined),
        }
    }
}

pub fn has_property(arena: &ShapeArena, obj: &JsObjectRef, name: &str) -> bool {
    let mut current = obj.clone();
    loop {
        {
            let inner = current.borrow();
            if arena.lookup(inner.shape, name).is_some() || inner.overflow.contains_key(name) {
                return true;
            }
        }
        let next = current.borrow().prototype.clone();
        match next {
            Some(p) => current = p,
            None => return false,
        }
    }
}

/// Writes a property on the object itself, creating it when missing.
pub fn set_property(
    arena: &mut ShapeArena,
    obj: &JsObjectRef,
    name: &str,
    value: JsValue,
    strict: bool,
) -> Result<(), Signal> {
    let alias: (ScopeRef, String);
    {
        let mut inner = obj.borrow_mut();
        if let Some(info) = arena.lookup(inner.shape, name) {
            match &inner.slots[info.index] {
                PropertySlot::Data(_) => {
                    if !info.attributes.writable {
                        if strict {
                            return Err(Signal::script(
                                ErrorKind::TypeError,
                                format!("cannot assign to read-only property '{}'", name),
                            ));
                        }
                        return Ok(());
                    }
                    inner.slots[info.index] = PropertySlot::Data(value);
                    return Ok(());
                }
                PropertySlot::ArgumentAlias { scope, name } => {
                    alias = (scope.clone(), name.clone());
                }
                PropertySlot::ThrowTypeError => {
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        format!("'{}' is not accessible in strict mode", name),
                    ));
                }
            }
        } else if let Some(p) = inner.overflow.get_mut(name) {
            if !p.attributes.writable {
                if strict {
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        format!("cannot assign to read-only property '{}'", name),
                    ));
                }
                return Ok(());
            }
            p.value = value;
            return Ok(());
        } else {
            if !inner.extensible {
                if strict {
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        format!("cannot add property '{}', object is not extensible", name),
                    ));
                }
                return Ok(());
            }
            let attributes = PropertyAttributes::default_data();
            if inner.slots.len() >= FAST_SLOT_LIMIT {
                inner
                    .overflow
                    .insert(name.to_string(), OverflowProperty { value, attributes });
            } else {
                let shape = inner.shape;
                inner.shape = arena.transition(shape, name, attributes);
                inner.slots.push(PropertySlot::Data(value));
            }
            return Ok(());
        }
    }
    let (scope, var) = alias;
    scope.borrow_mut().set_by_name(&var, value);
    Ok(())
}

/// Installs a property with explicit attributes and slot kind, replacing any
/// existing one. Engine-internal surface used to build arguments objects,
/// error objects and sealed globals.
pub fn define_own_property(
    arena: &mut ShapeArena,
    obj: &JsObjectRef,
    name: &str,
    slot: PropertySlot,
    attributes: PropertyAttributes,
) {
    let mut inner = obj.borrow_mut();
    if let Some(info) = arena.lookup(inner.shape, name) {
        if info.attributes == attributes {
            inner.slots[info.index] = slot;
            return;
        }
        // Attribute change leaves the shared transition graph.
        let old_shape = arena.get(inner.shape);
        let mut layout: Vec<(String, PropertyAttributes)> = Vec::new();
        for n in old_shape.names_in_order() {
            let a = if n == name {
                attributes
            } else {
                match old_shape.lookup(&n) {
                    Some(s) => s.attributes,
                    None => attributes,
                }
            };
            layout.push((n, a));
        }
        inner.shape = arena.rebuilt(&layout);
        inner.slots[info.index] = slot;
        return;
    }
    if inner.slots.len() >= FAST_SLOT_LIMIT {
        let value = match slot {
            PropertySlot::Data(v) => v,
            _ => JsValue::Undefined,
        };
        inner
            .overflow
            .insert(name.to_string(), OverflowProperty { value, attributes });
        return;
    }
    let shape = inner.shape;
    inner.shape = arena.transition(shape, name, attributes);
    inner.slots.push(slot);
}

/// Deletes a property. An aliased argument slot is frozen to its current
/// value first, so the aliasing is gone for good regardless of whether the
/// deletion of the name itself then succeeds.
pub fn delete_property(
    arena: &mut ShapeArena,
    obj: &JsObjectRef,
    name: &str,
    strict: bool,
) -> Result<bool, Signal> {
    let frozen = {
        let inner = obj.borrow();
        match arena.lookup(inner.shape, name) {
            Some(info) => match &inner.slots[info.index] {
                PropertySlot::ArgumentAlias { scope, name } => Some((
                    info.index,
                    scope
                        .borrow()
                        .get_by_name(name)
                        .unwrap_or(JsValue::Undefined),
                )),
                _ => None,
            },
            None => None,
        }
    };
    if let Some((index, value)) = frozen {
        obj.borrow_mut().slots[index] = PropertySlot::Data(value);
    }

    let mut inner = obj.borrow_mut();
    if let Some(info) = arena.lookup(inner.shape, name) {
        if !info.attributes.configurable {
            if strict {
                return Err(Signal::script(
                    ErrorKind::TypeError,
                    format!("cannot delete property '{}'", name),
                ));
            }
            return Ok(false);
        }
        let old_shape = arena.get(inner.shape);
        let mut layout: Vec<(String, PropertyAttributes)> = Vec::new();
        let mut kept_indexes: Vec<usize> = Vec::new();
        for n in old_shape.names_in_order() {
            if n == name {
                continue;
            }
            if let Some(s) = old_shape.lookup(&n) {
                layout.push((n, s.attributes));
                kept_indexes.push(s.index);
            }
        }
        inner.shape = arena.rebuilt(&layout);
        let mut taken: Vec<Option<PropertySlot>> =
            std::mem::take(&mut inner.slots).into_iter().map(Some).collect();
        let mut new_slots: Vec<PropertySlot> = Vec::with_capacity(kept_indexes.len());
        for idx in kept_indexes {
            if let Some(slot) = taken[idx].take() {
                new_slots.push(slot);
            }
        }
        inner.slots = new_slots;
        return Ok(true);
    }
    inner.overflow.remove(name);
    Ok(true)
}

/// Enumerable own property names, slot order first, then overflow.
pub fn own_enumerable_names(arena: &ShapeArena, obj: &JsObjectRef) -> Vec<String> {
    let inner = obj.borrow();
    let mut names = arena.get(inner.shape).enumerable_names();
    for (n, p) in inner.overflow.iter() {
        if p.attributes.enumerable {
            names.push(n.clone());
        }
    }
    names
}

/// Builds a script error object carrying `name` and `message` properties.
pub fn create_error_object(
    arena: &mut ShapeArena,
    root_shape: ShapeId,
    kind: ErrorKind,
    message: &str,
) -> JsObjectRef {
    let obj = ObjectInstance::new_ref(root_shape, None);
    obj.borrow_mut().kind = ObjectKind::Error;
    define_own_property(
        arena,
        &obj,
        "name",
        PropertySlot::Data(JsValue::String(kind.name().to_string())),
        PropertyAttributes::hidden(),
    );
    define_own_property(
        arena,
        &obj,
        "message",
        PropertySlot::Data(JsValue::String(message.to_string())),
        PropertyAttributes::hidden(),
    );
    obj
}
