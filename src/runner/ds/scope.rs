//! Runtime scope chain.
//!
//! Declarative scopes are fixed-layout slot vectors instantiated from a
//! compile-time template; the resolver lowers most variable references to a
//! `(depth, slot)` pair against them. Object-backed scopes (the global
//! scope, scopes supplied to `eval`) resolve names dynamically against an
//! object and force dynamic lookup in everything nested under them.

use crate::runner::ds::error::{ErrorKind, Signal};
use crate::runner::ds::object::{self, JsObjectRef};
use crate::runner::ds::shape::ShapeArena;
use crate::runner::ds::value::JsValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<RuntimeScope>>;

/// Compile-time layout of a declarative scope, stored in the chunk and
/// shared by every activation.
#[derive(Debug, Clone)]
pub struct ScopeTemplate {
    pub names: Vec<String>,
    /// Slots that reject reassignment (`const`).
    pub immutables: Vec<bool>,
    index: HashMap<String, usize>,
}

impl ScopeTemplate {
    pub fn new(names: Vec<String>, immutables: Vec<bool>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        ScopeTemplate {
            names,
            immutables,
            index,
        }
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

pub enum ScopeKind {
    Declarative {
        template: Rc<ScopeTemplate>,
        values: Vec<JsValue>,
        /// Slots that have seen their declaration store. `const` slots
        /// reject writes only after it, so `const c = undefined` still
        /// pins the binding.
        initialized: Vec<bool>,
    },
    ObjectBacked {
        object: JsObjectRef,
    },
}

pub struct RuntimeScope {
    pub parent: Option<ScopeRef>,
    pub kind: ScopeKind,
}

impl RuntimeScope {
    pub fn new_declarative(template: Rc<ScopeTemplate>, parent: Option<ScopeRef>) -> ScopeRef {
        let values = vec![JsValue::Undefined; template.names.len()];
        let initialized = vec![false; template.names.len()];
        Rc::new(RefCell::new(RuntimeScope {
            parent,
            kind: ScopeKind::Declarative {
                template,
                values,
                initialized,
            },
        }))
    }

    pub fn new_object_backed(object: JsObjectRef, parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(RuntimeScope {
            parent,
            kind: ScopeKind::ObjectBacked { object },
        }))
    }

    pub fn get_slot(&self, slot: usize) -> JsValue {
        match &self.kind {
            ScopeKind::Declarative { values, .. } => values[slot].clone(),
            ScopeKind::ObjectBacked { .. } => JsValue::Undefined,
        }
    }

    pub fn set_slot(&mut self, slot: usize, value: JsValue) -> Result<(), Signal> {
        match &mut self.kind {
            ScopeKind::Declarative {
                template,
                values,
                initialized,
            } => {
                if template.immutables.get(slot).copied().unwrap_or(false) && initialized[slot] {
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        format!("assignment to constant variable '{}'", template.names[slot]),
                    ));
                }
                values[slot] = value;
                initialized[slot] = true;
                Ok(())
            }
            ScopeKind::ObjectBacked { .. } => Ok(()),
        }
    }

    /// Own-scope name read. Declarative scopes only; aliased argument slots
    /// always point at a function scope, which is declarative.
    pub fn get_by_name(&self, name: &str) -> Option<JsValue> {
        match &self.kind {
            ScopeKind::Declarative {
                template, values, ..
            } => template.slot_of(name).map(|i| values[i].clone()),
            ScopeKind::ObjectBacked { .. } => None,
        }
    }

    /// Own-scope name write; ignored when the name is absent.
    pub fn set_by_name(&mut self, name: &str, value: JsValue) {
        if let ScopeKind::Declarative {
            template, values, ..
        } = &mut self.kind
        {
            if let Some(i) = template.slot_of(name) {
                values[i] = value;
            }
        }
    }
}

/// Walks `depth` parents up the chain.
pub fn scope_at_depth(scope: &ScopeRef, depth: usize) -> ScopeRef {
    let mut current = scope.clone();
    for _ in 0..depth {
        let parent = current
            .borrow()
            .parent
            .clone()
            .unwrap_or_else(|| current.clone());
        current = parent;
    }
    current
}

/// Dynamic name lookup walking the whole chain.
pub fn lookup_name(
    arena: &ShapeArena,
    scope: &ScopeRef,
    name: &str,
) -> Result<Option<JsValue>, Signal> {
    let mut current = scope.clone();
    loop {
        let backing: Option<JsObjectRef>;
        {
            let inner = current.borrow();
            match &inner.kind {
                ScopeKind::Declarative {
                    template, values, ..
                } => {
                    if let Some(i) = template.slot_of(name) {
                        return Ok(Some(values[i].clone()));
                    }
                    backing = None;
                }
                ScopeKind::ObjectBacked { object } => backing = Some(object.clone()),
            }
        }
        if let Some(object) = backing {
            if let Some(v) = object::get_own_property(arena, &object, name)? {
                return Ok(Some(v));
            }
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return Ok(None),
        }
    }
}

/// Dynamic name assignment. Missing names land on the outermost
/// object-backed scope (the global object) in sloppy mode and raise a
/// `ReferenceError` in strict mode.
pub fn assign_name(
    arena: &mut ShapeArena,
    scope: &ScopeRef,
    name: &str,
    value: JsValue,
    strict: bool,
) -> Result<(), Signal> {
    let mut current = scope.clone();
    let mut last_object_backed: Option<JsObjectRef> = None;
    loop {
        let backing: Option<JsObjectRef>;
        {
            let mut inner = current.borrow_mut();
            match &mut inner.kind {
                ScopeKind::Declarative { template, .. } => {
                    if template.slot_of(name).is_some() {
                        let slot = template.slot_of(name).expect("checked above");
                        return inner.set_slot(slot, value);
                    }
                    backing = None;
                }
                ScopeKind::ObjectBacked { object } => backing = Some(object.clone()),
            }
        }
        if let Some(object) = backing {
            {
                let has = {
                    let inner = object.borrow();
                    arena.lookup(inner.shape, name).is_some()
                        || inner.overflow.contains_key(name)
                };
                if has {
                    return object::set_property(arena, &object, name, value, strict);
                }
            }
            last_object_backed = Some(object);
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => break,
        }
    }
    if strict {
        return Err(Signal::script(
            ErrorKind::ReferenceError,
            format!("'{}' is not defined", name),
        ));
    }
    match last_object_backed {
        Some(object) => object::set_property(arena, &object, name, value, false),
        None => Ok(()),
    }
}

/// `delete name` — only meaningful for object-backed bindings.
pub fn delete_name(
    arena: &mut ShapeArena,
    scope: &ScopeRef,
    name: &str,
) -> Result<bool, Signal> {
    let mut current = scope.clone();
    loop {
        let backing: Option<JsObjectRef>;
        {
            let inner = current.borrow();
            match &inner.kind {
                ScopeKind::Declarative { template, .. } => {
                    if template.slot_of(name).is_some() {
                        return Ok(false);
                    }
                    backing = None;
                }
                ScopeKind::ObjectBacked { object } => backing = Some(object.clone()),
            }
        }
        if let Some(object) = backing {
            let has = {
                let inner = object.borrow();
                arena.lookup(inner.shape, name).is_some() || inner.overflow.contains_key(name)
            };
            if has {
                return object::delete_property(arena, &object, name, false);
            }
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return Ok(true),
        }
    }
}
