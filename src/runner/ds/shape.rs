//! Hidden-class shape manager.
//!
//! Every object points at a shape describing its property layout. Adding a
//! property moves the object along a transition edge keyed by
//! `(shape, name, attributes)`; two objects built by the same property
//! sequence end up sharing the exact same shape node. Nodes live in an arena
//! owned by the engine and are addressed by index, never freed.

use std::collections::HashMap;

pub type ShapeId = usize;

/// Property attribute bits. Part of the transition key, so adding the same
/// name with different attributes forks a different shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyAttributes {
    pub fn default_data() -> Self {
        PropertyAttributes {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn hidden() -> Self {
        PropertyAttributes {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn sealed() -> Self {
        PropertyAttributes {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlotInfo {
    pub index: usize,
    pub attributes: PropertyAttributes,
}

/// One node of the transition graph. The full name-to-slot table is
/// materialized per node so lookup never walks parents.
pub struct Shape {
    pub parent: Option<ShapeId>,
    /// The property whose addition created this node from `parent`.
    pub added: Option<(String, PropertyAttributes)>,
    pub slot_count: usize,
    slots: HashMap<String, SlotInfo>,
}

impl Shape {
    pub fn lookup(&self, name: &str) -> Option<SlotInfo> {
        self.slots.get(name).copied()
    }

    /// Property names in slot order.
    pub fn names_in_order(&self) -> Vec<String> {
        let mut names: Vec<(&String, usize)> =
            self.slots.iter().map(|(n, s)| (n, s.index)).collect();
        names.sort_by_key(|(_, i)| *i);
        names.into_iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn enumerable_names(&self) -> Vec<String> {
        let mut names: Vec<(&String, usize)> = self
            .slots
            .iter()
            .filter(|(_, s)| s.attributes.enumerable)
            .map(|(n, s)| (n, s.index))
            .collect();
        names.sort_by_key(|(_, i)| *i);
        names.into_iter().map(|(n, _)| n.clone()).collect()
    }
}

#[derive(Hash, PartialEq, Eq)]
struct TransitionKey {
    from: ShapeId,
    name: String,
    attributes: PropertyAttributes,
}

/// Arena of shape nodes plus the shared transition edges.
pub struct ShapeArena {
    shapes: Vec<Shape>,
    transitions: HashMap<TransitionKey, ShapeId>,
}

impl ShapeArena {
    /// Creates the arena with the root (empty) shape at index 0.
    pub fn new() -> Self {
        let root = Shape {
            parent: None,
            added: None,
            slot_count: 0,
            slots: HashMap::new(),
        };
        ShapeArena {
            shapes: vec![root],
            transitions: HashMap::new(),
        }
    }

    pub fn root(&self) -> ShapeId {
        0
    }

    pub fn get(&self, id: ShapeId) -> &Shape {
        &self.shapes[id]
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Follow (or create) the transition edge for adding `name` with the
    /// given attributes. Identical additions from the same shape always
    /// return the same node.
    pub fn transition(
        &mut self,
        from: ShapeId,
        name: &str,
        attributes: PropertyAttributes,
    ) -> ShapeId {
        let key = TransitionKey {
            from,
            name: name.to_string(),
            attributes,
        };
        if let Some(existing) = self.transitions.get(&key) {
            return *existing;
        }
        let parent = &self.shapes[from];
        let mut slots = parent.slots.clone();
        let index = parent.slot_count;
        slots.insert(name.to_string(), SlotInfo { index, attributes });
        let child = Shape {
            parent: Some(from),
            added: Some((name.to_string(), attributes)),
            slot_count: index + 1,
            slots,
        };
        let id = self.shapes.len();
        self.shapes.push(child);
        self.transitions.insert(key, id);
        id
    }

    pub fn lookup(&self, shape: ShapeId, name: &str) -> Option<SlotInfo> {
        self.shapes[shape].lookup(name)
    }

    /// Build a shape for an arbitrary layout, bypassing the shared edges.
    /// Used after deletions and attribute changes, where reconverging on the
    /// add-transition graph would corrupt slot indexes of live objects.
    pub fn rebuilt(&mut self, layout: &[(String, PropertyAttributes)]) -> ShapeId {
        let mut slots = HashMap::new();
        for (index, (name, attributes)) in layout.iter().enumerate() {
            slots.insert(
                name.clone(),
                SlotInfo {
                    index,
                    attributes: *attributes,
                },
            );
        }
        let shape = Shape {
            parent: None,
            added: None,
            slot_count: layout.len(),
            slots,
        };
        let id = self.shapes.len();
        self.shapes.push(shape);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_arena_holds_only_the_root() {
        let arena = ShapeArena::new();
        assert!(!arena.is_empty());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn identical_additions_share_nodes() {
        let mut arena = ShapeArena::new();
        let attrs = PropertyAttributes::default_data();
        let a1 = arena.transition(arena.root(), "x", attrs);
        let a2 = arena.transition(arena.root(), "x", attrs);
        assert_eq!(a1, a2);
        let b1 = arena.transition(a1, "y", attrs);
        let b2 = arena.transition(a2, "y", attrs);
        assert_eq!(b1, b2);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn different_attributes_fork() {
        let mut arena = ShapeArena::new();
        let a = arena.transition(arena.root(), "x", PropertyAttributes::default_data());
        let b = arena.transition(arena.root(), "x", PropertyAttributes::hidden());
        assert_ne!(a, b);
    }

    #[test]
    fn different_order_means_different_shape() {
        let mut arena = ShapeArena::new();
        let attrs = PropertyAttributes::default_data();
        let xy = {
            let x = arena.transition(arena.root(), "x", attrs);
            arena.transition(x, "y", attrs)
        };
        let yx = {
            let y = arena.transition(arena.root(), "y", attrs);
            arena.transition(y, "x", attrs)
        };
        assert_ne!(xy, yx);
        assert_eq!(arena.lookup(xy, "y").unwrap().index, 1);
        assert_eq!(arena.lookup(yx, "y").unwrap().index, 0);
    }

    #[test]
    fn rebuilt_shapes_are_not_shared() {
        let mut arena = ShapeArena::new();
        let attrs = PropertyAttributes::default_data();
        let layout = vec![("x".to_string(), attrs)];
        let a = arena.rebuilt(&layout);
        let b = arena.rebuilt(&layout);
        assert_ne!(a, b);
    }
}
