//! The scoped symbol table built up while parsing.
//!
//! Scopes live in a single arena owned by [`ParsingContext`] and refer to their
//! parents by [`ScopeId`], so a retained block scope never owns its parent and the
//! table has no reference cycles.
//!
//! Every mutation is journaled. The matcher takes a [`Checkpoint`] before each
//! speculative attempt and either rolls back to it, or detaches the attempt's changes
//! as a [`Changeset`] that can be replayed once the attempt is chosen. Scope ids are
//! allocated sequentially, so a changeset replayed at its original checkpoint opens
//! the same ids it did when it was recorded.
//!
//! The journal is cleared by [`ParsingContext::settle`] once no attempt is open, so
//! it only ever holds the changes of the current top-level statement.

use std::{collections::BTreeMap, fmt::Display};

use tracing::trace;

use crate::grammar::types::TypeSpec;

/// An index into the scope arena of a [`ParsingContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The root scope, which every context has.
    pub const ROOT: ScopeId = ScopeId(0);
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One lexical scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Scope {
    /// The enclosing scope; `None` only for the root.
    parent: Option<ScopeId>,
    /// The symbols declared directly in this scope.
    symbols: BTreeMap<String, TypeSpec>,
}

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    /// A scope was appended to the arena with the given parent.
    Open(ScopeId),
    /// `name` was bound to `ty` in `scope`, replacing `previous`.
    Declare {
        /// The scope written to.
        scope: ScopeId,
        /// The declared name.
        name: String,
        /// The new binding.
        ty: TypeSpec,
        /// The binding it replaced, if any.
        previous: Option<TypeSpec>,
    },
}

/// A position in the journal of a [`ParsingContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// The journal length when the checkpoint was taken.
    journal: usize,
}

/// The mutations made after some [`Checkpoint`], detached from their context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// The changes, oldest first.
    changes: Vec<Change>,
}

impl Changeset {
    /// Returns `true` if the detached attempt changed nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A scope-chain symbol table mapping names to types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingContext {
    /// Every scope ever opened; the root is at index 0.
    scopes: Vec<Scope>,
    /// Every mutation, oldest first.
    journal: Vec<Change>,
}

impl Default for ParsingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ParsingContext {
    /// Constructs a context holding an empty root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            journal: Vec::new(),
        }
    }

    /// Opens a new scope whose parent is `parent`.
    pub fn open_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: BTreeMap::new(),
        });
        self.journal.push(Change::Open(parent));
        id
    }

    /// Binds `name` to `ty` in `scope`, shadowing any binding in an enclosing scope.
    pub fn declare(&mut self, scope: ScopeId, name: impl Into<String>, ty: TypeSpec) {
        let name = name.into();
        if let Some(target) = self.scopes.get_mut(scope.0) {
            let previous = target.symbols.insert(name.clone(), ty.clone());
            self.journal.push(Change::Declare {
                scope,
                name,
                ty,
                previous,
            });
        }
    }

    /// Looks `name` up in `scope` and then in each enclosing scope.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&TypeSpec> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id.0)?;
            if let Some(ty) = scope.symbols.get(name) {
                return Some(ty);
            }
            current = scope.parent;
        }
        None
    }

    /// Looks `name` up in `scope` only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&TypeSpec> {
        self.scopes.get(scope.0)?.symbols.get(name)
    }

    /// Returns `true` if `name` is visible from `scope`.
    #[inline(always)]
    pub fn has_global(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup(scope, name).is_some()
    }

    /// Returns `true` if `name` is declared in `scope` itself.
    #[inline(always)]
    pub fn has_local(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup_local(scope, name).is_some()
    }

    /// Returns the parent of `scope`.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0)?.parent
    }

    /// Returns the symbols declared directly in `scope`, ordered by name.
    pub fn symbols(&self, scope: ScopeId) -> impl Iterator<Item = (&str, &TypeSpec)> {
        self.scopes
            .get(scope.0)
            .into_iter()
            .flat_map(|scope| scope.symbols.iter())
            .map(|(name, ty)| (name.as_str(), ty))
    }

    /// Returns the ids of every scope, the root first.
    pub fn scopes(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len()).map(ScopeId)
    }

    /// Marks the current state so that later changes can be undone.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal: self.journal.len(),
        }
    }

    /// Undoes every change made after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let changes = self.detach(checkpoint);
        if !changes.is_empty() {
            trace!(undone = changes.changes.len(), "rolled back context");
        }
    }

    /// Undoes every change made after `checkpoint` and returns them, so that they
    /// can be reapplied with [`ParsingContext::replay`].
    pub fn detach(&mut self, checkpoint: Checkpoint) -> Changeset {
        let start = checkpoint.journal.min(self.journal.len());
        let changes = self.journal.split_off(start);

        for change in changes.iter().rev() {
            match change {
                Change::Open(_) => {
                    self.scopes.pop();
                }
                Change::Declare {
                    scope,
                    name,
                    previous,
                    ..
                } => {
                    if let Some(target) = self.scopes.get_mut(scope.0) {
                        match previous {
                            Some(ty) => target.symbols.insert(name.clone(), ty.clone()),
                            None => target.symbols.remove(name),
                        };
                    }
                }
            }
        }

        Changeset { changes }
    }

    /// Makes every change so far permanent and empties the journal.
    ///
    /// No checkpoint taken before this call may be used afterwards.
    pub fn settle(&mut self) {
        if !self.journal.is_empty() {
            trace!(settled = self.journal.len(), "settled context");
            self.journal.clear();
        }
    }

    /// Reapplies a detached changeset.
    ///
    /// The context must be in the state the changeset was detached from.
    pub fn replay(&mut self, changeset: Changeset) {
        for change in changeset.changes {
            match change {
                Change::Open(parent) => {
                    self.open_scope(parent);
                }
                Change::Declare { scope, name, ty, .. } => self.declare(scope, name, ty),
            }
        }
    }
}

impl Display for ParsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, ty) in self.symbols(ScopeId::ROOT) {
            writeln!(f, "{name}: {ty}")?;
        }
        Ok(())
    }
}
