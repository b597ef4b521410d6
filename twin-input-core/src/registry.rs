//! Definition tables and arbitration.
//!
//! Both gesture and voice definitions live in a [`Registry`], which keeps
//! them in registration order and picks a single winner for an input:
//!
//! 1. keep definitions whose matcher accepts the input,
//! 2. drop disabled definitions,
//! 3. drop definitions still inside their cooldown window,
//! 4. drop definitions whose gate is closed right now,
//! 5. take the highest priority, first registered on ties.

use tracing::debug;

use crate::dispatch::Handler;

/// A gating predicate, evaluated at resolution time.
pub type Gate = Box<dyn Fn() -> bool>;

/// Common surface of gesture and voice definitions.
pub trait Definition {
    /// Payload handed to the handler.
    type Event: Clone + std::fmt::Debug + 'static;

    /// Unique id within the registry.
    fn id(&self) -> &str;

    /// Higher wins arbitration.
    fn priority(&self) -> i32;

    /// Minimum time between two firings.
    fn cooldown_ms(&self) -> u64;

    /// When the handler was last invoked.
    fn last_fired_at(&self) -> Option<u64>;

    /// Record that the handler is being invoked at `now_ms`.
    fn mark_fired(&mut self, now_ms: u64);

    /// Whether the definition takes part in arbitration at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// The gating predicate, if any.
    fn gate(&self) -> Option<&Gate>;

    /// The handler invoked on dispatch.
    fn handler_mut(&mut self) -> &mut Handler<Self::Event>;

    /// Whether the cooldown window is still open at `now_ms`.
    fn in_cooldown(&self, now_ms: u64) -> bool {
        self.last_fired_at()
            .is_some_and(|fired| now_ms.saturating_sub(fired) < self.cooldown_ms())
    }

    /// Evaluate the gate; no gate means always open.
    fn gate_open(&self) -> bool {
        self.gate().map_or(true, |gate| gate())
    }
}

/// Ordered table of definitions keyed by id.
pub struct Registry<D> {
    entries: Vec<D>,
}

impl<D: Definition> Registry<D> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a definition.
    ///
    /// A definition with an existing id replaces the old one in its
    /// registration slot and is returned.
    pub fn insert(&mut self, definition: D) -> Option<D> {
        match self.position(definition.id()) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index], definition)),
            None => {
                self.entries.push(definition);
                None
            }
        }
    }

    /// Remove a definition by id.
    pub fn remove(&mut self, id: &str) -> Option<D> {
        self.position(id).map(|index| self.entries.remove(index))
    }

    /// Look up a definition by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&D> {
        self.entries.iter().find(|d| d.id() == id)
    }

    /// Look up a definition by id for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut D> {
        self.entries.iter_mut().find(|d| d.id() == id)
    }

    pub(crate) fn get_index_mut(&mut self, index: usize) -> Option<&mut D> {
        self.entries.get_mut(index)
    }

    /// Ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|d| d.id().to_string()).collect()
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.iter()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|d| d.id() == id)
    }

    /// Pick the winning definition for an input.
    ///
    /// `accepts` decides whether a definition's matcher and constraints
    /// accept the input. Returns the winner's index in registration order.
    pub fn arbitrate(&self, now_ms: u64, accepts: impl Fn(&D) -> bool) -> Option<usize> {
        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, d)| accepts(*d))
            .map(|(index, _)| index)
            .collect();

        let mut winner: Option<(usize, i32)> = None;
        for index in candidates {
            let definition = &self.entries[index];
            if !definition.is_enabled() {
                debug!(definition_id = definition.id(), "Skipped: disabled");
                continue;
            }
            if definition.in_cooldown(now_ms) {
                debug!(definition_id = definition.id(), "Skipped: cooling down");
                continue;
            }
            if !definition.gate_open() {
                debug!(definition_id = definition.id(), "Skipped: gate closed");
                continue;
            }
            let priority = definition.priority();
            if winner.map_or(true, |(_, best)| priority > best) {
                winner = Some((index, priority));
            }
        }

        if let Some((index, priority)) = winner {
            debug!(
                definition_id = self.entries[index].id(),
                priority, "Arbitration winner"
            );
        }
        winner.map(|(index, _)| index)
    }
}

impl<D: Definition> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Definition> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.ids())
            .finish()
    }
}
