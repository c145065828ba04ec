//! Dependency blockers.
//!
//! A blocker holds entries waiting on sets of ids. The conflict manager runs
//! two of them: `pending_accept` (acceptors) and `pending_reject`
//! (rejectors). Entries live in an arena and are addressed by index through a
//! watch map, so firing never chases references back into the manager.

use std::collections::{HashMap, HashSet};

use snowdag_ids::Id;

/// When an entry fires relative to its dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRule {
    /// Fires once every dependency has been fulfilled; dies when any
    /// dependency is abandoned. Used by acceptors.
    AllFulfilled,
    /// Fires on the first fulfilled dependency; abandoning a dependency only
    /// prunes it. Used by rejectors.
    AnyFulfilled,
}

#[derive(Debug)]
struct Entry {
    payload: Id,
    deps: HashSet<Id>,
    rule: FireRule,
    done: bool,
}

/// An event registry of dependency-blocked entries.
#[derive(Debug, Default)]
pub struct Blocker {
    entries: Vec<Entry>,
    watching: HashMap<Id, Vec<usize>>,
}

impl Blocker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry carrying `payload`, blocked on `deps`.
    ///
    /// Returns `Some(payload)` when the entry fires immediately: an
    /// `AllFulfilled` entry with an empty dependency set has nothing to wait
    /// for.
    pub fn register<I>(&mut self, payload: Id, deps: I, rule: FireRule) -> Option<Id>
    where
        I: IntoIterator<Item = Id>,
    {
        let deps: HashSet<Id> = deps.into_iter().collect();
        if deps.is_empty() {
            return match rule {
                FireRule::AllFulfilled => Some(payload),
                FireRule::AnyFulfilled => None,
            };
        }

        let index = self.entries.len();
        for dep in &deps {
            self.watching.entry(*dep).or_default().push(index);
        }
        self.entries.push(Entry {
            payload,
            deps,
            rule,
            done: false,
        });
        None
    }

    /// Marks `id` fulfilled and returns the payloads of entries that fired.
    ///
    /// Each entry fires at most once over its lifetime.
    pub fn fulfill(&mut self, id: Id) -> Vec<Id> {
        let mut fired = Vec::new();
        let Some(indices) = self.watching.remove(&id) else {
            return fired;
        };
        for index in indices {
            let entry = &mut self.entries[index];
            if entry.done {
                continue;
            }
            entry.deps.remove(&id);
            match entry.rule {
                FireRule::AnyFulfilled => {
                    entry.done = true;
                    fired.push(entry.payload);
                }
                FireRule::AllFulfilled => {
                    if entry.deps.is_empty() {
                        entry.done = true;
                        fired.push(entry.payload);
                    }
                }
            }
        }
        fired
    }

    /// Marks `id` abandoned. `AllFulfilled` entries waiting on it die without
    /// firing; `AnyFulfilled` entries merely stop watching it.
    pub fn abandon(&mut self, id: Id) {
        let Some(indices) = self.watching.remove(&id) else {
            return;
        };
        for index in indices {
            let entry = &mut self.entries[index];
            if entry.done {
                continue;
            }
            entry.deps.remove(&id);
            if entry.rule == FireRule::AllFulfilled {
                entry.done = true;
            }
        }
    }

    /// Count of entries still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.done).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
