//! Compiled-in mechanism set, ordered by priority.
//!
//! The registry is an explicit value built once at process start and passed
//! by reference into each connection attempt; there is no ambient global
//! mechanism table.

use std::fmt;

use thiserror::Error;

use crate::mechanism::external::{Delegated, EXTERNAL};
use crate::mechanism::plain::{Plain, PLAIN};
use crate::mechanism::scram::{ScramSha256, SCRAM_SHA_256};
use crate::mechanism::Mechanism;

pub type Factory = Box<dyn Fn() -> Box<dyn Mechanism + Send> + Send + Sync>;

pub struct Entry {
    name: &'static str,
    /// Higher priority is tried before lower. Distinct per registry.
    priority: i8,
    /// Whether the mechanism is acceptable over an unencrypted channel
    /// (i.e. its design never exposes the credential in the clear).
    plaintext_safe: bool,
    factory: Factory,
}

impl Entry {
    pub fn new(name: &'static str, priority: i8, plaintext_safe: bool, factory: Factory) -> Self {
        Self {
            name,
            priority,
            plaintext_safe,
            factory,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> i8 {
        self.priority
    }

    pub fn plaintext_safe(&self) -> bool {
        self.plaintext_safe
    }

    /// Builds a fresh per-attempt mechanism instance.
    pub fn instantiate(&self) -> Box<dyn Mechanism + Send> {
        (self.factory)()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("plaintext_safe", &self.plaintext_safe)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("mechanism `{0}` is already registered")]
    DuplicateName(&'static str),
    #[error("priority {0} is already taken by `{1}`")]
    DuplicatePriority(i8, &'static str),
}

#[derive(Debug, Default)]
pub struct Registry {
    // Kept sorted by descending priority.
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in mechanisms: EXTERNAL (delegated to
    /// the transport's client certificate), SCRAM-SHA-256 and PLAIN.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // Names and priorities are distinct by construction, so none of
        // these registrations can fail.
        let builtin = [
            Entry::new(EXTERNAL, 80, false, Box::new(|| {
                Box::new(Delegated::external()) as Box<dyn Mechanism + Send>
            }) as Factory),
            Entry::new(SCRAM_SHA_256, 50, true, Box::new(|| {
                Box::new(ScramSha256::new()) as Box<dyn Mechanism + Send>
            }) as Factory),
            Entry::new(PLAIN, 10, false, Box::new(|| {
                Box::new(Plain::new()) as Box<dyn Mechanism + Send>
            }) as Factory),
        ];
        for entry in builtin {
            if let Err(err) = registry.register(entry) {
                tracing::error!(err = %err, "built-in mechanism table is inconsistent");
            }
        }
        registry
    }

    pub fn register(&mut self, entry: Entry) -> Result<(), RegistryError> {
        for existing in self.entries.iter() {
            if existing.name == entry.name {
                return Err(RegistryError::DuplicateName(entry.name));
            }
            if existing.priority == entry.priority {
                return Err(RegistryError::DuplicatePriority(
                    entry.priority,
                    existing.name,
                ));
            }
        }
        let at = self
            .entries
            .partition_point(|e| e.priority > entry.priority);
        self.entries.insert(at, entry);
        Ok(())
    }

    /// All mechanisms both sides support and local policy permits, in
    /// descending priority order. `allow_plaintext_channel` is true when
    /// the channel is secured or policy explicitly tolerates plaintext.
    pub fn eligible<'a>(
        &'a self,
        offered: &'a [String],
        allow_plaintext_channel: bool,
    ) -> impl Iterator<Item = &'a Entry> {
        self.entries.iter().filter(move |entry| {
            offered.iter().any(|name| name == entry.name)
                && (allow_plaintext_channel || entry.plaintext_safe)
        })
    }

    /// Deterministic selection: the highest-priority eligible entry. The
    /// returned borrow is tied to the registry, not to `offered`.
    pub fn select(
        &self,
        offered: &[String],
        allow_plaintext_channel: bool,
    ) -> Option<&Entry> {
        self.entries.iter().find(|entry| {
            offered.iter().any(|name| name == entry.name)
                && (allow_plaintext_channel || entry.plaintext_safe)
        })
    }
}
