//! Handler table: template name to the functions that handle its triggers.
//!
//! The table is built once at startup from plain function pointers. Routing
//! looks up the data source's template, then the event or function name
//! within it.

use std::collections::BTreeMap;

use crate::context::MappingContext;
use crate::error::MappingError;
use crate::event::{Block, Call, Event};

/// Handler for a decoded log event.
pub type EventHandler = fn(&mut MappingContext<'_>, &Event) -> Result<(), MappingError>;

/// Handler for a decoded contract call.
pub type CallHandler = fn(&mut MappingContext<'_>, &Call) -> Result<(), MappingError>;

/// Handler run once per block for every source of the template.
pub type BlockHandler = fn(&mut MappingContext<'_>, &Block) -> Result<(), MappingError>;

/// Handler for the raw bytes of off-chain content.
pub type FileHandler = fn(&mut MappingContext<'_>, &[u8]) -> Result<(), MappingError>;

/// Handlers of one data-source template.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    events: BTreeMap<&'static str, EventHandler>,
    calls: BTreeMap<&'static str, CallHandler>,
    block: Option<BlockHandler>,
    file: Option<FileHandler>,
}

impl HandlerSet {
    /// An empty set, to be filled with [`event`](Self::event),
    /// [`call`](Self::call) and [`block`](Self::block).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A set for a file template.
    #[must_use]
    pub fn file(handler: FileHandler) -> Self {
        Self {
            file: Some(handler),
            ..Self::default()
        }
    }

    /// Handle events named `name`.
    #[must_use]
    pub fn event(mut self, name: &'static str, handler: EventHandler) -> Self {
        self.events.insert(name, handler);
        self
    }

    /// Handle calls to the function named `name`.
    #[must_use]
    pub fn call(mut self, name: &'static str, handler: CallHandler) -> Self {
        self.calls.insert(name, handler);
        self
    }

    /// Handle every block.
    #[must_use]
    pub fn block(mut self, handler: BlockHandler) -> Self {
        self.block = Some(handler);
        self
    }

    /// Handler for event `name`.
    #[must_use]
    pub fn event_handler(&self, name: &str) -> Option<EventHandler> {
        self.events.get(name).copied()
    }

    /// Handler for calls to function `name`.
    #[must_use]
    pub fn call_handler(&self, name: &str) -> Option<CallHandler> {
        self.calls.get(name).copied()
    }

    /// Block handler, if any.
    #[must_use]
    pub const fn block_handler(&self) -> Option<BlockHandler> {
        self.block
    }

    /// File handler, if this is a file template.
    #[must_use]
    pub const fn file_handler(&self) -> Option<FileHandler> {
        self.file
    }

    /// Handled event names, sorted.
    pub fn event_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.events.keys().copied()
    }

    /// Handled function names, sorted.
    pub fn call_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.calls.keys().copied()
    }
}

/// All handler sets, keyed by template name.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    templates: BTreeMap<String, HandlerSet>,
}

impl HandlerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the handler set of `template`.
    #[must_use]
    pub fn with(mut self, template: impl Into<String>, set: HandlerSet) -> Self {
        self.templates.insert(template.into(), set);
        self
    }

    /// Handler set of `template`.
    #[must_use]
    pub fn get(&self, template: &str) -> Option<&HandlerSet> {
        self.templates.get(template)
    }

    /// Whether `template` is known.
    #[must_use]
    pub fn contains(&self, template: &str) -> bool {
        self.templates.contains_key(template)
    }

    /// Templates and their handler sets, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HandlerSet)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_event(_: &mut MappingContext<'_>, _: &Event) -> Result<(), MappingError> {
        Ok(())
    }

    fn noop_file(_: &mut MappingContext<'_>, _: &[u8]) -> Result<(), MappingError> {
        Ok(())
    }

    #[test]
    fn lookup_by_template_and_name() {
        let table = HandlerTable::new()
            .with("Gravity", HandlerSet::new().event("NewGravatar", noop_event))
            .with("Metadata", HandlerSet::file(noop_file));

        let gravity = table.get("Gravity").unwrap();
        assert!(gravity.event_handler("NewGravatar").is_some());
        assert!(gravity.event_handler("UpdatedGravatar").is_none());
        assert!(gravity.file_handler().is_none());

        assert!(table.get("Metadata").unwrap().file_handler().is_some());
        assert!(!table.contains("Unknown"));
        assert_eq!(
            table.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["Gravity", "Metadata"]
        );
    }
}
