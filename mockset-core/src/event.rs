//! Lifecycle events fired by mock sets.

use std::{collections::BTreeMap, fmt, rc::Rc, str::FromStr};

use crate::{error::MockError, model::Item};

/// Lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    /// An item was added to the set.
    Added,
    /// An item was changed by `update`.
    Updated,
    /// An item was added or updated.
    Saved,
    /// An item was removed by `delete`.
    Deleted,
}

impl Event {
    /// The event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Added => "added",
            Event::Updated => "updated",
            Event::Saved => "saved",
            Event::Deleted => "deleted",
        }
    }
}

impl FromStr for Event {
    type Err = MockError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "added" => Ok(Event::Added),
            "updated" => Ok(Event::Updated),
            "saved" => Ok(Event::Saved),
            "deleted" => Ok(Event::Deleted),
            other => Err(MockError::InvalidValue(format!(
                "Unsupported event '{other}'. Choices are 'added', 'deleted', 'saved', 'updated'."
            ))),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event handler.
pub type Handler = Rc<dyn Fn(Event, &Item)>;

/// Handlers registered per event, in registration order.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: BTreeMap<Event, Vec<Handler>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`.
    pub fn on<F>(&mut self, event: Event, handler: F)
    where
        F: Fn(Event, &Item) + 'static,
    {
        self.handlers
            .entry(event)
            .or_default()
            .push(Rc::new(handler));
    }

    /// Handlers for `event`, cloned so they can run without holding the
    /// registry.
    pub fn handlers(&self, event: Event) -> Vec<Handler> {
        self.handlers
            .get(&event)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for `event`.
    pub fn count(&self, event: Event) -> usize {
        self.handlers
            .get(&event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }

    /// Calls every handler of each event in `events`, in order.
    pub fn fire(&self, item: &Item, events: &[Event]) {
        for event in events {
            for handler in self.handlers(*event) {
                handler(*event, item);
            }
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (event, handlers) in &self.handlers {
            map.entry(event, &handlers.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::cell::RefCell;

    #[test]
    fn handlers_run_in_registration_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = EventRegistry::new();

        for tag in ["first", "second"] {
            let calls = calls.clone();
            registry.on(Event::Added, move |event, _| calls.borrow_mut().push((event, tag)));
        }
        let saved = calls.clone();
        registry.on(Event::Saved, move |event, _| saved.borrow_mut().push((event, "saved")));

        registry.fire(&Item::new(Record::new()), &[Event::Added, Event::Saved]);

        assert_eq!(
            *calls.borrow(),
            vec![(Event::Added, "first"), (Event::Added, "second"), (Event::Saved, "saved")]
        );
    }

    #[test]
    fn unknown_event_names_are_rejected() {
        assert_eq!("deleted".parse::<Event>(), Ok(Event::Deleted));
        assert!("removed".parse::<Event>().is_err());
    }
}
