//! Model managers and scoped manager patching.
//!
//! Code under test reaches a model's set through [`objects`] (or
//! [`Managed::objects`]). Tests install a set for a model label with
//! [`patch_manager`]; the returned [`PatchGuard`] restores whatever was
//! installed before when it is dropped. With nothing installed the
//! connection is disabled and every lookup fails loudly.
//!
//! Patches are kept per thread, so tests running in parallel never observe
//! each other's sets.

use std::{cell::RefCell, collections::BTreeMap};

use tracing::debug;

use mockset_core::{
    descriptor::Descriptor,
    error::{MockError, MockResult},
    model::{Item, Model},
};
use mockset_memory::MockSet;

thread_local! {
    static MANAGERS: RefCell<BTreeMap<String, MockSet>> = const { RefCell::new(BTreeMap::new()) };
}

/// Builds the error raised when a model is queried with no set installed.
pub fn disabled_connection(label: &str) -> MockError {
    MockError::NotSupported(format!(
        "Mock database tried to execute SQL for {label} model."
    ))
}

/// Installs `set` as the manager of the model labelled `label` until the
/// returned guard is dropped.
///
/// Patches nest: dropping the guard restores the previously installed set,
/// if any.
#[must_use = "the patch is undone as soon as the guard is dropped"]
pub fn patch_manager(label: impl Into<String>, set: MockSet) -> PatchGuard {
    let label = label.into();
    let previous = MANAGERS.with(|managers| managers.borrow_mut().insert(label.clone(), set));

    debug!(label = %label, "patched manager");
    PatchGuard { label, previous }
}

/// The set installed for `label`.
///
/// # Errors
///
/// Returns [`MockError::NotSupported`] when no set is installed.
pub fn objects(label: &str) -> MockResult<MockSet> {
    MANAGERS
        .with(|managers| managers.borrow().get(label).cloned())
        .ok_or_else(|| disabled_connection(label))
}

/// Returns `true` if a set is installed for `label`.
pub fn is_patched(label: &str) -> bool {
    MANAGERS.with(|managers| managers.borrow().contains_key(label))
}

/// Restores a model's previous manager when dropped.
#[derive(Debug)]
pub struct PatchGuard {
    label: String,
    previous: Option<MockSet>,
}

impl PatchGuard {
    /// Label of the patched model.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for PatchGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();

        MANAGERS.with(|managers| {
            let mut managers = managers.borrow_mut();
            match previous {
                Some(set) => {
                    managers.insert(self.label.clone(), set);
                }
                None => {
                    managers.remove(&self.label);
                }
            }
        });

        debug!(label = %self.label, "restored manager");
    }
}

/// Models with a manager, usually implemented by `#[derive(Model)]`.
pub trait Managed: Model + Sized {
    /// The descriptor shared by every instance of the model on this thread.
    fn model_descriptor() -> Descriptor;

    /// The model label managers are keyed by.
    fn manager_label() -> String {
        Self::model_descriptor().label().to_string()
    }

    /// The set installed for this model.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::NotSupported`] when no set is installed.
    fn objects() -> MockResult<MockSet> {
        objects(&Self::manager_label())
    }

    /// Installs a new set bound to this model, seeded with `items`.
    fn patch_objects<I>(items: I) -> (PatchGuard, MockSet)
    where
        I: IntoIterator<Item = Self>,
        Item: From<Self>,
    {
        let set = MockSet::new_collection(Some(Self::model_descriptor()), items);
        (patch_manager(Self::manager_label(), set.clone()), set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::record;

    #[test]
    fn unpatched_models_fail_loudly() {
        assert_eq!(
            objects("Car").unwrap_err().to_string(),
            "Mock database tried to execute SQL for Car model."
        );
    }

    #[test]
    fn guards_restore_the_previous_set() {
        let outer = MockSet::with_items([record! { "id" => 1 }]);
        let inner = MockSet::new();

        let outer_guard = patch_manager("Car", outer.clone());
        {
            let _inner_guard = patch_manager("Car", inner.clone());
            assert_eq!(objects("Car").unwrap(), inner);
        }

        assert_eq!(objects("Car").unwrap(), outer);
        drop(outer_guard);
        assert!(!is_patched("Car"));
    }
}
