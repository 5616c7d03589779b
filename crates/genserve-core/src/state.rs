use std::sync::{Mutex, OnceLock};

use crate::error::SpecializeError;
use crate::handler::LoadedHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unspecialized,
    Specialized,
}

/// The process-wide handler slot.
///
/// ## Publish-Once, Read-Many
/// Readers go through the `OnceLock` without locking. Writers serialize on
/// `transition`, which holds the guard across check → install → publish, so
/// only one caller ever observes `Unspecialized` and runs the installer.
pub struct HandlerCell {
    transition: Mutex<()>,
    slot: OnceLock<LoadedHandler>,
}

impl HandlerCell {
    pub fn new() -> Self {
        Self {
            transition: Mutex::new(()),
            slot: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ContainerState {
        if self.slot.get().is_some() {
            ContainerState::Specialized
        } else {
            ContainerState::Unspecialized
        }
    }

    pub fn get(&self) -> Option<&LoadedHandler> {
        self.slot.get()
    }

    /// Runs `install` at most once successfully for the lifetime of the cell.
    ///
    /// A failed `install` leaves the cell `Unspecialized`. Any attempt made
    /// after a success returns `Conflict` without calling `install`.
    pub(crate) fn transition<T, F>(&self, install: F) -> Result<T, SpecializeError>
    where
        F: FnOnce() -> Result<(LoadedHandler, T), SpecializeError>,
    {
        if self.slot.get().is_some() {
            return Err(SpecializeError::Conflict);
        }

        // The guard protects no data, so a poisoned lock is still usable.
        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.slot.get().is_some() {
            return Err(SpecializeError::Conflict);
        }

        let (handler, ack) = install()?;
        self.slot
            .set(handler)
            .map_err(|_| SpecializeError::Conflict)?;
        Ok(ack)
    }
}

impl Default for HandlerCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerRequest, HandlerResponse};
    use std::sync::Arc;

    static_assertions::assert_impl_all!(HandlerCell: Send, Sync);

    fn noop() -> LoadedHandler {
        Arc::new(|_: &HandlerRequest, _: &mut HandlerResponse| {})
    }

    #[test]
    fn test_failed_install_stays_unspecialized() {
        let cell = HandlerCell::new();
        let result: Result<(), _> =
            cell.transition(|| Err(SpecializeError::Adapt("bad".to_string())));
        assert!(matches!(result, Err(SpecializeError::Adapt(_))));
        assert_eq!(cell.state(), ContainerState::Unspecialized);
        assert!(cell.get().is_none());
    }

    #[test]
    fn test_second_transition_conflicts_without_installing() {
        let cell = HandlerCell::new();
        cell.transition(|| Ok((noop(), ()))).unwrap();
        assert_eq!(cell.state(), ContainerState::Specialized);

        let mut called = false;
        let result = cell.transition(|| {
            called = true;
            Ok((noop(), ()))
        });
        assert!(matches!(result, Err(SpecializeError::Conflict)));
        assert!(!called);
    }

    #[test]
    fn test_panicking_installer_does_not_wedge_the_cell() {
        let cell = Arc::new(HandlerCell::new());
        let c = cell.clone();
        let joined = std::thread::spawn(move || {
            let _: Result<(), _> = c.transition(|| panic!("installer blew up"));
        })
        .join();
        assert!(joined.is_err());
        assert_eq!(cell.state(), ContainerState::Unspecialized);

        cell.transition(|| Ok((noop(), ()))).unwrap();
        assert_eq!(cell.state(), ContainerState::Specialized);
    }
}
