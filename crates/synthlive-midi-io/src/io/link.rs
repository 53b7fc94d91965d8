//! Pieces shared by the input and output port workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use midir::MidiIO;

use crate::error::{Error, Result};

/// Connection status written by a worker thread and read by its manager.
#[derive(Clone)]
pub(crate) struct LinkState {
    port_name: Arc<ArcSwap<Option<String>>>,
    up: Arc<AtomicBool>,
}

impl LinkState {
    pub(crate) fn new() -> Self {
        Self {
            port_name: Arc::new(ArcSwap::from_pointee(None)),
            up: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn mark_up(&self, name: String) {
        self.port_name.store(Arc::new(Some(name)));
        self.up.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_down(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.port_name.store(Arc::new(None));
    }

    pub(crate) fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    pub(crate) fn port_name(&self) -> Option<String> {
        Option::clone(&self.port_name.load())
    }
}

/// `(index, name)` for every port the backend reports.
pub(crate) fn port_names<T: MidiIO>(backend: &T) -> Vec<(usize, String)> {
    backend
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| {
            let name = backend
                .port_name(port)
                .unwrap_or_else(|_| format!("Port {}", index));
            (index, name)
        })
        .collect()
}

/// First port whose name contains `pattern`, ignoring case.
pub(crate) fn match_port(
    ports: &[(usize, String)],
    pattern: &str,
    direction: &'static str,
) -> Result<usize> {
    let needle = pattern.to_lowercase();
    ports
        .iter()
        .find(|(_, name)| name.to_lowercase().contains(&needle))
        .map(|(index, _)| *index)
        .ok_or_else(|| Error::PortNotFound {
            direction,
            pattern: pattern.to_string(),
        })
}

/// Resolve `index` to a port and its display name.
pub(crate) fn open_port<T: MidiIO>(backend: &T, index: usize) -> Result<(T::Port, String)> {
    let port = backend
        .ports()
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::MidiPort(format!("port {} no longer exists", index)))?;
    let name = backend
        .port_name(&port)
        .unwrap_or_else(|_| format!("Port {}", index));
    Ok((port, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<(usize, String)> {
        vec![
            (0, "Midi Through Port-0".to_string()),
            (1, "UM-ONE:UM-ONE MIDI 1".to_string()),
        ]
    }

    #[test]
    fn test_match_port_is_case_insensitive() {
        assert_eq!(match_port(&ports(), "um-one", "input").unwrap(), 1);
        assert_eq!(match_port(&ports(), "THROUGH", "output").unwrap(), 0);
    }

    #[test]
    fn test_match_port_reports_direction() {
        let err = match_port(&ports(), "XP-50", "output").unwrap_err();
        assert!(matches!(
            err,
            Error::PortNotFound { direction: "output", ref pattern } if pattern == "XP-50"
        ));
    }

    #[test]
    fn test_link_state_transitions() {
        let link = LinkState::new();
        let reader = link.clone();
        assert!(!reader.is_up());

        link.mark_up("UM-ONE".to_string());
        assert!(reader.is_up());
        assert_eq!(reader.port_name().as_deref(), Some("UM-ONE"));

        link.mark_down();
        assert!(!reader.is_up());
        assert_eq!(reader.port_name(), None);
    }
}
