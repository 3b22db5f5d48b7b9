//! Native-side port bookkeeping.
//!
//! State transitions are monotonic: `Idle -> Started -> Closed` or
//! `Idle|Started -> Transferred`, with `Idle -> Closed` also allowed. Every
//! check happens before any state changes, so a failed call leaves the table
//! as it was.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::{PortCallback, PortError, port_label};
use crate::script::PortRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Idle,
    Started,
    Closed,
    Transferred,
}

struct PortEntry {
    state: PortState,
    on_message: Option<PortCallback>,
}

impl PortEntry {
    fn idle() -> Self {
        Self {
            state: PortState::Idle,
            on_message: None,
        }
    }
}

pub(crate) struct PortTable {
    channels: DashMap<String, [PortEntry; 2]>,
}

impl PortTable {
    pub(crate) fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub(crate) fn create(&self, channel_id: &str) {
        self.channels
            .insert(channel_id.to_string(), [PortEntry::idle(), PortEntry::idle()]);
    }

    pub(crate) fn state(&self, port: &PortRef) -> Option<PortState> {
        let channel = self.channels.get(&port.channel_id)?;
        channel.get(port.index as usize).map(|entry| entry.state)
    }

    /// Fail unless `port` may still send or be started.
    fn ensure_open(&self, port: &PortRef) -> Result<PortState, PortError> {
        match self.state(port) {
            Some(state @ (PortState::Idle | PortState::Started)) => Ok(state),
            Some(PortState::Closed) => Err(PortError::Closed {
                port: port_label(port),
            }),
            Some(PortState::Transferred) => Err(PortError::Transferred {
                port: port_label(port),
            }),
            None => Err(PortError::UnknownChannel {
                port: port_label(port),
            }),
        }
    }

    fn set(&self, port: &PortRef, state: PortState, on_message: Option<PortCallback>) {
        if let Some(mut channel) = self.channels.get_mut(&port.channel_id)
            && let Some(entry) = channel.get_mut(port.index as usize)
        {
            entry.state = state;
            entry.on_message = on_message;
        }
    }

    pub(crate) fn start(&self, port: &PortRef, on_message: PortCallback) -> Result<(), PortError> {
        if self.ensure_open(port)? == PortState::Started {
            return Err(PortError::AlreadyStarted {
                port: port_label(port),
            });
        }
        self.set(port, PortState::Started, Some(on_message));
        Ok(())
    }

    /// Validate a send from `sender` (if any) carrying `transfer`, then mark
    /// every transferred port. All or nothing.
    pub(crate) fn transfer(&self, sender: Option<&PortRef>, transfer: &[PortRef]) -> Result<(), PortError> {
        if let Some(sender) = sender {
            self.ensure_open(sender)?;
        }

        let mut seen = HashSet::new();
        for port in transfer {
            if sender == Some(port) {
                return Err(PortError::SelfTransfer {
                    port: port_label(port),
                });
            }
            self.ensure_open(port)?;
            if !seen.insert(port) {
                return Err(PortError::Transferred {
                    port: port_label(port),
                });
            }
        }

        for port in transfer {
            self.set(port, PortState::Transferred, None);
        }
        Ok(())
    }

    /// Mark `port` closed. Returns `false` when it was already closed or
    /// transferred away.
    pub(crate) fn close(&self, port: &PortRef) -> Result<bool, PortError> {
        match self.state(port) {
            Some(PortState::Idle | PortState::Started) => {
                self.set(port, PortState::Closed, None);
                Ok(true)
            }
            Some(PortState::Closed | PortState::Transferred) => Ok(false),
            None => Err(PortError::UnknownChannel {
                port: port_label(port),
            }),
        }
    }

    /// The message handler of a started port.
    pub(crate) fn callback(&self, port: &PortRef) -> Option<PortCallback> {
        let channel = self.channels.get(&port.channel_id)?;
        let entry = channel.get(port.index as usize)?;
        match entry.state {
            PortState::Started => entry.on_message.as_ref().map(Arc::clone),
            _ => None,
        }
    }

    /// Forget every channel. Returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let count = self.channels.len();
        self.channels.clear();
        count
    }
}
