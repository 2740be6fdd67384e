//! Terminal keyboard input
//!
//! Puts the terminal in raw mode so single key presses (and Ctrl+C) arrive
//! as events, and forwards the bound ones to the controller as
//! [`Event::Command`]s.

use crossterm::event::{self, Event as TermEvent};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use crate::console;
use crate::control::{ControlCommand, Event};
use crate::error::{Result, SweepError};

/// Holds the terminal in raw mode; restores it when dropped
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        enable_raw_mode()
            .map_err(|e| SweepError::terminal(format!("Failed to enable raw mode: {}", e)))?;
        console::set_raw_mode(true);
        tracing::debug!("Terminal in raw mode");
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Leave raw mode if it is active. Safe to call more than once.
pub fn restore_terminal() {
    if console::raw_mode_active() {
        console::set_raw_mode(false);
        if let Err(e) = disable_raw_mode() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Spawn a thread forwarding key presses as control commands.
///
/// The thread stops when the controller drops its receiver or the terminal
/// stops delivering events.
pub fn spawn_key_reader(events: Sender<Event>) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::debug!("Key reader started");
        loop {
            let key = match event::read() {
                Ok(TermEvent::Key(key)) => key,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Keyboard input stopped: {}", e);
                    break;
                }
            };

            let Some(command) = ControlCommand::from_key(&key) else {
                continue;
            };
            tracing::debug!("Key {:?} -> {:?}", key.code, command);
            if events.send(Event::Command(command)).is_err() {
                break;
            }
        }
        tracing::debug!("Key reader shut down");
    })
}
