//! Shutdown signal driven by the test instead of the operating system.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::process::shutdown::{ShutdownError, ShutdownSignal};

/// Blocks until the paired sender delivers a signal number.
///
/// Dropping the sender without sending reports [`ShutdownError::Closed`].
pub struct ScriptedShutdown {
    receiver: Mutex<Receiver<i32>>,
}

impl ScriptedShutdown {
    /// Builds a signal and the sender that triggers it.
    #[must_use]
    pub fn new() -> (Self, Sender<i32>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                receiver: Mutex::new(receiver),
            },
            sender,
        )
    }
}

impl ShutdownSignal for ScriptedShutdown {
    fn wait(&self) -> Result<i32, ShutdownError> {
        self.receiver
            .lock()
            .expect("shutdown receiver mutex poisoned")
            .recv()
            .map_err(|_| ShutdownError::Closed)
    }
}
