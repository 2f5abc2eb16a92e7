//! Task that owns a session controller for the lifetime of its view.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use simulado_core::model::{ExamId, SessionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ControllerError;

use super::command::SessionCommand;
use super::controller::SessionController;
use super::observer::SessionObserver;

/// Shared flag that tells in-flight work whether its view still exists.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a spawned session.
///
/// Dropping the handle tears the session down like [`SessionHandle::dispose`].
pub struct SessionHandle {
    exam_id: ExamId,
    session_id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    pending: Arc<AtomicBool>,
    liveness: Liveness,
    observer: Arc<dyn SessionObserver>,
    task: Option<JoinHandle<()>>,
}

/// Move `controller` onto its own task.
///
/// The task multiplexes user commands with cadence firings, so ticks and
/// operations never overlap. Must be called from within a tokio runtime.
#[must_use]
pub fn spawn(controller: SessionController) -> SessionHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicBool::new(false));
    let handle_pending = Arc::clone(&pending);
    let liveness = controller.liveness();
    let observer = controller.observer();
    let exam_id = controller.exam_id().clone();
    let session_id = controller.session_id();

    let task = tokio::spawn(drive(controller, receiver, pending));

    SessionHandle {
        exam_id,
        session_id,
        commands,
        pending: handle_pending,
        liveness,
        observer,
        task: Some(task),
    }
}

async fn drive(
    mut controller: SessionController,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    pending: Arc<AtomicBool>,
) {
    let session_id = controller.session_id();
    debug!(session_id = %session_id, "session runtime started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let operation = command.operation();
                let mutation = command.is_mutation();
                if let Err(err) = controller.execute(command).await {
                    debug!(session_id = %session_id, operation = %operation, error = %err, "command failed");
                }
                if mutation {
                    pending.store(false, Ordering::Release);
                    controller.observer().on_pending(None);
                }
            }
            firing = controller.cadence_mut().fired() => {
                if let Err(err) = controller.on_firing(firing).await {
                    debug!(session_id = %session_id, ?firing, error = %err, "cadence firing failed");
                }
            }
        }
        if !controller.liveness().is_alive() {
            break;
        }
    }

    controller.detach();
    debug!(session_id = %session_id, "session runtime stopped");
}

impl SessionHandle {
    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// True while a mutating command is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Queue a command for the session task.
    ///
    /// # Errors
    ///
    /// `Busy` while another mutating command is in flight, `Detached` once the
    /// session has been disposed or its task has stopped.
    pub fn submit(&self, command: SessionCommand) -> Result<(), ControllerError> {
        if !self.is_alive() {
            return Err(ControllerError::Detached);
        }
        let operation = command.operation();
        let mutation = command.is_mutation();
        if mutation && self.pending.swap(true, Ordering::AcqRel) {
            return Err(ControllerError::Busy);
        }
        if mutation {
            self.observer.on_pending(Some(operation));
        }
        if self.commands.send(command).is_err() {
            if mutation {
                self.pending.store(false, Ordering::Release);
                self.observer.on_pending(None);
            }
            return Err(ControllerError::Detached);
        }
        Ok(())
    }

    /// Tear the session down: mark the view dead, abort the task and with it
    /// the cadence. Results still in flight are discarded.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.liveness.kill();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(session_id = %self.session_id, "session disposed");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            warn!(session_id = %self.session_id, "session handle dropped without dispose");
        }
        self.shutdown();
    }
}
