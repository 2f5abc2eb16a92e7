mod cadence;
mod command;
mod controller;
mod observer;
mod reconcile;
mod runtime;
mod view;

// Public API of the session subsystem.
pub use crate::error::ControllerError;
pub use cadence::{Cadence, Firing};
pub use command::{Operation, SessionCommand};
pub use controller::SessionController;
pub use observer::{RecordingObserver, SessionEvent, SessionObserver};
pub use reconcile::{ClockCommand, ReconcileError, Reconciliation, StatusConflict, reconcile};
pub use runtime::{Liveness, SessionHandle, spawn};
pub use view::{LocalView, NavigationAvailability, RenderPlan};
