#![forbid(unsafe_code)]

pub mod catalog_service;
pub mod config;
pub mod error;
pub mod results_service;
pub mod sessions;

pub use sessions as session;

pub use catalog_service::ExamCatalogService;
pub use config::ControllerConfig;
pub use error::ControllerError;
pub use results_service::ResultsService;

pub use sessions::{
    LocalView, NavigationAvailability, Operation, RecordingObserver, RenderPlan, SessionCommand,
    SessionController, SessionEvent, SessionHandle, SessionObserver,
};
