//! Core services for claustro
//!
//! Each service owns one resource's lifecycle and invariants. They all
//! check policy gates after existence and before mutating, and they never
//! log or touch the network themselves; the HTTP adapter does that.

pub mod evaluations;
pub mod identity;
pub mod mailer;
pub mod projects;
pub mod publications;
pub mod reports;
pub mod requests;

pub use evaluations::{EvaluationInput, EvaluationService};
pub use identity::{IdentityService, NewUser, VerifyOutcome};
pub use mailer::{Mailer, TracingMailer};
pub use projects::{NewProject, ProjectService};
pub use publications::{NewPublication, PublicationService};
pub use reports::{ReportScope, ReportService};
pub use requests::{NewRequest, RequestService, RequestUpdate};
