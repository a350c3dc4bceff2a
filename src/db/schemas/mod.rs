//! Database schemas for claustro
//!
//! MongoDB document structures for users, projects, evaluations,
//! publications and requests. Every document embeds the shared `Metadata`
//! block; unique indexes declared here are the storage-level backstop for
//! the uniqueness rules the services check first.

mod evaluation;
mod metadata;
mod project;
mod publication;
mod request;
mod user;

pub use evaluation::{EvaluationDoc, EVALUATION_COLLECTION};
pub use metadata::Metadata;
pub use project::{Cronograma, Hito, ProjectDoc, ProjectStatus, PROJECT_COLLECTION};
pub use publication::{
    PublicationDoc, PublicationStatus, PublicationType, PUBLICATION_COLLECTION,
};
pub use request::{RequestComment, RequestDoc, RequestStatus, RequestType, REQUEST_COLLECTION};
pub use user::{UserDoc, UserView, USER_COLLECTION};
