//! # Models
//!
//! The [`Entity`] contract the repository works against, plus the catalog
//! models used by the reference module service.

pub mod entity;
pub mod module;
pub mod programming_question;
pub mod sub_topic;
pub mod tag;

pub use entity::{AuditFields, Entity, Preload, Related, Relation, RelationKind};
pub use module::{Module, NewModule};
pub use programming_question::{NewProgrammingQuestion, ProgrammingQuestion};
pub use sub_topic::SubTopic;
pub use tag::Tag;
