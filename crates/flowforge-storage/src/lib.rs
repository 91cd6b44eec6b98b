//! Durable repository façade over the in-memory execution state: a
//! two-tier `Store<T>` per entity, plus the `Connection` secret
//! encryption service.

pub mod encryption;
pub mod repository;
pub mod store;

pub use encryption::EncryptionService;
pub use repository::{
    ConnectionRepository, PipelineRepository, PipelineRunRepository, RunRepository,
    ScheduleRepository, TriggerRepository, WorkflowRepository,
};
pub use store::{Durable, NullDurable, Store};
