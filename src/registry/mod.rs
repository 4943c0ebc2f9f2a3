pub mod worker_type;

pub use worker_type::{builtin_descriptions, BuildContext, WorkerFactory, WorkerRegistration, WorkerTypeRegistry};
