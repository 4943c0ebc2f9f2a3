pub mod event;
pub mod payload;
pub mod queue;
pub mod worker;

pub use event::{names, Event};
pub use payload::{Annotation, Detection, Frame, Payload, Target, WorkerProfile};
pub use queue::EventQueue;
pub use worker::{EventSink, Worker, WorkerContext};
