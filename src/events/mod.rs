pub mod producer;
pub mod types;

pub use producer::{EventProducer, EventPublisher, NoopPublisher, ProducerConfig, RecordingPublisher};
pub use types::{
    AutoMatchEvent, ClassificationEvent, EventEnvelope, EventType, LinkEvent, LinkOrigin,
    ReconciliationEvent,
};
