pub mod channel;
pub mod producer;
pub mod serializer;


pub use channel::{DeliveryChannel, DeliveryStats};
pub use producer::{MessageProducer, PulsarProducer};
pub use serializer::JsonSerializer;
