pub mod kafka;
pub mod mock;
pub mod redis;
pub mod sqs;

pub use kafka::KafkaProducer;
pub use mock::MockProducer;
pub use redis::RedisProducer;
pub use sqs::SqsProducer;
