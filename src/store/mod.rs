//! Counter stores and the contract they share.

mod backend;
mod memory;
mod redis;

pub use backend::CounterStore;
pub use memory::MemoryStore;
pub use redis::RedisStore;
