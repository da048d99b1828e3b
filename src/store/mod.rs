//! Store implementations behind the cache contracts.

pub mod disk;
pub mod memory;
pub mod rediskv;

pub use disk::DiskRepository;
pub use memory::MemoryStore;
pub use rediskv::RedisStore;
