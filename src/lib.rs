#[macro_use]
pub mod key;

pub mod atomic;
pub mod config;
pub mod connect;
pub mod engine;
pub mod error;
pub mod memory;
pub mod mirror;
pub mod outcome;
pub mod planner;
pub mod redb;
pub mod selector;
pub mod traits;

pub use atomic::{AtomicWrite, Mutation};
pub use config::{BatchConfig, Remote};
pub use connect::{Connector, MemoryConnector, RedbConnector};
pub use engine::BatchEngine;
pub use error::KVError;
pub use key::{Key, KeyPart};
pub use memory::MemoryStore;
pub use mirror::MirrorPhase;
pub use outcome::BatchOutcome;
pub use planner::{Group, Operation, Planner};
pub use redb::RedbStore;
pub use selector::{KeyRange, List, Selector};
pub use traits::{Consistency, Entry, KVStore, StoreLimits};
