// 执行归档模块

mod local;
mod storage;
mod store;

pub use local::LocalObjectStorage;
pub use storage::{object_key, DynObjectStorage, ObjectStorage};
pub use store::{ArchiveRecord, ExecutionArchive};
