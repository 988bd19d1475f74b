//! Filesystem-backed [`flowmill_core::Storage`]: the shipped default, port
//! data as numbered partition files, task records as JSON, task logs as flat
//! text files.

mod logs;
mod port_data;
mod storage;

pub use logs::FsTaskLogs;
pub use port_data::FsPortData;
pub use storage::FsStorage;
