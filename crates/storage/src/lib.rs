//! Disk-backed page cache: buffer pool instances with CLOCK replacement,
//! a sharded front that partitions the page id space across instances,
//! and the file-backed disk manager underneath them.
pub mod buffer_pool;
pub mod disk;
pub mod frame;
pub mod frame_handle;
pub mod page;
pub mod parallel_buffer_pool;
pub mod replacer;
pub mod typedef;
pub mod wal;
pub(crate) type Result<T> = std::result::Result<T, shaledb_error::Error>;
