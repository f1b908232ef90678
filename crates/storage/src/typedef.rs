/// Identifier of an on-disk page.
pub type PageId = u32;

/// Index of a frame within a buffer pool instance's frame array.
pub type FrameId = usize;

/// Log sequence number tracked by the log manager.
pub type Lsn = u64;
