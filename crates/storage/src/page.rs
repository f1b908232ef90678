use crate::typedef::PageId;

/// Sentinel for "no page". Distinct from every id the allocator hands out,
/// which start at the owning instance's index and grow monotonically.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Size of a page on disk and of a frame's data buffer, in bytes.
pub const PAGE_SIZE: usize = 4096;
