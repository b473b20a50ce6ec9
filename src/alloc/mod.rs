mod free_list;

pub use free_list::{FreeListAllocator, FreeRange};
