//! Ready-made collection adapters.

mod memory;

pub use memory::MemoryCollection;
