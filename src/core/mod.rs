// Core modules: codecs, atom registry, catalog parsing, and the buffer pool.
pub mod atom;
pub mod catalog;
pub mod column;
pub mod error;
pub mod escape;
pub mod farm;
pub mod format;
pub mod heap;
pub mod numeric;
pub mod pool;
pub mod slot;
pub mod strheap;
