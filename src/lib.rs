//! Purpose: Read-only loader and buffer pool for a columnar on-disk farm.
//! Exports: `api` (stable surface), `core` (catalog, atoms, heaps, pool, errors).
//! Role: Library crate; callers open a farm through `api::BufferPool`.
//! Invariants: No global state; the atom registry is owned by the pool that uses it.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
