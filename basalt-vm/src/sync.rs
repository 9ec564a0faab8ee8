//! Synchronization layer: lock wrappers, atomic refcounting, and the
//! thread-local sync coordinator that acquires lock sets in a deadlock-free
//! total order.

pub mod atomic;
pub mod locks;
pub mod queue;
