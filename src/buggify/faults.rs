//! Named fault-injection sites

/// Faults injected by [`crate::storage::SimulatedObjectStore`]
pub mod object_store {
    pub const PUT_FAIL: &str = "object_store.put_fail";
    pub const GET_FAIL: &str = "object_store.get_fail";
    pub const GET_CORRUPT: &str = "object_store.get_corrupt";
    pub const TIMEOUT: &str = "object_store.timeout";
    pub const PARTIAL_WRITE: &str = "object_store.partial_write";
    pub const DELETE_FAIL: &str = "object_store.delete_fail";
    pub const RENAME_FAIL: &str = "object_store.rename_fail";
}
