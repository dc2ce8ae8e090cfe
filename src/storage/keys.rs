//! Object key layout
//!
//! All keys live under an optional prefix:
//!
//! - `{prefix}/metrics/{device}/{received_at_ms:013}-{writer:016x}-{sequence:010}.json`
//! - `{prefix}/state/{device}.json` (temp: `{prefix}/state/{device}.json.tmp`)
//! - `{prefix}/users/{user}.json`
//! - `{prefix}/avatars/{user}_avatar.png`
//!
//! Identifiers are escaped with [`escape_component`] so a caller-supplied
//! id can never reach outside its own key space.

/// Builds object keys for every store in the crate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: &str) -> Self {
        StoreKeys {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn join(&self, rest: String) -> String {
        if self.prefix.is_empty() {
            rest
        } else {
            format!("{}/{}", self.prefix, rest)
        }
    }

    /// Listing prefix for every raw record of a device
    pub fn metric_prefix(&self, device_id: &str) -> String {
        self.join(format!("metrics/{}/", escape_component(device_id)))
    }

    /// Key for one raw metric record
    ///
    /// `writer_id` is unique per store instance and `sequence` per append
    /// within it, so two writers sharing a backend never produce the same key.
    /// Zero-padded so lexical order follows arrival time.
    pub fn metric_record(
        &self,
        device_id: &str,
        received_at_ms: u64,
        writer_id: u64,
        sequence: u64,
    ) -> String {
        format!(
            "{}{:013}-{:016x}-{:010}.json",
            self.metric_prefix(device_id),
            received_at_ms,
            writer_id,
            sequence
        )
    }

    pub fn state(&self, device_id: &str) -> String {
        self.join(format!("state/{}.json", escape_component(device_id)))
    }

    pub fn state_temp(&self, device_id: &str) -> String {
        format!("{}.tmp", self.state(device_id))
    }

    pub fn user(&self, user_id: &str) -> String {
        self.join(format!("users/{}.json", escape_component(user_id)))
    }

    pub fn avatar(&self, user_id: &str) -> String {
        self.join(format!("avatars/{}_avatar.png", escape_component(user_id)))
    }
}

/// Percent-escape everything outside `[A-Za-z0-9_-]`
///
/// `.` is escaped too, so `..` and the `.tmp` suffix cannot be forged.
pub fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
