//! Unique ID generator.

use uuid::Uuid;

/// Generates identifiers for connections and requests.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a connection ID.
    ///
    /// Ids are random v4 UUIDs; uniqueness rests on the generator and is not
    /// re-checked against already registered ids.
    pub fn connection_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }
}
