//! Correlation ID type for page-originated calls.
//!
//! This module provides a type-safe wrapper for correlation ids, preventing
//! confusion with other integer types (port indices, status codes).

use serde::{Deserialize, Serialize};

/// Opaque token scoping one in-flight `callHandler` invocation.
///
/// Ids are allocated by the page-side registry and are unique among the
/// calls currently pending in one document. Once a call settles its id may
/// be handed out again.
///
/// # Wire Format
///
/// Serialized as a bare JSON number under the `_callHandlerID` key of the
/// page message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(i64);

impl CorrelationId {
    /// Create a new CorrelationId from an i64 value.
    #[inline]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the underlying i64 value.
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for CorrelationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<CorrelationId> for i64 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_id_round_trips_through_i64() {
        let id: CorrelationId = 123.into();
        let value: i64 = id.into();
        assert_eq!(value, 123);
        assert_eq!(CorrelationId::new(7).as_i64(), 7);
    }

    #[test]
    fn correlation_id_deserializes_from_bare_number() {
        let id: CorrelationId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(id, CorrelationId::new(42));
        assert!(serde_json::from_value::<CorrelationId>(json!("42")).is_err());
    }

    #[test]
    fn correlation_id_serializes_as_bare_number() {
        let value = serde_json::to_value(CorrelationId::new(9)).unwrap();
        assert_eq!(value, json!(9));
    }
}
