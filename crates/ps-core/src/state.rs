//! Opaque per-instance internal state.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Internal state carried between cycles for one instance (an integrator
/// term, a valve position).
///
/// The engine never looks inside; each component type encodes its own
/// state struct. `Null` means "fresh": the component initializes from its
/// parameters on the next execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalState(serde_json::Value);

impl InternalState {
    pub fn fresh() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_fresh(&self) -> bool {
        self.0.is_null()
    }

    pub fn encode<T: Serialize>(state: &T) -> CoreResult<Self> {
        serde_json::to_value(state)
            .map(Self)
            .map_err(|e| CoreError::StateEncode {
                type_name: core::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }

    /// Decode into `T`, returning `None` for a fresh state.
    pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<Option<T>> {
        if self.is_fresh() {
            return Ok(None);
        }
        serde_json::from_value(self.0.clone())
            .map(Some)
            .map_err(|e| CoreError::StateDecode {
                type_name: core::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Integrator {
        sum: f64,
        primed: bool,
    }

    #[test]
    fn fresh_decodes_to_none() {
        let state = InternalState::fresh();
        assert!(state.is_fresh());
        assert_eq!(state.decode::<Integrator>().unwrap(), None);
    }

    #[test]
    fn encode_then_decode() {
        let s = Integrator {
            sum: 4.5,
            primed: true,
        };
        let state = InternalState::encode(&s).unwrap();
        assert!(!state.is_fresh());
        assert_eq!(state.decode::<Integrator>().unwrap(), Some(s));
    }

    #[test]
    fn decode_wrong_shape_is_error() {
        let state = InternalState::encode(&42_u32).unwrap();
        assert!(matches!(
            state.decode::<Integrator>(),
            Err(CoreError::StateDecode { .. })
        ));
    }
}
