//! Addressing of live signal slots.

use crate::error::{CoreError, CoreResult};
use core::fmt;
use core::str::FromStr;

/// `"instance.param"` address of one slot in the live value table.
///
/// The instance part is everything before the first `.`; the parameter
/// part may itself contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey {
    instance: String,
    param: String,
}

impl SignalKey {
    pub fn new(instance: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            param: param.into(),
        }
    }

    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw.split_once('.') {
            Some((instance, param)) if !instance.is_empty() && !param.is_empty() => {
                Ok(Self::new(instance, param))
            }
            _ => Err(CoreError::MalformedKey {
                key: raw.to_string(),
            }),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn param(&self) -> &str {
        &self.param
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance, self.param)
    }
}

impl FromStr for SignalKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_dot() {
        let key = SignalKey::parse("tank1.level").unwrap();
        assert_eq!(key.instance(), "tank1");
        assert_eq!(key.param(), "level");

        let nested = SignalKey::parse("pid1.limits.h").unwrap();
        assert_eq!(nested.instance(), "pid1");
        assert_eq!(nested.param(), "limits.h");
        assert_eq!(nested.to_string(), "pid1.limits.h");
    }

    #[test]
    fn parse_rejects_malformed() {
        for raw in ["tank1", ".level", "tank1.", ""] {
            assert!(matches!(
                SignalKey::parse(raw),
                Err(CoreError::MalformedKey { .. })
            ));
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn display_parse_is_identity(inst in "[a-z][a-z0-9_]{0,8}", param in "[a-z][a-z0-9_.]{0,8}") {
            let key = SignalKey::new(inst.clone(), param.clone());
            let parsed = SignalKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(parsed.instance(), inst.as_str());
            prop_assert_eq!(parsed.param(), param.as_str());
        }
    }
}
