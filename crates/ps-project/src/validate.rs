//! Structural checks that need no instance registry.
//!
//! Reference checks (does a connection name a configured instance?) are
//! policy dependent and happen in [`crate::build_store`].

use ps_core::SignalKey;
use ps_graph::{ValidationError, ValidationResult};

use crate::schema::ProjectConfig;

pub fn validate_config(config: &ProjectConfig) -> ValidationResult<()> {
    if !(config.cycle_time_s.is_finite() && config.cycle_time_s > 0.0) {
        return Err(ValidationError::InvalidCycleTime {
            value: config.cycle_time_s,
        });
    }

    for name in config.algorithms.keys() {
        if config.models.contains_key(name) {
            return Err(ValidationError::DuplicateName { name: name.clone() });
        }
    }

    for (_, name, spec) in config.instances() {
        if spec.type_tag.trim().is_empty() {
            return Err(ValidationError::UnknownType {
                name: name.to_string(),
                type_tag: spec.type_tag.clone(),
            });
        }
    }

    for conn in &config.connections {
        for key in [&conn.from, &conn.to] {
            SignalKey::parse(key)
                .map_err(|_| ValidationError::MalformedKey { key: key.clone() })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InstanceSpec;
    use ps_graph::Connection;

    #[test]
    fn name_shared_between_kinds() {
        let mut cfg = ProjectConfig::default();
        cfg.models.insert("x".into(), InstanceSpec::new("valve"));
        cfg.algorithms.insert("x".into(), InstanceSpec::new("pid"));
        assert_eq!(
            validate_config(&cfg),
            Err(ValidationError::DuplicateName { name: "x".into() })
        );
    }

    #[test]
    fn bad_period_and_keys() {
        let mut cfg = ProjectConfig {
            cycle_time_s: 0.0,
            ..ProjectConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::InvalidCycleTime { .. })
        ));

        cfg.cycle_time_s = 0.5;
        cfg.connections.push(Connection::new("a.b", "nodot"));
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::MalformedKey { .. })
        ));
    }

    #[test]
    fn dangling_reference_is_not_structural() {
        let mut cfg = ProjectConfig::default();
        cfg.connections.push(Connection::new("ghost.x", "other.y"));
        assert!(validate_config(&cfg).is_ok());
    }
}
