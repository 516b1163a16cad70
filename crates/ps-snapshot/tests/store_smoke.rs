use ps_core::{InternalState, Value, ValueMap};
use ps_graph::TypeCatalog;
use ps_project::{InstanceSpec, ProjectConfig};
use ps_snapshot::*;

struct AnyParams;

impl TypeCatalog for AnyParams {
    fn contains(&self, _type_tag: &str) -> bool {
        true
    }
}

#[test]
fn saved_values_survive_restart_into_merge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut values = ValueMap::new();
    values.insert("tank1.level".into(), Value::Float(1.25));
    values.insert("tank1.height".into(), Value::Float(3.0));
    let mut states = StateMap::new();
    states.insert(
        "tank1".into(),
        InternalState::encode(&serde_json::json!({ "level": 1.25 })).unwrap(),
    );

    {
        let mgr = SnapshotManager::file(&path).unwrap();
        mgr.save(10, values.clone(), states.clone()).unwrap();
    }

    let mgr = SnapshotManager::file(&path).unwrap();
    let record = mgr.load().unwrap().unwrap();
    assert_eq!(record.values, values);
    assert_eq!(record.cycle, 10);

    let mut cfg = ProjectConfig::default();
    let mut tank = InstanceSpec::new("cylindrical_tank");
    tank.params.insert("height".into(), Value::Float(2.0));
    cfg.models.insert("tank1".into(), tank);
    cfg.models.insert("tank2".into(), InstanceSpec::new("cylindrical_tank"));

    let merged = merge(&cfg, Some(&record), &AnyParams);
    let (_, tank1) = merged.config.instance("tank1").unwrap();
    assert_eq!(tank1.params.get("height"), Some(&Value::Float(3.0)));
    let (_, tank2) = merged.config.instance("tank2").unwrap();
    assert!(tank2.params.is_empty());
    assert_eq!(merged.states.len(), 1);

    mgr.clear().unwrap();
    assert!(mgr.load().unwrap().is_none());
}
