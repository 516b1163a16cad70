use ps_controls::Registry;
use ps_project::{LoadPolicy, build_store, load};
use std::path::PathBuf;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

#[test]
fn closed_loop_demo_loads_with_manual_order() {
    let config = load(&demo("closed_loop.yaml")).unwrap();
    assert_eq!(config.instance_count(), 3);

    let (mut store, report) =
        build_store(&config, &Registry::with_builtins(), LoadPolicy::Strict).unwrap();
    assert!(report.is_clean());
    let order = store.execution_order().unwrap();
    assert!(order.is_manual());
    assert_eq!(order.as_slice(), ["pid1", "valve1", "tank1"]);
}
