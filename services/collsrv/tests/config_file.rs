//! Loading the shipped configuration and environment overrides

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::path::Path;

use collsrv::config::CollsrvConfig;
use collsrv::poller::client::RegisterKind;
use collsrv::poller::decode::{DataType, WordOrder};

#[test]
fn shipped_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/collsrv.yaml");
    let config = CollsrvConfig::load(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.service.name, "collsrv");
    assert_eq!(config.poller.interval_ms, 2000);
    assert_eq!(config.alarm.activation_delay_secs, 60);
    assert_eq!(config.history.window_secs, 900);
    assert_eq!(config.devices.len(), 2);

    let boiler = &config.devices[0];
    assert_eq!(boiler.display_name(), "Boiler house controller");
    assert_eq!(boiler.register_kind, RegisterKind::Holding);
    assert_eq!(boiler.points[3].data_type, DataType::F32);
    assert_eq!(boiler.points[4].word_order, WordOrder::Little);
    assert!(config.devices[1].simulated);
    assert_eq!(config.calibration.sensor_map.len(), 2);
}

#[test]
fn environment_overrides_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "collsrv.yaml",
            r#"
poller:
  interval_ms: 5000
devices:
  - id: D1
    simulated: true
    points:
      - { name: p, offset: 0 }
"#,
        )?;
        jail.set_env("COLLSRV_POLLER__INTERVAL_MS", "750");
        jail.set_env("COLLSRV_HISTORY__TIMEZONE", "+08:00");

        let config = CollsrvConfig::load(Path::new("collsrv.yaml")).unwrap();
        assert_eq!(config.poller.interval_ms, 750);
        assert_eq!(config.history.timezone.to_string(), "+08:00");
        assert_eq!(config.devices[0].points[0].scale, 1.0);
        config.validate().unwrap();
        Ok(())
    });
}
