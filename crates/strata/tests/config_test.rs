//! Engine configuration and bring-up.

use std::fs;
use std::time::Duration;
use strata::{init_logging, ConfigError, Engine, EngineConfig};
use strata_core::SchedulerConfig;
use strata_world::{ChunkPos, GeneratorKind, MaterialId};

const SAMPLE: &str = r#"
[logging]
filter = "warn,strata_world=debug"

[scheduler]
threads = 2

[ticker]
tps = 40
tick_rare_rate = 10

[world]
name = "flatland"
seed = 99
load_radius = 1
unload_radius = 2

[world.generator]
kind = "flat"
surface_y = 4
fill = "Dirt"
"#;

#[test]
fn test_sample_config_parses() {
    let config = EngineConfig::from_toml_str(SAMPLE).unwrap();

    assert_eq!(config.logging.filter, "warn,strata_world=debug");
    assert_eq!(config.scheduler.threads, 2);
    assert_eq!(config.ticker.tps, 40);
    assert_eq!(config.ticker.tick_rare_rate, 10);
    // Unspecified fields keep their defaults.
    assert_eq!(config.ticker.nag_delay_ms, 15_000);
    assert_eq!(config.world.name, "flatland");
    assert_eq!(config.world.seed, Some(99));
    assert_eq!(
        config.world.generator,
        GeneratorKind::Flat {
            surface_y: 4,
            fill: "Dirt".to_string(),
        }
    );
}

#[test]
fn test_invalid_values_rejected() {
    for text in ["[ticker]\ntps = 0\n", "[ticker]\ntick_rare_rate = 0\n", "[world]\nload_radius = 3\nunload_radius = 1\n"] {
        let err = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{text:?} gave {err}");
    }
    assert!(matches!(
        EngineConfig::from_toml_str("[ticker\n"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = EngineConfig::load(&path).unwrap_err();
    assert!(matches!(&err, ConfigError::Io { path: p, .. } if *p == path));
}

#[test]
fn test_engine_opens_configured_world() {
    init_logging("warn");
    // A second install is refused without panicking.
    assert!(!init_logging("debug"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    fs::write(&path, SAMPLE).unwrap();

    let mut config = EngineConfig::load(&path).unwrap();
    config.scheduler = SchedulerConfig::synchronous();
    config.world.save_dir = Some(dir.path().join("save"));

    let engine = Engine::open(&config).unwrap();
    let world = engine.world();
    assert_eq!(world.info().seed, 99);
    world.get_chunk(ChunkPos::new(0, 0)).unwrap();
    assert_eq!(world.get_block(0, 3, true).map(|b| b.id()), Some(MaterialId::DIRT));
    assert_eq!(world.get_block(0, 4, true), None);

    engine.run(Some(Duration::from_millis(150))).unwrap();
    assert!(world.ticker().is_running());
    engine.shutdown();

    assert!(dir.path().join("save").join("world.toml").is_file());
    assert!(dir.path().join("save").join("chunks").join("0_0.chunk").is_file());
}
