//! Loading the shipped configuration file

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tether_core::config::load_toml_file;
use tether_core::TetherError;
use tether_node::config::{ENV_GRACE_PERIOD_MS, ENV_HANDSHAKE_TIMEOUT_MS, ENV_WHITELIST_TIMEOUT_MS};
use tether_node::TetherConfig;
use tether_relay::AddressFamily;

fn sample_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/tether.toml"))
}

// Single test so the environment overrides cannot race another test.
#[test]
fn sample_config_loads_and_env_overrides_apply() -> anyhow::Result<()> {
    for var in [ENV_GRACE_PERIOD_MS, ENV_HANDSHAKE_TIMEOUT_MS, ENV_WHITELIST_TIMEOUT_MS] {
        std::env::remove_var(var);
    }

    let config = TetherConfig::load(sample_path())?;
    assert_eq!(config.node.grace_period(), Duration::from_millis(250));
    let table = config.relay.table()?;
    assert_eq!(table.len(), 3);
    assert_eq!(table.supporting(AddressFamily::V4), vec![0, 1]);
    assert_eq!(table.supporting(AddressFamily::V6), vec![0, 2]);

    std::env::set_var(ENV_GRACE_PERIOD_MS, "0");
    std::env::set_var(ENV_HANDSHAKE_TIMEOUT_MS, "2500");
    std::env::set_var(ENV_WHITELIST_TIMEOUT_MS, "1500");
    let config = TetherConfig::load(sample_path())?;
    assert_eq!(config.node.grace_period(), Duration::ZERO);
    assert_eq!(config.relay.timeouts.handshake(), Duration::from_millis(2500));
    assert_eq!(config.relay.timeouts.whitelist(), Duration::from_millis(1500));

    // Overrides are validated like file values.
    std::env::set_var(ENV_HANDSHAKE_TIMEOUT_MS, "0");
    let err = TetherConfig::load(sample_path()).unwrap_err();
    assert!(matches!(err, TetherError::Config { .. }));

    for var in [ENV_GRACE_PERIOD_MS, ENV_HANDSHAKE_TIMEOUT_MS, ENV_WHITELIST_TIMEOUT_MS] {
        std::env::remove_var(var);
    }
    Ok(())
}

#[test]
fn duplicate_candidate_ids_are_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
        [[relay.candidates]]
        id = 5
        ipv4 = {{ host = "a.example.net", port = 3478 }}

        [[relay.candidates]]
        id = 5
        ipv4 = {{ host = "b.example.net", port = 3478 }}
        "#
    )?;

    let err = load_toml_file::<TetherConfig>(file.path()).unwrap_err();
    assert!(err.to_string().contains("duplicate relay candidate id 5"));
    Ok(())
}

#[test]
fn candidate_without_any_family_is_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[[relay.candidates]]\nid = 1\nrealm = \"nowhere\"")?;

    let err = load_toml_file::<TetherConfig>(file.path()).unwrap_err();
    assert!(err.to_string().contains("supports no address family"));
    Ok(())
}
