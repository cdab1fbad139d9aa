//! Connect-to-shutdown scenario with the default simulated device.

use iolink_common::config::PortConfig;
use iolink_common::error::IolinkError;
use iolink_common::state::{OperatingState, TargetState};
use iolink_master::{DriverCall, Port, SimulatedMaster};

#[test]
fn test_end_to_end_scenario() {
    let config = PortConfig::default();
    let mut port = Port::new(SimulatedMaster::from_config(&config.simulated), &config).unwrap();

    // Wildcard connect
    port.connect(None).unwrap();
    assert!(port.is_connected());

    port.change_device_state_to(TargetState::Operate).unwrap();
    assert_eq!(port.last_reported_state(), Some(OperatingState::Operate));
    assert_eq!(OperatingState::Operate.code(), 5);

    port.set_device_pd_output(&[0x5A; 12]).unwrap();
    assert_eq!(port.driver().pd_output(), &[0x5A; 12]);
    assert!(port.driver().pd_output_valid());

    let input = port.get_device_pd_input_and_status().unwrap();
    assert!(input.data.len() <= 64);
    assert_eq!(input.data.len(), config.simulated.pd_input.len());

    let err = port.write_device_isdu(0xFFFF, 0, &[0x00]).unwrap_err();
    match err {
        IolinkError::Isdu(code) => assert_ne!(code.code(), 0),
        other => panic!("expected ISDU error, got {other}"),
    }

    port.shut_down().unwrap();
    assert!(!port.is_connected());
    assert_eq!(port.driver().call_count(DriverCall::Disconnect), 1);

    port.shut_down().unwrap();
    assert_eq!(port.driver().call_count(DriverCall::Disconnect), 1);
}

#[test]
fn test_scenario_from_toml_config() {
    let toml = r#"
        channel = "COM5"

        [simulated]
        channels = [2, 5]
        pd_input = [1, 2, 3, 4]
        pd_status = 1
    "#;
    let config = PortConfig::from_toml(toml).unwrap();
    let mut port = iolink_master::open_port(&config).unwrap();
    assert_eq!(port.channel(), Some(5));

    port.change_device_state_to(TargetState::Operate).unwrap();
    let input = port.get_device_pd_input_and_status().unwrap();
    assert_eq!(input.data, vec![1, 2, 3, 4]);
    assert_eq!(input.status, 1);

    port.shut_down().unwrap();
}

#[test]
fn test_power_cycle_requires_new_transition() {
    let config = PortConfig::default();
    let mut port = iolink_master::open_port(&config).unwrap();
    port.change_device_state_to(TargetState::Operate).unwrap();

    port.power_off().unwrap();
    assert!(matches!(
        port.set_device_pd_output(&[0; 4]),
        Err(IolinkError::Connection(_))
    ));
    assert!(matches!(
        port.change_device_state_to(TargetState::Operate),
        Err(IolinkError::StateMismatch { actual: 3, .. })
    ));

    port.power_on().unwrap();
    port.change_device_state_to(TargetState::Operate).unwrap();
    port.set_device_pd_output(&[0; 4]).unwrap();
}
