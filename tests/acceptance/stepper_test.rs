//! Stepper-drive device profile: typed parameters and motion frames.

use super::common::{
    encode_input, open_stepper_port, MotionMode, StepperDrive, FACTORY_STANDBY_CURRENT,
    POSITION_REACHED,
};
use iolink_common::error::IolinkError;
use iolink_common::isdu::{IsduErrorCode, SystemCommand};
use iolink_common::state::TargetState;

#[test]
fn test_isdu_parameter() {
    let mut port = open_stepper_port();
    port.change_device_state_to(TargetState::Operate).unwrap();
    let mut drive = StepperDrive::new(&mut port);

    let old = drive.read_parameter("Standby Current").unwrap();
    assert!(0 < old && old < 128);

    drive.write_parameter("Standby Current", old + 8).unwrap();
    assert_eq!(drive.read_parameter("Standby Current").unwrap(), old + 8);

    drive.write_parameter("Standby Current", old).unwrap();
    assert_eq!(drive.read_parameter("Standby Current").unwrap(), old);
}

#[test]
fn test_signed_and_boolean_parameters() {
    let mut port = open_stepper_port();
    port.change_device_state_to(TargetState::PreOperate).unwrap();
    let mut drive = StepperDrive::new(&mut port);

    drive.write_parameter("Set Actual Position", -51_200).unwrap();
    assert_eq!(drive.read_parameter("Set Actual Position").unwrap(), -51_200);

    drive.write_parameter("Initialize Position", 1).unwrap();
    assert_eq!(drive.read_parameter("Initialize Position").unwrap(), 1);

    assert_eq!(drive.read_parameter("Motor Supply Voltage").unwrap(), 240);
    assert_eq!(
        drive.write_parameter("Actual Current", 5),
        Err(IolinkError::Isdu(IsduErrorCode::IDX_NOT_ACCESSIBLE))
    );
}

#[test]
fn test_process_data_motion() {
    let mut port = open_stepper_port();
    port.change_device_state_to(TargetState::Operate).unwrap();
    let mut drive = StepperDrive::new(&mut port);
    drive.write_parameter("Set Actual Position", 0).unwrap();

    drive.set_pd_output(51_200, 0, MotionMode::Position).unwrap();
    let frame = drive.port().driver().pd_output().to_vec();
    assert_eq!(frame, vec![0x00, 0x00, 0xC8, 0x00, 0, 0, 0, 0, 1]);

    let input = drive.get_pd_input().unwrap();
    assert_eq!(input.status & POSITION_REACHED, 0);

    // The drive arrives at the target
    drive
        .port()
        .driver_mut()
        .set_pd_input(encode_input(51_200, 0, 0, POSITION_REACHED), 0);
    let input = drive.get_pd_input().unwrap();
    assert_eq!(input.actual_position, 51_200);
    assert_ne!(input.status & POSITION_REACHED, 0);

    drive.set_pd_output(0, 0, MotionMode::Stop).unwrap();
    assert_eq!(drive.port().driver().pd_output()[8], 0);
    assert_eq!(drive.port().stats().pd_writes, 2);
}

#[test]
fn test_restore_factory_settings() {
    let mut port = open_stepper_port();
    port.change_device_state_to(TargetState::Operate).unwrap();
    {
        let mut drive = StepperDrive::new(&mut port);
        drive.write_parameter("Standby Current", 96).unwrap();
        drive.write_parameter("Following Error Window", 1_000).unwrap();
    }

    port.send_system_command(SystemCommand::RestoreFactorySettings)
        .unwrap();

    let mut drive = StepperDrive::new(&mut port);
    assert_eq!(
        drive.read_parameter("Standby Current").unwrap(),
        FACTORY_STANDBY_CURRENT
    );
    assert_eq!(drive.read_parameter("Following Error Window").unwrap(), 0);
}
