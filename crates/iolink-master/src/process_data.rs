//! Cyclic process-data channel.
//!
//! Output frames are written and then marked valid; input frames are read
//! into a fixed-capacity buffer together with the device status byte.

use crate::{MasterDriver, PortHandle};
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::metrics::TransactionStats;
use serde::Serialize;
use tracing::{debug, trace, warn};

/// Process-data input frame and the device status byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdInput {
    /// Input bytes reported by the device.
    pub data: Vec<u8>,
    /// Device status byte.
    pub status: u8,
}

/// Process-data exchange for one port.
#[derive(Debug)]
pub struct ProcessDataChannel {
    rx_buffer: Vec<u8>,
    output_marked_valid: bool,
}

impl ProcessDataChannel {
    /// Create a channel with an input buffer of `input_capacity` bytes.
    #[must_use]
    pub fn new(input_capacity: usize) -> Self {
        Self {
            rx_buffer: vec![0u8; input_capacity],
            output_marked_valid: false,
        }
    }

    /// Input buffer capacity in bytes.
    #[must_use]
    pub fn input_capacity(&self) -> usize {
        self.rx_buffer.len()
    }

    /// Whether the last output frame written was also marked valid.
    ///
    /// `false` after a write whose validity call failed; the device then
    /// holds data that it was never told to apply.
    #[must_use]
    pub fn output_marked_valid(&self) -> bool {
        self.output_marked_valid
    }

    /// Forget the output validity (after disconnect).
    pub fn reset(&mut self) {
        self.output_marked_valid = false;
    }

    /// Write an output frame and mark it valid.
    ///
    /// Nothing is rolled back if the second call fails.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] from whichever driver call failed first.
    pub fn set_output<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        data: &[u8],
        stats: &mut TransactionStats,
    ) -> IolinkResult<()> {
        self.output_marked_valid = false;

        driver
            .set_process_data(handle, data)
            .map_err(|fault| fault.into_connection_error())?;

        if let Err(fault) = driver.set_process_data_validity(handle, true) {
            warn!(
                %handle,
                len = data.len(),
                status = fault.status,
                "Output frame written but not marked valid"
            );
            return Err(fault.into_connection_error());
        }

        self.output_marked_valid = true;
        stats.record_pd_write();
        debug!(%handle, len = data.len(), "Process data output written");
        Ok(())
    }

    /// Read the input frame and device status.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if the driver call fails or reports
    /// more bytes than the buffer holds.
    pub fn get_input_and_status<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        stats: &mut TransactionStats,
    ) -> IolinkResult<PdInput> {
        let report = driver
            .get_status(handle, &mut self.rx_buffer)
            .map_err(|fault| fault.into_connection_error())?;

        if report.length > self.rx_buffer.len() {
            return Err(IolinkError::Connection(format!(
                "driver reported {} input bytes, buffer holds {}",
                report.length,
                self.rx_buffer.len()
            )));
        }

        stats.record_pd_read();
        trace!(%handle, len = report.length, status = report.status, "Process data input read");
        Ok(PdInput {
            data: self.rx_buffer[..report.length].to_vec(),
            status: report.status,
        })
    }
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::{ChannelRange, DriverCall, DriverFault, SimulatedMaster};
    use iolink_common::state::{OperatingMode, OperatingState};

    fn operating_master() -> (SimulatedMaster, PortHandle) {
        let mut master = SimulatedMaster::new();
        let handle = master.connect(ChannelRange::ANY).unwrap();
        master
            .set_operating_mode(handle, OperatingMode::Operate, Some(OperatingState::Operate))
            .unwrap();
        master.clear_calls();
        (master, handle)
    }

    #[test]
    fn test_output_write_marks_valid() {
        let (mut master, handle) = operating_master();
        let mut channel = ProcessDataChannel::new(64);
        let mut stats = TransactionStats::default();

        channel
            .set_output(&mut master, handle, &[1, 2, 3], &mut stats)
            .unwrap();

        assert_eq!(
            master.calls(),
            &[DriverCall::SetProcessData, DriverCall::SetProcessDataValidity]
        );
        assert_eq!(master.pd_output(), &[1, 2, 3]);
        assert!(master.pd_output_valid());
        assert!(channel.output_marked_valid());
        assert_eq!(stats.pd_writes, 1);
    }

    #[test]
    fn test_data_fault_skips_validity() {
        let (mut master, handle) = operating_master();
        master.fail_with(DriverCall::SetProcessData, DriverFault::new(-5, "PD write failed"));
        let mut channel = ProcessDataChannel::new(64);
        let mut stats = TransactionStats::default();

        let err = channel
            .set_output(&mut master, handle, &[0; 4], &mut stats)
            .unwrap_err();
        assert_eq!(err, IolinkError::Connection("PD write failed".into()));
        assert_eq!(master.calls(), &[DriverCall::SetProcessData]);
        assert_eq!(stats.pd_writes, 0);
    }

    #[test]
    fn test_validity_fault_leaves_frame_unmarked() {
        let (mut master, handle) = operating_master();
        master.fail_with(
            DriverCall::SetProcessDataValidity,
            DriverFault::new(-6, "validity flag rejected"),
        );
        let mut channel = ProcessDataChannel::new(64);
        let mut stats = TransactionStats::default();

        let err = channel
            .set_output(&mut master, handle, &[9, 9], &mut stats)
            .unwrap_err();
        assert_eq!(err, IolinkError::Connection("validity flag rejected".into()));
        // Data reached the device; not rolled back
        assert_eq!(master.pd_output(), &[9, 9]);
        assert!(!master.pd_output_valid());
        assert!(!channel.output_marked_valid());
    }

    #[test]
    fn test_input_and_status() {
        let (mut master, handle) = operating_master();
        master.set_pd_input(vec![0xAA, 0xBB, 0xCC], 0x02);
        let mut channel = ProcessDataChannel::new(64);
        let mut stats = TransactionStats::default();

        let input = channel
            .get_input_and_status(&mut master, handle, &mut stats)
            .unwrap();
        assert_eq!(
            input,
            PdInput {
                data: vec![0xAA, 0xBB, 0xCC],
                status: 0x02
            }
        );
        assert_eq!(stats.pd_reads, 1);
    }

    #[test]
    fn test_input_bounded_by_capacity() {
        let (mut master, handle) = operating_master();
        master.set_pd_input(vec![7; 32], 0);
        let mut channel = ProcessDataChannel::new(8);
        let mut stats = TransactionStats::default();

        let input = channel
            .get_input_and_status(&mut master, handle, &mut stats)
            .unwrap();
        assert_eq!(input.data, vec![7; 8]);
        assert_eq!(channel.input_capacity(), 8);
    }

    #[test]
    fn test_input_fault() {
        let (mut master, handle) = operating_master();
        master.fail_with(DriverCall::GetStatus, DriverFault::new(-2, "invalid port handle"));
        let mut channel = ProcessDataChannel::new(64);
        let mut stats = TransactionStats::default();

        let err = channel
            .get_input_and_status(&mut master, handle, &mut stats)
            .unwrap_err();
        assert_eq!(err, IolinkError::Connection("invalid port handle".into()));
        assert_eq!(stats.pd_reads, 0);
    }
}
