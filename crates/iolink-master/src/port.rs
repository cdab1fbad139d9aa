//! Port facade.
//!
//! A [`Port`] owns one master driver and the connection to one master
//! channel. It checks the driver version on construction, then routes
//! each operation to the state machine, the ISDU engine or the
//! process-data channel.

use crate::isdu::{IsduEngine, PendingTransaction};
use crate::process_data::{PdInput, ProcessDataChannel};
use crate::state_machine::DeviceStateMachine;
use crate::{ChannelRange, DriverVersion, MasterDriver, PortHandle};
use iolink_common::config::PortConfig;
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::isdu::{IsduAddress, SystemCommand};
use iolink_common::metrics::TransactionStats;
use iolink_common::state::{OperatingMode, OperatingState, TargetState};
use tracing::{debug, info, warn};

/// One IO-Link master port.
///
/// Every operation except [`Port::connect`] fails with
/// [`IolinkError::NotConnected`] until a connection exists. The driver
/// handle is released by [`Port::shut_down`], or on drop.
pub struct Port<D: MasterDriver = Box<dyn MasterDriver>> {
    driver: D,
    handle: Option<PortHandle>,
    channel: Option<u8>,
    version: DriverVersion,
    state_machine: DeviceStateMachine,
    isdu: IsduEngine,
    process_data: ProcessDataChannel,
    stats: TransactionStats,
}

impl<D: MasterDriver> Port<D> {
    /// Create an unconnected port after checking the driver version.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Configuration`] if the version query fails or the
    /// major version is below `config.min_driver_major`.
    pub fn new(mut driver: D, config: &PortConfig) -> IolinkResult<Self> {
        let version = driver.query_version().map_err(|fault| {
            IolinkError::Configuration(format!(
                "failed to query master driver version: {}",
                fault.message
            ))
        })?;

        if version.major < config.min_driver_major {
            return Err(IolinkError::Configuration(format!(
                "master driver version {version} is not supported (need major version {} or newer)",
                config.min_driver_major
            )));
        }
        debug!(%version, "Master driver loaded");

        Ok(Self {
            driver,
            handle: None,
            channel: None,
            version,
            state_machine: DeviceStateMachine::new(),
            isdu: IsduEngine::new(config.isdu.buffer_capacity),
            process_data: ProcessDataChannel::new(config.process_data.input_capacity),
            stats: TransactionStats::default(),
        })
    }

    /// Create a port and connect it to the configured channel.
    ///
    /// # Errors
    ///
    /// See [`Port::new`] and [`Port::connect`].
    pub fn open(driver: D, config: &PortConfig) -> IolinkResult<Self> {
        let mut port = Self::new(driver, config)?;
        port.connect(config.channel.as_deref())?;
        Ok(port)
    }

    /// Connect to `channel` (a `COM<n>` selector), or to the first
    /// available master if `None`.
    ///
    /// # Errors
    ///
    /// - [`IolinkError::Configuration`] for an unparseable selector
    /// - [`IolinkError::Connection`] if already connected or the driver
    ///   call fails
    pub fn connect(&mut self, channel: Option<&str>) -> IolinkResult<()> {
        if let Some(handle) = self.handle {
            return Err(IolinkError::Connection(format!(
                "port already connected (handle {handle})"
            )));
        }

        let range = ChannelRange::from_selector(channel)?;
        let handle = self
            .driver
            .connect(range)
            .map_err(|fault| fault.into_connection_error())?;

        self.handle = Some(handle);
        self.channel = (range != ChannelRange::ANY).then_some(range.first);
        info!(%handle, channels = %range, "Port connected");
        Ok(())
    }

    /// Switch the device supply on.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if the driver call fails.
    pub fn power_on(&mut self) -> IolinkResult<()> {
        self.power(true)
    }

    /// Switch the device supply off.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if the driver call fails.
    pub fn power_off(&mut self) -> IolinkResult<()> {
        self.power(false)
    }

    fn power(&mut self, on: bool) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.driver
            .power_control(handle, on)
            .map_err(|fault| fault.into_connection_error())?;
        if !on {
            self.state_machine.reset();
        }
        info!(%handle, on, "Port power switched");
        Ok(())
    }

    /// Bring the device into `target` and verify the reported state.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] or [`IolinkError::StateMismatch`].
    pub fn change_device_state_to(&mut self, target: TargetState) -> IolinkResult<()> {
        self.request_operating_mode(target.mode()).map(|_| ())
    }

    /// Request any operating mode, including [`OperatingMode::Auto`].
    ///
    /// Returns the state the device reported.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] or [`IolinkError::StateMismatch`].
    pub fn request_operating_mode(
        &mut self,
        mode: OperatingMode,
    ) -> IolinkResult<Option<OperatingState>> {
        let handle = self.require_handle()?;
        self.state_machine.request(&mut self.driver, handle, mode)
    }

    /// Read the process-data input frame and the device status byte.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if the driver call fails.
    pub fn get_device_pd_input_and_status(&mut self) -> IolinkResult<PdInput> {
        let handle = self.require_handle()?;
        self.process_data
            .get_input_and_status(&mut self.driver, handle, &mut self.stats)
    }

    /// Write a process-data output frame and mark it valid.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if either driver call fails.
    pub fn set_device_pd_output(&mut self, data: &[u8]) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.process_data
            .set_output(&mut self.driver, handle, data, &mut self.stats)
    }

    /// Whether the last output frame was also marked valid.
    #[must_use]
    pub fn pd_output_marked_valid(&self) -> bool {
        self.process_data.output_marked_valid()
    }

    /// Read a device parameter.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Timeout`], [`IolinkError::Isdu`] or
    /// [`IolinkError::TransactionPending`].
    pub fn read_device_isdu(&mut self, index: u16, subindex: u8) -> IolinkResult<Vec<u8>> {
        let handle = self.require_handle()?;
        self.isdu.read(
            &mut self.driver,
            handle,
            IsduAddress::new(index, subindex),
            &mut self.stats,
        )
    }

    /// Write a device parameter.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Timeout`], [`IolinkError::Isdu`] or
    /// [`IolinkError::TransactionPending`].
    pub fn write_device_isdu(&mut self, index: u16, subindex: u8, data: &[u8]) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.isdu.write(
            &mut self.driver,
            handle,
            IsduAddress::new(index, subindex),
            data,
            &mut self.stats,
        )
    }

    /// Start a parameter read; collect it with [`Port::finish_isdu_read`].
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::begin_read`].
    pub fn begin_isdu_read(&mut self, index: u16, subindex: u8) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.isdu
            .begin_read(&mut self.driver, handle, IsduAddress::new(index, subindex))
    }

    /// Collect the pending parameter read.
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::finish_read`].
    pub fn finish_isdu_read(&mut self) -> IolinkResult<Vec<u8>> {
        let handle = self.require_handle()?;
        self.isdu
            .finish_read(&mut self.driver, handle, &mut self.stats)
    }

    /// Start a parameter write; collect it with [`Port::finish_isdu_write`].
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::begin_write`].
    pub fn begin_isdu_write(&mut self, index: u16, subindex: u8, data: &[u8]) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.isdu.begin_write(
            &mut self.driver,
            handle,
            IsduAddress::new(index, subindex),
            data,
        )
    }

    /// Collect the pending parameter write.
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::finish_write`].
    pub fn finish_isdu_write(&mut self) -> IolinkResult<()> {
        let handle = self.require_handle()?;
        self.isdu
            .finish_write(&mut self.driver, handle, &mut self.stats)
    }

    /// Forget the pending ISDU transaction, if any.
    pub fn abandon_isdu(&mut self) -> Option<IsduAddress> {
        self.isdu.abandon()
    }

    /// The ISDU transaction in flight, if any.
    #[must_use]
    pub fn pending_isdu(&self) -> Option<&PendingTransaction> {
        self.isdu.pending()
    }

    /// Write a standard system command.
    ///
    /// # Errors
    ///
    /// Same as [`Port::write_device_isdu`].
    pub fn send_system_command(&mut self, command: SystemCommand) -> IolinkResult<()> {
        let address = SystemCommand::address();
        debug!(?command, "Sending system command");
        self.write_device_isdu(address.index, address.subindex, &[command.code()])
    }

    /// Release the driver handle.
    ///
    /// Does nothing if the port is not connected. The handle is released
    /// even if the driver reports a failure.
    ///
    /// # Errors
    ///
    /// [`IolinkError::Connection`] if the disconnect call fails.
    pub fn shut_down(&mut self) -> IolinkResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.channel = None;
        self.state_machine.reset();
        self.process_data.reset();
        if let Some(address) = self.isdu.abandon() {
            debug!(%address, "Dropping pending ISDU transaction on shutdown");
        }

        self.driver
            .disconnect(handle)
            .map_err(|fault| fault.into_connection_error())?;
        info!(%handle, "Port shut down");
        Ok(())
    }

    /// Whether the port holds a driver handle.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Driver handle, if connected.
    #[must_use]
    pub fn handle(&self) -> Option<PortHandle> {
        self.handle
    }

    /// Channel number selected at connect, or `None` for "first available".
    #[must_use]
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Version of the master driver library.
    #[must_use]
    pub fn driver_version(&self) -> DriverVersion {
        self.version
    }

    /// State reported by the last successful transition.
    #[must_use]
    pub fn last_reported_state(&self) -> Option<OperatingState> {
        self.state_machine.last_reported_state()
    }

    /// Successful device state transitions since the port was created.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.state_machine.transition_count()
    }

    /// Transaction counters.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// Receive buffer capacity for ISDU reads.
    #[must_use]
    pub fn isdu_capacity(&self) -> usize {
        self.isdu.capacity()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The underlying driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn require_handle(&self) -> IolinkResult<PortHandle> {
        self.handle.ok_or(IolinkError::NotConnected)
    }
}

impl<D: MasterDriver> Drop for Port<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shut_down() {
            warn!(error = %e, "Port shutdown on drop failed");
        }
    }
}

impl<D: MasterDriver> std::fmt::Debug for Port<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("handle", &self.handle)
            .field("channel", &self.channel)
            .field("version", &self.version)
            .field("last_reported_state", &self.last_reported_state())
            .field("pending_isdu", &self.isdu.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::{DriverCall, DriverFault, SimulatedMaster};
    use iolink_common::isdu::IsduErrorCode;

    fn config() -> PortConfig {
        PortConfig::default()
    }

    fn open_port() -> Port<SimulatedMaster> {
        Port::open(SimulatedMaster::new(), &config()).unwrap()
    }

    #[test]
    fn test_operations_require_connection() {
        let mut port = Port::new(SimulatedMaster::new(), &config()).unwrap();
        assert!(!port.is_connected());

        assert_eq!(port.power_on(), Err(IolinkError::NotConnected));
        assert_eq!(
            port.change_device_state_to(TargetState::Operate),
            Err(IolinkError::NotConnected)
        );
        assert_eq!(
            port.read_device_isdu(0x10, 0),
            Err(IolinkError::NotConnected)
        );
        assert_eq!(
            port.set_device_pd_output(&[1]),
            Err(IolinkError::NotConnected)
        );
        assert_eq!(
            port.get_device_pd_input_and_status(),
            Err(IolinkError::NotConnected)
        );
        // Only the version query reached the driver
        assert_eq!(port.driver().calls(), &[DriverCall::QueryVersion]);
    }

    #[test]
    fn test_connect_with_selector() {
        let mut port = Port::new(SimulatedMaster::new(), &config()).unwrap();
        port.connect(Some("COM3")).unwrap();
        assert_eq!(port.channel(), Some(3));

        let err = port.connect(None).unwrap_err();
        assert!(matches!(err, IolinkError::Connection(msg) if msg.contains("already connected")));
    }

    #[test]
    fn test_bad_selector_never_reaches_driver() {
        let mut port = Port::new(SimulatedMaster::new(), &config()).unwrap();
        let err = port.connect(Some("ttyUSB0")).unwrap_err();
        assert!(matches!(err, IolinkError::Configuration(_)));
        assert_eq!(port.driver().call_count(DriverCall::Connect), 0);
    }

    #[test]
    fn test_connect_failure() {
        let mut port = Port::new(SimulatedMaster::new(), &config()).unwrap();
        let err = port.connect(Some("COM9")).unwrap_err();
        assert_eq!(err, IolinkError::Connection("no IO-Link master found".into()));
        assert!(!port.is_connected());
    }

    #[test]
    fn test_old_driver_rejected() {
        let mut master_config = config();
        master_config.simulated.version_major = 1;
        let master = SimulatedMaster::from_config(&master_config.simulated);

        let err = Port::new(master, &master_config).unwrap_err();
        assert!(matches!(err, IolinkError::Configuration(msg) if msg.contains("1.1")));
    }

    #[test]
    fn test_version_query_failure_is_configuration_error() {
        let mut master = SimulatedMaster::new();
        master.fail_with(DriverCall::QueryVersion, DriverFault::new(-1, "symbol not found"));

        let err = Port::new(master, &config()).unwrap_err();
        assert!(matches!(err, IolinkError::Configuration(msg) if msg.contains("symbol not found")));
    }

    #[test]
    fn test_state_and_isdu_roundtrip() {
        let mut port = open_port();
        port.driver_mut()
            .insert_parameter(IsduAddress::new(0x51, 0), vec![0, 0], true);

        port.change_device_state_to(TargetState::PreOperate).unwrap();
        assert_eq!(port.last_reported_state(), Some(OperatingState::PreOperate));

        port.write_device_isdu(0x51, 0, &[0x01, 0xF4]).unwrap();
        assert_eq!(port.read_device_isdu(0x51, 0).unwrap(), vec![0x01, 0xF4]);
        assert_eq!(port.stats().isdu_completed(), 2);
    }

    #[test]
    fn test_system_command_restores_factory_values() {
        let mut port = open_port();
        port.driver_mut()
            .insert_parameter(IsduAddress::new(0x50, 0), vec![0, 5], true);
        port.change_device_state_to(TargetState::PreOperate).unwrap();

        port.write_device_isdu(0x50, 0, &[0, 9]).unwrap();
        port.send_system_command(SystemCommand::RestoreFactorySettings)
            .unwrap();
        assert_eq!(port.read_device_isdu(0x50, 0).unwrap(), vec![0, 5]);
    }

    #[test]
    fn test_split_isdu_through_port() {
        let mut port = open_port();
        port.change_device_state_to(TargetState::PreOperate).unwrap();

        port.begin_isdu_read(0x0012, 0).unwrap();
        assert_eq!(
            port.read_device_isdu(0x0010, 0),
            Err(IolinkError::TransactionPending {
                address: IsduAddress::new(0x0012, 0)
            })
        );
        assert_eq!(port.finish_isdu_read().unwrap(), b"Simulated Device".to_vec());
        assert!(port.pending_isdu().is_none());
    }

    #[test]
    fn test_isdu_error_code_surfaces() {
        let mut port = open_port();
        port.change_device_state_to(TargetState::Operate).unwrap();
        let err = port.write_device_isdu(0xFFFF, 0, &[0]).unwrap_err();
        assert_eq!(err.isdu_code(), Some(IsduErrorCode::IDX_NOTAVAIL));
    }

    #[test]
    fn test_power_off_clears_cached_state() {
        let mut port = open_port();
        port.change_device_state_to(TargetState::Operate).unwrap();
        port.power_off().unwrap();
        assert_eq!(port.last_reported_state(), None);
        assert_eq!(port.transition_count(), 1);
        assert!(!port.driver().is_powered());
        port.power_on().unwrap();
        assert!(port.driver().is_powered());

        port.change_device_state_to(TargetState::Operate).unwrap();
        assert_eq!(port.transition_count(), 2);
    }

    #[test]
    fn test_shut_down_is_idempotent() {
        let mut port = open_port();
        port.shut_down().unwrap();
        port.shut_down().unwrap();
        assert_eq!(port.driver().call_count(DriverCall::Disconnect), 1);
        assert_eq!(port.power_on(), Err(IolinkError::NotConnected));
    }

    #[test]
    fn test_failed_disconnect_still_releases_handle() {
        let mut port = open_port();
        port.driver_mut().fail_with(
            DriverCall::Disconnect,
            DriverFault::new(-2, "invalid port handle"),
        );

        let err = port.shut_down().unwrap_err();
        assert_eq!(err, IolinkError::Connection("invalid port handle".into()));
        assert!(!port.is_connected());
        assert!(port.shut_down().is_ok());
        assert_eq!(port.driver().call_count(DriverCall::Disconnect), 1);
    }

    #[test]
    fn test_drop_disconnects() {
        let mut master = SimulatedMaster::new();
        {
            let _port = Port::open(&mut master, &config()).unwrap();
        }
        assert_eq!(master.call_count(DriverCall::Disconnect), 1);
        assert_eq!(master.open_handle(), None);
    }
}
