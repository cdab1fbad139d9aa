//! In-memory IO-Link master.
//!
//! [`SimulatedMaster`] implements [`MasterDriver`] without hardware. It
//! models one master with a single attached device: port power, the
//! device's operating state, a parameter table reachable over ISDU,
//! and the process-data frames. Every driver call is logged, and any
//! call can be made to fail, which is what the port layer's tests
//! build on.

use crate::{
    ChannelRange, DriverFault, DriverResult, DriverVersion, InputReport, MasterDriver, PortHandle,
};
use iolink_common::config::SimulatedConfig;
use iolink_common::isdu::{standard_index, IsduAddress, IsduDirection, IsduErrorCode, SystemCommand};
use iolink_common::state::{OperatingMode, OperatingState};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, trace};

/// Largest process-data frame the simulated master accepts.
pub const MAX_PD_LEN: usize = 32;

// Driver status codes used by the simulated master.
const STATUS_NO_MASTER: i16 = -1;
const STATUS_INVALID_HANDLE: i16 = -2;
const STATUS_ALREADY_OPEN: i16 = -3;
const STATUS_PD_REJECTED: i16 = -4;
const STATUS_ISDU_TIMEOUT: i16 = -7;
const STATUS_ISDU_SEQUENCE: i16 = -8;
const STATUS_ISDU_REJECTED: i16 = -9;

/// Driver entry points, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCall {
    /// `query_version`
    QueryVersion,
    /// `connect`
    Connect,
    /// `disconnect`
    Disconnect,
    /// `set_operating_mode`
    SetOperatingMode,
    /// `get_status`
    GetStatus,
    /// `set_process_data`
    SetProcessData,
    /// `set_process_data_validity`
    SetProcessDataValidity,
    /// `power_control`
    PowerControl,
    /// `start_read_isdu`
    StartReadIsdu,
    /// `wait_isdu_response`
    WaitIsduResponse,
    /// `fetch_read_isdu_response`
    FetchReadIsduResponse,
    /// `start_write_isdu`
    StartWriteIsdu,
    /// `fetch_write_isdu_response`
    FetchWriteIsduResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Parameter {
    value: Vec<u8>,
    writable: bool,
}

#[derive(Debug)]
struct IsduRequest {
    address: IsduAddress,
    direction: IsduDirection,
    payload: Vec<u8>,
    answered: bool,
}

/// Simulated IO-Link master with one device.
#[derive(Debug)]
pub struct SimulatedMaster {
    version: DriverVersion,
    channels: Vec<u8>,
    handle: Option<PortHandle>,
    next_handle: u16,
    powered: bool,
    device_state: OperatingState,
    forced_state: Option<u8>,
    parameters: BTreeMap<IsduAddress, Parameter>,
    factory_parameters: BTreeMap<IsduAddress, Parameter>,
    isdu_timeout: Duration,
    isdu_latency: Duration,
    request: Option<IsduRequest>,
    pd_output: Vec<u8>,
    pd_output_valid: bool,
    pd_input: Vec<u8>,
    pd_status: u8,
    calls: Vec<DriverCall>,
    faults: HashMap<DriverCall, DriverFault>,
}

impl SimulatedMaster {
    /// Create a master with the default simulated device.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&SimulatedConfig::default())
    }

    /// Create a master from configuration.
    #[must_use]
    pub fn from_config(config: &SimulatedConfig) -> Self {
        let parameters: BTreeMap<_, _> = config
            .parameters
            .iter()
            .map(|seed| {
                (
                    IsduAddress::new(seed.index, seed.subindex),
                    Parameter {
                        value: seed.value.clone(),
                        writable: seed.writable,
                    },
                )
            })
            .collect();

        debug!(
            channels = ?config.channels,
            parameters = parameters.len(),
            "Simulated master created"
        );

        Self {
            version: DriverVersion::new(config.version_major, config.version_minor),
            channels: config.channels.clone(),
            handle: None,
            next_handle: 1,
            powered: true,
            device_state: OperatingState::Inactive,
            forced_state: None,
            factory_parameters: parameters.clone(),
            parameters,
            isdu_timeout: config.isdu_timeout,
            isdu_latency: config.isdu_latency,
            request: None,
            pd_output: Vec::new(),
            pd_output_valid: false,
            pd_input: config.pd_input.clone(),
            pd_status: config.pd_status,
            calls: Vec::new(),
            faults: HashMap::new(),
        }
    }

    /// Add or replace a device parameter. The new value also becomes its
    /// factory default.
    pub fn insert_parameter(&mut self, address: IsduAddress, value: Vec<u8>, writable: bool) {
        let parameter = Parameter { value, writable };
        self.factory_parameters.insert(address, parameter.clone());
        self.parameters.insert(address, parameter);
    }

    /// Current value of a device parameter.
    #[must_use]
    pub fn parameter(&self, address: IsduAddress) -> Option<&[u8]> {
        self.parameters.get(&address).map(|p| p.value.as_slice())
    }

    /// Override the state code reported by `set_operating_mode`.
    pub fn force_reported_state(&mut self, code: Option<u8>) {
        self.forced_state = code;
    }

    /// Set the simulated ISDU response time.
    pub fn set_isdu_latency(&mut self, latency: Duration) {
        self.isdu_latency = latency;
    }

    /// Set the process-data input frame and status byte.
    pub fn set_pd_input(&mut self, data: Vec<u8>, status: u8) {
        self.pd_input = data;
        self.pd_status = status;
    }

    /// Last output frame written.
    #[must_use]
    pub fn pd_output(&self) -> &[u8] {
        &self.pd_output
    }

    /// Whether the last output frame was marked valid.
    #[must_use]
    pub fn pd_output_valid(&self) -> bool {
        self.pd_output_valid
    }

    /// Whether the port supplies power to the device.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Current device state.
    #[must_use]
    pub fn device_state(&self) -> OperatingState {
        self.device_state
    }

    /// Handle of the open port, if any.
    #[must_use]
    pub fn open_handle(&self) -> Option<PortHandle> {
        self.handle
    }

    /// Every driver call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Number of times `call` was made.
    #[must_use]
    pub fn call_count(&self, call: DriverCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Clear the call log.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Make every subsequent `call` fail with `fault`.
    pub fn fail_with(&mut self, call: DriverCall, fault: DriverFault) {
        self.faults.insert(call, fault);
    }

    /// Remove an injected fault.
    pub fn clear_fault(&mut self, call: DriverCall) {
        self.faults.remove(&call);
    }

    fn enter(&mut self, call: DriverCall) -> DriverResult<()> {
        self.calls.push(call);
        trace!(?call, "Simulated driver call");
        match self.faults.get(&call) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn check_handle(&self, handle: PortHandle) -> DriverResult<()> {
        if self.handle == Some(handle) {
            Ok(())
        } else {
            Err(DriverFault::new(STATUS_INVALID_HANDLE, "invalid port handle"))
        }
    }

    fn enter_port(&mut self, call: DriverCall, handle: PortHandle) -> DriverResult<()> {
        self.enter(call)?;
        self.check_handle(handle)
    }

    fn set_device_state(&mut self, state: OperatingState) {
        if state != OperatingState::Operate {
            self.pd_output_valid = false;
        }
        if self.device_state != state {
            debug!(from = %self.device_state, to = %state, "Simulated device state change");
        }
        self.device_state = state;
    }

    fn begin_request(&mut self, address: IsduAddress, direction: IsduDirection, payload: &[u8]) {
        if let Some(stale) = self.request.take() {
            trace!(address = %stale.address, "Replacing unfinished ISDU request");
        }
        self.request = Some(IsduRequest {
            address,
            direction,
            payload: payload.to_vec(),
            answered: false,
        });
    }

    fn take_answered(&mut self, direction: IsduDirection) -> DriverResult<IsduRequest> {
        match self.request.take() {
            Some(request) if request.answered && request.direction == direction => Ok(request),
            other => {
                self.request = other;
                Err(DriverFault::new(
                    STATUS_ISDU_SEQUENCE,
                    format!("no answered ISDU {direction} request"),
                ))
            }
        }
    }

    fn missing_parameter_code(&self, address: IsduAddress) -> IsduErrorCode {
        let index_known = self.parameters.keys().any(|a| a.index == address.index);
        if index_known {
            IsduErrorCode::SUBIDX_NOTAVAIL
        } else {
            IsduErrorCode::IDX_NOTAVAIL
        }
    }

    fn read_parameter(&self, address: IsduAddress) -> Result<&[u8], IsduErrorCode> {
        if address.index == standard_index::SYSTEM_COMMAND {
            return Err(IsduErrorCode::IDX_NOT_ACCESSIBLE);
        }
        self.parameters
            .get(&address)
            .map(|p| p.value.as_slice())
            .ok_or_else(|| self.missing_parameter_code(address))
    }

    fn write_parameter(&mut self, address: IsduAddress, data: &[u8]) -> Result<(), IsduErrorCode> {
        if address.index == standard_index::SYSTEM_COMMAND {
            return self.run_system_command(data);
        }
        let missing = self.missing_parameter_code(address);
        let parameter = self.parameters.get_mut(&address).ok_or(missing)?;
        if !parameter.writable {
            return Err(IsduErrorCode::IDX_NOT_ACCESSIBLE);
        }
        match data.len().cmp(&parameter.value.len()) {
            std::cmp::Ordering::Greater => Err(IsduErrorCode::VAL_LENOVRRUN),
            std::cmp::Ordering::Less => Err(IsduErrorCode::VAL_LENUNDRUN),
            std::cmp::Ordering::Equal => {
                parameter.value.copy_from_slice(data);
                Ok(())
            }
        }
    }

    fn run_system_command(&mut self, data: &[u8]) -> Result<(), IsduErrorCode> {
        let code = match data {
            [code] => *code,
            [] => return Err(IsduErrorCode::VAL_LENUNDRUN),
            _ => return Err(IsduErrorCode::VAL_LENOVRRUN),
        };
        let command = SystemCommand::from_code(code).ok_or(IsduErrorCode::FUNC_NOTAVAIL)?;
        debug!(?command, "Simulated system command");
        if matches!(
            command,
            SystemCommand::RestoreFactorySettings | SystemCommand::BackToBox
        ) {
            self.parameters = self.factory_parameters.clone();
        }
        Ok(())
    }
}

impl Default for SimulatedMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterDriver for SimulatedMaster {
    fn query_version(&mut self) -> DriverResult<DriverVersion> {
        self.enter(DriverCall::QueryVersion)?;
        Ok(self.version)
    }

    fn connect(&mut self, channels: ChannelRange) -> DriverResult<PortHandle> {
        self.enter(DriverCall::Connect)?;
        if self.handle.is_some() {
            return Err(DriverFault::new(STATUS_ALREADY_OPEN, "port already open"));
        }
        let channel = self
            .channels
            .iter()
            .copied()
            .find(|c| channels.contains(*c))
            .ok_or_else(|| DriverFault::new(STATUS_NO_MASTER, "no IO-Link master found"))?;

        let handle = PortHandle::new(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.handle = Some(handle);
        debug!(channel, %handle, "Simulated master connected");
        Ok(handle)
    }

    fn disconnect(&mut self, handle: PortHandle) -> DriverResult<()> {
        self.enter_port(DriverCall::Disconnect, handle)?;
        self.handle = None;
        self.request = None;
        self.set_device_state(OperatingState::Inactive);
        debug!(%handle, "Simulated master disconnected");
        Ok(())
    }

    fn set_operating_mode(
        &mut self,
        handle: PortHandle,
        mode: OperatingMode,
        expected: Option<OperatingState>,
    ) -> DriverResult<u8> {
        self.enter_port(DriverCall::SetOperatingMode, handle)?;

        if let Some(code) = self.forced_state {
            if let Some(state) = OperatingState::from_code(code) {
                self.set_device_state(state);
            }
            return Ok(code);
        }

        let state = match mode {
            OperatingMode::Inactive => OperatingState::Inactive,
            _ if !self.powered => OperatingState::CheckFault,
            OperatingMode::Auto => OperatingState::Operate,
            _ => expected.unwrap_or(OperatingState::CheckFault),
        };
        self.set_device_state(state);
        Ok(state.code())
    }

    fn get_status(&mut self, handle: PortHandle, buf: &mut [u8]) -> DriverResult<InputReport> {
        self.enter_port(DriverCall::GetStatus, handle)?;
        if self.device_state != OperatingState::Operate {
            return Ok(InputReport {
                length: 0,
                status: self.pd_status,
            });
        }
        let length = self.pd_input.len().min(buf.len());
        buf[..length].copy_from_slice(&self.pd_input[..length]);
        Ok(InputReport {
            length,
            status: self.pd_status,
        })
    }

    fn set_process_data(&mut self, handle: PortHandle, data: &[u8]) -> DriverResult<()> {
        self.enter_port(DriverCall::SetProcessData, handle)?;
        if self.device_state != OperatingState::Operate {
            return Err(DriverFault::new(
                STATUS_PD_REJECTED,
                format!("device is in {}, not OPERATE", self.device_state),
            ));
        }
        if data.len() > MAX_PD_LEN {
            return Err(DriverFault::new(
                STATUS_PD_REJECTED,
                format!("process data length {} exceeds {MAX_PD_LEN}", data.len()),
            ));
        }
        self.pd_output = data.to_vec();
        self.pd_output_valid = false;
        Ok(())
    }

    fn set_process_data_validity(&mut self, handle: PortHandle, valid: bool) -> DriverResult<()> {
        self.enter_port(DriverCall::SetProcessDataValidity, handle)?;
        self.pd_output_valid = valid;
        Ok(())
    }

    fn power_control(&mut self, handle: PortHandle, on: bool) -> DriverResult<()> {
        self.enter_port(DriverCall::PowerControl, handle)?;
        self.powered = on;
        if !on {
            self.set_device_state(OperatingState::Inactive);
        }
        debug!(%handle, on, "Simulated port power");
        Ok(())
    }

    fn start_read_isdu(&mut self, handle: PortHandle, address: IsduAddress) -> DriverResult<()> {
        self.enter_port(DriverCall::StartReadIsdu, handle)?;
        self.begin_request(address, IsduDirection::Read, &[]);
        Ok(())
    }

    fn wait_isdu_response(&mut self, handle: PortHandle, address: IsduAddress) -> DriverResult<()> {
        self.enter_port(DriverCall::WaitIsduResponse, handle)?;
        let device_ready = self.powered && self.device_state.accepts_isdu();
        let request = match self.request.as_mut() {
            Some(request) if request.address == address => request,
            _ => {
                return Err(DriverFault::new(
                    STATUS_ISDU_SEQUENCE,
                    format!("no ISDU request for {address}"),
                ))
            }
        };

        // An unanswered request stays queued for the next wait
        if !device_ready || self.isdu_latency > self.isdu_timeout {
            return Err(DriverFault::new(
                STATUS_ISDU_TIMEOUT,
                format!("no ISDU response for {address} within {:?}", self.isdu_timeout),
            ));
        }

        request.answered = true;
        Ok(())
    }

    fn fetch_read_isdu_response(
        &mut self,
        handle: PortHandle,
        buf: &mut [u8],
    ) -> DriverResult<usize> {
        self.enter_port(DriverCall::FetchReadIsduResponse, handle)?;
        let request = self.take_answered(IsduDirection::Read)?;
        let value = self.read_parameter(request.address).map_err(|code| {
            DriverFault::new(STATUS_ISDU_REJECTED, "ISDU read rejected").with_isdu_error(code)
        })?;
        let length = value.len().min(buf.len());
        buf[..length].copy_from_slice(&value[..length]);
        Ok(length)
    }

    fn start_write_isdu(
        &mut self,
        handle: PortHandle,
        address: IsduAddress,
        data: &[u8],
    ) -> DriverResult<()> {
        self.enter_port(DriverCall::StartWriteIsdu, handle)?;
        self.begin_request(address, IsduDirection::Write, data);
        Ok(())
    }

    fn fetch_write_isdu_response(&mut self, handle: PortHandle) -> DriverResult<()> {
        self.enter_port(DriverCall::FetchWriteIsduResponse, handle)?;
        let request = self.take_answered(IsduDirection::Write)?;
        self.write_parameter(request.address, &request.payload)
            .map_err(|code| {
                DriverFault::new(STATUS_ISDU_REJECTED, "ISDU write rejected").with_isdu_error(code)
            })
    }
}
