//! ISDU transaction engine.
//!
//! Drives the request / wait / fetch protocol for indexed parameter
//! access. At most one transaction is in flight per port; the phases
//! are exposed separately so a caller can start a request and collect
//! the response later.

use crate::{MasterDriver, PortHandle};
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::isdu::{IsduAddress, IsduDirection};
use iolink_common::metrics::TransactionStats;
use std::time::Instant;
use tracing::{debug, error, warn};

/// The transaction currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Parameter address.
    pub address: IsduAddress,
    /// Read or write.
    pub direction: IsduDirection,
    started: Instant,
}

/// Sequential ISDU engine for one port.
#[derive(Debug)]
pub struct IsduEngine {
    /// Receive buffer reused across reads.
    rx_buffer: Vec<u8>,
    pending: Option<PendingTransaction>,
}

impl IsduEngine {
    /// Create an engine whose read responses hold at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rx_buffer: vec![0u8; capacity],
            pending: None,
        }
    }

    /// Receive buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx_buffer.len()
    }

    /// The transaction in flight, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }

    /// Issue a read request without waiting for the response.
    ///
    /// # Errors
    ///
    /// [`IolinkError::TransactionPending`] if a transaction is in flight,
    /// [`IolinkError::Connection`] if the driver rejects the request.
    pub fn begin_read<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        address: IsduAddress,
    ) -> IolinkResult<()> {
        self.ensure_idle()?;
        debug!(%address, "ISDU read request");
        driver
            .start_read_isdu(handle, address)
            .map_err(|fault| fault.into_connection_error())?;
        self.pending = Some(PendingTransaction {
            address,
            direction: IsduDirection::Read,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Issue a write request without waiting for the response.
    ///
    /// # Errors
    ///
    /// Same as [`IsduEngine::begin_read`].
    pub fn begin_write<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        address: IsduAddress,
        data: &[u8],
    ) -> IolinkResult<()> {
        self.ensure_idle()?;
        debug!(%address, len = data.len(), "ISDU write request");
        driver
            .start_write_isdu(handle, address, data)
            .map_err(|fault| fault.into_connection_error())?;
        self.pending = Some(PendingTransaction {
            address,
            direction: IsduDirection::Write,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Wait for the pending read and fetch its response.
    ///
    /// A timeout leaves the transaction pending; any fetch outcome ends it.
    ///
    /// # Errors
    ///
    /// - [`IolinkError::NoPendingTransaction`] if no read is pending
    /// - [`IolinkError::Timeout`] if the driver's wait expired
    /// - [`IolinkError::Isdu`] if the device rejected the request
    /// - [`IolinkError::Connection`] if the driver reports more bytes than
    ///   the buffer holds
    pub fn finish_read<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        stats: &mut TransactionStats,
    ) -> IolinkResult<Vec<u8>> {
        let pending = self.await_response(driver, handle, IsduDirection::Read, stats)?;
        let address = pending.address;

        let len = match driver.fetch_read_isdu_response(handle, &mut self.rx_buffer) {
            Ok(len) => len,
            Err(fault) => {
                stats.record_isdu_error();
                error!(%address, code = %fault.isdu_error, "ISDU read rejected by device");
                return Err(IolinkError::Isdu(fault.isdu_error));
            }
        };

        if len > self.rx_buffer.len() {
            return Err(IolinkError::Connection(format!(
                "driver reported {len} bytes for {address}, buffer holds {}",
                self.rx_buffer.len()
            )));
        }

        stats.record_read(pending.started.elapsed());
        debug!(%address, len, "ISDU read complete");
        Ok(self.rx_buffer[..len].to_vec())
    }

    /// Wait for the pending write and fetch its response.
    ///
    /// # Errors
    ///
    /// Same as [`IsduEngine::finish_read`], minus the length check.
    pub fn finish_write<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        stats: &mut TransactionStats,
    ) -> IolinkResult<()> {
        let pending = self.await_response(driver, handle, IsduDirection::Write, stats)?;
        let address = pending.address;

        if let Err(fault) = driver.fetch_write_isdu_response(handle) {
            stats.record_isdu_error();
            error!(%address, code = %fault.isdu_error, "ISDU write rejected by device");
            return Err(IolinkError::Isdu(fault.isdu_error));
        }

        stats.record_write(pending.started.elapsed());
        debug!(%address, "ISDU write complete");
        Ok(())
    }

    /// Drop the pending transaction locally. Returns its address.
    pub fn abandon(&mut self) -> Option<IsduAddress> {
        let pending = self.pending.take()?;
        debug!(address = %pending.address, direction = %pending.direction, "ISDU transaction abandoned");
        Some(pending.address)
    }

    /// Read a parameter: request, wait, fetch.
    ///
    /// The transaction is abandoned on any failure.
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::begin_read`] and [`IsduEngine::finish_read`].
    pub fn read<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        address: IsduAddress,
        stats: &mut TransactionStats,
    ) -> IolinkResult<Vec<u8>> {
        self.begin_read(driver, handle, address)?;
        self.finish_read(driver, handle, stats).map_err(|e| {
            self.abandon();
            e
        })
    }

    /// Write a parameter: request, wait, fetch.
    ///
    /// The transaction is abandoned on any failure.
    ///
    /// # Errors
    ///
    /// See [`IsduEngine::begin_write`] and [`IsduEngine::finish_write`].
    pub fn write<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        address: IsduAddress,
        data: &[u8],
        stats: &mut TransactionStats,
    ) -> IolinkResult<()> {
        self.begin_write(driver, handle, address, data)?;
        self.finish_write(driver, handle, stats).map_err(|e| {
            self.abandon();
            e
        })
    }

    fn ensure_idle(&self) -> IolinkResult<()> {
        match self.pending {
            Some(pending) => Err(IolinkError::TransactionPending {
                address: pending.address,
            }),
            None => Ok(()),
        }
    }

    /// Wait phase shared by both directions. On success the transaction
    /// is taken out of `pending`.
    fn await_response<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        direction: IsduDirection,
        stats: &mut TransactionStats,
    ) -> IolinkResult<PendingTransaction> {
        let pending = self
            .pending
            .filter(|p| p.direction == direction)
            .ok_or(IolinkError::NoPendingTransaction { direction })?;

        if let Err(fault) = driver.wait_isdu_response(handle, pending.address) {
            stats.record_timeout();
            warn!(address = %pending.address, status = fault.status, "ISDU wait failed");
            let message = if fault.message.is_empty() {
                format!("no response for {}", pending.address)
            } else {
                fault.message
            };
            return Err(IolinkError::Timeout(message));
        }

        self.pending = None;
        Ok(pending)
    }
}
