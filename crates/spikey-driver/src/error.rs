//! Error types for Spikey link operations

use thiserror::Error;

/// Result type alias for Spikey operations
pub type Result<T> = std::result::Result<T, SpikeyError>;

/// One parameter-RAM entry whose read-back differed from what was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMismatch {
    /// RAM slot address
    pub address: u32,
    /// Masked data that was expected
    pub expected: u64,
    /// Masked data that was read back, `None` if the chip rejected the read
    /// or answered with another command
    pub actual: Option<u64>,
}

impl ParamMismatch {
    /// Bits that differ, `None` when no data came back
    pub fn error_mask(&self) -> Option<u64> {
        self.actual.map(|actual| self.expected ^ actual)
    }

    /// The read produced no usable response
    pub fn is_unanswered(&self) -> bool {
        self.actual.is_none()
    }
}

/// Errors that can occur during Spikey protocol operations
#[derive(Debug, Error)]
pub enum SpikeyError {
    /// Bit range does not fit a 64-bit word
    #[error("Bit range out of range: pos {pos} + width {width} exceeds 64")]
    OutOfRange {
        /// Field offset
        pos: u32,
        /// Field width
        width: u32,
    },

    /// Value wider than its target field
    #[error("Value {value:#x} overflows {width}-bit field {field}")]
    FieldOverflow {
        /// Field name
        field: String,
        /// Offending value
        value: u64,
        /// Field width
        width: u32,
    },

    /// Chip id outside the 4-bit chip id space
    #[error("Invalid chip id {chip_id}")]
    InvalidChipId {
        /// Requested chip id
        chip_id: u8,
    },

    /// Address outside a fixed-size table
    #[error("Invalid {what} address {address} (limit {limit})")]
    InvalidAddress {
        /// Table being addressed
        what: &'static str,
        /// Requested address
        address: u32,
        /// Number of valid addresses
        limit: u32,
    },

    /// Value wider than the hardware register accepts
    #[error("Value {value} exceeds maximum {max}")]
    ValueOverflow {
        /// Requested value
        value: u32,
        /// Largest accepted value
        max: u32,
    },

    /// Parameter address past the last bank
    #[error("Parameter address {address} out of range (end {end})")]
    AddressOutOfRange {
        /// Requested address
        address: u32,
        /// One past the last valid address
        end: u32,
    },

    /// Post-write read-back mismatch at one or more addresses
    #[error("Verification failed at {} parameter address(es)", mismatches.len())]
    VerificationFailure {
        /// One entry per failing address, in read order
        mismatches: Vec<ParamMismatch>,
    },

    /// Synapse row access while a different row is open
    #[error("Row {requested} requested while row {open} is open")]
    RowConflict {
        /// Row currently open
        open: String,
        /// Row the command addressed
        requested: String,
    },

    /// Synapse controller reported a command decode error
    #[error("Synapse controller decode error (status {status:#x})")]
    CommandDecodeError {
        /// Raw status register
        status: u64,
    },

    /// Status selector outside 0..=3
    #[error("Unknown status selector {selector}")]
    UnknownSelector {
        /// Requested selector
        selector: u8,
    },

    /// Response belongs to a different command than the pending request
    #[error("Unexpected response: expected command {expected:#x}, got {got:#x}")]
    UnexpectedResponse {
        /// Command code of the request
        expected: u8,
        /// Command code of the response (error flag masked)
        got: u8,
    },

    /// Chip set the error flag on a response
    #[error("Command {command:#x} rejected by chip (error flag set)")]
    CommandRejected {
        /// Command code of the request
        command: u8,
    },

    /// More events than an event packet holds
    #[error("{count} events do not fit one packet (max 3)")]
    TooManyEvents {
        /// Number supplied
        count: usize,
    },

    /// Events in one packet must share the time MSB nibble
    #[error("Events do not share a time MSB: {first:#x} vs {other:#x}")]
    SharedTimeMismatch {
        /// MSB of the first valid event
        first: u8,
        /// Conflicting MSB
        other: u8,
    },

    /// Loopback answer was not the inverted pattern
    #[error("Loopback mismatch: sent {sent:#x}, received {received:#x}")]
    LoopbackMismatch {
        /// Pattern sent
        sent: u64,
        /// Data received
        received: u64,
    },

    /// Operation not valid in the current state
    #[error("Invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Only empty or event packets arrived while waiting for a response
    #[error("No response after {skipped} skipped words")]
    NoResponse {
        /// Words discarded or queued while waiting
        skipped: usize,
    },

    /// Link transport failure
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for failure
        reason: String,
    },

    /// I/O error in a transport
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl SpikeyError {
    /// Create a field overflow error
    pub fn field_overflow(field: impl Into<String>, value: u64, width: u32) -> Self {
        Self::FieldOverflow {
            field: field.into(),
            value,
            width,
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(what: &'static str, address: u32, limit: u32) -> Self {
        Self::InvalidAddress {
            what,
            address,
            limit,
        }
    }

    /// Create a row conflict error
    pub fn row_conflict(open: impl ToString, requested: impl ToString) -> Self {
        Self::RowConflict {
            open: open.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// True for errors reported by the chip rather than caused by the request
    pub fn is_device_reported(&self) -> bool {
        matches!(
            self,
            Self::CommandDecodeError { .. }
                | Self::CommandRejected { .. }
                | Self::VerificationFailure { .. }
                | Self::LoopbackMismatch { .. }
        )
    }
}
