use thiserror::Error as ThisError;

/// Crate-wide error type.
///
/// Every fallible bridge operation returns exactly one of these. Policy per
/// variant:
///
/// - `InvalidArgument`, `NotInitialized`, `EndpointNotFound`,
///   `UnknownEndpointId`, `EndpointExists`, `NotDeletable`,
///   `UnknownDeviceType`, `StoreCapacityExceeded`: permanent. A caller bug
///   or a stale handle; the operation performed no side effects.
/// - `PoolExhausted`: permanent until a slot is freed by removal. The
///   protocol adapter declines the bridged-device request.
/// - `Io` / `Serde`: persistence trouble. The explicit store operations
///   propagate these verbatim; the lifecycle call sites log them and keep
///   the in-memory device usable for the current session (it will not
///   survive a reboot).
///
/// None of these abort the process.
#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("bridge registry is not initialized")]
    NotInitialized,

    #[error("no free bridged endpoint slot (capacity {0})")]
    PoolExhausted(usize),

    #[error("endpoint {0} already exists")]
    EndpointExists(u16),

    #[error("endpoint {0} not found")]
    EndpointNotFound(u16),

    #[error("endpoint id {0} was never allocated")]
    UnknownEndpointId(u16),

    #[error("endpoint {0} is not deletable")]
    NotDeletable(u16),

    #[error("unknown device type id 0x{0:04X}")]
    UnknownDeviceType(u16),

    #[error("persisted record count would exceed capacity {0}")]
    StoreCapacityExceeded(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
