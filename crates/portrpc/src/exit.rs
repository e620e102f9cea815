use std::fmt;
use std::io;

use portrpc_channel::ChannelError;
use portrpc_peer::RpcError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::PortClosed | ChannelError::EnvironmentClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ChannelError::AlreadyTransferred => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Channel(err) => channel_error(context, err),
        RpcError::HandshakeTimeout(_) | RpcError::RequestTimeout(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        RpcError::InvalidPayload(_) | RpcError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::ConnectionNotOpen | RpcError::ConnectionReset => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        RpcError::Abandoned => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let handshake = rpc_error("call failed", RpcError::HandshakeTimeout(Duration::from_millis(50)));
        assert_eq!(handshake.code, TIMEOUT);
        assert!(handshake.message.starts_with("call failed: handshake timed out"));

        let request = rpc_error("call failed", RpcError::RequestTimeout(Duration::from_secs(1)));
        assert_eq!(request.code, TIMEOUT);
    }

    #[test]
    fn payload_and_channel_errors_keep_distinct_codes() {
        assert_eq!(
            rpc_error("x", RpcError::InvalidPayload("no id".into())).code,
            DATA_INVALID
        );
        assert_eq!(
            rpc_error("x", RpcError::Channel(ChannelError::PortClosed)).code,
            FAILURE
        );
        assert_eq!(rpc_error("x", RpcError::ConnectionNotOpen).code, FAILURE);
    }
}
