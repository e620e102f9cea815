/// Errors that can occur on ports and the broadcast environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The entangled port on the other side has been dropped.
    #[error("message port closed")]
    PortClosed,

    /// Every handle to the broadcast environment has been dropped.
    #[error("environment closed")]
    EnvironmentClosed,

    /// A transferred port was already claimed by another receiver.
    #[error("port already transferred")]
    AlreadyTransferred,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
