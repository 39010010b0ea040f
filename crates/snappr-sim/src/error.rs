use snappr_core::config::ConfigError;
use snappr_core::NodeId;
use snappr_nic::NicError;
use snappr_transport::ProtocolError;

/// Anything that ends a run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Nic(#[from] NicError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no endpoint {0}")]
    UnknownNode(NodeId),
}
