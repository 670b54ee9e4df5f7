pub mod config;
pub mod error;

pub use error::{KmsError, KmsResult};

/// Generated gRPC types and service traits (from kms.proto)
pub mod proto {
    tonic::include_proto!("kms");
}
