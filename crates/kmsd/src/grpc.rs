//! tonic gRPC server for the KMS API over TCP

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Code, Status};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use kms_core::proto::{
    kms_service_server::{KmsService, KmsServiceServer},
    Request, Response,
};
use kms_crypto::{SealError, Sealer};

use crate::metrics::Metrics;

/// Implementation of the `kms.KMSService` gRPC service
pub struct KmsServiceImpl {
    sealer: Sealer,
    metrics: Metrics,
    response_delay: Duration,
}

impl KmsServiceImpl {
    pub fn new(sealer: Sealer, metrics: Metrics, response_delay: Duration) -> Self {
        Self {
            sealer,
            metrics,
            response_delay,
        }
    }

    async fn delay(&self) {
        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }
    }
}

#[tonic::async_trait]
impl KmsService for KmsServiceImpl {
    async fn seal(
        &self,
        request: tonic::Request<Request>,
    ) -> Result<tonic::Response<Response>, Status> {
        self.delay().await;

        let req = request.into_inner();
        debug!(node_uuid = %req.node_uuid, operation = "seal", "request");

        let passphrase = Zeroizing::new(req.data);
        let result = self.sealer.seal(&req.node_uuid, &passphrase).await;
        self.metrics.record("seal", &result);

        let data = result.map_err(|e| to_status("seal", e))?;
        Ok(tonic::Response::new(Response { data }))
    }

    async fn unseal(
        &self,
        request: tonic::Request<Request>,
    ) -> Result<tonic::Response<Response>, Status> {
        self.delay().await;

        let req = request.into_inner();
        debug!(node_uuid = %req.node_uuid, operation = "unseal", "request");

        let result = self.sealer.unseal(&req.node_uuid, &req.data).await;
        self.metrics.record("unseal", &result);

        let mut secret = result.map_err(|e| to_status("unseal", e))?;
        Ok(tonic::Response::new(Response {
            data: std::mem::take(&mut *secret),
        }))
    }
}

fn to_status(operation: &str, err: SealError) -> Status {
    if err.is_invalid_argument() {
        debug!(operation, "rejected: {err}");
        Status::new(Code::InvalidArgument, "incorrect data length")
    } else {
        warn!(operation, "internal error: {err}");
        Status::internal(err.to_string())
    }
}

/// Serve the gRPC API on an already bound listener until `shutdown` resolves.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    listener: TcpListener,
    impl_: KmsServiceImpl,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let stream = TcpListenerStream::new(listener);

    info!(listen = %addr, "gRPC server ready");

    Server::builder()
        .add_service(KmsServiceServer::new(impl_))
        .serve_with_incoming_shutdown(stream, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("gRPC server error: {e}"))
}
