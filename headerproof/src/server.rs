//! HTTP control plane.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use headerproof_types::{
    ConnectRequest, ConnectResponse, ErrorBody, GenerateProofRequest, Header, LeafRequest,
    LeafResponse, Proof, QueryByHashRequest, QueryByNumberRequest, Status, VerifyProofRequest,
    VerifyProofResponse,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    wire::{
        format_hash, header_to_wire, parse_input_hash, parse_proof_hash, proof_steps_from_wire,
        proof_to_wire,
    },
    Error, HeaderProofService,
};

pub fn router(service: HeaderProofService) -> Router {
    Router::new()
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/query/number", post(query_by_number))
        .route("/query/hash", post(query_by_hash))
        .route("/leaf", post(leaf))
        .route("/proof/generate", post(generate_proof))
        .route("/proof/verify", post(verify_proof))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the control plane on `addr` until `shutdown` is cancelled.
pub async fn serve(
    service: HeaderProofService,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "control plane listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
}

#[derive(Debug)]
pub struct AppError(pub Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ConnectionFailure(_)
            | Error::HashResolutionFailure { .. }
            | Error::Protocol(_) => StatusCode::BAD_GATEWAY,
            Error::HeaderNotFound(_) | Error::LeafNotFound(_) | Error::RootNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::MalformedProof(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::BufferFull { .. } | Error::BatchNotReady { .. } => StatusCode::CONFLICT,
            Error::InvalidConfig(_) | Error::Merkle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

async fn connect(
    State(service): State<HeaderProofService>,
    Json(ConnectRequest { url }): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, AppError> {
    service.connect(&url).await?;
    Ok(Json(ConnectResponse { url }))
}

async fn disconnect(State(service): State<HeaderProofService>) -> StatusCode {
    service.disconnect().await;
    StatusCode::NO_CONTENT
}

async fn query_by_number(
    State(service): State<HeaderProofService>,
    Json(QueryByNumberRequest { number }): Json<QueryByNumberRequest>,
) -> Result<Json<Header>, AppError> {
    let record = service
        .query_by_number(number)
        .await
        .ok_or_else(|| Error::HeaderNotFound(format!("block #{}", number)))?;
    Ok(Json(header_to_wire(&record)))
}

async fn query_by_hash(
    State(service): State<HeaderProofService>,
    Json(QueryByHashRequest { hash }): Json<QueryByHashRequest>,
) -> Result<Json<Header>, AppError> {
    let hash = parse_input_hash("hash", &hash)?;
    let record = service
        .query_by_hash(&hash)
        .await
        .ok_or_else(|| Error::HeaderNotFound(format_hash(&hash)))?;
    Ok(Json(header_to_wire(&record)))
}

async fn leaf(
    State(service): State<HeaderProofService>,
    Json(LeafRequest { block_hash }): Json<LeafRequest>,
) -> Result<Json<LeafResponse>, AppError> {
    let block_hash = parse_input_hash("block_hash", &block_hash)?;
    Ok(Json(LeafResponse {
        leaf: format_hash(&service.leaf_for(&block_hash).await),
    }))
}

async fn generate_proof(
    State(service): State<HeaderProofService>,
    Json(GenerateProofRequest { leaf }): Json<GenerateProofRequest>,
) -> Result<Json<Proof>, AppError> {
    let leaf = parse_input_hash("leaf", &leaf)?;
    let proof = service.generate_proof(&leaf).await?;
    Ok(Json(proof_to_wire(&proof)))
}

async fn verify_proof(
    State(service): State<HeaderProofService>,
    Json(request): Json<VerifyProofRequest>,
) -> Result<Json<VerifyProofResponse>, AppError> {
    let root = parse_proof_hash("root", &request.root)?;
    let leaf = parse_proof_hash("leaf", &request.leaf)?;
    let steps = proof_steps_from_wire(&request.proof)?;
    if let Some(proof_root) = &request.proof.root {
        if parse_proof_hash("proof.root", proof_root)? != root {
            return Err(Error::MalformedProof("proof.root does not match root".into()).into());
        }
    }

    match service.verify_proof(&steps, &root, &leaf).await {
        Ok(valid) => Ok(Json(VerifyProofResponse {
            valid,
            reason: (!valid).then(|| "computed root does not match".to_string()),
        })),
        Err(e) if e.is_verification_failure() => Ok(Json(VerifyProofResponse {
            valid: false,
            reason: Some(e.to_string()),
        })),
        Err(e) => Err(e.into()),
    }
}

async fn status(State(service): State<HeaderProofService>) -> Json<Status> {
    let status = service.status().await;
    Json(Status {
        batch_size: status.batch_size,
        hash_algorithm: status.algorithm.name().to_string(),
        buffered: status.buffered,
        trees: status.trees,
        roots: status.roots.iter().map(format_hash).collect(),
        ingested: status.stats.ingested,
        skipped: status.stats.skipped,
        connected_to: status.stats.connected_to,
        last_error: status.stats.last_error,
    })
}
