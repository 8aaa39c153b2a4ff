//! Driver error taxonomy.
//!
//! Every RPC handler converts whatever it produces into a `DriverError`
//! before replying, so the HTTP status and the `{"Err": ...}` body the
//! engine expects stay in lockstep with the error kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Bad or missing request data: unknown driver option, non-null IPAM,
    /// a static address on the null-IPAM contract, an ineligible bridge.
    #[error("{0}")]
    Validation(String),

    /// The request is well-formed but collides with existing state, e.g. a
    /// requested address already assigned on the bridge.
    #[error("{0}")]
    ResourceConflict(String),

    /// A bounded wait elapsed: interface never appeared, no DHCP lease,
    /// container not yet visible to the engine.
    #[error("{0}")]
    Timeout(String),

    /// Anything else: netlink failures, subprocess failures, engine API
    /// errors.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl DriverError {
    fn status(&self) -> StatusCode {
        match self {
            DriverError::Validation(_) => StatusCode::BAD_REQUEST,
            DriverError::ResourceConflict(_) => StatusCode::BAD_REQUEST,
            DriverError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DriverError::External(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    #[serde(rename = "Err")]
    err: String,
}

impl IntoResponse for DriverError {
    fn into_response(self) -> Response {
        let status = self.status();
        log::warn!("rpc error: {self}");
        (status, Json(ErrBody { err: self.to_string() })).into_response()
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = DriverError::Validation("bad bridge".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn timeout_maps_to_internal_server_error() {
        let err = DriverError::Timeout("no lease".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn external_wraps_anyhow() {
        let err: DriverError = anyhow::anyhow!("netlink exploded").into();
        assert!(matches!(err, DriverError::External(_)));
    }
}
