//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorKind, OrderError};
use store::StoreError;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Identity headers missing or malformed.
    #[error("{0}")]
    Unauthorized(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Role does not permit the operation.
    #[error("{0}")]
    Forbidden(String),
    /// Order operation error.
    #[error(transparent)]
    Order(#[from] OrderError),
    /// Storage error outside the order service.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Detail of an internal error, attached to the response so the
/// error-detail layer can decide whether to show it.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Order(err) => match err.kind() {
                ErrorKind::Validation | ErrorKind::InvalidStatus => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let detail = self.to_string();
            tracing::error!(error = %detail, "internal server error");
            metrics::counter!("api_internal_errors_total").increment(1);
            let mut response =
                (status, Json(serde_json::json!({ "error": INTERNAL_MESSAGE }))).into_response();
            response.extensions_mut().insert(InternalDetail(detail));
            return response;
        }

        let body = match &self {
            ApiError::Order(err) => serde_json::json!({
                "error": err.to_string(),
                "kind": err.kind().as_str(),
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Response layer that adds internal error details to the body when enabled.
pub async fn expose_error_details(State(expose): State<bool>, response: Response) -> Response {
    if !expose {
        return response;
    }
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };
    let status = response.status();
    (
        status,
        Json(serde_json::json!({ "error": INTERNAL_MESSAGE, "details": detail })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, ProductId};

    #[test]
    fn order_errors_map_by_kind() {
        let cases = [
            (OrderError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (OrderError::InvalidStatus("bad".into()), StatusCode::BAD_REQUEST),
            (
                OrderError::NotFound { entity: "Order" },
                StatusCode::NOT_FOUND,
            ),
            (OrderError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                OrderError::ProductUnavailable {
                    product_id: ProductId::new(),
                },
                StatusCode::CONFLICT,
            ),
            (
                OrderError::StatusChanged {
                    order_id: OrderId::new(),
                },
                StatusCode::CONFLICT,
            ),
            (
                OrderError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn internal_errors_carry_detail_but_generic_body() {
        let response =
            ApiError::Store(StoreError::Unavailable("pool exhausted".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<InternalDetail>().unwrap();
        assert!(detail.0.contains("pool exhausted"));
    }
}
