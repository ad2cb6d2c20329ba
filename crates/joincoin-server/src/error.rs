use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use joincoin_db::LedgerError;
use joincoin_types::api::ErrorResponse;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(e) => match e {
                LedgerError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
                LedgerError::AlreadyResolved { .. } | LedgerError::InvalidOrderState(_) => {
                    StatusCode::CONFLICT
                }
                LedgerError::InvalidAmount(_)
                | LedgerError::InvalidMessage(_)
                | LedgerError::InvalidReferral
                | LedgerError::InvalidChannel(_) => StatusCode::BAD_REQUEST,
                LedgerError::UserBanned(_) => StatusCode::FORBIDDEN,
                LedgerError::UserNotFound(_) | LedgerError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Storage(_) | LedgerError::LockPoisoned | LedgerError::TaskFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Don't leak storage detail to the client
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joincoin_types::models::CoinOrderStatus;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (
                LedgerError::InsufficientBalance { user_id: 1, requested: 5, available: 2 },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                LedgerError::AlreadyResolved { order_id: 1, status: CoinOrderStatus::Approved },
                StatusCode::CONFLICT,
            ),
            (LedgerError::InvalidOrderState("done".into()), StatusCode::CONFLICT),
            (LedgerError::InvalidAmount("-1".into()), StatusCode::BAD_REQUEST),
            (LedgerError::InvalidMessage("empty".into()), StatusCode::BAD_REQUEST),
            (LedgerError::InvalidReferral, StatusCode::BAD_REQUEST),
            (LedgerError::InvalidChannel("x y".into()), StatusCode::BAD_REQUEST),
            (LedgerError::UserBanned(1), StatusCode::FORBIDDEN),
            (LedgerError::UserNotFound(1), StatusCode::NOT_FOUND),
            (LedgerError::OrderNotFound(1), StatusCode::NOT_FOUND),
            (LedgerError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::TaskFailed("cancelled".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
