//! Response envelopes

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `{"data": ...}` envelope for a single item
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for DataResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `201 Created` with a `Location` header pointing at the new resource
pub struct Created<T: Serialize> {
    location: String,
    body: DataResponse<T>,
}

impl<T: Serialize> Created<T> {
    pub fn at(location: impl Into<String>, data: T) -> Self {
        Self {
            location: location.into(),
            body: DataResponse::new(data),
        }
    }
}

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (
            StatusCode::CREATED,
            [(header::LOCATION, self.location)],
            Json(self.body),
        )
            .into_response()
    }
}
