//! Axum extractors whose rejections go through `AppError`, so malformed bodies,
//! query strings and path segments get the same JSON error shape as handler errors.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::AppError;
use crate::util::extract_request_info;

/// Request body extractor and response wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Declares a newtype over an axum parts extractor that rejects with `AppError`.
macro_rules! parts_extractor {
    ($(#[$meta:meta])* $name:ident => $($inner:ident)::+) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name<T>(pub T);

        impl<S, T> FromRequestParts<S> for $name<T>
        where
            S: Send + Sync,
            T: DeserializeOwned + Send,
        {
            type Rejection = AppError;

            async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
                let $($inner)::+(value) = $($inner)::+::<T>::from_request_parts(parts, state).await?;
                Ok(Self(value))
            }
        }
    };
}

parts_extractor!(
    /// `?key=value` parameters
    Query => axum::extract::Query
);
parts_extractor!(
    /// `{param}` route segments
    Path => axum::extract::Path
);

/// Client address and user agent, for the download log.
///
/// The address comes from `x-forwarded-for`/`x-real-ip` when present, else from
/// the socket (when the server was started with connect info).
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (ip_address, user_agent) = extract_request_info(&parts.headers);
        let ip_address = ip_address.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(ClientInfo {
            ip_address,
            user_agent,
        })
    }
}
