//! Shared helpers for Iceberg REST routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{IcebergError, IcebergResult};
use crate::types::NamespaceIdent;

/// JSON body extractor whose rejections use the Iceberg error model.
///
/// Axum's own `Json` answers malformed bodies with plain-text 400/415/422;
/// Iceberg clients expect a `BadRequestException` body instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcebergJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for IcebergJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = IcebergError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> IcebergError {
    IcebergError::bad_request(format!("Malformed request body: {}", rejection.body_text()))
}

/// Query string extractor; malformed parameters become `BadRequestException`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcebergQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for IcebergQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = IcebergError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| query_rejection(&rejection))
    }
}

fn query_rejection(rejection: &QueryRejection) -> IcebergError {
    IcebergError::bad_request(format!("Malformed query string: {}", rejection.body_text()))
}

/// Parses a namespace path segment into an identifier list.
///
/// Levels are joined by `separator`; a literal `%1F` is accepted as well in
/// case the segment reached us still encoded.
pub fn parse_namespace(raw: &str, separator: &str) -> IcebergResult<NamespaceIdent> {
    if separator.is_empty() {
        return Err(IcebergError::Internal {
            message: "Namespace separator is empty".to_string(),
        });
    }
    let mut normalized = raw.replace("%1F", "\u{1F}").replace("%1f", "\u{1F}");
    if separator != "\u{1F}" {
        normalized = normalized.replace(separator, "\u{1F}");
    }

    let parts: Vec<String> = normalized.split('\u{1F}').map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(IcebergError::bad_request(format!("Invalid namespace: {raw}")));
    }
    Ok(parts)
}

/// Applies page token and size to a vector of items.
///
/// The token is the offset of the first item; the returned token is set
/// only when more items remain.
pub fn paginate<T>(
    mut items: Vec<T>,
    page_token: Option<&str>,
    page_size: Option<u32>,
) -> IcebergResult<(Vec<T>, Option<String>)> {
    let start = match page_token.filter(|token| !token.is_empty()) {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| IcebergError::bad_request("Invalid pageToken"))?,
        None => 0,
    };
    let size = match page_size {
        Some(0) => return Err(IcebergError::bad_request("pageSize must be greater than zero")),
        Some(size) => size as usize,
        None => items.len(),
    };

    if start > items.len() {
        return Err(IcebergError::bad_request("pageToken out of range"));
    }

    let end = start.saturating_add(size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());

    let page = items.drain(start..end).collect();
    Ok((page, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespace_unit_separator() {
        let ident = parse_namespace("a\u{1F}b", "\u{1F}").expect("parse");
        assert_eq!(ident, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_parse_namespace_percent_encoded() {
        assert_eq!(
            parse_namespace("a%1Fb", "\u{1F}").expect("upper"),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            parse_namespace("a%1fb", "\u{1F}").expect("lower"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_parse_namespace_custom_separator() {
        let ident = parse_namespace("a.b.c", ".").expect("parse");
        assert_eq!(ident.len(), 3);
    }

    #[test]
    fn test_parse_namespace_rejects_empty_levels() {
        assert!(parse_namespace("", "\u{1F}").is_err());
        assert!(parse_namespace("a\u{1F}", "\u{1F}").is_err());
        assert!(parse_namespace("a", "").is_err());
    }

    #[test]
    fn test_paginate_pages_through_items() {
        let items: Vec<u32> = (0..5).collect();
        let (page, next) = paginate(items.clone(), None, Some(2)).expect("first");
        assert_eq!(page, vec![0, 1]);
        assert_eq!(next.as_deref(), Some("2"));

        let (page, next) = paginate(items.clone(), Some("4"), Some(2)).expect("last");
        assert_eq!(page, vec![4]);
        assert!(next.is_none());

        let (page, next) = paginate(items, None, None).expect("all");
        assert_eq!(page.len(), 5);
        assert!(next.is_none());
    }

    #[test]
    fn test_paginate_rejects_bad_input() {
        let items: Vec<u32> = (0..3).collect();
        let err = paginate(items.clone(), Some("x"), None).expect_err("token");
        assert_eq!(err.message(), "Invalid pageToken");
        let err = paginate(items.clone(), None, Some(0)).expect_err("size");
        assert_eq!(err.message(), "pageSize must be greater than zero");
        let err = paginate(items, Some("9"), None).expect_err("range");
        assert_eq!(err.message(), "pageToken out of range");
    }
}
