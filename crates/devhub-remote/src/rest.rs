use std::time::Duration;

use devhub_core::config::RemoteConfig;
use devhub_core::gateway::{GatewayError, GatewayFuture, ListFilter, RemoteGateway};
use devhub_core::types::EntityKind;
use devhub_core::{Entity, EntityId, Fields};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{map_reqwest_error, RemoteError};

/// Body PostgREST sends with a non-2xx status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    details: Option<String>,
}

/// [`RemoteGateway`] over the hosted backend's REST interface.
#[derive(Debug, Clone)]
pub struct RestGateway {
    http: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

impl RestGateway {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// `access_token` is the signed-in user's JWT; without one, requests run
    /// as the anonymous role using `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("devhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let api_key = api_key.into();
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer: access_token.unwrap_or_else(|| api_key.clone()),
            api_key,
        })
    }

    pub fn from_config(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        let url = cfg
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(RemoteError::MissingUrl)?;
        Self::new(
            url,
            cfg.api_key.clone().unwrap_or_default(),
            cfg.access_token.clone(),
        )
    }

    fn request(&self, method: Method, kind: EntityKind) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, kind.table());
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }

    fn returning(&self, method: Method, kind: EntityKind) -> RequestBuilder {
        self.request(method, kind)
            .header("Prefer", "return=representation")
    }

    async fn rows(&self, req: RequestBuilder) -> Result<Vec<Entity>, RemoteError> {
        let res = req.send().await.map_err(map_reqwest_error)?;
        let res = check_status(res).await?;
        res.json::<Vec<Entity>>().await.map_err(map_reqwest_error)
    }

    pub async fn insert(&self, kind: EntityKind, fields: Fields) -> Result<Entity, RemoteError> {
        tracing::debug!(table = kind.table(), "insert");
        let req = self.returning(Method::POST, kind).json(&fields);
        self.rows(req).await?.into_iter().next().ok_or(RemoteError::NoRows)
    }

    pub async fn patch(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: Fields,
    ) -> Result<Entity, RemoteError> {
        tracing::debug!(table = kind.table(), id = %id, "update");
        let req = self
            .returning(Method::PATCH, kind)
            .query(&[("id", format!("eq.{id}"))])
            .json(&patch);
        self.rows(req).await?.into_iter().next().ok_or(RemoteError::NoRows)
    }

    pub async fn remove(&self, kind: EntityKind, id: &EntityId) -> Result<(), RemoteError> {
        tracing::debug!(table = kind.table(), id = %id, "delete");
        let req = self
            .returning(Method::DELETE, kind)
            .query(&[("id", format!("eq.{id}"))]);
        if self.rows(req).await?.is_empty() {
            return Err(RemoteError::NoRows);
        }
        Ok(())
    }

    pub async fn select(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>, RemoteError> {
        tracing::debug!(table = kind.table(), "select");
        let req = self.request(Method::GET, kind).query(&query_pairs(filter));
        self.rows(req).await
    }
}

/// PostgREST query parameters for a [`ListFilter`].
fn query_pairs(filter: &ListFilter) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    for (column, value) in &filter.eq {
        let op = match value {
            Value::Null => "is.null".to_string(),
            Value::String(s) => format!("eq.{s}"),
            other => format!("eq.{other}"),
        };
        pairs.push((column.clone(), op));
    }
    if let Some(order) = &filter.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{dir}", order.column)));
    }
    if let Some(limit) = filter.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

async fn check_status(res: Response) -> Result<Response, RemoteError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            message: Some(message),
            details,
        }) => match details {
            Some(details) if !details.is_empty() => format!("{message} ({details})"),
            _ => message,
        },
        _ if !text.trim().is_empty() => text,
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    tracing::warn!(status = status.as_u16(), message = %message, "remote request failed");
    Err(RemoteError::Http {
        status: status.as_u16(),
        message,
    })
}

impl RemoteGateway for RestGateway {
    fn create(&self, kind: EntityKind, fields: Fields) -> GatewayFuture<'_, Entity> {
        Box::pin(async move { self.insert(kind, fields).await.map_err(GatewayError::from) })
    }

    fn update<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a EntityId,
        patch: Fields,
    ) -> GatewayFuture<'a, Entity> {
        Box::pin(async move { self.patch(kind, id, patch).await.map_err(GatewayError::from) })
    }

    fn delete<'a>(&'a self, kind: EntityKind, id: &'a EntityId) -> GatewayFuture<'a, ()> {
        Box::pin(async move { self.remove(kind, id).await.map_err(GatewayError::from) })
    }

    fn list<'a>(
        &'a self,
        kind: EntityKind,
        filter: &'a ListFilter,
    ) -> GatewayFuture<'a, Vec<Entity>> {
        Box::pin(async move { self.select(kind, filter).await.map_err(GatewayError::from) })
    }
}
