//! NEXX HTTP client
//!
//! Issues single and batched parameter GET/SET requests against the
//! multiviewer's `/v.api/apis` surface.
//!
//! ## Authentication
//! - `webeasy-api-key` header when a static API key is configured
//! - otherwise `jwt` header with a held token
//! - JWT credentials, when present, are exchanged for a token lazily

use super::codec::{
    parse_batch_response, parse_single_response, select_values, DeviceValue, ParameterAddress,
    ParameterValues,
};
use super::varid::MAX_BATCH_PARAMS;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

mod endpoints {
    pub const GET_PARAMETER: &str = "/EV/GET/parameter";
    pub const GET_PARAMETERS: &str = "/EV/GET/parameters";
    pub const SET_PARAMETER: &str = "/EV/SET/parameter";
    pub const SET_PARAMETERS: &str = "/EV/SET/parameters";
    pub const JWT_CREATE: &str = "/BT/JWTCREATE";
    pub const JWT_REFRESH: &str = "/BT/JWTREFRESH";
}

mod headers {
    pub const API_KEY: &str = "webeasy-api-key";
    pub const JWT: &str = "jwt";
}

/// Parameter-oriented multiviewer device
///
/// Callers pre-chunk batched requests with the `BatchPlanner`; more than
/// 40 addresses is rejected rather than split.
#[async_trait]
pub trait MultiviewerDevice: Send + Sync {
    async fn get_parameter(&self, address: &ParameterAddress) -> Result<Option<DeviceValue>>;

    async fn get_parameters(&self, addresses: &[ParameterAddress]) -> Result<ParameterValues>;

    async fn set_parameter(&self, address: &ParameterAddress, value: &DeviceValue) -> Result<()>;

    async fn set_parameters(&self, values: &[(ParameterAddress, DeviceValue)]) -> Result<()>;
}

/// Username/password exchanged for a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct JwtReply {
    status: Option<String>,
    jwt: Option<String>,
}

/// HTTP client for one NEXX chassis
pub struct NexxClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    credentials: Option<JwtCredentials>,
    token: RwLock<Option<String>>,
}

impl NexxClient {
    /// Create a client for an explicit API base URL (`http://host/v.api/apis`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            credentials: None,
            token: RwLock::new(None),
        })
    }

    /// Create a client for a device host (`host` or `host:port`)
    pub fn for_host(host: &str, timeout: Duration) -> Result<Self> {
        Self::new(format!("http://{}/v.api/apis", host), timeout)
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_credentials(mut self, credentials: Option<JwtCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_token(self, token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
            ..self
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Currently held bearer token
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    // ========================================
    // Token lifecycle
    // ========================================

    /// Exchange credentials for a bearer token and hold it
    pub async fn issue_token(&self, username: &str, password: &str) -> Result<String> {
        let payload = serde_json::json!({ "username": username, "password": password });
        let encoded = STANDARD.encode(payload.to_string());
        let url = format!("{}{}/{}", self.base_url, endpoints::JWT_CREATE, encoded);

        let body = self.fetch_json(&url, None).await?;
        let token = Self::token_from_reply(&body, "JWT creation")?;

        *self.token.write().await = Some(token.clone());
        info!(username = %username, "NEXX token issued");
        Ok(token)
    }

    /// Refresh the held bearer token
    pub async fn refresh_token(&self) -> Result<String> {
        let current = self
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Protocol("No JWT to refresh".to_string()))?;

        let url = format!("{}{}/{}", self.base_url, endpoints::JWT_REFRESH, current);
        let body = self.fetch_json(&url, None).await?;
        let token = Self::token_from_reply(&body, "JWT refresh")?;

        *self.token.write().await = Some(token.clone());
        debug!("NEXX token refreshed");
        Ok(token)
    }

    fn token_from_reply(body: &Value, action: &str) -> Result<String> {
        let reply: JwtReply = serde_json::from_value(body.clone())
            .map_err(|_| Error::Protocol(format!("{} failed: {}", action, body)))?;

        match (reply.status.as_deref(), reply.jwt) {
            (Some("success"), Some(jwt)) if !jwt.is_empty() => Ok(jwt),
            _ => Err(Error::Protocol(format!("{} failed: {}", action, body))),
        }
    }

    // ========================================
    // Transport
    // ========================================

    /// Auth header for a parameter request. API key wins over a token.
    async fn auth_header(&self) -> Result<Option<(&'static str, String)>> {
        if let Some(key) = &self.api_key {
            return Ok(Some((headers::API_KEY, key.clone())));
        }

        if let Some(token) = self.token.read().await.clone() {
            return Ok(Some((headers::JWT, token)));
        }

        if let Some(creds) = &self.credentials {
            let token = self.issue_token(&creds.username, &creds.password).await?;
            return Ok(Some((headers::JWT, token)));
        }

        Ok(None)
    }

    async fn send(
        &self,
        url: &str,
        auth: Option<(&'static str, String)>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.get(url);
        if let Some((name, value)) = auth {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Transport(format!("NEXX request timed out: {}", e))
            } else {
                Error::Transport(format!("NEXX request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, url = %url, "NEXX returned error status");
            return Err(Error::Protocol(format!("NEXX returned HTTP {}", status)));
        }

        Ok(response)
    }

    async fn fetch_json(&self, url: &str, auth: Option<(&'static str, String)>) -> Result<Value> {
        let response = self.send(url, auth).await?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read NEXX reply: {}", e)))?;

        serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("Malformed NEXX reply ({}): {:?}", e, text)))
    }

    fn check_batch_size(len: usize) -> Result<()> {
        if len > MAX_BATCH_PARAMS {
            return Err(Error::Validation(format!(
                "{} parameters exceed the per-request limit of {}",
                len, MAX_BATCH_PARAMS
            )));
        }
        Ok(())
    }

    fn join_addresses<'a>(addresses: impl Iterator<Item = &'a ParameterAddress>) -> String {
        addresses.map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}

#[async_trait]
impl MultiviewerDevice for NexxClient {
    async fn get_parameter(&self, address: &ParameterAddress) -> Result<Option<DeviceValue>> {
        let url = format!("{}{}/{}", self.base_url, endpoints::GET_PARAMETER, address);
        let auth = self.auth_header().await?;
        let body = self.fetch_json(&url, auth).await?;
        parse_single_response(address, &body)
    }

    async fn get_parameters(&self, addresses: &[ParameterAddress]) -> Result<ParameterValues> {
        Self::check_batch_size(addresses.len())?;
        if addresses.is_empty() {
            return Ok(ParameterValues::new());
        }

        let joined = Self::join_addresses(addresses.iter());
        let url = format!("{}{}/{}", self.base_url, endpoints::GET_PARAMETERS, joined);
        let auth = self.auth_header().await?;
        let body = self.fetch_json(&url, auth).await?;

        let raw = parse_batch_response(&body)?;
        debug!(requested = addresses.len(), returned = raw.len(), "NEXX batch read");
        Ok(select_values(addresses, &raw))
    }

    async fn set_parameter(&self, address: &ParameterAddress, value: &DeviceValue) -> Result<()> {
        let url = format!(
            "{}{}/{}/{}",
            self.base_url,
            endpoints::SET_PARAMETER,
            address,
            urlencoding::encode(&value.to_wire())
        );
        let auth = self.auth_header().await?;
        self.send(&url, auth).await?;
        debug!(address = %address, value = %value, "NEXX parameter set");
        Ok(())
    }

    async fn set_parameters(&self, values: &[(ParameterAddress, DeviceValue)]) -> Result<()> {
        Self::check_batch_size(values.len())?;
        if values.is_empty() {
            return Ok(());
        }

        let ids = Self::join_addresses(values.iter().map(|(a, _)| a));
        let encoded = values
            .iter()
            .map(|(_, v)| urlencoding::encode(&v.to_wire()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}{}/{}/{}", self.base_url, endpoints::SET_PARAMETERS, ids, encoded);

        let auth = self.auth_header().await?;
        self.send(&url, auth).await?;
        debug!(count = values.len(), "NEXX parameters set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexx_client::varid::VarId;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeNexx {
        auth_seen: Arc<Mutex<Vec<(String, String)>>>,
        writes: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeNexx {
        fn record_auth(&self, headers: &HeaderMap) {
            for name in [headers::API_KEY, headers::JWT] {
                if let Some(v) = headers.get(name).and_then(|v| v.to_str().ok()) {
                    self.auth_seen
                        .lock()
                        .unwrap()
                        .push((name.to_string(), v.to_string()));
                }
            }
        }
    }

    async fn get_one(
        State(fake): State<FakeNexx>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> axum::response::Response {
        fake.record_auth(&headers);
        match id.as_str() {
            "2700" => Json(json!({"value": 120})).into_response(),
            "2702" => Json(json!({"2702": "2"})).into_response(),
            "2704.0" => Json(json!(7)).into_response(),
            "2701" => Json(json!({"error": "Access denied"})).into_response(),
            "2735.0" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            "2716.0" => "not json".into_response(),
            _ => Json(json!({})).into_response(),
        }
    }

    async fn get_many(
        State(fake): State<FakeNexx>,
        headers: HeaderMap,
        Path(ids): Path<String>,
    ) -> Json<Value> {
        fake.record_auth(&headers);
        let items: Vec<Value> = ids
            .split(',')
            .filter(|id| !id.starts_with("2726"))
            .enumerate()
            .map(|(i, id)| json!({"id": format!("{}@x", id), "value": i}))
            .collect();
        Json(Value::Array(items))
    }

    async fn set_one(
        State(fake): State<FakeNexx>,
        headers: HeaderMap,
        Path((id, value)): Path<(String, String)>,
    ) -> Json<Value> {
        fake.record_auth(&headers);
        fake.writes.lock().unwrap().push((id, value));
        Json(json!({}))
    }

    async fn set_many(
        State(fake): State<FakeNexx>,
        Path((ids, values)): Path<(String, String)>,
    ) -> Json<Value> {
        let mut writes = fake.writes.lock().unwrap();
        for (id, value) in ids.split(',').zip(values.split(',')) {
            writes.push((id.to_string(), value.to_string()));
        }
        Json(json!({"status": "ok"}))
    }

    async fn jwt_create(Path(encoded): Path<String>) -> Json<Value> {
        let decoded = STANDARD.decode(encoded).unwrap();
        let creds: JwtCredentials = serde_json::from_slice(&decoded).unwrap();
        if creds.password == "secret" {
            Json(json!({"status": "success", "jwt": "tok-1"}))
        } else {
            Json(json!({"status": "failed"}))
        }
    }

    async fn jwt_refresh(Path(token): Path<String>) -> Json<Value> {
        Json(json!({"status": "success", "jwt": format!("{}-r", token)}))
    }

    async fn spawn_fake() -> (String, FakeNexx) {
        let fake = FakeNexx::default();
        let app = Router::new()
            .route("/v.api/apis/EV/GET/parameter/:id", get(get_one))
            .route("/v.api/apis/EV/GET/parameters/:ids", get(get_many))
            .route("/v.api/apis/EV/SET/parameter/:id/:value", get(set_one))
            .route("/v.api/apis/EV/SET/parameters/:ids/:values", get(set_many))
            .route("/v.api/apis/BT/JWTCREATE/:b64", get(jwt_create))
            .route("/v.api/apis/BT/JWTREFRESH/:token", get(jwt_refresh))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.to_string(), fake)
    }

    fn addr(s: &str) -> ParameterAddress {
        ParameterAddress::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_single_get_reply_shapes() {
        let (host, _) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT).unwrap();

        assert_eq!(client.get_parameter(&addr("2700")).await.unwrap(), Some(DeviceValue::Int(120)));
        assert_eq!(
            client.get_parameter(&addr("2702")).await.unwrap(),
            Some(DeviceValue::Text("2".into()))
        );
        assert_eq!(client.get_parameter(&addr("2704.0")).await.unwrap(), Some(DeviceValue::Int(7)));
        assert_eq!(client.get_parameter(&addr("2720.0")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_single_get_failures_are_protocol_errors() {
        let (host, _) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT).unwrap();

        for bad in ["2701", "2735.0", "2716.0"] {
            let err = client.get_parameter(&addr(bad)).await.unwrap_err();
            assert!(matches!(err, Error::Protocol(_)), "{} -> {:?}", bad, err);
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = NexxClient::for_host(&host, Duration::from_secs(1)).unwrap();
        let err = client.get_parameter(&addr("2700")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_batch_get_strips_suffix_and_skips_missing() {
        let (host, _) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT).unwrap();

        let requested = vec![addr("2704.1"), addr("2726.1"), addr("2716.1")];
        let values = client.get_parameters(&requested).await.unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values.get(&requested[0]), Some(&DeviceValue::Int(0)));
        assert_eq!(values.get(&requested[2]), Some(&DeviceValue::Int(1)));
        assert!(!values.contains_key(&requested[1]));
    }

    #[tokio::test]
    async fn test_batch_over_limit_is_rejected_without_io() {
        let client = NexxClient::for_host("127.0.0.1:1", DEFAULT_TIMEOUT).unwrap();
        let requested: Vec<_> = (0..41)
            .map(|mv| ParameterAddress::mv(VarId::MvEnable, mv).unwrap())
            .collect();
        let err = client.get_parameters(&requested).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_set_encodes_values() {
        let (host, fake) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT).unwrap();

        client
            .set_parameter(&addr("2709.0.1.2"), &DeviceValue::from("Cam 1/A"))
            .await
            .unwrap();
        client
            .set_parameters(&[
                (addr("2704.3"), DeviceValue::Int(12)),
                (addr("2716.3"), DeviceValue::from("2")),
            ])
            .await
            .unwrap();

        let writes = fake.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                ("2709.0.1.2".to_string(), "Cam 1/A".to_string()),
                ("2704.3".to_string(), "12".to_string()),
                ("2716.3".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_api_key_takes_precedence_over_token() {
        let (host, fake) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT)
            .unwrap()
            .with_api_key(Some("k-123".into()))
            .with_token(Some("tok-0".into()));

        client.get_parameter(&addr("2700")).await.unwrap();
        let seen = fake.auth_seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(headers::API_KEY.to_string(), "k-123".to_string())]);
    }

    #[tokio::test]
    async fn test_credentials_issue_token_lazily() {
        let (host, fake) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT)
            .unwrap()
            .with_credentials(Some(JwtCredentials {
                username: "admin".into(),
                password: "secret".into(),
            }));

        client.get_parameter(&addr("2700")).await.unwrap();
        assert_eq!(client.token().await.as_deref(), Some("tok-1"));
        let seen = fake.auth_seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(headers::JWT.to_string(), "tok-1".to_string())]);
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let (host, _) = spawn_fake().await;
        let client = NexxClient::for_host(&host, DEFAULT_TIMEOUT).unwrap();

        let err = client.refresh_token().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        assert!(client.issue_token("admin", "wrong").await.is_err());
        assert_eq!(client.issue_token("admin", "secret").await.unwrap(), "tok-1");
        assert_eq!(client.refresh_token().await.unwrap(), "tok-1-r");
        assert_eq!(client.token().await.as_deref(), Some("tok-1-r"));
    }
}
