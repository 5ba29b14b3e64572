//! HTTP bulk transport
//!
//! POSTs newline-delimited index actions to `<host>/_bulk` with
//! `reqwest::blocking`. The client and its connection pool live on the
//! delivery thread only.

use super::{BulkResponse, BulkTransport};
use crate::core::{BulkPayload, DeliveryError, Result, ShipperError};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Url;
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// Credentials for HTTP basic auth
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URLs, e.g. `http://es-1:9200`
    pub hosts: Vec<String>,
    pub connect_timeout: Duration,
    /// Whole-request timeout, covering the read of the response
    pub request_timeout: Duration,
    /// Gzip request bodies
    pub compression: bool,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".to_string()],
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            compression: false,
            basic_auth: None,
        }
    }
}

/// Bulk endpoint URL for a base host URL.
pub fn bulk_url(host: &str) -> Result<Url> {
    let url = Url::parse(&format!("{}/_bulk", host.trim_end_matches('/')))
        .map_err(|e| ShipperError::config("hosts", format!("invalid URL '{}': {}", host, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ShipperError::config(
            "hosts",
            format!("unsupported scheme '{}' in '{}'", other, host),
        )),
    }
}

/// Production [`BulkTransport`] over HTTP
///
/// On a transient failure the next request goes to the next host in the
/// list.
pub struct HttpTransport {
    config: HttpTransportConfig,
    endpoints: Vec<Url>,
    current: usize,
    client: Option<Client>,
}

impl HttpTransport {
    /// Validate the hosts and build the HTTP client.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        if config.hosts.is_empty() {
            return Err(ShipperError::config("hosts", "at least one host is required"));
        }
        let endpoints = config
            .hosts
            .iter()
            .map(|host| bulk_url(host))
            .collect::<Result<Vec<_>>>()?;
        let client = Self::build_client(&config)
            .map_err(|e| ShipperError::config("http client", e.to_string()))?;

        Ok(Self {
            config,
            endpoints,
            current: 0,
            client: Some(client),
        })
    }

    /// Endpoint the next request goes to
    pub fn endpoint(&self) -> &Url {
        &self.endpoints[self.current]
    }

    fn build_client(config: &HttpTransportConfig) -> reqwest::Result<Client> {
        Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
    }

    fn rotate(&mut self) {
        self.current = (self.current + 1) % self.endpoints.len();
    }

    fn encode(&self, payload: &BulkPayload) -> std::result::Result<Vec<u8>, DeliveryError> {
        if !self.config.compression {
            return Ok(payload.body().as_bytes().to_vec());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload.body().as_bytes())
            .and_then(|_| encoder.finish())
            .map_err(|e| DeliveryError::Payload(format!("gzip failed: {}", e)))
    }
}

/// Interpret the body of a 2xx bulk response.
fn success_response<E: fmt::Display>(
    body: std::result::Result<String, E>,
    records: usize,
) -> BulkResponse {
    match body {
        Ok(text) => BulkResponse::parse(&text, records),
        Err(e) => BulkResponse::unverified(records, e.to_string()),
    }
}

impl BulkTransport for HttpTransport {
    fn send(&mut self, payload: &BulkPayload) -> std::result::Result<BulkResponse, DeliveryError> {
        let url = self.endpoint().clone();
        let host = url.origin().ascii_serialization();
        let body = self.encode(payload)?;

        if self.client.is_none() {
            let client = Self::build_client(&self.config)
                .map_err(|e| DeliveryError::transport(host.as_str(), e.to_string()))?;
            self.client = Some(client);
        }
        let Some(client) = self.client.as_ref() else {
            return Err(DeliveryError::transport(host, "client unavailable"));
        };

        let mut request = client
            .post(url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        if self.config.compression {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(auth) = &self.config.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) => {
                self.rotate();
                return Err(DeliveryError::transport(host, e.to_string()));
            }
        };

        let status = response.status();
        let body = response.text();
        if status.is_success() {
            return Ok(success_response(body, payload.records()));
        }
        let text = body.unwrap_or_else(|_| "<no body>".to_string());

        let error = DeliveryError::status(host, status.as_u16(), text);
        if error.is_transient() {
            self.rotate();
        }
        Err(error)
    }

    fn reset(&mut self) {
        self.client = None;
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BulkAction;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn payload() -> BulkPayload {
        BulkPayload::from_actions(&[BulkAction {
            index: "logs".into(),
            doc_type: None,
            document: r#"{"message":"hi"}"#.into(),
        }])
    }

    fn transport(hosts: Vec<String>) -> HttpTransport {
        HttpTransport::new(HttpTransportConfig {
            hosts,
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
            ..HttpTransportConfig::default()
        })
        .expect("valid transport")
    }

    #[test]
    fn test_bulk_url() {
        assert_eq!(bulk_url("http://es:9200").unwrap().as_str(), "http://es:9200/_bulk");
        assert_eq!(bulk_url("http://es:9200/").unwrap().as_str(), "http://es:9200/_bulk");
        assert_eq!(
            bulk_url("https://proxy/es").unwrap().as_str(),
            "https://proxy/es/_bulk"
        );
        assert!(bulk_url("ftp://es").is_err());
        assert!(bulk_url("not a url").is_err());
    }

    #[test]
    fn test_new_requires_hosts() {
        let result = HttpTransport::new(HttpTransportConfig {
            hosts: vec![],
            ..HttpTransportConfig::default()
        });
        assert!(matches!(result, Err(ShipperError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_successful_bulk_request() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/_bulk")
            .match_header("content-type", "application/x-ndjson")
            .match_body("{\"index\":{\"_index\":\"logs\"}}\n{\"message\":\"hi\"}\n")
            .with_status(200)
            .with_body(r#"{"took":1,"errors":false,"items":[{"index":{"status":201}}]}"#)
            .create();

        let mut transport = transport(vec![server.url()]);
        let response = transport.send(&payload()).unwrap();

        assert!(response.is_complete_success());
        assert_eq!(response.succeeded(), 1);
        mock.assert();
    }

    #[test]
    fn test_server_error_is_transient_and_rotates() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/_bulk").with_status(503).create();

        let mut transport = transport(vec![server.url(), "http://127.0.0.1:9".to_string()]);
        let error = transport.send(&payload()).unwrap_err();

        assert!(error.is_transient());
        assert!(matches!(error, DeliveryError::Status { status: 503, .. }));
        assert_eq!(transport.endpoint().as_str(), "http://127.0.0.1:9/_bulk");
        mock.assert();
    }

    #[test]
    fn test_client_error_is_permanent() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/_bulk")
            .with_status(400)
            .with_body("bad request")
            .create();

        let mut transport = transport(vec![server.url()]);
        let error = transport.send(&payload()).unwrap_err();

        assert!(!error.is_transient());
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn test_unreachable_host_is_transient() {
        let mut transport = transport(vec!["http://127.0.0.1:9".to_string()]);
        let error = transport.send(&payload()).unwrap_err();
        assert!(matches!(error, DeliveryError::Transport { .. }));
        assert!(error.is_transient());
    }

    #[test]
    fn test_compressed_body_and_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/_bulk")
            .match_header("content-encoding", "gzip")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .create();

        let mut transport = HttpTransport::new(HttpTransportConfig {
            hosts: vec![server.url()],
            compression: true,
            basic_auth: Some(BasicAuth {
                username: "elastic".into(),
                password: "changeme".into(),
            }),
            ..HttpTransportConfig::default()
        })
        .unwrap();

        let encoded = transport.encode(&payload()).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&encoded[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, payload().body());

        assert!(transport.send(&payload()).is_ok());
        mock.assert();
    }

    #[test]
    fn test_unreadable_success_body_is_unverified() {
        let response = success_response::<&str>(Err("operation timed out"), 2);
        assert_eq!(response.succeeded(), 2);
        assert_eq!(response.unverified.as_deref(), Some("operation timed out"));

        let response = success_response::<&str>(Ok(r#"{"errors":false}"#.to_string()), 2);
        assert!(response.unverified.is_none());
    }

    #[test]
    fn test_reset_rebuilds_client() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/_bulk").with_status(200).expect(2).create();

        let mut transport = transport(vec![server.url()]);
        assert!(transport.send(&payload()).is_ok());
        transport.reset();
        assert!(transport.send(&payload()).is_ok());
        mock.assert();
    }
}
