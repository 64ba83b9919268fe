//! Outbound HTTP transport.
//!
//! A transport is created for exactly one call, either direct or bound to
//! the service's HTTP proxy. Every transport runs the same interceptor chain,
//! which currently holds only [`HeaderNormalizer`].

use crate::config::{ServiceConfig, SettingsConfig};
use crate::envelope::OutboundEnvelope;
use crate::error::DispatchError;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Content type forced on every outbound SOAP request.
pub const SOAP_CONTENT_TYPE: &str = "text/xml;charset=UTF-8";

/// SOAP 1.1 action header.
pub const SOAP_ACTION_HEADER: HeaderName = HeaderName::from_static("soapaction");

/// How a call reaches its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Direct,
    Proxy { host: String, port: u16 },
}

impl TransportMode {
    /// Proxy mode when the service enables it with a usable host and port.
    pub fn for_service(service: &ServiceConfig) -> Self {
        match service.proxy() {
            Some((host, port)) => Self::Proxy {
                host: host.to_string(),
                port,
            },
            None => Self::Direct,
        }
    }
}

/// Process-wide client settings. Read-only after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl ClientSettings {
    pub fn from_settings(settings: &SettingsConfig) -> Self {
        Self {
            timeout: settings.request_timeout(),
            connect_timeout: settings.connect_timeout(),
            user_agent: settings.user_agent.clone(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_settings(&SettingsConfig::default())
    }
}

/// Hook run over the request headers after serialization, right before send.
pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, headers: &mut HeaderMap);
}

/// Drops framing headers the serializer computed and pins the content type.
#[derive(Debug, Default)]
pub struct HeaderNormalizer;

impl RequestInterceptor for HeaderNormalizer {
    fn name(&self) -> &'static str {
        "header_normalizer"
    }

    fn process(&self, headers: &mut HeaderMap) {
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE));
    }
}

/// A serialized envelope with the headers the serializer attached.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub headers: HeaderMap,
    pub body: String,
}

impl OutboundRequest {
    /// Serialize an envelope.
    pub fn from_envelope(envelope: &OutboundEnvelope) -> Result<Self, DispatchError> {
        let body = envelope.to_xml();

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let action = HeaderValue::from_str(&format!("\"{}\"", envelope.soap_action)).map_err(
            |e| DispatchError::InvalidHeader {
                name: "SOAPAction".to_string(),
                reason: e.to_string(),
            },
        )?;
        headers.insert(SOAP_ACTION_HEADER, action);

        Ok(Self { headers, body })
    }
}

/// Sends one serialized request and returns the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> &TransportMode;

    /// Names of the interceptors, in run order.
    fn interceptors(&self) -> Vec<&'static str>;

    async fn send(&self, url: &str, request: OutboundRequest) -> Result<String, DispatchError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    mode: TransportMode,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl HttpTransport {
    pub fn new(settings: &ClientSettings, mode: TransportMode) -> Result<Self, DispatchError> {
        let builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.as_str());

        let builder = match &mode {
            TransportMode::Direct => builder.no_proxy(),
            TransportMode::Proxy { host, port } => {
                let proxy = reqwest::Proxy::all(format!("http://{}:{}", host, port))
                    .map_err(DispatchError::Transport)?;
                builder.proxy(proxy)
            }
        };

        let client = builder.build().map_err(DispatchError::Transport)?;

        Ok(Self {
            client,
            mode,
            interceptors: vec![Arc::new(HeaderNormalizer)],
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn mode(&self) -> &TransportMode {
        &self.mode
    }

    fn interceptors(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    async fn send(&self, url: &str, request: OutboundRequest) -> Result<String, DispatchError> {
        let OutboundRequest { mut headers, body } = request;
        for interceptor in &self.interceptors {
            interceptor.process(&mut headers);
        }

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(DispatchError::Io)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(DispatchError::Io)?;
        debug!(url = %url, status = status.as_u16(), len = bytes.len(), "Backend responded");

        if !status.is_success() {
            // diagnostic only, so a lossy decode is fine here
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        String::from_utf8(bytes.to_vec()).map_err(DispatchError::InvalidBody)
    }
}

/// Creates transports for calls.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        settings: &ClientSettings,
        mode: TransportMode,
    ) -> Result<Box<dyn Transport>, DispatchError>;
}

/// Factory for [`HttpTransport`].
#[derive(Debug, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(
        &self,
        settings: &ClientSettings,
        mode: TransportMode,
    ) -> Result<Box<dyn Transport>, DispatchError> {
        Ok(Box::new(HttpTransport::new(settings, mode)?))
    }
}

/// Build the transport for one call to `service`.
pub fn configure_transport(
    factory: &dyn TransportFactory,
    settings: &ClientSettings,
    service: &ServiceConfig,
) -> Result<Box<dyn Transport>, DispatchError> {
    let mode = TransportMode::for_service(service);
    if let TransportMode::Proxy { host, port } = &mode {
        info!(proxy_host = %host, proxy_port = port, "Routing call through HTTP proxy");
    }
    factory.create(settings, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_payload;
    use mockito::{Matcher, Server};

    fn envelope(action: &str) -> OutboundEnvelope {
        let request = extract_payload("<Add>5</Add>", "<Add>", "</Add>", "http://tempuri.org/").unwrap();
        OutboundEnvelope::for_service(&ServiceConfig::default(), action, &request, None)
    }

    #[test]
    fn test_mode_direct_by_default() {
        assert_eq!(TransportMode::for_service(&ServiceConfig::default()), TransportMode::Direct);
    }

    #[test]
    fn test_mode_proxy() {
        let service = ServiceConfig {
            proxy_enabled: true,
            proxy_host: Some("proxy.internal".to_string()),
            proxy_port: 3128,
            ..Default::default()
        };
        assert_eq!(
            TransportMode::for_service(&service),
            TransportMode::Proxy {
                host: "proxy.internal".to_string(),
                port: 3128
            }
        );
    }

    #[test]
    fn test_mode_proxy_without_host_is_direct() {
        let service = ServiceConfig {
            proxy_enabled: true,
            proxy_port: 3128,
            ..Default::default()
        };
        assert_eq!(TransportMode::for_service(&service), TransportMode::Direct);
    }

    #[test]
    fn test_header_normalizer() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(42usize));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/soap+xml"));
        headers.insert(SOAP_ACTION_HEADER, HeaderValue::from_static("\"Add\""));

        HeaderNormalizer.process(&mut headers);

        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), SOAP_CONTENT_TYPE);
        assert_eq!(headers.get(SOAP_ACTION_HEADER).unwrap(), "\"Add\"");
    }

    #[test]
    fn test_outbound_request_headers() {
        let request = OutboundRequest::from_envelope(&envelope("http://tempuri.org/Add")).unwrap();
        assert_eq!(
            request.headers.get(SOAP_ACTION_HEADER).unwrap(),
            "\"http://tempuri.org/Add\""
        );
        assert_eq!(
            request.headers.get(CONTENT_LENGTH).unwrap(),
            request.body.len().to_string().as_str()
        );
    }

    #[test]
    fn test_outbound_request_rejects_bad_action() {
        let result = OutboundRequest::from_envelope(&envelope("bad\naction"));
        assert!(matches!(result, Err(DispatchError::InvalidHeader { .. })));
    }

    #[test]
    fn test_transport_interceptor_chain() {
        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        assert_eq!(transport.interceptors(), ["header_normalizer"]);

        let proxied = HttpTransport::new(
            &ClientSettings::default(),
            TransportMode::Proxy {
                host: "127.0.0.1".to_string(),
                port: 3128,
            },
        )
        .unwrap();
        assert_eq!(proxied.interceptors(), ["header_normalizer"]);
    }

    #[tokio::test]
    async fn test_send_normalizes_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/calc")
            .match_header("content-type", SOAP_CONTENT_TYPE)
            .match_header("soapaction", "\"http://tempuri.org/Add\"")
            .match_header("transfer-encoding", Matcher::Missing)
            .match_body(Matcher::Regex(r#"<Add xmlns="http://tempuri.org/">5</Add>"#.to_string()))
            .with_status(200)
            .with_body("<AddResponse>5</AddResponse>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        let request = OutboundRequest::from_envelope(&envelope("http://tempuri.org/Add")).unwrap();
        let body = transport
            .send(&format!("{}/calc", server.url()), request)
            .await
            .unwrap();

        assert_eq!(body, "<AddResponse>5</AddResponse>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_maps_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/calc")
            .with_status(500)
            .with_body("<Fault/>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        let request = OutboundRequest::from_envelope(&envelope("Add")).unwrap();
        let result = transport.send(&format!("{}/calc", server.url()), request).await;

        match result {
            Err(DispatchError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "<Fault/>");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_returns_body_bytes_unchanged() {
        let mut server = Server::new_async().await;
        let body = "<r>caf\u{e9} \u{2713}</r>";
        let _mock = server
            .mock("POST", "/calc")
            .with_status(200)
            .with_header("content-type", "text/xml; charset=iso-8859-1")
            .with_body(body)
            .create_async()
            .await;

        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        let request = OutboundRequest::from_envelope(&envelope("Add")).unwrap();
        let result = transport
            .send(&format!("{}/calc", server.url()), request)
            .await
            .unwrap();
        assert_eq!(result, body);
    }

    #[tokio::test]
    async fn test_send_rejects_non_utf8_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/calc")
            .with_status(200)
            .with_body(vec![b'<', b'r', b'>', 0xff, 0xfe, b'<', b'/', b'r', b'>'])
            .create_async()
            .await;

        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        let request = OutboundRequest::from_envelope(&envelope("Add")).unwrap();
        let result = transport.send(&format!("{}/calc", server.url()), request).await;
        assert!(matches!(result, Err(DispatchError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_send_connection_refused() {
        let transport = HttpTransport::new(&ClientSettings::default(), TransportMode::Direct).unwrap();
        let request = OutboundRequest::from_envelope(&envelope("Add")).unwrap();
        let result = transport.send("http://127.0.0.1:1/calc", request).await;
        assert!(matches!(result, Err(DispatchError::Io(_))));
    }
}
