//! HTTP entry point.
//!
//! `POST /api/soap/{service}` takes the caller's XML fragment as the body and
//! an optional `SOAPAction` header, and answers with the backend's response
//! body or a SOAP fault.

use crate::error::{soap_fault_response, GatewayError};
use crate::gateway::SoapGateway;
use crate::parser::parse_soap_action;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Build the router for a gateway.
pub fn router(gateway: Arc<SoapGateway>) -> Router {
    let body_limit = gateway.config().settings.max_body_size;
    Router::new()
        .route("/api/soap/{service}", post(proxy_request))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(gateway)
}

/// HTTP status for each failure class.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Extraction(_) => StatusCode::BAD_REQUEST,
        GatewayError::Security(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::Dispatch(_) => StatusCode::BAD_GATEWAY,
    }
}

async fn proxy_request(
    State(gateway): State<Arc<SoapGateway>>,
    Path(service): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    info!(service = %service, "Received request for service");
    debug!(service = %service, payload = %body, "Request payload");

    let caller_headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let soap_action = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .map(parse_soap_action);

    match gateway
        .handle(&service, &body, soap_action.as_deref(), &caller_headers)
        .await
    {
        Ok(response) => xml_response(StatusCode::OK, response),
        Err(e) => xml_response(status_for(&e), soap_fault_response(&e)),
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

async fn health(State(gateway): State<Arc<SoapGateway>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "services": gateway.config().services.len(),
        "policy": gateway.policy_name(),
    }))
}

async fn metrics(State(gateway): State<Arc<SoapGateway>>) -> impl IntoResponse {
    Json(gateway.metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, ServiceConfig};
    use crate::error::{DispatchError, ExtractionError, SecurityError};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn gateway() -> Arc<SoapGateway> {
        let mut config = GatewayConfig::default();
        config.settings.max_body_size = 256;
        config.services.insert(
            "addService".to_string(),
            ServiceConfig {
                url: "http://127.0.0.1:1/calc".to_string(),
                ..Default::default()
            },
        );
        Arc::new(SoapGateway::new(config))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GatewayError::ConfigNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ExtractionError::NoTagName("<>".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SecurityError::NotPrivateKey("gateway".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(
                &DispatchError::Status {
                    status: 503,
                    body: String::new()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_unknown_service_returns_fault() {
        let response = router(gateway())
            .oneshot(
                Request::post("/api/soap/nope")
                    .header("content-type", "text/xml")
                    .body(Body::from("<Add>5</Add>"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            XML_CONTENT_TYPE
        );
        let body = body_text(response).await;
        assert!(body.contains("soap:Client"));
        assert!(body.contains("SERVICE_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_bad_payload_returns_400() {
        let response = router(gateway())
            .oneshot(
                Request::post("/api/soap/addService")
                    .body(Body::from("<Sub>1</Sub>"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("EXTRACTION_FAILED"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_returns_502() {
        let response = router(gateway())
            .oneshot(
                Request::post("/api/soap/addService")
                    .body(Body::from("<Add>5</Add>"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("soap:Server"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let response = router(gateway())
            .oneshot(
                Request::post("/api/soap/addService")
                    .body(Body::from(format!("<Add>{}</Add>", "9".repeat(1024))))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let gateway = gateway();
        let app = router(Arc::clone(&gateway));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health["services"], 1);
        assert_eq!(health["policy"], "signed");

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let metrics: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(metrics["calls_processed"], 0);
    }
}
