//! SOAP gateway: turns one caller payload into one backend call.
//!
//! Each call builds its own [`CallPlan`] (envelope, transport and optional
//! security header) and drops it when done. The gateway itself only holds
//! read-only configuration and counters, so concurrent calls never share
//! transport or interceptor state.

use crate::config::{GatewayConfig, ServiceConfig};
use crate::envelope::OutboundEnvelope;
use crate::error::{DispatchError, GatewayError};
use crate::extractor::extract_payload;
use crate::parser::parse_soap_action;
use crate::security::{policy_for, HeaderBuilder};
use crate::transport::{
    configure_transport, ClientSettings, HttpTransportFactory, OutboundRequest, Transport,
    TransportFactory,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a single call, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Extracting,
    HeaderBuilding,
    TransportBound,
    Sending,
    Completed,
    Failed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::HeaderBuilding => "header_building",
            Self::TransportBound => "transport_bound",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

fn enter(service: &str, state: CallState) {
    debug!(service = %service, state = state.as_str(), "Call state");
}

/// Everything needed to send one request. Built per call, never shared.
pub struct CallPlan {
    pub service: String,
    pub url: String,
    pub envelope: OutboundEnvelope,
    pub transport: Box<dyn Transport>,
}

impl CallPlan {
    /// Serialize the envelope and perform the single send.
    pub async fn execute(self) -> Result<String, DispatchError> {
        let request = OutboundRequest::from_envelope(&self.envelope)?;
        enter(&self.service, CallState::Sending);
        self.transport.send(&self.url, request).await
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayMetrics {
    pub calls_processed: u64,
    pub calls_failed: u64,
}

/// Entry point for gateway calls.
pub struct SoapGateway {
    config: GatewayConfig,
    header_builder: Arc<dyn HeaderBuilder>,
    transports: Arc<dyn TransportFactory>,
    client: ClientSettings,
    calls_processed: AtomicU64,
    calls_failed: AtomicU64,
}

impl SoapGateway {
    /// Create a gateway with the configured header policy and HTTP transports.
    pub fn new(config: GatewayConfig) -> Self {
        let header_builder = policy_for(&config);
        Self::with_components(config, header_builder, Arc::new(HttpTransportFactory))
    }

    pub fn with_components(
        config: GatewayConfig,
        header_builder: Arc<dyn HeaderBuilder>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let client = ClientSettings::from_settings(&config.settings);
        info!(
            services = config.services.len(),
            policy = header_builder.name(),
            "SOAP gateway initialized"
        );
        Self {
            config,
            header_builder,
            transports,
            client,
            calls_processed: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Name of the active header policy.
    pub fn policy_name(&self) -> &'static str {
        self.header_builder.name()
    }

    /// Shared client settings. Calls read these and never modify them.
    pub fn client_settings(&self) -> &ClientSettings {
        &self.client
    }

    pub fn service(&self, name: &str) -> Result<&ServiceConfig, GatewayError> {
        self.config
            .services
            .get(name)
            .ok_or_else(|| GatewayError::ConfigNotFound(name.to_string()))
    }

    /// Build the plan for one call without sending anything.
    pub fn prepare_call(
        &self,
        service_name: &str,
        raw_payload: &str,
        soap_action_override: Option<&str>,
        headers: &HashMap<String, String>,
    ) -> Result<CallPlan, GatewayError> {
        let service = self.service(service_name)?;

        enter(service_name, CallState::Extracting);
        let request = extract_payload(
            raw_payload,
            &service.start_tag,
            &service.end_tag,
            &service.request_namespace,
        )?;
        debug!(service = %service_name, request = %request.xml, "Formatted request");

        let header = if service.header_required {
            enter(service_name, CallState::HeaderBuilding);
            let username = service
                .username
                .as_deref()
                .unwrap_or(&self.config.credentials.username);
            Some(self.header_builder.build_header(
                service,
                username,
                &self.config.credentials.password,
            )?)
        } else {
            None
        };

        let transport = configure_transport(self.transports.as_ref(), &self.client, service)?;
        enter(service_name, CallState::TransportBound);

        let soap_action = resolve_soap_action(service, soap_action_override, headers);
        let envelope = OutboundEnvelope::for_service(service, soap_action, &request, header);

        Ok(CallPlan {
            service: service_name.to_string(),
            url: service.url.clone(),
            envelope,
            transport,
        })
    }

    /// Run one call and return the raw backend response body.
    pub async fn handle(
        &self,
        service_name: &str,
        raw_payload: &str,
        soap_action_override: Option<&str>,
        headers: &HashMap<String, String>,
    ) -> Result<String, GatewayError> {
        self.calls_processed.fetch_add(1, Ordering::Relaxed);
        enter(service_name, CallState::Idle);

        let result = match self.prepare_call(service_name, raw_payload, soap_action_override, headers)
        {
            Ok(plan) => {
                info!(
                    service = %service_name,
                    url = %plan.url,
                    soap_action = %plan.envelope.soap_action,
                    secured = plan.envelope.header.is_some(),
                    "Dispatching SOAP request"
                );
                plan.execute().await.map_err(GatewayError::from)
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(body) => {
                enter(service_name, CallState::Completed);
                debug!(service = %service_name, response_len = body.len(), "SOAP call completed");
            }
            Err(e) => {
                self.calls_failed.fetch_add(1, Ordering::Relaxed);
                enter(service_name, CallState::Failed);
                warn!(
                    service = %service_name,
                    code = e.code().as_str(),
                    error = %e,
                    "SOAP call failed"
                );
            }
        }
        result
    }

    pub fn metrics(&self) -> GatewayMetrics {
        GatewayMetrics {
            calls_processed: self.calls_processed.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
        }
    }
}

/// Explicit override, then a `SOAPAction` caller header, then the service default.
pub fn resolve_soap_action(
    service: &ServiceConfig,
    soap_action_override: Option<&str>,
    headers: &HashMap<String, String>,
) -> String {
    let from_header = || {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("soapaction"))
            .map(|(_, value)| parse_soap_action(value))
    };

    soap_action_override
        .map(parse_soap_action)
        .filter(|action| !action.is_empty())
        .or_else(|| from_header().filter(|action| !action.is_empty()))
        .unwrap_or_else(|| service.soap_action.clone())
}
