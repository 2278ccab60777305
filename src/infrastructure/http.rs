//! Thin clients for the internal services the orchestration calls.
//!
//! Every request carries `x-service-name`, `x-request-at` (unix seconds) and
//! `x-api-key = hex(sha256("{app}:{secret}:{unix}"))`. Responses use the
//! shared `{code, status, message, data}` envelope.

use crate::config::{AppConfig, ServiceEndpoint};
use crate::domain::gateway::{
    GeneratedInvoice, InvoiceRequest, PackageDetail, PaymentLink, PaymentLinkRequest, UserProfile,
};
use crate::domain::ports::{
    CatalogGateway, Gateways, IdentityGateway, InvoiceGateway, PaymentGateway,
};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const HEADER_SERVICE_NAME: &str = "x-service-name";
pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_REQUEST_AT: &str = "x-request-at";

pub fn api_key(app_name: &str, secret_key: &str, unix: i64) -> String {
    hex::encode(Sha256::digest(format!("{app_name}:{secret_key}:{unix}")))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: serde_json::Value,
    data: Option<T>,
}

/// One internal service: base URL, shared secret and an HTTP client.
#[derive(Debug, Clone)]
pub struct SignedClient {
    service: &'static str,
    app_name: String,
    endpoint: ServiceEndpoint,
    client: Client,
}

impl SignedClient {
    pub fn new(service: &'static str, app_name: &str, endpoint: &ServiceEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|err| OrderError::gateway(service, err.to_string()))?;
        Ok(Self {
            service,
            app_name: app_name.to_string(),
            endpoint: endpoint.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.host.trim_end_matches('/'), path)
    }

    fn sign(&self, request: RequestBuilder) -> RequestBuilder {
        let unix = Utc::now().timestamp();
        request
            .header(HEADER_SERVICE_NAME, &self.app_name)
            .header(
                HEADER_API_KEY,
                api_key(&self.app_name, &self.endpoint.secret_key, unix),
            )
            .header(HEADER_REQUEST_AT, unix.to_string())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self
            .sign(request)
            .send()
            .await
            .map_err(|err| OrderError::gateway(self.service, err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| OrderError::gateway(self.service, err.to_string()))?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(service = self.service, %status, error = %err, "unreadable response");
                return Err(OrderError::gateway(
                    self.service,
                    format!("unreadable response ({status})"),
                ));
            }
        };

        if !status.is_success() {
            let message = match envelope.message {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            };
            return Err(OrderError::gateway(self.service, message));
        }

        debug!(service = self.service, %status, "response received");
        envelope
            .data
            .ok_or_else(|| OrderError::gateway(self.service, "response without data"))
    }
}

pub struct HttpCatalogGateway(SignedClient);

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn get_detail_package(&self, package_id: Uuid) -> Result<PackageDetail> {
        let url = self.0.url(&format!("/api/v1/package/{package_id}"));
        self.0.send(self.0.client.get(url)).await
    }
}

pub struct HttpIdentityGateway(SignedClient);

#[async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn get_user_profile(&self, customer_id: Uuid) -> Result<UserProfile> {
        let url = self.0.url(&format!("/api/v1/user/{customer_id}"));
        self.0.send(self.0.client.get(url)).await
    }
}

pub struct HttpPaymentGateway(SignedClient);

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink> {
        let url = self.0.url("/api/v1/payment");
        self.0.send(self.0.client.post(url).json(request)).await
    }
}

pub struct HttpInvoiceGateway(SignedClient);

#[async_trait]
impl InvoiceGateway for HttpInvoiceGateway {
    async fn generate_invoice(&self, request: &InvoiceRequest) -> Result<GeneratedInvoice> {
        let url = self.0.url("/api/v1/invoice/generate");
        self.0.send(self.0.client.post(url).json(request)).await
    }
}

/// Builds the four HTTP gateways from `internal_service`.
pub fn http_gateways(config: &AppConfig) -> Result<Gateways> {
    let services = &config.internal_service;
    let app = config.app_name.as_str();
    Ok(Gateways {
        catalog: Arc::new(HttpCatalogGateway(SignedClient::new(
            "catalog",
            app,
            &services.package,
        )?)),
        identity: Arc::new(HttpIdentityGateway(SignedClient::new(
            "identity",
            app,
            &services.rbac,
        )?)),
        payment: Arc::new(HttpPaymentGateway(SignedClient::new(
            "payment",
            app,
            &services.payment,
        )?)),
        invoice: Arc::new(HttpInvoiceGateway(SignedClient::new(
            "invoice",
            app,
            &services.invoice,
        )?)),
    })
}
