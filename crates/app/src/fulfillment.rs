//! Fulfillment API client.
//!
//! Courier serviceability lookups and shipment booking against the external
//! shipping service. Booking is best-effort from the checkout's point of
//! view: a failed call degrades the order's shipping details instead of
//! failing the order.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use storefront::{
    ids::OrderId,
    orders::{DeliveryAddress, DisplayOrderId, OrderLine, ShippingOption},
};
use thiserror::Error;

/// Configuration for connecting to the fulfillment API.
#[derive(Debug, Clone)]
pub struct FulfillmentApiConfig {
    /// Base URL, e.g. `"https://shipping.example.com/v1"`.
    pub base_url: String,

    /// Bearer token.
    pub token: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

/// Courier lookup for a delivery pincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceabilityRequest {
    /// Destination postal code.
    pub delivery_pincode: String,

    /// Parcel weight in grams.
    pub weight_grams: u32,

    /// Whether cash on delivery is needed.
    pub cod: bool,
}

/// Shipment booking for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    /// Order being shipped.
    pub order_id: OrderId,

    /// Customer-facing order number.
    pub display_order_id: DisplayOrderId,

    /// Courier selected at checkout.
    pub courier_id: String,

    /// Destination.
    pub address: DeliveryAddress,

    /// Lines shipped.
    pub items: Vec<OrderLine>,

    /// Amount to collect on delivery, zero for prepaid orders.
    pub collectable_amount: u64,

    /// Order total.
    pub total: u64,
}

/// A booked shipment, stored as the order's shipping details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentReceipt {
    /// Shipment reference, when the API assigns one.
    pub shipment_id: Option<String>,

    /// Courier booked.
    pub courier_id: String,

    /// Shipping charge quoted by the courier, in minor units.
    pub rate: u64,

    /// Estimated delivery date or window.
    pub eta: Option<String>,
}

/// Errors raised by fulfillment calls.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The API did not answer in time.
    #[error("fulfillment request timed out after {0:?}")]
    Timeout(Duration),

    /// An HTTP transport or serialization error occurred.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-2xx response.
    #[error("unexpected response from fulfillment API: {0}")]
    UnexpectedResponse(String),
}

/// External shipping service.
#[automock]
#[async_trait]
pub trait FulfillmentClient: Send + Sync {
    /// Couriers able to deliver to the requested pincode.
    async fn serviceability(
        &self,
        request: ServiceabilityRequest,
    ) -> Result<Vec<ShippingOption>, FulfillmentError>;

    /// Book a shipment for an order.
    async fn create_shipment(
        &self,
        request: ShipmentRequest,
    ) -> Result<ShipmentReceipt, FulfillmentError>;
}

/// HTTP client for the fulfillment API.
#[derive(Debug, Clone)]
pub struct HttpFulfillmentClient {
    config: FulfillmentApiConfig,
    http: Client,
}

impl HttpFulfillmentClient {
    /// Create a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(config: FulfillmentApiConfig) -> Result<Self, FulfillmentError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, http })
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, FulfillmentError> {
        let url = format!("{}/{path}", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FulfillmentError::Timeout(self.config.timeout)
                } else {
                    FulfillmentError::Http(error)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(FulfillmentError::UnexpectedResponse(format!(
                "{path} request failed with status {status}: {text}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    couriers: Vec<CourierData>,
}

#[derive(Debug, Deserialize)]
struct CourierData {
    courier_id: String,
    courier_name: String,
    rate: u64,
    estimated_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    shipment_id: Option<String>,
    courier_id: String,
    rate: u64,
    eta: Option<String>,
}

#[async_trait]
impl FulfillmentClient for HttpFulfillmentClient {
    #[tracing::instrument(
        name = "fulfillment.http.serviceability",
        skip(self, request),
        fields(pincode = %request.delivery_pincode, cod = request.cod),
        err
    )]
    async fn serviceability(
        &self,
        request: ServiceabilityRequest,
    ) -> Result<Vec<ShippingOption>, FulfillmentError> {
        let parsed: ServiceabilityResponse = self.post("serviceability", &request).await?;

        Ok(parsed
            .couriers
            .into_iter()
            .map(|courier| ShippingOption {
                courier_id: courier.courier_id,
                courier_name: courier.courier_name,
                rate: courier.rate,
                estimated_days: courier.estimated_days,
            })
            .collect())
    }

    #[tracing::instrument(
        name = "fulfillment.http.create_shipment",
        skip(self, request),
        fields(order_id = %request.order_id, courier_id = %request.courier_id),
        err
    )]
    async fn create_shipment(
        &self,
        request: ShipmentRequest,
    ) -> Result<ShipmentReceipt, FulfillmentError> {
        let parsed: OrderResponse = self.post("order", &request).await?;

        Ok(ShipmentReceipt {
            shipment_id: parsed.shipment_id,
            courier_id: parsed.courier_id,
            rate: parsed.rate,
            eta: parsed.eta,
        })
    }
}
