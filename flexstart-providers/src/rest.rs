use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use flexstart_common::{CompatibilityQuery, HardwareShape, Instance, ProviderError};

use crate::{InstanceDirectory, PolicyStore, PricingCatalog, ShapeCatalog};

/// REST control-plane adapter. Speaks a small JSON API exposing the instance
/// directory, shape catalog, pricing catalog and policy store.
pub struct RestProvider {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct PriceBody {
    price_per_hour: f64,
}

#[derive(Deserialize)]
struct PolicyBody {
    document: String,
}

impl RestProvider {
    pub fn new(base_url: String, token: String) -> Self {
        // Default reqwest client has no overall timeout. If the control plane
        // stalls, a recovery batch can hang past its budget.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(v) = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            headers.insert(reqwest::header::AUTHORIZATION, v);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn transport_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() || e.is_connect() {
            ProviderError::Unavailable(e.to_string())
        } else {
            ProviderError::Api(e.to_string())
        }
    }

    /// Map a non-success response to the error taxonomy. `capacity_shape`
    /// names the shape a start attempt targeted so capacity rejections stay
    /// distinguishable.
    async fn api_error(resp: Response, capacity_shape: Option<&str>) -> ProviderError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Option<ApiError> = serde_json::from_str(&text).ok();
        let error_type = parsed
            .as_ref()
            .and_then(|e| e.error_type.as_deref())
            .unwrap_or("");
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or(text);

        if let Some(shape) = capacity_shape {
            if error_type == "insufficient_capacity" || error_type == "out_of_stock" {
                return ProviderError::CapacityUnavailable {
                    shape: shape.to_string(),
                };
            }
        }
        match status {
            StatusCode::NOT_FOUND => ProviderError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => ProviderError::Unavailable(message),
            _ => ProviderError::Api(format!("{}: {}", status.as_u16(), message)),
        }
    }
}

#[async_trait]
impl InstanceDirectory for RestProvider {
    async fn describe(&self, instance_id: &str) -> Result<Instance, ProviderError> {
        let url = self.url(&format!("/v1/instances/{instance_id}"));
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        resp.json::<Instance>()
            .await
            .map_err(|e| ProviderError::Api(format!("decode instance: {e}")))
    }

    async fn start(&self, instance_id: &str) -> Result<(), ProviderError> {
        // Fetch the current shape first so a capacity rejection can name it.
        let instance = self.describe(instance_id).await?;
        let url = self.url(&format!("/v1/instances/{instance_id}/start"));
        eprintln!(
            "🔵 [Cloud API] POST {} (shape={})",
            url, instance.shape_id
        );
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, Some(&instance.shape_id)).await);
        }
        Ok(())
    }

    async fn modify_shape(&self, instance_id: &str, shape_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("/v1/instances/{instance_id}"));
        eprintln!("🔵 [Cloud API] PATCH {} shape_id={}", url, shape_id);
        let resp = self
            .client
            .patch(&url)
            .headers(self.headers())
            .json(&json!({ "shape_id": shape_id }))
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        Ok(())
    }

    async fn write_tag(
        &self,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let url = self.url(&format!("/v1/instances/{instance_id}/tags/{key}"));
        let resp = self
            .client
            .put(&url)
            .headers(self.headers())
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        Ok(())
    }

    async fn delete_tag(&self, instance_id: &str, key: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("/v1/instances/{instance_id}/tags/{key}"));
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(Self::transport_error)?;
        // Deleting an absent tag is a no-op, not an error.
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(Self::api_error(resp, None).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ShapeCatalog for RestProvider {
    async fn describe_shape(&self, shape_id: &str) -> Result<HardwareShape, ProviderError> {
        let url = self.url(&format!("/v1/shapes/{shape_id}"));
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        resp.json::<HardwareShape>()
            .await
            .map_err(|e| ProviderError::Api(format!("decode shape: {e}")))
    }

    async fn find_compatible(
        &self,
        query: &CompatibilityQuery,
    ) -> Result<Vec<HardwareShape>, ProviderError> {
        let url = self.url("/v1/shapes/search");
        eprintln!(
            "🔵 [Cloud API] POST {} vcpu=[{},{}] mem=[{},{}] arch={}",
            url, query.vcpu_min, query.vcpu_max, query.memory_min_mib, query.memory_max_mib,
            query.architecture
        );
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(query)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        resp.json::<Vec<HardwareShape>>()
            .await
            .map_err(|e| ProviderError::Api(format!("decode shapes: {e}")))
    }
}

#[async_trait]
impl PricingCatalog for RestProvider {
    async fn price_of(&self, shape_id: &str, region: &str) -> Result<f64, ProviderError> {
        let url = self.url(&format!("/v1/pricing/{shape_id}"));
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&[("region", region)])
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        resp.json::<PriceBody>()
            .await
            .map(|b| b.price_per_hour)
            .map_err(|e| ProviderError::Api(format!("decode price: {e}")))
    }
}

#[async_trait]
impl PolicyStore for RestProvider {
    async fn get(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let url = self.url("/v1/policies");
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&[("name", name)])
            .send()
            .await
            .map_err(Self::transport_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::api_error(resp, None).await);
        }
        resp.json::<PolicyBody>()
            .await
            .map(|b| Some(b.document))
            .map_err(|e| ProviderError::Api(format!("decode policy: {e}")))
    }
}
