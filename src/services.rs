use crate::errors::AppError;
use crate::models::PostalAddress;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Public ViaCEP endpoint used in production.
pub const VIACEP_BASE_URL: &str = "https://viacep.com.br";

/// Digits in a Brazilian postal code.
const CEP_DIGITS: usize = 8;

/// Raw ViaCEP payload. Unknown codes come back as `{"erro": true}`
/// (older deployments send the string `"true"`).
#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    erro: Option<Value>,
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    uf: Option<String>,
}

impl ViaCepResponse {
    fn is_error(&self) -> bool {
        match &self.erro {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn into_postal_address(self) -> PostalAddress {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        PostalAddress {
            logradouro: non_empty(self.logradouro),
            bairro: non_empty(self.bairro),
            cidade: non_empty(self.localidade),
            estado: non_empty(self.uf),
        }
    }
}

/// Client for the ViaCEP postal-code lookup service.
#[derive(Clone)]
pub struct ViaCepService {
    client: Client,
    base_url: String,
}

impl ViaCepService {
    /// Creates a new `ViaCepService`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Scheme and host of the lookup service, e.g. [`VIACEP_BASE_URL`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create ViaCEP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Resolves street, neighborhood, city and state for a postal code.
    ///
    /// # Returns
    ///
    /// * `Ok(PostalAddress)` - The mapped address fields.
    /// * `Err(AppError::BadRequest)` - The code does not have 8 digits.
    /// * `Err(AppError::NotFound)` - ViaCEP does not know the code.
    /// * `Err(AppError::ExternalApiError)` - Transport failure or unexpected response.
    pub async fn lookup(&self, cep: &str) -> Result<PostalAddress, AppError> {
        let digits: String = cep.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != CEP_DIGITS {
            return Err(AppError::BadRequest("invalid postal code".to_string()));
        }

        let url = self.lookup_url(&digits)?;
        tracing::info!("Looking up CEP {} on ViaCEP", digits);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("ViaCEP request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "ViaCEP returned status {}: {}",
                status, error_text
            )));
        }

        let body: ViaCepResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse ViaCEP response: {}", e))
        })?;

        if body.is_error() {
            tracing::warn!("CEP {} not found on ViaCEP", digits);
            return Err(AppError::NotFound("postal code not found".to_string()));
        }

        Ok(body.into_postal_address())
    }

    /// Builds `{base}/ws/{cep}/json/`. The code is already digits only.
    fn lookup_url(&self, cep: &str) -> Result<Url, AppError> {
        let raw = format!("{}/ws/{}/json/", self.base_url.trim_end_matches('/'), cep);
        Url::parse(&raw)
            .map_err(|e| AppError::ExternalApiError(format!("Invalid ViaCEP URL {}: {}", raw, e)))
    }
}
