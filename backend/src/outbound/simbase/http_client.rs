//! Reqwest-backed connectivity provider adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::dto::{BalanceDto, RenameDto, SimCardDto, StateChangeDto, UsageResponseDto};
use crate::domain::Iccid;
use crate::domain::ports::{
    AccountBalance, ConnectivityClient, ConnectivityClientError, SimCard, SimStateChange,
    UsageRecord,
};

/// Connectivity client bound to one API base URL and key.
pub struct SimbaseHttpClient {
    client: Client,
    base_url: Url,
    api_key: Zeroizing<String>,
}

impl SimbaseHttpClient {
    /// Build an adapter rooted at `base_url` (for example
    /// `https://api.simbase.com/v1/`).
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        api_key: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            api_key,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ConnectivityClientError> {
        self.base_url.join(path).map_err(|error| {
            ConnectivityClientError::transport(format!("invalid provider URL: {error}"))
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, ConnectivityClientError> {
        let response = request
            .bearer_auth(self.api_key.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        Ok(body.to_vec())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ConnectivityClientError> {
        let body = self.send(request).await?;
        decode(&body)
    }
}

/// `Url::join` drops the last segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ConnectivityClientError> {
    serde_json::from_slice(body).map_err(|error| {
        ConnectivityClientError::decode(format!("invalid provider JSON: {error}"))
    })
}

#[async_trait]
impl ConnectivityClient for SimbaseHttpClient {
    async fn sim_details(&self, iccid: &Iccid) -> Result<SimCard, ConnectivityClientError> {
        let url = self.url(&format!("simcards/{iccid}"))?;
        let dto: SimCardDto = self.fetch(self.client.get(url)).await?;
        dto.into_domain(iccid)
            .map_err(ConnectivityClientError::decode)
    }

    async fn rename_sim(&self, iccid: &Iccid, name: &str) -> Result<(), ConnectivityClientError> {
        let url = self.url(&format!("simcards/{iccid}"))?;
        let payload = RenameDto { device_name: name };
        self.send(self.client.patch(url).json(&payload)).await.map(|_| ())
    }

    async fn set_sim_state(
        &self,
        iccid: &Iccid,
        change: SimStateChange,
    ) -> Result<(), ConnectivityClientError> {
        let url = self.url(&format!("simcards/{iccid}"))?;
        let payload = StateChangeDto {
            sim_state: change.as_remote(),
        };
        self.send(self.client.patch(url).json(&payload)).await.map(|_| ())
    }

    async fn usage(&self, iccid: &Iccid) -> Result<Vec<UsageRecord>, ConnectivityClientError> {
        let url = self.url(&format!("simcards/{iccid}/usage"))?;
        let dto: UsageResponseDto = self.fetch(self.client.get(url)).await?;
        Ok(dto.into_domain())
    }

    async fn account_balance(&self) -> Result<AccountBalance, ConnectivityClientError> {
        let url = self.url("account/balance")?;
        let dto: BalanceDto = self.fetch(self.client.get(url)).await?;
        Ok(dto.into_domain())
    }
}

fn map_transport_error(error: reqwest::Error) -> ConnectivityClientError {
    if error.is_timeout() {
        ConnectivityClientError::timeout(error.to_string())
    } else {
        ConnectivityClientError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ConnectivityClientError {
    let preview: String = String::from_utf8_lossy(body).chars().take(160).collect();
    let preview = preview.trim();
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    };

    match status {
        StatusCode::NOT_FOUND => ConnectivityClientError::not_found(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ConnectivityClientError::timeout(message)
        }
        _ if status.is_client_error() => ConnectivityClientError::rejected(message),
        _ => ConnectivityClientError::transport(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SimState;
    use rstest::rstest;

    fn iccid() -> Iccid {
        Iccid::parse("8931080019073497795").expect("iccid")
    }

    #[rstest]
    #[case(r#"{"iccid":"8931080019073497795","state":"enabled","name":"@@"}"#, SimState::Enabled)]
    #[case(r#"{"iccid":"8931080019073497795","sim_state":"inactive"}"#, SimState::Disabled)]
    #[case(r#"{"status":"ACTIVE","device_name":"@@ 356938035643809"}"#, SimState::Enabled)]
    #[case(r#"{"state":"suspended"}"#, SimState::Other("suspended".to_owned()))]
    fn decodes_sim_state_vocabularies(#[case] body: &str, #[case] expected: SimState) {
        let dto: SimCardDto = decode(body.as_bytes()).expect("json");
        let card = dto.into_domain(&iccid()).expect("card");
        assert_eq!(card.state, expected);
        assert_eq!(card.iccid, iccid());
    }

    #[test]
    fn sim_without_state_is_a_decode_error() {
        let dto: SimCardDto = decode(br#"{"name":"@@"}"#).expect("json");
        assert!(dto.into_domain(&iccid()).is_err());
    }

    #[rstest]
    #[case(r#"[{"period":"2024-05","data_bytes":1024,"sms_count":2}]"#)]
    #[case(r#"{"data":[{"month":"2024-05","bytes":1024,"sms":2,"cost":0.5}]}"#)]
    fn decodes_both_usage_envelopes(#[case] body: &str) {
        let dto: UsageResponseDto = decode(body.as_bytes()).expect("json");
        let usage = dto.into_domain();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].period, "2024-05");
        assert_eq!(usage[0].data_bytes, 1024);
        assert_eq!(usage[0].sms_count, 2);
    }

    #[rstest]
    #[case(StatusCode::NOT_FOUND, "NotFound")]
    #[case(StatusCode::UNAUTHORIZED, "Rejected")]
    #[case(StatusCode::GATEWAY_TIMEOUT, "Timeout")]
    #[case(StatusCode::BAD_GATEWAY, "Transport")]
    fn maps_statuses(#[case] status: StatusCode, #[case] expected: &str) {
        let error = map_status_error(status, b"");
        let matched = match expected {
            "NotFound" => matches!(error, ConnectivityClientError::NotFound { .. }),
            "Rejected" => matches!(error, ConnectivityClientError::Rejected { .. }),
            "Timeout" => matches!(error, ConnectivityClientError::Timeout { .. }),
            "Transport" => matches!(error, ConnectivityClientError::Transport { .. }),
            _ => panic!("unsupported test expectation: {expected}"),
        };
        assert!(matched, "{status} should map to {expected}");
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = Url::parse("https://api.simbase.com/v1").expect("url");
        let joined = with_trailing_slash(base)
            .join("simcards/1")
            .expect("join");
        assert_eq!(joined.as_str(), "https://api.simbase.com/v1/simcards/1");
    }
}
