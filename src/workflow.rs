use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::Smiles;
use crate::error::PipelineError;

pub const DEFAULT_BASE_URL: &str = "https://api.rowansci.com";

/// Structured-query workflow service used for condensed Fukui indices.
pub trait WorkflowClient: Send + Sync {
    fn fukui(&self, name: &str, smiles: &Smiles) -> Result<FukuiResult, PipelineError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct FukuiResult {
    /// 0 means the calculation failed server-side.
    pub object_status: i64,
    #[serde(default)]
    pub object_data: Option<FukuiData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FukuiData {
    #[serde(default)]
    pub fukui_positive: Vec<f64>,
}

impl FukuiResult {
    /// Highest condensed f(+) value across the molecule's atoms.
    ///
    /// Status 0, a missing payload, and an empty list all count as a
    /// failed calculation.
    pub fn max_fukui_positive(&self) -> Result<f64, PipelineError> {
        if self.object_status == 0 {
            return Err(PipelineError::Extraction(
                "workflow returned status 0".to_string(),
            ));
        }
        let values = self
            .object_data
            .as_ref()
            .map(|data| data.fukui_positive.as_slice())
            .unwrap_or_default();
        values
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, value| {
                Some(best.map_or(value, |best| best.max(value)))
            })
            .ok_or_else(|| {
                PipelineError::Extraction("no fukui_positive data in response".to_string())
            })
    }
}

#[derive(Debug, Serialize)]
struct WorkflowRequest<'a> {
    name: &'a str,
    molecule: &'a str,
    workflow: &'a str,
}

#[derive(Clone)]
pub struct WorkflowHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WorkflowHttpClient {
    /// The key is passed in at construction; nothing in the crate holds a
    /// process-global credential.
    pub fn new(base_url: &str, api_key: String) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pfas-screen/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::WorkflowHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| PipelineError::WorkflowHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn submit_url(&self) -> String {
        format!("{}/workflows", self.base_url)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, PipelineError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && matches!(status, 429 | 500 | 502 | 503 | 504) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES
                        && (err.is_timeout() || err.is_connect() || err.is_request())
                    {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(PipelineError::WorkflowHttp(err.to_string()));
                }
            }
        }
    }
}

impl WorkflowClient for WorkflowHttpClient {
    fn fukui(&self, name: &str, smiles: &Smiles) -> Result<FukuiResult, PipelineError> {
        let url = self.submit_url();
        let body = WorkflowRequest {
            name,
            molecule: smiles.as_str(),
            workflow: "fukui",
        };
        let response = self.send_with_retries(|| {
            self.client
                .post(&url)
                .header("X-Api-Key", &self.api_key)
                .json(&body)
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "workflow request failed".to_string());
            return Err(PipelineError::WorkflowStatus { status, message });
        }
        response
            .json::<FukuiResult>()
            .map_err(|err| PipelineError::WorkflowHttp(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn result(status: i64, values: Vec<f64>) -> FukuiResult {
        FukuiResult {
            object_status: status,
            object_data: Some(FukuiData {
                fukui_positive: values,
            }),
        }
    }

    #[test]
    fn max_of_fukui_positive() {
        let res = result(1, vec![0.02, 0.31, 0.11]);
        assert_eq!(res.max_fukui_positive().unwrap(), 0.31);
    }

    #[test]
    fn status_zero_is_failure() {
        let res = result(0, vec![0.5]);
        assert_matches!(
            res.max_fukui_positive().unwrap_err(),
            PipelineError::Extraction(_)
        );
    }

    #[test]
    fn missing_data_is_failure() {
        let res = FukuiResult {
            object_status: 1,
            object_data: None,
        };
        assert_matches!(
            res.max_fukui_positive().unwrap_err(),
            PipelineError::Extraction(_)
        );
        let res = result(1, vec![]);
        assert!(res.max_fukui_positive().is_err());
    }
}
