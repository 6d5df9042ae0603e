// Shared HTTP plumbing for the SLS and BSS clients.
//
// Both services are plain JSON REST behind the CSM API gateway and report
// failures as RFC 7807 problem documents, so URL joining, verbs and
// response handling live here once.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::transport::{RetryPolicy, TransportConfig};

// ── Error response shape (RFC 7807 problem details) ──────────────────

#[derive(serde::Deserialize)]
struct ProblemDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// JSON REST client rooted at one service's API prefix.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl ServiceClient {
    /// Build a client for the service living under `api_prefix`
    /// (e.g. `apis/sls/v1`) on the gateway at `base_url`.
    pub fn new(base_url: &str, api_prefix: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, api_prefix, http, transport.retry)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(
        base_url: &str,
        api_prefix: &str,
        http: reqwest::Client,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url, api_prefix)?;
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    /// Append the API prefix unless the caller already supplied it, and
    /// guarantee a trailing slash so relative joins work.
    ///
    /// `https://api-gw-service-nmn.local` → `https://api-gw-service-nmn.local/apis/sls/v1/`
    fn normalize_base_url(raw: &str, api_prefix: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        let prefix = api_prefix.trim_matches('/');

        if path.ends_with(&format!("/{prefix}")) {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/{prefix}/"));
        }

        Ok(url)
    }

    /// The normalized service root (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    /// GET with query parameters, retried on transient failures.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        let mut attempt = 0;

        loop {
            debug!("GET {url} params={params:?}");
            let result = match self.http.get(url.clone()).query(params).send().await {
                Ok(resp) => self.handle_response(resp).await,
                Err(e) => Err(Error::Transport(e)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(%url, attempt, ?delay, error = %e, "transient GET failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    pub(crate) async fn put<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self.http.put(url).json(body).send().await?;
        self.handle_empty(resp).await
    }

    pub(crate) async fn patch<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("PATCH {url}");

        let resp = self.http.patch(url).json(body).send().await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resp: reqwest::Response) -> Error {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Error::Authentication {
                message: format!("gateway rejected the token (HTTP {status})"),
            };
        }

        let raw = resp.text().await.unwrap_or_default();

        if let Ok(problem) = serde_json::from_str::<ProblemDetails>(&raw) {
            Error::Api {
                status: status.as_u16(),
                message: problem.title.unwrap_or_else(|| status.to_string()),
                detail: problem.detail,
            }
        } else {
            Error::Api {
                status: status.as_u16(),
                message: if raw.is_empty() {
                    status.to_string()
                } else {
                    raw.chars().take(200).collect()
                },
                detail: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceClient;

    #[test]
    fn normalize_appends_prefix() {
        let url = ServiceClient::normalize_base_url("https://api-gw-service-nmn.local", "apis/sls/v1")
            .expect("valid URL");
        assert_eq!(url.as_str(), "https://api-gw-service-nmn.local/apis/sls/v1/");
    }

    #[test]
    fn normalize_keeps_existing_prefix() {
        let url =
            ServiceClient::normalize_base_url("http://localhost:8376/apis/sls/v1/", "apis/sls/v1")
                .expect("valid URL");
        assert_eq!(url.as_str(), "http://localhost:8376/apis/sls/v1/");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(ServiceClient::normalize_base_url("not a url", "apis/sls/v1").is_err());
    }
}
