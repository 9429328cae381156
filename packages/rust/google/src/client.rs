//! Authenticated HTTP plumbing shared by the Docs and Sheets clients.

use std::time::Duration;

use docbridge_shared::{DocBridgeError, GoogleConfig, Result};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("docbridge/", env!("CARGO_PKG_VERSION"));

/// Longest error body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 300;

/// A bearer-authenticated client for the Google REST APIs.
///
/// The access token is obtained elsewhere and handed in; this type never
/// refreshes it.
#[derive(Clone)]
pub struct GoogleClient {
    http: Client,
    token: String,
    pub(crate) docs_base: Url,
    pub(crate) sheets_base: Url,
    pub(crate) drive_base: Url,
}

impl GoogleClient {
    pub fn new(config: &GoogleConfig, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocBridgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token: token.into(),
            docs_base: parse_base(&config.docs_api_base)?,
            sheets_base: parse_base(&config.sheets_api_base)?,
            drive_base: parse_base(&config.drive_api_base)?,
        })
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.http.get(url).bearer_auth(&self.token)
    }

    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.http.post(url).bearer_auth(&self.token)
    }

    pub(crate) fn patch(&self, url: Url) -> RequestBuilder {
        self.http.patch(url).bearer_auth(&self.token)
    }

    pub(crate) fn delete(&self, url: Url) -> RequestBuilder {
        self.http.delete(url).bearer_auth(&self.token)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| DocBridgeError::config(format!("invalid API base URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(DocBridgeError::config(format!(
            "API base URL '{raw}' cannot be used as a base"
        )));
    }
    Ok(url)
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

/// Send a request, mapping transport failures to [`DocBridgeError::Network`]
/// and non-success statuses to [`DocBridgeError::Api`].
pub(crate) async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| DocBridgeError::Network(format!("{what}: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(DocBridgeError::Api {
        status: status.as_u16(),
        message: format!("{what}: {}", error_message(&body)),
    })
}

/// Decode a JSON response body.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| DocBridgeError::Network(format!("{what}: unexpected response body: {e}")))
}

/// Pull `error.message` out of a Google error body, or fall back to a
/// truncated copy of the raw body.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(serde::Deserialize)]
    struct Detail {
        message: String,
    }

    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments() {
        let base = Url::parse("https://sheets.googleapis.com").unwrap();
        let url = endpoint(&base, &["v4", "spreadsheets", "abc", "values", "'My Tab'!J1:L2"]);
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Tab'!J1:L2"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("http://127.0.0.1:9000/mock/").unwrap();
        let url = endpoint(&base, &["v1", "documents"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/mock/v1/documents");
    }

    #[test]
    fn google_error_envelope() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(body), "Quota exceeded");
        assert_eq!(error_message("  plain failure "), "plain failure");
    }

    #[test]
    fn invalid_base_is_config_error() {
        let config = GoogleConfig {
            docs_api_base: "not a url".into(),
            ..GoogleConfig::default()
        };
        let err = GoogleClient::new(&config, "token").err().expect("error");
        assert!(matches!(err, DocBridgeError::Config { .. }));
    }
}
