//! Google Docs uploader: one document per text unit.

use docbridge_shared::{DocBridgeError, Reference, Result, TextId, Uploader};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::client::{GoogleClient, endpoint, json, send};

/// Public URL prefix for created documents.
const DOCUMENT_URL_PREFIX: &str = "https://docs.google.com/document/d/";

/// Creates a Google Doc titled with the text ID and fills it with the text.
pub struct DocsUploader {
    client: GoogleClient,
    folder_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

impl DocsUploader {
    pub fn new(client: GoogleClient, folder_id: Option<String>) -> Self {
        Self { client, folder_id }
    }

    async fn create(&self, title: &str) -> Result<String> {
        let url = endpoint(&self.client.docs_base, &["v1", "documents"]);
        let response = send(
            self.client.post(url).json(&json!({ "title": title })),
            "create document",
        )
        .await?;
        let created: CreatedDocument = json(response, "create document").await?;
        Ok(created.document_id)
    }

    async fn insert_text(&self, document_id: &str, text: &str) -> Result<()> {
        let url = endpoint(
            &self.client.docs_base,
            &["v1", "documents", &format!("{document_id}:batchUpdate")],
        );
        let body = json!({
            "requests": [
                { "insertText": { "location": { "index": 1 }, "text": text } }
            ]
        });
        send(self.client.post(url).json(&body), "insert text").await?;
        Ok(())
    }

    async fn move_to_folder(&self, document_id: &str, folder_id: &str) -> Result<()> {
        let mut url = endpoint(
            &self.client.drive_base,
            &["drive", "v3", "files", document_id],
        );
        url.query_pairs_mut()
            .append_pair("addParents", folder_id)
            .append_pair("removeParents", "root")
            .append_pair("supportsAllDrives", "true");
        send(self.client.patch(url).json(&json!({})), "move to folder").await?;
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        let mut url = endpoint(
            &self.client.drive_base,
            &["drive", "v3", "files", document_id],
        );
        url.query_pairs_mut()
            .append_pair("supportsAllDrives", "true");
        send(self.client.delete(url), "delete document").await?;
        Ok(())
    }
}

impl Uploader for DocsUploader {
    #[instrument(skip_all, fields(id = %id, bytes = content.len()))]
    async fn upload(&self, id: &TextId, content: &str) -> Result<Reference> {
        let document_id = self.create(id.as_str()).await?;
        debug!(%document_id, "document created");

        let filled = match self.insert_text(&document_id, content).await {
            Ok(()) => match &self.folder_id {
                Some(folder) => self.move_to_folder(&document_id, folder).await,
                None => Ok(()),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = filled {
            // Leave no half-built document behind; a retry creates a fresh one.
            if let Err(cleanup) = self.delete(&document_id).await {
                warn!(%document_id, error = %cleanup, "could not delete incomplete document");
                return Err(annotate(e, &format!("incomplete document {document_id} left behind")));
            }
            return Err(e);
        }

        Ok(Reference(format!("{DOCUMENT_URL_PREFIX}{document_id}/edit")))
    }
}

/// Append context to an error's message, keeping its kind.
fn annotate(err: DocBridgeError, note: &str) -> DocBridgeError {
    match err {
        DocBridgeError::Api { status, message } => DocBridgeError::Api {
            status,
            message: format!("{message} ({note})"),
        },
        DocBridgeError::Network(message) => DocBridgeError::Network(format!("{message} ({note})")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_shared::GoogleConfig;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader(server: &MockServer, folder: Option<&str>) -> DocsUploader {
        let config = GoogleConfig {
            docs_api_base: server.uri(),
            drive_api_base: server.uri(),
            ..GoogleConfig::default()
        };
        let client = GoogleClient::new(&config, "test-token").unwrap();
        DocsUploader::new(client, folder.map(String::from))
    }

    #[tokio::test]
    async fn upload_creates_and_fills_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({ "title": "D1109" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "documentId": "doc-abc" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/documents/doc-abc:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{ "insertText": { "text": "body text" } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let reference = uploader(&server, None)
            .upload(&"D1109".into(), "body text")
            .await
            .unwrap();
        assert_eq!(
            reference.as_str(),
            "https://docs.google.com/document/d/doc-abc/edit"
        );
    }

    #[tokio::test]
    async fn upload_moves_into_folder() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "documentId": "doc-1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/documents/doc-1:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/drive/v3/files/doc-1"))
            .and(query_param("addParents", "folder-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "doc-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let result = uploader(&server, Some("folder-9"))
            .upload(&"D1".into(), "x")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rate_limited_create_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Quota exceeded for quota metric" }
            })))
            .mount(&server)
            .await;

        let err = uploader(&server, None)
            .upload(&"D2".into(), "x")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[tokio::test]
    async fn failed_insert_deletes_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "documentId": "doc-x" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/documents/doc-x:batchUpdate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/doc-x"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let err = uploader(&server, None)
            .upload(&"D3".into(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DocBridgeError::Api { status: 500, .. }));
        assert!(!err.to_string().contains("left behind"));
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "documentId": "doc-y" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/documents/doc-y:batchUpdate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/doc-y"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = uploader(&server, None)
            .upload(&"D4".into(), "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("incomplete document doc-y left behind"));
    }
}
