//! Maps each `Operation` variant onto the HTTP request spec.md §6 requires
//! of a JSON:API source, grounded on `holon-todoist/client.rs`'s one
//! method per remote mutation shape.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use serde_json::json;

use conduit_api::{ConduitError, Record, RecordIdentity};

use crate::config::JsonApiConfig;
use crate::document::{
    record_to_resource, resource_to_record, Document, DocumentMany, ResourceIdentifier,
};
use crate::transport::Transport;
use crate::url;

pub struct JsonApiClient {
    config: JsonApiConfig,
    transport: Arc<dyn Transport>,
}

impl JsonApiClient {
    pub fn new(config: JsonApiConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    fn document_from(&self, body: serde_json::Value, local_type: &str) -> Result<Record, ConduitError> {
        let doc: Document = serde_json::from_value(body.clone())
            .map_err(|e| ConduitError::other(format!("invalid JSON:API document: {e}")))?;
        let resource = doc
            .data
            .ok_or_else(|| ConduitError::other("JSON:API response had no `data`"))?;
        Ok(resource_to_record(&resource, local_type))
    }

    /// `addRecord` → `POST /{type}`.
    pub async fn create_record(&self, record: &Record) -> Result<Record, ConduitError> {
        let url = url::build(&self.config, &record.type_, None, None);
        let body = json!({ "data": record_to_resource(record) });
        let response = self.transport.send(Method::POST, &url, Some(body)).await?;
        self.document_from(response, &record.type_)
    }

    /// `replaceRecord` → `PATCH /{type}/{id}`.
    pub async fn replace_record(&self, record: &Record) -> Result<Record, ConduitError> {
        let url = url::build(&self.config, &record.type_, Some(&record.id), None);
        let body = json!({ "data": record_to_resource(record) });
        let response = self.transport.send(Method::PATCH, &url, Some(body)).await?;
        self.document_from(response, &record.type_)
    }

    /// `removeRecord` → `DELETE /{type}/{id}`.
    pub async fn remove_record(&self, identity: &RecordIdentity) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), None);
        self.transport.send(Method::DELETE, &url, None).await?;
        Ok(())
    }

    /// `addToHasMany` → `POST /{type}/{id}/relationships/{rel}`.
    pub async fn add_to_has_many(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
        related: &RecordIdentity,
    ) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), Some(relationship));
        let body = json!({ "data": [ResourceIdentifier::from(related)] });
        self.transport.send(Method::POST, &url, Some(body)).await?;
        Ok(())
    }

    /// `removeFromHasMany` → `DELETE /{type}/{id}/relationships/{rel}` with
    /// body `{ data: [{type,id}, …] }`.
    pub async fn remove_from_has_many(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
        related: &RecordIdentity,
    ) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), Some(relationship));
        let body = json!({ "data": [ResourceIdentifier::from(related)] });
        self.transport.send(Method::DELETE, &url, Some(body)).await?;
        Ok(())
    }

    /// `replaceHasMany` → `PATCH /{type}/{id}` with the relationship object.
    pub async fn replace_has_many(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
        related: &HashSet<RecordIdentity>,
    ) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), None);
        let data: Vec<ResourceIdentifier> = related.iter().map(ResourceIdentifier::from).collect();
        let body = json!({
            "data": {
                "type": identity.type_,
                "id": identity.id,
                "relationships": { relationship: { "data": data } },
            }
        });
        self.transport.send(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }

    /// `replaceHasOne` → `PATCH /{type}/{id}` with the relationship object.
    pub async fn replace_has_one(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
        related: Option<&RecordIdentity>,
    ) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), None);
        let data = related.map(ResourceIdentifier::from);
        let body = json!({
            "data": {
                "type": identity.type_,
                "id": identity.id,
                "relationships": { relationship: { "data": data } },
            }
        });
        self.transport.send(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }

    fn documents_from(
        &self,
        body: serde_json::Value,
        local_type: &str,
    ) -> Result<Vec<Record>, ConduitError> {
        let doc: DocumentMany = serde_json::from_value(body)
            .map_err(|e| ConduitError::other(format!("invalid JSON:API document: {e}")))?;
        Ok(doc
            .data
            .iter()
            .map(|resource| resource_to_record(resource, local_type))
            .collect())
    }

    /// `findRecord` → `GET /{type}/{id}`.
    pub async fn find_record(&self, identity: &RecordIdentity) -> Result<Record, ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), None);
        let response = self.transport.send(Method::GET, &url, None).await?;
        self.document_from(response, &identity.type_)
    }

    /// `findRecords` → `GET /{type}`.
    pub async fn find_records(&self, type_: &str) -> Result<Vec<Record>, ConduitError> {
        let url = url::build(&self.config, type_, None, None);
        let response = self.transport.send(Method::GET, &url, None).await?;
        self.documents_from(response, type_)
    }

    /// `findRelatedRecord` → `GET /{type}/{id}/{relationship}`, the
    /// related-resource endpoint rather than the linkage-only one. The
    /// query shape carries no related-type hint, so the related record's
    /// type is whatever the server echoes in its own resource object.
    pub async fn find_related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Record>, ConduitError> {
        let url = url::build_related(&self.config, &identity.type_, &identity.id, relationship);
        let response = self.transport.send(Method::GET, &url, None).await?;
        let doc: Document = serde_json::from_value(response)
            .map_err(|e| ConduitError::other(format!("invalid JSON:API document: {e}")))?;
        Ok(doc
            .data
            .map(|resource| resource_to_record(&resource, &resource.type_)))
    }

    /// `findRelatedRecords` → `GET /{type}/{id}/{relationship}`.
    pub async fn find_related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Vec<Record>, ConduitError> {
        let url = url::build_related(&self.config, &identity.type_, &identity.id, relationship);
        let response = self.transport.send(Method::GET, &url, None).await?;
        let doc: DocumentMany = serde_json::from_value(response)
            .map_err(|e| ConduitError::other(format!("invalid JSON:API document: {e}")))?;
        Ok(doc
            .data
            .iter()
            .map(|resource| resource_to_record(resource, &resource.type_))
            .collect())
    }

    /// `replaceKey` (spec.md's open question, resolved in SPEC_FULL.md
    /// §9): `PATCH /{type}/{id}` with `{ keys: { [key]: value } }`.
    pub async fn replace_key(
        &self,
        identity: &RecordIdentity,
        key: &str,
        value: &str,
    ) -> Result<(), ConduitError> {
        let url = url::build(&self.config, &identity.type_, Some(&identity.id), None);
        let body = json!({
            "data": {
                "type": identity.type_,
                "id": identity.id,
                "keys": { key: value },
            }
        });
        self.transport.send(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTransport {
        calls: Mutex<Vec<(Method, String, Option<serde_json::Value>)>>,
        response: serde_json::Value,
        fail_with: Option<(u16, serde_json::Value)>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            method: Method,
            url: &str,
            body: Option<serde_json::Value>,
        ) -> Result<serde_json::Value, ConduitError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.clone()));
            if let Some((status, body)) = &self.fail_with {
                return Err(ConduitError::ServerError {
                    status: *status,
                    body: body.clone(),
                });
            }
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn create_record_posts_to_pluralized_collection_and_parses_response() {
        let transport = Arc::new(RecordingTransport {
            calls: Mutex::new(Vec::new()),
            response: json!({
                "data": { "type": "planets", "id": "12345", "attributes": { "name": "Pluto" } }
            }),
            fail_with: None,
        });
        let client = JsonApiClient::new(JsonApiConfig::default(), transport.clone());

        let record = client
            .create_record(&Record::new("planet", "").with_attribute("name", "Pluto"))
            .await
            .unwrap();

        assert_eq!(record.type_, "planet");
        assert_eq!(record.id, "12345");

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::POST);
        assert_eq!(calls[0].1, "planets");
    }

    #[tokio::test]
    async fn create_record_propagates_server_error_body() {
        let transport = Arc::new(RecordingTransport {
            calls: Mutex::new(Vec::new()),
            response: serde_json::Value::Null,
            fail_with: Some((
                422,
                json!({ "errors": [{ "detail": "Pluto isn't really a planet!" }] }),
            )),
        });
        let client = JsonApiClient::new(JsonApiConfig::default(), transport);

        let err = client
            .create_record(&Record::new("planet", "").with_attribute("name", "Pluto"))
            .await
            .unwrap_err();

        match err {
            ConduitError::ServerError { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(
                    body["errors"][0]["detail"],
                    json!("Pluto isn't really a planet!")
                );
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_from_has_many_deletes_relationship_url_with_body() {
        let transport = Arc::new(RecordingTransport {
            calls: Mutex::new(Vec::new()),
            response: serde_json::Value::Null,
            fail_with: None,
        });
        let client = JsonApiClient::new(JsonApiConfig::default(), transport.clone());

        client
            .remove_from_has_many(
                &RecordIdentity::new("planet", "earth"),
                "inhabitants",
                &RecordIdentity::new("human", "alice"),
            )
            .await
            .unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, Method::DELETE);
        assert_eq!(calls[0].1, "planets/earth/relationships/inhabitants");
        assert!(calls[0].2.is_some());
    }
}
