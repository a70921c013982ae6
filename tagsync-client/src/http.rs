//! reqwest-backed [`TagStore`].

use crate::auth::{AuthProvider, StaticCredentials};
use crate::config::ClientConfig;
use crate::store::TagStore;
use crate::types::{
    error_message, ChildrenRequest, ConflictsReply, EntityChunkRequest, EntityList, EntityPut,
    PersonsEnvelope, TagChunkRequest, TagDefinitionList, TagDefinitionPost,
    TagDefinitionsEnvelope, TagInstanceList, TagInstancePost, TagInstancesEnvelope,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tagsync_core::{
    ConflictResolution, DisableOriginOnMerge, Entity, EntityDraft, MergeRequest, MergeRequestId,
    NewTagDefinition, StoreError, TagDefinition, TagDefinitionId, TagInstanceRecord,
    TagInstanceSubmission, WriteOutcome,
};

/// JSON-over-HTTP store rooted at a configured API base URL.
#[derive(Clone)]
pub struct HttpTagStore {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpTagStore {
    pub fn new(config: &ClientConfig) -> Result<Self, StoreError> {
        let auth = StaticCredentials::from_config(&config.auth)?;
        Self::with_auth(
            &config.api_base_url,
            Duration::from_millis(config.request_timeout_ms),
            Arc::new(auth),
        )
    }

    pub fn with_auth(
        base_url: &str,
        timeout: Duration,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build().map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, renewing credentials once on 401.
    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Reply, StoreError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut refreshed = false;
        loop {
            let headers = self.auth.headers().await?;
            let mut request = self
                .client
                .request(method.clone(), self.url(path))
                .headers(headers);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(transport)?;
            let status = response.status();
            let text = response.text().await.map_err(transport)?;
            tracing::debug!(method = %method, path, status = status.as_u16(), "store request");

            if status == StatusCode::UNAUTHORIZED {
                if !refreshed && self.auth.refresh().await? {
                    refreshed = true;
                    continue;
                }
                return Err(StoreError::Unauthorized {
                    message: error_message(&text),
                });
            }
            return Ok(Reply { status, body: text });
        }
    }

    async fn post<B>(&self, path: &str, body: &B) -> Result<Reply, StoreError>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.send(Method::POST, path, Some(body)).await
    }
}

impl std::fmt::Debug for HttpTagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTagStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport {
        reason: err.to_string(),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Decode {
        reason: e.to_string(),
    })
}

/// Status and raw body of a completed request.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) status: StatusCode,
    pub(crate) body: String,
}

impl Reply {
    /// Decode a read. 404 becomes [`StoreError::NotFound`].
    pub(crate) fn into_json<T: DeserializeOwned>(self, resource: &str) -> Result<T, StoreError> {
        if self.status.is_success() {
            decode(&self.body)
        } else if self.status == StatusCode::NOT_FOUND {
            Err(StoreError::NotFound {
                resource: resource.to_string(),
            })
        } else {
            Err(StoreError::Status {
                status: self.status.as_u16(),
                message: error_message(&self.body),
            })
        }
    }

    /// Classify a guarded write whose success and conflict bodies share the
    /// envelope `E`.
    pub(crate) fn into_outcome<E, T>(
        self,
        extract: impl FnOnce(E) -> Option<T>,
    ) -> Result<WriteOutcome<T>, StoreError>
    where
        E: DeserializeOwned,
    {
        match self.status {
            status if status.is_success() => {
                let envelope: E = decode(&self.body)?;
                extract(envelope)
                    .map(WriteOutcome::Ok)
                    .ok_or_else(|| StoreError::Decode {
                        reason: "response carried no record".to_string(),
                    })
            }
            StatusCode::CONFLICT => Ok(
                match decode::<E>(&self.body).ok().and_then(extract) {
                    Some(current) => WriteOutcome::Conflict(current),
                    None => WriteOutcome::Failed(error_message(&self.body)),
                },
            ),
            StatusCode::FORBIDDEN => Ok(WriteOutcome::Forbidden(error_message(&self.body))),
            _ => Ok(WriteOutcome::Failed(error_message(&self.body))),
        }
    }

    /// Classify a guarded write that has no meaningful response body.
    pub(crate) fn into_unit_outcome(self) -> WriteOutcome<()> {
        match self.status {
            status if status.is_success() => WriteOutcome::Ok(()),
            StatusCode::CONFLICT => WriteOutcome::Conflict(()),
            StatusCode::FORBIDDEN => WriteOutcome::Forbidden(error_message(&self.body)),
            _ => WriteOutcome::Failed(error_message(&self.body)),
        }
    }
}

fn first<T>(items: Vec<T>) -> Option<T> {
    items.into_iter().next()
}

#[async_trait]
impl TagStore for HttpTagStore {
    async fn entity_chunk(&self, offset: i64, limit: usize) -> Result<Vec<Entity>, StoreError> {
        let reply = self
            .post("/persons/chunk", &EntityChunkRequest { offset, limit })
            .await?;
        let list: EntityList = reply.into_json("persons")?;
        Ok(list.persons)
    }

    async fn tag_instance_chunk(
        &self,
        tag_definition: &TagDefinitionId,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<TagInstanceRecord>, StoreError> {
        let request = TagChunkRequest {
            id_tag_definition_persistent: tag_definition,
            offset,
            limit,
        };
        let reply = self.post("/tags/chunk", &request).await?;
        let list: TagInstanceList = reply.into_json("tag_instances")?;
        Ok(list.tag_instances)
    }

    async fn submit_tag_instance(
        &self,
        submission: TagInstanceSubmission,
    ) -> Result<WriteOutcome<TagInstanceRecord>, StoreError> {
        let body = TagInstancePost {
            tag_instances: vec![submission],
        };
        let reply = self.post("/tags", &body).await?;
        reply.into_outcome(|envelope: TagInstancesEnvelope<TagInstanceRecord>| {
            first(envelope.tag_instances)
        })
    }

    async fn tag_children(
        &self,
        parent: Option<&TagDefinitionId>,
    ) -> Result<Vec<TagDefinition>, StoreError> {
        let request = ChildrenRequest {
            id_parent_persistent: parent,
        };
        let reply = self.post("/tags/definitions/children", &request).await?;
        let list: TagDefinitionList = reply.into_json("tag_definitions")?;
        Ok(list.tag_definitions)
    }

    async fn create_tag_definition(
        &self,
        definition: NewTagDefinition,
    ) -> Result<WriteOutcome<TagDefinition>, StoreError> {
        let body = TagDefinitionPost {
            tag_definitions: vec![definition],
        };
        let reply = self.post("/tags/definitions", &body).await?;
        reply.into_outcome(|envelope: TagDefinitionsEnvelope<TagDefinition>| {
            first(envelope.tag_definitions)
        })
    }

    async fn put_entity(&self, draft: EntityDraft) -> Result<WriteOutcome<Entity>, StoreError> {
        let body = EntityPut {
            persons: vec![draft],
        };
        let reply = self.post("/persons", &body).await?;
        reply.into_outcome(|envelope: PersonsEnvelope<Entity>| first(envelope.persons))
    }

    async fn merge_conflicts(&self, id: &MergeRequestId) -> Result<ConflictsReply, StoreError> {
        let path = format!("/merge_requests/{}/conflicts", id);
        let reply = self.send::<()>(Method::GET, &path, None).await?;
        reply.into_json("merge_request")
    }

    async fn resolve_conflict(
        &self,
        id: &MergeRequestId,
        resolution: ConflictResolution,
    ) -> Result<WriteOutcome<()>, StoreError> {
        let path = format!("/merge_requests/{}/resolve", id);
        let reply = self.post(&path, &resolution).await?;
        Ok(reply.into_unit_outcome())
    }

    async fn start_merge(&self, id: &MergeRequestId) -> Result<WriteOutcome<()>, StoreError> {
        let path = format!("/merge_requests/{}/merge", id);
        let reply = self.send::<()>(Method::POST, &path, None).await?;
        Ok(reply.into_unit_outcome())
    }

    async fn set_disable_origin_on_merge(
        &self,
        id: &MergeRequestId,
        toggle: DisableOriginOnMerge,
    ) -> Result<WriteOutcome<MergeRequest>, StoreError> {
        let path = format!("/merge_requests/{}/disable_origin_on_merge", id);
        let reply = self.post(&path, &toggle).await?;
        reply.into_outcome(|merge_request: MergeRequest| Some(merge_request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsync_core::{TagInstanceId, TagValue};

    fn reply(status: u16, body: &str) -> Reply {
        Reply {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    const RECORD: &str = r#"{"tag_instances": [{
        "id_entity_persistent": "e1",
        "id_tag_definition_persistent": "t1",
        "id_persistent": "id-value-persistent",
        "version": 513,
        "value": 2
    }]}"#;

    fn extract(envelope: TagInstancesEnvelope<TagInstanceRecord>) -> Option<TagInstanceRecord> {
        first(envelope.tag_instances)
    }

    #[test]
    fn success_yields_ok_record() {
        let outcome = reply(200, RECORD).into_outcome(extract).unwrap();
        match outcome {
            WriteOutcome::Ok(record) => {
                assert_eq!(record.version, 513);
                assert_eq!(record.value, TagValue::Float(2.0));
                assert_eq!(record.id_persistent, TagInstanceId::new("id-value-persistent"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn conflict_carries_authoritative_record() {
        let outcome = reply(409, RECORD).into_outcome(extract).unwrap();
        assert!(matches!(outcome, WriteOutcome::Conflict(ref r) if r.version == 513));
    }

    #[test]
    fn conflict_without_record_degrades_to_failure() {
        let outcome = reply(409, r#"{"msg": "stale"}"#)
            .into_outcome(extract)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Failed("stale".to_string()));
    }

    #[test]
    fn forbidden_and_other_statuses_classified() {
        let outcome = reply(403, r#"{"msg": "not yours"}"#)
            .into_outcome(extract)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Forbidden("not yours".to_string()));
        let outcome = reply(400, r#"{"detail": "bad"}"#)
            .into_outcome(extract)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Failed("bad".to_string()));
    }

    #[test]
    fn malformed_success_is_decode_error() {
        let result = reply(200, "not json").into_outcome(extract);
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[test]
    fn reads_map_not_found_and_status() {
        let result: Result<EntityList, _> = reply(404, "").into_json("persons");
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        let result: Result<EntityList, _> = reply(500, r#"{"msg": "down"}"#).into_json("persons");
        assert_eq!(
            result.unwrap_err(),
            StoreError::Status {
                status: 500,
                message: "down".to_string()
            }
        );
    }

    #[test]
    fn unit_outcomes() {
        assert_eq!(reply(200, "").into_unit_outcome(), WriteOutcome::Ok(()));
        assert_eq!(reply(409, "").into_unit_outcome(), WriteOutcome::Conflict(()));
        assert_eq!(
            reply(400, r#"{"msg": "There are unresolved conflicts."}"#).into_unit_outcome(),
            WriteOutcome::Failed("There are unresolved conflicts.".to_string())
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let store = HttpTagStore::with_auth(
            "http://localhost:8000/api/",
            Duration::from_secs(1),
            Arc::new(StaticCredentials::anonymous()),
        )
        .unwrap();
        assert_eq!(store.base_url(), "http://localhost:8000/api");
        assert_eq!(store.url("/tags"), "http://localhost:8000/api/tags");
    }
}
