//! `reqwest` implementation of [`MailService`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{MailService, MessageDetail, MessageSummary, ServiceError, Session};

/// Body of `set_email_user`.
#[derive(Debug, Deserialize)]
struct AssignResponse {
    email_addr: String,
}

/// Body of `get_email_list`.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    list: Option<Vec<MessageSummary>>,
}

/// Mail service client speaking the query-string API.
#[derive(Debug, Clone)]
pub struct HttpMailService {
    http: Client,
    base: Url,
}

impl HttpMailService {
    /// Creates a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the HTTP client cannot be built.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let base = Url::parse(api_base)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    /// Endpoint URL with the operation selector set.
    fn endpoint(&self, function: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("f", function);
        url
    }

    async fn get(&self, function: &str, params: &[(&str, &str)]) -> Result<Response, ServiceError> {
        debug!("GET f={}", function);
        let response = self
            .http
            .get(self.endpoint(function))
            .query(params)
            .send()
            .await?;
        check_status(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        function: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let response = self.get(function, params).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        debug!("Request failed with status {}", status);
        Err(ServiceError::Status(status.as_u16()))
    }
}

#[async_trait]
impl MailService for HttpMailService {
    async fn acquire_session(&self) -> Result<Session, ServiceError> {
        let session: Session = self.get_json("get_email_address", &[]).await?;
        if session.session_id.is_empty() {
            return Err(ServiceError::InvalidResponse(
                "missing sid_token".to_string(),
            ));
        }
        Ok(session)
    }

    async fn assign_address(
        &self,
        session_id: &str,
        local_part: &str,
        domain: &str,
    ) -> Result<String, ServiceError> {
        debug!("POST f=set_email_user");
        let form = [
            ("sid_token", session_id),
            ("email_user", local_part),
            ("domain", domain),
        ];
        let response = self
            .http
            .post(self.endpoint("set_email_user"))
            .form(&form)
            .send()
            .await?;
        let body = check_status(response)?.bytes().await?;
        let assigned: AssignResponse = serde_json::from_slice(&body)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        Ok(assigned.email_addr)
    }

    async fn list_messages(
        &self,
        session_id: &str,
        offset: u32,
    ) -> Result<Vec<MessageSummary>, ServiceError> {
        let offset = offset.to_string();
        let response: ListResponse = self
            .get_json(
                "get_email_list",
                &[("offset", &offset), ("sid_token", session_id)],
            )
            .await?;
        Ok(response.list.unwrap_or_default())
    }

    async fn fetch_message(
        &self,
        session_id: &str,
        id: &str,
    ) -> Result<MessageDetail, ServiceError> {
        self.get_json("fetch_email", &[("email_id", id), ("sid_token", session_id)])
            .await
    }

    async fn fetch_attachment(
        &self,
        session_id: &str,
        id: &str,
        filename: &str,
    ) -> Result<Bytes, ServiceError> {
        let response = self
            .get(
                "fetch_attachment",
                &[
                    ("email_id", id),
                    ("sid_token", session_id),
                    ("file_name", filename),
                ],
            )
            .await?;
        Ok(response.bytes().await?)
    }

    async fn delete_message(&self, session_id: &str, id: &str) -> Result<(), ServiceError> {
        self.get("del_email", &[("sid_token", session_id), ("email_ids[]", id)])
            .await?;
        Ok(())
    }
}
