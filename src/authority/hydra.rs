use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, instrument};
use url::Url;

use super::{
    AcceptLogin, AuthorityError, Introspection, LoginAuthority, LoginContext, RejectLogin,
    TokenIntrospector,
};
use crate::APP_USER_AGENT;

/// Admin API paths, relative to the admin base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HydraEndpoints {
    pub login: String,
    pub login_accept: String,
    pub login_reject: String,
    pub introspect: String,
}

impl Default for HydraEndpoints {
    fn default() -> Self {
        Self {
            login: "/oauth2/auth/requests/login".to_string(),
            login_accept: "/oauth2/auth/requests/login/accept".to_string(),
            login_reject: "/oauth2/auth/requests/login/reject".to_string(),
            introspect: "/oauth2/introspect".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RedirectResponse {
    #[serde(default)]
    redirect_to: String,
}

/// JSON client for a Hydra-compatible admin API.
#[derive(Clone)]
pub struct HydraClient {
    client: Client,
    admin_url: Url,
    endpoints: HydraEndpoints,
}

impl fmt::Debug for HydraClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydraClient")
            .field("admin_url", &self.admin_url.as_str())
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl HydraClient {
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new(admin_url: Url, endpoints: HydraEndpoints) -> Result<Self, AuthorityError> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            admin_url,
            endpoints,
        })
    }

    fn admin_endpoint(&self, endpoint: &str) -> Url {
        let mut url = self.admin_url.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url
    }

    fn endpoint_url(&self, endpoint: &str, challenge: &str) -> Url {
        let mut url = self.admin_endpoint(endpoint);
        url.query_pairs_mut().append_pair("login_challenge", challenge);
        url
    }

    async fn check(response: Response) -> Result<Response, AuthorityError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body: Value = response.json().await.unwrap_or_default();
        let message = body["error_description"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .unwrap_or_default()
            .to_string();
        error!("authority request failed: {status} {message}");
        Err(AuthorityError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn put_for_redirect<T: Serialize + Sync>(
        &self,
        endpoint: &str,
        challenge: &str,
        body: &T,
    ) -> Result<String, AuthorityError> {
        let url = self.endpoint_url(endpoint, challenge);
        let response = self.client.put(url).json(body).send().await?;
        let redirect: RedirectResponse = Self::check(response).await?.json().await?;
        if redirect.redirect_to.is_empty() {
            return Err(AuthorityError::MissingRedirect);
        }
        Ok(redirect.redirect_to)
    }
}

#[async_trait]
impl LoginAuthority for HydraClient {
    #[instrument(skip(self))]
    async fn fetch_login(&self, challenge: &str) -> Result<LoginContext, AuthorityError> {
        let url = self.endpoint_url(&self.endpoints.login, challenge);
        let response = self.client.get(url).send().await?;
        let context: LoginContext = Self::check(response).await?.json().await?;
        debug!(skip = context.skip, "login request fetched");
        Ok(context)
    }

    #[instrument(skip(self, accept), fields(subject = %accept.subject))]
    async fn accept_login(
        &self,
        challenge: &str,
        accept: &AcceptLogin,
    ) -> Result<String, AuthorityError> {
        self.put_for_redirect(&self.endpoints.login_accept, challenge, accept)
            .await
    }

    #[instrument(skip(self, reject))]
    async fn reject_login(
        &self,
        challenge: &str,
        reject: &RejectLogin,
    ) -> Result<String, AuthorityError> {
        self.put_for_redirect(&self.endpoints.login_reject, challenge, reject)
            .await
    }
}

#[async_trait]
impl TokenIntrospector for HydraClient {
    #[instrument(skip_all)]
    async fn introspect(&self, token: &str) -> Result<Introspection, AuthorityError> {
        let url = self.admin_endpoint(&self.endpoints.introspect);
        let response = self
            .client
            .post(url)
            .form(&[("token", token)])
            .send()
            .await?;
        let introspection: Introspection = Self::check(response).await?.json().await?;
        debug!(active = introspection.active, "token introspected");
        Ok(introspection)
    }
}
