//! The sign-in flow
//!
//! ```text
//! Start -> AwaitingAuthorization -> AwaitingCallback -> Authenticated
//!                                                    \-> Failed
//! ```
//!
//! `begin` takes a diaspora id and produces the pod's authorization URL.
//! `complete` handles the pod's callback: it exchanges the code, identifies
//! the user on the pod and stores the token on their account. Neither returns
//! an error to the handler; failures become a message that is shown to the
//! user through the redirect.

use super::models::CallbackParams;
use crate::errors::{bounded, Error};
use crate::identity::{DiasporaId, IdentityError};
use crate::pod::{PodError, ResourceServer};
use crate::state::AppState;
use crate::store::{AccessToken, Account, NewAccessToken, NewAccount, StoreError};
use log::{debug, info, warn};
use std::fmt;
use url::Url;

/// Query parameter carrying a failure message back to the application
pub const ERROR_PARAM: &str = "diaspora-client-error";
/// Longest provider message kept from a failed exchange
pub const MAX_PROVIDER_MESSAGE: usize = 2000;
/// Longest message put in a query string
pub const MAX_QUERY_MESSAGE: usize = 800;

/// OAuth error code pods answer with when our registration is stale
const INVALID_CLIENT: &str = "invalid_client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Start,
    AwaitingAuthorization,
    AwaitingCallback,
    Authenticated,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Start => "start",
            FlowState::AwaitingAuthorization => "awaiting authorization",
            FlowState::AwaitingCallback => "awaiting callback",
            FlowState::Authenticated => "authenticated",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(from: FlowState, to: FlowState, diaspora_id: Option<&str>) {
    debug!(
        "Sign-in for {}: {} -> {}",
        diaspora_id.unwrap_or("<unknown>"),
        from,
        to
    );
}

/// How a callback ended
#[derive(Debug)]
pub enum CallbackOutcome {
    Authenticated {
        account: Account,
        token: AccessToken,
        /// The account is not yet the session principal
        new_principal: bool,
    },
    /// The pod rejected our client registration; it has been renewed and the
    /// flow must start again for this id
    Reauthorize { diaspora_id: String },
    Failed { message: String },
}

impl CallbackOutcome {
    pub fn state(&self) -> FlowState {
        match self {
            CallbackOutcome::Authenticated { .. } => FlowState::Authenticated,
            CallbackOutcome::Reauthorize { .. } => FlowState::Start,
            CallbackOutcome::Failed { .. } => FlowState::Failed,
        }
    }
}

pub struct AuthFlow<'a> {
    state: &'a AppState,
}

impl<'a> AuthFlow<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Authorization URL to send the user to
    pub async fn begin(&self, diaspora_id: Option<&str>) -> Result<Url, Error> {
        let id = DiasporaId::parse(diaspora_id.ok_or(IdentityError::Missing)?)?;
        let pod = self.state.pods.resolve(id.host()).await?;
        let redirect_uri = self.redirect_uri(&id)?;
        let scope = self.state.permissions.to_scope_string();

        let url = pod.authorize_url(redirect_uri.as_str(), id.uid(), Some(&scope))?;
        transition(
            FlowState::Start,
            FlowState::AwaitingAuthorization,
            Some(id.to_string().as_str()),
        );
        Ok(url)
    }

    /// Handle the pod's callback. `principal` is the account id of the
    /// current session, if any.
    pub async fn complete(
        &self,
        params: &CallbackParams,
        principal: Option<&str>,
    ) -> CallbackOutcome {
        let diaspora_id = params.diaspora_id.as_deref();
        transition(
            FlowState::AwaitingAuthorization,
            FlowState::AwaitingCallback,
            diaspora_id,
        );

        let outcome = match params.error.as_deref() {
            Some(INVALID_CLIENT) => self.reregister(diaspora_id).await,
            Some(error) => {
                let message = params
                    .error_description
                    .as_deref()
                    .filter(|description| !description.is_empty())
                    .unwrap_or(error);
                info!("Pod refused authorization: {}", error);
                CallbackOutcome::Failed {
                    message: bounded(message, MAX_PROVIDER_MESSAGE),
                }
            }
            None => match params.code.as_deref().filter(|code| !code.is_empty()) {
                None => CallbackOutcome::Failed {
                    message: "Missing authorization code".to_string(),
                },
                Some(code) => match self.authenticate(code, diaspora_id, principal).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!("Sign-in failed: {}", err);
                        CallbackOutcome::Failed {
                            message: failure_message(&err),
                        }
                    }
                },
            },
        };

        transition(FlowState::AwaitingCallback, outcome.state(), diaspora_id);
        outcome
    }

    async fn reregister(&self, diaspora_id: Option<&str>) -> CallbackOutcome {
        let registered = async {
            let id = DiasporaId::parse(diaspora_id.ok_or(IdentityError::Missing)?)?;
            warn!(
                "Pod {} rejected our client registration, registering again",
                id.host()
            );
            self.state.pods.register(id.host()).await?;
            Ok::<_, Error>(id)
        };
        match registered.await {
            Ok(id) => CallbackOutcome::Reauthorize {
                diaspora_id: id.to_string(),
            },
            Err(err) => CallbackOutcome::Failed {
                message: failure_message(&err),
            },
        }
    }

    async fn authenticate(
        &self,
        code: &str,
        diaspora_id: Option<&str>,
        principal: Option<&str>,
    ) -> Result<CallbackOutcome, Error> {
        let id = DiasporaId::parse(diaspora_id.ok_or(IdentityError::Missing)?)?;
        let pod = self.state.pods.resolve(id.host()).await?;
        let redirect_uri = self.redirect_uri(&id)?;

        let grant = self
            .state
            .pod_client
            .exchange_code(&pod, code, redirect_uri.as_str())
            .await?;
        let uid = self
            .state
            .pod_client
            .fetch_uid(&pod, &grant.access_token)
            .await?;
        let remote_id = format!("{}@{}", uid, pod.authority()?);

        let (account, new_principal) = self.account_for(principal, &remote_id).await?;
        let token = self
            .state
            .tokens
            .replace(NewAccessToken {
                account_id: account.id.clone(),
                pod_host: pod.host.clone(),
                uid,
                token: grant.access_token,
                refresh_token: grant.refresh_token,
                expires_at: grant.expires_at,
            })
            .await?;

        info!("{} signed in as account {}", remote_id, account.id);
        Ok(CallbackOutcome::Authenticated {
            account,
            token,
            new_principal,
        })
    }

    /// The session's account if it still exists, otherwise the account of
    /// `diaspora_id`, created when missing
    async fn account_for(
        &self,
        principal: Option<&str>,
        diaspora_id: &str,
    ) -> Result<(Account, bool), Error> {
        let accounts = &self.state.accounts;
        if let Some(account_id) = principal {
            if let Some(account) = accounts.find(account_id).await? {
                return Ok((account, false));
            }
        }

        if let Some(account) = accounts.find_by_diaspora_id(diaspora_id).await? {
            return Ok((account, true));
        }
        let new_account = NewAccount {
            diaspora_id: diaspora_id.to_string(),
        };
        match accounts.create(new_account).await {
            Ok(account) => Ok((account, true)),
            Err(StoreError::Conflict(_)) => {
                debug!("Account for {} created concurrently", diaspora_id);
                let account = accounts
                    .find_by_diaspora_id(diaspora_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("Account for {diaspora_id}")))?;
                Ok((account, true))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Callback URL sent at authorization and again at code exchange
    pub fn redirect_uri(&self, id: &DiasporaId) -> Result<Url, Error> {
        let settings = &self.state.settings;
        let mut url = Url::parse(&settings.callback_url())
            .map_err(|e| Error::Config(format!("Invalid public_url: {e}")))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("diaspora_id", &id.to_string());
        Ok(url)
    }
}

/// Message shown to the user for a failed exchange
pub fn failure_message(err: &Error) -> String {
    match err {
        Error::Pod(PodError::AccessDenied) => "Access denied".to_string(),
        Error::Pod(PodError::Provider { body, .. }) if !body.trim().is_empty() => {
            bounded(body, MAX_PROVIDER_MESSAGE)
        }
        other => bounded(&other.to_string(), MAX_PROVIDER_MESSAGE),
    }
}

/// `target` with the failure message appended as a query parameter
pub fn with_error_param(target: &str, message: &str) -> String {
    let encoded: String =
        url::form_urlencoded::byte_serialize(bounded(message, MAX_QUERY_MESSAGE).as_bytes())
            .collect();
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}{ERROR_PARAM}={encoded}")
}

/// Start path of the flow for `diaspora_id`
pub fn restart_path(mount_path: &str, diaspora_id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(diaspora_id.as_bytes()).collect();
    format!("{mount_path}?diaspora_id={encoded}")
}

/// Redirect target for a failed start: the page the user came from when it
/// belongs to this application, the post-login path otherwise
pub fn back_target(referer: Option<&str>, public_url: &str, fallback: &str) -> String {
    let same_origin = |referer: &str| -> Option<String> {
        let referer = Url::parse(referer).ok()?;
        let public = Url::parse(public_url).ok()?;
        (referer.origin() == public.origin()).then(|| {
            let mut target = referer.path().to_string();
            if let Some(query) = referer.query() {
                target.push('?');
                target.push_str(query);
            }
            target
        })
    };
    referer
        .and_then(same_origin)
        .unwrap_or_else(|| fallback.to_string())
}
