//! Authentication material.
//!
//! [`Credentials`] covers the two basic-auth forms the main API accepts;
//! [`ChatCredentials`] is the client-credentials pair used only to mint chat
//! bearer tokens. Both are immutable for the lifetime of the client.

use std::fmt;

use reqwest::RequestBuilder;

/// Basic-auth credentials for the main API.
#[derive(Clone)]
pub enum Credentials {
    /// Email and password.
    EmailPassword {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Email and API token. Authenticates as the `{email}/token` basic user.
    EmailToken {
        /// Account email.
        email: String,
        /// API token.
        token: String,
    },
}

impl Credentials {
    /// Email/password credentials.
    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::EmailPassword { email: email.into(), password: password.into() }
    }

    /// Email/API-token credentials.
    pub fn email_token(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self::EmailToken { email: email.into(), token: token.into() }
    }

    /// Attach the authorization header for this credential form.
    pub(crate) fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::EmailPassword { email, password } => builder.basic_auth(email, Some(password)),
            Self::EmailToken { email, token } => {
                builder.basic_auth(format!("{email}/token"), Some(token))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Self::EmailToken { email, .. } => f
                .debug_struct("EmailToken")
                .field("email", email)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// OAuth client-credentials pair for the chat subsystem.
///
/// The corresponding API client must be configured as a confidential client;
/// public clients cannot use the client-credentials grant.
#[derive(Clone)]
pub struct ChatCredentials {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

impl ChatCredentials {
    /// Create a new chat credential pair.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }
}

impl fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
