// RidiSync - RIDI Books Library Export
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! RIDI account authentication
//!
//! # Manual Login
//! 1. Open [`login_url`] in a browser and sign in
//! 2. The browser lands on the device API and shows a JSON device list
//! 3. Paste that JSON into [`parse_device_list`] and pick the device the
//!    books were downloaded with
//!
//! # Automatic Login
//! Uses the login state of the installed RIDI app (see
//! [`crate::crypto::vault`]):
//! 1. Exchange the app's refresh token at the OAuth token endpoint
//! 2. Fetch the account's devices with the new access token
//! 3. Select the device whose id matches the app's device id
//!
//! The OAuth client credentials are not bundled; they are read from
//! `RIDI_OAUTH_CLIENT_ID` and `RIDI_OAUTH_CLIENT_SECRET`.

use crate::crypto::vault::VaultOutcome;
use crate::error::{RidiError, Result};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Browser login page
pub const LOGIN_URL: &str = "https://ridibooks.com/account/login";

/// Device list endpoint (also the post-login redirect target)
pub const USER_DEVICES_API: &str = "https://account.ridibooks.com/api/user-devices/app";

/// OAuth token endpoint
pub const OAUTH_TOKEN_API: &str = "https://account.ridibooks.com/oauth2/token";

/// User agent of the desktop app
pub const RIDI_USER_AGENT: &str = "Ridibooks/0.11.7 (Windows NT 10.0; Win64; x64)";

pub const CLIENT_ID_ENV: &str = "RIDI_OAUTH_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "RIDI_OAUTH_CLIENT_SECRET";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A device registered to a RIDI account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDevice {
    pub id: i64,
    pub user_idx: i64,
    pub device_id: String,
    #[serde(default)]
    pub device_code: String,
    #[serde(default)]
    pub device_ver: Option<String>,
    #[serde(default)]
    pub device_nick: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_used: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_modified: String,
}

#[derive(Debug, Deserialize)]
struct UserDevices {
    #[serde(default)]
    user_devices: Vec<UserDevice>,
}

/// OAuth client registration used for token refresh
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    /// Read from `RIDI_OAUTH_CLIENT_ID` / `RIDI_OAUTH_CLIENT_SECRET`
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Option<Self> {
        let client_id = lookup(CLIENT_ID_ENV).filter(|v| !v.is_empty())?;
        let client_secret = lookup(CLIENT_SECRET_ENV).filter(|v| !v.is_empty())?;
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    device_id: &'a str,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<TokenUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenUser {
    pub idx: i64,
    pub id: String,
}

/// Device and account name found by automatic login
#[derive(Debug, Clone)]
pub struct AutoLoginResult {
    pub device: UserDevice,
    pub username: String,
}

/// Browser login URL that redirects to the device list afterwards
pub fn login_url() -> Result<String> {
    let state = serde_json::json!({ "return_url": USER_DEVICES_API }).to_string();
    let url = Url::parse_with_params(LOGIN_URL, &[("state", state)])
        .map_err(|e| RidiError::ConfigurationError(format!("Invalid login URL: {}", e)))?;
    Ok(url.to_string())
}

/// Parse a device list pasted from the browser
///
/// Anything before the first `{` (for example a viewer's "Raw Data" header)
/// is ignored. A document without `user_devices` is an empty list.
///
/// # Errors
/// - InvalidApiResponse if the text is not JSON
pub fn parse_device_list(input: &str) -> Result<Vec<UserDevice>> {
    let cleaned = match input.find('{') {
        Some(start) => &input[start..],
        None => input,
    };
    let devices: UserDevices = serde_json::from_str(cleaned)
        .map_err(|e| RidiError::InvalidApiResponse(format!("Invalid device list: {}", e)))?;
    Ok(devices.user_devices)
}

/// The device with this device id
pub fn find_matching_device(devices: Vec<UserDevice>, device_id: &str) -> Option<UserDevice> {
    devices.into_iter().find(|d| d.device_id == device_id)
}

/// HTTP client for the RIDI account API
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
}

impl AuthClient {
    /// # Errors
    /// - ReqwestError if the TLS backend cannot be initialized
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Exchange a refresh token for an access token
    ///
    /// # Errors
    /// - NetworkError if the request fails to send
    /// - AuthenticationFailed on a non-success status
    /// - InvalidApiResponse if the body is not a token response
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        device_id: &str,
        credentials: &OAuthCredentials,
    ) -> Result<TokenResponse> {
        let body = RefreshTokenRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
            device_id,
        };

        let response = self
            .client
            .post(OAUTH_TOKEN_API)
            .header(USER_AGENT, RIDI_USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RidiError::network_error(format!("Token refresh request failed: {}", e), true))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(RidiError::AuthenticationFailed(format!(
                "Token refresh failed (status {}): {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RidiError::InvalidApiResponse(format!("Failed to parse token response: {}", e)))
    }

    /// Devices of the account behind `access_token`
    ///
    /// A non-success status yields an empty list.
    ///
    /// # Errors
    /// - NetworkError if the request fails to send
    /// - InvalidApiResponse if the body is not a device list
    pub async fn fetch_user_devices(&self, access_token: &str) -> Result<Vec<UserDevice>> {
        let response = self
            .client
            .get(USER_DEVICES_API)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(USER_AGENT, RIDI_USER_AGENT)
            .send()
            .await
            .map_err(|e| RidiError::network_error(format!("Device list request failed: {}", e), true))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "device list request rejected");
            return Ok(Vec::new());
        }

        let text = response.text().await?;
        parse_device_list(&text)
    }

    /// Log in with the installed RIDI app's state
    ///
    /// `None` whenever a step is missing or fails; the caller falls back to
    /// manual login.
    pub async fn auto_login(
        &self,
        vault: Option<&VaultOutcome>,
        oauth: Option<&OAuthCredentials>,
    ) -> Option<AutoLoginResult> {
        let creds = vault?.credentials()?;
        let oauth = oauth?;

        let result: Result<Vec<UserDevice>> = async {
            let token = self
                .refresh_access_token(&creds.refresh_token, &creds.device_id, oauth)
                .await?;
            self.fetch_user_devices(&token.access_token).await
        }
        .await;

        match result {
            Ok(devices) => {
                let device = find_matching_device(devices, &creds.device_id)?;
                Some(AutoLoginResult {
                    device,
                    username: creds.username.clone(),
                })
            }
            Err(e) => {
                debug!(error = %e, "automatic login failed");
                None
            }
        }
    }
}
