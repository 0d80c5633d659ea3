//! Connection configuration for HTTP mode.
//!
//! Accepts `libsql:`, `http:` and `https:` URLs with the optional `authToken`
//! and `tls` query parameters and resolves them into an [`Endpoint`].

use reqwest::Url;

use crate::LibsqlError;

/// User-facing connection settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub auth_token: Option<String>,
    /// Forces TLS on or off for `libsql:` URLs.
    pub tls: Option<bool>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Validated HTTP endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Origin (plus optional path prefix) without trailing slash.
    pub base_url: String,
    pub auth_token: Option<String>,
    pub tls: bool,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Reads `LIBSQL_URL` and the optional `LIBSQL_AUTH_TOKEN`.
    ///
    /// **Not available on `wasm32` targets**.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Result<Self, LibsqlError> {
        let url = std::env::var("LIBSQL_URL").map_err(|_| {
            LibsqlError::UrlInvalid("missing LIBSQL_URL environment variable".to_owned())
        })?;
        if url.trim().is_empty() {
            return Err(LibsqlError::UrlInvalid(
                "LIBSQL_URL is set but empty".to_owned(),
            ));
        }
        let auth_token = std::env::var("LIBSQL_AUTH_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Ok(Self {
            url,
            auth_token,
            tls: None,
        })
    }

    /// Validates the URL and resolves the HTTP endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, LibsqlError> {
        let url = Url::parse(self.url.trim()).map_err(|err| {
            LibsqlError::UrlInvalid(format!("the URL is not in a valid format: {err}"))
        })?;

        if let Some(fragment) = url.fragment() {
            return Err(LibsqlError::UrlInvalid(format!(
                "URL fragments are not supported: \"#{fragment}\""
            )));
        }

        let mut auth_token = self.auth_token.clone();
        let mut tls = self.tls;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "authToken" => {
                    auth_token = (!value.is_empty()).then(|| value.into_owned());
                }
                "tls" => {
                    tls = Some(match value.as_ref() {
                        "0" => false,
                        "1" => true,
                        other => {
                            return Err(LibsqlError::UrlInvalid(format!(
                                "unknown value for the \"tls\" query argument: \"{other}\", supported values are \"0\" and \"1\""
                            )))
                        }
                    });
                }
                other => {
                    return Err(LibsqlError::UrlParamNotSupported(format!(
                        "unknown URL query parameter \"{other}\""
                    )))
                }
            }
        }

        let scheme = match url.scheme().to_ascii_lowercase().as_str() {
            "libsql" => {
                if tls == Some(false) {
                    if url.port().is_none() {
                        return Err(LibsqlError::UrlInvalid(
                            "a \"libsql:\" URL with ?tls=0 must specify an explicit port"
                                .to_owned(),
                        ));
                    }
                    "http"
                } else {
                    "https"
                }
            }
            "http" => {
                if tls == Some(true) {
                    return Err(LibsqlError::UrlInvalid(
                        "a \"http:\" URL cannot opt into TLS by using ?tls=1".to_owned(),
                    ));
                }
                "http"
            }
            "https" => {
                if tls == Some(false) {
                    return Err(LibsqlError::UrlInvalid(
                        "a \"https:\" URL cannot opt out of TLS by using ?tls=0".to_owned(),
                    ));
                }
                "https"
            }
            other => {
                return Err(LibsqlError::UrlSchemeNotSupported(format!(
                    "the HTTP client supports only \"libsql:\", \"https:\" and \"http:\" URLs, got \"{other}:\""
                )))
            }
        };

        let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(|| {
            LibsqlError::UrlInvalid(format!(
                "URL with scheme {scheme}: requires authority (the \"//\" part)"
            ))
        })?;

        let mut base_url = format!("{scheme}://");
        if !url.username().is_empty() {
            base_url.push_str(url.username());
            if let Some(password) = url.password() {
                base_url.push(':');
                base_url.push_str(password);
            }
            base_url.push('@');
        }
        base_url.push_str(host);
        if let Some(port) = url.port() {
            base_url.push_str(&format!(":{port}"));
        }
        base_url.push_str(url.path().trim_end_matches('/'));

        Ok(Endpoint {
            base_url,
            auth_token,
            tls: scheme == "https",
        })
    }
}
