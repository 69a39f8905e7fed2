//! CLI command implementations.

pub mod config;
pub mod demo;
pub mod watch;

use anyhow::{Context as _, Result};
use tenantsync_fetch::HttpBackend;
use tenantsync_store::Settings;

/// Builds the HTTP backend from the saved settings and a bearer token.
pub fn http_backend(settings: &Settings, token: Option<&str>) -> Result<HttpBackend> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .context("--backend http needs --token or TENANTSYNC_TOKEN")?;
    HttpBackend::new(settings.http_config(token)).context("invalid HTTP backend settings")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantsync_store::Session;

    #[test]
    fn test_http_backend_requires_token() {
        let settings = Settings::default();
        assert!(http_backend(&settings, None).is_err());
        assert!(http_backend(&settings, Some("  ")).is_err());
    }

    #[test]
    fn test_http_backend_rejects_bad_base() {
        let settings = Settings {
            api_base: "not a url".into(),
            ..Settings::default()
        };
        assert!(http_backend(&settings, Some("token")).is_err());
    }

    #[tokio::test]
    async fn test_http_session_builds_without_network() {
        let settings = Settings::default();
        let backend = http_backend(&settings, Some("token")).unwrap();
        let session = Session::new(backend, &settings);

        // Nothing is fetched until a pool is asked to.
        let projects = session.hub().projects().unwrap();
        assert!(!projects.get().usable());
        assert_eq!(projects.key(), "projects:global");
        session.shutdown();
    }
}
