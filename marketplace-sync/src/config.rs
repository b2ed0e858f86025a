//! Sync layer configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `MARKETPLACE_*` environment variables and an
//! optional config file. Numeric limits carry declared defaults so loading
//! succeeds with nothing configured; the remaining fields are optional and
//! their accessors supply defaults.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{AvatarConfig, CatalogueConfig, EnrichmentConfig, UserId};

const DEFAULT_API_BASE_URL: &str = "https://media.mw.metropolia.fi/wbma/";
const DEFAULT_AVATAR_URL: &str = "asset://avatar-default.png";

/// Errors raised while turning settings into runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A configured URL could not be parsed.
    #[error("invalid {field}: {message}")]
    InvalidUrl {
        /// Setting name.
        field: &'static str,
        /// Parser message.
        message: String,
    },
}

/// Configuration for the marketplace sync layer.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "MARKETPLACE")]
pub struct SyncSettings {
    /// Media API base URL.
    pub api_base_url: Option<String>,
    /// Prefix for uploaded files; defaults to `<api_base_url>uploads/`.
    pub uploads_url: Option<String>,
    /// Application tag scoping the catalogue and categories.
    pub app_tag: Option<String>,
    /// Per-request timeout in seconds.
    #[ortho_config(default = 10)]
    pub request_timeout_secs: u64,
    /// Listings whose secondary fetches may run at once.
    #[ortho_config(default = 8)]
    pub max_concurrent_fetches: usize,
    /// Avatar shown for users who never uploaded one.
    pub default_avatar_url: Option<String>,
    /// Signed-in user whose favourite flags are loaded.
    pub user_id: Option<u64>,
}

impl SyncSettings {
    /// API base URL with a guaranteed trailing slash, so relative joins keep
    /// the final path segment.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidUrl`] when the value does not parse.
    pub fn api_base_url(&self) -> Result<Url, SettingsError> {
        let raw = non_blank(self.api_base_url.as_deref()).unwrap_or(DEFAULT_API_BASE_URL);
        parse_directory_url("api_base_url", raw)
    }

    /// Prefix prepended to uploaded file names.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidUrl`] when either URL does not parse.
    pub fn uploads_url(&self) -> Result<String, SettingsError> {
        match non_blank(self.uploads_url.as_deref()) {
            Some(raw) => parse_directory_url("uploads_url", raw).map(String::from),
            None => self
                .api_base_url()?
                .join("uploads/")
                .map(String::from)
                .map_err(|error| SettingsError::InvalidUrl {
                    field: "uploads_url",
                    message: error.to_string(),
                }),
        }
    }

    /// Configured application tag, ignoring blank values.
    pub fn app_tag(&self) -> Option<&str> {
        non_blank(self.app_tag.as_deref())
    }

    /// Per-request timeout, at least one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Fan-out bound, at least one.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches.max(1)
    }

    /// Default avatar URL.
    pub fn default_avatar_url(&self) -> &str {
        non_blank(self.default_avatar_url.as_deref()).unwrap_or(DEFAULT_AVATAR_URL)
    }

    /// Signed-in user, if any.
    pub fn current_user(&self) -> Option<UserId> {
        self.user_id.map(UserId::new)
    }

    /// Facade configuration derived from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidUrl`] when a URL setting is invalid.
    pub fn catalogue_config(&self) -> Result<CatalogueConfig, SettingsError> {
        Ok(CatalogueConfig {
            enrichment: EnrichmentConfig {
                max_concurrent_fetches: self.max_concurrent_fetches(),
                app_tag: self.app_tag().map(str::to_owned),
            },
            avatars: AvatarConfig {
                uploads_url: self.uploads_url()?,
                default_avatar_url: self.default_avatar_url().to_owned(),
            },
            current_user: self.current_user(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_directory_url(field: &'static str, raw: &str) -> Result<Url, SettingsError> {
    let mut url = Url::parse(raw).map_err(|error| SettingsError::InvalidUrl {
        field,
        message: error.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    //! Unit tests for sync configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const KEYS: [&str; 7] = [
        "MARKETPLACE_API_BASE_URL",
        "MARKETPLACE_UPLOADS_URL",
        "MARKETPLACE_APP_TAG",
        "MARKETPLACE_REQUEST_TIMEOUT_SECS",
        "MARKETPLACE_MAX_CONCURRENT_FETCHES",
        "MARKETPLACE_DEFAULT_AVATAR_URL",
        "MARKETPLACE_USER_ID",
    ];

    fn load_from_empty_args() -> SyncSettings {
        SyncSettings::load_from_iter([OsString::from("catalogue-snapshot")])
            .expect("config should load")
    }

    fn cleared_env() -> Vec<(&'static str, Option<String>)> {
        KEYS.iter().map(|key| (*key, None::<String>)).collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(cleared_env());

        let settings = load_from_empty_args();
        assert_eq!(
            settings.api_base_url().expect("default parses").as_str(),
            DEFAULT_API_BASE_URL
        );
        assert_eq!(
            settings.uploads_url().expect("derived"),
            "https://media.mw.metropolia.fi/wbma/uploads/"
        );
        assert_eq!(settings.app_tag(), None);
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_concurrent_fetches(), 8);
        assert_eq!(settings.default_avatar_url(), DEFAULT_AVATAR_URL);
        assert_eq!(settings.current_user(), None);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let mut env = cleared_env();
        env.extend([
            ("MARKETPLACE_API_BASE_URL", Some("http://localhost:3000/api".to_owned())),
            ("MARKETPLACE_APP_TAG", Some("kirppis".to_owned())),
            ("MARKETPLACE_REQUEST_TIMEOUT_SECS", Some("3".to_owned())),
            ("MARKETPLACE_MAX_CONCURRENT_FETCHES", Some("2".to_owned())),
            ("MARKETPLACE_USER_ID", Some("42".to_owned())),
        ]);
        let _guard = lock_env(env);

        let settings = load_from_empty_args();
        let config = settings.catalogue_config().expect("config builds");
        assert_eq!(
            settings.api_base_url().expect("parses").as_str(),
            "http://localhost:3000/api/"
        );
        assert_eq!(config.avatars.uploads_url, "http://localhost:3000/api/uploads/");
        assert_eq!(config.enrichment.app_tag.as_deref(), Some("kirppis"));
        assert_eq!(config.enrichment.max_concurrent_fetches, 2);
        assert_eq!(config.current_user, Some(UserId::new(42)));
        assert_eq!(settings.request_timeout(), Duration::from_secs(3));
    }

    #[rstest]
    #[case::zero_timeout(0, 8, Duration::from_secs(1), 8)]
    #[case::zero_fan_out(10, 0, Duration::from_secs(10), 1)]
    fn lower_bounds_are_enforced(
        #[case] timeout: u64,
        #[case] fan_out: usize,
        #[case] expected_timeout: Duration,
        #[case] expected_fan_out: usize,
    ) {
        let settings = SyncSettings {
            api_base_url: None,
            uploads_url: None,
            app_tag: Some("   ".to_owned()),
            request_timeout_secs: timeout,
            max_concurrent_fetches: fan_out,
            default_avatar_url: None,
            user_id: None,
        };
        assert_eq!(settings.request_timeout(), expected_timeout);
        assert_eq!(settings.max_concurrent_fetches(), expected_fan_out);
        assert_eq!(settings.app_tag(), None, "blank tag is ignored");
    }

    #[rstest]
    fn loads_with_nothing_configured() {
        let _guard = lock_env(cleared_env());

        let settings = SyncSettings::load_from_iter([OsString::from("catalogue-snapshot")])
            .expect("an empty configuration is valid");
        assert_eq!(settings.request_timeout_secs, 10);
        assert_eq!(settings.max_concurrent_fetches, 8);
        assert!(settings.api_base_url.is_none());
        assert!(settings.user_id.is_none());
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let settings = SyncSettings {
            api_base_url: Some("not a url".to_owned()),
            uploads_url: None,
            app_tag: None,
            request_timeout_secs: 10,
            max_concurrent_fetches: 8,
            default_avatar_url: None,
            user_id: None,
        };
        let error = settings.catalogue_config().expect_err("invalid url");
        assert!(matches!(
            error,
            SettingsError::InvalidUrl {
                field: "api_base_url",
                ..
            }
        ));
    }
}
