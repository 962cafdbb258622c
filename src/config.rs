//! CMS configuration
//!
//! Construction-time settings for a [`crate::service::Cms`] instance. All
//! values are plain data passed in by the embedding application; the core
//! never reads ambient or global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pages::SiteId;

/// Settings consumed by the CMS core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsConfig {
	/// Language assigned to titles when the caller does not name one and the
	/// site has no language list of its own.
	pub default_language: String,

	/// Preferred languages per site; the first entry is the site default.
	pub site_languages: HashMap<SiteId, Vec<String>>,

	/// When disabled, every publish takes effect immediately and moderator
	/// assignments are ignored.
	pub moderation_enabled: bool,

	/// Grant the creating user full permissions on each page they create.
	/// Without this, a freshly created tree is immutable for everyone until
	/// the embedding application seeds grants itself.
	pub auto_grant_creator: bool,
}

impl Default for CmsConfig {
	fn default() -> Self {
		Self {
			default_language: "en".to_string(),
			site_languages: HashMap::new(),
			moderation_enabled: true,
			auto_grant_creator: true,
		}
	}
}

impl CmsConfig {
	/// Default language for a site, falling back to [`CmsConfig::default_language`].
	pub fn language_for(&self, site: SiteId) -> &str {
		self.site_languages
			.get(&site)
			.and_then(|langs| langs.first())
			.map(String::as_str)
			.unwrap_or(&self.default_language)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use uuid::Uuid;

	#[test]
	fn default_language_fallback() {
		let config = CmsConfig::default();
		assert_eq!(config.language_for(Uuid::new_v4()), "en");
	}

	#[test]
	fn site_language_overrides_default() {
		let site = Uuid::new_v4();
		let mut config = CmsConfig::default();
		config
			.site_languages
			.insert(site, vec!["de".to_string(), "en".to_string()]);

		assert_eq!(config.language_for(site), "de");
		assert_eq!(config.language_for(Uuid::new_v4()), "en");
	}
}
