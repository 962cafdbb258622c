//! Localized title records
//!
//! One [`Title`] per (page, language) pair. Titles are owned by their page:
//! created and updated through authoring operations, copied wholesale into
//! the public mirror on publish, and deleted with the page. Slug uniqueness
//! among sibling drafts is enforced by the page store, which knows the tree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pages::PageId;

/// Localized content record for one (page, language) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
	/// Owning page
	pub page: PageId,
	/// Language code, e.g. `en`
	pub language: String,
	/// Display title
	pub title: String,
	/// URL path segment
	pub slug: String,
	/// Creation time
	pub created_at: DateTime<Utc>,
	/// Last update time
	pub changed_at: DateTime<Utc>,
}

/// In-process store of title records, keyed by page
#[derive(Debug, Clone, Default)]
pub struct TitleStore {
	by_page: HashMap<PageId, Vec<Title>>,
}

impl TitleStore {
	/// Create an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Create or update the title for a (page, language) pair
	pub fn set(&mut self, page: PageId, language: &str, title: &str, slug: &str) -> Title {
		let titles = self.by_page.entry(page).or_default();
		let now = Utc::now();
		if let Some(existing) = titles.iter_mut().find(|t| t.language == language) {
			existing.title = title.to_string();
			existing.slug = slug.to_string();
			existing.changed_at = now;
			return existing.clone();
		}
		let record = Title {
			page,
			language: language.to_string(),
			title: title.to_string(),
			slug: slug.to_string(),
			created_at: now,
			changed_at: now,
		};
		titles.push(record.clone());
		record
	}

	/// Title of a page in one language
	pub fn get(&self, page: PageId, language: &str) -> Option<&Title> {
		self.by_page
			.get(&page)?
			.iter()
			.find(|t| t.language == language)
	}

	/// All titles of a page, in insertion order
	pub fn for_page(&self, page: PageId) -> &[Title] {
		self.by_page.get(&page).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Drop every title of a page
	pub fn remove_page(&mut self, page: PageId) {
		self.by_page.remove(&page);
	}

	/// Replace a page's full title set, rebinding the records to `page`
	pub(crate) fn replace_page(&mut self, page: PageId, titles: Vec<Title>) {
		let rebound = titles
			.into_iter()
			.map(|mut t| {
				t.page = page;
				t
			})
			.collect();
		self.by_page.insert(page, rebound);
	}
}

/// Convert a string to a slug (URL-friendly format)
///
/// # Examples
///
/// ```
/// use cms_core::titles::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("Hello  World"), "hello-world");
/// assert_eq!(slugify("Test 123"), "test-123");
/// assert_eq!(slugify("Special!@#Characters"), "special-characters");
/// ```
pub fn slugify(text: &str) -> String {
	text.to_lowercase()
		.chars()
		.map(|ch| match ch {
			'a'..='z' | '0'..='9' => ch,
			_ => '-',
		})
		.collect::<String>()
		.split('-')
		.filter(|s| !s.is_empty())
		.collect::<Vec<_>>()
		.join("-")
}

/// First variation of `base` for which `in_use` is false: `base` itself,
/// then `base-1`, `base-2`, …
///
/// # Examples
///
/// ```
/// use cms_core::titles::available_slug;
///
/// let taken = ["about", "about-1"];
/// let slug = available_slug("about", |s| taken.contains(&s));
/// assert_eq!(slug, "about-2");
/// ```
pub fn available_slug(base: &str, in_use: impl Fn(&str) -> bool) -> String {
	if !in_use(base) {
		return base.to_string();
	}
	let mut counter = 1u32;
	loop {
		let candidate = format!("{base}-{counter}");
		if !in_use(&candidate) {
			return candidate;
		}
		counter += 1;
	}
}
