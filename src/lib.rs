//! # CMS Core
//!
//! The page-tree engine for a content management system: a hierarchically
//! organized tree of pages in which every page exists as a mutable *draft*
//! with an optional published *public* mirror, guarded by a moderation
//! workflow and fine-grained, hierarchy-aware permissions.
//!
//! ## Features
//!
//! - **Hierarchical Page Tree**: parent-child page relationships with
//!   deterministic sibling ordering and derived depth
//! - **Draft/Public Publishing**: every page is edited as a draft and
//!   published into a structural mirror; the public tree only ever contains
//!   explicitly published pages
//! - **Moderation Workflow**: per-page moderator assignments with depth
//!   masks; publishes under a moderated ancestor are held pending until all
//!   required approvals accumulate
//! - **Scoped Permissions**: per-page grants with ancestor scopes resolved
//!   nearest-ancestor-wins, default deny
//! - **Localized Titles**: one title record per page and language, with slug
//!   uniqueness enforced among sibling drafts
//!
//! ## Architecture
//!
//! ```text
//! cms-core
//! ├── pages       - page records, tree store, draft/public forests
//! ├── titles      - per-language title records, slug handling
//! ├── permissions - scoped grants, nearest-ancestor-wins resolution
//! ├── moderation  - moderator assignments, approval state machine
//! ├── publisher   - publish/unpublish protocol over the page store
//! ├── service     - the `Cms` facade tying the subsystems together
//! └── config      - languages, moderation and permission toggles
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cms_core::prelude::*;
//! use uuid::Uuid;
//!
//! let cms = Cms::new(CmsConfig::default());
//! let editor = Uuid::new_v4();
//! let site = Uuid::new_v4();
//!
//! // Create a root page and a child, then publish both.
//! let home = cms.create_page(NewPage::new(site, "Home"), editor).await?;
//! let mut about = NewPage::new(site, "About");
//! about.target = Some(home.id);
//! let about = cms.create_page(about, editor).await?;
//!
//! cms.publish(home.id, editor).await?;
//! cms.publish(about.id, editor).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

// Module declarations
pub mod config;
pub mod moderation;
pub mod pages;
pub mod permissions;
pub mod publisher;
pub mod service;
pub mod titles;

// Prelude for convenient imports
pub mod prelude {
	//! Convenient re-exports of commonly used items

	// Pages
	pub use crate::pages::{Page, PageId, PageNode, PageStore, PageTree, SiteId, TreePosition, UserId};

	// Titles
	pub use crate::titles::{Title, slugify};

	// Permissions
	pub use crate::permissions::{
		GrantScope, PagePermission, PermissionChecker, PermissionFlag, PermissionGrants, Principal,
	};

	// Moderation
	pub use crate::moderation::{
		MODERATE_CHILDREN, MODERATE_DESCENDANTS, MODERATE_PAGE, ModerationEngine, ModerationState,
		ModerationStatus, PageModerator,
	};

	// Publishing
	pub use crate::publisher::PublishOutcome;

	// Service
	pub use crate::service::{Cms, NewPage};

	// Config
	pub use crate::config::CmsConfig;
}

/// CMS error types
pub mod error {
	use thiserror::Error;

	use crate::pages::PageId;

	/// CMS-related errors
	#[derive(Error, Debug)]
	pub enum CmsError {
		/// Page not found
		#[error("Page not found: {0}")]
		PageNotFound(PageId),

		/// No title stored for the page in the requested language
		#[error("Title not found for page {page} in language '{language}'")]
		TitleNotFound {
			/// Page the lookup targeted
			page: PageId,
			/// Requested language code
			language: String,
		},

		/// Permission denied
		#[error("Permission denied: {0}")]
		PermissionDenied(String),

		/// Attempted move would make a page its own ancestor
		#[error("Moving page {page} relative to {target} would create a cycle")]
		Cycle {
			/// Page being moved
			page: PageId,
			/// Move target inside the page's own subtree
			target: PageId,
		},

		/// Duplicate slug among sibling drafts
		#[error("Slug '{slug}' is already in use under this parent")]
		SlugConflict {
			/// The conflicting slug
			slug: String,
		},

		/// Slug is empty or not expressible as a URL path segment
		#[error("Invalid slug: '{0}'")]
		InvalidSlug(String),

		/// Tree invariant violation detected before an operation
		#[error("Structural inconsistency: {0}")]
		StructuralInconsistency(String),

		/// The page's parent has no public mirror yet
		#[error("Cannot publish page {0}: its parent has no public mirror")]
		ParentNotPublished(PageId),

		/// The page has no public mirror
		#[error("Page {0} is not published")]
		NotPublished(PageId),

		/// No pending moderation state for the page
		#[error("No pending moderation for page {0}")]
		NoPendingModeration(PageId),
	}

	/// Result type for CMS operations
	pub type CmsResult<T> = Result<T, CmsError>;
}
