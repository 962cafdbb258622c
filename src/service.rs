//! The CMS facade
//!
//! [`Cms`] owns every subsystem and is the operation set consumed by an
//! HTTP layer, CLI or admin UI. Each mutating operation takes the acting
//! user explicitly, authorizes it against the permission resolver using the
//! current tree shape, lets the moderation engine intercept publishes, and
//! applies the mutation inside one exclusive critical section, which
//! serializes structural changes as required for a consistent tree.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::CmsConfig;
use crate::error::{CmsError, CmsResult};
use crate::moderation::{ModerationEngine, ModerationState, ModerationStatus, PageModerator};
use crate::pages::{Page, PageId, PageStore, SiteId, TreePosition, UserId};
use crate::permissions::{
	GrantScope, GroupId, PagePermission, PermissionChecker, PermissionFlag, PermissionGrants, Principal,
};
use crate::publisher::PublishOutcome;
use crate::titles::Title;

/// Parameters for creating a draft page
#[derive(Debug, Clone)]
pub struct NewPage {
	/// Site the page belongs to
	pub site: SiteId,
	/// Title in the page's initial language
	pub title: String,
	/// Node to attach relative to; `None` creates a root page
	pub target: Option<PageId>,
	/// Where to attach relative to `target`
	pub position: TreePosition,
	/// Explicit slug; derived from the title when `None`
	pub slug: Option<String>,
	/// Language of the initial title; site default when `None`
	pub language: Option<String>,
	/// Whether the page appears in navigation menus
	pub in_navigation: bool,
}

impl NewPage {
	/// A root page with the given title and per-site defaults
	pub fn new(site: SiteId, title: impl Into<String>) -> Self {
		Self {
			site,
			title: title.into(),
			target: None,
			position: TreePosition::LastChild,
			slug: None,
			language: None,
			in_navigation: false,
		}
	}

	/// Attach under `target` as its last child, chainable
	pub fn under(mut self, target: PageId) -> Self {
		self.target = Some(target);
		self.position = TreePosition::LastChild;
		self
	}
}

struct CmsInner {
	config: CmsConfig,
	store: PageStore,
	permissions: PermissionChecker,
	moderation: ModerationEngine,
}

impl CmsInner {
	/// The page followed by its ancestors, nearest first
	fn chain(&self, page: PageId) -> CmsResult<Vec<PageId>> {
		let mut chain = vec![page];
		chain.extend(self.store.drafts().ancestors(page)?);
		Ok(chain)
	}

	fn check(&self, user: UserId, page: PageId, flag: PermissionFlag) -> CmsResult<()> {
		let chain = self.chain(page)?;
		if self.permissions.is_allowed(user, &chain, flag) {
			Ok(())
		} else {
			Err(CmsError::PermissionDenied(format!(
				"user {user} lacks {flag:?} on page {page}"
			)))
		}
	}
}

/// The CMS core service.
///
/// Cheap to clone; all clones share one store behind a single lock, so
/// structural mutations and publishes are serialized against each other.
/// The lock is never held across an await point.
#[derive(Clone)]
pub struct Cms {
	inner: Arc<RwLock<CmsInner>>,
}

impl Default for Cms {
	fn default() -> Self {
		Self::new(CmsConfig::default())
	}
}

impl Cms {
	/// Create an empty CMS with the given configuration
	pub fn new(config: CmsConfig) -> Self {
		Self {
			inner: Arc::new(RwLock::new(CmsInner {
				config,
				store: PageStore::new(),
				permissions: PermissionChecker::new(),
				moderation: ModerationEngine::new(),
			})),
		}
	}

	// === Authoring ===

	/// Create a draft page with its initial title.
	///
	/// Creating below a parent requires `Add` on that parent; root creation
	/// is gated by the embedding application. With
	/// [`CmsConfig::auto_grant_creator`] the creator receives a full grant
	/// on the new page and its future descendants.
	pub async fn create_page(&self, new: NewPage, user: UserId) -> CmsResult<Page> {
		let mut inner = self.inner.write();
		if let Some(target) = new.target {
			inner.store.expect_draft(target)?;
		}
		let parent = inner.store.drafts().attach_parent(new.target, new.position)?;
		if let Some(parent) = parent {
			inner.check(user, parent, PermissionFlag::Add)?;
		}
		let language = new
			.language
			.unwrap_or_else(|| inner.config.language_for(new.site).to_string());
		let page = inner.store.create_draft(
			new.site,
			new.target,
			new.position,
			&new.title,
			&language,
			new.slug,
			new.in_navigation,
			user,
		)?;
		if inner.config.auto_grant_creator {
			inner.permissions.grant(
				page.id,
				Principal::User(user),
				GrantScope::PageAndDescendants,
				PermissionGrants::all_allowed(),
			);
		}
		Ok(page)
	}

	/// Create or update a draft's title for one language
	pub async fn set_title(
		&self,
		page: PageId,
		language: &str,
		title: &str,
		slug: Option<String>,
		user: UserId,
	) -> CmsResult<Title> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Change)?;
		inner.store.set_title(page, language, title, slug, user)
	}

	/// Toggle a draft's navigation visibility
	pub async fn set_in_navigation(&self, page: PageId, value: bool, user: UserId) -> CmsResult<()> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Change)?;
		inner.store.expect_draft(page)?;
		let record = inner.store.page_mut(page)?;
		record.in_navigation = value;
		record.touch(user);
		Ok(())
	}

	/// Move a draft (with its subtree) relative to another draft.
	///
	/// Requires `Move` on the page and `Add` on the new parent.
	pub async fn move_page(
		&self,
		page: PageId,
		target: Option<PageId>,
		position: TreePosition,
		user: UserId,
	) -> CmsResult<()> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Move)?;
		if let Some(t) = target {
			inner.store.expect_draft(t)?;
		}
		if let Some(parent) = inner.store.drafts().attach_parent(target, position)? {
			inner.check(user, parent, PermissionFlag::Add)?;
		}
		inner.store.move_draft(page, target, position, user)
	}

	/// Delete a draft with its whole subtree, cascading to titles, public
	/// mirrors, permission grants and moderator assignments.
	pub async fn delete_page(&self, page: PageId, user: UserId) -> CmsResult<()> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Delete)?;
		let removed = inner.store.remove_draft_subtree(page)?;
		for id in removed {
			inner.permissions.remove_page(id);
			inner.moderation.remove_page(id);
		}
		Ok(())
	}

	/// Copy a draft subtree under `target` as fresh unpublished drafts,
	/// optionally carrying over permission grants and moderator assignments.
	pub async fn copy_page(
		&self,
		page: PageId,
		target: Option<PageId>,
		user: UserId,
		copy_permissions: bool,
		copy_moderation: bool,
	) -> CmsResult<Page> {
		let mut inner = self.inner.write();
		if let Some(t) = target {
			inner.check(user, t, PermissionFlag::Add)?;
		}
		let mapping = inner.store.copy_subtree(page, target, user)?;
		for &(source, copy) in &mapping {
			if copy_permissions {
				for grant in inner.permissions.page_permissions(source) {
					inner
						.permissions
						.grant(copy, grant.principal, grant.grant_on, grant.grants);
				}
			}
			if copy_moderation {
				for moderator in inner.moderation.moderators(source) {
					inner.moderation.assign(copy, moderator.user, moderator.level);
				}
			}
		}
		let root_copy = mapping[0].1;
		if inner.config.auto_grant_creator {
			inner.permissions.grant(
				root_copy,
				Principal::User(user),
				GrantScope::PageAndDescendants,
				PermissionGrants::all_allowed(),
			);
		}
		Ok(inner.store.page(root_copy)?.clone())
	}

	// === Publishing ===

	/// Publish a draft.
	///
	/// Requires `Publish` on the page. When moderation is enabled and any
	/// moderator covers the page, the publish is held pending instead and
	/// the returned state names the required approvers; otherwise the
	/// public mirror is created or updated immediately.
	pub async fn publish(&self, page: PageId, user: UserId) -> CmsResult<PublishOutcome> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Publish)?;
		inner.store.expect_draft(page)?;
		if let Some(parent) = inner.store.drafts().node(page)?.parent
			&& inner.store.page(parent)?.public_ref.is_none()
		{
			return Err(CmsError::ParentNotPublished(page));
		}
		if inner.config.moderation_enabled {
			let chain = inner.chain(page)?;
			let required = inner.moderation.required_for(&chain);
			if !required.is_empty() {
				let state = inner.moderation.begin(page, required, user);
				return Ok(PublishOutcome::Pending(state));
			}
		}
		let public = inner.store.publish_now(page, user)?;
		Ok(PublishOutcome::Published { public })
	}

	/// Remove a draft's public mirror. Requires `Publish` on the page.
	/// Descendants' mirrors are not cascaded.
	pub async fn unpublish(&self, page: PageId, user: UserId) -> CmsResult<()> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Publish)?;
		inner.store.unpublish(page, user)
	}

	// === Moderation ===

	/// Record an approval for a pending publish. The caller must be one of
	/// the required approvers. When the last outstanding approval arrives,
	/// the deferred publish runs and the outcome is `Published`.
	pub async fn approve(&self, page: PageId, user: UserId) -> CmsResult<PublishOutcome> {
		let mut inner = self.inner.write();
		inner.moderation.approve(page, user)?;
		if let Some(state) = inner.moderation.take_approved(page) {
			let public = inner.store.publish_now(page, state.requested_by)?;
			return Ok(PublishOutcome::Published { public });
		}
		let state = inner
			.moderation
			.pending(page)
			.cloned()
			.ok_or(CmsError::NoPendingModeration(page))?;
		Ok(PublishOutcome::Pending(state))
	}

	/// Record a rejection for a pending publish, discarding it. The prior
	/// public mirror, if any, is left unchanged.
	pub async fn reject(&self, page: PageId, user: UserId) -> CmsResult<ModerationStatus> {
		let mut inner = self.inner.write();
		inner.moderation.reject(page, user)
	}

	/// Assign a required approver for the subtree rooted at `page`.
	/// Requires `Moderate` on the page.
	pub async fn assign_moderator(
		&self,
		page: PageId,
		moderator: UserId,
		level: u8,
		user: UserId,
	) -> CmsResult<PageModerator> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Moderate)?;
		inner.store.expect_draft(page)?;
		Ok(inner.moderation.assign(page, moderator, level))
	}

	/// Remove a moderator assignment. Requires `Moderate` on the page.
	pub async fn remove_moderator(&self, page: PageId, moderator: UserId, user: UserId) -> CmsResult<()> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::Moderate)?;
		inner.moderation.remove(page, moderator);
		Ok(())
	}

	// === Permissions ===

	/// Attach a permission grant to a page. Requires `ChangePermissions`.
	pub async fn assign_permission(
		&self,
		page: PageId,
		principal: Principal,
		grant_on: GrantScope,
		grants: PermissionGrants,
		user: UserId,
	) -> CmsResult<PagePermission> {
		let mut inner = self.inner.write();
		inner.check(user, page, PermissionFlag::ChangePermissions)?;
		inner.store.expect_draft(page)?;
		Ok(inner.permissions.grant(page, principal, grant_on, grants))
	}

	/// Revoke a grant by id. Requires `ChangePermissions` on the page the
	/// grant is attached to.
	pub async fn revoke_permission(&self, grant: Uuid, user: UserId) -> CmsResult<()> {
		let mut inner = self.inner.write();
		let permission = inner
			.permissions
			.get(grant)
			.cloned()
			.ok_or_else(|| CmsError::PermissionDenied("permission grant not found".to_string()))?;
		inner.check(user, permission.page, PermissionFlag::ChangePermissions)?;
		inner.permissions.revoke(grant)?;
		Ok(())
	}

	/// Record a user as a member of a group. Identity administration
	/// belongs to the embedding application, so this is not gated here.
	pub async fn add_group_member(&self, group: GroupId, member: UserId) {
		self.inner.write().permissions.add_group_member(group, member);
	}

	/// Remove a user from a group
	pub async fn remove_group_member(&self, group: GroupId, member: UserId) {
		self.inner.write().permissions.remove_group_member(group, member);
	}

	/// Resolve whether a user may perform `flag` on a page
	pub async fn is_allowed(&self, user: UserId, page: PageId, flag: PermissionFlag) -> CmsResult<bool> {
		let inner = self.inner.read();
		let chain = inner.chain(page)?;
		Ok(inner.permissions.is_allowed(user, &chain, flag))
	}

	// === Queries ===

	/// Look up a page row by id (draft or public)
	pub async fn page(&self, id: PageId) -> CmsResult<Page> {
		Ok(self.inner.read().store.page(id)?.clone())
	}

	/// Title of a page in one language
	pub async fn title(&self, page: PageId, language: &str) -> CmsResult<Title> {
		let inner = self.inner.read();
		inner.store.page(page)?;
		inner
			.store
			.titles()
			.get(page, language)
			.cloned()
			.ok_or_else(|| CmsError::TitleNotFound {
				page,
				language: language.to_string(),
			})
	}

	/// All titles of a page
	pub async fn titles(&self, page: PageId) -> CmsResult<Vec<Title>> {
		let inner = self.inner.read();
		inner.store.page(page)?;
		Ok(inner.store.titles().for_page(page).to_vec())
	}

	/// Ordered children of a page, in the forest the page lives in
	pub async fn children(&self, page: PageId) -> CmsResult<Vec<PageId>> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.children(page)
	}

	/// Descendants of a page in pre-order, optionally depth-limited
	pub async fn descendants(&self, page: PageId, max_depth: Option<u32>) -> CmsResult<Vec<PageId>> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.descendants(page, max_depth)
	}

	/// Ancestors of a page, nearest first
	pub async fn ancestors(&self, page: PageId) -> CmsResult<Vec<PageId>> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.ancestors(page)
	}

	/// The ordered sibling sequence of a page, itself included
	pub async fn siblings(&self, page: PageId) -> CmsResult<Vec<PageId>> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.siblings(page)
	}

	/// Depth of a page in its forest, 0 for roots
	pub async fn level(&self, page: PageId) -> CmsResult<u32> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.depth(page)
	}

	/// Index of a page among its siblings
	pub async fn position(&self, page: PageId) -> CmsResult<usize> {
		let inner = self.inner.read();
		inner.store.tree_of(page)?.position(page)
	}

	/// Ordered draft root pages
	pub async fn root_pages(&self) -> Vec<PageId> {
		self.inner.read().store.drafts().roots().to_vec()
	}

	/// Ordered public root pages
	pub async fn public_roots(&self) -> Vec<PageId> {
		self.inner.read().store.public_tree().roots().to_vec()
	}

	/// Whether a published draft's mirror matches it structurally
	pub async fn mirror_aligned(&self, page: PageId) -> CmsResult<bool> {
		self.inner.read().store.mirror_aligned(page)
	}

	/// The pending moderation state for a page, if any
	pub async fn pending_moderation(&self, page: PageId) -> CmsResult<Option<ModerationState>> {
		let inner = self.inner.read();
		inner.store.page(page)?;
		Ok(inner.moderation.pending(page).cloned())
	}

	/// Aggregated moderation mask for a page; zero when moderation is
	/// disabled or no moderator covers the page
	pub async fn moderation_mask(&self, page: PageId) -> CmsResult<u8> {
		let inner = self.inner.read();
		if !inner.config.moderation_enabled {
			return Ok(0);
		}
		let chain = inner.chain(page)?;
		Ok(inner.moderation.mask_for(&chain))
	}

	/// Users whose approval a publish of the page would need
	pub async fn required_approvers(&self, page: PageId) -> CmsResult<BTreeSet<UserId>> {
		let inner = self.inner.read();
		if !inner.config.moderation_enabled {
			return Ok(BTreeSet::new());
		}
		let chain = inner.chain(page)?;
		Ok(inner.moderation.required_for(&chain))
	}

	/// All permission grants attached to a page
	pub async fn page_permissions(&self, page: PageId) -> CmsResult<Vec<PagePermission>> {
		let inner = self.inner.read();
		inner.store.page(page)?;
		Ok(inner.permissions.page_permissions(page))
	}

	/// All moderator assignments attached to a page
	pub async fn moderators(&self, page: PageId) -> CmsResult<Vec<PageModerator>> {
		let inner = self.inner.read();
		inner.store.page(page)?;
		Ok(inner.moderation.moderators(page))
	}
}
