//! Page-level access control
//!
//! Permissions are *grants*: a principal (user or group), a page, a scope
//! describing which part of that page's subtree the grant covers, and a
//! tri-state setting per permission flag. Resolution walks the ancestor
//! chain nearest-first; the nearest ancestor carrying any explicit setting
//! of the requested flag decides, and a chain with no explicit setting at
//! all denies.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CmsError, CmsResult};
use crate::pages::{PageId, UserId};

/// Group identifier, supplied by the embedding application
pub type GroupId = Uuid;

/// The actions a grant can speak to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionFlag {
	/// Create child pages
	Add,
	/// Edit page content and titles
	Change,
	/// Delete the page
	Delete,
	/// Publish and unpublish the page
	Publish,
	/// Move the page
	Move,
	/// Grant or revoke permissions on the page
	ChangePermissions,
	/// Change advanced page settings
	ChangeAdvancedSettings,
	/// Manage moderator assignments
	Moderate,
}

impl PermissionFlag {
	/// All flags, in declaration order
	pub const ALL: [PermissionFlag; 8] = [
		PermissionFlag::Add,
		PermissionFlag::Change,
		PermissionFlag::Delete,
		PermissionFlag::Publish,
		PermissionFlag::Move,
		PermissionFlag::ChangePermissions,
		PermissionFlag::ChangeAdvancedSettings,
		PermissionFlag::Moderate,
	];
}

/// Which pages a grant applies to, relative to the page it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantScope {
	/// Only the page itself
	ThisPage,
	/// The page and its direct children
	PageAndChildren,
	/// The page and its whole subtree
	PageAndDescendants,
	/// The whole subtree, excluding the page itself
	DescendantsOnly,
}

impl GrantScope {
	/// Whether the scope covers a page `depth` levels below the grant's page
	/// (0 = the grant's own page).
	pub fn covers(&self, depth: usize) -> bool {
		match self {
			GrantScope::ThisPage => depth == 0,
			GrantScope::PageAndChildren => depth <= 1,
			GrantScope::PageAndDescendants => true,
			GrantScope::DescendantsOnly => depth >= 1,
		}
	}
}

/// Who a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Principal {
	/// A single user
	User(UserId),
	/// Every member of a group
	Group(GroupId),
}

/// Tri-state flag settings carried by one grant.
///
/// A flag is either untouched (the grant is silent about it), explicitly
/// allowed, or explicitly denied. Silence lets farther ancestors speak.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrants {
	settings: BTreeMap<PermissionFlag, bool>,
}

impl PermissionGrants {
	/// A grant that is silent about every flag
	pub fn new() -> Self {
		Self::default()
	}

	/// A grant explicitly allowing every flag
	pub fn all_allowed() -> Self {
		let mut grants = Self::new();
		for flag in PermissionFlag::ALL {
			grants.settings.insert(flag, true);
		}
		grants
	}

	/// Explicitly set a flag, chainable
	pub fn with(mut self, flag: PermissionFlag, allowed: bool) -> Self {
		self.settings.insert(flag, allowed);
		self
	}

	/// Explicitly allow a flag, chainable
	pub fn allow(self, flag: PermissionFlag) -> Self {
		self.with(flag, true)
	}

	/// Explicitly deny a flag, chainable
	pub fn deny(self, flag: PermissionFlag) -> Self {
		self.with(flag, false)
	}

	/// The explicit setting for a flag, `None` when the grant is silent
	pub fn get(&self, flag: PermissionFlag) -> Option<bool> {
		self.settings.get(&flag).copied()
	}

	/// Whether the grant says anything about a flag
	pub fn touches(&self, flag: PermissionFlag) -> bool {
		self.settings.contains_key(&flag)
	}
}

/// A stored permission grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePermission {
	/// Grant identifier
	pub id: Uuid,
	/// Page the grant is attached to
	pub page: PageId,
	/// User or group the grant applies to
	pub principal: Principal,
	/// Subtree coverage relative to `page`
	pub grant_on: GrantScope,
	/// Per-flag settings
	pub grants: PermissionGrants,
}

/// Stores grants and group memberships and resolves permission checks.
#[derive(Debug, Default)]
pub struct PermissionChecker {
	by_page: HashMap<PageId, Vec<PagePermission>>,
	groups: HashMap<GroupId, HashSet<UserId>>,
}

impl PermissionChecker {
	/// Create an empty checker
	pub fn new() -> Self {
		Self::default()
	}

	/// Attach a grant to a page
	pub fn grant(
		&mut self,
		page: PageId,
		principal: Principal,
		grant_on: GrantScope,
		grants: PermissionGrants,
	) -> PagePermission {
		let permission = PagePermission {
			id: Uuid::new_v4(),
			page,
			principal,
			grant_on,
			grants,
		};
		self.by_page.entry(page).or_default().push(permission.clone());
		tracing::debug!(page = %page, principal = ?principal, scope = ?grant_on, "granted page permission");
		permission
	}

	/// Remove a grant by id
	pub fn revoke(&mut self, id: Uuid) -> CmsResult<PagePermission> {
		for grants in self.by_page.values_mut() {
			if let Some(index) = grants.iter().position(|g| g.id == id) {
				return Ok(grants.remove(index));
			}
		}
		Err(CmsError::PermissionDenied("permission grant not found".to_string()))
	}

	/// Look up a grant by id
	pub fn get(&self, id: Uuid) -> Option<&PagePermission> {
		self.by_page.values().flatten().find(|g| g.id == id)
	}

	/// All grants attached to a page
	pub fn page_permissions(&self, page: PageId) -> Vec<PagePermission> {
		self.by_page.get(&page).cloned().unwrap_or_default()
	}

	/// Record a user as a member of a group
	pub fn add_group_member(&mut self, group: GroupId, user: UserId) {
		self.groups.entry(group).or_default().insert(user);
	}

	/// Remove a user from a group
	pub fn remove_group_member(&mut self, group: GroupId, user: UserId) {
		if let Some(members) = self.groups.get_mut(&group) {
			members.remove(&user);
		}
	}

	/// Drop all grants attached to a page
	pub fn remove_page(&mut self, page: PageId) {
		self.by_page.remove(&page);
	}

	/// Resolve a permission check along an ancestor chain.
	///
	/// `chain` is the page itself followed by its ancestors nearest-first.
	/// At each ancestor only grants whose scope covers the page's relative
	/// depth and whose principal matches the user are consulted. The nearest
	/// ancestor carrying an explicit setting of `flag` decides; among
	/// overlapping explicit settings at that ancestor one allow wins. With
	/// no explicit setting anywhere the action is denied.
	pub fn is_allowed(&self, user: UserId, chain: &[PageId], flag: PermissionFlag) -> bool {
		for (depth, &ancestor) in chain.iter().enumerate() {
			let Some(grants) = self.by_page.get(&ancestor) else {
				continue;
			};
			let mut explicit = grants
				.iter()
				.filter(|g| g.grant_on.covers(depth))
				.filter(|g| self.matches(g.principal, user))
				.filter_map(|g| g.grants.get(flag))
				.peekable();
			if explicit.peek().is_some() {
				return explicit.any(|allowed| allowed);
			}
		}
		false
	}

	fn matches(&self, principal: Principal, user: UserId) -> bool {
		match principal {
			Principal::User(u) => u == user,
			Principal::Group(g) => self.groups.get(&g).is_some_and(|members| members.contains(&user)),
		}
	}
}
