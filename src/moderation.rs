//! Moderation workflow
//!
//! Moderators are assigned per page with a depth mask saying how far down
//! the subtree their approval is required. A publish of a page covered by
//! at least one moderator does not take effect immediately: it opens a
//! [`ModerationState`] that collects approvals and either completes
//! (`Approved`, the deferred publish runs) or is discarded (`Rejected`,
//! the prior public mirror stays untouched).

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CmsError, CmsResult};
use crate::pages::{PageId, UserId};

/// Approval required for the moderated page itself
pub const MODERATE_PAGE: u8 = 1;
/// Approval required for direct children of the moderated page
pub const MODERATE_CHILDREN: u8 = 2;
/// Approval required for descendants below the children level
pub const MODERATE_DESCENDANTS: u8 = 4;

/// A moderator assignment on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageModerator {
	/// Page the assignment is attached to
	pub page: PageId,
	/// The required approver
	pub user: UserId,
	/// OR-mask of `MODERATE_*` bits
	pub level: u8,
}

impl PageModerator {
	/// Whether this assignment requires approval for a page `depth` levels
	/// below its own page (0 = the page itself).
	pub fn covers(&self, depth: usize) -> bool {
		let bit = match depth {
			0 => MODERATE_PAGE,
			1 => MODERATE_CHILDREN,
			_ => MODERATE_DESCENDANTS,
		};
		self.level & bit != 0
	}
}

/// Outcome of a moderated publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationStatus {
	/// Waiting for required approvals
	Pending,
	/// All required approvers have approved
	Approved,
	/// A required approver rejected; the publish is discarded
	Rejected,
}

/// Per-publish-attempt approval record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationState {
	/// Page awaiting publication
	pub page: PageId,
	/// Users whose approval is required
	pub required: BTreeSet<UserId>,
	/// Approvals received so far
	pub approved: BTreeSet<UserId>,
	/// Current status
	pub status: ModerationStatus,
	/// User who requested the publish
	pub requested_by: UserId,
	/// When the publish was requested
	pub requested_at: DateTime<Utc>,
}

impl ModerationState {
	/// Whether every required approver has approved
	pub fn is_complete(&self) -> bool {
		self.required.is_subset(&self.approved)
	}

	/// Required approvers that have not approved yet
	pub fn outstanding(&self) -> BTreeSet<UserId> {
		self.required.difference(&self.approved).copied().collect()
	}
}

/// Stores moderator assignments and drives pending publish approvals.
#[derive(Debug, Default)]
pub struct ModerationEngine {
	moderators: HashMap<PageId, Vec<PageModerator>>,
	pending: HashMap<PageId, ModerationState>,
}

impl ModerationEngine {
	/// Create an empty engine
	pub fn new() -> Self {
		Self::default()
	}

	/// Assign a moderator to a page, replacing an earlier assignment of the
	/// same user.
	pub fn assign(&mut self, page: PageId, user: UserId, level: u8) -> PageModerator {
		let assignment = PageModerator { page, user, level };
		let entries = self.moderators.entry(page).or_default();
		entries.retain(|m| m.user != user);
		entries.push(assignment.clone());
		tracing::debug!(page = %page, user = %user, level, "assigned page moderator");
		assignment
	}

	/// Remove a moderator assignment
	pub fn remove(&mut self, page: PageId, user: UserId) {
		if let Some(entries) = self.moderators.get_mut(&page) {
			entries.retain(|m| m.user != user);
		}
	}

	/// Moderator assignments attached to a page
	pub fn moderators(&self, page: PageId) -> Vec<PageModerator> {
		self.moderators.get(&page).cloned().unwrap_or_default()
	}

	/// Aggregated moderation mask for a page given its ancestor chain
	/// (the page first, then ancestors nearest-first): the OR of every
	/// `MODERATE_*` bit that puts the page under moderation.
	pub fn mask_for(&self, chain: &[PageId]) -> u8 {
		let mut mask = 0;
		for (depth, &ancestor) in chain.iter().enumerate() {
			let Some(entries) = self.moderators.get(&ancestor) else {
				continue;
			};
			let bit = match depth {
				0 => MODERATE_PAGE,
				1 => MODERATE_CHILDREN,
				_ => MODERATE_DESCENDANTS,
			};
			if entries.iter().any(|m| m.covers(depth)) {
				mask |= bit;
			}
		}
		mask
	}

	/// Users whose approval a publish of the page needs: the union over
	/// every qualifying assignment on the chain, the page's own included.
	/// An empty set means the page is self-approving.
	pub fn required_for(&self, chain: &[PageId]) -> BTreeSet<UserId> {
		let mut required = BTreeSet::new();
		for (depth, &ancestor) in chain.iter().enumerate() {
			if let Some(entries) = self.moderators.get(&ancestor) {
				required.extend(entries.iter().filter(|m| m.covers(depth)).map(|m| m.user));
			}
		}
		required
	}

	/// Open (or reset) the pending state for a publish attempt.
	///
	/// A repeated request while one is pending starts over: the required
	/// set is recomputed by the caller and earlier approvals are dropped.
	pub fn begin(&mut self, page: PageId, required: BTreeSet<UserId>, requested_by: UserId) -> ModerationState {
		let state = ModerationState {
			page,
			required,
			approved: BTreeSet::new(),
			status: ModerationStatus::Pending,
			requested_by,
			requested_at: Utc::now(),
		};
		self.pending.insert(page, state.clone());
		tracing::info!(page = %page, required = state.required.len(), "publish held for moderation");
		state
	}

	/// Record an approval. Completes the state when the approver was the
	/// last one outstanding.
	pub fn approve(&mut self, page: PageId, user: UserId) -> CmsResult<ModerationStatus> {
		let state = self
			.pending
			.get_mut(&page)
			.ok_or(CmsError::NoPendingModeration(page))?;
		if !state.required.contains(&user) {
			return Err(CmsError::PermissionDenied(format!(
				"user {user} is not a required approver for page {page}"
			)));
		}
		state.approved.insert(user);
		if state.is_complete() {
			state.status = ModerationStatus::Approved;
		}
		tracing::info!(page = %page, user = %user, status = ?state.status, "moderation approval recorded");
		Ok(state.status)
	}

	/// Record a rejection, discarding the pending publish.
	pub fn reject(&mut self, page: PageId, user: UserId) -> CmsResult<ModerationStatus> {
		let state = self
			.pending
			.get(&page)
			.ok_or(CmsError::NoPendingModeration(page))?;
		if !state.required.contains(&user) {
			return Err(CmsError::PermissionDenied(format!(
				"user {user} is not a required approver for page {page}"
			)));
		}
		self.pending.remove(&page);
		tracing::info!(page = %page, user = %user, "moderation rejected, pending publish discarded");
		Ok(ModerationStatus::Rejected)
	}

	/// The pending state for a page, if any
	pub fn pending(&self, page: PageId) -> Option<&ModerationState> {
		self.pending.get(&page)
	}

	/// Remove and return the pending state once it is approved, so the
	/// deferred publish can run exactly once.
	pub fn take_approved(&mut self, page: PageId) -> Option<ModerationState> {
		if self.pending.get(&page)?.status == ModerationStatus::Approved {
			return self.pending.remove(&page);
		}
		None
	}

	/// Drop every assignment and pending state attached to a page
	pub fn remove_page(&mut self, page: PageId) {
		self.moderators.remove(&page);
		self.pending.remove(&page);
	}
}
