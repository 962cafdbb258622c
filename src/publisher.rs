//! Publish and unpublish protocol
//!
//! Publishing clones a draft's structural position and titles into its
//! public mirror. The public forest mirrors the draft forest restricted to
//! published pages: unpublished siblings are skipped, never represented as
//! gaps. Public rows are written here and nowhere else.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{CmsError, CmsResult};
use crate::moderation::ModerationState;
use crate::pages::{Page, PageId, PageStore, TreePosition, UserId};
use crate::titles::available_slug;

/// Result of a publish request
#[derive(Debug, Clone)]
pub enum PublishOutcome {
	/// The public mirror was created or updated
	Published {
		/// Id of the public mirror row
		public: PageId,
	},
	/// The publish is held until the required approvals accumulate
	Pending(ModerationState),
}

impl PageStore {
	/// Publish a draft immediately: create or update its public mirror,
	/// copy its titles, and realign the mirrors of its subtree.
	///
	/// Fails with [`CmsError::ParentNotPublished`] when the draft sits under
	/// a parent that has no mirror of its own; the public forest cannot
	/// contain a child without its parent.
	pub fn publish_now(&mut self, draft_id: PageId, user: UserId) -> CmsResult<PageId> {
		let draft = self.expect_draft(draft_id)?.clone();
		let parent = self.drafts.node(draft_id)?.parent;
		let parent_mirror = match parent {
			Some(p) => match self.page(p)?.public_ref {
				Some(mirror) => Some(mirror),
				None => return Err(CmsError::ParentNotPublished(draft_id)),
			},
			None => None,
		};
		let index = self.published_index(draft_id, parent)?;

		let mirror_id = match draft.public_ref {
			Some(existing) if self.pages.contains_key(&existing) => {
				self.public.place(existing, parent_mirror, index)?;
				self.page_mut(existing)?.touch(user);
				existing
			}
			_ => {
				let mirror = Page::new_public(&draft, user);
				let mirror_id = mirror.id;
				self.public.insert_at(mirror_id, parent_mirror, index)?;
				self.pages.insert(mirror_id, mirror);
				self.page_mut(draft_id)?.public_ref = Some(mirror_id);
				mirror_id
			}
		};

		let titles = self.titles.for_page(draft_id).to_vec();
		self.titles.replace_page(mirror_id, titles);
		{
			let mirror = self.page_mut(mirror_id)?;
			mirror.in_navigation = draft.in_navigation;
		}
		self.page_mut(draft_id)?.published_at = Some(Utc::now());

		self.sync_subtree(draft_id, user)?;
		debug_assert!(self.mirror_aligned(draft_id)?);
		tracing::info!(page = %draft_id, mirror = %mirror_id, "published page");
		Ok(mirror_id)
	}

	/// Remove a draft's public mirror.
	///
	/// Descendants' mirrors are unaffected: they remain published, spliced
	/// under the nearest published ancestor's mirror until this page is
	/// published again, which re-nests them.
	pub fn unpublish(&mut self, draft_id: PageId, user: UserId) -> CmsResult<()> {
		let mirror = self
			.expect_draft(draft_id)?
			.public_ref
			.ok_or(CmsError::NotPublished(draft_id))?;
		self.public.extract(mirror)?;
		self.pages.remove(&mirror);
		self.titles.remove_page(mirror);
		let draft = self.page_mut(draft_id)?;
		draft.public_ref = None;
		draft.touch(user);
		tracing::info!(page = %draft_id, mirror = %mirror, "unpublished page");
		Ok(())
	}

	/// Copy a draft subtree under `target` as fresh, unpublished drafts.
	///
	/// The copy root's slugs are deduplicated against the new siblings with
	/// `-1`, `-2`, … suffixes; deeper pages keep their slugs since their
	/// sibling scope is fresh. Returns the (source, copy) id pairs in
	/// pre-order so the caller can carry over page-scoped records.
	pub fn copy_subtree(
		&mut self,
		source: PageId,
		target: Option<PageId>,
		user: UserId,
	) -> CmsResult<Vec<(PageId, PageId)>> {
		self.expect_draft(source)?;
		if let Some(t) = target {
			self.expect_draft(t)?;
		}
		let mut ids = vec![source];
		ids.extend(self.drafts.descendants(source, None)?);

		let mut mapping = Vec::with_capacity(ids.len());
		let mut copies: HashMap<PageId, PageId> = HashMap::new();
		for &old_id in &ids {
			let old = self.page(old_id)?.clone();
			let mut copy = Page::new_draft(old.site, user);
			copy.in_navigation = old.in_navigation;
			let copy_id = copy.id;

			if old_id == source {
				self.drafts.insert(copy_id, target, TreePosition::LastChild)?;
			} else {
				let old_parent = self
					.drafts
					.node(old_id)?
					.parent
					.expect("descendant has a parent inside the copied subtree");
				let new_parent = copies[&old_parent];
				self.drafts.insert(copy_id, Some(new_parent), TreePosition::LastChild)?;
			}

			for title in self.titles.for_page(old_id).to_vec() {
				let slug = if old_id == source {
					let parent = self.drafts.attach_parent(target, TreePosition::LastChild)?;
					available_slug(&title.slug, |candidate| {
						self.slug_in_use(old.site, parent, &title.language, candidate, Some(copy_id))
					})
				} else {
					title.slug.clone()
				};
				self.titles.set(copy_id, &title.language, &title.title, &slug);
			}

			self.pages.insert(copy_id, copy);
			copies.insert(old_id, copy_id);
			mapping.push((old_id, copy_id));
		}
		tracing::info!(source = %source, copy = %mapping[0].1, pages = mapping.len(), "copied page subtree");
		Ok(mapping)
	}

	/// Whether a published draft's mirror matches it structurally: equal
	/// depth, and the mirrors of its published siblings appearing in draft
	/// order. Unpublished drafts are trivially aligned.
	pub fn mirror_aligned(&self, draft_id: PageId) -> CmsResult<bool> {
		let Some(mirror) = self.page(draft_id)?.public_ref else {
			return Ok(true);
		};
		if self.drafts.depth(draft_id)? != self.public.depth(mirror)? {
			return Ok(false);
		}
		let expected: Vec<PageId> = self
			.drafts
			.siblings(draft_id)?
			.iter()
			.filter_map(|&sibling| self.pages.get(&sibling).and_then(|p| p.public_ref))
			.collect();
		let actual: Vec<PageId> = self
			.public
			.siblings(mirror)?
			.iter()
			.copied()
			.filter(|id| expected.contains(id))
			.collect();
		Ok(expected == actual)
	}

	/// Index a draft's mirror should take among its parent's public
	/// children: the count of published siblings to its left.
	fn published_index(&self, draft_id: PageId, parent: Option<PageId>) -> CmsResult<usize> {
		let siblings = match parent {
			Some(p) => self.drafts.node(p)?.children.clone(),
			None => self.drafts.roots().to_vec(),
		};
		Ok(siblings
			.iter()
			.take_while(|&&sibling| sibling != draft_id)
			.filter(|&&sibling| self.pages.get(&sibling).is_some_and(Page::is_published))
			.count())
	}

	/// Realign mirror positions below a just-published page and refresh the
	/// titles of previously-published descendants whose draft changed after
	/// their own last publish. Descendants without a mirror are skipped:
	/// publishing never force-publishes below the requested page.
	fn sync_subtree(&mut self, draft_id: PageId, user: UserId) -> CmsResult<()> {
		for descendant in self.drafts.descendants(draft_id, None)? {
			let page = self.page(descendant)?.clone();
			let Some(mirror) = page.public_ref else {
				continue;
			};
			let parent = self
				.drafts
				.node(descendant)?
				.parent
				.expect("descendant has a parent");
			// A descendant under an unpublished intermediate keeps its
			// current spliced position until that intermediate republishes.
			if let Some(parent_mirror) = self.page(parent)?.public_ref {
				let index = self.published_index(descendant, Some(parent))?;
				self.public.place(mirror, Some(parent_mirror), index)?;
			}
			let last_publish = page.published_at.unwrap_or(page.created_at);
			if page.changed_at > last_publish {
				let titles = self.titles.for_page(descendant).to_vec();
				self.titles.replace_page(mirror, titles);
				self.page_mut(mirror)?.touch(user);
				self.page_mut(descendant)?.published_at = Some(Utc::now());
				tracing::debug!(page = %descendant, mirror = %mirror, "refreshed published descendant");
			}
		}
		Ok(())
	}
}
