//! Page records and the tree store
//!
//! Pages live in two forests: every page is edited as a *draft* in the draft
//! forest, and publishing clones its structural position into the *public*
//! forest. Structure (parent, sibling order, depth) is owned by [`PageTree`],
//! an arena of nodes with explicit child lists; depth is recomputed on every
//! mutation rather than stored redundantly. Client-facing structural
//! operations only ever target drafts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CmsError, CmsResult};
use crate::titles::{Title, TitleStore, slugify};

/// Page identifier
pub type PageId = Uuid;

/// User identifier, supplied by the embedding application
pub type UserId = Uuid;

/// Site identifier, scoping slug uniqueness and language defaults
pub type SiteId = Uuid;

/// Where to attach a page relative to a target node.
///
/// `FirstChild`/`LastChild` nest under the target; `Left`/`Right` insert as
/// its sibling. With no target the page becomes a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreePosition {
	/// First child of the target
	FirstChild,
	/// Last child of the target
	LastChild,
	/// Immediately before the target among its siblings
	Left,
	/// Immediately after the target among its siblings
	Right,
}

/// A structural node in a [`PageTree`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageNode {
	/// Page this node belongs to
	pub id: PageId,
	/// Parent node, `None` for roots
	pub parent: Option<PageId>,
	/// Ordered child list
	pub children: Vec<PageId>,
	/// Distance from the root, 0 for roots
	pub depth: u32,
}

/// Arena-backed page hierarchy with deterministic sibling ordering.
///
/// All operations are atomic: a failed call leaves the tree unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageTree {
	nodes: HashMap<PageId, PageNode>,
	roots: Vec<PageId>,
}

impl PageTree {
	/// Create an empty tree
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of nodes in the tree
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Whether the tree has no nodes
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Whether the node is present
	pub fn contains(&self, id: PageId) -> bool {
		self.nodes.contains_key(&id)
	}

	/// Ordered root nodes
	pub fn roots(&self) -> &[PageId] {
		&self.roots
	}

	/// Look up a node
	pub fn node(&self, id: PageId) -> CmsResult<&PageNode> {
		self.nodes.get(&id).ok_or(CmsError::PageNotFound(id))
	}

	/// Depth of a node, 0 for roots
	pub fn depth(&self, id: PageId) -> CmsResult<u32> {
		Ok(self.node(id)?.depth)
	}

	/// Index of a node among its siblings
	pub fn position(&self, id: PageId) -> CmsResult<usize> {
		let node = self.node(id)?;
		let list = match node.parent {
			Some(parent) => &self.node(parent)?.children,
			None => &self.roots,
		};
		list.iter()
			.position(|&c| c == id)
			.ok_or_else(|| CmsError::StructuralInconsistency(format!("node {id} missing from its sibling list")))
	}

	/// Ordered child list of a node
	pub fn children(&self, id: PageId) -> CmsResult<Vec<PageId>> {
		Ok(self.node(id)?.children.clone())
	}

	/// Ancestors of a node, nearest first
	pub fn ancestors(&self, id: PageId) -> CmsResult<Vec<PageId>> {
		let mut chain = Vec::new();
		let mut current = self.node(id)?.parent;
		while let Some(ancestor) = current {
			chain.push(ancestor);
			current = self.node(ancestor)?.parent;
		}
		Ok(chain)
	}

	/// Descendants of a node in pre-order, optionally limited to a relative
	/// depth (`Some(1)` yields only direct children).
	pub fn descendants(&self, id: PageId, max_depth: Option<u32>) -> CmsResult<Vec<PageId>> {
		self.node(id)?;
		let mut result = Vec::new();
		let mut stack: Vec<(PageId, u32)> = self
			.node(id)?
			.children
			.iter()
			.rev()
			.map(|&c| (c, 1))
			.collect();
		while let Some((current, rel_depth)) = stack.pop() {
			if let Some(limit) = max_depth
				&& rel_depth > limit
			{
				continue;
			}
			result.push(current);
			for &child in self.node(current)?.children.iter().rev() {
				stack.push((child, rel_depth + 1));
			}
		}
		Ok(result)
	}

	/// The ordered sibling sequence of a node, the node itself included
	pub fn siblings(&self, id: PageId) -> CmsResult<Vec<PageId>> {
		let node = self.node(id)?;
		Ok(match node.parent {
			Some(parent) => self.node(parent)?.children.clone(),
			None => self.roots.clone(),
		})
	}

	/// Parent a page would get when attached at `position` relative to `target`
	pub fn attach_parent(&self, target: Option<PageId>, position: TreePosition) -> CmsResult<Option<PageId>> {
		match target {
			None => Ok(None),
			Some(t) => match position {
				TreePosition::FirstChild | TreePosition::LastChild => Ok(Some(t)),
				TreePosition::Left | TreePosition::Right => Ok(self.node(t)?.parent),
			},
		}
	}

	/// Insert a new node relative to `target`.
	///
	/// With no target the node becomes a root (prepended for
	/// [`TreePosition::FirstChild`], appended otherwise).
	pub fn insert(&mut self, id: PageId, target: Option<PageId>, position: TreePosition) -> CmsResult<()> {
		if self.contains(id) {
			return Err(CmsError::StructuralInconsistency(format!(
				"node {id} is already in the tree"
			)));
		}
		if let Some(t) = target {
			self.verify(t)?;
		}
		self.nodes.insert(
			id,
			PageNode {
				id,
				parent: None,
				children: Vec::new(),
				depth: 0,
			},
		);
		let (parent, index) = self.attach_point(target, position);
		self.attach(id, parent, index);
		Ok(())
	}

	/// Move a node (and its subtree) relative to `target`.
	///
	/// Fails with [`CmsError::Cycle`] when the target is the node itself or
	/// one of its descendants; depth is recomputed for the whole subtree.
	pub fn move_node(&mut self, id: PageId, target: Option<PageId>, position: TreePosition) -> CmsResult<()> {
		self.verify(id)?;
		if let Some(t) = target {
			self.verify(t)?;
			if t == id || self.descendants(id, None)?.contains(&t) {
				return Err(CmsError::Cycle { page: id, target: t });
			}
		}
		self.detach(id);
		let (parent, index) = self.attach_point(target, position);
		self.attach(id, parent, index);
		Ok(())
	}

	/// Remove a node with its whole subtree, returning the removed ids in
	/// pre-order (the node itself first).
	pub fn remove(&mut self, id: PageId) -> CmsResult<Vec<PageId>> {
		self.verify(id)?;
		let mut removed = vec![id];
		removed.extend(self.descendants(id, None)?);
		self.detach(id);
		for page in &removed {
			self.nodes.remove(page);
		}
		Ok(removed)
	}

	/// Remove a single node, splicing its children into its own place so
	/// siblings and former grandchildren keep their relative order.
	pub(crate) fn extract(&mut self, id: PageId) -> CmsResult<()> {
		self.verify(id)?;
		let node = self.nodes[&id].clone();
		let index = self.position(id)?;
		let list = match node.parent {
			Some(parent) => &mut self.nodes.get_mut(&parent).expect("verified parent").children,
			None => &mut self.roots,
		};
		list.remove(index);
		for (offset, &child) in node.children.iter().enumerate() {
			list.insert(index + offset, child);
		}
		for &child in &node.children {
			self.nodes.get_mut(&child).expect("verified child").parent = node.parent;
			self.recompute_depths(child);
		}
		self.nodes.remove(&id);
		Ok(())
	}

	/// Insert a new node directly under `parent` at the given sibling index
	pub(crate) fn insert_at(&mut self, id: PageId, parent: Option<PageId>, index: usize) -> CmsResult<()> {
		if self.contains(id) {
			return Err(CmsError::StructuralInconsistency(format!(
				"node {id} is already in the tree"
			)));
		}
		if let Some(p) = parent {
			self.verify(p)?;
		}
		self.nodes.insert(
			id,
			PageNode {
				id,
				parent: None,
				children: Vec::new(),
				depth: 0,
			},
		);
		self.attach(id, parent, index);
		Ok(())
	}

	/// Move an existing node directly under `parent` at the given sibling index
	pub(crate) fn place(&mut self, id: PageId, parent: Option<PageId>, index: usize) -> CmsResult<()> {
		self.verify(id)?;
		if let Some(p) = parent {
			self.verify(p)?;
			if p == id || self.descendants(id, None)?.contains(&p) {
				return Err(CmsError::Cycle { page: id, target: p });
			}
		}
		self.detach(id);
		self.attach(id, parent, index);
		Ok(())
	}

	/// Verify the stored linkage of a node before mutating around it.
	///
	/// Detects corruption left behind by an earlier bug: a dangling parent
	/// reference, a parent whose child list lost the node, or a stale depth.
	fn verify(&self, id: PageId) -> CmsResult<&PageNode> {
		let node = self.node(id)?;
		match node.parent {
			Some(parent) => {
				let parent_node = self.nodes.get(&parent).ok_or_else(|| {
					CmsError::StructuralInconsistency(format!("parent {parent} of node {id} is missing"))
				})?;
				if !parent_node.children.contains(&id) {
					return Err(CmsError::StructuralInconsistency(format!(
						"node {id} is not in the child list of its parent {parent}"
					)));
				}
				if node.depth != parent_node.depth + 1 {
					return Err(CmsError::StructuralInconsistency(format!(
						"node {id} has depth {} under a parent of depth {}",
						node.depth, parent_node.depth
					)));
				}
			}
			None => {
				if !self.roots.contains(&id) {
					return Err(CmsError::StructuralInconsistency(format!(
						"root node {id} is missing from the root list"
					)));
				}
				if node.depth != 0 {
					return Err(CmsError::StructuralInconsistency(format!(
						"root node {id} has nonzero depth {}",
						node.depth
					)));
				}
			}
		}
		Ok(node)
	}

	/// Resolve `target`/`position` to a concrete attach point. Only called
	/// after validation, and for moves only after the node was detached so
	/// sibling indices are final.
	fn attach_point(&self, target: Option<PageId>, position: TreePosition) -> (Option<PageId>, usize) {
		match target {
			None => match position {
				TreePosition::FirstChild => (None, 0),
				_ => (None, self.roots.len()),
			},
			Some(t) => {
				let node = &self.nodes[&t];
				match position {
					TreePosition::FirstChild => (Some(t), 0),
					TreePosition::LastChild => (Some(t), node.children.len()),
					TreePosition::Left | TreePosition::Right => {
						let list = match node.parent {
							Some(parent) => &self.nodes[&parent].children,
							None => &self.roots,
						};
						let index = list.iter().position(|&c| c == t).unwrap_or(list.len());
						match position {
							TreePosition::Left => (node.parent, index),
							_ => (node.parent, index + 1),
						}
					}
				}
			}
		}
	}

	fn detach(&mut self, id: PageId) {
		let parent = self.nodes[&id].parent;
		let list = match parent {
			Some(p) => &mut self.nodes.get_mut(&p).expect("verified parent").children,
			None => &mut self.roots,
		};
		list.retain(|&c| c != id);
		self.nodes.get_mut(&id).expect("verified node").parent = None;
	}

	fn attach(&mut self, id: PageId, parent: Option<PageId>, index: usize) {
		let list = match parent {
			Some(p) => &mut self.nodes.get_mut(&p).expect("verified parent").children,
			None => &mut self.roots,
		};
		let index = index.min(list.len());
		list.insert(index, id);
		self.nodes.get_mut(&id).expect("verified node").parent = parent;
		self.recompute_depths(id);
	}

	/// Recompute depth for a node and its whole subtree, iteratively.
	fn recompute_depths(&mut self, id: PageId) {
		let base = match self.nodes[&id].parent {
			Some(parent) => self.nodes[&parent].depth + 1,
			None => 0,
		};
		let mut stack = vec![(id, base)];
		while let Some((current, depth)) = stack.pop() {
			let node = self.nodes.get_mut(&current).expect("subtree node");
			node.depth = depth;
			for &child in &node.children {
				stack.push((child, depth + 1));
			}
		}
	}
}

/// A page record.
///
/// Drafts and their public mirrors are distinct rows connected by an
/// explicit bidirectional reference: a draft optionally points at its mirror
/// through `public_ref`, a mirror always points back through `draft_ref`.
/// Public rows are only ever written by the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
	/// Page identifier
	pub id: PageId,
	/// Site the page belongs to
	pub site: SiteId,
	/// Whether this row is the editable draft
	pub is_draft: bool,
	/// Public mirror of this draft, if published
	pub public_ref: Option<PageId>,
	/// Originating draft of this public row
	pub draft_ref: Option<PageId>,
	/// Whether the page appears in navigation menus
	pub in_navigation: bool,
	/// User who created the row
	pub created_by: UserId,
	/// User who last changed the row
	pub changed_by: UserId,
	/// Creation time
	pub created_at: DateTime<Utc>,
	/// Last content or structural change of the draft
	pub changed_at: DateTime<Utc>,
	/// When the draft was last copied into its mirror
	pub published_at: Option<DateTime<Utc>>,
}

impl Page {
	/// Create a fresh, unpublished draft row
	pub fn new_draft(site: SiteId, user: UserId) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			site,
			is_draft: true,
			public_ref: None,
			draft_ref: None,
			in_navigation: false,
			created_by: user,
			changed_by: user,
			created_at: now,
			changed_at: now,
			published_at: None,
		}
	}

	/// Create the public mirror row for a draft
	pub(crate) fn new_public(draft: &Page, user: UserId) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			site: draft.site,
			is_draft: false,
			public_ref: None,
			draft_ref: Some(draft.id),
			in_navigation: draft.in_navigation,
			created_by: user,
			changed_by: user,
			created_at: now,
			changed_at: now,
			published_at: None,
		}
	}

	/// Whether this draft currently has a public mirror
	pub fn is_published(&self) -> bool {
		self.public_ref.is_some()
	}

	pub(crate) fn touch(&mut self, user: UserId) {
		self.changed_by = user;
		self.changed_at = Utc::now();
	}
}

/// In-process store for page rows, both forests and title records.
///
/// The store only offers primitives; authorization and moderation gating
/// live in [`crate::service::Cms`], the publish protocol in
/// [`crate::publisher`].
#[derive(Debug, Default)]
pub struct PageStore {
	pub(crate) pages: HashMap<PageId, Page>,
	pub(crate) drafts: PageTree,
	pub(crate) public: PageTree,
	pub(crate) titles: TitleStore,
}

impl PageStore {
	/// Create an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Look up a page row
	pub fn page(&self, id: PageId) -> CmsResult<&Page> {
		self.pages.get(&id).ok_or(CmsError::PageNotFound(id))
	}

	/// The draft forest
	pub fn drafts(&self) -> &PageTree {
		&self.drafts
	}

	/// The public forest
	pub fn public_tree(&self) -> &PageTree {
		&self.public
	}

	/// Title records
	pub fn titles(&self) -> &TitleStore {
		&self.titles
	}

	/// The forest a page lives in, picked by its draft/public kind
	pub fn tree_of(&self, id: PageId) -> CmsResult<&PageTree> {
		Ok(if self.page(id)?.is_draft {
			&self.drafts
		} else {
			&self.public
		})
	}

	/// Look up a page and require it to be a draft.
	///
	/// Structural client operations never target public rows; a public id
	/// here means the caller confused the two sides of a mirror pair.
	pub fn expect_draft(&self, id: PageId) -> CmsResult<&Page> {
		let page = self.page(id)?;
		if !page.is_draft {
			return Err(CmsError::StructuralInconsistency(format!(
				"page {id} is a public mirror, not a draft"
			)));
		}
		Ok(page)
	}

	pub(crate) fn page_mut(&mut self, id: PageId) -> CmsResult<&mut Page> {
		self.pages.get_mut(&id).ok_or(CmsError::PageNotFound(id))
	}

	/// Whether `slug` is taken by another sibling draft of the same site and
	/// language under `parent` (`None` for root level).
	pub fn slug_in_use(
		&self,
		site: SiteId,
		parent: Option<PageId>,
		language: &str,
		slug: &str,
		exclude: Option<PageId>,
	) -> bool {
		let siblings = match parent {
			Some(p) => match self.drafts.node(p) {
				Ok(node) => node.children.clone(),
				Err(_) => return false,
			},
			None => self.drafts.roots().to_vec(),
		};
		siblings.iter().any(|&sibling| {
			if Some(sibling) == exclude {
				return false;
			}
			let Ok(page) = self.page(sibling) else {
				return false;
			};
			page.site == site
				&& self
					.titles
					.get(sibling, language)
					.is_some_and(|title| title.slug == slug)
		})
	}

	/// Create a draft with its first title in one step.
	///
	/// The slug (derived from the title when not supplied) is validated
	/// against the future siblings before anything is written, so a conflict
	/// leaves neither a page nor a title row behind.
	#[allow(clippy::too_many_arguments)]
	pub fn create_draft(
		&mut self,
		site: SiteId,
		target: Option<PageId>,
		position: TreePosition,
		title: &str,
		language: &str,
		slug: Option<String>,
		in_navigation: bool,
		user: UserId,
	) -> CmsResult<Page> {
		if let Some(t) = target {
			self.expect_draft(t)?;
		}
		let slug = slug.unwrap_or_else(|| slugify(title));
		if slug.is_empty() {
			return Err(CmsError::InvalidSlug(title.to_string()));
		}
		let parent = self.drafts.attach_parent(target, position)?;
		if self.slug_in_use(site, parent, language, &slug, None) {
			return Err(CmsError::SlugConflict { slug });
		}

		let mut page = Page::new_draft(site, user);
		page.in_navigation = in_navigation;
		self.drafts.insert(page.id, target, position)?;
		self.titles.set(page.id, language, title, &slug);
		self.pages.insert(page.id, page.clone());
		tracing::debug!(page = %page.id, %slug, "created draft page");
		Ok(page)
	}

	/// Create or update the title of a draft for one language
	pub fn set_title(
		&mut self,
		page: PageId,
		language: &str,
		title: &str,
		slug: Option<String>,
		user: UserId,
	) -> CmsResult<Title> {
		let site = self.expect_draft(page)?.site;
		let slug = slug.unwrap_or_else(|| slugify(title));
		if slug.is_empty() {
			return Err(CmsError::InvalidSlug(title.to_string()));
		}
		let parent = self.drafts.node(page)?.parent;
		if self.slug_in_use(site, parent, language, &slug, Some(page)) {
			return Err(CmsError::SlugConflict { slug });
		}
		let record = self.titles.set(page, language, title, &slug);
		self.page_mut(page)?.touch(user);
		Ok(record)
	}

	/// Move a draft (with its subtree) relative to another draft
	pub fn move_draft(
		&mut self,
		id: PageId,
		target: Option<PageId>,
		position: TreePosition,
		user: UserId,
	) -> CmsResult<()> {
		self.expect_draft(id)?;
		if let Some(t) = target {
			self.expect_draft(t)?;
		}
		self.drafts.move_node(id, target, position)?;
		self.page_mut(id)?.touch(user);
		tracing::debug!(page = %id, target = ?target, "moved draft page");
		Ok(())
	}

	/// Delete a draft subtree, cascading to titles and public mirrors.
	///
	/// Returns the removed draft ids (pre-order) so callers can clean up
	/// records of their own keyed by page id.
	pub fn remove_draft_subtree(&mut self, id: PageId) -> CmsResult<Vec<PageId>> {
		self.expect_draft(id)?;
		let removed = self.drafts.remove(id)?;
		for &draft in &removed {
			if let Some(mirror) = self.pages.get(&draft).and_then(|p| p.public_ref)
				&& self.public.contains(mirror)
			{
				self.public.extract(mirror)?;
				self.pages.remove(&mirror);
				self.titles.remove_page(mirror);
			}
			self.titles.remove_page(draft);
			self.pages.remove(&draft);
		}
		tracing::info!(page = %id, count = removed.len(), "deleted draft subtree");
		Ok(removed)
	}
}
