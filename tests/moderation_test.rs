//! Tests for the moderation workflow

use std::collections::BTreeSet;

use cms_core::config::CmsConfig;
use cms_core::error::CmsError;
use cms_core::moderation::{
	MODERATE_CHILDREN, MODERATE_DESCENDANTS, MODERATE_PAGE, ModerationEngine, ModerationStatus,
};
use cms_core::pages::{SiteId, UserId};
use cms_core::permissions::{GrantScope, PermissionFlag, PermissionGrants, Principal};
use cms_core::prelude::{Cms, NewPage, PublishOutcome};
use rstest::rstest;
use uuid::Uuid;

async fn setup() -> (Cms, SiteId, UserId) {
	(Cms::default(), Uuid::new_v4(), Uuid::new_v4())
}

// === Engine Unit Tests ===

#[rstest]
#[case(MODERATE_PAGE, 0, true)]
#[case(MODERATE_PAGE, 1, false)]
#[case(MODERATE_CHILDREN, 0, false)]
#[case(MODERATE_CHILDREN, 1, true)]
#[case(MODERATE_CHILDREN, 2, false)]
#[case(MODERATE_DESCENDANTS, 1, false)]
#[case(MODERATE_DESCENDANTS, 2, true)]
#[case(MODERATE_DESCENDANTS, 6, true)]
#[case(MODERATE_PAGE | MODERATE_CHILDREN | MODERATE_DESCENDANTS, 0, true)]
#[case(MODERATE_PAGE | MODERATE_CHILDREN | MODERATE_DESCENDANTS, 3, true)]
fn test_moderator_level_depth_decision_table(#[case] level: u8, #[case] depth: usize, #[case] expected: bool) {
	// Arrange
	let mut engine = ModerationEngine::new();
	let page = Uuid::new_v4();
	let moderator = Uuid::new_v4();
	engine.assign(page, moderator, level);

	// Act - build a chain placing the moderated page `depth` levels up
	let mut chain: Vec<_> = (0..depth).map(|_| Uuid::new_v4()).collect();
	chain.push(page);
	let required = engine.required_for(&chain);

	// Assert
	assert_eq!(required.contains(&moderator), expected);
}

#[rstest]
fn test_approval_completes_when_all_required_have_approved() {
	// Arrange
	let mut engine = ModerationEngine::new();
	let page = Uuid::new_v4();
	let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
	let author = Uuid::new_v4();
	engine.begin(page, BTreeSet::from([m1, m2]), author);

	// Act & Assert
	assert_eq!(engine.approve(page, m1).unwrap(), ModerationStatus::Pending);
	assert_eq!(engine.approve(page, m2).unwrap(), ModerationStatus::Approved);
	assert!(engine.take_approved(page).is_some());
	assert!(engine.pending(page).is_none());
}

#[rstest]
fn test_approval_by_outsider_rejected() {
	// Arrange
	let mut engine = ModerationEngine::new();
	let page = Uuid::new_v4();
	let moderator = Uuid::new_v4();
	engine.begin(page, BTreeSet::from([moderator]), Uuid::new_v4());

	// Act
	let result = engine.approve(page, Uuid::new_v4());

	// Assert - the pending state is untouched
	assert!(matches!(result, Err(CmsError::PermissionDenied(_))));
	assert_eq!(engine.pending(page).unwrap().status, ModerationStatus::Pending);
	assert!(engine.pending(page).unwrap().approved.is_empty());
}

#[rstest]
fn test_rejection_discards_pending_state() {
	// Arrange
	let mut engine = ModerationEngine::new();
	let page = Uuid::new_v4();
	let moderator = Uuid::new_v4();
	engine.begin(page, BTreeSet::from([moderator]), Uuid::new_v4());

	// Act
	let status = engine.reject(page, moderator).unwrap();

	// Assert
	assert_eq!(status, ModerationStatus::Rejected);
	assert!(engine.pending(page).is_none());
	assert!(matches!(
		engine.approve(page, moderator),
		Err(CmsError::NoPendingModeration(_))
	));
}

// === Service Integration ===

/// Root page A carries a moderator for its children; a child published by a
/// different user must wait for that moderator, then appear at level 1.
#[rstest]
#[tokio::test]
async fn test_child_publish_waits_for_ancestor_moderator() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let moderator = Uuid::new_v4();
	let editor = Uuid::new_v4();

	let a = cms.create_page(NewPage::new(site, "Section"), admin).await.unwrap();
	match cms.publish(a.id, admin).await.unwrap() {
		PublishOutcome::Published { .. } => {}
		other => panic!("root publish should be immediate: {other:?}"),
	}
	cms.assign_moderator(a.id, moderator, MODERATE_CHILDREN, admin)
		.await
		.unwrap();
	cms.assign_permission(
		a.id,
		Principal::User(editor),
		GrantScope::PageAndDescendants,
		PermissionGrants::new()
			.allow(PermissionFlag::Add)
			.allow(PermissionFlag::Publish),
		admin,
	)
	.await
	.unwrap();

	let b = cms
		.create_page(NewPage::new(site, "Article").under(a.id), editor)
		.await
		.unwrap();

	// Act - the editor's publish is intercepted
	let outcome = cms.publish(b.id, editor).await.unwrap();
	let PublishOutcome::Pending(state) = outcome else {
		panic!("publish should be held for moderation");
	};

	// Assert
	assert_eq!(state.required, BTreeSet::from([moderator]));
	assert!(!cms.page(b.id).await.unwrap().is_published());

	// Act - the moderator approves and the deferred publish runs
	let approved = cms.approve(b.id, moderator).await.unwrap();
	let PublishOutcome::Published { public } = approved else {
		panic!("approval should complete the publish");
	};
	assert_eq!(cms.level(public).await.unwrap(), 1);
	assert!(cms.mirror_aligned(b.id).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_own_page_moderation_requires_self_mask() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let moderator = Uuid::new_v4();
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	cms.assign_moderator(root.id, moderator, MODERATE_PAGE, admin)
		.await
		.unwrap();

	// Act
	let outcome = cms.publish(root.id, admin).await.unwrap();

	// Assert
	assert!(matches!(outcome, PublishOutcome::Pending(_)));
	assert_eq!(cms.moderation_mask(root.id).await.unwrap(), MODERATE_PAGE);
	assert_eq!(
		cms.required_approvers(root.id).await.unwrap(),
		BTreeSet::from([moderator])
	);
}

#[rstest]
#[tokio::test]
async fn test_children_mask_does_not_gate_the_page_itself() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let moderator = Uuid::new_v4();
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	cms.assign_moderator(root.id, moderator, MODERATE_CHILDREN, admin)
		.await
		.unwrap();

	// Act - the page itself is not covered at depth 0
	let outcome = cms.publish(root.id, admin).await.unwrap();

	// Assert
	assert!(matches!(outcome, PublishOutcome::Published { .. }));
	assert_eq!(cms.moderation_mask(root.id).await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn test_rejection_keeps_prior_public_state() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let moderator = Uuid::new_v4();
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	let PublishOutcome::Published { public } = cms.publish(root.id, admin).await.unwrap() else {
		panic!("first publish is immediate");
	};

	// Moderate from now on, edit, and request a republish
	cms.assign_moderator(root.id, moderator, MODERATE_PAGE, admin)
		.await
		.unwrap();
	cms.set_title(root.id, "en", "Home v2", None, admin).await.unwrap();
	let outcome = cms.publish(root.id, admin).await.unwrap();
	assert!(matches!(outcome, PublishOutcome::Pending(_)));

	// Act
	let status = cms.reject(root.id, moderator).await.unwrap();

	// Assert - the mirror still carries the first publication
	assert_eq!(status, ModerationStatus::Rejected);
	assert_eq!(cms.title(public, "en").await.unwrap().title, "Home");
	assert!(cms.pending_moderation(root.id).await.unwrap().is_none());
}

#[rstest]
#[tokio::test]
async fn test_repeated_publish_request_resets_approvals() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	cms.assign_moderator(root.id, m1, MODERATE_PAGE, admin).await.unwrap();
	cms.assign_moderator(root.id, m2, MODERATE_PAGE, admin).await.unwrap();

	cms.publish(root.id, admin).await.unwrap();
	let first = cms.approve(root.id, m1).await.unwrap();
	assert!(matches!(first, PublishOutcome::Pending(_)));

	// Act - a second request starts the round over
	cms.publish(root.id, admin).await.unwrap();

	// Assert
	let state = cms.pending_moderation(root.id).await.unwrap().unwrap();
	assert!(state.approved.is_empty());
	assert_eq!(state.outstanding(), BTreeSet::from([m1, m2]));
}

#[rstest]
#[tokio::test]
async fn test_moderation_disabled_publishes_immediately() {
	// Arrange
	let config = CmsConfig {
		moderation_enabled: false,
		..CmsConfig::default()
	};
	let cms = Cms::new(config);
	let site = Uuid::new_v4();
	let admin = Uuid::new_v4();
	let moderator = Uuid::new_v4();
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	cms.assign_moderator(root.id, moderator, MODERATE_PAGE, admin)
		.await
		.unwrap();

	// Act
	let outcome = cms.publish(root.id, admin).await.unwrap();

	// Assert
	assert!(matches!(outcome, PublishOutcome::Published { .. }));
	assert_eq!(cms.moderation_mask(root.id).await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn test_approve_without_pending_state_fails() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();

	// Act
	let result = cms.approve(root.id, admin).await;

	// Assert
	assert!(matches!(result, Err(CmsError::NoPendingModeration(_))));
}

#[rstest]
#[tokio::test]
async fn test_deep_descendant_requires_descendants_mask() {
	// Arrange
	let (cms, site, admin) = setup().await;
	let moderator = Uuid::new_v4();
	let root = cms.create_page(NewPage::new(site, "Home"), admin).await.unwrap();
	let child = cms
		.create_page(NewPage::new(site, "Child").under(root.id), admin)
		.await
		.unwrap();
	let grandchild = cms
		.create_page(NewPage::new(site, "Grandchild").under(child.id), admin)
		.await
		.unwrap();
	cms.assign_moderator(root.id, moderator, MODERATE_DESCENDANTS, admin)
		.await
		.unwrap();
	cms.publish(root.id, admin).await.unwrap();
	let child_outcome = cms.publish(child.id, admin).await.unwrap();

	// Assert - depth 1 is not covered by the descendants bit
	assert!(matches!(child_outcome, PublishOutcome::Published { .. }));

	// Act - depth 2 is
	let outcome = cms.publish(grandchild.id, admin).await.unwrap();
	let PublishOutcome::Pending(state) = outcome else {
		panic!("grandchild publish must be moderated");
	};
	assert_eq!(state.required, BTreeSet::from([moderator]));
}
