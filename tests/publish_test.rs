//! Tests for the draft/public publish protocol

use cms_core::error::CmsError;
use cms_core::pages::{Page, SiteId, TreePosition, UserId};
use cms_core::prelude::{Cms, NewPage, PublishOutcome};
use rstest::rstest;
use uuid::Uuid;

async fn setup() -> (Cms, SiteId, UserId) {
	(Cms::default(), Uuid::new_v4(), Uuid::new_v4())
}

async fn publish_ok(cms: &Cms, page: &Page, user: UserId) -> cms_core::pages::PageId {
	match cms.publish(page.id, user).await.unwrap() {
		PublishOutcome::Published { public } => public,
		PublishOutcome::Pending(state) => panic!("unexpected pending publish: {state:?}"),
	}
}

#[rstest]
#[tokio::test]
async fn test_publish_creates_mirror_with_matching_titles() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();

	// Act
	let public = publish_ok(&cms, &home, editor).await;

	// Assert
	let draft = cms.page(home.id).await.unwrap();
	let mirror = cms.page(public).await.unwrap();
	assert_eq!(draft.public_ref, Some(public));
	assert_eq!(mirror.draft_ref, Some(home.id));
	assert!(!mirror.is_draft);
	assert_eq!(cms.level(public).await.unwrap(), 0);

	let title = cms.title(public, "en").await.unwrap();
	assert_eq!(title.title, "Home");
	assert_eq!(title.slug, "home");
}

#[rstest]
#[tokio::test]
async fn test_publish_child_mirrors_level() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let about = cms
		.create_page(NewPage::new(site, "About").under(home.id), editor)
		.await
		.unwrap();
	publish_ok(&cms, &home, editor).await;

	// Act
	let public = publish_ok(&cms, &about, editor).await;

	// Assert
	assert_eq!(cms.level(about.id).await.unwrap(), 1);
	assert_eq!(cms.level(public).await.unwrap(), 1);
	assert!(cms.mirror_aligned(about.id).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_publish_under_unpublished_parent_fails() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let about = cms
		.create_page(NewPage::new(site, "About").under(home.id), editor)
		.await
		.unwrap();

	// Act
	let result = cms.publish(about.id, editor).await;

	// Assert
	assert!(matches!(result, Err(CmsError::ParentNotPublished(p)) if p == about.id));
	assert!(!cms.page(about.id).await.unwrap().is_published());
}

#[rstest]
#[tokio::test]
async fn test_public_siblings_skip_unpublished_drafts() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let mut children = Vec::new();
	for name in ["First", "Second", "Third"] {
		children.push(
			cms.create_page(NewPage::new(site, name).under(home.id), editor)
				.await
				.unwrap(),
		);
	}
	let home_public = publish_ok(&cms, &home, editor).await;

	// Act - publish only the outer two
	let first_public = publish_ok(&cms, &children[0], editor).await;
	let third_public = publish_ok(&cms, &children[2], editor).await;

	// Assert - the unpublished middle child is skipped, not a gap
	assert_eq!(
		cms.children(home_public).await.unwrap(),
		vec![first_public, third_public]
	);
	assert!(cms.mirror_aligned(children[0].id).await.unwrap());
	assert!(cms.mirror_aligned(children[2].id).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_republish_after_move_realigns_mirror() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let a = cms
		.create_page(NewPage::new(site, "Alpha").under(home.id), editor)
		.await
		.unwrap();
	let b = cms
		.create_page(NewPage::new(site, "Beta").under(home.id), editor)
		.await
		.unwrap();
	let home_public = publish_ok(&cms, &home, editor).await;
	let a_public = publish_ok(&cms, &a, editor).await;
	let b_public = publish_ok(&cms, &b, editor).await;
	assert_eq!(cms.children(home_public).await.unwrap(), vec![a_public, b_public]);

	// Act - move beta before alpha, then republish it
	cms.move_page(b.id, Some(a.id), TreePosition::Left, editor)
		.await
		.unwrap();
	let b_public_again = publish_ok(&cms, &b, editor).await;

	// Assert
	assert_eq!(b_public_again, b_public);
	assert_eq!(cms.children(home_public).await.unwrap(), vec![b_public, a_public]);
	assert!(cms.mirror_aligned(b.id).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_republish_parent_refreshes_changed_descendants_only() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let news = cms
		.create_page(NewPage::new(site, "News").under(home.id), editor)
		.await
		.unwrap();
	let team = cms
		.create_page(NewPage::new(site, "Team").under(home.id), editor)
		.await
		.unwrap();
	publish_ok(&cms, &home, editor).await;
	let news_public = publish_ok(&cms, &news, editor).await;
	let team_public = publish_ok(&cms, &team, editor).await;

	// Act - edit one child draft, then republish the parent
	cms.set_title(news.id, "en", "Breaking News", None, editor)
		.await
		.unwrap();
	publish_ok(&cms, &home, editor).await;

	// Assert - the edited child's mirror is refreshed, the other untouched
	assert_eq!(cms.title(news_public, "en").await.unwrap().title, "Breaking News");
	assert_eq!(cms.title(team_public, "en").await.unwrap().title, "Team");
}

#[rstest]
#[tokio::test]
async fn test_publish_never_force_publishes_descendants() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let hidden = cms
		.create_page(NewPage::new(site, "Hidden").under(home.id), editor)
		.await
		.unwrap();

	// Act
	let home_public = publish_ok(&cms, &home, editor).await;

	// Assert
	assert!(!cms.page(hidden.id).await.unwrap().is_published());
	assert!(cms.children(home_public).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_unpublish_removes_mirror_and_keeps_draft() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let public = publish_ok(&cms, &home, editor).await;

	// Act
	cms.unpublish(home.id, editor).await.unwrap();

	// Assert
	assert!(!cms.page(home.id).await.unwrap().is_published());
	assert!(matches!(cms.page(public).await, Err(CmsError::PageNotFound(_))));
	assert!(cms.public_roots().await.is_empty());

	// Act - unpublishing again is an error
	let again = cms.unpublish(home.id, editor).await;
	assert!(matches!(again, Err(CmsError::NotPublished(_))));
}

#[rstest]
#[tokio::test]
async fn test_unpublish_parent_does_not_cascade_to_descendants() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let about = cms
		.create_page(NewPage::new(site, "About").under(home.id), editor)
		.await
		.unwrap();
	publish_ok(&cms, &home, editor).await;
	let about_public = publish_ok(&cms, &about, editor).await;

	// Act
	cms.unpublish(home.id, editor).await.unwrap();

	// Assert - the child mirror stays published, spliced to root level
	assert!(cms.page(about.id).await.unwrap().is_published());
	assert_eq!(cms.public_roots().await, vec![about_public]);

	// Act - republishing the parent re-nests the child mirror
	let home_public = publish_ok(&cms, &cms.page(home.id).await.unwrap(), editor).await;
	assert_eq!(cms.children(home_public).await.unwrap(), vec![about_public]);
	assert_eq!(cms.level(about_public).await.unwrap(), 1);
	assert!(cms.mirror_aligned(about.id).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_publish_unpublish_publish_round_trip_is_stable() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	cms.set_title(home.id, "de", "Startseite", None, editor)
		.await
		.unwrap();

	let first_public = publish_ok(&cms, &home, editor).await;
	let first_titles: Vec<_> = cms
		.titles(first_public)
		.await
		.unwrap()
		.into_iter()
		.map(|t| (t.language, t.title, t.slug))
		.collect();

	// Act
	cms.unpublish(home.id, editor).await.unwrap();
	let second_public = publish_ok(&cms, &cms.page(home.id).await.unwrap(), editor).await;

	// Assert - content identical to the first publication
	let second_titles: Vec<_> = cms
		.titles(second_public)
		.await
		.unwrap()
		.into_iter()
		.map(|t| (t.language, t.title, t.slug))
		.collect();
	assert_eq!(first_titles, second_titles);
}

#[rstest]
#[tokio::test]
async fn test_delete_draft_cascades_to_mirrors() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let about = cms
		.create_page(NewPage::new(site, "About").under(home.id), editor)
		.await
		.unwrap();
	let home_public = publish_ok(&cms, &home, editor).await;
	let about_public = publish_ok(&cms, &about, editor).await;

	// Act
	cms.delete_page(home.id, editor).await.unwrap();

	// Assert - drafts and mirrors are gone
	for id in [home.id, about.id, home_public, about_public] {
		assert!(matches!(cms.page(id).await, Err(CmsError::PageNotFound(_))));
	}
	assert!(cms.root_pages().await.is_empty());
	assert!(cms.public_roots().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_structural_operations_reject_public_targets() {
	// Arrange
	let (cms, site, editor) = setup().await;
	let home = cms.create_page(NewPage::new(site, "Home"), editor).await.unwrap();
	let public = publish_ok(&cms, &home, editor).await;

	// Act - grant the editor everything on the mirror id, then try to use it
	let result = cms
		.create_page(NewPage::new(site, "Child").under(public), editor)
		.await;

	// Assert
	assert!(matches!(result, Err(CmsError::StructuralInconsistency(_))));
}
