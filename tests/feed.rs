mod common;

use quill::application::feed::{FeedSelector, FeedSubject};
use quill::application::pagination::RequestedPage;

use common::{CacheMode, TestApp};

#[tokio::test]
async fn page_counts_follow_ceiling_division() {
    for per_page in [1u32, 3, 10] {
        for total in [0usize, 1, 9, 10, 11, 20, 23] {
            let app = TestApp::builder()
                .per_page(per_page)
                .cache(CacheMode::Disabled)
                .build();
            let author = app.store.add_user("leo");
            for i in 0..total {
                app.store.add_post(&author, &format!("post {i}"), None);
            }

            let feed = app.feeds.resolve(&FeedSelector::Global).await.unwrap();
            let first = app
                .feeds
                .query_page(&feed, RequestedPage::FIRST)
                .await
                .unwrap();
            let expected_pages = total.div_ceil(per_page as usize).max(1) as u32;
            assert_eq!(first.window.total_pages, expected_pages, "N={per_page} T={total}");

            let last = app
                .feeds
                .query_page(&feed, RequestedPage::new(expected_pages))
                .await
                .unwrap();
            let remainder = total % per_page as usize;
            let expected_last = if total == 0 {
                0
            } else if remainder == 0 {
                per_page as usize
            } else {
                remainder
            };
            assert_eq!(last.items.len(), expected_last, "N={per_page} T={total}");
        }
    }
}

#[tokio::test]
async fn feed_is_newest_first() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();
    let author = app.store.add_user("leo");
    let older = app.store.add_post(&author, "older", None);
    let newer = app.store.add_post(&author, "newer", None);

    let feed = app.feeds.resolve(&FeedSelector::Global).await.unwrap();
    let page = app
        .feeds
        .query_page(&feed, RequestedPage::FIRST)
        .await
        .unwrap();
    let ids: Vec<i64> = page.items.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![newer, older]);
}

#[tokio::test]
async fn group_feed_splits_thirteen_posts_into_ten_and_three() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();
    let author = app.store.add_user("leo");
    let group = app.store.add_group("test-slug", "Test group");
    let other = app.store.add_group("other", "Other group");
    for i in 0..13 {
        app.store.add_post(&author, &format!("grouped {i}"), Some(&group));
    }
    app.store.add_post(&author, "elsewhere", Some(&other));
    app.store.add_post(&author, "ungrouped", None);

    let feed = app
        .feeds
        .resolve(&FeedSelector::Group("test-slug".into()))
        .await
        .unwrap();
    assert!(matches!(feed.subject, FeedSubject::Group(ref g) if g.id == group.id));

    let first = app
        .feeds
        .query_page(&feed, RequestedPage::FIRST)
        .await
        .unwrap();
    let second = app
        .feeds
        .query_page(&feed, RequestedPage::new(2))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(second.items.len(), 3);
    assert_eq!(first.window.total_count, 13);
    assert!(
        first
            .items
            .iter()
            .chain(second.items.iter())
            .all(|post| post.group_slug() == Some("test-slug"))
    );
}

#[tokio::test]
async fn out_of_range_pages_are_clamped() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();
    let author = app.store.add_user("leo");
    for i in 0..12 {
        app.store.add_post(&author, &format!("post {i}"), None);
    }
    let feed = app.feeds.resolve(&FeedSelector::Global).await.unwrap();

    for raw in [Some("0"), Some("-1"), Some("abc"), None] {
        let page = app
            .feeds
            .query_page(&feed, RequestedPage::parse(raw))
            .await
            .unwrap();
        assert_eq!(page.window.current_page, 1, "{raw:?}");
        assert_eq!(page.items.len(), 10);
    }

    let beyond = app
        .feeds
        .query_page(&feed, RequestedPage::new(50))
        .await
        .unwrap();
    assert_eq!(beyond.window.current_page, 2);
    assert_eq!(beyond.items.len(), 2);
}

#[tokio::test]
async fn profile_feed_holds_only_the_authors_posts() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    app.store.add_post(&leo, "by leo", None);
    app.store.add_post(&mia, "by mia", None);
    app.store.add_post(&leo, "by leo again", None);

    let feed = app
        .feeds
        .resolve(&FeedSelector::Author("leo".into()))
        .await
        .unwrap();
    assert_eq!(app.feeds.count(&feed).await.unwrap(), 2);
    let page = app
        .feeds
        .query_page(&feed, RequestedPage::FIRST)
        .await
        .unwrap();
    assert!(page.items.iter().all(|post| post.author.id == leo.id));
}

#[tokio::test]
async fn follow_feed_holds_followed_authors_only() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();
    let reader = app.store.add_user("reader");
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    app.store.add_post(&leo, "by leo", None);
    app.store.add_post(&mia, "by mia", None);
    app.store.add_post(&reader, "by reader", None);

    app.follows.follow(&reader, "leo").await.unwrap();

    let feed = app
        .feeds
        .resolve(&FeedSelector::Followed(reader.id))
        .await
        .unwrap();
    let page = app
        .feeds
        .query_page(&feed, RequestedPage::FIRST)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].author.username, "leo");
}

#[tokio::test]
async fn unknown_group_or_author_is_not_found() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();

    let err = app
        .feeds
        .resolve(&FeedSelector::Group("missing".into()))
        .await
        .expect_err("unknown group");
    assert!(err.is_not_found());

    let err = app
        .feeds
        .resolve(&FeedSelector::Author("ghost".into()))
        .await
        .expect_err("unknown author");
    assert!(err.is_not_found());
}
