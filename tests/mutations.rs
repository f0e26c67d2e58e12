mod common;

use bytes::Bytes;
use quill::application::follows::{FollowOutcome, UnfollowOutcome};
use quill::application::groups::NewGroup;
use quill::application::media::ImageUpload;
use quill::application::posts::PostDraft;

use common::{CacheMode, TINY_GIF, TestApp};

fn draft(text: &str, group_id: Option<i64>) -> PostDraft {
    PostDraft {
        text: text.to_string(),
        group_id,
        image: None,
    }
}

#[tokio::test]
async fn following_twice_keeps_one_edge() {
    let app = TestApp::builder().build();
    let reader = app.store.add_user("reader");
    let author = app.store.add_user("leo");

    assert_eq!(
        app.follows.follow(&reader, "leo").await.unwrap(),
        FollowOutcome::Followed
    );
    assert_eq!(
        app.follows.follow(&reader, "leo").await.unwrap(),
        FollowOutcome::AlreadyFollowing
    );
    assert_eq!(app.store.follow_edges(reader.id, author.id), 1);
}

#[tokio::test]
async fn following_yourself_is_ignored() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");

    assert_eq!(
        app.follows.follow(&leo, "leo").await.unwrap(),
        FollowOutcome::SelfFollow
    );
    assert_eq!(app.store.follow_edges(leo.id, leo.id), 0);
}

#[tokio::test]
async fn unfollow_without_edge_is_a_no_op() {
    let app = TestApp::builder().build();
    let reader = app.store.add_user("reader");
    app.store.add_user("leo");

    assert_eq!(
        app.follows.unfollow(&reader, "leo").await.unwrap(),
        UnfollowOutcome::NotFollowing
    );
    app.follows.follow(&reader, "leo").await.unwrap();
    assert_eq!(
        app.follows.unfollow(&reader, "leo").await.unwrap(),
        UnfollowOutcome::Unfollowed
    );
}

#[tokio::test]
async fn following_unknown_author_is_not_found() {
    let app = TestApp::builder().build();
    let reader = app.store.add_user("reader");

    let err = app.follows.follow(&reader, "ghost").await.unwrap_err();
    assert!(err.is_not_found());
    let err = app.follows.unfollow(&reader, "ghost").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn only_the_author_may_delete_or_edit() {
    let app = TestApp::builder().build();
    let alice = app.store.add_user("alice");
    let bob = app.store.add_user("bob");
    let post_id = app.store.add_post(&alice, "mine", None);

    let err = app.posts.delete_post(&bob, post_id).await.unwrap_err();
    assert!(err.is_forbidden());
    let err = app
        .posts
        .edit_post(&bob, post_id, draft("hijacked", None))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(app.store.post(post_id).unwrap().text, "mine");

    app.posts.delete_post(&alice, post_id).await.unwrap();
    assert!(app.store.post(post_id).is_none());
}

#[tokio::test]
async fn blank_comment_is_rejected() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");
    let post_id = app.store.add_post(&leo, "hello", None);

    let err = app.posts.add_comment(&leo, post_id, "   ").await.unwrap_err();
    assert_eq!(err.validation_failure().map(|(field, _)| field), Some("text"));
    assert_eq!(app.store.comment_count(post_id), 0);

    app.posts.add_comment(&leo, post_id, " nice ").await.unwrap();
    let detail = app.posts.load_detail(post_id).await.unwrap();
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].text, "nice");
}

#[tokio::test]
async fn comment_on_missing_post_is_not_found() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");
    let err = app.posts.add_comment(&leo, 999, "hi").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn create_validates_text_group_and_image() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");

    let err = app.posts.create_post(&leo, draft(" ", None)).await.unwrap_err();
    assert_eq!(err.validation_failure().map(|(field, _)| field), Some("text"));

    let err = app
        .posts
        .create_post(&leo, draft("hello", Some(404)))
        .await
        .unwrap_err();
    assert_eq!(err.validation_failure().map(|(field, _)| field), Some("group"));

    let bad_image = PostDraft {
        image: Some(ImageUpload {
            filename: "notes.png".into(),
            data: Bytes::from_static(b"plain text"),
        }),
        ..draft("hello", None)
    };
    let err = app.posts.create_post(&leo, bad_image).await.unwrap_err();
    assert_eq!(err.validation_failure().map(|(field, _)| field), Some("image"));

    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn create_stores_image_and_trims_text() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");
    let group = app.store.add_group("cats", "Cats");

    let post = app
        .posts
        .create_post(
            &leo,
            PostDraft {
                text: "  a cat  ".into(),
                group_id: Some(group.id),
                image: Some(ImageUpload {
                    filename: "Cat.GIF".into(),
                    data: Bytes::from_static(TINY_GIF),
                }),
            },
        )
        .await
        .unwrap();

    assert_eq!(post.text, "a cat");
    assert_eq!(post.group_slug(), Some("cats"));
    let image = post.image.expect("stored image");
    assert!(image.starts_with("posts/"));
    assert!(image.ends_with("-cat.gif"));
}

#[tokio::test]
async fn edit_keeps_creation_time_and_image() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");
    let group = app.store.add_group("cats", "Cats");
    let created = app
        .posts
        .create_post(
            &leo,
            PostDraft {
                text: "first".into(),
                group_id: None,
                image: Some(ImageUpload {
                    filename: "a.gif".into(),
                    data: Bytes::from_static(TINY_GIF),
                }),
            },
        )
        .await
        .unwrap();

    let edited = app
        .posts
        .edit_post(&leo, created.id, draft("second", Some(group.id)))
        .await
        .unwrap();

    assert_eq!(edited.text, "second");
    assert_eq!(edited.created_at, created.created_at);
    assert_eq!(edited.image, created.image);
    assert_eq!(edited.group_slug(), Some("cats"));
}

#[tokio::test]
async fn group_admin_derives_slugs_and_rejects_duplicates() {
    let app = TestApp::builder().cache(CacheMode::Disabled).build();

    let group = app
        .groups
        .create_group(NewGroup {
            slug: None,
            title: "Rust Lovers".into(),
            description: "All things Rust".into(),
        })
        .await
        .unwrap();
    assert_eq!(group.slug, "rust-lovers");

    let err = app
        .groups
        .create_group(NewGroup {
            slug: Some("rust-lovers".into()),
            title: "Again".into(),
            description: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

    let err = app
        .groups
        .create_group(NewGroup {
            title: "   ".into(),
            ..NewGroup::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.validation_failure().map(|(field, _)| field), Some("title"));
}

#[tokio::test]
async fn deleting_a_group_keeps_its_posts() {
    let app = TestApp::builder().build();
    let leo = app.store.add_user("leo");
    let group = app.store.add_group("cats", "Cats");
    let post_id = app.store.add_post(&leo, "meow", Some(&group));

    app.groups.delete_group("cats").await.unwrap();
    let post = app.store.post(post_id).expect("post survives");
    assert!(post.group.is_none());

    let err = app.groups.delete_group("cats").await.unwrap_err();
    assert!(err.is_not_found());
}
