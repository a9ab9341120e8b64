use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use image::{ImageFormat, Rgba, RgbaImage};

use super::*;
use crate::data::MemoryBackend;
use crate::feed::{ItemStatus, LoadMode};
use crate::media::{MediaFetcher, PreviewOwner, Resolution};
use crate::post::MediaAttachment;
use crate::reconcile::is_temp_id;

struct StubFetcher {
    fail: bool,
}

impl MediaFetcher for StubFetcher {
    fn fetch(&self, url: &str, _max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>> {
        if self.fail {
            bail!("offline: {url}");
        }
        let image = RgbaImage::from_pixel(8, 8, Rgba([40, 80, 120, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn extract_frames(&self, _url: &str, _max_frames: usize, _timeout: Duration) -> Result<Vec<u8>> {
        bail!("no frame tool")
    }
}

fn post_at(id: &str, account: &str, minute: i64, content: &str) -> Post {
    Post {
        id: id.to_string(),
        account_id: account.to_string(),
        display_name: account.to_string(),
        handle: format!("{account}@example.social"),
        content: content.to_string(),
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + chrono::Duration::minutes(minute),
        url: format!("https://example.social/@{account}/{id}"),
        liked: false,
        likes_count: 2,
        replies_count: 0,
        in_reply_to_id: None,
        media: Vec::new(),
        is_mine: account == "me",
    }
}

/// Backend with `count` tagged posts `p001..`, oldest first.
fn seeded(count: usize) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new("me", "rust"));
    backend.add_profile(Profile {
        id: "ada".into(),
        display_name: "Ada".into(),
        handle: "ada@example.social".into(),
        ..Profile::default()
    });
    for n in 1..=count {
        backend.add_post(post_at(
            &format!("p{n:03}"),
            "ada",
            n as i64,
            &format!("post {n} #rust"),
        ));
    }
    backend
}

fn model_with(backend: Arc<MemoryBackend>, fetcher: StubFetcher, media_enabled: bool) -> Model {
    let services = Services::from_backend(backend, Arc::new(fetcher));
    Model::new(
        services,
        Options {
            media_enabled,
            ..Options::default()
        },
    )
}

fn model_for(backend: Arc<MemoryBackend>) -> Model {
    model_with(backend, StubFetcher { fail: true }, false)
}

/// Runs commands, feeding each result back in, until nothing is pending.
fn drain(model: &mut Model, commands: Vec<Command>) {
    let mut queue: VecDeque<Command> = commands.into();
    while let Some(command) = queue.pop_front() {
        let message = command.run();
        queue.extend(model.update(message));
    }
}

fn started(backend: Arc<MemoryBackend>) -> Model {
    let mut model = model_for(backend);
    let commands = model.init();
    drain(&mut model, commands);
    model
}

fn feed_ids(model: &Model) -> Vec<String> {
    model
        .state()
        .feed
        .items
        .iter()
        .map(|item| item.post.id.clone())
        .collect()
}

fn select(model: &mut Model, id: &str) {
    let index = model
        .state()
        .feed
        .items
        .iter()
        .position(|item| item.post.id == id)
        .expect("post loaded");
    let delta = index as isize - model.state().feed.cursor as isize;
    model.update(Message::MoveCursor(delta));
}

#[test]
fn init_loads_session_and_first_page() {
    let model = started(seeded(25));
    let state = model.state();
    assert_eq!(state.session.account_id.as_deref(), Some("me"));
    assert_eq!(state.feed.items.len(), 20);
    assert_eq!(state.feed.items[0].post.id, "p025");
    let paging = state.feed.paging().expect("paging for view");
    assert!(paging.has_more);
    assert_eq!(paging.oldest_id.as_deref(), Some("p006"));
    assert!(!paging.is_loading());
}

#[test]
fn stale_feed_results_leave_state_untouched() {
    let mut model = started(seeded(5));
    let before = model.state().clone();
    let seq = before.feed.paging().map(|paging| paging.seq).unwrap_or_default();
    let late = || -> Result<Vec<Post>, String> { Ok(vec![post_at("x1", "ada", 99, "late #rust")]) };

    let stale = [
        Message::FeedLoaded {
            view: FeedView::PrimaryTag,
            query_key: "tag:rust".into(),
            seq: seq - 1,
            mode: LoadMode::Initial,
            result: late(),
        },
        Message::FeedLoaded {
            view: FeedView::PrimaryTag,
            query_key: "tag:golang".into(),
            seq,
            mode: LoadMode::Initial,
            result: late(),
        },
        Message::FeedLoaded {
            view: FeedView::Trending,
            query_key: "trending".into(),
            seq,
            mode: LoadMode::Older,
            result: Err("boom".into()),
        },
    ];
    for message in stale {
        assert!(model.update(message).is_empty());
        assert_eq!(model.state(), &before);
    }
}

#[test]
fn page_from_previous_view_is_dropped_after_switch() {
    let mut model = model_for(seeded(5));
    let mut commands = model.init();
    let tag_fetch = commands.pop().expect("feed fetch");
    drain(&mut model, commands);

    let switch = model.update(Message::SwitchView(FeedView::Trending));
    assert_eq!(model.state().feed.view, FeedView::Trending);

    let late = tag_fetch.run();
    assert!(model.update(late).is_empty());
    assert!(model.state().feed.items.is_empty());

    drain(&mut model, switch);
    assert_eq!(model.state().feed.items.len(), 5);
    let paging = model.state().feed.paging().expect("trending paging");
    assert!(!paging.has_more);
}

#[test]
fn prefetch_near_end_keeps_selection_and_anchor() {
    let backend = seeded(25);
    let mut model = started(backend.clone());
    assert!(model.state().feed.paging().map(|p| p.has_more).unwrap_or(false));

    let commands = model.update(Message::MoveCursor(17));
    assert_eq!(model.state().feed.cursor, 17);
    assert_eq!(commands.len(), 1);
    assert!(model.state().feed.is_loading());

    let selected = model.state().feed.items[17].post.id.clone();
    let top = model.visible_indices()[model.state().feed.offset];
    let top_id = model.state().feed.items[top].post.id.clone();
    let offset = model.state().feed.offset;
    let last_id = model.state().feed.items[19].post.id.clone();

    drain(&mut model, commands);

    assert!(backend
        .calls()
        .contains(&format!("tag_page(rust,20,{last_id})")));
    let state = model.state();
    assert_eq!(state.feed.items.len(), 25);
    assert!(!state.feed.paging().map(|p| p.has_more).unwrap_or(true));
    assert_eq!(state.feed.items[state.feed.cursor].post.id, selected);
    assert_eq!(state.feed.offset, offset);
    let top = model.visible_indices()[state.feed.offset];
    assert_eq!(state.feed.items[top].post.id, top_id);
}

#[test]
fn manual_load_more_reports_state() {
    let mut model = started(seeded(5));
    model.update(Message::LoadMore);
    assert_eq!(model.state().status, "No more posts.");

    let mut model = started(seeded(25));
    let commands = model.update(Message::LoadMore);
    assert_eq!(commands.len(), 1);
    assert!(model.update(Message::LoadMore).is_empty());
    assert_eq!(model.state().status, "Already loading…");
}

#[test]
fn optimistic_create_reconciles_with_server_copy() {
    let mut model = started(seeded(3));
    let commands = model.update(Message::CreatePost("hello there".into()));
    let head = &model.state().feed.items[0];
    assert!(is_temp_id(&head.post.id));
    assert_eq!(head.status, ItemStatus::PendingCreate);

    drain(&mut model, commands);
    let matching: Vec<&FeedItem> = model
        .state()
        .feed
        .items
        .iter()
        .filter(|item| item.post.content.contains("hello there"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].status, ItemStatus::Normal);
    assert_eq!(matching[0].post.content, "hello there #rust");
    assert!(!is_temp_id(&matching[0].post.id));
}

#[test]
fn empty_post_never_reaches_the_network() {
    let backend = seeded(1);
    let mut model = started(backend.clone());
    let calls = backend.calls().len();
    assert!(model.update(Message::CreatePost("   ".into())).is_empty());
    assert_eq!(backend.calls().len(), calls);

    model.update(Message::OpenCompose(ComposeKind::New));
    assert!(model.update(Message::ModalSubmit).is_empty());
    assert!(model.has_modal_open());
    assert_eq!(model.state().status, "Nothing to post.");
}

#[test]
fn failed_create_stays_visible_and_can_be_retried() {
    let backend = seeded(2);
    let mut model = started(backend.clone());
    backend.fail_next("create");
    let commands = model.update(Message::CreatePost("draft".into()));
    drain(&mut model, commands);

    let failed = model.state().feed.items[0].clone();
    assert_eq!(failed.status, ItemStatus::Failed);
    assert!(failed.error.is_some());

    let retry = model.update(Message::RetryItem(failed.post.id.clone()));
    assert_eq!(model.state().feed.items[0].status, ItemStatus::PendingCreate);
    drain(&mut model, retry);
    assert_eq!(model.state().feed.items[0].status, ItemStatus::Normal);
    assert_eq!(model.state().feed.items.len(), 3);
}

#[test]
fn failed_edit_restores_previous_content() {
    let backend = seeded(2);
    let mut model = started(backend.clone());
    let commands = model.update(Message::EditPost {
        id: "p001".into(),
        content: "rewritten".into(),
    });
    let item = model.state().feed.items.iter().find(|i| i.post.id == "p001").cloned();
    let item = item.expect("edited item");
    assert_eq!(item.post.content, "rewritten");
    assert_eq!(item.status, ItemStatus::PendingUpdate);

    backend.fail_next("edit");
    drain(&mut model, commands);
    let item = model.state().feed.items.iter().find(|i| i.post.id == "p001").cloned();
    let item = item.expect("edited item");
    assert_eq!(item.post.content, "post 1 #rust");
    assert_eq!(item.status, ItemStatus::Failed);
}

#[test]
fn delete_removes_on_success_and_marks_failure() {
    let backend = seeded(3);
    let mut model = started(backend.clone());

    backend.fail_next("delete");
    let commands = model.update(Message::DeletePost("p002".into()));
    let status = |model: &Model| {
        model
            .state()
            .feed
            .items
            .iter()
            .find(|item| item.post.id == "p002")
            .map(|item| item.status)
    };
    assert_eq!(status(&model), Some(ItemStatus::PendingDelete));
    drain(&mut model, commands);
    assert_eq!(status(&model), Some(ItemStatus::Failed));

    let retry = model.update(Message::RetryItem("p002".into()));
    assert_eq!(status(&model), Some(ItemStatus::PendingDelete));
    drain(&mut model, retry);
    assert_eq!(status(&model), None);
    assert_eq!(feed_ids(&model), vec!["p003", "p001"]);
}

fn thread_backend() -> Arc<MemoryBackend> {
    let backend = seeded(3);
    let mut reply = post_at("r1", "bob", 10, "agreed #rust");
    reply.in_reply_to_id = Some("p002".into());
    backend.add_post(reply);
    backend
}

#[test]
fn like_updates_every_copy_and_twice_restores() {
    let mut model = started(thread_backend());
    assert_eq!(feed_ids(&model), vec!["r1", "p003", "p002", "p001"]);
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);
    assert!(model.is_detail_active());
    assert_eq!(model.state().detail.replies[0].post.id, "r1");

    let copies = |model: &Model, id: &str| -> Vec<(bool, u64)> {
        let state = model.state();
        state
            .feed
            .items
            .iter()
            .map(|item| &item.post)
            .chain(state.detail.replies.iter().map(|item| &item.post))
            .chain(state.detail.focus.iter())
            .chain(
                state
                    .detail
                    .cache
                    .get("p002")
                    .into_iter()
                    .flat_map(|entry| entry.descendants.iter()),
            )
            .filter(|post| post.id == id)
            .map(|post| (post.liked, post.likes_count))
            .collect()
    };

    for id in ["r1", "p002"] {
        let like = model.update(Message::ToggleLike(id.into()));
        let liked = copies(&model, id);
        assert!(liked.len() >= 2);
        assert!(liked.iter().all(|copy| *copy == (true, 3)));
        drain(&mut model, like);

        let unlike = model.update(Message::ToggleLike(id.into()));
        drain(&mut model, unlike);
        assert!(copies(&model, id).iter().all(|copy| *copy == (false, 2)));
    }
    assert_eq!(copies(&model, "r1").len(), 3);
}

#[test]
fn failed_like_is_reverted_everywhere() {
    let backend = thread_backend();
    let mut model = started(backend.clone());
    backend.fail_next("like");
    let like = model.update(Message::ToggleLike("r1".into()));
    drain(&mut model, like);
    let item = &model.state().feed.items[0];
    assert!(!item.post.liked);
    assert_eq!(item.post.likes_count, 2);
}

#[test]
fn reply_edit_and_delete_track_status_in_thread() {
    let backend = thread_backend();
    let mut model = started(backend.clone());
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);

    let reply = |model: &Model| {
        model
            .state()
            .detail
            .replies
            .iter()
            .find(|item| item.post.id == "r1")
            .map(|item| (item.status, item.error.clone(), item.post.content.clone()))
            .expect("reply in thread")
    };

    backend.fail_next("delete");
    let delete = model.update(Message::DeletePost("r1".into()));
    assert_eq!(reply(&model).0, ItemStatus::PendingDelete);
    drain(&mut model, delete);
    let (status, error, _) = reply(&model);
    assert_eq!(status, ItemStatus::Failed);
    assert!(error.is_some());

    backend.fail_next("edit");
    let edit = model.update(Message::EditPost {
        id: "r1".into(),
        content: "changed".into(),
    });
    let (status, error, content) = reply(&model);
    assert_eq!(status, ItemStatus::PendingUpdate);
    assert!(error.is_none());
    assert_eq!(content, "changed");
    drain(&mut model, edit);
    let (status, error, content) = reply(&model);
    assert_eq!(status, ItemStatus::Failed);
    assert!(error.is_some());
    assert_eq!(content, "agreed #rust");

    let edit = model.update(Message::EditPost {
        id: "r1".into(),
        content: "changed".into(),
    });
    drain(&mut model, edit);
    let (status, error, content) = reply(&model);
    assert_eq!(status, ItemStatus::Normal);
    assert!(error.is_none());
    assert_eq!(content, "changed");
}

#[test]
fn thread_for_another_post_is_ignored() {
    let mut model = started(thread_backend());
    select(&mut model, "p002");
    model.update(Message::OpenSelected);
    let before = model.state().clone();
    let commands = model.update(Message::ThreadLoaded {
        thread_id: "p001".into(),
        result: Ok(crate::post::ThreadContext::default()),
    });
    assert!(commands.is_empty());
    assert_eq!(model.state(), &before);
}

#[test]
fn reply_is_optimistic_and_reconciled_in_open_thread() {
    let mut model = started(thread_backend());
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);

    let send = model.update(Message::Reply {
        parent_id: "r1".into(),
        content: "me too".into(),
    });
    let pending = model
        .state()
        .detail
        .replies
        .iter()
        .find(|item| item.post.content == "me too")
        .cloned()
        .expect("optimistic reply");
    assert_eq!(pending.status, ItemStatus::PendingCreate);
    assert!(model
        .state()
        .detail
        .cache
        .get("p002")
        .map(|entry| entry.contains(&pending.post.id))
        .unwrap_or(false));

    drain(&mut model, send);
    let replies: Vec<&FeedItem> = model
        .state()
        .detail
        .replies
        .iter()
        .filter(|item| item.post.content == "me too")
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, ItemStatus::Normal);
    assert!(!is_temp_id(&replies[0].post.id));
    let ids: Vec<&str> = model
        .state()
        .detail
        .replies
        .iter()
        .map(|item| item.post.id.as_str())
        .collect();
    assert_eq!(ids[0], "r1");
}

#[test]
fn reply_to_unrevealed_reply_still_shows_in_thread() {
    let backend = thread_backend();
    let mut second = post_at("r2", "bob", 11, "same here #rust");
    second.in_reply_to_id = Some("p002".into());
    backend.add_post(second);
    let services = Services::from_backend(backend, Arc::new(StubFetcher { fail: true }));
    let mut model = Model::new(
        services,
        Options {
            reply_page_size: 1,
            ..Options::default()
        },
    );
    let init = model.init();
    drain(&mut model, init);
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);

    let detail = &model.state().detail;
    assert_eq!(detail.replies.len(), 2);
    assert_eq!(detail.visible_replies().len(), 1);
    let hidden = detail.replies[1].post.id.clone();

    model.update(Message::Reply {
        parent_id: hidden.clone(),
        content: "late to this".into(),
    });
    let detail = &model.state().detail;
    let position = detail
        .replies
        .iter()
        .position(|item| item.post.content == "late to this")
        .expect("optimistic reply");
    assert_eq!(detail.replies[position].post.in_reply_to_id.as_deref(), Some(hidden.as_str()));
    assert!(detail.visible_replies().len() > position);
}

#[test]
fn reply_outside_open_thread_is_not_shown() {
    let mut model = started(thread_backend());
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);
    let replies_before = model.state().detail.replies.clone();

    let send = model.update(Message::Reply {
        parent_id: "p001".into(),
        content: "elsewhere".into(),
    });
    assert_eq!(send.len(), 1);
    assert_eq!(model.state().detail.replies, replies_before);
}

#[test]
fn drilling_into_a_reply_and_back() {
    let mut model = started(thread_backend());
    select(&mut model, "p002");
    let open = model.update(Message::OpenSelected);
    drain(&mut model, open);

    model.update(Message::MoveCursor(1));
    let drill = model.update(Message::OpenSelected);
    drain(&mut model, drill);
    assert_eq!(model.state().detail.thread_id(), Some("r1"));
    assert_eq!(model.state().detail.ancestors[0].id, "p002");

    let back = model.update(Message::CloseDetail);
    assert_eq!(model.state().detail.thread_id(), Some("p002"));
    assert_eq!(model.state().detail.replies.len(), 1);
    drain(&mut model, back);

    model.update(Message::CloseDetail);
    assert!(!model.is_detail_active());
    assert_eq!(model.selected_post().map(|post| post.id.as_str()), Some("p002"));
}

#[test]
fn following_view_hides_confirmed_unfollowed_authors() {
    let backend = seeded(2);
    backend.add_post(post_at("b1", "bob", 20, "hi from bob"));
    backend.add_post(post_at("m1", "me", 21, "my own"));
    backend.set_following("ada", true);
    backend.set_following("bob", true);
    let mut model = started(backend.clone());

    let mut commands = model.update(Message::SwitchView(FeedView::Following));
    let fetch = commands.remove(0);
    let loaded = fetch.run();
    let lookups = model.update(loaded);
    assert_eq!(lookups.len(), 1);

    let visible: Vec<String> = model
        .visible_indices()
        .into_iter()
        .map(|index| model.state().feed.items[index].post.id.clone())
        .collect();
    assert!(visible.contains(&"b1".to_string()));
    assert!(!visible.contains(&"m1".to_string()));

    backend.set_following("bob", false);
    drain(&mut model, lookups);
    let visible: Vec<String> = model
        .visible_indices()
        .into_iter()
        .map(|index| model.state().feed.items[index].post.id.clone())
        .collect();
    assert_eq!(visible, vec!["p002", "p001"]);
    assert_eq!(model.is_following("bob"), Some(false));
}

#[test]
fn hiding_selected_post_moves_cursor_to_neighbour() {
    let mut model = started(seeded(3));
    select(&mut model, "p002");
    model.update(Message::HidePost("p002".into()));
    let selected = model.selected_post().map(|post| post.id.clone());
    assert_eq!(selected.as_deref(), Some("p001"));

    model.update(Message::ToggleShowHidden);
    assert_eq!(model.visible_indices().len(), 3);
}

#[test]
fn block_hides_author_and_unblock_restores() {
    let backend = seeded(2);
    backend.add_post(post_at("b1", "bob", 20, "bob #rust"));
    let mut model = started(backend);
    let block = model.update(Message::Block("bob".into()));
    drain(&mut model, block);
    assert_eq!(model.visible_indices().len(), 2);

    let list = model.update(Message::OpenBlockedList);
    drain(&mut model, list);
    assert_eq!(model.state().moderation.blocked.len(), 1);
    assert_eq!(model.selected_blocked().map(|a| a.id.as_str()), Some("bob"));

    let unblock = model.update(Message::Unblock("bob".into()));
    drain(&mut model, unblock);
    assert_eq!(model.visible_indices().len(), 3);
    assert!(model.state().moderation.blocked.is_empty());
}

#[test]
fn profile_loads_posts_and_relationship() {
    let backend = seeded(3);
    let mut model = started(backend.clone());
    let open = model.update(Message::OpenProfile(Some("ada".into())));
    assert_eq!(open.len(), 1);
    drain(&mut model, open);

    let profile = &model.state().profile;
    assert_eq!(profile.profile.as_ref().map(|p| p.display_name.as_str()), Some("Ada"));
    assert_eq!(profile.posts.len(), 3);
    assert!(!profile.paging.has_more);
    assert_eq!(model.is_following("ada"), Some(false));

    let stale = model.update(Message::ProfilePostsLoaded {
        account_id: "ada".into(),
        seq: 0,
        result: Ok(Vec::new()),
    });
    assert!(stale.is_empty());
    assert_eq!(model.state().profile.posts.len(), 3);
}

#[test]
fn reopened_profile_ignores_load_from_earlier_visit() {
    let backend = seeded(3);
    let mut model = started(backend.clone());
    let first = model.update(Message::OpenProfile(Some("ada".into())));
    let first_seq = model.state().profile.paging.seq;
    model.update(Message::CloseProfile);
    assert!(model.state().profile.account_id.is_none());
    assert_eq!(model.state().profile.paging.seq, first_seq);

    let second = model.update(Message::OpenProfile(Some("ada".into())));
    assert!(model.state().profile.paging.seq > first_seq);
    for command in first {
        let late = model.update(command.run());
        assert!(late.is_empty());
    }
    assert!(model.state().profile.profile.is_none());
    assert!(model.state().profile.paging.loading_initial);

    drain(&mut model, second);
    assert_eq!(model.state().profile.posts.len(), 3);
}

#[test]
fn profile_edit_updates_session() {
    let mut model = started(seeded(1));
    model.update(Message::EditProfile);
    model.update(Message::ModalBackspace);
    model.update(Message::ModalBackspace);
    model.update(Message::ModalBackspace);
    for ch in "Me".chars() {
        model.update(Message::ModalInput(ch));
    }
    model.update(Message::ModalNextField);
    for ch in "hello".chars() {
        model.update(Message::ModalInput(ch));
    }
    let save = model.update(Message::ModalSubmit);
    assert!(!model.has_modal_open());
    drain(&mut model, save);
    let profile = model.state().session.profile.clone().expect("session profile");
    assert_eq!(profile.display_name, "Me");
    assert_eq!(profile.bio, "hello");
}

#[test]
fn custom_tag_prompt_switches_view() {
    let backend = seeded(2);
    backend.add_post(post_at("g1", "ada", 30, "level one #gamedev"));
    let mut model = started(backend);

    assert!(model.update(Message::SwitchView(FeedView::CustomTag)).is_empty());
    assert!(model.has_modal_open());
    for ch in "#GameDev".chars() {
        model.update(Message::ModalInput(ch));
    }
    let load = model.update(Message::ModalSubmit);
    drain(&mut model, load);
    assert_eq!(model.state().feed.view, FeedView::CustomTag);
    assert_eq!(model.state().feed.custom_tag, "gamedev");
    assert_eq!(feed_ids(&model), vec!["g1"]);
}

#[test]
fn preview_failures_follow_owner_policy() {
    let backend = seeded(1);
    backend.add_profile(Profile {
        id: "me".into(),
        display_name: "You".into(),
        handle: "me@localhost".into(),
        avatar_url: "https://m.test/me.png".into(),
        ..Profile::default()
    });
    let mut with_media = post_at("p900", "ada", 90, "pic #rust");
    with_media.media.push(MediaAttachment {
        id: "m1".into(),
        url: "https://m.test/full.png".into(),
        preview_url: "https://m.test/small.png".into(),
        ..MediaAttachment::default()
    });
    backend.add_post(with_media.clone());

    let mut model = model_with(backend, StubFetcher { fail: true }, true);
    let init = model.init();
    drain(&mut model, init);

    let avatar = avatar_key("https://m.test/me.png");
    assert!(model.state().media.get(&avatar).is_none());
    let post_key = preview_key(&with_media, Resolution::Base).expect("preview key");
    assert_eq!(
        model.state().media.get(&post_key).map(|preview| preview.is_available()),
        Some(false)
    );
    assert_eq!(model.state().media.in_flight_count(), 0);

    assert!(model.update(Message::MoveCursor(0)).is_empty());
    let retry = model.update(Message::OpenProfile(None));
    drain(&mut model, retry);
    let profile = model.state().session.profile.clone().unwrap_or_default();
    let again = model.update(Message::SessionLoaded {
        result: Ok(("me".into(), profile)),
    });
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].label(), "media.preview");
}

#[test]
fn decoded_preview_is_cached_once() {
    let backend = seeded(0);
    let mut with_media = post_at("p900", "ada", 90, "pic #rust");
    with_media.media.push(MediaAttachment {
        id: "m1".into(),
        url: "https://m.test/full.png".into(),
        preview_url: "https://m.test/small.png".into(),
        ..MediaAttachment::default()
    });
    backend.add_post(with_media.clone());

    let mut model = model_with(backend, StubFetcher { fail: false }, true);
    let init = model.init();
    drain(&mut model, init);

    let key = preview_key(&with_media, Resolution::Base).expect("preview key");
    let preview = model.state().media.get(&key).expect("cached preview");
    assert!(preview.is_available());
    assert_eq!(preview.current().map(|art| art.cols), Some(32));
    assert!(model.update(Message::MoveCursor(0)).is_empty());
    assert_eq!(
        key,
        crate::media::cache_key(PreviewOwner::Post, Resolution::Base, "https://m.test/small.png")
    );
}
