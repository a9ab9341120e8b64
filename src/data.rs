use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::feed::normalize_tag;
use crate::post::{BlockedAccount, MediaAttachment, MediaKind, Post, Profile, ThreadContext};

pub trait TimelineService: Send + Sync {
    fn tag_page(&self, tag: &str, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>>;
    fn home_page(&self, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>>;
    fn trending_page(&self, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>>;
    fn thread(&self, id: &str) -> Result<ThreadContext>;

    fn tag(&self, tag: &str, limit: usize) -> Result<Vec<Post>> {
        self.tag_page(tag, limit, None)
    }
}

pub trait AccountService: Send + Sync {
    fn current_account_id(&self) -> Result<String>;
    fn current_profile(&self) -> Result<Profile>;
    fn update_profile(&self, display_name: &str, bio: &str) -> Result<Profile>;
    fn profile_by_id(&self, id: &str) -> Result<Profile>;
    fn posts_by_account(&self, id: &str, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>>;
    fn follow(&self, id: &str) -> Result<()>;
    fn unfollow(&self, id: &str) -> Result<()>;
    fn lookup_following(&self, ids: &[String]) -> Result<HashMap<String, bool>>;
    fn block(&self, id: &str) -> Result<()>;
    fn unblock(&self, id: &str) -> Result<()>;
    fn blocked_accounts(&self, limit: usize) -> Result<Vec<BlockedAccount>>;
}

pub trait PostService: Send + Sync {
    fn create(&self, content: &str) -> Result<Post>;
    fn edit(&self, id: &str, content: &str) -> Result<Post>;
    fn delete(&self, id: &str) -> Result<()>;
    fn like(&self, id: &str) -> Result<()>;
    fn unlike(&self, id: &str) -> Result<()>;
    fn reply(&self, parent_id: &str, content: &str) -> Result<Post>;
}

/// The collaborators the engine hands to its commands.
#[derive(Clone)]
pub struct Services {
    pub timeline: Arc<dyn TimelineService>,
    pub accounts: Arc<dyn AccountService>,
    pub posts: Arc<dyn PostService>,
    pub media: Arc<dyn crate::media::MediaFetcher>,
}

impl Services {
    pub fn from_backend(
        backend: Arc<MemoryBackend>,
        media: Arc<dyn crate::media::MediaFetcher>,
    ) -> Self {
        Self {
            timeline: backend.clone(),
            accounts: backend.clone(),
            posts: backend,
            media,
        }
    }
}

#[derive(Debug, Default)]
struct BackendState {
    posts: Vec<Post>,
    profiles: HashMap<String, Profile>,
    following: HashSet<String>,
    blocked: HashSet<String>,
    next_id: u64,
    fail_next: Vec<String>,
    calls: Vec<String>,
}

/// In-process server used for offline browsing and tests. Every call is
/// recorded; `fail_next` makes the next call with that name fail once.
pub struct MemoryBackend {
    me: String,
    required_tag: String,
    state: Mutex<BackendState>,
}

impl MemoryBackend {
    pub fn new(me: &str, required_tag: &str) -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            me.to_string(),
            Profile {
                id: me.to_string(),
                display_name: "You".into(),
                handle: format!("{me}@localhost"),
                ..Profile::default()
            },
        );
        Self {
            me: me.to_string(),
            required_tag: normalize_tag(required_tag),
            state: Mutex::new(BackendState {
                profiles,
                next_id: 1000,
                ..BackendState::default()
            }),
        }
    }

    /// A backend seeded with sample content for the offline demo.
    pub fn with_samples(me: &str, tag: &str) -> Self {
        let backend = Self::new(me, tag);
        let authors = [
            ("ada", "Ada"),
            ("grace", "Grace"),
            ("linus", "Linus"),
            ("barbara", "Barbara"),
        ];
        for (account, name) in authors {
            backend.add_profile(Profile {
                id: account.into(),
                display_name: name.into(),
                handle: format!("{account}@example.social"),
                bio: format!("{name} posts about #{tag}."),
                ..Profile::default()
            });
        }
        backend.set_following("ada", true);
        backend.set_following("grace", true);

        let base = Utc
            .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        for n in 0..45u32 {
            let (account, name) = authors[n as usize % authors.len()];
            let mut post = Post {
                id: format!("{}", 100 + n),
                account_id: account.into(),
                display_name: name.into(),
                handle: format!("{account}@example.social"),
                content: format!("Sample post {n} about #{tag}"),
                created_at: base + Duration::minutes(n as i64 * 7),
                url: format!("https://example.social/@{account}/{}", 100 + n),
                liked: false,
                likes_count: (n as u64 * 3) % 11,
                replies_count: 0,
                in_reply_to_id: None,
                media: Vec::new(),
                is_mine: false,
            };
            if n % 9 == 0 {
                post.media.push(MediaAttachment {
                    id: format!("m{n}"),
                    kind: MediaKind::Image,
                    url: format!("https://picsum.photos/id/{n}/640/400"),
                    preview_url: format!("https://picsum.photos/id/{n}/320/200"),
                    description: "Sample image".into(),
                    width: 640,
                    height: 400,
                });
            }
            backend.add_post(post);
        }
        for n in 0..6u32 {
            let parent = if n % 3 == 0 { "144".to_string() } else { format!("{}", 200 + n - 1) };
            let (account, name) = authors[(n as usize + 1) % authors.len()];
            backend.add_post(Post {
                id: format!("{}", 200 + n),
                account_id: account.into(),
                display_name: name.into(),
                handle: format!("{account}@example.social"),
                content: format!("Reply {n} in the sample thread"),
                created_at: base + Duration::minutes(400 + n as i64),
                url: String::new(),
                liked: false,
                likes_count: 0,
                replies_count: 0,
                in_reply_to_id: Some(parent),
                media: Vec::new(),
                is_mine: false,
            });
        }
        backend
    }

    pub fn add_post(&self, post: Post) {
        self.state.lock().posts.push(post);
    }

    pub fn add_profile(&self, profile: Profile) {
        self.state.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn set_following(&self, id: &str, following: bool) {
        let mut state = self.state.lock();
        if following {
            state.following.insert(id.to_string());
        } else {
            state.following.remove(id);
        }
    }

    pub fn fail_next(&self, call: &str) {
        self.state.lock().fail_next.push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state.lock();
        let name = call.split('(').next().unwrap_or_default().to_string();
        state.calls.push(call);
        if let Some(index) = state.fail_next.iter().position(|pending| *pending == name) {
            state.fail_next.remove(index);
            bail!("{name}: simulated network failure");
        }
        Ok(())
    }

    fn page<F>(&self, limit: usize, before_id: Option<&str>, keep: F) -> Vec<Post>
    where
        F: Fn(&Post) -> bool,
    {
        let state = self.state.lock();
        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|post| keep(post))
            .cloned()
            .collect();
        posts.sort_by(crate::feed::compare_newest_first);
        let start = match before_id {
            Some(id) => posts
                .iter()
                .position(|post| post.id == id)
                .map(|index| index + 1)
                .unwrap_or(posts.len()),
            None => 0,
        };
        posts.into_iter().skip(start).take(limit).collect()
    }

    fn mint_id(&self) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id.to_string()
    }

    fn own_post(&self, content: &str, in_reply_to_id: Option<String>) -> Post {
        let profile = self
            .state
            .lock()
            .profiles
            .get(&self.me)
            .cloned()
            .unwrap_or_default();
        let mut content = content.trim().to_string();
        if in_reply_to_id.is_none() && !self.required_tag.is_empty() {
            let tag = format!("#{}", self.required_tag);
            if !content.to_ascii_lowercase().contains(&tag) {
                content.push(' ');
                content.push_str(&tag);
            }
        }
        let id = self.mint_id();
        Post {
            url: format!("https://localhost/@{}/{id}", self.me),
            id,
            account_id: self.me.clone(),
            display_name: profile.display_name,
            handle: profile.handle,
            content,
            created_at: Utc::now(),
            liked: false,
            likes_count: 0,
            replies_count: 0,
            in_reply_to_id,
            media: Vec::new(),
            is_mine: true,
        }
    }

    fn with_post<T>(&self, id: &str, f: impl FnOnce(&mut Post) -> T) -> Result<T> {
        let mut state = self.state.lock();
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == id)
            .ok_or_else(|| anyhow!("post {id} not found"))?;
        Ok(f(post))
    }
}

impl TimelineService for MemoryBackend {
    fn tag_page(&self, tag: &str, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>> {
        self.record(format!("tag_page({tag},{limit},{})", before_id.unwrap_or("")))?;
        let needle = format!("#{}", normalize_tag(tag));
        Ok(self.page(limit, before_id, |post| {
            post.content.to_ascii_lowercase().contains(&needle)
        }))
    }

    fn home_page(&self, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>> {
        self.record(format!("home_page({limit},{})", before_id.unwrap_or("")))?;
        let following = self.state.lock().following.clone();
        Ok(self.page(limit, before_id, |post| {
            following.contains(&post.account_id) || post.account_id == self.me
        }))
    }

    fn trending_page(&self, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>> {
        self.record(format!("trending_page({limit},{})", before_id.unwrap_or("")))?;
        let mut posts = self.page(usize::MAX, before_id, |_| true);
        posts.sort_by(|a, b| b.likes_count.cmp(&a.likes_count));
        posts.truncate(limit);
        Ok(posts)
    }

    fn thread(&self, id: &str) -> Result<ThreadContext> {
        self.record(format!("thread({id})"))?;
        let state = self.state.lock();
        let by_id: HashMap<&str, &Post> =
            state.posts.iter().map(|post| (post.id.as_str(), post)).collect();
        if !by_id.contains_key(id) {
            bail!("post {id} not found");
        }

        let mut ancestors = Vec::new();
        let mut cursor = by_id.get(id).and_then(|post| post.parent_id());
        while let Some(parent) = cursor {
            let Some(post) = by_id.get(parent) else {
                break;
            };
            ancestors.push((*post).clone());
            cursor = post.parent_id();
        }
        ancestors.reverse();

        let mut descendants = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(parent) = frontier.pop() {
            for post in state.posts.iter().filter(|post| post.parent_id() == Some(parent.as_str())) {
                frontier.push(post.id.clone());
                descendants.push(post.clone());
            }
        }
        descendants.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(ThreadContext {
            ancestors,
            descendants,
        })
    }
}

impl AccountService for MemoryBackend {
    fn current_account_id(&self) -> Result<String> {
        self.record("current_account_id()".into())?;
        Ok(self.me.clone())
    }

    fn current_profile(&self) -> Result<Profile> {
        self.record("current_profile()".into())?;
        self.state
            .lock()
            .profiles
            .get(&self.me)
            .cloned()
            .ok_or_else(|| anyhow!("no profile for current account"))
    }

    fn update_profile(&self, display_name: &str, bio: &str) -> Result<Profile> {
        self.record(format!("update_profile({display_name})"))?;
        let mut state = self.state.lock();
        let profile = state.profiles.entry(self.me.clone()).or_default();
        profile.display_name = display_name.trim().to_string();
        profile.bio = bio.trim().to_string();
        Ok(profile.clone())
    }

    fn profile_by_id(&self, id: &str) -> Result<Profile> {
        self.record(format!("profile_by_id({id})"))?;
        self.state
            .lock()
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("account {id} not found"))
    }

    fn posts_by_account(&self, id: &str, limit: usize, before_id: Option<&str>) -> Result<Vec<Post>> {
        self.record(format!("posts_by_account({id},{limit},{})", before_id.unwrap_or("")))?;
        Ok(self.page(limit, before_id, |post| post.account_id == id))
    }

    fn follow(&self, id: &str) -> Result<()> {
        self.record(format!("follow({id})"))?;
        self.set_following(id, true);
        Ok(())
    }

    fn unfollow(&self, id: &str) -> Result<()> {
        self.record(format!("unfollow({id})"))?;
        self.set_following(id, false);
        Ok(())
    }

    fn lookup_following(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        self.record(format!("lookup_following({})", ids.join(",")))?;
        let state = self.state.lock();
        Ok(ids
            .iter()
            .map(|id| (id.clone(), state.following.contains(id)))
            .collect())
    }

    fn block(&self, id: &str) -> Result<()> {
        self.record(format!("block({id})"))?;
        self.state.lock().blocked.insert(id.to_string());
        Ok(())
    }

    fn unblock(&self, id: &str) -> Result<()> {
        self.record(format!("unblock({id})"))?;
        self.state.lock().blocked.remove(id);
        Ok(())
    }

    fn blocked_accounts(&self, limit: usize) -> Result<Vec<BlockedAccount>> {
        self.record(format!("blocked_accounts({limit})"))?;
        let state = self.state.lock();
        let mut blocked: Vec<BlockedAccount> = state
            .blocked
            .iter()
            .map(|id| {
                let profile = state.profiles.get(id).cloned().unwrap_or_default();
                BlockedAccount {
                    id: id.clone(),
                    display_name: profile.display_name,
                    handle: profile.handle,
                }
            })
            .collect();
        blocked.sort_by(|a, b| a.id.cmp(&b.id));
        blocked.truncate(limit);
        Ok(blocked)
    }
}

impl PostService for MemoryBackend {
    fn create(&self, content: &str) -> Result<Post> {
        self.record(format!("create({content})"))?;
        let post = self.own_post(content, None);
        self.add_post(post.clone());
        Ok(post)
    }

    fn edit(&self, id: &str, content: &str) -> Result<Post> {
        self.record(format!("edit({id})"))?;
        self.with_post(id, |post| {
            post.content = content.trim().to_string();
            post.clone()
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.record(format!("delete({id})"))?;
        let mut state = self.state.lock();
        let before = state.posts.len();
        state.posts.retain(|post| post.id != id);
        if state.posts.len() == before {
            bail!("post {id} not found");
        }
        Ok(())
    }

    fn like(&self, id: &str) -> Result<()> {
        self.record(format!("like({id})"))?;
        self.with_post(id, |post| {
            if !post.liked {
                post.toggle_like();
            }
        })
    }

    fn unlike(&self, id: &str) -> Result<()> {
        self.record(format!("unlike({id})"))?;
        self.with_post(id, |post| {
            if post.liked {
                post.toggle_like();
            }
        })
    }

    fn reply(&self, parent_id: &str, content: &str) -> Result<Post> {
        self.record(format!("reply({parent_id})"))?;
        self.with_post(parent_id, |parent| {
            parent.replies_count += 1;
        })?;
        let post = self.own_post(content, Some(parent_id.to_string()));
        self.add_post(post.clone());
        Ok(post)
    }
}
