use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use tracing::{info, warn};

use super::{Modal, Model, BLOCKED_PAGE};
use crate::message::{describe, Command, Message};
use crate::post::BlockedAccount;

impl Model {
    /// Looks up every loaded author whose relationship is still unknown.
    pub(super) fn hydrate_relationships(&mut self) -> Vec<Command> {
        let unknown: BTreeSet<String> = self
            .state
            .feed
            .items
            .iter()
            .map(|item| item.post.account_id.clone())
            .filter(|account| !account.is_empty() && !self.is_me(account))
            .filter(|account| !self.state.relationships.following.contains_key(account))
            .filter(|account| !self.state.relationships.pending.contains(account))
            .collect();
        self.lookup_relationships(unknown.into_iter().collect())
    }

    pub(super) fn lookup_relationships(&mut self, ids: Vec<String>) -> Vec<Command> {
        if ids.is_empty() {
            return Vec::new();
        }
        self.state.relationships.pending.extend(ids.iter().cloned());
        let accounts = self.services.accounts.clone();
        vec![Command::new("relationships.lookup", move || {
            let result = accounts
                .lookup_following(&ids)
                .context("look up relationships")
                .map_err(|err| describe(&err));
            Message::RelationshipsLoaded { ids, result }
        })]
    }

    pub(super) fn relationships_loaded(
        &mut self,
        ids: Vec<String>,
        result: Result<HashMap<String, bool>, String>,
    ) {
        let relationships = &mut self.state.relationships;
        for id in &ids {
            relationships.pending.remove(id);
        }
        match result {
            Ok(found) => {
                relationships.following.extend(found);
                relationships.error = None;
                self.relocate_cursor();
            }
            Err(err) => {
                warn!(error = %err, "relationship lookup failed");
                relationships.error = Some(err);
            }
        }
    }

    pub(super) fn set_following(&mut self, account_id: String, following: bool) -> Vec<Command> {
        if account_id.is_empty() || self.is_me(&account_id) {
            return Vec::new();
        }
        self.state.status = if following {
            "Following…".into()
        } else {
            "Unfollowing…".into()
        };
        let accounts = self.services.accounts.clone();
        vec![Command::new("account.follow", move || {
            let result = if following {
                accounts.follow(&account_id).context("follow account")
            } else {
                accounts.unfollow(&account_id).context("unfollow account")
            };
            Message::FollowChanged {
                account_id,
                following,
                result: result.map_err(|err| describe(&err)),
            }
        })]
    }

    pub(super) fn follow_changed(&mut self, account_id: String, following: bool, result: Result<(), String>) {
        match result {
            Ok(()) => {
                info!(%account_id, following, "relationship changed");
                self.state.status = if following {
                    "Followed.".into()
                } else {
                    "Unfollowed.".into()
                };
                self.state.relationships.following.insert(account_id, following);
                self.state.relationships.error = None;
                self.relocate_cursor();
            }
            Err(err) => {
                warn!(%account_id, error = %err, "follow change failed");
                self.state.status = format!("Could not update follow: {err}");
                self.state.relationships.error = Some(err);
            }
        }
    }

    pub(super) fn set_blocked(&mut self, account_id: String, blocked: bool) -> Vec<Command> {
        if account_id.is_empty() || self.is_me(&account_id) {
            return Vec::new();
        }
        self.state.status = if blocked {
            "Blocking…".into()
        } else {
            "Unblocking…".into()
        };
        let accounts = self.services.accounts.clone();
        vec![Command::new("account.block", move || {
            let result = if blocked {
                accounts.block(&account_id).context("block account")
            } else {
                accounts.unblock(&account_id).context("unblock account")
            };
            Message::BlockChanged {
                account_id,
                blocked,
                result: result.map_err(|err| describe(&err)),
            }
        })]
    }

    pub(super) fn block_changed(&mut self, account_id: String, blocked: bool, result: Result<(), String>) {
        let moderation = &mut self.state.moderation;
        match result {
            Ok(()) => {
                info!(%account_id, blocked, "block changed");
                if blocked {
                    moderation.hidden_authors.insert(account_id);
                    self.state.status = "Blocked.".into();
                } else {
                    moderation.hidden_authors.remove(&account_id);
                    moderation.blocked.retain(|account| account.id != account_id);
                    self.state.status = "Unblocked.".into();
                }
                self.state.moderation.blocked_error = None;
                self.relocate_cursor();
            }
            Err(err) => {
                warn!(%account_id, error = %err, "block change failed");
                self.state.status = format!("Could not update block: {err}");
                moderation.blocked_error = Some(err);
            }
        }
    }

    pub(super) fn open_blocked_list(&mut self) -> Vec<Command> {
        self.state.modal = Some(Modal::Blocked);
        let moderation = &mut self.state.moderation;
        moderation.blocked_loading = true;
        moderation.blocked_error = None;
        moderation.blocked_cursor = 0;

        let accounts = self.services.accounts.clone();
        vec![Command::new("account.blocked", move || Message::BlockedLoaded {
            result: accounts
                .blocked_accounts(BLOCKED_PAGE)
                .context("list blocked accounts")
                .map_err(|err| describe(&err)),
        })]
    }

    pub(super) fn blocked_loaded(&mut self, result: Result<Vec<BlockedAccount>, String>) {
        let moderation = &mut self.state.moderation;
        moderation.blocked_loading = false;
        match result {
            Ok(blocked) => {
                moderation.blocked = blocked;
                moderation.blocked_error = None;
                moderation.blocked_cursor = moderation
                    .blocked_cursor
                    .min(moderation.blocked.len().saturating_sub(1));
            }
            Err(err) => {
                warn!(error = %err, "blocked list failed");
                moderation.blocked_error = Some(err);
            }
        }
    }

    pub fn selected_blocked(&self) -> Option<&BlockedAccount> {
        self.state
            .moderation
            .blocked
            .get(self.state.moderation.blocked_cursor)
    }
}
