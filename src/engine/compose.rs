use super::{Modal, Model, ProfileField};
use crate::message::{ComposeKind, Command, Message};

impl Model {
    pub(super) fn open_compose(&mut self, kind: ComposeKind) -> Vec<Command> {
        let text = match &kind {
            ComposeKind::New | ComposeKind::Reply { .. } => String::new(),
            ComposeKind::Edit { id } => match self
                .find_post(id)
                .map(|post| (post.is_mine, post.content.clone()))
            {
                Some((true, content)) => content,
                Some((false, _)) => {
                    self.state.status = "You can only edit your own posts.".into();
                    return Vec::new();
                }
                None => return Vec::new(),
            },
        };
        self.state.modal = Some(Modal::Compose { kind, text });
        Vec::new()
    }

    pub(super) fn open_profile_edit(&mut self) -> Vec<Command> {
        let profile = self.state.session.profile.clone().unwrap_or_default();
        self.state.modal = Some(Modal::ProfileEdit {
            display_name: profile.display_name,
            bio: profile.bio,
            field: ProfileField::DisplayName,
        });
        Vec::new()
    }

    fn modal_text(&mut self) -> Option<&mut String> {
        match self.state.modal.as_mut()? {
            Modal::Compose { text, .. } => Some(text),
            Modal::TagPrompt(text) => Some(text),
            Modal::ProfileEdit {
                display_name,
                bio,
                field,
            } => match field {
                ProfileField::DisplayName => Some(display_name),
                ProfileField::Bio => Some(bio),
            },
            Modal::Blocked => None,
        }
    }

    pub(super) fn modal_input(&mut self, ch: char) {
        let single_line = matches!(
            self.state.modal,
            Some(Modal::TagPrompt(_))
                | Some(Modal::ProfileEdit {
                    field: ProfileField::DisplayName,
                    ..
                })
        );
        if ch == '\n' && single_line {
            return;
        }
        if let Some(text) = self.modal_text() {
            text.push(ch);
        }
    }

    pub(super) fn modal_backspace(&mut self) {
        if let Some(text) = self.modal_text() {
            text.pop();
        }
    }

    pub(super) fn modal_next_field(&mut self) {
        if let Some(Modal::ProfileEdit { field, .. }) = self.state.modal.as_mut() {
            *field = match field {
                ProfileField::DisplayName => ProfileField::Bio,
                ProfileField::Bio => ProfileField::DisplayName,
            };
        }
    }

    /// Turns the open dialog into its intent. Empty drafts keep the dialog
    /// open and never reach the network.
    pub(super) fn modal_submit(&mut self) -> Vec<Command> {
        let Some(modal) = self.state.modal.take() else {
            return Vec::new();
        };
        match modal_intent(&modal) {
            Ok(Some(intent)) => self.update(intent),
            Ok(None) => Vec::new(),
            Err(notice) => {
                self.state.status = notice.into();
                self.state.modal = Some(modal);
                Vec::new()
            }
        }
    }
}

fn modal_intent(modal: &Modal) -> Result<Option<Message>, &'static str> {
    let intent = match modal {
        Modal::Compose { kind, text } => {
            if text.trim().is_empty() {
                return Err("Nothing to post.");
            }
            match kind {
                ComposeKind::New => Message::CreatePost(text.clone()),
                ComposeKind::Edit { id } => Message::EditPost {
                    id: id.clone(),
                    content: text.clone(),
                },
                ComposeKind::Reply { parent_id } => Message::Reply {
                    parent_id: parent_id.clone(),
                    content: text.clone(),
                },
            }
        }
        Modal::ProfileEdit {
            display_name, bio, ..
        } => {
            if display_name.trim().is_empty() {
                return Err("Display name cannot be empty.");
            }
            Message::UpdateProfile {
                display_name: display_name.clone(),
                bio: bio.clone(),
            }
        }
        Modal::TagPrompt(tag) => {
            if tag.trim().trim_start_matches('#').trim().is_empty() {
                return Err("Hashtag cannot be empty.");
            }
            Message::SetCustomTag(tag.clone())
        }
        Modal::Blocked => return Ok(None),
    };
    Ok(Some(intent))
}
