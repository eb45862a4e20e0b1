use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use swaphub_types::api::{MessagePage, ReactionListResponse};
use swaphub_types::models::{Message, MessageType};

/// How often a view is expected to call [`ChatController::refresh`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

const DEFAULT_PAGE_SIZE: u32 = 50;

/// The server surface the controller drives. One implementor talks HTTP
/// ([`crate::HttpChatApi`]); tests substitute their own.
#[allow(async_fn_in_trait)]
pub trait ChatApi {
    async fn fetch_page(&self, group_id: Uuid, page: u32, page_size: u32) -> Result<MessagePage>;

    async fn send(
        &self,
        group_id: Uuid,
        content: &str,
        message_type: MessageType,
        reply_to: Option<Uuid>,
    ) -> Result<Message>;

    async fn edit(&self, message_id: Uuid, content: &str) -> Result<Message>;

    /// The ack body is the tombstoned message.
    async fn delete(&self, message_id: Uuid) -> Result<Message>;

    async fn add_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionListResponse>;

    async fn remove_reaction(&self, message_id: Uuid, emoji: &str)
        -> Result<ReactionListResponse>;

    async fn unread_count(&self, group_id: Uuid) -> Result<u64>;
}

/// Client-side view of one group conversation, kept current by polling.
///
/// The refresh rule avoids visible flicker: the local view is replaced only
/// when the server-reported message count has grown. Everything else mutates
/// the cached copy by id from the complete post-mutation state the server
/// returns, so no operation needs a second round trip to render. Reactions
/// are the exception and force a refetch for aggregate counts.
pub struct ChatController<A: ChatApi> {
    api: A,
    group_id: Uuid,
    page_size: u32,
    view: Vec<Message>,
    total: u64,
}

impl<A: ChatApi> ChatController<A> {
    pub fn new(api: A, group_id: Uuid) -> Self {
        Self {
            api,
            group_id,
            page_size: DEFAULT_PAGE_SIZE,
            view: Vec::new(),
            total: 0,
        }
    }

    /// Messages currently displayed, oldest-first.
    pub fn messages(&self) -> &[Message] {
        &self.view
    }

    /// The message a scroll-to-latest lands on.
    pub fn latest(&self) -> Option<&Message> {
        self.view.last()
    }

    /// Poll tick: refetch page 1 and swap the view in only if the
    /// conversation grew. Returns whether the view was replaced.
    pub async fn refresh(&mut self) -> Result<bool> {
        let page = self
            .api
            .fetch_page(self.group_id, 1, self.page_size)
            .await?;

        if page.pagination.total_messages > self.total {
            self.total = page.pagination.total_messages;
            self.view = page.messages;
            return Ok(true);
        }
        Ok(false)
    }

    /// Unconditional replacement, used after reaction changes.
    pub async fn force_refresh(&mut self) -> Result<()> {
        let page = self
            .api
            .fetch_page(self.group_id, 1, self.page_size)
            .await?;
        self.total = page.pagination.total_messages;
        self.view = page.messages;
        Ok(())
    }

    /// Optimistic send: the returned message is appended immediately rather
    /// than waiting for the next poll to pick it up.
    pub async fn send(
        &mut self,
        content: &str,
        message_type: MessageType,
        reply_to: Option<Uuid>,
    ) -> Result<()> {
        let message = self
            .api
            .send(self.group_id, content, message_type, reply_to)
            .await?;
        self.total += 1;
        self.view.push(message);
        Ok(())
    }

    pub async fn edit(&mut self, message_id: Uuid, content: &str) -> Result<()> {
        let updated = self.api.edit(message_id, content).await?;
        self.patch(updated);
        Ok(())
    }

    pub async fn delete(&mut self, message_id: Uuid) -> Result<()> {
        let tombstoned = self.api.delete(message_id).await?;
        self.patch(tombstoned);
        Ok(())
    }

    pub async fn react(&mut self, message_id: Uuid, emoji: &str) -> Result<()> {
        self.api.add_reaction(message_id, emoji).await?;
        self.force_refresh().await
    }

    pub async fn unreact(&mut self, message_id: Uuid, emoji: &str) -> Result<()> {
        self.api.remove_reaction(message_id, emoji).await?;
        self.force_refresh().await
    }

    pub async fn unread_count(&self) -> Result<u64> {
        self.api.unread_count(self.group_id).await
    }

    fn patch(&mut self, updated: Message) {
        if let Some(slot) = self.view.iter_mut().find(|m| m.id == updated.id) {
            *slot = updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;
    use swaphub_types::api::Pagination;
    use swaphub_types::models::{Reaction, ReadReceipt, TOMBSTONE};

    fn make_message(group_id: Uuid, content: &str) -> Message {
        let sender = Uuid::new_v4();
        Message {
            id: Uuid::new_v4(),
            group_id,
            sender_id: sender,
            sender_name: "peer".into(),
            content: content.into(),
            message_type: MessageType::Text,
            created_at: Utc::now(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            reply_to: None,
            reactions: vec![],
            read_by: vec![ReadReceipt {
                user_id: sender,
                read_at: Utc::now(),
            }],
        }
    }

    /// In-memory stand-in for the server, counting fetches.
    struct MockApi {
        group_id: Uuid,
        messages: Mutex<Vec<Message>>,
        fetches: AtomicU32,
    }

    impl MockApi {
        fn new(group_id: Uuid) -> Self {
            Self {
                group_id,
                messages: Mutex::new(vec![]),
                fetches: AtomicU32::new(0),
            }
        }

        fn seed(&self, content: &str) -> Uuid {
            let msg = make_message(self.group_id, content);
            let id = msg.id;
            self.messages.lock().unwrap().push(msg);
            id
        }

        fn fetch_count(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl ChatApi for &MockApi {
        async fn fetch_page(&self, _: Uuid, page: u32, page_size: u32) -> Result<MessagePage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let messages = self.messages.lock().unwrap().clone();
            let total = messages.len() as u64;
            Ok(MessagePage {
                messages,
                pagination: Pagination {
                    current_page: page,
                    total_pages: total.div_ceil(page_size as u64) as u32,
                    total_messages: total,
                    has_next: false,
                    has_prev: false,
                },
            })
        }

        async fn send(
            &self,
            group_id: Uuid,
            content: &str,
            _: MessageType,
            _: Option<Uuid>,
        ) -> Result<Message> {
            let msg = make_message(group_id, content);
            self.messages.lock().unwrap().push(msg.clone());
            Ok(msg)
        }

        async fn edit(&self, message_id: Uuid, content: &str) -> Result<Message> {
            let mut messages = self.messages.lock().unwrap();
            let msg = messages.iter_mut().find(|m| m.id == message_id).unwrap();
            msg.content = content.into();
            msg.is_edited = true;
            msg.edited_at = Some(Utc::now());
            Ok(msg.clone())
        }

        async fn delete(&self, message_id: Uuid) -> Result<Message> {
            let mut messages = self.messages.lock().unwrap();
            let msg = messages.iter_mut().find(|m| m.id == message_id).unwrap();
            msg.content = TOMBSTONE.into();
            msg.is_deleted = true;
            msg.deleted_at = Some(Utc::now());
            Ok(msg.clone())
        }

        async fn add_reaction(
            &self,
            message_id: Uuid,
            emoji: &str,
        ) -> Result<ReactionListResponse> {
            let mut messages = self.messages.lock().unwrap();
            let msg = messages.iter_mut().find(|m| m.id == message_id).unwrap();
            msg.reactions.push(Reaction {
                user_id: Uuid::new_v4(),
                emoji: emoji.into(),
                reacted_at: Utc::now(),
            });
            Ok(ReactionListResponse {
                reactions: msg.reactions.clone(),
                already_reacted: false,
            })
        }

        async fn remove_reaction(
            &self,
            message_id: Uuid,
            emoji: &str,
        ) -> Result<ReactionListResponse> {
            let mut messages = self.messages.lock().unwrap();
            let msg = messages.iter_mut().find(|m| m.id == message_id).unwrap();
            msg.reactions.retain(|r| r.emoji != emoji);
            Ok(ReactionListResponse {
                reactions: msg.reactions.clone(),
                already_reacted: false,
            })
        }

        async fn unread_count(&self, _: Uuid) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn refresh_replaces_view_only_on_growth() {
        let group = Uuid::new_v4();
        let api = MockApi::new(group);
        api.seed("first");
        api.seed("second");

        let mut controller = ChatController::new(&api, group);
        assert!(controller.refresh().await.unwrap());
        assert_eq!(controller.messages().len(), 2);

        // Same count: the view must not be touched, even if content moved.
        api.messages.lock().unwrap()[0].content = "rewritten".into();
        assert!(!controller.refresh().await.unwrap());
        assert_eq!(controller.messages()[0].content, "first");

        // Growth: view replaced, new content picked up.
        api.seed("third");
        assert!(controller.refresh().await.unwrap());
        assert_eq!(controller.messages().len(), 3);
        assert_eq!(controller.messages()[0].content, "rewritten");
        assert_eq!(controller.latest().unwrap().content, "third");
    }

    #[tokio::test]
    async fn send_appends_without_waiting_for_poll() {
        let group = Uuid::new_v4();
        let api = MockApi::new(group);
        let mut controller = ChatController::new(&api, group);
        controller.refresh().await.unwrap();
        let fetches_before = api.fetch_count();

        controller
            .send("hi there", MessageType::Text, None)
            .await
            .unwrap();
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.latest().unwrap().content, "hi there");
        assert_eq!(api.fetch_count(), fetches_before, "no refetch on send");

        // The next poll sees the same count and leaves the view alone.
        assert!(!controller.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn edit_and_delete_patch_the_cached_copy() {
        let group = Uuid::new_v4();
        let api = MockApi::new(group);
        let first = api.seed("original");
        let second = api.seed("doomed");

        let mut controller = ChatController::new(&api, group);
        controller.refresh().await.unwrap();
        let fetches_before = api.fetch_count();

        controller.edit(first, "amended").await.unwrap();
        let edited = &controller.messages()[0];
        assert_eq!(edited.content, "amended");
        assert!(edited.is_edited);

        controller.delete(second).await.unwrap();
        let deleted = &controller.messages()[1];
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, TOMBSTONE);

        assert_eq!(api.fetch_count(), fetches_before, "mutations patch by id");
    }

    #[tokio::test]
    async fn reactions_force_a_refetch() {
        let group = Uuid::new_v4();
        let api = MockApi::new(group);
        let id = api.seed("react to me");

        let mut controller = ChatController::new(&api, group);
        controller.refresh().await.unwrap();
        let fetches_before = api.fetch_count();

        controller.react(id, "👍").await.unwrap();
        assert_eq!(api.fetch_count(), fetches_before + 1);
        assert_eq!(controller.messages()[0].reactions.len(), 1);

        controller.unreact(id, "👍").await.unwrap();
        assert_eq!(api.fetch_count(), fetches_before + 2);
        assert!(controller.messages()[0].reactions.is_empty());
    }
}
