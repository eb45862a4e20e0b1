use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use swaphub_types::api::{MessagePage, Pagination};
use swaphub_types::gate::{GroupRole, MembershipGate};
use swaphub_types::models::{
    EDIT_WINDOW_MINUTES, MAX_CONTENT_LEN, Message, MessageType, Reaction, ReadReceipt,
    ReplyPreview, TOMBSTONE,
};
use swaphub_types::Error;

use crate::models::MessageRow;
use crate::{now_ts, parse_ts, Database, OptionalExt};

const MAX_PAGE_SIZE: u32 = 100;

impl Database {
    /// Fetch one page of a group's conversation, oldest-first for display.
    /// Side effect: every returned message not authored by the caller gains
    /// a read receipt for the caller. Refetching never duplicates receipts.
    pub fn fetch_page(
        &self,
        gate: &dyn MembershipGate,
        group_id: Uuid,
        caller: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage, Error> {
        require_member(gate, group_id, caller)?;

        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) as u64 * page_size as u64;

        let (mut messages, total) = self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE group_id = ?1 AND is_deleted = 0",
                [group_id.to_string()],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, group_id, sender_id, sender_name, content, message_type,
                        reply_to_id, created_at, is_edited, edited_at, is_deleted, deleted_at
                 FROM messages
                 WHERE group_id = ?1 AND is_deleted = 0
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![group_id.to_string(), page_size, offset],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Mark everything the caller hasn't authored as read before
            // hydrating, so the response already carries the new receipts.
            let now = now_ts();
            let caller_str = caller.to_string();
            for row in &rows {
                if row.sender_id != caller_str {
                    conn.execute(
                        "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at)
                         VALUES (?1, ?2, ?3)",
                        (&row.id, &caller_str, &now),
                    )?;
                }
            }

            let messages = hydrate_messages(conn, rows)?;
            Ok((messages, total))
        })?;

        // Stored newest-first for paging; the display contract is oldest-first.
        messages.reverse();

        let total_pages = (total.div_ceil(page_size as u64)) as u32;
        Ok(MessagePage {
            messages,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_messages: total,
                has_next: page < total_pages,
                has_prev: page > 1 && total > 0,
            },
        })
    }

    /// Persist a new message. An unresolvable or cross-group reply reference
    /// is dropped silently; the message still sends.
    pub fn send_message(
        &self,
        gate: &dyn MembershipGate,
        group_id: Uuid,
        sender_id: Uuid,
        sender_name: &str,
        content: &str,
        message_type: MessageType,
        reply_to: Option<Uuid>,
    ) -> Result<Message, Error> {
        require_member(gate, group_id, sender_id)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("message content cannot be empty"));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(Error::validation(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_LEN
            )));
        }

        let message_id = Uuid::new_v4();
        let message = self.with_conn(|conn| {
            let reply_to_id = resolve_reply(conn, group_id, reply_to)?;

            let now = now_ts();
            conn.execute(
                "INSERT INTO messages
                    (id, group_id, sender_id, sender_name, content, message_type,
                     reply_to_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    message_id.to_string(),
                    group_id.to_string(),
                    sender_id.to_string(),
                    sender_name,
                    content,
                    message_type.as_str(),
                    reply_to_id,
                    now,
                ],
            )?;

            // Own messages are self-read at creation.
            conn.execute(
                "INSERT INTO read_receipts (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                (message_id.to_string(), sender_id.to_string(), now),
            )?;

            load_message(conn, message_id)
        })?;

        message.ok_or_else(|| Error::Internal(anyhow::anyhow!("message vanished after insert")))
    }

    /// Edit message content. Sender-only, within 15 minutes of creation.
    pub fn edit_message(
        &self,
        message_id: Uuid,
        editor: Uuid,
        content: &str,
    ) -> Result<Message, Error> {
        let row = self
            .get_message_row(message_id)?
            .ok_or_else(|| Error::not_found("message not found"))?;

        if row.sender_id != editor.to_string() {
            return Err(Error::forbidden("only the sender can edit a message"));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("message content cannot be empty"));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(Error::validation(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_LEN
            )));
        }

        if row.is_deleted {
            return Err(Error::conflict("message deleted"));
        }

        let created_at = parse_ts(&row.created_at)?;
        if Utc::now() - created_at > chrono::Duration::minutes(EDIT_WINDOW_MINUTES) {
            return Err(Error::conflict("message is too old to edit"));
        }

        let message = self.with_conn(|conn| {
            set_content(conn, message_id, content)?;
            load_message(conn, message_id)
        })?;

        message.ok_or_else(|| Error::Internal(anyhow::anyhow!("message vanished during edit")))
    }

    /// Redact a message to the tombstone. Allowed for the sender or a group
    /// admin; idempotent when already deleted. The row is never hard-deleted.
    pub fn soft_delete(
        &self,
        gate: &dyn MembershipGate,
        message_id: Uuid,
        caller: Uuid,
    ) -> Result<Message, Error> {
        let row = self
            .get_message_row(message_id)?
            .ok_or_else(|| Error::not_found("message not found"))?;
        let group_id: Uuid = parse_uuid(&row.group_id)?;

        let is_sender = row.sender_id == caller.to_string();
        let is_admin = matches!(
            gate.role_in_group(group_id, caller)?,
            Some(GroupRole::Admin)
        );
        if !is_sender && !is_admin {
            return Err(Error::forbidden(
                "only the sender or a group admin can delete a message",
            ));
        }

        let message = self.with_conn(|conn| {
            if !row.is_deleted {
                conn.execute(
                    "UPDATE messages SET is_deleted = 1, deleted_at = ?1, content = ?2
                     WHERE id = ?3",
                    (now_ts(), TOMBSTONE, message_id.to_string()),
                )?;
            }
            load_message(conn, message_id)
        })?;

        message.ok_or_else(|| Error::Internal(anyhow::anyhow!("message vanished during delete")))
    }

    /// Add a (user, emoji) reaction. A duplicate pair is a no-op signaled via
    /// the returned flag; the UNIQUE index makes this safe under concurrency.
    pub fn add_reaction(
        &self,
        gate: &dyn MembershipGate,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(Vec<Reaction>, bool), Error> {
        let row = self
            .get_message_row(message_id)?
            .ok_or_else(|| Error::not_found("message not found"))?;
        require_member(gate, parse_uuid(&row.group_id)?, user_id)?;

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reactions (id, message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    message_id.to_string(),
                    user_id.to_string(),
                    emoji,
                    now_ts(),
                ],
            )?;
            let reactions = query_reactions(conn, message_id)?;
            Ok((reactions, inserted == 0))
        })
        .map_err(Error::from)
    }

    /// Remove all reactions matching (user, emoji). Removing a reaction that
    /// was never added is a silent no-op.
    pub fn remove_reaction(
        &self,
        gate: &dyn MembershipGate,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Vec<Reaction>, Error> {
        let row = self
            .get_message_row(message_id)?
            .ok_or_else(|| Error::not_found("message not found"))?;
        require_member(gate, parse_uuid(&row.group_id)?, user_id)?;

        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                (message_id.to_string(), user_id.to_string(), emoji),
            )?;
            query_reactions(conn, message_id)
        })
        .map_err(Error::from)
    }

    /// Non-deleted messages in the group not authored by `user_id` and with
    /// no read receipt for them.
    pub fn unread_count(
        &self,
        gate: &dyn MembershipGate,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, Error> {
        require_member(gate, group_id, user_id)?;

        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.group_id = ?1 AND m.is_deleted = 0 AND m.sender_id <> ?2
                   AND NOT EXISTS (
                        SELECT 1 FROM read_receipts r
                        WHERE r.message_id = m.id AND r.user_id = ?2)",
                (group_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .map_err(Error::from)
    }

    pub fn get_message(&self, message_id: Uuid) -> Result<Message, Error> {
        let message = self.with_conn(|conn| load_message(conn, message_id))?;
        message.ok_or_else(|| Error::not_found("message not found"))
    }

    fn get_message_row(&self, message_id: Uuid) -> Result<Option<MessageRow>, Error> {
        self.with_conn(|conn| query_message_row(conn, message_id))
            .map_err(Error::from)
    }
}

/// NotFound if the group doesn't exist, Forbidden if the user isn't in it.
fn require_member(
    gate: &dyn MembershipGate,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<GroupRole, Error> {
    if !gate.group_exists(group_id)? {
        return Err(Error::not_found("group not found"));
    }
    gate.role_in_group(group_id, user_id)?
        .ok_or_else(|| Error::forbidden("not a member of this group"))
}

/// The only statement that changes message content after creation. Always
/// stamps the edit metadata, so any future content-mutating path inherits
/// the side effect.
fn set_content(conn: &Connection, message_id: Uuid, content: &str) -> Result<()> {
    conn.execute(
        "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
        (content, now_ts(), message_id.to_string()),
    )?;
    Ok(())
}

/// A reply reference must point at a message in the same group; anything
/// else is dropped, not treated as fatal.
fn resolve_reply(conn: &Connection, group_id: Uuid, reply_to: Option<Uuid>) -> Result<Option<String>> {
    let Some(target) = reply_to else {
        return Ok(None);
    };

    let target_group: Option<String> = conn
        .query_row(
            "SELECT group_id FROM messages WHERE id = ?1",
            [target.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match target_group {
        Some(g) if g == group_id.to_string() => Some(target.to_string()),
        _ => None,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        message_type: row.get(5)?,
        reply_to_id: row.get(6)?,
        created_at: row.get(7)?,
        is_edited: row.get(8)?,
        edited_at: row.get(9)?,
        is_deleted: row.get(10)?,
        deleted_at: row.get(11)?,
    })
}

fn query_message_row(conn: &Connection, message_id: Uuid) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, sender_id, sender_name, content, message_type,
                reply_to_id, created_at, is_edited, edited_at, is_deleted, deleted_at
         FROM messages WHERE id = ?1",
    )?;
    stmt.query_row([message_id.to_string()], map_message_row)
        .optional()
}

fn load_message(conn: &Connection, message_id: Uuid) -> Result<Option<Message>> {
    let Some(row) = query_message_row(conn, message_id)? else {
        return Ok(None);
    };
    let mut hydrated = hydrate_messages(conn, vec![row])?;
    Ok(hydrated.pop())
}

fn query_reactions(conn: &Connection, message_id: Uuid) -> Result<Vec<Reaction>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, emoji, created_at FROM reactions
         WHERE message_id = ?1 ORDER BY created_at, user_id",
    )?;
    let rows = stmt
        .query_map([message_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user_id, emoji, created_at)| {
            Ok(Reaction {
                user_id: user_id.parse()?,
                emoji,
                reacted_at: parse_ts(&created_at)?,
            })
        })
        .collect()
}

/// Attach reactions, read receipts, and reply previews to a batch of rows
/// without going N+1.
fn hydrate_messages(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let in_clause = placeholders.join(", ");
    let params: Vec<&dyn rusqlite::types::ToSql> = ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let mut reactions: HashMap<String, Vec<Reaction>> = HashMap::new();
    {
        let sql = format!(
            "SELECT message_id, user_id, emoji, created_at FROM reactions
             WHERE message_id IN ({}) ORDER BY created_at, user_id",
            in_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (message_id, user_id, emoji, created_at) in raw {
            reactions.entry(message_id).or_default().push(Reaction {
                user_id: user_id.parse()?,
                emoji,
                reacted_at: parse_ts(&created_at)?,
            });
        }
    }

    let mut receipts: HashMap<String, Vec<ReadReceipt>> = HashMap::new();
    {
        let sql = format!(
            "SELECT message_id, user_id, read_at FROM read_receipts
             WHERE message_id IN ({}) ORDER BY read_at, user_id",
            in_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (message_id, user_id, read_at) in raw {
            receipts.entry(message_id).or_default().push(ReadReceipt {
                user_id: user_id.parse()?,
                read_at: parse_ts(&read_at)?,
            });
        }
    }

    let mut previews: HashMap<String, ReplyPreview> = HashMap::new();
    let reply_ids: Vec<&String> = rows.iter().filter_map(|r| r.reply_to_id.as_ref()).collect();
    if !reply_ids.is_empty() {
        let placeholders: Vec<String> = (1..=reply_ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT id, sender_name, content FROM messages WHERE id IN ({})",
            placeholders.join(", ")
        );
        let reply_params: Vec<&dyn rusqlite::types::ToSql> = reply_ids
            .iter()
            .map(|id| *id as &dyn rusqlite::types::ToSql)
            .collect();
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(reply_params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (id, sender_name, content) in raw {
            previews.insert(
                id.clone(),
                ReplyPreview {
                    message_id: id.parse()?,
                    sender_name,
                    content,
                },
            );
        }
    }

    rows.into_iter()
        .map(|row| {
            Ok(Message {
                id: parse_uuid(&row.id)?,
                group_id: parse_uuid(&row.group_id)?,
                sender_id: parse_uuid(&row.sender_id)?,
                sender_name: row.sender_name,
                message_type: row
                    .message_type
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?,
                created_at: parse_ts(&row.created_at)?,
                is_edited: row.is_edited,
                edited_at: row.edited_at.as_deref().map(parse_ts).transpose()?,
                is_deleted: row.is_deleted,
                deleted_at: row.deleted_at.as_deref().map(parse_ts).transpose()?,
                reply_to: row
                    .reply_to_id
                    .as_ref()
                    .and_then(|id| previews.get(id).cloned()),
                reactions: reactions.remove(&row.id).unwrap_or_default(),
                read_by: receipts.remove(&row.id).unwrap_or_default(),
                content: row.content,
            })
        })
        .collect()
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("corrupt uuid '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{backdate_message, seed_group, test_db};

    fn setup() -> (Database, Uuid, Uuid, Uuid, Uuid) {
        let db = test_db();
        let group = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let admin = Uuid::new_v4();
        seed_group(
            &db,
            group,
            &[(alice, "member"), (bob, "member"), (admin, "admin")],
        );
        (db, group, alice, bob, admin)
    }

    fn send(db: &Database, group: Uuid, sender: Uuid, content: &str) -> Message {
        db.send_message(db, group, sender, "someone", content, MessageType::Text, None)
            .unwrap()
    }

    #[test]
    fn send_seeds_sender_receipt_and_validates_content() {
        let (db, group, alice, ..) = setup();

        let msg = send(&db, group, alice, "  hello  ");
        assert_eq!(msg.content, "hello");
        assert!(msg.is_read_by(alice));

        let err = db
            .send_message(&db, group, alice, "a", "   ", MessageType::Text, None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        let err = db
            .send_message(&db, group, alice, "a", &long, MessageType::Text, None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn cross_group_reply_is_silently_dropped() {
        let (db, group, alice, ..) = setup();
        let other_group = Uuid::new_v4();
        seed_group(&db, other_group, &[(alice, "member")]);

        let elsewhere = send(&db, other_group, alice, "over here");
        let msg = db
            .send_message(
                &db,
                group,
                alice,
                "alice",
                "replying",
                MessageType::Text,
                Some(elsewhere.id),
            )
            .unwrap();
        assert!(msg.reply_to.is_none());

        // Dangling reference behaves the same.
        let msg = db
            .send_message(
                &db,
                group,
                alice,
                "alice",
                "replying again",
                MessageType::Text,
                Some(Uuid::new_v4()),
            )
            .unwrap();
        assert!(msg.reply_to.is_none());

        // Same-group reply resolves to a preview.
        let target = send(&db, group, alice, "original");
        let msg = db
            .send_message(
                &db,
                group,
                alice,
                "alice",
                "a real reply",
                MessageType::Text,
                Some(target.id),
            )
            .unwrap();
        assert_eq!(msg.reply_to.unwrap().content, "original");
    }

    #[test]
    fn fetch_requires_existing_group_and_membership() {
        let (db, group, alice, ..) = setup();
        let stranger = Uuid::new_v4();

        let err = db.fetch_page(&db, Uuid::new_v4(), alice, 1, 50).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = db.fetch_page(&db, group, stranger, 1, 50).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn fetch_marks_read_without_duplicating() {
        let (db, group, alice, bob, _) = setup();
        send(&db, group, alice, "one");
        send(&db, group, alice, "two");

        let page = db.fetch_page(&db, group, bob, 1, 50).unwrap();
        assert_eq!(page.messages.len(), 2);
        for m in &page.messages {
            assert!(m.is_read_by(bob), "bob should be marked read on fetch");
            assert!(m.is_read_by(alice), "sender stays self-read");
        }

        // Refetch must not grow read_by.
        let again = db.fetch_page(&db, group, bob, 1, 50).unwrap();
        for m in &again.messages {
            assert_eq!(m.read_by.len(), 2);
        }
    }

    #[test]
    fn pages_are_oldest_first_with_correct_envelope() {
        let (db, group, alice, ..) = setup();
        for i in 0..5 {
            let m = send(&db, group, alice, &format!("m{}", i));
            // Space creations out so ordering is unambiguous.
            backdate_message(&db, m.id, (5 - i) as i64);
        }

        let page = db.fetch_page(&db, group, alice, 1, 2).unwrap();
        assert_eq!(page.pagination.total_messages, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
        assert!(!page.pagination.has_prev);
        // Page 1 holds the newest two, displayed oldest-first.
        let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let last = db.fetch_page(&db, group, alice, 3, 2).unwrap();
        assert_eq!(last.messages.len(), 1);
        assert_eq!(last.messages[0].content, "m0");
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);
    }

    #[test]
    fn edit_window_and_ownership() {
        let (db, group, alice, bob, _) = setup();
        let msg = send(&db, group, alice, "hello");

        let err = db.edit_message(msg.id, bob, "hijacked").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = db.edit_message(msg.id, alice, "   ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        backdate_message(&db, msg.id, 14);
        let edited = db.edit_message(msg.id, alice, "hello there").unwrap();
        assert_eq!(edited.content, "hello there");
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());

        backdate_message(&db, msg.id, 16);
        let err = db.edit_message(msg.id, alice, "too late").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = db.edit_message(Uuid::new_v4(), alice, "ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn soft_delete_tombstones_and_is_idempotent() {
        let (db, group, alice, bob, admin) = setup();
        let msg = send(&db, group, alice, "delete me");
        db.add_reaction(&db, msg.id, bob, "❤️").unwrap();
        db.fetch_page(&db, group, bob, 1, 50).unwrap();

        // A plain member who isn't the sender can't delete.
        let err = db.soft_delete(&db, msg.id, bob).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let deleted = db.soft_delete(&db, msg.id, admin).unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, TOMBSTONE);
        assert_eq!(deleted.id, msg.id);
        assert_eq!(deleted.created_at, msg.created_at);
        assert!(!deleted.is_edited, "tombstoning is not an edit");
        assert_eq!(deleted.reactions.len(), 1, "reactions survive deletion");
        assert!(deleted.is_read_by(bob), "receipts survive deletion");

        // Second delete: no error, no state change.
        let again = db.soft_delete(&db, msg.id, alice).unwrap();
        assert_eq!(again.deleted_at, deleted.deleted_at);

        // Deleted messages drop out of listings but stay addressable.
        let page = db.fetch_page(&db, group, alice, 1, 50).unwrap();
        assert_eq!(page.pagination.total_messages, 0);
        assert!(page.messages.is_empty());
        assert_eq!(db.get_message(msg.id).unwrap().content, TOMBSTONE);
    }

    #[test]
    fn deleted_message_cannot_be_edited() {
        let (db, group, alice, ..) = setup();
        let msg = send(&db, group, alice, "soon gone");
        db.soft_delete(&db, msg.id, alice).unwrap();

        let err = db.edit_message(msg.id, alice, "resurrect").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn reactions_dedupe_and_remove_silently() {
        let (db, group, alice, bob, _) = setup();
        let msg = send(&db, group, alice, "react to me");

        let (reactions, dup) = db.add_reaction(&db, msg.id, bob, "👍").unwrap();
        assert!(!dup);
        assert_eq!(reactions.len(), 1);

        let (reactions, dup) = db.add_reaction(&db, msg.id, bob, "👍").unwrap();
        assert!(dup, "second add reports already-reacted");
        assert_eq!(reactions.len(), 1, "no second row for the same pair");

        let reactions = db.remove_reaction(&db, msg.id, bob, "👍").unwrap();
        assert!(reactions.is_empty());

        // Removing what isn't there is a silent no-op.
        let reactions = db.remove_reaction(&db, msg.id, bob, "👍").unwrap();
        assert!(reactions.is_empty());

        // And the pair can come back afterwards.
        let (reactions, dup) = db.add_reaction(&db, msg.id, bob, "👍").unwrap();
        assert!(!dup);
        assert_eq!(reactions.len(), 1);

        let stranger = Uuid::new_v4();
        let err = db.add_reaction(&db, msg.id, stranger, "👍").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn unread_count_tracks_receipts() {
        let (db, group, alice, bob, _) = setup();
        send(&db, group, alice, "one");
        send(&db, group, alice, "two");
        let third = send(&db, group, alice, "three");

        assert_eq!(db.unread_count(&db, group, bob).unwrap(), 3);
        assert_eq!(db.unread_count(&db, group, alice).unwrap(), 0);

        db.fetch_page(&db, group, bob, 1, 50).unwrap();
        assert_eq!(db.unread_count(&db, group, bob).unwrap(), 0);

        // A deleted message never counts as unread.
        let fourth = send(&db, group, alice, "four");
        db.soft_delete(&db, fourth.id, alice).unwrap();
        assert_eq!(db.unread_count(&db, group, bob).unwrap(), 0);
        let _ = third;
    }

    #[test]
    fn full_conversation_scenario() {
        // G has members U1, U2 plus an admin. U1 sends, U2 fetches and
        // reacts, U1 edits in-window, the admin tombstones.
        let (db, group, u1, u2, admin) = setup();

        let sent = db
            .send_message(&db, group, u1, "u1", "hello", MessageType::Text, None)
            .unwrap();

        let page = db.fetch_page(&db, group, u2, 1, 50).unwrap();
        assert_eq!(page.messages.len(), 1);
        let m = &page.messages[0];
        assert_eq!(m.content, "hello");
        assert!(m.is_read_by(u1));
        assert!(m.is_read_by(u2));

        let edited = db.edit_message(sent.id, u1, "hello there").unwrap();
        assert_eq!(edited.content, "hello there");
        assert!(edited.is_edited);

        let (reactions, _) = db.add_reaction(&db, sent.id, u2, "❤️").unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].user_id, u2);

        let deleted = db.soft_delete(&db, sent.id, admin).unwrap();
        assert_eq!(deleted.content, TOMBSTONE);
        assert_eq!(deleted.reactions.len(), 1);
        assert_eq!(deleted.read_by.len(), 2);
    }
}
