use crate::models::{MessageRow, NotificationRow, VoteRow};
use crate::{Database, timestamp};
use anyhow::{Result, bail};
use felicity_types::vote::{self, VoteValue};
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str = "id, event_id, author_id, author_name, author_role, parent_id, content, \
     is_pinned, is_announcement, is_deleted, score, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Pinned(bool),
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Stored under a parent written by `parent_author_id`.
    Inserted { parent_author_id: String },
    /// No such parent, or it belongs to another event.
    ParentMissing,
    ParentDeleted,
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded { score: i64, value: VoteValue },
    Deleted,
    NotFound,
}

impl Database {
    // -- Messages --

    pub fn insert_message(&self, message: &MessageRow) -> Result<()> {
        self.with_conn(|conn| insert_row(conn, message))
    }

    /// Insert a reply if its parent is in the same event, not deleted and
    /// above `max_depth`. The checks and the insert share one transaction.
    pub fn insert_reply(&self, reply: &MessageRow, max_depth: u32) -> Result<ReplyOutcome> {
        let Some(parent_id) = reply.parent_id.as_deref() else {
            bail!("message {} is not a reply", reply.id);
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let parent: Option<(String, String, bool)> = tx
                .query_row(
                    "SELECT event_id, author_id, is_deleted FROM messages WHERE id = ?1",
                    [parent_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let parent_author_id = match parent {
                None => return Ok(ReplyOutcome::ParentMissing),
                Some((event_id, _, _)) if event_id != reply.event_id => return Ok(ReplyOutcome::ParentMissing),
                Some((_, _, true)) => return Ok(ReplyOutcome::ParentDeleted),
                Some((_, author_id, false)) => author_id,
            };

            // Walk up at most max_depth links; a longer chain counts as too deep.
            let parent_depth: u32 = tx.query_row(
                "WITH RECURSIVE ancestors(id, parent_id, depth) AS (
                     SELECT id, parent_id, 0 FROM messages WHERE id = ?1
                     UNION ALL
                     SELECT m.id, m.parent_id, a.depth + 1
                     FROM messages m JOIN ancestors a ON m.id = a.parent_id
                     WHERE a.depth < ?2
                 )
                 SELECT MAX(depth) FROM ancestors",
                rusqlite::params![parent_id, max_depth],
                |row| row.get(0),
            )?;
            if parent_depth >= max_depth {
                return Ok(ReplyOutcome::TooDeep);
            }

            insert_row(&tx, reply)?;
            tx.commit()?;
            Ok(ReplyOutcome::Inserted { parent_author_id })
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// All messages of an event, oldest first.
    pub fn list_messages(&self, event_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE event_id = ?1 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))?;

            let rows = stmt
                .query_map([event_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Distinct authors who have posted in an event's forum.
    pub fn forum_authors(&self, event_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT author_id FROM messages WHERE event_id = ?1")?;
            let authors = stmt
                .query_map([event_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(authors)
        })
    }

    /// Soft delete: the row stays so replies keep their parent. The content
    /// is wiped and the pin dropped.
    pub fn soft_delete_message(&self, id: &str) -> Result<DeleteOutcome> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1, is_pinned = 0, content = ''
                 WHERE id = ?1 AND is_deleted = 0",
                [id],
            )?;
            if changed > 0 {
                return Ok(DeleteOutcome::Deleted);
            }
            Ok(match query_message(conn, id)? {
                Some(_) => DeleteOutcome::AlreadyDeleted,
                None => DeleteOutcome::NotFound,
            })
        })
    }

    /// Flip the pin flag.
    pub fn toggle_pin(&self, id: &str) -> Result<PinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<(bool, bool)> = tx
                .query_row(
                    "SELECT is_pinned, is_deleted FROM messages WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = match current {
                None => PinOutcome::NotFound,
                Some((_, true)) => PinOutcome::Deleted,
                Some((pinned, false)) => {
                    tx.execute(
                        "UPDATE messages SET is_pinned = ?2 WHERE id = ?1",
                        rusqlite::params![id, !pinned],
                    )?;
                    PinOutcome::Pinned(!pinned)
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    // -- Votes --

    /// Record a vote and adjust the cached tally in one transaction.
    pub fn cast_vote(&self, message_id: &str, user_id: &str, requested: VoteValue) -> Result<VoteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let message: Option<(bool, i64)> = tx
                .query_row(
                    "SELECT is_deleted, score FROM messages WHERE id = ?1",
                    [message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let score = match message {
                None => return Ok(VoteOutcome::NotFound),
                Some((true, _)) => return Ok(VoteOutcome::Deleted),
                Some((false, score)) => score,
            };

            let held: i8 = tx
                .query_row(
                    "SELECT value FROM votes WHERE message_id = ?1 AND user_id = ?2",
                    [message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            let previous = VoteValue::try_from(held).unwrap_or(VoteValue::Clear);

            let step = vote::transition(previous, requested);

            tx.execute(
                "INSERT INTO votes (message_id, user_id, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![message_id, user_id, i8::from(step.value), timestamp(chrono::Utc::now())],
            )?;

            let score = score + step.delta;
            if step.delta != 0 {
                tx.execute(
                    "UPDATE messages SET score = ?2 WHERE id = ?1",
                    rusqlite::params![message_id, score],
                )?;
            }

            tx.commit()?;
            Ok(VoteOutcome::Recorded {
                score,
                value: step.value,
            })
        })
    }

    /// Non-zero votes a user holds on an event's messages.
    pub fn votes_for_user(&self, event_id: &str, user_id: &str) -> Result<Vec<VoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT v.message_id, v.user_id, v.value
                 FROM votes v
                 JOIN messages m ON m.id = v.message_id
                 WHERE m.event_id = ?1 AND v.user_id = ?2 AND v.value != 0",
            )?;

            let rows = stmt
                .query_map([event_id, user_id], |row| {
                    Ok(VoteRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &NotificationRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, message, event_id, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    notification.id,
                    notification.user_id,
                    notification.kind,
                    notification.title,
                    notification.message,
                    notification.event_id,
                    notification.read,
                    notification.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// A user's notifications, newest first.
    pub fn list_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, title, message, event_id, read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        message: row.get(4)?,
                        event_id: row.get(5)?,
                        read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Returns false when the notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }
}

fn insert_row(conn: &Connection, message: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, event_id, author_id, author_name, author_role, parent_id,
                               content, is_pinned, is_announcement, is_deleted, score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            message.id,
            message.event_id,
            message.author_id,
            message.author_name,
            message.author_role,
            message.parent_id,
            message.content,
            message.is_pinned,
            message.is_announcement,
            message.is_deleted,
            message.score,
            message.created_at,
        ],
    )?;
    Ok(())
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS))?;
    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        author_role: row.get(4)?,
        parent_id: row.get(5)?,
        content: row.get(6)?,
        is_pinned: row.get(7)?,
        is_announcement: row.get(8)?,
        is_deleted: row.get(9)?,
        score: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
