/// Database row types — these map directly to SQLite rows.
/// Distinct from felicity-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub event_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_role: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_pinned: bool,
    pub is_announcement: bool,
    pub is_deleted: bool,
    pub score: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct VoteRow {
    pub message_id: String,
    pub user_id: String,
    pub value: i8,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub event_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}
