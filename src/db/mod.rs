mod progress;
mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{ffi, Connection, Row, ToSql};

use crate::error::{Result, TrackerError};
use crate::models::*;

/// Handle to the work-item store.
///
/// Clones share one connection. Every component receives the handle
/// explicitly; there is no process-wide connection.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn find(&self, key: &ItemKey) -> Result<Option<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?", select_from(key.kind())))?;

        let mut rows = stmt.query([key.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_raw(row)?.into_item()?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, key: &ItemKey) -> Result<WorkItem> {
        self.find(key)?
            .ok_or_else(|| TrackerError::ItemNotFound(key.to_string()))
    }

    pub fn exists(&self, key: &ItemKey) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        row_exists(&conn, key)
    }

    /// Items of one kind, in ascending key order.
    pub fn list_items(&self, kind: ItemKind, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref parent) = filter.parent {
            match parent_column(kind) {
                Some(column) => {
                    conditions.push(format!("{} = ?", column));
                    params.push(parent.to_string());
                }
                None => return Ok(Vec::new()),
            }
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(status.as_str().to_string());
        }

        let mut sql = select_from(kind).to_string();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        self.query_items(&sql, rusqlite::params_from_iter(params))
    }

    /// Direct children of `parent`, in ascending key order.
    pub fn list_children(&self, parent: &ItemKey) -> Result<Vec<WorkItem>> {
        let Some(kind) = parent.kind().child_kind() else {
            return Ok(Vec::new());
        };
        self.list_items(
            kind,
            &ItemFilter {
                parent: Some(parent.clone()),
                status: None,
            },
        )
    }

    pub fn get_detail(&self, key: &ItemKey) -> Result<ItemDetail> {
        let item = self.get(key)?;
        let children = self.list_children(key)?;
        Ok(ItemDetail { item, children })
    }

    /// Every item of every kind, in ascending key order.
    pub fn all_items(&self) -> Result<Vec<WorkItem>> {
        self.items_where(None)
    }

    /// Items that have not been mirrored to the remote tracker yet.
    pub fn unlinked_items(&self) -> Result<Vec<WorkItem>> {
        self.items_where(Some("remote_ref IS NULL"))
    }

    /// Items that already carry a remote reference.
    pub fn linked_items(&self) -> Result<Vec<WorkItem>> {
        self.items_where(Some("remote_ref IS NOT NULL"))
    }

    fn items_where(&self, condition: Option<&str>) -> Result<Vec<WorkItem>> {
        let mut items = Vec::new();
        for kind in ItemKind::ALL {
            let sql = match condition {
                Some(condition) => format!("{} WHERE {}", select_from(kind), condition),
                None => select_from(kind).to_string(),
            };
            items.extend(self.query_items(&sql, [])?);
        }
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    fn query_items<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(sql)?;

        let raw = stmt
            .query_map(params, read_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut items = raw
            .into_iter()
            .map(RawItem::into_item)
            .collect::<Result<Vec<_>>>()?;
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    // ============================================================
    // Writes
    // ============================================================

    /// Create an item under an existing parent.
    ///
    /// When `parent` is omitted the parent implied by the key's numbering is
    /// used; an explicit parent must be that same item. Epics take no parent.
    pub fn create(&self, input: CreateItemInput) -> Result<WorkItem> {
        let conn = self.conn.lock().expect("database lock poisoned");
        insert_item(&conn, input, Utc::now())
    }

    /// Apply a partial update and return the updated item.
    pub fn update(&self, key: &ItemKey, input: UpdateItemInput) -> Result<WorkItem> {
        if input.is_empty() {
            return self.get(key);
        }
        let kind = key.kind();
        let unsupported = |field: &'static str| TrackerError::FieldNotSupported { kind, field };

        let mut updates = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = input.title {
            updates.push("title = ?");
            params.push(Box::new(title));
        }
        if let Some(description) = input.description {
            if !kind.is_detailed() {
                return Err(unsupported("description"));
            }
            updates.push("description = ?");
            params.push(Box::new(description));
        }
        if let Some(status) = input.status {
            updates.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(priority) = input.priority {
            if !kind.is_detailed() {
                return Err(unsupported("priority"));
            }
            updates.push("priority = ?");
            params.push(Box::new(priority.as_str()));
        }
        if let Some(hours) = input.estimated_hours {
            if !kind.has_effort() {
                return Err(unsupported("estimated_hours"));
            }
            updates.push("estimated_hours = ?");
            params.push(Box::new(hours));
        }
        if let Some(hours) = input.actual_hours {
            if !kind.has_effort() {
                return Err(unsupported("actual_hours"));
            }
            updates.push("actual_hours = ?");
            params.push(Box::new(hours));
        }
        if let Some(started_at) = input.started_at {
            if !kind.is_detailed() {
                return Err(unsupported("started_at"));
            }
            updates.push("started_at = ?");
            params.push(Box::new(started_at.to_rfc3339()));
        }
        if let Some(completed_at) = input.completed_at {
            updates.push("completed_at = ?");
            params.push(Box::new(completed_at.to_rfc3339()));
        }

        params.push(Box::new(key.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            table(kind),
            updates.join(", ")
        );
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = {
            let conn = self.conn.lock().expect("database lock poisoned");
            conn.execute(&sql, params_ref.as_slice())?
        };
        if rows == 0 {
            return Err(TrackerError::ItemNotFound(key.to_string()));
        }

        self.get(key)
    }

    /// Record the remote reference for an item, only if none is set yet.
    ///
    /// Returns `false` when the item was already linked; the existing
    /// reference is never overwritten.
    pub fn link_remote(&self, key: &ItemKey, remote_ref: RemoteRef) -> Result<bool> {
        let rows = {
            let conn = self.conn.lock().expect("database lock poisoned");
            conn.execute(
                &format!(
                    "UPDATE {} SET remote_ref = ? WHERE id = ? AND remote_ref IS NULL",
                    table(key.kind())
                ),
                (remote_ref, key.to_string()),
            )?
        };

        if rows > 0 {
            return Ok(true);
        }
        if !self.exists(key)? {
            return Err(TrackerError::ItemNotFound(key.to_string()));
        }
        Ok(false)
    }

    /// Delete an item. Without `cascade`, items that still have children are
    /// refused. Returns the number of items removed, descendants included.
    pub fn delete(&self, key: &ItemKey, cascade: bool) -> Result<usize> {
        if !self.exists(key)? {
            return Err(TrackerError::ItemNotFound(key.to_string()));
        }

        let children = self.list_children(key)?;
        if !children.is_empty() && !cascade {
            return Err(TrackerError::HasDependents {
                key: key.to_string(),
                count: children.len(),
            });
        }

        let removed = 1 + self.count_descendants(key)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table(key.kind())),
            [key.to_string()],
        )?;

        Ok(removed)
    }

    fn count_descendants(&self, key: &ItemKey) -> Result<usize> {
        let mut count = 0;
        for child in self.list_children(key)? {
            count += 1 + self.count_descendants(&child.key)?;
        }
        Ok(count)
    }

    // ============================================================
    // Batch operations
    // ============================================================

    /// Create every item in a nested seed plan, parents first. The plan is
    /// applied in one transaction: if any item fails, nothing is created.
    pub fn seed(&self, plan: &SeedPlan) -> Result<SeedSummary> {
        self.seed_with(plan, false)
    }

    /// Remove every item, then seed. A failing plan leaves the existing
    /// items in place.
    pub fn reseed(&self, plan: &SeedPlan) -> Result<SeedSummary> {
        self.seed_with(plan, true)
    }

    fn seed_with(&self, plan: &SeedPlan, reset: bool) -> Result<SeedSummary> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.unchecked_transaction()?;
        if reset {
            tx.execute("DELETE FROM epics", [])?;
        }

        let now = Utc::now();
        let mut summary = SeedSummary::default();

        for epic in &plan.epics {
            insert_item(
                &tx,
                CreateItemInput {
                    description: epic.description.clone(),
                    priority: epic.priority,
                    ..CreateItemInput::new(epic.id.clone(), None, &epic.title)
                },
                now,
            )?;
            summary.epics += 1;

            for story in &epic.stories {
                insert_item(
                    &tx,
                    CreateItemInput {
                        description: story.description.clone(),
                        priority: story.priority,
                        ..CreateItemInput::new(story.id.clone(), Some(epic.id.clone()), &story.title)
                    },
                    now,
                )?;
                summary.stories += 1;

                for task in &story.tasks {
                    insert_item(
                        &tx,
                        CreateItemInput {
                            description: task.description.clone(),
                            priority: task.priority,
                            estimated_hours: task.estimated_hours,
                            ..CreateItemInput::new(task.id.clone(), Some(story.id.clone()), &task.title)
                        },
                        now,
                    )?;
                    summary.tasks += 1;

                    for (i, title) in task.subtasks.iter().enumerate() {
                        let Some(key) = task.id.child(i as u32 + 1) else {
                            return Err(TrackerError::InvalidKey(task.id.to_string()));
                        };
                        insert_item(&tx, CreateItemInput::new(key, Some(task.id.clone()), title), now)?;
                        summary.subtasks += 1;
                    }
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            "Seeded {} items ({} epics, {} stories, {} tasks, {} subtasks)",
            summary.total(),
            summary.epics,
            summary.stories,
            summary.tasks,
            summary.subtasks
        );
        Ok(summary)
    }

    /// Remove every item. Deleting the epics cascades to everything below.
    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute("DELETE FROM epics", [])?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn row_exists(conn: &Connection, key: &ItemKey) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE id = ?", table(key.kind())),
        [key.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Validate and insert one item on `conn`, which may be a transaction.
///
/// An item created directly as `IN_PROGRESS` or `DONE` gets the timestamps a
/// transition out of `BACKLOG` would have set.
fn insert_item(conn: &Connection, input: CreateItemInput, now: DateTime<Utc>) -> Result<WorkItem> {
    let key = input.key.clone();
    let kind = key.kind();

    if input.kind.is_some_and(|declared| declared != kind) {
        return Err(TrackerError::InvalidKey(key.to_string()));
    }

    let parent = match key.implied_parent() {
        None => {
            if input.parent.is_some() {
                return Err(TrackerError::FieldNotSupported {
                    kind,
                    field: "parent",
                });
            }
            None
        }
        Some(implied) => {
            let parent = input.parent.clone().unwrap_or_else(|| implied.clone());
            if parent != implied || !row_exists(conn, &parent)? {
                return Err(TrackerError::ParentNotFound {
                    key: key.to_string(),
                    parent: parent.to_string(),
                });
            }
            Some(parent)
        }
    };

    if !kind.is_detailed() {
        if input.description.is_some() {
            return Err(TrackerError::FieldNotSupported {
                kind,
                field: "description",
            });
        }
        if input.priority.is_some() {
            return Err(TrackerError::FieldNotSupported {
                kind,
                field: "priority",
            });
        }
    }
    if !kind.has_effort() && input.estimated_hours.is_some() {
        return Err(TrackerError::FieldNotSupported {
            kind,
            field: "estimated_hours",
        });
    }

    if row_exists(conn, &key)? {
        return Err(TrackerError::DuplicateKey(key.to_string()));
    }

    let status = input.status.unwrap_or(Status::Backlog);
    let priority = kind.is_detailed().then(|| {
        input.priority.unwrap_or(match kind {
            ItemKind::Epic => Priority::High,
            _ => Priority::Medium,
        })
    });
    let started_at = (kind.is_detailed() && matches!(status, Status::InProgress | Status::Done))
        .then_some(now);
    let completed_at = (status == Status::Done).then_some(now);

    let id = key.to_string();
    let parent_id = parent.as_ref().map(ToString::to_string);
    let priority_str = priority.map(|p| p.as_str());
    let created = now.to_rfc3339();
    let started = started_at.map(|t| t.to_rfc3339());
    let completed = completed_at.map(|t| t.to_rfc3339());

    let result = match kind {
        ItemKind::Epic => conn.execute(
            "INSERT INTO epics (id, title, description, status, priority, created_at, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &input.title,
                &input.description,
                status.as_str(),
                priority_str,
                &created,
                &started,
                &completed,
            ),
        ),
        ItemKind::Story => conn.execute(
            "INSERT INTO stories (id, epic_id, title, description, status, priority, created_at, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &parent_id,
                &input.title,
                &input.description,
                status.as_str(),
                priority_str,
                &created,
                &started,
                &completed,
            ),
        ),
        ItemKind::Task => conn.execute(
            "INSERT INTO tasks (id, story_id, title, description, status, priority, estimated_hours,
                                created_at, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &parent_id,
                &input.title,
                &input.description,
                status.as_str(),
                priority_str,
                input.estimated_hours,
                &created,
                &started,
                &completed,
            ),
        ),
        ItemKind::Subtask => conn.execute(
            "INSERT INTO subtasks (id, task_id, title, status, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (&id, &parent_id, &input.title, status.as_str(), &created, &completed),
        ),
    };
    result.map_err(|e| constraint_error(e, &id, parent_id.as_deref()))?;

    Ok(WorkItem {
        key,
        parent,
        title: input.title,
        description: input.description,
        status,
        priority,
        estimated_hours: input.estimated_hours,
        actual_hours: None,
        remote_ref: None,
        created_at: now,
        started_at,
        completed_at,
    })
}

fn default_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "plan-tracker")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("tracker.db"))
}

fn table(kind: ItemKind) -> &'static str {
    kind.plural()
}

fn parent_column(kind: ItemKind) -> Option<&'static str> {
    match kind {
        ItemKind::Epic => None,
        ItemKind::Story => Some("epic_id"),
        ItemKind::Task => Some("story_id"),
        ItemKind::Subtask => Some("task_id"),
    }
}

/// Every kind selects the same column layout; columns a kind lacks are NULL.
fn select_from(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Epic => {
            "SELECT id, NULL, title, description, status, priority, NULL, NULL,
                    remote_ref, created_at, started_at, completed_at
             FROM epics"
        }
        ItemKind::Story => {
            "SELECT id, epic_id, title, description, status, priority, NULL, NULL,
                    remote_ref, created_at, started_at, completed_at
             FROM stories"
        }
        ItemKind::Task => {
            "SELECT id, story_id, title, description, status, priority, estimated_hours, actual_hours,
                    remote_ref, created_at, started_at, completed_at
             FROM tasks"
        }
        ItemKind::Subtask => {
            "SELECT id, task_id, title, NULL, status, NULL, NULL, NULL,
                    remote_ref, created_at, NULL, completed_at
             FROM subtasks"
        }
    }
}

/// A row as stored, before keys and enums are validated.
struct RawItem {
    id: String,
    parent: Option<String>,
    title: String,
    description: Option<String>,
    status: String,
    priority: Option<String>,
    estimated_hours: Option<f64>,
    actual_hours: Option<f64>,
    remote_ref: Option<i64>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

fn read_raw(row: &Row) -> rusqlite::Result<RawItem> {
    Ok(RawItem {
        id: row.get(0)?,
        parent: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        estimated_hours: row.get(6)?,
        actual_hours: row.get(7)?,
        remote_ref: row.get(8)?,
        created_at: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

impl RawItem {
    fn into_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            key: ItemKey::parse(&self.id)?,
            parent: self.parent.as_deref().map(ItemKey::parse).transpose()?,
            title: self.title,
            description: self.description,
            status: self.status.parse::<Status>()?,
            priority: self
                .priority
                .as_deref()
                .map(str::parse::<Priority>)
                .transpose()?,
            estimated_hours: self.estimated_hours,
            actual_hours: self.actual_hours,
            remote_ref: self.remote_ref,
            created_at: parse_datetime(self.created_at),
            started_at: self.started_at.map(parse_datetime),
            completed_at: self.completed_at.map(parse_datetime),
        })
    }
}

/// Translate constraint violations raised by the insert itself.
fn constraint_error(e: rusqlite::Error, id: &str, parent: Option<&str>) -> TrackerError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        match err.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => return TrackerError::DuplicateKey(id.to_string()),
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return TrackerError::ParentNotFound {
                    key: id.to_string(),
                    parent: parent.unwrap_or_default().to_string(),
                }
            }
            _ => {}
        }
    }
    TrackerError::Database(e)
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
