use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Issue, IssueStatus, Location, NewIssue};
use crate::vote::{transition, VoteDirection, VoteLedger, VoteState};

const SCHEMA_VERSION: i32 = 1;

const ISSUE_COLUMNS: &str = "id, description, category, urgency, latitude, longitude, image_url, status, author, upvotes, downvotes, created_at, updated_at";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    urgency TEXT NOT NULL,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    image_url TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'Submitted',
                    author TEXT NOT NULL,
                    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
                    downvotes INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                -- One row per (issue, voter): a voter can never sit in both sets
                CREATE TABLE IF NOT EXISTS votes (
                    issue_id INTEGER NOT NULL,
                    voter TEXT NOT NULL,
                    direction TEXT NOT NULL CHECK (direction IN ('up', 'down')),
                    PRIMARY KEY (issue_id, voter),
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_issues_author ON issues(author);
                CREATE INDEX IF NOT EXISTS idx_issues_upvotes ON issues(upvotes);
                CREATE INDEX IF NOT EXISTS idx_votes_issue ON votes(issue_id);
                "#,
            )?;

            conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    pub fn create_issue(&self, issue: &NewIssue) -> Result<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO issues (description, category, urgency, latitude, longitude, image_url, status, author, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                issue.description,
                issue.category,
                issue.urgency,
                issue.location.lat,
                issue.location.lng,
                issue.image_url,
                IssueStatus::default().as_str(),
                issue.author,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let conn = self.conn()?;
        load_issue(&conn, id)
    }

    /// The feed: most upvoted first, newest first among ties.
    pub fn list_issues(&self) -> Result<Vec<Issue>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM issues ORDER BY upvotes DESC, id DESC",
            ISSUE_COLUMNS
        );
        query_issues(&conn, &sql, [])
    }

    pub fn list_issues_by_author(&self, author: &str) -> Result<Vec<Issue>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM issues WHERE author = ?1 ORDER BY id DESC",
            ISSUE_COLUMNS
        );
        query_issues(&conn, &sql, [author])
    }

    pub fn update_status(&self, id: i64, status: IssueStatus) -> Result<Option<Issue>> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE issues SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        load_issue(&conn, id)
    }

    /// Applies one vote action atomically. Returns `None` if the issue does not exist.
    pub fn apply_vote(
        &self,
        id: i64,
        voter: &str,
        direction: VoteDirection,
    ) -> Result<Option<Issue>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row("SELECT 1 FROM issues WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let current: Option<String> = tx
            .query_row(
                "SELECT direction FROM votes WHERE issue_id = ?1 AND voter = ?2",
                params![id, voter],
                |row| row.get(0),
            )
            .optional()?;
        let current = VoteState::from_direction(
            current
                .as_deref()
                .map(str::parse::<VoteDirection>)
                .transpose()
                .map_err(|e| anyhow!(e))?,
        );

        let (next, delta) = transition(current, direction);
        match next.direction() {
            Some(dir) => {
                tx.execute(
                    "INSERT INTO votes (issue_id, voter, direction) VALUES (?1, ?2, ?3)
                     ON CONFLICT(issue_id, voter) DO UPDATE SET direction = excluded.direction",
                    params![id, voter, dir.as_str()],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM votes WHERE issue_id = ?1 AND voter = ?2",
                    params![id, voter],
                )?;
            }
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE issues SET upvotes = upvotes + ?1, downvotes = downvotes + ?2, updated_at = ?3 WHERE id = ?4",
            params![delta.upvotes, delta.downvotes, now, id],
        )?;

        let issue = load_issue(&tx, id)?;
        tx.commit()?;

        tracing::debug!(issue_id = id, voter, ?direction, state = ?next, "Applied vote");
        Ok(issue)
    }
}

fn load_issue(conn: &Connection, id: i64) -> Result<Option<Issue>> {
    let sql = format!("SELECT {} FROM issues WHERE id = ?1", ISSUE_COLUMNS);
    let mut issues = query_issues(conn, &sql, [id])?;
    Ok(issues.pop())
}

fn query_issues<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Issue>> {
    let mut stmt = conn.prepare(sql)?;
    let mut issues = stmt
        .query_map(params, issue_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for issue in &mut issues {
        load_voters(conn, issue)?;
    }

    Ok(issues)
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let status: String = row.get(7)?;
    let status = status.parse::<IssueStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Issue {
        id: row.get(0)?,
        description: row.get(1)?,
        category: row.get(2)?,
        urgency: row.get(3)?,
        location: Location {
            lat: row.get(4)?,
            lng: row.get(5)?,
        },
        image_url: row.get(6)?,
        status,
        author: row.get(8)?,
        votes: VoteLedger {
            upvotes: row.get(9)?,
            downvotes: row.get(10)?,
            upvoted_by: BTreeSet::new(),
            downvoted_by: BTreeSet::new(),
        },
        created_at: parse_datetime(row.get::<_, String>(11)?),
        updated_at: parse_datetime(row.get::<_, String>(12)?),
    })
}

fn load_voters(conn: &Connection, issue: &mut Issue) -> Result<()> {
    let mut stmt =
        conn.prepare_cached("SELECT voter, direction FROM votes WHERE issue_id = ?1 ORDER BY voter")?;
    let rows = stmt
        .query_map([issue.id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (voter, direction) in rows {
        match direction.as_str() {
            "up" => issue.votes.upvoted_by.insert(voter),
            "down" => issue.votes.downvoted_by.insert(voter),
            other => return Err(anyhow!("Unknown vote direction '{}' on issue #{}", other, issue.id)),
        };
    }
    Ok(())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
