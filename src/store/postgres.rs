//! PostgreSQL content store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Schema
//!
//! Nodes, bodies and major versions live in one table each. Edges are kept in
//! `argument_links` with a `position` column so supporting children keep the
//! order the author gave them. See [`SCHEMA`].

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use uuid::Uuid;

use crate::types::{
    ArgumentBody, ArgumentNode, AuthorId, BodyFields, BodyId, EdgeType, MajorVersion,
    MajorVersionId, NodeId, NodeKind, NodeLinks, StableId,
};
use super::{ChangeSet, CommitOutcome, ContentStore};

/// DDL for the tables this store reads and writes.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS major_versions (
    id UUID PRIMARY KEY,
    version_number INTEGER NOT NULL,
    author UUID NOT NULL,
    latest_minor INTEGER NOT NULL,
    edge_owners TEXT NOT NULL DEFAULT '{}',
    revision BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS argument_bodies (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    qualifier TEXT NOT NULL,
    text TEXT NOT NULL,
    url TEXT,
    author UUID NOT NULL,
    major_version UUID NOT NULL REFERENCES major_versions(id),
    minor_version INTEGER NOT NULL,
    is_public BOOLEAN NOT NULL,
    is_editable BOOLEAN NOT NULL,
    date_created TIMESTAMPTZ NOT NULL,
    date_edited TIMESTAMPTZ NOT NULL,
    preceded_by UUID,
    revision BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS argument_nodes (
    id UUID PRIMARY KEY,
    stable_id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    body_id UUID NOT NULL REFERENCES argument_bodies(id),
    previous_version UUID,
    finalized BOOLEAN NOT NULL,
    revision BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS argument_links (
    parent UUID NOT NULL,
    child UUID NOT NULL,
    position INTEGER NOT NULL,
    edge_type TEXT NOT NULL,
    PRIMARY KEY (parent, position)
);
CREATE INDEX IF NOT EXISTS argument_links_child ON argument_links (child);
"#;

const NODE_COLUMNS: &str = "id, stable_id, kind, body_id, previous_version, finalized, revision";

const BODY_COLUMNS: &str = "id, title, qualifier, text, url, author, major_version, minor_version, \
     is_public, is_editable, date_created, date_edited, preceded_by, revision";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/arguments".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored column does not decode into a kernel value.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    /// Edge-owner provenance failed to (de)serialize.
    #[error("Edge owners encoding failed: {0}")]
    EdgeOwners(#[from] serde_json::Error),
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// PostgreSQL content store.
///
/// Uses connection pooling with production-tuned settings. Commits run in a
/// single transaction with revision-guarded writes.
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Create the tables if they do not exist.
    pub async fn apply_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    /// Load node rows plus their ordered links.
    async fn nodes_from_rows(&self, rows: Vec<PgRow>) -> Result<Vec<ArgumentNode>, PostgresError> {
        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()?;

        let link_rows = sqlx::query(
            r#"
            SELECT parent, child
            FROM argument_links
            WHERE parent = ANY($1)
            ORDER BY parent, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut children: BTreeMap<Uuid, Vec<NodeId>> = BTreeMap::new();
        for row in &link_rows {
            let parent: Uuid = row.try_get("parent")?;
            let child: Uuid = row.try_get("child")?;
            children.entry(parent).or_default().push(NodeId::new(child));
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let node_children = children.remove(&id).unwrap_or_default();
                Self::parse_node_row(row, &node_children)
            })
            .collect()
    }

    /// Parse a node from a database row and its ordered children.
    fn parse_node_row(row: &PgRow, children: &[NodeId]) -> Result<ArgumentNode, PostgresError> {
        let id: Uuid = row.try_get("id")?;
        let stable_id: String = row.try_get("stable_id")?;
        let kind_str: String = row.try_get("kind")?;
        let body_id: Uuid = row.try_get("body_id")?;
        let previous_version: Option<Uuid> = row.try_get("previous_version")?;
        let finalized: bool = row.try_get("finalized")?;
        let revision: i64 = row.try_get("revision")?;

        let kind = NodeKind::from_str(&kind_str)
            .ok_or_else(|| PostgresError::CorruptRow(format!("node {id} has kind {kind_str:?}")))?;

        Ok(ArgumentNode {
            id: NodeId::new(id),
            stable_id: StableId::new(stable_id),
            links: NodeLinks::from_children(kind, children),
            body_id: BodyId::new(body_id),
            previous_version: previous_version.map(NodeId::new),
            finalized,
            revision: revision as u64,
        })
    }

    /// Parse a body from a database row.
    fn parse_body_row(row: &PgRow) -> Result<ArgumentBody, PostgresError> {
        let revision: i64 = row.try_get("revision")?;
        let preceded_by: Option<Uuid> = row.try_get("preceded_by")?;
        Ok(ArgumentBody {
            id: BodyId::new(row.try_get("id")?),
            fields: BodyFields {
                title: row.try_get("title")?,
                qualifier: row.try_get("qualifier")?,
                text: row.try_get("text")?,
                url: row.try_get("url")?,
            },
            author: AuthorId::new(row.try_get("author")?),
            major_version: MajorVersionId::new(row.try_get("major_version")?),
            minor_version: row.try_get("minor_version")?,
            is_public: row.try_get("is_public")?,
            is_editable: row.try_get("is_editable")?,
            date_created: row.try_get("date_created")?,
            date_edited: row.try_get("date_edited")?,
            preceded_by: preceded_by.map(BodyId::new),
            revision: revision as u64,
        })
    }

    /// Parse a major version from a database row.
    fn parse_major_row(row: &PgRow) -> Result<MajorVersion, PostgresError> {
        let version_number: i32 = row.try_get("version_number")?;
        let edge_owners: String = row.try_get("edge_owners")?;
        let revision: i64 = row.try_get("revision")?;
        Ok(MajorVersion {
            id: MajorVersionId::new(row.try_get("id")?),
            version_number: version_number.max(0) as u32,
            author: AuthorId::new(row.try_get("author")?),
            latest_minor: row.try_get("latest_minor")?,
            edge_owners: serde_json::from_str(&edge_owners)?,
            revision: revision as u64,
        })
    }

    async fn node_ids(&self, sql: &str, bind: Uuid) -> Result<Vec<NodeId>, PostgresError> {
        let rows = sqlx::query(sql).bind(bind).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok(NodeId::new(row.try_get("id")?)))
            .collect()
    }

    async fn write_major(tx: &mut Transaction<'_, Postgres>, major: &MajorVersion) -> Result<bool, PostgresError> {
        let edge_owners = serde_json::to_string(&major.edge_owners)?;
        let result = if major.revision == 0 {
            sqlx::query(
                r#"
                INSERT INTO major_versions (id, version_number, author, latest_minor, edge_owners, revision)
                VALUES ($1, $2, $3, $4, $5, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(major.id.as_uuid())
            .bind(major.version_number as i32)
            .bind(major.author.as_uuid())
            .bind(major.latest_minor)
            .bind(edge_owners)
            .execute(&mut **tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE major_versions
                SET version_number = $2, author = $3, latest_minor = $4, edge_owners = $5,
                    revision = revision + 1
                WHERE id = $1 AND revision = $6
                "#,
            )
            .bind(major.id.as_uuid())
            .bind(major.version_number as i32)
            .bind(major.author.as_uuid())
            .bind(major.latest_minor)
            .bind(edge_owners)
            .bind(major.revision as i64)
            .execute(&mut **tx)
            .await?
        };
        Ok(result.rows_affected() == 1)
    }

    async fn write_body(tx: &mut Transaction<'_, Postgres>, body: &ArgumentBody) -> Result<bool, PostgresError> {
        let sql = if body.revision == 0 {
            r#"
            INSERT INTO argument_bodies (id, title, qualifier, text, url, author, major_version,
                minor_version, is_public, is_editable, date_created, date_edited, preceded_by, revision)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
            ON CONFLICT (id) DO NOTHING
            "#
        } else {
            r#"
            UPDATE argument_bodies
            SET title = $2, qualifier = $3, text = $4, url = $5, author = $6, major_version = $7,
                minor_version = $8, is_public = $9, is_editable = $10, date_created = $11,
                date_edited = $12, preceded_by = $13, revision = revision + 1
            WHERE id = $1 AND revision = $14
            "#
        };
        let mut query = sqlx::query(sql)
            .bind(body.id.as_uuid())
            .bind(&body.fields.title)
            .bind(&body.fields.qualifier)
            .bind(&body.fields.text)
            .bind(&body.fields.url)
            .bind(body.author.as_uuid())
            .bind(body.major_version.as_uuid())
            .bind(body.minor_version)
            .bind(body.is_public)
            .bind(body.is_editable)
            .bind(body.date_created)
            .bind(body.date_edited)
            .bind(body.preceded_by.map(|id| id.as_uuid()));
        if body.revision != 0 {
            query = query.bind(body.revision as i64);
        }
        Ok(query.execute(&mut **tx).await?.rows_affected() == 1)
    }

    async fn write_node(tx: &mut Transaction<'_, Postgres>, node: &ArgumentNode) -> Result<bool, PostgresError> {
        let sql = if node.revision == 0 {
            r#"
            INSERT INTO argument_nodes (id, stable_id, kind, body_id, previous_version, finalized, revision)
            VALUES ($1, $2, $3, $4, $5, $6, 1)
            ON CONFLICT (id) DO NOTHING
            "#
        } else {
            r#"
            UPDATE argument_nodes
            SET stable_id = $2, kind = $3, body_id = $4, previous_version = $5, finalized = $6,
                revision = revision + 1
            WHERE id = $1 AND revision = $7
            "#
        };
        let mut query = sqlx::query(sql)
            .bind(node.id.as_uuid())
            .bind(node.stable_id.as_str())
            .bind(node.kind().to_string())
            .bind(node.body_id.as_uuid())
            .bind(node.previous_version.map(|id| id.as_uuid()))
            .bind(node.finalized);
        if node.revision != 0 {
            query = query.bind(node.revision as i64);
        }
        if query.execute(&mut **tx).await?.rows_affected() != 1 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM argument_links WHERE parent = $1")
            .bind(node.id.as_uuid())
            .execute(&mut **tx)
            .await?;
        if let Some(edge_type) = EdgeType::for_parent(node.kind()) {
            for (position, child) in node.graph_children().iter().enumerate() {
                sqlx::query(
                    "INSERT INTO argument_links (parent, child, position, edge_type) VALUES ($1, $2, $3, $4)",
                )
                .bind(node.id.as_uuid())
                .bind(child.as_uuid())
                .bind(position as i32)
                .bind(edge_type.to_string())
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(true)
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, changes: &ChangeSet) -> Result<Result<(), String>, PostgresError> {
        for major in &changes.majors {
            if !Self::write_major(tx, major).await? {
                return Ok(Err(format!("major version {} changed concurrently", major.id)));
            }
        }
        for body in &changes.bodies {
            if !Self::write_body(tx, body).await? {
                return Ok(Err(format!("body {} changed concurrently", body.id)));
            }
        }
        let rewritten: BTreeSet<Uuid> = changes
            .nodes
            .iter()
            .map(|node| node.id.as_uuid())
            .chain(changes.deleted_nodes.iter().map(|(id, _)| id.as_uuid()))
            .collect();
        for (id, revision) in &changes.deleted_nodes {
            let deleted = sqlx::query("DELETE FROM argument_nodes WHERE id = $1 AND revision = $2")
                .bind(id.as_uuid())
                .bind(*revision as i64)
                .execute(&mut **tx)
                .await?;
            if deleted.rows_affected() != 1 {
                return Ok(Err(format!("node {id} changed or vanished before delete")));
            }
            // Read after the row delete, so links committed while it waited are seen.
            let parents: Vec<Uuid> = sqlx::query_scalar("SELECT parent FROM argument_links WHERE child = $1")
                .bind(id.as_uuid())
                .fetch_all(&mut **tx)
                .await?;
            if let Some(parent) = parents.iter().find(|parent| !rewritten.contains(*parent)) {
                return Ok(Err(format!("node {parent} linked to {id} before delete")));
            }
            sqlx::query("DELETE FROM argument_links WHERE parent = $1 OR child = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await?;
        }
        for node in &changes.nodes {
            if !Self::write_node(tx, node).await? {
                return Ok(Err(format!("node {} changed concurrently", node.id)));
            }
        }
        // Key-share locks make a concurrent delete of a child wait for this
        // commit, or this commit see the child gone.
        let children: BTreeSet<Uuid> = changes
            .nodes
            .iter()
            .flat_map(|node| node.graph_children())
            .map(|child| child.as_uuid())
            .collect();
        if !children.is_empty() {
            let wanted: Vec<Uuid> = children.iter().copied().collect();
            let live: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM argument_nodes WHERE id = ANY($1) FOR KEY SHARE")
                .bind(&wanted)
                .fetch_all(&mut **tx)
                .await?;
            if let Some(gone) = wanted.iter().find(|child| !live.contains(*child)) {
                return Ok(Err(format!("linked node {gone} is gone")));
            }
        }
        for (id, revision) in &changes.deleted_bodies {
            let deleted = sqlx::query("DELETE FROM argument_bodies WHERE id = $1 AND revision = $2")
                .bind(id.as_uuid())
                .bind(*revision as i64)
                .execute(&mut **tx)
                .await?;
            if deleted.rows_affected() != 1 {
                return Ok(Err(format!("body {id} changed or vanished before delete")));
            }
        }
        Ok(Ok(()))
    }
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    type Error = PostgresError;

    async fn get_node(&self, id: &NodeId) -> Result<Option<ArgumentNode>, Self::Error> {
        Ok(self.get_nodes(std::slice::from_ref(id)).await?.into_iter().next())
    }

    async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<ArgumentNode>, Self::Error> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM argument_nodes WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        self.nodes_from_rows(rows).await
    }

    async fn find_by_stable_id(&self, stable_id: &StableId) -> Result<Option<ArgumentNode>, Self::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM argument_nodes WHERE stable_id = $1"
        ))
        .bind(stable_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(self.nodes_from_rows(rows).await?.into_iter().next())
    }

    async fn get_bodies(&self, ids: &[BodyId]) -> Result<Vec<ArgumentBody>, Self::Error> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {BODY_COLUMNS} FROM argument_bodies WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_body_row).collect()
    }

    async fn get_major_version(&self, id: &MajorVersionId) -> Result<Option<MajorVersion>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, version_number, author, latest_minor, edge_owners, revision
            FROM major_versions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(Self::parse_major_row(r)?)),
            None => Ok(None),
        }
    }

    async fn load_subgraph(&self, root: &NodeId, max_depth: Option<usize>) -> Result<Vec<ArgumentNode>, Self::Error> {
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE reach(id, depth) AS (
                SELECT $1::uuid, 0
                UNION
                SELECT l.child, r.depth + 1
                FROM argument_links l
                JOIN reach r ON l.parent = r.id
                WHERE $2::int IS NULL OR r.depth < $2
            ) CYCLE id SET is_cycle USING path
            SELECT DISTINCT id FROM reach WHERE NOT is_cycle
            "#,
        )
        .bind(root.as_uuid())
        .bind(max_depth.map(|d| d as i32))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<NodeId> = rows
            .iter()
            .map(|row| row.try_get("id").map(NodeId::new))
            .collect::<Result<_, _>>()?;
        self.get_nodes(&ids).await
    }

    async fn get_dependents(&self, id: &NodeId) -> Result<Vec<NodeId>, Self::Error> {
        self.node_ids(
            "SELECT DISTINCT parent AS id FROM argument_links WHERE child = $1 ORDER BY id",
            id.as_uuid(),
        )
        .await
    }

    async fn max_minor_version(&self, major: &MajorVersionId) -> Result<Option<i32>, Self::Error> {
        let row = sqlx::query("SELECT MAX(minor_version) AS max_minor FROM argument_bodies WHERE major_version = $1")
            .bind(major.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("max_minor")?)
    }

    async fn root_nodes(&self) -> Result<Vec<NodeId>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT n.id
            FROM argument_nodes n
            JOIN argument_bodies b ON b.id = n.body_id
            WHERE n.kind = 'assertion' AND b.is_public
            AND NOT EXISTS (
                SELECT 1 FROM argument_links l
                JOIN argument_nodes p ON p.id = l.parent
                WHERE l.child = n.id AND p.kind = 'assertion'
            )
            ORDER BY n.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok(NodeId::new(row.try_get("id")?)))
            .collect()
    }

    async fn draft_nodes(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error> {
        self.node_ids(
            r#"
            SELECT n.id
            FROM argument_nodes n
            JOIN argument_bodies b ON b.id = n.body_id
            WHERE NOT b.is_public AND b.author = $1
            ORDER BY n.id
            "#,
            author.as_uuid(),
        )
        .await
    }

    async fn nodes_by_author(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error> {
        self.node_ids(
            r#"
            SELECT n.id
            FROM argument_nodes n
            JOIN argument_bodies b ON b.id = n.body_id
            JOIN major_versions m ON m.id = b.major_version
            WHERE b.is_public AND m.author = $1
            ORDER BY n.id
            "#,
            author.as_uuid(),
        )
        .await
    }

    async fn nodes_in_major_version(&self, major: &MajorVersionId) -> Result<Vec<NodeId>, Self::Error> {
        self.node_ids(
            r#"
            SELECT n.id
            FROM argument_nodes n
            JOIN argument_bodies b ON b.id = n.body_id
            WHERE b.major_version = $1
            ORDER BY n.id
            "#,
            major.as_uuid(),
        )
        .await
    }

    async fn body_history(&self, body: &BodyId, limit: usize) -> Result<Vec<ArgumentBody>, Self::Error> {
        let rows = sqlx::query(&format!(
            r#"
            WITH RECURSIVE chain(id, step) AS (
                SELECT $1::uuid, 0
                UNION ALL
                SELECT b.preceded_by, c.step + 1
                FROM argument_bodies b
                JOIN chain c ON b.id = c.id
                WHERE b.preceded_by IS NOT NULL AND c.step + 1 < $2
            )
            SELECT {BODY_COLUMNS}
            FROM argument_bodies
            JOIN chain USING (id)
            ORDER BY chain.step
            "#
        ))
        .bind(body.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_body_row).collect()
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        match Self::apply(&mut tx, &changes).await? {
            Ok(()) => {
                tx.commit().await?;
                tracing::debug!(records = changes.len(), "Committed change set");
                Ok(CommitOutcome::Committed { records: changes.len() })
            }
            Err(reason) => {
                tx.rollback().await?;
                tracing::warn!(reason = %reason, "Rejected conflicting commit");
                Ok(CommitOutcome::Conflict { reason })
            }
        }
    }
}
