//! PostgreSQL implementation of the voting stores.
//!
//! Provides a production PostgreSQL backend for the `VotesRepository`,
//! `DocumentsRepository`, and `UsersRepository` traits.
//!
//! ## Key Features
//!
//! - Connection pooling with `sqlx::PgPool`
//! - ACID transactions with automatic rollback
//! - Row-level locking (`SELECT ... FOR UPDATE`) for counter updates
//! - A partial unique index enforcing one active vote per (user, document)
//!
//! ## Database Tables
//!
//! - `votes`: Append-only vote ledger, including cancelled and unvote rows
//! - `documents`: Voteable documents with denormalized score counters
//! - `users`: User records with karma and notification settings
//! - `user_rate_limits`: Per-user voting rate-limit overrides
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;
use voting_shared::types::{
    Collection, CoauthorStatus, DocumentId, ExtendedVote, KarmaChangeSettings, UserId,
    UserRateLimit, UserRecord, Vote, VoteId, VoteKind, VoteableDocument,
};

use crate::errors::RepositoryError;
use crate::interfaces::{
    CastOutcome, DocumentDeltas, DocumentsRepository, UsersRepository, VotesRepository,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/postgres/migrations");

fn kind_code(kind: VoteKind) -> i16 {
    match kind {
        VoteKind::SmallUpvote => 0,
        VoteKind::SmallDownvote => 1,
        VoteKind::BigUpvote => 2,
        VoteKind::BigDownvote => 3,
        VoteKind::Neutral => 4,
    }
}

fn kind_from_code(code: i16) -> Result<VoteKind, RepositoryError> {
    match code {
        0 => Ok(VoteKind::SmallUpvote),
        1 => Ok(VoteKind::SmallDownvote),
        2 => Ok(VoteKind::BigUpvote),
        3 => Ok(VoteKind::BigDownvote),
        4 => Ok(VoteKind::Neutral),
        other => Err(RepositoryError::InvalidVoteKind(other)),
    }
}

fn collection_code(collection: Collection) -> i16 {
    match collection {
        Collection::Posts => 0,
        Collection::Comments => 1,
        Collection::TagRevisions => 2,
    }
}

fn collection_from_code(code: i16) -> Result<Collection, RepositoryError> {
    match code {
        0 => Ok(Collection::Posts),
        1 => Ok(Collection::Comments),
        2 => Ok(Collection::TagRevisions),
        other => Err(RepositoryError::InvalidCollection(other)),
    }
}

fn vote_from_row(row: &PgRow) -> Result<Vote, RepositoryError> {
    let extended_vote: Option<Json<ExtendedVote>> = row.try_get("extended_vote")?;
    let extended_power: Json<BTreeMap<String, i64>> = row.try_get("extended_power")?;
    Ok(Vote {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        collection: collection_from_code(row.try_get("collection")?)?,
        user_id: row.try_get("user_id")?,
        kind: kind_from_code(row.try_get("kind")?)?,
        extended_vote: extended_vote.map(|json| json.0),
        power: row.try_get("power")?,
        extended_power: extended_power.0,
        author_ids: row.try_get("author_ids")?,
        cancelled: row.try_get("cancelled")?,
        is_unvote: row.try_get("is_unvote")?,
        voted_at: row.try_get("voted_at")?,
        silence_notification: row.try_get("silence_notification")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<VoteableDocument, RepositoryError> {
    let coauthor_statuses: Json<Vec<CoauthorStatus>> = row.try_get("coauthor_statuses")?;
    let extended_score: Json<BTreeMap<String, i64>> = row.try_get("extended_score")?;
    Ok(VoteableDocument {
        id: row.try_get("id")?,
        collection: collection_from_code(row.try_get("collection")?)?,
        user_id: row.try_get("user_id")?,
        coauthor_statuses: coauthor_statuses.0,
        base_score: row.try_get("base_score")?,
        score: row.try_get("score")?,
        vote_count: row.try_get("vote_count")?,
        extended_score: extended_score.0,
        inactive: row.try_get("inactive")?,
        posted_at: row.try_get("posted_at")?,
        frontpage_date: row.try_get("frontpage_date")?,
        curated_date: row.try_get("curated_date")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        post_id: row.try_get("post_id")?,
        post_title: row.try_get("post_title")?,
        post_slug: row.try_get("post_slug")?,
        body: row.try_get("body")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, RepositoryError> {
    let settings: Json<KarmaChangeSettings> = row.try_get("karma_change_settings")?;
    Ok(UserRecord {
        id: row.try_get("id")?,
        karma: row.try_get("karma")?,
        is_admin: row.try_get("is_admin")?,
        karma_change_settings: settings.0,
        karma_changes_last_opened: row.try_get("karma_changes_last_opened")?,
    })
}

/// PostgreSQL implementation of the vote ledger, document store, and user
/// store.
///
/// All multi-row mutations run in a transaction. The `votes` table carries a
/// partial unique index on (user_id, document_id, collection) over
/// non-cancelled rows, so replace semantics hold even under concurrent casts
/// racing past the initial `SELECT ... FOR UPDATE`.
pub struct PostgresStore {
    pool: sqlx::PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` and creates a store.
    ///
    /// # Arguments
    ///
    /// * `url` - PostgreSQL connection string.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let pool = sqlx::PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Applies any pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a single vote row within an active transaction.
    async fn insert_vote_tx(
        &self,
        vote: &Vote,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO votes (
                id, document_id, collection, user_id, kind, extended_vote,
                power, extended_power, author_ids, cancelled, is_unvote,
                voted_at, silence_notification
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(vote.id)
        .bind(vote.document_id)
        .bind(collection_code(vote.collection))
        .bind(vote.user_id)
        .bind(kind_code(vote.kind))
        .bind(vote.extended_vote.as_ref().map(Json))
        .bind(vote.power)
        .bind(Json(&vote.extended_power))
        .bind(&vote.author_ids)
        .bind(vote.cancelled)
        .bind(vote.is_unvote)
        .bind(vote.voted_at)
        .bind(vote.silence_notification)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Cancels the user's active votes on a document within an active
    /// transaction, appending one unvote audit row per cancellation.
    /// Returns the cancelled votes as they were before cancellation.
    async fn cancel_active_votes_tx(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
        at: DateTime<Utc>,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<Vec<Vote>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM votes
            WHERE NOT cancelled
              AND document_id = $1 AND collection = $2 AND user_id = $3
            FOR UPDATE
            "#,
        )
        .bind(document_id)
        .bind(collection_code(collection))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        let mut cancelled = Vec::with_capacity(rows.len());
        for row in &rows {
            cancelled.push(vote_from_row(row)?);
        }
        if cancelled.is_empty() {
            return Ok(cancelled);
        }

        let ids: Vec<VoteId> = cancelled.iter().map(|v| v.id).collect();
        sqlx::query("UPDATE votes SET cancelled = TRUE WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut **tx)
            .await?;

        for old in &cancelled {
            let unvote = Vote {
                id: Uuid::new_v4(),
                power: -old.power,
                extended_power: old
                    .extended_power
                    .iter()
                    .map(|(axis, value)| (axis.clone(), -value))
                    .collect(),
                cancelled: true,
                is_unvote: true,
                voted_at: at,
                ..old.clone()
            };
            self.insert_vote_tx(&unvote, tx).await?;
        }

        Ok(cancelled)
    }
}

#[async_trait]
impl VotesRepository for PostgresStore {
    /// Cancels any existing active vote and inserts the new one in a single
    /// transaction. The partial unique index on active votes turns a lost
    /// race into a constraint violation instead of a duplicate.
    async fn cast_vote(&self, vote: Vote) -> Result<CastOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = self
            .cancel_active_votes_tx(
                vote.document_id,
                vote.collection,
                vote.user_id,
                vote.voted_at,
                &mut tx,
            )
            .await?;
        self.insert_vote_tx(&vote, &mut tx).await?;
        tx.commit().await?;
        Ok(CastOutcome { vote, cancelled })
    }

    async fn cancel_active_votes(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = self
            .cancel_active_votes_tx(document_id, collection, user_id, at, &mut tx)
            .await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn cancel_vote(&self, vote_id: VoteId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE votes SET cancelled = TRUE WHERE id = $1")
            .bind(vote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_active_vote(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
    ) -> Result<Option<Vote>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM votes
            WHERE NOT cancelled
              AND document_id = $1 AND collection = $2 AND user_id = $3
            "#,
        )
        .bind(document_id)
        .bind(collection_code(collection))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(vote_from_row).transpose()
    }

    async fn count_recent_votes(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM votes
            WHERE user_id = $1
              AND NOT cancelled AND NOT is_unvote
              AND voted_at > $2
              AND NOT (author_ids @> ARRAY[$1]::uuid[])
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn votes_on_authored_content(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM votes
            WHERE NOT cancelled
              AND user_id <> $1
              AND author_ids @> ARRAY[$1]::uuid[]
              AND voted_at >= $2 AND voted_at < $3
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(vote_from_row).collect()
    }
}

#[async_trait]
impl DocumentsRepository for PostgresStore {
    async fn get(
        &self,
        collection: Collection,
        document_id: DocumentId,
    ) -> Result<Option<VoteableDocument>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection_code(collection))
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn upsert(&self, document: VoteableDocument) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, collection, user_id, coauthor_statuses, base_score, score,
                vote_count, extended_score, inactive, posted_at,
                frontpage_date, curated_date, title, slug, post_id,
                post_title, post_slug, body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (collection, id)
            DO UPDATE SET
                user_id = EXCLUDED.user_id,
                coauthor_statuses = EXCLUDED.coauthor_statuses,
                base_score = EXCLUDED.base_score,
                score = EXCLUDED.score,
                vote_count = EXCLUDED.vote_count,
                extended_score = EXCLUDED.extended_score,
                inactive = EXCLUDED.inactive,
                posted_at = EXCLUDED.posted_at,
                frontpage_date = EXCLUDED.frontpage_date,
                curated_date = EXCLUDED.curated_date,
                title = EXCLUDED.title,
                slug = EXCLUDED.slug,
                post_id = EXCLUDED.post_id,
                post_title = EXCLUDED.post_title,
                post_slug = EXCLUDED.post_slug,
                body = EXCLUDED.body
            "#,
        )
        .bind(document.id)
        .bind(collection_code(document.collection))
        .bind(document.user_id)
        .bind(Json(&document.coauthor_statuses))
        .bind(document.base_score)
        .bind(document.score)
        .bind(document.vote_count)
        .bind(Json(&document.extended_score))
        .bind(document.inactive)
        .bind(document.posted_at)
        .bind(document.frontpage_date)
        .bind(document.curated_date)
        .bind(&document.title)
        .bind(&document.slug)
        .bind(document.post_id)
        .bind(&document.post_title)
        .bind(&document.post_slug)
        .bind(&document.body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Applies the deltas under a row lock so concurrent casts by different
    /// users never lose a counter update.
    async fn apply_deltas(
        &self,
        collection: Collection,
        document_id: DocumentId,
        deltas: &DocumentDeltas,
    ) -> Result<VoteableDocument, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT * FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection_code(collection))
        .bind(document_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut document = match row {
            Some(row) => document_from_row(&row)?,
            None => return Err(RepositoryError::DocumentNotFound(document_id, collection)),
        };

        document.base_score += deltas.base_score;
        document.vote_count += deltas.vote_count;
        for (axis, delta) in &deltas.extended_score {
            *document.extended_score.entry(axis.clone()).or_insert(0) += delta;
        }
        if deltas.reactivate {
            document.inactive = false;
        }

        sqlx::query(
            r#"
            UPDATE documents
            SET base_score = $3, vote_count = $4, extended_score = $5, inactive = $6
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection_code(collection))
        .bind(document_id)
        .bind(document.base_score)
        .bind(document.vote_count)
        .bind(Json(&document.extended_score))
        .bind(document.inactive)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(document)
    }

    async fn set_score(
        &self,
        collection: Collection,
        document_id: DocumentId,
        score: f64,
        inactive: Option<bool>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET score = $3, inactive = COALESCE($4, inactive)
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection_code(collection))
        .bind(document_id)
        .bind(score)
        .bind(inactive)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::DocumentNotFound(document_id, collection));
        }
        Ok(())
    }

    async fn active_documents(
        &self,
        collection: Collection,
    ) -> Result<Vec<VoteableDocument>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM documents WHERE collection = $1 AND NOT inactive")
            .bind(collection_code(collection))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }
}

#[async_trait]
impl UsersRepository for PostgresStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert(&self, user: UserRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, karma, is_admin, karma_change_settings, karma_changes_last_opened)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET
                karma = EXCLUDED.karma,
                is_admin = EXCLUDED.is_admin,
                karma_change_settings = EXCLUDED.karma_change_settings,
                karma_changes_last_opened = EXCLUDED.karma_changes_last_opened
            "#,
        )
        .bind(user.id)
        .bind(user.karma)
        .bind(user.is_admin)
        .bind(Json(&user.karma_change_settings))
        .bind(user.karma_changes_last_opened)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_karma(
        &self,
        user_ids: &[UserId],
        delta: i64,
    ) -> Result<(), RepositoryError> {
        if user_ids.is_empty() || delta == 0 {
            return Ok(());
        }
        sqlx::query("UPDATE users SET karma = karma + $2 WHERE id = ANY($1)")
            .bind(user_ids)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rate_limit_override(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRateLimit>, RepositoryError> {
        let row: Option<Json<UserRateLimit>> =
            sqlx::query_scalar("SELECT rate_limit FROM user_rate_limits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|json| json.0).filter(|limit| limit.is_active(now)))
    }

    async fn set_rate_limit_override(
        &self,
        user_id: UserId,
        limit: Option<UserRateLimit>,
    ) -> Result<(), RepositoryError> {
        match limit {
            Some(limit) => {
                sqlx::query(
                    r#"
                    INSERT INTO user_rate_limits (user_id, rate_limit)
                    VALUES ($1, $2)
                    ON CONFLICT (user_id)
                    DO UPDATE SET rate_limit = EXCLUDED.rate_limit
                    "#,
                )
                .bind(user_id)
                .bind(Json(&limit))
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM user_rate_limits WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}
