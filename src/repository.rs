use crate::models::{
    AddSignatoryRequest, AdminDashboardStats, Announcement, AnnouncementPage, Approval,
    ApprovalTally, ApprovalView, CreateAnnouncementRequest, Decision, LifecycleState, Role,
    SignerDisplay, Signatory, UpdateAnnouncementRequest, User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. This is the core
/// of the Repository Abstraction pattern, allowing the engines and handlers to
/// interact with the data layer without knowing the specific implementation
/// (Postgres, in-memory, etc.).
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) safely shareable across Axum's asynchronous task
/// boundaries.
///
/// Version-guarded writes (`expected_version`) return `Ok(None)` when the guard
/// misses, i.e. a concurrent writer got there first. Retry policy belongs to the
/// calling engine, not here.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;
    // Mirrors the external provider's record; repeat sightings refresh the email.
    async fn create_user(&self, user: User) -> Result<User, sqlx::Error>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<bool, sqlx::Error>;

    // --- Signatory Registry ---
    async fn find_active_signatory(&self, user_id: Uuid) -> Result<Option<Signatory>, sqlx::Error>;
    // True when ANY record exists for the principal, active or not.
    async fn signatory_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn create_signatory(&self, req: AddSignatoryRequest) -> Result<Signatory, sqlx::Error>;
    // Flips the active record off; returns false when none was active.
    async fn deactivate_signatory(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn list_active_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error>;
    // Admin view: the full registry, deactivated history included.
    async fn list_all_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error>;

    // --- Announcement Retrieval ---
    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, sqlx::Error>;
    // Public detail: only rows in the `published` state.
    async fn get_published_announcement(&self, id: Uuid)
    -> Result<Option<Announcement>, sqlx::Error>;
    // Public feed with filtering. Must enforce state = 'published'.
    async fn list_published(
        &self,
        category: Option<String>,
        session: Option<String>,
        search: Option<String>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error>;
    // Admin access: every state, optionally narrowed to one.
    async fn list_all_announcements(
        &self,
        state: Option<LifecycleState>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error>;
    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Announcement>, sqlx::Error>;
    // The signatory worklist.
    async fn list_pending(&self) -> Result<Vec<Announcement>, sqlx::Error>;

    // --- Announcement Writes ---
    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author_id: Uuid,
    ) -> Result<Announcement, sqlx::Error>;
    // Draft-only partial update, version guarded.
    async fn update_announcement_content(
        &self,
        id: Uuid,
        expected_version: i32,
        req: UpdateAnnouncementRequest,
    ) -> Result<Option<Announcement>, sqlx::Error>;
    // Atomically moves draft -> pending_approval and freezes the eligible set and
    // quorum for the life of the announcement.
    async fn submit_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        eligible: &[Uuid],
        quorum: i32,
    ) -> Result<Option<Announcement>, sqlx::Error>;
    // Generic guarded transition used for the quorum outcomes.
    async fn transition_state(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<Announcement>, sqlx::Error>;
    // approved -> published, stamping published_at.
    async fn publish_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
    ) -> Result<Option<Announcement>, sqlx::Error>;
    // Guarded move into `retracted` from the observed state, recording the
    // reason. Open to every non-terminal state; the engine decides which.
    async fn retract_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        reason: String,
    ) -> Result<Option<Announcement>, sqlx::Error>;

    // --- Approval Ledger ---
    // True when the user is in the announcement's frozen eligible set.
    async fn is_eligible(&self, announcement_id: Uuid, user_id: Uuid)
    -> Result<bool, sqlx::Error>;
    // Last write wins: a repeat decision by the same signatory replaces the row.
    async fn upsert_approval(
        &self,
        announcement_id: Uuid,
        signatory_user_id: Uuid,
        decision: Decision,
    ) -> Result<Approval, sqlx::Error>;
    async fn count_decisions(&self, announcement_id: Uuid) -> Result<ApprovalTally, sqlx::Error>;
    async fn list_approvals(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<ApprovalView>, sqlx::Error>;
    // Display names of everyone whose current decision is `approve`.
    async fn approvers_display(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<SignerDisplay>, sqlx::Error>;

    // --- Admin ---
    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ANNOUNCEMENT_COLUMNS: &str = r#"
    id, author_id, title, body, category, session,
    attachment_key, state, quorum, eligible_count, version,
    published_at, retraction_reason, created_at, updated_at
"#;

const SIGNATORY_COLUMNS: &str =
    "id, user_id, name, title, contact, active, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// create_user
    ///
    /// Creates the mirroring profile record in `public.profiles` after external
    /// auth success. Upserts so a repeat sighting refreshes the email without
    /// touching the locally managed role.
    async fn create_user(&self, user: User) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO profiles (id, email, role) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, role
            "#,
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("UPDATE profiles SET role = $1 WHERE id = $2")
            .bind(role)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- SIGNATORY REGISTRY ---

    async fn find_active_signatory(&self, user_id: Uuid) -> Result<Option<Signatory>, sqlx::Error> {
        sqlx::query_as::<_, Signatory>(&format!(
            "SELECT {SIGNATORY_COLUMNS} FROM signatories WHERE user_id = $1 AND active = true"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn signatory_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM signatories WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// create_signatory
    ///
    /// Inserts a fresh active record. Uniqueness of the *active* record per
    /// principal is also enforced by a partial unique index, so a racing
    /// duplicate registration surfaces as a database error rather than a second
    /// active row.
    async fn create_signatory(&self, req: AddSignatoryRequest) -> Result<Signatory, sqlx::Error> {
        let new_id = Uuid::new_v4();
        sqlx::query_as::<_, Signatory>(&format!(
            r#"
            INSERT INTO signatories (id, user_id, name, title, contact, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, true, NOW(), NOW())
            RETURNING {SIGNATORY_COLUMNS}
            "#
        ))
        .bind(new_id)
        .bind(req.user_id)
        .bind(req.name)
        .bind(req.title)
        .bind(req.contact)
        .fetch_one(&self.pool)
        .await
    }

    async fn deactivate_signatory(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE signatories SET active = false, updated_at = NOW() WHERE user_id = $1 AND active = true",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_active_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error> {
        sqlx::query_as::<_, Signatory>(&format!(
            "SELECT {SIGNATORY_COLUMNS} FROM signatories WHERE active = true ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn list_all_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error> {
        sqlx::query_as::<_, Signatory>(&format!(
            "SELECT {SIGNATORY_COLUMNS} FROM signatories ORDER BY active DESC, created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    // --- ANNOUNCEMENT RETRIEVAL ---

    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_published_announcement(
        &self,
        id: Uuid,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE id = $1 AND state = 'published'"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// list_published
    ///
    /// Implements flexible search/filtering using QueryBuilder for safe
    /// parameterization. **Security**: strictly enforces `state = 'published'`
    /// in the base query; drafts and pending items never leak into the feed.
    async fn list_published(
        &self,
        category: Option<String>,
        session: Option<String>,
        search: Option<String>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error> {
        let push_filters = |builder: &mut QueryBuilder<sqlx::Postgres>| {
            if let Some(c) = &category {
                builder.push(" AND category = ");
                builder.push_bind(c.clone());
            }
            if let Some(s) = &session {
                builder.push(" AND session = ");
                builder.push_bind(s.clone());
            }
            if let Some(q) = &search {
                // Case-insensitive substring match on the title only.
                builder.push(" AND title ILIKE ");
                builder.push_bind(format!("%{}%", q));
            }
        };

        let mut count_builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM announcements WHERE state = 'published'");
        push_filters(&mut count_builder);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE state = 'published'"
        ));
        push_filters(&mut builder);
        builder.push(" ORDER BY published_at DESC");
        builder.push(" LIMIT ");
        builder.push_bind(page_size);
        builder.push(" OFFSET ");
        builder.push_bind((page - 1) * page_size);

        let items = builder
            .build_query_as::<Announcement>()
            .fetch_all(&self.pool)
            .await?;

        Ok(AnnouncementPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_all_announcements(
        &self,
        state: Option<LifecycleState>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error> {
        let mut count_builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM announcements WHERE true");
        if let Some(s) = state {
            count_builder.push(" AND state = ");
            count_builder.push_bind(s);
        }
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE true"
        ));
        if let Some(s) = state {
            builder.push(" AND state = ");
            builder.push_bind(s);
        }
        builder.push(" ORDER BY created_at DESC");
        builder.push(" LIMIT ");
        builder.push_bind(page_size);
        builder.push(" OFFSET ");
        builder.push_bind((page - 1) * page_size);

        let items = builder
            .build_query_as::<Announcement>()
            .fetch_all(&self.pool)
            .await?;

        Ok(AnnouncementPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE author_id = $1 ORDER BY created_at DESC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_pending(&self) -> Result<Vec<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE state = 'pending_approval' ORDER BY updated_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    // --- ANNOUNCEMENT WRITES ---

    /// create_announcement
    ///
    /// Inserts a new draft. Quorum and eligible count stay at zero until submit
    /// snapshots them; version starts at 1.
    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author_id: Uuid,
    ) -> Result<Announcement, sqlx::Error> {
        let new_id = Uuid::new_v4();
        sqlx::query_as::<_, Announcement>(&format!(
            r#"
            INSERT INTO announcements
                (id, author_id, title, body, category, session, attachment_key,
                 state, quorum, eligible_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft', 0, 0, 1, NOW(), NOW())
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(new_id)
        .bind(author_id)
        .bind(req.title)
        .bind(req.body)
        .bind(req.category)
        .bind(req.session)
        .bind(req.attachment_key)
        .fetch_one(&self.pool)
        .await
    }

    /// update_announcement_content
    ///
    /// Uses the PostgreSQL `COALESCE` function to handle `Option<T>` fields,
    /// only updating a column when the corresponding field in `req` is `Some`.
    /// Guarded by both the version and the draft state.
    async fn update_announcement_content(
        &self,
        id: Uuid,
        expected_version: i32,
        req: UpdateAnnouncementRequest,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            r#"
            UPDATE announcements
            SET title = COALESCE($3, title),
                body = COALESCE($4, body),
                category = COALESCE($5, category),
                session = COALESCE($6, session),
                attachment_key = COALESCE($7, attachment_key),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND state = 'draft'
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(req.title)
        .bind(req.body)
        .bind(req.category)
        .bind(req.session)
        .bind(req.attachment_key)
        .fetch_optional(&self.pool)
        .await
    }

    /// submit_announcement
    ///
    /// One transaction: the guarded draft -> pending_approval flip plus the
    /// snapshot rows in `announcement_signatories`. If the guard misses nothing
    /// is written at all.
    async fn submit_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        eligible: &[Uuid],
        quorum: i32,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Announcement>(&format!(
            r#"
            UPDATE announcements
            SET state = 'pending_approval',
                quorum = $3,
                eligible_count = $4,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND state = 'draft'
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(quorum)
        .bind(eligible.len() as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(announcement) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        for user_id in eligible {
            sqlx::query(
                "INSERT INTO announcement_signatories (announcement_id, signatory_user_id) VALUES ($1, $2)",
            )
            .bind(id)
            .bind(*user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(announcement))
    }

    async fn transition_state(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            r#"
            UPDATE announcements
            SET state = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND state = $3
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await
    }

    async fn publish_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            r#"
            UPDATE announcements
            SET state = 'published', published_at = NOW(), version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND state = 'approved'
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
    }

    async fn retract_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        reason: String,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        sqlx::query_as::<_, Announcement>(&format!(
            r#"
            UPDATE announcements
            SET state = 'retracted', retraction_reason = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND state = $3
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(from)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    // --- APPROVAL LEDGER ---

    async fn is_eligible(
        &self,
        announcement_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM announcement_signatories
                WHERE announcement_id = $1 AND signatory_user_id = $2
            )
            "#,
        )
        .bind(announcement_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// upsert_approval
    ///
    /// The composite primary key makes the last-write-wins rule a single
    /// statement: a repeat decision replaces the row and refreshes the
    /// timestamp, so the ledger never holds two rows for one signatory.
    async fn upsert_approval(
        &self,
        announcement_id: Uuid,
        signatory_user_id: Uuid,
        decision: Decision,
    ) -> Result<Approval, sqlx::Error> {
        sqlx::query_as::<_, Approval>(
            r#"
            INSERT INTO approvals (announcement_id, signatory_user_id, decision, decided_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (announcement_id, signatory_user_id)
            DO UPDATE SET decision = EXCLUDED.decision, decided_at = NOW()
            RETURNING announcement_id, signatory_user_id, decision, decided_at
            "#,
        )
        .bind(announcement_id)
        .bind(signatory_user_id)
        .bind(decision)
        .fetch_one(&self.pool)
        .await
    }

    async fn count_decisions(&self, announcement_id: Uuid) -> Result<ApprovalTally, sqlx::Error> {
        sqlx::query_as::<_, ApprovalTally>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE decision = 'approve') AS approve_count,
                COUNT(*) FILTER (WHERE decision = 'reject') AS reject_count
            FROM approvals
            WHERE announcement_id = $1
            "#,
        )
        .bind(announcement_id)
        .fetch_one(&self.pool)
        .await
    }

    /// list_approvals
    ///
    /// Enriches each ledger row with the signatory's display fields. The lateral
    /// join picks the most recent registry record so a deactivated-then-readded
    /// signatory still resolves to a name.
    async fn list_approvals(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<ApprovalView>, sqlx::Error> {
        sqlx::query_as::<_, ApprovalView>(
            r#"
            SELECT a.signatory_user_id, s.name, s.title, a.decision, a.decided_at
            FROM approvals a
            JOIN LATERAL (
                SELECT name, title FROM signatories
                WHERE user_id = a.signatory_user_id
                ORDER BY created_at DESC
                LIMIT 1
            ) s ON true
            WHERE a.announcement_id = $1
            ORDER BY a.decided_at ASC
            "#,
        )
        .bind(announcement_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn approvers_display(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<SignerDisplay>, sqlx::Error> {
        sqlx::query_as::<_, SignerDisplay>(
            r#"
            SELECT s.name, s.title
            FROM approvals a
            JOIN LATERAL (
                SELECT name, title FROM signatories
                WHERE user_id = a.signatory_user_id
                ORDER BY created_at DESC
                LIMIT 1
            ) s ON true
            WHERE a.announcement_id = $1 AND a.decision = 'approve'
            ORDER BY s.name ASC
            "#,
        )
        .bind(announcement_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- ADMIN ---

    /// get_stats
    ///
    /// Compiles all dashboard counters in a single round trip via scalar
    /// subqueries.
    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error> {
        sqlx::query_as::<_, AdminDashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM announcements) AS total_announcements,
                (SELECT COUNT(*) FROM announcements WHERE state = 'draft') AS draft,
                (SELECT COUNT(*) FROM announcements WHERE state = 'pending_approval') AS pending_approval,
                (SELECT COUNT(*) FROM announcements WHERE state = 'approved') AS approved,
                (SELECT COUNT(*) FROM announcements WHERE state = 'published') AS published,
                (SELECT COUNT(*) FROM announcements WHERE state = 'rejected') AS rejected,
                (SELECT COUNT(*) FROM announcements WHERE state = 'retracted') AS retracted,
                (SELECT COUNT(*) FROM signatories WHERE active = true) AS active_signatories,
                (SELECT COUNT(*) FROM signatories) AS total_signatories
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }
}

/// InMemoryRepository
///
/// A full in-process implementation of the `Repository` trait over mutex-guarded
/// maps. The test suites run against it so they exercise the real engines and
/// handlers without a database; semantics (version guards, upserts, snapshot
/// freezing) match the Postgres implementation exactly.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<InMemoryStore>,
}

#[derive(Default)]
struct InMemoryStore {
    users: HashMap<Uuid, User>,
    // Full history; at most one active row per principal.
    signatories: Vec<Signatory>,
    announcements: HashMap<Uuid, Announcement>,
    // Frozen eligible set per submitted announcement.
    eligibility: HashMap<Uuid, Vec<Uuid>>,
    approvals: HashMap<(Uuid, Uuid), Approval>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, InMemoryStore> {
        self.inner.lock().expect("repository lock poisoned")
    }

    fn latest_signatory_display(store: &InMemoryStore, user_id: Uuid) -> (String, String) {
        store
            .signatories
            .iter()
            .filter(|s| s.user_id == user_id)
            .max_by_key(|s| s.created_at)
            .map(|s| (s.name.clone(), s.title.clone()))
            .unwrap_or_default()
    }

    fn tally(store: &InMemoryStore, announcement_id: Uuid) -> ApprovalTally {
        let mut tally = ApprovalTally::default();
        for a in store.approvals.values() {
            if a.announcement_id == announcement_id {
                match a.decision {
                    Decision::Approve => tally.approve_count += 1,
                    Decision::Reject => tally.reject_count += 1,
                }
            }
        }
        tally
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.store().users.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, sqlx::Error> {
        let mut store = self.store();
        let entry = store
            .users
            .entry(user.id)
            .and_modify(|u| u.email = user.email.clone())
            .or_insert(user);
        Ok(entry.clone())
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let mut store = self.store();
        match store.users.get_mut(&id) {
            Some(u) => {
                u.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_active_signatory(&self, user_id: Uuid) -> Result<Option<Signatory>, sqlx::Error> {
        Ok(self
            .store()
            .signatories
            .iter()
            .find(|s| s.user_id == user_id && s.active)
            .cloned())
    }

    async fn signatory_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.store().signatories.iter().any(|s| s.user_id == user_id))
    }

    async fn create_signatory(&self, req: AddSignatoryRequest) -> Result<Signatory, sqlx::Error> {
        let now = Utc::now();
        let signatory = Signatory {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            name: req.name,
            title: req.title,
            contact: req.contact,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.store().signatories.push(signatory.clone());
        Ok(signatory)
    }

    async fn deactivate_signatory(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut store = self.store();
        match store
            .signatories
            .iter_mut()
            .find(|s| s.user_id == user_id && s.active)
        {
            Some(s) => {
                s.active = false;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error> {
        let mut active: Vec<Signatory> = self
            .store()
            .signatories
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    async fn list_all_signatories(&self) -> Result<Vec<Signatory>, sqlx::Error> {
        let mut all = self.store().signatories.clone();
        all.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(all)
    }

    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, sqlx::Error> {
        Ok(self.store().announcements.get(&id).cloned())
    }

    async fn get_published_announcement(
        &self,
        id: Uuid,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        Ok(self
            .store()
            .announcements
            .get(&id)
            .filter(|a| a.state == LifecycleState::Published)
            .cloned())
    }

    async fn list_published(
        &self,
        category: Option<String>,
        session: Option<String>,
        search: Option<String>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error> {
        let store = self.store();
        let needle = search.map(|s| s.to_lowercase());
        let mut matched: Vec<Announcement> = store
            .announcements
            .values()
            .filter(|a| a.state == LifecycleState::Published)
            .filter(|a| category.as_ref().is_none_or(|c| &a.category == c))
            .filter(|a| session.as_ref().is_none_or(|s| &a.session == s))
            .filter(|a| {
                needle
                    .as_ref()
                    .is_none_or(|n| a.title.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        Ok(AnnouncementPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_all_announcements(
        &self,
        state: Option<LifecycleState>,
        page: i64,
        page_size: i64,
    ) -> Result<AnnouncementPage, sqlx::Error> {
        let store = self.store();
        let mut matched: Vec<Announcement> = store
            .announcements
            .values()
            .filter(|a| state.is_none_or(|s| a.state == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        Ok(AnnouncementPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Announcement>, sqlx::Error> {
        let mut own: Vec<Announcement> = self
            .store()
            .announcements
            .values()
            .filter(|a| a.author_id == author_id)
            .cloned()
            .collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(own)
    }

    async fn list_pending(&self) -> Result<Vec<Announcement>, sqlx::Error> {
        let mut pending: Vec<Announcement> = self
            .store()
            .announcements
            .values()
            .filter(|a| a.state == LifecycleState::PendingApproval)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(pending)
    }

    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author_id: Uuid,
    ) -> Result<Announcement, sqlx::Error> {
        let now = Utc::now();
        let announcement = Announcement {
            id: Uuid::new_v4(),
            author_id,
            title: req.title,
            body: req.body,
            category: req.category,
            session: req.session,
            attachment_key: req.attachment_key,
            state: LifecycleState::Draft,
            quorum: 0,
            eligible_count: 0,
            version: 1,
            published_at: None,
            retraction_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store()
            .announcements
            .insert(announcement.id, announcement.clone());
        Ok(announcement)
    }

    async fn update_announcement_content(
        &self,
        id: Uuid,
        expected_version: i32,
        req: UpdateAnnouncementRequest,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut store = self.store();
        let Some(a) = store.announcements.get_mut(&id) else {
            return Ok(None);
        };
        if a.version != expected_version || a.state != LifecycleState::Draft {
            return Ok(None);
        }
        if let Some(title) = req.title {
            a.title = title;
        }
        if let Some(body) = req.body {
            a.body = body;
        }
        if let Some(category) = req.category {
            a.category = category;
        }
        if let Some(session) = req.session {
            a.session = session;
        }
        if let Some(key) = req.attachment_key {
            a.attachment_key = Some(key);
        }
        a.version += 1;
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn submit_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        eligible: &[Uuid],
        quorum: i32,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut store = self.store();
        let Some(a) = store.announcements.get_mut(&id) else {
            return Ok(None);
        };
        if a.version != expected_version || a.state != LifecycleState::Draft {
            return Ok(None);
        }
        a.state = LifecycleState::PendingApproval;
        a.quorum = quorum;
        a.eligible_count = eligible.len() as i32;
        a.version += 1;
        a.updated_at = Utc::now();
        let snapshot = a.clone();
        store.eligibility.insert(id, eligible.to_vec());
        Ok(Some(snapshot))
    }

    async fn transition_state(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut store = self.store();
        let Some(a) = store.announcements.get_mut(&id) else {
            return Ok(None);
        };
        if a.version != expected_version || a.state != from {
            return Ok(None);
        }
        a.state = to;
        a.version += 1;
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn publish_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut store = self.store();
        let Some(a) = store.announcements.get_mut(&id) else {
            return Ok(None);
        };
        if a.version != expected_version || a.state != LifecycleState::Approved {
            return Ok(None);
        }
        a.state = LifecycleState::Published;
        a.published_at = Some(Utc::now());
        a.version += 1;
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn retract_announcement(
        &self,
        id: Uuid,
        expected_version: i32,
        from: LifecycleState,
        reason: String,
    ) -> Result<Option<Announcement>, sqlx::Error> {
        let mut store = self.store();
        let Some(a) = store.announcements.get_mut(&id) else {
            return Ok(None);
        };
        if a.version != expected_version || a.state != from {
            return Ok(None);
        }
        a.state = LifecycleState::Retracted;
        a.retraction_reason = Some(reason);
        a.version += 1;
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn is_eligible(
        &self,
        announcement_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        Ok(self
            .store()
            .eligibility
            .get(&announcement_id)
            .is_some_and(|set| set.contains(&user_id)))
    }

    async fn upsert_approval(
        &self,
        announcement_id: Uuid,
        signatory_user_id: Uuid,
        decision: Decision,
    ) -> Result<Approval, sqlx::Error> {
        let approval = Approval {
            announcement_id,
            signatory_user_id,
            decision,
            decided_at: Utc::now(),
        };
        self.store()
            .approvals
            .insert((announcement_id, signatory_user_id), approval.clone());
        Ok(approval)
    }

    async fn count_decisions(&self, announcement_id: Uuid) -> Result<ApprovalTally, sqlx::Error> {
        Ok(Self::tally(&self.store(), announcement_id))
    }

    async fn list_approvals(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<ApprovalView>, sqlx::Error> {
        let store = self.store();
        let mut rows: Vec<ApprovalView> = store
            .approvals
            .values()
            .filter(|a| a.announcement_id == announcement_id)
            .map(|a| {
                let (name, title) = Self::latest_signatory_display(&store, a.signatory_user_id);
                ApprovalView {
                    signatory_user_id: a.signatory_user_id,
                    name,
                    title,
                    decision: a.decision,
                    decided_at: a.decided_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.decided_at.cmp(&b.decided_at));
        Ok(rows)
    }

    async fn approvers_display(
        &self,
        announcement_id: Uuid,
    ) -> Result<Vec<SignerDisplay>, sqlx::Error> {
        let store = self.store();
        let mut rows: Vec<SignerDisplay> = store
            .approvals
            .values()
            .filter(|a| a.announcement_id == announcement_id && a.decision == Decision::Approve)
            .map(|a| {
                let (name, title) = Self::latest_signatory_display(&store, a.signatory_user_id);
                SignerDisplay { name, title }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error> {
        let store = self.store();
        let count_state = |s: LifecycleState| {
            store
                .announcements
                .values()
                .filter(|a| a.state == s)
                .count() as i64
        };
        Ok(AdminDashboardStats {
            total_announcements: store.announcements.len() as i64,
            draft: count_state(LifecycleState::Draft),
            pending_approval: count_state(LifecycleState::PendingApproval),
            approved: count_state(LifecycleState::Approved),
            published: count_state(LifecycleState::Published),
            rejected: count_state(LifecycleState::Rejected),
            retracted: count_state(LifecycleState::Retracted),
            active_signatories: store.signatories.iter().filter(|s| s.active).count() as i64,
            total_signatories: store.signatories.len() as i64,
        })
    }
}
