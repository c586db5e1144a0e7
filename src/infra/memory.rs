//! In-memory users backend with simulated latency.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{RepoError, UserQueryFilter, UsersRepo};
use crate::domain::entities::{NewUser, UserRecord};
use crate::domain::types::{UserRole, UserStatus};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory";
const EMAIL_CONSTRAINT: &str = "users_email_key";
const AVATAR_BASE: &str = "https://ui-avatars.com/api/";

pub const DEFAULT_READ_LATENCY: Duration = Duration::from_millis(600);
pub const DEFAULT_WRITE_LATENCY: Duration = Duration::from_millis(800);

/// A [`UsersRepo`] over a vector, newest first.
///
/// Each read sleeps for `read_latency` and each write for `write_latency` before touching
/// the data, so callers observe the same loading states a remote backend would produce.
#[derive(Debug)]
pub struct InMemoryUsersRepo {
    users: RwLock<Vec<UserRecord>>,
    read_latency: Duration,
    write_latency: Duration,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
    list_calls: AtomicUsize,
}

impl InMemoryUsersRepo {
    pub fn with_users(users: Vec<UserRecord>) -> Self {
        Self {
            users: RwLock::new(users),
            read_latency: DEFAULT_READ_LATENCY,
            write_latency: DEFAULT_WRITE_LATENCY,
            failing_reads: AtomicU32::new(0),
            failing_writes: AtomicU32::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// The demo directory of seven users.
    pub fn seeded() -> Self {
        Self::with_users(seed_users())
    }

    pub fn empty() -> Self {
        Self::with_users(Vec::new())
    }

    pub fn with_latency(mut self, read: Duration, write: Duration) -> Self {
        self.read_latency = read;
        self.write_latency = write;
        self
    }

    /// Make the next `count` reads fail with [`RepoError::Unavailable`].
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail with [`RepoError::Unavailable`].
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of `list` calls served so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<UserRecord> {
        rw_read(&self.users, SOURCE, "snapshot").clone()
    }

    async fn simulate_read(&self) -> Result<(), RepoError> {
        pause(self.read_latency).await;
        take_failure(&self.failing_reads, "read")
    }

    async fn simulate_write(&self) -> Result<(), RepoError> {
        pause(self.write_latency).await;
        take_failure(&self.failing_writes, "write")
    }
}

impl Default for InMemoryUsersRepo {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait]
impl UsersRepo for InMemoryUsersRepo {
    #[instrument(skip(self, filter), fields(search = %filter.search, status = %filter.status))]
    async fn list(
        &self,
        filter: &UserQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<UserRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_read().await?;

        let users = rw_read(&self.users, SOURCE, "list");
        let matching: Vec<&UserRecord> = users.iter().filter(|user| filter.matches(user)).collect();
        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(page.offset())
            .take(page.page_size as usize)
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            target_module = SOURCE,
            page = page.page,
            page_size = page.page_size,
            total,
            returned = rows.len(),
            "Listed users"
        );
        Ok(Paginated::new(rows, total, page.page_size))
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        self.simulate_read().await?;
        let users = rw_read(&self.users, SOURCE, "find");
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        self.simulate_write().await?;

        let mut users = rw_write(&self.users, SOURCE, "create");
        ensure_unique_email(&users, &user.email, None)?;

        let now = OffsetDateTime::now_utc();
        let record = UserRecord {
            id: Uuid::new_v4(),
            avatar_url: Some(avatar_url(&user.name)),
            name: user.name,
            email: user.email,
            role: user.role,
            status: user.status,
            last_login: now,
            created_at: now,
        };
        users.insert(0, record.clone());
        Ok(record)
    }

    async fn update(&self, user: UserRecord) -> Result<UserRecord, RepoError> {
        self.simulate_write().await?;

        let mut users = rw_write(&self.users, SOURCE, "update");
        let index = users
            .iter()
            .position(|existing| existing.id == user.id)
            .ok_or(RepoError::NotFound)?;
        ensure_unique_email(&users, &user.email, Some(user.id))?;
        users[index] = user.clone();
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.simulate_write().await?;

        let mut users = rw_write(&self.users, SOURCE, "delete");
        let before = users.len();
        users.retain(|user| user.id != id);
        if users.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

async fn pause(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

fn take_failure(counter: &AtomicU32, operation: &'static str) -> Result<(), RepoError> {
    let armed = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if armed {
        return Err(RepoError::unavailable(format!("simulated {operation} failure")));
    }
    Ok(())
}

fn ensure_unique_email(
    users: &[UserRecord],
    email: &str,
    except: Option<Uuid>,
) -> Result<(), RepoError> {
    let taken = users
        .iter()
        .any(|user| Some(user.id) != except && user.email.eq_ignore_ascii_case(email));
    if taken {
        return Err(RepoError::Duplicate {
            constraint: EMAIL_CONSTRAINT.to_string(),
        });
    }
    Ok(())
}

/// Generated initials avatar for a new user.
///
/// Spaces in the name are sent as `%20`.
pub fn avatar_url(name: &str) -> String {
    // Form encoding escapes a literal '+' as %2B, so every '+' left is a space.
    let encoded = url::form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("{AVATAR_BASE}?name={encoded}&background=random")
}

/// The demo directory: seven users across every role and status.
pub fn seed_users() -> Vec<UserRecord> {
    let user = |id: u128,
                name: &str,
                email: &str,
                role: UserRole,
                status: UserStatus,
                last_login: OffsetDateTime,
                created_at: OffsetDateTime| UserRecord {
        id: Uuid::from_u128(id),
        name: name.to_string(),
        email: email.to_string(),
        role,
        status,
        last_login,
        created_at,
        avatar_url: None,
    };

    let mut ana = user(
        1,
        "Ana Silva",
        "ana.silva@corp.com",
        UserRole::Admin,
        UserStatus::Active,
        datetime!(2024-02-15 10:30:00 UTC),
        datetime!(2023-01-10 09:00:00 UTC),
    );
    ana.avatar_url = Some(format!(
        "{AVATAR_BASE}?name=Ana+Silva&background=6366f1&color=fff"
    ));

    vec![
        ana,
        user(
            2,
            "Carlos Mendes",
            "carlos.m@corp.com",
            UserRole::Manager,
            UserStatus::Active,
            datetime!(2024-02-14 16:20:00 UTC),
            datetime!(2023-03-15 14:30:00 UTC),
        ),
        user(
            3,
            "Beatriz Costa",
            "bia.costa@corp.com",
            UserRole::User,
            UserStatus::Inactive,
            datetime!(2023-12-20 09:15:00 UTC),
            datetime!(2023-06-10 11:00:00 UTC),
        ),
        user(
            4,
            "João Pedro",
            "jp.souza@corp.com",
            UserRole::User,
            UserStatus::Pending,
            datetime!(2024-02-15 08:00:00 UTC),
            datetime!(2024-02-14 10:00:00 UTC),
        ),
        user(
            5,
            "Mariana Oliveira",
            "mari.oli@corp.com",
            UserRole::Manager,
            UserStatus::Active,
            datetime!(2024-02-12 18:45:00 UTC),
            datetime!(2023-08-05 16:20:00 UTC),
        ),
        user(
            6,
            "Roberto Santos",
            "roberto.s@corp.com",
            UserRole::User,
            UserStatus::Active,
            datetime!(2024-02-10 11:00:00 UTC),
            datetime!(2024-01-05 14:00:00 UTC),
        ),
        user(
            7,
            "Fernanda Lima",
            "fernanda.l@corp.com",
            UserRole::User,
            UserStatus::Inactive,
            datetime!(2023-11-20 09:00:00 UTC),
            datetime!(2023-05-12 10:00:00 UTC),
        ),
    ]
}
