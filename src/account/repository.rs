//! Handle account persistence.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::RwLock;

use crate::account::Account;
use crate::error::{Result, ServerError};

/// Port for account persistence.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new [`Account`] and return it with its assigned `id`.
    async fn insert(&self, account: &Account) -> Result<Account>;

    /// Write every mutable field of an existing [`Account`].
    async fn save(&self, account: &Account) -> Result<()>;

    /// Find an account using its exact `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;
}

const SELECT_ACCOUNT: &str = r#"SELECT id, email, name, password, is_active, is_staff, is_superuser, last_login
    FROM accounts"#;

/// PostgreSQL account repository.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: Pool<Postgres>,
}

impl PgAccountRepository {
    /// Create a new [`PgAccountRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (email, name, password, is_active, is_staff, is_superuser, last_login)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, email, name, password, is_active, is_staff, is_superuser, last_login"#,
        )
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password)
        .bind(account.is_active)
        .bind(account.is_staff)
        .bind(account.is_superuser)
        .bind(account.last_login)
        .fetch_one(&self.pool)
        .await
        .map_err(ServerError::from_insert)?;

        Ok(account)
    }

    async fn save(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"UPDATE accounts
                SET email = $1, name = $2, password = $3, is_active = $4, is_staff = $5, is_superuser = $6, last_login = $7
                WHERE id = $8"#,
        )
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password)
        .bind(account.is_active)
        .bind(account.is_staff)
        .bind(account.is_superuser)
        .bind(account.last_login)
        .bind(account.id)
        .execute(&self.pool)
        .await
        .map_err(ServerError::from_insert)?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("{SELECT_ACCOUNT} WHERE email = $1");

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Volatile account repository.
///
/// Used when no database is configured and by tests.
#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: RwLock<Vec<Account>>,
}

impl MemoryAccountRepository {
    /// Create an empty [`MemoryAccountRepository`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        if accounts.iter().any(|a| a.email == account.email) {
            return Err(ServerError::EmailTaken);
        }

        let id = accounts.iter().map(|a| a.id).max().unwrap_or_default() + 1;
        let account = Account {
            id,
            ..account.clone()
        };
        accounts.push(account.clone());

        Ok(account)
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .iter()
            .any(|a| a.id != account.id && a.email == account.email)
        {
            return Err(ServerError::EmailTaken);
        }

        // Like an UPDATE, a missing row is not an error.
        if let Some(stored) = accounts.iter_mut().find(|a| a.id == account.id) {
            *stored = account.clone();
        }

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }
}
