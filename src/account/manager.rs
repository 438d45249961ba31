//! Account creation and credential checks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::account::{
    Account, AccountRepository, Authenticatable, MAX_FIELD_LENGTH,
    normalize_email,
};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::telemetry::{ACCOUNTS_CREATED, AUTHENTICATIONS};

/// Capability to build valid accounts.
#[async_trait]
pub trait AccountFactory: Send + Sync {
    /// Create and save a regular account.
    ///
    /// Without `password` the account cannot authenticate until one is set.
    async fn create_account(
        &self,
        email: &str,
        name: &str,
        password: Option<&str>,
    ) -> Result<Account>;

    /// Create and save an account with `is_staff` and `is_superuser` set.
    async fn create_superadmin(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Account>;
}

/// Account manager.
#[derive(Clone)]
pub struct AccountManager {
    repo: Arc<dyn AccountRepository>,
    pwd: Arc<PasswordManager>,
}

impl AccountManager {
    /// Create a new [`AccountManager`].
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        pwd: Arc<PasswordManager>,
    ) -> Self {
        Self { repo, pwd }
    }

    /// Replace the stored password. Call [`AccountManager::save`] afterwards.
    pub fn set_password(
        &self,
        account: &mut Account,
        password: Option<&str>,
    ) -> Result<()> {
        account.password = self.pwd.make_password(password)?;
        Ok(())
    }

    /// Persist an existing account.
    pub async fn save(&self, account: &Account) -> Result<()> {
        self.repo.save(account).await
    }

    /// Find an account using its email, normalized first.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.repo.find_by_email(&normalize_email(email)).await
    }

    /// Check credentials.
    ///
    /// Returns `None` for unknown, inactive or password-less accounts and for
    /// wrong passwords. Updates `last_login` on success.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Account>> {
        let Some(mut account) = self.find_by_email(email).await? else {
            // Keep timing similar to a wrong password.
            let _ = self.pwd.hash_password(password);
            metrics::counter!(AUTHENTICATIONS, "outcome" => "unknown")
                .increment(1);
            return Ok(None);
        };

        if !account.check_password(&self.pwd, password) || !account.is_active {
            tracing::debug!(account_id = account.id, "authentication refused");
            metrics::counter!(AUTHENTICATIONS, "outcome" => "refused")
                .increment(1);
            return Ok(None);
        }

        account.last_login = Some(chrono::Utc::now());
        self.repo.save(&account).await?;
        metrics::counter!(AUTHENTICATIONS, "outcome" => "success").increment(1);

        Ok(Some(account))
    }
}

/// `email` is checked once normalized, as it will be stored.
fn validate(email: &str, name: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(ServerError::field(
            "email",
            "required",
            "Users must have an email address.",
        ));
    }
    if name.trim().is_empty() {
        return Err(ServerError::field(
            "name",
            "required",
            "Users must have a name.",
        ));
    }
    if email.chars().count() > MAX_FIELD_LENGTH {
        return Err(ServerError::field(
            "email",
            "length",
            "Ensure this field has no more than 255 characters.",
        ));
    }
    if name.chars().count() > MAX_FIELD_LENGTH {
        return Err(ServerError::field(
            "name",
            "length",
            "Ensure this field has no more than 255 characters.",
        ));
    }

    Ok(())
}

#[async_trait]
impl AccountFactory for AccountManager {
    async fn create_account(
        &self,
        email: &str,
        name: &str,
        password: Option<&str>,
    ) -> Result<Account> {
        let email = normalize_email(email);
        validate(&email, name)?;

        let password = self.pwd.make_password(password)?;
        let account = self
            .repo
            .insert(&Account::new(email, name.to_owned(), password))
            .await?;

        tracing::info!(account_id = account.id, "account created");
        metrics::counter!(ACCOUNTS_CREATED).increment(1);

        Ok(account)
    }

    async fn create_superadmin(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Account> {
        let mut account =
            self.create_account(email, name, Some(password)).await?;

        account.is_superuser = true;
        account.is_staff = true;
        self.repo.save(&account).await?;

        tracing::info!(account_id = account.id, "superadmin created");

        Ok(account)
    }
}

#[cfg(test)]
pub(crate) fn test_manager() -> AccountManager {
    AccountManager::new(
        Arc::new(crate::account::MemoryAccountRepository::new()),
        Arc::new(crate::crypto::test_manager()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PermissionBearer;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn field_of(err: ServerError) -> String {
        match err {
            ServerError::Validation(errors) => errors
                .field_errors()
                .keys()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(","),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_account() {
        let manager = test_manager();

        let account = manager
            .create_account("Jean@EXAMPLE.org", "Jean", Some("P$soW%920$n&"))
            .await
            .unwrap();

        assert!(account.id > 0);
        assert_eq!(account.email, "Jean@example.org");
        assert_eq!(account.name, "Jean");
        assert_ne!(account.password, "P$soW%920$n&");
        assert!(account.is_active);
        assert!(!account.is_staff);
        assert!(!account.is_superuser);

        let stored = manager
            .find_by_email("Jean@example.ORG")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, account);
    }

    #[tokio::test]
    async fn test_create_without_email() {
        let manager = test_manager();

        for email in ["", "   "] {
            let err = manager
                .create_account(email, "Jean", Some("password"))
                .await
                .unwrap_err();
            assert_eq!(field_of(err), "email");
        }
    }

    #[tokio::test]
    async fn test_create_without_name() {
        let manager = test_manager();

        let err = manager
            .create_account("jean@example.com", "", Some("password"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "name");
    }

    #[tokio::test]
    async fn test_create_too_long() {
        let manager = test_manager();
        let long = "a".repeat(MAX_FIELD_LENGTH + 1);

        let err = manager
            .create_account(&format!("{long}@example.com"), "Jean", None)
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "email");

        let err = manager
            .create_account("jean@example.com", &long, None)
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "name");
    }

    #[tokio::test]
    async fn test_email_length_ignores_surrounding_whitespace() {
        let manager = test_manager();
        let email = format!("{}@example.com", "a".repeat(240));

        let account = manager
            .create_account(&format!("  {email}        "), "Jean", None)
            .await
            .unwrap();
        assert_eq!(account.email, email);
        assert_eq!(account.email.chars().count(), 252);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let manager = test_manager();

        manager
            .create_account("jean@example.com", "Jean", None)
            .await
            .unwrap();
        let err = manager
            .create_account("jean@EXAMPLE.com", "Other", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::EmailTaken));
    }

    #[tokio::test]
    async fn test_create_without_password() {
        let manager = test_manager();

        let account = manager
            .create_account("jean@example.com", "Jean", None)
            .await
            .unwrap();

        assert!(!account.has_usable_password());
        for guess in ["", "None", "password", account.password.as_str()] {
            assert!(!account.check_password(&manager.pwd, guess));
            assert!(
                manager
                    .authenticate("jean@example.com", guess)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
    }

    #[tokio::test]
    async fn test_create_superadmin() {
        let manager = test_manager();

        let account = manager
            .create_superadmin("root@Example.com", "Root", "P$soW%920$n&")
            .await
            .unwrap();

        assert_eq!(account.email, "root@example.com");
        assert!(account.is_staff());
        assert!(account.is_superuser());
        assert!(account.has_perm("anything"));

        let stored = manager
            .find_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_staff);
        assert!(stored.is_superuser);
    }

    #[tokio::test]
    async fn test_create_superadmin_without_email() {
        let manager = test_manager();

        let err = manager
            .create_superadmin("", "Root", "password")
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "email");
    }

    #[tokio::test]
    async fn test_authenticate() {
        let manager = test_manager();
        manager
            .create_account("jean@example.com", "Jean", Some("P$soW%920$n&"))
            .await
            .unwrap();

        let account = manager
            .authenticate("jean@EXAMPLE.com", "P$soW%920$n&")
            .await
            .unwrap()
            .unwrap();
        assert!(account.last_login.is_some());

        assert!(
            manager
                .authenticate("jean@example.com", "wrong")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            manager
                .authenticate("unknown@example.com", "P$soW%920$n&")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        // Tests run on a current-thread runtime.
        let _recorder = metrics::set_default_local_recorder(&recorder);

        let manager = test_manager();
        manager
            .create_account("jean@example.com", "Jean", Some("P$soW%920$n&"))
            .await
            .unwrap();
        for (email, password) in [
            ("jean@example.com", "P$soW%920$n&"),
            ("jean@example.com", "wrong"),
            ("unknown@example.com", "P$soW%920$n&"),
        ] {
            manager.authenticate(email, password).await.unwrap();
        }

        let rendered = handle.render();
        assert!(rendered.contains(&format!("{ACCOUNTS_CREATED} 1")));
        for outcome in ["success", "refused", "unknown"] {
            assert!(rendered.contains(&format!(
                "{AUTHENTICATIONS}{{outcome=\"{outcome}\"}} 1"
            )));
        }
    }

    #[tokio::test]
    async fn test_inactive_cannot_authenticate() {
        let manager = test_manager();
        let mut account = manager
            .create_account("jean@example.com", "Jean", Some("P$soW%920$n&"))
            .await
            .unwrap();

        account.is_active = false;
        manager.save(&account).await.unwrap();

        assert!(
            manager
                .authenticate("jean@example.com", "P$soW%920$n&")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_set_password() {
        let manager = test_manager();
        let mut account = manager
            .create_account("jean@example.com", "Jean", None)
            .await
            .unwrap();

        manager.set_password(&mut account, Some("new-password")).unwrap();
        manager.save(&account).await.unwrap();

        assert!(
            manager
                .authenticate("jean@example.com", "new-password")
                .await
                .unwrap()
                .is_some()
        );

        manager.set_password(&mut account, None).unwrap();
        manager.save(&account).await.unwrap();

        assert!(
            manager
                .authenticate("jean@example.com", "new-password")
                .await
                .unwrap()
                .is_none()
        );
    }
}
