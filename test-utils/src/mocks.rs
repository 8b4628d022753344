//! Mock backends for testing.
//!
//! Both mocks are scripted through interior mutability so a test can change
//! their behaviour while lifecycle tasks are running against them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use vault_lifecycle::{
    AuthBackend, Lease, SecretBackend, SecretResponse, Token, Validity, VaultError, VaultResult,
};

/// Consume one unit of a failure budget, returning whether it was available.
fn take_failure(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Mock authentication backend.
///
/// Logins issue `s.login-{n}`; renewals keep the token value and grant a
/// fresh validity.
#[derive(Debug)]
pub struct MockAuthBackend {
    validity: Mutex<Validity>,
    renew_validity: Mutex<Option<Validity>>,
    renewable: AtomicBool,
    available: AtomicBool,
    login_failures: AtomicU32,
    renew_failures: AtomicU32,
    logins: AtomicU32,
    login_attempts: AtomicU32,
    renewals: AtomicU32,
}

impl MockAuthBackend {
    /// Issue renewable tokens with `validity`.
    #[must_use]
    pub fn new(validity: Validity) -> Self {
        Self {
            validity: Mutex::new(validity),
            renew_validity: Mutex::new(None),
            renewable: AtomicBool::new(true),
            available: AtomicBool::new(true),
            login_failures: AtomicU32::new(0),
            renew_failures: AtomicU32::new(0),
            logins: AtomicU32::new(0),
            login_attempts: AtomicU32::new(0),
            renewals: AtomicU32::new(0),
        }
    }

    /// Issue non-renewable tokens.
    #[must_use]
    pub fn non_renewable(self) -> Self {
        self.renewable.store(false, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` logins.
    pub fn fail_logins(&self, n: u32) {
        self.login_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` renewals.
    pub fn fail_renewals(&self, n: u32) {
        self.renew_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every call while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Grant `validity` on renewal instead of the login validity.
    pub fn set_renew_validity(&self, validity: Validity) {
        *self.renew_validity.lock() = Some(validity);
    }

    /// Successful logins.
    #[must_use]
    pub fn logins(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    /// All login attempts, failed ones included.
    #[must_use]
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    /// Successful renewals.
    #[must_use]
    pub fn renewals(&self) -> u32 {
        self.renewals.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> VaultResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::unavailable("connection refused"))
        }
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn login(&self) -> VaultResult<Token> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if take_failure(&self.login_failures) {
            return Err(VaultError::unavailable("login failed"));
        }

        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Token::new(
            format!("s.login-{n}"),
            *self.validity.lock(),
            self.renewable.load(Ordering::SeqCst),
        ))
    }

    async fn renew_token(&self, token: &Token) -> VaultResult<Token> {
        self.check_available()?;
        if take_failure(&self.renew_failures) {
            return Err(VaultError::auth_failed("token expired"));
        }

        self.renewals.fetch_add(1, Ordering::SeqCst);
        let granted = *self.renew_validity.lock();
        let validity = granted.unwrap_or_else(|| *self.validity.lock());
        Ok(Token::new(token.expose(), validity, token.renewable))
    }
}

/// How [`MockSecretBackend`] answers lease renewals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewBehavior {
    /// Grant the lease's current validity again
    Extend,
    /// Reject the renewal
    Fail,
    /// Grant the given validity
    Return(Validity),
}

#[derive(Debug, Clone, Copy)]
struct SecretSpec {
    validity: Validity,
    renewable: bool,
    leased: bool,
}

/// Mock secret backend.
///
/// Each read of a leased path issues a new lease `{path}/{n}` with fresh
/// credentials `user-{n}`/`pw-{n}`.
#[derive(Debug)]
pub struct MockSecretBackend {
    secrets: Mutex<HashMap<String, SecretSpec>>,
    renew_behavior: Mutex<RenewBehavior>,
    renew_delay: Mutex<Duration>,
    reads_available: AtomicBool,
    revoke_fails: AtomicBool,
    sequence: AtomicU32,
    reads: AtomicU32,
    renewals: AtomicU32,
    revoked: Mutex<Vec<String>>,
}

impl Default for MockSecretBackend {
    fn default() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
            renew_behavior: Mutex::new(RenewBehavior::Extend),
            renew_delay: Mutex::new(Duration::ZERO),
            reads_available: AtomicBool::new(true),
            revoke_fails: AtomicBool::new(false),
            sequence: AtomicU32::new(0),
            reads: AtomicU32::new(0),
            renewals: AtomicU32::new(0),
            revoked: Mutex::new(Vec::new()),
        }
    }
}

impl MockSecretBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve leased secrets at `path`.
    #[must_use]
    pub fn with_leased(self, path: &str, validity: Validity, renewable: bool) -> Self {
        self.secrets.lock().insert(
            path.to_string(),
            SecretSpec {
                validity,
                renewable,
                leased: true,
            },
        );
        self
    }

    /// Serve a secret without a lease at `path`.
    #[must_use]
    pub fn with_static(self, path: &str) -> Self {
        self.secrets.lock().insert(
            path.to_string(),
            SecretSpec {
                validity: Validity::Infinite,
                renewable: false,
                leased: false,
            },
        );
        self
    }

    /// Change how renewals are answered.
    pub fn set_renew_behavior(&self, behavior: RenewBehavior) {
        *self.renew_behavior.lock() = behavior;
    }

    /// Delay every renewal by `delay` before answering.
    pub fn set_renew_delay(&self, delay: Duration) {
        *self.renew_delay.lock() = delay;
    }

    /// Fail reads while `false`.
    pub fn set_reads_available(&self, available: bool) {
        self.reads_available.store(available, Ordering::SeqCst);
    }

    /// Fail revocations while `true`.
    pub fn set_revoke_fails(&self, fails: bool) {
        self.revoke_fails.store(fails, Ordering::SeqCst);
    }

    /// Read calls, failed ones included.
    #[must_use]
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Renewal calls, failed ones included.
    #[must_use]
    pub fn renewals(&self) -> u32 {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Lease ids passed to `revoke_lease`.
    #[must_use]
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }
}

#[async_trait]
impl SecretBackend for MockSecretBackend {
    async fn read(&self, path: &str) -> VaultResult<SecretResponse> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.reads_available.load(Ordering::SeqCst) {
            return Err(VaultError::unavailable("Vault is sealed"));
        }
        let spec = self
            .secrets
            .lock()
            .get(path)
            .copied()
            .ok_or_else(|| VaultError::not_found(path))?;

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let data = serde_json::json!({
            "username": format!("user-{n}"),
            "password": format!("pw-{n}"),
        });
        let lease = spec.leased.then(|| {
            Lease::new(
                format!("{path}/{n}"),
                path,
                data.clone(),
                spec.validity,
                spec.renewable,
            )
        });
        Ok(SecretResponse { data, lease })
    }

    async fn renew_lease(&self, lease: &Lease) -> VaultResult<Lease> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        let delay = *self.renew_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = *self.renew_behavior.lock();
        match behavior {
            RenewBehavior::Extend => Ok(lease.renewed(lease.validity, lease.renewable)),
            RenewBehavior::Fail => Err(VaultError::InvalidRequest(format!(
                "lease not found or lease is not renewable: {}",
                lease.lease_id
            ))),
            RenewBehavior::Return(validity) => Ok(lease.renewed(validity, lease.renewable)),
        }
    }

    async fn revoke_lease(&self, lease_id: &str) -> VaultResult<()> {
        self.revoked.lock().push(lease_id.to_string());
        if self.revoke_fails.load(Ordering::SeqCst) {
            Err(VaultError::unavailable("connection reset"))
        } else {
            Ok(())
        }
    }
}
