use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

/// Argon2id hasher with a configurable work factor.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// `cost` is the Argon2 iteration count; memory stays at the library default.
    pub fn new(cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(Params::DEFAULT_M_COST, cost.max(1), Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {}", e))?;
        Ok(Self { params })
    }

    #[cfg(test)]
    pub fn fast() -> Self {
        Self {
            params: Params::new(Params::MIN_M_COST, 1, 1, None).expect("min params are valid"),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn hash_blocking(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify_blocking(plain: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "argon2 parse hash error");
                return false;
            }
        };
        // Parameters come from the PHC string, so older hashes keep verifying
        // after the configured cost changes.
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hashes on the blocking pool; Argon2 is CPU-bound.
    pub async fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let hasher = self.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&plain))
            .await
            .map_err(|e| anyhow::anyhow!("hash task join error: {}", e))?
    }

    /// A malformed stored hash counts as a mismatch, as does a failed task.
    pub async fn verify(&self, plain: &str, hash: &str) -> bool {
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || Self::verify_blocking(&plain, &hash)).await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "verify task join error");
                false
            }
        }
    }
}
