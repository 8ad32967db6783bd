//! Credential store backed by Redis.
//!
//! Each outstanding token is one key (`tokengate:token:{value}` -> identity).
//! Redemption runs as a server-side compare-and-delete script, so two
//! concurrent redemptions of the same token cannot both succeed.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use tokengate_common::constants::redis_keys::TOKEN_PREFIX;
use tokengate_common::{GateError, UserId};

use super::{CredentialStore, fingerprint, generate_token};

/// Delete KEYS[1] only if it holds ARGV[1]; returns 1 when deleted
const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

pub struct RedisCredentialStore {
    redis: ConnectionManager,
    redeem_script: redis::Script,
}

impl RedisCredentialStore {
    /// Connect with an auto-reconnecting connection manager
    pub async fn connect(url: &str) -> Result<Self, GateError> {
        let client = redis::Client::open(url).map_err(redis_error)?;
        let redis = ConnectionManager::new(client).await.map_err(redis_error)?;

        Ok(Self {
            redis,
            redeem_script: redis::Script::new(COMPARE_AND_DELETE),
        })
    }

    fn key(token: &str) -> String {
        format!("{TOKEN_PREFIX}{token}")
    }
}

fn redis_error(e: redis::RedisError) -> GateError {
    GateError::Redis(e.to_string())
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn issue(&self, identity: UserId) -> Result<String, GateError> {
        let token = generate_token(identity, chrono::Utc::now().timestamp());

        let mut conn = self.redis.clone();
        let created: bool = conn
            .set_nx(Self::key(&token), identity.get())
            .await
            .map_err(redis_error)?;
        if !created {
            // 256 random bits colliding means the RNG is broken
            return Err(GateError::Internal("token collision".to_string()));
        }

        tracing::info!(identity = %identity, token = %fingerprint(&token), "Token issued");
        Ok(token)
    }

    async fn redeem(&self, token: &str, claimed: UserId) -> Result<bool, GateError> {
        let mut conn = self.redis.clone();
        let deleted: i64 = self
            .redeem_script
            .key(Self::key(token))
            .arg(claimed.get().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if deleted == 1 {
            tracing::debug!(identity = %claimed, token = %fingerprint(token), "Token consumed");
        }
        Ok(deleted == 1)
    }

    async fn restore(&self, token: &str, identity: UserId) -> Result<(), GateError> {
        let mut conn = self.redis.clone();
        conn.set::<_, _, ()>(Self::key(token), identity.get())
            .await
            .map_err(redis_error)
    }

    async fn len(&self) -> Result<u64, GateError> {
        let mut conn = self.redis.clone();
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(format!("{TOKEN_PREFIX}*"))
            .await
            .map_err(redis_error)?;

        let mut count = 0;
        while iter.next_item().await.is_some() {
            count += 1;
        }
        Ok(count)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.redis.clone();
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }
}
