use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult, Script};
use tracing::info;
use uuid::Uuid;

// Deletes the key only while it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Short-lived Redis lease so that only one scheduler replica sweeps per tick.
///
/// The lease is never renewed. It is taken with `SET NX EX` and left to
/// expire, so `lease_secs` should stay below the sweep interval.
pub struct SweepLease {
    connection: MultiplexedConnection,
    key: String,
    token: String,
    ttl_secs: u64,
}

impl SweepLease {
    pub async fn connect(redis_url: &str, key: &str, ttl_secs: u64) -> RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4().to_string();
        info!(key, token = %token, "connected to Redis for the sweep lease");
        Ok(SweepLease { connection, key: key.to_string(), token, ttl_secs })
    }

    /// `true` when this process now holds the lease.
    pub async fn try_acquire(&self) -> RedisResult<bool> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.token)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut connection)
            .await?;
        Ok(reply.is_some())
    }

    pub async fn release(&self) -> RedisResult<bool> {
        let mut connection = self.connection.clone();
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut connection)
            .await?;
        Ok(removed == 1)
    }
}
