//! Key-value storage for pending one-time passwords.
//!
//! [`MemoryOtpStore`] keeps entries in process memory; restarting the server
//! drops every outstanding code. [`RedisOtpStore`] survives restarts and lets
//! several API instances share one set of codes.
//!
//! Redis layout: `otp:{identifier}` is a hash with `code`, `expires_at`
//! (unix millis) and `attempts`, with a key TTL matching `expires_at`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;

use crate::errors::{AppError, Result};
use crate::models::otp::{OtpCheck, OtpEntry};

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Stores `entry`, replacing any previous entry for `identifier`.
    async fn put(&self, identifier: &str, entry: OtpEntry) -> Result<()>;

    async fn get(&self, identifier: &str) -> Result<Option<OtpEntry>>;

    /// Checks `submitted` against the pending entry and applies the outcome
    /// in one atomic step: a wrong guess is counted, and a verified, expired
    /// or exhausted entry is deleted. Two callers can never both see
    /// [`OtpCheck::Verified`] for the same entry.
    async fn consume(
        &self,
        identifier: &str,
        submitted: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OtpCheck>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Default)]
pub struct MemoryOtpStore {
    entries: RwLock<HashMap<String, OtpEntry>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every entry that expired before `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, identifier: &str, entry: OtpEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(identifier.to_string(), entry);
        Ok(())
    }

    async fn get(&self, identifier: &str) -> Result<Option<OtpEntry>> {
        Ok(self.entries.read().await.get(identifier).cloned())
    }

    async fn consume(
        &self,
        identifier: &str,
        submitted: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OtpCheck> {
        let mut entries = self.entries.write().await;
        let outcome = match entries.get_mut(identifier) {
            Some(entry) => entry.check(submitted, now, max_attempts),
            None => return Ok(OtpCheck::NotFound),
        };
        if outcome.consumes_entry(max_attempts) {
            entries.remove(identifier);
        }
        Ok(outcome)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// Mirrors `OtpEntry::check` server-side. ARGV: submitted code, now (unix
// millis), max attempts. Replies `{status, attempts}`.
const CONSUME_SCRIPT: &str = r"
local fields = redis.call('HMGET', KEYS[1], 'code', 'expires_at', 'attempts')
if not fields[1] then
    return {0, 0}
end
local max = tonumber(ARGV[3])
if tonumber(ARGV[2]) > tonumber(fields[2]) then
    redis.call('DEL', KEYS[1])
    return {2, 0}
end
local attempts = tonumber(fields[3])
if attempts >= max then
    redis.call('DEL', KEYS[1])
    return {3, attempts}
end
if fields[1] ~= ARGV[1] then
    attempts = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
    if attempts >= max then
        redis.call('DEL', KEYS[1])
    end
    return {4, attempts}
end
redis.call('DEL', KEYS[1])
return {1, 0}
";

fn decode_check(status: i64, attempts: i64) -> Result<OtpCheck> {
    Ok(match status {
        0 => OtpCheck::NotFound,
        1 => OtpCheck::Verified,
        2 => OtpCheck::Expired,
        3 => OtpCheck::TooManyAttempts,
        4 => OtpCheck::Mismatch {
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        },
        other => {
            return Err(AppError::RedisError(format!(
                "unexpected OTP script reply {}",
                other
            )))
        }
    })
}

#[derive(Clone)]
pub struct RedisOtpStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisOtpStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            prefix: "otp".to_string(),
        })
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.prefix, identifier)
    }
}

fn parse_entry(fields: HashMap<String, String>) -> Result<OtpEntry> {
    let corrupt = || AppError::RedisError("corrupt OTP entry".to_string());
    let code = fields.get("code").cloned().ok_or_else(corrupt)?;
    let expires_millis: i64 = fields
        .get("expires_at")
        .and_then(|v| v.parse().ok())
        .ok_or_else(corrupt)?;
    let expires_at = Utc
        .timestamp_millis_opt(expires_millis)
        .single()
        .ok_or_else(corrupt)?;
    let attempts: u32 = fields
        .get("attempts")
        .and_then(|v| v.parse().ok())
        .ok_or_else(corrupt)?;
    Ok(OtpEntry {
        code,
        expires_at,
        attempts,
    })
}

#[async_trait]
impl OtpStore for RedisOtpStore {
    async fn put(&self, identifier: &str, entry: OtpEntry) -> Result<()> {
        let key = self.key(identifier);
        let mut conn = self.conn.clone();
        // The key outlives the logical expiry by a second so an expired entry
        // is still seen (and reported as expired) on the next verify.
        let expire_at_secs = entry.expires_at.timestamp() + 1;

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(&key)
            .ignore()
            .cmd("HSET")
            .arg(&key)
            .arg("code")
            .arg(&entry.code)
            .arg("expires_at")
            .arg(entry.expires_at.timestamp_millis())
            .arg("attempts")
            .arg(entry.attempts)
            .ignore()
            .cmd("EXPIREAT")
            .arg(&key)
            .arg(expire_at_secs)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, identifier: &str) -> Result<Option<OtpEntry>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.key(identifier))
            .query_async(&mut conn)
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_entry(fields).map(Some)
    }

    async fn consume(
        &self,
        identifier: &str,
        submitted: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OtpCheck> {
        let mut conn = self.conn.clone();
        let (status, attempts): (i64, i64) = redis::Script::new(CONSUME_SCRIPT)
            .key(self.key(identifier))
            .arg(submitted)
            .arg(now.timestamp_millis())
            .arg(max_attempts)
            .invoke_async(&mut conn)
            .await?;
        decode_check(status, attempts)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
