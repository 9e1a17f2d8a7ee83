//! [`SyncStore`] backed by Redis.
//!
//! Primitives map one-to-one onto SADD / SRANDMEMBER / SREM / SISMEMBER /
//! SCARD / HMGET / HSET / HDEL. The three scripts run as Lua through
//! [`redis::Script`] (EVALSHA with EVAL fallback), which Redis executes
//! without interleaving any other client's commands.
//!
//! Structure ids are passed as `KEYS`, item keys as `ARGV`. `SRANDMEMBER`
//! inside a script needs effects replication, the default since Redis 5.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;

use backsync_core::{ItemKey, KeyLayout, TiePolicy, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::store::{ClaimRequest, SyncStore};

/// KEYS: membership, versions. ARGV: item, now.
const RECORD_LUA: &str = r#"
local added = redis.call('SADD', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
return added
"#;

/// KEYS: membership, versions, leases. ARGV: limit, sample, now, lease timeout secs.
///
/// Leases and versions are read with one HGET per sampled key; the sample
/// may be larger than Lua's `unpack` limit.
const CLAIM_LUA: &str = r#"
local limit = tonumber(ARGV[1])
local now = tonumber(ARGV[3])
local timeout = tonumber(ARGV[4])

-- ARGV[2] stays a string; as a Lua number it loses integer precision near i64::MAX.
local sample = redis.call('SRANDMEMBER', KEYS[1], ARGV[2])
if #sample == 0 then
  return {}
end

local candidates = {}
for _, key in ipairs(sample) do
  local lease = tonumber(redis.call('HGET', KEYS[3], key))
  if lease == nil or now - lease > timeout then
    local version = tonumber(redis.call('HGET', KEYS[2], key)) or -1
    candidates[#candidates + 1] = { key = key, version = version }
  end
end

table.sort(candidates, function(a, b) return a.version < b.version end)

local claimed = {}
for i = 1, math.min(limit, #candidates) do
  local key = candidates[i].key
  redis.call('HSET', KEYS[3], key, now)
  claimed[#claimed + 1] = key
end
return claimed
"#;

/// KEYS: membership, versions, leases. ARGV: inclusive flag, items...
const RETIRE_LUA: &str = r#"
local inclusive = ARGV[1] == '1'
local retired = {}
for i = 2, #ARGV do
  local key = ARGV[i]
  local version = tonumber(redis.call('HGET', KEYS[2], key))
  local lease = tonumber(redis.call('HGET', KEYS[3], key))
  if version ~= nil and lease ~= nil and (lease > version or (inclusive and lease == version)) then
    redis.call('SREM', KEYS[1], key)
    redis.call('HDEL', KEYS[2], key)
    retired[#retired + 1] = key
  end
  redis.call('HDEL', KEYS[3], key)
end
return retired
"#;

/// Redis-backed coordination store. Cheap to clone; clones share one
/// multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    record_script: Script,
    claim_script: Script,
    retire_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open a multiplexed connection to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::debug!(url = %url, "connected to redis");
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            record_script: Script::new(RECORD_LUA),
            claim_script: Script::new(CLAIM_LUA),
            retire_script: Script::new(RETIRE_LUA),
        }
    }
}

fn into_keys(members: Vec<String>) -> Vec<ItemKey> {
    members.into_iter().map(ItemKey::from).collect()
}

/// Redis counts are signed 64-bit; larger requests mean "everything".
fn redis_count(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Decode one HMGET slot. Anything other than an integer is reported with
/// the hash and field it came from.
fn parse_stamp(hash: &str, field: &ItemKey, raw: Option<String>) -> StoreResult<Option<Timestamp>> {
    match raw {
        None => Ok(None),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(secs) => Ok(Some(Timestamp(secs))),
            Err(_) => Err(StoreError::Malformed {
                structure: hash.to_string(),
                field: field.to_string(),
                value,
            }),
        },
    }
}

#[async_trait]
impl SyncStore for RedisStore {
    async fn set_add(&self, set: &str, member: &ItemKey) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("SADD")
            .arg(set)
            .arg(member.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn set_sample_random(&self, set: &str, count: usize) -> StoreResult<Vec<ItemKey>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // Positive count: distinct members, at most the set's cardinality.
        let members: Vec<String> = redis::cmd("SRANDMEMBER")
            .arg(set)
            .arg(redis_count(count))
            .query_async(&mut conn)
            .await?;
        Ok(into_keys(members))
    }

    async fn set_remove(&self, set: &str, member: &ItemKey) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("SREM")
            .arg(set)
            .arg(member.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_contains(&self, set: &str, member: &ItemKey) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let present: i64 = redis::cmd("SISMEMBER")
            .arg(set)
            .arg(member.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(present == 1)
    }

    async fn set_len(&self, set: &str) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("SCARD").arg(set).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn hash_multi_get(
        &self,
        hash: &str,
        fields: &[ItemKey],
    ) -> StoreResult<Vec<Option<Timestamp>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(hash);
        for field in fields {
            cmd.arg(field.as_str());
        }
        let values: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
        fields
            .iter()
            .zip(values)
            .map(|(field, raw)| parse_stamp(hash, field, raw))
            .collect()
    }

    async fn hash_multi_set(
        &self,
        hash: &str,
        entries: &[(ItemKey, Timestamp)],
    ) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(hash);
        for (field, value) in entries {
            cmd.arg(field.as_str()).arg(value.0);
        }
        let _: i64 = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hash_delete(&self, hash: &str, field: &ItemKey) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HDEL")
            .arg(hash)
            .arg(field.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn record(
        &self,
        layout: &KeyLayout,
        item: &ItemKey,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = self
            .record_script
            .key(&layout.membership_set)
            .key(&layout.version_hash)
            .arg(item.as_str())
            .arg(now.0)
            .invoke_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn claim(&self, layout: &KeyLayout, request: ClaimRequest) -> StoreResult<Vec<ItemKey>> {
        if request.limit == 0 || request.sample == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let claimed: Vec<String> = self
            .claim_script
            .key(&layout.membership_set)
            .key(&layout.version_hash)
            .key(&layout.lease_hash)
            .arg(redis_count(request.limit))
            .arg(redis_count(request.sample))
            .arg(request.now.0)
            .arg(request.lease_timeout.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(into_keys(claimed))
    }

    async fn retire(
        &self,
        layout: &KeyLayout,
        items: &[ItemKey],
        tie: TiePolicy,
    ) -> StoreResult<Vec<ItemKey>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let inclusive = match tie {
            TiePolicy::Inclusive => "1",
            TiePolicy::Strict => "0",
        };
        let mut invocation = self.retire_script.prepare_invoke();
        invocation
            .key(&layout.membership_set)
            .key(&layout.version_hash)
            .key(&layout.lease_hash)
            .arg(inclusive);
        for item in items {
            invocation.arg(item.as_str());
        }
        let retired: Vec<String> = invocation.invoke_async(&mut conn).await?;
        Ok(into_keys(retired))
    }
}
