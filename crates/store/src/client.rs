//! Redis-backed arm store.
//!
//! Layout:
//! - `{prefix}:test:{test_id}`: list of arm ids in creation order
//! - `{prefix}:arm:{arm_id}`: hash with the arm's fields and counters
//!
//! Creation and increments run as Lua scripts so the existence check and the
//! write happen in one atomic server step. One connection is opened up front
//! and reused; it is replaced after an I/O failure.

use chrono::{DateTime, Utc};
use menu_bandit_core::config::StoreConfig;
use menu_bandit_core::{Arm, ArmStore, StorageError, StorageResult};
use parking_lot::Mutex;
use redis::{Commands, RedisError, RedisResult};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CREATE_ARMS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local prefix = ARGV[1]
local i = 2
while i <= #ARGV do
  local id = ARGV[i]
  redis.call('HSET', prefix .. ':arm:' .. id,
    'id', id,
    'test_id', ARGV[i + 1],
    'name', ARGV[i + 2],
    'weight', ARGV[i + 3],
    'created_at', ARGV[i + 4],
    'impressions', 0,
    'conversions', 0,
    'revenue', 0)
  redis.call('RPUSH', KEYS[1], id)
  i = i + 5
end
return 1
"#;

const INCR_IMPRESSION: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'impressions', 1)
return 1
"#;

const INCR_CONVERSION: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'conversions', 1)
redis.call('HINCRBYFLOAT', KEYS[1], 'revenue', ARGV[1])
return 1
"#;

pub struct RedisArmStore {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    prefix: String,
    create_arms: redis::Script,
    incr_impression: redis::Script,
    incr_conversion: redis::Script,
}

impl RedisArmStore {
    /// Connect and verify the server answers `PING`.
    pub fn new(config: &StoreConfig) -> StorageResult<Self> {
        info!(url = %config.redis_url, "Connecting to Redis arm store");

        let client = redis::Client::open(config.redis_url.as_str()).map_err(backend)?;
        let mut conn = client.get_connection().map_err(backend)?;
        let pong: String = redis::cmd("PING").query(&mut conn).map_err(backend)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            conn: Mutex::new(Some(conn)),
            prefix: config.key_prefix.clone(),
            create_arms: redis::Script::new(CREATE_ARMS),
            incr_impression: redis::Script::new(INCR_IMPRESSION),
            incr_conversion: redis::Script::new(INCR_CONVERSION),
        })
    }

    /// Run `f` on the shared connection, reconnecting first if the previous
    /// one was dropped after an I/O failure.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> RedisResult<T>,
    ) -> StorageResult<T> {
        let mut slot = self.conn.lock();
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!("Reopening Redis connection");
                self.client.get_connection().map_err(backend)?
            }
        };
        let result = f(&mut conn);
        match &result {
            Err(err) if is_broken_connection(err) => {
                warn!(error = %err, "Dropping broken Redis connection");
            }
            _ => *slot = Some(conn),
        }
        result.map_err(backend)
    }

    fn test_key(&self, test_id: &str) -> String {
        test_key(&self.prefix, test_id)
    }

    fn arm_key(&self, arm_id: Uuid) -> String {
        arm_key(&self.prefix, arm_id)
    }
}

fn test_key(prefix: &str, test_id: &str) -> String {
    format!("{prefix}:test:{test_id}")
}

fn arm_key(prefix: &str, arm_id: Uuid) -> String {
    format!("{prefix}:arm:{arm_id}")
}

fn backend(err: RedisError) -> StorageError {
    StorageError::Backend(err.into())
}

/// Errors after which the connection can no longer be trusted. The failed
/// command is not retried, since an increment may already have applied.
fn is_broken_connection(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> StorageResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StorageError::Corrupt(format!("missing field `{name}`")))
}

fn parse_field<T: std::str::FromStr>(fields: &HashMap<String, String>, name: &str) -> StorageResult<T> {
    let raw = field(fields, name)?;
    raw.parse()
        .map_err(|_| StorageError::Corrupt(format!("field `{name}` has bad value `{raw}`")))
}

/// Rebuild an [`Arm`] from its Redis hash.
fn arm_from_fields(fields: &HashMap<String, String>) -> StorageResult<Arm> {
    let weight = match field(fields, "weight")? {
        "" => None,
        _ => Some(parse_field::<f64>(fields, "weight")?),
    };
    let created_at_raw = field(fields, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(created_at_raw)
        .map_err(|_| StorageError::Corrupt(format!("bad created_at `{created_at_raw}`")))?
        .with_timezone(&Utc);

    Ok(Arm {
        id: parse_field(fields, "id")?,
        test_id: field(fields, "test_id")?.to_string(),
        name: field(fields, "name")?.to_string(),
        impressions: parse_field(fields, "impressions")?,
        conversions: parse_field(fields, "conversions")?,
        revenue: parse_field(fields, "revenue")?,
        weight,
        created_at,
    })
}

impl ArmStore for RedisArmStore {
    fn load_arms(&self, test_id: &str) -> StorageResult<Vec<Arm>> {
        let hashes: Vec<HashMap<String, String>> = self.with_connection(|conn| {
            let ids: Vec<String> = conn.lrange(self.test_key(test_id), 0, -1)?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut pipe = redis::pipe();
            for id in &ids {
                pipe.hgetall(format!("{}:arm:{id}", self.prefix));
            }
            pipe.query(conn)
        })?;
        hashes.iter().map(arm_from_fields).collect()
    }

    fn create_arms(&self, test_id: &str, arms: Vec<Arm>) -> StorageResult<Vec<Arm>> {
        if arms.is_empty() {
            return Ok(Vec::new());
        }

        let mut invocation = self.create_arms.key(self.test_key(test_id));
        invocation.arg(&self.prefix);
        for arm in &arms {
            invocation
                .arg(arm.id.to_string())
                .arg(&arm.test_id)
                .arg(&arm.name)
                .arg(arm.weight.map(|w| w.to_string()).unwrap_or_default())
                .arg(arm.created_at.to_rfc3339());
        }
        let created: i64 = self.with_connection(|conn| invocation.invoke(conn))?;
        if created == 0 {
            return Err(StorageError::TestExists(test_id.to_string()));
        }

        debug!(test_id = %test_id, arms = arms.len(), "Arms written to Redis");
        Ok(arms)
    }

    fn increment_impression(&self, arm_id: Uuid) -> StorageResult<()> {
        let found: i64 = self.with_connection(|conn| {
            self.incr_impression.key(self.arm_key(arm_id)).invoke(conn)
        })?;
        if found == 0 {
            return Err(StorageError::ArmNotFound(arm_id));
        }
        Ok(())
    }

    fn increment_conversion(&self, arm_id: Uuid, revenue: f64) -> StorageResult<()> {
        let found: i64 = self.with_connection(|conn| {
            self.incr_conversion
                .key(self.arm_key(arm_id))
                .arg(revenue)
                .invoke(conn)
        })?;
        if found == 0 {
            return Err(StorageError::ArmNotFound(arm_id));
        }
        Ok(())
    }

    fn get_arm(&self, arm_id: Uuid) -> StorageResult<Option<Arm>> {
        let fields: HashMap<String, String> =
            self.with_connection(|conn| conn.hgetall(self.arm_key(arm_id)))?;
        if fields.is_empty() {
            return Ok(None);
        }
        arm_from_fields(&fields).map(Some)
    }
}
