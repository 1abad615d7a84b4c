//! Redis-backed job store for state that survives restarts.
//!
//! Layout:
//! - `<prefix>:job:<id>` holds the job as JSON
//! - `<prefix>:jobs` is a set of every job id
//!
//! Transitions are optimistic: read, apply, then compare-and-set through a
//! Lua script, retrying when another writer got there first.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};
use vidlens_models::{Job, JobId, Transition};

use crate::error::{JobsError, JobsResult};
use crate::store::JobStore;

const MAX_CAS_ATTEMPTS: u32 = 5;

const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Job store over Redis.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
    cas: Script,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> JobsResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| JobsError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            cas: Script::new(COMPARE_AND_SET),
        })
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs", self.key_prefix)
    }

    async fn conn(&self) -> JobsResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: Job) -> JobsResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(self.job_key(&job.id))
            .arg(&payload)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            return Err(JobsError::AlreadyExists(job.id));
        }

        let _: () = conn.sadd(self.index_key(), job.id.as_str()).await?;
        debug!(job_id = %job.id, "Stored job in Redis");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(self.job_key(id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(JobsError::from))
            .transpose()
    }

    async fn transition(&self, id: &JobId, transition: Transition) -> JobsResult<Job> {
        let mut conn = self.conn().await?;
        let key = self.job_key(id);

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current: Option<String> = conn.get(&key).await?;
            let current = current.ok_or_else(|| JobsError::NotFound(id.clone()))?;

            let mut job: Job = serde_json::from_str(&current)?;
            job.apply(transition.clone())
                .map_err(|e| JobsError::transition(id, e))?;
            let updated = serde_json::to_string(&job)?;

            let swapped: i32 = self
                .cas
                .key(&key)
                .arg(&current)
                .arg(&updated)
                .invoke_async(&mut conn)
                .await?;
            if swapped == 1 {
                return Ok(job);
            }
            warn!(job_id = %id, attempt, "Job changed concurrently, retrying transition");
        }

        Err(JobsError::Conflict(id.clone()))
    }

    async fn remove(&self, id: &JobId) -> JobsResult<Option<Job>> {
        let existing = self.get(id).await?;
        let mut conn = self.conn().await?;
        let _: () = conn.del(self.job_key(id)).await?;
        let _: () = conn.srem(self.index_key(), id.as_str()).await?;
        Ok(existing)
    }

    async fn list(&self) -> JobsResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(self.index_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.job_key(&JobId::from_string(id.as_str())))
            .collect();
        let payloads: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            jobs.push(serde_json::from_str(&payload)?);
        }
        Ok(jobs)
    }

    async fn len(&self) -> JobsResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.scard(self.index_key()).await?)
    }

    async fn ping(&self) -> JobsResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
