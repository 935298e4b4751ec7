// Redis key layout, one namespace per queue

/// Prefix shared with the web application's producers
pub const KEY_PREFIX: &str = "clarity";

/// Keys of one queue
///
/// - `wait`      list, producers LPUSH, consumers pop from the right
/// - `active`    list of reserved ids
/// - `delayed`   sorted set, score = run-at epoch ms
/// - `completed` / `failed` capped lists, newest first
/// - `stalled`   hash id -> times the lock expired
/// - `job:{id}` JSON document, `job:{id}:lock` reservation token with TTL
#[derive(Debug, Clone)]
pub struct QueueKeys {
    base: String,
}

impl QueueKeys {
    pub fn new(queue: &str) -> Self {
        Self {
            base: format!("{}:{}", KEY_PREFIX, queue),
        }
    }

    pub fn wait(&self) -> String {
        format!("{}:wait", self.base)
    }

    pub fn active(&self) -> String {
        format!("{}:active", self.base)
    }

    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.base)
    }

    pub fn completed(&self) -> String {
        format!("{}:completed", self.base)
    }

    pub fn failed(&self) -> String {
        format!("{}:failed", self.base)
    }

    pub fn stalled(&self) -> String {
        format!("{}:stalled", self.base)
    }

    /// Prefix that scripts concatenate with an id
    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.base)
    }

    pub fn job(&self, id: &str) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    pub fn lock(&self, id: &str) -> String {
        format!("{}:lock", self.job(id))
    }
}
