// Lua scripts for the multi-key moves that must be atomic

use redis::Script;

/// KEYS: wait, active
/// ARGV: job key prefix, lock token, lock ms
/// Returns the job document, or nil when the queue is empty
const RESERVE: &str = r#"
local id = redis.call('RPOPLPUSH', KEYS[1], KEYS[2])
if not id then
  return false
end
local doc = redis.call('GET', ARGV[1] .. id)
if not doc then
  redis.call('LREM', KEYS[2], 1, id)
  return false
end
redis.call('SET', ARGV[1] .. id .. ':lock', ARGV[2], 'PX', ARGV[3])
return doc
"#;

/// KEYS: lock
/// ARGV: lock token, lock ms
/// Returns 1 when the token still owns the lock
const EXTEND_LOCK: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

/// KEYS: lock, active, stalled, job, target (completed/failed list or delayed set)
/// ARGV: lock token, job id, job document, 'finish' | 'retry', retention ms
///       (finish) or run-at ms (retry), list length kept (finish)
/// Returns 0 and writes nothing when the token no longer owns the lock
const FINISH: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('LREM', KEYS[2], 0, ARGV[2])
redis.call('HDEL', KEYS[3], ARGV[2])
if ARGV[4] == 'retry' then
  redis.call('SET', KEYS[4], ARGV[3])
  redis.call('ZADD', KEYS[5], ARGV[5], ARGV[2])
else
  redis.call('SET', KEYS[4], ARGV[3], 'PX', ARGV[5])
  redis.call('LPUSH', KEYS[5], ARGV[2])
  redis.call('LTRIM', KEYS[5], 0, tonumber(ARGV[6]) - 1)
end
return 1
"#;

/// KEYS: delayed, wait
/// ARGV: now ms, batch limit
/// Returns the number of promoted ids
const PROMOTE: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('LPUSH', KEYS[2], id)
end
return #ids
"#;

/// KEYS: active, wait, failed, stalled
/// ARGV: job key prefix, max stalled count
/// Returns a flat list of id, 'requeued' | 'failed'
const RECOVER_STALLED: &str = r#"
local result = {}
local ids = redis.call('LRANGE', KEYS[1], 0, -1)
for _, id in ipairs(ids) do
  if redis.call('EXISTS', ARGV[1] .. id .. ':lock') == 0 then
    redis.call('LREM', KEYS[1], 1, id)
    local count = redis.call('HINCRBY', KEYS[4], id, 1)
    if count > tonumber(ARGV[2]) then
      redis.call('HDEL', KEYS[4], id)
      redis.call('LPUSH', KEYS[3], id)
      table.insert(result, id)
      table.insert(result, 'failed')
    else
      redis.call('RPUSH', KEYS[2], id)
      table.insert(result, id)
      table.insert(result, 'requeued')
    end
  end
end
return result
"#;

/// Compiled once per backend; invocation falls back to EVAL after a
/// script cache flush
pub(crate) struct Scripts {
    pub reserve: Script,
    pub extend_lock: Script,
    pub finish: Script,
    pub promote: Script,
    pub recover_stalled: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Self {
            reserve: Script::new(RESERVE),
            extend_lock: Script::new(EXTEND_LOCK),
            finish: Script::new(FINISH),
            promote: Script::new(PROMOTE),
            recover_stalled: Script::new(RECOVER_STALLED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_checks_owner_before_any_write() {
        let check = FINISH.find("redis.call('GET', KEYS[1]) ~= ARGV[1]").unwrap();
        for write in ["'DEL'", "'LREM'", "'HDEL'", "'SET'", "'ZADD'", "'LPUSH'"] {
            let at = FINISH.find(write).unwrap();
            assert!(check < at, "{} runs before the ownership check", write);
        }
    }
}
