use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct RaftOptions {
    pub heartbeat_interval: Option<Duration>,
    pub election_timeout_min: Option<Duration>,
    pub election_timeout_max: Option<Duration>,
    pub append_timeout: Option<Duration>,
    pub join_retry_interval: Option<Duration>,
    pub tick_interval: Option<Duration>,
    pub max_entries_per_append: Option<u64>,
    /// Take a snapshot every this many applied entries. `None` means only on demand.
    pub snapshot_threshold: Option<u64>,
}

#[derive(Clone, Debug)]
pub(crate) struct RaftOptionsValidated {
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub append_timeout: Duration,
    pub join_retry_interval: Duration,
    pub tick_interval: Duration,
    pub max_entries_per_append: u64,
    pub snapshot_threshold: Option<u64>,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err("Minimum election timeout must be greater than leader's heartbeat");
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err("Minimum election timeout must be less than maximum timeout");
        }
        if self.append_timeout >= self.election_timeout_min {
            return Err("Leader's append timeout must be less than the minimum election timeout");
        }
        if self.tick_interval > self.heartbeat_interval {
            return Err("Tick interval must not exceed the leader's heartbeat");
        }
        if self.tick_interval == Duration::from_millis(0) {
            return Err("Tick interval must be positive");
        }
        if self.max_entries_per_append == 0 {
            return Err("At least one entry must fit in an append request");
        }
        if self.snapshot_threshold == Some(0) {
            return Err("Snapshot threshold must be positive when set");
        }

        Ok(())
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let values = RaftOptionsValidated {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_millis(100)),
            election_timeout_min: options.election_timeout_min.unwrap_or(Duration::from_millis(500)),
            election_timeout_max: options.election_timeout_max.unwrap_or(Duration::from_millis(1500)),
            append_timeout: options.append_timeout.unwrap_or(Duration::from_millis(300)),
            join_retry_interval: options.join_retry_interval.unwrap_or(Duration::from_millis(500)),
            tick_interval: options.tick_interval.unwrap_or(Duration::from_millis(25)),
            max_entries_per_append: options.max_entries_per_append.unwrap_or(64),
            snapshot_threshold: options.snapshot_threshold,
        };

        values.validate()?;
        Ok(values)
    }
}
