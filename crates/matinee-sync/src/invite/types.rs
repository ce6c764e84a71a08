//! Configuration for the invite coordinator.

use std::time::Duration;

/// Whether an invitee's acceptance flag survives a leave/rejoin cycle.
///
/// A departure already deletes the active invite, so retained flags only
/// matter when evaluation races a departure; `Retain` matches the observed
/// behavior of the system this replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptancePolicy {
    /// Accepted-before-leaving still counts while the user is a member at
    /// evaluation time.
    #[default]
    Retain,
    /// Departures scrub the leaver's acceptance flag from the invite.
    ClearOnLeave,
}

#[derive(Debug, Clone)]
pub struct InviteConfig {
    /// Invite lifetime.
    pub ttl_ms: u64,
    /// How often the expiry sweep re-reads the invite.
    pub sweep_interval: Duration,
    /// Delay before the post-departure population check.
    pub population_check_delay: Duration,
    pub acceptance_policy: AcceptancePolicy,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 120_000,
            sweep_interval: Duration::from_secs(5),
            population_check_delay: Duration::from_millis(1_500),
            acceptance_policy: AcceptancePolicy::default(),
        }
    }
}
