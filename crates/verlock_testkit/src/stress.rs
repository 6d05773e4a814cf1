//! Stress helpers for concurrent read-modify-write.
//!
//! Each worker thread opens its own session and repeatedly adds one to an
//! account balance. A run that loses no updates ends with the balance
//! increased by exactly `threads * increments`.

use crate::fixtures::TestEnv;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use verlock_core::{CoreResult, EntityId, LockMode, Session};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Increments that were persisted.
    pub committed: usize,
    /// Attempts that had to be retried (lock unavailable or conflict).
    pub retries: usize,
    /// Increments given up after exhausting retries.
    pub abandoned: usize,
    /// Balance read back after the run.
    pub final_balance: i64,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed: {}", self.committed);
        println!("Retries: {}", self.retries);
        println!("Abandoned: {}", self.abandoned);
        println!("Final balance: {}", self.final_balance);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent sessions, one per thread.
    pub threads: usize,
    /// Increments each thread performs.
    pub increments: usize,
    /// Attempts per increment before giving up.
    pub max_attempts: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            increments: 50,
            max_attempts: 100_000,
        }
    }
}

/// Outcome of one increment attempt.
enum Attempt {
    Done,
    Retry,
}

/// Increments the balance under a write lock taken before loading.
///
/// Requires an environment that enforces write locks.
pub fn stress_pessimistic_increments(
    env: &TestEnv,
    account: EntityId,
    config: &StressConfig,
) -> StressTestResult {
    run(env, account, config, pessimistic_increment)
}

/// Increments the balance relying on the version token alone, retrying on
/// concurrency conflicts.
///
/// Requires an environment with advisory locks, see [`TestEnv::advisory`].
pub fn stress_optimistic_increments(
    env: &TestEnv,
    account: EntityId,
    config: &StressConfig,
) -> StressTestResult {
    run(env, account, config, optimistic_increment)
}

fn pessimistic_increment(env: &TestEnv, session: &Session, id: EntityId) -> CoreResult<Attempt> {
    if !session.lock_manager().get_lock(id, LockMode::Write) {
        return Ok(Attempt::Retry);
    }
    let mapper = env.accounts();
    let Some(account) = mapper.find(session, id)? else {
        session.lock_manager().release_lock(id);
        return Ok(Attempt::Retry);
    };
    account.write().balance += 1;
    let saved = mapper.update(session, &account);
    mapper.release(session, &account);
    saved.map(|()| Attempt::Done)
}

fn optimistic_increment(env: &TestEnv, session: &Session, id: EntityId) -> CoreResult<Attempt> {
    let mapper = env.accounts();
    let Some(account) = mapper.find(session, id)? else {
        return Ok(Attempt::Retry);
    };
    account.write().balance += 1;
    let saved = mapper.update(session, &account);
    mapper.release(session, &account);
    match saved {
        Ok(()) => Ok(Attempt::Done),
        Err(e) if e.is_conflict() => Ok(Attempt::Retry),
        Err(e) => Err(e),
    }
}

fn run(
    env: &TestEnv,
    account: EntityId,
    config: &StressConfig,
    increment: fn(&TestEnv, &Session, EntityId) -> CoreResult<Attempt>,
) -> StressTestResult {
    let committed = AtomicUsize::new(0);
    let retries = AtomicUsize::new(0);
    let abandoned = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for worker in 0..config.threads {
            let (committed, retries, abandoned) = (&committed, &retries, &abandoned);
            scope.spawn(move || {
                let session = env.session(&format!("User{}", worker + 1));
                for _ in 0..config.increments {
                    let mut done = false;
                    for _ in 0..config.max_attempts {
                        match increment(env, &session, account) {
                            Ok(Attempt::Done) => {
                                done = true;
                                break;
                            }
                            Ok(Attempt::Retry) => {
                                retries.fetch_add(1, Ordering::Relaxed);
                                thread::yield_now();
                            }
                            Err(e) => panic!("increment failed: {e}"),
                        }
                    }
                    if done {
                        committed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        abandoned.fetch_add(1, Ordering::Relaxed);
                    }
                }
                env.close(session.id()).expect("Failed to close worker session");
            });
        }
    });
    let duration = start.elapsed();

    StressTestResult {
        committed: committed.into_inner(),
        retries: retries.into_inner(),
        abandoned: abandoned.into_inner(),
        final_balance: read_balance(env, account),
        duration,
    }
}

/// Reads an account balance through a fresh session.
pub fn read_balance(env: &TestEnv, account: EntityId) -> i64 {
    let session = env.session("Auditor");
    let balance = env
        .accounts()
        .find(&session, account)
        .expect("Failed to read account")
        .map(|found| found.read().balance)
        .expect("Account is locked by another session");
    env.close(session.id()).expect("Failed to close auditor session");
    balance
}
