//! Scheduler: one-shot timers and cron jobs scoped to a single agent
//! (§4.12).
//!
//! Both timer kinds work the same way: a spawned task sleeps until the
//! fire time, then posts a signal into the owning agent's own mailbox via
//! the sender the agent handed the scheduler at construction time. Cron
//! jobs additionally reschedule themselves after every tick, so the
//! scheduler never needs a background "driver" loop of its own.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::directive::normalize_cron;
use crate::error::{JidoError, Result};
use crate::signal::Signal;

/// The subset of an agent server's mailbox message type the scheduler
/// needs to post into; kept generic so `jido-core` doesn't need to know
/// about the rest of the agent server's message enum.
pub trait SchedulerMessage: Send + 'static {
    fn from_signal(signal: Signal) -> Self;
}

/// Per-agent timer/cron registry. Cancels every outstanding handle when
/// dropped (agent shutdown cancels timers and cron jobs per §4.10).
pub struct AgentScheduler<M: SchedulerMessage> {
    timers: HashMap<String, JoinHandle<()>>,
    cron_jobs: HashMap<String, JoinHandle<()>>,
    sender: UnboundedSender<M>,
    next_timer_seq: u64,
}

impl<M: SchedulerMessage> AgentScheduler<M> {
    pub fn new(sender: UnboundedSender<M>) -> Self {
        Self {
            timers: HashMap::new(),
            cron_jobs: HashMap::new(),
            sender,
            next_timer_seq: 0,
        }
    }

    /// Schedule `message` to be delivered after `delay_ms`. Returns an
    /// opaque handle id usable to cancel it.
    pub fn schedule_once(&mut self, delay_ms: u64, message: Signal) -> String {
        let handle_id = format!("timer-{}", self.next_timer_seq);
        self.next_timer_seq += 1;
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            let _ = sender.send(M::from_signal(message));
        });
        self.timers.insert(handle_id.clone(), task);
        handle_id
    }

    pub fn cancel_timer(&mut self, handle_id: &str) {
        if let Some(task) = self.timers.remove(handle_id) {
            task.abort();
        }
    }

    /// Register (or replace) a recurring cron job. The expression is
    /// parsed once here; a malformed expression is rejected immediately
    /// rather than discovered on first tick.
    pub fn register_cron(
        &mut self,
        job_id: impl Into<String>,
        cron_expr: &str,
        message: Signal,
    ) -> Result<()> {
        let job_id = job_id.into();
        let schedule = Schedule::from_str(&normalize_cron(cron_expr))
            .map_err(|e| JidoError::validation(format!("invalid cron expression '{cron_expr}': {e}")))?;
        self.cancel_cron(&job_id);
        let sender = self.sender.clone();
        let job_id_for_task = job_id.clone();
        let task = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = match schedule.after(&now).next() {
                    Some(next) => next,
                    None => break,
                };
                let delay = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(delay).await;
                let mut tagged = message.clone();
                tagged
                    .extensions
                    .insert("cron_job_id".to_string(), serde_json::json!(job_id_for_task));
                if sender.send(M::from_signal(tagged)).is_err() {
                    break;
                }
            }
        });
        self.cron_jobs.insert(job_id, task);
        Ok(())
    }

    pub fn cancel_cron(&mut self, job_id: &str) {
        if let Some(task) = self.cron_jobs.remove(job_id) {
            task.abort();
        }
    }

    /// Cancel every outstanding timer and cron job.
    pub fn cancel_all(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
        for (_, task) in self.cron_jobs.drain() {
            task.abort();
        }
    }
}

impl<M: SchedulerMessage> Drop for AgentScheduler<M> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct TestMessage(Signal);
    impl SchedulerMessage for TestMessage {
        fn from_signal(signal: Signal) -> Self {
            TestMessage(signal)
        }
    }

    fn test_signal() -> Signal {
        Signal::new(crate::id::Id::nil(), "timer.tick", "scheduler", json!({})).unwrap()
    }

    #[tokio::test]
    async fn one_shot_timer_delivers_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TestMessage>();
        let mut scheduler = AgentScheduler::new(tx);
        scheduler.schedule_once(5, test_signal());
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(received.is_some());
    }

    #[tokio::test]
    async fn cancelled_timer_never_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TestMessage>();
        let mut scheduler = AgentScheduler::new(tx);
        let handle = scheduler.schedule_once(200, test_signal());
        scheduler.cancel_timer(&handle);
        let result = tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not deliver");
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel::<TestMessage>();
        let mut scheduler = AgentScheduler::new(tx);
        assert!(scheduler
            .register_cron("hb", "not a cron", test_signal())
            .is_err());
    }

    #[tokio::test]
    async fn registering_same_job_id_replaces_prior_job() {
        let (tx, _rx) = mpsc::unbounded_channel::<TestMessage>();
        let mut scheduler = AgentScheduler::new(tx);
        scheduler
            .register_cron("hb", "* * * * * *", test_signal())
            .unwrap();
        assert!(scheduler
            .register_cron("hb", "* * * * * *", test_signal())
            .is_ok());
        assert_eq!(scheduler.cron_jobs.len(), 1);
    }
}
