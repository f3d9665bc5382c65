//! Daily scheduled run
//!
//! A one-minute tokio interval checks the local clock. Once a day, on the
//! first tick at or after the configured time, the configured command is
//! queued as an [`InboundEvent`] and goes through dispatch like any message.
//! A process started after today's time waits for tomorrow.

use crate::config::ScheduleConfig;
use crate::ingestion::{Channel, InboundEvent};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use sdk::EngineError;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Sender id of scheduled events
pub const SCHEDULER_SENDER: &str = "scheduler";

/// Clock check interval
pub const TICK: Duration = Duration::from_secs(60);

/// Fires at most once per calendar day.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: NaiveTime,
    last_fired: Option<NaiveDate>,
}

impl DailySchedule {
    /// A schedule first checked at `now`.
    pub fn starting(at: NaiveTime, now: NaiveDateTime) -> Self {
        let last_fired = (now.time() >= at).then(|| now.date());
        Self { at, last_fired }
    }

    /// Whether the run is due at `now`; marks the day as done if so.
    pub fn due(&mut self, now: NaiveDateTime) -> bool {
        if now.time() < self.at || self.last_fired == Some(now.date()) {
            return false;
        }
        self.last_fired = Some(now.date());
        true
    }
}

pub struct Scheduler {
    schedule: DailySchedule,
    command: String,
    channel: Channel,
    reply_to: String,
    sink: mpsc::Sender<InboundEvent>,
}

impl Scheduler {
    /// # Errors
    /// `Config` if `daily_at` does not parse or the delivery target is
    /// missing.
    pub fn from_config(
        config: &ScheduleConfig,
        sink: mpsc::Sender<InboundEvent>,
        now: NaiveDateTime,
    ) -> Result<Self, EngineError> {
        let (Some(channel), Some(reply_to)) = (config.channel, config.reply_to.clone()) else {
            return Err(EngineError::Config(
                "schedule needs channel and reply_to".to_string(),
            ));
        };

        Ok(Self {
            schedule: DailySchedule::starting(config.time_of_day()?, now),
            command: config.command.clone(),
            channel,
            reply_to,
            sink,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn event(&self) -> InboundEvent {
        InboundEvent::new(
            self.channel,
            SCHEDULER_SENDER,
            self.reply_to.clone(),
            self.command.clone(),
        )
    }

    /// Queue the command if it is due at `now`. Returns whether it was
    /// queued.
    ///
    /// # Errors
    /// `Transport` once the dispatch queue is closed.
    pub async fn check(&mut self, now: NaiveDateTime) -> Result<bool, EngineError> {
        if !self.schedule.due(now) {
            return Ok(false);
        }

        info!(command = %self.command, channel = %self.channel, "Scheduled run queued");
        self.sink
            .send(self.event())
            .await
            .map_err(|_| EngineError::Transport("dispatch queue closed".to_string()))?;
        Ok(true)
    }

    /// Tick until the dispatch queue closes.
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(TICK);

        loop {
            timer.tick().await;

            if let Err(e) = self.check(Local::now().naive_local()).await {
                warn!(error = %e, "Scheduler stopped");
                return;
            }
        }
    }
}
