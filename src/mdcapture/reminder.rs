//! Periodic capture reminders.
//!
//! [`ReminderScheduler`] decides, for one wall-clock minute, whether a
//! reminder is due. [`spawn_reminders`] runs it in a tokio task that wakes on
//! every minute boundary until stopped.

use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike};
use serde::{Serialize, Deserialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::placeholder::Clock;
use crate::store::{Settings, SettingsStore};
use crate::{specific_fail, specific_fail_str};

pub const DEFAULT_REMINDER_TEXT: &str = "Time to capture a note";
pub const APP_TITLE: &str = "mdcapture";
const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSchedule {
    pub enabled: bool,
    pub text: String,
    pub interval_minutes: u32,
    /// "HH:MM"
    pub start_time: String,
    /// "HH:MM"; earlier than `start_time` means the window runs overnight.
    pub end_time: String,
}

impl Default for ReminderSchedule {
    fn default() -> Self {
        ReminderSchedule {
            enabled: false,
            text: DEFAULT_REMINDER_TEXT.to_string(),
            interval_minutes: 60,
            start_time: "09:00".to_string(),
            end_time: "21:00".to_string(),
        }
    }
}

impl ReminderSchedule {
    pub fn validate(&self) -> Result<()> {
        self.window().map(|_| ())
    }

    pub fn window(&self) -> Result<Window> {
        if self.interval_minutes == 0 {
            return specific_fail_str!("reminder interval must be a positive number of minutes");
        }
        Ok(Window {
            start: self.start_time.parse()?,
            end: self.end_time.parse()?,
            interval: self.interval_minutes,
        })
    }
}

impl fmt::Display for ReminderSchedule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "enabled: {}", self.enabled)?;
        writeln!(f, "text: {}", self.text)?;
        writeln!(f, "interval: {} min", self.interval_minutes)?;
        write!(f, "window: {} - {}", self.start_time, self.end_time)
    }
}

/// A time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u16, minute: u16) -> Option<TimeOfDay> {
        if hour < 24 && minute < 60 {
            Some(TimeOfDay(hour * 60 + minute))
        } else {
            None
        }
    }

    pub fn of(t: &NaiveDateTime) -> TimeOfDay {
        // hour() < 24 and minute() < 60 always hold
        TimeOfDay((t.hour() * 60 + t.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<TimeOfDay> {
        let parsed = s.trim().split_once(':').and_then(|(h, m)| {
            if h.is_empty() || m.len() != 2 {
                return None;
            }
            TimeOfDay::new(h.parse().ok()?, m.parse().ok()?)
        });
        match parsed {
            Some(t) => Ok(t),
            None => specific_fail!(format!("invalid time '{}', expected HH:MM", s)),
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// A parsed reminder window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub interval: u32,
}

impl Window {
    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, now: TimeOfDay) -> bool {
        if self.is_overnight() {
            now >= self.start || now <= self.end
        } else {
            self.start <= now && now <= self.end
        }
    }

    /// `(now - start) mod interval == 0`, counting across midnight.
    pub fn is_aligned(&self, now: TimeOfDay) -> bool {
        let since_start = (now.0 + MINUTES_PER_DAY - self.start.0) % MINUTES_PER_DAY;
        u32::from(since_start) % self.interval == 0
    }

    pub fn is_due(&self, now: TimeOfDay) -> bool {
        self.contains(now) && self.is_aligned(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// Disabled, misconfigured, or outside the window.
    Idle,
    /// Enabled and inside the window.
    Armed,
}

/// One reminder to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub text: String,
    /// The minute it fired for (seconds zeroed).
    pub at: NaiveDateTime,
}

/// Decides per minute whether to fire; fires at most once per minute.
#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    state: ReminderState,
    last_fired: Option<NaiveDateTime>,
}

impl ReminderScheduler {
    /// `last_fired` comes from a previous run so a restart does not repeat it.
    pub fn new(last_fired: Option<NaiveDateTime>) -> ReminderScheduler {
        ReminderScheduler {
            state: ReminderState::Idle,
            last_fired,
        }
    }

    pub fn state(&self) -> ReminderState {
        self.state
    }

    pub fn last_fired(&self) -> Option<NaiveDateTime> {
        self.last_fired
    }

    /// Evaluate local time `now` against `schedule`.
    pub fn tick(&mut self, schedule: &ReminderSchedule, now: NaiveDateTime) -> Option<Reminder> {
        let minute = truncate_to_minute(now);
        if !schedule.enabled {
            self.state = ReminderState::Idle;
            return None;
        }
        let window = match schedule.window() {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "reminder schedule is invalid");
                self.state = ReminderState::Idle;
                return None;
            }
        };
        let tod = TimeOfDay::of(&minute);
        if !window.contains(tod) {
            self.state = ReminderState::Idle;
            return None;
        }
        self.state = ReminderState::Armed;
        if !window.is_aligned(tod) {
            return None;
        }
        if self.last_fired == Some(minute) {
            debug!(minute = %minute, "reminder already fired this minute");
            return None;
        }
        self.last_fired = Some(minute);
        Some(Reminder {
            text: schedule.text.clone(),
            at: minute,
        })
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Time left until the next `:00` second.
pub fn until_next_minute(now: &DateTime<FixedOffset>) -> Duration {
    // leap seconds report nanos past 1e9
    let millis_into_minute = u64::from(now.second()) * 1000 + u64::from((now.nanosecond() / 1_000_000).min(999));
    Duration::from_millis(60_000u64.saturating_sub(millis_into_minute).max(1))
}

/// Delivers a fired reminder to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, reminder: &Reminder) -> Result<()>;
}

/// Prints reminders on stdout.
#[derive(Debug, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, reminder: &Reminder) -> Result<()> {
        println!("[{}] {}", reminder.at.format("%H:%M"), reminder.text);
        Ok(())
    }
}

/// Runs a program such as `notify-send` with the title and text appended.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// Split a command line on whitespace; `None` if it is blank.
    pub fn parse(command: &str) -> Option<CommandNotifier> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(CommandNotifier {
            program,
            args: parts.collect(),
        })
    }
}

/// The program is started and left to run; its exit status is logged from a
/// separate task so a slow notifier never holds up the loop.
impl Notifier for CommandNotifier {
    fn notify(&self, reminder: &Reminder) -> Result<()> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return specific_fail_str!("the command notifier must run inside a tokio runtime"),
        };
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(APP_TITLE)
            .arg(&reminder.text)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to run '{}': {}", self.program, e))?;
        let program = self.program.clone();
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(program = %program, "notifier finished"),
                Ok(status) => warn!(program = %program, status = %status, "notifier failed"),
                Err(e) => warn!(program = %program, error = %e, "could not wait for notifier"),
            }
        });
        Ok(())
    }
}

/// Where the loop reads its schedule from on every iteration.
pub trait ScheduleSource: Send {
    fn schedule(&mut self) -> Result<ReminderSchedule>;

    fn last_fired(&mut self) -> Result<Option<NaiveDateTime>> {
        Ok(None)
    }

    fn record_fired(&mut self, _minute: NaiveDateTime) -> Result<()> {
        Ok(())
    }
}

/// In-process settings updates from [`SettingsStore::subscribe`].
impl ScheduleSource for watch::Receiver<Settings> {
    fn schedule(&mut self) -> Result<ReminderSchedule> {
        Ok(self.borrow_and_update().reminder.clone())
    }
}

/// Re-reads the preferences file each minute and persists the last-fired minute.
impl ScheduleSource for SettingsStore {
    fn schedule(&mut self) -> Result<ReminderSchedule> {
        if self.reload()? {
            info!("reminder settings reloaded");
        }
        Ok(self.reminder().clone())
    }

    fn last_fired(&mut self) -> Result<Option<NaiveDateTime>> {
        Ok(self.last_reminder_fired())
    }

    fn record_fired(&mut self, minute: NaiveDateTime) -> Result<()> {
        self.record_reminder_fired(minute)
    }
}

/// Handle to a running reminder loop.
pub struct ReminderHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReminderHandle {
    /// Ask the loop to stop; an in-flight sleep is cut short.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) => specific_fail!(format!("reminder loop failed: {}", e)),
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

/// Start the reminder loop on the current tokio runtime.
pub fn spawn_reminders<S, N>(source: S, notifier: N, clock: Arc<dyn Clock>) -> ReminderHandle
where
    S: ScheduleSource + 'static,
    N: Notifier + 'static,
{
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_loop(source, notifier, clock, stop_rx));
    ReminderHandle { stop, task }
}

async fn run_loop<S, N>(source: S, notifier: N, clock: Arc<dyn Clock>, mut stop: watch::Receiver<bool>)
where
    S: ScheduleSource + 'static,
    N: Notifier + 'static,
{
    // sources and notifiers may block (file I/O, user code), so they run on
    // the blocking pool and the loop itself only ever awaits
    let source = Arc::new(Mutex::new(source));
    let notifier = Arc::new(notifier);

    let last_fired = blocking(&source, |s| s.last_fired()).await.unwrap_or_else(|e| {
        warn!(error = %e, "could not read last reminder time");
        None
    });
    let mut scheduler = ReminderScheduler::new(last_fired);
    info!("reminder loop started");

    loop {
        if *stop.borrow() {
            break;
        }
        let now = clock.now().naive_local();
        tokio::select! {
            _ = tick_once(&source, &notifier, &mut scheduler, now) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }

        let wait = until_next_minute(&clock.now());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    info!("reminder loop stopped");
}

async fn tick_once<S, N>(
    source: &Arc<Mutex<S>>,
    notifier: &Arc<N>,
    scheduler: &mut ReminderScheduler,
    now: NaiveDateTime,
) where
    S: ScheduleSource + 'static,
    N: Notifier + 'static,
{
    let schedule = match blocking(source, |s| s.schedule()).await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(error = %e, "could not read reminder schedule");
            return;
        }
    };
    let before = scheduler.state();
    if let Some(reminder) = scheduler.tick(&schedule, now) {
        info!(at = %reminder.at, "reminder fired");
        let at = reminder.at;
        let target = notifier.clone();
        match tokio::task::spawn_blocking(move || target.notify(&reminder)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "reminder notification failed"),
            Err(e) => warn!(error = %e, "reminder notifier panicked"),
        }
        if let Err(e) = blocking(source, move |s| s.record_fired(at)).await {
            warn!(error = %e, "could not record reminder time");
        }
    }
    if scheduler.state() != before {
        debug!(state = ?scheduler.state(), "reminder state changed");
    }
}

async fn blocking<S, T, F>(source: &Arc<Mutex<S>>, f: F) -> Result<T>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T> + Send + 'static,
{
    let source = source.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = match source.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => specific_fail!(format!("reminder source task failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: &str, end: &str, interval: u32) -> Window {
        Window {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            interval,
        }
    }

    #[test]
    fn parses_times() {
        assert_eq!("09:05".parse::<TimeOfDay>().unwrap().minutes(), 545);
        assert_eq!("9:05".parse::<TimeOfDay>().unwrap().to_string(), "09:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("12".parse::<TimeOfDay>().is_err());
        assert!("12:5".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn daytime_window_is_inclusive() {
        let w = window("09:00", "21:00", 60);
        assert!(w.contains("09:00".parse().unwrap()));
        assert!(w.contains("21:00".parse().unwrap()));
        assert!(!w.contains("08:59".parse().unwrap()));
        assert!(!w.contains("21:01".parse().unwrap()));
    }

    #[test]
    fn overnight_window_wraps() {
        let w = window("22:00", "02:00", 30);
        assert!(w.is_overnight());
        assert!(w.contains("23:59".parse().unwrap()));
        assert!(w.contains("00:00".parse().unwrap()));
        assert!(w.contains("02:00".parse().unwrap()));
        assert!(!w.contains("02:01".parse().unwrap()));
        assert!(!w.contains("21:59".parse().unwrap()));
        assert!(w.is_aligned("00:30".parse().unwrap()));
        assert!(!w.is_aligned("00:15".parse().unwrap()));
    }

    #[test]
    fn alignment_counts_from_start() {
        let w = window("09:10", "12:00", 45);
        assert!(w.is_due("09:10".parse().unwrap()));
        assert!(w.is_due("09:55".parse().unwrap()));
        assert!(!w.is_due("10:00".parse().unwrap()));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let s = ReminderSchedule { interval_minutes: 0, ..Default::default() };
        assert!(s.validate().is_err());
        let s = ReminderSchedule { start_time: "nine".to_string(), ..Default::default() };
        assert!(s.validate().is_err());
        assert!(ReminderSchedule::default().validate().is_ok());
    }

    #[test]
    fn sleeps_to_the_minute_boundary() {
        let now = DateTime::parse_from_rfc3339("2024-01-01T10:00:45.250+00:00").unwrap();
        assert_eq!(until_next_minute(&now), Duration::from_millis(14_750));
        let now = DateTime::parse_from_rfc3339("2024-01-01T10:00:00+00:00").unwrap();
        assert_eq!(until_next_minute(&now), Duration::from_secs(60));
    }

    #[test]
    fn command_notifier_parsing() {
        assert!(CommandNotifier::parse("   ").is_none());
        let outside = CommandNotifier::parse("true").unwrap();
        let reminder = Reminder { text: "x".to_string(), at: chrono::NaiveDateTime::default() };
        assert!(outside.notify(&reminder).is_err());
        let n = CommandNotifier::parse("notify-send -u critical").unwrap();
        assert_eq!(n.program, "notify-send");
        assert_eq!(n.args, vec!["-u", "critical"]);
    }
}
