/// Alert presentation: arbitrates the routine scanning screen against
/// time-critical alerts.
///
/// Two states. `Scanning` shows an animated status screen refreshed on a
/// fixed cadence. `Locked` shows an alert until its expiry; no scanning
/// refresh is drawn while locked.
///
/// Alerts are requested from the scan-callback context as well as the
/// control loop, but only the loop draws and only the loop clears an expired
/// lock. The lock is a single atomic deadline, so a request racing an expiry
/// clear always leaves the lock set: at worst one scanning frame is lost,
/// never an alert.
use core::cell::RefCell;
use core::fmt::Write;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::AlertTiming;
use crate::protocol::{Identifier, Label, NodeId};
use crate::stats::Stats;

/// One line of display text.
pub type Line = heapless::String<32>;

/// Number of text lines on every supported screen.
pub const SCREEN_LINES: usize = 4;

/// Up to four short lines of text. Empty lines are left blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    pub lines: [Line; SCREEN_LINES],
}

impl Screen {
    fn line(&mut self, idx: usize, args: core::fmt::Arguments<'_>) {
        let line = &mut self.lines[idx];
        line.clear();
        // Text that does not fit the line is dropped.
        let _ = line.write_fmt(args);
    }
}

/// Display collaborator. The core decides content and timing; the
/// implementation only draws.
pub trait StatusDisplay {
    fn render(&mut self, screen: &Screen);
}

/// For boards without a screen.
pub struct Headless;

impl StatusDisplay for Headless {
    fn render(&mut self, _screen: &Screen) {}
}

/// Buzzer pattern for an alert tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TonePattern {
    pub freq_hz: u32,
    pub beep_ms: u32,
    pub beeps: u8,
    pub gap_ms: u32,
}

pub const TRUE_HIT_TONE: TonePattern = TonePattern {
    freq_hz: 2000,
    beep_ms: 200,
    beeps: 3,
    gap_ms: 250,
};

pub const POSSIBLE_HIT_TONE: TonePattern = TonePattern {
    freq_hz: 1500,
    beep_ms: 300,
    beeps: 2,
    gap_ms: 500,
};

/// Where a true hit was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitSource {
    /// By this node, at the given uptime.
    Local { at_ms: u32 },
    /// By another node, relayed to us over the mesh.
    Mesh { node_id: NodeId },
}

/// Alert severity. A higher tier is never replaced by a lower one while it
/// is pending or holding the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Possible,
    True,
}

/// Alert content waiting to be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    TrueHit {
        identifier: Identifier,
        rssi: i16,
        source: HitSource,
    },
    PossibleHit {
        identifier: Identifier,
        rssi: i16,
        label: Label,
    },
}

impl Alert {
    pub fn tier(&self) -> Tier {
        match self {
            Alert::TrueHit { .. } => Tier::True,
            Alert::PossibleHit { .. } => Tier::Possible,
        }
    }

    pub fn tone(&self) -> TonePattern {
        match self {
            Alert::TrueHit { .. } => TRUE_HIT_TONE,
            Alert::PossibleHit { .. } => POSSIBLE_HIT_TONE,
        }
    }

    /// How long this alert holds the screen.
    pub fn lock_ms(&self, timing: &AlertTiming) -> u32 {
        match self {
            Alert::TrueHit { .. } => timing.true_hit_lock_ms,
            Alert::PossibleHit { .. } => timing.possible_hit_lock_ms,
        }
    }

    pub fn screen(&self) -> Screen {
        let mut s = Screen::default();
        match self {
            Alert::TrueHit {
                identifier,
                rssi,
                source,
            } => {
                s.line(0, format_args!("TRUE HIT!"));
                s.line(1, format_args!("{}", identifier));
                s.line(2, format_args!("RSSI: {} dBm", rssi));
                match source {
                    HitSource::Local { at_ms } => s.line(3, format_args!("Time: {}s", at_ms / 1000)),
                    HitSource::Mesh { node_id } => s.line(3, format_args!("From: {}", node_id)),
                }
            }
            Alert::PossibleHit {
                identifier,
                rssi,
                label,
            } => {
                s.line(0, format_args!("POSSIBLE HIT"));
                s.line(1, format_args!("{}", label));
                s.line(2, format_args!("{}", identifier));
                s.line(3, format_args!("RSSI: {} dBm", rssi));
            }
        }
        s
    }
}

/// `now` is at or past `deadline`, on a wrapping millisecond clock.
fn reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

const UNLOCKED: u32 = 0;

/// Flag plus deadline packed into one atomic: 0 means unlocked, anything
/// else is the expiry in uptime milliseconds.
#[derive(Debug, Default)]
pub struct AlertLock {
    expiry: AtomicU32,
}

impl AlertLock {
    pub const fn new() -> Self {
        Self {
            expiry: AtomicU32::new(UNLOCKED),
        }
    }

    /// Lock until `deadline`, or keep a later deadline already in place.
    pub fn lock_until(&self, deadline: u32) {
        // 0 is the unlocked sentinel; shift by a millisecond.
        let deadline = if deadline == UNLOCKED { 1 } else { deadline };
        let _ = self
            .expiry
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == UNLOCKED || !reached(current, deadline) {
                    Some(deadline)
                } else {
                    None
                }
            });
    }

    /// Clear the lock if it has expired at `now`. Returns true if it was
    /// cleared by this call. A deadline stored concurrently makes the clear
    /// fail, leaving the lock set.
    pub fn expire(&self, now: u32) -> bool {
        let current = self.expiry.load(Ordering::Acquire);
        if current == UNLOCKED || !reached(now, current) {
            return false;
        }
        self.expiry
            .compare_exchange(current, UNLOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn expiry(&self) -> Option<u32> {
        match self.expiry.load(Ordering::Acquire) {
            UNLOCKED => None,
            t => Some(t),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.expiry().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationState {
    Scanning,
    Locked { expiry: u32 },
}

/// Alert content not yet drawn, plus the tier of the alert that set the
/// current lock.
#[derive(Debug, Default)]
struct Slot {
    pending: Option<Alert>,
    holder: Option<Tier>,
}

/// Presentation state shared between the scan callback and the loop.
pub struct Presentation {
    timing: AlertTiming,
    lock: AlertLock,
    slot: Mutex<CriticalSectionRawMutex, RefCell<Slot>>,
}

impl Presentation {
    pub const fn new(timing: AlertTiming) -> Self {
        Self {
            timing,
            lock: AlertLock::new(),
            slot: Mutex::new(RefCell::new(Slot {
                pending: None,
                holder: None,
            })),
        }
    }

    pub fn timing(&self) -> &AlertTiming {
        &self.timing
    }

    /// Show `alert` as soon as the loop next ticks and hold the screen for
    /// the alert's tier duration from `now_ms`. Safe from any context.
    ///
    /// Returns false if a higher-tier alert is still pending or holding the
    /// screen; the request then leaves both content and lock untouched.
    pub fn request(&self, alert: Alert, now_ms: u32) -> bool {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            let tier = alert.tier();
            let outranked = match slot.holder {
                Some(holder) if holder > tier => {
                    slot.pending.is_some()
                        || self.lock.expiry().is_some_and(|e| !reached(now_ms, e))
                }
                _ => false,
            };
            if outranked {
                return false;
            }
            // Lock before publishing content, so the loop never draws the
            // alert and then a scanning frame over it.
            self.lock
                .lock_until(now_ms.wrapping_add(alert.lock_ms(&self.timing)));
            slot.holder = Some(tier);
            slot.pending = Some(alert);
            true
        })
    }

    pub fn state(&self) -> PresentationState {
        match self.lock.expiry() {
            Some(expiry) => PresentationState::Locked { expiry },
            None => PresentationState::Scanning,
        }
    }

    fn take_pending(&self) -> Option<Alert> {
        self.slot.lock(|slot| slot.borrow_mut().pending.take())
    }

    /// Clear an expired lock. Serialized with `request`, so a request never
    /// judges against a holder that is being released.
    fn expire(&self, now: u32) -> bool {
        self.slot.lock(|slot| {
            let cleared = self.lock.expire(now);
            if cleared {
                slot.borrow_mut().holder = None;
            }
            cleared
        })
    }
}

/// What the loop drew this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Render {
    Alert(Alert),
    Scanning(Screen),
}

impl Render {
    pub fn screen(&self) -> Screen {
        match self {
            Render::Alert(alert) => alert.screen(),
            Render::Scanning(screen) => screen.clone(),
        }
    }
}

/// Loop-owned half of the presentation: scanning animation and cadence.
#[derive(Debug, Clone)]
pub struct Presenter {
    refresh_ms: u32,
    last_refresh: Option<u32>,
    dots: u8,
}

impl Presenter {
    pub const fn new(refresh_ms: u32) -> Self {
        Self {
            refresh_ms,
            last_refresh: None,
            dots: 0,
        }
    }

    /// One presentation step: draw a newly requested alert, otherwise clear
    /// an expired lock, otherwise refresh the scanning screen if due.
    pub fn tick(&mut self, shared: &Presentation, stats: &Stats, now: u32) -> Option<Render> {
        if let Some(alert) = shared.take_pending() {
            return Some(Render::Alert(alert));
        }
        if shared.expire(now) {
            // Redraw the scanning screen right away after an alert.
            self.last_refresh = None;
        }
        self.refresh_scanning(shared, stats, now).map(Render::Scanning)
    }

    /// Routine scanning refresh. A no-op while an alert holds the screen or
    /// before the refresh period has elapsed.
    pub fn refresh_scanning(&mut self, shared: &Presentation, stats: &Stats, now: u32) -> Option<Screen> {
        if shared.lock.is_locked() {
            return None;
        }
        if let Some(last) = self.last_refresh {
            if now.wrapping_sub(last) < self.refresh_ms {
                return None;
            }
        }
        self.last_refresh = Some(now);

        let mut s = Screen::default();
        s.line(0, format_args!("SCANNING"));
        for _ in 0..self.dots {
            let _ = s.lines[1].push('.');
        }
        s.line(2, format_args!("Scans: {}", stats.scans));
        s.line(3, format_args!("Hits: {}/{}", stats.true_hits, stats.possible_hits));
        self.dots = (self.dots + 1) % 4;
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> AlertTiming {
        AlertTiming {
            true_hit_lock_ms: 3000,
            possible_hit_lock_ms: 2000,
            refresh_ms: 500,
        }
    }

    fn true_hit() -> Alert {
        Alert::TrueHit {
            identifier: Identifier::try_from("aa:bb:cc:dd:ee:ff").unwrap(),
            rssi: -58,
            source: HitSource::Local { at_ms: 12_345 },
        }
    }

    fn possible_hit() -> Alert {
        Alert::PossibleHit {
            identifier: Identifier::try_from("70:b3:d5:b3:42:00").unwrap(),
            rssi: -80,
            label: Label::try_from("Pacemaker/ICD/CRT").unwrap(),
        }
    }

    #[test]
    fn starts_scanning_and_draws_immediately() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        assert_eq!(shared.state(), PresentationState::Scanning);
        let frame = p.tick(&shared, &Stats::default(), 0).unwrap();
        match frame {
            Render::Scanning(s) => {
                assert_eq!(s.lines[0].as_str(), "SCANNING");
                assert_eq!(s.lines[2].as_str(), "Scans: 0");
                assert_eq!(s.lines[3].as_str(), "Hits: 0/0");
            }
            other => panic!("expected scanning, got {other:?}"),
        }
    }

    #[test]
    fn scanning_refresh_cadence_and_dots() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        let stats = Stats::default();
        let dots = |r: Option<Render>| match r {
            Some(Render::Scanning(s)) => s.lines[1].len(),
            other => panic!("expected scanning, got {other:?}"),
        };
        assert_eq!(dots(p.tick(&shared, &stats, 0)), 0);
        assert!(p.tick(&shared, &stats, 100).is_none());
        assert!(p.tick(&shared, &stats, 499).is_none());
        assert_eq!(dots(p.tick(&shared, &stats, 500)), 1);
        assert_eq!(dots(p.tick(&shared, &stats, 1000)), 2);
        assert_eq!(dots(p.tick(&shared, &stats, 1500)), 3);
        assert_eq!(dots(p.tick(&shared, &stats, 2000)), 0);
    }

    #[test]
    fn request_locks_and_alert_is_drawn_next_tick() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        shared.request(true_hit(), 1000);
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 4000 });
        assert_eq!(
            p.tick(&shared, &Stats::default(), 1010),
            Some(Render::Alert(true_hit()))
        );
    }

    #[test]
    fn scanning_suppressed_until_expiry() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        let stats = Stats::default();
        shared.request(possible_hit(), 0);
        assert!(matches!(p.tick(&shared, &stats, 0), Some(Render::Alert(_))));

        for now in (1..2000).step_by(100) {
            assert!(p.refresh_scanning(&shared, &stats, now).is_none());
            assert!(p.tick(&shared, &stats, now).is_none());
        }
        assert!(shared.lock.is_locked());

        // First tick at or past the expiry unlocks and draws scanning.
        assert!(matches!(
            p.tick(&shared, &stats, 2000),
            Some(Render::Scanning(_))
        ));
        assert_eq!(shared.state(), PresentationState::Scanning);
    }

    #[test]
    fn true_hit_outlasts_possible_hit() {
        let t = timing();
        assert!(true_hit().lock_ms(&t) > possible_hit().lock_ms(&t));
    }

    #[test]
    fn lock_is_never_shortened() {
        let lock = AlertLock::new();
        lock.lock_until(3000);
        lock.lock_until(2100);
        assert_eq!(lock.expiry(), Some(3000));
        lock.lock_until(3500);
        assert_eq!(lock.expiry(), Some(3500));
    }

    #[test]
    fn same_tier_request_extends_and_replaces() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        let other = Alert::PossibleHit {
            identifier: Identifier::try_from("70:b3:d5:b3:42:01").unwrap(),
            rssi: -75,
            label: Label::try_from("Insulin Pump").unwrap(),
        };
        assert!(shared.request(possible_hit(), 0));
        assert!(shared.request(other.clone(), 1500));
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 3500 });
        assert_eq!(
            p.tick(&shared, &Stats::default(), 1510),
            Some(Render::Alert(other))
        );
    }

    #[test]
    fn pending_true_hit_survives_possible_hit() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        let stats = Stats::default();
        assert!(shared.request(true_hit(), 0));
        assert!(!shared.request(possible_hit(), 20));

        let frame = p.tick(&shared, &stats, 50).unwrap();
        assert_eq!(frame.screen().lines[0].as_str(), "TRUE HIT!");
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 3000 });
        for now in (100..3000).step_by(100) {
            assert!(p.tick(&shared, &stats, now).is_none());
        }
        assert!(matches!(
            p.tick(&shared, &stats, 3000),
            Some(Render::Scanning(_))
        ));
    }

    #[test]
    fn possible_hit_waits_out_a_drawn_true_hit() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        let stats = Stats::default();
        shared.request(true_hit(), 0);
        assert!(matches!(p.tick(&shared, &stats, 0), Some(Render::Alert(_))));

        assert!(!shared.request(possible_hit(), 1000));
        assert!(p.tick(&shared, &stats, 1050).is_none());

        assert!(matches!(
            p.tick(&shared, &stats, 3000),
            Some(Render::Scanning(_))
        ));
        assert!(shared.request(possible_hit(), 3100));
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 5100 });
        assert_eq!(
            p.tick(&shared, &stats, 3150),
            Some(Render::Alert(possible_hit()))
        );
    }

    #[test]
    fn true_hit_replaces_possible_hit() {
        let shared = Presentation::new(timing());
        let mut p = Presenter::new(500);
        shared.request(possible_hit(), 0);
        assert!(shared.request(true_hit(), 10));
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 3010 });
        assert_eq!(
            p.tick(&shared, &Stats::default(), 20),
            Some(Render::Alert(true_hit()))
        );
    }

    #[test]
    fn lock_set_during_clear_stays_locked() {
        let lock = AlertLock::new();
        lock.lock_until(100);
        // Loop observed an expired deadline; a new request lands before the
        // clear is committed.
        let observed = lock.expiry.load(Ordering::Acquire);
        lock.lock_until(500);
        assert!(lock
            .expiry
            .compare_exchange(observed, UNLOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err());
        assert!(lock.is_locked());
        assert!(!lock.expire(499));
        assert!(lock.expire(500));
        assert!(!lock.is_locked());
    }

    #[test]
    fn lock_handles_clock_wrap() {
        let lock = AlertLock::new();
        lock.lock_until(u32::MAX.wrapping_add(1000)); // wraps to 999
        assert!(!lock.expire(u32::MAX - 10));
        assert!(lock.expire(1000));
    }

    #[test]
    fn zero_deadline_still_locks() {
        let lock = AlertLock::new();
        lock.lock_until(0);
        assert!(lock.is_locked());
    }

    #[test]
    fn alert_screens() {
        let s = true_hit().screen();
        assert_eq!(s.lines[0].as_str(), "TRUE HIT!");
        assert_eq!(s.lines[1].as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(s.lines[2].as_str(), "RSSI: -58 dBm");
        assert_eq!(s.lines[3].as_str(), "Time: 12s");

        let relayed = Alert::TrueHit {
            identifier: Identifier::try_from("aa:bb:cc:dd:ee:ff").unwrap(),
            rssi: -70,
            source: HitSource::Mesh {
                node_id: NodeId::try_from("NODE-002").unwrap(),
            },
        };
        assert_eq!(relayed.screen().lines[3].as_str(), "From: NODE-002");

        let s = possible_hit().screen();
        assert_eq!(s.lines[0].as_str(), "POSSIBLE HIT");
        assert_eq!(s.lines[1].as_str(), "Pacemaker/ICD/CRT");
        assert_eq!(s.lines[2].as_str(), "70:b3:d5:b3:42:00");
        assert_eq!(s.lines[3].as_str(), "RSSI: -80 dBm");
    }

    #[test]
    fn tones_follow_tier() {
        assert_eq!(true_hit().tone(), TRUE_HIT_TONE);
        assert_eq!(possible_hit().tone(), POSSIBLE_HIT_TONE);
        assert!(TRUE_HIT_TONE.beeps > POSSIBLE_HIT_TONE.beeps);
    }

    #[test]
    fn concurrent_requests_never_lose_the_lock() {
        let shared = Presentation::new(timing());
        std::thread::scope(|s| {
            s.spawn(|| {
                for now in 0..2000u32 {
                    shared.expire(now);
                }
            });
            s.spawn(|| {
                for now in 0..200u32 {
                    shared.request(true_hit(), now);
                }
            });
        });
        // The last request locked until 199 + 3000, beyond any expiry the
        // clearing thread evaluated.
        assert_eq!(shared.state(), PresentationState::Locked { expiry: 3199 });
    }
}
