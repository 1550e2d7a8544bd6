//! Per-charger allocation state
//!
//! Tracks what the allocator wants a charger to use (`requested_current`),
//! what it last calculated, and what was confirmed applied. Also runs the
//! session / manual override state machine:
//!
//! ```text
//!            can_charge                  can_charge, limit == applied
//!   Idle ───────────────────► Active ◄──────────────────┐
//!    ▲   (requested := max)     │ │                      │
//!    │                          │ └──────────────────────┘
//!    │        !can_charge       │   can_charge, limit != applied
//!    └──────────────────────────┘   (override, requested := limit)
//!    (requested := limit)
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::charger::Charger;
use crate::phase::{Amps, PerPhase};

/// Outcome of one override detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    /// New session began, requested current reset to the device maximum
    Started,
    /// Active session ended
    Ended,
    /// Still not charging
    Idle,
    /// Limit changed outside the allocator during an active session
    Override,
    /// Active session, limit matches what was applied
    Steady,
    /// Active session but the device limit could not be read
    Unobservable,
    /// Limit still unreadable, record not initialized
    Pending,
}

impl fmt::Display for SessionTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionTransition::Started => "started",
            SessionTransition::Ended => "ended",
            SessionTransition::Idle => "idle",
            SessionTransition::Override => "override",
            SessionTransition::Steady => "steady",
            SessionTransition::Unobservable => "unobservable",
            SessionTransition::Pending => "pending",
        };
        write!(f, "{}", name)
    }
}

/// Allocation state of one registered charger
pub struct ChargerState {
    charger: Arc<dyn Charger>,
    initialized: bool,
    requested_current: Option<PerPhase<Amps>>,
    last_calculated_current: Option<PerPhase<Amps>>,
    last_applied_current: Option<PerPhase<Amps>>,
    last_update_time: Option<DateTime<Utc>>,
    manual_override_detected: bool,
    active_session: bool,
    /// Seen not charging before the first successful limit read
    idle_before_init: bool,
}

impl ChargerState {
    pub fn new(charger: Arc<dyn Charger>) -> Self {
        Self {
            charger,
            initialized: false,
            requested_current: None,
            last_calculated_current: None,
            last_applied_current: None,
            last_update_time: None,
            manual_override_detected: false,
            active_session: false,
            idle_before_init: false,
        }
    }

    /// Read the device's real limit and adopt it as requested and applied.
    ///
    /// Returns false (and stays uninitialized) when the limit cannot be read.
    /// A charger that is already charging at this point is treated as being
    /// mid-session, so its live limit is respected instead of reset, unless
    /// it was seen idle earlier. Then the next detection pass starts a new
    /// session.
    pub fn initialize(&mut self) -> bool {
        let Some(limit) = self.charger.get_current_limit() else {
            debug!("Charger {}: current limit unavailable, deferring init", self.id());
            return false;
        };

        self.requested_current = Some(limit);
        self.last_applied_current = Some(limit);
        self.active_session = self.charger.can_charge() && !self.idle_before_init;
        self.idle_before_init = false;
        self.initialized = true;

        info!(
            "Charger {}: initialized at {} (session active: {})",
            self.id(),
            limit,
            self.active_session
        );
        true
    }

    /// Record a limit confirmed as written to the device
    pub fn update_applied_current(&mut self, values: PerPhase<Amps>, timestamp: DateTime<Utc>) {
        self.last_applied_current = Some(values);
        self.last_update_time = Some(timestamp);
    }

    pub(crate) fn set_last_calculated_current(&mut self, values: PerPhase<Amps>) {
        self.last_calculated_current = Some(values);
    }

    /// Override the allocator's authorization ceiling
    pub fn set_requested_current(&mut self, values: PerPhase<Amps>) {
        self.requested_current = Some(values);
    }

    /// Reconcile tracked state with what the device reports.
    ///
    /// Session start is checked before the override comparison, so a device
    /// that begins a new session while still reporting an old limit is not
    /// mistaken for a manual change.
    ///
    /// An uninitialized record gets an initialization attempt first and
    /// reports `Pending` while the limit stays unreadable.
    pub fn detect_manual_override(&mut self) -> SessionTransition {
        let can_charge = self.charger.can_charge();

        if !self.initialized {
            if !can_charge {
                self.idle_before_init = true;
            }
            if !self.initialize() {
                return SessionTransition::Pending;
            }
        }

        let actual = self.charger.get_current_limit();

        if can_charge && !self.active_session {
            if let Some(max) = self.charger.get_max_current_limit() {
                self.requested_current = Some(max);
            }
            self.active_session = true;
            self.manual_override_detected = false;
            // Raise hysteresis restarts with the session
            self.last_update_time = None;

            info!(
                "Charger {}: session started, requested reset to {:?}",
                self.id(),
                self.requested_current
            );
            return SessionTransition::Started;
        }

        if !can_charge {
            let was_active = self.active_session;
            self.active_session = false;
            if let Some(actual) = actual {
                self.requested_current = Some(actual);
            }
            self.manual_override_detected = false;

            if was_active {
                info!("Charger {}: session ended", self.id());
                return SessionTransition::Ended;
            }
            return SessionTransition::Idle;
        }

        let Some(actual) = actual else {
            return SessionTransition::Unobservable;
        };

        if self.last_applied_current.is_some_and(|applied| applied != actual) {
            self.requested_current = Some(actual);
            self.manual_override_detected = true;

            info!(
                "Charger {}: manual override detected, limit {} (applied {:?})",
                self.id(),
                actual,
                self.last_applied_current
            );
            SessionTransition::Override
        } else {
            self.manual_override_detected = false;
            SessionTransition::Steady
        }
    }

    pub fn id(&self) -> &str {
        self.charger.id()
    }

    pub fn charger(&self) -> &Arc<dyn Charger> {
        &self.charger
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn requested_current(&self) -> Option<PerPhase<Amps>> {
        self.requested_current
    }

    pub fn last_calculated_current(&self) -> Option<PerPhase<Amps>> {
        self.last_calculated_current
    }

    pub fn last_applied_current(&self) -> Option<PerPhase<Amps>> {
        self.last_applied_current
    }

    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_time
    }

    pub fn manual_override_detected(&self) -> bool {
        self.manual_override_detected
    }

    pub fn active_session(&self) -> bool {
        self.active_session
    }
}

impl fmt::Debug for ChargerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargerState")
            .field("id", &self.id())
            .field("initialized", &self.initialized)
            .field("requested_current", &self.requested_current)
            .field("last_calculated_current", &self.last_calculated_current)
            .field("last_applied_current", &self.last_applied_current)
            .field("last_update_time", &self.last_update_time)
            .field("manual_override_detected", &self.manual_override_detected)
            .field("active_session", &self.active_session)
            .finish()
    }
}
