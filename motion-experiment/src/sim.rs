//! Simulated display and observer, for tests and dry runs without hardware.
//!
//! [`SimPresenter`] and [`SimObserver`] share a [`ViewLog`]: the presenter
//! writes what was shown, the observer answers based on it. Both pass time
//! through their [`Clock`], so with a [`VirtualClock`] a whole session runs
//! instantly and with a wall clock it runs at display pace.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use motion_core::{Key, MotionDirection};
use motion_staircase::Psychometric;
use motion_timing::Clock;
use rand::Rng;
use tracing::warn;

use crate::io::{AudioCue, FrameReport, GratingFrame, InputSource, Presenter, Screen};

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Rc<Cell<f64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.now.set(self.now.get() + seconds);
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_secs_f64());
    }
}

#[derive(Debug, Clone, Copy)]
struct Exposure {
    direction: MotionDirection,
    seconds: f64,
}

/// Everything the simulated display has shown so far.
#[derive(Debug, Default)]
pub struct ViewLog {
    pub frames: usize,
    pub grating_frames: usize,
    pub last_grating: Option<GratingFrame>,
    pub feedback: Vec<bool>,
    pub cues: usize,
    pub run_breaks: usize,
    pub finished: bool,
    exposure: Option<Exposure>,
}

pub type SharedView = Rc<RefCell<ViewLog>>;

pub struct SimPresenter<C: Clock> {
    clock: C,
    frame_duration_s: f64,
    report_frames: bool,
    started: f64,
    view: SharedView,
}

/// Refresh rate used when the requested one is unusable.
const FALLBACK_REFRESH_HZ: f64 = 60.0;

impl<C: Clock> SimPresenter<C> {
    pub fn new(clock: C, refresh_hz: f64) -> Self {
        let refresh_hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz
        } else {
            warn!(refresh_hz, "unusable refresh rate, simulating {FALLBACK_REFRESH_HZ} Hz");
            FALLBACK_REFRESH_HZ
        };
        let started = clock.now();
        Self {
            clock,
            frame_duration_s: 1.0 / refresh_hz,
            report_frames: true,
            started,
            view: SharedView::default(),
        }
    }

    /// Stops reporting frame durations, like a backend without vsync
    /// timestamps.
    pub fn without_frame_reports(mut self) -> Self {
        self.report_frames = false;
        self
    }

    pub fn view(&self) -> SharedView {
        Rc::clone(&self.view)
    }
}

impl<C: Clock> Presenter for SimPresenter<C> {
    fn present(&mut self, screen: &Screen) -> FrameReport {
        self.clock.sleep(Duration::from_secs_f64(self.frame_duration_s));
        let mut view = self.view.borrow_mut();
        view.frames += 1;
        match screen {
            Screen::Grating(grating) => {
                view.grating_frames += 1;
                let exposure = view.exposure.get_or_insert(Exposure {
                    direction: grating.direction,
                    seconds: 0.0,
                });
                exposure.seconds += self.frame_duration_s;
                view.last_grating = Some(grating.clone());
            }
            Screen::Feedback { correct } => view.feedback.push(*correct),
            Screen::RunBreak { .. } => view.run_breaks += 1,
            Screen::Finished => view.finished = true,
            Screen::Blank | Screen::Fixation | Screen::ResponseCue => {}
        }
        FrameReport {
            elapsed_s: self.clock.now() - self.started,
            frame_duration_s: self.report_frames.then_some(self.frame_duration_s),
        }
    }

    fn play_cue(&mut self, cue: AudioCue) {
        match cue {
            AudioCue::Success => self.view.borrow_mut().cues += 1,
        }
    }
}

/// How the simulated observer decides whether to answer correctly.
#[derive(Debug, Clone)]
pub enum ResponsePolicy {
    /// Answers in order. Presses escape once the script runs out.
    Scripted(VecDeque<bool>),
    /// Draws each answer from a psychometric function of the exposure time.
    Psychometric {
        function: Psychometric,
        threshold_s: f64,
    },
}

impl ResponsePolicy {
    pub fn scripted(answers: impl IntoIterator<Item = bool>) -> Self {
        ResponsePolicy::Scripted(answers.into_iter().collect())
    }
}

/// When the simulated observer presses escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuitTrigger {
    /// At the first poll once this many grating frames have been shown.
    GratingFrames(usize),
    /// At the first poll once this many feedback screens have been shown.
    Feedback(usize),
    /// On this blocking key wait, counting from 1.
    KeyWait(usize),
    /// On this poll, counting from 1.
    Poll(usize),
}

pub struct SimObserver<C: Clock, R: Rng> {
    clock: C,
    view: SharedView,
    policy: ResponsePolicy,
    rng: R,
    reaction_s: f64,
    stray_keys: usize,
    strays_left: usize,
    quit: Option<QuitTrigger>,
    key_waits: usize,
    polls: usize,
}

impl<C: Clock, R: Rng> SimObserver<C, R> {
    pub fn new(clock: C, view: SharedView, policy: ResponsePolicy, rng: R) -> Self {
        Self {
            clock,
            view,
            policy,
            rng,
            reaction_s: 0.4,
            stray_keys: 0,
            strays_left: 0,
            quit: None,
            key_waits: 0,
            polls: 0,
        }
    }

    pub fn with_reaction_time(mut self, seconds: f64) -> Self {
        self.reaction_s = seconds.max(0.0);
        self
    }

    /// Presses `count` unmapped keys before every judgement.
    pub fn with_stray_keys(mut self, count: usize) -> Self {
        self.stray_keys = count;
        self.strays_left = count;
        self
    }

    /// Presses escape once this many grating frames have been shown in total.
    pub fn quit_after_grating_frames(mut self, frames: usize) -> Self {
        self.quit = Some(QuitTrigger::GratingFrames(frames));
        self
    }

    /// Presses escape while the `count`-th feedback screen is up.
    pub fn quit_during_feedback(mut self, count: usize) -> Self {
        self.quit = Some(QuitTrigger::Feedback(count));
        self
    }

    /// Answers the `n`-th blocking key wait with escape.
    pub fn quit_at_key_wait(mut self, n: usize) -> Self {
        self.quit = Some(QuitTrigger::KeyWait(n));
        self
    }

    /// Reports escape on the `n`-th poll.
    pub fn quit_at_poll(mut self, n: usize) -> Self {
        self.quit = Some(QuitTrigger::Poll(n));
        self
    }

    /// Blocking key waits answered so far.
    pub fn key_waits(&self) -> usize {
        self.key_waits
    }

    /// Polls answered so far.
    pub fn polls(&self) -> usize {
        self.polls
    }

    fn judge(&mut self, exposure_s: f64) -> Option<bool> {
        match &mut self.policy {
            ResponsePolicy::Scripted(answers) => answers.pop_front(),
            ResponsePolicy::Psychometric {
                function,
                threshold_s,
            } => {
                let p = function.p_correct(exposure_s, *threshold_s);
                let p = if p.is_finite() {
                    p.clamp(0.0, 1.0)
                } else {
                    function.guess_rate.clamp(0.0, 1.0)
                };
                Some(self.rng.random_bool(p))
            }
        }
    }

    fn quit_due(&self) -> bool {
        let view = self.view.borrow();
        match self.quit {
            Some(QuitTrigger::GratingFrames(n)) => view.grating_frames >= n,
            Some(QuitTrigger::Feedback(n)) => view.feedback.len() >= n,
            Some(QuitTrigger::Poll(n)) => self.polls == n,
            Some(QuitTrigger::KeyWait(_)) | None => false,
        }
    }
}

fn key_for(direction: MotionDirection) -> Key {
    match direction {
        MotionDirection::Leftward => Key::Left,
        MotionDirection::Rightward => Key::Right,
    }
}

impl<C: Clock, R: Rng> InputSource for SimObserver<C, R> {
    fn wait_for_key(&mut self) -> Key {
        self.clock.sleep(Duration::from_secs_f64(self.reaction_s));
        self.key_waits += 1;
        if self.quit == Some(QuitTrigger::KeyWait(self.key_waits)) {
            self.quit = None;
            return Key::Escape;
        }
        let exposure = self.view.borrow().exposure;
        let Some(exposure) = exposure else {
            return Key::Space;
        };
        if self.strays_left > 0 {
            self.strays_left -= 1;
            return Key::Char('x');
        }
        self.strays_left = self.stray_keys;
        self.view.borrow_mut().exposure = None;
        match self.judge(exposure.seconds) {
            Some(true) => key_for(exposure.direction),
            Some(false) => match exposure.direction {
                MotionDirection::Leftward => Key::Right,
                MotionDirection::Rightward => Key::Left,
            },
            None => Key::Escape,
        }
    }

    fn poll_keys(&mut self) -> Vec<Key> {
        self.polls += 1;
        if self.quit_due() {
            self.quit = None;
            vec![Key::Escape]
        } else {
            Vec::new()
        }
    }
}
