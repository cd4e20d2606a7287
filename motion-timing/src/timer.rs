use std::time::{Duration, Instant};

#[cfg(target_os = "linux")]
use tracing::warn;

/// Monotonic time source for trial sequencing.
pub trait Clock {
    /// Seconds since the clock's origin. Never decreases.
    fn now(&self) -> f64;

    /// Seconds elapsed since an earlier `now()` reading.
    fn elapsed(&self, since: f64) -> f64 {
        (self.now() - since).max(0.0)
    }

    /// Blocks for `d`. Used for the fixed ISI, feedback and ITI waits.
    fn sleep(&self, d: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

/// Wall clock backed by `Instant`, with an OS-level precise sleep.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
}

impl Clock for HighPrecisionTimer {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

/// Tail of a sleep that is busy-waited when `high_precision_timer` is on.
#[cfg(feature = "high_precision_timer")]
const SPIN_TAIL: Duration = Duration::from_micros(200);

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(feature = "high_precision_timer")]
        {
            let deadline = Instant::now() + duration;
            self.os_sleep(duration.saturating_sub(SPIN_TAIL));
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        }
        #[cfg(not(feature = "high_precision_timer"))]
        self.os_sleep(duration);
    }

    /// Sleeps until an absolute monotonic deadline, so signals cannot
    /// shorten the wait.
    #[cfg(target_os = "linux")]
    fn os_sleep(&self, duration: Duration) {
        use libc::{clock_gettime, clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR, TIMER_ABSTIME};

        if duration.is_zero() {
            return;
        }
        let mut now: timespec = unsafe { std::mem::zeroed() };
        if unsafe { clock_gettime(CLOCK_MONOTONIC, &mut now) } != 0 {
            std::thread::sleep(duration);
            return;
        }
        let deadline = deadline_after(now, duration);
        loop {
            let rc = unsafe {
                clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &deadline, std::ptr::null_mut())
            };
            match rc {
                0 => return,
                EINTR => continue,
                errno => {
                    warn!(errno, "clock_nanosleep failed, using thread sleep");
                    std::thread::sleep(duration);
                    return;
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn os_sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(target_os = "linux")]
fn deadline_after(now: libc::timespec, duration: Duration) -> libc::timespec {
    const NANOS_PER_SEC: libc::c_long = 1_000_000_000;
    let mut deadline = now;
    deadline.tv_sec += duration.as_secs() as libc::time_t;
    deadline.tv_nsec += duration.subsec_nanos() as libc::c_long;
    if deadline.tv_nsec >= NANOS_PER_SEC {
        deadline.tv_sec += 1;
        deadline.tv_nsec -= NANOS_PER_SEC;
    }
    deadline
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let timer = HighPrecisionTimer::new();
        let a = timer.now();
        let b = timer.now();
        assert!(b >= a);
    }

    #[test]
    fn sleep_waits_at_least_the_requested_time() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(5));
        assert!(timer.elapsed(before) >= 0.005);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn deadline_carries_nanoseconds_into_seconds() {
        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        now.tv_sec = 10;
        now.tv_nsec = 900_000_000;
        let deadline = deadline_after(now, Duration::from_millis(250));
        assert_eq!(11, deadline.tv_sec);
        assert_eq!(150_000_000, deadline.tv_nsec);

        let deadline = deadline_after(now, Duration::from_secs(2));
        assert_eq!(12, deadline.tv_sec);
        assert_eq!(900_000_000, deadline.tv_nsec);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn interrupted_sleep_still_reaches_the_deadline() {
        use std::sync::mpsc;
        use std::thread;

        extern "C" fn ignore(_: libc::c_int) {}
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore as usize;
            libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut());
        }

        let (tx, rx) = mpsc::channel();
        let sleeper = thread::spawn(move || {
            tx.send(unsafe { libc::pthread_self() }).unwrap();
            let timer = HighPrecisionTimer::new();
            let before = timer.now();
            timer.sleep(Duration::from_millis(100));
            timer.elapsed(before)
        });
        let thread_id = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        unsafe {
            libc::pthread_kill(thread_id, libc::SIGUSR1);
        }
        let slept = sleeper.join().unwrap();
        assert!(slept >= 0.1, "woke after {slept} s");
    }
}
