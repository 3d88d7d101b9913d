//! Console collaborators for the reflash flow
//!
//! The session reports progress through `SessionObserver`; this module
//! renders those callbacks as indicatif spinners. It also owns the
//! non-blocking keystroke poll the abort window needs, which means putting
//! the tty into raw mode for the duration of the countdown.

use std::time::Duration;

use ecreflash_core::ec::KeySource;
use ecreflash_core::session::{Phase, SessionObserver, VerifyOutcome};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

fn phase_title(phase: Phase) -> &'static str {
    match phase {
        Phase::Unlock => "Unlocking flash",
        Phase::Erase => "Erasing",
        Phase::Write => "Writing",
        Phase::Verify => "Verifying",
        Phase::Lock => "Locking flash",
    }
}

/// Session progress rendered as one spinner per phase.
pub struct ConsoleObserver {
    multi: MultiProgress,
    current: Option<ProgressBar>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: None,
        }
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current = Some(pb);
    }

    fn finish(&mut self, message: String) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(message);
        }
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver for ConsoleObserver {
    fn phase_started(&mut self, phase: Phase) {
        self.create_spinner(format!("{}...", phase_title(phase)));
    }

    fn region_started(&mut self, phase: Phase, region: &'static str) {
        if let Some(pb) = &self.current {
            pb.set_message(format!("{} {} region...", phase_title(phase), region));
        }
    }

    fn phase_completed(&mut self, phase: Phase) {
        self.finish(format!("{}... OK", phase_title(phase)));
    }

    fn region_checked(&mut self, region: &'static str, outcome: VerifyOutcome) {
        let verdict = match outcome {
            VerifyOutcome::Match => "OK",
            VerifyOutcome::Mismatch => "FAIL",
            VerifyOutcome::NotRun => "not checked",
        };
        let _ = self.multi.println(format!("  {} check: {}", region, verdict));
    }
}

/// Operator keystrokes from a raw-mode tty.
///
/// Construction switches stdin to non-canonical, non-echoing mode with
/// zero-byte reads allowed, so `poll_key` never blocks; drop restores the
/// saved settings. On a non-tty stdin every poll reports no key.
pub struct TtyKeys {
    saved: Option<libc::termios>,
}

impl TtyKeys {
    pub fn new() -> Self {
        let saved = unsafe {
            if libc::isatty(libc::STDIN_FILENO) == 0 {
                None
            } else {
                let mut termios: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(libc::STDIN_FILENO, &mut termios) != 0 {
                    None
                } else {
                    let saved = termios;
                    termios.c_lflag &= !(libc::ICANON | libc::ECHO);
                    termios.c_cc[libc::VMIN] = 0;
                    termios.c_cc[libc::VTIME] = 0;
                    if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &termios) != 0 {
                        None
                    } else {
                        Some(saved)
                    }
                }
            }
        };
        Self { saved }
    }
}

impl Default for TtyKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for TtyKeys {
    fn poll_key(&mut self) -> Option<u8> {
        self.saved.as_ref()?;
        let mut byte = 0u8;
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
            )
        };
        (n == 1).then_some(byte)
    }
}

impl Drop for TtyKeys {
    fn drop(&mut self) {
        if let Some(saved) = self.saved {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}
