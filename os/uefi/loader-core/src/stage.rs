//! # Boot Stages
//!
//! ```text
//! Idle → ConsoleGated → VolumeResolved → FileOpened → ImageLoaded
//!                                                          ↓
//!                                  StaleKey ⇄ (re-capture memory map)
//!                                                          ↓
//!                                               ServicesExited → Transferred
//! ```
//!
//! The only back-edge is `StaleKey`, which returns to another exit attempt from
//! the `ImageLoaded` side. `Transferred` is terminal and is never observed from
//! inside the loader because nothing runs after the jump.

use core::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum BootStage {
    Idle,
    ConsoleGated,
    VolumeResolved,
    FileOpened,
    ImageLoaded,
    /// `ExitBootServices` rejected the map key; the map must be captured again.
    StaleKey,
    ServicesExited,
    Transferred,
}

impl BootStage {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ConsoleGated)
                | (Self::ConsoleGated, Self::VolumeResolved)
                | (Self::VolumeResolved, Self::FileOpened)
                | (Self::FileOpened, Self::ImageLoaded)
                | (Self::ImageLoaded | Self::StaleKey, Self::StaleKey | Self::ServicesExited)
                | (Self::ServicesExited, Self::Transferred)
        )
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConsoleGated => "console gated",
            Self::VolumeResolved => "volume resolved",
            Self::FileOpened => "file opened",
            Self::ImageLoaded => "image loaded",
            Self::StaleKey => "stale map key",
            Self::ServicesExited => "boot services exited",
            Self::Transferred => "transferred",
        };
        f.write_str(name)
    }
}
