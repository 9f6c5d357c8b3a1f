//! Text console and keyboard through the system table's stdout and stdin.

use core::fmt::Write;
use uefi::proto::console::text::Color;
use uefi::{Status, boot, system};

pub fn print(text: &str) {
    system::with_stdout(|stdout| {
        let _ = stdout.write_str(text);
    });
}

pub fn set_emphasis(emphasized: bool) {
    let foreground = if emphasized {
        Color::Cyan
    } else {
        Color::LightGray
    };
    system::with_stdout(|stdout| {
        let _ = stdout.set_color(foreground, Color::Black);
    });
}

/// Blocks on the keyboard's wait-for-key event.
pub fn wait_for_key() -> Result<(), Status> {
    let event =
        system::with_stdin(|stdin| stdin.wait_for_key_event()).ok_or(Status::UNSUPPORTED)?;
    boot::wait_for_event(&mut [event]).map_err(|e| e.status())?;
    Ok(())
}

/// Consumes the pending key stroke.
pub fn read_key() -> Result<(), Status> {
    system::with_stdin(|stdin| stdin.read_key())
        .map(|_| ())
        .map_err(|e| e.status())
}
