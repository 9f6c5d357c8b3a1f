//! # Trace output
//!
//! Last words before the jump. Only the QEMU debug port is left at this point.

use boot_qemu::qemu_trace;
use loader_core::BootHandoff;

use crate::firmware::UefiFirmware;

pub fn trace_handoff(handoff: &BootHandoff<UefiFirmware>) {
    let image = handoff.image();
    let map = handoff.memory_map();

    qemu_trace!("Handing off to the kernel:\n");
    qemu_trace!(
        "  image = {}, len = {}, pages = {}\n",
        image.base(),
        image.len(),
        image.page_count()
    );
    qemu_trace!(
        "  mmap len = {}, desc size = {}, desc version = {}, entries = {}, key = {}\n",
        map.meta().map_size,
        map.meta().desc_size,
        map.meta().desc_version,
        map.meta().entry_count(),
        map.key().0
    );
    qemu_trace!(
        "  exit attempts = {}, entry = {}\n",
        handoff.exit_attempts(),
        handoff.entry()
    );
}
