thread_local! {
    static IN_CRITICAL_SECTION: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

pub(crate) fn in_critical_section() -> bool {
    IN_CRITICAL_SECTION.with(|x| x.get())
}

/// Mark this thread as running the kernel's interrupts-disabled path, which tells the crate to defer any work that
/// could allocate or block.
///
/// The caller owns the interrupts-disabled discipline; this marker only routes logging.  Call
/// [exit_critical_section](crate::exit_critical_section) on the way out, then drain deferred work with
/// [drain_deferred_logs](crate::drain_deferred_logs).
#[inline(always)]
pub fn enter_critical_section() {
    IN_CRITICAL_SECTION.with(|x| x.replace(true));
}

/// Unmark this thread.  See [enter_critical_section](crate::enter_critical_section).
#[inline(always)]
pub fn exit_critical_section() {
    IN_CRITICAL_SECTION.with(|x| x.replace(false));
}
