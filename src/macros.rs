/// Fails loudly on a contract violation of the handoff protocol.
///
/// A protocol violation (double-resume, baton in an impossible state, a transfer coming
/// back with a kind the call site cannot receive) is a programming error, not a runtime
/// condition. It must never proceed with stale state, so it panics with a message that is
/// clearly distinguishable from a failure raised by the coroutine body.
macro_rules! protocol_violation {
    ($($arg:tt)*) => {
        panic!("coroutine protocol violated: {}", format_args!($($arg)*))
    };
}

pub(crate) use protocol_violation;
