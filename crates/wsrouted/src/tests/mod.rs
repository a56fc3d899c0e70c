//! Behavioural and socket-level suites for the daemon.

mod support;
