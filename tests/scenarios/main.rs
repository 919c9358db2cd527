//! Scenario tests for writ
//!
//! Every scenario runs real `/bin/sh` commands through a [`writ::Session`].

#![cfg(unix)]

mod helpers;

mod abort_on_failure;
mod conditions;
mod continue_policy;
mod replay;
mod scripted_steps;
mod security_mode;
mod timeouts;
mod variable_substitution;
