mod session_registry;
mod tone_selftest;
