//! Integration tests driving the real server over WebSockets.

mod helpers;

mod cross_process_test;
mod health_test;
mod matching_test;
mod room_test;
