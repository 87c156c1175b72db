mod client_fallback_test;
mod poll_fallback_test;
mod push_channel_test;
