//! Unit tests for the routing client.

mod support;
