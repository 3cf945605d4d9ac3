//! Integration tests: full coordinator flows against scripted
//! collaborators and in-memory stores.

mod harness;
mod rotation_flow;
mod trade_flow;
