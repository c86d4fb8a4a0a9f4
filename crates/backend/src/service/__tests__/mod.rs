mod discovery_flow;
mod helpers;
