use putwire_config::DrainPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug)]
pub struct MachineSnapshot {
    pub console: ConsoleSnapshot,
    pub ram_base: u64,
    pub ram_size: u64,
    pub peripherals: HashMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSnapshot {
    pub register_addr: u64,
    pub ready: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SinkSnapshot {
    pub drain: DrainPolicy,
    pub register: i32,
    pub status: u32,
    pub captured: Vec<i32>,
    pub text: String,
    pub writes: u64,
    pub lost: u64,
}
